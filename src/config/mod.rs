//! Operator construction options.

pub mod options;
pub use options::LazyOptions;
