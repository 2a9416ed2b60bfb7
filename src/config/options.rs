//! Command-line or API options for operator construction.
//!
//! This module provides the `LazyOptions` struct, which tunes how structured
//! operators pick between algorithms: the size below which Toeplitz products
//! and correlations are summed directly instead of going through the FFT, and
//! the batch width at which batched products fan out across threads. Options
//! can be set field by field, through the builder-style setters, or parsed from
//! `key=value` pairs.

use std::fmt;

use crate::error::LazyError;

/// Algorithm-selection knobs for structured operators.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LazyOptions {
    /// Toeplitz operators with `n <= toeplitz_direct_threshold` use O(n²) direct sums.
    pub toeplitz_direct_threshold: usize,

    /// Batched products with at least this many columns run in parallel
    /// (only with the `rayon` feature).
    pub parallel_min_columns: usize,
}

impl Default for LazyOptions {
    fn default() -> Self {
        Self { toeplitz_direct_threshold: 32, parallel_min_columns: 8 }
    }
}

impl LazyOptions {
    pub fn with_toeplitz_direct_threshold(mut self, n: usize) -> Self {
        self.toeplitz_direct_threshold = n;
        self
    }

    pub fn with_parallel_min_columns(mut self, n: usize) -> Self {
        self.parallel_min_columns = n;
        self
    }

    /// Parses command-line style pairs such as `("toeplitz_direct_threshold", "64")`
    /// on top of the defaults. A leading `-` on keys is accepted.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, LazyError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut opts = Self::default();
        for (key, value) in pairs {
            let key = key.trim_start_matches('-');
            let parsed = value.trim().parse::<usize>().map_err(|e| {
                LazyError::InvalidArgument(format!("option `{key}`: cannot parse `{value}`: {e}"))
            })?;
            match key {
                "toeplitz_direct_threshold" => opts.toeplitz_direct_threshold = parsed,
                "parallel_min_columns" => opts.parallel_min_columns = parsed,
                _ => return Err(LazyError::InvalidArgument(format!("unknown option `{key}`"))),
            }
        }
        Ok(opts)
    }
}

impl fmt::Display for LazyOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LazyOptions(toeplitz_direct_threshold={}, parallel_min_columns={})",
            self.toeplitz_direct_threshold, self.parallel_min_columns
        )
    }
}
