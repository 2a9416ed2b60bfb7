//! Solver-facing trait implementations: a Krylov-style loop written against
//! `MatVec`, `InnerProduct` and `Indexing` can drive any operator tree
//! without knowing its structure.

use faer::Mat;

use crate::core::traits::{Indexing, InnerProduct, MatVec, Scalar};
use crate::lazy::{LazyVariable, LinearOperator};

/// Length from which `dot` splits the sum across the rayon pool.
#[cfg_attr(not(feature = "rayon"), allow(dead_code))]
const PARALLEL_DOT_MIN_LEN: usize = 4096;

fn dot_slices<T: Scalar>(x: &[T], y: &[T]) -> T {
    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        if x.len() >= PARALLEL_DOT_MIN_LEN {
            return x.par_iter().zip(y.par_iter()).map(|(&a, &b)| a * b).reduce(T::zero, |acc, v| acc + v);
        }
    }
    x.iter().zip(y).fold(T::zero(), |acc, (&a, &b)| acc + a * b)
}

/// Euclidean inner product on plain vectors; `()` carries no state.
impl<T: Scalar> InnerProduct<Vec<T>> for () {
    type Scalar = T;

    fn dot(&self, x: &Vec<T>, y: &Vec<T>) -> T {
        assert_eq!(x.len(), y.len(), "dot of vectors with lengths {} and {}", x.len(), y.len());
        dot_slices(x, y)
    }

    fn norm(&self, x: &Vec<T>) -> T {
        dot_slices(x, x).sqrt()
    }
}

/// Matrix-vector product through the operator's matmul closure.
///
/// `MatVec` has no error channel, so lengths are asserted the way dense
/// wrappers do and a failing closure panics with its error.
impl<T: Scalar> MatVec<Vec<T>> for LazyVariable<T> {
    fn matvec(&self, x: &Vec<T>, y: &mut Vec<T>) {
        let (rows, cols) = self.size();
        assert_eq!(rows, y.len(), "Output vector y has incorrect length");
        assert_eq!(cols, x.len(), "Input vector x has incorrect length");
        match self.matmul_closure().apply_vector(x) {
            Ok(out) => y.copy_from_slice(&out),
            Err(e) => panic!("lazy operator matvec failed: {e}"),
        }
    }
}

// A vector is a single column.
impl<T> Indexing for Vec<T> {
    fn nrows(&self) -> usize {
        self.len()
    }
}

impl<T> Indexing for Mat<T> {
    fn nrows(&self) -> usize {
        self.nrows()
    }
}

impl<T: Scalar> Indexing for LazyVariable<T> {
    fn nrows(&self) -> usize {
        self.size().0
    }
}
