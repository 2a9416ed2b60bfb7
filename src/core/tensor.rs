//! Raw tensors that make up operator representations and operands.
//!
//! A [`Tensor`] is either a vector (rank 1) or a dense matrix (rank 2) stored as
//! a `faer::Mat`. Rank-2 operands of a product are read column-wise: each column
//! is an independent right-hand side (or probe vector, for derivatives).

use std::ops::Range;

use faer::Mat;

use crate::core::traits::Scalar;
use crate::error::LazyError;

#[derive(Clone, Debug)]
pub enum Tensor<T> {
    Vector(Vec<T>),
    Matrix(Mat<T>),
}

impl<T: Scalar> Tensor<T> {
    pub fn rank(&self) -> usize {
        match self {
            Tensor::Vector(_) => 1,
            Tensor::Matrix(_) => 2,
        }
    }

    /// Length of a vector, row count of a matrix.
    pub fn nrows(&self) -> usize {
        match self {
            Tensor::Vector(v) => v.len(),
            Tensor::Matrix(m) => m.nrows(),
        }
    }

    /// 1 for a vector.
    pub fn ncols(&self) -> usize {
        match self {
            Tensor::Vector(_) => 1,
            Tensor::Matrix(m) => m.ncols(),
        }
    }

    pub fn numel(&self) -> usize {
        self.nrows() * self.ncols()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nrows(), self.ncols())
    }

    pub fn same_shape(&self, other: &Tensor<T>) -> bool {
        self.rank() == other.rank() && self.shape() == other.shape()
    }

    pub fn as_vector(&self) -> Option<&[T]> {
        match self {
            Tensor::Vector(v) => Some(v),
            Tensor::Matrix(_) => None,
        }
    }

    pub fn as_matrix(&self) -> Option<&Mat<T>> {
        match self {
            Tensor::Vector(_) => None,
            Tensor::Matrix(m) => Some(m),
        }
    }

    /// The single element of a one-element tensor.
    pub fn as_scalar(&self) -> Option<T> {
        if self.numel() == 1 { Some(self.get(0, 0)) } else { None }
    }

    pub fn get(&self, i: usize, j: usize) -> T {
        match self {
            Tensor::Vector(v) => v[i],
            Tensor::Matrix(m) => m[(i, j)],
        }
    }

    /// Element at column-major position `idx`.
    pub fn get_flat(&self, idx: usize) -> T {
        let n = self.nrows();
        self.get(idx % n, idx / n)
    }

    pub fn set_flat(&mut self, idx: usize, value: T) {
        match self {
            Tensor::Vector(v) => v[idx] = value,
            Tensor::Matrix(m) => {
                let n = m.nrows();
                m[(idx % n, idx / n)] = value;
            }
        }
    }

    pub fn column(&self, j: usize) -> Vec<T> {
        (0..self.nrows()).map(|i| self.get(i, j)).collect()
    }

    pub fn zeros_like(&self) -> Tensor<T> {
        match self {
            Tensor::Vector(v) => Tensor::Vector(vec![T::zero(); v.len()]),
            Tensor::Matrix(m) => Tensor::Matrix(Mat::from_fn(m.nrows(), m.ncols(), |_, _| T::zero())),
        }
    }

    pub fn scale(&self, c: T) -> Tensor<T> {
        match self {
            Tensor::Vector(v) => Tensor::Vector(v.iter().map(|&x| x * c).collect()),
            Tensor::Matrix(m) => Tensor::Matrix(Mat::from_fn(m.nrows(), m.ncols(), |i, j| m[(i, j)] * c)),
        }
    }

    /// Elementwise `self += other`.
    pub fn add_assign(&mut self, other: &Tensor<T>) -> Result<(), LazyError> {
        if !self.same_shape(other) {
            return Err(LazyError::shape(
                format!("{:?}", self.shape()),
                format!("{:?}", other.shape()),
            ));
        }
        match (self, other) {
            (Tensor::Vector(a), Tensor::Vector(b)) => {
                a.iter_mut().zip(b).for_each(|(x, &y)| *x = *x + y);
            }
            (Tensor::Matrix(a), Tensor::Matrix(b)) => {
                for j in 0..a.ncols() {
                    for i in 0..a.nrows() {
                        a[(i, j)] = a[(i, j)] + b[(i, j)];
                    }
                }
            }
            _ => unreachable!("ranks checked above"),
        }
        Ok(())
    }

    /// Largest absolute elementwise difference, `None` if the shapes differ.
    pub fn max_abs_diff(&self, other: &Tensor<T>) -> Option<T> {
        if !self.same_shape(other) {
            return None;
        }
        Some((0..self.numel()).fold(T::zero(), |acc, k| {
            acc.max((self.get_flat(k) - other.get_flat(k)).abs())
        }))
    }

    /// Builds an `nrows × cols.len()` matrix from column vectors.
    pub(crate) fn columns_to_mat(nrows: usize, cols: &[Vec<T>]) -> Mat<T> {
        Mat::from_fn(nrows, cols.len(), |i, j| cols[j][i])
    }
}

impl<T> From<Vec<T>> for Tensor<T> {
    fn from(v: Vec<T>) -> Self {
        Tensor::Vector(v)
    }
}

impl<T> From<Mat<T>> for Tensor<T> {
    fn from(m: Mat<T>) -> Self {
        Tensor::Matrix(m)
    }
}

/// Row or column selection for operator indexing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Indexer {
    Full,
    At(usize),
    Range(Range<usize>),
    List(Vec<usize>),
}

impl Indexer {
    /// Positions selected along an axis of length `len`.
    pub fn resolve(&self, len: usize) -> Result<Vec<usize>, LazyError> {
        let out_of_range =
            |i: usize| LazyError::InvalidArgument(format!("index {i} out of range for axis of length {len}"));
        match self {
            Indexer::Full => Ok((0..len).collect()),
            Indexer::At(i) if *i < len => Ok(vec![*i]),
            Indexer::At(i) => Err(out_of_range(*i)),
            Indexer::Range(r) if r.start <= r.end && r.end <= len => Ok(r.clone().collect()),
            Indexer::Range(r) => Err(LazyError::InvalidArgument(format!(
                "range {}..{} out of range for axis of length {len}",
                r.start, r.end
            ))),
            Indexer::List(idx) => match idx.iter().find(|&&i| i >= len) {
                Some(&i) => Err(out_of_range(i)),
                None => Ok(idx.clone()),
            },
        }
    }
}

/// Dense `n × n` identity.
pub fn identity<T: Scalar>(n: usize) -> Mat<T> {
    Mat::from_fn(n, n, |i, j| if i == j { T::one() } else { T::zero() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_access_is_column_major() {
        let mut t = Tensor::Matrix(Mat::from_fn(2, 3, |i, j| (i + 10 * j) as f64));
        assert_eq!(t.get_flat(1), 1.0);
        assert_eq!(t.get_flat(2), 10.0);
        t.set_flat(5, -1.0);
        assert_eq!(t.get(1, 2), -1.0);
    }

    #[test]
    fn add_assign_rejects_rank_mismatch() {
        let mut v = Tensor::Vector(vec![1.0f64, 2.0]);
        let m = Tensor::Matrix(Mat::from_fn(2, 1, |_, _| 1.0f64));
        assert!(matches!(v.add_assign(&m), Err(LazyError::ShapeMismatch(_))));
    }

    #[test]
    fn indexer_bounds() {
        assert_eq!(Indexer::Range(1..3).resolve(4).unwrap(), vec![1, 2]);
        assert!(Indexer::At(4).resolve(4).is_err());
        assert!(Indexer::List(vec![0, 7]).resolve(4).is_err());
        assert_eq!(Indexer::Full.resolve(2).unwrap(), vec![0, 1]);
    }
}
