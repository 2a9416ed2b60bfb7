//! Algebraic properties of lazy operators.
//!
//! Every operator in the fixture zoo must agree with its own dense
//! materialization: `evaluate()` has the shape `size()` reports, products with
//! the identity rebuild it, and vector and batched products agree. The laws for
//! sums, Kronecker products and diagonal shifts are checked against dense
//! arithmetic on random data.

mod common;

use approx::assert_abs_diff_eq;
use common::*;
use faer::Mat;
use lazyvar::core::tensor::identity;
use lazyvar::{
    DiagLazyVariable, Indexer, KroneckerProductLazyVariable, LazyError, LinearOperator, NonLazyVariable,
    Structure, SumLazyVariable, Tensor, ToeplitzLazyVariable, VariantTag,
};

/// `evaluate()` shape equals `size()` for every variant.
#[test]
fn evaluate_matches_size() {
    for (name, op) in operator_zoo() {
        let dense = op.evaluate().unwrap();
        assert_eq!((dense.nrows(), dense.ncols()), op.size(), "{name}");
    }
}

/// Applying the matmul closure to the identity reconstructs `evaluate()`.
#[test]
fn identity_product_reconstructs_evaluate() {
    for (name, op) in operator_zoo() {
        let cols = op.size().1;
        let via_matmul = op.matmul(&Tensor::Matrix(identity(cols))).unwrap();
        let dense = op.evaluate().unwrap();
        println!("checking {name}");
        assert_mat_close(via_matmul.as_matrix().unwrap(), &dense, 1e-10);
    }
}

/// Unit basis vectors one at a time give the same columns.
#[test]
fn unit_vectors_reconstruct_columns() {
    for (name, op) in operator_zoo() {
        let (rows, cols) = op.size();
        let dense = op.evaluate().unwrap();
        for j in 0..cols {
            let mut e = vec![0.0; cols];
            e[j] = 1.0;
            let col = op.matmul(&Tensor::Vector(e)).unwrap();
            let structured = op.column(j).unwrap();
            for i in 0..rows {
                assert_abs_diff_eq!(col.get(i, 0), dense[(i, j)], epsilon = 1e-10);
                assert_abs_diff_eq!(structured[i], dense[(i, j)], epsilon = 1e-10);
            }
        }
        println!("{name}: columns ok");
    }
}

#[test]
fn out_of_range_columns_are_errors() {
    for (name, op) in operator_zoo() {
        let cols = op.size().1;
        assert!(matches!(op.column(cols), Err(LazyError::InvalidArgument(_))), "{name}");
        let res = op.structured_column(cols);
        assert!(matches!(res, Err(LazyError::InvalidArgument(_)) | Err(LazyError::Unsupported(_))), "{name}");
    }
    let d = DiagLazyVariable::new(vec![1.0, 2.0]).unwrap();
    assert!(matches!(d.structured_column(2), Err(LazyError::InvalidArgument(_))));
    let t = ToeplitzLazyVariable::symmetric(vec![1.0, 0.5, 0.25]).unwrap();
    assert!(matches!(t.structured_column(7), Err(LazyError::InvalidArgument(_))));
}

/// Batched products agree with dense products on random right-hand sides.
#[test]
fn batched_matmul_matches_dense() {
    let mut rng = rng();
    for (name, op) in operator_zoo() {
        let (_, cols) = op.size();
        let x = random_mat(&mut rng, cols, 3);
        let lazy = op.matmul(&Tensor::Matrix(x.clone())).unwrap();
        let dense = dense_product(&op.evaluate().unwrap(), &x);
        println!("checking {name}");
        assert_mat_close(lazy.as_matrix().unwrap(), &dense, 1e-10);
    }
}

/// Diagonal extraction agrees with the dense diagonal, structured or not.
#[test]
fn diagonal_matches_dense() {
    for (name, op) in operator_zoo() {
        let (rows, cols) = op.size();
        let dense = op.evaluate().unwrap();
        let diag = op.diagonal().unwrap();
        assert_eq!(diag.len(), rows.min(cols), "{name}");
        for (i, d) in diag.iter().enumerate() {
            assert_abs_diff_eq!(*d, dense[(i, i)], epsilon = 1e-10);
        }
    }
}

/// `Sum(A, B).evaluate() == A.evaluate() + B.evaluate()`.
#[test]
fn sum_law() {
    let mut rng = rng();
    let a = NonLazyVariable::new(random_mat(&mut rng, 5, 5)).unwrap();
    let b = ToeplitzLazyVariable::symmetric(random_vec(&mut rng, 5)).unwrap();
    let sum = SumLazyVariable::new(vec![a.clone().into(), b.clone().into()]).unwrap();
    let da = a.evaluate().unwrap();
    let db = b.evaluate().unwrap();
    let expected = Mat::from_fn(5, 5, |i, j| da[(i, j)] + db[(i, j)]);
    assert_mat_close(&sum.evaluate().unwrap(), &expected, 1e-12);
}

/// `(A ⊗ B) vec(X) == vec(B X Aᵗ)` for random conformable operands.
#[test]
fn kronecker_law() {
    let mut rng = rng();
    let (m, k) = (3, 4);
    let a_dense = random_mat(&mut rng, m, m);
    let b_dense = random_mat(&mut rng, k, k);
    let x = random_mat(&mut rng, k, m);
    let kron = KroneckerProductLazyVariable::new(
        NonLazyVariable::new(a_dense.clone()).unwrap(),
        NonLazyVariable::new(b_dense.clone()).unwrap(),
    )
    .unwrap();

    let vec_x: Vec<f64> = (0..m).flat_map(|j| (0..k).map(move |i| (i, j))).map(|(i, j)| x[(i, j)]).collect();
    let y = kron.matmul(&Tensor::Vector(vec_x)).unwrap();

    let a_t = Mat::from_fn(m, m, |i, j| a_dense[(j, i)]);
    let bxat = dense_product(&dense_product(&b_dense, &x), &a_t);
    for j in 0..m {
        for i in 0..k {
            assert_abs_diff_eq!(y.get(j * k + i, 0), bxat[(i, j)], epsilon = 1e-12);
        }
    }
}

/// Kronecker of a Toeplitz factor with FFT products still follows the law.
#[test]
fn kronecker_with_fft_toeplitz_factor() {
    let mut rng = rng();
    let t = ToeplitzLazyVariable::symmetric_with_options(random_vec(&mut rng, 6), fft_options()).unwrap();
    let d = DiagLazyVariable::new(random_vec(&mut rng, 3)).unwrap();
    let kron = KroneckerProductLazyVariable::new(d.clone(), t.clone()).unwrap();
    let dense = kron.evaluate().unwrap();
    let dt = t.evaluate().unwrap();
    for r in 0..18 {
        for c in 0..18 {
            let expected = if r / 6 == c / 6 { d.diag()[r / 6] * dt[(r % 6, c % 6)] } else { 0.0 };
            assert_abs_diff_eq!(dense[(r, c)], expected, epsilon = 1e-12);
        }
    }
}

/// `Diag(d).add_diag(e).evaluate() == diag(d + e)`.
#[test]
fn diag_add_diag_law() {
    let mut rng = rng();
    let d = random_vec(&mut rng, 6);
    let e = random_vec(&mut rng, 6);
    let shifted = DiagLazyVariable::new(d.clone()).unwrap().add_diag(&e).unwrap();
    assert_eq!(shifted.tag(), VariantTag::Diag);
    let dense = shifted.evaluate().unwrap();
    for i in 0..6 {
        for j in 0..6 {
            let expected = if i == j { d[i] + e[i] } else { 0.0 };
            assert_abs_diff_eq!(dense[(i, j)], expected, epsilon = 1e-12);
        }
    }
}

/// `Diag(d).mul(c).evaluate() == c * diag(d)` and stays diagonal.
#[test]
fn diag_mul_law() {
    let d = vec![0.5, -2.0, 4.0];
    let scaled = DiagLazyVariable::new(d.clone()).unwrap().mul(-3.0).unwrap();
    assert_eq!(scaled.tag(), VariantTag::Diag);
    let dense = scaled.evaluate().unwrap();
    for i in 0..3 {
        assert_abs_diff_eq!(dense[(i, i)], -3.0 * d[i], epsilon = 1e-12);
    }
}

/// The concrete scenario: d = [1, 2, 3].
#[test]
fn diag_scenario() {
    let d = DiagLazyVariable::new(vec![1.0, 2.0, 3.0]).unwrap();
    assert_eq!(d.size(), (3, 3));
    let dense = d.evaluate().unwrap();
    let expected = Mat::from_fn(3, 3, |i, j| if i == j { (i + 1) as f64 } else { 0.0 });
    assert_mat_close(&dense, &expected, 0.0);
    let shifted = d.add_diag(&[1.0, 1.0, 1.0]).unwrap().evaluate().unwrap();
    assert_eq!([shifted[(0, 0)], shifted[(1, 1)], shifted[(2, 2)]], [2.0, 3.0, 4.0]);
}

/// `add_diag` on non-diagonal variants wraps in a sum and matches dense arithmetic.
#[test]
fn add_diag_on_structured_operators() {
    for (name, op) in operator_zoo() {
        let (rows, cols) = op.size();
        if rows != cols {
            assert!(matches!(op.add_diag(&[1.0]), Err(LazyError::ShapeMismatch(_))), "{name}");
            continue;
        }
        let added: Vec<f64> = (0..rows).map(|i| i as f64 + 0.5).collect();
        let shifted = op.add_diag(&added).unwrap();
        let mut expected = op.evaluate().unwrap();
        for i in 0..rows {
            expected[(i, i)] += added[i];
        }
        println!("checking {name}");
        assert_mat_close(&shifted.evaluate().unwrap(), &expected, 1e-10);
        assert!(matches!(op.add_diag(&vec![1.0; rows + 1]), Err(LazyError::ShapeMismatch(_))));
    }
}

/// Scaling keeps each variant's tag and scales every entry.
#[test]
fn mul_preserves_structure() {
    for (name, op) in operator_zoo() {
        let scaled = op.mul(2.5).unwrap();
        assert_eq!(scaled.tag(), op.tag(), "{name}");
        let dense = op.evaluate().unwrap();
        let expected = Mat::from_fn(dense.nrows(), dense.ncols(), |i, j| 2.5 * dense[(i, j)]);
        assert_mat_close(&scaled.evaluate().unwrap(), &expected, 1e-10);
    }
}

#[test]
fn mul_rejects_non_scalar_and_non_finite() {
    let d = DiagLazyVariable::new(vec![1.0, 2.0]).unwrap();
    let err = d.mul_tensor(&Tensor::Vector(vec![1.0, 2.0])).unwrap_err();
    assert!(matches!(err, LazyError::InvalidArgument(_)));
    assert!(matches!(d.mul(f64::NAN), Err(LazyError::InvalidArgument(_))));
    let ok = d.mul_tensor(&Tensor::Vector(vec![2.0])).unwrap();
    assert_eq!(ok.diagonal().unwrap(), vec![2.0, 4.0]);
}

/// Indexing agrees with slicing the dense matrix.
#[test]
fn indexing_matches_dense_slices() {
    for (name, op) in operator_zoo() {
        let (rows, cols) = op.size();
        let dense = op.evaluate().unwrap();
        let picked_rows = vec![rows - 1, 0];
        let sliced = op.index(&Indexer::List(picked_rows.clone()), &Indexer::Range(1..cols)).unwrap();
        let got = sliced.evaluate().unwrap();
        assert_eq!((got.nrows(), got.ncols()), (2, cols - 1), "{name}");
        for (a, &r) in picked_rows.iter().enumerate() {
            for c in 1..cols {
                assert_abs_diff_eq!(got[(a, c - 1)], dense[(r, c)], epsilon = 1e-10);
            }
        }
        assert!(matches!(op.index(&Indexer::At(rows), &Indexer::Full), Err(LazyError::InvalidArgument(_))));
    }
}

/// Wrong input lengths and mixed ranks fail before any arithmetic.
#[test]
fn products_validate_inputs() {
    for (name, op) in operator_zoo() {
        let (rows, cols) = op.size();
        let bad = Tensor::Vector(vec![1.0; cols + 1]);
        assert!(matches!(op.matmul(&bad), Err(LazyError::ShapeMismatch(_))), "{name}");
        let l = Tensor::Vector(vec![1.0; rows]);
        let r = Tensor::Matrix(Mat::from_fn(cols, 1, |_, _| 1.0));
        assert!(matches!(op.derivative_quadratic_form(&l, &r), Err(LazyError::ShapeMismatch(_))), "{name}");
    }
}

#[test]
fn structure_flags() {
    let zoo = operator_zoo();
    let find = |n: &str| zoo.iter().find(|(name, _)| *name == n).map(|(_, op)| op.structure()).unwrap();
    assert!(find("diag").contains(Structure::DIAGONAL | Structure::SYMMETRIC));
    assert!(find("toeplitz_symmetric").contains(Structure::TOEPLITZ | Structure::SYMMETRIC));
    assert!(!find("toeplitz_fft").contains(Structure::SYMMETRIC));
    assert!(find("mul_diag").contains(Structure::DIAGONAL));
    assert!(find("dense").contains(Structure::DENSE));
    assert!(!find("sum").contains(Structure::DIAGONAL));
}

/// `add`, `hadamard` and `kronecker` build the matching composites.
#[test]
fn algebraic_conveniences() {
    let mut rng = rng();
    let a: lazyvar::LazyVariable<f64> = NonLazyVariable::new(random_mat(&mut rng, 3, 3)).unwrap().into();
    let b: lazyvar::LazyVariable<f64> = DiagLazyVariable::new(random_vec(&mut rng, 3)).unwrap().into();
    let da = a.evaluate().unwrap();
    let db = b.evaluate().unwrap();

    let sum = a.add(&b).unwrap();
    assert_eq!(sum.tag(), VariantTag::Sum);
    assert_mat_close(&sum.evaluate().unwrap(), &Mat::from_fn(3, 3, |i, j| da[(i, j)] + db[(i, j)]), 1e-12);

    let had = a.hadamard(&b).unwrap();
    assert_eq!(had.tag(), VariantTag::Mul);
    assert_mat_close(&had.evaluate().unwrap(), &Mat::from_fn(3, 3, |i, j| da[(i, j)] * db[(i, j)]), 1e-12);

    let kron = b.kronecker(&a).unwrap();
    assert_eq!(kron.tag(), VariantTag::KroneckerProduct);
    assert_eq!(kron.size(), (9, 9));
    let dk = kron.evaluate().unwrap();
    for r in 0..9 {
        for c in 0..9 {
            assert_abs_diff_eq!(dk[(r, c)], db[(r / 3, c / 3)] * da[(r % 3, c % 3)], epsilon = 1e-12);
        }
    }
}
