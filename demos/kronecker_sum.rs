use faer::Mat;
use lazyvar::{
    KroneckerProductLazyVariable, LinearOperator, NonLazyVariable, Tensor, ToeplitzLazyVariable,
    check_gradients,
};
use rand::Rng;

fn main() -> Result<(), lazyvar::LazyError> {
    let mut rng = rand::thread_rng();

    // Kernel over a 4-point grid in one dimension and 6 regularly spaced points in the other.
    let data: Vec<f64> = (0..16).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let m = Mat::from_fn(4, 4, |i, j| data[j * 4 + i]);
    let spatial = Mat::from_fn(4, 4, |i, j| (0..4).map(|k| m[(i, k)] * m[(j, k)]).sum::<f64>());
    let temporal: Vec<f64> = (0..6).map(|k| (-(k as f64).powi(2) / 4.0).exp()).collect();

    let kernel =
        KroneckerProductLazyVariable::new(NonLazyVariable::new(spatial)?, ToeplitzLazyVariable::symmetric(temporal)?)?;
    let k = kernel.add_diag(&[0.05])?;
    println!("operator: {} of size {:?}, {} tensors", k.tag(), k.size(), k.num_representation());

    let x = Tensor::Vector((0..24).map(|_| rng.gen_range(-1.0..1.0)).collect());
    let y = k.matmul(&x)?;
    println!("K x = {:?}", y.as_vector());

    let report = check_gradients(&k, &x, &y, 1e-4)?;
    println!("gradient check: max abs err = {:e}", report.max_abs_err);
    Ok(())
}
