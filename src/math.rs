use ndarray::{Array2, ArrayBase, Data, Ix2, LinalgScalar};
use num_complex::Complex64;
use num_traits::{Float, FloatConst};

pub fn gauss<T: Float + FloatConst>(x: T, eta: T) -> T {
    //高斯展宽, 归一化到 1
    let two = T::one() + T::one();
    let a = x / eta;
    let g = (-a * a / two).exp();
    T::one() / (two * T::PI()).sqrt() / eta * g
}

#[allow(non_snake_case)]
#[inline(always)]
pub fn comm<A, B, T>(A: &ArrayBase<A, Ix2>, B: &ArrayBase<B, Ix2>) -> Array2<T>
where
    A: Data<Elem = T>,
    B: Data<Elem = T>,
    T: LinalgScalar,
{
    //! $[A,B]$
    A.dot(B) - B.dot(A)
}

#[allow(non_snake_case)]
#[inline(always)]
pub fn anti_comm<A, B, T>(A: &ArrayBase<A, Ix2>, B: &ArrayBase<B, Ix2>) -> Array2<T>
where
    A: Data<Elem = T>,
    B: Data<Elem = T>,
    T: LinalgScalar,
{
    //! $\\{A,B\\}$
    A.dot(B) + B.dot(A)
}

#[inline(always)]
pub fn dagger<S>(a: &ArrayBase<S, Ix2>) -> Array2<Complex64>
where
    S: Data<Elem = Complex64>,
{
    a.t().mapv(|x| x.conj())
}

/// Largest elementwise deviation $\max_{ij}|a_{ij}-b_{ij}|$.
pub fn max_abs_diff<S1, S2>(a: &ArrayBase<S1, Ix2>, b: &ArrayBase<S2, Ix2>) -> f64
where
    S1: Data<Elem = Complex64>,
    S2: Data<Elem = Complex64>,
{
    a.iter()
        .zip(b.iter())
        .fold(0.0, |acc, (x, y)| acc.max((x - y).norm()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn gauss_is_normalized() {
        let eta = 0.05;
        let dx = 1e-3;
        let s: f64 = (-2000..=2000).map(|i| gauss(i as f64 * dx, eta) * dx).sum();
        assert_relative_eq!(s, 1.0, epsilon = 1e-8);
        let s32: f32 = (-200..=200).map(|i| gauss(i as f32 * 0.01, 0.5) * 0.01).sum();
        assert_relative_eq!(s32, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn pauli_algebra() {
        let c = |re: f64, im: f64| Complex64::new(re, im);
        let sx = array![[c(0.0, 0.0), c(1.0, 0.0)], [c(1.0, 0.0), c(0.0, 0.0)]];
        let sy = array![[c(0.0, 0.0), c(0.0, -1.0)], [c(0.0, 1.0), c(0.0, 0.0)]];
        let sz = array![[c(1.0, 0.0), c(0.0, 0.0)], [c(0.0, 0.0), c(-1.0, 0.0)]];
        assert!(max_abs_diff(&comm(&sx, &sy), &sz.mapv(|x| x * c(0.0, 2.0))) < 1e-14);
        assert!(max_abs_diff(&anti_comm(&sx, &sy), &Array2::zeros((2, 2))) < 1e-14);
        assert_eq!(dagger(&sy), sy);
    }
}
