//!这个模块用 lapack 的 zheevx 求解厄米矩阵在一个能量窗口里的本征值和本征矢.
#[cfg(any(feature = "intel-mkl-system", feature = "intel-mkl-static"))]
extern crate intel_mkl_src as _src;

#[cfg(any(feature = "openblas-system", feature = "openblas-static"))]
extern crate openblas_src as _src;

#[cfg(any(feature = "netlib-system", feature = "netlib-static"))]
extern crate netlib_src as _src;

use crate::error::{Result, TbError};
use lapack::zheevx;
use ndarray::{Array1, Array2, ArrayBase, Data, Ix2};
use ndarray_linalg::UPLO;
use num_complex::Complex;

struct Window {
    m: usize,
    w: Vec<f64>,
    z: Vec<Complex<f64>>,
}

fn zheevx_window<S>(
    x: &ArrayBase<S, Ix2>,
    range: (f64, f64),
    epsilon: f64,
    uplo: UPLO,
    vectors: bool,
) -> Result<Window>
where
    S: Data<Elem = Complex<f64>>,
{
    let n = x.shape()[0] as i32;
    if n == 0 {
        return Ok(Window {
            m: 0,
            w: Vec::new(),
            z: Vec::new(),
        });
    }
    // 行优先的矩阵按列优先传给 lapack, 相当于传入转置, 也就是 H 的共轭
    let mut a: Vec<_> = x.iter().cloned().collect();
    let mut w = vec![0.0; n as usize];
    let mut z = vec![Complex::new(0.0, 0.0); (n * n) as usize];
    let mut m = 0;
    let mut info = 0;
    let mut ifail = vec![0; n as usize];
    let mut work = vec![Complex::new(0.0, 0.0); (2 * n) as usize];
    let mut rwork = vec![0.0; (7 * n) as usize];
    let mut iwork = vec![0; (5 * n) as usize];
    let job1 = if vectors { b'V' } else { b'N' };
    let job3 = match uplo {
        UPLO::Upper => b'U',
        UPLO::Lower => b'L',
    };
    unsafe {
        zheevx(
            job1,
            b'V',
            job3,
            n,
            &mut a,
            n,
            range.0,
            range.1,
            0,
            n,
            epsilon,
            &mut m,
            &mut w,
            &mut z,
            n,
            &mut work,
            2 * n,
            &mut rwork,
            &mut iwork,
            &mut ifail,
            &mut info,
        );
    }
    if info != 0 {
        return Err(TbError::Lapack {
            routine: "zheevx",
            info,
        });
    }
    Ok(Window { m: m as usize, w, z })
}

/// Eigenpairs with eigenvalues in `(range.0, range.1]`.
///
/// Rows of the returned matrix are the complex conjugates of the eigenvectors,
/// the same layout as [`crate::Hamiltonian::solve_onek`].
pub fn eigh_x<S>(
    x: &ArrayBase<S, Ix2>,
    range: (f64, f64),
    epsilon: f64,
    uplo: UPLO,
) -> Result<(Array1<f64>, Array2<Complex<f64>>)>
where
    S: Data<Elem = Complex<f64>>,
{
    let n = x.shape()[0];
    let win = zheevx_window(x, range, epsilon, uplo, true)?;
    let evals = Array1::from_vec(win.w.into_iter().take(win.m).collect());
    let evecs = Array2::from_shape_vec((win.m, n), win.z.into_iter().take(n * win.m).collect())
        .map_err(|_| TbError::Lapack {
            routine: "zheevx",
            info: -1,
        })?;
    Ok((evals, evecs))
}

/// Eigenvalues in `(range.0, range.1]`, ascending.
pub fn eigvalsh_x<S>(
    x: &ArrayBase<S, Ix2>,
    range: (f64, f64),
    epsilon: f64,
    uplo: UPLO,
) -> Result<Array1<f64>>
where
    S: Data<Elem = Complex<f64>>,
{
    let win = zheevx_window(x, range, epsilon, uplo, false)?;
    Ok(Array1::from_vec(win.w.into_iter().take(win.m).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn window_keeps_only_the_requested_eigenvalues() {
        let c = |x: f64| Complex::new(x, 0.0);
        let h = array![
            [c(-2.0), c(0.0), c(0.0)],
            [c(0.0), c(0.5), c(0.0)],
            [c(0.0), c(0.0), c(3.0)]
        ];
        let e = eigvalsh_x(&h, (-1.0, 1.0), 1e-12, UPLO::Upper).unwrap();
        assert_eq!(e.len(), 1);
        assert_abs_diff_eq!(e[0], 0.5, epsilon = 1e-10);
        let (e, v) = eigh_x(&h, (-3.0, 1.0), 1e-12, UPLO::Upper).unwrap();
        assert_eq!(v.shape(), &[2, 3]);
        assert_abs_diff_eq!(e[0], -2.0, epsilon = 1e-10);
        assert_abs_diff_eq!(v[[0, 0]].norm(), 1.0, epsilon = 1e-10);
    }
}
