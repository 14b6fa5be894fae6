//! 布里渊区的 k 点网格, 坐标都是分数坐标 $[0,1)$.
use crate::error::{Result, TbError};
use ndarray::{Array1, Array2, Array3, Axis};

fn check_mesh(k_mesh: &Array1<usize>) -> Result<()> {
    if !(1..=3).contains(&k_mesh.len()) {
        return Err(TbError::InvalidDimension {
            dim: k_mesh.len(),
            supported: vec![1, 2, 3],
        });
    }
    if k_mesh.iter().any(|n| *n == 0) {
        return Err(TbError::EmptyKMesh {
            k_mesh: k_mesh.to_vec(),
        });
    }
    Ok(())
}

/// Uniform mesh without the end point, the last axis running fastest.
#[allow(non_snake_case)]
pub fn gen_kmesh(k_mesh: &Array1<usize>) -> Result<Array2<f64>> {
    check_mesh(k_mesh)?;
    let dim = k_mesh.len();
    let nk: usize = k_mesh.iter().product();
    let mut kvec = Array2::<f64>::zeros((nk, dim));
    for (n, mut row) in kvec.outer_iter_mut().enumerate() {
        let mut rest = n;
        for a in (0..dim).rev() {
            row[[a]] = (rest % k_mesh[[a]]) as f64 / k_mesh[[a]] as f64;
            rest /= k_mesh[[a]];
        }
    }
    Ok(kvec)
}

/// Integration cells of the mesh, shape `(ncell, dim, 2)` holding `[start, end]` per axis.
#[allow(non_snake_case)]
pub fn gen_krange(k_mesh: &Array1<usize>) -> Result<Array3<f64>> {
    let kvec = gen_kmesh(k_mesh)?;
    let dim_r = k_mesh.len();
    let step = k_mesh.mapv(|n| 1.0 / n as f64);
    let mut k_range = Array3::<f64>::zeros((kvec.nrows(), dim_r, 2));
    for (mut cell, k) in k_range.axis_iter_mut(Axis(0)).zip(kvec.outer_iter()) {
        for a in 0..dim_r {
            cell[[a, 0]] = k[[a]];
            cell[[a, 1]] = k[[a]] + step[[a]];
        }
    }
    Ok(k_range)
}

/// `nk` points on the segment `[start, end)`.
pub fn gen_kline(start: &[f64], end: &[f64], nk: usize) -> Array2<f64> {
    let dim = start.len().min(end.len());
    let mut out = Array2::<f64>::zeros((nk, dim));
    for (i, mut row) in out.outer_iter_mut().enumerate() {
        let t = i as f64 / nk as f64;
        for a in 0..dim {
            row[[a]] = start[a] + t * (end[a] - start[a]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_gen_kmesh() {
        let kmesh = gen_kmesh(&array![2, 3]).unwrap();
        assert_eq!(kmesh.shape(), &[6, 2]);
        assert_eq!(kmesh.row(0).to_vec(), vec![0.0, 0.0]);
        assert_relative_eq!(kmesh[[1, 1]], 1.0 / 3.0);
        assert_eq!(kmesh[[3, 0]], 0.5);
    }

    #[test]
    fn test_gen_krange_covers_the_zone() {
        let r = gen_krange(&array![4, 5]).unwrap();
        assert_eq!(r.shape(), &[20, 2, 2]);
        let area: f64 = r
            .outer_iter()
            .map(|c| (c[[0, 1]] - c[[0, 0]]) * (c[[1, 1]] - c[[1, 0]]))
            .sum();
        assert_relative_eq!(area, 1.0, epsilon = 1e-12);
        assert!(matches!(
            gen_krange(&array![2, 2, 2, 2]),
            Err(TbError::InvalidDimension { dim: 4, .. })
        ));
    }

    #[test]
    fn empty_direction_is_rejected() {
        assert!(matches!(
            gen_kmesh(&array![4, 0]),
            Err(TbError::EmptyKMesh { .. })
        ));
        assert!(gen_krange(&array![0]).is_err());
    }

    #[test]
    fn kline_excludes_the_end_point() {
        let l = gen_kline(&[0.0, 0.0], &[0.5, 0.0], 5);
        assert_eq!(l.nrows(), 5);
        assert_relative_eq!(l[[4, 0]], 0.4);
    }
}
