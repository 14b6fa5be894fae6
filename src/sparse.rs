//! 稀疏矩阵, 用 `sprs` 的 CSR 格式储存复数矩阵.
//!
//! Every sparse block is kept in CSR storage so that the `sprs` binary operators apply
//! without conversion.
use ndarray::{Array2, ArrayBase, Data, Ix2};
use num_complex::Complex64;
use sprs::{CsMat, TriMat};

pub type SparseMatrix = CsMat<Complex64>;

/// Builds a CSR matrix from `(row, col, value)` triplets, summing repeated positions.
pub fn from_triplets<I>(nrows: usize, ncols: usize, triplets: I) -> SparseMatrix
where
    I: IntoIterator<Item = (usize, usize, Complex64)>,
{
    let mut tri = TriMat::new((nrows, ncols));
    for (i, j, v) in triplets {
        tri.add_triplet(i, j, v);
    }
    tri.to_csr()
}

pub fn from_dense<S>(m: &ArrayBase<S, Ix2>) -> SparseMatrix
where
    S: Data<Elem = Complex64>,
{
    let (nrows, ncols) = m.dim();
    let triplets = m
        .indexed_iter()
        .filter(|(_, v)| **v != Complex64::new(0.0, 0.0))
        .map(|((i, j), v)| (i, j, *v));
    from_triplets(nrows, ncols, triplets)
}

/// 厄米共轭
pub fn dagger(m: &SparseMatrix) -> SparseMatrix {
    m.transpose_view().to_csr().map(|x| x.conj())
}

/// `out += c * m`
pub fn add_to_dense(m: &SparseMatrix, out: &mut Array2<Complex64>, c: Complex64) {
    for (v, (i, j)) in m.iter() {
        out[[i, j]] += v * c;
    }
}

pub fn max_abs(m: &SparseMatrix) -> f64 {
    m.data().iter().fold(0.0, |acc, v| acc.max(v.norm()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    #[test]
    fn duplicates_are_summed() {
        let m = from_triplets(
            2,
            2,
            vec![(1, 0, c(1.0, 0.0)), (0, 1, c(2.0, 0.0)), (1, 0, c(0.5, 0.0))],
        );
        assert_eq!(m.to_dense(), array![[c(0.0, 0.0), c(2.0, 0.0)], [c(1.5, 0.0), c(0.0, 0.0)]]);
        assert!(m.is_csr());
    }

    #[test]
    fn dagger_and_matvec() {
        let d = array![[c(1.0, 0.0), c(0.0, 2.0)], [c(0.0, 0.0), c(3.0, -1.0)]];
        let m = from_dense(&d);
        let dag = dagger(&m);
        assert!(dag.is_csr());
        assert_eq!(dag.to_dense()[[1, 0]], c(0.0, -2.0));
        assert_eq!(dag.to_dense()[[1, 1]], c(3.0, 1.0));
        let x = array![c(1.0, 0.0), c(1.0, 0.0)];
        assert_eq!(&m * &x, d.dot(&x));
    }

    #[test]
    fn sum_and_dense_accumulation() {
        let a: SparseMatrix = CsMat::eye(2);
        let s = &a + &a;
        assert_eq!(s.to_dense()[[1, 1]], c(2.0, 0.0));
        let mut out = Array2::<Complex64>::zeros((2, 2));
        add_to_dense(&s, &mut out, c(0.0, 1.0));
        assert_eq!(out[[0, 0]], c(0.0, 2.0));
        assert_eq!(max_abs(&s), 2.0);
    }
}
