//! 能带, 态密度, 能隙以及稀疏矩阵的最低本征值.
use crate::error::{Result, TbError};
use crate::kpoints::gen_kmesh;
use crate::math::{dagger, gauss};
use crate::ndarray_lapack::{eigh_x, eigvalsh_x};
use crate::Hamiltonian;
use log::{debug, info};
use ndarray::parallel::prelude::*;
use ndarray::{Array1, Array2, Array3, ArrayBase, Axis, Data, Ix1, Ix2, s};
use ndarray_linalg::{EigValsh, Eigh, Inverse, UPLO};
use num_complex::Complex64;

impl Hamiltonian {
    #[allow(non_snake_case)]
    #[inline(always)]
    pub fn solve_band_onek<S>(&self, kvec: &ArrayBase<S, Ix1>) -> Result<Array1<f64>>
    where
        S: Data<Elem = f64>,
    {
        //!求解单个k点的能带值
        let hamk = self.gen_ham(kvec)?;
        Ok(hamk.eigvalsh(UPLO::Lower)?)
    }

    #[allow(non_snake_case)]
    #[inline(always)]
    pub fn solve_onek<S>(
        &self,
        kvec: &ArrayBase<S, Ix1>,
    ) -> Result<(Array1<f64>, Array2<Complex64>)>
    where
        S: Data<Elem = f64>,
    {
        //! 返回本征值和本征矢, 本征矢按行排列并取了复共轭, 也就是第 n 行是 $\bra{\psi_n}$.
        let hamk = self.gen_ham(kvec)?;
        let (eval, evec) = hamk.eigh(UPLO::Lower)?;
        Ok((eval, dagger(&evec)))
    }

    /// Eigenpairs inside `range` through `zheevx`, rows as in [`Hamiltonian::solve_onek`].
    pub fn solve_range_onek<S>(
        &self,
        kvec: &ArrayBase<S, Ix1>,
        range: (f64, f64),
        epsilon: f64,
    ) -> Result<(Array1<f64>, Array2<Complex64>)>
    where
        S: Data<Elem = f64>,
    {
        let hamk = self.gen_ham(kvec)?;
        eigh_x(&hamk, range, epsilon, UPLO::Upper)
    }

    ///这个是用来求解部分能带的算法, 可以加快求解速度, 尤其是求解边界态.
    pub fn eigvalsh_window<S>(
        &self,
        kvec: &ArrayBase<S, Ix1>,
        range: (f64, f64),
    ) -> Result<Array1<f64>>
    where
        S: Data<Elem = f64>,
    {
        let hamk = self.gen_ham(kvec)?;
        eigvalsh_x(&hamk, range, 1e-10, UPLO::Upper)
    }

    pub fn solve_band_all<S>(&self, kvec: &ArrayBase<S, Ix2>) -> Result<Array2<f64>>
    where
        S: Data<Elem = f64>,
    {
        //!求解多个k点的能带值
        let bands: Vec<Array1<f64>> = kvec
            .outer_iter()
            .map(|k| self.solve_band_onek(&k))
            .collect::<Result<_>>()?;
        Ok(stack_rows(&bands, self.dim()))
    }

    #[allow(non_snake_case)]
    pub fn solve_band_all_parallel<S>(&self, kvec: &ArrayBase<S, Ix2>) -> Result<Array2<f64>>
    where
        S: Data<Elem = f64> + Sync,
    {
        //!并行求解多个k点的能带值
        let bands: Vec<Array1<f64>> = kvec
            .axis_iter(Axis(0))
            .into_par_iter()
            .map(|k| self.solve_band_onek(&k))
            .collect::<Result<_>>()?;
        Ok(stack_rows(&bands, self.dim()))
    }

    #[allow(non_snake_case)]
    pub fn solve_all<S>(&self, kvec: &ArrayBase<S, Ix2>) -> Result<(Array2<f64>, Array3<Complex64>)>
    where
        S: Data<Elem = f64>,
    {
        let nk = kvec.len_of(Axis(0));
        let n = self.dim();
        let mut band = Array2::<f64>::zeros((nk, n));
        let mut vectors = Array3::<Complex64>::zeros((nk, n, n));
        for ((k, mut a), mut b) in kvec
            .outer_iter()
            .zip(band.outer_iter_mut())
            .zip(vectors.outer_iter_mut())
        {
            let (eval, evec) = self.solve_onek(&k)?;
            a.assign(&eval);
            b.assign(&evec);
        }
        Ok((band, vectors))
    }

    pub fn k_path(
        &self,
        path: &Array2<f64>,
        nk: usize,
    ) -> Result<(Array2<f64>, Array1<f64>, Array1<f64>)> {
        //!根据高对称点来生成高对称路径, 画能带图
        //!
        //!返回 (k 点, 沿路径的累计长度, 高对称点的位置). 长度用倒格子的度规计算,
        //!没有几何信息时用单位度规.
        let dim = self.dimensionality;
        if dim == 0 {
            return Err(TbError::InvalidDimension {
                dim,
                supported: vec![1, 2, 3],
            });
        }
        if path.ncols() != dim {
            return Err(TbError::DimensionMismatch {
                context: "k_path columns".to_string(),
                expected: dim,
                found: path.ncols(),
            });
        }
        let n_node = path.nrows();
        if n_node < 2 || nk < n_node {
            return Err(TbError::DimensionMismatch {
                context: "k_path nodes".to_string(),
                expected: 2,
                found: n_node,
            });
        }
        let k_metric = match &self.geometry {
            Some(g) => {
                let lat = ndarray::arr2(&[g.a1, g.a2, g.a3]);
                let lat = lat.slice(s![..dim, ..dim]).to_owned();
                lat.dot(&lat.t()).inv()?
            }
            None => Array2::<f64>::eye(dim),
        };
        let mut k_node = Array1::<f64>::zeros(n_node);
        for n in 1..n_node {
            let dk = &path.row(n) - &path.row(n - 1);
            let a = k_metric.dot(&dk);
            k_node[[n]] = k_node[[n - 1]] + dk.dot(&a).sqrt();
        }
        let mut node_index: Vec<usize> = vec![0];
        for n in 1..n_node - 1 {
            let frac = k_node[[n]] / k_node[[n_node - 1]];
            node_index.push((frac * (nk - 1) as f64).round() as usize);
        }
        node_index.push(nk - 1);
        let mut k_dist = Array1::<f64>::zeros(nk);
        let mut k_vec = Array2::<f64>::zeros((nk, dim));
        k_vec.row_mut(0).assign(&path.row(0));
        for n in 1..n_node {
            let (n_i, n_f) = (node_index[n - 1], node_index[n]);
            let (kd_i, kd_f) = (k_node[[n - 1]], k_node[[n]]);
            let k_i = path.row(n - 1);
            let k_f = path.row(n);
            for j in n_i..n_f + 1 {
                let frac = if n_f > n_i { (j - n_i) as f64 / (n_f - n_i) as f64 } else { 0.0 };
                k_dist[[j]] = kd_i + frac * (kd_f - kd_i);
                k_vec.row_mut(j).assign(&(&k_i * (1.0 - frac) + &k_f * frac));
            }
        }
        Ok((k_vec, k_dist, k_node))
    }

    #[allow(non_snake_case)]
    pub fn dos(
        &self,
        k_mesh: &Array1<usize>,
        E_min: f64,
        E_max: f64,
        E_n: usize,
        sigma: f64,
    ) -> Result<(Array1<f64>, Array1<f64>)> {
        //! 高斯展宽的态密度
        //! $$\rho(\ve)=\f{1}{N_k}\sum_{n\bm k}\f{1}{\sqrt{2\pi}\sigma}
        //! e^{-\f{(\ve_{n\bm k}-\ve)^2}{2\sigma^2}}$$
        let kvec = self.mesh(k_mesh)?;
        let nk = kvec.nrows();
        info!("dos: {} k-points, {} energies", nk, E_n);
        let band = self.solve_band_all_parallel(&kvec)?;
        let E = Array1::linspace(E_min, E_max, E_n);
        let centre = band.into_raw_vec_and_offset().0.into_par_iter();
        let dos = centre
            .fold(
                || Array1::<f64>::zeros(E_n),
                |acc, x| acc + &E.mapv(|e| gauss(e - x, sigma)),
            )
            .reduce(|| Array1::<f64>::zeros(E_n), |acc, x| acc + x);
        Ok((E, dos / nk as f64))
    }

    /// k-mesh of the Hamiltonian's dimensionality; a single point for 0-D systems.
    pub(crate) fn mesh(&self, k_mesh: &Array1<usize>) -> Result<Array2<f64>> {
        if self.dimensionality == 0 {
            return Ok(Array2::zeros((1, 0)));
        }
        if k_mesh.len() != self.dimensionality {
            return Err(TbError::DimensionMismatch {
                context: "k-mesh length".to_string(),
                expected: self.dimensionality,
                found: k_mesh.len(),
            });
        }
        gen_kmesh(k_mesh)
    }

    fn all_energies(&self, nk: usize) -> Result<Vec<f64>> {
        let k_mesh = Array1::from_elem(self.dimensionality, nk);
        let band = self.solve_band_all_parallel(&self.mesh(&k_mesh)?)?;
        Ok(band.into_raw_vec_and_offset().0)
    }

    /// Indirect gap around zero energy on an `nk` mesh.
    pub fn get_gap(&self, nk: usize) -> Result<f64> {
        let e = self.all_energies(nk)?;
        let emin = e.iter().cloned().filter(|x| *x > 0.0).fold(f64::INFINITY, f64::min);
        let emax = e.iter().cloned().filter(|x| *x < 0.0).fold(f64::NEG_INFINITY, f64::max);
        debug!("gap edges: {} {}", emax, emin);
        Ok(emin - emax)
    }

    /// Energy leaving a fraction `filling` of all states below it.
    pub fn fermi_for_filling(&self, filling: f64, nk: usize) -> Result<f64> {
        let mut e = self.all_energies(nk)?;
        e.sort_by(|a, b| a.total_cmp(b));
        let n = e.len();
        if n < 2 {
            return Ok(e.first().cloned().unwrap_or(0.0));
        }
        let i = ((filling * n as f64).round() as usize).clamp(1, n - 1);
        Ok((e[i - 1] + e[i]) / 2.0)
    }

    #[allow(non_snake_case)]
    pub fn lowest_eigenvalues<S>(&self, kvec: &ArrayBase<S, Ix1>, n: usize) -> Result<Array1<f64>>
    where
        S: Data<Elem = f64>,
    {
        //! Lanczos 求 $H(\bm k)$ 最低的 n 个本征值, 哈密顿量只以稀疏形式参与矩阵-向量乘法.
        //!
        //! 每一步都对之前所有的 Lanczos 矢量做完全重正交化.
        let hk = self.gen_ham_sparse(kvec)?;
        let dim = self.dim();
        let n = n.min(dim);
        if n == 0 {
            return Ok(Array1::zeros(0));
        }
        let m = dim.min((4 * n).max(n + 40));
        let mut v0: Array1<Complex64> = (0..dim)
            .map(|i| Complex64::new(1.0 / ((i + 1) as f64).sqrt(), 0.0))
            .collect();
        let norm = v0.iter().map(|x| x.norm_sqr()).sum::<f64>().sqrt();
        v0.mapv_inplace(|x| x / norm);
        let mut V: Vec<Array1<Complex64>> = vec![v0];
        let mut alpha: Vec<f64> = Vec::new();
        let mut beta: Vec<f64> = Vec::new();
        for j in 0..m {
            let mut w = &hk * &V[j];
            let a = V[j].iter().zip(w.iter()).map(|(x, y)| x.conj() * y).sum::<Complex64>().re;
            alpha.push(a);
            for _ in 0..2 {
                for v in V.iter() {
                    let c: Complex64 = v.iter().zip(w.iter()).map(|(x, y)| x.conj() * y).sum();
                    w.scaled_add(-c, v);
                }
            }
            let b = w.iter().map(|x| x.norm_sqr()).sum::<f64>().sqrt();
            if j + 1 == m || b < 1e-12 {
                break;
            }
            beta.push(b);
            V.push(w.mapv(|x| x / b));
        }
        let size = alpha.len();
        let mut T = Array2::<f64>::zeros((size, size));
        for i in 0..size {
            T[[i, i]] = alpha[i];
            if i + 1 < size {
                T[[i, i + 1]] = beta[i];
                T[[i + 1, i]] = beta[i];
            }
        }
        debug!("lanczos: {} steps for dimension {}", size, dim);
        let evals = T.eigvalsh(UPLO::Lower)?;
        Ok(evals.slice(s![..n.min(size)]).to_owned())
    }
}

fn stack_rows(rows: &[Array1<f64>], n: usize) -> Array2<f64> {
    let mut out = Array2::<f64>::zeros((rows.len(), n));
    for (mut a, r) in out.outer_iter_mut().zip(rows.iter()) {
        a.assign(r);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_models::{chain, qwz};
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use std::f64::consts::PI;

    #[test]
    fn eigenvectors_are_conjugated_rows() {
        let h = qwz(0.6);
        let k = array![0.2, 0.35];
        let (e, v) = h.solve_onek(&k).unwrap();
        let hk = h.gen_ham(&k).unwrap();
        for n in 0..2 {
            let psi = v.row(n).mapv(|x| x.conj());
            let hpsi = hk.dot(&psi);
            for i in 0..2 {
                assert_abs_diff_eq!((hpsi[i] - psi[i] * e[n]).norm(), 0.0, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn serial_and_parallel_bands_agree() {
        let h = qwz(1.3);
        let kvec = gen_kmesh(&array![6, 6]).unwrap();
        let a = h.solve_band_all(&kvec).unwrap();
        let b = h.solve_band_all_parallel(&kvec).unwrap();
        assert_eq!(a, b);
        let (band, vecs) = h.solve_all(&kvec).unwrap();
        assert_eq!(band, a);
        assert_eq!(vecs.shape(), &[36, 2, 2]);
    }

    #[test]
    fn k_path_hits_the_nodes() {
        let h = qwz(1.0);
        let path = array![[0.0, 0.0], [0.5, 0.0], [0.5, 0.5]];
        let (kvec, kdist, knode) = h.k_path(&path, 21).unwrap();
        assert_eq!(kvec.row(20).to_vec(), vec![0.5, 0.5]);
        assert_abs_diff_eq!(knode[2], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(kdist[20], 1.0, epsilon = 1e-12);
        assert_eq!(kvec.row(10).to_vec(), vec![0.5, 0.0]);
    }

    #[test]
    fn dos_is_normalized() {
        let h = qwz(1.0);
        let (e, dos) = h.dos(&array![10, 10], -5.0, 5.0, 2001, 0.1).unwrap();
        let de = e[1] - e[0];
        assert_abs_diff_eq!(dos.sum() * de, 2.0, epsilon = 1e-3);
    }

    #[test]
    fn gap_and_fermi_level() {
        // QWZ at m = 3: bands ±|d(k)|, smallest |d| = 1 at k = (1/2, 1/2)
        let h = qwz(3.0);
        assert_abs_diff_eq!(h.get_gap(10).unwrap(), 2.0, epsilon = 1e-10);
        assert_abs_diff_eq!(h.fermi_for_filling(0.5, 10).unwrap(), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn lanczos_on_an_open_chain() {
        let n = 12;
        let t = 1.0;
        let mut h = chain(n, t);
        h.set_finite_system(false).unwrap();
        h.turn_sparse().unwrap();
        let e = h.lowest_eigenvalues(&Array1::<f64>::zeros(0), 3).unwrap();
        for j in 0..3 {
            let exact = -2.0 * t * (PI * (j + 1) as f64 / (n + 1) as f64).cos();
            assert_abs_diff_eq!(e[j], exact, epsilon = 1e-8);
        }
    }

    #[test]
    fn window_solver_counts_states() {
        let mut h = chain(10, 1.0);
        h.set_finite_system(false).unwrap();
        let all = h.solve_band_onek(&Array1::<f64>::zeros(0)).unwrap();
        let inside = all.iter().filter(|x| x.abs() < 1.0).count();
        let w = h.eigvalsh_window(&Array1::<f64>::zeros(0), (-1.0, 1.0)).unwrap();
        assert_eq!(w.len(), inside);
    }
}
