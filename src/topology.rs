//! 拓扑不变量: 贝利曲率, 陈数, 自旋陈数, $Z_2$ 以及实空间陈数标记.
//!
//! 所有的波函数都按 [`Hamiltonian::solve_onek`] 的约定按行储存, 每一行是本征矢的复共轭.
//! 占据态就是能量小于零的态.
use crate::dof::full_to_profile;
use crate::error::{Result, TbError};
use crate::geometry::Geometry;
use crate::integrate::adapted_integrate_quick;
use crate::io::write_txt;
use crate::kpoints::{gen_kmesh, gen_krange};
use crate::math::{anti_comm, comm, dagger};
use crate::operators::Operator;
use crate::{DofMode, Hamiltonian};
use log::{debug, info, warn};
use ndarray::parallel::prelude::*;
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2, arr1, s};
use ndarray_linalg::{Determinant, EigVals, SVD};
use num_complex::Complex64;
use std::f64::consts::PI;

/// Plaquette half-size used inside the adaptive quadrature.
const PRECISE_DK: f64 = 1e-3;

/// $M_{ij}=\braket{\psi_i}{\psi_j'}$ up to conjugation, with rows of `w1`, `w2` as stored.
pub fn overlap_matrix<S1, S2>(
    w1: &ArrayBase<S1, Ix2>,
    w2: &ArrayBase<S2, Ix2>,
) -> Array2<Complex64>
where
    S1: Data<Elem = Complex64>,
    S2: Data<Elem = Complex64>,
{
    w1.mapv(|x| x.conj()).dot(&w2.t())
}

fn det_phase(m: &Array2<Complex64>) -> Result<Complex64> {
    if m.nrows() == 0 {
        return Ok(Complex64::new(1.0, 0.0));
    }
    Ok(m.det()?)
}

#[allow(non_snake_case)]
pub fn smooth_gauge<S1, S2>(
    w_prev: &ArrayBase<S1, Ix2>,
    w_next: &ArrayBase<S2, Ix2>,
) -> Result<Array2<Complex64>>
where
    S1: Data<Elem = Complex64>,
    S2: Data<Elem = Complex64>,
{
    //! 把 `w_next` 在占据态子空间里转动, 使它和 `w_prev` 的交叠矩阵厄米且半正定.
    //!
    //! 设 $M=U\Sigma V^\dagger$, 取 $R=(UV^\dagger)^\dagger$, 新的波函数为 $R^T w$.
    if w_prev.nrows() != w_next.nrows() {
        return Err(TbError::DimensionMismatch {
            context: "smooth_gauge occupied states".to_string(),
            expected: w_prev.nrows(),
            found: w_next.nrows(),
        });
    }
    if w_prev.nrows() == 0 {
        return Ok(w_next.to_owned());
    }
    let M = overlap_matrix(w_prev, w_next);
    let (U, _, Vh) = M.svd(true, true)?;
    let (U, Vh) = match (U, Vh) {
        (Some(U), Some(Vh)) => (U, Vh),
        _ => {
            return Err(TbError::Lapack {
                routine: "zgesvd",
                info: -1,
            });
        }
    };
    let R = dagger(&U.dot(&Vh));
    Ok(R.t().dot(w_next))
}

/// $i\sigma_y K$ on one stored row, spin index fastest.
fn time_reversed_row<S>(row: &ArrayBase<S, Ix1>) -> Array1<Complex64>
where
    S: Data<Elem = Complex64>,
{
    let mut out = Array1::<Complex64>::zeros(row.len());
    for i in 0..row.len() / 2 {
        out[2 * i] = row[2 * i + 1].conj();
        out[2 * i + 1] = -row[2 * i].conj();
    }
    out
}

fn check_nk(nk: usize) -> Result<()> {
    if nk == 0 {
        return Err(TbError::EmptyKMesh { k_mesh: vec![0, 0] });
    }
    Ok(())
}

/// Area per site of a finite flake, $\pi r_c/N(r<r_c)$ with $r_c$ a third of the largest
/// squared distance from the centroid.
fn area_per_site(g: &Geometry) -> f64 {
    let (x, y) = (g.x(), g.y());
    let n = x.len();
    if n == 0 {
        return 1.0;
    }
    let (cx, cy) = (x.sum() / n as f64, y.sum() / n as f64);
    let dr: Vec<f64> = x
        .iter()
        .zip(y.iter())
        .map(|(a, b)| (a - cx).powi(2) + (b - cy).powi(2))
        .collect();
    let rcut = dr.iter().fold(0.0_f64, |acc, d| acc.max(*d)) / 3.0;
    let count = dr.iter().filter(|d| **d < rcut).count();
    if rcut <= 0.0 || count == 0 {
        warn!("real_space_chern: flake too small to estimate the area per site, using 1");
        return 1.0;
    }
    PI * rcut / count as f64
}

impl Hamiltonian {
    /// Rows are the occupied ($E<0$) conjugated eigenvectors at `k`.
    pub fn occupied_states<S>(&self, kvec: &ArrayBase<S, Ix1>) -> Result<Array2<Complex64>>
    where
        S: Data<Elem = f64>,
    {
        let (eval, evec) = self.solve_onek(kvec)?;
        let occ: Vec<usize> = eval
            .iter()
            .enumerate()
            .filter(|(_, e)| **e < 0.0)
            .map(|(i, _)| i)
            .collect();
        Ok(evec.select(Axis(0), &occ))
    }

    #[allow(non_snake_case)]
    pub fn berry_curvature<S>(&self, kvec: &ArrayBase<S, Ix1>, dk: f64) -> Result<f64>
    where
        S: Data<Elem = f64>,
    {
        //! 用一个边长为 $2\dd k$ 的小方格上的 Wilson loop 计算贝利曲率
        //!
        //! $$\Omega(\bm k)=\f{1}{4\dd k^2}\arg\prod_{\square}\det M_{\bm k_i,\bm k_{i+1}}$$
        //!
        //! 四个角依次为 $\bm k-\dd x-\dd y$, $\bm k+\dd x-\dd y$, $\bm k+\dd x+\dd y$,
        //! $\bm k-\dd x+\dd y$.
        self.require_dimensionality(&[2])?;
        if kvec.len() < 2 {
            return Err(TbError::DimensionMismatch {
                context: "berry_curvature k-vector".to_string(),
                expected: 2,
                found: kvec.len(),
            });
        }
        let (kx, ky) = (kvec[0], kvec[1]);
        let corners = [
            [kx - dk, ky - dk],
            [kx + dk, ky - dk],
            [kx + dk, ky + dk],
            [kx - dk, ky + dk],
        ];
        let mut w = Vec::with_capacity(4);
        for c in corners.iter() {
            w.push(self.occupied_states(&arr1(c))?);
        }
        let nocc = w[0].nrows();
        if w.iter().any(|x| x.nrows() != nocc) {
            warn!("occupied states change across the plaquette at k = ({}, {})", kx, ky);
            return Ok(0.0);
        }
        let mut product = Complex64::new(1.0, 0.0);
        for i in 0..4 {
            product *= det_phase(&overlap_matrix(&w[i], &w[(i + 1) % 4]))?;
        }
        if product.norm() < 1e-10 {
            warn!("vanishing plaquette overlap at k = ({}, {})", kx, ky);
        }
        Ok(product.arg() / (4.0 * dk * dk))
    }

    pub fn berry_curvature_list<S>(&self, kvec: &ArrayBase<S, Ix2>, dk: f64) -> Result<Array1<f64>>
    where
        S: Data<Elem = f64>,
    {
        kvec.outer_iter().map(|k| self.berry_curvature(&k, dk)).collect()
    }

    /// Berry curvature on the `nk x nk` mesh, evaluated in parallel.
    pub fn berry_map(&self, nk: usize, dk: f64) -> Result<(Array2<f64>, Array1<f64>)> {
        self.require_dimensionality(&[2])?;
        check_nk(nk)?;
        let kvec = gen_kmesh(&arr1(&[nk, nk]))?;
        let omega: Vec<f64> = kvec
            .axis_iter(Axis(0))
            .into_par_iter()
            .map(|k| self.berry_curvature(&k, dk))
            .collect::<Result<_>>()?;
        Ok((kvec, Array1::from_vec(omega)))
    }

    /// Writes `kx ky berry_curvature` per mesh point.
    pub fn write_berry(&self, nk: usize, dk: f64, path: &str) -> Result<()> {
        let (kvec, omega) = self.berry_map(nk, dk)?;
        write_txt(&kmap_table(&kvec, &omega), path)
    }

    #[allow(non_snake_case)]
    pub fn chern(&self, nk: usize, dk: Option<f64>) -> Result<f64> {
        //! 格点求和 $C=\f{1}{2\pi N_k^2}\sum_{\bm k}\Omega(\bm k)$.
        //!
        //! 默认 $\dd k=1/(2N_k)$, 这时小方格正好铺满布里渊区, 结果是整数.
        check_nk(nk)?;
        let dk = dk.unwrap_or(1.0 / (2.0 * nk as f64));
        info!("chern: {}x{} mesh, dk = {}", nk, nk, dk);
        let (_, omega) = self.berry_map(nk, dk)?;
        let c = omega.sum() / (2.0 * PI * (nk * nk) as f64);
        info!("chern: C = {}", c);
        Ok(c)
    }

    /// Chern number by adaptive quadrature of the curvature over the `nk x nk` cells.
    pub fn precise_chern(&self, nk: usize, re_err: f64, ab_err: f64) -> Result<f64> {
        self.require_dimensionality(&[2])?;
        info!("precise_chern: {}x{} cells", nk, nk);
        let f = |k: &Array1<f64>| self.berry_curvature(k, PRECISE_DK);
        let c = self.integrate_cells(&f, nk, re_err, ab_err)? / (2.0 * PI);
        info!("precise_chern: C = {}", c);
        Ok(c)
    }

    fn integrate_cells<F>(&self, f: &F, nk: usize, re_err: f64, ab_err: f64) -> Result<f64>
    where
        F: Fn(&Array1<f64>) -> Result<f64> + Sync,
    {
        let k_range = gen_krange(&arr1(&[nk, nk]))?;
        let ncell = k_range.len_of(Axis(0)) as f64;
        let parts: Vec<f64> = k_range
            .axis_iter(Axis(0))
            .into_par_iter()
            .map(|cell| adapted_integrate_quick(f, &cell.to_owned(), re_err, ab_err / ncell))
            .collect::<Result<_>>()?;
        Ok(parts.iter().sum())
    }

    #[allow(non_snake_case)]
    pub fn operator_berry_curvature<S>(
        &self,
        kvec: &ArrayBase<S, Ix1>,
        op: Operator,
        delta: f64,
    ) -> Result<f64>
    where
        S: Data<Elem = f64>,
    {
        //! Kubo 形式的算符加权贝利曲率
        //!
        //! $$\Omega^O=-2\text{Im}\sum_{n\in occ}\sum_{m\notin occ}
        //! \f{\bra{n}\f{O\p_x H+\p_x H O}{2}\ket{m}\bra{m}\p_y H\ket{n}}{(E_n-E_m)^2+\delta^2}$$
        //!
        //! $O=1$ 时和 [`Hamiltonian::berry_curvature`] 一致.
        self.require_dimensionality(&[2])?;
        let (eval, evec) = self.solve_onek(kvec)?;
        let o = self.get_operator(op)?.to_dense();
        let vx = self.dhdk(kvec, 0)?;
        let vy = self.dhdk(kvec, 1)?;
        let vx = anti_comm(&o, &vx).mapv(|x| x * 0.5);
        let evec_dag = dagger(&evec);
        let A_x = evec.dot(&vx).dot(&evec_dag);
        let A_y = evec.dot(&vy).dot(&evec_dag);
        let mut omega = 0.0;
        for (n, en) in eval.iter().enumerate().filter(|(_, e)| **e < 0.0) {
            for (m, em) in eval.iter().enumerate().filter(|(_, e)| **e >= 0.0) {
                let de = en - em;
                omega += (A_x[[n, m]] * A_y[[m, n]]).im / (de * de + delta * delta);
            }
        }
        Ok(-2.0 * omega)
    }

    fn spin_map(&self, nk: usize, delta: f64) -> Result<(Array2<f64>, Array1<f64>)> {
        self.require_dimensionality(&[2])?;
        check_nk(nk)?;
        let kvec = gen_kmesh(&arr1(&[nk, nk]))?;
        let omega: Vec<f64> = kvec
            .axis_iter(Axis(0))
            .into_par_iter()
            .map(|k| self.operator_berry_curvature(&k, Operator::Sz, delta))
            .collect::<Result<_>>()?;
        Ok((kvec, Array1::from_vec(omega)))
    }

    /// $\f{1}{2\pi}\int\Omega^{s_z}$ as a sum over the `nk x nk` mesh, Kubo broadening `delta`.
    pub fn spin_chern(&self, nk: usize, delta: f64) -> Result<f64> {
        info!("spin_chern: {}x{} mesh, delta = {}", nk, nk, delta);
        let (_, omega) = self.spin_map(nk, delta)?;
        Ok(omega.sum() / (2.0 * PI * (nk * nk) as f64))
    }

    pub fn precise_spin_chern(
        &self,
        nk: usize,
        delta: f64,
        re_err: f64,
        ab_err: f64,
    ) -> Result<f64> {
        self.require_dimensionality(&[2])?;
        self.get_operator(Operator::Sz)?;
        let f = |k: &Array1<f64>| self.operator_berry_curvature(k, Operator::Sz, delta);
        Ok(self.integrate_cells(&f, nk, re_err, ab_err)? / (2.0 * PI))
    }

    /// Writes `kx ky spin_berry_curvature` per mesh point.
    pub fn write_spin_berry(&self, nk: usize, delta: f64, path: &str) -> Result<()> {
        let (kvec, omega) = self.spin_map(nk, delta)?;
        write_txt(&kmap_table(&kvec, &omega), path)
    }

    /// Time-reversed partners $i\sigma_y K$ of the rows of `w`.
    fn time_reversed(&self, w: &Array2<Complex64>) -> Result<Array2<Complex64>> {
        if self.mode != DofMode::Spinful {
            return Err(TbError::InvalidDofMode {
                operation: "time reversal",
                mode: self.mode,
            });
        }
        let mut out = Array2::<Complex64>::zeros(w.raw_dim());
        for (mut o, row) in out.outer_iter_mut().zip(w.outer_iter()) {
            o.assign(&time_reversed_row(&row));
        }
        Ok(out)
    }

    fn kramers_pairs(&self, w: &Array2<Complex64>) -> Result<Array2<Complex64>> {
        //! 在时间反演不变点把占据态重新组合成 Kramers 对 $(\psi,\Theta\psi)$, 使两端的规范
        //! 由时间反演联系起来.
        let nocc = w.nrows();
        let mut rows: Vec<Array1<Complex64>> = Vec::with_capacity(nocc);
        for cand in w.outer_iter() {
            if rows.len() >= nocc {
                break;
            }
            let mut v = cand.to_owned();
            for u in rows.iter() {
                let c: Complex64 = u.iter().zip(v.iter()).map(|(a, b)| a.conj() * b).sum();
                v.scaled_add(-c, u);
            }
            let norm = v.iter().map(|x| x.norm_sqr()).sum::<f64>().sqrt();
            if norm < 1e-6 {
                continue;
            }
            v.mapv_inplace(|x| x / norm);
            let partner = time_reversed_row(&v);
            rows.push(v);
            rows.push(partner);
        }
        if rows.len() != nocc {
            return Err(TbError::DimensionMismatch {
                context: "kramers pairs at a time-reversal invariant momentum".to_string(),
                expected: nocc,
                found: rows.len(),
            });
        }
        let mut out = Array2::<Complex64>::zeros((nocc, w.ncols()));
        for (mut o, r) in out.outer_iter_mut().zip(rows.iter()) {
            o.assign(r);
        }
        Ok(out)
    }

    #[allow(non_snake_case)]
    pub fn z2_invariant(&self, nk: usize) -> Result<f64> {
        //! 时间反演路径方法
        //!
        //! 在半个布里渊区 $k_x\in[-1/2,1/2]$, $k_y\in[0,1/2]$ 上做 Fukui-Hatsugai 格点计算.
        //! 两条时间反演不变线 $k_y=0,1/2$ 上 $k_x<0$ 的态取 $k_x>0$ 的时间反演partner,
        //! $k_x=0,1/2$ 处的态先组合成 Kramers 对, 这样整条线的规范都由时间反演固定.
        //! 两条竖边互相抵消. 边界幅角减去半个布里渊区的贝利通量, 除以 $4\pi$ 后对 1 取模,
        //! 拓扑相为 1/2, 平庸相为 0.
        //!
        //! `nk` 取成偶数, 需要自旋自由度.
        self.require_dimensionality(&[2])?;
        if self.mode != DofMode::Spinful {
            return Err(TbError::InvalidDofMode {
                operation: "z2_invariant",
                mode: self.mode,
            });
        }
        check_nk(nk)?;
        let half = nk.div_ceil(2);
        let nk = 2 * half;
        info!("z2_invariant: path with {} points per line", nk);
        let line = |ky: f64| -> Result<f64> {
            let mut pos = Vec::with_capacity(half + 1);
            for i in 0..=half {
                let w = self.occupied_states(&arr1(&[i as f64 / nk as f64, ky]))?;
                pos.push(if i == 0 || i == half {
                    self.kramers_pairs(&w)?
                } else {
                    w
                });
            }
            let mut states = Vec::with_capacity(nk + 1);
            states.push(pos[half].clone());
            for j in 1..half {
                states.push(self.time_reversed(&pos[half - j])?);
            }
            states.extend(pos);
            let mut phase = 0.0;
            for pair in states.windows(2) {
                if pair[0].nrows() != pair[1].nrows() {
                    return Err(TbError::DimensionMismatch {
                        context: "z2_invariant occupied states".to_string(),
                        expected: pair[0].nrows(),
                        found: pair[1].nrows(),
                    });
                }
                phase += det_phase(&overlap_matrix(&pair[0], &pair[1]))?.arg();
            }
            Ok(phase)
        };
        let boundary = line(0.0)? - line(0.5)?;
        let dk = 1.0 / (2.0 * nk as f64);
        let mut flux = 0.0;
        for i in 0..nk {
            for j in 0..half {
                let kx = (i as f64 + 0.5) / nk as f64 - 0.5;
                let ky = (j as f64 + 0.5) / nk as f64;
                flux += self.berry_curvature(&arr1(&[kx, ky]), dk)? * 4.0 * dk * dk;
            }
        }
        let raw = ((boundary - flux) / (4.0 * PI)).rem_euclid(1.0);
        let z2 = if (raw - 0.5).abs() < raw.min(1.0 - raw) {
            0.5
        } else {
            0.0
        };
        if (raw - z2).abs().min(1.0 - (raw - z2).abs()) > 0.1 {
            warn!("z2_invariant: raw value {} is far from 0 and 1/2", raw);
        }
        info!("z2_invariant: boundary {} flux {} -> {} ({})", boundary, flux, z2, raw);
        Ok(z2)
    }

    #[allow(non_snake_case)]
    pub fn wannier_center_flow(&self, nt: usize, nk: usize) -> Result<Array2<f64>> {
        //! 混合 Wannier 中心随 $t=k_y\in[0,1/2]$ 的演化
        //!
        //! 对每个 $t$ 沿 $k_x$ 走一圈, 相邻 k 点之间用 [`smooth_gauge`] 固定规范, 然后求
        //! Wilson loop $W=\prod_j M_{j,j+1}$ 的本征值, 其幅角就是 Wannier 中心. 每个 $t$ 的起点
        //! 也相对上一个 $t$ 做规范平滑, 所以整个计算是一个按顺序的折叠.
        //!
        //! 返回的每一行是 `t phase_1 phase_2 ...`, 相位从小到大排好.
        self.require_dimensionality(&[2])?;
        check_nk(nk)?;
        let nt = nt.max(2);
        info!("wannier_center_flow: {} t-slices, {} k-points", nt, nk);
        let mut rows: Vec<Vec<f64>> = Vec::with_capacity(nt);
        let mut w_start: Option<Array2<Complex64>> = None;
        for it in 0..nt {
            let t = 0.5 * it as f64 / (nt - 1) as f64;
            let first = self.occupied_states(&arr1(&[0.0, t]))?;
            let first = match &w_start {
                Some(prev) => smooth_gauge(prev, &first)?,
                None => first,
            };
            let nocc = first.nrows();
            let mut W = Array2::<Complex64>::eye(nocc);
            let mut w = first.clone();
            for j in 1..=nk {
                let w_next = if j == nk {
                    first.clone()
                } else {
                    let w_j = self.occupied_states(&arr1(&[j as f64 / nk as f64, t]))?;
                    smooth_gauge(&w, &w_j)?
                };
                if w_next.nrows() != nocc {
                    return Err(TbError::DimensionMismatch {
                        context: "wannier_center_flow occupied states".to_string(),
                        expected: nocc,
                        found: w_next.nrows(),
                    });
                }
                let O = overlap_matrix(&w, &w_next);
                let (U, _, Vh) = O.svd(true, true)?;
                if let (Some(U), Some(Vh)) = (U, Vh) {
                    W = W.dot(&U.dot(&Vh));
                }
                w = w_next;
            }
            let mut phases: Vec<f64> = if nocc == 0 {
                Vec::new()
            } else {
                W.eigvals()?.iter().map(|x| -x.arg()).collect()
            };
            phases.sort_by(|a, b| a.total_cmp(b));
            let mut row = vec![t];
            row.extend(phases);
            rows.push(row);
            w_start = Some(first);
        }
        let ncol = rows[0].len();
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        Array2::from_shape_vec((nt, ncol), flat).map_err(|_| TbError::DimensionMismatch {
            context: "wannier_center_flow table".to_string(),
            expected: ncol,
            found: 0,
        })
    }

    /// $Z_2$ (0 or 1) from the Wannier-center flow, optionally writing the flow to `path`.
    pub fn z2_vanderbilt(&self, nt: usize, nk: usize, path: Option<&str>) -> Result<usize> {
        let flow = self.wannier_center_flow(nt, nk)?;
        if let Some(path) = path {
            write_txt(&flow, path)?;
        }
        let z2 = z2_from_flow(&flow);
        info!("z2_vanderbilt: Z2 = {}", z2);
        Ok(z2)
    }

    #[allow(non_snake_case)]
    pub fn real_space_chern(
        &self,
        op: Option<Operator>,
        path: Option<&str>,
    ) -> Result<Array1<f64>> {
        //! 有限体系的局域陈数标记
        //! $$C(\bm r)=\f{2\pi}{A_c}\text{Im}\left[PXP,PYP\right]_{\bm r\bm r}$$
        //!
        //! 给定算符 $O$ 时, 记 $A=PXP$, $B=PYP$, 用对称化的
        //! $$C=\f{1}{2}\left[(AOB-BAO)+(ABO-BOA)\right]$$
        //! 代替对易子, $O$ 和 $H$ 对易时它就是 $[A,B]O$.
        //! $A_c$ 是每个格点的面积, 用离几何中心 $r^2<r_c$ 的格点数估计,
        //! $r_c$ 取最大 $r^2$ 的三分之一.
        //! 自旋和电子-空穴分量先求和再按格点输出.
        self.require_dimensionality(&[0])?;
        let (eval, evec) = self.solve_onek(&Array1::<f64>::zeros(0))?;
        let occ: Vec<usize> = eval
            .iter()
            .enumerate()
            .filter(|(_, e)| **e < 0.0)
            .map(|(i, _)| i)
            .collect();
        let w = evec.select(Axis(0), &occ);
        let P = dagger(&w).dot(&w);
        let X = self.get_operator(Operator::XPosition)?.to_dense();
        let Y = self.get_operator(Operator::YPosition)?.to_dense();
        let A = P.dot(&X).dot(&P);
        let B = P.dot(&Y).dot(&P);
        let C = match op {
            Some(op) => {
                let O = self.get_operator(op)?.to_dense();
                let C1 = A.dot(&O).dot(&B) - B.dot(&A).dot(&O);
                let C2 = A.dot(&B).dot(&O) - B.dot(&O).dot(&A);
                (C1 + C2).mapv(|x| x * 0.5)
            }
            None => comm(&A, &B),
        };
        let area = area_per_site(self.geometry_ref()?);
        let full = C.diag().mapv(|x| 2.0 * PI * x.im / area);
        let profile = full_to_profile(self.mode, &full, self.nsites())?;
        debug!("real_space_chern: area per site {}, total {}", area, profile.sum());
        if let Some(path) = path {
            self.geometry_ref()?.write_profile(&profile, path)?;
        }
        Ok(profile)
    }
}

fn kmap_table(kvec: &Array2<f64>, omega: &Array1<f64>) -> Array2<f64> {
    let mut table = Array2::<f64>::zeros((kvec.nrows(), 3));
    table.slice_mut(s![.., 0..2]).assign(kvec);
    table.column_mut(2).assign(omega);
    table
}

/// Largest-gap readout of a Wannier-center flow table (`t phase_1 ...` per row).
pub fn z2_from_flow(flow: &Array2<f64>) -> usize {
    let centers: Vec<Vec<f64>> = flow
        .outer_iter()
        .map(|row| row.iter().skip(1).map(|p| (p / (2.0 * PI)).rem_euclid(1.0)).collect())
        .collect();
    let gaps: Vec<f64> = centers.iter().map(|x| largest_gap_midpoint(x)).collect();
    let sin = |x: f64| (2.0 * PI * x).sin();
    let sg = |z: f64, zp: f64, x: f64| -> f64 {
        if zp == x {
            -1.0
        } else {
            1.0_f64.copysign(sin(zp - z) + sin(x - zp) + sin(z - x))
        }
    };
    let mut sign = 1.0;
    for i in 0..centers.len().saturating_sub(1) {
        for x in centers[i + 1].iter() {
            sign *= sg(gaps[i], gaps[i + 1], *x);
        }
    }
    if sign < 0.0 { 1 } else { 0 }
}

fn largest_gap_midpoint(x: &[f64]) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    let mut xs = x.to_vec();
    xs.sort_by(|a, b| a.total_cmp(b));
    let n = xs.len();
    let mut best = -1.0;
    let mut mid = 0.0;
    for a in 0..n {
        let lo = xs[a];
        let hi = if a + 1 == n { xs[0] + 1.0 } else { xs[a + 1] };
        if hi - lo > best {
            best = hi - lo;
            mid = ((lo + hi) / 2.0).rem_euclid(1.0);
        }
    }
    mid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_models::{bhz, haldane, haldane_hopping, qwz};
    use crate::HamiltonianConfig;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use ndarray::array;

    #[test]
    fn qwz_chern_lattice_sum_is_an_integer() {
        let _ = env_logger::builder().is_test(true).try_init();
        let c = qwz(1.0).chern(20, None).unwrap();
        assert_abs_diff_eq!(c.abs(), 1.0, epsilon = 1e-8);
        let c_triv = qwz(3.0).chern(20, None).unwrap();
        assert_abs_diff_eq!(c_triv, 0.0, epsilon = 1e-8);
        let c_neg = qwz(-1.0).chern(20, None).unwrap();
        assert_abs_diff_eq!(c + c_neg, 0.0, epsilon = 1e-8);
    }

    #[test]
    fn haldane_lattice_and_quadrature_agree() {
        let h = haldane(0.3);
        let c_lattice = h.chern(20, None).unwrap();
        let c_precise = h.precise_chern(4, 1e-3, 1e-3).unwrap();
        assert_eq!(c_lattice.round().abs(), 1.0);
        assert!((c_lattice - c_precise).abs() < 0.05);
    }

    #[test]
    fn curvature_is_stable_under_plaquette_refinement() {
        let h = qwz(1.0);
        let k = array![0.11, 0.23];
        let a = h.berry_curvature(&k, 1e-3).unwrap();
        let b = h.berry_curvature(&k, 5e-4).unwrap();
        assert_relative_eq!(a, b, max_relative = 1e-3);
        let list = h.berry_curvature_list(&array![[0.11, 0.23], [0.4, 0.1]], 1e-3).unwrap();
        assert_eq!(list[0], a);
    }

    #[test]
    fn kubo_curvature_matches_the_plaquette() {
        let h = haldane(0.3);
        let k = array![0.17, 0.31];
        let a = h.berry_curvature(&k, 1e-4).unwrap();
        let mut hs = h.clone();
        hs.turn_spinful(false).unwrap();
        let b = h.operator_berry_curvature(&k, Operator::Identity, 0.0).unwrap();
        assert_relative_eq!(a, b, max_relative = 1e-3);
        let s = hs.operator_berry_curvature(&k, Operator::Sz, 0.0).unwrap();
        assert_abs_diff_eq!(s, 0.0, epsilon = 1e-8);
    }

    #[test]
    fn bhz_spin_chern_is_two() {
        let h = bhz(1.0);
        let cs = h.spin_chern(30, 1e-8).unwrap();
        assert_abs_diff_eq!(cs.abs(), 2.0, epsilon = 1e-2);
        let c = h.chern(20, None).unwrap();
        assert_abs_diff_eq!(c, 0.0, epsilon = 1e-8);
    }

    #[test]
    fn smooth_gauge_makes_the_overlap_hermitian() {
        let h = bhz(1.0);
        let w1 = h.occupied_states(&array![0.1, 0.2]).unwrap();
        let w2 = h.occupied_states(&array![0.13, 0.2]).unwrap();
        let w2 = w2.mapv(|x| x * Complex64::new(0.0, 1.0).exp());
        let w2s = smooth_gauge(&w1, &w2).unwrap();
        let m = overlap_matrix(&w1, &w2s);
        for i in 0..m.nrows() {
            assert!(m[[i, i]].re > 0.0);
            for j in 0..m.ncols() {
                assert_abs_diff_eq!((m[[i, j]] - m[[j, i]].conj()).norm(), 0.0, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn wannier_flow_z2() {
        let _ = env_logger::builder().is_test(true).try_init();
        assert_eq!(bhz(1.0).z2_vanderbilt(21, 40, None).unwrap(), 1);
        assert_eq!(bhz(3.0).z2_vanderbilt(21, 40, None).unwrap(), 0);
    }

    #[test]
    fn wannier_centers_are_kramers_degenerate_at_t0() {
        let flow = bhz(1.0).wannier_center_flow(5, 40).unwrap();
        assert_eq!(flow.shape(), &[5, 3]);
        let x: Vec<f64> = flow
            .row(0)
            .iter()
            .skip(1)
            .map(|p| (p / (2.0 * PI)).rem_euclid(1.0))
            .collect();
        let d = (x[0] - x[1]).rem_euclid(1.0);
        assert!(d.min(1.0 - d) < 1e-6);
    }

    #[test]
    fn wannier_centers_file_has_one_row_per_t() {
        let path = std::env::temp_dir().join("rustb_topo_WANNIER_CENTERS.OUT");
        let path = path.to_str().unwrap();
        bhz(1.0).z2_vanderbilt(6, 20, Some(path)).unwrap();
        let s = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = s.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0].split_whitespace().count(), 3);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn berry_curvature_file_columns() {
        let path = std::env::temp_dir().join("rustb_topo_BERRY_CURVATURE.OUT");
        let path = path.to_str().unwrap();
        qwz(1.0).write_berry(5, 0.1, path).unwrap();
        let s = std::fs::read_to_string(path).unwrap();
        assert_eq!(s.lines().count(), 25);
        assert!(s.lines().all(|l| l.split_whitespace().count() == 3));
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn path_z2_vanishes_in_the_atomic_limit() {
        let mut h = Hamiltonian::new(2, 2, DofMode::Spinful, false).unwrap();
        h.add_onsite_profile(&[-1.0, 1.0]).unwrap();
        assert_eq!(h.z2_invariant(8).unwrap(), 0.0);
        let mut nambu = h.clone();
        nambu.turn_nambu().unwrap();
        assert!(matches!(nambu.z2_invariant(8), Err(TbError::InvalidDofMode { .. })));
        assert!(matches!(qwz(1.0).z2_invariant(8), Err(TbError::InvalidDofMode { .. })));
    }

    #[test]
    fn path_z2_is_stable_across_meshes() {
        let _ = env_logger::builder().is_test(true).try_init();
        for nk in [4, 6, 8, 10, 12] {
            assert_eq!(bhz(1.0).z2_invariant(nk).unwrap(), 0.5, "nk = {}", nk);
            assert_eq!(bhz(-1.0).z2_invariant(nk).unwrap(), 0.5, "nk = {}", nk);
            assert_eq!(bhz(3.0).z2_invariant(nk).unwrap(), 0.0, "nk = {}", nk);
        }
        // odd meshes are rounded up to the next even one
        assert_eq!(bhz(0.5).z2_invariant(7).unwrap(), 0.5);
    }

    #[test]
    fn kramers_pairs_span_the_occupied_space() {
        let h = bhz(1.0);
        let w = h.occupied_states(&array![0.0, 0.0]).unwrap();
        let p = h.kramers_pairs(&w).unwrap();
        assert_eq!(p.shape(), w.shape());
        let partner = h.time_reversed(&p.slice(s![0..1, ..]).to_owned()).unwrap();
        assert_abs_diff_eq!((&partner.row(0) - &p.row(1)).mapv(|x| x.norm()).sum(), 0.0);
        let m = overlap_matrix(&w, &p);
        assert_abs_diff_eq!(m.det().unwrap().norm(), 1.0, epsilon = 1e-10);
    }

    #[test]
    fn empty_mesh_is_rejected() {
        let h = qwz(1.0);
        assert!(matches!(h.chern(0, None), Err(TbError::EmptyKMesh { .. })));
        assert!(matches!(h.berry_map(0, 0.1), Err(TbError::EmptyKMesh { .. })));
        assert!(matches!(h.precise_chern(0, 1e-3, 1e-3), Err(TbError::EmptyKMesh { .. })));
        let b = bhz(1.0);
        assert!(matches!(b.spin_chern(0, 1e-8), Err(TbError::EmptyKMesh { .. })));
        assert!(matches!(b.z2_invariant(0), Err(TbError::EmptyKMesh { .. })));
        assert!(matches!(b.wannier_center_flow(5, 0), Err(TbError::EmptyKMesh { .. })));
    }

    #[test]
    fn spin_chern_broadening_is_an_argument() {
        let h = bhz(1.0);
        let sharp = h.spin_chern(20, 1e-8).unwrap();
        let broad = h.spin_chern(20, 2.0).unwrap();
        assert_abs_diff_eq!(sharp.abs(), 2.0, epsilon = 2e-2);
        assert!(broad.abs() < 1.9, "broadened spin chern {}", broad);
        let path = std::env::temp_dir().join("rustb_topo_SPIN_BERRY_CURVATURE.OUT");
        let path = path.to_str().unwrap();
        h.write_spin_berry(4, 1e-8, path).unwrap();
        let s = std::fs::read_to_string(path).unwrap();
        assert_eq!(s.lines().count(), 16);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn invariants_need_two_dimensions() {
        let h = crate::test_models::chain(2, 1.0);
        assert!(matches!(
            h.chern(10, None),
            Err(TbError::InvalidDimension { dim: 1, .. })
        ));
    }

    fn flow_from_centers(centers: &[[f64; 2]]) -> Array2<f64> {
        let mut flow = Array2::<f64>::zeros((centers.len(), 3));
        for (i, c) in centers.iter().enumerate() {
            flow[[i, 0]] = 0.1 * i as f64;
            flow[[i, 1]] = 2.0 * PI * c[0];
            flow[[i, 2]] = 2.0 * PI * c[1];
        }
        flow
    }

    #[test]
    fn largest_gap_readout() {
        let static_pair = flow_from_centers(&[[0.1, 0.2], [0.1, 0.2], [0.1, 0.2]]);
        assert_eq!(z2_from_flow(&static_pair), 0);
        // partners leave 0 in opposite directions and meet again at 1/2
        let winding = flow_from_centers(&[
            [0.0, 0.0],
            [0.1, 0.9],
            [0.2, 0.8],
            [0.3, 0.7],
            [0.4, 0.6],
            [0.5, 0.5],
        ]);
        assert_eq!(z2_from_flow(&winding), 1);
    }

    fn haldane_flake(spinful: bool) -> (Geometry, Hamiltonian) {
        let g = Geometry::honeycomb_lattice().supercell(6);
        let cfg = HamiltonianConfig {
            is_multicell: true,
            ..Default::default()
        };
        let mut h = Hamiltonian::from_geometry(&g, &cfg).unwrap();
        h.add_hopping_matrix(|r1, r2| haldane_hopping(r1, r2, 0.3)).unwrap();
        if spinful {
            h.turn_spinful(true).unwrap();
        }
        h.set_finite_system(false).unwrap();
        (g, h)
    }

    #[test]
    fn real_space_marker_of_a_haldane_flake() {
        let (g, h) = haldane_flake(false);
        let path = std::env::temp_dir().join("rustb_topo_REAL_SPACE_CHERN.OUT");
        let path = path.to_str().unwrap();
        let c = h.real_space_chern(None, Some(path)).unwrap();
        assert_eq!(c.len(), 72);
        assert_abs_diff_eq!(c.sum(), 0.0, epsilon = 1e-8);
        let (cx, cy) = (g.x().mean().unwrap(), g.y().mean().unwrap());
        let centre = (0..72)
            .step_by(2)
            .min_by(|&i, &j| {
                let d = |n: usize| (g.r[[n, 0]] - cx).powi(2) + (g.r[[n, 1]] - cy).powi(2);
                d(i).total_cmp(&d(j))
            })
            .unwrap();
        let bulk = ((c[centre] + c[centre + 1]) / 2.0).abs();
        assert!(bulk > 0.5 && bulk < 1.5, "bulk marker {}", bulk);
        let s = std::fs::read_to_string(path).unwrap();
        assert_eq!(s.lines().count(), 72);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn spin_resolved_marker_of_a_time_reversal_flake() {
        let (_, bare) = haldane_flake(false);
        let (_, h) = haldane_flake(true);
        let c_bare = bare.real_space_chern(None, None).unwrap();
        let c_total = h.real_space_chern(None, None).unwrap();
        let c_sz = h.real_space_chern(Some(Operator::Sz), None).unwrap();
        assert_eq!(c_sz.len(), 72);
        for i in 0..72 {
            assert_abs_diff_eq!(c_total[i], 0.0, epsilon = 1e-8);
            assert_abs_diff_eq!(c_sz[i], 2.0 * c_bare[i], epsilon = 1e-8);
        }
    }
}
