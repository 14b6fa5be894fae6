//! 布洛赫哈密顿量 $H(\bm k)$ 的生成, 以及它的导数, 格林函数和一维约化.
use crate::block::Block;
use crate::error::{Result, TbError};
use crate::geometry::Geometry;
use crate::math::dagger;
use crate::sparse::{self, SparseMatrix};
use crate::{Hamiltonian, Hoppings};
use ndarray::{Array1, Array2, ArrayBase, Data, Ix1};
use ndarray_linalg::Inverse;
use num_complex::Complex64;
use std::f64::consts::PI;

impl Hamiltonian {
    fn check_k<S>(&self, kvec: &ArrayBase<S, Ix1>) -> Result<()>
    where
        S: Data<Elem = f64>,
    {
        if kvec.len() < self.dimensionality {
            return Err(TbError::DimensionMismatch {
                context: "k-vector length".to_string(),
                expected: self.dimensionality,
                found: kvec.len(),
            });
        }
        Ok(())
    }

    #[allow(non_snake_case)]
    #[inline(always)]
    pub fn gen_ham<S>(&self, kvec: &ArrayBase<S, Ix1>) -> Result<Array2<Complex64>>
    where
        S: Data<Elem = f64>,
    {
        //!这个是做傅里叶变换, 将实空间的哈密顿量变换到倒空间
        //!
        //!$$H(\bm k)=H_0+\sum_{\bm d}\left(T_{\bm d}e^{i2\pi\bm d\cdot\bm k}+\text{h.c.}\right)$$
        //!
        //!$\bm k$ 是分数坐标, 长度可以比维度长, 多出来的分量不起作用.
        //!先累加 $A=H_0/2+\sum_{\bm d}T_{\bm d}e^{i2\pi\bm d\cdot\bm k}$, 再取 $A+A^\dagger$,
        //!结果逐元素严格厄米.
        self.check_k(kvec)?;
        let k = kvec.slice(ndarray::s![..self.dimensionality]);
        let mut half = Array2::<Complex64>::zeros((self.dim(), self.dim()));
        self.intra.add_scaled_to(&mut half, Complex64::new(0.5, 0.0));
        for (dir, m) in self.hopping_terms() {
            m.add_scaled_to(&mut half, Geometry::bloch_phase(&dir, &k));
        }
        Ok(&half + &dagger(&half))
    }

    /// A reusable `k ↦ H(k)` closure over a borrowed snapshot.
    pub fn hk_gen(&self) -> impl Fn(&Array1<f64>) -> Result<Array2<Complex64>> + '_ {
        move |k| self.gen_ham(k)
    }

    /// Sparse $H(\bm k)$ for large systems.
    pub fn gen_ham_sparse<S>(&self, kvec: &ArrayBase<S, Ix1>) -> Result<SparseMatrix>
    where
        S: Data<Elem = f64>,
    {
        self.check_k(kvec)?;
        let k = kvec.slice(ndarray::s![..self.dimensionality]);
        let mut triplets = self.intra.triplets();
        for (dir, m) in self.hopping_terms() {
            let p = Geometry::bloch_phase(&dir, &k);
            for (i, j, v) in m.triplets() {
                triplets.push((i, j, v * p));
                triplets.push((j, i, (v * p).conj()));
            }
        }
        Ok(sparse::from_triplets(self.dim(), self.dim(), triplets))
    }

    #[allow(non_snake_case)]
    pub fn dhdk<S>(&self, kvec: &ArrayBase<S, Ix1>, axis: usize) -> Result<Array2<Complex64>>
    where
        S: Data<Elem = f64>,
    {
        //! $$\partial_{k_a}H=\sum_{\bm d}\left(i2\pi d_a T_{\bm d}
        //! e^{i2\pi\bm d\cdot\bm k}+\text{h.c.}\right)$$
        if axis >= self.dimensionality {
            return Err(TbError::DimensionMismatch {
                context: "derivative axis".to_string(),
                expected: self.dimensionality,
                found: axis,
            });
        }
        self.check_k(kvec)?;
        let k = kvec.slice(ndarray::s![..self.dimensionality]);
        let mut out = Array2::<Complex64>::zeros((self.dim(), self.dim()));
        for (dir, m) in self.hopping_terms() {
            if dir[axis] == 0 {
                continue;
            }
            let c = Complex64::new(0.0, 2.0 * PI * dir[axis] as f64);
            m.add_bloch_term(&mut out, c * Geometry::bloch_phase(&dir, &k));
        }
        Ok(out)
    }

    /// Onsite and x-hopping blocks of the 1-D chain at fixed `ky`.
    pub fn kchain(&self, ky: f64) -> Result<(Block, Block)> {
        self.require_dimensionality(&[2])?;
        let p = |d: isize| Complex64::new(0.0, 2.0 * PI * d as f64 * ky).exp();
        let mut ons = self.intra.clone();
        let mut hop = Block::zeros(self.dim(), self.is_sparse());
        match &self.hoppings {
            Hoppings::Planar { tx, ty, txy, txmy } => {
                let tyk = ty.scale(p(1));
                ons = ons.add(&tyk)?.add(&tyk.dagger())?;
                hop = hop.add(tx)?.add(&txy.scale(p(1)))?.add(&txmy.scale(p(-1)))?;
            }
            Hoppings::Multicell(list) => {
                for h in list {
                    let t = h.m.scale(p(h.dir[1]));
                    match h.dir[0] {
                        0 => ons = ons.add(&t)?.add(&t.dagger())?,
                        1 => hop = hop.add(&t)?,
                        -1 => hop = hop.add(&t.dagger())?,
                        _ => return Err(TbError::HoppingTooLong { dir: h.dir }),
                    }
                }
            }
            _ => {
                return Err(TbError::InvalidDimension {
                    dim: self.dimensionality,
                    supported: vec![2],
                });
            }
        }
        Ok((ons, hop))
    }

    #[allow(non_snake_case)]
    pub fn gk_gen(
        &self,
        delta: f64,
        operator: Option<Array2<Complex64>>,
    ) -> impl Fn(&Array1<f64>, f64) -> Result<Array2<Complex64>> + '_ {
        //! 格林函数 $G(\bm k,\ve)=\left[(\ve+i\delta)-P^\dagger H(\bm k)P\right]^{-1}$
        //!
        //! 给定 `operator` $P$ (形状为 `dim x m`, 可以不是方阵) 时先把哈密顿量投影到
        //! $P$ 张成的子空间再求逆, 没有给定时 $P=1$.
        move |k, e| {
            let hk = self.gen_ham(k)?;
            let hk = match &operator {
                Some(P) => {
                    if P.nrows() != self.dim() {
                        return Err(TbError::DimensionMismatch {
                            context: "green function projector rows".to_string(),
                            expected: self.dim(),
                            found: P.nrows(),
                        });
                    }
                    dagger(P).dot(&hk).dot(P)
                }
                None => hk,
            };
            let z = Complex64::new(e, delta);
            let a = Array2::<Complex64>::eye(hk.nrows()).mapv(|x| x * z) - hk;
            Ok(a.inv()?)
        }
    }
}
