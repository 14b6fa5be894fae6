//! 全自由度空间里的实空间算符: 自旋 z 分量, 坐标 x/y, 以及电子-空穴 $\tau_z$.
use crate::block::Block;
use crate::dof::{build_eh, spinful};
use crate::error::{Result, TbError};
use crate::{DofMode, Hamiltonian};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Identity,
    /// $\sigma_z$, spin up `+1`, spin down `-1`.
    Sz,
    XPosition,
    YPosition,
    /// Electron `+1`, hole `-1`.
    TauZ,
}

impl Hamiltonian {
    /// Diagonal operator repeating `values[site]` on every internal index of the site.
    fn site_diagonal(&self, values: &[f64]) -> Block {
        let f = self.mode.factor();
        Block::from_triplets(
            self.dim(),
            self.is_sparse(),
            (0..self.dim()).map(|i| (i, i, Complex64::new(values[i / f], 0.0))),
        )
    }

    /// `op` as a matrix in the full space, same representation as the blocks.
    pub fn get_operator(&self, op: Operator) -> Result<Block> {
        let n = self.nsites();
        let sparse = self.is_sparse();
        match op {
            Operator::Identity => Ok(Block::identity(self.dim(), sparse)),
            Operator::Sz => {
                let one = Block::identity(n, sparse);
                let sz = spinful(&one, Some(&one.scale(Complex64::new(-1.0, 0.0))))?;
                match self.mode {
                    DofMode::Spinful => Ok(sz),
                    DofMode::SpinfulNambu => build_eh(&sz, None),
                    mode => Err(TbError::InvalidDofMode {
                        operation: "sz operator",
                        mode,
                    }),
                }
            }
            Operator::XPosition | Operator::YPosition => {
                let g = self.geometry_ref()?;
                if g.nsites() != n {
                    return Err(TbError::ProfileLength {
                        expected: n,
                        found: g.nsites(),
                    });
                }
                let r = if op == Operator::XPosition { g.x() } else { g.y() };
                Ok(self.site_diagonal(&r.to_vec()))
            }
            Operator::TauZ => {
                if !self.mode.has_eh() {
                    return Err(TbError::InvalidDofMode {
                        operation: "tau_z operator",
                        mode: self.mode,
                    });
                }
                Ok(Block::from_triplets(
                    self.dim(),
                    sparse,
                    (0..self.dim()).map(|i| {
                        let s = if i % 2 == 0 { 1.0 } else { -1.0 };
                        (i, i, Complex64::new(s, 0.0))
                    }),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_models::{bhz, chain, qwz};

    #[test]
    fn sz_follows_the_spin_index() {
        let h = bhz(1.0);
        let sz = h.get_operator(Operator::Sz).unwrap().to_dense();
        let d: Vec<f64> = sz.diag().iter().map(|x| x.re).collect();
        assert_eq!(d, vec![1.0, -1.0, 1.0, -1.0]);
        assert!(matches!(
            qwz(1.0).get_operator(Operator::Sz),
            Err(TbError::InvalidDofMode { .. })
        ));
    }

    #[test]
    fn nambu_operators() {
        let mut h = chain(2, 1.0);
        h.turn_spinful(false).unwrap();
        h.turn_nambu().unwrap();
        let tz = h.get_operator(Operator::TauZ).unwrap().to_dense();
        assert_eq!(tz[[0, 0]].re, 1.0);
        assert_eq!(tz[[3, 3]].re, -1.0);
        let x = h.get_operator(Operator::XPosition).unwrap().to_dense();
        assert_eq!(x[[4, 4]].re, 1.0);
        assert_eq!(x[[7, 7]].re, 1.0);
        assert_eq!(x[[3, 3]].re, 0.0);
    }
}
