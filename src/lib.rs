//! Tight-binding Hamiltonians for crystalline lattices and their topological invariants.
//!
//! A [`Hamiltonian`] stores an intracell block and its intercell blocks in one of two
//! layouts (fixed neighbors or an explicit list of hopping directions), each block dense
//! or sparse, over a degree-of-freedom space described by [`DofMode`]. On top of it this
//! crate provides:
//!
//! 1: the Bloch generator $H(\bm k)$, its derivatives and Green's functions
//!
//! 2: band structures, density of states and windowed or Lanczos eigen-solvers
//!
//! 3: Berry curvature, Chern numbers (lattice sum and adaptive quadrature), spin Chern
//! numbers, and $Z_2$ invariants from a time-reversal path or from Wannier-center flow
pub mod block;
pub mod bloch;
pub mod config;
pub mod dof;
pub mod error;
pub mod geometry;
pub mod hamiltonian;
pub mod integrate;
pub mod io;
pub mod kpoints;
pub mod math;
pub mod ndarray_lapack;
pub mod neighbor;
pub mod operators;
pub mod sparse;
pub mod spectrum;
pub mod topology;

pub use crate::block::Block;
pub use crate::config::{HamiltonianConfig, Limits, NeighborSearch};
pub use crate::error::{Result, TbError};
pub use crate::geometry::Geometry;
pub use crate::kpoints::{gen_kmesh, gen_krange};
pub use crate::math::{anti_comm, comm, gauss};
pub use crate::operators::Operator;
pub use crate::sparse::SparseMatrix;

use serde::{Deserialize, Serialize};

/// Internal degrees of freedom carried by every site.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DofMode {
    /// One orbital per site.
    Bare,
    /// Spin up/down per site, index `2*site + spin`.
    Spinful,
    /// Spin and particle-hole per site, index `4*site + 2*spin + eh`.
    SpinfulNambu,
    /// Particle-hole without spin, index `2*site + eh`.
    SpinlessNambu,
}

impl DofMode {
    pub fn from_flags(has_spin: bool, has_eh: bool) -> DofMode {
        match (has_spin, has_eh) {
            (false, false) => DofMode::Bare,
            (true, false) => DofMode::Spinful,
            (true, true) => DofMode::SpinfulNambu,
            (false, true) => DofMode::SpinlessNambu,
        }
    }

    pub fn has_spin(self) -> bool {
        matches!(self, DofMode::Spinful | DofMode::SpinfulNambu)
    }

    pub fn has_eh(self) -> bool {
        matches!(self, DofMode::SpinfulNambu | DofMode::SpinlessNambu)
    }

    /// Number of matrix indices per site.
    pub fn factor(self) -> usize {
        match self {
            DofMode::Bare => 1,
            DofMode::Spinful | DofMode::SpinlessNambu => 2,
            DofMode::SpinfulNambu => 4,
        }
    }
}

/// One intercell block of a multicell Hamiltonian, $\bra{i,\bm 0}H\ket{j,\bm d}$.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hopping {
    pub dir: [isize; 3],
    pub m: Block,
}

/// Intercell blocks. The Hermitian conjugate of every block is implied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Hoppings {
    /// No periodic direction.
    Finite,
    /// One periodic direction, hopping towards `(1,0,0)`.
    Chain { inter: Block },
    /// Two periodic directions: `(1,0)`, `(0,1)`, `(1,1)`, `(1,-1)`.
    Planar {
        tx: Block,
        ty: Block,
        txy: Block,
        txmy: Block,
    },
    /// Explicit list of directions, no zero direction, no duplicates.
    Multicell(Vec<Hopping>),
}

/// The tight-binding Hamiltonian.
///
/// Every block has dimension `nsites * mode.factor()` and all blocks share one
/// representation (dense or sparse). Clone it to get an independent snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hamiltonian {
    pub intra: Block,
    pub hoppings: Hoppings,
    /// Number of periodic directions, 0 to 3.
    pub dimensionality: usize,
    pub mode: DofMode,
    pub geometry: Option<Geometry>,
    pub limits: Limits,
}

#[cfg(test)]
pub(crate) mod test_models {
    //! Small models shared by the unit tests.
    use super::*;
    use ndarray::array;
    use num_complex::Complex64;

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    /// Qi-Wu-Zhang model, `sin kx σx + sin ky σy + (m + cos kx + cos ky) σz`.
    pub fn qwz(m: f64) -> Hamiltonian {
        let mut h = Hamiltonian::new(2, 2, DofMode::Bare, false).unwrap();
        h.intra = Block::Dense(array![[c(m, 0.0), c(0.0, 0.0)], [c(0.0, 0.0), c(-m, 0.0)]]);
        let tx = Block::Dense(array![[c(0.5, 0.0), c(0.0, -0.5)], [c(0.0, -0.5), c(-0.5, 0.0)]]);
        let ty = Block::Dense(array![[c(0.5, 0.0), c(-0.5, 0.0)], [c(0.5, 0.0), c(-0.5, 0.0)]]);
        let zero = Block::zeros(2, false);
        h.hoppings = Hoppings::Planar {
            tx,
            ty,
            txy: zero.clone(),
            txmy: zero,
        };
        h
    }

    /// Two time-reversed copies of [`qwz`], spin conserved.
    pub fn bhz(m: f64) -> Hamiltonian {
        let mut h = qwz(m);
        h.turn_spinful(true).unwrap();
        h
    }

    /// Nearest-neighbor chain of `n` sites per cell with hopping `t`.
    pub fn chain(n: usize, t: f64) -> Hamiltonian {
        let g = Geometry::chain(n);
        let mut h = Hamiltonian::from_geometry(&g, &HamiltonianConfig::default()).unwrap();
        h.modify_all_blocks(|m| Ok(m.scale(c(t, 0.0)))).unwrap();
        h
    }

    /// Haldane model on the honeycomb lattice built through `add_hopping_matrix`.
    pub fn haldane(t2: f64) -> Hamiltonian {
        let g = Geometry::honeycomb_lattice();
        let cfg = HamiltonianConfig {
            is_multicell: true,
            ..Default::default()
        };
        let mut h = Hamiltonian::from_geometry(&g, &cfg).unwrap();
        h.add_hopping_matrix(|r1, r2| haldane_hopping(r1, r2, t2)).unwrap();
        h
    }

    pub fn haldane_hopping(r1: &[f64; 3], r2: &[f64; 3], t2: f64) -> Complex64 {
        let dx = r2[0] - r1[0];
        let dy = r2[1] - r1[1];
        if ((dx * dx + dy * dy) - 3.0).abs() > 0.1 {
            return c(0.0, 0.0);
        }
        let is_a = r1[1].rem_euclid(1.5) < 0.5;
        let sector = (dy.atan2(dx) / (std::f64::consts::PI / 3.0)).round() as i64;
        let mut nu = if sector.rem_euclid(2) == 0 { 1.0 } else { -1.0 };
        if !is_a {
            nu = -nu;
        }
        c(0.0, t2 * nu)
    }
}
