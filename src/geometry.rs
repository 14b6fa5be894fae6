//! 晶格几何: 格点坐标, 晶格矢量以及子晶格标记.
//!
//! The core only reads positions and lattice vectors from here, asks for Bloch phases,
//! and hands per-site profiles to [`Geometry::write_profile`].
use crate::error::{Result, TbError};
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix1, arr1};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    /// Number of periodic directions.
    pub dimensionality: usize,
    /// Cartesian site positions, one row `(x, y, z)` per site.
    pub r: Array2<f64>,
    pub a1: [f64; 3],
    pub a2: [f64; 3],
    pub a3: [f64; 3],
    /// `+1`/`-1` per site for bipartite lattices.
    pub sublattice: Option<Vec<f64>>,
}

impl Geometry {
    /// `n` sites spaced by one along x, periodic with `a1 = (n, 0, 0)`.
    pub fn chain(n: usize) -> Geometry {
        let mut r = Array2::<f64>::zeros((n, 3));
        for i in 0..n {
            r[[i, 0]] = i as f64;
        }
        let sublattice = if n % 2 == 0 {
            Some((0..n).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect())
        } else {
            None
        };
        Geometry {
            dimensionality: 1,
            r,
            a1: [n as f64, 0.0, 0.0],
            a2: [0.0, 1.0, 0.0],
            a3: [0.0, 0.0, 1.0],
            sublattice,
        }
    }

    pub fn square_lattice() -> Geometry {
        Geometry {
            dimensionality: 2,
            r: Array2::zeros((1, 3)),
            a1: [1.0, 0.0, 0.0],
            a2: [0.0, 1.0, 0.0],
            a3: [0.0, 0.0, 1.0],
            sublattice: None,
        }
    }

    /// Two-site honeycomb cell with unit bond length.
    pub fn honeycomb_lattice() -> Geometry {
        let s3 = 3.0_f64.sqrt();
        let r = ndarray::arr2(&[[0.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        Geometry {
            dimensionality: 2,
            r,
            a1: [s3, 0.0, 0.0],
            a2: [s3 / 2.0, 1.5, 0.0],
            a3: [0.0, 0.0, 1.0],
            sublattice: Some(vec![1.0, -1.0]),
        }
    }

    pub fn nsites(&self) -> usize {
        self.r.nrows()
    }

    pub fn x(&self) -> Array1<f64> {
        self.r.column(0).to_owned()
    }

    pub fn y(&self) -> Array1<f64> {
        self.r.column(1).to_owned()
    }

    /// Cartesian translation of the lattice vector with integer coordinates `dir`.
    pub fn lattice_shift(&self, dir: &[isize; 3]) -> [f64; 3] {
        let mut out = [0.0; 3];
        for a in 0..3 {
            out[a] = dir[0] as f64 * self.a1[a]
                + dir[1] as f64 * self.a2[a]
                + dir[2] as f64 * self.a3[a];
        }
        out
    }

    /// Site positions translated by the lattice vector `dir`.
    pub fn shifted(&self, dir: &[isize; 3]) -> Array2<f64> {
        let shift = arr1(&self.lattice_shift(dir));
        &self.r + &shift.insert_axis(Axis(0))
    }

    /// `n` copies of the cell along every periodic direction.
    pub fn supercell(&self, n: usize) -> Geometry {
        let mut reps = [1usize; 3];
        for a in 0..self.dimensionality.min(3) {
            reps[a] = n;
        }
        let mut rows: Vec<f64> = Vec::new();
        let mut sub: Vec<f64> = Vec::new();
        for i in 0..reps[0] {
            for j in 0..reps[1] {
                for l in 0..reps[2] {
                    let shifted = self.shifted(&[i as isize, j as isize, l as isize]);
                    rows.extend(shifted.iter());
                    if let Some(s) = &self.sublattice {
                        sub.extend(s.iter());
                    }
                }
            }
        }
        let nsites = rows.len() / 3;
        let r = Array2::from_shape_vec((nsites, 3), rows).unwrap_or_else(|_| Array2::zeros((0, 3)));
        let scale = |v: [f64; 3], m: usize| [v[0] * m as f64, v[1] * m as f64, v[2] * m as f64];
        Geometry {
            dimensionality: self.dimensionality,
            r,
            a1: scale(self.a1, reps[0]),
            a2: scale(self.a2, reps[1]),
            a3: scale(self.a3, reps[2]),
            sublattice: self.sublattice.as_ref().map(|_| sub),
        }
    }

    /// Drops every periodic direction.
    pub fn set_finite(&mut self) {
        self.dimensionality = 0;
    }

    /// `exp(i 2π d·k)` with `k` in fractional reciprocal units, truncated to `k.len()`.
    #[inline(always)]
    pub fn bloch_phase<S>(dir: &[isize; 3], k: &ArrayBase<S, Ix1>) -> Complex64
    where
        S: Data<Elem = f64>,
    {
        let dk: f64 = k.iter().zip(dir.iter()).map(|(k, d)| k * (*d as f64)).sum();
        Complex64::new(0.0, 2.0 * PI * dk).exp()
    }

    /// Writes `x y z value` per site to `path`.
    pub fn write_profile<S>(&self, values: &ArrayBase<S, Ix1>, path: &str) -> Result<()>
    where
        S: Data<Elem = f64>,
    {
        if values.len() != self.nsites() {
            return Err(TbError::ProfileLength {
                expected: self.nsites(),
                found: values.len(),
            });
        }
        let mut s0 = String::new();
        for (r, v) in self.r.outer_iter().zip(values.iter()) {
            s0.push_str(&format!("{:.6}  {:.6}  {:.6}  {:.8}\n", r[0], r[1], r[2], v));
        }
        std::fs::write(path, s0)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn honeycomb_supercell_keeps_sublattice() {
        let g = Geometry::honeycomb_lattice().supercell(3);
        assert_eq!(g.nsites(), 18);
        let s = g.sublattice.as_ref().unwrap();
        assert_eq!(s.iter().sum::<f64>(), 0.0);
        assert_relative_eq!(g.a1[0], 3.0 * 3.0_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn bloch_phase_truncates_to_k_length() {
        let p = Geometry::bloch_phase(&[1, 1, 5], &array![0.25, 0.25]);
        assert_relative_eq!(p.re, -1.0, epsilon = 1e-12);
        assert_relative_eq!(p.im, 0.0, epsilon = 1e-12);
    }
}
