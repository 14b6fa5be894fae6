//! 哈密顿量的矩阵块, 可以是稠密的也可以是稀疏的.
use crate::error::{Result, TbError};
use crate::sparse::{self, SparseMatrix};
use ndarray::Array2;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

/// One block of a Hamiltonian: the intracell matrix or one intercell hopping.
///
/// Inside a single Hamiltonian every block uses the same variant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Block {
    Dense(Array2<Complex64>),
    Sparse(SparseMatrix),
}

impl Block {
    pub fn zeros(n: usize, sparse: bool) -> Block {
        if sparse {
            Block::Sparse(SparseMatrix::zero((n, n)))
        } else {
            Block::Dense(Array2::zeros((n, n)))
        }
    }

    pub fn identity(n: usize, sparse: bool) -> Block {
        if sparse {
            Block::Sparse(SparseMatrix::eye(n))
        } else {
            Block::Dense(Array2::eye(n))
        }
    }

    /// Builds a block of the requested representation from triplets.
    pub fn from_triplets<I>(n: usize, sparse: bool, triplets: I) -> Block
    where
        I: IntoIterator<Item = (usize, usize, Complex64)>,
    {
        let m = sparse::from_triplets(n, n, triplets);
        if sparse {
            Block::Sparse(m)
        } else {
            Block::Dense(m.to_dense())
        }
    }

    pub fn dim(&self) -> usize {
        match self {
            Block::Dense(m) => m.nrows(),
            Block::Sparse(m) => m.rows(),
        }
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self, Block::Sparse(_))
    }

    pub fn to_dense(&self) -> Array2<Complex64> {
        match self {
            Block::Dense(m) => m.clone(),
            Block::Sparse(m) => m.to_dense(),
        }
    }

    pub fn to_sparse(&self) -> SparseMatrix {
        match self {
            Block::Dense(m) => sparse::from_dense(m),
            Block::Sparse(m) => m.clone(),
        }
    }

    /// Same content, representation chosen by `sparse`.
    pub fn with_representation(&self, sparse: bool) -> Block {
        if sparse {
            Block::Sparse(self.to_sparse())
        } else {
            Block::Dense(self.to_dense())
        }
    }

    /// Non-zero entries as `(row, col, value)`.
    pub fn triplets(&self) -> Vec<(usize, usize, Complex64)> {
        match self {
            Block::Dense(m) => m
                .indexed_iter()
                .filter(|(_, v)| **v != Complex64::new(0.0, 0.0))
                .map(|((i, j), v)| (i, j, *v))
                .collect(),
            Block::Sparse(m) => m.iter().map(|(v, (i, j))| (i, j, *v)).collect(),
        }
    }

    pub fn add(&self, other: &Block) -> Result<Block> {
        if self.dim() != other.dim() {
            return Err(TbError::DimensionMismatch {
                context: "block add".to_string(),
                expected: self.dim(),
                found: other.dim(),
            });
        }
        match (self, other) {
            (Block::Dense(a), Block::Dense(b)) => Ok(Block::Dense(a + b)),
            (Block::Sparse(a), Block::Sparse(b)) => Ok(Block::Sparse(a + b)),
            _ => Err(TbError::MixedRepresentation),
        }
    }

    pub fn scale(&self, c: Complex64) -> Block {
        match self {
            Block::Dense(m) => Block::Dense(m.mapv(|x| x * c)),
            Block::Sparse(m) => Block::Sparse(m.map(|x| x * c)),
        }
    }

    pub fn conj(&self) -> Block {
        match self {
            Block::Dense(m) => Block::Dense(m.mapv(|x| x.conj())),
            Block::Sparse(m) => Block::Sparse(m.map(|x| x.conj())),
        }
    }

    pub fn dagger(&self) -> Block {
        match self {
            Block::Dense(m) => Block::Dense(m.t().mapv(|x| x.conj())),
            Block::Sparse(m) => Block::Sparse(sparse::dagger(m)),
        }
    }

    /// `hk += c * self`
    pub fn add_scaled_to(&self, hk: &mut Array2<Complex64>, c: Complex64) {
        match self {
            Block::Dense(m) => hk.scaled_add(c, m),
            Block::Sparse(m) => sparse::add_to_dense(m, hk, c),
        }
    }

    /// `hk += t·p + (t·p)†`, the Bloch contribution of one hopping block.
    #[inline(always)]
    pub fn add_bloch_term(&self, hk: &mut Array2<Complex64>, phase: Complex64) {
        match self {
            Block::Dense(m) => {
                let tk = m.mapv(|x| x * phase);
                *hk += &tk;
                *hk += &tk.t().mapv(|x| x.conj());
            }
            Block::Sparse(m) => {
                for (v, (i, j)) in m.iter() {
                    let tk = v * phase;
                    hk[[i, j]] += tk;
                    hk[[j, i]] += tk.conj();
                }
            }
        }
    }

    pub fn max_abs(&self) -> f64 {
        match self {
            Block::Dense(m) => m.iter().fold(0.0, |acc, v| acc.max(v.norm())),
            Block::Sparse(m) => sparse::max_abs(m),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.max_abs() == 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn mixed_representations_are_rejected() {
        let a = Block::identity(2, false);
        let b = Block::identity(2, true);
        assert!(matches!(a.add(&b), Err(TbError::MixedRepresentation)));
    }

    #[test]
    fn bloch_term_is_hermitian_for_both_representations() {
        let t = array![
            [Complex64::new(0.3, 0.1), Complex64::new(1.0, -2.0)],
            [Complex64::new(0.0, 0.5), Complex64::new(-0.7, 0.0)]
        ];
        let phase = Complex64::new(0.0, 0.37).exp();
        let mut hd = Array2::<Complex64>::zeros((2, 2));
        let mut hs = Array2::<Complex64>::zeros((2, 2));
        Block::Dense(t.clone()).add_bloch_term(&mut hd, phase);
        Block::Sparse(sparse::from_dense(&t)).add_bloch_term(&mut hs, phase);
        for i in 0..2 {
            for j in 0..2 {
                assert_eq!(hd[[i, j]], hd[[j, i]].conj());
                assert_abs_diff_eq!(hd[[i, j]].re, hs[[i, j]].re, epsilon = 1e-14);
                assert_abs_diff_eq!(hd[[i, j]].im, hs[[i, j]].im, epsilon = 1e-14);
            }
        }
    }
}
