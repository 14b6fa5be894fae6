//! 构造哈密顿量时用到的参数, 显式传入, 不使用全局变量.
use serde::{Deserialize, Serialize};

/// Which neighbor-search implementation to use. Both return the same pairs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NeighborSearch {
    BruteForce,
    #[default]
    Binned,
}

/// Options for [`crate::Hamiltonian::from_geometry`].
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HamiltonianConfig {
    pub has_spin: bool,
    pub is_multicell: bool,
    pub is_sparse: bool,
    pub neighbor_search: NeighborSearch,
}

/// Resource limits carried by a Hamiltonian.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Largest dimension `turn_dense` will allocate.
    pub dense_dimension: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            dense_dimension: 4000,
        }
    }
}
