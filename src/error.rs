//! src/error.rs
//! Error types shared by every module of the crate.
//! Misuse of a Hamiltonian (wrong mode, wrong dimensionality, wrong representation)
//! is reported through `TbError` and propagated with `?`, never silently corrected.

use crate::DofMode;
use thiserror::Error;

/// The primary error type for all fallible operations in this library.
#[derive(Error, Debug)]
pub enum TbError {
    // --- I/O and Serialization Errors ---
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("Failed to (de)serialize Hamiltonian")]
    Json(#[from] serde_json::Error),

    // --- Linear Algebra and Numerical Errors ---
    #[error("Linear algebra operation failed")]
    Linalg(#[from] ndarray_linalg::error::LinalgError),

    #[error("LAPACK routine '{routine}' failed with non-zero info code: {info}")]
    Lapack { routine: &'static str, info: i32 },

    // --- Invalid Input and Arguments ---
    #[error("Dimension mismatch for '{context}': expected {expected}, got {found}")]
    DimensionMismatch {
        context: String,
        expected: usize,
        found: usize,
    },

    #[error("Dimensionality {dim} is not supported here, supported: {supported:?}")]
    InvalidDimension { dim: usize, supported: Vec<usize> },

    #[error("k-mesh {k_mesh:?} has a direction without points")]
    EmptyKMesh { k_mesh: Vec<usize> },

    #[error("Profile length {found} does not match the expected length {expected}")]
    ProfileLength { expected: usize, found: usize },

    // --- Representation Errors ---
    #[error("Operation requires a multicell Hamiltonian")]
    NotMulticell,

    #[error("Operation requires a fixed-neighbor (non-multicell) Hamiltonian")]
    AlreadyMulticell,

    #[error("Dense matrix of dimension {dim} exceeds the configured maximum {max}")]
    DenseLimitExceeded { dim: usize, max: usize },

    #[error("Cannot combine dense and sparse blocks")]
    MixedRepresentation,

    #[error("Hopping along {dir:?} cannot be stored in the fixed-neighbor representation")]
    HoppingTooLong { dir: [isize; 3] },

    #[error("Direction {dir:?} appears more than once in the hopping list")]
    DuplicateDirection { dir: [isize; 3] },

    // --- Model Consistency Errors ---
    #[error("Operation '{operation}' is not defined for a {mode:?} Hamiltonian")]
    InvalidDofMode {
        operation: &'static str,
        mode: DofMode,
    },

    #[error("The geometry carries no sublattice information")]
    MissingSublattice,

    #[error("The Hamiltonian carries no geometry")]
    MissingGeometry,

    #[error("Generated Bloch matrix is not Hermitian, max deviation {0}")]
    NotHermitian(f64),
}

/// A specialized `Result` type for this library's operations.
pub type Result<T> = std::result::Result<T, TbError>;
