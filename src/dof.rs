//! 自由度扩展: 把无自旋的轨道矩阵扩展到 (格点, 自旋, 电子-空穴) 的完整空间.
//!
//! The full index of a state is `factor*site + 2*spin + eh` for spinful Nambu,
//! `2*site + spin` for spinful, `2*site + eh` for spinless Nambu: spin and
//! particle-hole are always the innermost indices.
use crate::block::Block;
use crate::error::{Result, TbError};
use crate::DofMode;
use ndarray::{Array1, ArrayBase, Data, Ix1};
use num_complex::Complex64;

/// Interleaves `m` (even indices) and `m2` (odd indices), `m2` defaulting to `m`.
pub fn spinful(m: &Block, m2: Option<&Block>) -> Result<Block> {
    let n = m.dim();
    let m2 = m2.unwrap_or(m);
    if m2.dim() != n {
        return Err(TbError::DimensionMismatch {
            context: "spinful".to_string(),
            expected: n,
            found: m2.dim(),
        });
    }
    let up = m.triplets().into_iter().map(|(i, j, v)| (2 * i, 2 * j, v));
    let dn = m2.triplets().into_iter().map(|(i, j, v)| (2 * i + 1, 2 * j + 1, v));
    Ok(Block::from_triplets(2 * n, m.is_sparse(), up.chain(dn)))
}

#[allow(non_snake_case)]
pub fn build_eh(m: &Block, pairing: Option<&Block>) -> Result<Block> {
    //! 构造电子-空穴 (Nambu) 矩阵
    //!
    //! 电子块为 $H$, 空穴块为 $-H^*$, 配对项 $\Delta_{ij}$ 把电子 $i$ 和空穴 $j$ 耦合起来,
    //! 同时加上它的厄米共轭, 所以输出矩阵在 $H$ 厄米时也是厄米的.
    let n = m.dim();
    let mut triplets: Vec<(usize, usize, Complex64)> = Vec::new();
    for (i, j, v) in m.triplets() {
        triplets.push((2 * i, 2 * j, v));
        triplets.push((2 * i + 1, 2 * j + 1, -v.conj()));
    }
    if let Some(delta) = pairing {
        if delta.dim() != n {
            return Err(TbError::DimensionMismatch {
                context: "build_eh pairing".to_string(),
                expected: n,
                found: delta.dim(),
            });
        }
        for (i, j, v) in delta.triplets() {
            triplets.push((2 * i, 2 * j + 1, v));
            triplets.push((2 * j + 1, 2 * i, v.conj()));
        }
    }
    Ok(Block::from_triplets(2 * n, m.is_sparse(), triplets))
}

/// Expands a spinless orbital matrix into the full space of `mode`.
pub fn spinless_to_full(mode: DofMode, m: &Block, time_reversal: bool) -> Result<Block> {
    let spin_block = || -> Result<Block> {
        if time_reversal {
            spinful(m, Some(&m.conj()))
        } else {
            spinful(m, None)
        }
    };
    match mode {
        DofMode::Bare => Ok(m.clone()),
        DofMode::Spinful => spin_block(),
        DofMode::SpinfulNambu => build_eh(&spin_block()?, None),
        DofMode::SpinlessNambu => build_eh(m, None),
    }
}

/// Expands a matrix that already carries spin into the full space of `mode`.
pub fn spinful_to_full(mode: DofMode, m: &Block) -> Result<Block> {
    match mode {
        DofMode::Spinful => Ok(m.clone()),
        DofMode::SpinfulNambu => build_eh(m, None),
        _ => Err(TbError::InvalidDofMode {
            operation: "spinful_to_full",
            mode,
        }),
    }
}

/// Sums the spin/particle-hole components of a full-space profile, one value per site.
pub fn full_to_profile<S>(
    mode: DofMode,
    profile: &ArrayBase<S, Ix1>,
    nsites: usize,
) -> Result<Array1<f64>>
where
    S: Data<Elem = f64>,
{
    let factor = mode.factor();
    if profile.len() != nsites * factor {
        return Err(TbError::ProfileLength {
            expected: nsites * factor,
            found: profile.len(),
        });
    }
    let out: Array1<f64> = (0..nsites)
        .map(|i| (0..factor).map(|s| profile[factor * i + s]).sum())
        .collect();
    Ok(out)
}

/// Keeps a single spin component (`0` up, `1` down) of a spinful matrix.
pub fn des_spin(m: &Block, component: usize) -> Result<Block> {
    let n = m.dim();
    if n % 2 != 0 || component > 1 {
        return Err(TbError::DimensionMismatch {
            context: "des_spin".to_string(),
            expected: 2 * (n / 2),
            found: n,
        });
    }
    let triplets = m
        .triplets()
        .into_iter()
        .filter(|(i, j, _)| i % 2 == component && j % 2 == component)
        .map(|(i, j, v)| (i / 2, j / 2, v));
    Ok(Block::from_triplets(n / 2, m.is_sparse(), triplets))
}
