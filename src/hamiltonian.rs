//! 这个模块给 Hamiltonian 提供构造以及各种变换: 稀疏/稠密, 自旋/Nambu 扩展,
//! 多胞/固定近邻表示之间的转换, 以及有限体系.
use crate::block::Block;
use crate::config::HamiltonianConfig;
use crate::dof::{build_eh, des_spin, spinful, spinful_to_full, spinless_to_full};
use crate::error::{Result, TbError};
use crate::geometry::Geometry;
use crate::math::max_abs_diff;
use crate::neighbor::find_first_neighbors;
use crate::{DofMode, Hamiltonian, Hopping, Hoppings, Limits};
use log::debug;
use ndarray::{Array1, arr1};
use num_complex::Complex64;
use std::collections::BTreeMap;

const ZERO_DIR: [isize; 3] = [0, 0, 0];

#[inline(always)]
pub(crate) fn neg_dir(d: &[isize; 3]) -> [isize; 3] {
    [-d[0], -d[1], -d[2]]
}

/// Directions `d` with components in `{-1,0,1}` along the periodic axes whose first
/// non-zero component is positive. Together with `-d` they cover every first-neighbor cell.
pub(crate) fn half_space_directions(dimensionality: usize) -> Vec<[isize; 3]> {
    let range = |a: usize| -> Vec<isize> {
        if a < dimensionality {
            vec![0, 1, -1]
        } else {
            vec![0]
        }
    };
    let mut out = Vec::new();
    for &i in range(0).iter() {
        for &j in range(1).iter() {
            for &l in range(2).iter() {
                let d = [i, j, l];
                if let Some(first) = d.iter().find(|x| **x != 0) {
                    if *first > 0 {
                        out.push(d);
                    }
                }
            }
        }
    }
    out
}

fn fixed_neighbor_directions(dimensionality: usize) -> Vec<[isize; 3]> {
    match dimensionality {
        1 => vec![[1, 0, 0]],
        2 => vec![[1, 0, 0], [0, 1, 0], [1, 1, 0], [1, -1, 0]],
        _ => vec![],
    }
}

impl Hamiltonian {
    /// An empty (all-zero, dense) Hamiltonian with `nsites` sites.
    pub fn new(
        dimensionality: usize,
        nsites: usize,
        mode: DofMode,
        is_multicell: bool,
    ) -> Result<Hamiltonian> {
        let n = nsites * mode.factor();
        let zero = Block::zeros(n, false);
        let hoppings = if is_multicell {
            if dimensionality > 3 {
                return Err(TbError::InvalidDimension {
                    dim: dimensionality,
                    supported: vec![0, 1, 2, 3],
                });
            }
            Hoppings::Multicell(Vec::new())
        } else {
            match dimensionality {
                0 => Hoppings::Finite,
                1 => Hoppings::Chain { inter: zero.clone() },
                2 => Hoppings::Planar {
                    tx: zero.clone(),
                    ty: zero.clone(),
                    txy: zero.clone(),
                    txmy: zero.clone(),
                },
                _ => {
                    return Err(TbError::InvalidDimension {
                        dim: dimensionality,
                        supported: vec![0, 1, 2],
                    });
                }
            }
        };
        Ok(Hamiltonian {
            intra: zero,
            hoppings,
            dimensionality,
            mode,
            geometry: None,
            limits: Limits::default(),
        })
    }

    /// First-neighbor Hamiltonian with hopping 1 between sites at unit distance.
    pub fn from_geometry(g: &Geometry, cfg: &HamiltonianConfig) -> Result<Hamiltonian> {
        let mode = DofMode::from_flags(cfg.has_spin, false);
        let nsites = g.nsites();
        let gett = |dir: &[isize; 3]| -> Result<Block> {
            let pairs = find_first_neighbors(&g.r, &g.shifted(dir), cfg.neighbor_search);
            let m = Block::from_triplets(
                nsites,
                cfg.is_sparse,
                pairs.into_iter().map(|(i, j)| (i, j, Complex64::new(1.0, 0.0))),
            );
            spinless_to_full(mode, &m, false)
        };
        let mut h = Hamiltonian::new(g.dimensionality, nsites, mode, cfg.is_multicell)?;
        h.intra = gett(&ZERO_DIR)?;
        h.hoppings = if cfg.is_multicell {
            let mut list = Vec::new();
            for d in half_space_directions(g.dimensionality) {
                let m = gett(&d)?;
                if !m.is_zero() {
                    list.push(Hopping { dir: d, m });
                }
            }
            Hoppings::Multicell(list)
        } else {
            match g.dimensionality {
                0 => Hoppings::Finite,
                1 => Hoppings::Chain {
                    inter: gett(&[1, 0, 0])?,
                },
                _ => Hoppings::Planar {
                    tx: gett(&[1, 0, 0])?,
                    ty: gett(&[0, 1, 0])?,
                    txy: gett(&[1, 1, 0])?,
                    txmy: gett(&[1, -1, 0])?,
                },
            }
        };
        h.geometry = Some(g.clone());
        debug!(
            "first-neighbor Hamiltonian: {} sites, dimension {}, {:?}",
            nsites,
            h.dim(),
            mode
        );
        Ok(h)
    }

    pub fn dim(&self) -> usize {
        self.intra.dim()
    }

    pub fn nsites(&self) -> usize {
        self.dim() / self.mode.factor()
    }

    pub fn mode(&self) -> DofMode {
        self.mode
    }

    pub fn is_sparse(&self) -> bool {
        self.intra.is_sparse()
    }

    pub fn is_multicell(&self) -> bool {
        matches!(self.hoppings, Hoppings::Multicell(_))
    }

    pub(crate) fn require_dimensionality(&self, supported: &[usize]) -> Result<()> {
        if supported.contains(&self.dimensionality) {
            Ok(())
        } else {
            Err(TbError::InvalidDimension {
                dim: self.dimensionality,
                supported: supported.to_vec(),
            })
        }
    }

    pub(crate) fn geometry_ref(&self) -> Result<&Geometry> {
        self.geometry.as_ref().ok_or(TbError::MissingGeometry)
    }

    /// Every intercell block with its direction; the Hermitian conjugates are implied.
    pub fn hopping_terms(&self) -> Vec<([isize; 3], &Block)> {
        match &self.hoppings {
            Hoppings::Finite => Vec::new(),
            Hoppings::Chain { inter } => vec![([1, 0, 0], inter)],
            Hoppings::Planar { tx, ty, txy, txmy } => vec![
                ([1, 0, 0], tx),
                ([0, 1, 0], ty),
                ([1, 1, 0], txy),
                ([1, -1, 0], txmy),
            ],
            Hoppings::Multicell(list) => list.iter().map(|h| (h.dir, &h.m)).collect(),
        }
    }

    /// Applies `f` to `intra` and to every intercell block.
    ///
    /// Either every block is replaced or, if `f` fails on one of them, none is.
    pub fn modify_all_blocks<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(&Block) -> Result<Block>,
    {
        let intra = f(&self.intra)?;
        let hoppings = match &self.hoppings {
            Hoppings::Finite => Hoppings::Finite,
            Hoppings::Chain { inter } => Hoppings::Chain { inter: f(inter)? },
            Hoppings::Planar { tx, ty, txy, txmy } => Hoppings::Planar {
                tx: f(tx)?,
                ty: f(ty)?,
                txy: f(txy)?,
                txmy: f(txmy)?,
            },
            Hoppings::Multicell(list) => {
                let mut out = Vec::with_capacity(list.len());
                for h in list {
                    out.push(Hopping {
                        dir: h.dir,
                        m: f(&h.m)?,
                    });
                }
                Hoppings::Multicell(out)
            }
        };
        self.intra = intra;
        self.hoppings = hoppings;
        Ok(())
    }

    pub fn turn_sparse(&mut self) -> Result<()> {
        debug!("turn_sparse: dimension {}", self.dim());
        self.modify_all_blocks(|m| Ok(m.with_representation(true)))
    }

    /// Converts every block to dense storage, refusing above `limits.dense_dimension`.
    pub fn turn_dense(&mut self) -> Result<()> {
        let dim = self.dim();
        if dim > self.limits.dense_dimension {
            return Err(TbError::DenseLimitExceeded {
                dim,
                max: self.limits.dense_dimension,
            });
        }
        debug!("turn_dense: dimension {}", dim);
        self.modify_all_blocks(|m| Ok(m.with_representation(false)))
    }

    /// Doubles a spinless Hamiltonian; with `enforce_tr` the spin-down copy is conjugated.
    pub fn turn_spinful(&mut self, enforce_tr: bool) -> Result<()> {
        match self.mode {
            DofMode::Spinful => Ok(()),
            DofMode::Bare => {
                self.modify_all_blocks(|m| {
                    if enforce_tr {
                        spinful(m, Some(&m.conj()))
                    } else {
                        spinful(m, None)
                    }
                })?;
                self.mode = DofMode::Spinful;
                debug!("turn_spinful: dimension {}", self.dim());
                Ok(())
            }
            mode => Err(TbError::InvalidDofMode {
                operation: "turn_spinful",
                mode,
            }),
        }
    }

    /// Keeps the spin-up sector of a spinful Hamiltonian.
    pub fn remove_spin(&mut self) -> Result<()> {
        match self.mode {
            DofMode::Bare => Ok(()),
            DofMode::Spinful => {
                self.modify_all_blocks(|m| des_spin(m, 0))?;
                self.mode = DofMode::Bare;
                Ok(())
            }
            mode => Err(TbError::InvalidDofMode {
                operation: "remove_spin",
                mode,
            }),
        }
    }

    /// Adds the particle-hole sector to a spinful Hamiltonian.
    pub fn turn_nambu(&mut self) -> Result<()> {
        match self.mode {
            DofMode::SpinfulNambu => Ok(()),
            DofMode::Spinful => {
                self.modify_all_blocks(|m| build_eh(m, None))?;
                self.mode = DofMode::SpinfulNambu;
                debug!("turn_nambu: dimension {}", self.dim());
                Ok(())
            }
            mode => Err(TbError::InvalidDofMode {
                operation: "turn_nambu",
                mode,
            }),
        }
    }

    /// Onsite singlet pairing $\Delta$ on every site.
    pub fn add_swave(&mut self, delta: Complex64) -> Result<()> {
        if self.mode != DofMode::SpinfulNambu {
            return Err(TbError::InvalidDofMode {
                operation: "add_swave",
                mode: self.mode,
            });
        }
        let n = self.nsites();
        let pairing = Block::from_triplets(
            2 * n,
            self.is_sparse(),
            (0..n).flat_map(|i| [(2 * i, 2 * i + 1, delta), (2 * i + 1, 2 * i, -delta)]),
        );
        let term = build_eh(&Block::zeros(2 * n, self.is_sparse()), Some(&pairing))?;
        self.intra = self.intra.add(&term)?;
        Ok(())
    }

    /// Adds `e` to every site, expanded to the full space (holes get `-e`).
    pub fn add_onsite(&mut self, e: f64) -> Result<()> {
        let values = vec![e; self.nsites()];
        self.add_onsite_profile(&values)
    }

    pub fn shift_fermi(&mut self, e: f64) -> Result<()> {
        self.add_onsite(e)
    }

    /// Adds a site-resolved onsite energy.
    pub fn add_onsite_profile(&mut self, values: &[f64]) -> Result<()> {
        let n = self.nsites();
        if values.len() != n {
            return Err(TbError::ProfileLength {
                expected: n,
                found: values.len(),
            });
        }
        let m = Block::from_triplets(
            n,
            self.is_sparse(),
            values.iter().enumerate().map(|(i, v)| (i, i, Complex64::new(*v, 0.0))),
        );
        let term = spinless_to_full(self.mode, &m, false)?;
        self.intra = self.intra.add(&term)?;
        Ok(())
    }

    fn sublattice(&self) -> Result<Vec<f64>> {
        let g = self.geometry_ref()?;
        let s = g.sublattice.clone().ok_or(TbError::MissingSublattice)?;
        if s.len() != self.nsites() {
            return Err(TbError::ProfileLength {
                expected: self.nsites(),
                found: s.len(),
            });
        }
        Ok(s)
    }

    /// Adds `mass * sublattice(i)` on every site.
    pub fn add_sublattice_imbalance(&mut self, mass: f64) -> Result<()> {
        let s = self.sublattice()?;
        let values: Vec<f64> = s.iter().map(|x| mass * x).collect();
        self.add_onsite_profile(&values)
    }

    /// Adds a staggered magnetization `m * sublattice(i) * σz`.
    pub fn add_antiferromagnetism(&mut self, m: f64) -> Result<()> {
        if !self.mode.has_spin() {
            return Err(TbError::InvalidDofMode {
                operation: "add_antiferromagnetism",
                mode: self.mode,
            });
        }
        let s = self.sublattice()?;
        let n = s.len();
        let sparse = self.is_sparse();
        let up = Block::from_triplets(
            n,
            sparse,
            s.iter().enumerate().map(|(i, x)| (i, i, Complex64::new(m * x, 0.0))),
        );
        let spin_block = spinful(&up, Some(&up.scale(Complex64::new(-1.0, 0.0))))?;
        let term = spinful_to_full(self.mode, &spin_block)?;
        self.intra = self.intra.add(&term)?;
        Ok(())
    }

    /// Adds hoppings `f(r_i, r_j + R)` between every pair of sites of neighboring cells.
    ///
    /// `f` works on spinless sites; the result is expanded to the full space. Only the
    /// zero cell and the half-space directions are generated, their conjugates are implied.
    pub fn add_hopping_matrix<F>(&mut self, f: F) -> Result<()>
    where
        F: Fn(&[f64; 3], &[f64; 3]) -> Complex64,
    {
        if !self.is_multicell() {
            return Err(TbError::NotMulticell);
        }
        let g = self.geometry_ref()?.clone();
        let (mode, sparse) = (self.mode, self.is_sparse());
        let n = g.nsites();
        let row =
            |i: usize, r: &ndarray::Array2<f64>| -> [f64; 3] { [r[[i, 0]], r[[i, 1]], r[[i, 2]]] };
        let gett = |dir: &[isize; 3]| -> Result<Block> {
            let r2 = g.shifted(dir);
            let mut triplets = Vec::new();
            for i in 0..n {
                let ri = row(i, &g.r);
                for j in 0..n {
                    let v = f(&ri, &row(j, &r2));
                    if v != Complex64::new(0.0, 0.0) {
                        triplets.push((i, j, v));
                    }
                }
            }
            spinless_to_full(mode, &Block::from_triplets(n, sparse, triplets), false)
        };
        let mut dict = BTreeMap::new();
        dict.insert(ZERO_DIR, gett(&ZERO_DIR)?);
        for d in half_space_directions(self.dimensionality) {
            let m = gett(&d)?;
            if !m.is_zero() {
                dict.insert(d, m);
            }
        }
        let other = Hamiltonian::from_dict(dict, self.dimensionality, self.mode, None)?;
        self.add_hamiltonian(&other)
    }

    /// Adds the blocks of `other` direction by direction. The receiver must be multicell.
    pub fn add_hamiltonian(&mut self, other: &Hamiltonian) -> Result<()> {
        let mut list = match &self.hoppings {
            Hoppings::Multicell(list) => list.clone(),
            _ => return Err(TbError::NotMulticell),
        };
        if other.dim() != self.dim() {
            return Err(TbError::DimensionMismatch {
                context: "add_hamiltonian".to_string(),
                expected: self.dim(),
                found: other.dim(),
            });
        }
        let intra = self.intra.add(&other.intra)?;
        for (d, m) in other.hopping_terms() {
            if let Some(h) = list.iter_mut().find(|h| h.dir == d) {
                h.m = h.m.add(m)?;
            } else if let Some(h) = list.iter_mut().find(|h| h.dir == neg_dir(&d)) {
                h.m = h.m.add(&m.dagger())?;
            } else if !m.is_zero() {
                list.push(Hopping { dir: d, m: m.clone() });
            }
        }
        self.intra = intra;
        self.hoppings = Hoppings::Multicell(list);
        Ok(())
    }

    /// Direction → block map of a multicell Hamiltonian; the zero direction is `intra`.
    pub fn get_dict(&self) -> Result<BTreeMap<[isize; 3], Block>> {
        let list = match &self.hoppings {
            Hoppings::Multicell(list) => list,
            _ => return Err(TbError::NotMulticell),
        };
        let mut dict = BTreeMap::new();
        dict.insert(ZERO_DIR, self.intra.clone());
        for h in list {
            dict.insert(h.dir, h.m.clone());
        }
        Ok(dict)
    }

    /// Inverse of [`Hamiltonian::get_dict`].
    pub fn from_dict(
        dict: BTreeMap<[isize; 3], Block>,
        dimensionality: usize,
        mode: DofMode,
        geometry: Option<Geometry>,
    ) -> Result<Hamiltonian> {
        let first = dict.values().next().ok_or(TbError::DimensionMismatch {
            context: "from_dict without blocks".to_string(),
            expected: 1,
            found: 0,
        })?;
        let (n, sparse) = (first.dim(), first.is_sparse());
        if n % mode.factor() != 0 {
            return Err(TbError::DimensionMismatch {
                context: "from_dict block dimension".to_string(),
                expected: mode.factor() * (n / mode.factor()),
                found: n,
            });
        }
        let mut h = Hamiltonian::new(dimensionality, n / mode.factor(), mode, true)?;
        h.intra = Block::zeros(n, sparse);
        let mut list = Vec::new();
        for (d, m) in dict {
            if m.dim() != n {
                return Err(TbError::DimensionMismatch {
                    context: format!("from_dict block {:?}", d),
                    expected: n,
                    found: m.dim(),
                });
            }
            if m.is_sparse() != sparse {
                return Err(TbError::MixedRepresentation);
            }
            if d.iter().skip(dimensionality).any(|x| *x != 0) {
                return Err(TbError::HoppingTooLong { dir: d });
            }
            if d == ZERO_DIR {
                h.intra = m;
            } else {
                list.push(Hopping { dir: d, m });
            }
        }
        h.hoppings = Hoppings::Multicell(list);
        h.geometry = geometry;
        Ok(h)
    }

    /// Fixed-neighbor blocks → explicit direction list.
    pub fn turn_multicell(&mut self) -> Result<()> {
        if self.is_multicell() {
            return Err(TbError::AlreadyMulticell);
        }
        let list: Vec<Hopping> = self
            .hopping_terms()
            .into_iter()
            .filter(|(_, m)| !m.is_zero())
            .map(|(dir, m)| Hopping { dir, m: m.clone() })
            .collect();
        self.hoppings = Hoppings::Multicell(list);
        debug!("turn_multicell: {} directions", self.hopping_terms().len());
        Ok(())
    }

    /// Explicit direction list → fixed-neighbor blocks.
    ///
    /// A block along `-d` is stored as the conjugate transpose in the `d` slot;
    /// any direction without a slot is an error.
    pub fn turn_no_multicell(&mut self) -> Result<()> {
        let list = match &self.hoppings {
            Hoppings::Multicell(list) => list,
            _ => return Err(TbError::NotMulticell),
        };
        if self.dimensionality > 2 {
            return Err(TbError::InvalidDimension {
                dim: self.dimensionality,
                supported: vec![0, 1, 2],
            });
        }
        let slots = fixed_neighbor_directions(self.dimensionality);
        let mut blocks: Vec<Block> = vec![Block::zeros(self.dim(), self.is_sparse()); slots.len()];
        for h in list.iter().filter(|h| !h.m.is_zero()) {
            if let Some(s) = slots.iter().position(|d| *d == h.dir) {
                blocks[s] = blocks[s].add(&h.m)?;
            } else if let Some(s) = slots.iter().position(|d| *d == neg_dir(&h.dir)) {
                blocks[s] = blocks[s].add(&h.m.dagger())?;
            } else {
                return Err(TbError::HoppingTooLong { dir: h.dir });
            }
        }
        self.hoppings = match (self.dimensionality, blocks.as_slice()) {
            (1, [inter]) => Hoppings::Chain { inter: inter.clone() },
            (2, [tx, ty, txy, txmy]) => Hoppings::Planar {
                tx: tx.clone(),
                ty: ty.clone(),
                txy: txy.clone(),
                txmy: txmy.clone(),
            },
            _ => Hoppings::Finite,
        };
        Ok(())
    }

    pub fn get_multicell(&self) -> Result<Hamiltonian> {
        let mut h = self.clone();
        h.turn_multicell()?;
        Ok(h)
    }

    pub fn get_no_multicell(&self) -> Result<Hamiltonian> {
        let mut h = self.clone();
        h.turn_no_multicell()?;
        Ok(h)
    }

    /// Removes every periodic direction.
    ///
    /// With `periodic` each intercell block and its conjugate are folded into `intra`,
    /// which closes the cell onto itself; otherwise the intercell blocks are dropped.
    pub fn set_finite_system(&mut self, periodic: bool) -> Result<()> {
        if periodic {
            let mut intra = self.intra.clone();
            for (_, m) in self.hopping_terms() {
                intra = intra.add(m)?.add(&m.dagger())?;
            }
            self.intra = intra;
        }
        self.hoppings = if self.is_multicell() {
            Hoppings::Multicell(Vec::new())
        } else {
            Hoppings::Finite
        };
        self.dimensionality = 0;
        if let Some(g) = self.geometry.as_mut() {
            g.set_finite();
        }
        debug!("set_finite_system: periodic = {}", periodic);
        Ok(())
    }

    /// Effective 1-D Hamiltonian along x at fixed `ky`.
    pub fn get_1dh(&self, ky: f64) -> Result<Hamiltonian> {
        let (ons, hop) = self.kchain(ky)?;
        let mut h = self.clone();
        h.intra = ons;
        h.hoppings = Hoppings::Chain { inter: hop };
        h.dimensionality = 1;
        if let Some(g) = h.geometry.as_mut() {
            g.dimensionality = 1;
        }
        Ok(h)
    }

    /// Compares the Bloch matrices of two Hamiltonians at `ntries` quasi-random k-points.
    pub fn same_hamiltonian(&self, other: &Hamiltonian, ntries: usize) -> Result<bool> {
        if self.dim() != other.dim() || self.dimensionality != other.dimensionality {
            return Ok(false);
        }
        for k in sample_kpoints(ntries, 3) {
            let a = self.gen_ham(&k)?;
            let b = other.gen_ham(&k)?;
            if max_abs_diff(&a, &b) > 1e-6 {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Verifies the structural invariants and the Hermiticity of $H(\bm k)$.
    pub fn check(&self) -> Result<()> {
        let n = self.dim();
        if n % self.mode.factor() != 0 {
            return Err(TbError::DimensionMismatch {
                context: "dimension vs degrees of freedom".to_string(),
                expected: self.mode.factor() * (n / self.mode.factor()),
                found: n,
            });
        }
        let layout_ok = match &self.hoppings {
            Hoppings::Finite => self.dimensionality == 0,
            Hoppings::Chain { .. } => self.dimensionality == 1,
            Hoppings::Planar { .. } => self.dimensionality == 2,
            Hoppings::Multicell(_) => self.dimensionality <= 3,
        };
        if !layout_ok {
            return Err(TbError::InvalidDimension {
                dim: self.dimensionality,
                supported: vec![0, 1, 2, 3],
            });
        }
        let mut seen: Vec<[isize; 3]> = Vec::new();
        for (d, m) in self.hopping_terms() {
            if m.dim() != n {
                return Err(TbError::DimensionMismatch {
                    context: format!("block {:?}", d),
                    expected: n,
                    found: m.dim(),
                });
            }
            if m.is_sparse() != self.is_sparse() {
                return Err(TbError::MixedRepresentation);
            }
            if d == ZERO_DIR {
                return Err(TbError::DuplicateDirection { dir: d });
            }
            if seen.contains(&d) {
                return Err(TbError::DuplicateDirection { dir: d });
            }
            seen.push(d);
        }
        for k in sample_kpoints(3, 3) {
            let hk = self.gen_ham(&k)?;
            let dev = max_abs_diff(&hk, &hk.t().mapv(|x| x.conj()));
            if dev > 1e-10 {
                return Err(TbError::NotHermitian(dev));
            }
        }
        Ok(())
    }
}

/// Deterministic, well spread k-points (additive recurrence with irrational steps).
pub(crate) fn sample_kpoints(n: usize, dim: usize) -> Vec<Array1<f64>> {
    let steps = arr1(&[0.618_033_988_749_894_9, 0.414_213_562_373_095_1, 0.732_050_807_568_877_3]);
    (1..=n)
        .map(|i| {
            let k = steps.mapv(|s| (s * i as f64 + 0.123).fract());
            k.slice(ndarray::s![..dim.min(3)]).to_owned()
        })
        .collect()
}
