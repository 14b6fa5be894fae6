//! 最近邻搜索. 两组坐标之间距离平方落在 (0.9, 1.1) 的格点对被认为是最近邻.
use crate::config::NeighborSearch;
use ndarray::{ArrayBase, ArrayView1, Data, Ix2};
use std::collections::HashMap;

const D2_MIN: f64 = 0.9;
const D2_MAX: f64 = 1.1;
const BIN: f64 = 1.1;

#[inline(always)]
fn is_first_neighbor(a: ArrayView1<f64>, b: ArrayView1<f64>) -> bool {
    let dr = &a - &b;
    let d2 = dr.dot(&dr);
    D2_MIN < d2 && d2 < D2_MAX
}

/// Returns the `(i, j)` pairs with `r1[i]` and `r2[j]` at unit distance, sorted.
pub fn find_first_neighbors<S1, S2>(
    r1: &ArrayBase<S1, Ix2>,
    r2: &ArrayBase<S2, Ix2>,
    search: NeighborSearch,
) -> Vec<(usize, usize)>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
{
    match search {
        NeighborSearch::BruteForce => brute_force(r1, r2),
        NeighborSearch::Binned => binned(r1, r2),
    }
}

fn brute_force<S1, S2>(r1: &ArrayBase<S1, Ix2>, r2: &ArrayBase<S2, Ix2>) -> Vec<(usize, usize)>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
{
    let mut pairs = Vec::new();
    for (i, a) in r1.outer_iter().enumerate() {
        for (j, b) in r2.outer_iter().enumerate() {
            if is_first_neighbor(a, b) {
                pairs.push((i, j));
            }
        }
    }
    pairs
}

fn bin_of(r: ArrayView1<f64>) -> [i64; 3] {
    let mut key = [0i64; 3];
    for (a, x) in r.iter().take(3).enumerate() {
        key[a] = (x / BIN).floor() as i64;
    }
    key
}

fn binned<S1, S2>(r1: &ArrayBase<S1, Ix2>, r2: &ArrayBase<S2, Ix2>) -> Vec<(usize, usize)>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
{
    //! 把 r2 放进边长 1.1 的格子里, 每个 r1 的点只需要检查周围 27 个格子.
    let mut cells: HashMap<[i64; 3], Vec<usize>> = HashMap::new();
    for (j, b) in r2.outer_iter().enumerate() {
        cells.entry(bin_of(b)).or_default().push(j);
    }
    let mut pairs = Vec::new();
    for (i, a) in r1.outer_iter().enumerate() {
        let key = bin_of(a);
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let k = [key[0] + dx, key[1] + dy, key[2] + dz];
                    if let Some(js) = cells.get(&k) {
                        for &j in js {
                            if is_first_neighbor(a, r2.row(j)) {
                                pairs.push((i, j));
                            }
                        }
                    }
                }
            }
        }
    }
    pairs.sort_unstable();
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;

    #[test]
    fn binned_matches_brute_force() {
        let g = Geometry::honeycomb_lattice().supercell(4);
        let r2 = &g.r + &ndarray::arr1(&g.a1).insert_axis(ndarray::Axis(0));
        for r_other in [g.r.clone(), r2] {
            let a = find_first_neighbors(&g.r, &r_other, NeighborSearch::BruteForce);
            let b = find_first_neighbors(&g.r, &r_other, NeighborSearch::Binned);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn chain_neighbors() {
        let g = Geometry::chain(5);
        let pairs = find_first_neighbors(&g.r, &g.r, NeighborSearch::Binned);
        assert_eq!(pairs.len(), 8);
        assert!(pairs.contains(&(0, 1)) && pairs.contains(&(4, 3)));
    }
}
