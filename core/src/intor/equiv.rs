//! Detection of integrals that are transposes of one another, and a batched
//! fetch that reuses earlier results instead of recomputing.

use ndarray::ArrayD;

use super::name::{IntorFamily, Marker, Shortname};
use crate::basis::BasisWrapper;

/// An axis-swap sequence over the trailing (AO) axes of a result. Indices
/// are negative so leading derivative-component axes are never touched.
pub type TransposePath = &'static [(isize, isize)];

const PATHS_2C: &[TransposePath] = &[&[], &[(-1, -2)]];
const PATHS_3C: &[TransposePath] = &[&[], &[(-2, -3)]];
// particle exchange and bra/ket swaps of the 4-center integral
const PATHS_4C: &[TransposePath] = &[
    &[],
    &[(-3, -4)],
    &[(-1, -2)],
    &[(-1, -3), (-2, -4)],
    &[(-1, -3), (-2, -4), (-2, -1)],
    &[(-1, -3), (-2, -4), (-3, -4)],
];

fn candidate_paths(family: IntorFamily) -> &'static [TransposePath] {
    match family {
        IntorFamily::Int1e | IntorFamily::Int2c2e => PATHS_2C,
        IntorFamily::Int3c2e => PATHS_3C,
        IntorFamily::Int2e => PATHS_4C,
    }
}

fn resolve(idx: isize, len: usize) -> usize {
    debug_assert!(idx < 0 && (-idx as usize) <= len);
    (len as isize + idx) as usize
}

fn swap_slots(slots: &[Vec<Marker>], path: TransposePath) -> Vec<Vec<Marker>> {
    let mut out = slots.to_vec();
    for &(i, j) in path {
        out.swap(resolve(i, slots.len()), resolve(j, slots.len()));
    }
    out
}

fn swap_wrappers<'a>(wrappers: &[&'a BasisWrapper], path: TransposePath) -> Vec<&'a BasisWrapper> {
    let mut out = wrappers.to_vec();
    for &(i, j) in path {
        out.swap(resolve(i, wrappers.len()), resolve(j, wrappers.len()));
    }
    out
}

/// First candidate path that turns the result of `a` into the result of `b`
/// by swapping center axes, or `None` when no transposition relates them.
/// Pure over the structured names.
pub fn transpose_path(a: &Shortname, b: &Shortname) -> Option<TransposePath> {
    if a.op() != b.op() {
        return None;
    }
    candidate_paths(a.family())
        .iter()
        .copied()
        .find(|&path| swap_slots(a.slots(), path) == b.slots())
}

/// Applies an axis-swap sequence to an integral result.
pub fn apply_transpose(mut a: ArrayD<f64>, path: TransposePath) -> ArrayD<f64> {
    let n = a.ndim();
    for &(i, j) in path {
        a.swap_axes(resolve(i, n), resolve(j, n));
    }
    a
}

/// Computes the named integrals over one wrapper list, reusing earlier
/// entries of the batch where a transposition relates them. Most recent
/// results are preferred. A cached result is transposed directly when the
/// swapped wrapper list is unchanged; otherwise the equivalent routine is
/// re-issued on the swapped wrappers, but only when that routine was itself
/// computed natively (so it is known to be available in the backend).
pub fn fetch_integrals<F>(
    names: &[Shortname],
    wrappers: &[&BasisWrapper],
    int_fcn: F,
) -> Vec<ArrayD<f64>>
where
    F: Fn(&[&BasisWrapper], &Shortname) -> ArrayD<f64>,
{
    let mut res: Vec<ArrayD<f64>> = Vec::with_capacity(names.len());
    let mut native = vec![false; names.len()];

    for i in 0..names.len() {
        let mut out = None;
        for j in (0..i).rev() {
            let Some(path) = transpose_path(&names[j], &names[i]) else {
                continue;
            };
            let twrappers = swap_wrappers(wrappers, path);
            if twrappers.iter().zip(wrappers).all(|(a, b)| a == b) {
                log::trace!("{} obtained by transposing {}", names[i], names[j]);
                out = Some(apply_transpose(res[j].clone(), path));
                break;
            } else if native[j] {
                log::trace!("{} obtained from {} on swapped centers", names[i], names[j]);
                out = Some(apply_transpose(int_fcn(&twrappers, &names[j]), path));
                break;
            }
        }
        res.push(out.unwrap_or_else(|| {
            native[i] = true;
            int_fcn(wrappers, &names[i])
        }));
    }
    res
}
