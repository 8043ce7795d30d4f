//! Reference McMurchie-Davidson backend.
//!
//! Evaluates the named integrals over contracted cartesian Gaussians. The
//! Coulomb-type operators share one 4-center electron-repulsion routine;
//! the 2- and 3-center variants insert zero-exponent unit dummies for the
//! missing centers. Derivative markers are evaluated per primitive as
//! central differences of the base integral, negated to match the
//! electron-coordinate convention of the routine names.

use itertools::Itertools;
use nalgebra::Vector3;
use smallvec::SmallVec;

use super::name::{Marker, Operator, Shortname};
use crate::basis::BasisEnv;

const FD_STEP: f64 = 1e-5;

fn boys_fn(n: i32, x: f64) -> f64 {
    boys::micb25::boys(n as u64, x)
}

/// Hermite Gaussian expansion coefficient `E_t^{ij}` for the product of two
/// 1-d cartesian Gaussians separated by `dist` along the axis.
fn hermite_expansion(i: i32, j: i32, t: i32, dist: f64, a: f64, b: f64) -> f64 {
    let p = a + b;
    let q = a * b / p;
    if i < 0 || j < 0 || t < 0 || t > i + j {
        0.0
    } else if i == 0 && j == 0 && t == 0 {
        (-q * dist * dist).exp()
    } else if j == 0 {
        // decrement i
        hermite_expansion(i - 1, j, t - 1, dist, a, b) / (2.0 * p)
            - q * dist / a * hermite_expansion(i - 1, j, t, dist, a, b)
            + (t + 1) as f64 * hermite_expansion(i - 1, j, t + 1, dist, a, b)
    } else {
        // decrement j
        hermite_expansion(i, j - 1, t - 1, dist, a, b) / (2.0 * p)
            + q * dist / b * hermite_expansion(i, j - 1, t, dist, a, b)
            + (t + 1) as f64 * hermite_expansion(i, j - 1, t + 1, dist, a, b)
    }
}

/// Auxiliary Hermite Coulomb integral `R_{tuv}^n` over the composite
/// exponent `p` and the distance `pc` to the Coulomb center.
fn coulomb_auxiliary(t: i32, u: i32, v: i32, n: i32, p: f64, pc: Vector3<f64>) -> f64 {
    if t == 0 && u == 0 && v == 0 {
        (-2.0 * p).powi(n) * boys_fn(n, p * pc.norm_squared())
    } else if t == 0 && u == 0 {
        (if v > 1 {
            (v - 1) as f64 * coulomb_auxiliary(t, u, v - 2, n + 1, p, pc)
        } else {
            0.0
        }) + pc.z * coulomb_auxiliary(t, u, v - 1, n + 1, p, pc)
    } else if t == 0 {
        (if u > 1 {
            (u - 1) as f64 * coulomb_auxiliary(t, u - 2, v, n + 1, p, pc)
        } else {
            0.0
        }) + pc.y * coulomb_auxiliary(t, u - 1, v, n + 1, p, pc)
    } else {
        (if t > 1 {
            (t - 1) as f64 * coulomb_auxiliary(t - 2, u, v, n + 1, p, pc)
        } else {
            0.0
        }) + pc.x * coulomb_auxiliary(t - 1, u, v, n + 1, p, pc)
    }
}

/// One unnormalized primitive cartesian Gaussian.
#[derive(Clone, Copy, Debug)]
struct Prim {
    exp: f64,
    center: Vector3<f64>,
    pow: (i32, i32, i32),
}

impl Prim {
    /// Zero-exponent unit s Gaussian used to reduce the 4-center Coulomb
    /// routine to its 2- and 3-center variants.
    fn dummy(center: Vector3<f64>) -> Self {
        Self {
            exp: 0.0,
            center,
            pow: (0, 0, 0),
        }
    }
}

fn primitive_overlap(a: Prim, b: Prim) -> f64 {
    let p = a.exp + b.exp;
    let d = a.center - b.center;
    hermite_expansion(a.pow.0, b.pow.0, 0, d.x, a.exp, b.exp)
        * hermite_expansion(a.pow.1, b.pow.1, 0, d.y, a.exp, b.exp)
        * hermite_expansion(a.pow.2, b.pow.2, 0, d.z, a.exp, b.exp)
        * (std::f64::consts::PI / p).powf(1.5)
}

/// Kinetic energy via angular-momentum-shifted overlaps on the ket.
fn primitive_kinetic(a: Prim, b: Prim) -> f64 {
    let (l, m, n) = b.pow;
    let shifted = |dx: i32, dy: i32, dz: i32| {
        primitive_overlap(
            a,
            Prim {
                pow: (l + dx, m + dy, n + dz),
                ..b
            },
        )
    };

    let term_0 = b.exp * (2 * (l + m + n) + 3) as f64 * primitive_overlap(a, b);
    let term_1 = -2.0 * b.exp.powi(2) * (shifted(2, 0, 0) + shifted(0, 2, 0) + shifted(0, 0, 2));
    let term_2 = -0.5
        * ((l * (l - 1)) as f64 * shifted(-2, 0, 0)
            + (m * (m - 1)) as f64 * shifted(0, -2, 0)
            + (n * (n - 1)) as f64 * shifted(0, 0, -2));
    term_0 + term_1 + term_2
}

/// `<a| 1/|r - c| |b>` (positive operator; nuclear attraction applies the
/// charges).
fn primitive_rinv(a: Prim, b: Prim, c: Vector3<f64>) -> f64 {
    let p = a.exp + b.exp;
    let rp = (a.exp * a.center + b.exp * b.center) / p;
    let d = a.center - b.center;
    let pc = rp - c;

    let mut total = 0.0;
    for t in 0..=(a.pow.0 + b.pow.0) {
        for u in 0..=(a.pow.1 + b.pow.1) {
            for v in 0..=(a.pow.2 + b.pow.2) {
                total += hermite_expansion(a.pow.0, b.pow.0, t, d.x, a.exp, b.exp)
                    * hermite_expansion(a.pow.1, b.pow.1, u, d.y, a.exp, b.exp)
                    * hermite_expansion(a.pow.2, b.pow.2, v, d.z, a.exp, b.exp)
                    * coulomb_auxiliary(t, u, v, 0, p, pc);
            }
        }
    }
    2.0 * std::f64::consts::PI / p * total
}

/// `(ab|1/r12|cd)` over four primitives (chemists' ordering).
fn primitive_eri(a: Prim, b: Prim, c: Prim, d: Prim) -> f64 {
    let p = a.exp + b.exp;
    let q = c.exp + d.exp;
    let alpha = p * q / (p + q);
    let rp = (a.exp * a.center + b.exp * b.center) / p;
    let rq = (c.exp * c.center + d.exp * d.center) / q;
    let dab = a.center - b.center;
    let dcd = c.center - d.center;
    let pq = rp - rq;

    let mut total = 0.0;
    for t1 in 0..=(a.pow.0 + b.pow.0) {
        for u1 in 0..=(a.pow.1 + b.pow.1) {
            for v1 in 0..=(a.pow.2 + b.pow.2) {
                let e1 = hermite_expansion(a.pow.0, b.pow.0, t1, dab.x, a.exp, b.exp)
                    * hermite_expansion(a.pow.1, b.pow.1, u1, dab.y, a.exp, b.exp)
                    * hermite_expansion(a.pow.2, b.pow.2, v1, dab.z, a.exp, b.exp);
                if e1 == 0.0 {
                    continue;
                }
                for t2 in 0..=(c.pow.0 + d.pow.0) {
                    for u2 in 0..=(c.pow.1 + d.pow.1) {
                        for v2 in 0..=(c.pow.2 + d.pow.2) {
                            let e2 = hermite_expansion(c.pow.0, d.pow.0, t2, dcd.x, c.exp, d.exp)
                                * hermite_expansion(c.pow.1, d.pow.1, u2, dcd.y, c.exp, d.exp)
                                * hermite_expansion(c.pow.2, d.pow.2, v2, dcd.z, c.exp, d.exp);
                            let sign = if (t2 + u2 + v2) % 2 == 0 { 1.0 } else { -1.0 };
                            total += e1
                                * e2
                                * sign
                                * coulomb_auxiliary(t1 + t2, u1 + u2, v1 + v2, 0, alpha, pq);
                        }
                    }
                }
            }
        }
    }
    2.0 * std::f64::consts::PI.powf(2.5) / (p * q * (p + q).sqrt()) * total
}

fn base_value(op: Operator, prims: &[Prim], env: &BasisEnv) -> f64 {
    match op {
        Operator::Ovlp => primitive_overlap(prims[0], prims[1]),
        Operator::Kin => primitive_kinetic(prims[0], prims[1]),
        Operator::Rinv => primitive_rinv(prims[0], prims[1], env.rinv_origin()),
        Operator::Nuc => (0..env.natm())
            .map(|i| -env.atom_charge(i) * primitive_rinv(prims[0], prims[1], env.atom_coord(i)))
            .sum(),
        Operator::R12 => primitive_eri(
            prims[0],
            Prim::dummy(prims[0].center),
            prims[1],
            Prim::dummy(prims[1].center),
        ),
        Operator::Ar12 => primitive_eri(
            prims[0],
            prims[1],
            prims[2],
            Prim::dummy(prims[2].center),
        ),
        Operator::Ar12b => primitive_eri(prims[0], prims[1], prims[2], prims[3]),
    }
}

type Prims = SmallVec<[Prim; 4]>;

/// Applies the remaining derivative markers one at a time, each as a central
/// difference of the base integral. The negation matches the convention
/// that `ip` differentiates with respect to the electron coordinate and
/// `rr` inserts `+r²` (the width enters the exponent with a negative sign).
fn eval_markers(
    op: Operator,
    prims: &Prims,
    sites: &[(usize, Marker)],
    dirs: &[usize],
    env: &BasisEnv,
) -> f64 {
    let Some(&(slot, marker)) = sites.first() else {
        return base_value(op, prims, env);
    };
    match marker {
        Marker::Ip => {
            let d = dirs[0];
            let mut plus = prims.clone();
            plus[slot].center[d] += FD_STEP;
            let mut minus = prims.clone();
            minus[slot].center[d] -= FD_STEP;
            -(eval_markers(op, &plus, &sites[1..], &dirs[1..], env)
                - eval_markers(op, &minus, &sites[1..], &dirs[1..], env))
                / (2.0 * FD_STEP)
        }
        Marker::Rr => {
            let mut plus = prims.clone();
            plus[slot].exp += FD_STEP;
            let mut minus = prims.clone();
            minus[slot].exp -= FD_STEP;
            -(eval_markers(op, &plus, &sites[1..], dirs, env)
                - eval_markers(op, &minus, &sites[1..], dirs, env))
                / (2.0 * FD_STEP)
        }
    }
}

/// Marker sites in rendered order; the component axes decode in the same
/// order.
fn marker_sites(name: &Shortname) -> Vec<(usize, Marker)> {
    name.slots()
        .iter()
        .enumerate()
        .flat_map(|(slot, markers)| markers.iter().map(move |&m| (slot, m)))
        .collect()
}

fn decode_comp(c: usize, n_ip: usize) -> Vec<usize> {
    let mut dirs = vec![0; n_ip];
    let mut rem = c;
    for k in (0..n_ip).rev() {
        dirs[k] = rem % 3;
        rem /= 3;
    }
    dirs
}

/// Cartesian power triples of angular momentum `l`, x-power descending.
pub(crate) fn cartesian_powers(l: i32) -> Vec<(i32, i32, i32)> {
    let mut pows = Vec::with_capacity(((l + 1) * (l + 2) / 2) as usize);
    for lx in (0..=l).rev() {
        for ly in (0..=(l - lx)).rev() {
            pows.push((lx, ly, l - lx - ly));
        }
    }
    pows
}

struct ShellData {
    center: Vector3<f64>,
    exps: Vec<f64>,
    coeffs: Vec<f64>,
    pows: Vec<(i32, i32, i32)>,
}

/// Precomputed per-shell primitive data, snapshotted from the tables when an
/// integral handle is acquired and dropped with it.
pub(crate) struct ShellCache {
    shells: Vec<ShellData>,
}

impl ShellCache {
    pub(crate) fn new(env: &BasisEnv) -> Self {
        let shells = (0..env.nshell())
            .map(|sh| ShellData {
                center: env.shell_center(sh),
                exps: env.shell_exponents(sh),
                coeffs: env.shell_coefficients(sh),
                pows: cartesian_powers(env.shell_l(sh)),
            })
            .collect();
        Self { shells }
    }
}

/// Contracts the primitive integral over all primitive tuples of the shells.
fn contracted_value(
    name: &Shortname,
    shells: &[&ShellData],
    pows: &[(i32, i32, i32)],
    sites: &[(usize, Marker)],
    dirs: &[usize],
    env: &BasisEnv,
) -> f64 {
    shells
        .iter()
        .map(|s| 0..s.exps.len())
        .multi_cartesian_product()
        .map(|idx| {
            let coeff: f64 = idx.iter().zip(shells).map(|(&p, s)| s.coeffs[p]).product();
            let prims: Prims = idx
                .iter()
                .zip(shells)
                .zip(pows)
                .map(|((&p, s), &pow)| Prim {
                    exp: s.exps[p],
                    center: s.center,
                    pow,
                })
                .collect();
            coeff * eval_markers(name.op(), &prims, sites, dirs, env)
        })
        .sum()
}

fn range_data(cache: &ShellCache, range: (usize, usize)) -> (&[ShellData], Vec<usize>, usize) {
    let shells = &cache.shells[range.0..range.1];
    let mut offsets = Vec::with_capacity(shells.len());
    let mut nao = 0;
    for s in shells {
        offsets.push(nao);
        nao += s.pows.len();
    }
    (shells, offsets, nao)
}

/// 2-center driver. Fills `out` in the backend-native layout
/// `(comp..., nao1, nao0)`, first-center index fastest.
pub(crate) fn gto_int2c(
    name: &Shortname,
    env: &BasisEnv,
    cache: &ShellCache,
    shls: &[(usize, usize); 2],
    out: &mut [f64],
) {
    let sites = marker_sites(name);
    let n_ip = name.n_ip();
    let (sh0, off0, nao0) = range_data(cache, shls[0]);
    let (sh1, off1, nao1) = range_data(cache, shls[1]);
    assert_eq!(out.len(), name.ncomp() * nao0 * nao1);

    for (i0, s0) in sh0.iter().enumerate() {
        for (i1, s1) in sh1.iter().enumerate() {
            log::trace!("{}: shell pair ({i0}, {i1})", name.routine_name(false));
            for (pi, &pow0) in s0.pows.iter().enumerate() {
                for (pj, &pow1) in s1.pows.iter().enumerate() {
                    let (i, j) = (off0[i0] + pi, off1[i1] + pj);
                    for c in 0..name.ncomp() {
                        let dirs = decode_comp(c, n_ip);
                        out[(c * nao1 + j) * nao0 + i] = contracted_value(
                            name,
                            &[s0, s1],
                            &[pow0, pow1],
                            &sites,
                            &dirs,
                            env,
                        );
                    }
                }
            }
        }
    }
}

/// 3-center driver, native layout `(comp..., nao2, nao1, nao0)`.
pub(crate) fn gto_int3c(
    name: &Shortname,
    env: &BasisEnv,
    cache: &ShellCache,
    shls: &[(usize, usize); 3],
    out: &mut [f64],
) {
    let sites = marker_sites(name);
    let n_ip = name.n_ip();
    let (sh0, off0, nao0) = range_data(cache, shls[0]);
    let (sh1, off1, nao1) = range_data(cache, shls[1]);
    let (sh2, off2, nao2) = range_data(cache, shls[2]);
    assert_eq!(out.len(), name.ncomp() * nao0 * nao1 * nao2);

    for (i0, s0) in sh0.iter().enumerate() {
        for (i1, s1) in sh1.iter().enumerate() {
            for (i2, s2) in sh2.iter().enumerate() {
                for (pi, &pow0) in s0.pows.iter().enumerate() {
                    for (pj, &pow1) in s1.pows.iter().enumerate() {
                        for (pk, &pow2) in s2.pows.iter().enumerate() {
                            let (i, j, k) = (off0[i0] + pi, off1[i1] + pj, off2[i2] + pk);
                            for c in 0..name.ncomp() {
                                let dirs = decode_comp(c, n_ip);
                                out[((c * nao2 + k) * nao1 + j) * nao0 + i] = contracted_value(
                                    name,
                                    &[s0, s1, s2],
                                    &[pow0, pow1, pow2],
                                    &sites,
                                    &dirs,
                                    env,
                                );
                            }
                        }
                    }
                }
            }
        }
    }
}

/// 4-center driver, natural layout `(comp..., nao0, nao1, nao2, nao3)`.
pub(crate) fn gto_int4c(
    name: &Shortname,
    env: &BasisEnv,
    cache: &ShellCache,
    shls: &[(usize, usize); 4],
    out: &mut [f64],
) {
    let sites = marker_sites(name);
    let n_ip = name.n_ip();
    let (sh0, off0, nao0) = range_data(cache, shls[0]);
    let (sh1, off1, nao1) = range_data(cache, shls[1]);
    let (sh2, off2, nao2) = range_data(cache, shls[2]);
    let (sh3, off3, nao3) = range_data(cache, shls[3]);
    assert_eq!(out.len(), name.ncomp() * nao0 * nao1 * nao2 * nao3);

    for (i0, s0) in sh0.iter().enumerate() {
        for (i1, s1) in sh1.iter().enumerate() {
            for (i2, s2) in sh2.iter().enumerate() {
                for (i3, s3) in sh3.iter().enumerate() {
                    log::trace!(
                        "{}: shell quartet ({i0}, {i1}, {i2}, {i3})",
                        name.routine_name(false)
                    );
                    for (pi, &pow0) in s0.pows.iter().enumerate() {
                        for (pj, &pow1) in s1.pows.iter().enumerate() {
                            for (pk, &pow2) in s2.pows.iter().enumerate() {
                                for (pl, &pow3) in s3.pows.iter().enumerate() {
                                    let (i, j, k, l) = (
                                        off0[i0] + pi,
                                        off1[i1] + pj,
                                        off2[i2] + pk,
                                        off3[i3] + pl,
                                    );
                                    for c in 0..name.ncomp() {
                                        let dirs = decode_comp(c, n_ip);
                                        out[(((c * nao0 + i) * nao1 + j) * nao2 + k) * nao3 + l] =
                                            contracted_value(
                                                name,
                                                &[s0, s1, s2, s3],
                                                &[pow0, pow1, pow2, pow3],
                                                &sites,
                                                &dirs,
                                                env,
                                            );
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::gto_norm;
    use approx::assert_relative_eq;

    fn s_prim(alpha: f64, center: Vector3<f64>) -> Prim {
        Prim {
            exp: alpha,
            center,
            pow: (0, 0, 0),
        }
    }

    #[test]
    fn normalized_s_self_overlap_is_one() {
        let alpha = 0.9;
        let a = s_prim(alpha, Vector3::zeros());
        let n = gto_norm(0, alpha);
        assert_relative_eq!(n * n * primitive_overlap(a, a), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn s_pair_overlap_closed_form() {
        // equal exponents: S = exp(-alpha R^2 / 2) for normalized primitives
        let alpha = 0.8;
        let r = 1.3;
        let a = s_prim(alpha, Vector3::zeros());
        let b = s_prim(alpha, Vector3::new(0.0, 0.0, r));
        let n = gto_norm(0, alpha);
        assert_relative_eq!(
            n * n * primitive_overlap(a, b),
            (-alpha * r * r / 2.0).exp(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn normalized_s_kinetic_is_three_halves_alpha() {
        let alpha = 1.7;
        let a = s_prim(alpha, Vector3::zeros());
        let n = gto_norm(0, alpha);
        assert_relative_eq!(
            n * n * primitive_kinetic(a, a),
            1.5 * alpha,
            epsilon = 1e-12
        );
    }

    #[test]
    fn normalized_s_rinv_at_center() {
        // <1/r> = 2 sqrt(2 alpha / pi)
        let alpha = 1.1;
        let a = s_prim(alpha, Vector3::zeros());
        let n = gto_norm(0, alpha);
        assert_relative_eq!(
            n * n * primitive_rinv(a, a, Vector3::zeros()),
            2.0 * (2.0 * alpha / std::f64::consts::PI).sqrt(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn normalized_s_eri_same_center() {
        // (ss|ss) = 2 sqrt(alpha / pi) for four identical normalized s
        let alpha = 1.0;
        let a = s_prim(alpha, Vector3::zeros());
        let n4 = gto_norm(0, alpha).powi(4);
        assert_relative_eq!(
            n4 * primitive_eri(a, a, a, a),
            2.0 * (alpha / std::f64::consts::PI).sqrt(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn dummy_centers_reduce_eri_to_two_center_coulomb() {
        // (a|1/r12|b) for concentric s primitives has a closed form
        let (a1, a2) = (0.9, 1.4);
        let a = s_prim(a1, Vector3::zeros());
        let b = s_prim(a2, Vector3::zeros());
        let got = primitive_eri(a, Prim::dummy(a.center), b, Prim::dummy(b.center));
        let expected = 2.0 * std::f64::consts::PI.powf(2.5) / (a1 * a2 * (a1 + a2).sqrt());
        assert_relative_eq!(got, expected, epsilon = 1e-12);
    }

    #[test]
    fn spatial_marker_matches_analytic_derivative() {
        // d/dZ_a of the normalized s pair overlap, with the ip convention
        // flipping the sign
        let alpha = 0.8;
        let r: f64 = 1.1;
        let prims: Prims = [
            s_prim(alpha, Vector3::zeros()),
            s_prim(alpha, Vector3::new(0.0, 0.0, r)),
        ]
        .into_iter()
        .collect();
        let env = BasisEnv::build(&[]);
        let got = eval_markers(
            Operator::Ovlp,
            &prims,
            &[(0, Marker::Ip)],
            &[2],
            &env,
        );
        // S(R) = (pi/2alpha)^(3/2) exp(-alpha R^2/2); dS/dZa = alpha R S
        let s = (std::f64::consts::PI / (2.0 * alpha)).powf(1.5) * (-alpha * r * r / 2.0).exp();
        assert_relative_eq!(got, -alpha * r * s, epsilon = 1e-8);
    }

    #[test]
    fn width_marker_matches_analytic_derivative() {
        // -d/dalpha of the s self overlap: S(alpha) = (pi/2alpha)^(3/2)
        let alpha: f64 = 1.3;
        let prims: Prims = [s_prim(alpha, Vector3::zeros()); 2].into_iter().collect();
        let env = BasisEnv::build(&[]);
        let got = eval_markers(
            Operator::Ovlp,
            &prims,
            &[(0, Marker::Rr)],
            &[],
            &env,
        );
        let expected = 1.5 * (std::f64::consts::PI / (2.0 * alpha)).powf(1.5) / (2.0 * alpha);
        assert_relative_eq!(got, expected, epsilon = 1e-7);
    }

    #[test]
    fn cartesian_powers_are_x_major() {
        assert_eq!(cartesian_powers(0), vec![(0, 0, 0)]);
        assert_eq!(
            cartesian_powers(1),
            vec![(1, 0, 0), (0, 1, 0), (0, 0, 1)]
        );
        assert_eq!(cartesian_powers(2)[0], (2, 0, 0));
        assert_eq!(cartesian_powers(2).len(), 6);
    }

    #[test]
    fn boys_zero_argument() {
        assert_relative_eq!(boys_fn(0, 0.0), 1.0, epsilon = 1e-12);
        assert_relative_eq!(boys_fn(2, 0.0), 0.2, epsilon = 1e-10);
    }
}
