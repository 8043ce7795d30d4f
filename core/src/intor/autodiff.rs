//! Differentiable integral primitives.
//!
//! The forward pass runs the integral handle; the backward pass assembles
//! gradients with respect to the flattened basis parameters from
//! derivative-named integrals fetched through the transpose resolver:
//!
//! - positions: spatial-marker integrals per center role, contracted against
//!   the upstream gradient with a sign flip and scatter-added onto the atom
//!   owning each orbital; `nuc` additionally picks up the motion of the
//!   nuclei through per-atom recentered `rinv` derivatives scaled by `-Z`,
//! - recenter point: the same spatial derivatives, fully contracted, with a
//!   positive sign,
//! - coefficients and exponents: through one shared decontraction of all
//!   participating wrappers, gathered gradient, contract per orbital and
//!   scatter back per primitive.

use nalgebra::Vector3;
use ndarray::{Array1, Array2, ArrayD, Axis};

use super::engine::Intor;
use super::equiv::fetch_integrals;
use super::name::{DerivCenter, IntorFamily, Marker, Operator, Shortname};
use crate::autograd::{Tape, Var};
use crate::basis::{decontract, BasisWrapper};

fn center_roles(family: IntorFamily) -> &'static [DerivCenter] {
    use DerivCenter::*;
    match family {
        IntorFamily::Int1e | IntorFamily::Int2c2e => &[A1, A2],
        IntorFamily::Int3c2e => &[A1, A2, B],
        IntorFamily::Int2e => &[A1, A2, B1, B2],
    }
}

/// Runs one integral off-tape, recentering the tables first when the
/// operator needs it.
fn raw_calc(
    name: &Shortname,
    wrappers: &[&BasisWrapper],
    rinv_pos: Option<Vector3<f64>>,
) -> ArrayD<f64> {
    if name.op() == Operator::Rinv {
        let pos = rinv_pos.expect("rinv integrals need a recenter point");
        let _guard = wrappers[0].env().set_rinv_origin(pos);
        Intor::new(name, wrappers).calc()
    } else {
        Intor::new(name, wrappers).calc()
    }
}

fn to_vector3(a: &ArrayD<f64>) -> Vector3<f64> {
    assert_eq!(a.len(), 3, "recenter point must have 3 components");
    Vector3::new(a[[0]], a[[1]], a[[2]])
}

/// `out[d, a] = Σ dout[d, comps, ..a..] grad[comps, ..a..]` keeping the
/// leading size-3 derivative axis and the AO axis of `role`.
fn contract_keep_deriv(
    dout: &ArrayD<f64>,
    grad: &ArrayD<f64>,
    naos: &[usize],
    role: usize,
) -> Array2<f64> {
    let nao_total: usize = naos.iter().product();
    let ncomp = grad.len() / nao_total;
    let pre: usize = naos[..role].iter().product();
    let nao = naos[role];
    let post: usize = naos[role + 1..].iter().product();

    let dstd = dout.as_standard_layout();
    let gstd = grad.as_standard_layout();
    let d = dstd.as_slice().expect("standard layout");
    let g = gstd.as_slice().expect("standard layout");

    let mut out = Array2::zeros((3, nao));
    for dir in 0..3 {
        for c in 0..ncomp {
            for p in 0..pre {
                for a in 0..nao {
                    for q in 0..post {
                        let gi = (((c * pre + p) * nao + a) * post) + q;
                        out[(dir, a)] += d[dir * grad.len() + gi] * g[gi];
                    }
                }
            }
        }
    }
    out
}

/// Like [`contract_keep_deriv`] without a derivative axis: `out[a] = Σ
/// int[comps, ..a..] grad[comps, ..a..]`.
fn contract_keep(
    int: &ArrayD<f64>,
    grad: &ArrayD<f64>,
    naos: &[usize],
    role: usize,
) -> Array1<f64> {
    let nao_total: usize = naos.iter().product();
    let ncomp = grad.len() / nao_total;
    let pre: usize = naos[..role].iter().product();
    let nao = naos[role];
    let post: usize = naos[role + 1..].iter().product();

    let istd = int.as_standard_layout();
    let gstd = grad.as_standard_layout();
    let v = istd.as_slice().expect("standard layout");
    let g = gstd.as_slice().expect("standard layout");

    let mut out = Array1::zeros(nao);
    for c in 0..ncomp {
        for p in 0..pre {
            for a in 0..nao {
                for q in 0..post {
                    let gi = (((c * pre + p) * nao + a) * post) + q;
                    out[a] += v[gi] * g[gi];
                }
            }
        }
    }
    out
}

/// Full contraction over everything but the leading derivative axis.
fn contract_all_deriv(dout: &ArrayD<f64>, grad: &ArrayD<f64>) -> Array1<f64> {
    let n = grad.len();
    let dstd = dout.as_standard_layout();
    let gstd = grad.as_standard_layout();
    let d = dstd.as_slice().expect("standard layout");
    let g = gstd.as_slice().expect("standard layout");

    let mut out = Array1::zeros(3);
    for dir in 0..3 {
        for i in 0..n {
            out[dir] += d[dir * n + i] * g[i];
        }
    }
    out
}

/// Expands the upstream gradient onto the uncontracted orbitals by gathering
/// along every trailing AO axis.
fn gather_ao_axes(grad: &ArrayD<f64>, maps: &[Vec<usize>]) -> ArrayD<f64> {
    let first_ao = grad.ndim() - maps.len();
    let mut out = grad.to_owned();
    for (k, map) in maps.iter().enumerate() {
        out = out.select(Axis(first_ao + k), map);
    }
    out
}

fn scatter_add(target: &mut Array1<f64>, idx: &[usize], src: &Array1<f64>) {
    for (a, &t) in idx.iter().enumerate() {
        target[t] += src[a];
    }
}

/// Records one integral on the tape. Parent order is coefficients,
/// exponents, positions, then (for `rinv` only) the recenter point.
fn record(
    tape: &Tape,
    coeffs: Var,
    alphas: Var,
    poss: Var,
    rinv_pos: Option<Var>,
    wrappers: Vec<BasisWrapper>,
    name: &Shortname,
) -> Var {
    let is_rinv = name.op() == Operator::Rinv;
    assert!(
        !is_rinv || rinv_pos.is_some(),
        "the keyword rinv_pos must be specified for rinv integrals"
    );

    let rinv_val = if is_rinv {
        rinv_pos.map(|v| to_vector3(&tape.value(v)))
    } else {
        None
    };
    let wrefs: Vec<&BasisWrapper> = wrappers.iter().collect();
    let value = raw_calc(name, &wrefs, rinv_val);

    let mut parents = vec![coeffs, alphas, poss];
    if is_rinv {
        if let Some(v) = rinv_pos {
            parents.push(v);
        }
    }
    let nparents = parents.len();

    let coeffs_val = tape.value(coeffs);
    let natm = wrappers[0].natm();
    let name = name.clone();

    let backward = move |grad: &ArrayD<f64>, wanted: &[bool]| -> Vec<Option<ArrayD<f64>>> {
        let mut out: Vec<Option<ArrayD<f64>>> = vec![None; nparents];
        let wrefs: Vec<&BasisWrapper> = wrappers.iter().collect();
        let naos: Vec<usize> = wrappers.iter().map(|w| w.nao()).collect();
        let roles = center_roles(name.family());

        if wanted[2] {
            let mut grad_poss = Array2::<f64>::zeros((natm, 3));

            let dnames: Vec<Shortname> =
                roles.iter().map(|&r| name.derive(r, Marker::Ip)).collect();
            let douts = fetch_integrals(&dnames, &wrefs, |ws, n| raw_calc(n, ws, rinv_val));
            for (role, dout) in douts.iter().enumerate() {
                // the routine differentiates w.r.t. the electron coordinate,
                // not the basis center, hence the sign flip
                let contracted = contract_keep_deriv(dout, grad, &naos, role);
                for (a, &atom) in wrappers[role].ao_to_atom().iter().enumerate() {
                    for dir in 0..3 {
                        grad_poss[(atom, dir)] -= contracted[(dir, a)];
                    }
                }
            }

            if name.op() == Operator::Nuc {
                // the operator itself moves with the nuclei; decompose into
                // per-atom recentered rinv derivatives
                let rname = name.with_op(Operator::Rinv);
                let dnames = [
                    rname.derive(DerivCenter::A1, Marker::Ip),
                    rname.derive(DerivCenter::A2, Marker::Ip),
                ];
                let env = wrappers[0].env();
                for i in 0..natm {
                    let z = env.atom_charge(i);
                    let origin = env.atom_coord(i);
                    let douts =
                        fetch_integrals(&dnames, &wrefs, |ws, n| raw_calc(n, ws, Some(origin)));
                    let total = &douts[0] + &douts[1];
                    let gd = contract_all_deriv(&total, grad);
                    for dir in 0..3 {
                        grad_poss[(i, dir)] += -z * gd[dir];
                    }
                }
            }
            out[2] = Some(grad_poss.into_dyn());
        }

        if is_rinv && wanted[3] {
            let dnames = [
                name.derive(DerivCenter::A1, Marker::Ip),
                name.derive(DerivCenter::A2, Marker::Ip),
            ];
            let douts = fetch_integrals(&dnames, &wrefs, |ws, n| raw_calc(n, ws, rinv_val));
            let total = &douts[0] + &douts[1];
            out[3] = Some(contract_all_deriv(&total, grad).into_dyn());
        }

        if wanted[0] || wanted[1] {
            let (u_wrappers, uao2aos) = decontract(&wrefs);
            let u_refs: Vec<&BasisWrapper> = u_wrappers.iter().collect();
            let u_naos: Vec<usize> = u_wrappers.iter().map(|w| w.nao()).collect();
            let u_grad = gather_ao_axes(grad, &uao2aos);
            let ao2shls: Vec<Vec<usize>> =
                u_wrappers.iter().map(|w| w.ao_to_shell()).collect();

            if wanted[0] {
                let mut gcoeff = Array1::zeros(coeffs_val.len());
                let u_int = raw_calc(&name, &u_refs, rinv_val);
                for (role, ao2shl) in ao2shls.iter().enumerate() {
                    // the integral is linear in each primitive coefficient,
                    // so the uncontracted value carries one factor of it
                    let mut contracted = contract_keep(&u_int, &u_grad, &u_naos, role);
                    for (a, &sh) in ao2shl.iter().enumerate() {
                        let c = coeffs_val[[sh]];
                        assert!(
                            c != 0.0,
                            "coefficient gradients need nonzero stored contraction coefficients"
                        );
                        contracted[a] /= c;
                    }
                    scatter_add(&mut gcoeff, ao2shl, &contracted);
                }
                out[0] = Some(gcoeff.into_dyn());
            }

            if wanted[1] {
                let mut galpha = Array1::zeros(coeffs_val.len());
                let dnames: Vec<Shortname> =
                    roles.iter().map(|&r| name.derive(r, Marker::Rr)).collect();
                let douts = fetch_integrals(&dnames, &u_refs, |ws, n| raw_calc(n, ws, rinv_val));
                for (role, dout) in douts.iter().enumerate() {
                    // negative because the width enters as -alpha (r-R)^2
                    let contracted = -contract_keep(dout, &u_grad, &u_naos, role);
                    scatter_add(&mut galpha, &ao2shls[role], &contracted);
                }
                out[1] = Some(galpha.into_dyn());
            }
        }

        out
    };

    tape.custom(value, parents, Box::new(backward))
}

/// Differentiable 2-center integral (`int1e` and `int2c2e` families).
pub(crate) fn int2c_apply(
    tape: &Tape,
    coeffs: Var,
    alphas: Var,
    poss: Var,
    rinv_pos: Option<Var>,
    wrappers: [&BasisWrapper; 2],
    name: &Shortname,
) -> Var {
    assert_eq!(name.family().ncenters(), 2);
    record(
        tape,
        coeffs,
        alphas,
        poss,
        rinv_pos,
        wrappers.iter().map(|&w| w.clone()).collect(),
        name,
    )
}

/// Differentiable 3-center integral (`int3c2e` family).
pub(crate) fn int3c_apply(
    tape: &Tape,
    coeffs: Var,
    alphas: Var,
    poss: Var,
    wrappers: [&BasisWrapper; 3],
    name: &Shortname,
) -> Var {
    assert_eq!(name.family().ncenters(), 3);
    record(
        tape,
        coeffs,
        alphas,
        poss,
        None,
        wrappers.iter().map(|&w| w.clone()).collect(),
        name,
    )
}

/// Differentiable 4-center integral (`int2e` family).
pub(crate) fn int4c_apply(
    tape: &Tape,
    coeffs: Var,
    alphas: Var,
    poss: Var,
    wrappers: [&BasisWrapper; 4],
    name: &Shortname,
) -> Var {
    assert_eq!(name.family().ncenters(), 4);
    record(
        tape,
        coeffs,
        alphas,
        poss,
        None,
        wrappers.iter().map(|&w| w.clone()).collect(),
        name,
    )
}
