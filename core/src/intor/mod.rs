//! Differentiable molecular integrals over shared basis tables.
//!
//! The functions here are the public entry points: each records one
//! integral on the caller's tape and returns the handle of its result.
//! Cooperating wrappers must be views of the same table set; that is
//! checked by identity before any native call.

mod autodiff;
mod engine;
mod equiv;
mod kernel;
mod name;

pub use engine::Intor;
pub use equiv::{apply_transpose, fetch_integrals, transpose_path, TransposePath};
pub use name::{DerivCenter, IntorFamily, Marker, Operator, Shortname};

use autodiff::{int2c_apply, int3c_apply, int4c_apply};

use crate::autograd::{Tape, Var};
use crate::basis::BasisWrapper;

/// The flattened differentiable basis parameters as tape leaves:
/// primitive coefficients `(ngauss,)`, primitive exponents `(ngauss,)` and
/// atom positions `(natm, 3)`.
pub struct BasisParams {
    pub coeffs: Var,
    pub alphas: Var,
    pub poss: Var,
}

impl BasisParams {
    /// Snapshots the wrapper's stored parameters onto the tape. The flags
    /// select which of coefficients, exponents and positions require
    /// gradients.
    pub fn new(tape: &Tape, wrapper: &BasisWrapper, requires_grad: [bool; 3]) -> Self {
        let (coeffs, alphas, poss) = wrapper.params();
        Self {
            coeffs: tape.leaf(coeffs.into_dyn(), requires_grad[0]),
            alphas: tape.leaf(alphas.into_dyn(), requires_grad[1]),
            poss: tape.leaf(poss.into_dyn(), requires_grad[2]),
        }
    }
}

fn check_and_set<'a>(wrapper: &'a BasisWrapper, other: Option<&'a BasisWrapper>) -> &'a BasisWrapper {
    match other {
        Some(other) => {
            assert!(
                wrapper.same_tables(other),
                "argument `other*` does not view the same tables as the wrapper; \
                 build all wrappers from one table set first"
            );
            other
        }
        None => wrapper,
    }
}

/// 2-center 1-electron integral. `rinv_pos` must be given for `rinv`
/// integrals and is ignored otherwise.
pub fn int1e(
    tape: &Tape,
    params: &BasisParams,
    name: &Shortname,
    wrapper: &BasisWrapper,
    other: Option<&BasisWrapper>,
    rinv_pos: Option<Var>,
) -> Var {
    assert_eq!(name.family(), IntorFamily::Int1e);
    let other = check_and_set(wrapper, other);
    let rinv_pos = if name.op() == Operator::Rinv {
        assert!(
            rinv_pos.is_some(),
            "the keyword rinv_pos must be specified for rinv integrals"
        );
        rinv_pos
    } else {
        None
    };
    int2c_apply(
        tape,
        params.coeffs,
        params.alphas,
        params.poss,
        rinv_pos,
        [wrapper, other],
        name,
    )
}

/// 2-center 2-electron integral: `wrapper` carries the first electron and
/// `other` the second.
pub fn int2c2e(
    tape: &Tape,
    params: &BasisParams,
    name: &Shortname,
    wrapper: &BasisWrapper,
    other: Option<&BasisWrapper>,
) -> Var {
    assert_eq!(name.family(), IntorFamily::Int2c2e);
    let other = check_and_set(wrapper, other);
    int2c_apply(
        tape,
        params.coeffs,
        params.alphas,
        params.poss,
        None,
        [wrapper, other],
        name,
    )
}

/// 3-center 2-electron integral: `wrapper` and `other1` carry the first
/// electron, `other2` the second. Result axes follow the argument order.
pub fn int3c2e(
    tape: &Tape,
    params: &BasisParams,
    name: &Shortname,
    wrapper: &BasisWrapper,
    other1: Option<&BasisWrapper>,
    other2: Option<&BasisWrapper>,
) -> Var {
    assert_eq!(name.family(), IntorFamily::Int3c2e);
    let other1 = check_and_set(wrapper, other1);
    let other2 = check_and_set(wrapper, other2);
    int3c_apply(
        tape,
        params.coeffs,
        params.alphas,
        params.poss,
        [wrapper, other1, other2],
        name,
    )
}

/// 4-center 2-electron integral: `wrapper` and `other1` carry the first
/// electron, `other2` and `other3` the second.
pub fn int2e(
    tape: &Tape,
    params: &BasisParams,
    name: &Shortname,
    wrapper: &BasisWrapper,
    other1: Option<&BasisWrapper>,
    other2: Option<&BasisWrapper>,
    other3: Option<&BasisWrapper>,
) -> Var {
    assert_eq!(name.family(), IntorFamily::Int2e);
    let other1 = check_and_set(wrapper, other1);
    let other2 = check_and_set(wrapper, other2);
    let other3 = check_and_set(wrapper, other3);
    int4c_apply(
        tape,
        params.coeffs,
        params.alphas,
        params.poss,
        [wrapper, other1, other2, other3],
        name,
    )
}

// shortcuts

pub fn overlap(
    tape: &Tape,
    params: &BasisParams,
    wrapper: &BasisWrapper,
    other: Option<&BasisWrapper>,
) -> Var {
    int1e(tape, params, &Shortname::new(Operator::Ovlp), wrapper, other, None)
}

pub fn kinetic(
    tape: &Tape,
    params: &BasisParams,
    wrapper: &BasisWrapper,
    other: Option<&BasisWrapper>,
) -> Var {
    int1e(tape, params, &Shortname::new(Operator::Kin), wrapper, other, None)
}

/// Nuclear attraction. Integer charges use the native `nuc` routine;
/// fractional charges assemble the per-atom `rinv` sum on the tape, so the
/// result stays differentiable w.r.t. the nuclear positions.
pub fn nuclattr(
    tape: &Tape,
    params: &BasisParams,
    wrapper: &BasisWrapper,
    other: Option<&BasisWrapper>,
) -> Var {
    if !wrapper.fracz() {
        return int1e(tape, params, &Shortname::new(Operator::Nuc), wrapper, other, None);
    }
    let rinv = Shortname::new(Operator::Rinv);
    let mut res: Option<Var> = None;
    for i in 0..wrapper.natm() {
        let origin = tape.select_row(params.poss, i);
        let y = int1e(tape, params, &rinv, wrapper, other, Some(origin));
        let y = tape.scale(y, -wrapper.env().atom_charge(i));
        res = Some(match res {
            Some(acc) => tape.add(acc, y),
            None => y,
        });
    }
    res.expect("nuclear attraction needs at least one atom")
}

/// Electron repulsion `(ij|kl)`.
pub fn elrep(
    tape: &Tape,
    params: &BasisParams,
    wrapper: &BasisWrapper,
    other1: Option<&BasisWrapper>,
    other2: Option<&BasisWrapper>,
    other3: Option<&BasisWrapper>,
) -> Var {
    int2e(
        tape,
        params,
        &Shortname::new(Operator::Ar12b),
        wrapper,
        other1,
        other2,
        other3,
    )
}

pub fn coul2c(
    tape: &Tape,
    params: &BasisParams,
    wrapper: &BasisWrapper,
    other: Option<&BasisWrapper>,
) -> Var {
    int2c2e(tape, params, &Shortname::new(Operator::R12), wrapper, other)
}

pub fn coul3c(
    tape: &Tape,
    params: &BasisParams,
    wrapper: &BasisWrapper,
    other1: Option<&BasisWrapper>,
    other2: Option<&BasisWrapper>,
) -> Var {
    int3c2e(
        tape,
        params,
        &Shortname::new(Operator::Ar12),
        wrapper,
        other1,
        other2,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::{AtomBasis, Shell};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn wrapper_with_charges(z0: f64, z1: f64) -> BasisWrapper {
        let s = Shell::new(0, &[1.0], &[1.0]);
        BasisWrapper::new(
            &[
                AtomBasis::new(z0, Vector3::zeros(), vec![s.clone()]),
                AtomBasis::new(z1, Vector3::new(0.0, 0.0, 1.4), vec![s]),
            ],
            false,
        )
    }

    #[test]
    fn overlap_through_the_tape_matches_the_raw_handle() {
        let w = wrapper_with_charges(1.0, 1.0);
        let tape = Tape::new();
        let params = BasisParams::new(&tape, &w, [false; 3]);
        let s = tape.value(overlap(&tape, &params, &w, None));
        let raw = Intor::new(&Shortname::new(Operator::Ovlp), &[&w, &w]).calc();
        assert_relative_eq!(s[[0, 1]], raw[[0, 1]], epsilon = 1e-14);
        assert_relative_eq!(s[[0, 0]], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn fractional_charges_assemble_the_same_nuclear_attraction() {
        let w = wrapper_with_charges(1.2, 0.8);
        assert!(w.fracz());
        let tape = Tape::new();
        let params = BasisParams::new(&tape, &w, [false; 3]);
        let v = tape.value(nuclattr(&tape, &params, &w, None));
        // the native routine handles fractional charges too, so both paths
        // must agree
        let raw = Intor::new(&Shortname::new(Operator::Nuc), &[&w, &w]).calc();
        for i in 0..2 {
            for j in 0..2 {
                assert_relative_eq!(v[[i, j]], raw[[i, j]], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn fractional_nuclear_gradient_matches_finite_difference() {
        let w = wrapper_with_charges(1.2, 0.8);
        let tape = Tape::new();
        let params = BasisParams::new(&tape, &w, [false, false, true]);
        let out = nuclattr(&tape, &params, &w, None);
        let grads = tape.backward(out);
        let gpos = grads.wrt(params.poss).unwrap();

        let name = Shortname::new(Operator::Nuc);
        let sum = |w: &BasisWrapper| Intor::new(&name, &[w, w]).calc().sum();
        let h = 1e-6;
        let z0 = w.env().atom_coord(0).z;
        w.env().poke_atom_coord(0, 2, z0 + h);
        let plus = sum(&w);
        w.env().poke_atom_coord(0, 2, z0 - h);
        let minus = sum(&w);
        w.env().poke_atom_coord(0, 2, z0);

        assert_relative_eq!(gpos[[0, 2]], (plus - minus) / (2.0 * h), epsilon = 1e-5);
    }

    #[test]
    fn electron_repulsion_matches_the_raw_handle() {
        let w = wrapper_with_charges(1.0, 1.0);
        let tape = Tape::new();
        let params = BasisParams::new(&tape, &w, [false; 3]);
        let v = tape.value(elrep(&tape, &params, &w, None, None, None));
        let raw = Intor::new(&Shortname::new(Operator::Ar12b), &[&w, &w, &w, &w]).calc();
        assert_relative_eq!(v[[0, 1, 0, 1]], raw[[0, 1, 0, 1]], epsilon = 1e-14);
    }

    #[test]
    fn coulomb_shortcuts_use_their_families() {
        let w = wrapper_with_charges(1.0, 1.0);
        let tape = Tape::new();
        let params = BasisParams::new(&tape, &w, [false; 3]);
        assert_eq!(tape.value(coul2c(&tape, &params, &w, None)).ndim(), 2);
        assert_eq!(tape.value(coul3c(&tape, &params, &w, None, None)).ndim(), 3);
    }

    #[test]
    #[should_panic(expected = "does not view the same tables")]
    fn foreign_wrappers_are_rejected() {
        let w = wrapper_with_charges(1.0, 1.0);
        let foreign = wrapper_with_charges(1.0, 1.0);
        let tape = Tape::new();
        let params = BasisParams::new(&tape, &w, [false; 3]);
        overlap(&tape, &params, &w, Some(&foreign));
    }

    #[test]
    #[should_panic(expected = "rinv_pos must be specified")]
    fn rinv_without_a_recenter_point_is_fatal() {
        let w = wrapper_with_charges(1.0, 1.0);
        let tape = Tape::new();
        let params = BasisParams::new(&tape, &w, [false; 3]);
        int1e(
            &tape,
            &params,
            &Shortname::new(Operator::Rinv),
            &w,
            None,
            None,
        );
    }
}
