//! Structured integral names and the derivative-name algebra.
//!
//! An integral routine is identified by its operator plus the derivative
//! markers inserted around the operator designators, e.g. `int1e_ipnucip_sph`
//! carries one spatial-derivative marker on each ket/bra center. Names are
//! closed enums here; rendering to the libcint-style string happens only for
//! dispatch and logging.

use std::fmt;

/// Integral family, named by center count and electron count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IntorFamily {
    Int1e,
    Int2c2e,
    Int3c2e,
    Int2e,
}

impl IntorFamily {
    pub fn prefix(self) -> &'static str {
        match self {
            IntorFamily::Int1e => "int1e",
            IntorFamily::Int2c2e => "int2c2e",
            IntorFamily::Int3c2e => "int3c2e",
            IntorFamily::Int2e => "int2e",
        }
    }

    /// Number of basis centers, which is also the number of AO axes of the
    /// result.
    pub fn ncenters(self) -> usize {
        match self {
            IntorFamily::Int1e | IntorFamily::Int2c2e => 2,
            IntorFamily::Int3c2e => 3,
            IntorFamily::Int2e => 4,
        }
    }

    /// Number of marker insertion slots (one per center role).
    fn nslots(self) -> usize {
        self.ncenters()
    }
}

/// The physical operator. Each operator belongs to exactly one family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `<a|b>`
    Ovlp,
    /// `<a|-∇²/2|b>`
    Kin,
    /// `<a|Σ_C -Z_C/|r-R_C||b>`
    Nuc,
    /// `<a|1/|r-C||b>` with an externally set origin `C`
    Rinv,
    /// 2-center `1/r12`
    R12,
    /// 3-center `1/r12`
    Ar12,
    /// 4-center `1/r12` (electron repulsion)
    Ar12b,
}

impl Operator {
    pub fn family(self) -> IntorFamily {
        match self {
            Operator::Ovlp | Operator::Kin | Operator::Nuc | Operator::Rinv => IntorFamily::Int1e,
            Operator::R12 => IntorFamily::Int2c2e,
            Operator::Ar12 => IntorFamily::Int3c2e,
            Operator::Ar12b => IntorFamily::Int2e,
        }
    }
}

/// Derivative marker inserted next to a center designator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Marker {
    /// Spatial derivative w.r.t. the electron coordinate; adds one leading
    /// component axis of size 3.
    Ip,
    /// Derivative w.r.t. the Gaussian exponent (`r²` insertion); adds no
    /// component axis.
    Rr,
}

impl Marker {
    fn token(self) -> &'static str {
        match self {
            Marker::Ip => "ip",
            Marker::Rr => "rr",
        }
    }
}

/// Which center role of the family is being differentiated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DerivCenter {
    A1,
    A2,
    /// Sole second-electron center of the 3-center family.
    B,
    B1,
    B2,
}

/// A fully specified integral name: operator plus the marker sequence at
/// each center slot. Equality is structural, so two names reached through
/// different derivation orders compare equal when they denote the same
/// routine.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Shortname {
    op: Operator,
    slots: Vec<Vec<Marker>>,
}

impl Shortname {
    pub fn new(op: Operator) -> Self {
        Self {
            op,
            slots: vec![Vec::new(); op.family().nslots()],
        }
    }

    pub fn op(&self) -> Operator {
        self.op
    }

    pub fn family(&self) -> IntorFamily {
        self.op.family()
    }

    pub(crate) fn slots(&self) -> &[Vec<Marker>] {
        &self.slots
    }

    pub(crate) fn from_parts(op: Operator, slots: Vec<Vec<Marker>>) -> Self {
        assert_eq!(slots.len(), op.family().nslots());
        Self { op, slots }
    }

    /// Same markers, different operator of the same family. Used by the
    /// nuclear-attraction backward, which re-expresses `nuc` derivatives as
    /// per-atom `rinv` derivatives.
    pub fn with_op(&self, op: Operator) -> Self {
        assert_eq!(
            op.family(),
            self.family(),
            "cannot swap in an operator of a different family"
        );
        Self {
            op,
            slots: self.slots.clone(),
        }
    }

    /// Inserts `marker` at the slot of `center`, at the string position the
    /// naming scheme dictates: before everything for the first-electron bra,
    /// directly after the `a`/before the `b` designators for the inner
    /// centers, after everything for the last center.
    pub fn derive(&self, center: DerivCenter, marker: Marker) -> Self {
        use DerivCenter::*;
        use IntorFamily::*;
        let mut out = self.clone();
        let (slot, front) = match (self.family(), center) {
            (Int1e | Int2c2e, A1) => (0, true),
            (Int1e | Int2c2e, A2) => (1, false),
            (Int3c2e, A1) => (0, true),
            (Int3c2e, A2) => (1, true),
            (Int3c2e, B) => (2, false),
            (Int2e, A1) => (0, true),
            (Int2e, A2) => (1, true),
            (Int2e, B1) => (2, false),
            (Int2e, B2) => (3, false),
            (family, center) => {
                panic!("center {center:?} does not exist in family {}", family.prefix())
            }
        };
        if front {
            out.slots[slot].insert(0, marker);
        } else {
            out.slots[slot].push(marker);
        }
        out
    }

    pub fn n_ip(&self) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|m| **m == Marker::Ip)
            .count()
    }

    /// Leading component axes of the result, one size-3 axis per spatial
    /// marker in rendered order.
    pub fn comp_shape(&self) -> Vec<usize> {
        vec![3; self.n_ip()]
    }

    pub fn ncomp(&self) -> usize {
        3usize.pow(self.n_ip() as u32)
    }

    fn write_slot(f: &mut fmt::Formatter<'_>, slot: &[Marker]) -> fmt::Result {
        for m in slot {
            f.write_str(m.token())?;
        }
        Ok(())
    }

    /// The full routine name, e.g. `int1e_ipnuc_sph`.
    pub fn routine_name(&self, spherical: bool) -> String {
        format!(
            "{}_{}_{}",
            self.family().prefix(),
            self,
            if spherical { "sph" } else { "cart" }
        )
    }
}

impl fmt::Display for Shortname {
    /// The operator body with markers in place, e.g. `ipnucip` or `aipr12b`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.family() {
            IntorFamily::Int1e => {
                Self::write_slot(f, &self.slots[0])?;
                f.write_str(match self.op {
                    Operator::Ovlp => "ovlp",
                    Operator::Kin => "kin",
                    Operator::Nuc => "nuc",
                    Operator::Rinv => "rinv",
                    _ => unreachable!(),
                })?;
                Self::write_slot(f, &self.slots[1])
            }
            IntorFamily::Int2c2e => {
                Self::write_slot(f, &self.slots[0])?;
                f.write_str("r12")?;
                Self::write_slot(f, &self.slots[1])
            }
            IntorFamily::Int3c2e => {
                Self::write_slot(f, &self.slots[0])?;
                f.write_str("a")?;
                Self::write_slot(f, &self.slots[1])?;
                f.write_str("r12")?;
                Self::write_slot(f, &self.slots[2])
            }
            IntorFamily::Int2e => {
                Self::write_slot(f, &self.slots[0])?;
                f.write_str("a")?;
                Self::write_slot(f, &self.slots[1])?;
                f.write_str("r12")?;
                Self::write_slot(f, &self.slots[2])?;
                f.write_str("b")?;
                Self::write_slot(f, &self.slots[3])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DerivCenter::*;
    use Marker::*;

    #[test]
    fn base_names_render() {
        assert_eq!(Shortname::new(Operator::Ovlp).to_string(), "ovlp");
        assert_eq!(Shortname::new(Operator::R12).to_string(), "r12");
        assert_eq!(Shortname::new(Operator::Ar12).to_string(), "ar12");
        assert_eq!(Shortname::new(Operator::Ar12b).to_string(), "ar12b");
        assert_eq!(
            Shortname::new(Operator::Nuc).routine_name(true),
            "int1e_nuc_sph"
        );
        assert_eq!(
            Shortname::new(Operator::Kin).routine_name(false),
            "int1e_kin_cart"
        );
    }

    #[test]
    fn one_electron_derivatives_render() {
        let nuc = Shortname::new(Operator::Nuc);
        assert_eq!(nuc.derive(A1, Ip).to_string(), "ipnuc");
        assert_eq!(nuc.derive(A2, Ip).to_string(), "nucip");
        assert_eq!(nuc.derive(A1, Ip).derive(A2, Ip).to_string(), "ipnucip");
        assert_eq!(nuc.derive(A1, Ip).derive(A1, Ip).to_string(), "ipipnuc");
        assert_eq!(nuc.derive(A1, Rr).to_string(), "rrnuc");
        assert_eq!(nuc.derive(A2, Rr).to_string(), "nucrr");
    }

    #[test]
    fn four_center_derivatives_render() {
        let eri = Shortname::new(Operator::Ar12b);
        assert_eq!(eri.derive(A1, Ip).to_string(), "ipar12b");
        assert_eq!(eri.derive(A2, Ip).to_string(), "aipr12b");
        assert_eq!(eri.derive(B1, Ip).to_string(), "ar12ipb");
        assert_eq!(eri.derive(B2, Ip).to_string(), "ar12bip");
        assert_eq!(eri.derive(A2, Rr).to_string(), "arrr12b");
    }

    #[test]
    fn three_center_derivatives_render() {
        let c3 = Shortname::new(Operator::Ar12);
        assert_eq!(c3.derive(A1, Ip).to_string(), "ipar12");
        assert_eq!(c3.derive(A2, Ip).to_string(), "aipr12");
        assert_eq!(c3.derive(B, Ip).to_string(), "ar12ip");
    }

    #[test]
    fn component_axes_count_spatial_markers_only() {
        let name = Shortname::new(Operator::Ovlp).derive(A1, Ip).derive(A2, Rr);
        assert_eq!(name.n_ip(), 1);
        assert_eq!(name.comp_shape(), vec![3]);
        assert_eq!(name.ncomp(), 3);
        assert_eq!(Shortname::new(Operator::Ovlp).ncomp(), 1);
        let two = Shortname::new(Operator::Kin).derive(A1, Ip).derive(A2, Ip);
        assert_eq!(two.comp_shape(), vec![3, 3]);
        assert_eq!(two.ncomp(), 9);
    }

    #[test]
    fn derivation_order_within_a_slot_is_tracked() {
        // newest first-center marker goes leftmost
        let nuc = Shortname::new(Operator::Nuc);
        let a = nuc.derive(A1, Ip).derive(A1, Rr);
        assert_eq!(a.to_string(), "rripnuc");
        let b = nuc.derive(A1, Rr).derive(A1, Ip);
        assert_eq!(b.to_string(), "iprrnuc");
        assert_ne!(a, b);
    }

    #[test]
    fn with_op_swaps_operator_keeping_markers() {
        let d = Shortname::new(Operator::Nuc).derive(A1, Ip);
        assert_eq!(d.with_op(Operator::Rinv).to_string(), "iprinv");
    }

    #[test]
    #[should_panic(expected = "does not exist in family")]
    fn foreign_center_role_is_fatal() {
        Shortname::new(Operator::Ovlp).derive(B1, Ip);
    }
}
