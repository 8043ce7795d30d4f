//! Views over a shared [`BasisEnv`] plus the index maps the differentiable
//! primitives need (shell to AO offset, AO to shell, AO to atom).

use std::rc::Rc;

use ndarray::{Array1, Array2};

use super::{shell_nao, AtomBasis, BasisEnv, Shell};

/// A sphericity-tagged view over a range of shells of a shared table set.
///
/// Two wrappers cooperate in one integral only when they are views of the
/// *same* table allocation; that is an identity check, never a value
/// comparison.
#[derive(Clone, Debug)]
pub struct BasisWrapper {
    parent: Rc<BasisEnv>,
    shell_range: (usize, usize),
    spherical: bool,
}

impl PartialEq for BasisWrapper {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.parent, &other.parent)
            && self.shell_range == other.shell_range
            && self.spherical == other.spherical
    }
}

impl BasisWrapper {
    /// Wraps the full shell range of freshly built tables.
    pub fn new(atoms: &[AtomBasis], spherical: bool) -> Self {
        Self::from_env(Rc::new(BasisEnv::build(atoms)), spherical)
    }

    pub fn from_env(parent: Rc<BasisEnv>, spherical: bool) -> Self {
        let nshell = parent.nshell();
        Self {
            parent,
            shell_range: (0, nshell),
            spherical,
        }
    }

    /// A view over the shells `lo..hi` of the same tables.
    pub fn view(&self, lo: usize, hi: usize) -> Self {
        assert!(
            lo <= hi && hi <= self.parent.nshell(),
            "shell view {lo}..{hi} exceeds the {} shells of the tables",
            self.parent.nshell()
        );
        Self {
            parent: Rc::clone(&self.parent),
            shell_range: (lo, hi),
            spherical: self.spherical,
        }
    }

    pub fn env(&self) -> &Rc<BasisEnv> {
        &self.parent
    }

    pub fn spherical(&self) -> bool {
        self.spherical
    }

    pub fn same_tables(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.parent, &other.parent)
    }

    /// Whether any atom carries a fractional nuclear charge. Such systems
    /// cannot use the native `nuc` routine directly.
    pub fn fracz(&self) -> bool {
        self.parent.atoms().iter().any(|a| a.atomz.fract() != 0.0)
    }

    pub fn shell_range(&self) -> (usize, usize) {
        self.shell_range
    }

    pub fn nshell(&self) -> usize {
        self.shell_range.1 - self.shell_range.0
    }

    pub fn natm(&self) -> usize {
        self.parent.natm()
    }

    fn shell_nao(&self, sh: usize) -> usize {
        shell_nao(self.parent.shell_l(sh), self.spherical)
    }

    pub fn nao(&self) -> usize {
        (self.shell_range.0..self.shell_range.1)
            .map(|sh| self.shell_nao(sh))
            .sum()
    }

    /// Total primitive count over the wrapped shells.
    pub fn ngauss_total(&self) -> usize {
        (self.shell_range.0..self.shell_range.1)
            .map(|sh| self.parent.shell_nprim(sh))
            .sum()
    }

    /// AO offset of each wrapped shell, with a trailing total (length
    /// `nshell + 1`).
    pub fn shell_to_aoloc(&self) -> Vec<usize> {
        let mut aoloc = Vec::with_capacity(self.nshell() + 1);
        let mut off = 0;
        aoloc.push(0);
        for sh in self.shell_range.0..self.shell_range.1 {
            off += self.shell_nao(sh);
            aoloc.push(off);
        }
        aoloc
    }

    /// Wrapped-relative shell index owning each AO.
    pub fn ao_to_shell(&self) -> Vec<usize> {
        let mut map = Vec::with_capacity(self.nao());
        for (rel, sh) in (self.shell_range.0..self.shell_range.1).enumerate() {
            map.extend(std::iter::repeat(rel).take(self.shell_nao(sh)));
        }
        map
    }

    /// Atom index owning each AO.
    pub fn ao_to_atom(&self) -> Vec<usize> {
        let mut map = Vec::with_capacity(self.nao());
        for sh in self.shell_range.0..self.shell_range.1 {
            map.extend(std::iter::repeat(self.parent.shell_atom(sh)).take(self.shell_nao(sh)));
        }
        map
    }

    /// The flattened differentiable parameters as currently stored in the
    /// tables: normalized primitive coefficients, primitive exponents (both
    /// in flat (shell, primitive) order) and atom positions `(natm, 3)`.
    pub fn params(&self) -> (Array1<f64>, Array1<f64>, Array2<f64>) {
        let mut coeffs = Vec::with_capacity(self.ngauss_total());
        let mut alphas = Vec::with_capacity(self.ngauss_total());
        for sh in self.shell_range.0..self.shell_range.1 {
            coeffs.extend(self.parent.shell_coefficients(sh));
            alphas.extend(self.parent.shell_exponents(sh));
        }
        let natm = self.natm();
        let mut poss = Array2::zeros((natm, 3));
        for i in 0..natm {
            let r = self.parent.atom_coord(i);
            for d in 0..3 {
                poss[(i, d)] = r[d];
            }
        }
        (Array1::from(coeffs), Array1::from(alphas), poss)
    }
}

/// Splits every contracted shell of the wrappers' shared tables into
/// per-primitive shells with unit coefficients carrying the stored
/// (normalized) contraction weight.
///
/// All inputs must view the same tables; the outputs all view one new
/// uncontracted table set, so cross-wrapper identity checks keep holding
/// downstream. Uncontracted shells are laid out in flat (shell, primitive)
/// order, so the uncontracted shell index of an AO equals its flat primitive
/// index.
///
/// Returns the per-input uncontracted views together with, per input, the
/// contracted AO index each uncontracted AO maps onto.
pub fn decontract(wrappers: &[&BasisWrapper]) -> (Vec<BasisWrapper>, Vec<Vec<usize>>) {
    let first = wrappers.first().expect("decontract needs at least one wrapper");
    assert!(
        wrappers.iter().all(|w| w.same_tables(first)),
        "decontract requires wrappers sharing one table set"
    );

    let env = first.env();
    let mut atoms = Vec::with_capacity(env.natm());
    for atom in env.atoms() {
        let mut shells = Vec::new();
        for shell in &atom.shells {
            for (&alpha, &c) in shell.exponents.iter().zip(&shell.coefficients) {
                shells.push(Shell::new(shell.l, &[alpha], &[c]));
            }
        }
        atoms.push(AtomBasis::new(atom.atomz, atom.position, shells));
    }
    let uenv = Rc::new(BasisEnv::build(&atoms));

    // uncontracted shell index at each contracted shell boundary, so a
    // partial view maps onto the matching slice of the new tables
    let mut uloc = Vec::with_capacity(env.nshell() + 1);
    let mut off = 0;
    uloc.push(0);
    for sh in 0..env.nshell() {
        off += env.shell_nprim(sh);
        uloc.push(off);
    }

    let uwrappers: Vec<BasisWrapper> = wrappers
        .iter()
        .map(|w| {
            let (lo, hi) = w.shell_range();
            BasisWrapper {
                parent: Rc::clone(&uenv),
                shell_range: (uloc[lo], uloc[hi]),
                spherical: w.spherical(),
            }
        })
        .collect();

    let mut maps = Vec::with_capacity(wrappers.len());
    for w in wrappers {
        let aoloc = w.shell_to_aoloc();
        let mut uao2ao = Vec::new();
        for (rel, sh) in (w.shell_range().0..w.shell_range().1).enumerate() {
            let nao = shell_nao(w.env().shell_l(sh), w.spherical());
            for _prim in 0..w.env().shell_nprim(sh) {
                uao2ao.extend(aoloc[rel]..aoloc[rel] + nao);
            }
        }
        maps.push(uao2ao);
    }

    (uwrappers, maps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn heh() -> Vec<AtomBasis> {
        let s2 = Shell::new(0, &[6.36242139, 1.15892300], &[0.15432897, 0.53532814]);
        let s1 = Shell::new(0, &[0.16885540], &[1.0]);
        let p1 = Shell::new(1, &[0.8], &[1.0]);
        vec![
            AtomBasis::new(2.0, Vector3::zeros(), vec![s2, p1]),
            AtomBasis::new(1.0, Vector3::new(0.0, 0.0, 1.5), vec![s1]),
        ]
    }

    #[test]
    fn ao_maps_follow_shell_order() {
        let w = BasisWrapper::new(&heh(), false);
        assert_eq!(w.nao(), 5);
        assert_eq!(w.shell_to_aoloc(), vec![0, 1, 4, 5]);
        assert_eq!(w.ao_to_shell(), vec![0, 1, 1, 1, 2]);
        assert_eq!(w.ao_to_atom(), vec![0, 0, 0, 0, 1]);
    }

    #[test]
    fn identity_not_equality_between_table_sets() {
        let atoms = heh();
        let a = BasisWrapper::new(&atoms, false);
        let b = BasisWrapper::new(&atoms, false);
        assert!(!a.same_tables(&b));
        assert!(a.same_tables(&a.clone()));
    }

    #[test]
    fn params_shapes_match_counts() {
        let w = BasisWrapper::new(&heh(), false);
        let (coeffs, alphas, poss) = w.params();
        assert_eq!(coeffs.len(), 4);
        assert_eq!(alphas.len(), 4);
        assert_eq!(poss.dim(), (2, 3));
    }

    #[test]
    fn decontract_splits_primitives_and_maps_back() {
        let w = BasisWrapper::new(&heh(), false);
        let (us, maps) = decontract(&[&w]);
        let u = &us[0];
        assert_eq!(u.nshell(), 4);
        assert_eq!(u.nao(), 6);
        // two primitives of the first contracted s shell both map to AO 0
        assert_eq!(maps[0], vec![0, 0, 1, 2, 3, 4]);
    }

    #[test]
    fn views_restrict_the_ao_maps_to_their_shells() {
        let full = BasisWrapper::new(&heh(), false);
        let tail = full.view(1, 3);
        assert!(tail.same_tables(&full));
        assert_eq!(tail.nao(), 4);
        assert_eq!(tail.shell_to_aoloc(), vec![0, 3, 4]);
        assert_eq!(tail.ao_to_shell(), vec![0, 0, 0, 1]);
        assert_eq!(tail.ao_to_atom(), vec![0, 0, 0, 1]);
    }

    #[test]
    #[should_panic(expected = "exceeds the")]
    fn views_past_the_table_end_are_rejected() {
        BasisWrapper::new(&heh(), false).view(1, 4);
    }

    #[test]
    fn partial_views_decontract_onto_their_own_slice() {
        let full = BasisWrapper::new(&heh(), false);
        let tail = full.view(1, 3);
        let (us, maps) = decontract(&[&tail]);
        // the p shell and the trailing s shell are single-primitive, so the
        // view keeps its orbital count and maps onto itself
        assert_eq!(us[0].nshell(), 2);
        assert_eq!(us[0].shell_range(), (2, 4));
        assert_eq!(us[0].nao(), 4);
        assert_eq!(maps[0], vec![0, 1, 2, 3]);
    }

    #[test]
    fn decontract_outputs_share_one_table_set() {
        let w = BasisWrapper::new(&heh(), false);
        let (us, _) = decontract(&[&w, &w]);
        assert!(us[0].same_tables(&us[1]));
    }

    #[test]
    fn single_primitive_shells_decontract_to_themselves() {
        let atoms = vec![AtomBasis::new(
            1.0,
            Vector3::zeros(),
            vec![Shell::new(0, &[1.0], &[1.0])],
        )];
        let w = BasisWrapper::new(&atoms, false);
        let (us, maps) = decontract(&[&w]);
        assert_eq!(us[0].nao(), w.nao());
        assert_eq!(maps[0], vec![0]);
    }
}
