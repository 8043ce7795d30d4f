//! Flat integer/float tables in the layout the native integral routines
//! expect, shared between every wrapper built on top of them.

use std::cell::RefCell;

use nalgebra::Vector3;

use super::{gto_norm, AtomBasis};

// atm row slots
pub const CHARGE_OF: usize = 0;
pub const PTR_COORD: usize = 1;
pub const PTR_FRAC_CHARGE: usize = 4;
pub const ATM_SLOTS: usize = 6;

// bas row slots
pub const ATOM_OF: usize = 0;
pub const ANG_OF: usize = 1;
pub const NPRIM_OF: usize = 2;
pub const NCTR_OF: usize = 3;
pub const PTR_EXP: usize = 5;
pub const PTR_COEFF: usize = 6;
pub const BAS_SLOTS: usize = 8;

// env header slots
pub const PTR_RINV_ORIG: usize = 4;
pub const PTR_ENV_START: usize = 20;

/// The shared `atm`/`bas`/`env` tables. `env` is interior-mutable only so
/// that the `1/|r - C|` origin can be recentered for the duration of one
/// integral call; everything else is immutable after construction.
#[derive(Debug)]
pub struct BasisEnv {
    atm: Vec<i32>,
    bas: Vec<i32>,
    env: RefCell<Vec<f64>>,
    /// Kept alongside the flat tables so views can recover shell structure
    /// without re-parsing integer rows.
    atoms: Vec<AtomBasis>,
}

impl BasisEnv {
    /// Lays the atoms out into flat tables. Primitive coefficients are
    /// stored pre-multiplied by the primitive norm of the shell's leading
    /// cartesian component.
    pub fn build(atoms: &[AtomBasis]) -> Self {
        let mut atm = Vec::with_capacity(atoms.len() * ATM_SLOTS);
        let mut bas = Vec::new();
        let mut env = vec![0.0; PTR_ENV_START];

        for atom in atoms {
            let ptr_coord = env.len();
            env.extend_from_slice(atom.position.as_slice());
            let ptr_frac = env.len();
            env.push(atom.atomz);

            let mut row = [0i32; ATM_SLOTS];
            row[CHARGE_OF] = atom.atomz as i32;
            row[PTR_COORD] = ptr_coord as i32;
            row[PTR_FRAC_CHARGE] = ptr_frac as i32;
            atm.extend_from_slice(&row);
        }

        for (iatom, atom) in atoms.iter().enumerate() {
            for shell in &atom.shells {
                let ptr_exp = env.len();
                env.extend_from_slice(&shell.exponents);
                let ptr_coeff = env.len();
                for (&alpha, &c) in shell.exponents.iter().zip(&shell.coefficients) {
                    env.push(c * gto_norm(shell.l, alpha));
                }

                let mut row = [0i32; BAS_SLOTS];
                row[ATOM_OF] = iatom as i32;
                row[ANG_OF] = shell.l;
                row[NPRIM_OF] = shell.nprim() as i32;
                row[NCTR_OF] = 1;
                row[PTR_EXP] = ptr_exp as i32;
                row[PTR_COEFF] = ptr_coeff as i32;
                bas.extend_from_slice(&row);
            }
        }

        Self {
            atm,
            bas,
            env: RefCell::new(env),
            atoms: atoms.to_vec(),
        }
    }

    pub fn natm(&self) -> usize {
        self.atm.len() / ATM_SLOTS
    }

    pub fn nshell(&self) -> usize {
        self.bas.len() / BAS_SLOTS
    }

    pub fn atoms(&self) -> &[AtomBasis] {
        &self.atoms
    }

    pub fn atom_charge(&self, i: usize) -> f64 {
        let ptr = self.atm[i * ATM_SLOTS + PTR_FRAC_CHARGE] as usize;
        self.env.borrow()[ptr]
    }

    pub fn atom_coord(&self, i: usize) -> Vector3<f64> {
        let ptr = self.atm[i * ATM_SLOTS + PTR_COORD] as usize;
        let env = self.env.borrow();
        Vector3::new(env[ptr], env[ptr + 1], env[ptr + 2])
    }

    pub fn shell_atom(&self, sh: usize) -> usize {
        self.bas[sh * BAS_SLOTS + ATOM_OF] as usize
    }

    pub fn shell_l(&self, sh: usize) -> i32 {
        self.bas[sh * BAS_SLOTS + ANG_OF]
    }

    pub fn shell_nprim(&self, sh: usize) -> usize {
        self.bas[sh * BAS_SLOTS + NPRIM_OF] as usize
    }

    pub fn shell_exponents(&self, sh: usize) -> Vec<f64> {
        let ptr = self.bas[sh * BAS_SLOTS + PTR_EXP] as usize;
        self.env.borrow()[ptr..ptr + self.shell_nprim(sh)].to_vec()
    }

    /// Stored (normalized) contraction coefficients of one shell.
    pub fn shell_coefficients(&self, sh: usize) -> Vec<f64> {
        let ptr = self.bas[sh * BAS_SLOTS + PTR_COEFF] as usize;
        self.env.borrow()[ptr..ptr + self.shell_nprim(sh)].to_vec()
    }

    pub fn shell_center(&self, sh: usize) -> Vector3<f64> {
        self.atom_coord(self.shell_atom(sh))
    }

    /// Temporarily recenters the `1/|r - C|` origin. The previous slot
    /// contents come back when the guard drops, whichever way the scope
    /// exits.
    pub fn set_rinv_origin(&self, origin: Vector3<f64>) -> RinvOriginGuard<'_> {
        let mut env = self.env.borrow_mut();
        let mut saved = [0.0; 3];
        for d in 0..3 {
            saved[d] = env[PTR_RINV_ORIG + d];
            env[PTR_RINV_ORIG + d] = origin[d];
        }
        RinvOriginGuard { env: self, saved }
    }

    pub fn rinv_origin(&self) -> Vector3<f64> {
        let env = self.env.borrow();
        Vector3::new(
            env[PTR_RINV_ORIG],
            env[PTR_RINV_ORIG + 1],
            env[PTR_RINV_ORIG + 2],
        )
    }

    // Direct env pokes, used by the finite-difference gradient checks to
    // perturb one stored value without rebuilding the tables.
    #[cfg(test)]
    pub(crate) fn poke_exponent(&self, sh: usize, iprim: usize, value: f64) {
        let ptr = self.bas[sh * BAS_SLOTS + PTR_EXP] as usize;
        self.env.borrow_mut()[ptr + iprim] = value;
    }

    #[cfg(test)]
    pub(crate) fn poke_coefficient(&self, sh: usize, iprim: usize, value: f64) {
        let ptr = self.bas[sh * BAS_SLOTS + PTR_COEFF] as usize;
        self.env.borrow_mut()[ptr + iprim] = value;
    }

    #[cfg(test)]
    pub(crate) fn poke_atom_coord(&self, i: usize, d: usize, value: f64) {
        let ptr = self.atm[i * ATM_SLOTS + PTR_COORD] as usize;
        self.env.borrow_mut()[ptr + d] = value;
    }
}

/// RAII restore of the recenter-point slots written by
/// [`BasisEnv::set_rinv_origin`].
pub struct RinvOriginGuard<'a> {
    env: &'a BasisEnv,
    saved: [f64; 3],
}

impl Drop for RinvOriginGuard<'_> {
    fn drop(&mut self) {
        let mut env = self.env.env.borrow_mut();
        for d in 0..3 {
            env[PTR_RINV_ORIG + d] = self.saved[d];
        }
    }
}
