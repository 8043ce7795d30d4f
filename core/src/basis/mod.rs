//! Atomic-orbital basis descriptions and the flat integer/float tables the
//! integral backend consumes.

mod env;
mod wrapper;

pub use env::{BasisEnv, RinvOriginGuard};
pub use wrapper::{decontract, BasisWrapper};

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// A contracted shell: a fixed linear combination of primitive Gaussians
/// sharing one angular momentum.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Shell {
    /// Angular momentum quantum number (0 = s, 1 = p, ...).
    pub l: i32,
    pub exponents: SmallVec<[f64; 6]>,
    /// Contraction coefficients as given by the basis set; primitive
    /// normalization is applied when the shell is laid out into the
    /// environment tables.
    pub coefficients: SmallVec<[f64; 6]>,
}

impl Shell {
    pub fn new(l: i32, exponents: &[f64], coefficients: &[f64]) -> Self {
        assert_eq!(
            exponents.len(),
            coefficients.len(),
            "a shell needs one coefficient per primitive exponent"
        );
        Self {
            l,
            exponents: SmallVec::from_slice(exponents),
            coefficients: SmallVec::from_slice(coefficients),
        }
    }

    pub fn nprim(&self) -> usize {
        self.exponents.len()
    }

    /// Number of atomic orbitals this shell spans.
    pub fn nao(&self, spherical: bool) -> usize {
        shell_nao(self.l, spherical)
    }
}

/// All shells sitting on one atomic center, plus the nuclear charge.
/// Fractional charges are allowed (e.g. for charge-scanned potentials).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AtomBasis {
    pub atomz: f64,
    pub position: Vector3<f64>,
    pub shells: Vec<Shell>,
}

impl AtomBasis {
    pub fn new(atomz: f64, position: Vector3<f64>, shells: Vec<Shell>) -> Self {
        Self {
            atomz,
            position,
            shells,
        }
    }
}

pub(crate) fn shell_nao(l: i32, spherical: bool) -> usize {
    if spherical {
        (2 * l + 1) as usize
    } else {
        ((l + 1) * (l + 2) / 2) as usize
    }
}

/// Normalization constant of the primitive `x^l exp(-alpha r^2)`.
///
/// The whole shell is scaled by the norm of its `(l, 0, 0)` component, so the
/// leading cartesian function of every shell integrates to one.
pub fn gto_norm(l: i32, exponent: f64) -> f64 {
    (std::f64::consts::FRAC_2_PI * exponent)
        .powi(3)
        .sqrt()
        .sqrt()
        * f64::sqrt((8.0 * exponent).powi(l) / (l + 1..=2 * l).product::<i32>().max(1) as f64)
}
