//! Deserialization of basis sets in the JSON format used by the MolSSI
//! basis set exchange (<https://www.basissetexchange.org/>).

use std::{collections::HashMap, error::Error};

use nalgebra::Vector3;
use serde::Deserialize;

use crate::basis::{AtomBasis, Shell};

#[derive(Deserialize)]
pub struct ConfigBasisSet {
    elements: HashMap<String, ConfigElectronicConfiguration>,
}

#[derive(Deserialize)]
struct ConfigElectronicConfiguration {
    electron_shells: Vec<ConfigElectronShell>,
}

#[derive(Deserialize)]
#[allow(unused)]
struct ConfigElectronShell {
    function_type: String,
    angular_momentum: Vec<i32>,
    exponents: Vec<String>,
    coefficients: Vec<Vec<String>>,
}

impl ConfigBasisSet {
    /// The shells of one element. Combined entries (e.g. SP shells) expand
    /// into one [`Shell`] per angular momentum, sharing the exponent list.
    pub fn shells_for(&self, atomic_number: u32) -> Result<Vec<Shell>, Box<dyn Error>> {
        let configuration = self
            .elements
            .get(&atomic_number.to_string())
            .ok_or_else(|| format!("element {atomic_number} is not in this basis set"))?;

        let mut shells = Vec::new();
        for electron_shell in &configuration.electron_shells {
            for (index, &angular_magnitude) in electron_shell.angular_momentum.iter().enumerate() {
                let mut exponents = Vec::with_capacity(electron_shell.exponents.len());
                let mut coefficients = Vec::with_capacity(electron_shell.exponents.len());
                for (exponent, coefficient) in electron_shell
                    .exponents
                    .iter()
                    .zip(&electron_shell.coefficients[index])
                {
                    exponents.push(exponent.parse::<f64>()?);
                    coefficients.push(coefficient.parse::<f64>()?);
                }
                shells.push(Shell::new(angular_magnitude, &exponents, &coefficients));
            }
        }
        Ok(shells)
    }

    /// Convenience for placing one atom of the element at `position`.
    pub fn atom_basis(
        &self,
        atomic_number: u32,
        position: Vector3<f64>,
    ) -> Result<AtomBasis, Box<dyn Error>> {
        Ok(AtomBasis::new(
            atomic_number as f64,
            position,
            self.shells_for(atomic_number)?,
        ))
    }
}
