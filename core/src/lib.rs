pub mod autograd;
pub mod basis;
pub mod config;
pub mod intor;

pub mod testing {
    use std::{error::Error, fs::File, path::Path};

    use serde::{Deserialize, Serialize};

    use crate::basis::AtomBasis;

    /// A serializable snapshot of a small test system, shared between the
    /// tests and the benchmarks.
    #[derive(Serialize, Deserialize)]
    pub struct TestInstance {
        pub name: String,
        atoms: Vec<AtomBasis>,
    }

    impl TestInstance {
        pub fn new(name: String, atoms: Vec<AtomBasis>) -> Self {
            Self { name, atoms }
        }

        pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn Error>> {
            Ok(serde_json::to_writer(
                File::options()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(path)?,
                self,
            )?)
        }

        pub fn atoms(&self) -> &[AtomBasis] {
            &self.atoms
        }
    }
}
