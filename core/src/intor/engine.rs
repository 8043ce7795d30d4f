//! The integral handle tying a structured name to concrete tables: routine
//! resolution, per-shell cache acquisition, native buffer layout and the
//! axis reordering of the result.

use std::rc::Rc;

use ndarray::{ArrayD, IxDyn};

use super::kernel::{self, ShellCache};
use super::name::{IntorFamily, Shortname};
use crate::basis::{BasisEnv, BasisWrapper};

/// One integral invocation. Holds the snapshotted shell cache for its
/// lifetime; [`Intor::calc`] consumes the handle, so a handle never runs
/// twice.
pub struct Intor {
    name: Shortname,
    env: Rc<BasisEnv>,
    cache: ShellCache,
    /// Component axes first, then one AO axis per wrapper in call order.
    out_shape: Vec<usize>,
    shls: Vec<(usize, usize)>,
}

impl Intor {
    pub fn new(name: &Shortname, wrappers: &[&BasisWrapper]) -> Self {
        assert_eq!(
            wrappers.len(),
            name.family().ncenters(),
            "{} takes {} wrappers",
            name.routine_name(true),
            name.family().ncenters()
        );
        let w0 = wrappers[0];
        assert!(
            wrappers.iter().all(|w| w.same_tables(w0)),
            "all wrappers of one integral must share the same tables"
        );
        if w0.spherical() {
            for w in wrappers {
                let (lo, hi) = w.shell_range();
                for sh in lo..hi {
                    let l = w0.env().shell_l(sh);
                    assert!(
                        l < 2,
                        "{} is not available for spherical shells with l = {l}",
                        name.routine_name(true)
                    );
                }
            }
        }
        log::debug!(
            "resolved integral routine {}",
            name.routine_name(w0.spherical())
        );

        let mut out_shape = name.comp_shape();
        out_shape.extend(wrappers.iter().map(|w| w.nao()));
        Self {
            name: name.clone(),
            env: Rc::clone(w0.env()),
            cache: ShellCache::new(w0.env()),
            out_shape,
            shls: wrappers.iter().map(|w| w.shell_range()).collect(),
        }
    }

    pub fn out_shape(&self) -> &[usize] {
        &self.out_shape
    }

    /// Runs the integral and returns it with component axes leading and AO
    /// axes in wrapper order.
    pub fn calc(self) -> ArrayD<f64> {
        match self.name.family() {
            IntorFamily::Int1e | IntorFamily::Int2c2e => self.calc_int2c(),
            IntorFamily::Int3c2e => self.calc_int3c(),
            IntorFamily::Int2e => self.calc_int4c(),
        }
    }

    fn native_buffer(shape: &[usize]) -> Vec<f64> {
        vec![0.0; shape.iter().product()]
    }

    fn wrap(shape: Vec<usize>, buf: Vec<f64>) -> ArrayD<f64> {
        ArrayD::from_shape_vec(IxDyn(&shape), buf)
            .expect("native buffer length matches its shape")
    }

    fn calc_int2c(self) -> ArrayD<f64> {
        // native layout has the first-center axis fastest
        let n = self.out_shape.len();
        let mut native_shape = self.out_shape.clone();
        native_shape.swap(n - 1, n - 2);
        let mut buf = Self::native_buffer(&native_shape);
        kernel::gto_int2c(
            &self.name,
            &self.env,
            &self.cache,
            &[self.shls[0], self.shls[1]],
            &mut buf,
        );
        let mut out = Self::wrap(native_shape, buf);
        out.swap_axes(n - 1, n - 2);
        out
    }

    fn calc_int3c(self) -> ArrayD<f64> {
        let n = self.out_shape.len();
        let mut native_shape = self.out_shape.clone();
        native_shape.swap(n - 1, n - 3);
        let mut buf = Self::native_buffer(&native_shape);
        kernel::gto_int3c(
            &self.name,
            &self.env,
            &self.cache,
            &[self.shls[0], self.shls[1], self.shls[2]],
            &mut buf,
        );
        let mut out = Self::wrap(native_shape, buf);
        out.swap_axes(n - 1, n - 3);
        out
    }

    fn calc_int4c(self) -> ArrayD<f64> {
        let mut buf = Self::native_buffer(&self.out_shape);
        kernel::gto_int4c(
            &self.name,
            &self.env,
            &self.cache,
            &[self.shls[0], self.shls[1], self.shls[2], self.shls[3]],
            &mut buf,
        );
        Self::wrap(self.out_shape, buf)
    }
}
