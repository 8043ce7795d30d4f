//! Minimal reverse-mode engine: an explicit tape of recorded operations,
//! walked backwards to accumulate gradients.
//!
//! The integral primitives register themselves through [`Tape::custom`] with
//! a backward closure; the closure receives the upstream gradient plus a
//! per-parent "is this gradient wanted" mask and returns one cotangent per
//! parent (`None` where unwanted or independent).

use std::cell::RefCell;

use ndarray::{ArrayD, Axis};

/// Handle of one recorded value. Plain index into the owning tape; handles
/// from different tapes must not be mixed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Var(usize);

type BackwardFn = Box<dyn Fn(&ArrayD<f64>, &[bool]) -> Vec<Option<ArrayD<f64>>>>;

struct Node {
    value: ArrayD<f64>,
    requires_grad: bool,
    parents: Vec<Var>,
    backward: Option<BackwardFn>,
}

/// Record of a forward computation. Single-threaded by construction.
#[derive(Default)]
pub struct Tape {
    nodes: RefCell<Vec<Node>>,
}

impl Tape {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, node: Node) -> Var {
        let mut nodes = self.nodes.borrow_mut();
        nodes.push(node);
        Var(nodes.len() - 1)
    }

    pub fn leaf(&self, value: ArrayD<f64>, requires_grad: bool) -> Var {
        self.push(Node {
            value,
            requires_grad,
            parents: vec![],
            backward: None,
        })
    }

    pub fn value(&self, var: Var) -> ArrayD<f64> {
        self.nodes.borrow()[var.0].value.clone()
    }

    pub fn requires_grad(&self, var: Var) -> bool {
        self.nodes.borrow()[var.0].requires_grad
    }

    pub fn add(&self, a: Var, b: Var) -> Var {
        let (value, requires) = {
            let nodes = self.nodes.borrow();
            assert_eq!(
                nodes[a.0].value.shape(),
                nodes[b.0].value.shape(),
                "add requires matching shapes"
            );
            (
                &nodes[a.0].value + &nodes[b.0].value,
                nodes[a.0].requires_grad || nodes[b.0].requires_grad,
            )
        };
        self.push(Node {
            value,
            requires_grad: requires,
            parents: vec![a, b],
            backward: Some(Box::new(|grad, wanted| {
                vec![
                    wanted[0].then(|| grad.clone()),
                    wanted[1].then(|| grad.clone()),
                ]
            })),
        })
    }

    pub fn scale(&self, a: Var, factor: f64) -> Var {
        let (value, requires) = {
            let nodes = self.nodes.borrow();
            (&nodes[a.0].value * factor, nodes[a.0].requires_grad)
        };
        self.push(Node {
            value,
            requires_grad: requires,
            parents: vec![a],
            backward: Some(Box::new(move |grad, wanted| {
                vec![wanted[0].then(|| grad * factor)]
            })),
        })
    }

    /// Picks one row of a 2-d value; the backward scatters the cotangent
    /// back into an otherwise-zero array of the parent's shape.
    pub fn select_row(&self, a: Var, row: usize) -> Var {
        let (value, requires, parent_shape) = {
            let nodes = self.nodes.borrow();
            let v = &nodes[a.0].value;
            assert_eq!(v.ndim(), 2, "select_row expects a 2-d value");
            (
                v.index_axis(Axis(0), row).to_owned().into_dyn(),
                nodes[a.0].requires_grad,
                v.shape().to_vec(),
            )
        };
        self.push(Node {
            value,
            requires_grad: requires,
            parents: vec![a],
            backward: Some(Box::new(move |grad, wanted| {
                vec![wanted[0].then(|| {
                    let mut out = ArrayD::zeros(parent_shape.clone());
                    out.index_axis_mut(Axis(0), row).assign(grad);
                    out
                })]
            })),
        })
    }

    /// Records an externally computed value with a caller-supplied backward.
    pub fn custom(&self, value: ArrayD<f64>, parents: Vec<Var>, backward: BackwardFn) -> Var {
        let requires = {
            let nodes = self.nodes.borrow();
            parents.iter().any(|p| nodes[p.0].requires_grad)
        };
        self.push(Node {
            value,
            requires_grad: requires,
            parents,
            backward: Some(backward),
        })
    }

    /// Seeds a ones cotangent at `root` and walks the tape in reverse
    /// recorded order. Gradients accumulate only into nodes that require
    /// them.
    pub fn backward(&self, root: Var) -> Gradients {
        let nodes = self.nodes.borrow();
        assert!(
            nodes[root.0].requires_grad,
            "backward from a value that requires no gradient"
        );
        let mut grads: Vec<Option<ArrayD<f64>>> = vec![None; nodes.len()];
        grads[root.0] = Some(ArrayD::ones(nodes[root.0].value.shape()));

        for i in (0..=root.0).rev() {
            let Some(grad) = grads[i].take() else { continue };
            let node = &nodes[i];
            if let Some(backward) = &node.backward {
                let wanted: Vec<bool> = node
                    .parents
                    .iter()
                    .map(|p| nodes[p.0].requires_grad)
                    .collect();
                let cotangents = backward(&grad, &wanted);
                assert_eq!(cotangents.len(), node.parents.len());
                for (parent, cot) in node.parents.iter().zip(cotangents) {
                    let Some(cot) = cot else { continue };
                    if let Some(acc) = &mut grads[parent.0] {
                        *acc += &cot;
                    } else {
                        grads[parent.0] = Some(cot);
                    }
                }
            }
            if node.requires_grad && node.backward.is_none() {
                grads[i] = Some(grad);
            }
        }
        Gradients { grads }
    }
}

/// Result of one backward pass; indexed by the original [`Var`] handles.
pub struct Gradients {
    grads: Vec<Option<ArrayD<f64>>>,
}

impl Gradients {
    /// Gradient with respect to `var`, if one was produced. Leaves that did
    /// not request gradients and values the root does not depend on both
    /// yield `None`.
    pub fn wrt(&self, var: Var) -> Option<&ArrayD<f64>> {
        self.grads[var.0].as_ref()
    }
}
