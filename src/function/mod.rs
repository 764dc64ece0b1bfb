//! The differentiable-operation contract and the invocation protocol that
//! turns a plain numeric computation into graph edges.
//!
//! A [Function] is the two-method forward/backward contract; a
//! [FunctionNode] is the graph bookkeeping for one *application* of a
//! function: the input nodes it consumed (owning references, since the
//! backward chain is what keeps history alive), weak back-references to the
//! output nodes it produced, its topological rank, and any forward data
//! retained for backward's use.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::config::Config;
use crate::tensor::{Error, TensorLike};
use crate::variable::{NodeRef, Variable, VariableNode};

/// Shared handle to an applied function in the computation graph.
pub type FunctionRef<T> = Rc<RefCell<FunctionNode<T>>>;

/// A differentiable operation.
///
/// `forward` is pure numeric computation over raw input data; `backward`
/// computes input gradients from output gradients. Everything else about
/// graph construction is handled by [apply]; concrete operations implement
/// exactly this contract and plug into the engine.
pub trait Function<T: TensorLike>: std::fmt::Debug {
    fn forward(&mut self, xs: &[&T]) -> Result<Vec<T>, Error>;

    /// Must return exactly one entry per input. A `None` entry means "no
    /// gradient flows to this input" and is never an error. `xs[i]` is
    /// `None` when input `i`'s data was not retained for backward.
    fn backward(&self, xs: &[Option<&T>], gys: &[Option<&T>]) -> Result<Vec<Option<T>>, Error>;

    /// Short label used in diagnostics.
    fn label(&self) -> &'static str {
        "Function"
    }

    /// Indices of inputs whose data must survive until backward.
    /// Defaults to all inputs.
    fn inputs_to_retain(&self, n_in: usize) -> Vec<usize> {
        (0..n_in).collect()
    }

    /// Indices of outputs whose data must survive until backward.
    /// Defaults to none.
    fn outputs_to_retain(&self, _n_out: usize) -> Vec<usize> {
        Vec::new()
    }

    /// Whether output data gathered during backward is kept afterwards
    /// instead of being freed eagerly.
    fn retain_after_backward(&self) -> bool {
        false
    }
}

/// Graph bookkeeping for one application of a [Function].
pub struct FunctionNode<T: TensorLike> {
    pub(crate) fun: Box<dyn Function<T>>,
    /// Owning references to the consumed nodes. Cleared by [FunctionNode::unchain].
    pub(crate) inputs: Vec<NodeRef<T>>,
    /// Weak back-references to the produced nodes, so that dropped output
    /// variables are not pinned by the function that made them.
    pub(crate) outputs: Vec<Weak<RefCell<VariableNode<T>>>>,
    /// Max rank among the input nodes at application time, or 0.
    pub(crate) rank: usize,
    /// Output data gathered during backward, cleared right after unless the
    /// function opts into retention.
    pub(crate) output_data: Option<Vec<Option<T>>>,
}

impl<T: TensorLike> std::fmt::Debug for FunctionNode<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionNode")
            .field("label", &self.fun.label())
            .field("rank", &self.rank)
            .field("num_inputs", &self.inputs.len())
            .field("num_outputs", &self.outputs.len())
            .finish()
    }
}

impl<T: TensorLike> FunctionNode<T> {
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn label(&self) -> &'static str {
        self.fun.label()
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn inputs(&self) -> &[NodeRef<T>] {
        &self.inputs
    }

    pub fn output_data(&self) -> Option<&[Option<T>]> {
        self.output_data.as_deref()
    }

    /// Severs this application from the graph: drops the references to its
    /// inputs and clears the creator link of every still-live output.
    /// Ranks are left untouched.
    pub fn unchain(&mut self) {
        for out in &self.outputs {
            if let Some(y) = out.upgrade() {
                y.borrow_mut().set_creator(None);
            }
        }
        self.inputs.clear();
    }
}

/// Applies `f` to `inputs` with an explicit [Config].
///
/// This is the invocation protocol: raw input data is fed to `forward`, one
/// output variable is created per forward result, each output node's creator
/// is set to the new [FunctionNode] (which records the rank as the max input
/// rank), and input/output data is retained per the function's retention
/// policy. With `enable_backprop` off, or when no input requires grad, the
/// outputs are produced without any graph edges.
pub fn apply_with_config<T: TensorLike>(
    mut f: impl Function<T> + 'static,
    inputs: &[&Variable<T>],
    config: &Config,
) -> Result<Vec<Variable<T>>, Error> {
    let xs = inputs
        .iter()
        .map(|x| x.data().ok_or(Error::NoData))
        .collect::<Result<Vec<&T>, Error>>()?;

    let ys = f.forward(&xs)?;

    let requires_grad = inputs.iter().any(|x| x.requires_grad());
    let rank = inputs.iter().map(|x| x.rank()).max().unwrap_or(0);

    let outputs: Vec<Variable<T>> = ys
        .into_iter()
        .map(|y| Variable::from_output(y, requires_grad))
        .collect();

    if requires_grad && config.enable_backprop {
        let retain_in = f.inputs_to_retain(inputs.len());
        let retain_out = f.outputs_to_retain(outputs.len());

        let node = Rc::new(RefCell::new(FunctionNode {
            fun: Box::new(f),
            inputs: inputs.iter().map(|x| x.node().clone()).collect(),
            outputs: outputs.iter().map(|y| Rc::downgrade(y.node())).collect(),
            rank,
            output_data: None,
        }));

        for i in retain_in {
            inputs[i].node().borrow_mut().retain(xs[i]);
        }
        for (i, y) in outputs.iter().enumerate() {
            y.node().borrow_mut().set_creator(Some(node.clone()));
            if retain_out.contains(&i) {
                let data = y.data().cloned();
                if let Some(data) = data {
                    y.node().borrow_mut().retain(&data);
                }
            }
        }
    }

    Ok(outputs)
}

/// See [apply_with_config]. Uses the default [Config] (backprop enabled).
pub fn apply<T: TensorLike>(
    f: impl Function<T> + 'static,
    inputs: &[&Variable<T>],
) -> Result<Vec<Variable<T>>, Error> {
    apply_with_config(f, inputs, &Config::default())
}

/// [apply] for the common single-output case.
pub fn apply_single<T: TensorLike>(
    f: impl Function<T> + 'static,
    inputs: &[&Variable<T>],
) -> Result<Variable<T>, Error> {
    let mut ys = apply(f, inputs)?;
    match ys.len() {
        1 => Ok(ys.pop().unwrap()),
        n => Err(Error::ArityMismatch {
            expected: 1,
            found: n,
        }),
    }
}
