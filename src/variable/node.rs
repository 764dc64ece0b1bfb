use std::cell::RefCell;
use std::rc::Rc;

use crate::function::FunctionRef;
use crate::tensor::{DataType, Error, TensorLike};

/// Shared handle to a graph node.
pub type NodeRef<T> = Rc<RefCell<VariableNode<T>>>;

/// The graph-identity half of a [Variable](super::Variable).
///
/// A node owns everything that must outlive the user-facing handle: the
/// topological rank, the creator back-reference, the accumulated gradient,
/// name metadata, and the shape/dtype descriptor of the associated data.
/// The node's gradient is the single source of truth; the variable wrapper
/// is stateless with respect to gradient storage.
pub struct VariableNode<T: TensorLike> {
    pub(crate) data_type: Option<DataType>,
    pub(crate) rank: usize,
    pub(crate) creator: Option<FunctionRef<T>>,
    pub(crate) grad: Option<T>,
    pub(crate) name: Option<String>,
    /// Data retained for backward's use. Ownership of the live data stays
    /// with the variable; this is only populated through [VariableNode::retain].
    pub(crate) data: Option<T>,
    pub(crate) requires_grad: bool,
}

impl<T: TensorLike> VariableNode<T> {
    pub(crate) fn new(requires_grad: bool, name: Option<String>) -> Self {
        Self {
            data_type: None,
            rank: 0,
            creator: None,
            grad: None,
            name,
            data: None,
            requires_grad,
        }
    }

    /// Rank reflects graph position at creation time: 0 for leaves, else
    /// `creator.rank + 1`. Severing the creator leaves it unchanged.
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    pub fn creator(&self) -> Option<FunctionRef<T>> {
        self.creator.clone()
    }

    pub fn grad(&self) -> Option<&T> {
        self.grad.as_ref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn data_type(&self) -> Option<&DataType> {
        self.data_type.as_ref()
    }

    /// Records the shape/dtype descriptor of `data` without storing the
    /// data itself.
    pub fn set_data_type(&mut self, data: &T) {
        self.data_type = Some(DataType::of(data));
    }

    /// Stores a retained copy of `data` for backward's use and records its
    /// descriptor.
    pub fn retain(&mut self, data: &T) {
        self.set_data_type(data);
        self.data = Some(data.clone());
    }

    /// Validates `grad` against the recorded descriptor and stores it.
    /// On failure the stored gradient is left unchanged. `None` always
    /// succeeds and clears the gradient.
    pub fn set_grad_with_check(&mut self, grad: Option<T>) -> Result<(), Error> {
        if let (Some(g), Some(dt)) = (&grad, &self.data_type) {
            dt.check_grad(g)?;
        }
        self.grad = grad;
        Ok(())
    }

    pub(crate) fn check_grad(&self, grad: &T) -> Result<(), Error> {
        match &self.data_type {
            Some(dt) => dt.check_grad(grad),
            None => Ok(()),
        }
    }

    /// Assigning a creator sets `rank = creator.rank + 1`; assigning `None`
    /// severs the link and deliberately leaves the rank untouched.
    pub fn set_creator(&mut self, creator: Option<FunctionRef<T>>) {
        if let Some(f) = &creator {
            self.rank = f.borrow().rank() + 1;
        }
        self.creator = creator;
    }

    /// Equivalent to `set_creator(None)`.
    pub fn unchain(&mut self) {
        self.set_creator(None);
    }
}
