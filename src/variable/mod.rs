//! User-facing [Variable] handles, the graph-identity [VariableNode]s they
//! own, and the reverse-mode backward engine.

mod node;
mod ops;

pub use node::{NodeRef, VariableNode};

use std::cell::RefCell;
use std::collections::{BinaryHeap, BTreeSet};
use std::rc::Rc;

use crate::dtypes::Dtype;
use crate::function::FunctionRef;
use crate::tensor::{Error, TensorLike};

/// A value in a define-by-run computation.
///
/// Wraps the concrete data (optional, so that lazy parameters can exist
/// without a shape yet) and exclusively owns one [VariableNode] that carries
/// the graph identity: rank, creator link and gradient storage. Arithmetic
/// on variables routes through [Function](crate::function::Function)
/// applications, so every result is a well-formed graph node.
pub struct Variable<T: TensorLike> {
    data: Option<T>,
    node: NodeRef<T>,
}

impl<T: TensorLike> std::fmt::Debug for Variable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Variable")
            .field("data", &self.data)
            .field("grad", &self.node.borrow().grad)
            .field("requires_grad", &self.node.borrow().requires_grad)
            .finish()
    }
}

impl<T: TensorLike> Variable<T> {
    fn with_parts(data: Option<T>, requires_grad: bool, name: Option<String>) -> Self {
        let mut node = VariableNode::new(requires_grad, name);
        if let Some(d) = &data {
            node.set_data_type(d);
        }
        Self {
            data,
            node: Rc::new(RefCell::new(node)),
        }
    }

    /// A leaf variable that participates in gradient propagation.
    pub fn new(data: T) -> Self {
        Self::with_parts(Some(data), true, None)
    }

    /// A named leaf variable.
    pub fn named(data: T, name: &str) -> Self {
        Self::with_parts(Some(data), true, Some(name.to_string()))
    }

    /// A leaf that never receives gradients, e.g. a coerced plain value.
    pub fn constant(data: T) -> Self {
        Self::with_parts(Some(data), false, None)
    }

    /// A variable with unset data, e.g. a parameter awaiting shape
    /// inference. Data accessors fail with [Error::NoData] until data is
    /// assigned.
    pub fn empty() -> Self {
        Self::with_parts(None, true, None)
    }

    pub(crate) fn from_output(data: T, requires_grad: bool) -> Self {
        Self::with_parts(Some(data), requires_grad, None)
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn set_data(&mut self, data: T) {
        self.node.borrow_mut().set_data_type(&data);
        self.data = Some(data);
    }

    pub fn node(&self) -> &NodeRef<T> {
        &self.node
    }

    pub fn requires_grad(&self) -> bool {
        self.node.borrow().requires_grad
    }

    pub fn name(&self) -> Option<String> {
        self.node.borrow().name.clone()
    }

    pub fn set_name(&self, name: &str) {
        self.node.borrow_mut().name = Some(name.to_string());
    }

    /// Display label: the name when set, otherwise a shape/dtype summary.
    pub fn label(&self) -> String {
        if let Some(name) = self.name() {
            return name;
        }
        match &self.data {
            Some(d) => format!("{:?}, {}", d.shape(), d.dtype()),
            None => "(empty)".to_string(),
        }
    }

    pub fn rank(&self) -> usize {
        self.node.borrow().rank
    }

    pub fn creator(&self) -> Option<FunctionRef<T>> {
        self.node.borrow().creator.clone()
    }

    pub fn set_creator(&self, creator: Option<FunctionRef<T>>) {
        self.node.borrow_mut().set_creator(creator);
    }

    /// The accumulated gradient from the most recent backward traversal.
    pub fn grad(&self) -> Option<T> {
        self.node.borrow().grad.clone()
    }

    /// Validates `grad` against the recorded data descriptor and stores it
    /// on the node. On failure the stored gradient is left unchanged.
    pub fn try_set_grad(&self, grad: Option<T>) -> Result<(), Error> {
        self.node.borrow_mut().set_grad_with_check(grad)
    }

    /// See [Variable::try_set_grad]. Panics on a type or shape mismatch.
    pub fn set_grad(&self, grad: Option<T>) {
        self.try_set_grad(grad).unwrap()
    }

    pub fn cleargrad(&self) {
        self.node.borrow_mut().grad = None;
    }

    /// Copies the data onto the node so it survives for backward's use.
    pub fn retain_data(&self) {
        if let Some(d) = &self.data {
            self.node.borrow_mut().retain(d);
        }
    }

    pub fn shape(&self) -> Result<&[usize], Error> {
        Ok(self.data.as_ref().ok_or(Error::NoData)?.shape())
    }

    pub fn ndim(&self) -> Result<usize, Error> {
        Ok(self.data.as_ref().ok_or(Error::NoData)?.ndim())
    }

    pub fn size(&self) -> Result<usize, Error> {
        Ok(self.data.as_ref().ok_or(Error::NoData)?.size())
    }

    pub fn dtype(&self) -> Result<Dtype, Error> {
        Ok(self.data.as_ref().ok_or(Error::NoData)?.dtype())
    }

    /// Severs this variable's creator link. O(1), no traversal; the rank is
    /// left untouched, so a later backward from downstream treats this
    /// variable as a leaf.
    pub fn unchain(&self) {
        self.node.borrow_mut().unchain();
    }

    /// Severs the entire history reachable backward from this variable.
    ///
    /// Every function reachable through creator links drops its input
    /// references and clears its outputs' creator links, so nodes that are
    /// not referenced from anywhere else become collectible. This variable
    /// itself becomes a root; its data and gradient stay usable, which is
    /// what truncated backprop through time needs between windows.
    pub fn unchain_backward(&self) {
        let mut cand_funcs: Vec<FunctionRef<T>> = Vec::new();
        let mut seen_set: BTreeSet<usize> = BTreeSet::new();

        if let Some(c) = self.creator() {
            seen_set.insert(Rc::as_ptr(&c) as usize);
            cand_funcs.push(c);
        }

        while let Some(func) = cand_funcs.pop() {
            let inputs = func.borrow().inputs.clone();
            for x in inputs {
                if let Some(c) = x.borrow().creator.clone() {
                    if seen_set.insert(Rc::as_ptr(&c) as usize) {
                        cand_funcs.push(c);
                    }
                }
            }
            func.borrow_mut().unchain();
        }
    }

    /// Runs reverse-mode backpropagation from this variable, discarding
    /// intermediate gradients as soon as they are consumed.
    pub fn backward(&self) -> Result<(), Error> {
        self.run_backward(false)
    }

    /// Like [Variable::backward], but keeps the gradient on every
    /// intermediate variable.
    pub fn backward_retain_grad(&self) -> Result<(), Error> {
        self.run_backward(true)
    }

    fn run_backward(&self, retain_grad: bool) -> Result<(), Error> {
        let Some(creator) = self.creator() else {
            // Leaf: nothing to propagate.
            return Ok(());
        };

        // Scalar-loss convenience: seed a ones gradient.
        {
            let mut node = self.node.borrow_mut();
            if node.grad.is_none() {
                if let Some(data) = &self.data {
                    if data.size() == 1 {
                        node.grad = Some(data.ones_like());
                    }
                }
            }
        }

        let mut ready: BinaryHeap<Pending<T>> = BinaryHeap::new();
        let mut seen_funcs: BTreeSet<usize> = BTreeSet::new();
        let mut seq = 0usize;

        seen_funcs.insert(Rc::as_ptr(&creator) as usize);
        let rank = creator.borrow().rank();
        ready.push(Pending {
            rank,
            seq,
            func: creator,
        });

        // Per-traversal accumulation bookkeeping: which nodes have received
        // a contribution, and which still hold a buffer the engine does not
        // own (copy before the next in-place add).
        let mut seen_vars: BTreeSet<usize> = BTreeSet::new();
        let mut need_copy: BTreeSet<usize> = BTreeSet::new();

        while let Some(Pending { func, .. }) = ready.pop() {
            let (outputs, inputs) = {
                let f = func.borrow();
                let outputs: Vec<Option<NodeRef<T>>> =
                    f.outputs.iter().map(|w| w.upgrade()).collect();
                (outputs, f.inputs.clone())
            };

            let in_data: Vec<Option<T>> =
                inputs.iter().map(|x| x.borrow().data.clone()).collect();
            let out_grads: Vec<Option<T>> = outputs
                .iter()
                .map(|y| y.as_ref().and_then(|y| y.borrow().grad.clone()))
                .collect();
            let out_data: Vec<Option<T>> = outputs
                .iter()
                .map(|y| y.as_ref().and_then(|y| y.borrow().data.clone()))
                .collect();
            func.borrow_mut().output_data = Some(out_data);

            let gxs = {
                let f = func.borrow();
                let xs: Vec<Option<&T>> = in_data.iter().map(Option::as_ref).collect();
                let gys: Vec<Option<&T>> = out_grads.iter().map(Option::as_ref).collect();
                f.fun.backward(&xs, &gys)?
            };

            if gxs.len() != inputs.len() {
                return Err(Error::ArityMismatch {
                    expected: inputs.len(),
                    found: gxs.len(),
                });
            }

            {
                let mut f = func.borrow_mut();
                if !f.fun.retain_after_backward() {
                    f.output_data = None;
                }
            }

            if !retain_grad {
                // Gradients on fully-consumed intermediate nodes are
                // discardable; only the seed keeps its gradient.
                for y in outputs.iter().flatten() {
                    if !Rc::ptr_eq(y, &self.node) {
                        y.borrow_mut().grad = None;
                    }
                }
            }

            for (x, gx) in inputs.iter().zip(gxs) {
                let Some(gx) = gx else { continue };
                if !x.borrow().requires_grad {
                    continue;
                }

                // A single-element operand broadcast over a larger one
                // receives the sum of the incoming gradient.
                let gx = match x.borrow().data_type() {
                    Some(dt) if dt.size() == 1 && gx.size() > 1 => gx.sum(None, false),
                    _ => gx,
                };

                x.borrow().check_grad(&gx)?;

                let id_x = Rc::as_ptr(x) as usize;
                let x_creator = x.borrow().creator.clone();

                match x_creator {
                    None => {
                        // Leaf: accumulate into whatever gradient is
                        // already there, including one from an earlier
                        // backward call.
                        let mut xb = x.borrow_mut();
                        match xb.grad.take() {
                            None => {
                                xb.grad = Some(gx);
                                need_copy.insert(id_x);
                            }
                            Some(mut g) => {
                                if need_copy.remove(&id_x) {
                                    g = g.try_add(&gx)?;
                                } else {
                                    g.try_add_assign(&gx)?;
                                }
                                xb.grad = Some(g);
                            }
                        }
                    }
                    Some(c) => {
                        if seen_funcs.insert(Rc::as_ptr(&c) as usize) {
                            seq += 1;
                            let rank = c.borrow().rank();
                            ready.push(Pending { rank, seq, func: c });
                        }
                        let mut xb = x.borrow_mut();
                        if seen_vars.contains(&id_x) {
                            match xb.grad.take() {
                                None => {
                                    xb.grad = Some(gx);
                                    need_copy.insert(id_x);
                                }
                                Some(mut g) => {
                                    if need_copy.remove(&id_x) {
                                        g = g.try_add(&gx)?;
                                    } else {
                                        g.try_add_assign(&gx)?;
                                    }
                                    xb.grad = Some(g);
                                }
                            }
                        } else {
                            // First contribution this traversal replaces
                            // any stale gradient from a previous one.
                            xb.grad = Some(gx);
                            seen_vars.insert(id_x);
                            need_copy.insert(id_x);
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

/// Ready-list entry: highest rank first, ties broken by push order.
struct Pending<T: TensorLike> {
    rank: usize,
    seq: usize,
    func: FunctionRef<T>,
}

impl<T: TensorLike> PartialEq for Pending<T> {
    fn eq(&self, other: &Self) -> bool {
        self.rank == other.rank && self.seq == other.seq
    }
}

impl<T: TensorLike> Eq for Pending<T> {}

impl<T: TensorLike> PartialOrd for Pending<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: TensorLike> Ord for Pending<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank
            .cmp(&other.rank)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{apply, apply_single, apply_with_config, Function};
    use crate::tensor::{DataType, NdArray};
    use crate::tests::*;
    use crate::config::Config;

    /// Test function that ignores its inputs and returns fixed outputs;
    /// backward sends zero gradient to every input.
    #[derive(Debug)]
    struct Constant {
        outputs: Vec<NdArray<TestDtype>>,
    }

    impl Function<NdArray<TestDtype>> for Constant {
        fn forward(
            &mut self,
            _xs: &[&NdArray<TestDtype>],
        ) -> Result<Vec<NdArray<TestDtype>>, Error> {
            Ok(self.outputs.clone())
        }

        fn backward(
            &self,
            xs: &[Option<&NdArray<TestDtype>>],
            _gys: &[Option<&NdArray<TestDtype>>],
        ) -> Result<Vec<Option<NdArray<TestDtype>>>, Error> {
            Ok(xs.iter().map(|x| x.map(|x| x.zeros_like())).collect())
        }

        fn label(&self) -> &'static str {
            "constant"
        }
    }

    fn constant(
        x: &Variable<NdArray<TestDtype>>,
        value: NdArray<TestDtype>,
    ) -> Variable<NdArray<TestDtype>> {
        apply_single(Constant { outputs: vec![value] }, &[x]).unwrap()
    }

    /// x -> c1 -> ... -> c_length, with a zero gradient preset on the last.
    fn create_linear_chain(length: usize) -> Vec<Variable<NdArray<TestDtype>>> {
        let x = Variable::new(NdArray::from_vec(&[3], vec![1.0, 2.0, 3.0]));
        let mut ret = vec![x];
        for i in 0..length {
            let a = NdArray::from_vec(&[3], vec![0.5, 1.5, 2.5]);
            let y = constant(&ret[i], a);
            ret.push(y);
        }
        let last = ret.last().unwrap();
        let zeros = last.data().unwrap().zeros_like();
        last.set_grad(Some(zeros));
        ret
    }

    #[test]
    fn test_attributes() {
        let x = Variable::named(NdArray::from_vec(&[2, 5], (0..10).map(|i| i as TestDtype).collect()), "x");
        assert_eq!(x.shape().unwrap(), &[2, 5]);
        assert_eq!(x.ndim().unwrap(), 2);
        assert_eq!(x.size().unwrap(), 10);
        assert_eq!(x.dtype().unwrap(), Dtype::F32);
        assert!(x.requires_grad());
        assert!(x.node().borrow().requires_grad());
        assert_eq!(x.name().as_deref(), Some("x"));
        assert_eq!(x.label(), "x");
    }

    #[test]
    fn test_empty_variable_accessors_fail() {
        let x = Variable::<NdArray<TestDtype>>::empty();
        assert!(matches!(x.shape(), Err(Error::NoData)));
        assert!(matches!(x.dtype(), Err(Error::NoData)));
    }

    #[test]
    fn test_rank_invariant() {
        let ret = create_linear_chain(3);
        for (i, v) in ret.iter().enumerate() {
            assert_eq!(v.rank(), i);
        }
        for v in &ret[1..] {
            let f = v.creator().unwrap();
            let f = f.borrow();
            let max_in = f.inputs().iter().map(|x| x.borrow().rank()).max().unwrap();
            assert_eq!(f.rank(), max_in);
            assert_eq!(v.rank(), f.rank() + 1);
        }
    }

    #[test]
    fn test_backward_leaf_is_noop() {
        let x = Variable::new(NdArray::from_vec(&[1], vec![2.0 as TestDtype]));
        x.backward().unwrap();
        assert!(x.grad().is_none());
    }

    #[test]
    fn test_scalar_seed_convention() {
        let x = Variable::new(NdArray::from_vec(&[1], vec![2.0 as TestDtype]));
        let y = &x * &x;
        assert!(y.grad().is_none());
        y.backward().unwrap();
        assert_eq!(y.grad().unwrap(), NdArray::from_vec(&[1], vec![1.0]));
        assert_eq!(x.grad().unwrap(), NdArray::from_vec(&[1], vec![4.0]));
    }

    #[test]
    fn test_fan_in_accumulates() {
        let a = Variable::new(NdArray::from_vec(&[1], vec![3.0 as TestDtype]));
        let b = &a + &a;
        b.backward().unwrap();
        assert_eq!(a.grad().unwrap(), NdArray::from_vec(&[1], vec![2.0]));
    }

    #[test]
    fn test_diamond_fan_in() {
        // loss = 2v + 3v, so dloss/dv = 5: both branch partials must land.
        let v = Variable::new(NdArray::from_vec(&[1], vec![1.0 as TestDtype]));
        let left = &v * 2.0;
        let right = &v * 3.0;
        let loss = &left + &right;
        loss.backward().unwrap();
        assert_eq!(v.grad().unwrap(), NdArray::from_vec(&[1], vec![5.0]));
    }

    #[test]
    fn test_leaf_grad_accumulates_across_backward_calls() {
        let x = Variable::new(NdArray::from_vec(&[1], vec![2.0 as TestDtype]));
        let y = &x * &x;
        y.backward().unwrap();
        let y2 = &x * &x;
        y2.backward().unwrap();
        assert_eq!(x.grad().unwrap(), NdArray::from_vec(&[1], vec![8.0]));
        x.cleargrad();
        assert!(x.grad().is_none());
    }

    #[test]
    fn test_retain_grad_false_clears_intermediates() {
        let ret = create_linear_chain(2);
        ret[2].backward().unwrap();
        assert!(ret[0].grad().is_some());
        assert!(ret[1].grad().is_none());
        assert!(ret[2].grad().is_some());
    }

    #[test]
    fn test_retain_grad_true_keeps_intermediates() {
        let ret = create_linear_chain(2);
        ret[2].backward_retain_grad().unwrap();
        assert!(ret[0].grad().is_some());
        assert!(ret[1].grad().is_some());
        assert!(ret[2].grad().is_some());
    }

    #[test]
    fn test_set_none_to_creator_keeps_rank() {
        let ret = create_linear_chain(3);
        let old_rank = ret[1].rank();
        ret[1].set_creator(None);
        assert!(ret[1].creator().is_none());
        assert_eq!(ret[1].rank(), old_rank);

        // Backward from downstream stops at the severed node as at a leaf.
        ret[3].backward().unwrap();
        assert!(ret[1].grad().is_some());
        assert!(ret[0].grad().is_none());
    }

    #[test]
    fn test_unchain_is_severing() {
        let ret = create_linear_chain(3);
        let old_rank = ret[1].rank();
        ret[1].unchain();
        assert!(ret[1].creator().is_none());
        assert_eq!(ret[1].rank(), old_rank);
    }

    #[test]
    fn test_set_fresh_creator_updates_rank() {
        let ret = create_linear_chain(2);
        let creator = ret[1].creator().unwrap();
        ret[1].set_creator(None);
        let expected = creator.borrow().rank() + 1;
        ret[1].set_creator(Some(creator));
        assert_eq!(ret[1].rank(), expected);
    }

    #[test]
    fn test_unchain_backward_totality() {
        let ret = create_linear_chain(3);
        let funcs: Vec<_> = ret[1..].iter().map(|v| v.creator().unwrap()).collect();
        ret[3].unchain_backward();
        for f in &funcs {
            assert_eq!(f.borrow().num_inputs(), 0);
        }
        assert!(ret[3].creator().is_none());
        // The variable itself stays usable.
        assert!(ret[3].data().is_some());
        assert!(ret[3].grad().is_some());
        ret[3].backward().unwrap();
    }

    #[test]
    fn test_grad_type_check_pass() {
        let a = Variable::new(NdArray::<TestDtype>::zeros(&[3]));
        a.try_set_grad(Some(NdArray::zeros(&[3]))).unwrap();
    }

    #[test]
    fn test_grad_type_check_0d_equivalence() {
        let a = Variable::new(NdArray::<TestDtype>::zeros(&[]));
        a.try_set_grad(Some(NdArray::zeros(&[1]))).unwrap();
    }

    #[test]
    fn test_grad_type_check_shape() {
        let a = Variable::new(NdArray::<TestDtype>::zeros(&[3]));
        a.try_set_grad(Some(NdArray::zeros(&[3]))).unwrap();
        let r = a.try_set_grad(Some(NdArray::zeros(&[2])));
        assert!(matches!(r, Err(Error::ShapeMismatch { .. })));
        // The stored gradient is unchanged by the rejected assignment.
        assert_eq!(a.grad().unwrap(), NdArray::zeros(&[3]));
    }

    #[test]
    fn test_grad_type_check_dtype() {
        let dt = DataType {
            shape: vec![3],
            dtype: Dtype::F64,
        };
        let r = dt.check_grad(&NdArray::<f32>::zeros(&[3]));
        assert!(matches!(r, Err(Error::TypeMismatch { .. })));
    }

    #[test]
    fn test_arity_mismatch_is_fatal() {
        #[derive(Debug)]
        struct Broken;
        impl Function<NdArray<TestDtype>> for Broken {
            fn forward(
                &mut self,
                xs: &[&NdArray<TestDtype>],
            ) -> Result<Vec<NdArray<TestDtype>>, Error> {
                Ok(vec![xs[0].clone()])
            }
            fn backward(
                &self,
                _xs: &[Option<&NdArray<TestDtype>>],
                _gys: &[Option<&NdArray<TestDtype>>],
            ) -> Result<Vec<Option<NdArray<TestDtype>>>, Error> {
                Ok(Vec::new())
            }
        }
        let x = Variable::new(NdArray::from_vec(&[1], vec![1.0 as TestDtype]));
        let y = apply_single(Broken, &[&x]).unwrap();
        let r = y.backward();
        assert!(matches!(r, Err(Error::ArityMismatch { expected: 1, found: 0 })));
    }

    #[test]
    fn test_no_backprop_config_builds_no_graph() {
        let x = Variable::new(NdArray::from_vec(&[1], vec![1.0 as TestDtype]));
        let ys = apply_with_config(
            crate::functions::Add,
            &[&x, &x],
            &Config::no_backprop(),
        )
        .unwrap();
        assert!(ys[0].creator().is_none());
        assert_eq!(ys[0].rank(), 0);
    }

    #[test]
    fn test_constant_inputs_build_no_graph() {
        let x = Variable::constant(NdArray::from_vec(&[1], vec![1.0 as TestDtype]));
        let y = apply(crate::functions::Add, &[&x, &x]).unwrap().remove(0);
        assert!(y.creator().is_none());
        assert!(!y.requires_grad());
    }
}
