//! Alternating sequences of states and actions.

use std::fmt::{Display, Formatter};

use crate::arg::{Arg, NodeId};
use crate::error::{CegarError, Result};

/// `s0 -a0-> s1 -a1-> ... sn`. There is one more state than actions.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace<S, A> {
    states: Vec<S>,
    actions: Vec<A>,
}

impl<S, A> Trace<S, A> {
    pub fn new(states: Vec<S>, actions: Vec<A>) -> Self {
        assert_eq!(
            states.len(),
            actions.len() + 1,
            "a trace has one more state than actions"
        );
        Self { states, actions }
    }

    pub fn states(&self) -> &[S] {
        &self.states
    }

    pub fn actions(&self) -> &[A] {
        &self.actions
    }

    /// Number of actions.
    pub fn length(&self) -> usize {
        self.actions.len()
    }
}

impl<S: Display, A: Display> Display for Trace<S, A> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.states[0])?;
        for (a, s) in self.actions.iter().zip(&self.states[1..]) {
            write!(f, " -[{}]-> {}", a, s)?;
        }
        Ok(())
    }
}

/// A path of the ARG from an initial node to a target node.
#[derive(Debug, Clone)]
pub struct Counterexample<S, A> {
    nodes: Vec<NodeId>,
    trace: Trace<S, A>,
}

impl<S: Clone, A: Clone> Counterexample<S, A> {
    pub fn from_arg(arg: &Arg<S, A>, target: NodeId) -> Result<Self> {
        let nodes = arg.path_to(target)?;
        let mut states = Vec::with_capacity(nodes.len());
        let mut actions = Vec::with_capacity(nodes.len());
        for &id in &nodes {
            let node = arg.get(id)?;
            states.push(node.state().clone());
            if let Some(edge) = node.in_edge() {
                actions.push(edge.action.clone());
            }
        }
        if actions.len() + 1 != states.len() {
            return Err(CegarError::InconsistentArg(format!(
                "path to {} does not start at an initial node",
                target
            )));
        }
        Ok(Self {
            nodes,
            trace: Trace::new(states, actions),
        })
    }
}

impl<S, A> Counterexample<S, A> {
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn trace(&self) -> &Trace<S, A> {
        &self.trace
    }

    pub fn into_trace(self) -> Trace<S, A> {
        self.trace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::arg::NodeData;

    #[test]
    fn test_counterexample_from_arg() {
        let mut arg: Arg<&str, u32> = Arg::new();
        let data = |state| NodeData {
            state,
            target: false,
            key: 0,
            prec_version: 0,
        };
        let n0 = arg.create_init_node(data("s0"));
        let n1 = arg.create_succ_node(n0, 1, data("s1")).unwrap();
        let n2 = arg.create_succ_node(n1, 2, data("s2")).unwrap();
        let cex = Counterexample::from_arg(&arg, n2).unwrap();
        assert_eq!(cex.nodes(), &[n0, n1, n2]);
        assert_eq!(cex.trace().length(), 2);
        assert_eq!(cex.trace().to_string(), "s0 -[1]-> s1 -[2]-> s2");

        let root = Counterexample::from_arg(&arg, n0).unwrap();
        assert_eq!(root.trace().length(), 0);
    }

    #[test]
    #[should_panic]
    fn test_trace_shape() {
        Trace::<u32, u32>::new(vec![0], vec![1]);
    }
}
