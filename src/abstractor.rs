//! Construction of the abstract reachability graph.
//!
//! The [`ArgBuilder`] knows how to create initial nodes and expand a node
//! with the transfer function. The [`Abstractor`] drives it from a
//! [`Waitlist`] until the stop criterion holds or nothing is left to expand,
//! closing nodes by coverage on the way.
//!
//! An abstractor continues an existing ARG: only incomplete nodes are
//! expanded, so an ARG pruned after refinement is re-explored from the
//! pruned points only.

use std::fmt::{Display, Formatter};

use log::{debug, trace};

use crate::analysis::{Analysis, Domain, Lts, TargetPredicate};
use crate::arg::{Arg, NodeData, NodeId};
use crate::cegar::Budget;
use crate::error::Result;
use crate::waitlist::{SearchStrategy, Waitlist};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AbstractorStatus {
    Idle,
    Exploring,
    /// At least one target node exists.
    TargetFound,
    /// Nothing left to expand and no target found: safe under the precision.
    Exhausted,
}

impl Display for AbstractorStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AbstractorStatus::Idle => write!(f, "idle"),
            AbstractorStatus::Exploring => write!(f, "exploring"),
            AbstractorStatus::TargetFound => write!(f, "target found"),
            AbstractorStatus::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// When to stop exploring.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum StopCriterion {
    #[default]
    FirstCex,
    FullExploration,
    AtLeastNCexs(usize),
}

impl StopCriterion {
    fn can_stop<S, A>(&self, arg: &Arg<S, A>) -> bool {
        let n = match self {
            StopCriterion::FirstCex => 1,
            StopCriterion::FullExploration => return false,
            StopCriterion::AtLeastNCexs(n) => (*n).max(1),
        };
        arg.nodes().filter(|node| node.is_target()).take(n).count() == n
    }
}

/// How nodes are closed by existing ones.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum CoverageMode {
    /// Never cover.
    None,
    /// Cover by a single node.
    #[default]
    Single,
    /// Cover by a single node, or by the exact join of several.
    Join,
}

pub struct ArgBuilder<S, A, P> {
    analysis: Analysis<S, A, P>,
    lts: Box<dyn Lts<S, A>>,
    target: Box<dyn TargetPredicate<S>>,
    projection: Box<dyn Fn(&S) -> u64>,
}

impl<S: Clone, A: Clone, P> ArgBuilder<S, A, P> {
    pub fn new(
        analysis: Analysis<S, A, P>,
        lts: impl Lts<S, A> + 'static,
        target: impl TargetPredicate<S> + 'static,
    ) -> Self {
        Self {
            analysis,
            lts: Box::new(lts),
            target: Box::new(target),
            projection: Box::new(|_| 0),
        }
    }

    /// Only states with the same projection may cover each other.
    pub fn with_projection(mut self, projection: impl Fn(&S) -> u64 + 'static) -> Self {
        self.projection = Box::new(projection);
        self
    }

    pub fn domain(&self) -> &dyn Domain<S, P> {
        self.analysis.domain.as_ref()
    }

    fn node_data(&self, state: S, version: usize) -> Result<NodeData<S>> {
        Ok(NodeData {
            target: self.target.is_target(&state)?,
            key: (self.projection)(&state),
            state,
            prec_version: version,
        })
    }

    /// Create the initial nodes.
    pub fn init(&self, arg: &mut Arg<S, A>, prec: &P, version: usize) -> Result<Vec<NodeId>> {
        let mut res = Vec::new();
        for state in self.analysis.init.init_states(prec)? {
            if self.domain().is_bottom(&state) {
                continue;
            }
            res.push(arg.create_init_node(self.node_data(state, version)?));
        }
        arg.set_initialized();
        debug!("created {} initial node(s)", res.len());
        Ok(res)
    }

    /// Create all successors of a node and mark it expanded.
    pub fn expand(&self, arg: &mut Arg<S, A>, node: NodeId, prec: &P, version: usize) -> Result<Vec<NodeId>> {
        let state = arg.get(node)?.state().clone();
        let mut res = Vec::new();
        for action in self.lts.enabled_actions(&state) {
            for succ in self.analysis.trans.succ_states(&state, &action, prec)? {
                if self.domain().is_bottom(&succ) {
                    continue;
                }
                let data = self.node_data(succ, version)?;
                res.push(arg.create_succ_node(node, action.clone(), data)?);
            }
        }
        arg.set_expanded(node)?;
        trace!("expanded {} into {:?}", node, res);
        Ok(res)
    }
}

pub struct Abstractor<S, A, P> {
    builder: ArgBuilder<S, A, P>,
    strategy: SearchStrategy,
    stop: StopCriterion,
    coverage: CoverageMode,
    status: AbstractorStatus,
}

impl<S: Clone, A: Clone, P> Abstractor<S, A, P> {
    pub fn new(builder: ArgBuilder<S, A, P>) -> Self {
        Self {
            builder,
            strategy: SearchStrategy::default(),
            stop: StopCriterion::default(),
            coverage: CoverageMode::default(),
            status: AbstractorStatus::Idle,
        }
    }

    pub fn with_search_strategy(mut self, strategy: SearchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_stop_criterion(mut self, stop: StopCriterion) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_coverage(mut self, coverage: CoverageMode) -> Self {
        self.coverage = coverage;
        self
    }

    pub fn status(&self) -> AbstractorStatus {
        self.status
    }

    pub fn builder(&self) -> &ArgBuilder<S, A, P> {
        &self.builder
    }

    /// Extend `arg` under `prec`. Nodes created now are tagged with
    /// `version`.
    pub fn check(&mut self, arg: &mut Arg<S, A>, prec: &P, version: usize, budget: &Budget) -> Result<AbstractorStatus> {
        self.status = AbstractorStatus::Exploring;
        let res = self.explore(arg, prec, version, budget);
        self.status = match &res {
            Ok(status) => *status,
            Err(_) => AbstractorStatus::Idle,
        };
        res
    }

    fn explore(&self, arg: &mut Arg<S, A>, prec: &P, version: usize, budget: &Budget) -> Result<AbstractorStatus> {
        if !arg.is_initialized() {
            self.builder.init(arg, prec, version)?;
        }
        let mut waitlist = Waitlist::new(self.strategy);
        for id in arg.incomplete_nodes() {
            waitlist.add(id, arg.get(id)?.depth());
        }
        debug!("exploring from {} node(s) with {:?}", waitlist.len(), self.strategy);

        while !self.stop.can_stop(arg) {
            let Some(id) = waitlist.remove() else {
                break;
            };
            budget.poll()?;
            match arg.node(id) {
                Some(node) if node.is_incomplete() => {}
                _ => continue,
            }
            if self.close(arg, id, prec)? {
                continue;
            }
            for succ in self.builder.expand(arg, id, prec, version)? {
                let node = arg.get(succ)?;
                if node.is_target() {
                    debug!("target {} at depth {}", succ, node.depth());
                    continue;
                }
                let depth = node.depth();
                if !self.close(arg, succ, prec)? {
                    waitlist.add(succ, depth);
                }
            }
        }

        let status = if arg.target_nodes().is_empty() {
            AbstractorStatus::Exhausted
        } else {
            AbstractorStatus::TargetFound
        };
        debug!("{}: {} node(s), depth {}", status, arg.size(), arg.depth());
        Ok(status)
    }

    /// Try to cover `id` by existing nodes.
    fn close(&self, arg: &mut Arg<S, A>, id: NodeId, prec: &P) -> Result<bool> {
        if self.coverage == CoverageMode::None {
            return Ok(false);
        }
        let domain = self.builder.domain();
        let node = arg.get(id)?;
        let state = node.state();
        let candidates: Vec<NodeId> = arg
            .nodes_with_key(node.key())
            .filter(|c| c.id() != id && !c.is_covered() && !c.is_target())
            .map(|c| c.id())
            .collect();

        let mut cover = None;
        for &c in &candidates {
            if domain.is_leq(state, arg.get(c)?.state(), prec) {
                cover = Some(vec![c]);
                break;
            }
        }
        if cover.is_none() && self.coverage == CoverageMode::Join && domain.has_exact_join() {
            let mut acc: Option<(S, Vec<NodeId>)> = None;
            for &c in &candidates {
                let other = arg.get(c)?.state();
                acc = match acc {
                    None => Some((other.clone(), vec![c])),
                    Some((joined, mut ids)) => match domain.join(&joined, other, prec) {
                        Some(j) => {
                            ids.push(c);
                            Some((j, ids))
                        }
                        None => Some((joined, ids)),
                    },
                };
                if let Some((joined, ids)) = &acc {
                    if ids.len() > 1 && domain.is_leq(state, joined, prec) {
                        cover = Some(ids.clone());
                        break;
                    }
                }
            }
        }
        match cover {
            Some(by) => {
                arg.cover(id, by)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use std::fmt::{Display, Formatter};

    use test_log::test;

    use crate::analysis::{InitFunc, Prec, TransFunc};
    use crate::cegar::ResourceLimits;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) struct NoPrec;

    impl Display for NoPrec {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            write!(f, "-")
        }
    }

    impl Prec for NoPrec {
        fn join(&self, _: &Self) -> Self {
            NoPrec
        }

        fn size(&self) -> usize {
            0
        }
    }

    /// Sets of values as bitmasks; the action maps every value `v` to
    /// `(v + 1) % modulus`.
    pub(crate) struct Masks {
        pub init: Vec<u8>,
        pub modulus: u8,
        pub bad: u8,
    }

    impl<P> Domain<u8, P> for Masks {
        fn top(&self, _: &P) -> u8 {
            u8::MAX
        }

        fn is_bottom(&self, s: &u8) -> bool {
            *s == 0
        }

        fn is_leq(&self, a: &u8, b: &u8, _: &P) -> bool {
            a & !b == 0
        }

        fn join(&self, a: &u8, b: &u8, _: &P) -> Option<u8> {
            Some(a | b)
        }

        fn has_exact_join(&self) -> bool {
            true
        }
    }

    impl<P> InitFunc<u8, P> for Masks {
        fn init_states(&self, _: &P) -> Result<Vec<u8>> {
            Ok(self.init.clone())
        }
    }

    impl<P> TransFunc<u8, (), P> for Masks {
        fn succ_states(&self, s: &u8, _: &(), _: &P) -> Result<Vec<u8>> {
            let succ = (0..8)
                .filter(|v| s & (1 << v) != 0)
                .map(|v| 1u8 << ((v + 1) % self.modulus))
                .fold(0, |acc, b| acc | b);
            Ok(vec![succ])
        }
    }

    pub(crate) struct Step;

    impl Lts<u8, ()> for Step {
        fn enabled_actions(&self, _: &u8) -> Vec<()> {
            vec![()]
        }
    }

    pub(crate) struct Contains(pub u8);

    impl TargetPredicate<u8> for Contains {
        fn is_target(&self, s: &u8) -> Result<bool> {
            Ok(s & (1 << self.0) != 0)
        }
    }

    pub(crate) fn abstractor<P: 'static>(init: Vec<u8>, modulus: u8, bad: u8) -> Abstractor<u8, (), P> {
        let masks = || Masks { init: init.clone(), modulus, bad };
        let analysis = Analysis::new(masks(), masks(), masks());
        Abstractor::new(ArgBuilder::new(analysis, Step, Contains(bad)))
    }

    #[test]
    fn test_exhausted_with_coverage() {
        let mut abs = abstractor(vec![0b1], 4, 7).with_stop_criterion(StopCriterion::FullExploration);
        let mut arg = Arg::new();
        let limits = ResourceLimits::default();
        let status = abs.check(&mut arg, &NoPrec, 0, &Budget::new(&limits, None)).unwrap();
        assert_eq!(status, AbstractorStatus::Exhausted);
        assert_eq!(abs.status(), AbstractorStatus::Exhausted);
        // 0, 1, 2, 3, and 0 again (covered by the root)
        assert_eq!(arg.size(), 5);
        assert_eq!(arg.nodes().filter(|n| n.is_covered()).count(), 1);
        assert!(arg.is_safe());
        arg.check_well_formed().unwrap();
    }

    #[test]
    fn test_first_cex() {
        let mut abs = abstractor(vec![0b1], 4, 2);
        let mut arg = Arg::new();
        let limits = ResourceLimits::default();
        let status = abs.check(&mut arg, &NoPrec, 0, &Budget::new(&limits, None)).unwrap();
        assert_eq!(status, AbstractorStatus::TargetFound);
        let target = arg.target_nodes()[0];
        assert_eq!(arg.path_to(target).unwrap().len(), 3);
        // Running again stops immediately.
        let size = arg.size();
        abs.check(&mut arg, &NoPrec, 0, &Budget::new(&limits, None)).unwrap();
        assert_eq!(arg.size(), size);
    }

    #[test]
    fn test_no_coverage_on_finite_system() {
        // With modulus 8 and initial value 4, values 4..=7 and then 0.. are
        // reached; without coverage the search stops only at the target.
        let mut abs = abstractor(vec![0b1_0000], 8, 1).with_coverage(CoverageMode::None);
        let mut arg = Arg::new();
        let limits = ResourceLimits::default();
        let status = abs.check(&mut arg, &NoPrec, 0, &Budget::new(&limits, None)).unwrap();
        assert_eq!(status, AbstractorStatus::TargetFound);
        assert_eq!(arg.size(), 6);
    }

    #[test]
    fn test_join_coverage() {
        // {3, 0} steps to {0, 1}, which neither {1} nor {3, 0} covers alone.
        let mut abs = abstractor(vec![0b0001, 0b0010, 0b1001], 4, 7)
            .with_stop_criterion(StopCriterion::FullExploration)
            .with_coverage(CoverageMode::Join);
        let mut arg = Arg::new();
        let limits = ResourceLimits::default();
        abs.check(&mut arg, &NoPrec, 0, &Budget::new(&limits, None)).unwrap();
        let joint = arg.nodes().find(|n| *n.state() == 0b0011).unwrap();
        assert!(joint.covered_by().len() >= 2);
        for &c in joint.covered_by() {
            assert_ne!(*arg.get(c).unwrap().state() & 0b0011, 0b0011);
        }
        assert!(joint.covered_by().contains(&arg.init_nodes()[2]));
        arg.check_well_formed().unwrap();
        assert!(arg.is_safe());

        // Single-node coverage has to expand it instead.
        let mut abs = abstractor(vec![0b0001, 0b0010, 0b1001], 4, 7)
            .with_stop_criterion(StopCriterion::FullExploration)
            .with_coverage(CoverageMode::Single);
        let mut arg = Arg::new();
        abs.check(&mut arg, &NoPrec, 0, &Budget::new(&limits, None)).unwrap();
        let joint = arg.nodes().find(|n| *n.state() == 0b0011).unwrap();
        assert!(!joint.is_covered());
        assert!(arg.is_safe());
    }

    #[test]
    fn test_budget_is_polled() {
        let mut abs = abstractor(vec![0b1], 4, 7);
        let mut arg = Arg::new();
        let limits = ResourceLimits::default().with_max_solver_calls(0);
        let factory = crate::solver::finite::BddSolverFactory::default();
        let res = abs.check(&mut arg, &NoPrec, 0, &Budget::new(&limits, Some(&factory)));
        assert!(res.is_err());
        assert_eq!(abs.status(), AbstractorStatus::Idle);
    }
}
