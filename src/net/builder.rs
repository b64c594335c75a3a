use std::collections::VecDeque;

use super::graph::{
    ref_name, Graph, InteractionId, NodeId, OpId, RedexId, RefId, MATNUM_DEF_BASE,
};
use super::kind::InteractionKind;
use super::redex::RedexMatcher;
use crate::error::TraceError;
use crate::trace::{MemOp, OpKind, Tag};

/// Groups node-store pairs into the ref currently being expanded.
#[derive(Default)]
pub struct RefBuilder {
    state: RefState,
}

#[derive(Default)]
enum RefState {
    #[default]
    Closed,
    /// An expansion was announced but no node arrived yet.
    Pending {
        def_idx: u32,
        redex: Option<RedexId>,
        interaction: InteractionId,
    },
    Open(RefId),
}

impl RefBuilder {
    pub fn is_active(&self) -> bool {
        !matches!(self.state, RefState::Closed)
    }

    /// Announces the expansion of `def_idx`. The ref itself is created
    /// by its first node.
    pub fn expand(&mut self, def_idx: u32, redex: Option<RedexId>, interaction: InteractionId) {
        tracing::debug!("expanding {}", ref_name(def_idx));
        self.state = RefState::Pending {
            def_idx,
            redex,
            interaction,
        };
    }

    pub fn add(&mut self, graph: &mut Graph, neg: OpId, pos: OpId) -> Result<NodeId, TraceError> {
        match self.state {
            RefState::Closed => {
                let memop = &graph.op(neg).memop;
                Err(TraceError::MalformedTrace {
                    line: memop.line,
                    reason: format!("node store at {} outside of any ref", memop.location),
                })
            }
            RefState::Pending {
                def_idx,
                redex,
                interaction,
            } => {
                let id = graph.create_ref(def_idx, redex, interaction, neg, pos);
                self.state = RefState::Open(id);
                Ok(graph.expand_ref(id).nodes[0])
            }
            RefState::Open(id) => Ok(graph.push_node(id, neg, pos)),
        }
    }

    /// Turns an interaction that turned out to allocate a node into a
    /// one-node ref of its own.
    pub fn hijack(
        &mut self,
        graph: &mut Graph,
        interaction: InteractionId,
        neg: OpId,
        pos: OpId,
    ) -> RefId {
        let location = graph.op(neg).memop.location;
        let def_idx = MATNUM_DEF_BASE + location;
        let redex = graph.interaction(interaction).redex;
        let id = graph.create_ref(def_idx, redex, interaction, neg, pos);
        tracing::debug!(
            "interaction #{} materialized {}",
            graph.interaction(interaction).idx,
            ref_name(def_idx)
        );
        self.state = RefState::Open(id);
        id
    }

    pub fn done(&mut self, graph: &Graph) -> Option<RefId> {
        match std::mem::take(&mut self.state) {
            RefState::Closed => None,
            RefState::Pending { def_idx, .. } => {
                tracing::debug!("{} expanded to no nodes", ref_name(def_idx));
                None
            }
            RefState::Open(id) => {
                let expand_ref = graph.expand_ref(id);
                tracing::debug!(
                    "{} closed with {} nodes at {}..={}",
                    ref_name(expand_ref.def_idx),
                    expand_ref.nodes.len(),
                    expand_ref.first_location(),
                    expand_ref.last_location()
                );
                Some(id)
            }
        }
    }
}

/// Collects the body of the interaction currently open.
#[derive(Default)]
pub struct InteractionBuilder {
    open: Option<InteractionId>,
}

impl InteractionBuilder {
    pub fn current(&self) -> Option<InteractionId> {
        self.open
    }

    /// Opens an interaction classified by the name the popping op carries.
    pub fn open(
        &mut self,
        graph: &mut Graph,
        pop: OpId,
        redex: Option<RedexId>,
    ) -> Result<InteractionId, TraceError> {
        let memop = &graph.op(pop).memop;
        let kind = InteractionKind::classify(&memop.interaction_name)
            .map_err(|err| err.at(memop))?;
        let id = graph.alloc_interaction(kind, redex);
        tracing::debug!("interaction #{} {} opened", graph.interaction(id).idx, kind);
        self.open = Some(id);
        Ok(id)
    }

    /// Opens the interaction every boot-time operation belongs to.
    pub fn open_boot(&mut self, graph: &mut Graph) -> InteractionId {
        let id = graph.alloc_interaction(InteractionKind::AppRef, None);
        self.open = Some(id);
        id
    }

    pub fn add(&mut self, graph: &mut Graph, op: OpId) -> Result<NodeId, TraceError> {
        let memop = &graph.op(op).memop;
        let Some(interaction) = self.open else {
            return Err(TraceError::MalformedTrace {
                line: memop.line,
                reason: format!("`{}` happens outside of any interaction", memop),
            });
        };
        let node = graph
            .resolve(memop.location)
            .ok_or_else(|| TraceError::UnresolvedLocation {
                line: memop.line,
                sequence: memop.sequence,
                location: memop.location,
                interaction: memop.interaction_name.clone(),
            })?;
        graph.place(op, node, interaction);
        Ok(node)
    }

    pub fn done(&mut self, graph: &Graph) -> Option<InteractionId> {
        let id = self.open.take()?;
        let interaction = graph.interaction(id);
        tracing::debug!(
            "interaction #{} {} closed with {} memops, {} redexes",
            interaction.idx,
            interaction.kind,
            interaction.memops.len(),
            interaction.redexes.len()
        );
        Some(id)
    }
}

/// Drives reconstruction over the queue of decoded operations.
///
/// On failure the graph keeps everything built before the failing
/// operation; [`Reconstructor::graph`] still gives access to it.
pub struct Reconstructor {
    graph: Graph,
    queue: VecDeque<OpId>,
    matcher: RedexMatcher,
    refs: RefBuilder,
    interactions: InteractionBuilder,
}

impl Reconstructor {
    pub fn new(ops: Vec<MemOp>) -> Self {
        let mut graph = Graph::new();
        let queue = ops.into_iter().map(|op| graph.alloc_op(op)).collect();
        Self {
            graph,
            queue,
            matcher: RedexMatcher::new(),
            refs: RefBuilder::default(),
            interactions: InteractionBuilder::default(),
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn into_graph(self) -> Graph {
        self.graph
    }

    pub fn matcher(&self) -> &RedexMatcher {
        &self.matcher
    }

    pub fn run(&mut self) -> Result<(), TraceError> {
        while let Some(op) = self.queue.pop_front() {
            self.step(op)?;
        }
        self.refs.done(&self.graph);
        self.interactions.done(&self.graph);
        tracing::debug!(
            "reconstructed {} interactions; {} redexes left pending, {} untracked",
            self.graph.interaction_count(),
            self.matcher.pending(),
            self.matcher.untracked()
        );
        Ok(())
    }

    fn step(&mut self, op: OpId) -> Result<(), TraceError> {
        let memop = &self.graph.op(op).memop;
        if memop.is_node_store() {
            let pos = self.second_half(op, "node store", |m| m.kind == OpKind::Store)?;
            return self.node_pair(op, pos);
        }
        if memop.is_push() {
            let pos = self.second_half(op, "push", MemOp::is_push)?;
            let pushed_by = self.interactions.current();
            self.matcher.push(&mut self.graph, op, pos, pushed_by)?;
            return Ok(());
        }
        if memop.kind == OpKind::Pop {
            let pos = self.second_half(op, "pop", |m| m.kind == OpKind::Pop)?;
            return self.pop_pair(op, pos);
        }
        if let Some(interaction) = self.materializes(op)? {
            let pos = self.queue.pop_front().ok_or_else(|| self.truncated(op, "store"))?;
            self.refs.hijack(&mut self.graph, interaction, op, pos);
            return Ok(());
        }
        self.interactions.add(&mut self.graph, op)?;
        Ok(())
    }

    fn truncated(&self, op: OpId, expected: &'static str) -> TraceError {
        let memop = &self.graph.op(op).memop;
        TraceError::TruncatedTrace {
            line: memop.line,
            sequence: memop.sequence,
            location: memop.location,
            interaction: memop.interaction_name.clone(),
            expected,
        }
    }

    /// Takes the op completing `first`. A wrong op is left in the queue.
    fn second_half(
        &mut self,
        first: OpId,
        expected: &'static str,
        fits: impl Fn(&MemOp) -> bool,
    ) -> Result<OpId, TraceError> {
        let Some(&second) = self.queue.front() else {
            return Err(self.truncated(first, expected));
        };
        let memop = &self.graph.op(second).memop;
        if !fits(memop) {
            return Err(TraceError::MalformedTrace {
                line: memop.line,
                reason: format!(
                    "expected the second half of the {} on line {}, found `{}`",
                    expected,
                    self.graph.op(first).memop.line,
                    memop
                ),
            });
        }
        self.queue.pop_front();
        Ok(second)
    }

    fn node_pair(&mut self, neg: OpId, pos: OpId) -> Result<(), TraceError> {
        let first = &self.graph.op(neg).memop;
        let second = &self.graph.op(pos).memop;
        if first.location.checked_add(1) != Some(second.location) {
            return Err(TraceError::MalformedTrace {
                line: second.line,
                reason: format!(
                    "node stores at {} and {} are not adjacent",
                    first.location, second.location
                ),
            });
        }
        if !self.refs.is_active() && self.interactions.current().is_none() {
            let root = first.put.filter(|term| term.tag == Tag::REF);
            let Some(root) = root.filter(|_| first.is_root_interaction()) else {
                return Err(TraceError::MalformedTrace {
                    line: first.line,
                    reason: "trace must boot by storing a REF term".into(),
                });
            };
            let boot = self.interactions.open_boot(&mut self.graph);
            self.refs.expand(root.location, None, boot);
        }
        self.refs.add(&mut self.graph, neg, pos)?;
        Ok(())
    }

    fn pop_pair(&mut self, neg: OpId, pos: OpId) -> Result<(), TraceError> {
        self.refs.done(&self.graph);
        self.interactions.done(&self.graph);

        let redex = self.matcher.pop(&self.graph, neg, pos)?;
        let interaction = self.interactions.open(&mut self.graph, neg, redex)?;

        let popped = &self.graph.op(pos).memop;
        if popped.is_appref_interaction() {
            let def_idx = popped.got.map_or(0, |term| term.location);
            self.refs.expand(def_idx, redex, interaction);
        }
        Ok(())
    }

    /// A numeric match whose store lands outside every known node, followed
    /// by a store to the adjacent location, allocates a fresh node.
    fn materializes(&self, op: OpId) -> Result<Option<InteractionId>, TraceError> {
        let Some(interaction) = self.interactions.current() else {
            return Ok(None);
        };
        let open = self.graph.interaction(interaction);
        if !open.kind.is_numeric_match() || open.expansion.is_some() {
            return Ok(None);
        }
        let first = &self.graph.op(op).memop;
        if first.kind != OpKind::Store || first.in_redex_stack() {
            return Ok(None);
        }
        if self.graph.resolve(first.location).is_some() {
            return Ok(None);
        }
        let Some(&next) = self.queue.front() else {
            return Err(self.truncated(op, "store"));
        };
        let second = &self.graph.op(next).memop;
        let numeric = [first.put, second.put]
            .into_iter()
            .flatten()
            .any(|term| term.tag.is_numeric());
        let adjacent = first.location.checked_add(1) == Some(second.location);
        Ok((second.kind == OpKind::Store && adjacent && numeric).then_some(interaction))
    }
}

/// Reconstructs the whole graph from decoded operations.
pub fn make_all(ops: Vec<MemOp>) -> Result<Graph, TraceError> {
    let mut reconstructor = Reconstructor::new(ops);
    reconstructor.run()?;
    Ok(reconstructor.into_graph())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::graph::{Side, SlotRef};
    use crate::trace::{decode, Term};

    fn build(source: &str) -> Result<Graph, TraceError> {
        make_all(decode(source).unwrap())
    }

    const APPREF_APPLAM: &str = include_str!("../../tests/traces/appref_applam.trace");

    #[test]
    fn boot_builds_one_root_ref() {
        let graph = build(
            "0,0,______,STOR,0,REF,4,0\n\
             1,0,______,STOR,0,ERA,0,1\n\
             2,0,______,STOR,0,VAR,3,2\n\
             3,0,______,STOR,0,ERA,0,3\n",
        )
        .unwrap();
        let refs: Vec<_> = graph.refs().collect();
        assert_eq!(refs.len(), 1);
        let root = graph.expand_ref(refs[0]);
        assert_eq!(root.def_idx, 4);
        assert_eq!(root.redex, None);
        let first = graph.node(root.nodes[0]);
        assert_eq!(first.neg.location(), 0);
        assert_eq!(first.pos.location(), 1);
        assert_eq!(first.neg.term(), Term::new(Tag::REF, 0, 4));
        assert_eq!(first.pos.term(), Term::new(Tag::ERA, 0, 0));
        assert_eq!(graph.root_term(), Some(Term::new(Tag::REF, 0, 4)));
        assert!(graph.interaction(root.interaction).is_boot());
    }

    #[test]
    fn boot_requires_ref() {
        let err = build("0,0,______,STOR,0,ERA,0,0\n1,0,______,STOR,0,ERA,0,1\n").unwrap_err();
        assert!(matches!(err, TraceError::MalformedTrace { line: 1, .. }));
    }

    #[test]
    fn push_and_pop_share_one_redex() {
        let graph = build(APPREF_APPLAM).unwrap();
        let interactions: Vec<_> = graph.interactions().collect();
        assert_eq!(interactions.len(), 3);

        let boot = graph.interaction(interactions[0]);
        let appref = graph.interaction(interactions[1]);
        assert_eq!(boot.redexes.len(), 1);
        assert_eq!(appref.redex, Some(boot.redexes[0]));
        assert_eq!(appref.kind, InteractionKind::AppRef);
        assert_eq!(graph.redex(boot.redexes[0]).popped_by, Some(interactions[1]));

        let applam = graph.interaction(interactions[2]);
        assert_eq!(applam.kind, InteractionKind::AppLam);
        assert_eq!(applam.redex, Some(appref.redexes[0]));
        assert_eq!(applam.memops.len(), 4);
    }

    #[test]
    fn appref_expands_popped_definition() {
        let graph = build(APPREF_APPLAM).unwrap();
        let refs: Vec<_> = graph.refs().collect();
        assert_eq!(refs.len(), 2);
        let expansion = graph.expand_ref(refs[1]);
        assert_eq!(expansion.def_idx, 5);
        assert_eq!(expansion.id(), (5, 4));
        assert_eq!(ref_name(expansion.def_idx), "ref_5");
        assert_eq!(graph.interaction(expansion.interaction).expansion, Some(refs[1]));
        assert_eq!(graph.resolve(5), Some(expansion.nodes[0]));
    }

    #[test]
    fn pushed_redexes_give_nodes_their_roles() {
        let graph = build(APPREF_APPLAM).unwrap();
        let app = graph.resolve_slot(2).unwrap();
        assert_eq!(graph.role(app), "arg");
        let lam = graph.resolve(4).unwrap();
        let var = SlotRef {
            node: lam,
            side: Side::Neg,
        };
        let bod = SlotRef {
            node: lam,
            side: Side::Pos,
        };
        assert_eq!(graph.role(var), "var");
        assert_eq!(graph.role(bod), "bod");
        let redex = graph.node(lam).redex.unwrap();
        assert_eq!(graph.redex(redex).pos.slot, Some(var));
        assert_eq!(graph.redex(redex).neg.slot, None);
    }

    #[test]
    fn body_ops_enter_slot_histories() {
        let graph = build(APPREF_APPLAM).unwrap();
        let ret = graph.resolve_slot(3).unwrap();
        let history = graph.slot(ret).history();
        assert_eq!(history.len(), 2);
        assert_eq!(
            graph.op(history[1]).memop.put,
            Some(Term::new(Tag::VAR, 0, 4))
        );
        assert_eq!(graph.slot(ret).progress_index(), 0);
    }

    #[test]
    fn unmatched_pop_keeps_partial_graph() {
        let ops = decode(
            "0,0,______,STOR,0,REF,2,0\n\
             1,0,______,STOR,0,ERA,0,1\n\
             2,0,APPLAM,POP,0,APP,8,100000\n\
             3,0,APPLAM,POP,0,LAM,10,100001\n",
        )
        .unwrap();
        let mut reconstructor = Reconstructor::new(ops);
        let err = reconstructor.run().unwrap_err();
        assert!(matches!(err, TraceError::UnmatchedPop { line: 3, .. }));
        let graph = reconstructor.graph();
        assert_eq!(graph.refs().count(), 1);
        assert_eq!(graph.nodes().count(), 1);
    }

    #[test]
    fn missing_half_is_truncated() {
        let err = build("0,0,______,STOR,0,REF,2,0\n").unwrap_err();
        assert!(matches!(
            err,
            TraceError::TruncatedTrace {
                expected: "node store",
                ..
            }
        ));

        let err = build(
            "0,0,______,STOR,0,REF,2,0\n\
             1,0,______,STOR,0,ERA,0,1\n\
             2,0,______,STOR,0,APP,0,100000\n",
        )
        .unwrap_err();
        assert!(matches!(err, TraceError::TruncatedTrace { expected: "push", .. }));
    }

    #[test]
    fn wrong_second_half_is_malformed() {
        let ops = decode(
            "0,0,______,STOR,0,REF,2,0\n\
             1,0,______,LOAD,0,ERA,0,1\n",
        )
        .unwrap();
        let mut reconstructor = Reconstructor::new(ops);
        let err = reconstructor.run().unwrap_err();
        assert!(matches!(err, TraceError::MalformedTrace { line: 2, .. }));
        assert_eq!(reconstructor.queue.len(), 1);
        assert_eq!(reconstructor.graph().refs().count(), 0);
    }

    #[test]
    fn push_at_last_location_is_malformed() {
        let err = build(
            "0,0,______,STOR,0,REF,2,0\n\
             1,0,______,STOR,0,ERA,0,1\n\
             2,0,______,STOR,0,APP,0,4294967295\n\
             3,0,______,STOR,0,LAM,2,100000\n",
        )
        .unwrap_err();
        assert!(matches!(err, TraceError::MalformedTrace { line: 4, .. }));
    }

    #[test]
    fn numeric_match_cut_after_first_store_is_truncated() {
        let err = build(
            "0,0,______,STOR,0,REF,9,0\n\
             1,0,______,STOR,0,ERA,0,1\n\
             2,0,______,STOR,0,SUB,0,2\n\
             3,0,______,STOR,0,SUB,0,3\n\
             4,0,______,STOR,0,MAT,2,100000\n\
             5,0,______,STOR,0,U32,3,100001\n\
             6,0,MATU32,POP,0,MAT,2,100000\n\
             7,0,MATU32,POP,0,U32,3,100001\n\
             8,0,MATU32,STOR,0,U32,2,6\n",
        )
        .unwrap_err();
        assert_eq!(
            err,
            TraceError::TruncatedTrace {
                line: 9,
                sequence: 8,
                location: 6,
                interaction: "MATU32".into(),
                expected: "store",
            }
        );
    }

    #[test]
    fn unknown_kind_reports_line() {
        let err = build(
            "0,0,______,STOR,0,REF,2,0\n\
             1,0,______,STOR,0,ERA,0,1\n\
             2,0,______,STOR,0,ERA,0,100000\n\
             3,0,______,STOR,0,REF,3,100001\n\
             4,0,ERAREF,POP,0,ERA,0,100000\n\
             5,0,ERAREF,POP,0,REF,3,100001\n",
        )
        .unwrap_err();
        assert_eq!(err.line(), Some(5));
        assert!(matches!(
            err,
            TraceError::UnknownInteractionKind {
                sequence: Some(4),
                ..
            }
        ));
    }

    #[test]
    fn untracked_pop_opens_interaction_without_redex() {
        let graph = build(
            "0,0,______,STOR,0,REF,2,0\n\
             1,0,______,STOR,0,ERA,0,1\n\
             2,0,______,STOR,0,U32,1,100000\n\
             3,0,______,STOR,0,REF,3,100001\n\
             4,0,MATREF,POP,0,U32,1,100000\n\
             5,0,MATREF,POP,0,REF,3,100001\n",
        )
        .unwrap();
        let last = graph.interactions().last().unwrap();
        assert_eq!(graph.interaction(last).kind, InteractionKind::MatRef);
        assert_eq!(graph.interaction(last).redex, None);
    }

    #[test]
    fn unresolved_location() {
        let err = build(
            "0,0,______,STOR,0,REF,2,0\n\
             1,0,______,STOR,0,ERA,0,1\n\
             2,0,______,LOAD,0,ERA,0,40\n",
        )
        .unwrap_err();
        assert_eq!(
            err,
            TraceError::UnresolvedLocation {
                line: 3,
                sequence: 2,
                location: 40,
                interaction: "______".into(),
            }
        );
    }

    #[test]
    fn numeric_match_materializes_a_node() {
        let graph = build(
            "0,0,______,STOR,0,REF,9,0\n\
             1,0,______,STOR,0,ERA,0,1\n\
             2,0,______,STOR,0,SUB,0,2\n\
             3,0,______,STOR,0,SUB,0,3\n\
             4,0,______,STOR,0,MAT,2,100000\n\
             5,0,______,STOR,0,U32,3,100001\n\
             6,0,MATU32,POP,0,MAT,2,100000\n\
             7,0,MATU32,POP,0,U32,3,100001\n\
             8,0,MATU32,STOR,0,U32,2,6\n\
             9,0,MATU32,STOR,0,SUB,0,7\n\
             10,0,MATU32,EXCH,0,SUB,0,U32,2,2\n",
        )
        .unwrap();
        let interaction = graph.interactions().last().unwrap();
        let interaction = graph.interaction(interaction);
        assert_eq!(interaction.kind, InteractionKind::MatU32);
        let expansion = graph.expand_ref(interaction.expansion.unwrap());
        assert_eq!(ref_name(expansion.def_idx), "matu32_6");
        assert_eq!(expansion.nodes.len(), 1);
        assert_eq!(interaction.memops.len(), 1);

        let mat = graph.resolve_slot(2).unwrap();
        assert_eq!(graph.role(mat), "mat");
    }
}
