use std::collections::BTreeMap;

use serde::Serialize;

use super::arena::{Arena, Index};
use super::kind::InteractionKind;
use crate::error::TraceError;
use crate::trace::{MemOp, Term};

pub type OpId = Index<Op>;
pub type NodeId = Index<Node>;
pub type RefId = Index<ExpandRef>;
pub type RedexId = Index<Redex>;
pub type InteractionId = Index<Interaction>;

/// Def indices at or above this are synthetic: they name the single node
/// a numeric match materializes, offset by that node's location.
pub const MATNUM_DEF_BASE: u32 = 1 << 24;

pub fn ref_name(def_idx: u32) -> String {
    if def_idx >= MATNUM_DEF_BASE {
        format!("matu32_{}", def_idx - MATNUM_DEF_BASE)
    } else {
        format!("ref_{}", def_idx)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Side {
    /// The even location of a node.
    Neg,
    /// The odd location, `neg + 1`.
    Pos,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SlotRef {
    pub node: NodeId,
    pub side: Side,
}

/// A decoded operation together with where reconstruction placed it.
#[derive(Debug)]
pub struct Op {
    pub memop: MemOp,
    pub node: Option<NodeId>,
    pub interaction: Option<InteractionId>,
}

/// A fixed memory location and every value ever written to it.
///
/// `history` only grows, and replay only moves `progress_index` forward
/// through it; `term` is always the put of `history[progress_index]`.
#[derive(Debug)]
pub struct Slot {
    location: u32,
    term: Term,
    history: Vec<OpId>,
    progress_index: usize,
    empty: bool,
    origin: Option<SlotRef>,
}

impl Slot {
    fn new(location: u32, term: Term, store: OpId) -> Self {
        Self {
            location,
            term,
            history: vec![store],
            progress_index: 0,
            empty: false,
            origin: None,
        }
    }

    pub fn location(&self) -> u32 {
        self.location
    }
    pub fn term(&self) -> Term {
        self.term
    }
    pub fn history(&self) -> &[OpId] {
        &self.history
    }
    pub fn progress_index(&self) -> usize {
        self.progress_index
    }
    pub fn is_empty(&self) -> bool {
        self.empty
    }
    /// The slot whose value was last moved in here, if known.
    pub fn origin(&self) -> Option<SlotRef> {
        self.origin
    }
    pub fn memops_done(&self) -> bool {
        self.progress_index + 1 >= self.history.len()
    }
}

#[derive(Debug)]
pub struct Node {
    pub neg: Slot,
    pub pos: Slot,
    pub owner: RefId,
    /// The first redex pushed by the owning ref that points into this node.
    /// It gives the slots their roles.
    pub redex: Option<RedexId>,
}

impl Node {
    pub fn location(&self) -> u32 {
        self.neg.location
    }

    pub fn contains(&self, location: u32) -> bool {
        location == self.neg.location || location == self.pos.location
    }

    pub fn side_of(&self, location: u32) -> Option<Side> {
        if location == self.neg.location {
            Some(Side::Neg)
        } else if location == self.pos.location {
            Some(Side::Pos)
        } else {
            None
        }
    }

    pub fn slot(&self, side: Side) -> &Slot {
        match side {
            Side::Neg => &self.neg,
            Side::Pos => &self.pos,
        }
    }

    fn slot_mut(&mut self, side: Side) -> &mut Slot {
        match side {
            Side::Neg => &mut self.neg,
            Side::Pos => &mut self.pos,
        }
    }
}

/// The nodes produced by expanding one definition. Never empty.
#[derive(Debug)]
pub struct ExpandRef {
    pub def_idx: u32,
    pub nodes: Vec<NodeId>,
    /// The popped redex that caused the expansion; `None` for the boot ref.
    pub redex: Option<RedexId>,
    pub interaction: InteractionId,
    first_location: u32,
    last_location: u32,
}

impl ExpandRef {
    pub fn id(&self) -> (u32, u32) {
        (self.def_idx, self.first_location)
    }
    pub fn first_location(&self) -> u32 {
        self.first_location
    }
    pub fn last_location(&self) -> u32 {
        self.last_location
    }
    pub fn contains(&self, location: u32) -> bool {
        (self.first_location..=self.last_location).contains(&location)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RedexTerm {
    pub term: Term,
    /// The slot the term points at, when it was pushed from a ref owning that slot.
    pub slot: Option<SlotRef>,
}

#[derive(Debug)]
pub struct Redex {
    pub sequence: u64,
    pub location: u32,
    pub neg: RedexTerm,
    pub pos: RedexTerm,
    pub pushed_by: Option<InteractionId>,
    pub popped_by: Option<InteractionId>,
}

impl Redex {
    /// The interaction name this redex would reduce as.
    pub fn name(&self) -> String {
        format!("{}{}", self.neg.term.tag, self.pos.term.tag)
    }

    pub fn kind(&self) -> Option<InteractionKind> {
        InteractionKind::classify(&self.name()).ok()
    }

    pub fn is_tracked(&self) -> bool {
        self.neg.term.located().is_some() || self.pos.term.located().is_some()
    }

    pub fn term_slot(&self, term: Term) -> Option<&RedexTerm> {
        [&self.neg, &self.pos].into_iter().find(|t| t.term == term)
    }
}

#[derive(Debug)]
pub struct Interaction {
    pub idx: usize,
    pub kind: InteractionKind,
    /// The popped redex; `None` for the boot interaction and untracked pops.
    pub redex: Option<RedexId>,
    pub redexes: Vec<RedexId>,
    /// Body operations, in trace order.
    pub memops: Vec<OpId>,
    /// The ref this interaction expanded, if it expanded one.
    pub expansion: Option<RefId>,
}

impl Interaction {
    pub fn is_boot(&self) -> bool {
        self.idx == 0 && self.redex.is_none()
    }
}

/// The reconstructed execution: every op, ref, node, redex and interaction,
/// linked by indices.
#[derive(Default, Debug)]
pub struct Graph {
    arena: Arena,
    by_first_location: BTreeMap<u32, RefId>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn op(&self, id: OpId) -> &Op {
        self.arena.get(id)
    }
    pub fn node(&self, id: NodeId) -> &Node {
        self.arena.get(id)
    }
    pub fn expand_ref(&self, id: RefId) -> &ExpandRef {
        self.arena.get(id)
    }
    pub fn redex(&self, id: RedexId) -> &Redex {
        self.arena.get(id)
    }
    pub fn interaction(&self, id: InteractionId) -> &Interaction {
        self.arena.get(id)
    }
    pub fn slot(&self, at: SlotRef) -> &Slot {
        self.node(at.node).slot(at.side)
    }

    pub fn ops(&self) -> impl Iterator<Item = OpId> {
        self.arena.indices()
    }
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> {
        self.arena.indices()
    }
    pub fn refs(&self) -> impl Iterator<Item = RefId> {
        self.arena.indices()
    }
    pub fn redexes(&self) -> impl Iterator<Item = RedexId> {
        self.arena.indices()
    }
    pub fn interactions(&self) -> impl Iterator<Item = InteractionId> {
        self.arena.indices()
    }
    pub fn interaction_count(&self) -> usize {
        self.arena.len::<Interaction>()
    }

    /// The term the trace booted from: the first value stored by the boot ref.
    pub fn root_term(&self) -> Option<Term> {
        let root = self.refs().next()?;
        let first = *self.expand_ref(root).nodes.first()?;
        let store = *self.node(first).neg.history.first()?;
        self.op(store).memop.put
    }

    /// The node owning `location`: first the ref whose range contains it,
    /// then the node within that ref.
    pub fn resolve(&self, location: u32) -> Option<NodeId> {
        let (_, &id) = self.by_first_location.range(..=location).next_back()?;
        self.ref_node(id, location)
    }

    pub fn resolve_slot(&self, location: u32) -> Option<SlotRef> {
        let node = self.resolve(location)?;
        let side = self.node(node).side_of(location)?;
        Some(SlotRef { node, side })
    }

    /// The node within one specific ref holding `location`.
    pub fn ref_node(&self, id: RefId, location: u32) -> Option<NodeId> {
        let expand_ref = self.expand_ref(id);
        if !expand_ref.contains(location) {
            return None;
        }
        expand_ref
            .nodes
            .iter()
            .copied()
            .find(|&node| self.node(node).contains(location))
    }

    pub fn current_term(&self, location: u32) -> Option<Term> {
        self.resolve_slot(location).map(|at| self.slot(at).term)
    }

    fn node_role(&self, at: SlotRef) -> Option<&'static str> {
        let redex = self.node(at.node).redex?;
        Some(self.redex(redex).kind()?.role(at.side))
    }

    /// The slot's role for the interaction that gave its node context,
    /// followed by `<origin-role` when its value came from another slot.
    pub fn role(&self, at: SlotRef) -> String {
        let mut role = self.node_role(at).unwrap_or_default().to_owned();
        if let Some(origin_role) = self.slot(at).origin.and_then(|o| self.node_role(o)) {
            role = format!("{}<{}", role, origin_role);
        }
        role
    }

    /// All slots of a ref have been replayed to the end of their history.
    pub fn ref_done(&self, id: RefId) -> bool {
        self.expand_ref(id).nodes.iter().all(|&node| {
            let node = self.node(node);
            node.neg.memops_done() && node.pos.memops_done()
        })
    }

    /// Replays one write into a slot. Writing [`Term::EMPTY`] only marks the
    /// slot empty; any other term must be the next entry of its history.
    pub fn write(
        &mut self,
        at: SlotRef,
        term: Term,
        origin: Option<SlotRef>,
        cause: &MemOp,
    ) -> Result<(), TraceError> {
        if term.is_empty() {
            self.slot_mut(at).empty = true;
            return Ok(());
        }
        let slot = self.slot(at);
        let next = slot.progress_index + 1;
        let expected = slot
            .history
            .get(next)
            .and_then(|&op| self.op(op).memop.put);
        if expected != Some(term) {
            return Err(TraceError::ReplayMismatch {
                sequence: cause.sequence,
                location: slot.location,
                interaction: cause.interaction_name.clone(),
                expected,
                found: term,
            });
        }
        let slot = self.slot_mut(at);
        slot.progress_index = next;
        slot.term = term;
        slot.empty = false;
        slot.origin = origin;
        Ok(())
    }

    fn slot_mut(&mut self, at: SlotRef) -> &mut Slot {
        self.arena.get_mut(at.node).slot_mut(at.side)
    }

    pub(crate) fn alloc_op(&mut self, memop: MemOp) -> OpId {
        self.arena.alloc(Op {
            memop,
            node: None,
            interaction: None,
        })
    }

    pub(crate) fn alloc_interaction(
        &mut self,
        kind: InteractionKind,
        redex: Option<RedexId>,
    ) -> InteractionId {
        let idx = self.interaction_count();
        let id = self.arena.alloc(Interaction {
            idx,
            kind,
            redex,
            redexes: vec![],
            memops: vec![],
            expansion: None,
        });
        if let Some(redex) = redex {
            self.arena.get_mut(redex).popped_by = Some(id);
        }
        id
    }

    pub(crate) fn alloc_redex(&mut self, redex: Redex) -> RedexId {
        let pushed_by = redex.pushed_by;
        let id = self.arena.alloc(redex);
        if let Some(itr) = pushed_by {
            self.arena.get_mut(itr).redexes.push(id);
        }
        id
    }

    /// Creates a ref around its first node, formed from two co-located stores,
    /// and records it as the expansion of `interaction`.
    pub(crate) fn create_ref(
        &mut self,
        def_idx: u32,
        redex: Option<RedexId>,
        interaction: InteractionId,
        neg: OpId,
        pos: OpId,
    ) -> RefId {
        let first_location = self.op(neg).memop.location;
        let id = self.arena.alloc(ExpandRef {
            def_idx,
            nodes: vec![],
            redex,
            interaction,
            first_location,
            last_location: first_location,
        });
        self.by_first_location.insert(first_location, id);
        self.arena.get_mut(interaction).expansion = Some(id);
        self.push_node(id, neg, pos);
        id
    }

    pub(crate) fn push_node(&mut self, owner: RefId, neg: OpId, pos: OpId) -> NodeId {
        let slot = |graph: &Self, op: OpId| {
            let memop = &graph.op(op).memop;
            Slot::new(memop.location, memop.put.unwrap_or(Term::EMPTY), op)
        };
        let node = Node {
            neg: slot(&*self, neg),
            pos: slot(&*self, pos),
            owner,
            redex: None,
        };
        let last_location = node.pos.location;
        let interaction = self.expand_ref(owner).interaction;
        let id = self.arena.alloc(node);
        let expand_ref = self.arena.get_mut(owner);
        expand_ref.nodes.push(id);
        expand_ref.last_location = expand_ref.last_location.max(last_location);
        for op in [neg, pos] {
            let op = self.arena.get_mut(op);
            op.node = Some(id);
            op.interaction = Some(interaction);
        }
        id
    }

    /// Records a body operation against the node it touches. Only writes
    /// enter the slot's history.
    pub(crate) fn place(&mut self, op: OpId, node: NodeId, interaction: InteractionId) {
        let (location, writes) = {
            let memop = &self.op(op).memop;
            (memop.location, memop.put.is_some())
        };
        if writes {
            if let Some(side) = self.node(node).side_of(location) {
                self.arena.get_mut(node).slot_mut(side).history.push(op);
            }
        }
        let placed = self.arena.get_mut(op);
        placed.node = Some(node);
        placed.interaction = Some(interaction);
        self.arena.get_mut(interaction).memops.push(op);
    }

    pub(crate) fn set_node_redex(&mut self, node: NodeId, redex: RedexId) -> bool {
        let node = self.arena.get_mut(node);
        if node.redex.is_some() {
            return false;
        }
        node.redex = Some(redex);
        true
    }

    pub(crate) fn set_redex_slot(&mut self, redex: RedexId, side: Side, slot: SlotRef) {
        let redex = self.arena.get_mut(redex);
        match side {
            Side::Neg => redex.neg.slot = Some(slot),
            Side::Pos => redex.pos.slot = Some(slot),
        }
    }
}
