use indexmap::IndexMap;

use super::graph::{Graph, InteractionId, OpId, Redex, RedexId, RedexTerm, Side, SlotRef};
use crate::error::TraceError;
use crate::trace::Term;

/// Pairs each pop of the redex stack with the push that put it there.
///
/// Pushed redexes wait in `pending`, keyed by their term pair, until a pop
/// of the same pair claims them. A pair with no located term (an eraser
/// against a bare reference, say) can never be told apart from another
/// one, so it is only counted.
#[derive(Default)]
pub struct RedexMatcher {
    pending: IndexMap<(Term, Term), Vec<RedexId>>,
    untracked: usize,
}

impl RedexMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    pub fn untracked(&self) -> usize {
        self.untracked
    }

    /// Records the redex formed by two co-located redex-stack stores.
    pub fn push(
        &mut self,
        graph: &mut Graph,
        neg_op: OpId,
        pos_op: OpId,
        interaction: Option<InteractionId>,
    ) -> Result<RedexId, TraceError> {
        let neg = &graph.op(neg_op).memop;
        let pos = &graph.op(pos_op).memop;
        if neg.location.checked_add(1) != Some(pos.location)
            || neg.interaction_name != pos.interaction_name
        {
            return Err(TraceError::MalformedTrace {
                line: pos.line,
                reason: format!(
                    "push halves at {} and {} do not form a redex",
                    neg.location, pos.location
                ),
            });
        }
        let (Some(neg_term), Some(pos_term)) = (neg.put, pos.put) else {
            return Err(TraceError::MalformedTrace {
                line: neg.line,
                reason: "push without a stored term".into(),
            });
        };
        let redex = Redex {
            sequence: neg.sequence,
            location: neg.location,
            neg: RedexTerm {
                term: neg_term,
                slot: None,
            },
            pos: RedexTerm {
                term: pos_term,
                slot: None,
            },
            pushed_by: interaction,
            popped_by: None,
        };
        let tracked = redex.is_tracked();
        let id = graph.alloc_redex(redex);

        if tracked {
            self.pending
                .entry((neg_term, pos_term))
                .or_default()
                .push(id);
        } else {
            self.untracked += 1;
        }
        tracing::trace!("push {} ~ {} as redex {:?}", neg_term, pos_term, id);

        if let Some(interaction) = interaction {
            link_nodes(graph, id, interaction);
        }
        Ok(id)
    }

    /// Claims the redex matching two redex-stack pops. Returns `None` for a
    /// pair that was never tracked.
    pub fn pop(
        &mut self,
        graph: &Graph,
        neg_op: OpId,
        pos_op: OpId,
    ) -> Result<Option<RedexId>, TraceError> {
        let neg = &graph.op(neg_op).memop;
        let pos = &graph.op(pos_op).memop;
        let (Some(neg_term), Some(pos_term)) = (neg.got, pos.got) else {
            return Err(TraceError::MalformedTrace {
                line: neg.line,
                reason: "pop without a loaded term".into(),
            });
        };
        if neg_term.located().is_none() && pos_term.located().is_none() {
            return Ok(None);
        }
        let unmatched = || TraceError::UnmatchedPop {
            line: neg.line,
            sequence: neg.sequence,
            location: neg.location,
            interaction: neg.interaction_name.clone(),
            neg: neg_term,
            pos: pos_term,
        };
        let key = (neg_term, pos_term);
        let waiting = self.pending.get_mut(&key).ok_or_else(unmatched)?;
        let id = waiting.remove(0);
        if waiting.is_empty() {
            self.pending.shift_remove(&key);
        }
        tracing::trace!("pop {} ~ {} as redex {:?}", neg_term, pos_term, id);
        Ok(Some(id))
    }
}

/// Links the redex's located terms to the nodes they point at, when those
/// nodes belong to the ref the pushing interaction expanded.
fn link_nodes(graph: &mut Graph, redex: RedexId, interaction: InteractionId) {
    let Some(expansion) = graph.interaction(interaction).expansion else {
        return;
    };
    let terms = {
        let redex = graph.redex(redex);
        [(Side::Neg, redex.neg.term), (Side::Pos, redex.pos.term)]
    };
    for (side, term) in terms {
        let Some(location) = term.located() else {
            continue;
        };
        let Some(node) = graph.ref_node(expansion, location) else {
            continue;
        };
        let Some(slot_side) = graph.node(node).side_of(location) else {
            continue;
        };
        graph.set_redex_slot(redex, side, SlotRef { node, side: slot_side });
        if !graph.set_node_redex(node, redex) {
            tracing::debug!(
                "node at {} already has a redex; keeping the first",
                graph.node(node).location()
            );
        }
    }
}
