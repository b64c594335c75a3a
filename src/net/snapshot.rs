use serde::Serialize;

use super::graph::{ref_name, Graph, RedexId, Side, SlotRef};
use super::kind::InteractionKind;
use crate::refcount::{RefCount, RefCounts};
use crate::trace::Term;

/// A read-only copy of the reconstructed model, for consumers outside
/// this process.
#[derive(Serialize)]
pub struct Snapshot {
    pub refs: Vec<RefView>,
    pub interactions: Vec<InteractionView>,
}

#[derive(Serialize)]
pub struct RefView {
    pub name: String,
    pub def_idx: u32,
    pub first_location: u32,
    pub last_location: u32,
    pub nodes: Vec<[SlotView; 2]>,
}

#[derive(Serialize)]
pub struct SlotView {
    pub location: u32,
    pub term: Term,
    pub history: usize,
    pub progress_index: usize,
    pub empty: bool,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refcount: Option<RefCount>,
}

#[derive(Serialize)]
pub struct RedexView {
    pub location: u32,
    pub neg: Term,
    pub pos: Term,
}

#[derive(Serialize)]
pub struct InteractionView {
    pub idx: usize,
    pub kind: InteractionKind,
    pub redex: Option<RedexView>,
    pub pushed: Vec<RedexView>,
    pub expansion: Option<String>,
    pub memops: Vec<String>,
}

impl Snapshot {
    pub fn new(graph: &Graph, refcounts: Option<&RefCounts>) -> Self {
        let slot = |at: SlotRef| {
            let slot = graph.slot(at);
            SlotView {
                location: slot.location(),
                term: slot.term(),
                history: slot.history().len(),
                progress_index: slot.progress_index(),
                empty: slot.is_empty(),
                role: graph.role(at),
                refcount: refcounts.map(|counts| counts.get(slot.location())),
            }
        };
        let redex = |id: RedexId| {
            let redex = graph.redex(id);
            RedexView {
                location: redex.location,
                neg: redex.neg.term,
                pos: redex.pos.term,
            }
        };

        let refs = graph
            .refs()
            .map(|id| {
                let expand_ref = graph.expand_ref(id);
                RefView {
                    name: ref_name(expand_ref.def_idx),
                    def_idx: expand_ref.def_idx,
                    first_location: expand_ref.first_location(),
                    last_location: expand_ref.last_location(),
                    nodes: expand_ref
                        .nodes
                        .iter()
                        .map(|&node| {
                            [Side::Neg, Side::Pos].map(|side| slot(SlotRef { node, side }))
                        })
                        .collect(),
                }
            })
            .collect();

        let interactions = graph
            .interactions()
            .map(|id| {
                let interaction = graph.interaction(id);
                InteractionView {
                    idx: interaction.idx,
                    kind: interaction.kind,
                    redex: interaction.redex.map(redex),
                    pushed: interaction.redexes.iter().copied().map(redex).collect(),
                    expansion: interaction
                        .expansion
                        .map(|id| ref_name(graph.expand_ref(id).def_idx)),
                    memops: interaction
                        .memops
                        .iter()
                        .map(|&op| graph.op(op).memop.to_string())
                        .collect(),
                }
            })
            .collect();

        Self { refs, interactions }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
