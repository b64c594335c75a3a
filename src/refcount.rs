use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::{InteractionSite, TraceError};
use crate::net::{Graph, InteractionId};
use crate::trace::{MemOp, OpKind, Term};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RefCount {
    pub count: i32,
    /// Once set, never cleared.
    pub free: bool,
}

/// Per-location reference counts, and the nodes found free so far.
///
/// Writes into a slot nobody references make its node a candidate;
/// candidates are examined at the next interaction boundary, and freeing a
/// node releases whatever its slots point at, transitively.
#[derive(Default)]
pub struct RefCounts {
    /// Only locations ever counted have an entry.
    table: IndexMap<u32, RefCount>,
    /// Slot locations written while unreferenced, with the op that wrote them.
    candidates: IndexMap<u32, u64>,
    booted: bool,
    /// The interaction whose ops are being counted.
    site: Option<InteractionSite>,
}

impl RefCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, location: u32) -> RefCount {
        self.table.get(&location).copied().unwrap_or_default()
    }

    pub fn count(&self, location: u32) -> i32 {
        self.get(location).count
    }

    pub fn is_free(&self, location: u32) -> bool {
        self.get(location).free
    }

    /// Combined count of the node holding `location`.
    pub fn pair_count(&self, location: u32) -> i32 {
        let neg = location & !1;
        self.count(neg) + self.count(neg + 1)
    }

    /// Every location counted so far, in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, RefCount)> + '_ {
        let mut locations: Vec<u32> = self.table.keys().copied().collect();
        locations.sort_unstable();
        locations
            .into_iter()
            .map(move |location| (location, self.get(location)))
    }

    fn entry(&mut self, location: u32) -> &mut RefCount {
        self.table.entry(location).or_default()
    }

    fn increment(&mut self, term: Term) -> bool {
        let Some(location) = term.located() else {
            return false;
        };
        self.entry(location).count += 1;
        true
    }

    fn decrement(&mut self, location: u32, sequence: Option<u64>) -> Result<(), TraceError> {
        let interaction = self.site;
        let entry = self.entry(location);
        if entry.count <= 0 {
            return Err(TraceError::RefcountUnderflow {
                location,
                sequence,
                interaction,
            });
        }
        entry.count -= 1;
        Ok(())
    }

    /// Pins the root term. The root is a bare REF, so its location field
    /// names a definition rather than a node; it is counted anyway.
    pub fn boot(&mut self, root: Term) -> Result<(), TraceError> {
        if self.booted {
            return Err(TraceError::AlreadyBooted);
        }
        self.entry(root.location).count += 1;
        self.booted = true;
        tracing::debug!("booted from {}", root);
        Ok(())
    }

    pub fn on_memop(&mut self, memop: &MemOp) -> Result<(), TraceError> {
        if let Some(put) = memop.put {
            let unreferenced = self.count(memop.location) == 0;
            let located = self.increment(put);
            if unreferenced && (located || memop.kind == OpKind::Exchange) {
                tracing::trace!("candidate {} after {}", memop.location, memop);
                self.candidates.insert(memop.location, memop.sequence);
            }
        }
        if let Some(location) = memop.got.and_then(|got| got.located()) {
            self.decrement(location, Some(memop.sequence))?;
        }
        Ok(())
    }

    /// Accounts for an interaction at its boundary: settles the candidates
    /// left by the previous one, consumes the popped redex, then counts the
    /// expansion's nodes and the pushed redexes.
    pub fn on_interaction(&mut self, graph: &Graph, id: InteractionId) -> Result<(), TraceError> {
        self.collect(graph)?;

        let interaction = graph.interaction(id);
        self.site = Some(InteractionSite {
            idx: interaction.idx,
            kind: interaction.kind,
        });
        if let Some(redex) = interaction.redex {
            let redex = graph.redex(redex);
            for term in [redex.neg.term, redex.pos.term] {
                if let Some(location) = term.located() {
                    self.decrement(location, Some(redex.sequence))?;
                }
            }
        }
        if let Some(expansion) = interaction.expansion {
            let expand_ref = graph.expand_ref(expansion);
            for &node in &expand_ref.nodes {
                let node = graph.node(node);
                for slot in [&node.neg, &node.pos] {
                    if let Some(&store) = slot.history().first() {
                        if let Some(term) = graph.op(store).memop.put {
                            self.increment(term);
                        }
                    }
                }
            }
        }
        for &redex in &interaction.redexes {
            let redex = graph.redex(redex);
            self.increment(redex.neg.term);
            self.increment(redex.pos.term);
        }
        Ok(())
    }

    /// Settles the candidates of the last interaction.
    pub fn finish(&mut self, graph: &Graph) -> Result<(), TraceError> {
        self.collect(graph)
    }

    /// Frees every candidate node left unreferenced, and whatever that
    /// releases. Each node on the worklist carries the write that made its
    /// chain a candidate.
    fn collect(&mut self, graph: &Graph) -> Result<(), TraceError> {
        let mut worklist: IndexMap<u32, u64> = IndexMap::new();
        for (location, sequence) in std::mem::take(&mut self.candidates) {
            tracing::trace!("examining {} (written by op #{})", location, sequence);
            let neg = location & !1;
            if self.pair_count(neg) == 0 {
                worklist.entry(neg).or_insert(sequence);
            }
        }

        let mut processed = HashSet::new();
        while let Some((neg, sequence)) = worklist.pop() {
            if !processed.insert(neg) {
                continue;
            }
            if self.is_free(neg) || self.is_free(neg + 1) {
                return Err(TraceError::DoubleFree {
                    location: neg,
                    sequence: Some(sequence),
                    interaction: self.site,
                });
            }
            tracing::debug!("freeing node {}", neg);
            for location in [neg, neg + 1] {
                self.entry(location).free = true;
                let Some(target) = graph.current_term(location).and_then(|t| t.located()) else {
                    continue;
                };
                self.decrement(target, Some(sequence))?;
                let target_neg = target & !1;
                if self.pair_count(target_neg) == 0 && !self.is_free(target_neg) {
                    worklist.entry(target_neg).or_insert(sequence);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{make_all, InteractionKind};
    use crate::trace::{decode, Decoder, Tag};

    const CHAIN: &str = "0,0,______,STOR,0,REF,0,0\n\
                         1,0,______,STOR,0,ERA,0,1\n\
                         2,0,______,STOR,0,VAR,4,2\n\
                         3,0,______,STOR,0,ERA,0,3\n\
                         4,0,______,STOR,0,VAR,6,4\n\
                         5,0,______,STOR,0,ERA,0,5\n\
                         6,0,______,STOR,0,ERA,0,6\n\
                         7,0,______,STOR,0,ERA,0,7\n\
                         8,0,______,STOR,0,SUB,0,8\n\
                         9,0,______,STOR,0,SUB,0,9\n\
                         10,0,______,STOR,0,SUB,0,10\n\
                         11,0,______,STOR,0,SUB,0,11\n";

    const APPLAM: &str = "12,0,______,STOR,0,APP,8,100000\n\
                          13,0,______,STOR,0,LAM,10,100001\n\
                          14,0,APPLAM,POP,0,APP,8,100000\n\
                          15,0,APPLAM,POP,0,LAM,10,100001\n";

    fn erase_at(location: u32) -> MemOp {
        Decoder::new()
            .decode_line(&format!("0,0,APPLAM,EXCH,0,ERA,0,ERA,0,{}", location), 1)
            .unwrap()
    }

    fn cascade(source: &str) -> (Graph, RefCounts) {
        let graph = make_all(decode(source).unwrap()).unwrap();
        let interactions: Vec<_> = graph.interactions().collect();
        let mut counts = RefCounts::new();
        counts.boot(graph.root_term().unwrap()).unwrap();
        counts.on_interaction(&graph, interactions[0]).unwrap();
        counts.on_memop(&erase_at(3)).unwrap();
        counts.on_interaction(&graph, interactions[1]).unwrap();
        (graph, counts)
    }

    #[test]
    fn boot_seeds_root_location() {
        let mut counts = RefCounts::new();
        counts.boot(Term::new(Tag::REF, 0, 4)).unwrap();
        assert_eq!(counts.count(4), 1);
        assert_eq!(counts.boot(Term::new(Tag::REF, 0, 4)), Err(TraceError::AlreadyBooted));
        assert_eq!(counts.count(4), 1);
    }

    #[test]
    fn free_cascades_through_chain() {
        let (_, counts) = cascade(&format!("{}{}", CHAIN, APPLAM));
        for location in 2..8 {
            assert!(counts.is_free(location), "{} should be free", location);
        }
        assert_eq!(counts.count(4), 0);
        assert_eq!(counts.count(6), 0);
        assert!(!counts.is_free(8));
        assert_eq!(counts.count(8), 0);
        assert_eq!(counts.pair_count(2), 0);
    }

    #[test]
    fn shared_target_survives() {
        let source = format!(
            "{}12,0,______,STOR,0,VAR,6,12\n13,0,______,STOR,0,ERA,0,13\n{}",
            CHAIN, APPLAM
        );
        let (_, counts) = cascade(&source);
        assert!(counts.is_free(2));
        assert!(counts.is_free(4));
        assert!(!counts.is_free(6));
        assert_eq!(counts.count(6), 1);
    }

    #[test]
    fn freeing_twice_is_fatal() {
        let (graph, mut counts) = cascade(&format!("{}{}", CHAIN, APPLAM));
        counts.on_memop(&erase_at(3)).unwrap();
        assert_eq!(
            counts.finish(&graph),
            Err(TraceError::DoubleFree {
                location: 2,
                sequence: Some(0),
                interaction: Some(InteractionSite {
                    idx: 1,
                    kind: InteractionKind::AppLam,
                }),
            })
        );
    }

    #[test]
    fn pinned_node_is_not_freed() {
        let (graph, mut counts) = cascade(&format!("{}{}", CHAIN, APPLAM));
        counts.on_memop(&erase_at(1)).unwrap();
        counts.finish(&graph).unwrap();
        assert!(!counts.is_free(0));
        assert_eq!(counts.pair_count(1), 1);
    }

    #[test]
    fn underflow_is_fatal() {
        let op = Decoder::new()
            .decode_line("5,0,APPLAM,EXCH,0,VAR,4,___,0,3", 1)
            .unwrap();
        let err = RefCounts::new().on_memop(&op).unwrap_err();
        assert_eq!(
            err,
            TraceError::RefcountUnderflow {
                location: 4,
                sequence: Some(0),
                interaction: None,
            }
        );
    }

    #[test]
    fn table_grows_on_demand() {
        let op = Decoder::new()
            .decode_line("0,0,APPLAM,STOR,0,LAM,900,3", 1)
            .unwrap();
        let mut counts = RefCounts::new();
        counts.on_memop(&op).unwrap();
        assert_eq!(counts.count(900), 1);
        assert_eq!(counts.count(100_000), 0);
        assert_eq!(counts.iter().map(|(location, _)| location).collect::<Vec<_>>(), [900]);
    }

    #[test]
    fn distant_root_stays_sparse() {
        let mut counts = RefCounts::new();
        counts.boot(Term::new(Tag::REF, 0, 50_000_000)).unwrap();
        assert_eq!(counts.iter().count(), 1);
        assert_eq!(counts.count(50_000_000), 1);
    }
}
