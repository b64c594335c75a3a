use crate::error::TraceError;
use crate::net::{Graph, InteractionId, OpId, SlotRef};
use crate::refcount::RefCounts;
use crate::trace::{OpKind, Term};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Moving on to the next interaction. Its reference counts have been
    /// settled by the time this is returned.
    Enter(InteractionId),
    /// The next body operation of the current interaction. Hand it back
    /// to [`Replay::execute`] once it has been shown.
    Op(OpId),
}

/// Walks a reconstructed graph one interaction and one operation at a time,
/// keeping slot contents and reference counts in step with what a consumer
/// has replayed.
pub struct Replay {
    graph: Graph,
    refcounts: RefCounts,
    order: Vec<InteractionId>,
    next_interaction: usize,
    next_op: usize,
    current: Option<InteractionId>,
    /// Slots emptied by takes in the current interaction, with the term taken.
    taken: Vec<(Term, SlotRef)>,
    finished: bool,
}

impl Replay {
    pub fn new(graph: Graph) -> Result<Self, TraceError> {
        let mut refcounts = RefCounts::new();
        if let Some(root) = graph.root_term() {
            refcounts.boot(root)?;
        }
        let order = graph.interactions().collect();
        Ok(Self {
            graph,
            refcounts,
            order,
            next_interaction: 0,
            next_op: 0,
            current: None,
            taken: vec![],
            finished: false,
        })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn refcounts(&self) -> &RefCounts {
        &self.refcounts
    }

    pub fn current(&self) -> Option<InteractionId> {
        self.current
    }

    pub fn next_step(&mut self) -> Result<Option<Step>, TraceError> {
        if let Some(current) = self.current {
            if let Some(&op) = self.graph.interaction(current).memops.get(self.next_op) {
                self.next_op += 1;
                return Ok(Some(Step::Op(op)));
            }
        }
        if let Some(&id) = self.order.get(self.next_interaction) {
            self.next_interaction += 1;
            self.next_op = 0;
            self.current = Some(id);
            self.taken.clear();
            self.refcounts.on_interaction(&self.graph, id)?;
            return Ok(Some(Step::Enter(id)));
        }
        if !self.finished {
            self.finished = true;
            self.refcounts.finish(&self.graph)?;
        }
        Ok(None)
    }

    /// Applies one body operation to its slot: a take leaves TAKEN behind,
    /// a swap empties the slot before writing the value it moved in.
    pub fn execute(&mut self, op: OpId) -> Result<(), TraceError> {
        let placed = self.graph.op(op);
        let memop = placed.memop.clone();
        let at = placed.node.and_then(|node| {
            let side = self.graph.node(node).side_of(memop.location)?;
            Some(SlotRef { node, side })
        });

        if let (Some(at), Some(put)) = (at, memop.put) {
            if memop.is_take() {
                self.graph.write(at, put, None, &memop)?;
                if let Some(got) = memop.got {
                    self.taken.push((got, at));
                }
            } else if memop.is_swap() {
                let origin = self.origin_of(put);
                self.graph.write(at, Term::EMPTY, None, &memop)?;
                self.graph.write(at, put, origin, &memop)?;
            } else if memop.kind == OpKind::Store {
                self.graph.write(at, put, None, &memop)?;
            }
        } else if memop.put.is_some() {
            return Err(TraceError::UnresolvedLocation {
                line: memop.line,
                sequence: memop.sequence,
                location: memop.location,
                interaction: memop.interaction_name.clone(),
            });
        }

        self.refcounts.on_memop(&memop)
    }

    /// Where a swapped-in value came from: the latest slot it was taken
    /// from in this interaction, else the consumed redex's side holding it.
    fn origin_of(&self, term: Term) -> Option<SlotRef> {
        if let Some(&(_, at)) = self.taken.iter().rev().find(|(taken, _)| *taken == term) {
            return Some(at);
        }
        let redex = self.graph.interaction(self.current?).redex?;
        self.graph.redex(redex).term_slot(term)?.slot
    }

    /// Replays everything that is left.
    pub fn run_to_end(&mut self) -> Result<(), TraceError> {
        while let Some(step) = self.next_step()? {
            if let Step::Op(op) = step {
                self.execute(op)?;
            }
        }
        Ok(())
    }
}
