use std::fmt::{self, Display};

use super::graph::{ref_name, Graph, InteractionId, NodeId, OpId, RedexId, RefId, Side, SlotRef};
use crate::refcount::RefCounts;

pub struct Shower<'a> {
    pub graph: &'a Graph,
    /// When present, slots also show their count and free status.
    pub refcounts: Option<&'a RefCounts>,
}

impl<'a> Shower<'a> {
    pub fn from_graph(graph: &'a Graph) -> Self {
        Self {
            graph,
            refcounts: None,
        }
    }

    pub fn with_refcounts(self, refcounts: &'a RefCounts) -> Self {
        Self {
            refcounts: Some(refcounts),
            ..self
        }
    }
}

pub struct Showable<'a, 'b, P>(pub P, pub &'b Shower<'a>);

impl Display for Showable<'_, '_, OpId> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let memop = &self.1.graph.op(self.0).memop;
        write!(f, "#{:<5} {}", memop.sequence, memop)
    }
}

impl Display for Showable<'_, '_, RedexId> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redex = self.1.graph.redex(self.0);
        write!(f, "{} ~ {}", redex.neg.term, redex.pos.term)?;
        if !redex.is_tracked() {
            write!(f, " (untracked)")?;
        }
        Ok(())
    }
}

impl Display for Showable<'_, '_, SlotRef> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let graph = self.1.graph;
        let slot = graph.slot(self.0);
        write!(
            f,
            "{:>4}: {} [{}/{}]",
            slot.location(),
            slot.term(),
            slot.progress_index() + 1,
            slot.history().len()
        )?;
        if slot.is_empty() {
            write!(f, " empty")?;
        }
        let role = graph.role(self.0);
        if !role.is_empty() {
            write!(f, " {}", role)?;
        }
        if let Some(refcounts) = self.1.refcounts {
            let refcount = refcounts.get(slot.location());
            write!(f, " rc={}", refcount.count)?;
            if refcount.free {
                write!(f, " free")?;
            }
        }
        Ok(())
    }
}

impl Display for Showable<'_, '_, NodeId> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for side in [Side::Neg, Side::Pos] {
            let at = SlotRef {
                node: self.0,
                side,
            };
            writeln!(f, "    {}", Showable(at, self.1))?;
        }
        Ok(())
    }
}

impl Display for Showable<'_, '_, RefId> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let expand_ref = self.1.graph.expand_ref(self.0);
        writeln!(
            f,
            "{} @{}..={} ({} nodes)",
            ref_name(expand_ref.def_idx),
            expand_ref.first_location(),
            expand_ref.last_location(),
            expand_ref.nodes.len()
        )?;
        for &node in &expand_ref.nodes {
            write!(f, "{}", Showable(node, self.1))?;
        }
        Ok(())
    }
}

impl Display for Showable<'_, '_, InteractionId> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let graph = self.1.graph;
        let interaction = graph.interaction(self.0);
        write!(f, "#{} {}", interaction.idx, interaction.kind)?;
        if interaction.is_boot() {
            write!(f, " (boot)")?;
        }
        if let Some(expansion) = interaction.expansion {
            write!(f, " -> {}", ref_name(graph.expand_ref(expansion).def_idx))?;
        }
        writeln!(f)?;
        if let Some(redex) = interaction.redex {
            writeln!(f, "  POP  {}", Showable(redex, self.1))?;
        }
        for &op in &interaction.memops {
            writeln!(f, "  {}", Showable(op, self.1))?;
        }
        for &redex in &interaction.redexes {
            writeln!(f, "  PUSH {}", Showable(redex, self.1))?;
        }
        Ok(())
    }
}
