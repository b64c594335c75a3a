use indexmap::IndexMap;

use super::graph::Graph;
use super::kind::InteractionKind;
use super::redex::RedexMatcher;

#[derive(Default, Clone)]
pub struct Stats {
    pub memops: usize,
    pub refs: usize,
    pub nodes: usize,
    pub redexes: usize,
    pub untracked: usize,
    pub pending: usize,
    pub interactions: IndexMap<InteractionKind, usize>,
}

impl Stats {
    pub fn collect(graph: &Graph, matcher: &RedexMatcher) -> Self {
        let mut interactions: IndexMap<_, _> =
            InteractionKind::ALL.into_iter().map(|kind| (kind, 0)).collect();
        for id in graph.interactions() {
            *interactions.entry(graph.interaction(id).kind).or_default() += 1;
        }
        Self {
            memops: graph.ops().count(),
            refs: graph.refs().count(),
            nodes: graph.nodes().count(),
            redexes: graph.redexes().count(),
            untracked: matcher.untracked(),
            pending: matcher.pending(),
            interactions,
        }
    }

    fn total(&self) -> usize {
        self.interactions.values().sum()
    }

    pub fn show(&self) -> String {
        let mut kinds = String::new();
        for (kind, count) in &self.interactions {
            kinds += &format!("\t\t{}: {}\n", kind, count);
        }
        format!(
            "\
            \tMemory operations: {}\n\
            \tRefs: {}\n\
            \tNodes: {}\n\
            \tRedexes: {} ({} untracked, {} never popped)\n\
            \tInteractions: {}\n\
            {}",
            self.memops,
            self.refs,
            self.nodes,
            self.redexes,
            self.untracked,
            self.pending,
            self.total(),
            kinds,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::Reconstructor;
    use crate::trace::decode;

    #[test]
    fn counts_fixture() {
        let source = include_str!("../../tests/traces/appref_applam.trace");
        let mut reconstructor = Reconstructor::new(decode(source).unwrap());
        reconstructor.run().unwrap();
        let stats = Stats::collect(reconstructor.graph(), reconstructor.matcher());
        assert_eq!(stats.memops, 18);
        assert_eq!(stats.refs, 2);
        assert_eq!(stats.nodes, 3);
        assert_eq!(stats.redexes, 2);
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.interactions[&InteractionKind::AppRef], 2);
        assert_eq!(stats.interactions[&InteractionKind::AppLam], 1);
        assert_eq!(stats.interactions[&InteractionKind::DupU32], 0);
        assert!(stats.show().contains("\tInteractions: 3\n"));
    }
}
