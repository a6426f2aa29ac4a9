//! Build graph construction and structural validation

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, instrument};

use crate::error::{BuildError, Cycle, Result};
use crate::node::{Node, TargetId};

/// Result of a cycle search
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleCheck {
    /// No cycle exists in the searched nodes
    Acyclic,
    /// The first cycle found, in declaration order
    CycleFound(Cycle),
}

impl CycleCheck {
    /// Whether no cycle was found
    pub fn is_acyclic(&self) -> bool {
        matches!(self, Self::Acyclic)
    }

    /// Convert into a `Result`, failing with [`BuildError::CycleFound`]
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Acyclic => Ok(()),
            Self::CycleFound(cycle) => Err(BuildError::CycleFound(cycle)),
        }
    }
}

/// Immutable set of declared targets with precomputed adjacency.
///
/// Nodes keep their declaration order, which is used for every tie-break
/// (cycle reporting, ready-frontier ordering, planning output).
#[derive(Debug, Clone)]
pub struct Graph {
    /// All nodes in declaration order
    nodes: Vec<Node>,
    /// Position of each target in `nodes`, extra outputs included
    index: HashMap<TargetId, usize>,
    /// Dependencies of each node (declaration order)
    forward: Vec<Vec<usize>>,
    /// Dependents of each node (declaration order of the dependent)
    reverse: Vec<Vec<usize>>,
}

impl Graph {
    /// Build a graph from fully resolved declarations.
    ///
    /// Every dependency must name a declared node or one of its extra
    /// outputs, and is rewritten to the producing node's id. Repeated
    /// dependencies within one node collapse to their first occurrence.
    #[instrument(skip_all)]
    pub fn from_declarations<I>(declarations: I) -> Result<Self>
    where
        I: IntoIterator<Item = Node>,
    {
        let mut nodes: Vec<Node> = Vec::new();
        let mut index: HashMap<TargetId, usize> = HashMap::new();

        for node in declarations {
            let idx = nodes.len();
            for name in std::iter::once(&node.id).chain(&node.outputs) {
                if index.insert(name.clone(), idx).is_some() {
                    return Err(BuildError::DuplicateTarget(name.clone()));
                }
            }
            nodes.push(node);
        }

        let mut forward: Vec<Vec<usize>> = Vec::with_capacity(nodes.len());
        for node in &nodes {
            let mut seen = HashSet::new();
            let mut deps = Vec::with_capacity(node.dependencies.len());
            for dep in &node.dependencies {
                let dep_idx =
                    index
                        .get(dep)
                        .copied()
                        .ok_or_else(|| BuildError::UnresolvedDependency {
                            from: node.id.clone(),
                            missing: dep.clone(),
                        })?;
                if seen.insert(dep_idx) {
                    deps.push(dep_idx);
                }
            }
            forward.push(deps);
        }

        let ids: Vec<TargetId> = nodes.iter().map(|n| n.id.clone()).collect();
        for (node, deps) in nodes.iter_mut().zip(&forward) {
            node.dependencies = deps.iter().map(|&d| ids[d].clone()).collect();
        }

        let mut reverse: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        for (dependent, deps) in forward.iter().enumerate() {
            for &dep in deps {
                reverse[dep].push(dependent);
            }
        }

        info!(
            target_count = nodes.len(),
            edge_count = forward.iter().map(Vec::len).sum::<usize>(),
            "build graph constructed"
        );

        Ok(Self {
            nodes,
            index,
            forward,
            reverse,
        })
    }

    /// Look up a node
    pub fn get(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Check whether a target is declared
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// All nodes in declaration order
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Number of declared targets
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the graph is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Direct dependencies of a target (empty if unknown)
    pub fn dependencies_of<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a TargetId> + 'a {
        self.index
            .get(id)
            .into_iter()
            .flat_map(move |&i| self.forward[i].iter().map(move |&d| &self.nodes[d].id))
    }

    /// Direct dependents of a target (empty if unknown)
    pub fn dependents_of<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a TargetId> + 'a {
        self.index
            .get(id)
            .into_iter()
            .flat_map(move |&i| self.reverse[i].iter().map(move |&d| &self.nodes[d].id))
    }

    /// Sub-graph containing every declared node
    pub fn full(&self) -> SubGraph {
        SubGraph {
            members: vec![true; self.nodes.len()],
            count: self.nodes.len(),
        }
    }

    /// Nodes reachable from the requested targets through dependency edges,
    /// the targets themselves included.
    pub fn reachable_from(&self, targets: &[TargetId]) -> Result<SubGraph> {
        let mut members = vec![false; self.nodes.len()];
        let mut count = 0;
        let mut stack = Vec::new();

        for target in targets {
            let idx = self
                .index_of(target.as_str())
                .ok_or_else(|| BuildError::UnknownTarget(target.clone()))?;
            stack.push(idx);
        }

        while let Some(idx) = stack.pop() {
            if members[idx] {
                continue;
            }
            members[idx] = true;
            count += 1;
            stack.extend(self.forward[idx].iter().copied().filter(|&d| !members[d]));
        }

        debug!(requested = targets.len(), reachable = count, "computed reachable sub-graph");
        Ok(SubGraph { members, count })
    }

    /// Search the whole graph for a dependency cycle
    pub fn detect_cycles(&self) -> CycleCheck {
        self.detect_cycles_within(&self.full())
    }

    /// Search a sub-graph for a dependency cycle.
    ///
    /// Three-color depth-first search: roots and edges are visited in
    /// declaration order, and the reported cycle is the gray chain from the
    /// target of the first back-edge down to the node that closed it.
    pub fn detect_cycles_within(&self, within: &SubGraph) -> CycleCheck {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let mut color = vec![Color::White; self.nodes.len()];

        for root in within.indices() {
            if color[root] != Color::White {
                continue;
            }

            // (node, next dependency to visit)
            let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
            color[root] = Color::Gray;

            while let Some(frame) = stack.last_mut() {
                let (node, cursor) = *frame;
                let Some(&dep) = self.forward[node].get(cursor) else {
                    color[node] = Color::Black;
                    stack.pop();
                    continue;
                };
                frame.1 += 1;

                match color[dep] {
                    Color::White => {
                        color[dep] = Color::Gray;
                        stack.push((dep, 0));
                    }
                    Color::Gray => {
                        let start = stack.iter().position(|&(n, _)| n == dep).unwrap_or(0);
                        let mut chain: Vec<TargetId> = stack[start..]
                            .iter()
                            .map(|&(n, _)| self.nodes[n].id.clone())
                            .collect();
                        chain.push(self.nodes[dep].id.clone());
                        return CycleCheck::CycleFound(Cycle(chain));
                    }
                    Color::Black => {}
                }
            }
        }

        CycleCheck::Acyclic
    }

    /// Declaration index of a target, as used by [`Scheduler`](crate::Scheduler)
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Node at a declaration index
    pub fn node_at(&self, idx: usize) -> &Node {
        &self.nodes[idx]
    }

    pub(crate) fn dependency_indices(&self, idx: usize) -> &[usize] {
        &self.forward[idx]
    }

    pub(crate) fn dependent_indices(&self, idx: usize) -> &[usize] {
        &self.reverse[idx]
    }
}

/// A subset of a graph's nodes, closed under dependencies when produced by
/// [`Graph::reachable_from`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubGraph {
    members: Vec<bool>,
    count: usize,
}

impl SubGraph {
    /// Number of nodes in the sub-graph
    pub fn len(&self) -> usize {
        self.count
    }

    /// Check if the sub-graph is empty
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Check whether a target belongs to the sub-graph
    pub fn contains(&self, graph: &Graph, id: &str) -> bool {
        graph.index_of(id).is_some_and(|i| self.contains_index(i))
    }

    /// Member targets in declaration order
    pub fn targets<'g>(&'g self, graph: &'g Graph) -> impl Iterator<Item = &'g TargetId> + 'g {
        self.indices().map(move |i| &graph.node_at(i).id)
    }

    pub(crate) fn contains_index(&self, idx: usize) -> bool {
        self.members.get(idx).copied().unwrap_or(false)
    }

    pub(crate) fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.members
            .iter()
            .enumerate()
            .filter_map(|(i, &member)| member.then_some(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<TargetId> {
        list.iter().map(|s| TargetId::from(*s)).collect()
    }

    fn diamond() -> Graph {
        //     app
        //    /   \
        //  a.o   b.o
        //    \   /
        //    gen.h
        Graph::from_declarations(vec![
            Node::file("gen.h").with_action("gen"),
            Node::file("a.o").depends_on("gen.h").with_action("cc a"),
            Node::file("b.o").depends_on("gen.h").with_action("cc b"),
            Node::file("app")
                .depends_on("a.o")
                .depends_on("b.o")
                .with_action("link"),
        ])
        .unwrap()
    }

    #[test]
    fn test_build_graph() {
        let graph = diamond();
        assert_eq!(graph.len(), 4);
        assert!(graph.contains("app"));
        assert!(!graph.contains("missing"));
        assert!(graph.detect_cycles().is_acyclic());
    }

    #[test]
    fn test_duplicate_target() {
        let result = Graph::from_declarations(vec![Node::file("a"), Node::phony("a")]);
        assert_eq!(result.unwrap_err(), BuildError::DuplicateTarget("a".into()));
    }

    #[test]
    fn test_unresolved_dependency() {
        let result = Graph::from_declarations(vec![Node::file("app").depends_on("main.o")]);
        assert_eq!(
            result.unwrap_err(),
            BuildError::UnresolvedDependency {
                from: "app".into(),
                missing: "main.o".into(),
            }
        );
    }

    #[test]
    fn test_dependencies_and_dependents() {
        let graph = diamond();

        let deps: Vec<_> = graph.dependencies_of("app").cloned().collect();
        assert_eq!(deps, ids(&["a.o", "b.o"]));

        let dependents: Vec<_> = graph.dependents_of("gen.h").cloned().collect();
        assert_eq!(dependents, ids(&["a.o", "b.o"]));

        assert_eq!(graph.dependencies_of("unknown").count(), 0);
        assert_eq!(graph.dependents_of("app").count(), 0);
    }

    #[test]
    fn test_repeated_dependency_collapsed() {
        let graph = Graph::from_declarations(vec![
            Node::file("a"),
            Node::file("b").depends_on("a").depends_on("a"),
        ])
        .unwrap();

        assert_eq!(graph.get("b").unwrap().dependencies, ids(&["a"]));
        assert_eq!(graph.dependents_of("a").count(), 1);
    }

    #[test]
    fn test_extra_outputs_resolve_to_producer() {
        let graph = Graph::from_declarations(vec![
            Node::file("parser.c").produces("parser.h").with_action("bison"),
            Node::file("main.o")
                .depends_on("parser.h")
                .depends_on("parser.c")
                .with_action("cc"),
        ])
        .unwrap();

        assert_eq!(graph.len(), 2);
        assert!(graph.contains("parser.h"));
        assert_eq!(graph.get("parser.h").unwrap().id, TargetId::from("parser.c"));
        assert_eq!(graph.get("main.o").unwrap().dependencies, ids(&["parser.c"]));

        let dependents: Vec<_> = graph.dependents_of("parser.h").cloned().collect();
        assert_eq!(dependents, ids(&["main.o"]));

        let sub = graph.reachable_from(&ids(&["parser.h"])).unwrap();
        assert_eq!(sub.len(), 1);
    }

    #[test]
    fn test_output_colliding_with_target() {
        let result = Graph::from_declarations(vec![
            Node::file("a.h"),
            Node::file("a.c").produces("a.h"),
        ]);
        assert_eq!(result.unwrap_err(), BuildError::DuplicateTarget("a.h".into()));
    }

    #[test]
    fn test_cycle_detection() {
        let graph = Graph::from_declarations(vec![
            Node::file("a").depends_on("b"),
            Node::file("b").depends_on("c"),
            Node::file("c").depends_on("a"),
        ])
        .unwrap();

        match graph.detect_cycles() {
            CycleCheck::CycleFound(cycle) => {
                assert_eq!(cycle.0, ids(&["a", "b", "c", "a"]));
            }
            CycleCheck::Acyclic => panic!("expected a cycle"),
        }
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let graph = Graph::from_declarations(vec![Node::phony("loop").depends_on("loop")]).unwrap();
        assert_eq!(
            graph.detect_cycles(),
            CycleCheck::CycleFound(Cycle(ids(&["loop", "loop"])))
        );
    }

    #[test]
    fn test_first_cycle_in_declaration_order() {
        let graph = Graph::from_declarations(vec![
            Node::file("x").depends_on("y"),
            Node::file("y").depends_on("x"),
            Node::file("p").depends_on("q"),
            Node::file("q").depends_on("p"),
        ])
        .unwrap();

        let err = graph.detect_cycles().into_result().unwrap_err();
        assert_eq!(err, BuildError::CycleFound(Cycle(ids(&["x", "y", "x"]))));
    }

    #[test]
    fn test_cycle_reached_through_prefix() {
        // The chain leading into the cycle is not part of it
        let graph = Graph::from_declarations(vec![
            Node::file("top").depends_on("mid"),
            Node::file("mid").depends_on("low"),
            Node::file("low").depends_on("mid"),
        ])
        .unwrap();

        match graph.detect_cycles() {
            CycleCheck::CycleFound(cycle) => assert_eq!(cycle.0, ids(&["mid", "low", "mid"])),
            CycleCheck::Acyclic => panic!("expected a cycle"),
        }
    }

    #[test]
    fn test_reachable_from() {
        let graph = Graph::from_declarations(vec![
            Node::file("gen.h"),
            Node::file("a.o").depends_on("gen.h"),
            Node::file("unrelated"),
        ])
        .unwrap();

        let sub = graph.reachable_from(&ids(&["a.o"])).unwrap();
        assert_eq!(sub.len(), 2);
        assert!(sub.contains(&graph, "gen.h"));
        assert!(!sub.contains(&graph, "unrelated"));

        let members: Vec<_> = sub.targets(&graph).cloned().collect();
        assert_eq!(members, ids(&["gen.h", "a.o"]));
    }

    #[test]
    fn test_reachable_from_unknown_target() {
        let graph = diamond();
        let err = graph.reachable_from(&ids(&["nope"])).unwrap_err();
        assert_eq!(err, BuildError::UnknownTarget("nope".into()));
    }

    #[test]
    fn test_cycle_outside_subgraph_ignored() {
        let graph = Graph::from_declarations(vec![
            Node::file("ok"),
            Node::file("x").depends_on("y"),
            Node::file("y").depends_on("x"),
        ])
        .unwrap();

        let sub = graph.reachable_from(&ids(&["ok"])).unwrap();
        assert!(graph.detect_cycles_within(&sub).is_acyclic());
        assert!(!graph.detect_cycles().is_acyclic());
    }
}
