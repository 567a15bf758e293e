//! Component dependency resolution.
//!
//! Components reference each other by the scene names they publish: a
//! `rigParent` or `input` naming another component's output makes that
//! component a dependency. References that match no output are left to the
//! scene (pre-existing joints and the like) and add no edge.
//!
//! The build order is a depth-first post-order over the dependency graph,
//! started from root-type components and then from every component in
//! declaration order. Starting points are deterministic, so the same rig
//! always yields the same order.

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use rigsmith_types::error::ResolveError;
use rigsmith_types::rig::ComponentRecord;

use crate::registry::OutputProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

/// Dependency graph over the enabled components of a rig.
///
/// Edges run from dependency to dependent.
#[derive(Debug)]
pub struct DependencyGraph<'a> {
    graph: DiGraph<&'a str, ()>,
    records: Vec<&'a ComponentRecord>,
    by_name: HashMap<&'a str, NodeIndex>,
    roots: Vec<NodeIndex>,
}

impl<'a> DependencyGraph<'a> {
    pub fn build(records: &'a [ComponentRecord], provider: &dyn OutputProvider) -> Self {
        let enabled: Vec<&ComponentRecord> = records.iter().filter(|r| r.enabled).collect();

        let mut graph = DiGraph::<&str, ()>::new();
        let mut by_name = HashMap::new();
        for record in &enabled {
            let idx = graph.add_node(record.name.as_str());
            by_name.insert(record.name.as_str(), idx);
        }

        // Output name -> owning component. The first declaration wins.
        let mut owners: HashMap<String, NodeIndex> = HashMap::new();
        for record in &enabled {
            let idx = by_name[record.name.as_str()];
            for output in provider.outputs(record) {
                owners.entry(output).or_insert(idx);
            }
        }

        let mut roots = Vec::new();
        for record in &enabled {
            let to = by_name[record.name.as_str()];
            let mut has_dependency = false;
            for reference in record.references() {
                let Some(&from) = owners.get(reference) else {
                    continue;
                };
                if from == to || graph.contains_edge(from, to) {
                    continue;
                }
                graph.add_edge(from, to, ());
                has_dependency = true;
            }
            if !has_dependency && provider.is_root(record) {
                roots.push(to);
            }
        }

        tracing::debug!(
            components = enabled.len(),
            edges = graph.edge_count(),
            "built dependency graph"
        );

        Self {
            graph,
            records: enabled,
            by_name,
            roots,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Direct dependencies of `name`, in reference order.
    pub fn dependencies(&self, name: &str) -> Result<Vec<&'a str>, ResolveError> {
        let idx = self.index_of(name)?;
        Ok(self.deps_of(idx).into_iter().map(|d| self.graph[d]).collect())
    }

    /// Every enabled component, each after all of its dependencies.
    pub fn order(&self) -> Result<Vec<&'a ComponentRecord>, ResolveError> {
        let mut walk = Walk::new(self.graph.node_count());
        let starts = self
            .roots
            .iter()
            .copied()
            .chain(self.graph.node_indices());
        for start in starts {
            self.visit(start, &mut walk)?;
        }
        Ok(walk.order.into_iter().map(|idx| self.records[idx.index()]).collect())
    }

    /// `name` and everything it depends on, transitively, in build order.
    pub fn transitive_dependencies(&self, name: &str) -> Result<Vec<&'a ComponentRecord>, ResolveError> {
        let idx = self.index_of(name)?;
        let mut walk = Walk::new(self.graph.node_count());
        self.visit(idx, &mut walk)?;
        Ok(walk.order.into_iter().map(|idx| self.records[idx.index()]).collect())
    }

    /// Graphviz rendering of the graph.
    pub fn to_dot(&self) -> String {
        format!("{:?}", Dot::with_config(&self.graph, &[Config::EdgeNoLabel]))
    }

    fn index_of(&self, name: &str) -> Result<NodeIndex, ResolveError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| ResolveError::UnknownComponent(name.to_string()))
    }

    fn deps_of(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        // petgraph hands neighbors back most-recent edge first.
        let mut deps: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(idx, Direction::Incoming)
            .collect();
        deps.reverse();
        deps
    }

    fn visit(&self, idx: NodeIndex, walk: &mut Walk) -> Result<(), ResolveError> {
        match walk.marks[idx.index()] {
            Mark::Done => return Ok(()),
            Mark::Visiting => {
                let start = walk.stack.iter().position(|n| *n == idx).unwrap_or(0);
                let cycle = walk.stack[start..]
                    .iter()
                    .map(|n| self.graph[*n].to_string())
                    .collect();
                return Err(ResolveError::CyclicDependency { cycle });
            }
            Mark::Unvisited => {}
        }

        walk.marks[idx.index()] = Mark::Visiting;
        walk.stack.push(idx);
        for dep in self.deps_of(idx) {
            self.visit(dep, walk)?;
        }
        walk.stack.pop();
        walk.marks[idx.index()] = Mark::Done;
        walk.order.push(idx);
        Ok(())
    }
}

struct Walk {
    marks: Vec<Mark>,
    stack: Vec<NodeIndex>,
    order: Vec<NodeIndex>,
}

impl Walk {
    fn new(len: usize) -> Self {
        Self {
            marks: vec![Mark::Unvisited; len],
            stack: Vec::new(),
            order: Vec::with_capacity(len),
        }
    }
}

/// Build order for `records`: every enabled component after all of its
/// dependencies, or [`ResolveError::CyclicDependency`] naming the cycle.
pub fn resolve_order<'a>(
    records: &'a [ComponentRecord],
    provider: &dyn OutputProvider,
) -> Result<Vec<&'a ComponentRecord>, ResolveError> {
    DependencyGraph::build(records, provider).order()
}
