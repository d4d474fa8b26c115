// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! DAG (Directed Acyclic Graph) of task dependencies
//!
//! Builds dependency graphs over task node ids, ensuring proper execution
//! order and detecting cycles. Shared by the builder, the compiler and the
//! scheduler.

use petgraph::algo::{has_path_connecting, tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::errors::DagflowError;

/// Dependency graph over task node ids
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    graph: DiGraph<String, ()>,
    id_to_index: HashMap<String, NodeIndex>,
}

impl TaskGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from node ids and `(producer, consumer)` edges.
    ///
    /// Edges whose endpoints are not among `nodes` are ignored.
    pub fn from_edges<'a>(
        nodes: impl IntoIterator<Item = &'a str>,
        edges: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let mut graph = Self::new();
        for id in nodes {
            graph.add_node(id);
        }
        for (from, to) in edges {
            graph.add_edge(from, to);
        }
        graph
    }

    /// Add a node; adding an existing id is a no-op
    pub fn add_node(&mut self, id: &str) {
        if !self.id_to_index.contains_key(id) {
            let index = self.graph.add_node(id.to_string());
            self.id_to_index.insert(id.to_string(), index);
        }
    }

    /// Add an edge; returns false if either endpoint is unknown
    pub fn add_edge(&mut self, from: &str, to: &str) -> bool {
        let (Some(&a), Some(&b)) = (self.id_to_index.get(from), self.id_to_index.get(to)) else {
            return false;
        };
        if !self.graph.contains_edge(a, b) {
            self.graph.add_edge(a, b, ());
        }
        true
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.id_to_index.contains_key(id)
    }

    /// Node ids in insertion order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.graph.node_indices().map(|i| self.graph[i].as_str())
    }

    /// `(producer, consumer)` pairs in insertion order
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.graph.edge_indices().filter_map(|e| {
            let (a, b) = self.graph.edge_endpoints(e)?;
            Some((self.graph[a].as_str(), self.graph[b].as_str()))
        })
    }

    /// Find one cycle, listing its node ids in edge order.
    ///
    /// The listing starts at the earliest-inserted node of the cycle.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let component = tarjan_scc(&self.graph).into_iter().find(|scc| {
            scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0])
        })?;
        let members: HashSet<NodeIndex> = component.iter().copied().collect();
        let start = *component.iter().min()?;

        if self.graph.contains_edge(start, start) {
            return Some(vec![self.graph[start].clone()]);
        }

        // BFS inside the component for the shortest path back to start
        let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            let mut successors: Vec<NodeIndex> = self
                .graph
                .neighbors_directed(node, Direction::Outgoing)
                .filter(|n| members.contains(n))
                .collect();
            successors.sort();
            for next in successors {
                if next == start {
                    let mut path = vec![node];
                    let mut cursor = node;
                    while let Some(&p) = parent.get(&cursor) {
                        path.push(p);
                        cursor = p;
                    }
                    path.reverse();
                    return Some(path.into_iter().map(|i| self.graph[i].clone()).collect());
                }
                if next != start && !parent.contains_key(&next) {
                    parent.insert(next, node);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    /// Validate that the graph is acyclic
    pub fn validate_acyclic(&self) -> Result<(), DagflowError> {
        match self.find_cycle() {
            Some(cycle) => Err(DagflowError::CyclicGraph { cycle }),
            None => Ok(()),
        }
    }

    /// Get topologically sorted node ids
    pub fn topological_order(&self) -> Result<Vec<String>, DagflowError> {
        toposort(&self.graph, None)
            .map(|nodes| nodes.into_iter().map(|n| self.graph[n].clone()).collect())
            .map_err(|_| DagflowError::CyclicGraph {
                cycle: self.find_cycle().unwrap_or_default(),
            })
    }

    /// Get dependencies for a node (nodes that must finish before it), sorted
    pub fn dependencies(&self, id: &str) -> Vec<String> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Get dependents for a node (nodes that consume it), sorted
    pub fn dependents(&self, id: &str) -> Vec<String> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: &str, direction: Direction) -> Vec<String> {
        let Some(&node) = self.id_to_index.get(id) else {
            return Vec::new();
        };
        let mut ids: Vec<String> = self
            .graph
            .neighbors_directed(node, direction)
            .map(|n| self.graph[n].clone())
            .collect();
        ids.sort();
        ids
    }

    /// Check if node A depends (directly or transitively) on node B
    pub fn depends_on(&self, a: &str, b: &str) -> bool {
        let (Some(&node_a), Some(&node_b)) = (self.id_to_index.get(a), self.id_to_index.get(b)) else {
            return false;
        };
        node_a != node_b && has_path_connecting(&self.graph, node_b, node_a, None)
    }

    /// Generate Mermaid diagram of the DAG
    pub fn to_mermaid(&self, label: impl Fn(&str) -> String) -> String {
        let mut out = String::from("graph TD\n");
        for id in self.ids() {
            out.push_str(&format!("    {}[\"{}\"]\n", mermaid_id(id), label(id)));
        }
        for (from, to) in self.edges() {
            out.push_str(&format!("    {} --> {}\n", mermaid_id(from), mermaid_id(to)));
        }
        out
    }

    /// Generate DOT diagram of the DAG
    pub fn to_dot(&self, label: impl Fn(&str) -> String) -> String {
        let mut out = String::from("digraph pipeline {\n");
        out.push_str("    rankdir=TB;\n");
        out.push_str("    node [shape=box, style=rounded];\n\n");

        for id in self.ids() {
            out.push_str(&format!("    \"{}\" [label=\"{}\"];\n", id, label(id)));
        }
        for (from, to) in self.edges() {
            out.push_str(&format!("    \"{}\" -> \"{}\";\n", from, to));
        }

        out.push_str("}\n");
        out
    }

    /// Generate text representation of execution order
    pub fn to_text(&self, label: impl Fn(&str) -> String) -> Result<String, DagflowError> {
        let order = self.topological_order()?;
        let mut out = String::new();

        for (i, id) in order.iter().enumerate() {
            out.push_str(&format!("{}. {}", i + 1, label(id)));

            let deps = self.dependencies(id);
            if !deps.is_empty() {
                out.push_str(&format!(" [depends: {}]", deps.join(", ")));
            }

            out.push('\n');
        }

        Ok(out)
    }
}

fn mermaid_id(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}
