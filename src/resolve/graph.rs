//! Inheritance Graph
//!
//! Child -> parent edges over every observed extended data type. Used after
//! both corpus passes to find inheritance cycles and to export the hierarchy.

use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

use crate::model::RecordKey;

/// A node of the inheritance graph
#[derive(Debug, Clone)]
pub struct InheritanceNode {
    pub name: String,
    /// False for parents referenced but never observed
    pub observed: bool,
    pub has_relation: bool,
}

#[derive(Debug, Default)]
pub struct InheritanceGraph {
    graph: DiGraph<InheritanceNode, ()>,
    index: HashMap<RecordKey, NodeIndex>,
}

impl InheritanceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observed record and the edge to its parent
    pub fn add_record(&mut self, name: &str, parent: Option<&str>, has_relation: bool) {
        let idx = self.node(name);
        let node = &mut self.graph[idx];
        node.name = name.to_string();
        node.observed = true;
        node.has_relation = has_relation;

        if let Some(parent) = parent {
            let parent_idx = self.node(parent);
            self.graph.update_edge(idx, parent_idx, ());
        }
    }

    fn node(&mut self, name: &str) -> NodeIndex {
        let key = RecordKey::new(name);
        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }
        let idx = self.graph.add_node(InheritanceNode {
            name: name.to_string(),
            observed: false,
            has_relation: false,
        });
        self.index.insert(key, idx);
        idx
    }

    /// Every inheritance cycle, members sorted by name, cycles sorted by first member
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let mut cycles: Vec<Vec<String>> = kosaraju_scc(&self.graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1 || self.graph.find_edge(scc[0], scc[0]).is_some()
            })
            .map(|scc| {
                let mut members: Vec<String> =
                    scc.into_iter().map(|idx| self.graph[idx].name.clone()).collect();
                members.sort();
                members
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// Ancestor chain of `name`, nearest first, stopping at a repeat
    pub fn ancestors(&self, name: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let Some(&start) = self.index.get(&RecordKey::new(name)) else {
            return chain;
        };
        let mut seen = vec![start];
        let mut current = start;
        while let Some(parent) = self.graph.neighbors(current).next() {
            if seen.contains(&parent) {
                break;
            }
            chain.push(self.graph[parent].name.clone());
            seen.push(parent);
            current = parent;
        }
        chain
    }

    pub fn record_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Export as GraphViz DOT
    pub fn to_dot(&self) -> String {
        let mut output = String::new();

        output.push_str("digraph InheritanceGraph {\n");
        output.push_str("  rankdir=BT;\n");
        output.push_str("  node [shape=box, style=\"filled,rounded\", fontname=\"Helvetica\", fontsize=10];\n");
        output.push_str("  edge [color=\"#808080\"];\n");
        output.push('\n');

        let mut nodes: Vec<NodeIndex> = self.graph.node_indices().collect();
        nodes.sort_by(|a, b| self.graph[*a].name.cmp(&self.graph[*b].name));

        for idx in &nodes {
            let node = &self.graph[*idx];
            let color = if !node.observed {
                "#F44336"
            } else if node.has_relation {
                "#4CAF50"
            } else {
                "#9E9E9E"
            };
            output.push_str(&format!(
                "  \"{}\" [fillcolor=\"{}\"];\n",
                node.name, color
            ));
        }

        output.push('\n');
        for idx in &nodes {
            for parent in self.graph.neighbors(*idx) {
                output.push_str(&format!(
                    "  \"{}\" -> \"{}\";\n",
                    self.graph[*idx].name, self.graph[parent].name
                ));
            }
        }

        output.push_str("}\n");
        output
    }
}
