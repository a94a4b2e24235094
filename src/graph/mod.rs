// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 checkflow contributors

//! Resource type dependency graph
//!
//! A pipeline's custom resource types form a graph: each type points at its
//! parent type, which is either another declared type or a base type
//! provided by the workers. This module builds that graph once per
//! resolution and walks ancestor chains with a visited-set guard, so
//! self-referencing and mutually-referencing declarations terminate.

mod merge;

pub use merge::{effective_source, VersionedResourceType, VersionedResourceTypes};

use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

use crate::config::{ResourceTypeDecl, Source};

/// Anything that can take part in a type chain
pub trait DeclaredType {
    /// Name other declarations refer to this type by
    fn name(&self) -> &str;

    /// Name of the parent type
    fn type_name(&self) -> &str;

    /// Source fragment inherited by dependents
    fn defaults(&self) -> &Source;
}

impl DeclaredType for ResourceTypeDecl {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn defaults(&self) -> &Source {
        &self.defaults
    }
}

/// Parent-pointer graph over one pipeline's declared types
pub struct TypeGraph<'a, T> {
    types: &'a [T],
    graph: DiGraph<usize, ()>,
    name_to_index: HashMap<&'a str, NodeIndex>,
    duplicates: Vec<&'a str>,
}

impl<'a, T: DeclaredType> TypeGraph<'a, T> {
    /// Build the graph for a set of declarations from a single pipeline
    pub fn build(types: &'a [T]) -> Self {
        let mut graph = DiGraph::new();
        let mut name_to_index = HashMap::new();
        let mut duplicates = Vec::new();

        // First declaration of a name wins
        for (idx, declared) in types.iter().enumerate() {
            if name_to_index.contains_key(declared.name()) {
                tracing::warn!(
                    resource_type = declared.name(),
                    "duplicate resource type declaration ignored"
                );
                duplicates.push(declared.name());
                continue;
            }
            let node = graph.add_node(idx);
            name_to_index.insert(declared.name(), node);
        }

        // Edge child -> parent. A type naming itself as parent gets no edge:
        // it is a base type.
        let nodes: Vec<NodeIndex> = graph.node_indices().collect();
        for node in nodes {
            let declared = &types[graph[node]];
            if declared.type_name() == declared.name() {
                continue;
            }
            if let Some(&parent) = name_to_index.get(declared.type_name()) {
                graph.add_edge(node, parent, ());
            }
        }

        Self {
            types,
            graph,
            name_to_index,
            duplicates,
        }
    }

    /// Look up a declared type by name
    pub fn get(&self, name: &str) -> Option<&'a T> {
        self.name_to_index
            .get(name)
            .map(|node| &self.types[self.graph[*node]])
    }

    /// Names declared more than once; only their first declaration is used
    pub fn duplicates(&self) -> &[&'a str] {
        &self.duplicates
    }

    /// Ancestor chain for a resource of type `type_name`.
    ///
    /// Index 0 is the declared type named `type_name`; the chain is empty
    /// when `type_name` is a base type.
    pub fn chain_for_resource(&self, type_name: &str) -> Vec<&'a T> {
        let start = self.name_to_index.get(type_name).copied();
        self.walk(start, HashSet::new())
    }

    /// Ancestor chain for the declared type `name` whose parent is `type_name`.
    ///
    /// The type itself is never part of its own chain.
    pub fn chain_for_type(&self, name: &str, type_name: &str) -> Vec<&'a T> {
        if name == type_name {
            return Vec::new();
        }

        match self.name_to_index.get(name) {
            Some(&node) => {
                let parent = self.parent(node);
                self.walk(parent, HashSet::from([node]))
            }
            None => self.chain_for_resource(type_name),
        }
    }

    /// Groups of declared types that refer to each other in a loop
    pub fn cycles(&self) -> Vec<Vec<String>> {
        kosaraju_scc(&self.graph)
            .into_iter()
            .filter(|component| component.len() > 1)
            .map(|component| {
                let mut names: Vec<String> = component
                    .into_iter()
                    .map(|node| self.types[self.graph[node]].name().to_string())
                    .collect();
                names.sort();
                names
            })
            .collect()
    }

    fn parent(&self, node: NodeIndex) -> Option<NodeIndex> {
        self.graph
            .neighbors_directed(node, Direction::Outgoing)
            .next()
    }

    fn walk(&self, start: Option<NodeIndex>, mut visited: HashSet<NodeIndex>) -> Vec<&'a T> {
        let mut chain = Vec::new();
        let mut current = start;

        while let Some(node) = current {
            if !visited.insert(node) {
                tracing::debug!(
                    resource_type = self.types[self.graph[node]].name(),
                    "type chain loops back, treating as base"
                );
                break;
            }
            chain.push(&self.types[self.graph[node]]);
            current = self.parent(node);
        }

        chain
    }
}

/// The base type a chain bottoms out at.
///
/// With an empty chain the entity's own type is the base.
pub fn base_type<'a, T: DeclaredType>(chain: &[&'a T], own_type: &'a str) -> &'a str {
    chain.last().map(|t| t.type_name()).unwrap_or(own_type)
}
