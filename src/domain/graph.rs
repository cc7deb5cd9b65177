//! The in-memory item collection and its link structure.
//!
//! The [`ItemGraph`] knows nothing about where the items came from. It owns
//! the items, keyed by id, and is the only thing mutated during a run (by
//! link postprocessing). [`LinkGraph`] is an immutable view over it used by
//! graph rules.

use std::collections::{BTreeMap, HashMap};

use petgraph::{
    graph::{DiGraph, NodeIndex},
    visit::EdgeRef,
};
use thiserror::Error;
use tracing::instrument;

use crate::domain::{Item, Metamodel};

/// The collection of items validated in one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemGraph {
    items: BTreeMap<String, Item>,
}

/// Error returned when inserting an item whose id is already taken.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("duplicate item id '{0}'")]
pub struct DuplicateItemError(pub String);

impl ItemGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from items.
    ///
    /// # Errors
    ///
    /// Returns an error if two items share an id.
    pub fn from_items(items: impl IntoIterator<Item = Item>) -> Result<Self, DuplicateItemError> {
        let mut graph = Self::new();
        for item in items {
            graph.insert(item)?;
        }
        Ok(graph)
    }

    /// Inserts a new item.
    ///
    /// # Errors
    ///
    /// Returns an error if an item with the same id already exists. Use
    /// [`ItemGraph::replace`] to overwrite an item deliberately.
    pub fn insert(&mut self, item: Item) -> Result<(), DuplicateItemError> {
        if self.items.contains_key(item.id()) {
            return Err(DuplicateItemError(item.id().to_string()));
        }
        self.items.insert(item.id().to_string(), item);
        Ok(())
    }

    /// Inserts an item, replacing any existing item with the same id.
    ///
    /// The new field values are visible immediately to anything reading the
    /// graph afterwards. Returns the replaced item, if any.
    pub fn replace(&mut self, item: Item) -> Option<Item> {
        self.items.insert(item.id().to_string(), item)
    }

    /// Removes an item by id.
    pub fn remove(&mut self, id: &str) -> Option<Item> {
        self.items.remove(id)
    }

    /// Looks up an item by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Item> {
        self.items.get(id)
    }

    /// Looks up an item by id for mutation.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Item> {
        self.items.get_mut(id)
    }

    /// Whether an item with this id exists.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    /// All items, including external ones, in id order.
    pub fn all(&self) -> impl Iterator<Item = &Item> + '_ {
        self.items.values()
    }

    /// Items that belong to the validated project, in id order.
    pub fn internal(&self) -> impl Iterator<Item = &Item> + '_ {
        self.items.values().filter(|item| !item.is_external())
    }

    /// The number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the graph has no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Converts every raw link field value into resolved target ids.
    ///
    /// Link fields are those known to the metamodel (see
    /// [`Metamodel::link_fields`]). Running this more than once is harmless.
    #[instrument(level = "debug", skip_all, fields(items = self.items.len()))]
    pub fn postprocess_links(&mut self, metamodel: &Metamodel) {
        let link_fields = metamodel.link_fields();
        for item in self.items.values_mut() {
            item.postprocess_links(link_fields.iter().copied());
        }
    }
}

impl FromIterator<Item> for ItemGraph {
    /// Collects items, later items replacing earlier ones with the same id.
    fn from_iter<T: IntoIterator<Item = Item>>(iter: T) -> Self {
        let mut graph = Self::new();
        for item in iter {
            graph.replace(item);
        }
        graph
    }
}

/// A directed view of the links between items.
///
/// Nodes are item ids (including ids that are linked to but not present in
/// the graph); edges point from source to target and carry the link field
/// name. Parallel edges for different fields are kept.
#[derive(Debug)]
pub struct LinkGraph<'a> {
    items: &'a ItemGraph,
    graph: DiGraph<&'a str, &'a str>,
    nodes: HashMap<&'a str, NodeIndex>,
}

impl<'a> LinkGraph<'a> {
    /// Builds the link view of a postprocessed item graph.
    #[must_use]
    pub fn new(items: &'a ItemGraph) -> Self {
        let mut graph = DiGraph::new();
        let mut nodes: HashMap<&'a str, NodeIndex> = HashMap::with_capacity(items.len());

        for item in items.all() {
            let source = *nodes
                .entry(item.id())
                .or_insert_with(|| graph.add_node(item.id()));
            for (field, targets) in item.link_fields() {
                for target in targets {
                    let target = target.as_str();
                    let target = *nodes
                        .entry(target)
                        .or_insert_with(|| graph.add_node(target));
                    graph.add_edge(source, target, field);
                }
            }
        }

        Self {
            items,
            graph,
            nodes,
        }
    }

    /// The underlying items.
    #[must_use]
    pub const fn items(&self) -> &'a ItemGraph {
        self.items
    }

    /// Outgoing links of an item as `(field, target id)` pairs.
    ///
    /// Pairs are returned in the order the links were declared on the item.
    pub fn outgoing(&self, id: &str) -> Vec<(&'a str, &'a str)> {
        self.edges(id, petgraph::Direction::Outgoing)
    }

    /// Incoming links of an item as `(field, source id)` pairs.
    pub fn incoming(&self, id: &str) -> Vec<(&'a str, &'a str)> {
        self.edges(id, petgraph::Direction::Incoming)
    }

    /// Ids that are linked to but do not exist in the graph.
    pub fn dangling(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.graph
            .node_weights()
            .copied()
            .filter(|id| !self.items.contains(id))
    }

    fn edges(&self, id: &str, direction: petgraph::Direction) -> Vec<(&'a str, &'a str)> {
        let Some(&node) = self.nodes.get(id) else {
            return Vec::new();
        };

        let mut edges: Vec<_> = self
            .graph
            .edges_directed(node, direction)
            .map(|edge| {
                let other = match direction {
                    petgraph::Direction::Outgoing => edge.target(),
                    petgraph::Direction::Incoming => edge.source(),
                };
                (edge.id(), *edge.weight(), self.graph[other])
            })
            .collect();

        // petgraph walks edges newest first
        edges.sort_by_key(|(edge, _, _)| *edge);
        edges
            .into_iter()
            .map(|(_, field, other)| (field, other))
            .collect()
    }
}
