//! Graphs of invocable nodes and edges.
//!
//! A [`Graph`] holds nodes keyed by name and edges keyed by
//! `(source, target)` pairs. Unlike most dataflow graphs, the edges here are
//! not mere wiring: every edge carries its own invocable, executed between
//! the level of its source node and the level of its target node.
//!
//! ## The level-order walk
//!
//! [`LevelOrder`], the default strategy, runs a synchronized breadth-first
//! walk starting from the root key:
//!
//! 1. The node frontier starts as the root alone.
//! 2. Every node in the frontier is visited, then every edge leaving the
//!    frontier, then the distinct targets of those edges become the next
//!    frontier.
//! 3. The walk ends when a frontier has no outgoing edges; the last visit's
//!    result is the result of the run.
//!
//! Frontiers are sets. Iteration order within one level is not specified,
//! and a node reachable through paths of unequal length lands in more than
//! one frontier and is executed once per landing. Deduplication happens only
//! within a single level. Graphs are assumed acyclic; a cycle makes the walk
//! loop forever. The engine never validates the graph up front.
//!
//! [`Graph::traverse`] exposes the same walk as a lazy iterator of
//! [`Visit`]s without invoking anything, for dry runs and plan export.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use serde::Serialize;

use crate::context::Key;
use crate::{Context, Invoke, KeyflowError, Strategy, Value};

/// A set of named nodes, keyed edges between them, and a root to start from.
///
/// Nodes and edges are looked up only when the walk reaches them. An edge
/// pointing at a key with no node definition is accepted silently here and
/// fails as [`KeyflowError::UndefinedNode`] at execution time.
pub struct Graph {
    nodes: HashMap<Key, Arc<dyn Invoke>>,
    edges: HashMap<(Key, Key), Arc<dyn Invoke>>,
    root: Key,
    strategy: Arc<dyn Strategy<Graph>>,
}

impl Graph {
    pub fn new(root: impl Into<Key>) -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            root: root.into(),
            strategy: Arc::new(LevelOrder::new()),
        }
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn Strategy<Graph>>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn add_node(&mut self, key: impl Into<Key>, item: Arc<dyn Invoke>) -> &mut Self {
        self.nodes.insert(key.into(), item);
        self
    }

    pub fn add_edge(
        &mut self,
        source: impl Into<Key>,
        target: impl Into<Key>,
        item: Arc<dyn Invoke>,
    ) -> &mut Self {
        self.edges.insert((source.into(), target.into()), item);
        self
    }

    pub fn node(&self, key: &Key) -> Option<&dyn Invoke> {
        self.nodes.get(key).map(|item| item.as_ref())
    }

    pub fn edge(&self, source: &Key, target: &Key) -> Option<&dyn Invoke> {
        self.edges
            .get(&(source.clone(), target.clone()))
            .map(|item| item.as_ref())
    }

    pub fn root(&self) -> &Key {
        &self.root
    }

    /// Walk the graph without invoking anything.
    pub fn traverse(&self) -> Traverse<'_> {
        Traverse::new(self)
    }
}

impl Invoke for Graph {
    fn invoke(&self, context: &mut Context) -> Result<Option<Value>, KeyflowError> {
        self.strategy.run(self, context)
    }
}

/// One stop of the level-order walk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Visit {
    Node(Key),
    Edge(Key, Key),
}

/// Lazy iterator over the visits of the level-order walk.
///
/// Yields every node of the current frontier, then every edge leaving it,
/// then moves the frontier to the edge targets. Order within a level follows
/// hash-set iteration and is deliberately unspecified.
pub struct Traverse<'a> {
    adjacency: HashMap<&'a Key, HashSet<&'a Key>>,
    frontier: HashSet<&'a Key>,
    buffer: VecDeque<Visit>,
}

impl<'a> Traverse<'a> {
    fn new(graph: &'a Graph) -> Self {
        let mut adjacency: HashMap<&Key, HashSet<&Key>> = HashMap::new();
        for (source, target) in graph.edges.keys() {
            adjacency.entry(source).or_default().insert(target);
        }

        Self {
            adjacency,
            frontier: HashSet::from([&graph.root]),
            buffer: VecDeque::new(),
        }
    }

    /// Expand one level into the visit buffer and advance the frontier.
    fn advance(&mut self) {
        let mut edges = Vec::new();
        for &source in &self.frontier {
            self.buffer.push_back(Visit::Node(source.clone()));
            if let Some(targets) = self.adjacency.get(source) {
                edges.extend(targets.iter().map(|&target| (source, target)));
            }
        }

        let mut next = HashSet::new();
        for (source, target) in edges {
            self.buffer.push_back(Visit::Edge(source.clone(), target.clone()));
            next.insert(target);
        }
        self.frontier = next;
    }
}

impl Iterator for Traverse<'_> {
    type Item = Visit;

    fn next(&mut self) -> Option<Visit> {
        if self.buffer.is_empty() {
            self.advance();
        }
        self.buffer.pop_front()
    }
}

/// Callback invoked for every visit before it executes.
pub type Observer = Arc<dyn Fn(&Visit) + Send + Sync>;

/// The default graph strategy: execute the level-order walk.
///
/// Each visited node or edge is invoked against the shared context and the
/// last result produced is returned. An optional [`Observer`] sees every
/// visit before it runs, which is handy for watching long walks without
/// touching the strategy itself.
#[derive(Clone, Default)]
pub struct LevelOrder {
    observer: Option<Observer>,
}

impl LevelOrder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observer<F>(observer: F) -> Self
    where
        F: Fn(&Visit) + Send + Sync + 'static,
    {
        Self {
            observer: Some(Arc::new(observer)),
        }
    }
}

impl Strategy<Graph> for LevelOrder {
    fn run(&self, graph: &Graph, context: &mut Context) -> Result<Option<Value>, KeyflowError> {
        let mut last = None;
        for visit in graph.traverse() {
            tracing::debug!(visit = ?visit, "visiting");
            if let Some(observer) = &self.observer {
                observer(&visit);
            }

            let item = match &visit {
                Visit::Node(key) => graph
                    .node(key)
                    .ok_or_else(|| KeyflowError::UndefinedNode(key.clone()))?,
                Visit::Edge(source, target) => graph
                    .edge(source, target)
                    .ok_or_else(|| {
                        KeyflowError::UndefinedEdge(source.clone(), target.clone())
                    })?,
            };

            last = item.invoke(context)?;
        }
        Ok(last)
    }
}
