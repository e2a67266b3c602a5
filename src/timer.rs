//! Hierarchical scoped timer
//!
//! The timer records a tree of tagged, timestamped nodes. Scopes are opened
//! with [`Timer::time`] and closed when the returned [`TimerScope`] is
//! dropped, so every exit path (including `?` and panics) releases them.
//! Scopes must close in stack order; closing anything but the active node
//! is a nesting bug and panics.
//!
//! The exported tree is the report wire format read by
//! [`crate::analysis::query`]:
//!
//! ```text
//! root
//!  └─ build_curves
//!      └─ anchor {value: 16}
//!          ├─ fit ─ epoch_train ─ epoch {value: 1} ─ epoch_test ─ metrics ─ val ─ accuracy {value}
//!          ├─ get_predictions ─ train | val | test
//!          └─ metrics ─ train | val | test ─ accuracy {value} | confusion_matrix {value} | ...
//! ```

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Identifier of a node inside one timer tree
pub type NodeId = usize;

/// One tagged node of the timer tree
#[derive(Debug, Clone, PartialEq)]
pub struct TimerNode {
    /// Node identifier, unique within its tree
    pub id: NodeId,
    /// Tag used by queries (`build_curves`, `anchor`, `metrics`, ...)
    pub tag: String,
    /// Free-form metadata; logged values live under `value`
    pub metadata: Map<String, Value>,
    /// When the scope opened
    pub timestamp_start: DateTime<Utc>,
    /// When the scope closed, `None` while open
    pub timestamp_end: Option<DateTime<Utc>>,
    /// Child node identifiers in creation order
    pub children: Vec<NodeId>,
}

#[derive(Debug)]
struct TimerTree {
    nodes: Vec<TimerNode>,
    stack: Vec<NodeId>,
}

impl TimerTree {
    fn push_child(&mut self, tag: &str, metadata: Map<String, Value>) -> NodeId {
        let id = self.nodes.len();
        let parent = self.active();
        self.nodes.push(TimerNode {
            id,
            tag: tag.to_string(),
            metadata,
            timestamp_start: Utc::now(),
            timestamp_end: None,
            children: Vec::new(),
        });
        self.nodes[parent].children.push(id);
        id
    }

    fn active(&self) -> NodeId {
        // the root is never popped
        self.stack.last().copied().unwrap_or(0)
    }

    fn simplified_stack(&self) -> Vec<String> {
        self.stack
            .iter()
            .map(|&id| format!("{}#{id}", self.nodes[id].tag))
            .collect()
    }

    fn node_json(&self, id: NodeId) -> Value {
        let node = &self.nodes[id];
        let children: Vec<Value> = node.children.iter().map(|&c| self.node_json(c)).collect();
        json!({
            "tag": node.tag,
            "metadata": node.metadata,
            "timestamp_start": node.timestamp_start,
            "timestamp_end": node.timestamp_end,
            "children": children,
        })
    }

    fn copy_subtree(&mut self, source: &Self, source_id: NodeId, parent: NodeId) {
        let src = &source.nodes[source_id];
        let id = self.nodes.len();
        self.nodes.push(TimerNode {
            id,
            tag: src.tag.clone(),
            metadata: src.metadata.clone(),
            timestamp_start: src.timestamp_start,
            timestamp_end: src.timestamp_end.or_else(|| Some(Utc::now())),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(id);
        for &child in &src.children {
            self.copy_subtree(source, child, id);
        }
    }
}

/// Shared handle to a timer tree
///
/// Cloning the handle shares the tree. The handle is `Send + Sync` so a
/// workflow can time its own phases on a fit worker thread.
#[derive(Debug, Clone)]
pub struct Timer {
    inner: Arc<Mutex<TimerTree>>,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Create a timer whose root is tagged `root`
    #[must_use]
    pub fn new() -> Self {
        Self::with_root("root", Map::new())
    }

    /// Create a timer with a custom root node
    #[must_use]
    pub fn with_root(tag: &str, metadata: Map<String, Value>) -> Self {
        let root = TimerNode {
            id: 0,
            tag: tag.to_string(),
            metadata,
            timestamp_start: Utc::now(),
            timestamp_end: None,
            children: Vec::new(),
        };
        Self {
            inner: Arc::new(Mutex::new(TimerTree {
                nodes: vec![root],
                stack: vec![0],
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TimerTree> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a scope under the active node
    ///
    /// `metadata` should be a JSON object (or `null`); other values are stored under `value`.
    pub fn time(&self, tag: &str, metadata: Value) -> TimerScope<'_> {
        let metadata = match metadata {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        let mut tree = self.lock();
        let id = tree.push_child(tag, metadata);
        tree.stack.push(id);
        TimerScope {
            timer: self,
            id,
            open: true,
        }
    }

    /// Record a closed leaf `{tag, metadata: {value}}` under the active node
    pub fn log(&self, tag: &str, value: Value) {
        let mut metadata = Map::new();
        metadata.insert("value".to_string(), value);
        let mut tree = self.lock();
        let id = tree.push_child(tag, metadata);
        let start = tree.nodes[id].timestamp_start;
        tree.nodes[id].timestamp_end = Some(start);
    }

    /// Identifier of the innermost open scope
    #[must_use]
    pub fn active_node_id(&self) -> NodeId {
        self.lock().active()
    }

    /// Identifier of the root node
    #[must_use]
    pub const fn root_id(&self) -> NodeId {
        0
    }

    /// Open scopes from the root outwards, as `tag#id`
    #[must_use]
    pub fn simplified_stack(&self) -> Vec<String> {
        self.lock().simplified_stack()
    }

    /// Copy of a node
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<TimerNode> {
        self.lock().nodes.get(id).cloned()
    }

    /// Export the whole tree as nested JSON
    #[must_use]
    pub fn as_json(&self) -> Value {
        self.lock().node_json(0)
    }

    /// Copy `other`'s whole tree (root included) under this timer's active node
    ///
    /// Scopes still open in `other` are closed at graft time.
    pub fn graft(&self, other: &Self) {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return;
        }
        let source = other.lock();
        let mut tree = self.lock();
        let parent = tree.active();
        tree.copy_subtree(&source, 0, parent);
    }

    /// Close the root node
    pub fn finish(&self) {
        let mut tree = self.lock();
        if tree.nodes[0].timestamp_end.is_none() {
            tree.nodes[0].timestamp_end = Some(Utc::now());
        }
    }

    fn stop(&self, id: NodeId) {
        let mut tree = self.lock();
        let active = tree.active();
        if active != id {
            let stack = tree.simplified_stack();
            drop(tree);
            panic!(
                "The timer stack has more elements than expected: closing node {id} while node {active} is active. \
                 You forgot to stop a started timer. Active timers: {stack:?}"
            );
        }
        tree.stack.pop();
        tree.nodes[id].timestamp_end = Some(Utc::now());
    }

    fn unwind_to(&self, id: NodeId) {
        let mut tree = self.lock();
        if let Some(pos) = tree.stack.iter().position(|&n| n == id) {
            let now = Utc::now();
            for n in tree.stack.split_off(pos) {
                tree.nodes[n].timestamp_end.get_or_insert(now);
            }
        }
    }
}

/// Guard of an open timer scope; closes the scope on drop
#[derive(Debug)]
#[must_use = "a timer scope closes as soon as it is dropped"]
pub struct TimerScope<'t> {
    timer: &'t Timer,
    id: NodeId,
    open: bool,
}

impl TimerScope<'_> {
    /// Identifier of the node this scope opened
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// Attach a metadata entry to this scope's node
    pub fn set_metadata(&self, key: &str, value: Value) {
        let mut tree = self.timer.lock();
        tree.nodes[self.id].metadata.insert(key.to_string(), value);
    }

    /// Close the scope explicitly
    pub fn close(mut self) {
        self.open = false;
        self.timer.stop(self.id);
    }
}

impl Drop for TimerScope<'_> {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        if std::thread::panicking() {
            // a second panic here would abort
            self.timer.unwind_to(self.id);
        } else {
            self.timer.stop(self.id);
        }
    }
}
