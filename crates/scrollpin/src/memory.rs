#![forbid(unsafe_code)]

//! In-process document for deterministic tests and non-browser hosts.
//!
//! [`MemoryDocument`] models just enough of the DOM for the follower: an
//! element tree with ids, block heights, scroll containers with a viewport,
//! a single child-list watch, and body event listeners. Mutation delivery is
//! host-driven: structural changes queue records, and
//! [`MemoryDocument::flush_mutations`] hands the batch to the registered
//! observer, the way a browser runs `MutationObserver` callbacks at a
//! microtask checkpoint.
//!
//! [`MemoryDocument::bind`] wires a [`FollowerHandle`] the same way the
//! browser binding does, so the whole trigger surface can be exercised
//! without a browser.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::trace;

use crate::handle::FollowerHandle;
use crate::host::{ScrollHost, ScrollMetrics, ScrollTarget};
use crate::trigger::Trigger;

/// Index of a node inside one [`MemoryDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(usize);

/// Kind of structural change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Added,
    Removed,
}

/// One queued child-list mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationRecord {
    /// Parent whose child list changed.
    pub target: NodeKey,
    /// The added or removed child.
    pub node: NodeKey,
    pub kind: MutationKind,
}

/// Identifies a body listener for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type ObserverFn = Box<dyn FnMut(&[MutationRecord])>;
type ListenerFn = Box<dyn FnMut()>;

#[derive(Debug, Default)]
struct Node {
    id: Option<String>,
    parent: Option<NodeKey>,
    children: Vec<NodeKey>,
    /// Intrinsic height of the node's own content.
    block_height: f64,
    /// `Some` for scroll containers: the fixed viewport height.
    viewport: Option<f64>,
    scroll_top: f64,
    scroll_writes: u32,
}

#[derive(Default)]
struct DocState {
    nodes: Vec<Node>,
    watch: Option<(NodeKey, bool)>,
    pending: Vec<MutationRecord>,
    observer: Option<ObserverFn>,
    listeners: HashMap<String, Vec<(ListenerId, ListenerFn)>>,
    /// Listeners taken out of the map while their event is dispatched.
    in_dispatch: Vec<ListenerId>,
    /// Listeners removed while in `in_dispatch`.
    cancelled: Vec<ListenerId>,
    next_listener: u64,
}

impl DocState {
    fn node(&self, key: NodeKey) -> &Node {
        &self.nodes[key.0]
    }

    fn node_mut(&mut self, key: NodeKey) -> &mut Node {
        &mut self.nodes[key.0]
    }

    fn is_connected(&self, key: NodeKey) -> bool {
        let mut cursor = Some(key);
        while let Some(k) = cursor {
            if k == MemoryDocument::BODY {
                return true;
            }
            cursor = self.node(k).parent;
        }
        false
    }

    fn is_inclusive_ancestor(&self, ancestor: NodeKey, mut key: NodeKey) -> bool {
        loop {
            if key == ancestor {
                return true;
            }
            match self.node(key).parent {
                Some(parent) => key = parent,
                None => return false,
            }
        }
    }

    /// Height the node occupies inside its parent.
    fn outer_height(&self, key: NodeKey) -> f64 {
        let node = self.node(key);
        node.viewport.unwrap_or_else(|| self.content_height(key))
    }

    fn content_height(&self, key: NodeKey) -> f64 {
        let node = self.node(key);
        node.block_height
            + node
                .children
                .iter()
                .map(|&c| self.outer_height(c))
                .sum::<f64>()
    }

    fn metrics(&self, key: NodeKey) -> ScrollMetrics {
        let node = self.node(key);
        let content = self.content_height(key);
        let client = node.viewport.unwrap_or(content);
        ScrollMetrics {
            scroll_top: node.scroll_top,
            scroll_height: content.max(client),
            client_height: client,
        }
    }

    fn queue_mutation(&mut self, record: MutationRecord) {
        let Some((watched, subtree)) = self.watch else {
            return;
        };
        let observed = if subtree {
            self.is_inclusive_ancestor(watched, record.target)
        } else {
            record.target == watched
        };
        if observed {
            self.pending.push(record);
        }
    }
}

/// Shared in-memory document. Clones refer to the same document.
#[derive(Clone)]
pub struct MemoryDocument {
    state: Rc<RefCell<DocState>>,
}

impl std::fmt::Debug for MemoryDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("MemoryDocument")
            .field("nodes", &state.nodes.len())
            .field("watch", &state.watch)
            .field("pending", &state.pending.len())
            .finish()
    }
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocument {
    const BODY: NodeKey = NodeKey(0);

    /// Empty document with only a body.
    #[must_use]
    pub fn new() -> Self {
        let state = DocState {
            nodes: vec![Node::default()],
            ..DocState::default()
        };
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    #[must_use]
    pub fn body(&self) -> NodeKey {
        Self::BODY
    }

    /// Create a detached plain element whose own content is `height` tall.
    #[must_use]
    pub fn create_block(&self, height: f64) -> NodeKey {
        self.push_node(Node {
            block_height: height.max(0.0),
            ..Node::default()
        })
    }

    /// Create a detached scroll container with the given id and viewport.
    #[must_use]
    pub fn create_scroll_container(&self, id: &str, viewport: f64) -> NodeKey {
        self.push_node(Node {
            id: Some(id.to_owned()),
            viewport: Some(viewport.max(0.0)),
            ..Node::default()
        })
    }

    fn push_node(&self, node: Node) -> NodeKey {
        let mut state = self.state.borrow_mut();
        state.nodes.push(node);
        NodeKey(state.nodes.len() - 1)
    }

    /// Set or clear an element id.
    pub fn set_id(&self, key: NodeKey, id: Option<&str>) {
        self.state.borrow_mut().node_mut(key).id = id.map(str::to_owned);
    }

    /// Change a node's intrinsic height (text growing inside a bubble).
    /// This is not a child-list mutation and queues nothing.
    pub fn set_block_height(&self, key: NodeKey, height: f64) {
        self.state.borrow_mut().node_mut(key).block_height = height.max(0.0);
    }

    /// Append `child` to `parent`, moving it out of any previous parent.
    ///
    /// # Panics
    ///
    /// Panics if `child` is an inclusive ancestor of `parent`.
    pub fn append_child(&self, parent: NodeKey, child: NodeKey) {
        let mut state = self.state.borrow_mut();
        assert!(
            !state.is_inclusive_ancestor(child, parent),
            "cannot append a node into its own subtree"
        );
        if let Some(old_parent) = state.node(child).parent {
            Self::detach_from(&mut state, old_parent, child);
        }
        state.node_mut(parent).children.push(child);
        state.node_mut(child).parent = Some(parent);
        state.queue_mutation(MutationRecord {
            target: parent,
            node: child,
            kind: MutationKind::Added,
        });
    }

    /// Remove `key` from its parent. No-op for parentless nodes.
    pub fn remove(&self, key: NodeKey) {
        let mut state = self.state.borrow_mut();
        if let Some(parent) = state.node(key).parent {
            Self::detach_from(&mut state, parent, key);
        }
    }

    fn detach_from(state: &mut DocState, parent: NodeKey, child: NodeKey) {
        // Queue before unlinking so subtree matching still sees the path.
        state.queue_mutation(MutationRecord {
            target: parent,
            node: child,
            kind: MutationKind::Removed,
        });
        state.node_mut(parent).children.retain(|&c| c != child);
        state.node_mut(child).parent = None;
    }

    /// First connected element with `id`, in document order.
    #[must_use]
    pub fn element_by_id(&self, id: &str) -> Option<NodeKey> {
        let state = self.state.borrow();
        let mut stack = vec![Self::BODY];
        while let Some(key) = stack.pop() {
            let node = state.node(key);
            if node.id.as_deref() == Some(id) {
                return Some(key);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        None
    }

    #[must_use]
    pub fn metrics(&self, key: NodeKey) -> ScrollMetrics {
        self.state.borrow().metrics(key)
    }

    /// How many times `scrollTop` was assigned on `key`.
    #[must_use]
    pub fn scroll_writes(&self, key: NodeKey) -> u32 {
        self.state.borrow().node(key).scroll_writes
    }

    /// Total `scrollTop` assignments across the document.
    #[must_use]
    pub fn total_scroll_writes(&self) -> u32 {
        self.state
            .borrow()
            .nodes
            .iter()
            .map(|n| n.scroll_writes)
            .sum()
    }

    /// Current watch target and subtree flag.
    #[must_use]
    pub fn watched(&self) -> Option<(NodeKey, bool)> {
        self.state.borrow().watch
    }

    #[must_use]
    pub fn pending_mutations(&self) -> usize {
        self.state.borrow().pending.len()
    }

    /// Install the observer callback that receives mutation batches.
    pub fn set_observer(&self, observer: impl FnMut(&[MutationRecord]) + 'static) {
        self.state.borrow_mut().observer = Some(Box::new(observer));
    }

    /// Deliver queued mutation records as one batch.
    ///
    /// Returns the number of records delivered. Records queued without an
    /// observer are dropped.
    pub fn flush_mutations(&self) -> usize {
        let (records, observer) = {
            let mut state = self.state.borrow_mut();
            let records = std::mem::take(&mut state.pending);
            if records.is_empty() {
                return 0;
            }
            (records, state.observer.take())
        };
        let Some(mut observer) = observer else {
            return 0;
        };
        trace!(records = records.len(), "delivering mutation batch");
        observer(&records);
        let mut state = self.state.borrow_mut();
        if state.observer.is_none() {
            state.observer = Some(observer);
        }
        records.len()
    }

    /// Register a listener for a body event.
    pub fn add_listener(&self, event: &str, listener: impl FnMut() + 'static) -> ListenerId {
        let mut state = self.state.borrow_mut();
        state.next_listener += 1;
        let id = ListenerId(state.next_listener);
        state
            .listeners
            .entry(event.to_owned())
            .or_default()
            .push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns whether it was registered.
    ///
    /// Removal from inside a running dispatch takes effect immediately: a
    /// removed listener that has not run yet is skipped.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut state = self.state.borrow_mut();
        let mut removed = false;
        for listeners in state.listeners.values_mut() {
            let before = listeners.len();
            listeners.retain(|(lid, _)| *lid != id);
            removed |= listeners.len() != before;
        }
        if !removed && state.in_dispatch.contains(&id) && !state.cancelled.contains(&id) {
            state.cancelled.push(id);
            removed = true;
        }
        removed
    }

    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.state
            .borrow()
            .listeners
            .get(event)
            .map_or(0, Vec::len)
    }

    /// Dispatch a body event. Returns the number of listeners invoked.
    pub fn dispatch(&self, event: &str) -> usize {
        let mut listeners = {
            let mut state = self.state.borrow_mut();
            let Some(listeners) = state.listeners.remove(event) else {
                return 0;
            };
            state.in_dispatch.extend(listeners.iter().map(|(id, _)| *id));
            listeners
        };
        let mut count = 0;
        for (id, listener) in &mut listeners {
            if self.state.borrow().cancelled.contains(id) {
                continue;
            }
            listener();
            count += 1;
        }
        let mut state = self.state.borrow_mut();
        let ours: Vec<ListenerId> = listeners.iter().map(|(id, _)| *id).collect();
        let cancelled = std::mem::take(&mut state.cancelled);
        let (dropped, still_cancelled): (Vec<_>, Vec<_>) =
            cancelled.into_iter().partition(|id| ours.contains(id));
        state.cancelled = still_cancelled;
        state.in_dispatch.retain(|id| !ours.contains(id));
        listeners.retain(|(id, _)| !dropped.contains(id));
        // Listeners added for this event during dispatch go after the originals.
        let added = state.listeners.remove(event).unwrap_or_default();
        listeners.extend(added);
        state.listeners.insert(event.to_owned(), listeners);
        count
    }

    /// Wire `handle` to this document the way the browser binding does:
    /// mutation batches and both configured body events each run a pass.
    ///
    /// Returns the listener ids so callers can unbind.
    pub fn bind(&self, handle: &FollowerHandle<Self>) -> Vec<ListenerId> {
        let weak = handle.downgrade();
        self.set_observer(move |_records| {
            if let Some(handle) = weak.upgrade() {
                handle.trigger(Trigger::Mutation);
            }
        });

        let names = handle
            .with(|f| {
                f.config()
                    .event_names()
                    .map(str::to_owned)
            })
            .unwrap_or_default();
        names
            .into_iter()
            .filter(|name| !name.is_empty())
            .map(|name| {
                let weak = handle.downgrade();
                let event = name.clone();
                self.add_listener(&name, move || {
                    if let Some(handle) = weak.upgrade() {
                        handle.dispatch_event(&event);
                    }
                })
            })
            .collect()
    }
}

/// A resolved element inside a [`MemoryDocument`].
#[derive(Clone)]
pub struct MemoryElement {
    doc: MemoryDocument,
    key: NodeKey,
}

impl MemoryElement {
    #[must_use]
    pub fn key(&self) -> NodeKey {
        self.key
    }
}

impl std::fmt::Debug for MemoryElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("MemoryElement").field(&self.key).finish()
    }
}

impl ScrollTarget for MemoryElement {
    fn metrics(&self) -> ScrollMetrics {
        self.doc.metrics(self.key)
    }

    fn set_scroll_top(&self, offset: f64) {
        let mut state = self.doc.state.borrow_mut();
        let max = state.metrics(self.key).max_offset();
        let node = state.node_mut(self.key);
        node.scroll_top = if offset.is_finite() {
            offset.clamp(0.0, max)
        } else {
            node.scroll_top
        };
        node.scroll_writes += 1;
    }

    fn is_connected(&self) -> bool {
        self.doc.state.borrow().is_connected(self.key)
    }

    fn same_node(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.doc.state, &other.doc.state) && self.key == other.key
    }
}

impl ScrollHost for MemoryDocument {
    type Target = MemoryElement;

    fn resolve(&self, id: &str) -> Option<MemoryElement> {
        self.element_by_id(id).map(|key| MemoryElement {
            doc: self.clone(),
            key,
        })
    }

    fn watch(&mut self, target: &MemoryElement, subtree: bool) {
        let mut state = self.state.borrow_mut();
        state.watch = Some((target.key, subtree));
        state.pending.clear();
    }

    fn unwatch(&mut self) {
        let mut state = self.state.borrow_mut();
        state.watch = None;
        state.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn scroll_height_sums_children() {
        let doc = MemoryDocument::new();
        let list = doc.create_scroll_container("log", 100.0);
        doc.append_child(doc.body(), list);
        let bubble = doc.create_block(20.0);
        doc.append_child(list, bubble);
        doc.append_child(bubble, doc.create_block(30.0));
        doc.append_child(list, doc.create_block(80.0));

        let m = doc.metrics(list);
        assert_eq!(m.scroll_height, 130.0);
        assert_eq!(m.client_height, 100.0);
        assert_eq!(m.max_offset(), 30.0);
    }

    #[test]
    fn scroll_height_never_below_viewport() {
        let doc = MemoryDocument::new();
        let list = doc.create_scroll_container("log", 100.0);
        assert_eq!(doc.metrics(list).scroll_height, 100.0);
    }

    #[test]
    fn element_by_id_requires_connection() {
        let doc = MemoryDocument::new();
        let list = doc.create_scroll_container("log", 100.0);
        assert_eq!(doc.element_by_id("log"), None);
        doc.append_child(doc.body(), list);
        assert_eq!(doc.element_by_id("log"), Some(list));
        doc.remove(list);
        assert_eq!(doc.element_by_id("log"), None);
    }

    #[test]
    fn set_scroll_top_clamps() {
        let doc = MemoryDocument::new();
        let list = doc.create_scroll_container("log", 100.0);
        doc.append_child(doc.body(), list);
        doc.append_child(list, doc.create_block(250.0));
        let el = doc.resolve("log").expect("connected");
        el.set_scroll_top(10_000.0);
        assert_eq!(el.metrics().scroll_top, 150.0);
        el.set_scroll_top(-5.0);
        assert_eq!(el.metrics().scroll_top, 0.0);
        el.set_scroll_top(f64::NAN);
        assert_eq!(el.metrics().scroll_top, 0.0);
        assert_eq!(doc.scroll_writes(list), 3);
    }

    #[test]
    fn subtree_watch_sees_nested_mutations() {
        let mut doc = MemoryDocument::new();
        let list = doc.create_scroll_container("log", 100.0);
        doc.append_child(doc.body(), list);
        let bubble = doc.create_block(10.0);
        doc.append_child(list, bubble);
        let el = doc.resolve("log").expect("connected");

        doc.watch(&el, false);
        doc.append_child(bubble, doc.create_block(5.0));
        assert_eq!(doc.pending_mutations(), 0);

        doc.watch(&el, true);
        doc.append_child(bubble, doc.create_block(5.0));
        assert_eq!(doc.pending_mutations(), 1);
    }

    #[test]
    fn mutations_outside_watch_are_not_queued() {
        let mut doc = MemoryDocument::new();
        let list = doc.create_scroll_container("log", 100.0);
        doc.append_child(doc.body(), list);
        let el = doc.resolve("log").expect("connected");
        doc.watch(&el, true);
        doc.append_child(doc.body(), doc.create_block(5.0));
        assert_eq!(doc.pending_mutations(), 0);
    }

    #[test]
    fn flush_delivers_one_batch() {
        let mut doc = MemoryDocument::new();
        let list = doc.create_scroll_container("log", 100.0);
        doc.append_child(doc.body(), list);
        let el = doc.resolve("log").expect("connected");
        doc.watch(&el, true);

        let batches = Rc::new(Cell::new(0));
        let seen = Rc::clone(&batches);
        doc.set_observer(move |records| {
            assert_eq!(records.len(), 2);
            seen.set(seen.get() + 1);
        });
        doc.append_child(list, doc.create_block(5.0));
        doc.append_child(list, doc.create_block(5.0));
        assert_eq!(doc.flush_mutations(), 2);
        assert_eq!(doc.flush_mutations(), 0);
        assert_eq!(batches.get(), 1);
    }

    #[test]
    fn removal_queues_record_against_parent() {
        let mut doc = MemoryDocument::new();
        let list = doc.create_scroll_container("log", 100.0);
        doc.append_child(doc.body(), list);
        let row = doc.create_block(5.0);
        doc.append_child(list, row);
        let el = doc.resolve("log").expect("connected");
        doc.watch(&el, true);

        let records = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&records);
        doc.set_observer(move |batch| sink.borrow_mut().extend_from_slice(batch));
        doc.remove(row);
        doc.flush_mutations();
        assert_eq!(
            records.borrow().as_slice(),
            &[MutationRecord {
                target: list,
                node: row,
                kind: MutationKind::Removed,
            }]
        );
    }

    #[test]
    fn listeners_dispatch_and_remove() {
        let doc = MemoryDocument::new();
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let id = doc.add_listener("ping", move || counter.set(counter.get() + 1));
        assert_eq!(doc.dispatch("ping"), 1);
        assert_eq!(doc.dispatch("pong"), 0);
        assert!(doc.remove_listener(id));
        assert!(!doc.remove_listener(id));
        assert_eq!(doc.dispatch("ping"), 0);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn listener_removed_during_dispatch_stays_removed() {
        let doc = MemoryDocument::new();
        let hits = Rc::new(Cell::new(0));
        let later_id: Rc<Cell<Option<ListenerId>>> = Rc::new(Cell::new(None));

        let remover_doc = doc.clone();
        let target = Rc::clone(&later_id);
        let own_id: Rc<Cell<Option<ListenerId>>> = Rc::new(Cell::new(None));
        let own = Rc::clone(&own_id);
        let first = doc.add_listener("ping", move || {
            // Remove the later listener and then ourselves.
            if let Some(id) = target.get() {
                assert!(remover_doc.remove_listener(id));
                assert!(!remover_doc.remove_listener(id));
            }
            if let Some(id) = own.get() {
                assert!(remover_doc.remove_listener(id));
            }
        });
        own_id.set(Some(first));
        let counter = Rc::clone(&hits);
        later_id.set(Some(
            doc.add_listener("ping", move || counter.set(counter.get() + 1)),
        ));

        assert_eq!(doc.dispatch("ping"), 1);
        assert_eq!(hits.get(), 0);
        assert_eq!(doc.listener_count("ping"), 0);
        assert_eq!(doc.dispatch("ping"), 0);
    }

    #[test]
    fn resolved_element_reports_its_key() {
        let doc = MemoryDocument::new();
        let list = doc.create_scroll_container("log", 100.0);
        doc.append_child(doc.body(), list);
        assert_eq!(doc.resolve("log").map(|el| el.key()), Some(list));
    }

    #[test]
    fn set_id_moves_lookup() {
        let doc = MemoryDocument::new();
        let first = doc.create_scroll_container("log", 100.0);
        let second = doc.create_scroll_container("other", 100.0);
        doc.append_child(doc.body(), first);
        doc.append_child(doc.body(), second);
        doc.set_id(first, None);
        doc.set_id(second, Some("log"));
        assert_eq!(doc.element_by_id("log"), Some(second));
        assert_eq!(doc.element_by_id("other"), None);
    }

    #[test]
    #[should_panic(expected = "own subtree")]
    fn append_into_own_subtree_panics() {
        let doc = MemoryDocument::new();
        let outer = doc.create_block(1.0);
        let inner = doc.create_block(1.0);
        doc.append_child(outer, inner);
        doc.append_child(inner, outer);
    }
}
