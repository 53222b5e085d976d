#![forbid(unsafe_code)]

//! Shared, cloneable access to one follower.
//!
//! Collaborators that need to force a scroll receive a [`FollowerHandle`]
//! instead of looking the behavior up globally. Event callbacks hold a
//! [`WeakFollowerHandle`] so the follower (which owns the host, which owns
//! the callbacks) does not keep itself alive.
//!
//! Everything runs on one thread. A trigger that arrives while another pass
//! is still running (a listener dispatching synchronously from inside a
//! pass) is skipped and counted rather than panicking on the `RefCell`.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::warn;

use crate::config::FollowConfig;
use crate::follower::{FollowStats, ScrollFollower, ScrollOutcome};
use crate::host::ScrollHost;
use crate::trigger::Trigger;

struct Shared<H: ScrollHost> {
    follower: RefCell<ScrollFollower<H>>,
    reentrant_skips: Cell<u64>,
}

/// Strong shared handle to a [`ScrollFollower`].
pub struct FollowerHandle<H: ScrollHost> {
    shared: Rc<Shared<H>>,
}

impl<H: ScrollHost> Clone for FollowerHandle<H> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<H: ScrollHost> FollowerHandle<H> {
    #[must_use]
    pub fn new(follower: ScrollFollower<H>) -> Self {
        Self {
            shared: Rc::new(Shared {
                follower: RefCell::new(follower),
                reentrant_skips: Cell::new(0),
            }),
        }
    }

    /// Build a pending follower and wrap it.
    #[must_use]
    pub fn from_parts(config: FollowConfig, host: H) -> Self {
        Self::new(ScrollFollower::new(config, host))
    }

    /// Run one pass. `None` when the follower is busy with another pass.
    pub fn trigger(&self, trigger: Trigger) -> Option<ScrollOutcome> {
        self.with_mut(|f| f.handle(trigger))
    }

    /// Explicit scroll-to-bottom.
    pub fn scroll_to_bottom(&self) -> Option<ScrollOutcome> {
        self.trigger(Trigger::External)
    }

    /// Run the document-ready pass and start watching.
    pub fn attach(&self) -> Option<ScrollOutcome> {
        self.with_mut(ScrollFollower::attach)
    }

    /// Route a body event by name. `None` when busy or the name is unknown.
    pub fn dispatch_event(&self, name: &str) -> Option<ScrollOutcome> {
        self.with_mut(|f| f.handle_event(name)).flatten()
    }

    /// Stop watching and ignore further triggers. Returns `false` when the
    /// follower was busy and nothing happened.
    pub fn detach(&self) -> bool {
        self.with_mut(ScrollFollower::detach).is_some()
    }

    /// Current counters, or `None` while a pass is running.
    #[must_use]
    pub fn stats(&self) -> Option<FollowStats> {
        self.with(ScrollFollower::stats)
    }

    /// Triggers dropped because a pass was already running.
    #[must_use]
    pub fn reentrant_skips(&self) -> u64 {
        self.shared.reentrant_skips.get()
    }

    /// Borrow the follower immutably. `None` while a pass is running.
    pub fn with<R>(&self, f: impl FnOnce(&ScrollFollower<H>) -> R) -> Option<R> {
        self.shared.follower.try_borrow().ok().map(|follower| f(&follower))
    }

    fn with_mut<R>(&self, f: impl FnOnce(&mut ScrollFollower<H>) -> R) -> Option<R> {
        match self.shared.follower.try_borrow_mut() {
            Ok(mut follower) => Some(f(&mut follower)),
            Err(_) => {
                let skips = self.shared.reentrant_skips.get() + 1;
                self.shared.reentrant_skips.set(skips);
                warn!(skips, "re-entrant follower trigger skipped");
                None
            }
        }
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakFollowerHandle<H> {
        WeakFollowerHandle {
            shared: Rc::downgrade(&self.shared),
        }
    }

    /// Whether two handles share a follower.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }
}

/// Non-owning handle for callbacks registered with the host.
pub struct WeakFollowerHandle<H: ScrollHost> {
    shared: Weak<Shared<H>>,
}

impl<H: ScrollHost> Clone for WeakFollowerHandle<H> {
    fn clone(&self) -> Self {
        Self {
            shared: Weak::clone(&self.shared),
        }
    }
}

impl<H: ScrollHost> WeakFollowerHandle<H> {
    #[must_use]
    pub fn upgrade(&self) -> Option<FollowerHandle<H>> {
        self.shared.upgrade().map(|shared| FollowerHandle { shared })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDocument;

    fn handle_with_rows(rows: usize) -> (MemoryDocument, FollowerHandle<MemoryDocument>) {
        let doc = MemoryDocument::new();
        let list = doc.create_scroll_container("chatlist", 200.0);
        doc.append_child(doc.body(), list);
        for _ in 0..rows {
            doc.append_child(list, doc.create_block(40.0));
        }
        let handle = FollowerHandle::from_parts(FollowConfig::default(), doc.clone());
        (doc, handle)
    }

    #[test]
    fn clones_share_one_follower() {
        let (_doc, handle) = handle_with_rows(10);
        let other = handle.clone();
        handle.attach();
        assert_eq!(
            other.scroll_to_bottom(),
            Some(ScrollOutcome::AlreadyPinned { offset: 200.0 })
        );
        assert!(handle.ptr_eq(&other));
        assert_eq!(handle.stats().map(|s| s.total_passes()), Some(2));
    }

    #[test]
    fn reentrant_trigger_is_skipped() {
        let (_doc, handle) = handle_with_rows(10);
        let inner = handle.clone();
        let nested = handle.with(|_| inner.scroll_to_bottom());
        assert_eq!(nested, Some(None));
        assert_eq!(handle.reentrant_skips(), 1);
    }

    #[test]
    fn stats_unavailable_during_pass() {
        let (_doc, handle) = handle_with_rows(1);
        let inner = handle.clone();
        let stats = handle.with_mut(|_| inner.stats());
        assert_eq!(stats, Some(None));
    }

    #[test]
    fn weak_handle_dies_with_last_strong() {
        let (_doc, handle) = handle_with_rows(1);
        let weak = handle.downgrade();
        assert!(weak.upgrade().is_some());
        drop(handle);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn dispatch_event_ignores_unknown_names() {
        let (_doc, handle) = handle_with_rows(10);
        handle.attach();
        assert_eq!(handle.dispatch_event("click"), None);
        assert_eq!(handle.reentrant_skips(), 0);
    }

    #[test]
    fn detach_reports_success() {
        let (doc, handle) = handle_with_rows(10);
        handle.attach();
        assert!(handle.detach());
        assert!(doc.watched().is_none());
        assert_eq!(handle.trigger(Trigger::Mutation), Some(ScrollOutcome::Detached));
    }
}
