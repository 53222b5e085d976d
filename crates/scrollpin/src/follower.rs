#![forbid(unsafe_code)]

//! The scroll follower: pin a container to its bottom edge on every trigger.
//!
//! # Design
//!
//! - Each pass re-resolves the container through the [`ScrollHost`]; a
//!   missing container is a silent no-op ([`ScrollOutcome::Missing`]).
//! - Each pass also reconciles the structural watch: start it when the
//!   container first shows up, move it when the container was replaced or
//!   disconnected (a *rebind*), and stop it when the container is gone (a
//!   *teardown*).
//! - Passes are not coalesced. Two triggers in the same turn both re-read the
//!   geometry; the second one reports [`ScrollOutcome::AlreadyPinned`].
//!
//! Lifecycle: a follower starts `Pending` (explicit calls still scroll, but
//! nothing is watched), becomes `Attached` on [`ScrollFollower::attach`], and
//! ignores every trigger once [`ScrollFollower::detach`] ran.

use tracing::{debug, trace};

use crate::config::FollowConfig;
use crate::host::{ScrollHost, ScrollTarget};
use crate::trigger::Trigger;

/// Result of one follower pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollOutcome {
    /// The offset moved; `offset` is the value read back after assignment.
    Pinned { offset: f64 },
    /// The container was already at its maximum offset.
    AlreadyPinned { offset: f64 },
    /// No element with the configured id exists.
    Missing,
    /// The follower was detached; nothing was touched.
    Detached,
}

impl ScrollOutcome {
    /// Offset after the pass, when a container was found.
    #[must_use]
    pub const fn offset(&self) -> Option<f64> {
        match *self {
            Self::Pinned { offset } | Self::AlreadyPinned { offset } => Some(offset),
            Self::Missing | Self::Detached => None,
        }
    }

    /// Whether the pass assigned a new offset.
    #[must_use]
    pub const fn moved(&self) -> bool {
        matches!(self, Self::Pinned { .. })
    }
}

/// Counters over the lifetime of one follower.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FollowStats {
    triggers: [u64; Trigger::ALL.len()],
    /// Passes that moved the offset.
    pub pinned: u64,
    /// Passes that found the container already at the bottom.
    pub already_pinned: u64,
    /// Passes that found no container.
    pub missing: u64,
    /// Triggers dropped because the follower was detached.
    pub ignored: u64,
    /// Structural watch moved to a replacement container.
    pub rebinds: u64,
    /// Structural watch stopped because the container disappeared.
    pub teardowns: u64,
}

impl FollowStats {
    /// Number of passes caused by `trigger`, ignored ones excluded.
    #[must_use]
    pub const fn triggered(&self, trigger: Trigger) -> u64 {
        self.triggers[trigger.index()]
    }

    /// Total passes run, ignored ones excluded.
    #[must_use]
    pub fn total_passes(&self) -> u64 {
        self.triggers.iter().sum()
    }

    fn record(&mut self, trigger: Trigger, outcome: ScrollOutcome) {
        self.triggers[trigger.index()] += 1;
        match outcome {
            ScrollOutcome::Pinned { .. } => self.pinned += 1,
            ScrollOutcome::AlreadyPinned { .. } => self.already_pinned += 1,
            ScrollOutcome::Missing => self.missing += 1,
            ScrollOutcome::Detached => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Pending,
    Attached,
    Detached,
}

/// Keeps one scroll container pinned to its bottom edge.
pub struct ScrollFollower<H: ScrollHost> {
    config: FollowConfig,
    host: H,
    watched: Option<H::Target>,
    lifecycle: Lifecycle,
    stats: FollowStats,
}

impl<H: ScrollHost> ScrollFollower<H> {
    /// Create a pending follower. Call [`attach`](Self::attach) once the
    /// document is ready.
    pub fn new(config: FollowConfig, host: H) -> Self {
        Self {
            config,
            host,
            watched: None,
            lifecycle: Lifecycle::Pending,
            stats: FollowStats::default(),
        }
    }

    /// Run the document-ready pass and start watching the container.
    ///
    /// Calling this again on an attached follower just runs another
    /// [`Trigger::Ready`] pass. A detached follower cannot be re-attached.
    pub fn attach(&mut self) -> ScrollOutcome {
        if self.lifecycle == Lifecycle::Pending {
            self.lifecycle = Lifecycle::Attached;
            debug!(container = %self.config.container_id, "scroll follower attached");
        }
        self.handle(Trigger::Ready)
    }

    /// Pin the container to its bottom edge. The zero-argument entry point
    /// behind handles and the global callable.
    pub fn scroll_to_bottom(&mut self) -> ScrollOutcome {
        self.handle(Trigger::External)
    }

    /// Run one pass for a body event. Unknown event names are ignored and
    /// return `None`.
    pub fn handle_event(&mut self, name: &str) -> Option<ScrollOutcome> {
        let trigger = Trigger::from_event_name(&self.config, name)?;
        Some(self.handle(trigger))
    }

    /// Run one pass.
    pub fn handle(&mut self, trigger: Trigger) -> ScrollOutcome {
        if self.lifecycle == Lifecycle::Detached {
            self.stats.ignored += 1;
            trace!(%trigger, "trigger ignored after detach");
            return ScrollOutcome::Detached;
        }

        let target = self.host.resolve(&self.config.container_id);
        if self.lifecycle == Lifecycle::Attached {
            self.reconcile_watch(target.as_ref());
        }

        let outcome = match target {
            Some(target) => pin_to_bottom(&target),
            None => ScrollOutcome::Missing,
        };
        self.stats.record(trigger, outcome);
        trace!(%trigger, ?outcome, "follower pass");
        outcome
    }

    /// Stop watching and ignore all further triggers.
    pub fn detach(&mut self) {
        if self.lifecycle == Lifecycle::Detached {
            return;
        }
        if self.watched.take().is_some() {
            self.host.unwatch();
        }
        self.lifecycle = Lifecycle::Detached;
        debug!(container = %self.config.container_id, "scroll follower detached");
    }

    fn reconcile_watch(&mut self, resolved: Option<&H::Target>) {
        match (self.watched.as_ref(), resolved) {
            (None, None) => {}
            (Some(_), None) => {
                self.host.unwatch();
                self.watched = None;
                self.stats.teardowns += 1;
                debug!(container = %self.config.container_id, "container gone, watch stopped");
            }
            (None, Some(target)) => {
                self.host.watch(target, self.config.observe_subtree);
                self.watched = Some(target.clone());
                debug!(container = %self.config.container_id, "watching container");
            }
            (Some(watched), Some(target)) => {
                if watched.is_connected() && watched.same_node(target) {
                    return;
                }
                self.host.watch(target, self.config.observe_subtree);
                self.watched = Some(target.clone());
                self.stats.rebinds += 1;
                debug!(container = %self.config.container_id, "container replaced, watch moved");
            }
        }
    }

    #[must_use]
    pub fn config(&self) -> &FollowConfig {
        &self.config
    }

    #[must_use]
    pub fn stats(&self) -> FollowStats {
        self.stats
    }

    /// Whether [`attach`](Self::attach) ran and [`detach`](Self::detach) did not.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.lifecycle == Lifecycle::Attached
    }

    /// Whether a structural watch is active.
    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.watched.is_some()
    }

    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }
}

/// Assign `scrollTop = scrollHeight` and let the host clamp it.
fn pin_to_bottom<T: ScrollTarget>(target: &T) -> ScrollOutcome {
    let before = target.metrics();
    target.set_scroll_top(before.scroll_height);
    let offset = target.metrics().scroll_top;
    if offset == before.scroll_top {
        ScrollOutcome::AlreadyPinned { offset }
    } else {
        ScrollOutcome::Pinned { offset }
    }
}
