#![forbid(unsafe_code)]

//! Seams between the follower and the document it runs in.
//!
//! The browser binding implements these over `web_sys::Element` and a
//! `MutationObserver`; [`MemoryDocument`](crate::memory::MemoryDocument)
//! implements them in-process for tests.

/// Vertical scroll geometry of a container, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    /// Current offset from the top (`scrollTop`).
    pub scroll_top: f64,
    /// Total content height (`scrollHeight`).
    pub scroll_height: f64,
    /// Visible viewport height (`clientHeight`).
    pub client_height: f64,
}

impl ScrollMetrics {
    /// Largest legal offset: `scroll_height - client_height`, never negative.
    #[must_use]
    pub fn max_offset(&self) -> f64 {
        (self.scroll_height - self.client_height).max(0.0)
    }

    /// Whether the viewport already shows the last row of content.
    ///
    /// Browsers report fractional offsets under zoom, so anything within
    /// half a pixel of the maximum counts.
    #[must_use]
    pub fn is_at_bottom(&self) -> bool {
        self.max_offset() - self.scroll_top < 0.5
    }
}

/// A resolved scroll container.
pub trait ScrollTarget {
    /// Read the current geometry.
    fn metrics(&self) -> ScrollMetrics;

    /// Assign the scroll offset. Hosts clamp to `0..=max_offset()` the way
    /// browsers do for `scrollTop`.
    fn set_scroll_top(&self, offset: f64);

    /// Whether the element is still attached to its document.
    fn is_connected(&self) -> bool;

    /// Whether `self` and `other` refer to the same element.
    fn same_node(&self, other: &Self) -> bool;
}

/// Document-side capabilities the follower needs.
pub trait ScrollHost {
    type Target: ScrollTarget + Clone;

    /// Look up the container by element id. `None` when absent.
    fn resolve(&self, id: &str) -> Option<Self::Target>;

    /// Start reporting child-list mutations under `target`. Replaces any
    /// existing watch.
    fn watch(&mut self, target: &Self::Target, subtree: bool);

    /// Stop reporting mutations. No-op without an active watch.
    fn unwatch(&mut self);
}
