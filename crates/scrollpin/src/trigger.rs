#![forbid(unsafe_code)]

//! Reasons a scroll-to-bottom pass runs.

use crate::config::FollowConfig;

/// What caused a follower pass. Every trigger runs the same operation; the
/// kind is only recorded for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// Document finished parsing.
    Ready,
    /// Child-list change inside the watched container subtree.
    Mutation,
    /// Partial content swap completed (`htmx:afterOnLoad` by default).
    ContentSwap,
    /// Live-message partial update completed (`htmx:wsAfterMessage` by default).
    LiveMessage,
    /// Explicit call through a handle or the global callable.
    External,
}

impl Trigger {
    pub const ALL: [Self; 5] = [
        Self::Ready,
        Self::Mutation,
        Self::ContentSwap,
        Self::LiveMessage,
        Self::External,
    ];

    /// Map a body event name to its trigger using the configured names.
    #[must_use]
    pub fn from_event_name(config: &FollowConfig, name: &str) -> Option<Self> {
        if name == config.content_swap_event {
            Some(Self::ContentSwap)
        } else if name == config.live_message_event {
            Some(Self::LiveMessage)
        } else {
            None
        }
    }

    /// Stable snake_case label used in logs and exported stats.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Mutation => "mutation",
            Self::ContentSwap => "content_swap",
            Self::LiveMessage => "live_message",
            Self::External => "external",
        }
    }

    pub(crate) const fn index(self) -> usize {
        match self {
            Self::Ready => 0,
            Self::Mutation => 1,
            Self::ContentSwap => 2,
            Self::LiveMessage => 3,
            Self::External => 4,
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
