#![forbid(unsafe_code)]

//! Platform-independent pieces of the browser binding.
//!
//! No JS/WASM types here, so native tests cover them.

use scrollpin::{ConfigError, FollowConfig, FollowStats, ScrollOutcome, Trigger};

/// Errors raised while installing the binding.
#[derive(Debug)]
pub enum InstallError {
    /// Not running in a window context (e.g. a worker).
    NoWindow,
    /// The window has no document.
    NoDocument,
    /// `new MutationObserver(..)` threw.
    Observer(String),
    /// The supplied config did not parse or validate.
    Config(ConfigError),
}

impl std::fmt::Display for InstallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoWindow => write!(f, "no global `window`"),
            Self::NoDocument => write!(f, "window has no document"),
            Self::Observer(msg) => write!(f, "failed to create MutationObserver: {msg}"),
            Self::Config(e) => write!(f, "invalid config: {e}"),
        }
    }
}

impl std::error::Error for InstallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for InstallError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Parse a host-supplied config. Blank input means defaults.
pub(crate) fn parse_config(json: &str) -> Result<FollowConfig, InstallError> {
    if json.trim().is_empty() {
        return Ok(FollowConfig::default());
    }
    Ok(FollowConfig::from_json_str(json)?)
}

/// Whether installation must wait for `DOMContentLoaded`, given
/// `document.readyState`.
pub(crate) fn defer_until_ready(ready_state: &str) -> bool {
    ready_state == "loading"
}

pub(crate) fn outcome_label(outcome: ScrollOutcome) -> &'static str {
    match outcome {
        ScrollOutcome::Pinned { .. } => "pinned",
        ScrollOutcome::AlreadyPinned { .. } => "already_pinned",
        ScrollOutcome::Missing => "missing",
        ScrollOutcome::Detached => "detached",
    }
}

/// Flatten counters into camelCase `(key, value)` pairs for a JS object.
pub(crate) fn stats_fields(stats: &FollowStats, reentrant_skips: u64) -> Vec<(&'static str, f64)> {
    let mut fields: Vec<(&'static str, f64)> = Trigger::ALL
        .into_iter()
        .map(|trigger| (trigger_key(trigger), stats.triggered(trigger) as f64))
        .collect();
    fields.extend([
        ("pinned", stats.pinned as f64),
        ("alreadyPinned", stats.already_pinned as f64),
        ("missing", stats.missing as f64),
        ("ignored", stats.ignored as f64),
        ("rebinds", stats.rebinds as f64),
        ("teardowns", stats.teardowns as f64),
        ("reentrantSkips", reentrant_skips as f64),
    ]);
    fields
}

fn trigger_key(trigger: Trigger) -> &'static str {
    match trigger {
        Trigger::Ready => "ready",
        Trigger::Mutation => "mutation",
        Trigger::ContentSwap => "contentSwap",
        Trigger::LiveMessage => "liveMessage",
        Trigger::External => "external",
    }
}
