#![forbid(unsafe_code)]

//! Follower configuration.
//!
//! Every field defaults to the values the chat page ships with, so
//! `FollowConfig::default()` pins `#chatlist` and listens for the two htmx
//! partial-update events.
//!
//! ```json
//! {
//!   "container_id": "chatlist",
//!   "content_swap_event": "htmx:afterOnLoad",
//!   "live_message_event": "htmx:wsAfterMessage",
//!   "global_name": "scrollToBottom",
//!   "observe_subtree": true
//! }
//! ```
//!
//! JSON loading requires the `config` feature.

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

/// Id of the chat log container in the served page.
pub const DEFAULT_CONTAINER_ID: &str = "chatlist";
/// Fired on `document.body` after an htmx request finished swapping content.
pub const DEFAULT_CONTENT_SWAP_EVENT: &str = "htmx:afterOnLoad";
/// Fired on `document.body` after the htmx websocket extension applied a message.
pub const DEFAULT_LIVE_MESSAGE_EVENT: &str = "htmx:wsAfterMessage";
/// Window property the scroll callable is published under.
pub const DEFAULT_GLOBAL_NAME: &str = "scrollToBottom";

/// Configuration for one [`ScrollFollower`](crate::ScrollFollower).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct FollowConfig {
    /// Element id of the scroll container.
    pub container_id: String,

    /// Body event signalling a completed partial content swap.
    pub content_swap_event: String,

    /// Body event signalling a completed live-message partial update.
    pub live_message_event: String,

    /// Window property name for the global callable. `None` disables the
    /// global export; collaborators then need a
    /// [`FollowerHandle`](crate::FollowerHandle).
    pub global_name: Option<String>,

    /// Watch the whole container subtree rather than direct children only.
    /// Streamed replies append into nested message nodes, so this stays on
    /// for chat pages.
    pub observe_subtree: bool,
}

impl Default for FollowConfig {
    fn default() -> Self {
        Self {
            container_id: DEFAULT_CONTAINER_ID.to_owned(),
            content_swap_event: DEFAULT_CONTENT_SWAP_EVENT.to_owned(),
            live_message_event: DEFAULT_LIVE_MESSAGE_EVENT.to_owned(),
            global_name: Some(DEFAULT_GLOBAL_NAME.to_owned()),
            observe_subtree: true,
        }
    }
}

impl FollowConfig {
    /// Default config targeting a different container id.
    #[must_use]
    pub fn for_container(id: impl Into<String>) -> Self {
        Self {
            container_id: id.into(),
            ..Self::default()
        }
    }

    /// Parse from a JSON string. Missing fields take their defaults.
    #[cfg(feature = "config")]
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s).map_err(ConfigError::Json)?;
        config.validated()
    }

    /// Serialize to a pretty JSON string.
    #[cfg(feature = "config")]
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(ConfigError::Json)
    }

    /// Check all fields.
    ///
    /// Returns a list of validation errors. An empty list means the config
    /// is valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.container_id.trim().is_empty() {
            errors.push("container_id must not be empty".into());
        } else if self.container_id.chars().any(char::is_whitespace) {
            errors.push(format!(
                "container_id must not contain whitespace, got {:?}",
                self.container_id
            ));
        }

        if self.content_swap_event.trim().is_empty() {
            errors.push("content_swap_event must not be empty".into());
        }
        if self.live_message_event.trim().is_empty() {
            errors.push("live_message_event must not be empty".into());
        }
        if self.content_swap_event == self.live_message_event {
            errors.push(format!(
                "content_swap_event and live_message_event must differ, both are {:?}",
                self.content_swap_event
            ));
        }

        if let Some(name) = &self.global_name
            && !is_js_identifier(name)
        {
            errors.push(format!(
                "global_name must be a plain JS identifier, got {name:?}"
            ));
        }

        errors
    }

    /// Return `self` if [`validate`](Self::validate) reports nothing.
    pub fn validated(self) -> Result<Self, ConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Body event names in registration order.
    #[must_use]
    pub fn event_names(&self) -> [&str; 2] {
        [&self.content_swap_event, &self.live_message_event]
    }
}

fn is_js_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_' || first == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Errors from loading or validating a [`FollowConfig`].
#[derive(Debug)]
pub enum ConfigError {
    /// JSON parse error.
    #[cfg(feature = "config")]
    Json(serde_json::Error),
    /// Validation errors.
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "config")]
            Self::Json(e) => write!(f, "JSON parse error: {e}"),
            Self::Validation(errors) => {
                write!(f, "validation errors: {}", errors.join("; "))
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            #[cfg(feature = "config")]
            Self::Json(e) => Some(e),
            Self::Validation(_) => None,
        }
    }
}
