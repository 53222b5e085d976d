#![forbid(unsafe_code)]

//! Browser binding for `scrollpin`.
//!
//! On `wasm32` this crate installs a [`scrollpin::ScrollFollower`] for the
//! page's `#chatlist` container as soon as the module starts:
//!
//! - a `MutationObserver` on the container subtree runs a pass per batch,
//! - `htmx:afterOnLoad` and `htmx:wsAfterMessage` on `document.body` each run
//!   a pass,
//! - `window.scrollToBottom()` runs a pass on demand, so server-pushed
//!   `<script>scrollToBottom();</script>` fragments keep working.
//!
//! JS that wants an explicit handle instead of the global uses
//! `installWithConfig(json)` or `currentAutoScroll()` and gets an
//! `AutoScroll` object back.

#[cfg(target_arch = "wasm32")]
mod wasm;

#[cfg(target_arch = "wasm32")]
pub use wasm::{AutoScroll, current_auto_scroll, install_with_config, uninstall};

// Binding core is used by the wasm module and by native tests.
#[cfg(any(target_arch = "wasm32", test))]
mod binding_core;

#[cfg(test)]
mod tests {
    use crate::binding_core::{
        InstallError, defer_until_ready, outcome_label, parse_config, stats_fields,
    };
    use pretty_assertions::assert_eq;
    use scrollpin::memory::MemoryDocument;
    use scrollpin::{ConfigError, FollowConfig, FollowerHandle, ScrollOutcome};

    #[test]
    fn only_loading_documents_defer() {
        assert!(defer_until_ready("loading"));
        assert!(!defer_until_ready("interactive"));
        assert!(!defer_until_ready("complete"));
        assert!(!defer_until_ready(""));
    }

    #[test]
    fn blank_config_is_default() {
        assert_eq!(parse_config("").expect("default"), FollowConfig::default());
        assert_eq!(parse_config("  \n").expect("default"), FollowConfig::default());
    }

    #[test]
    fn config_json_is_parsed() {
        let config = parse_config(r#"{"container_id":"log","global_name":null}"#)
            .expect("valid config");
        assert_eq!(config.container_id, "log");
        assert_eq!(config.global_name, None);
    }

    #[test]
    fn invalid_config_is_install_error() {
        let err = parse_config(r#"{"global_name":"a-b"}"#).unwrap_err();
        assert!(matches!(
            err,
            InstallError::Config(ConfigError::Validation(_))
        ));
        assert!(err.to_string().starts_with("invalid config: validation errors"));
    }

    #[test]
    fn install_error_messages() {
        assert_eq!(InstallError::NoWindow.to_string(), "no global `window`");
        assert_eq!(InstallError::NoDocument.to_string(), "window has no document");
        assert_eq!(
            InstallError::Observer("TypeError".into()).to_string(),
            "failed to create MutationObserver: TypeError"
        );
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(
            outcome_label(ScrollOutcome::Pinned { offset: 1.0 }),
            "pinned"
        );
        assert_eq!(
            outcome_label(ScrollOutcome::AlreadyPinned { offset: 1.0 }),
            "already_pinned"
        );
        assert_eq!(outcome_label(ScrollOutcome::Missing), "missing");
        assert_eq!(outcome_label(ScrollOutcome::Detached), "detached");
    }

    #[test]
    fn stats_fields_cover_every_counter() {
        let doc = MemoryDocument::new();
        let list = doc.create_scroll_container("chatlist", 10.0);
        doc.append_child(doc.body(), list);
        doc.append_child(list, doc.create_block(30.0));
        let handle = FollowerHandle::from_parts(FollowConfig::default(), doc.clone());
        handle.attach();
        handle.scroll_to_bottom();
        handle.dispatch_event("htmx:wsAfterMessage");

        let stats = handle.stats().expect("idle");
        let fields = stats_fields(&stats, 4);
        let get = |name: &str| {
            fields
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| *v)
                .unwrap_or_else(|| panic!("missing field {name}"))
        };
        assert_eq!(get("ready"), 1.0);
        assert_eq!(get("external"), 1.0);
        assert_eq!(get("liveMessage"), 1.0);
        assert_eq!(get("contentSwap"), 0.0);
        assert_eq!(get("mutation"), 0.0);
        assert_eq!(get("pinned"), 1.0);
        assert_eq!(get("alreadyPinned"), 2.0);
        assert_eq!(get("missing"), 0.0);
        assert_eq!(get("reentrantSkips"), 4.0);
        assert_eq!(fields.len(), 12);
    }
}
