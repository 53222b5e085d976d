#![forbid(unsafe_code)]

//! `scrollpin` keeps a live-updating scroll container pinned to its bottom
//! edge.
//!
//! Design goals:
//! - **Host-driven**: the embedding environment (the browser binding in
//!   `scrollpin-web`, or [`memory::MemoryDocument`] in tests) resolves the
//!   container, reports structural mutations and forwards page events.
//! - **Re-resolve per trigger**: no element reference is trusted across
//!   triggers without a liveness check.
//! - **No failure modes**: a missing container is a silent no-op.
//!
//! This crate does not bind to `wasm-bindgen`; `scrollpin-web` wraps it with
//! the JS-facing surface.

pub mod config;
pub mod follower;
pub mod handle;
pub mod host;
pub mod memory;
pub mod trigger;

pub use config::{ConfigError, FollowConfig};
pub use follower::{FollowStats, ScrollFollower, ScrollOutcome};
pub use handle::FollowerHandle;
pub use host::{ScrollHost, ScrollMetrics, ScrollTarget};
pub use trigger::Trigger;
