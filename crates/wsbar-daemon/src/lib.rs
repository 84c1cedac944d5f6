//! wsbar daemon library
//!
//! Talks to the compositor over its two Unix sockets and reconciles the
//! reported workspaces and windows into an ordered, render-ready list.

pub mod context;
pub mod hypr_ipc;
pub mod reconciler;
pub mod render;
pub mod rewrite;
pub mod window;
pub mod workspace;
