//! Shared types for the bmcfleet workspace.
//!
//! Keep cross-crate DTOs here so the engine and CLI agree on wire and report formats.

/// Shared DTOs for cross-crate use.
pub mod api;
