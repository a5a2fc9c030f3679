//! Thin helpers over the `log` crate for consistent target naming.
//!
//! Every subsystem logs through plain `log::{warn,debug,trace}` macros
//! directly, matching this crate's existing direct logging usage
//! throughout; this module only centralizes the per-backend target
//! strings so a caller configuring a logger can filter by subsystem without
//! guessing at module-path targets.

/// Log target for the `fs` backends (`local`, `memory`, `object_store`).
pub const TARGET_FS: &str = "catalyst_bundle::fs";
/// Log target for the OCI registry wrapper.
pub const TARGET_OCI: &str = "catalyst_bundle::oci";
/// Log target for archive extraction.
pub const TARGET_EXTRACT: &str = "catalyst_bundle::extract";
/// Log target for eStargz selective pull.
pub const TARGET_ESTARGZ: &str = "catalyst_bundle::estargz";
/// Log target for directory bundling.
pub const TARGET_BUNDLER: &str = "catalyst_bundle::bundler";
