//! Local filesystem helpers: backup name classification, deterministic tree
//! walking and permission handling.

pub mod metadata;
pub mod naming;
pub mod walker;
