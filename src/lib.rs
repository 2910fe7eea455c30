//! Purpose: Persistent FIFO queue stored in one memory-mapped ring file.
//! Exports: `api` (queue type, capability trait, options, errors).
//! Role: Library backing the `fqueue` binary and embedding callers.
//! Invariants: Callers go through `api`; `core` stays crate-private.
//! Invariants: Single-process use; the file is exclusively locked while open.
pub mod api;
mod core;
