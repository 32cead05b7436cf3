//! In-process adapters that live inside the domain crate for convenience.
//!
//! Used by unit tests, by the `memory` storage provider in the binaries, and
//! for local demos. The managed store client lives in its own crate.

pub mod memory_kv;
