//! Deep structural deltas between heterogeneous object graphs.
//!
//! This crate computes and applies tagged-operation deltas between two
//! snapshots of an object graph exposed through the [`descriptor`] contract
//! (records, sequences, maps, polymorphic members, cycles), tracks which
//! members changed via an optional dirty-bit fast path ([`dirty`]), and
//! moves documents to and from a compact binary wire format ([`codec`]).
//!
//! The engine never reflects on concrete host types: it walks
//! [`descriptor::Record`]/[`descriptor::SequenceAdapter`]/
//! [`descriptor::MapAdapter`] trait objects, so it applies to any host type
//! whose code generator emits those three implementations.
//!
//! ```text
//! compute_delta(old, new, options) -> Document
//! apply_delta(target, &Document, &dyn RootFactory, options) -> new target
//! codec::write(&Document, members, options) -> bytes
//! codec::read(bytes, options) -> Frame { fingerprint, document }
//! ```

pub mod codec;
pub mod config;
pub mod descriptor;
pub mod dirty;
pub mod document;
pub mod engine;
pub mod error;
pub mod value;

pub use codec::{read, write, Frame};
pub use config::Options;
pub use document::Document;
pub use engine::{apply_delta, compute_delta};
pub use error::{ApplyError, CodecError, EngineError, Error, Result};

/// Whether `document` has zero operations (§3.1 I3, §6.3).
pub fn is_empty(document: &Document) -> bool {
    document.is_empty()
}
