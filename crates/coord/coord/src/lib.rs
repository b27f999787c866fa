//! Trait abstractions for Corral's coordination primitives.
//!
//! This crate defines the backend-agnostic surface of the library:
//!
//! - [`LockManager`] / [`LockHandle`]: renewing distributed locks with
//!   compare-and-swap ownership semantics.
//! - [`DedupQueue`]: a FIFO queue paired with a counting membership index so
//!   `exists` is O(1) and duplicate values are tracked correctly.
//! - [`JsonCodec`] / [`TypedQueue`]: serialization seam for structured
//!   payloads.
//! - [`testing`]: conformance suites every backend runs against its own
//!   implementation.
//!
//! Backends live in sibling crates (`corral-coord-memory`,
//! `corral-coord-redis`). All correctness is pushed into the backing store's
//! atomic operations; implementations hold no client-side state beyond
//! connection handles and are safe for unsynchronized concurrent use.

pub mod codec;
pub mod error;
pub mod lock;
pub mod queue;
pub mod testing;
pub mod typed;

pub use codec::JsonCodec;
pub use error::CoordError;
pub use lock::{LockHandle, LockManager};
pub use queue::DedupQueue;
pub use typed::TypedQueue;
