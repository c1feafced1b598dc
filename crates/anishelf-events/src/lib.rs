#![forbid(unsafe_code)]
#![warn(
    unused,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Typed event bus for pipeline progress and outcomes.
//!
//! Events carry sequential identifiers and the bus keeps a bounded replay ring so
//! late subscribers can catch up. Delivery uses `tokio::broadcast`; slow subscribers
//! lose the oldest events rather than stalling publishers.

pub mod payloads;
pub mod routing;

pub use payloads::{DEFAULT_REPLAY_CAPACITY, Event, EventEnvelope, EventId};
pub use routing::{EventBus, EventStream};
