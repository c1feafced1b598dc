#![forbid(unsafe_code)]
#![deny(
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]

//! Shared test helpers used across integration suites.
//! Layout: fixtures.rs (media files, sample replies), reply.rs (record to reply line), mocks.rs (scripted lookup session).

pub mod fixtures;
pub mod mocks;
pub mod reply;
