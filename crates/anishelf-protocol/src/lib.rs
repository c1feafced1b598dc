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

//! Wire-level vocabulary for remote anime metadata lookups.
//!
//! Layout: `mask.rs` (field masks and layout tables), `parser.rs` (reply decoding),
//! `record.rs` (sparse metadata records), `session.rs` (lookup session trait),
//! `replay.rs` (offline session backed by recorded replies).

pub mod error;
pub mod mask;
pub mod parser;
pub mod record;
pub mod replay;
pub mod session;

pub use error::{LookupError, MaskError, MergeError, ParseError};
pub use mask::{AnimeField, AnimeMask, FieldKind, FieldMask, FileField, FileMask, MaskLayout};
pub use parser::{CoercionFailure, ParsedReply, ResponseParser};
pub use record::{AnimeInfo, Ed2kHash, FieldValue, FileInfo, FileState, Resolution};
pub use replay::{RecordedReply, ReplayDocument, ReplaySession};
pub use session::{
    AuthOutcome, Credentials, LookupReply, LookupRequest, LookupResult, LookupSession,
};
