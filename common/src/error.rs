//! Protocol error taxonomy.
//!
//! Packet-description failures are distinguished from setup/IO failures
//! so the binary can map them to its documented exit codes (2 for
//! protocol errors, 1 for everything else).

use thiserror::Error;

/// A fatal defect in a script line or RTCP description tree.
///
/// Tolerated conditions (odd hex nibbles, unknown RTP tokens, unbalanced
/// parentheses) never surface here; they degrade the packet silently.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The leading `sec.usec` field did not parse.
    #[error("invalid time field {0:?} (expected sec.usec)")]
    BadTime(String),

    /// The line's type word was neither `RTP` nor `RTCP`.
    #[error("unknown packet type {0:?} (expected RTP or RTCP)")]
    UnknownPacketType(String),

    /// A top-level RTCP group named a record type we do not serialize.
    #[error("unknown RTCP record type {0:?}")]
    UnknownRecordType(String),

    /// A leaf inside a record was not one of its recognized parameters.
    #[error("unknown parameter {field:?} in RTCP {record} record")]
    UnknownField { record: &'static str, field: String },

    /// The description tree has the wrong shape for its record type.
    #[error("malformed RTCP description: {0}")]
    Malformed(String),

    /// An SDES item exceeds the 8-bit length field.
    #[error("SDES {item} text is {len} bytes, maximum is 255")]
    SdesItemTooLong { item: &'static str, len: usize },
}
