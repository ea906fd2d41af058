//! Script-driven RTP/RTCP sender library.
//!
//! Reads a line-oriented packet script, synthesizes bit-exact RTP and
//! RTCP packets, and replays them over a pair of UDP sockets at the
//! times encoded in the script. The binary in `bin/rtpsend.rs` is a
//! thin CLI over these pieces; they are exported so integration tests
//! (and embedders) can drive them directly.

pub mod network;
pub mod pacer;
pub mod script;

pub use network::{Channel, SendStats, Target, UdpPair};
pub use pacer::Pacer;
pub use script::{parse_line, ScriptPacket, ScriptReader};
