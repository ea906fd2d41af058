//! RTP packet synthesis from script descriptions.
//!
//! Builds RFC 3550 packets from a flat `key=value` token list. Unlike a
//! protocol stack, field values are taken verbatim from the script:
//! nothing is validated, so deliberately broken packets can be produced
//! for receiver testing.

use crate::{hex, parse_number};

/// RTP packet version 2 (as per RFC 3550)
pub const RTP_VERSION: u8 = 2;

/// Scratch size for one packet; also the largest length `len=` can force.
pub const MAX_PACKET: usize = 1500;

/// Highest CSRC slot addressable by `csrcN=` (the CC field is 4 bits).
const MAX_CSRC: usize = 16;

/// Builds one RTP packet from the token stream following the `RTP`
/// keyword of a script line.
///
/// # Wire Format
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       sequence number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |           synchronization source (SSRC) identifier            |
/// +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// |            CSRC list, extension, payload...                   |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Recognized tokens: `v p x cc m pt seq ts ssrc csrcN ext_type ext_len
/// ext_data data len`; anything else is ignored. Offsets for `ext_*` and
/// `data` are computed from the CC and extension sizes in effect when the
/// token is seen, so scripts must set `cc` before `ext_*` and both before
/// `data`. Out-of-order tokens produce a malformed packet, not an error.
pub fn packet_from_description(desc: &str) -> Vec<u8> {
    // ---
    let mut buf = vec![0u8; MAX_PACKET];
    let mut end: usize = 12;

    let mut version = RTP_VERSION;
    let mut padding = 0u8;
    let mut extension = 0u8;
    let mut marker = 0u8;
    let mut payload_type = 0u8;
    let mut sequence = 0u16;
    let mut timestamp = 0u32;
    let mut ssrc = 0u32;

    let mut cc: usize = 0;
    let mut cc_explicit = false;
    // Bytes reserved for the header extension: 4 once ext_type/ext_len
    // appear, plus 4 per word declared by ext_len.
    let mut ext_bytes: usize = 0;
    let mut forced_len: Option<usize> = None;

    for word in desc.split_ascii_whitespace() {
        let (key, value) = word.split_once('=').unwrap_or((word, ""));
        match key {
            "v" => version = parse_number(value) as u8 & 0x03,
            "p" => padding = (parse_number(value) != 0) as u8,
            "x" => extension = (parse_number(value) != 0) as u8,
            "cc" => {
                cc = parse_number(value) as usize & 0x0f;
                cc_explicit = true;
            }
            "m" => marker = (parse_number(value) != 0) as u8,
            "pt" => payload_type = parse_number(value) as u8 & 0x7f,
            "seq" => sequence = parse_number(value) as u16,
            "ts" => timestamp = parse_number(value) as u32,
            "ssrc" => ssrc = parse_number(value) as u32,
            "ext_type" => {
                let off = 12 + 4 * cc;
                put_u16(&mut buf, off, parse_number(value) as u16);
                if ext_bytes == 0 {
                    ext_bytes = 4;
                }
                end = end.max((off + 4).min(MAX_PACKET));
            }
            "ext_len" => {
                // Clamped so a hostile word count cannot push offsets
                // past the scratch buffer.
                let words = (parse_number(value) as usize).min(MAX_PACKET / 4);
                put_u16(&mut buf, 12 + 4 * cc + 2, words as u16);
                if ext_bytes == 0 {
                    ext_bytes = 4;
                }
                ext_bytes += 4 * words;
                end = end.max((12 + 4 * cc + ext_bytes).min(MAX_PACKET));
            }
            "ext_data" => {
                let off = 12 + 4 * cc + 4;
                if off < MAX_PACKET {
                    let n = hex::decode_into(value, &mut buf[off..]);
                    end = end.max(off + n);
                }
            }
            "data" => {
                let off = 12 + 4 * cc + ext_bytes;
                if off < MAX_PACKET {
                    let n = hex::decode_into(value, &mut buf[off..]);
                    end = end.max(off + n);
                }
            }
            "len" => forced_len = Some(parse_number(value) as usize),
            _ if key.starts_with("csrc") => {
                let slot = parse_number(&key[4..]) as usize;
                if slot < MAX_CSRC {
                    put_u32(&mut buf, 12 + 4 * slot, parse_number(value) as u32);
                    if !cc_explicit && cc < slot + 1 {
                        cc = slot + 1;
                    }
                    end = end.max(12 + 4 * (slot + 1));
                }
            }
            // Unknown tokens are tolerated, matching the hands-off
            // treatment of every other script value.
            _ => {}
        }
    }

    buf[0] = version << 6 | padding << 5 | extension << 4 | cc as u8;
    buf[1] = marker << 7 | payload_type;
    buf[2..4].copy_from_slice(&sequence.to_be_bytes());
    buf[4..8].copy_from_slice(&timestamp.to_be_bytes());
    buf[8..12].copy_from_slice(&ssrc.to_be_bytes());

    let computed = end.max(12 + 4 * cc + ext_bytes);
    buf.truncate(forced_len.unwrap_or(computed).min(MAX_PACKET));
    buf
}

fn put_u16(buf: &mut [u8], off: usize, value: u16) {
    // ---
    if off + 2 <= buf.len() {
        buf[off..off + 2].copy_from_slice(&value.to_be_bytes());
    }
}

fn put_u32(buf: &mut [u8], off: usize, value: u32) {
    // ---
    if off + 4 <= buf.len() {
        buf[off..off + 4].copy_from_slice(&value.to_be_bytes());
    }
}
