//! Common RTP/RTCP packet construction shared by the script tools.
//!
//! This crate turns textual packet descriptions into wire-ready bytes:
//! flat `key=value` descriptions for RTP and parenthesized parameter
//! trees for RTCP compound packets.

pub mod cli;
pub mod error;
pub mod hex;
pub mod observability;
pub mod rtcp;
pub mod rtp;

pub use cli::ColorWhen;
pub use error::ProtocolError;
pub use observability::{init_tracing, Metrics};

/// Parses an unsigned number the way `strtoul(s, NULL, 0)` does.
///
/// `0x`/`0X` prefixes select hex, a leading `0` selects octal, anything
/// else is decimal. Parsing stops at the first character outside the
/// selected base; an empty or unparsable value yields 0. Script values
/// are tolerated, never rejected, so this cannot fail.
pub fn parse_number(s: &str) -> u64 {
    // ---
    let s = s.trim_start();

    let (digits, radix) = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (hex, 16)
    } else if s.len() > 1 && s.starts_with('0') {
        (&s[1..], 8)
    } else {
        (s, 10)
    };

    let mut value: u64 = 0;
    for c in digits.chars() {
        match c.to_digit(radix) {
            Some(d) => value = value.wrapping_mul(radix as u64).wrapping_add(d as u64),
            None => break,
        }
    }
    value
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn parses_decimal_hex_and_octal() {
        // ---
        assert_eq!(parse_number("160"), 160);
        assert_eq!(parse_number("0xdeadbeef"), 0xdead_beef);
        assert_eq!(parse_number("0XCAFE"), 0xcafe);
        assert_eq!(parse_number("010"), 8);
        assert_eq!(parse_number("0"), 0);
    }

    #[test]
    fn stops_at_first_invalid_character() {
        // ---
        assert_eq!(parse_number("12abc"), 12);
        assert_eq!(parse_number("0x12g"), 0x12);
        assert_eq!(parse_number(""), 0);
        assert_eq!(parse_number("junk"), 0);
    }
}
