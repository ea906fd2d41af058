//! Whitespace-tolerant hex payload codec.
//!
//! Script payloads (`data=`, `ext_data=`) are hex strings that may be
//! spread across continuation lines, so embedded whitespace is skipped.

/// Decodes hex text into `out`, returning the number of bytes written.
///
/// Consumes two nibbles per byte and skips any whitespace between them.
/// A trailing odd nibble is dropped. Decoding stops silently at the
/// first non-hex, non-whitespace character or when `out` is full;
/// callers that need strict validation check the input beforehand.
pub fn decode_into(text: &str, out: &mut [u8]) -> usize {
    // ---
    let mut written = 0;
    let mut high: Option<u8> = None;

    for c in text.chars() {
        if c.is_whitespace() {
            continue;
        }
        let nibble = match c.to_digit(16) {
            Some(n) => n as u8,
            None => break,
        };
        match high.take() {
            None => high = Some(nibble),
            Some(h) => {
                if written == out.len() {
                    break;
                }
                out[written] = h << 4 | nibble;
                written += 1;
            }
        }
    }
    written
}

/// Decodes hex text into a fresh buffer.
pub fn decode(text: &str) -> Vec<u8> {
    // ---
    let mut out = vec![0u8; text.len() / 2 + 1];
    let n = decode_into(text, &mut out);
    out.truncate(n);
    out
}

/// Re-encodes bytes as lowercase hex, the inverse of [`decode`] for
/// even-length inputs.
pub fn encode(bytes: &[u8]) -> String {
    // ---
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}
