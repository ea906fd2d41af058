//! Script ingestion: line framing and packet dispatch.
//!
//! A logical script line is one packet description, possibly spread
//! over continuation lines (any raw line starting with whitespace).
//! `#` lines are comments. Each logical line reads
//! `sec.usec TYPE params` where TYPE is `RTP` or `RTCP`; both halves of
//! the timestamp are plain integers, so `0.5` means 5 microseconds.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, Seek, SeekFrom};
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use rtp_script_common::rtcp::{self, tree, Wallclock};
use rtp_script_common::{rtp, ProtocolError};

use crate::network::Channel;

/// One synthesized packet waiting for its playout time.
#[derive(Debug, Clone)]
pub struct ScriptPacket {
    pub time: Duration,
    pub channel: Channel,
    pub payload: Vec<u8>,
}

enum Source {
    File(BufReader<File>),
    Stdin(io::Stdin),
    Memory(Cursor<Vec<u8>>),
}

/// Reassembles logical lines from a script stream.
///
/// Keeps one held-back raw line: the line that terminated the previous
/// logical line is the head of the next one.
pub struct ScriptReader {
    // ---
    source: Source,
    held: Option<String>,
}

impl ScriptReader {
    // ---
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        // ---
        let file = File::open(path.as_ref())
            .with_context(|| format!("cannot open script {}", path.as_ref().display()))?;
        Ok(Self {
            source: Source::File(BufReader::new(file)),
            held: None,
        })
    }

    pub fn stdin() -> Self {
        // ---
        Self {
            source: Source::Stdin(io::stdin()),
            held: None,
        }
    }

    /// In-memory script, used by tests and useful for embedding.
    pub fn from_text(text: impl Into<String>) -> Self {
        // ---
        Self {
            source: Source::Memory(Cursor::new(text.into().into_bytes())),
            held: None,
        }
    }

    /// Whether `rewind` can work; standard input cannot seek.
    pub fn can_rewind(&self) -> bool {
        // ---
        !matches!(self.source, Source::Stdin(_))
    }

    /// Restarts the script from the top.
    pub fn rewind(&mut self) -> Result<()> {
        // ---
        self.held = None;
        match &mut self.source {
            Source::File(reader) => {
                reader.seek(SeekFrom::Start(0)).context("cannot rewind script file")?;
            }
            Source::Memory(cursor) => cursor.set_position(0),
            Source::Stdin(_) => bail!("cannot rewind standard input"),
        }
        Ok(())
    }

    fn read_raw(&mut self) -> Result<Option<String>> {
        // ---
        let mut line = String::new();
        let n = match &mut self.source {
            Source::File(reader) => reader.read_line(&mut line),
            Source::Stdin(stdin) => stdin.read_line(&mut line),
            Source::Memory(cursor) => cursor.read_line(&mut line),
        }
        .context("script read failed")?;
        if n == 0 {
            return Ok(None);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }

    /// Returns the next logical line, or `None` at end of input.
    pub fn next_logical(&mut self) -> Result<Option<String>> {
        // ---
        let mut logical = self.held.take().unwrap_or_default();
        loop {
            let Some(raw) = self.read_raw()? else {
                return Ok((!logical.is_empty()).then_some(logical));
            };
            if raw.starts_with('#') {
                continue;
            }
            let is_head = raw.chars().next().is_some_and(|c| !c.is_whitespace());
            if is_head && !logical.is_empty() {
                self.held = Some(raw);
                return Ok(Some(logical));
            }
            logical.push_str(&raw);
        }
    }
}

/// Splits the first whitespace-delimited token off `s`.
fn split_token(s: &str) -> (&str, &str) {
    // ---
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], s[i..].trim_start()),
        None => (s, ""),
    }
}

fn parse_stamp(stamp: &str) -> Result<Duration, ProtocolError> {
    // ---
    let bad = || ProtocolError::BadTime(stamp.to_string());
    let (sec, usec) = stamp.split_once('.').ok_or_else(bad)?;
    let sec: u64 = sec.parse().map_err(|_| bad())?;
    let usec: u64 = usec.parse().map_err(|_| bad())?;
    Ok(Duration::from_secs(sec) + Duration::from_micros(usec))
}

/// Turns one logical line into a buffered packet.
///
/// The wall clock is sampled by the caller so every record of an RTCP
/// compound packet sees the same instant.
pub fn parse_line(line: &str, clock: Wallclock) -> Result<ScriptPacket> {
    // ---
    let (stamp, rest) = split_token(line);
    let time = parse_stamp(stamp)?;
    let (kind, params) = split_token(rest);

    let (channel, payload) = match kind {
        "RTP" => (Channel::Data, rtp::packet_from_description(params)),
        "RTCP" => (
            Channel::Control,
            rtcp::compound_packet(&tree::parse(params), clock)?,
        ),
        other => return Err(ProtocolError::UnknownPacketType(other.to_string()).into()),
    };

    Ok(ScriptPacket {
        time,
        channel,
        payload,
    })
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    const CLOCK: Wallclock = Wallclock { secs: 1, micros: 0 };

    #[test]
    fn frames_simple_lines() {
        // ---
        let mut r = ScriptReader::from_text("0.0 RTP seq=1\n0.1 RTP seq=2\n");
        assert_eq!(r.next_logical().unwrap().as_deref(), Some("0.0 RTP seq=1"));
        assert_eq!(r.next_logical().unwrap().as_deref(), Some("0.1 RTP seq=2"));
        assert_eq!(r.next_logical().unwrap(), None);
    }

    #[test]
    fn skips_comments_and_joins_continuations() {
        // ---
        let text = "# a comment\n0.0 RTCP (SDES\n (src=1 cname=\"x\"))\n# tail\n0.1 RTP seq=9\n";
        let mut r = ScriptReader::from_text(text);
        assert_eq!(
            r.next_logical().unwrap().as_deref(),
            Some("0.0 RTCP (SDES (src=1 cname=\"x\"))")
        );
        assert_eq!(r.next_logical().unwrap().as_deref(), Some("0.1 RTP seq=9"));
        assert_eq!(r.next_logical().unwrap(), None);
    }

    #[test]
    fn last_line_without_newline_is_kept() {
        // ---
        let mut r = ScriptReader::from_text("0.0 RTP seq=1");
        assert_eq!(r.next_logical().unwrap().as_deref(), Some("0.0 RTP seq=1"));
        assert_eq!(r.next_logical().unwrap(), None);
    }

    #[test]
    fn rewind_restarts_from_the_top() {
        // ---
        let mut r = ScriptReader::from_text("0.0 RTP seq=1\n0.1 RTP seq=2\n");
        assert!(r.can_rewind());
        r.next_logical().unwrap();
        r.rewind().unwrap();
        assert_eq!(r.next_logical().unwrap().as_deref(), Some("0.0 RTP seq=1"));
    }

    #[test]
    fn long_logical_lines_are_accepted() {
        // ---
        let payload = "ab".repeat(2000); // 4000 hex chars
        let text = format!("0.0 RTP\n data={payload}\n");
        let mut r = ScriptReader::from_text(text);
        let line = r.next_logical().unwrap().expect("line expected");
        assert!(line.len() > 4000);
        let pkt = parse_line(&line, CLOCK).expect("parse failed");
        // Payload is clamped to the scratch buffer size.
        assert_eq!(pkt.payload.len(), 1500);
    }

    #[test]
    fn dispatches_rtp_and_rtcp() {
        // ---
        let rtp = parse_line("0.020000 RTP pt=0 seq=2 ts=160 ssrc=0xdeadbeef", CLOCK).unwrap();
        assert_eq!(rtp.channel, Channel::Data);
        assert_eq!(rtp.time, Duration::from_micros(20_000));
        assert_eq!(rtp.payload.len(), 12);
        assert_eq!(&rtp.payload[8..], &[0xde, 0xad, 0xbe, 0xef]);

        let rtcp = parse_line("5.000000 RTCP (BYE (ssrc=0xdeadbeef))", CLOCK).unwrap();
        assert_eq!(rtcp.channel, Channel::Control);
        assert_eq!(rtcp.time, Duration::from_secs(5));
        assert_eq!(rtcp.payload[1], 203);
    }

    #[test]
    fn fractional_field_is_plain_microseconds() {
        // ---
        let pkt = parse_line("0.5 RTP seq=3", CLOCK).unwrap();
        assert_eq!(pkt.time, Duration::from_micros(5));
    }

    #[test]
    fn bad_time_and_type_are_protocol_errors() {
        // ---
        let err = parse_line("zero RTP seq=1", CLOCK).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProtocolError>(),
            Some(ProtocolError::BadTime(_))
        ));

        let err = parse_line("0.0 SRTP seq=1", CLOCK).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProtocolError>(),
            Some(ProtocolError::UnknownPacketType(t)) if t == "SRTP"
        ));
    }

    #[test]
    fn rtcp_serializer_errors_carry_through() {
        // ---
        let err = parse_line("0.0 RTCP (XR (ssrc=1))", CLOCK).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProtocolError>(),
            Some(ProtocolError::UnknownRecordType(_))
        ));
    }
}
