//! The pacing loop.
//!
//! One task, one pending packet, one armed deadline. Each tick sends
//! the buffered packet, synthesizes the next line's packet, and arms a
//! one-shot timer at `base_offset + script_time`. The base offset is
//! captured from the first packet, so script times are absolute against
//! that anchor; there is no drift compensation.

use anyhow::{Context, Result};
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::{info, warn};

use rtp_script_common::rtcp::Wallclock;
use rtp_script_common::Metrics;

use crate::network::{Channel, SendStats, UdpPair};
use crate::script::{parse_line, ScriptPacket, ScriptReader};

/// Computes the deadline for a packet stamped `time`.
///
/// The first call pins `(now, time)` as the anchor; later times map to
/// `anchor + (time - anchor_time)`. A deadline already in the past
/// (a non-monotonic script time, or the previous tick overran) resolves
/// to `now` so the packet goes out immediately.
fn schedule(
    anchor: &mut Option<(Instant, Duration)>,
    time: Duration,
    now: Instant,
) -> (Instant, bool) {
    // ---
    let (wall0, time0) = *anchor.get_or_insert((now, time));
    let target = match time.checked_sub(time0) {
        Some(delta) => wall0 + delta,
        None => return (now, true), // earlier than the anchor itself
    };
    if target < now {
        (now, true)
    } else {
        (target, false)
    }
}

/// Owns everything the send loop needs: script source, socket pair,
/// metrics, and the playback options.
pub struct Pacer {
    // ---
    reader: ScriptReader,
    net: UdpPair,
    metrics: Metrics,
    verbose: bool,
    loop_input: bool,
}

impl Pacer {
    // ---
    pub fn new(
        reader: ScriptReader,
        net: UdpPair,
        metrics: Metrics,
        verbose: bool,
        loop_input: bool,
    ) -> Self {
        // ---
        Self {
            reader,
            net,
            metrics,
            verbose,
            loop_input,
        }
    }

    /// Plays the script to completion (or forever with looping).
    ///
    /// Protocol and read failures abort; send failures are logged by
    /// the socket pair and playback continues.
    pub async fn run(mut self) -> Result<SendStats> {
        // ---
        let mut anchor: Option<(Instant, Duration)> = None;
        let mut pending: Option<ScriptPacket> = None;
        let mut deadline = Instant::now();
        // A pass that produced no packets must not rewind again.
        let mut produced_this_pass = false;

        loop {
            sleep_until(deadline).await;

            if let Some(pkt) = pending.take() {
                self.metrics
                    .timer_lag_seconds
                    .observe(deadline.elapsed().as_secs_f64());
                if self.net.send(pkt.channel, &pkt.payload).await {
                    match pkt.channel {
                        Channel::Data => self.metrics.rtp_packets_sent.inc(),
                        Channel::Control => self.metrics.rtcp_packets_sent.inc(),
                    }
                    self.metrics.bytes_sent.inc_by(pkt.payload.len() as u64);
                } else {
                    self.metrics.send_errors.inc();
                }
            }

            let line = match self.reader.next_logical().context("failed to read script")? {
                Some(line) => line,
                None => {
                    if self.loop_input && produced_this_pass {
                        self.reader.rewind().context("failed to rewind script")?;
                        // A fresh pass re-anchors on its first packet.
                        anchor = None;
                        deadline = Instant::now();
                        produced_this_pass = false;
                        self.metrics.script_loops.inc();
                        continue;
                    }
                    break;
                }
            };

            if self.verbose {
                println!("{line}");
            }

            let started = Instant::now();
            let pkt = parse_line(&line, Wallclock::now())?;
            self.metrics
                .packet_build_seconds
                .observe(started.elapsed().as_secs_f64());
            self.metrics.script_lines.inc();
            produced_this_pass = true;

            let now = Instant::now();
            let (next, late) = schedule(&mut anchor, pkt.time, now);
            if late {
                warn!(
                    "script time {}.{:06} is not monotonic, sending immediately",
                    pkt.time.as_secs(),
                    pkt.time.subsec_micros()
                );
                self.metrics.late_packets.inc();
            }
            deadline = next;
            pending = Some(pkt);
        }

        let stats = self.net.stats();
        info!(
            "script finished: {} RTP + {} RTCP packets, {} bytes, {} send errors",
            stats.rtp_packets, stats.rtcp_packets, stats.bytes, stats.errors
        );
        Ok(stats)
    }
}
