//! Prometheus metrics (Rust `prometheus` crate).
//!
//! One `Metrics` per process. The pacer hot path only increments
//! counters and observes histograms; the scrape endpoint is opt-in.

use anyhow::Result;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Prometheus registry plus handles for everything the sender reports.
#[derive(Clone)]
pub struct Metrics {
    // ---
    registry: Registry,

    // Egress counters
    pub rtp_packets_sent: IntCounter,
    pub rtcp_packets_sent: IntCounter,
    pub bytes_sent: IntCounter,
    pub send_errors: IntCounter,

    // Script progress
    pub script_lines: IntCounter,
    pub script_loops: IntCounter,
    pub late_packets: IntCounter,

    // Latency histograms (seconds)
    pub packet_build_seconds: Histogram,
    pub timer_lag_seconds: Histogram,
}

impl Metrics {
    // ---
    /// Create a registry and register the standard metrics under the
    /// `rtpsend` namespace.
    pub fn new() -> Result<Self> {
        // ---
        let registry = Registry::new_custom(Some("rtpsend".into()), None)?;

        let rtp_packets_sent = IntCounter::with_opts(Opts::new(
            "rtp_packets_sent_total",
            "RTP packets sent on the data socket",
        ))?;
        let rtcp_packets_sent = IntCounter::with_opts(Opts::new(
            "rtcp_packets_sent_total",
            "RTCP compound packets sent on the control socket",
        ))?;
        let bytes_sent = IntCounter::with_opts(Opts::new(
            "bytes_sent_total",
            "Total UDP payload bytes sent on both sockets",
        ))?;
        let send_errors = IntCounter::with_opts(Opts::new(
            "send_errors_total",
            "UDP send failures (logged and skipped)",
        ))?;

        let script_lines = IntCounter::with_opts(Opts::new(
            "script_lines_total",
            "Logical script lines turned into packets",
        ))?;
        let script_loops = IntCounter::with_opts(Opts::new(
            "script_loops_total",
            "Times the script file was rewound",
        ))?;
        let late_packets = IntCounter::with_opts(Opts::new(
            "late_packets_total",
            "Packets whose script time was already in the past",
        ))?;

        let packet_build_seconds = Histogram::with_opts(HistogramOpts::new(
            "packet_build_seconds",
            "Time to parse a script line and serialize its packet",
        ))?;
        let timer_lag_seconds = Histogram::with_opts(HistogramOpts::new(
            "timer_lag_seconds",
            "How far behind its deadline each transmission fired",
        ))?;

        registry.register(Box::new(rtp_packets_sent.clone()))?;
        registry.register(Box::new(rtcp_packets_sent.clone()))?;
        registry.register(Box::new(bytes_sent.clone()))?;
        registry.register(Box::new(send_errors.clone()))?;
        registry.register(Box::new(script_lines.clone()))?;
        registry.register(Box::new(script_loops.clone()))?;
        registry.register(Box::new(late_packets.clone()))?;
        registry.register(Box::new(packet_build_seconds.clone()))?;
        registry.register(Box::new(timer_lag_seconds.clone()))?;

        Ok(Self {
            registry,
            rtp_packets_sent,
            rtcp_packets_sent,
            bytes_sent,
            send_errors,
            script_lines,
            script_loops,
            late_packets,
            packet_build_seconds,
            timer_lag_seconds,
        })
    }

    /// Gather metric families from this registry.
    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        // ---
        self.registry.gather()
    }

    /// Spawns a minimal HTTP server answering `GET /metrics` on `bind`.
    pub fn serve(&self, bind: SocketAddr) -> JoinHandle<Result<()>> {
        // ---
        let registry = Arc::new(self.registry.clone());
        tokio::spawn(async move {
            // ---
            let make_svc = make_service_fn(move |_conn| {
                let registry = Arc::clone(&registry);
                async move {
                    Ok::<_, hyper::Error>(service_fn(move |req| {
                        let registry = Arc::clone(&registry);
                        async move { scrape(req, registry).await }
                    }))
                }
            });

            Server::bind(&bind)
                .serve(make_svc)
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
            Ok(())
        })
    }
}

async fn scrape(
    req: Request<Body>,
    registry: Arc<Registry>,
) -> Result<Response<Body>, hyper::Error> {
    if (req.method(), req.uri().path()) != (&Method::GET, "/metrics") {
        let mut resp = Response::new(Body::from("not found"));
        *resp.status_mut() = StatusCode::NOT_FOUND;
        return Ok(resp);
    }

    let mut buffer = Vec::new();
    match TextEncoder::new().encode(&registry.gather(), &mut buffer) {
        Ok(()) => {
            let mut resp = Response::new(Body::from(buffer));
            resp.headers_mut().insert(
                hyper::header::CONTENT_TYPE,
                hyper::header::HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            Ok(resp)
        }
        Err(e) => {
            let mut resp = Response::new(Body::from(format!("encode error: {e}")));
            *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            Ok(resp)
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn metrics_register_and_gather() {
        // ---
        let metrics = Metrics::new().expect("Metrics should init");
        metrics.rtp_packets_sent.inc();
        metrics.bytes_sent.inc_by(12);

        let families = metrics.gather();
        assert!(!families.is_empty());
        assert!(families
            .iter()
            .any(|f| f.get_name() == "rtpsend_rtp_packets_sent_total"));
    }
}
