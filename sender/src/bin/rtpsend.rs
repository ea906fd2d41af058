//! Script-driven RTP/RTCP sender - CLI binary.
//!
//! Reads a packet script and transmits it over UDP: RTP to the
//! destination port, RTCP to port+1, paced by the script timestamps.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{error, info, warn};

use rtp_script_common::{init_tracing, ColorWhen, Metrics, ProtocolError};
use sender::{Pacer, ScriptReader, Target, UdpPair};

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
enum ColorArg {
    Auto,
    Always,
    Never,
}

impl From<ColorArg> for ColorWhen {
    fn from(v: ColorArg) -> Self {
        match v {
            ColorArg::Auto => ColorWhen::Auto,
            ColorArg::Always => ColorWhen::Always,
            ColorArg::Never => ColorWhen::Never,
        }
    }
}

/// rtpsend - replay scripted RTP/RTCP packets over UDP
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    // ---
    /// Script file to play
    #[arg(
        short = 'f',
        long = "file",
        help = "Script file to play (default: standard input)",
        long_help = "Path to the packet script to play.\n\n\
                     Without this option the script is read from standard\n\
                     input, in which case looping is unavailable."
    )]
    file: Option<PathBuf>,

    #[arg(
        short = 'l',
        long = "loop",
        help = "Rewind the script at end of file",
        long_help = "Replay the script continuously.\n\n\
                     At end of file the script rewinds and the first line\n\
                     anchors a fresh playback clock. Requires -f."
    )]
    loop_file: bool,

    /// Local source port for the data socket
    #[arg(
        short = 's',
        long = "source-port",
        help = "Bind local ports PORT (data) and PORT+1 (control)",
        long_help = "Bind the sockets to fixed local source ports.\n\n\
                     The data socket binds PORT, the control socket PORT+1.\n\
                     Without this option the kernel picks ephemeral ports."
    )]
    source_port: Option<u16>,

    #[arg(
        short = 'a',
        long = "router-alert",
        help = "Set the IP router-alert option on both sockets"
    )]
    router_alert: bool,

    #[arg(
        short = 'v',
        long = "verbose",
        help = "Echo each script line to stdout before sending"
    )]
    verbose: bool,

    /// Coloring
    #[arg(
        long,
        value_enum,
        default_value_t = ColorArg::Auto,
        help = "Coloring",
        long_help = "Controls colored log output.\n\n\
                     auto: Enable colors when stderr is a TTY and NO_COLOR is unset.\n\
                     always: Always enable colors.\n\
                     never: Disable colors."
    )]
    color: ColorArg,

    /// Prometheus metrics bind address (serves `GET /metrics`).
    #[arg(
        long,
        help = "Prometheus metrics bind address (disabled unless set)",
        long_help = "Bind address for the Prometheus metrics endpoint,\n\
                     e.g. 127.0.0.1:9100. Metrics are exposed via HTTP at\n\
                     GET /metrics. The endpoint is off unless this is set."
    )]
    metrics_bind: Option<SocketAddr>,

    /// Destination
    #[arg(
        help = "Destination as host/port[/ttl]",
        long_help = "Where to send the packets, as host/port[/ttl].\n\n\
                     RTP data goes to the given port, RTCP control to port+1.\n\
                     The TTL applies to multicast destinations (default 16).\n\
                     A host resolving to the unspecified address means localhost."
    )]
    destination: String,
}

/// Capture version number from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    // ---
    let args = Args::parse();

    if let Err(err) = init_tracing(args.color.into()) {
        eprintln!("failed to initialize logging: {err:#}");
        std::process::exit(1);
    }

    if let Err(err) = run(args).await {
        error!("{err:#}");
        // Protocol defects in the script are distinguished from setup
        // and IO failures in the exit status.
        let code = if err.downcast_ref::<ProtocolError>().is_some() {
            2
        } else {
            1
        };
        std::process::exit(code);
    }
}

async fn run(args: Args) -> Result<()> {
    // ---
    info!("Starting rtpsend v{VERSION}");

    let target = Target::parse(&args.destination)?;
    info!(
        "Destination: {} port {} (control port {}), ttl {}",
        target.host,
        target.port,
        target.port.wrapping_add(1),
        target.ttl
    );

    let reader = match &args.file {
        Some(path) => {
            info!("Script file: {}", path.display());
            ScriptReader::open(path)?
        }
        None => {
            info!("Reading script from standard input");
            ScriptReader::stdin()
        }
    };
    let loop_file = if args.loop_file && !reader.can_rewind() {
        warn!("looping is disabled when the script comes from standard input");
        false
    } else {
        args.loop_file
    };

    let metrics = Metrics::new().context("failed to set up metrics")?;
    let _scrape = args.metrics_bind.map(|bind| {
        info!("Metrics endpoint: http://{bind}/metrics");
        metrics.serve(bind)
    });

    let net = UdpPair::connect(&target, args.source_port, args.router_alert)
        .await
        .context("socket setup failed")?;

    let stats = Pacer::new(reader, net, metrics, args.verbose, loop_file)
        .run()
        .await?;

    info!(
        "Transmission complete: {} packets, {} bytes",
        stats.rtp_packets + stats.rtcp_packets,
        stats.bytes
    );
    Ok(())
}
