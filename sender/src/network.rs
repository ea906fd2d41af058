//! UDP egress: the data/control socket pair.
//!
//! RTP data goes to the destination port, RTCP control to port+1, each
//! on its own connected socket. Sockets are built with `socket2` so
//! options (source port, multicast TTL, router alert) are applied
//! before handing them to tokio. Send failures are logged and counted
//! but never stop the run.

use anyhow::{bail, Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::UdpSocket;
use tracing::{debug, error, warn};

/// Default TTL for multicast destinations.
pub const DEFAULT_TTL: u32 = 16;

/// Which socket of the pair a packet belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// RTP media, destination port.
    Data,
    /// RTCP control, destination port + 1.
    Control,
}

impl Channel {
    // ---
    pub fn label(self) -> &'static str {
        match self {
            Channel::Data => "RTP",
            Channel::Control => "RTCP",
        }
    }
}

/// Parsed `host/port[/ttl]` destination argument.
#[derive(Debug, Clone)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub ttl: u32,
}

impl Target {
    // ---
    /// Parses the CLI destination spec. TTL defaults to [`DEFAULT_TTL`]
    /// and only matters for multicast destinations.
    pub fn parse(spec: &str) -> Result<Self> {
        // ---
        let mut fields = spec.split('/');
        let host = fields
            .next()
            .filter(|h| !h.is_empty())
            .with_context(|| format!("missing host in destination {spec:?}"))?;
        let port = fields
            .next()
            .with_context(|| format!("missing port in destination {spec:?} (expected host/port[/ttl])"))?
            .parse::<u16>()
            .with_context(|| format!("invalid port in destination {spec:?}"))?;
        let ttl = match fields.next() {
            Some(t) => t
                .parse::<u32>()
                .with_context(|| format!("invalid ttl in destination {spec:?}"))?,
            None => DEFAULT_TTL,
        };
        if fields.next().is_some() {
            bail!("too many fields in destination {spec:?} (expected host/port[/ttl])");
        }
        Ok(Self {
            host: host.to_string(),
            port,
            ttl,
        })
    }

    /// Resolves the host to the data-channel address.
    ///
    /// An unspecified address (`0.0.0.0`, `::`) means "this host" in
    /// scripts, so it is rewritten to loopback.
    pub async fn resolve(&self) -> Result<SocketAddr> {
        // ---
        let mut addr = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .with_context(|| format!("cannot resolve host {:?}", self.host))?
            .next()
            .with_context(|| format!("host {:?} has no addresses", self.host))?;

        if addr.ip().is_unspecified() {
            addr.set_ip(match addr.ip() {
                IpAddr::V4(_) => Ipv4Addr::LOCALHOST.into(),
                IpAddr::V6(_) => Ipv6Addr::LOCALHOST.into(),
            });
        }
        Ok(addr)
    }
}

/// Running totals kept by the pair, reported when the script ends.
#[derive(Debug, Default, Clone, Copy)]
pub struct SendStats {
    pub rtp_packets: u64,
    pub rtcp_packets: u64,
    pub bytes: u64,
    pub errors: u64,
}

/// The connected data/control socket pair.
pub struct UdpPair {
    // ---
    data: UdpSocket,
    control: UdpSocket,
    stats: SendStats,
}

impl UdpPair {
    // ---
    /// Resolves the target and connects both sockets, applying source
    /// ports, multicast TTL, and the router-alert option as requested.
    pub async fn connect(
        target: &Target,
        source_port: Option<u16>,
        router_alert: bool,
    ) -> Result<Self> {
        // ---
        let data_addr = target.resolve().await?;
        let control_port = data_addr
            .port()
            .checked_add(1)
            .context("destination port leaves no room for the control port")?;
        let mut control_addr = data_addr;
        control_addr.set_port(control_port);

        let control_source = match source_port {
            Some(p) => Some(
                p.checked_add(1)
                    .context("source port leaves no room for the control port")?,
            ),
            None => None,
        };

        let data = open_socket(data_addr, source_port, target.ttl, router_alert)?;
        let control = open_socket(control_addr, control_source, target.ttl, router_alert)?;

        debug!(
            "connected data -> {data_addr}, control -> {control_addr}"
        );
        Ok(Self {
            data,
            control,
            stats: SendStats::default(),
        })
    }

    /// Sends one packet on the channel's socket.
    ///
    /// Returns whether the datagram was handed to the kernel; failures
    /// are logged and counted, and the caller keeps going either way.
    pub async fn send(&mut self, channel: Channel, payload: &[u8]) -> bool {
        // ---
        let socket = match channel {
            Channel::Data => &self.data,
            Channel::Control => &self.control,
        };
        match socket.send(payload).await {
            Ok(n) => {
                match channel {
                    Channel::Data => self.stats.rtp_packets += 1,
                    Channel::Control => self.stats.rtcp_packets += 1,
                }
                self.stats.bytes += n as u64;
                true
            }
            Err(e) => {
                self.stats.errors += 1;
                error!("failed to send {} packet: {e}", channel.label());
                false
            }
        }
    }

    pub fn stats(&self) -> SendStats {
        // ---
        self.stats
    }
}

fn open_socket(
    dest: SocketAddr,
    source_port: Option<u16>,
    ttl: u32,
    router_alert: bool,
) -> Result<UdpSocket> {
    // ---
    let domain = match dest {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
        .context("failed to create UDP socket")?;
    socket.set_reuse_address(true)?;

    let bind_ip: IpAddr = match dest {
        SocketAddr::V4(_) => Ipv4Addr::UNSPECIFIED.into(),
        SocketAddr::V6(_) => Ipv6Addr::UNSPECIFIED.into(),
    };
    let bind: SocketAddr = (bind_ip, source_port.unwrap_or(0)).into();
    socket
        .bind(&bind.into())
        .with_context(|| format!("failed to bind local address {bind}"))?;

    if dest.ip().is_multicast() {
        match dest {
            SocketAddr::V4(_) => socket.set_multicast_ttl_v4(ttl),
            SocketAddr::V6(_) => socket.set_multicast_hops_v6(ttl),
        }
        .context("failed to set multicast TTL")?;
    }

    if router_alert {
        set_router_alert(&socket);
    }

    socket
        .set_nonblocking(true)
        .context("failed to set socket non-blocking")?;
    socket
        .connect(&dest.into())
        .with_context(|| format!("failed to connect to {dest}"))?;

    UdpSocket::from_std(socket.into()).context("failed to register socket with tokio")
}

/// RFC 2113 router alert, best effort: receivers that punt it to the
/// slow path are exactly what `-a` probes for, but a refusal from the
/// kernel should not kill the run.
#[cfg(unix)]
fn set_router_alert(socket: &Socket) {
    // ---
    use std::os::fd::AsRawFd;

    const ROUTER_ALERT: [u8; 4] = [0x94, 0x04, 0x00, 0x00];
    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::IPPROTO_IP,
            libc::IP_OPTIONS,
            ROUTER_ALERT.as_ptr().cast(),
            ROUTER_ALERT.len() as libc::socklen_t,
        )
    };
    if rc != 0 {
        warn!(
            "router alert option not set: {}",
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn set_router_alert(_socket: &Socket) {
    // ---
    warn!("router alert option is not supported on this platform");
}
