use std::{
    fmt, io,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs as _, UdpSocket},
    sync::Arc,
    time::{Duration, Instant},
};

use tracing::debug;

use crate::{completion::SendError, telemetry::Telemetry};

/// A connectionless socket that payloads can be written to.
///
/// This is the seam used to inject a socket shared with other parts of the application. The client only ever calls
/// [`send_to`][DatagramSocket::send_to] on a shared socket: it never rebinds or closes it, since the socket belongs to
/// whoever injected it.
pub trait DatagramSocket: Send + Sync {
    /// Sends `buf` to `addr`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns any local error raised while sending, such as the payload being too large for a datagram.
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize>;
}

impl DatagramSocket for UdpSocket {
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, addr)
    }
}

/// Resolves a host name to a socket address.
pub trait Resolver: Send + Sync {
    /// Resolves `host` and `port` to a single socket address.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot be resolved.
    fn resolve(&self, host: &str, port: u16) -> io::Result<SocketAddr>;
}

/// Resolver backed by the operating system's name resolution.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn resolve(&self, host: &str, port: u16) -> io::Result<SocketAddr> {
        (host, port).to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "no addresses returned for host")
        })
    }
}

/// Destination of the payloads.
///
/// When the address is cached, resolution already happened once, at build time. Otherwise the host is resolved
/// each time a payload is written, unless it is an IP address literal.
#[derive(Clone)]
pub(crate) struct RemoteAddr {
    host: String,
    port: u16,
    resolver: Arc<dyn Resolver>,
    cached: Option<SocketAddr>,
}

impl RemoteAddr {
    pub fn new(host: String, port: u16, resolver: Arc<dyn Resolver>) -> Self {
        let cached = host.parse::<IpAddr>().ok().map(|ip| SocketAddr::new(ip, port));
        Self { host, port, resolver, cached }
    }

    /// Resolves the host once and caches the result for the lifetime of the client.
    pub fn resolve_eagerly(mut self) -> io::Result<Self> {
        if self.cached.is_none() {
            self.cached = Some(self.resolver.resolve(&self.host, self.port)?);
        }
        Ok(self)
    }

    /// Returns the socket address to write to.
    pub fn socket_addr(&self) -> Result<SocketAddr, SendError> {
        match self.cached {
            Some(addr) => Ok(addr),
            None => self.resolver.resolve(&self.host, self.port).map_err(|e| SendError::Resolve {
                host: self.host.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

impl fmt::Debug for RemoteAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteAddr")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("cached", &self.cached)
            .finish_non_exhaustive()
    }
}

enum SocketState {
    // Caller-owned socket, used for the whole lifetime of the client.
    Shared(Arc<dyn DatagramSocket>),

    // No private socket is open.
    Closed,

    // Private socket, open until `idle_deadline` passes without a write.
    Open { socket: UdpSocket, idle_deadline: Instant },
}

/// Owns the outbound socket and writes payloads to it.
///
/// Private sockets are created on demand and torn down after going idle, which bounds how long a file descriptor is
/// held by a client that only sends sporadically. The next write transparently creates a new socket. A failed write
/// also discards the private socket.
///
/// Failures are returned to the caller as-is: the transport does not log or retry them.
pub(crate) struct Transport {
    remote_addr: RemoteAddr,
    state: SocketState,
    idle_timeout: Duration,
    write_timeout: Duration,
    telemetry: Arc<Telemetry>,
}

impl Transport {
    pub fn new(
        remote_addr: RemoteAddr,
        shared_socket: Option<Arc<dyn DatagramSocket>>,
        idle_timeout: Duration,
        write_timeout: Duration,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        let state = match shared_socket {
            Some(socket) => SocketState::Shared(socket),
            None => SocketState::Closed,
        };

        Self { remote_addr, state, idle_timeout, write_timeout, telemetry }
    }

    /// Returns `true` if a private socket is currently open.
    pub fn is_open(&self) -> bool {
        matches!(self.state, SocketState::Open { .. })
    }

    /// Returns the local address of the private socket, if one is open.
    #[cfg(test)]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.state {
            SocketState::Open { socket, .. } => socket.local_addr().ok(),
            _ => None,
        }
    }

    /// Returns the instant at which the private socket will be considered idle, if one is open.
    pub fn idle_deadline(&self) -> Option<Instant> {
        match self.state {
            SocketState::Open { idle_deadline, .. } => Some(idle_deadline),
            _ => None,
        }
    }

    /// Closes the private socket if it has been idle past its deadline.
    pub fn expire_idle(&mut self, now: Instant) {
        if self.idle_deadline().is_some_and(|deadline| deadline <= now) {
            debug!(idle_timeout = ?self.idle_timeout, "Closing idle socket.");
            self.close();
        }
    }

    /// Writes the payload as a single datagram, returning the number of bytes written.
    pub fn send(&mut self, payload: &[u8]) -> Result<usize, SendError> {
        let result = self.try_send(payload);
        match &result {
            Ok(written) => self.telemetry.track_packet_send_succeeded(*written),
            Err(_) => {
                self.telemetry.track_packet_send_failed(payload.len());
                self.close();
            }
        }

        result
    }

    fn try_send(&mut self, payload: &[u8]) -> Result<usize, SendError> {
        let addr = self.remote_addr.socket_addr()?;
        match &mut self.state {
            SocketState::Shared(socket) => Ok(socket.send_to(payload, addr)?),
            SocketState::Open { socket, idle_deadline } => {
                *idle_deadline = Instant::now() + self.idle_timeout;
                Ok(socket.send_to(payload, addr)?)
            }
            SocketState::Closed => {
                let socket = bind_private_socket(addr, self.write_timeout)?;
                self.telemetry.track_socket_opened();
                debug!(local_addr = ?socket.local_addr().ok(), remote_addr = %addr, "Opened socket.");

                let written = socket.send_to(payload, addr);
                self.state = SocketState::Open { socket, idle_deadline: Instant::now() + self.idle_timeout };
                Ok(written?)
            }
        }
    }

    /// Releases the private socket, if any.
    ///
    /// A shared socket is left untouched.
    pub fn close(&mut self) {
        if let SocketState::Open { .. } = self.state {
            self.state = SocketState::Closed;
            self.telemetry.track_socket_closed();
        }
    }
}

fn bind_private_socket(remote: SocketAddr, write_timeout: Duration) -> io::Result<UdpSocket> {
    let local: SocketAddr = match remote {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };

    let socket = UdpSocket::bind(local)?;
    socket.set_write_timeout(Some(write_timeout))?;
    Ok(socket)
}
