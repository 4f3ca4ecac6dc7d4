//! OS socket layer: descriptors, opening sockets for a provider and the
//! reserved-port bind walk.
//!
//! The provisioner only talks to the [`Descriptor`] and [`SocketOpener`]
//! traits. [`SystemSockets`] and [`SystemDescriptor`] implement them on top
//! of `socket2`. Closing a descriptor is dropping it.

use std::fmt;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::process;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tracing::trace;

use crate::error::{Result, SvcError};
use crate::netconfig::{ProviderDescriptor, SocketType, NC_INET, NC_INET6, NC_LOOPBACK, NC_TCP, NC_UDP};

/// First port tried by the reserved-port walk.
pub const RESERVED_PORT_START: u16 = 600;
/// Lowest port of the fallback range below [`RESERVED_PORT_START`].
pub const RESERVED_PORT_LOW: u16 = 512;
/// Highest privileged port.
pub const RESERVED_PORT_END: u16 = 1023;

/// Address family of a socket.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    Inet,
    Inet6,
    Local,
}

impl AddressFamily {
    /// Wildcard address with port 0; `None` for local sockets, which
    /// have no anonymous address.
    pub fn wildcard(self) -> Option<SocketAddr> {
        match self {
            AddressFamily::Inet => Some(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))),
            AddressFamily::Inet6 => Some(SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))),
            AddressFamily::Local => None,
        }
    }
}

/// Transport protocol carried by a socket.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TransportProtocol {
    Tcp,
    Udp,
    Other,
}

/// Socket metadata needed to bind and classify an endpoint.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SocketInfo {
    pub family: AddressFamily,
    pub socktype: SocketType,
    pub protocol: TransportProtocol,
}

impl SocketInfo {
    /// Metadata implied by a provider entry, used for descriptors opened
    /// from that entry.
    pub fn from_provider(provider: &ProviderDescriptor) -> Result<SocketInfo> {
        let family = match provider.protofmly.as_str() {
            NC_INET => AddressFamily::Inet,
            NC_INET6 => AddressFamily::Inet6,
            NC_LOOPBACK => AddressFamily::Local,
            other => {
                return Err(SvcError::Configuration(format!(
                    "{}: unknown protocol family {other:?}",
                    provider.netid
                )))
            }
        };
        let protocol = match provider.proto.as_str() {
            NC_TCP => TransportProtocol::Tcp,
            NC_UDP => TransportProtocol::Udp,
            _ => TransportProtocol::Other,
        };
        Ok(SocketInfo { family, socktype: provider.socket_type(), protocol })
    }
}

/// An open transport descriptor.
pub trait Descriptor: fmt::Debug + Send + Sync {
    /// Queries family, socket type and protocol from the OS.
    fn socket_info(&self) -> io::Result<SocketInfo>;

    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// Remote address; fails when the descriptor has no connected peer.
    fn peer_addr(&self) -> io::Result<SocketAddr>;

    fn bind(&self, addr: &SocketAddr) -> io::Result<()>;

    fn listen(&self, backlog: i32) -> io::Result<()>;

    /// Local address in any family, including unix paths.
    fn local_sockaddr(&self) -> io::Result<SockAddr> {
        self.local_addr().map(SockAddr::from)
    }

    /// Peer address in any family; fails without a connected peer.
    fn peer_sockaddr(&self) -> io::Result<SockAddr> {
        self.peer_addr().map(SockAddr::from)
    }

    /// Whether a local address has been assigned.
    fn is_bound(&self) -> bool {
        self.local_addr().map(|addr| addr.port() != 0).unwrap_or(false)
    }

    /// Whether the descriptor is an accepted, connected stream.
    fn has_peer(&self) -> bool {
        self.peer_sockaddr().is_ok()
    }

    /// The underlying OS socket, when there is one.
    fn as_socket(&self) -> Option<&Socket> {
        None
    }
}

/// Opens a fresh descriptor for a provider.
pub trait SocketOpener: Send + Sync {
    fn open(&self, provider: &ProviderDescriptor) -> io::Result<Box<dyn Descriptor>>;
}

/// [`Descriptor`] backed by an OS socket.
#[derive(Debug)]
pub struct SystemDescriptor {
    socket: Socket,
}

impl SystemDescriptor {
    pub fn new(socket: Socket) -> Self {
        SystemDescriptor { socket }
    }

    pub fn into_socket(self) -> Socket {
        self.socket
    }
}

impl From<Socket> for SystemDescriptor {
    fn from(socket: Socket) -> Self {
        SystemDescriptor::new(socket)
    }
}

fn unsupported(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, msg)
}

impl Descriptor for SystemDescriptor {
    fn socket_info(&self) -> io::Result<SocketInfo> {
        let socktype = match self.socket.r#type()? {
            Type::STREAM => SocketType::Stream,
            Type::DGRAM => SocketType::Datagram,
            Type::RAW => SocketType::Raw,
            other => return Err(unsupported(format!("socket type {other:?}"))),
        };
        let family = match self.socket.local_addr()?.domain() {
            Domain::IPV4 => AddressFamily::Inet,
            Domain::IPV6 => AddressFamily::Inet6,
            #[cfg(unix)]
            Domain::UNIX => AddressFamily::Local,
            other => return Err(unsupported(format!("address family {other:?}"))),
        };
        let protocol = match (family, socktype) {
            (AddressFamily::Local, _) => TransportProtocol::Other,
            (_, SocketType::Stream) => TransportProtocol::Tcp,
            (_, SocketType::Datagram) => TransportProtocol::Udp,
            (_, SocketType::Raw) => TransportProtocol::Other,
        };
        Ok(SocketInfo { family, socktype, protocol })
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket
            .local_addr()?
            .as_socket()
            .ok_or_else(|| unsupported("local address is not an IP address".to_string()))
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.socket
            .peer_addr()?
            .as_socket()
            .ok_or_else(|| unsupported("peer address is not an IP address".to_string()))
    }

    fn bind(&self, addr: &SocketAddr) -> io::Result<()> {
        self.socket.bind(&(*addr).into())
    }

    fn listen(&self, backlog: i32) -> io::Result<()> {
        self.socket.listen(backlog)
    }

    fn local_sockaddr(&self) -> io::Result<SockAddr> {
        self.socket.local_addr()
    }

    fn peer_sockaddr(&self) -> io::Result<SockAddr> {
        self.socket.peer_addr()
    }

    fn has_peer(&self) -> bool {
        self.socket.peer_addr().is_ok()
    }

    fn is_bound(&self) -> bool {
        match self.socket.local_addr() {
            Ok(addr) => match addr.as_socket() {
                Some(addr) => addr.port() != 0,
                // An unnamed local socket address holds only the family field.
                None => addr.len() as usize > std::mem::size_of::<u16>(),
            },
            Err(_) => false,
        }
    }

    fn as_socket(&self) -> Option<&Socket> {
        Some(&self.socket)
    }
}

/// Opens OS sockets for `inet` and `inet6` providers.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemSockets;

impl SocketOpener for SystemSockets {
    fn open(&self, provider: &ProviderDescriptor) -> io::Result<Box<dyn Descriptor>> {
        let domain = match provider.protofmly.as_str() {
            NC_INET => Domain::IPV4,
            NC_INET6 => Domain::IPV6,
            other => return Err(unsupported(format!("protocol family {other:?}"))),
        };
        let ty = match provider.socket_type() {
            SocketType::Stream => Type::STREAM,
            SocketType::Datagram => Type::DGRAM,
            SocketType::Raw => return Err(unsupported("raw sockets".to_string())),
        };
        let protocol = match provider.proto.as_str() {
            NC_TCP => Some(Protocol::TCP),
            NC_UDP => Some(Protocol::UDP),
            "" => None,
            other => return Err(unsupported(format!("protocol {other:?}"))),
        };
        let socket = Socket::new(domain, ty, protocol)?;
        if domain == Domain::IPV6 {
            socket.set_only_v6(true)?;
        }
        trace!("opened {:?} for {}", socket, provider.netid);
        Ok(Box::new(SystemDescriptor::new(socket)))
    }
}

/// Candidate privileged ports: the 600..=1023 range starting at an offset
/// derived from `seed`, then the 512..600 range.
pub fn reserved_port_candidates(seed: u32) -> impl Iterator<Item = u16> {
    let upper = u32::from(RESERVED_PORT_END - RESERVED_PORT_START + 1);
    let lower = u32::from(RESERVED_PORT_START - RESERVED_PORT_LOW);
    let first = seed % upper;
    let second = seed % lower;
    let upper_ports =
        (0..upper).map(move |i| RESERVED_PORT_START + ((first + i) % upper) as u16);
    let lower_ports = (0..lower).map(move |i| RESERVED_PORT_LOW + ((second + i) % lower) as u16);
    upper_ports.chain(lower_ports)
}

/// Binds `descriptor` to a privileged port on the wildcard address.
///
/// Ports already in use are skipped; any other bind error (typically
/// missing privileges) ends the walk immediately.
pub fn bind_reserved(descriptor: &dyn Descriptor, family: AddressFamily) -> io::Result<()> {
    let Some(wildcard) = family.wildcard() else {
        return Err(unsupported(format!("no reserved ports for {family:?}")));
    };
    let mut last_err = io::Error::from(io::ErrorKind::AddrInUse);
    for port in reserved_port_candidates(process::id()) {
        let mut addr = wildcard;
        addr.set_port(port);
        match descriptor.bind(&addr) {
            Ok(()) => {
                trace!("bound reserved port {}", port);
                return Ok(());
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => last_err = e,
            Err(e) => return Err(e),
        }
    }
    Err(last_err)
}
