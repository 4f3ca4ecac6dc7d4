//! Transport handles and the protocol-specific constructors that classify
//! a bound descriptor as a connected stream, a listener or a datagram
//! endpoint.

use std::net::SocketAddr;

use socket2::SockAddr;
use tracing::debug;

use crate::error::{Result, SvcError};
use crate::netconfig::Semantics;
use crate::socket::{Descriptor, SocketInfo, TransportProtocol};

/// Default buffer size for TCP transports.
pub const TCP_DEFAULT_SIZE: u32 = 64 * 1024;
/// Default buffer size for UDP transports.
pub const UDP_MSG_SIZE: u32 = 8800;
/// Default buffer size for any other transport.
pub const RPC_MAX_DATA_SIZE: u32 = 9000;
/// Upper bound applied to explicit size hints.
pub const MAX_TRANSPORT_SIZE: u32 = 256 * 1024;

/// Resolves a send or receive size hint for `protocol`: 0 selects the
/// protocol default, anything else is capped at [`MAX_TRANSPORT_SIZE`].
pub fn transport_size(protocol: TransportProtocol, hint: u32) -> u32 {
    if hint == 0 {
        return match protocol {
            TransportProtocol::Tcp => TCP_DEFAULT_SIZE,
            TransportProtocol::Udp => UDP_MSG_SIZE,
            TransportProtocol::Other => RPC_MAX_DATA_SIZE,
        };
    }
    hint.min(MAX_TRANSPORT_SIZE)
}

fn round_up4(size: u32) -> u32 {
    size.div_ceil(4) * 4
}

/// Caller supplied buffer size hints, 0 meaning "transport default".
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SizeHints {
    pub send: u32,
    pub recv: u32,
}

impl SizeHints {
    pub fn new(send: u32, recv: u32) -> Self {
        SizeHints { send, recv }
    }
}

/// What a constructor made of a descriptor.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransportKind {
    /// An accepted stream with a remote peer
    Connected,
    /// A stream socket accepting connections
    Listening,
    /// A connectionless endpoint
    Datagram,
}

/// Protocol specific part of a transport, produced by a constructor.
/// Addresses may be in any family, unix paths included.
#[derive(Clone, Debug)]
pub struct TransportParts {
    pub kind: TransportKind,
    pub local: Option<SockAddr>,
    /// Set for connected transports only
    pub peer: Option<SockAddr>,
    pub send_size: u32,
    pub recv_size: u32,
}

/// Protocol-specific transport constructors. They borrow the descriptor;
/// ownership stays with the provisioner until a handle is assembled.
pub trait TransportConstructors: Send + Sync {
    /// Transport for an already accepted, connected stream.
    fn connected(
        &self,
        descriptor: &dyn Descriptor,
        info: &SocketInfo,
        sizes: SizeHints,
    ) -> Result<TransportParts>;

    /// Transport for a listening stream socket.
    fn listening(
        &self,
        descriptor: &dyn Descriptor,
        info: &SocketInfo,
        sizes: SizeHints,
    ) -> Result<TransportParts>;

    /// Transport for a datagram socket.
    fn datagram(
        &self,
        descriptor: &dyn Descriptor,
        info: &SocketInfo,
        sizes: SizeHints,
    ) -> Result<TransportParts>;
}

/// Constructors resolving sizes the way ONC RPC servers traditionally do.
#[derive(Clone, Copy, Debug, Default)]
pub struct StandardTransports;

impl TransportConstructors for StandardTransports {
    fn connected(
        &self,
        descriptor: &dyn Descriptor,
        info: &SocketInfo,
        sizes: SizeHints,
    ) -> Result<TransportParts> {
        let peer = descriptor
            .peer_sockaddr()
            .map_err(|e| SvcError::resource("connected transport: cannot get peer address", e))?;
        Ok(TransportParts {
            kind: TransportKind::Connected,
            local: descriptor.local_sockaddr().ok(),
            peer: Some(peer),
            send_size: transport_size(info.protocol, sizes.send),
            recv_size: transport_size(info.protocol, sizes.recv),
        })
    }

    fn listening(
        &self,
        descriptor: &dyn Descriptor,
        info: &SocketInfo,
        sizes: SizeHints,
    ) -> Result<TransportParts> {
        let local = descriptor
            .local_sockaddr()
            .map_err(|e| SvcError::resource("listening transport: cannot get local address", e))?;
        Ok(TransportParts {
            kind: TransportKind::Listening,
            local: Some(local),
            peer: None,
            send_size: transport_size(info.protocol, sizes.send),
            recv_size: transport_size(info.protocol, sizes.recv),
        })
    }

    fn datagram(
        &self,
        descriptor: &dyn Descriptor,
        info: &SocketInfo,
        sizes: SizeHints,
    ) -> Result<TransportParts> {
        let local = descriptor
            .local_sockaddr()
            .map_err(|e| SvcError::resource("datagram transport: cannot get local address", e))?;
        Ok(TransportParts {
            kind: TransportKind::Datagram,
            local: Some(local),
            peer: None,
            send_size: round_up4(transport_size(info.protocol, sizes.send)),
            recv_size: round_up4(transport_size(info.protocol, sizes.recv)),
        })
    }
}

/// One provisioned RPC endpoint.
#[derive(Debug)]
pub struct TransportHandle {
    descriptor: Box<dyn Descriptor>,
    opened_here: bool,
    semantics: Semantics,
    parts: TransportParts,
    netid: Option<String>,
    device: Option<String>,
}

impl TransportHandle {
    pub(crate) fn new(
        descriptor: Box<dyn Descriptor>,
        opened_here: bool,
        semantics: Semantics,
        parts: TransportParts,
    ) -> Self {
        TransportHandle { descriptor, opened_here, semantics, parts, netid: None, device: None }
    }

    pub(crate) fn set_provider(&mut self, netid: &str, device: &str) {
        self.netid = Some(netid.to_string());
        self.device = Some(device.to_string());
    }

    pub fn descriptor(&self) -> &dyn Descriptor {
        self.descriptor.as_ref()
    }

    pub fn semantics(&self) -> Semantics {
        self.semantics
    }

    pub fn kind(&self) -> TransportKind {
        self.parts.kind
    }

    /// Network identity; set only for handles created from a provider.
    pub fn netid(&self) -> Option<&str> {
        self.netid.as_deref()
    }

    /// Device of the provider the handle was created from.
    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    /// Local IP address; `None` for unix endpoints, see [`Self::local_sockaddr`].
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.parts.local.as_ref().and_then(SockAddr::as_socket)
    }

    pub fn local_sockaddr(&self) -> Option<&SockAddr> {
        self.parts.local.as_ref()
    }

    /// Remote IP address of a connected transport.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.parts.peer.as_ref().and_then(SockAddr::as_socket)
    }

    pub fn peer_sockaddr(&self) -> Option<&SockAddr> {
        self.parts.peer.as_ref()
    }

    pub fn send_size(&self) -> u32 {
        self.parts.send_size
    }

    pub fn recv_size(&self) -> u32 {
        self.parts.recv_size
    }

    /// Whether the descriptor was opened by the provisioner rather than
    /// adopted from the caller.
    pub fn opened_here(&self) -> bool {
        self.opened_here
    }

    /// Destroys the handle. A descriptor opened by the provisioner is
    /// closed; an adopted one is handed back unclosed.
    pub fn destroy(self) -> Option<Box<dyn Descriptor>> {
        debug!("destroying transport {:?}", self.netid);
        if self.opened_here {
            drop(self.descriptor);
            None
        } else {
            Some(self.descriptor)
        }
    }
}
