//! RPC Mamont - server-side endpoint bootstrap for ONC RPC services
//!
//! This library brings up the transport endpoints of an RPC server and
//! registers a program/version on them, in the manner of the TI-RPC
//! `svc_create` family.
//!
//! ## Main Components
//!
//! - `server`: [`Bootstrap`], the orchestrators. `create_all` walks every
//!   network provider selected by a nettype token (`"visible"`, `"tcp"`,
//!   `"circuit_n"`, ...) and reuses cached endpoints across calls;
//!   `create_for_provider` does the same for one provider without caching.
//!
//! - `provision`: [`EndpointFactory`], which turns an adopted descriptor or
//!   a provider entry into a bound, listening (where needed) transport.
//!
//! - `netconfig`: the netconfig(5) provider database and nettype selectors.
//!
//! - `socket`: the descriptor abstraction, OS sockets via `socket2` and the
//!   reserved-port bind walk.
//!
//! - `transport`: transport handles and the connected, listening and
//!   datagram constructors.
//!
//! - `directory`: the service directory mapping (program, version, netid)
//!   to a dispatcher and publishing addresses through rpcbind.
//!
//! - `cache`: the process-wide transport cache keyed by netid.
//!
//! - `protocol`: XDR encoding, the RPCBIND v3 client and universal
//!   addresses.
//!
//! ## Standards Compliance
//!
//! - RFC 5531: RPC: Remote Procedure Call Protocol Specification Version 2
//! - RFC 4506: XDR: External Data Representation Standard
//! - RFC 1833: Binding Protocols for ONC RPC Version 2
//! - RFC 5665: IANA Considerations for Remote Procedure Call (RPC) Network
//!   Identifiers and Universal Address Formats
//!
//! ## Usage
//!
//! Build a [`Bootstrap`] with [`Bootstrap::system`], keep one
//! [`TransportCache`] for the life of the server and call
//! [`Bootstrap::create_all`] once per program/version to serve.

pub mod cache;
pub mod config;
pub mod directory;
pub mod error;
pub mod netconfig;
pub mod protocol;
pub mod provision;
pub mod server;
pub mod socket;
pub mod transport;

pub use protocol::xdr;

pub use cache::TransportCache;
pub use config::SvcConfig;
pub use directory::{Directory, Dispatch, Dispatcher, ServiceDirectory, SvcRequest};
pub use error::{ProvisionFailure, SvcError};
pub use netconfig::{NetconfigDatabase, NetconfigSource, Nettype, ProviderDescriptor, Semantics};
pub use provision::{BindAddress, EndpointFactory, EndpointSource};
pub use server::Bootstrap;
pub use socket::{Descriptor, SocketOpener, SystemDescriptor, SystemSockets};
pub use transport::{SizeHints, StandardTransports, TransportHandle, TransportKind};
