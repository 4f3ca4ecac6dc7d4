//! Endpoint provisioning: turns either an adopted descriptor or a provider
//! entry into a bound, ready [`TransportHandle`].
//!
//! The steps run in a fixed order:
//!
//! 1. resolve the descriptor (adopt it, or open one for the provider)
//! 2. resolve socket metadata (from the provider, or queried from the OS)
//! 3. bind, then listen for connection-oriented sockets, unless an adopted
//!    descriptor is already bound
//! 4. hand the descriptor to the connected, listening or datagram constructor
//! 5. tag the handle with its semantics and provider identity
//!
//! On failure a descriptor opened in step 1 is closed exactly once. An
//! adopted descriptor is never closed here; it travels back to the caller
//! inside [`ProvisionFailure`].

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::config::SvcConfig;
use crate::error::{ProvisionFailure, SvcError};
use crate::netconfig::{ProviderDescriptor, Semantics};
use crate::socket::{bind_reserved, Descriptor, SocketInfo, SocketOpener};
use crate::transport::{SizeHints, TransportConstructors, TransportHandle};

/// Where the descriptor of a new endpoint comes from.
#[derive(Debug)]
pub enum EndpointSource<'a> {
    /// An already open descriptor supplied by the caller
    Adopted(Box<dyn Descriptor>),
    /// Open a new descriptor for this provider
    ToCreate(&'a ProviderDescriptor),
}

/// Explicit local address to bind, with the backlog to listen with for
/// connection-oriented transports.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BindAddress {
    pub addr: SocketAddr,
    pub backlog: i32,
}

impl BindAddress {
    pub fn new(addr: SocketAddr, backlog: i32) -> Self {
        BindAddress { addr, backlog }
    }
}

/// Descriptor held while provisioning, together with whether it was opened
/// here. Every failure path goes through [`Acquired::fail`].
struct Acquired {
    descriptor: Box<dyn Descriptor>,
    opened_here: bool,
}

impl Acquired {
    fn fail(self, error: SvcError) -> ProvisionFailure {
        if self.opened_here {
            trace!("closing descriptor opened for failed endpoint");
            drop(self.descriptor);
            ProvisionFailure { error, descriptor: None }
        } else {
            ProvisionFailure { error, descriptor: Some(self.descriptor) }
        }
    }
}

/// Creates endpoints from descriptors or provider entries.
pub struct EndpointFactory {
    opener: Arc<dyn SocketOpener>,
    constructors: Arc<dyn TransportConstructors>,
    config: SvcConfig,
}

impl EndpointFactory {
    pub fn new(
        opener: Arc<dyn SocketOpener>,
        constructors: Arc<dyn TransportConstructors>,
        config: SvcConfig,
    ) -> Self {
        EndpointFactory { opener, constructors, config }
    }

    pub fn config(&self) -> &SvcConfig {
        &self.config
    }

    /// Size hints from the configuration.
    pub fn default_sizes(&self) -> SizeHints {
        SizeHints::new(self.config.send_size, self.config.recv_size)
    }

    /// Provisions one endpoint.
    ///
    /// With `bind` set to `None` the endpoint is bound to a reserved port if
    /// possible, else to the wildcard address, and connection-oriented
    /// endpoints listen with the configured backlog.
    pub fn provision(
        &self,
        source: EndpointSource<'_>,
        bind: Option<&BindAddress>,
        sizes: SizeHints,
    ) -> Result<TransportHandle, ProvisionFailure> {
        let (acquired, info, semantics, provider) = match source {
            EndpointSource::ToCreate(provider) => {
                let info = SocketInfo::from_provider(provider)
                    .map_err(|error| ProvisionFailure { error, descriptor: None })?;
                let descriptor = self.opener.open(provider).map_err(|e| {
                    warn!("could not open connection for {}: {}", provider.netid, e);
                    ProvisionFailure {
                        error: SvcError::Configuration(format!(
                            "could not open connection for {}: {e}",
                            provider.netid
                        )),
                        descriptor: None,
                    }
                })?;
                let acquired = Acquired { descriptor, opened_here: true };
                (acquired, info, provider.semantics, Some(provider))
            }
            EndpointSource::Adopted(descriptor) => {
                let acquired = Acquired { descriptor, opened_here: false };
                let info = match acquired.descriptor.socket_info() {
                    Ok(info) => info,
                    Err(e) => {
                        warn!("could not get transport information: {}", e);
                        return Err(acquired.fail(SvcError::resource(
                            "could not get transport information",
                            e,
                        )));
                    }
                };
                let semantics = Semantics::from_socket_type(info.socktype);
                (acquired, info, semantics, None)
            }
        };

        if acquired.opened_here || !acquired.descriptor.is_bound() {
            let bound = self.bind_and_listen(acquired.descriptor.as_ref(), &info, semantics, bind);
            if let Err(error) = bound {
                return Err(acquired.fail(error));
            }
        }

        let descriptor = acquired.descriptor.as_ref();
        let parts = match semantics {
            Semantics::Cots | Semantics::CotsOrd if descriptor.has_peer() => {
                self.constructors.connected(descriptor, &info, sizes)
            }
            Semantics::Cots | Semantics::CotsOrd => {
                self.constructors.listening(descriptor, &info, sizes)
            }
            Semantics::Clts => self.constructors.datagram(descriptor, &info, sizes),
            Semantics::Raw => {
                warn!("bad service type {}", semantics);
                Err(SvcError::UnsupportedTransportType(semantics))
            }
        };
        let parts = match parts {
            Ok(parts) => parts,
            Err(error) => return Err(acquired.fail(error)),
        };

        let mut handle =
            TransportHandle::new(acquired.descriptor, acquired.opened_here, semantics, parts);
        if let Some(provider) = provider {
            handle.set_provider(&provider.netid, &provider.device);
        }
        debug!(
            "provisioned {:?} transport {:?} on {:?}",
            handle.kind(),
            handle.netid(),
            handle.local_sockaddr()
        );
        Ok(handle)
    }

    fn bind_and_listen(
        &self,
        descriptor: &dyn Descriptor,
        info: &SocketInfo,
        semantics: Semantics,
        bind: Option<&BindAddress>,
    ) -> Result<(), SvcError> {
        let backlog = match bind {
            None => {
                let reserved = if self.config.reserved_port {
                    bind_reserved(descriptor, info.family)
                } else {
                    Err(io::Error::from(io::ErrorKind::AddrNotAvailable))
                };
                if let Err(e) = reserved {
                    trace!("no reserved port ({}), binding anonymous port", e);
                    let wildcard = info.family.wildcard().ok_or_else(|| {
                        SvcError::resource(
                            "could not bind to anonymous port",
                            io::Error::new(
                                io::ErrorKind::Unsupported,
                                "address family has no wildcard address",
                            ),
                        )
                    })?;
                    descriptor.bind(&wildcard).map_err(|e| {
                        warn!("could not bind to anonymous port: {}", e);
                        SvcError::resource("could not bind to anonymous port", e)
                    })?;
                }
                self.config.listen_backlog
            }
            Some(bind) => {
                descriptor.bind(&bind.addr).map_err(|e| {
                    warn!("could not bind to requested address {}: {}", bind.addr, e);
                    SvcError::resource("could not bind to requested address", e)
                })?;
                bind.backlog
            }
        };
        if semantics.is_connection_oriented() {
            descriptor.listen(backlog).map_err(|e| {
                warn!("could not listen with backlog {}: {}", backlog, e);
                SvcError::resource("could not listen", e)
            })?;
        }
        Ok(())
    }
}
