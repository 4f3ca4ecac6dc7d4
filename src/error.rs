//! Error taxonomy for endpoint provisioning and registration.
//!
//! Lower layers (socket layer, transport constructors, cache) return
//! [`SvcError`]. The orchestrators in [`crate::server`] never hand these
//! errors to their callers; they log them and report results through
//! `Option` handles or success counts instead.

use std::collections::TryReserveError;
use std::io;

use thiserror::Error;

use crate::netconfig::Semantics;
use crate::socket::Descriptor;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SvcError>;

/// Errors raised while provisioning or registering an RPC endpoint.
#[derive(Debug, Error)]
pub enum SvcError {
    /// A provider descriptor is missing, invalid or cannot be opened.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Descriptor creation, metadata query, bind or listen failed.
    #[error("{context}: {source}")]
    Resource {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    /// The socket semantics are neither connection-oriented nor connectionless.
    #[error("unsupported transport type {0:?}")]
    UnsupportedTransportType(Semantics),

    /// The directory service refused the registration.
    #[error("could not register prog {prog} vers {vers} on {netid}")]
    Registration { prog: u32, vers: u32, netid: String },

    /// Cache bookkeeping could not be recorded.
    #[error("cannot record transport: {0}")]
    Allocation(#[from] TryReserveError),

    /// The cache already holds as many transports as it was allowed.
    #[error("cannot record transport: cache limit of {0} reached")]
    CacheFull(usize),

    /// The selector token does not name a known class of providers.
    #[error("unknown protocol {0:?}")]
    UnknownNettype(String),
}

impl SvcError {
    pub(crate) fn resource(context: &'static str, source: io::Error) -> Self {
        SvcError::Resource { context, source }
    }
}

/// Failed provisioning attempt.
///
/// A descriptor the provisioner opened itself has already been closed when
/// this value is produced. An adopted descriptor is never closed here and is
/// handed back to the caller in `descriptor`.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ProvisionFailure {
    #[source]
    pub error: SvcError,
    pub descriptor: Option<Box<dyn Descriptor>>,
}

impl ProvisionFailure {
    /// Drops the returned descriptor (if any) and keeps only the cause.
    pub fn into_error(self) -> SvcError {
        self.error
    }
}
