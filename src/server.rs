//! Server bootstrap: create and register RPC endpoints for every provider
//! selected by a nettype token, or for one known provider.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::cache::TransportCache;
use crate::config::SvcConfig;
use crate::directory::{Directory, Dispatch, ServiceDirectory};
use crate::error::{ProvisionFailure, SvcError};
use crate::netconfig::{NetconfigDatabase, NetconfigSource, ProviderDescriptor};
use crate::protocol::rpcbind::RpcbindClient;
use crate::provision::{EndpointFactory, EndpointSource};
use crate::socket::{SocketOpener, SystemSockets};
use crate::transport::{StandardTransports, TransportConstructors, TransportHandle};

/// Collaborators needed to bring RPC endpoints up.
pub struct Bootstrap {
    netconfig: Arc<dyn NetconfigSource>,
    factory: EndpointFactory,
    directory: Arc<dyn Directory>,
}

impl Bootstrap {
    pub fn new(
        netconfig: Arc<dyn NetconfigSource>,
        opener: Arc<dyn SocketOpener>,
        constructors: Arc<dyn TransportConstructors>,
        directory: Arc<dyn Directory>,
        config: SvcConfig,
    ) -> Self {
        Bootstrap {
            netconfig,
            factory: EndpointFactory::new(opener, constructors, config),
            directory,
        }
    }

    /// OS sockets, the netconfig database named by `config` and a directory
    /// publishing through the local rpcbind.
    pub fn system(config: SvcConfig) -> Self {
        let netconfig = Arc::new(NetconfigDatabase::load(&config));
        let directory = Arc::new(ServiceDirectory::with_rpcbind(RpcbindClient::from_config(&config)));
        Bootstrap::new(
            netconfig,
            Arc::new(SystemSockets),
            Arc::new(StandardTransports),
            directory,
            config,
        )
    }

    pub fn factory(&self) -> &EndpointFactory {
        &self.factory
    }

    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.directory
    }

    /// Creates an endpoint for `provider` and registers `dispatch` for
    /// (`prog`, `vers`) on it. The handle is returned to the caller and is
    /// not cached; it is destroyed again if registration fails.
    pub fn create_for_provider(
        &self,
        dispatch: &Dispatch,
        prog: u32,
        vers: u32,
        provider: &ProviderDescriptor,
    ) -> Option<TransportHandle> {
        let _ = self.directory.unset(prog, vers, provider);
        let handle = match self.factory.provision(
            EndpointSource::ToCreate(provider),
            None,
            self.factory.default_sizes(),
        ) {
            Ok(handle) => handle,
            Err(ProvisionFailure { error, .. }) => {
                warn!("cannot create transport for {}: {}", provider.netid, error);
                return None;
            }
        };
        if !self.directory.register(&handle, prog, vers, dispatch, provider) {
            warn!("{}", registration_error(prog, vers, provider));
            handle.destroy();
            return None;
        }
        info!(
            "prog {} vers {} listening on {} ({:?})",
            prog,
            vers,
            provider.netid,
            handle.local_addr()
        );
        Some(handle)
    }

    /// Makes (`prog`, `vers`) reachable on every provider matching
    /// `nettype` and returns on how many it succeeded.
    ///
    /// Endpoints are cached in `cache` by netid and reused by later calls.
    /// 0 means nothing could be registered; the reasons have been logged.
    /// If the cache cannot record a new endpoint the whole call returns 0,
    /// although registrations made earlier in the same call stay in place.
    pub fn create_all(
        &self,
        cache: &TransportCache,
        dispatch: &Dispatch,
        prog: u32,
        vers: u32,
        nettype: &str,
    ) -> u32 {
        let providers = match self.netconfig.open(nettype) {
            Ok(providers) => providers,
            Err(e) => {
                warn!("cannot enumerate providers for {:?}: {}", nettype, e);
                return 0;
            }
        };

        let mut num = 0;
        for provider in providers {
            let mut entries = cache.lock();
            if let Some(handle) = entries.lookup(&provider.netid) {
                let _ = self.directory.unset(prog, vers, &provider);
                if self.directory.register(handle, prog, vers, dispatch, &provider) {
                    num += 1;
                } else {
                    warn!("{}", registration_error(prog, vers, &provider));
                }
                continue;
            }

            let Some(handle) = self.create_for_provider(dispatch, prog, vers, &provider) else {
                continue;
            };
            if let Err((e, handle)) = entries.insert(&provider.netid, handle) {
                error!("cannot cache transport for {}: {}", provider.netid, e);
                // Earlier providers of this call stay registered.
                handle.destroy();
                return 0;
            }
            num += 1;
        }
        num
    }
}

fn registration_error(prog: u32, vers: u32, provider: &ProviderDescriptor) -> SvcError {
    SvcError::Registration { prog, vers, netid: provider.netid.clone() }
}
