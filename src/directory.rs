//! Directory service: records which dispatcher serves a (program, version)
//! on a transport and publishes the transport address, optionally through
//! the system rpcbind.

use std::fmt;
use std::io::{Read, Write};
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use crate::netconfig::ProviderDescriptor;
use crate::protocol::rpcbind::RpcbindClient;
use crate::protocol::uaddr::taddr2uaddr;
use crate::protocol::xdr::rpcb::rpcb;
use crate::transport::TransportHandle;

/// Header fields of an incoming call, as handed to a [`Dispatcher`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SvcRequest {
    pub xid: u32,
    pub prog: u32,
    pub vers: u32,
    pub proc: u32,
    /// Transport the call arrived on
    pub netid: String,
    pub caller: Option<SocketAddr>,
}

/// Service callback for one RPC program.
pub trait Dispatcher: Send + Sync {
    /// Decodes arguments from `input` and writes the reply body to `output`.
    fn dispatch(
        &self,
        request: &SvcRequest,
        input: &mut dyn Read,
        output: &mut dyn Write,
    ) -> anyhow::Result<()>;
}

impl<F> Dispatcher for F
where
    F: Fn(&SvcRequest, &mut dyn Read, &mut dyn Write) -> anyhow::Result<()> + Send + Sync,
{
    fn dispatch(
        &self,
        request: &SvcRequest,
        input: &mut dyn Read,
        output: &mut dyn Write,
    ) -> anyhow::Result<()> {
        self(request, input, output)
    }
}

/// Shared dispatch callback.
pub type Dispatch = Arc<dyn Dispatcher>;

/// Registrar mapping (program, version, transport) to a dispatcher and an
/// address.
pub trait Directory: Send + Sync {
    /// Removes a stale mapping for (`prog`, `vers`) on `provider`.
    /// Best effort: callers do not act on the result.
    fn unset(&self, prog: u32, vers: u32, provider: &ProviderDescriptor) -> bool;

    /// Registers `dispatch` for (`prog`, `vers`) on `handle`.
    fn register(
        &self,
        handle: &TransportHandle,
        prog: u32,
        vers: u32,
        dispatch: &Dispatch,
        provider: &ProviderDescriptor,
    ) -> bool;
}

struct Callout {
    prog: u32,
    vers: u32,
    netid: String,
    dispatch: Dispatch,
    /// Published address; cleared by `unset`
    uaddr: Option<String>,
}

impl fmt::Debug for Callout {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Callout")
            .field("prog", &self.prog)
            .field("vers", &self.vers)
            .field("netid", &self.netid)
            .field("uaddr", &self.uaddr)
            .finish()
    }
}

/// In-process callout table, optionally mirrored to rpcbind.
#[derive(Debug, Default)]
pub struct ServiceDirectory {
    callouts: RwLock<Vec<Callout>>,
    rpcbind: Option<RpcbindClient>,
}

impl ServiceDirectory {
    /// Directory that keeps registrations in this process only.
    pub fn new() -> Self {
        ServiceDirectory::default()
    }

    /// Directory that also publishes every registration through `rpcbind`.
    pub fn with_rpcbind(rpcbind: RpcbindClient) -> Self {
        ServiceDirectory { callouts: RwLock::default(), rpcbind: Some(rpcbind) }
    }

    /// Dispatcher registered for (`prog`, `vers`) on `netid`.
    pub fn lookup(&self, prog: u32, vers: u32, netid: &str) -> Option<Dispatch> {
        let callouts = self.callouts.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        callouts
            .iter()
            .find(|c| c.prog == prog && c.vers == vers && c.netid == netid)
            .map(|c| c.dispatch.clone())
    }

    /// Currently published mappings, in registration order.
    pub fn mappings(&self) -> Vec<rpcb> {
        let callouts = self.callouts.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        callouts
            .iter()
            .filter_map(|c| {
                c.uaddr.as_ref().map(|uaddr| rpcb {
                    r_prog: c.prog,
                    r_vers: c.vers,
                    r_netid: c.netid.clone(),
                    r_addr: uaddr.clone(),
                    r_owner: String::new(),
                })
            })
            .collect()
    }

    fn publish(&self, prog: u32, vers: u32, netid: &str, uaddr: &str) -> bool {
        let Some(rpcbind) = &self.rpcbind else {
            return true;
        };
        match rpcbind.set(prog, vers, netid, uaddr) {
            Ok(true) => true,
            Ok(false) => {
                warn!("rpcbind refused prog {} vers {} on {} at {}", prog, vers, netid, uaddr);
                false
            }
            Err(e) => {
                warn!("rpcbind set failed for prog {} vers {} on {}: {:?}", prog, vers, netid, e);
                false
            }
        }
    }
}

impl Directory for ServiceDirectory {
    fn unset(&self, prog: u32, vers: u32, provider: &ProviderDescriptor) -> bool {
        let mut removed = false;
        {
            let mut callouts = self.callouts.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            for callout in callouts
                .iter_mut()
                .filter(|c| c.prog == prog && c.vers == vers && c.netid == provider.netid)
            {
                removed |= callout.uaddr.take().is_some();
            }
        }
        if let Some(rpcbind) = &self.rpcbind {
            match rpcbind.unset(prog, vers, &provider.netid) {
                Ok(result) => removed |= result,
                Err(e) => debug!("rpcbind unset for {}: {:?}", provider.netid, e),
            }
        }
        removed
    }

    fn register(
        &self,
        handle: &TransportHandle,
        prog: u32,
        vers: u32,
        dispatch: &Dispatch,
        provider: &ProviderDescriptor,
    ) -> bool {
        let netid = provider.netid.as_str();
        let Some(uaddr) = handle.local_addr().map(|addr| taddr2uaddr(&addr)) else {
            warn!("transport for {} has no local address to publish", netid);
            return false;
        };

        // rpcbind is contacted without holding the table lock.
        {
            let callouts = self.callouts.read().unwrap_or_else(|poisoned| poisoned.into_inner());
            if served_elsewhere(&callouts, prog, vers, netid, dispatch) {
                warn!("prog {} vers {} on {} is served by another dispatcher", prog, vers, netid);
                return false;
            }
        }
        if !self.publish(prog, vers, netid, &uaddr) {
            return false;
        }

        let mut callouts = self.callouts.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        if served_elsewhere(&callouts, prog, vers, netid, dispatch) {
            warn!("prog {} vers {} on {} was taken by another dispatcher", prog, vers, netid);
            return false;
        }
        match callouts.iter_mut().find(|c| c.prog == prog && c.vers == vers && c.netid == netid) {
            Some(callout) => callout.uaddr = Some(uaddr),
            None => callouts.push(Callout {
                prog,
                vers,
                netid: netid.to_string(),
                dispatch: dispatch.clone(),
                uaddr: Some(uaddr),
            }),
        }
        debug!("registered prog {} vers {} on {}", prog, vers, netid);
        true
    }
}

fn served_elsewhere(
    callouts: &[Callout],
    prog: u32,
    vers: u32,
    netid: &str,
    dispatch: &Dispatch,
) -> bool {
    callouts.iter().any(|c| {
        c.prog == prog && c.vers == vers && c.netid == netid && !Arc::ptr_eq(&c.dispatch, dispatch)
    })
}
