//! Blocking rpcbind client: RPCBPROC_SET / RPCBPROC_UNSET over UDP.

use std::env;
use std::io::Cursor;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, bail, Context};
use num_traits::ToPrimitive;
use tracing::{debug, trace};

use crate::config::SvcConfig;
use crate::protocol::xdr::rpc::{self, accept_body, rejected_reply, reply_body, rpc_body};
use crate::protocol::xdr::rpcb::{self, RpcbProc};
use crate::protocol::xdr::{deserialize, Serialize};

/// Largest reply the client expects from rpcbind.
const MAX_REPLY_SIZE: usize = 8800;

/// Client for the local rpcbind service.
#[derive(Debug)]
pub struct RpcbindClient {
    addr: SocketAddr,
    timeout: Duration,
    owner: String,
    next_xid: AtomicU32,
}

impl RpcbindClient {
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or_default()
            ^ std::process::id();
        RpcbindClient {
            addr,
            timeout,
            owner: env::var("USER").unwrap_or_else(|_| "unknown".to_string()),
            next_xid: AtomicU32::new(seed),
        }
    }

    pub fn from_config(config: &SvcConfig) -> Self {
        RpcbindClient::new(config.rpcbind_addr, config.rpcbind_timeout)
    }

    /// Sets the owner string sent with SET requests.
    pub fn with_owner<S: AsRef<str>>(mut self, owner: S) -> Self {
        self.owner = owner.as_ref().to_string();
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Publishes `uaddr` as the address of (`prog`, `vers`) on `netid`.
    /// Returns rpcbind's verdict; `false` usually means the mapping exists.
    pub fn set(&self, prog: u32, vers: u32, netid: &str, uaddr: &str) -> anyhow::Result<bool> {
        let args = rpcb::rpcb {
            r_prog: prog,
            r_vers: vers,
            r_netid: netid.to_string(),
            r_addr: uaddr.to_string(),
            r_owner: self.owner.clone(),
        };
        self.call(RpcbProc::RPCBPROC_SET, &args)
    }

    /// Removes the mapping of (`prog`, `vers`) on `netid`, or on every
    /// transport when `netid` is empty.
    pub fn unset(&self, prog: u32, vers: u32, netid: &str) -> anyhow::Result<bool> {
        let args = rpcb::rpcb {
            r_prog: prog,
            r_vers: vers,
            r_netid: netid.to_string(),
            r_addr: String::new(),
            r_owner: self.owner.clone(),
        };
        self.call(RpcbProc::RPCBPROC_UNSET, &args)
    }

    fn call(&self, proc: RpcbProc, args: &rpcb::rpcb) -> anyhow::Result<bool> {
        let xid = self.next_xid.fetch_add(1, Ordering::Relaxed);
        let proc_num = proc.to_u32().ok_or_else(|| anyhow!("invalid procedure {:?}", proc))?;
        let mut request = Vec::with_capacity(128);
        rpc::make_call(xid, rpcb::PROGRAM, rpcb::VERSION, proc_num).serialize(&mut request)?;
        args.serialize(&mut request)?;

        let local: SocketAddr = if self.addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).context("cannot bind rpcbind client socket")?;
        socket.connect(self.addr).with_context(|| format!("cannot reach rpcbind at {}", self.addr))?;
        trace!("{:?} xid {} to {}", proc, xid, self.addr);
        socket.send(&request)?;

        let deadline = Instant::now() + self.timeout;
        let mut buf = vec![0_u8; MAX_REPLY_SIZE];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                bail!("rpcbind at {} did not answer {:?} within {:?}", self.addr, proc, self.timeout);
            }
            socket.set_read_timeout(Some(remaining))?;
            let n = socket
                .recv(&mut buf)
                .with_context(|| format!("no reply from rpcbind at {}", self.addr))?;
            let mut reply = Cursor::new(&buf[..n]);
            let msg = match deserialize::<rpc::rpc_msg>(&mut reply) {
                Ok(msg) => msg,
                Err(e) => {
                    debug!("ignoring undecodable {} byte datagram from rpcbind: {}", n, e);
                    continue;
                }
            };
            if msg.xid != xid {
                debug!("ignoring stale rpcbind reply xid {} (expected {})", msg.xid, xid);
                continue;
            }
            check_reply(msg.body)?;
            let result = deserialize::<bool>(&mut reply)?;
            trace!("{:?} xid {} -> {}", proc, xid, result);
            return Ok(result);
        }
    }
}

fn check_reply(body: rpc_body) -> anyhow::Result<()> {
    match body {
        rpc_body::REPLY(reply_body::MSG_ACCEPTED(accepted)) => match accepted.reply_data {
            accept_body::SUCCESS => Ok(()),
            other => bail!("rpcbind did not accept the call: {:?}", other),
        },
        rpc_body::REPLY(reply_body::MSG_DENIED(rejected_reply::RPC_MISMATCH(info))) => {
            bail!("rpcbind RPC version mismatch ({}..={})", info.low, info.high)
        }
        rpc_body::REPLY(reply_body::MSG_DENIED(rejected_reply::AUTH_ERROR(stat))) => {
            bail!("rpcbind rejected credentials: {:?}", stat)
        }
        rpc_body::CALL(_) => bail!("expected a reply from rpcbind, got a call"),
    }
}
