//! Server bootstrap configuration.

use std::env;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Backlog used when a connection-oriented endpoint is bound without an
/// explicit bind address.
pub const DEFAULT_LISTEN_BACKLOG: i32 = 128;
/// Default location of the netconfig database.
pub const DEFAULT_NETCONFIG_PATH: &str = "/etc/netconfig";
/// Well-known rpcbind port
pub const RPCBIND_PORT: u16 = 111;

/// Tunables shared by the provisioner and the orchestrators.
#[derive(Clone, Debug)]
pub struct SvcConfig {
    /// Backlog for endpoints bound to an automatically chosen address
    pub listen_backlog: i32,
    /// Send buffer size hint; 0 selects the transport default
    pub send_size: u32,
    /// Receive buffer size hint; 0 selects the transport default
    pub recv_size: u32,
    /// Try a privileged port before falling back to an anonymous one
    pub reserved_port: bool,
    pub netconfig_path: PathBuf,
    /// Colon-separated netid list consulted by the `netpath` selectors
    pub netpath: Option<String>,
    pub rpcbind_addr: SocketAddr,
    pub rpcbind_timeout: Duration,
}

impl Default for SvcConfig {
    fn default() -> Self {
        SvcConfig {
            listen_backlog: DEFAULT_LISTEN_BACKLOG,
            send_size: 0,
            recv_size: 0,
            reserved_port: true,
            netconfig_path: PathBuf::from(DEFAULT_NETCONFIG_PATH),
            netpath: None,
            rpcbind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, RPCBIND_PORT)),
            rpcbind_timeout: Duration::from_secs(3),
        }
    }
}

impl SvcConfig {
    /// Defaults, with `NETPATH` and `NETCONFIG` taken from the environment.
    pub fn from_env() -> Self {
        let mut config = SvcConfig::default();
        if let Ok(netpath) = env::var("NETPATH") {
            config.netpath = Some(netpath);
        }
        if let Ok(path) = env::var("NETCONFIG") {
            config.netconfig_path = PathBuf::from(path);
        }
        config
    }

    pub fn with_listen_backlog(mut self, backlog: i32) -> Self {
        self.listen_backlog = backlog;
        self
    }

    /// Sets the send/receive size hints handed to the transport constructors.
    pub fn with_buffer_sizes(mut self, send_size: u32, recv_size: u32) -> Self {
        self.send_size = send_size;
        self.recv_size = recv_size;
        self
    }

    pub fn with_reserved_port(mut self, reserved_port: bool) -> Self {
        self.reserved_port = reserved_port;
        self
    }

    pub fn with_netconfig_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.netconfig_path = path.into();
        self
    }

    pub fn with_netpath<S: AsRef<str>>(mut self, netpath: S) -> Self {
        self.netpath = Some(netpath.as_ref().to_string());
        self
    }

    /// Points the rpcbind client at a non-default address.
    pub fn with_rpcbind(mut self, addr: SocketAddr, timeout: Duration) -> Self {
        self.rpcbind_addr = addr;
        self.rpcbind_timeout = timeout;
        self
    }
}
