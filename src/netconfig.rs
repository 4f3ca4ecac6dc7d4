//! Network provider database in the netconfig(5) format and the selector
//! tokens ("nettypes") used to enumerate it.
//!
//! Each line of a netconfig file describes one transport provider:
//!
//! ```text
//! netid  semantics     flags  protofamily  protoname  device  nametoaddr_libs
//! udp    tpi_clts      v      inet         udp        -       -
//! tcp6   tpi_cots_ord  v      inet6        tcp        -       -
//! ```
//!
//! A selector token such as `"visible"` or `"circuit_n"` picks an ordered
//! subset of those providers. Server bootstrap walks that subset and creates
//! one endpoint per provider.

use std::fmt;
use std::fs;
use std::str::FromStr;

use tracing::{debug, warn};

use crate::config::SvcConfig;
use crate::error::{Result, SvcError};

/// Protocol family names used in the `protofamily` column.
pub const NC_INET: &str = "inet";
pub const NC_INET6: &str = "inet6";
pub const NC_LOOPBACK: &str = "loopback";
/// Protocol names used in the `protoname` column.
pub const NC_TCP: &str = "tcp";
pub const NC_UDP: &str = "udp";

const BUILTIN_NETCONFIG: &str = "\
udp        tpi_clts      v     inet     udp     -       -
tcp        tpi_cots_ord  v     inet     tcp     -       -
udp6       tpi_clts      v     inet6    udp     -       -
tcp6       tpi_cots_ord  v     inet6    tcp     -       -
rawip      tpi_raw       -     inet      -      -       -
local      tpi_cots_ord  -     loopback  -      -       -
unix       tpi_cots_ord  -     loopback  -      -       -
";

/// Transport service semantics of a provider.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Semantics {
    /// Connectionless (datagram) transport
    Clts,
    /// Connection-oriented transport
    Cots,
    /// Connection-oriented transport with orderly release
    CotsOrd,
    /// Raw transport
    Raw,
}

impl Semantics {
    /// Whether the transport requires an established peer relationship.
    pub fn is_connection_oriented(self) -> bool {
        matches!(self, Semantics::Cots | Semantics::CotsOrd)
    }

    pub fn is_connectionless(self) -> bool {
        self == Semantics::Clts
    }

    /// Socket type a provider with these semantics is opened with.
    pub fn socket_type(self) -> SocketType {
        match self {
            Semantics::Clts => SocketType::Datagram,
            Semantics::Cots | Semantics::CotsOrd => SocketType::Stream,
            Semantics::Raw => SocketType::Raw,
        }
    }

    /// Inverse of [`Semantics::socket_type`]; stream sockets map to
    /// connection-oriented transports with orderly release.
    pub fn from_socket_type(socktype: SocketType) -> Semantics {
        match socktype {
            SocketType::Stream => Semantics::CotsOrd,
            SocketType::Datagram => Semantics::Clts,
            SocketType::Raw => Semantics::Raw,
        }
    }
}

impl FromStr for Semantics {
    type Err = SvcError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tpi_clts" => Ok(Semantics::Clts),
            "tpi_cots" => Ok(Semantics::Cots),
            "tpi_cots_ord" => Ok(Semantics::CotsOrd),
            "tpi_raw" => Ok(Semantics::Raw),
            other => Err(SvcError::Configuration(format!("unknown semantics {other:?}"))),
        }
    }
}

impl fmt::Display for Semantics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Semantics::Clts => "tpi_clts",
            Semantics::Cots => "tpi_cots",
            Semantics::CotsOrd => "tpi_cots_ord",
            Semantics::Raw => "tpi_raw",
        };
        f.write_str(name)
    }
}

/// Socket type backing a transport.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SocketType {
    Stream,
    Datagram,
    Raw,
}

/// Read-only description of one network provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderDescriptor {
    /// Network identity, unique per provider
    pub netid: String,
    pub semantics: Semantics,
    /// Listed by the `visible` family of selectors
    pub visible: bool,
    pub broadcast: bool,
    /// Protocol family, e.g. `inet` or `inet6`
    pub protofmly: String,
    /// Protocol name, e.g. `tcp`; empty when unspecified
    pub proto: String,
    /// Device or path identifier; empty when unspecified
    pub device: String,
    pub lookups: Vec<String>,
}

impl ProviderDescriptor {
    /// Convenience constructor for a visible provider without device or
    /// lookup libraries.
    pub fn new(netid: &str, semantics: Semantics, protofmly: &str, proto: &str) -> Self {
        ProviderDescriptor {
            netid: netid.to_string(),
            semantics,
            visible: true,
            broadcast: false,
            protofmly: protofmly.to_string(),
            proto: proto.to_string(),
            device: String::new(),
            lookups: Vec::new(),
        }
    }

    pub fn socket_type(&self) -> SocketType {
        self.semantics.socket_type()
    }

    fn is_inet(&self) -> bool {
        self.protofmly == NC_INET || self.protofmly == NC_INET6
    }

    /// Parses one non-comment netconfig line.
    pub fn parse_line(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 6 {
            return Err(SvcError::Configuration(format!(
                "netconfig entry needs at least 6 fields, got {}",
                fields.len()
            )));
        }
        let semantics = fields[1].parse::<Semantics>()?;
        let mut visible = false;
        let mut broadcast = false;
        if fields[2] != "-" {
            for flag in fields[2].chars() {
                match flag {
                    'v' => visible = true,
                    'b' => broadcast = true,
                    other => {
                        return Err(SvcError::Configuration(format!(
                            "unknown netconfig flag {other:?}"
                        )))
                    }
                }
            }
        }
        let lookups = match fields.get(6) {
            None | Some(&"-") => Vec::new(),
            Some(libs) => libs.split(',').map(str::to_string).collect(),
        };
        Ok(ProviderDescriptor {
            netid: fields[0].to_string(),
            semantics,
            visible,
            broadcast,
            protofmly: dash_empty(fields[3]),
            proto: dash_empty(fields[4]),
            device: dash_empty(fields[5]),
            lookups,
        })
    }
}

fn dash_empty(field: &str) -> String {
    if field == "-" {
        String::new()
    } else {
        field.to_string()
    }
}

/// Selector token naming a class of providers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Nettype {
    /// Providers listed in `NETPATH`, or every visible provider if unset
    Netpath,
    /// Every visible provider
    Visible,
    /// Visible connection-oriented providers
    CircuitV,
    /// Visible connectionless providers
    DatagramV,
    /// `NETPATH` connection-oriented providers
    CircuitN,
    /// `NETPATH` connectionless providers
    DatagramN,
    /// IPv4/IPv6 UDP providers
    Udp,
    /// IPv4/IPv6 TCP providers
    Tcp,
}

impl FromStr for Nettype {
    type Err = SvcError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "" | "netpath" => Ok(Nettype::Netpath),
            "visible" => Ok(Nettype::Visible),
            "circuit_v" => Ok(Nettype::CircuitV),
            "datagram_v" => Ok(Nettype::DatagramV),
            "circuit_n" => Ok(Nettype::CircuitN),
            "datagram_n" => Ok(Nettype::DatagramN),
            "udp" => Ok(Nettype::Udp),
            "tcp" => Ok(Nettype::Tcp),
            _ => Err(SvcError::UnknownNettype(s.to_string())),
        }
    }
}

impl Nettype {
    fn uses_netpath(self) -> bool {
        matches!(self, Nettype::Netpath | Nettype::CircuitN | Nettype::DatagramN)
    }

    fn accepts(self, provider: &ProviderDescriptor) -> bool {
        match self {
            Nettype::Netpath | Nettype::Visible => true,
            Nettype::CircuitV | Nettype::CircuitN => provider.semantics.is_connection_oriented(),
            Nettype::DatagramV | Nettype::DatagramN => provider.semantics.is_connectionless(),
            Nettype::Tcp => {
                provider.semantics.is_connection_oriented()
                    && provider.is_inet()
                    && provider.proto == NC_TCP
            }
            Nettype::Udp => {
                provider.semantics.is_connectionless()
                    && provider.is_inet()
                    && provider.proto == NC_UDP
            }
        }
    }
}

/// Finite, non-restartable sequence of providers produced by
/// [`NetconfigSource::open`]. Dropping it ends the enumeration.
#[derive(Debug)]
pub struct Providers {
    inner: std::vec::IntoIter<ProviderDescriptor>,
}

impl Providers {
    pub fn new(providers: Vec<ProviderDescriptor>) -> Self {
        Providers { inner: providers.into_iter() }
    }
}

impl Iterator for Providers {
    type Item = ProviderDescriptor;

    fn next(&mut self) -> Option<ProviderDescriptor> {
        self.inner.next()
    }
}

/// Enumerates the network providers matching a selector token.
pub trait NetconfigSource: Send + Sync {
    /// Opens an enumeration for `selector`; fails for unknown selectors.
    fn open(&self, selector: &str) -> Result<Providers>;
}

/// In-memory netconfig database plus the `NETPATH` setting used by the
/// `netpath`, `circuit_n` and `datagram_n` selectors.
#[derive(Clone, Debug)]
pub struct NetconfigDatabase {
    entries: Vec<ProviderDescriptor>,
    netpath: Option<String>,
}

impl Default for NetconfigDatabase {
    fn default() -> Self {
        NetconfigDatabase::parse(BUILTIN_NETCONFIG)
    }
}

impl NetconfigDatabase {
    pub fn from_entries(entries: Vec<ProviderDescriptor>) -> Self {
        NetconfigDatabase { entries, netpath: None }
    }

    /// Parses netconfig text. Blank lines and `#` comments are ignored;
    /// malformed entries are skipped with a warning.
    pub fn parse(text: &str) -> Self {
        let mut entries = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match ProviderDescriptor::parse_line(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("netconfig line {}: {}", lineno + 1, e),
            }
        }
        NetconfigDatabase { entries, netpath: None }
    }

    /// Loads the file named by `config.netconfig_path`, falling back to the
    /// built-in table when it cannot be read.
    pub fn load(config: &SvcConfig) -> Self {
        let db = match fs::read_to_string(&config.netconfig_path) {
            Ok(text) => NetconfigDatabase::parse(&text),
            Err(e) => {
                debug!(
                    "cannot read {}: {}, using built-in netconfig",
                    config.netconfig_path.display(),
                    e
                );
                NetconfigDatabase::default()
            }
        };
        db.with_netpath(config.netpath.clone())
    }

    /// Sets the colon-separated `NETPATH` list of netids.
    pub fn with_netpath(mut self, netpath: Option<String>) -> Self {
        self.netpath = netpath;
        self
    }

    pub fn entries(&self) -> &[ProviderDescriptor] {
        &self.entries
    }

    /// Looks up a provider by netid.
    pub fn get(&self, netid: &str) -> Option<&ProviderDescriptor> {
        self.entries.iter().find(|entry| entry.netid == netid)
    }

    fn netpath_entries(&self) -> Vec<&ProviderDescriptor> {
        match &self.netpath {
            Some(netpath) => netpath
                .split(':')
                .filter(|netid| !netid.is_empty())
                .filter_map(|netid| {
                    let entry = self.get(netid);
                    if entry.is_none() {
                        debug!("NETPATH names unknown netid {}", netid);
                    }
                    entry
                })
                .collect(),
            None => self.visible_entries(),
        }
    }

    fn visible_entries(&self) -> Vec<&ProviderDescriptor> {
        self.entries.iter().filter(|entry| entry.visible).collect()
    }

    /// Providers selected by `nettype`, in database (or `NETPATH`) order.
    pub fn select(&self, nettype: Nettype) -> Vec<ProviderDescriptor> {
        let candidates = if nettype.uses_netpath() {
            self.netpath_entries()
        } else if matches!(nettype, Nettype::Tcp | Nettype::Udp) {
            self.entries.iter().collect()
        } else {
            self.visible_entries()
        };
        candidates.into_iter().filter(|entry| nettype.accepts(entry)).cloned().collect()
    }
}

impl NetconfigSource for NetconfigDatabase {
    fn open(&self, selector: &str) -> Result<Providers> {
        let nettype = selector.parse::<Nettype>()?;
        Ok(Providers::new(self.select(nettype)))
    }
}
