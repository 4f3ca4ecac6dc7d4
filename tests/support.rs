#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rpcsvc_mamont::directory::{Directory, Dispatch};
use rpcsvc_mamont::netconfig::{ProviderDescriptor, Semantics, SocketType, NC_INET, NC_TCP, NC_UDP};
use rpcsvc_mamont::socket::{
    AddressFamily, Descriptor, SocketInfo, SocketOpener, TransportProtocol,
};
use rpcsvc_mamont::transport::TransportHandle;
use rpcsvc_mamont::SvcRequest;

/// Port handed out when a mock is bound to port 0.
pub const EPHEMERAL_PORT: u16 = 40_000;

/// Ordered record of what the mocks were asked to do.
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().expect("event log").clone()
}

pub fn tcp_provider() -> ProviderDescriptor {
    ProviderDescriptor::new("tcp", Semantics::CotsOrd, NC_INET, NC_TCP)
}

pub fn udp_provider() -> ProviderDescriptor {
    ProviderDescriptor::new("udp", Semantics::Clts, NC_INET, NC_UDP)
}

/// How a mock descriptor reacts to the provisioner.
#[derive(Clone, Debug)]
pub struct MockBehaviour {
    pub info: SocketInfo,
    pub peer: Option<SocketAddr>,
    /// Local address the descriptor starts out with
    pub local: Option<SocketAddr>,
    /// Whether ports below 1024 may be bound
    pub privileged: bool,
    pub bind_error: Option<io::ErrorKind>,
    pub listen_error: Option<io::ErrorKind>,
    pub info_error: bool,
}

impl MockBehaviour {
    pub fn stream() -> Self {
        MockBehaviour {
            info: SocketInfo {
                family: AddressFamily::Inet,
                socktype: SocketType::Stream,
                protocol: TransportProtocol::Tcp,
            },
            peer: None,
            local: None,
            privileged: false,
            bind_error: None,
            listen_error: None,
            info_error: false,
        }
    }

    pub fn datagram() -> Self {
        MockBehaviour {
            info: SocketInfo {
                family: AddressFamily::Inet,
                socktype: SocketType::Datagram,
                protocol: TransportProtocol::Udp,
            },
            ..MockBehaviour::stream()
        }
    }

    pub fn raw() -> Self {
        MockBehaviour {
            info: SocketInfo {
                family: AddressFamily::Inet,
                socktype: SocketType::Raw,
                protocol: TransportProtocol::Other,
            },
            ..MockBehaviour::stream()
        }
    }

    /// An accepted stream connected to `peer`.
    pub fn accepted(peer: SocketAddr) -> Self {
        MockBehaviour {
            peer: Some(peer),
            local: Some(SocketAddr::from((Ipv4Addr::LOCALHOST, 2049))),
            ..MockBehaviour::stream()
        }
    }

    pub fn for_provider(provider: &ProviderDescriptor) -> Self {
        match provider.semantics {
            Semantics::Clts => MockBehaviour::datagram(),
            Semantics::Raw => MockBehaviour::raw(),
            Semantics::Cots | Semantics::CotsOrd => MockBehaviour::stream(),
        }
    }
}

/// State shared between a mock descriptor and the test observing it.
#[derive(Debug)]
pub struct MockState {
    pub behaviour: MockBehaviour,
    pub binds: Mutex<Vec<SocketAddr>>,
    pub listens: Mutex<Vec<i32>>,
    pub closes: AtomicUsize,
    local: Mutex<Option<SocketAddr>>,
}

impl MockState {
    pub fn new(behaviour: MockBehaviour) -> Arc<Self> {
        Arc::new(MockState {
            local: Mutex::new(behaviour.local),
            behaviour,
            binds: Mutex::new(Vec::new()),
            listens: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
        })
    }

    pub fn binds(&self) -> Vec<SocketAddr> {
        self.binds.lock().expect("binds").clone()
    }

    pub fn listens(&self) -> Vec<i32> {
        self.listens.lock().expect("listens").clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn local(&self) -> Option<SocketAddr> {
        *self.local.lock().expect("local")
    }
}

/// Descriptor that records what is done to it. Dropping it counts as a close.
#[derive(Debug)]
pub struct MockDescriptor {
    state: Arc<MockState>,
}

impl MockDescriptor {
    pub fn new(behaviour: MockBehaviour) -> (Self, Arc<MockState>) {
        let state = MockState::new(behaviour);
        (MockDescriptor { state: state.clone() }, state)
    }
}

impl Drop for MockDescriptor {
    fn drop(&mut self) {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
    }
}

impl Descriptor for MockDescriptor {
    fn socket_info(&self) -> io::Result<SocketInfo> {
        if self.state.behaviour.info_error {
            return Err(io::Error::from(io::ErrorKind::InvalidInput));
        }
        Ok(self.state.behaviour.info)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.state.local().ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.state.behaviour.peer.ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
    }

    fn bind(&self, addr: &SocketAddr) -> io::Result<()> {
        self.state.binds.lock().expect("binds").push(*addr);
        if let Some(kind) = self.state.behaviour.bind_error {
            return Err(io::Error::from(kind));
        }
        if addr.port() != 0 && addr.port() < 1024 && !self.state.behaviour.privileged {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        let mut local = *addr;
        if local.port() == 0 {
            local.set_port(EPHEMERAL_PORT);
        }
        *self.state.local.lock().expect("local") = Some(local);
        Ok(())
    }

    fn listen(&self, backlog: i32) -> io::Result<()> {
        self.state.listens.lock().expect("listens").push(backlog);
        match self.state.behaviour.listen_error {
            Some(kind) => Err(io::Error::from(kind)),
            None => Ok(()),
        }
    }
}

/// Opens mock descriptors, one behaviour per netid.
#[derive(Debug)]
pub struct MockOpener {
    log: EventLog,
    behaviours: Mutex<HashMap<String, MockBehaviour>>,
    refused: Mutex<Vec<String>>,
    opened: Mutex<Vec<(String, Arc<MockState>)>>,
}

impl MockOpener {
    pub fn new(log: EventLog) -> Self {
        MockOpener {
            log,
            behaviours: Mutex::new(HashMap::new()),
            refused: Mutex::new(Vec::new()),
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn set_behaviour(&self, netid: &str, behaviour: MockBehaviour) {
        self.behaviours.lock().expect("behaviours").insert(netid.to_string(), behaviour);
    }

    /// Makes `open` fail for `netid`.
    pub fn refuse(&self, netid: &str) {
        self.refused.lock().expect("refused").push(netid.to_string());
    }

    pub fn opened(&self) -> Vec<(String, Arc<MockState>)> {
        self.opened.lock().expect("opened").clone()
    }

    pub fn opened_for(&self, netid: &str) -> Vec<Arc<MockState>> {
        self.opened()
            .into_iter()
            .filter(|(id, _)| id == netid)
            .map(|(_, state)| state)
            .collect()
    }
}

impl SocketOpener for MockOpener {
    fn open(&self, provider: &ProviderDescriptor) -> io::Result<Box<dyn Descriptor>> {
        self.log.lock().expect("event log").push(format!("open {}", provider.netid));
        if self.refused.lock().expect("refused").contains(&provider.netid) {
            return Err(io::Error::from(io::ErrorKind::Unsupported));
        }
        let behaviour = self
            .behaviours
            .lock()
            .expect("behaviours")
            .get(&provider.netid)
            .cloned()
            .unwrap_or_else(|| MockBehaviour::for_provider(provider));
        let (descriptor, state) = MockDescriptor::new(behaviour);
        self.opened.lock().expect("opened").push((provider.netid.clone(), state));
        Ok(Box::new(descriptor))
    }
}

/// Directory that records every call and refuses registration on chosen netids.
#[derive(Debug)]
pub struct RecordingDirectory {
    log: EventLog,
    refused: Mutex<Vec<String>>,
    registered: Mutex<Vec<(u32, u32, String, Option<SocketAddr>)>>,
}

impl RecordingDirectory {
    pub fn new(log: EventLog) -> Self {
        RecordingDirectory {
            log,
            refused: Mutex::new(Vec::new()),
            registered: Mutex::new(Vec::new()),
        }
    }

    pub fn refuse(&self, netid: &str) {
        self.refused.lock().expect("refused").push(netid.to_string());
    }

    pub fn registered(&self) -> Vec<(u32, u32, String, Option<SocketAddr>)> {
        self.registered.lock().expect("registered").clone()
    }
}

impl Directory for RecordingDirectory {
    fn unset(&self, prog: u32, vers: u32, provider: &ProviderDescriptor) -> bool {
        self.log
            .lock()
            .expect("event log")
            .push(format!("unset {} {} {}", prog, vers, provider.netid));
        true
    }

    fn register(
        &self,
        handle: &TransportHandle,
        prog: u32,
        vers: u32,
        _dispatch: &Dispatch,
        provider: &ProviderDescriptor,
    ) -> bool {
        self.log
            .lock()
            .expect("event log")
            .push(format!("register {} {} {}", prog, vers, provider.netid));
        if self.refused.lock().expect("refused").contains(&provider.netid) {
            return false;
        }
        self.registered.lock().expect("registered").push((
            prog,
            vers,
            provider.netid.clone(),
            handle.local_addr(),
        ));
        true
    }
}

fn accept_all(_: &SvcRequest, _: &mut dyn io::Read, _: &mut dyn io::Write) -> anyhow::Result<()> {
    Ok(())
}

/// Dispatcher that accepts every call and writes nothing.
pub fn null_dispatch() -> Dispatch {
    Arc::new(accept_all)
}
