use std::io::Cursor;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use num_traits::FromPrimitive;

use rpcsvc_mamont::config::SvcConfig;
use rpcsvc_mamont::directory::Directory;
use rpcsvc_mamont::protocol::rpcbind::RpcbindClient;
use rpcsvc_mamont::provision::{EndpointFactory, EndpointSource};
use rpcsvc_mamont::transport::{SizeHints, StandardTransports};
use rpcsvc_mamont::ServiceDirectory;
use rpcsvc_mamont::protocol::uaddr::{taddr2uaddr, uaddr2taddr};
use rpcsvc_mamont::xdr::rpc::{self, rpc_body};
use rpcsvc_mamont::xdr::rpcb::{self, rpcb as Rpcb, RpcbProc};
use rpcsvc_mamont::xdr::{deserialize, Serialize};

mod support;
use support::{init_logging, null_dispatch, tcp_provider, EventLog, MockOpener};

/// How the fake rpcbind delivers its replies.
#[derive(Default)]
struct Delivery {
    /// Send a datagram that is not an RPC message before each reply
    junk_first: bool,
    /// Hold each reply until a message arrives here
    gate: Option<mpsc::Receiver<()>>,
}

/// Answers `replies.len()` calls, each with the next verdict, and reports
/// what it received.
fn fake_rpcbind(replies: Vec<bool>) -> (SocketAddr, mpsc::Receiver<(RpcbProc, Rpcb)>) {
    fake_rpcbind_with(replies, Delivery::default())
}

fn fake_rpcbind_with(
    replies: Vec<bool>,
    delivery: Delivery,
) -> (SocketAddr, mpsc::Receiver<(RpcbProc, Rpcb)>) {
    let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind fake rpcbind");
    let addr = socket.local_addr().expect("fake rpcbind address");
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = [0_u8; 1024];
        for verdict in replies {
            let (n, from) = socket.recv_from(&mut buf).expect("recv call");
            let mut call = Cursor::new(&buf[..n]);
            let msg = deserialize::<rpc::rpc_msg>(&mut call).expect("call header");
            let rpc_body::CALL(body) = msg.body else {
                panic!("expected a call");
            };
            assert_eq!(body.prog, rpcb::PROGRAM);
            assert_eq!(body.vers, rpcb::VERSION);
            let args = deserialize::<Rpcb>(&mut call).expect("rpcb args");
            let proc = RpcbProc::from_u32(body.proc).expect("known procedure");
            tx.send((proc, args)).expect("report call");

            if let Some(gate) = &delivery.gate {
                let _ = gate.recv();
            }
            if delivery.junk_first {
                socket.send_to(&[0xde, 0xad, 0x01], from).expect("send junk");
            }
            let mut reply = Vec::new();
            rpc::make_success_reply(msg.xid).serialize(&mut reply).expect("reply header");
            verdict.serialize(&mut reply).expect("reply result");
            socket.send_to(&reply, from).expect("send reply");
        }
    });
    (addr, rx)
}

#[test]
fn set_sends_mapping_and_returns_verdict() {
    init_logging();
    let (addr, calls) = fake_rpcbind(vec![true, false]);
    let client = RpcbindClient::new(addr, Duration::from_secs(5)).with_owner("tester");

    assert!(client.set(100_099, 1, "tcp", "0.0.0.0.3.87").expect("first set"));
    assert!(!client.set(100_099, 1, "tcp", "0.0.0.0.3.87").expect("second set"));

    let (proc, args) = calls.recv().expect("first call");
    assert_eq!(proc, RpcbProc::RPCBPROC_SET);
    assert_eq!(
        args,
        Rpcb {
            r_prog: 100_099,
            r_vers: 1,
            r_netid: "tcp".to_string(),
            r_addr: "0.0.0.0.3.87".to_string(),
            r_owner: "tester".to_string(),
        }
    );
}

#[test]
fn unset_sends_empty_address() {
    init_logging();
    let (addr, calls) = fake_rpcbind(vec![true]);
    let client = RpcbindClient::new(addr, Duration::from_secs(5));

    assert!(client.unset(100_099, 2, "udp").expect("unset"));

    let (proc, args) = calls.recv().expect("unset call");
    assert_eq!(proc, RpcbProc::RPCBPROC_UNSET);
    assert_eq!(args.r_netid, "udp");
    assert_eq!(args.r_vers, 2);
    assert!(args.r_addr.is_empty());
}

#[test]
fn silent_rpcbind_times_out() {
    init_logging();
    let silent = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind silent socket");
    let client = RpcbindClient::new(
        silent.local_addr().expect("silent address"),
        Duration::from_millis(100),
    );

    assert!(client.set(100_099, 1, "udp", "127.0.0.1.8.1").is_err());
}

#[test]
fn undecodable_datagrams_are_skipped() {
    init_logging();
    let delivery = Delivery { junk_first: true, ..Delivery::default() };
    let (addr, calls) = fake_rpcbind_with(vec![true], delivery);
    let client = RpcbindClient::new(addr, Duration::from_secs(5));

    assert!(client.set(100_099, 1, "udp", "127.0.0.1.8.1").expect("set after junk"));
    assert_eq!(calls.recv().expect("set call").0, RpcbProc::RPCBPROC_SET);
}

#[test]
fn lookups_proceed_while_rpcbind_is_answering() {
    init_logging();
    let (release, gate) = mpsc::channel();
    let delivery = Delivery { gate: Some(gate), ..Delivery::default() };
    let (addr, calls) = fake_rpcbind_with(vec![true], delivery);
    let directory = ServiceDirectory::with_rpcbind(RpcbindClient::new(addr, Duration::from_secs(10)));

    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let factory = EndpointFactory::new(
        Arc::new(MockOpener::new(log)),
        Arc::new(StandardTransports),
        SvcConfig::default().with_reserved_port(false),
    );
    let provider = tcp_provider();
    let handle = factory
        .provision(EndpointSource::ToCreate(&provider), None, SizeHints::default())
        .expect("tcp endpoint");
    let dispatch = null_dispatch();

    thread::scope(|s| {
        let registering = s.spawn(|| directory.register(&handle, 100_099, 1, &dispatch, &provider));
        let (proc, _) = calls.recv_timeout(Duration::from_secs(5)).expect("set reaches rpcbind");
        assert_eq!(proc, RpcbProc::RPCBPROC_SET);

        let (answered, answer) = mpsc::channel();
        let directory = &directory;
        s.spawn(move || {
            let _ = answered.send(directory.lookup(100_099, 1, "tcp").is_some());
        });
        let during = answer.recv_timeout(Duration::from_secs(2));
        release.send(()).expect("release reply");

        assert_eq!(during, Ok(false), "lookup must not wait for rpcbind");
        assert!(registering.join().expect("register thread"));
    });

    assert!(directory.lookup(100_099, 1, "tcp").is_some());
    assert_eq!(directory.mappings()[0].r_addr, "0.0.0.0.156.64");
}

#[test]
fn universal_addresses() {
    let v4 = SocketAddr::from((Ipv4Addr::LOCALHOST, 2049));
    assert_eq!(taddr2uaddr(&v4), "127.0.0.1.8.1");
    assert_eq!(uaddr2taddr("127.0.0.1.8.1"), Some(v4));

    let v6 = SocketAddr::from((Ipv6Addr::LOCALHOST, 111));
    assert_eq!(taddr2uaddr(&v6), "::1.0.111");
    assert_eq!(uaddr2taddr("::1.0.111"), Some(v6));

    assert_eq!(uaddr2taddr("127.0.0.1.300.1"), None);
    assert_eq!(uaddr2taddr("localhost"), None);
}
