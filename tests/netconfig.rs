use rpcsvc_mamont::config::SvcConfig;
use rpcsvc_mamont::netconfig::{
    NetconfigDatabase, NetconfigSource, Nettype, ProviderDescriptor, Semantics, SocketType,
};
use rpcsvc_mamont::SvcError;

const NETCONFIG: &str = "\
#
# The Network Configuration File.
#
udp        tpi_clts      v     inet     udp     -       -
tcp        tpi_cots_ord  v     inet     tcp     -       -
udp6       tpi_clts      v     inet6    udp     -       -
tcp6       tpi_cots_ord  v     inet6    tcp     -       -
rawip      tpi_raw       -     inet      -      -       -
local      tpi_cots_ord  -     loopback  -      -       -
ticots     tpi_cots      v     loopback  -      /dev/ticots  straddr.so
sctp       tpi_cots_ord  b     inet     sctp    -       -
";

fn netids(providers: Vec<ProviderDescriptor>) -> Vec<String> {
    providers.into_iter().map(|p| p.netid).collect()
}

fn open(db: &NetconfigDatabase, selector: &str) -> Vec<String> {
    db.open(selector).expect("known selector").map(|p| p.netid).collect()
}

#[test]
fn parses_entries_and_flags() {
    let db = NetconfigDatabase::parse(NETCONFIG);
    assert_eq!(db.entries().len(), 8);

    let udp = db.get("udp").expect("udp entry");
    assert_eq!(udp.semantics, Semantics::Clts);
    assert!(udp.visible);
    assert_eq!(udp.protofmly, "inet");
    assert_eq!(udp.proto, "udp");
    assert_eq!(udp.device, "");
    assert!(udp.lookups.is_empty());
    assert_eq!(udp.socket_type(), SocketType::Datagram);

    let ticots = db.get("ticots").expect("ticots entry");
    assert_eq!(ticots.semantics, Semantics::Cots);
    assert_eq!(ticots.device, "/dev/ticots");
    assert_eq!(ticots.lookups, vec!["straddr.so".to_string()]);

    let sctp = db.get("sctp").expect("sctp entry");
    assert!(sctp.broadcast);
    assert!(!sctp.visible);
}

#[test]
fn malformed_lines_are_skipped() {
    let db = NetconfigDatabase::parse(
        "udp tpi_clts v inet udp - -\n\
         short tpi_clts v\n\
         odd tpi_bogus v inet udp - -\n\
         flags tpi_clts vx inet udp - -\n\
         tcp tpi_cots_ord v inet tcp - -\n",
    );
    assert_eq!(
        db.entries().iter().map(|e| e.netid.as_str()).collect::<Vec<_>>(),
        vec!["udp", "tcp"]
    );
}

#[test]
fn parse_line_rejects_short_entries() {
    let err = ProviderDescriptor::parse_line("udp tpi_clts v inet").expect_err("too short");
    assert!(matches!(err, SvcError::Configuration(_)));
}

#[test]
fn visible_selectors() {
    let db = NetconfigDatabase::parse(NETCONFIG);
    assert_eq!(open(&db, "visible"), vec!["udp", "tcp", "udp6", "tcp6", "ticots"]);
    assert_eq!(open(&db, "circuit_v"), vec!["tcp", "tcp6", "ticots"]);
    assert_eq!(open(&db, "datagram_v"), vec!["udp", "udp6"]);
}

#[test]
fn tcp_and_udp_need_an_internet_family() {
    let db = NetconfigDatabase::parse(NETCONFIG);
    assert_eq!(netids(db.select(Nettype::Tcp)), vec!["tcp", "tcp6"]);
    assert_eq!(netids(db.select(Nettype::Udp)), vec!["udp", "udp6"]);
}

#[test]
fn selectors_are_case_insensitive() {
    assert_eq!("VISIBLE".parse::<Nettype>().expect("visible"), Nettype::Visible);
    assert_eq!("Circuit_N".parse::<Nettype>().expect("circuit_n"), Nettype::CircuitN);
    assert_eq!("".parse::<Nettype>().expect("empty"), Nettype::Netpath);
}

#[test]
fn unknown_selector_is_rejected() {
    let db = NetconfigDatabase::parse(NETCONFIG);
    let err = db.open("bogus").expect_err("unknown selector");
    assert!(matches!(err, SvcError::UnknownNettype(ref s) if s == "bogus"));
}

#[test]
fn netpath_orders_and_filters_providers() {
    let db = NetconfigDatabase::parse(NETCONFIG)
        .with_netpath(Some("tcp6:nosuch:udp:rawip".to_string()));
    assert_eq!(open(&db, "netpath"), vec!["tcp6", "udp", "rawip"]);
    assert_eq!(open(&db, "circuit_n"), vec!["tcp6"]);
    assert_eq!(open(&db, "datagram_n"), vec!["udp"]);
    // Explicit selectors ignore NETPATH.
    assert_eq!(open(&db, "datagram_v"), vec!["udp", "udp6"]);
}

#[test]
fn unset_netpath_means_visible() {
    let db = NetconfigDatabase::parse(NETCONFIG);
    assert_eq!(open(&db, ""), open(&db, "visible"));
}

#[test]
fn builtin_table_is_used_when_file_is_missing() {
    let config = SvcConfig::default()
        .with_netconfig_path("/nonexistent/netconfig")
        .with_netpath("tcp");
    let db = NetconfigDatabase::load(&config);
    assert!(db.get("udp6").is_some());
    assert_eq!(open(&db, "netpath"), vec!["tcp"]);
}

#[test]
fn semantics_round_trip_through_names() {
    for name in ["tpi_clts", "tpi_cots", "tpi_cots_ord", "tpi_raw"] {
        let semantics: Semantics = name.parse().expect("semantics name");
        assert_eq!(semantics.to_string(), name);
    }
}
