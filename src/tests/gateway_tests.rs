use crate::Error;
use crate::gateway::route::{parse_netstat_routes, parse_proc_net_route, parse_route_print};
use crate::gateway::upnp::{mapping_description, upnp_protocol};
use crate::gateway::*;
use std::net::Ipv4Addr;

const PROC_NET_ROUTE: &str = "\
Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT
eth0\t0000A8C0\t00000000\t0001\t0\t0\t100\t00FFFFFF\t0\t0\t0
eth0\t00000000\t0101A8C0\t0003\t0\t0\t100\t00000000\t0\t0\t0
";

#[test]
fn test_parse_proc_net_route_default_gateway() {
    assert_eq!(
        parse_proc_net_route(PROC_NET_ROUTE),
        Some(Ipv4Addr::new(192, 168, 1, 1))
    );
}

#[test]
fn test_parse_proc_net_route_without_default() {
    let table = "\
Iface\tDestination\tGateway \tFlags
eth0\t0000A8C0\t00000000\t0001
";
    assert_eq!(parse_proc_net_route(table), None);
    assert_eq!(parse_proc_net_route(""), None);
}

#[test]
fn test_parse_proc_net_route_skips_zero_gateway() {
    let table = "\
Iface\tDestination\tGateway \tFlags
tun0\t00000000\t00000000\t0001
eth0\t00000000\t0100000A\t0003
";
    assert_eq!(parse_proc_net_route(table), Some(Ipv4Addr::new(10, 0, 0, 1)));
}

#[test]
fn test_parse_netstat_routes() {
    let output = "\
Routing tables

Internet:
Destination        Gateway            Flags        Netif Expire
default            10.0.0.138         UGScg          en0
127                127.0.0.1          UCS            lo0
";
    assert_eq!(parse_netstat_routes(output), Some(Ipv4Addr::new(10, 0, 0, 138)));
    assert_eq!(parse_netstat_routes("no routes here"), None);
}

#[test]
fn test_parse_route_print() {
    let output = "\
IPv4 Route Table
===========================================================================
Active Routes:
Network Destination        Netmask          Gateway       Interface  Metric
          0.0.0.0          0.0.0.0      192.168.0.1    192.168.0.42     25
===========================================================================
";
    assert_eq!(parse_route_print(output), Some(Ipv4Addr::new(192, 168, 0, 1)));
}

#[test]
fn test_transport_protocol_from_str() {
    assert_eq!("tcp".parse::<TransportProtocol>().unwrap(), TransportProtocol::Tcp);
    assert_eq!("UDP".parse::<TransportProtocol>().unwrap(), TransportProtocol::Udp);
    assert_eq!("Tcp".parse::<TransportProtocol>().unwrap(), TransportProtocol::Tcp);

    let err = "sctp".parse::<TransportProtocol>().unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert!(err.to_string().contains("sctp"));
}

#[test]
fn test_transport_protocol_display_and_default() {
    assert_eq!(TransportProtocol::default(), TransportProtocol::Tcp);
    assert_eq!(TransportProtocol::Udp.to_string(), "udp");
    assert_eq!(
        serde_json::to_string(&TransportProtocol::Tcp).unwrap(),
        "\"tcp\""
    );
}

#[test]
fn test_technology_labels() {
    assert_eq!(Technology::default(), Technology::Auto);
    assert_eq!(Technology::Auto.label(), "NAT-PMP/UPnP");
    assert_eq!(Technology::NatPmp.to_string(), "NAT-PMP");
    assert_eq!(Technology::Upnp.to_string(), "UPnP");
}

#[test]
fn test_mapping_result_constructors() {
    let ok = MappingResult::succeeded(Technology::Upnp, "done", None);
    assert!(ok.is_ok());
    assert_eq!(ok.outcome, Outcome::Ok);
    assert_eq!(ok.expires_in_secs, None);

    let failed = MappingResult::failed(Technology::Auto, "nope");
    assert!(!failed.is_ok());
    assert_eq!(failed.message, "nope");
    assert!(failed.mapping.is_none());

    let expiring = ok.with_expiry(Some(60));
    assert_eq!(expiring.expires_in_secs, Some(60));
}

#[test]
fn test_error_messages() {
    assert_eq!(Error::NoGatewayFound.to_string(), "no gateways can be found");
    assert_eq!(
        Error::ProtocolUnavailable(Technology::Upnp.label()).to_string(),
        "UPnP not available"
    );
    // Mapping errors pass through unchanged
    let err = Error::from(MappingError::Timeout);
    assert_eq!(err.to_string(), MappingError::Timeout.to_string());
}

#[test]
fn test_upnp_protocol_conversion() {
    assert!(matches!(
        upnp_protocol(TransportProtocol::Tcp),
        igd_next::PortMappingProtocol::TCP
    ));
    assert!(matches!(
        upnp_protocol(TransportProtocol::Udp),
        igd_next::PortMappingProtocol::UDP
    ));
}

#[test]
fn test_upnp_mapping_description() {
    assert_eq!(
        mapping_description(TransportProtocol::Udp, 51413),
        "portmapper-udp-51413"
    );
}
