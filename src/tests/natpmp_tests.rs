use crate::gateway::natpmp::{
    NATPMP_VERSION, NatPmpOpcode, NatPmpResultCode, build_natpmp_map_request,
    parse_natpmp_external_address_response, parse_natpmp_map_response,
};
use crate::gateway::{MappingClient, MappingError, NatPmpClient, Technology, TransportProtocol};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::net::UdpSocket;

fn map_response(opcode: u8, result: u16, internal: u16, external: u16, lifetime: u32) -> Vec<u8> {
    let mut response = vec![NATPMP_VERSION, opcode];
    response.extend_from_slice(&result.to_be_bytes());
    response.extend_from_slice(&12345u32.to_be_bytes());
    response.extend_from_slice(&internal.to_be_bytes());
    response.extend_from_slice(&external.to_be_bytes());
    response.extend_from_slice(&lifetime.to_be_bytes());
    response
}

fn address_response(result: u16, ip: Ipv4Addr) -> Vec<u8> {
    let mut response = vec![NATPMP_VERSION, 128];
    response.extend_from_slice(&result.to_be_bytes());
    response.extend_from_slice(&12345u32.to_be_bytes());
    response.extend_from_slice(&ip.octets());
    response
}

/// Loopback NAT-PMP gateway that answers each request with `reply(request)`
async fn fake_gateway<F>(reply: F) -> SocketAddr
where
    F: Fn(&[u8]) -> Vec<u8> + Send + 'static,
{
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = [0u8; 64];
        while let Ok((len, peer)) = socket.recv_from(&mut buf).await {
            let response = reply(&buf[..len]);
            let _ = socket.send_to(&response, peer).await;
        }
    });
    addr
}

// ========================================================================
// Wire format
// ========================================================================

#[test]
fn test_natpmp_result_code_conversion() {
    assert_eq!(NatPmpResultCode::from_u16(0), Some(NatPmpResultCode::Success));
    assert_eq!(
        NatPmpResultCode::from_u16(2),
        Some(NatPmpResultCode::NotAuthorized)
    );
    assert_eq!(NatPmpResultCode::from_u16(99), None);
    assert_eq!(
        NatPmpResultCode::OutOfResources.to_error_message(),
        "Out of resources"
    );
}

#[test]
fn test_build_natpmp_map_request_tcp() {
    let request = build_natpmp_map_request(8080, 18080, 600, TransportProtocol::Tcp);

    assert_eq!(request[0], NATPMP_VERSION);
    assert_eq!(request[1], NatPmpOpcode::MapTcp as u8);
    assert_eq!(&request[2..4], &[0, 0], "reserved bytes must be zero");
    assert_eq!(u16::from_be_bytes([request[4], request[5]]), 8080);
    assert_eq!(u16::from_be_bytes([request[6], request[7]]), 18080);
    assert_eq!(
        u32::from_be_bytes([request[8], request[9], request[10], request[11]]),
        600
    );
}

#[test]
fn test_build_natpmp_map_request_udp_delete() {
    let request = build_natpmp_map_request(9000, 9000, 0, TransportProtocol::Udp);
    assert_eq!(request[1], NatPmpOpcode::MapUdp as u8);
    assert_eq!(&request[8..12], &[0, 0, 0, 0]);
}

#[test]
fn test_parse_natpmp_map_response() {
    let response = map_response(130, 0, 8080, 8081, 3600);
    let parsed = parse_natpmp_map_response(&response, NatPmpOpcode::MapTcp).unwrap();

    assert_eq!(parsed.epoch_secs, 12345);
    assert_eq!(parsed.internal_port, 8080);
    assert_eq!(parsed.external_port, 8081);
    assert_eq!(parsed.lifetime_secs, 3600);
}

#[test]
fn test_parse_natpmp_map_response_too_short() {
    let err = parse_natpmp_map_response(&[0, 130, 0, 0], NatPmpOpcode::MapTcp).unwrap_err();
    match err {
        MappingError::InvalidResponse(msg) => {
            assert_eq!(msg, "Response too short: 4 bytes (expected 16)")
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_parse_natpmp_short_error_reply() {
    // Unsupported version replies carry only the header and epoch
    let reply = [0, 130, 0, 1, 0, 0, 0, 42];
    let err = parse_natpmp_map_response(&reply, NatPmpOpcode::MapTcp).unwrap_err();
    match err {
        MappingError::GatewayError(msg) => assert_eq!(msg, "Unsupported NAT-PMP version"),
        other => panic!("unexpected error: {:?}", other),
    }

    let reply = [0, 128, 0, 1, 0, 0, 0, 42];
    let err = parse_natpmp_external_address_response(&reply).unwrap_err();
    assert!(matches!(err, MappingError::GatewayError(_)), "{:?}", err);

    let err = parse_natpmp_map_response(&[0, 130], NatPmpOpcode::MapTcp).unwrap_err();
    assert!(matches!(err, MappingError::InvalidResponse(_)), "{:?}", err);
}

#[test]
fn test_parse_natpmp_map_response_bad_version() {
    let mut response = map_response(130, 0, 1, 1, 1);
    response[0] = 2;
    let err = parse_natpmp_map_response(&response, NatPmpOpcode::MapTcp).unwrap_err();
    assert!(err.to_string().contains("Invalid version: 2"), "{}", err);
}

#[test]
fn test_parse_natpmp_map_response_wrong_opcode() {
    // UDP reply to a TCP request
    let response = map_response(129, 0, 1, 1, 1);
    let err = parse_natpmp_map_response(&response, NatPmpOpcode::MapTcp).unwrap_err();
    assert!(err.to_string().contains("Invalid opcode: 129"), "{}", err);
}

#[test]
fn test_parse_natpmp_map_response_error_code() {
    let response = map_response(130, 3, 0, 0, 0);
    let err = parse_natpmp_map_response(&response, NatPmpOpcode::MapTcp).unwrap_err();
    match err {
        MappingError::GatewayError(msg) => assert_eq!(msg, "Network failure"),
        other => panic!("unexpected error: {:?}", other),
    }

    let response = map_response(130, 42, 0, 0, 0);
    let err = parse_natpmp_map_response(&response, NatPmpOpcode::MapTcp).unwrap_err();
    assert!(matches!(err, MappingError::InvalidResponse(_)));
}

#[test]
fn test_parse_natpmp_external_address_response() {
    let response = address_response(0, Ipv4Addr::new(198, 51, 100, 20));
    assert_eq!(
        parse_natpmp_external_address_response(&response).unwrap(),
        Ipv4Addr::new(198, 51, 100, 20)
    );

    assert!(parse_natpmp_external_address_response(&response[..8]).is_err());
}

// ========================================================================
// Client over loopback
// ========================================================================

#[tokio::test]
async fn test_natpmp_client_add_mapping() {
    let server = fake_gateway(|request| {
        assert_eq!(request.len(), 12);
        let internal = u16::from_be_bytes([request[4], request[5]]);
        let lifetime = u32::from_be_bytes([request[8], request[9], request[10], request[11]]);
        // Gateway grants a different external port and a shorter lease
        map_response(128 + request[1], 0, internal, 40000, lifetime / 2)
    })
    .await;

    let client = NatPmpClient::with_server_addr(server);
    assert_eq!(client.technology(), Technology::NatPmp);
    assert_eq!(client.gateway(), IpAddr::V4(Ipv4Addr::LOCALHOST));

    let info = client
        .add_mapping(8080, 8080, TransportProtocol::Udp, 7200)
        .await
        .unwrap();

    assert_eq!(info.internal_port, 8080);
    assert_eq!(info.external_port, 40000);
    assert_eq!(info.lifetime_secs, 3600);
    assert_eq!(info.protocol, TransportProtocol::Udp);
    assert!(info.created_at_ms > 0);
}

#[tokio::test]
async fn test_natpmp_client_external_address() {
    let server = fake_gateway(|request| {
        assert_eq!(request, &[0u8, 0]);
        address_response(0, Ipv4Addr::new(203, 0, 113, 99))
    })
    .await;

    let client = NatPmpClient::with_server_addr(server);
    let ip = client.external_address().await.unwrap();
    assert_eq!(ip, IpAddr::V4(Ipv4Addr::new(203, 0, 113, 99)));
}

#[tokio::test]
async fn test_natpmp_client_refused_mapping() {
    let server = fake_gateway(|request| map_response(128 + request[1], 2, 0, 0, 0)).await;

    let client = NatPmpClient::with_server_addr(server);
    let err = client
        .add_mapping(22, 22, TransportProtocol::Tcp, 60)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Gateway error: Not authorized/refused");
}

#[tokio::test]
async fn test_natpmp_client_times_out() {
    // Bound but never answers
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let client =
        NatPmpClient::with_server_addr(silent.local_addr().unwrap()).with_max_attempts(2);

    let err = client
        .add_mapping(8080, 8080, TransportProtocol::Tcp, 60)
        .await
        .unwrap_err();
    assert!(matches!(err, MappingError::Timeout), "{:?}", err);
}

#[tokio::test]
async fn test_natpmp_client_delete_not_supported() {
    let client = NatPmpClient::new(Ipv4Addr::new(192, 168, 1, 1));
    let err = client
        .delete_mapping(8080, TransportProtocol::Tcp)
        .await
        .unwrap_err();
    assert!(matches!(err, MappingError::NotSupported));
}
