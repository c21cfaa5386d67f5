//! Test utilities for socksd integration tests
//!
//! A hand-rolled SOCKS5 client speaking raw frames, plus loopback target
//! servers the proxy forwards to.

use socksd::{Config, Server};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};

/// Base configuration for tests: loopback listener on an ephemeral port
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.server.port = 0;
    config
}

/// Start a server and wait for it to bind
pub async fn spawn_proxy(config: Config) -> (Arc<Server>, SocketAddr) {
    spawn_server(Server::new(config)).await
}

/// Start a prepared server and wait for it to bind
pub async fn spawn_server(server: Server) -> (Arc<Server>, SocketAddr) {
    let server = Arc::new(server);

    let serve = server.clone();
    tokio::spawn(async move {
        serve.listen_and_serve().await.expect("proxy failed");
    });

    let addr = server.local_addr().await.expect("proxy did not bind");
    (server, addr)
}

/// TCP target answering every "PING" with "PONG"
pub async fn spawn_pingpong_target() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4];
                while stream.read_exact(&mut buf).await.is_ok() {
                    if &buf == b"PING" {
                        let _ = stream.write_all(b"PONG").await;
                    }
                }
            });
        }
    });

    addr
}

/// UDP target echoing every datagram back to its sender
pub async fn spawn_udp_echo_target() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = [0u8; 65535];
        while let Ok((n, from)) = socket.recv_from(&mut buf).await {
            let _ = socket.send_to(&buf[..n], from).await;
        }
    });

    addr
}

/// Send the method-selection message and return the server's chosen method
pub async fn handshake(stream: &mut TcpStream, methods: &[u8]) -> u8 {
    let mut frame = vec![0x05, methods.len() as u8];
    frame.extend_from_slice(methods);
    stream.write_all(&frame).await.unwrap();

    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[0], 0x05);
    reply[1]
}

/// Run the username/password sub-negotiation and return the status byte
pub async fn sub_negotiate(stream: &mut TcpStream, username: &str, password: &str) -> u8 {
    let mut frame = vec![0x01, username.len() as u8];
    frame.extend_from_slice(username.as_bytes());
    frame.push(password.len() as u8);
    frame.extend_from_slice(password.as_bytes());
    stream.write_all(&frame).await.unwrap();

    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[0], 0x01);
    reply[1]
}

/// Build a request frame for an IPv4 destination
pub fn request_ipv4(command: u8, addr: SocketAddr) -> Vec<u8> {
    let ip = match addr {
        SocketAddr::V4(v4) => v4.ip().octets(),
        SocketAddr::V6(_) => panic!("expected an IPv4 address"),
    };

    let mut frame = vec![0x05, command, 0x00, 0x01];
    frame.extend_from_slice(&ip);
    frame.extend_from_slice(&addr.port().to_be_bytes());
    frame
}

/// Build a request frame for an FQDN destination
pub fn request_domain(command: u8, domain: &str, port: u16) -> Vec<u8> {
    let mut frame = vec![0x05, command, 0x00, 0x03, domain.len() as u8];
    frame.extend_from_slice(domain.as_bytes());
    frame.extend_from_slice(&port.to_be_bytes());
    frame
}

/// Assert the server closed the connection without sending anything more.
/// A reset counts: closing with unread client bytes raises one.
pub async fn assert_closed(stream: &mut TcpStream) {
    let mut rest = Vec::new();
    match stream.read_to_end(&mut rest).await {
        Ok(n) => assert_eq!(n, 0),
        Err(_) => {}
    }
}

/// Read a complete reply frame: `VER REP RSV ATYP BND.ADDR BND.PORT`
pub async fn read_reply(stream: &mut TcpStream) -> Vec<u8> {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await.unwrap();

    let addr_len = match header[3] {
        0x01 => 4,
        0x04 => 16,
        0x03 => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await.unwrap();
            let mut rest = vec![0u8; len[0] as usize + 2];
            stream.read_exact(&mut rest).await.unwrap();

            let mut frame = header.to_vec();
            frame.push(len[0]);
            frame.extend_from_slice(&rest);
            return frame;
        }
        other => panic!("unexpected ATYP in reply: {}", other),
    };

    let mut rest = vec![0u8; addr_len + 2];
    stream.read_exact(&mut rest).await.unwrap();

    let mut frame = header.to_vec();
    frame.extend_from_slice(&rest);
    frame
}

/// Build a UDP envelope for an IPv4 target
pub fn udp_envelope_ipv4(addr: SocketAddr, payload: &[u8]) -> Vec<u8> {
    let ip = match addr {
        SocketAddr::V4(v4) => v4.ip().octets(),
        SocketAddr::V6(_) => panic!("expected an IPv4 address"),
    };

    let mut frame = vec![0x00, 0x00, 0x00, 0x01];
    frame.extend_from_slice(&ip);
    frame.extend_from_slice(&addr.port().to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Build a UDP envelope for an FQDN target
pub fn udp_envelope_domain(domain: &str, port: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![0x00, 0x00, 0x00, 0x03, domain.len() as u8];
    frame.extend_from_slice(domain.as_bytes());
    frame.extend_from_slice(&port.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Build a UDP envelope for an IPv6 target. An IPv4 target is written in
/// its IPv4-mapped form so the relay can still reach it.
pub fn udp_envelope_ipv6(addr: SocketAddr, payload: &[u8]) -> Vec<u8> {
    let ip = match addr {
        SocketAddr::V4(v4) => v4.ip().to_ipv6_mapped().octets(),
        SocketAddr::V6(v6) => v6.ip().octets(),
    };

    let mut frame = vec![0x00, 0x00, 0x00, 0x04];
    frame.extend_from_slice(&ip);
    frame.extend_from_slice(&addr.port().to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}
