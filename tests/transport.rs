//! Socket and acceptor tests over loopback.

use std::time::Duration;

use dualstack::transport::framed::{read_frame, write_frame};
use dualstack::{Acceptor, AcceptorState, Address, Endpoint, Socket, SocketState, TransportError};

#[tokio::test]
async fn dual_stack_accepts_both_families() {
    let _ = env_logger::try_init();

    let mut acceptor = Acceptor::new();
    let local = acceptor.listen(0, None).expect("listen");
    let port = local.port();

    let v4 = Endpoint::new(Address::LOCALHOST_V4, port);
    let client = tokio::spawn(async move { Socket::connect_to(v4).await });
    let accepted = acceptor.accept().await.expect("accept v4");
    let mut client = client.await.unwrap().expect("connect v4");

    let peer = accepted.peer_endpoint().unwrap();
    assert!(peer.address().is_v4(), "v4 peer reported as {}", peer);
    assert_eq!(peer.address(), Address::LOCALHOST_V4);
    assert_eq!(client.state(), SocketState::Connected);
    client.close().await;

    if let Err(e) = socket2::Socket::new(socket2::Domain::IPV6, socket2::Type::STREAM, None) {
        eprintln!("skipping IPv6 half: no IPv6 sockets on this host ({})", e);
        return;
    }
    assert!(acceptor.dual_stack_enabled());

    let v6 = Endpoint::new(Address::LOCALHOST_V6, port);
    let client = tokio::spawn(async move { Socket::connect_to(v6).await });
    let accepted = tokio::time::timeout(Duration::from_secs(5), acceptor.accept())
        .await
        .expect("v6 accept timed out")
        .expect("accept v6");
    let mut c = client.await.unwrap().expect("connect v6");

    let peer = accepted.peer_endpoint().unwrap();
    assert!(peer.address().is_v6(), "v6 peer reported as {}", peer);
    assert_eq!(peer.address(), Address::LOCALHOST_V6);
    c.close().await;
}

#[tokio::test]
async fn ipv4_bind_address_is_single_stack() {
    let mut acceptor = Acceptor::new();
    let local = acceptor.listen(0, Some(Address::LOCALHOST_V4)).unwrap();
    assert!(!acceptor.dual_stack_enabled());
    assert_eq!(local.address(), Address::LOCALHOST_V4);
    assert_ne!(local.port(), 0);
}

#[tokio::test]
async fn accept_lifecycle() {
    let mut acceptor = Acceptor::new();
    assert!(matches!(
        acceptor.accept().await,
        Err(TransportError::InvalidState(_))
    ));

    acceptor.listen(0, Some(Address::LOCALHOST_V4)).unwrap();
    assert_eq!(acceptor.state(), AcceptorState::Listening);
    assert!(matches!(
        acceptor.listen(0, None),
        Err(TransportError::InvalidState(_))
    ));

    assert!(matches!(
        acceptor.accept_timeout(Duration::from_millis(50)).await,
        Err(TransportError::Timeout)
    ));

    acceptor.stop_listening();
    acceptor.stop_listening();
    assert_eq!(acceptor.state(), AcceptorState::Stopped);
    assert!(matches!(
        acceptor.accept().await,
        Err(TransportError::Closed)
    ));
}

#[tokio::test]
async fn port_in_use_is_bind_failed() {
    let mut a = Acceptor::new();
    let local = a.listen(0, Some(Address::LOCALHOST_V4)).unwrap();

    // Address reuse does not allow two live listeners on one port.
    let mut b = Acceptor::new();
    let r = b.listen(local.port(), Some(Address::LOCALHOST_V4));
    assert!(
        matches!(r, Err(TransportError::BindFailed { .. }) | Err(TransportError::ListenFailed { .. })),
        "{:?}",
        r
    );
}

#[tokio::test]
async fn connect_rejects_bad_endpoints() {
    let mut s = Socket::new();
    assert!(matches!(
        s.connect(Endpoint::new(Address::LOCALHOST_V4, 0)).await,
        Err(TransportError::InvalidAddress(_))
    ));
    assert!(matches!(
        s.connect(Endpoint::new(Address::UNSPECIFIED_V6, 80)).await,
        Err(TransportError::InvalidAddress(_))
    ));
    assert_eq!(s.state(), SocketState::Unconnected);
}

#[tokio::test]
async fn connect_refused_is_connection_failed() {
    // Grab a free port, then release it.
    let port = {
        let mut a = Acceptor::new();
        let local = a.listen(0, Some(Address::LOCALHOST_V4)).unwrap();
        a.stop_listening();
        local.port()
    };

    let r = Socket::connect_to(Endpoint::new(Address::LOCALHOST_V4, port)).await;
    assert!(matches!(r, Err(TransportError::ConnectionFailed { .. })));
}

#[tokio::test]
async fn closed_socket_refuses_io() {
    let mut acceptor = Acceptor::new();
    let local = acceptor.listen(0, Some(Address::LOCALHOST_V4)).unwrap();

    let client = tokio::spawn(async move { Socket::connect_to(local).await.unwrap() });
    let mut server = acceptor.accept().await.unwrap();
    let mut client = client.await.unwrap();

    client.send(b"x").await.unwrap();
    let mut buf = [0u8; 8];
    assert_eq!(server.receive(&mut buf).await.unwrap(), 1);

    client.close().await;
    client.close().await;
    assert_eq!(client.state(), SocketState::Closed);
    assert!(matches!(client.send(b"y").await, Err(TransportError::Closed)));
    assert!(matches!(
        client.receive(&mut buf).await,
        Err(TransportError::Closed)
    ));

    // Orderly close reads as zero on the other side.
    assert_eq!(server.receive(&mut buf).await.unwrap(), 0);
}

#[tokio::test]
async fn oversized_frame_header_is_rejected() {
    let mut acceptor = Acceptor::new();
    let local = acceptor.listen(0, Some(Address::LOCALHOST_V4)).unwrap();

    let client = tokio::spawn(async move {
        let mut s = Socket::connect_to(local).await.unwrap();
        // Handshake frame claiming a 16 MiB body.
        write_frame(&mut s, &[22, 0x00, 0x01, 0x01, 0x00, 0x00, 0x00])
            .await
            .unwrap();
        s
    });

    let mut server = acceptor.accept().await.unwrap();
    assert!(matches!(
        read_frame(&mut server).await,
        Err(TransportError::Frame(_))
    ));
    drop(client.await.unwrap());
}
