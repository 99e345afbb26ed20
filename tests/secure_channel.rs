//! SecureChannel over real loopback sockets.


use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dualstack::transport::framed::read_frame;
use dualstack::{Acceptor, Address, AuthError, CipherSuite, Config, Endpoint, Error};
use dualstack::{HandshakeError, HandshakeState, SecureChannel, ServerIdentity, SessionAuth};
use dualstack::{SessionCache, SignatureAlgorithm, Socket, StopFlag, TransportError};
use handshake_common::*;

struct Listener {
    acceptor: Acceptor,
    local: Endpoint,
    config: Arc<Config>,
    identity: Arc<ServerIdentity>,
    cache: Arc<SessionCache>,
}

impl Listener {
    fn new(config: Arc<Config>) -> Listener {
        let mut acceptor = Acceptor::new();
        let local = acceptor
            .listen(0, Some(Address::LOCALHOST_V4))
            .expect("listen");
        Listener {
            acceptor,
            local,
            config,
            identity: identity(),
            cache: Arc::new(SessionCache::new()),
        }
    }

    async fn accept(&self, stop: &StopFlag) -> Result<SecureChannel, Error> {
        let socket = self.acceptor.accept().await?;
        SecureChannel::accept(
            socket,
            self.config.clone(),
            self.identity.clone(),
            self.cache.clone(),
            stop,
        )
        .await
    }
}

fn short_timeout_config() -> Arc<Config> {
    Arc::new(
        Config::builder()
            .step_timeout(Duration::from_millis(200))
            .build()
            .unwrap(),
    )
}

#[tokio::test]
async fn echo_over_secure_channel() {
    let _ = env_logger::try_init();

    let config = config(CipherSuite::all());
    let listener = Listener::new(config.clone());
    let local = listener.local;

    let server = tokio::spawn(async move {
        let stop = StopFlag::new();
        let mut channel = listener.accept(&stop).await.expect("server handshake");
        assert_eq!(channel.state(), HandshakeState::Established);
        while let Some(data) = channel.recv().await.expect("recv") {
            channel.send(&data).await.expect("send");
        }
        assert_eq!(channel.state(), HandshakeState::Closed);
    });

    let stop = StopFlag::new();
    let mut client = SecureChannel::connect(local, config, &stop)
        .await
        .expect("client handshake");
    assert_eq!(
        client.cipher_suite(),
        Some(CipherSuite::X25519_MLKEM768_AES_256_GCM_SHA384)
    );
    assert_eq!(client.peer_endpoint(), local);

    client.send(b"hello").await.unwrap();
    assert_eq!(client.recv().await.unwrap(), Some(b"hello".to_vec()));

    let big = vec![7u8; 50_000];
    client.send(&big).await.unwrap();
    let mut got = Vec::new();
    while got.len() < big.len() {
        got.extend(client.recv().await.unwrap().expect("data"));
    }
    assert_eq!(got, big);

    client.close().await;
    assert_eq!(client.state(), HandshakeState::Closed);
    server.await.unwrap();
}

#[tokio::test]
async fn resumption_over_the_wire() {
    let _ = env_logger::try_init();

    let config = config(&[CipherSuite::AES_128_GCM_SHA256]);
    let listener = Arc::new(Listener::new(config.clone()));
    let local = listener.local;

    let server = {
        let listener = listener.clone();
        tokio::spawn(async move {
            let stop = StopFlag::new();
            for _ in 0..2 {
                let mut c = listener.accept(&stop).await.expect("handshake");
                let _ = c.recv().await;
            }
        })
    };

    let stop = StopFlag::new();
    let mut first = SecureChannel::connect(local, config.clone(), &stop)
        .await
        .unwrap();
    assert!(!first.is_resumed());
    let ticket = first.resumption_ticket().expect("ticket");
    first.close().await;

    let mut second = SecureChannel::connect_with_ticket(local, config, ticket, &stop)
        .await
        .unwrap();
    assert!(second.is_resumed());
    second.close().await;

    server.await.unwrap();
}

#[tokio::test]
async fn bearer_token_after_handshake() {
    let _ = env_logger::try_init();

    let auth = Arc::new(SessionAuth::generate(SignatureAlgorithm::Ed25519).unwrap());
    let rogue = SessionAuth::generate(SignatureAlgorithm::Ed25519).unwrap();

    let config = config(CipherSuite::all());
    let listener = Listener::new(config.clone());
    let local = listener.local;

    let server = {
        let auth = auth.clone();
        tokio::spawn(async move {
            let stop = StopFlag::new();
            let mut channel = listener.accept(&stop).await.unwrap();
            let key = auth.public_key().to_vec();

            // Forged token: rejected, the session stays up.
            let r = channel.expect_bearer(&auth, &key).await;
            assert!(matches!(r, Err(Error::Auth(AuthError::SignatureInvalid))));
            assert_eq!(channel.state(), HandshakeState::Established);

            // Garbage: malformed.
            let r = channel.expect_bearer(&auth, &key).await;
            assert!(matches!(r, Err(Error::Auth(AuthError::Malformed))));

            let token = channel.expect_bearer(&auth, &key).await.expect("valid token");
            assert_eq!(token.subject(), "alice");
            assert_eq!(token.claim("role"), Some("admin"));
            channel.send(b"welcome").await.unwrap();
        })
    };

    let stop = StopFlag::new();
    let mut client = SecureChannel::connect(local, config, &stop).await.unwrap();

    let mut claims = BTreeMap::new();
    claims.insert("role".to_string(), "admin".to_string());
    let forged = rogue
        .create("alice", Duration::from_secs(60), claims.clone())
        .unwrap();
    client.present_bearer(&forged).await.unwrap();
    client.send(b"not.a token").await.unwrap();

    let token = auth
        .create("alice", Duration::from_secs(60), claims)
        .unwrap();
    client.present_bearer(&token).await.unwrap();

    assert_eq!(client.recv().await.unwrap(), Some(b"welcome".to_vec()));
    server.await.unwrap();
}

#[tokio::test]
async fn silent_client_hits_step_timeout() {
    let _ = env_logger::try_init();

    let listener = Listener::new(short_timeout_config());
    let local = listener.local;

    // Connects, then says nothing.
    let silent = tokio::spawn(async move {
        let mut s = Socket::connect_to(local).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        s.close().await;
    });

    let stop = StopFlag::new();
    let r = listener.accept(&stop).await;
    assert!(
        matches!(r, Err(Error::Handshake(HandshakeError::StepTimeout))),
        "{:?}",
        r
    );
    silent.abort();
}

#[tokio::test]
async fn silent_server_hits_step_timeout_and_gets_an_alert() {
    let _ = env_logger::try_init();

    let mut acceptor = Acceptor::new();
    let local = acceptor.listen(0, Some(Address::LOCALHOST_V4)).unwrap();

    let client = tokio::spawn(async move {
        let stop = StopFlag::new();
        SecureChannel::connect(local, short_timeout_config(), &stop).await
    });

    let mut raw = acceptor.accept().await.unwrap();
    let hello = read_frame(&mut raw).await.unwrap();
    assert_eq!(handshake_type(&hello), Some(CLIENT_HELLO));

    let r = client.await.unwrap();
    assert!(matches!(
        r,
        Err(Error::Handshake(HandshakeError::StepTimeout))
    ));

    // user_canceled arrives before the close.
    let alert = read_frame(&mut raw).await.unwrap();
    assert_eq!(alert[0], ALERT);
}

#[tokio::test]
async fn malformed_frame_header_gets_decode_error() {
    let _ = env_logger::try_init();

    let listener = Listener::new(config(CipherSuite::all()));
    let local = listener.local;

    let peer = tokio::spawn(async move {
        let mut raw = Socket::connect_to(local).await.unwrap();
        // handshake content type, unknown version
        raw.send(&[HANDSHAKE, 0x99, 0x99, 0, 0, 0, 4]).await.unwrap();
        read_frame(&mut raw).await
    });

    let stop = StopFlag::new();
    let r = listener.accept(&stop).await;
    assert!(
        matches!(r, Err(Error::Transport(TransportError::Frame(_)))),
        "{:?}",
        r
    );

    let alert = peer.await.unwrap().expect("alert before close");
    assert_eq!(alert[0], ALERT);
    // fatal, decode_error
    assert_eq!(&alert[FRAME_HEADER_LEN..], &[2, 50]);
}

#[tokio::test]
async fn stop_flag_cancels_handshake() {
    let _ = env_logger::try_init();

    let listener = Listener::new(config(CipherSuite::all()));
    let local = listener.local;

    let silent = tokio::spawn(async move {
        let mut s = Socket::connect_to(local).await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        s.close().await;
    });

    let stop = StopFlag::new();
    let stopper = {
        let stop = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            stop.stop();
        })
    };

    let r = listener.accept(&stop).await;
    assert!(
        matches!(r, Err(Error::Handshake(HandshakeError::Cancelled))),
        "{:?}",
        r
    );
    stopper.await.unwrap();
    silent.abort();
}

#[tokio::test]
async fn no_common_suite_over_the_wire() {
    let _ = env_logger::try_init();

    let listener = Listener::new(config(&[CipherSuite::AES_256_GCM_SHA384]));
    let local = listener.local;

    let server = tokio::spawn(async move {
        let stop = StopFlag::new();
        listener.accept(&stop).await
    });

    let stop = StopFlag::new();
    let r = SecureChannel::connect(local, config(&[CipherSuite::AES_128_GCM_SHA256]), &stop).await;
    assert!(matches!(
        r,
        Err(Error::Handshake(HandshakeError::NoCommonCipherSuite))
    ));
    assert!(matches!(
        server.await.unwrap(),
        Err(Error::Handshake(HandshakeError::NoCommonCipherSuite))
    ));
}
