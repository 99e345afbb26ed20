//! Handshake integration tests over the sans-IO engine.


use std::sync::Arc;

use dualstack::{CipherSuite, Config, Handshake, HandshakeError, HandshakeState, SessionCache};
use dualstack::SignatureAlgorithm;
use handshake_common::*;

#[test]
fn every_suite_negotiates() {
    let _ = env_logger::try_init();

    for suite in CipherSuite::all() {
        let config = config(&[*suite]);
        let identity = identity();

        let mut client = Handshake::client(config.clone());
        let mut server = Handshake::server(config, identity.clone(), Arc::new(SessionCache::new()));

        client.start().expect("start");
        let pumped = pump(&mut client, &mut server);
        assert!(pumped.client_error.is_none(), "{}: {:?}", suite, pumped);
        assert!(pumped.server_error.is_none(), "{}: {:?}", suite, pumped);

        assert_eq!(client.state(), HandshakeState::Established, "{}", suite);
        assert_eq!(server.state(), HandshakeState::Established, "{}", suite);
        assert_eq!(client.cipher_suite(), Some(*suite));
        assert_eq!(server.cipher_suite(), Some(*suite));

        let ck = client.session_keys().expect("client keys");
        let sk = server.session_keys().expect("server keys");
        assert_eq!(ck, sk);
        assert_ne!(ck.client_write_key(), ck.server_write_key());

        for alg in suite.signature_algorithms() {
            assert_eq!(client.server_public_key(*alg), identity.public_key(*alg));
        }
    }
}

#[test]
fn server_prefers_post_quantum() {
    let _ = env_logger::try_init();

    // Client lists classical first; the server still picks PQ.
    let client_config = config(&[
        CipherSuite::AES_128_GCM_SHA256,
        CipherSuite::MLKEM768_AES_256_GCM_SHA384,
    ]);
    let server_config = config(&[
        CipherSuite::AES_128_GCM_SHA256,
        CipherSuite::X25519_MLKEM768_AES_256_GCM_SHA384,
        CipherSuite::MLKEM768_AES_256_GCM_SHA384,
    ]);

    let mut client = Handshake::client(client_config);
    let mut server = server(server_config);
    client.start().unwrap();
    pump(&mut client, &mut server);

    assert_eq!(client.state(), HandshakeState::Established);
    assert_eq!(
        client.cipher_suite(),
        Some(CipherSuite::MLKEM768_AES_256_GCM_SHA384)
    );
}

#[test]
fn classical_when_no_pq_in_common() {
    let _ = env_logger::try_init();

    let mut client = Handshake::client(config(&[
        CipherSuite::X25519_MLKEM768_AES_256_GCM_SHA384,
        CipherSuite::CHACHA20_POLY1305_SHA256,
    ]));
    let mut server = server(config(&[
        CipherSuite::AES_128_GCM_SHA256,
        CipherSuite::CHACHA20_POLY1305_SHA256,
    ]));
    client.start().unwrap();
    pump(&mut client, &mut server);

    assert_eq!(client.state(), HandshakeState::Established);
    assert_eq!(
        server.cipher_suite(),
        Some(CipherSuite::CHACHA20_POLY1305_SHA256)
    );
}

#[test]
fn no_common_suite_aborts_both_sides() {
    let _ = env_logger::try_init();

    let mut client = Handshake::client(config(&[CipherSuite::AES_128_GCM_SHA256]));
    let mut server = server(config(&[CipherSuite::CHACHA20_POLY1305_SHA256]));
    client.start().unwrap();
    let pumped = pump(&mut client, &mut server);

    assert_eq!(pumped.server_error, Some(HandshakeError::NoCommonCipherSuite));
    assert_eq!(pumped.client_error, Some(HandshakeError::NoCommonCipherSuite));
    assert_eq!(client.state(), HandshakeState::Aborted);
    assert_eq!(server.state(), HandshakeState::Aborted);
    assert!(client.session_keys().is_none());
}

#[test]
fn server_require_pqc_refuses_classical_client() {
    let _ = env_logger::try_init();

    let mut client = Handshake::client(config(&[CipherSuite::AES_256_GCM_SHA384]));
    let mut server = server(pqc_config(CipherSuite::all()));
    client.start().unwrap();
    let pumped = pump(&mut client, &mut server);

    assert!(matches!(
        pumped.server_error,
        Some(HandshakeError::PolicyViolation(_))
    ));
    assert!(matches!(
        pumped.client_error,
        Some(HandshakeError::PolicyViolation(_))
    ));
    assert_eq!(server.state(), HandshakeState::Aborted);
}

#[test]
fn client_require_pqc_refuses_classical_server() {
    let _ = env_logger::try_init();

    let mut client = Handshake::client(pqc_config(&[
        CipherSuite::MLKEM768_AES_256_GCM_SHA384,
        CipherSuite::AES_128_GCM_SHA256,
    ]));
    let mut server = server(config(&[CipherSuite::AES_128_GCM_SHA256]));
    client.start().unwrap();
    let pumped = pump(&mut client, &mut server);

    assert!(matches!(
        pumped.client_error,
        Some(HandshakeError::PolicyViolation(_))
    ));
    assert!(matches!(
        pumped.server_error,
        Some(HandshakeError::PolicyViolation(_))
    ));
    assert_eq!(client.state(), HandshakeState::Aborted);
    assert_eq!(server.state(), HandshakeState::Aborted);
}

#[test]
fn state_progression() {
    let _ = env_logger::try_init();

    let config = config(&[CipherSuite::X25519_MLKEM768_AES_256_GCM_SHA384]);
    let mut client = Handshake::client(config.clone());
    let mut server = server(config);

    assert_eq!(client.state(), HandshakeState::Idle);
    assert_eq!(server.state(), HandshakeState::Idle);

    client.start().unwrap();
    assert_eq!(client.state(), HandshakeState::SuiteProposed);

    let hello = drain_outputs(&mut client);
    assert_eq!(hello.frames.len(), 1);
    assert_eq!(handshake_type(&hello.frames[0]), Some(CLIENT_HELLO));

    deliver_frames(&hello.frames, &mut server);
    assert_eq!(server.state(), HandshakeState::KeysExchanged);

    let flight = drain_outputs(&mut server);
    let types: Vec<_> = flight.frames.iter().filter_map(|f| handshake_type(f)).collect();
    assert_eq!(types, vec![SERVER_HELLO, CERTIFICATE_VERIFY, FINISHED]);

    deliver_frames(&flight.frames[..1], &mut client);
    assert_eq!(client.state(), HandshakeState::KeysExchanged);

    deliver_frames(&flight.frames[1..], &mut client);
    assert_eq!(client.state(), HandshakeState::Established);
    let finished = drain_outputs(&mut client);
    assert!(finished.established);
    assert_eq!(handshake_type(&finished.frames[0]), Some(FINISHED));

    // Server is established only after the client Finished.
    assert_eq!(server.state(), HandshakeState::KeysExchanged);
    assert!(deliver_frames(&finished.frames, &mut server).is_none());
    assert_eq!(server.state(), HandshakeState::Established);
}

#[test]
fn tampered_certificate_verify_is_rejected() {
    let _ = env_logger::try_init();

    let mut client = Handshake::client(config(&[CipherSuite::AES_128_GCM_SHA256]));
    let mut server = server(config(&[CipherSuite::AES_128_GCM_SHA256]));
    client.start().unwrap();

    let pumped = pump_tampered(&mut client, &mut server, |f| {
        if handshake_type(f) == Some(CERTIFICATE_VERIFY) {
            let last = f.len() - 1;
            f[last] ^= 0x01;
        }
    });

    assert!(matches!(
        pumped.client_error,
        Some(HandshakeError::HandshakeVerificationFailed(_))
    ));
    assert!(matches!(
        pumped.server_error,
        Some(HandshakeError::HandshakeVerificationFailed(_))
    ));
    assert_eq!(client.state(), HandshakeState::Aborted);
    assert_eq!(server.state(), HandshakeState::Aborted);
}

#[test]
fn tampered_finished_is_rejected() {
    let _ = env_logger::try_init();

    let suites = [CipherSuite::MLKEM768_AES_256_GCM_SHA384];
    let mut client = Handshake::client(config(&suites));
    let mut server = server(config(&suites));
    client.start().unwrap();

    let pumped = pump_tampered(&mut client, &mut server, |f| {
        if handshake_type(f) == Some(FINISHED) {
            f[FRAME_HEADER_LEN + 1] ^= 0x80;
        }
    });

    assert!(matches!(
        pumped.client_error,
        Some(HandshakeError::HandshakeVerificationFailed(_))
    ));
    assert_eq!(client.state(), HandshakeState::Aborted);
    assert_eq!(server.state(), HandshakeState::Aborted);
}

#[test]
fn pinned_server_key() {
    let _ = env_logger::try_init();

    let identity = identity();
    let good = identity.public_key(SignatureAlgorithm::Ed25519).unwrap().to_vec();
    let mut bad = good.clone();
    bad[0] ^= 0xff;

    for (pin, ok) in [(good, true), (bad, false)] {
        let client_config = Arc::new(
            Config::builder()
                .cipher_suites(&[CipherSuite::AES_256_GCM_SHA384])
                .trust_key(SignatureAlgorithm::Ed25519, &pin)
                .build()
                .unwrap(),
        );
        let mut client = Handshake::client(client_config);
        let mut server = Handshake::server(
            config(&[CipherSuite::AES_256_GCM_SHA384]),
            identity.clone(),
            Arc::new(SessionCache::new()),
        );
        client.start().unwrap();
        let pumped = pump(&mut client, &mut server);

        if ok {
            assert_eq!(client.state(), HandshakeState::Established);
        } else {
            assert!(matches!(
                pumped.client_error,
                Some(HandshakeError::HandshakeVerificationFailed(_))
            ));
            assert_eq!(server.state(), HandshakeState::Aborted);
        }
    }
}

#[test]
fn server_without_keys_for_suite_declines_it() {
    let _ = env_logger::try_init();

    let full = identity();
    // Ed25519 only: PQ suites need ML-DSA-65.
    let ed_only = dualstack::ServerIdentity::empty().with_key(
        SignatureAlgorithm::Ed25519,
        full.public_key(SignatureAlgorithm::Ed25519).unwrap(),
        &[0u8; 32],
    );
    let mut client = Handshake::client(config(&[CipherSuite::MLKEM768_AES_256_GCM_SHA384]));
    let mut server = Handshake::server(
        config(CipherSuite::all()),
        Arc::new(ed_only),
        Arc::new(SessionCache::new()),
    );
    client.start().unwrap();
    let pumped = pump(&mut client, &mut server);
    assert_eq!(pumped.server_error, Some(HandshakeError::NoCommonCipherSuite));
}

#[test]
fn application_data_both_ways() {
    let _ = env_logger::try_init();

    let config = config(&[CipherSuite::CHACHA20_POLY1305_SHA256]);
    let mut client = Handshake::client(config.clone());
    let mut server = server(config);
    client.start().unwrap();
    pump(&mut client, &mut server);

    client.send_application_data(b"ping").unwrap();
    server.send_application_data(b"pong").unwrap();
    let pumped = pump(&mut client, &mut server);

    assert_eq!(pumped.server_app_data, vec![b"ping".to_vec()]);
    assert_eq!(pumped.client_app_data, vec![b"pong".to_vec()]);
}

#[test]
fn large_application_data_is_split() {
    let _ = env_logger::try_init();

    let config = config(&[CipherSuite::AES_128_GCM_SHA256]);
    let mut client = Handshake::client(config.clone());
    let mut server = server(config);
    client.start().unwrap();
    pump(&mut client, &mut server);

    let data: Vec<u8> = (0..40_000u32).map(|i| i as u8).collect();
    client.send_application_data(&data).unwrap();

    let out = drain_outputs(&mut client);
    assert_eq!(out.frames.len(), 3);
    assert!(out.frames.iter().all(|f| f[0] == APPLICATION_DATA));

    deliver_frames(&out.frames, &mut server);
    let got: Vec<u8> = drain_outputs(&mut server).app_data.concat();
    assert_eq!(got, data);
}

#[test]
fn corrupted_record_aborts() {
    let _ = env_logger::try_init();

    let config = config(&[CipherSuite::AES_256_GCM_SHA384]);
    let mut client = Handshake::client(config.clone());
    let mut server = server(config);
    client.start().unwrap();
    pump(&mut client, &mut server);

    client.send_application_data(b"secret").unwrap();
    let mut out = drain_outputs(&mut client);
    let last = out.frames[0].len() - 1;
    out.frames[0][last] ^= 0x01;

    let err = deliver_frames(&out.frames, &mut server);
    assert!(matches!(
        err,
        Some(HandshakeError::HandshakeVerificationFailed(_))
    ));
    assert_eq!(server.state(), HandshakeState::Aborted);
    assert!(server.session_keys().is_none());
}

#[test]
fn close_zeroes_keys_and_notifies_peer() {
    let _ = env_logger::try_init();

    let config = config(&[CipherSuite::AES_128_GCM_SHA256]);
    let mut client = Handshake::client(config.clone());
    let mut server = server(config);
    client.start().unwrap();
    pump(&mut client, &mut server);
    assert!(client.session_keys().is_some());

    client.close();
    assert_eq!(client.state(), HandshakeState::Closed);
    assert!(client.session_keys().is_none());

    let out = drain_outputs(&mut client);
    assert_eq!(out.frames.len(), 1);
    assert_eq!(out.frames[0][0], ALERT);

    assert!(deliver_frames(&out.frames, &mut server).is_none());
    assert!(drain_outputs(&mut server).closed);
    assert_eq!(server.state(), HandshakeState::Closed);
    assert!(server.session_keys().is_none());

    // Nothing is accepted after close.
    assert!(client.send_application_data(b"late").is_err());
}

#[test]
fn cancel_mid_handshake_reaches_peer() {
    let _ = env_logger::try_init();

    let config = config(CipherSuite::all());
    let mut client = Handshake::client(config.clone());
    let mut server = server(config);
    client.start().unwrap();
    let hello = drain_outputs(&mut client);
    deliver_frames(&hello.frames, &mut server);
    drain_outputs(&mut server);

    server.abort(&HandshakeError::Cancelled);
    assert_eq!(server.state(), HandshakeState::Aborted);

    let alert = drain_outputs(&mut server);
    assert_eq!(
        deliver_frames(&alert.frames, &mut client),
        Some(HandshakeError::Cancelled)
    );
    assert_eq!(client.state(), HandshakeState::Aborted);
}

#[test]
fn garbage_handshake_message_is_a_decode_error() {
    let _ = env_logger::try_init();

    let mut server = server(config(CipherSuite::all()));
    // Handshake frame, body = unknown message type 99.
    let frame = [HANDSHAKE, 0x00, 0x01, 0x00, 0x00, 0x00, 0x03, 99, 0, 0];
    assert!(matches!(
        server.handle_frame(&frame),
        Err(HandshakeError::Decode(_))
    ));
    assert_eq!(server.state(), HandshakeState::Aborted);

    let out = drain_outputs(&mut server);
    assert_eq!(out.frames.len(), 1);
    assert_eq!(out.frames[0][0], ALERT);
}
