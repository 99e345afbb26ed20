//! Service: acceptor, queue and workers end to end.


use std::sync::Arc;
use std::time::Duration;

use dualstack::threat::{ThreatConfig, ThreatRule, RulePattern};
use dualstack::{Address, CipherSuite, Cidr, Error, SecureChannel, Service};
use dualstack::{ServiceConfig, StopFlag, ThreatLevel, ThreatMonitor, TransportError};
use handshake_common::*;

async fn echo(mut channel: SecureChannel) {
    while let Ok(Some(data)) = channel.recv().await {
        if channel.send(&data).await.is_err() {
            break;
        }
    }
}

fn service_config() -> ServiceConfig {
    ServiceConfig::builder()
        .bind_address(Address::LOCALHOST_V4)
        .workers(2)
        .queue_depth(4)
        .build()
        .unwrap()
}

#[tokio::test]
async fn serves_several_clients() {
    let _ = env_logger::try_init();

    let config = config(CipherSuite::all());
    let handle = Service::new(service_config(), config.clone(), identity())
        .start(echo)
        .expect("start");
    let local = handle.local_endpoint();

    let stop = StopFlag::new();
    let mut clients = Vec::new();
    for i in 0..3u8 {
        let mut c = SecureChannel::connect(local, config.clone(), &stop)
            .await
            .expect("connect");
        c.send(&[i; 3]).await.unwrap();
        assert_eq!(c.recv().await.unwrap(), Some(vec![i; 3]));
        clients.push(c);
    }
    for mut c in clients {
        c.close().await;
    }

    assert_eq!(handle.stats().accepted(), 3);
    assert_eq!(handle.stats().established(), 3);
    assert_eq!(handle.stats().rejected(), 0);
    assert!(wait_for(|| handle.stats().active() == 0).await);

    handle.stop();
    handle.join().await;

    let r = SecureChannel::connect(local, config, &stop).await;
    assert!(matches!(
        r,
        Err(Error::Transport(TransportError::ConnectionFailed { .. }))
    ));
}

async fn wait_for(what: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if what() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    what()
}

#[tokio::test]
async fn open_sessions_do_not_hold_workers() {
    let _ = env_logger::try_init();

    let service_config = ServiceConfig::builder()
        .bind_address(Address::LOCALHOST_V4)
        .workers(1)
        .build()
        .unwrap();
    let config = config(CipherSuite::all());
    let handle = Service::new(service_config, config.clone(), identity())
        .start(echo)
        .unwrap();

    let stop = StopFlag::new();
    let mut clients = Vec::new();
    for i in 0..4u8 {
        let mut c = tokio::time::timeout(
            Duration::from_secs(5),
            SecureChannel::connect(handle.local_endpoint(), config.clone(), &stop),
        )
        .await
        .expect("one worker, yet still accepting")
        .unwrap();
        c.send(&[i]).await.unwrap();
        assert_eq!(c.recv().await.unwrap(), Some(vec![i]));
        clients.push(c);
    }
    assert_eq!(handle.stats().active(), 4);
    assert_eq!(handle.stats().established(), 4);

    for mut c in clients.drain(..2) {
        c.close().await;
    }
    assert!(wait_for(|| handle.stats().active() == 2).await);

    for mut c in clients {
        c.close().await;
    }
    assert!(wait_for(|| handle.stats().active() == 0).await);
    assert_eq!(handle.stats().established(), 4);

    handle.stop();
    handle.join().await;
}

async fn panics(_channel: SecureChannel) {
    panic!("handler failure");
}

#[tokio::test]
async fn handler_panic_ends_only_its_session() {
    let _ = env_logger::try_init();

    let service_config = ServiceConfig::builder()
        .bind_address(Address::LOCALHOST_V4)
        .workers(1)
        .build()
        .unwrap();
    let config = config(CipherSuite::all());
    let handle = Service::new(service_config, config.clone(), identity())
        .start(panics)
        .unwrap();

    let stop = StopFlag::new();
    for _ in 0..3 {
        let c = tokio::time::timeout(
            Duration::from_secs(5),
            SecureChannel::connect(handle.local_endpoint(), config.clone(), &stop),
        )
        .await
        .expect("service still accepting");
        assert!(c.is_ok());
    }

    assert!(wait_for(|| handle.stats().established() == 3).await);
    assert!(wait_for(|| handle.stats().active() == 0).await);

    handle.stop();
    handle.join().await;
}

#[tokio::test]
async fn blocked_peer_is_rejected() {
    let _ = env_logger::try_init();

    let threats = Arc::new(ThreatMonitor::new(ThreatConfig {
        blocklist: vec![Address::LOCALHOST_V4],
        ..Default::default()
    }));

    let config = config(CipherSuite::all());
    let handle = Service::new(service_config(), config.clone(), identity())
        .with_threat_monitor(threats.clone())
        .start(echo)
        .unwrap();

    let stop = StopFlag::new();
    let r = SecureChannel::connect(handle.local_endpoint(), config, &stop).await;
    assert!(r.is_err());

    assert_eq!(handle.stats().rejected(), 1);
    assert_eq!(handle.stats().established(), 0);
    let records = threats.records();
    assert_eq!(records.last().unwrap().source, Address::LOCALHOST_V4);
    assert_eq!(records.last().unwrap().level, ThreatLevel::High);

    handle.stop();
    handle.join().await;
}

#[tokio::test]
async fn threshold_controls_rejection() {
    let _ = env_logger::try_init();

    let threats = Arc::new(ThreatMonitor::default());
    threats.add_rule(ThreatRule::new(
        RulePattern::Range(Cidr::parse("127.0.0.0/8").unwrap()),
        ThreatLevel::Medium,
        "loopback",
    ));

    let config = config(CipherSuite::all());
    let service_config = ServiceConfig::builder()
        .bind_address(Address::LOCALHOST_V4)
        .reject_threshold(ThreatLevel::Critical)
        .build()
        .unwrap();
    let handle = Service::new(service_config, config.clone(), identity())
        .with_threat_monitor(threats)
        .start(echo)
        .unwrap();

    // Medium is below Critical: served.
    let stop = StopFlag::new();
    let mut c = SecureChannel::connect(handle.local_endpoint(), config, &stop)
        .await
        .unwrap();
    c.send(b"ok").await.unwrap();
    assert_eq!(c.recv().await.unwrap(), Some(b"ok".to_vec()));
    c.close().await;

    handle.stop();
    handle.join().await;
}

#[tokio::test]
async fn failed_handshakes_are_counted() {
    let _ = env_logger::try_init();

    let handle = Service::new(
        service_config(),
        pqc_config(CipherSuite::all()),
        identity(),
    )
    .start(echo)
    .unwrap();

    let stop = StopFlag::new();
    let r = SecureChannel::connect(
        handle.local_endpoint(),
        config(&[CipherSuite::AES_128_GCM_SHA256]),
        &stop,
    )
    .await;
    assert!(matches!(
        r,
        Err(Error::Handshake(dualstack::HandshakeError::PolicyViolation(_)))
    ));

    // The worker counts after it flushed the alert; give it a moment.
    for _ in 0..50 {
        if handle.stats().failed() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(handle.stats().failed(), 1);

    handle.stop();
    handle.join().await;
}

#[tokio::test]
async fn bind_conflict_is_returned_from_start() {
    let _ = env_logger::try_init();

    let config = config(CipherSuite::all());
    let first = Service::new(service_config(), config.clone(), identity())
        .start(echo)
        .unwrap();
    let port = first.local_endpoint().port();

    let clash = ServiceConfig::builder()
        .bind_address(Address::LOCALHOST_V4)
        .port(port)
        .build()
        .unwrap();
    let r = Service::new(clash, config, identity()).start(echo);
    assert!(matches!(
        r,
        Err(Error::Transport(TransportError::BindFailed { .. }))
    ));

    first.stop();
    first.join().await;
}
