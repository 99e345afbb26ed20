#![no_main]

//! Frame decoding in the handshake engine.
//!
//! Frame format:
//! - content_type: 1 byte (21 alert, 22 handshake, 23 application data)
//! - version: 2 bytes (0x0001)
//! - length: 4 bytes
//! - body: `length` bytes

use std::sync::{Arc, OnceLock};

use libfuzzer_sys::fuzz_target;

use dualstack::crypto::rust_crypto;
use dualstack::{Config, Handshake, HandshakeState, ServerIdentity, SessionCache};

const FRAME_HEADER_LEN: usize = 7;

fn setup() -> &'static (Arc<Config>, Arc<ServerIdentity>) {
    static SETUP: OnceLock<(Arc<Config>, Arc<ServerIdentity>)> = OnceLock::new();
    SETUP.get_or_init(|| {
        let config = Arc::new(Config::builder().build().expect("config"));
        let identity = ServerIdentity::generate(&rust_crypto::default_provider()).expect("identity");
        (config, Arc::new(identity))
    })
}

fuzz_target!(|data: &[u8]| {
    let (config, identity) = setup();

    // The input as-is.
    let mut server = Handshake::server(config.clone(), identity.clone(), Arc::new(SessionCache::new()));
    if server.handle_frame(data).is_err() {
        assert!(server.state().is_terminal() || server.state() == HandshakeState::Idle);
    }

    // The input as the body of a well formed handshake frame.
    let mut framed = Vec::with_capacity(FRAME_HEADER_LEN + data.len());
    framed.push(22);
    framed.extend_from_slice(&[0x00, 0x01]);
    framed.extend_from_slice(&(data.len() as u32).to_be_bytes());
    framed.extend_from_slice(data);

    let mut server = Handshake::server(config.clone(), identity.clone(), Arc::new(SessionCache::new()));
    let _ = server.handle_frame(&framed);

    let mut client = Handshake::client(config.clone());
    if client.start().is_ok() {
        let _ = client.handle_frame(&framed);
    }
});
