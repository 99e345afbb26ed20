//! Well-known service ports and port classification.

/// TLS-protected service traffic.
pub const HTTPS: u16 = 443;

/// Signature reader endpoint.
pub const SIGNATURE_READER: u16 = 42;

/// Key distribution service.
pub const KEY_SERVICE: u16 = 84;

/// Management plane.
pub const MANAGEMENT: u16 = 886;

/// First port of the dynamic (ephemeral) range.
pub const DYNAMIC_START: u16 = 49152;

/// Last port of the dynamic (ephemeral) range.
pub const DYNAMIC_END: u16 = 65535;

/// A port usable as a connect target. Zero is reserved for "any".
pub fn is_valid(port: u16) -> bool {
    port > 0
}

pub fn is_dynamic(port: u16) -> bool {
    (DYNAMIC_START..=DYNAMIC_END).contains(&port)
}

pub fn is_well_known(port: u16) -> bool {
    port > 0 && port < 1024
}
