#![no_main]

//! Address, endpoint and CIDR parsing.
//!
//! Anything that parses must format back to a string that parses to the
//! same value.

use libfuzzer_sys::fuzz_target;

use dualstack::{Address, Cidr, Endpoint};

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(a) = Address::parse(s) {
        let formatted = a.to_string();
        assert_eq!(Address::parse(&formatted), Ok(a), "{}", formatted);
    }

    if let Ok(e) = Endpoint::parse(s) {
        let formatted = e.to_string();
        assert_eq!(Endpoint::parse(&formatted), Ok(e), "{}", formatted);
    }

    if let Ok(c) = Cidr::parse(s) {
        assert!(c.prefix() <= if c.network().is_v4() { 32 } else { 128 });
        assert!(c.contains(&c.network()));
    }
});
