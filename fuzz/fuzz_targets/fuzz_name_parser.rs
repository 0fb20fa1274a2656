//! Fuzz target: `AdvertisedName::parse`
//!
//! Arbitrary UTF-8 names must parse without panicking and never yield an
//! aggregator larger than the platform table.
//!
//! cargo fuzz run fuzz_name_parser

#![no_main]

use libfuzzer_sys::fuzz_target;
use scalelink::config::MAX_PLATFORMS;
use scalelink::protocol::name::{AdvertisedName, Topology};

fuzz_target!(|data: &[u8]| {
    let Ok(name) = core::str::from_utf8(data) else {
        return;
    };
    let parsed = AdvertisedName::parse(name);
    assert_eq!(parsed.raw, name);
    if let Topology::Aggregator { platform_count } = parsed.topology {
        assert!(platform_count as usize <= MAX_PLATFORMS);
    }
});
