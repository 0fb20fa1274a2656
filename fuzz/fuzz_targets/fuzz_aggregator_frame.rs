//! Fuzz target: aggregator frame decoding
//!
//! Drives arbitrary bytes through the general and platform decoders and
//! asserts that malformed input never panics, never resizes the table
//! past its capacity, and never leaves both violation flags set.
//!
//! cargo fuzz run fuzz_aggregator_frame

#![no_main]

use libfuzzer_sys::fuzz_target;
use scalelink::config::MAX_PLATFORMS;
use scalelink::protocol::aggregator::AggregatorState;
use scalelink::protocol::fields::PlatformField;
use scalelink::platform::PlatformState;

fuzz_target!(|data: &[u8]| {
    let mut state = AggregatorState::new();
    let _ = state.apply_general(data);
    assert!(state.platforms.len() <= MAX_PLATFORMS);

    // Feed successive 14-byte windows to every platform.
    for (i, chunk) in data.chunks(14).enumerate() {
        let id = (i % MAX_PLATFORMS) as u8 + 1;
        let _ = state.apply_platform(id, chunk);
    }
    for p in &state.platforms {
        assert!(!(p.overload && p.underload), "conflicting violation flags");
    }

    // Per-characteristic path: every field against the same payload.
    let mut pad = PlatformState::new(1);
    for field in PlatformField::ALL {
        let _ = pad.apply_field(field, data);
    }
    assert!(!(pad.overload && pad.underload));
    assert!(pad.battery_percent <= 100);
});
