//! Fuzz target for the planner answer decoder.
//!
//! Planner output is untrusted text; decoding must reject garbage with a
//! `DecodeError` and never panic.
//!
//! Run with: cargo +nightly fuzz run plan_decode_fuzz -- -max_total_time=60

#![no_main]

use cobuild_core::{decode, region_for, validate_within, PartitionConfig};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(plan) = decode(input) else {
        return;
    };

    assert!(!plan.block.is_empty(), "decoded plan must name a block");
    assert!(
        !plan.block.chars().any(char::is_whitespace),
        "block ids never contain whitespace"
    );

    // Bounds checking agrees with plain containment for pair 1.
    if let Ok(region) = region_for(1, &PartitionConfig::default()) {
        assert_eq!(validate_within(&plan, &region), region.contains(plan.target));
    }
});
