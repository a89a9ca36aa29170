//! Fuzz target for the pair-to-region partition.
//!
//! For any valid layout, two distinct pairs must get disjoint regions and
//! no pair id may cause a panic (overflow is an error, not a wrap).
//!
//! Run with: cargo +nightly fuzz run partition_fuzz -- -max_total_time=60

#![no_main]

use cobuild_core::{region_for, BlockPos, PartitionConfig};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (i64, i64, [i32; 3], [i32; 3], i32)| {
    let (a, b, origin, extent, cell_size) = input;
    let partition = PartitionConfig {
        origin: BlockPos::from(origin),
        extent: BlockPos::from(extent),
        cell_size,
    };
    if partition.validate().is_err() {
        return;
    }

    let first = region_for(a, &partition);
    let second = region_for(b, &partition);
    if a < 1 {
        assert!(first.is_err(), "pair ids below 1 are rejected");
    }
    if let (Ok(first), Ok(second)) = (first, second) {
        let (min, max) = (first.min(), first.max());
        assert!(min.x <= max.x && min.y <= max.y && min.z <= max.z);
        if a != b {
            assert!(!first.intersects(&second), "pairs {} and {} overlap", a, b);
        }
    }
});
