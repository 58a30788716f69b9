//! Client-role demonstration: reading 50 REAL values from a device whose
//! multi-read requests are capped at 20 items.
//!
//! Runs the same experiment three ways (one request per value, chunked
//! multi-reads, and a single contiguous block read) and reports the request
//! count and wall-clock cost of each.

use std::sync::Arc;

use s7_regsim::{
    Area, BulkReadCoordinator, BulkReadOutcome, ItemAddress, LoopbackDevice, RegionMap,
    RemoteDevice, TagDescriptor, REAL_SIZE,
};

const VALUE_COUNT: usize = 50;

fn report(label: &str, outcome: &BulkReadOutcome) {
    println!(
        "{label:<24} {:>2} requests, {}/{} ok, {:?}",
        outcome.stats.requests,
        outcome.success_count(),
        outcome.items.len(),
        outcome.stats.elapsed,
    );
}

fn main() {
    env_logger::init();

    // 50 REALs packed into DB101, each holding its own index.
    let tags: Vec<_> = (0..VALUE_COUNT)
        .map(|i| TagDescriptor::new(101, i * REAL_SIZE, i as f32, 1000.0, 1.0, 1000))
        .collect();
    let map = Arc::new(RegionMap::build(&tags));
    let device = LoopbackDevice::new(map);

    let addresses: Vec<_> = (0..VALUE_COUNT)
        .map(|i| ItemAddress::new(Area::Db(101), i * REAL_SIZE))
        .collect();

    println!("device multi-read limit: {} items", device.max_items_per_read());

    // One oversized request shows the limit itself.
    match device.read_many(&addresses, REAL_SIZE) {
        Err(e) => println!("single multi-read of {VALUE_COUNT} items: {e}"),
        Ok(_) => println!("single multi-read of {VALUE_COUNT} items unexpectedly succeeded"),
    }
    println!();

    let coordinator = BulkReadCoordinator::new(&device);

    let singles = coordinator.read_reals_single(&addresses);
    report("individual reads:", &singles);

    let chunked = coordinator.read_reals_chunked(&addresses);
    report("chunked multi-reads:", &chunked);

    let block = coordinator.read_reals_contiguous(Area::Db(101), 0, VALUE_COUNT);
    report("contiguous block:", &block);

    // All three strategies agree on an unchanged data source.
    let agree = singles
        .items
        .iter()
        .zip(&chunked.items)
        .zip(&block.items)
        .all(|((s, c), b)| match (&s.value, &c.value, &b.value) {
            (Ok(sv), Ok(cv), Ok(bv)) => sv == cv && cv == bv,
            _ => false,
        });
    println!();
    println!(
        "strategy agreement: {}",
        if agree { "all values identical" } else { "MISMATCH" }
    );

    let mut sample = String::new();
    for item in block.items.iter().take(5) {
        if let Ok(v) = &item.value {
            sample.push_str(&format!("{v:.1} "));
        }
    }
    println!("first values: {sample}...");
}
