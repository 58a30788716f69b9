//! Server-role demonstration: a CSV-configured register image with live tag
//! updates, standing in for a test PLC.
//!
//! Usage: `server_demo [config.csv] [runtime-seconds]`

use std::sync::Arc;
use std::time::Duration;

use log::info;
use s7_regsim::{AccessObserver, Area, Simulator, SimulatorConfig};

/// Logs protocol-side traffic without taking part in it.
struct TrafficLogger;

impl AccessObserver for TrafficLogger {
    fn on_read(&self, area: Area, offset: usize, len: usize) {
        info!("[READ] area {area}, offset {offset}, {len} bytes");
    }

    fn on_write(&self, area: Area, offset: usize, len: usize) {
        info!("[WRITE] area {area}, offset {offset}, {len} bytes");
    }
}

fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| "address.csv".to_string());
    let runtime_secs: u64 = args
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(30);

    info!("loading configuration from '{config_path}'");
    let mut sim = Simulator::from_csv(&config_path, SimulatorConfig::default());

    info!("register image:");
    for region in sim.regions().regions() {
        info!("  {}: {} bytes", region.area(), region.size());
    }
    info!("{} tags under simulation", sim.tag_count());

    sim.regions().set_observer(Arc::new(TrafficLogger));

    if let Err(e) = sim.start() {
        eprintln!("could not start scheduler: {e}");
        std::process::exit(1);
    }
    info!("scheduler running; serving for {runtime_secs} s");

    // Sample the first REAL of each data block once per second, the way a
    // polling client would.
    let sample_areas: Vec<Area> = sim
        .regions()
        .regions()
        .map(|r| r.area())
        .filter(|a| a.is_data_block())
        .collect();

    for _ in 0..runtime_secs {
        std::thread::sleep(Duration::from_secs(1));
        for area in &sample_areas {
            if let Ok(value) = sim.regions().read_real(*area, 0) {
                info!("  {area}.REAL0 = {value:.2}");
            }
        }
    }

    info!("shutting down");
    sim.shutdown();
    info!("server stopped");
}
