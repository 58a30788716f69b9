//! # S7 Register Simulator Library
//!
//! A Rust library for simulating the addressable memory of an S7-style PLC,
//! built for protocol-compliance testing: configured tags evolve on their own
//! over time while an external protocol stack reads and writes the same
//! buffers, plus client-side helpers for bulk-reading more values than a
//! protocol stack's multi-read item cap allows.
//!
//! ## Features
//!
//! - **Configuration-driven**: tags come from a CSV table (`DB<n>,REAL<offset>`
//!   addresses with range, step and period); malformed rows degrade
//!   gracefully instead of aborting
//! - **Triangle waveforms**: each tag rises from its minimum to its maximum
//!   and back, one independent phase per tag
//! - **Stable buffers**: regions are sized from the tags, allocated once,
//!   and never resized or relocated while registered
//! - **Safe sharing**: one scheduler writer per tag, any number of passive
//!   readers, no torn 4-byte values
//! - **Bulk-read workarounds**: chunked multi-reads that respect a device's
//!   item cap, and a contiguous-block fallback that bypasses it, both with
//!   per-item failure isolation and cost statistics
//! - **No panics**: all errors returned as `Result<T, SimError>`
//!
//! ## Quick Start
//!
//! ```no_run
//! use s7_regsim::{Simulator, SimulatorConfig};
//!
//! // Server role: build the register image from CSV and let it run
//! let mut sim = Simulator::from_csv("address.csv", SimulatorConfig::default());
//! sim.start().unwrap();
//!
//! // ... hand sim.regions() to the protocol stack ...
//!
//! sim.shutdown();
//! ```
//!
//! ## Reading many values from a capped device
//!
//! ```
//! use std::sync::Arc;
//! use s7_regsim::{
//!     Area, BulkReadCoordinator, ItemAddress, LoopbackDevice, RegionMap, TagDescriptor,
//! };
//!
//! let tags: Vec<_> = (0..50)
//!     .map(|i| TagDescriptor::new(101, i * 4, 0.0, 100.0, 1.0, 1000))
//!     .collect();
//! let device = LoopbackDevice::new(Arc::new(RegionMap::build(&tags)));
//! let coordinator = BulkReadCoordinator::new(&device);
//!
//! // 50 scattered addresses against a 20-item cap: 3 requests
//! let addresses: Vec<_> = (0..50)
//!     .map(|i| ItemAddress::new(Area::Db(101), i * 4))
//!     .collect();
//! let outcome = coordinator.read_reals_chunked(&addresses);
//! assert_eq!(outcome.stats.requests, 3);
//!
//! // The same 50 values, packed back to back: 1 request
//! let outcome = coordinator.read_reals_contiguous(Area::Db(101), 0, 50);
//! assert_eq!(outcome.stats.requests, 1);
//! ```
//!
//! ## Memory Areas
//!
//! | Area | Description | Size |
//! |------|-------------|------|
//! | `Db(n)` | Data block holding simulated tags | sized from configuration |
//! | `Input` | Process inputs (I) | 256 bytes |
//! | `Output` | Process outputs (Q) | 256 bytes |
//! | `Flag` | Flags/merkers (M) | 256 bytes |
//! | `Timer` | Timers (T) | 512 bytes |
//! | `Counter` | Counters (C) | 512 bytes |
//!
//! ## Concurrency Model
//!
//! The scheduler thread is the only simulation writer; the protocol stack
//! reads (and occasionally writes) the same regions concurrently. Each tag
//! owns a disjoint 4-byte range, so a reader sees either the previous or the
//! next value of a tag, never a torn one. An external write to an offset
//! under active simulation races the scheduler with no defined precedence; the last writer
//! wins. Shutdown is cooperative via [`ShutdownToken`] with at most one
//! polling interval of latency.

#![warn(clippy::all)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod area;
mod error;
mod region;
mod scheduler;
mod sim;

pub mod bulk;
pub mod codec;
pub mod config;

// Public re-exports
pub use area::Area;
pub use bulk::{
    BulkReadCoordinator, BulkReadOutcome, ItemAddress, LoopbackDevice, ReadItem, ReadStats,
    RemoteDevice, DEFAULT_MAX_ITEMS_PER_READ,
};
pub use codec::{decode_real, encode_real, REAL_SIZE};
pub use config::{load_csv, parse_tag_address, read_csv, TagDescriptor};
pub use error::{Result, SimError};
pub use region::{AccessObserver, Region, RegionMap};
pub use scheduler::{Direction, Scheduler, ShutdownToken, DEFAULT_POLL_INTERVAL};
pub use sim::{RegionRegistrar, Simulator, SimulatorConfig};
