//! Bulk reading of many REAL values from a remote device.
//!
//! Industrial protocol stacks commonly cap the number of items one
//! multi-read request may carry (20 is a typical limit). Reading more values
//! than the cap therefore needs a workaround, and this module provides the
//! two that matter in practice:
//!
//! 1. **Chunked multi-read** ([`BulkReadCoordinator::read_reals_chunked`]):
//!    split the address list into batches of at most the cap and issue one
//!    multi-read per batch. Works for any address layout; failures are
//!    isolated per item and per batch.
//! 2. **Contiguous-block read**
//!    ([`BulkReadCoordinator::read_reals_contiguous`]): when the values are
//!    physically adjacent and equally sized, fetch the whole byte range in a
//!    single read and decode locally. One request regardless of item count.
//!
//! The coordinator never chooses a strategy on its own: the caller knows
//! whether the addresses are contiguous. Mixed layouts should use chunking.
//!
//! Every call returns a [`BulkReadOutcome`] carrying exactly one result per
//! requested address, in request order, plus the number of remote requests
//! issued and the elapsed wall-clock time so the strategies can be compared.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use s7_regsim::{Area, BulkReadCoordinator, ItemAddress, LoopbackDevice, RegionMap, TagDescriptor};
//!
//! let tags: Vec<_> = (0..50)
//!     .map(|i| TagDescriptor::new(101, i * 4, i as f32, 100.0, 1.0, 1000))
//!     .collect();
//! let map = Arc::new(RegionMap::build(&tags));
//! let device = LoopbackDevice::new(map);
//!
//! let addresses: Vec<_> = (0..50)
//!     .map(|i| ItemAddress::new(Area::Db(101), i * 4))
//!     .collect();
//!
//! let coordinator = BulkReadCoordinator::new(&device);
//! let chunked = coordinator.read_reals_chunked(&addresses);
//! assert!(chunked.all_ok());
//! assert_eq!(chunked.stats.requests, 3); // 20 + 20 + 10
//!
//! let block = coordinator.read_reals_contiguous(Area::Db(101), 0, 50);
//! assert!(block.all_ok());
//! assert_eq!(block.stats.requests, 1);
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::warn;

use crate::area::Area;
use crate::codec::{decode_real, REAL_SIZE};
use crate::error::{Result, SimError};
use crate::region::RegionMap;

/// Default cap on items per multi-read request, matching the limit commonly
/// hard-coded in S7 protocol stacks.
pub const DEFAULT_MAX_ITEMS_PER_READ: usize = 20;

/// Address of one value on the remote device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemAddress {
    /// Memory area holding the value.
    pub area: Area,
    /// Byte offset within the area.
    pub offset: usize,
}

impl ItemAddress {
    /// Creates a new item address.
    pub fn new(area: Area, offset: usize) -> Self {
        Self { area, offset }
    }
}

/// Result for one requested address: the decoded value or the failure that
/// kept it from being read. Failures never contaminate sibling items.
#[derive(Debug)]
pub struct ReadItem {
    /// The address this result belongs to.
    pub address: ItemAddress,
    /// Decoded value, or the per-item failure.
    pub value: Result<f32>,
}

impl ReadItem {
    /// Returns whether this item was read successfully.
    pub fn is_ok(&self) -> bool {
        self.value.is_ok()
    }
}

/// Cost accounting for one bulk read call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadStats {
    /// Number of remote requests issued.
    pub requests: usize,
    /// Wall-clock time spent in the call.
    pub elapsed: Duration,
}

/// Outcome of a bulk read: one result per requested address, in request
/// order, plus cost statistics.
#[derive(Debug)]
pub struct BulkReadOutcome {
    /// Per-item results, parallel to the request.
    pub items: Vec<ReadItem>,
    /// Requests issued and time spent.
    pub stats: ReadStats,
}

impl BulkReadOutcome {
    /// Returns `true` only if every item succeeded.
    pub fn all_ok(&self) -> bool {
        self.items.iter().all(ReadItem::is_ok)
    }

    /// Number of successfully read items.
    pub fn success_count(&self) -> usize {
        self.items.iter().filter(|i| i.is_ok()).count()
    }
}

/// The read primitives the external protocol stack offers to a client.
///
/// `read_many` is capped at [`max_items_per_read`](Self::max_items_per_read)
/// items per request; passing more is a whole-request error. A transport
/// failure is also a whole-request error, while an addressing problem on one
/// item surfaces only in that item's slot.
pub trait RemoteDevice {
    /// Reads `len` bytes at `offset` in `area`.
    fn read_one(&self, area: Area, offset: usize, len: usize) -> Result<Vec<u8>>;

    /// Reads `item_len` bytes at each address, returning one result per
    /// item in request order.
    ///
    /// # Errors
    ///
    /// Fails as a whole if the item count exceeds the device cap or the
    /// request cannot be delivered at all.
    fn read_many(&self, items: &[ItemAddress], item_len: usize) -> Result<Vec<Result<Vec<u8>>>>;

    /// Maximum number of items one `read_many` request may carry.
    fn max_items_per_read(&self) -> usize {
        DEFAULT_MAX_ITEMS_PER_READ
    }
}

/// Coordinates bulk reads against a remote device, working around its
/// per-request item cap.
pub struct BulkReadCoordinator<'a, D: RemoteDevice + ?Sized> {
    device: &'a D,
}

impl<'a, D: RemoteDevice + ?Sized> BulkReadCoordinator<'a, D> {
    /// Creates a coordinator over `device`.
    pub fn new(device: &'a D) -> Self {
        Self { device }
    }

    /// Reads every address with one `read_one` request per item.
    ///
    /// The baseline strategy: always works, always costs one round trip per
    /// value. Useful for comparing the bulk strategies against.
    pub fn read_reals_single(&self, addresses: &[ItemAddress]) -> BulkReadOutcome {
        let started = Instant::now();
        let mut items = Vec::with_capacity(addresses.len());
        for address in addresses {
            let value = self
                .device
                .read_one(address.area, address.offset, REAL_SIZE)
                .and_then(|bytes| decode_real(&bytes, 0));
            items.push(ReadItem {
                address: *address,
                value,
            });
        }
        BulkReadOutcome {
            stats: ReadStats {
                requests: addresses.len(),
                elapsed: started.elapsed(),
            },
            items,
        }
    }

    /// Reads every address via multi-read requests of at most the device cap.
    ///
    /// Addresses are taken in consecutive batches. A failure of one item
    /// marks only that item; a failure of a whole batch (transport error,
    /// timeout) marks only that batch's items, and the remaining batches are
    /// still issued. The outcome holds exactly one result per address in
    /// request order.
    pub fn read_reals_chunked(&self, addresses: &[ItemAddress]) -> BulkReadOutcome {
        let cap = self.device.max_items_per_read().max(1);
        let started = Instant::now();
        let mut items = Vec::with_capacity(addresses.len());
        let mut requests = 0;

        for batch in addresses.chunks(cap) {
            requests += 1;
            match self.device.read_many(batch, REAL_SIZE) {
                Ok(results) if results.len() == batch.len() => {
                    for (address, result) in batch.iter().zip(results) {
                        let value = result.and_then(|bytes| decode_real(&bytes, 0));
                        items.push(ReadItem {
                            address: *address,
                            value,
                        });
                    }
                }
                Ok(results) => {
                    let reason = format!(
                        "device answered {} results for {} items",
                        results.len(),
                        batch.len()
                    );
                    warn!("{reason}");
                    Self::fail_batch(&mut items, batch, &reason);
                }
                Err(e) => {
                    let reason = format!("batch of {} items failed: {e}", batch.len());
                    warn!("{reason}");
                    Self::fail_batch(&mut items, batch, &reason);
                }
            }
        }

        BulkReadOutcome {
            stats: ReadStats {
                requests,
                elapsed: started.elapsed(),
            },
            items,
        }
    }

    /// Reads `count` adjacent REALs starting at `start` in `area` with a
    /// single range read, decoding each value locally.
    ///
    /// One request regardless of `count`, which sidesteps the item cap
    /// entirely. Only valid when the values really are packed back to back
    /// in one area; use chunking for anything else.
    pub fn read_reals_contiguous(
        &self,
        area: Area,
        start: usize,
        count: usize,
    ) -> BulkReadOutcome {
        let started = Instant::now();
        if count == 0 {
            return BulkReadOutcome {
                items: Vec::new(),
                stats: ReadStats {
                    requests: 0,
                    elapsed: started.elapsed(),
                },
            };
        }

        let addresses: Vec<ItemAddress> = (0..count)
            .map(|i| ItemAddress::new(area, start + i * REAL_SIZE))
            .collect();

        let mut items = Vec::with_capacity(count);
        match self.device.read_one(area, start, count * REAL_SIZE) {
            Ok(bytes) => {
                for (i, address) in addresses.iter().enumerate() {
                    items.push(ReadItem {
                        address: *address,
                        value: decode_real(&bytes, i * REAL_SIZE),
                    });
                }
            }
            Err(e) => {
                let reason = format!("range read of {count} items failed: {e}");
                warn!("{reason}");
                Self::fail_batch(&mut items, &addresses, &reason);
            }
        }

        BulkReadOutcome {
            stats: ReadStats {
                requests: 1,
                elapsed: started.elapsed(),
            },
            items,
        }
    }

    fn fail_batch(items: &mut Vec<ReadItem>, batch: &[ItemAddress], reason: &str) {
        for address in batch {
            items.push(ReadItem {
                address: *address,
                value: Err(SimError::remote_read(reason.to_string())),
            });
        }
    }
}

/// A [`RemoteDevice`] served directly from an in-process [`RegionMap`].
///
/// Stands in for the wire protocol stack in tests and demos: the same item
/// cap, the same per-item failure behavior, no network.
pub struct LoopbackDevice {
    map: Arc<RegionMap>,
    max_items: usize,
}

impl LoopbackDevice {
    /// Creates a loopback device over `map` with the default item cap.
    pub fn new(map: Arc<RegionMap>) -> Self {
        Self {
            map,
            max_items: DEFAULT_MAX_ITEMS_PER_READ,
        }
    }

    /// Overrides the multi-read item cap.
    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }
}

impl RemoteDevice for LoopbackDevice {
    fn read_one(&self, area: Area, offset: usize, len: usize) -> Result<Vec<u8>> {
        self.map.read(area, offset, len)
    }

    fn read_many(&self, items: &[ItemAddress], item_len: usize) -> Result<Vec<Result<Vec<u8>>>> {
        if items.len() > self.max_items {
            return Err(SimError::remote_read(format!(
                "request carries {} items, device limit is {}",
                items.len(),
                self.max_items
            )));
        }
        Ok(items
            .iter()
            .map(|item| self.map.read(item.area, item.offset, item_len))
            .collect())
    }

    fn max_items_per_read(&self) -> usize {
        self.max_items
    }
}
