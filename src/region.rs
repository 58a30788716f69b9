//! Fixed-size memory regions and the register map built from configuration.
//!
//! Each [`Region`] is one contiguous byte buffer standing in for a controller
//! data block or process area. Buffers are allocated once, zero-initialized,
//! and can never be resized afterwards: the external protocol stack holds a
//! reference to the region for the process lifetime, so its size and identity
//! must be stable. The buffer lives behind a `Box<[u8]>`, which makes the
//! no-resize rule structural rather than conventional.
//!
//! The [`RegionMap`] is both the builder (grouping tag descriptors by data
//! block and sizing each block to its highest tag) and the access surface the
//! protocol stack reads and writes through.
//!
//! # Concurrency
//!
//! A region buffer has exactly one simulation writer per tag (the scheduler)
//! and any number of passive readers. Each access takes the region lock for
//! the duration of one copy, so a reader observes either the pre- or
//! post-update bytes of a 4-byte tag, never a torn value. Tags bound to the
//! same region own disjoint byte ranges.
//!
//! # Example
//!
//! ```
//! use s7_regsim::{RegionMap, TagDescriptor, Area};
//!
//! let tags = vec![
//!     TagDescriptor::new(5, 0, 0.0, 10.0, 1.0, 100),
//!     TagDescriptor::new(5, 8, 0.0, 10.0, 1.0, 100),
//! ];
//! let map = RegionMap::build(&tags);
//!
//! // DB5 is sized to its highest tag: offset 8 + 4 bytes
//! assert_eq!(map.region(Area::Db(5)).unwrap().size(), 12);
//!
//! // Tags start at their configured minimum
//! assert_eq!(map.read_real(Area::Db(5), 0).unwrap(), 0.0);
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::RwLock;

use crate::area::Area;
use crate::codec::{decode_real, encode_real, REAL_SIZE};
use crate::config::TagDescriptor;
use crate::error::{Result, SimError};

/// Observational hook on the region access surface.
///
/// The access surface performs the data transfer itself and notifies the
/// observer afterwards; an observer is never load-bearing for data movement,
/// and no observer is installed by default.
pub trait AccessObserver: Send + Sync {
    /// Called after a successful read of `len` bytes at `offset`.
    fn on_read(&self, _area: Area, _offset: usize, _len: usize) {}

    /// Called after a successful write of `len` bytes at `offset`.
    fn on_write(&self, _area: Area, _offset: usize, _len: usize) {}
}

/// A contiguous, fixed-size byte buffer for one memory area.
pub struct Region {
    area: Area,
    size: usize,
    buffer: RwLock<Box<[u8]>>,
}

impl Region {
    /// Allocates a zero-initialized region of `size` bytes.
    pub(crate) fn new(area: Area, size: usize) -> Self {
        Self {
            area,
            size,
            buffer: RwLock::new(vec![0u8; size].into_boxed_slice()),
        }
    }

    /// The area this region represents.
    pub fn area(&self) -> Area {
        self.area
    }

    /// Buffer size in bytes, fixed at creation.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns a copy of `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::OutOfRange`] if the slice exceeds the buffer.
    pub fn read_bytes(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
        let end = offset
            .checked_add(len)
            .filter(|end| *end <= self.size)
            .ok_or_else(|| SimError::out_of_range(offset, len, self.size))?;
        let buffer = self.buffer.read();
        Ok(buffer[offset..end].to_vec())
    }

    /// Copies `data` into the buffer at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::OutOfRange`] if the slice exceeds the buffer.
    pub fn write_bytes(&self, offset: usize, data: &[u8]) -> Result<()> {
        let end = offset
            .checked_add(data.len())
            .filter(|end| *end <= self.size)
            .ok_or_else(|| SimError::out_of_range(offset, data.len(), self.size))?;
        let mut buffer = self.buffer.write();
        buffer[offset..end].copy_from_slice(data);
        Ok(())
    }

    /// Decodes the big-endian REAL at `offset`.
    pub fn read_real(&self, offset: usize) -> Result<f32> {
        let buffer = self.buffer.read();
        decode_real(&buffer, offset)
    }

    /// Encodes `value` as a big-endian REAL at `offset`.
    pub fn write_real(&self, offset: usize, value: f32) -> Result<()> {
        let mut buffer = self.buffer.write();
        encode_real(value, &mut buffer, offset)
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("area", &self.area)
            .field("size", &self.size)
            .finish()
    }
}

/// The register map: all allocated regions, keyed by area.
///
/// Built once at startup; regions are shared by `Arc` with the scheduler and
/// the external protocol stack and never reallocated.
pub struct RegionMap {
    regions: BTreeMap<Area, Arc<Region>>,
    observer: RwLock<Option<Arc<dyn AccessObserver>>>,
}

impl RegionMap {
    /// Builds regions from tag descriptors.
    ///
    /// Descriptors are grouped by data block; each block is sized to the
    /// highest `offset + 4` among its tags and zero-initialized, then every
    /// tag's initial value (its minimum) is encoded in place. Grouping is by
    /// key, so the same input in any order produces identical regions.
    ///
    /// A descriptor that fails [`TagDescriptor::validate`] is rejected
    /// individually with a warning; valid siblings are still processed. An
    /// empty input yields an empty map.
    pub fn build(descriptors: &[TagDescriptor]) -> Self {
        let mut sizes: BTreeMap<u16, usize> = BTreeMap::new();
        for tag in descriptors {
            if let Err(e) = tag.validate() {
                warn!("rejecting {e}");
                continue;
            }
            let required = tag.offset + REAL_SIZE;
            let entry = sizes.entry(tag.db).or_insert(required);
            *entry = (*entry).max(required);
        }

        let mut regions = BTreeMap::new();
        for (db, size) in sizes {
            let area = Area::Db(db);
            info!("allocated {area}: {size} bytes");
            regions.insert(area, Arc::new(Region::new(area, size)));
        }

        let map = Self {
            regions,
            observer: RwLock::new(None),
        };

        // Initial values: every tag starts at its minimum, rising.
        for tag in descriptors {
            if tag.validate().is_err() {
                continue;
            }
            if let Some(region) = map.regions.get(&tag.area()) {
                // Offsets derived the buffer size, so this cannot fail.
                if let Err(e) = region.write_real(tag.offset, tag.min) {
                    warn!("could not initialize {}: {e}", tag.address());
                } else {
                    debug!("{} = {} (range {} to {})", tag.address(), tag.min, tag.min, tag.max);
                }
            }
        }

        map
    }

    /// Adds the five fixed process areas at their conventional sizes.
    ///
    /// # Example
    ///
    /// ```
    /// use s7_regsim::{RegionMap, Area};
    ///
    /// let map = RegionMap::build(&[]).with_process_areas();
    /// assert_eq!(map.region(Area::Flag).unwrap().size(), 256);
    /// assert_eq!(map.region(Area::Timer).unwrap().size(), 512);
    /// ```
    pub fn with_process_areas(mut self) -> Self {
        for area in Area::process_areas() {
            let size = area.default_size().unwrap_or(0);
            self.regions
                .entry(area)
                .or_insert_with(|| Arc::new(Region::new(area, size)));
        }
        self
    }

    /// Looks up a region by area.
    pub fn region(&self, area: Area) -> Option<&Arc<Region>> {
        self.regions.get(&area)
    }

    /// Iterates over all regions in area order.
    pub fn regions(&self) -> impl Iterator<Item = &Arc<Region>> {
        self.regions.values()
    }

    /// Number of allocated regions.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Returns whether the map holds no regions.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Installs an access observer. Replaces any previous observer.
    pub fn set_observer(&self, observer: Arc<dyn AccessObserver>) {
        *self.observer.write() = Some(observer);
    }

    /// Reads `len` bytes at `offset` from the given area.
    ///
    /// This is the entry point the external protocol stack drives on behalf
    /// of remote read requests. There is no snapshot isolation: the caller
    /// observes whatever bytes are current at copy time.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::RemoteRead`] for an unknown area and
    /// [`SimError::OutOfRange`] if the slice exceeds the region.
    pub fn read(&self, area: Area, offset: usize, len: usize) -> Result<Vec<u8>> {
        let region = self
            .regions
            .get(&area)
            .ok_or_else(|| SimError::remote_read(format!("area {area} is not registered")))?;
        let bytes = region.read_bytes(offset, len)?;
        if let Some(observer) = self.observer.read().as_ref() {
            observer.on_read(area, offset, len);
        }
        Ok(bytes)
    }

    /// Writes `data` at `offset` into the given area.
    ///
    /// Used by the protocol stack for device-initiated writes. A write that
    /// targets an offset under active simulation races the scheduler with no
    /// defined precedence; the last writer wins.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::RemoteRead`] for an unknown area and
    /// [`SimError::OutOfRange`] if the slice exceeds the region.
    pub fn write(&self, area: Area, offset: usize, data: &[u8]) -> Result<()> {
        let region = self
            .regions
            .get(&area)
            .ok_or_else(|| SimError::remote_read(format!("area {area} is not registered")))?;
        region.write_bytes(offset, data)?;
        if let Some(observer) = self.observer.read().as_ref() {
            observer.on_write(area, offset, data.len());
        }
        Ok(())
    }

    /// Convenience REAL read through the access surface.
    pub fn read_real(&self, area: Area, offset: usize) -> Result<f32> {
        let bytes = self.read(area, offset, REAL_SIZE)?;
        decode_real(&bytes, 0)
    }

    /// Convenience REAL write through the access surface.
    pub fn write_real(&self, area: Area, offset: usize, value: f32) -> Result<()> {
        let mut bytes = [0u8; REAL_SIZE];
        encode_real(value, &mut bytes, 0)?;
        self.write(area, offset, &bytes)
    }
}

impl std::fmt::Debug for RegionMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionMap")
            .field("regions", &self.regions.keys().collect::<Vec<_>>())
            .finish()
    }
}
