//! Periodic tag value updates.
//!
//! Each configured tag follows a triangle waveform: starting at its minimum
//! it rises by `step` once per period until it reaches the maximum, then
//! falls back down, indefinitely. The [`Scheduler`] owns one waveform state
//! per tag and encodes every new value into the tag's region buffer; nothing
//! outside the scheduler reads that state directly; observers read the
//! encoded bytes through the region access surface.
//!
//! The scheduler polls at a fixed interval (default 100 ms) chosen to be
//! finer than any tag period, so a period boundary is missed by at most one
//! polling interval. Shutdown is cooperative: the loop checks a
//! [`ShutdownToken`] between ticks, giving at most one interval of latency.
//!
//! # Example
//!
//! ```no_run
//! use s7_regsim::{RegionMap, Scheduler, ShutdownToken, TagDescriptor};
//!
//! let tags = vec![TagDescriptor::new(101, 0, 0.0, 100.0, 5.0, 1000)];
//! let map = std::sync::Arc::new(RegionMap::build(&tags));
//!
//! let scheduler = Scheduler::bind(&tags, &map);
//! let token = ShutdownToken::new();
//! let handle = scheduler.spawn(token.clone()).unwrap();
//!
//! // ... serve protocol traffic against `map` ...
//!
//! token.cancel();
//! handle.join().unwrap();
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::config::TagDescriptor;
use crate::error::Result;
use crate::region::{Region, RegionMap};

/// Default polling interval of the scheduler loop.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Direction a tag's waveform is currently moving in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Value is increasing towards the maximum.
    Rising,
    /// Value is decreasing towards the minimum.
    Falling,
}

/// Cooperative cancellation flag shared between the scheduler loop and its
/// owner.
///
/// Cloning the token shares the underlying flag; cancelling any clone stops
/// the loop at the next poll.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    cancelled: Arc<AtomicBool>,
}

impl ShutdownToken {
    /// Creates a new, un-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns whether shutdown was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Mutable waveform state for one tag. Owned exclusively by the scheduler.
struct TagState {
    descriptor: TagDescriptor,
    region: Arc<Region>,
    current: f32,
    direction: Direction,
    last_tick: Instant,
}

impl TagState {
    /// Advances the waveform one step and clamps on the boundary.
    fn advance(&mut self) {
        match self.direction {
            Direction::Rising => {
                self.current += self.descriptor.step;
                if self.current >= self.descriptor.max {
                    self.current = self.descriptor.max;
                    self.direction = Direction::Falling;
                }
            }
            Direction::Falling => {
                self.current -= self.descriptor.step;
                if self.current <= self.descriptor.min {
                    self.current = self.descriptor.min;
                    self.direction = Direction::Rising;
                }
            }
        }
    }
}

/// Drives all tag waveforms against their region buffers.
pub struct Scheduler {
    tags: Vec<TagState>,
    poll_interval: Duration,
}

impl Scheduler {
    /// Binds tag descriptors to the regions of `map`.
    ///
    /// Descriptors whose region is absent from the map (for example because
    /// the builder rejected them) are skipped. Every bound tag starts at its
    /// minimum, rising, with an independent phase.
    pub fn bind(descriptors: &[TagDescriptor], map: &RegionMap) -> Self {
        let now = Instant::now();
        let mut tags = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            // The builder already warned about invalid descriptors; they
            // must not drive a waveform even when a valid sibling allocated
            // their data block.
            if descriptor.validate().is_err() {
                continue;
            }
            match map.region(descriptor.area()) {
                Some(region) => tags.push(TagState {
                    current: descriptor.min,
                    direction: Direction::Rising,
                    last_tick: now,
                    region: Arc::clone(region),
                    descriptor: descriptor.clone(),
                }),
                None => debug!("no region for {}, tag not scheduled", descriptor.address()),
            }
        }

        info!("initialized {} tag states for dynamic updates", tags.len());
        Self {
            tags,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets a custom polling interval (default is 100 ms).
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Number of tags under simulation.
    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    /// The configured polling interval.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Runs one update pass against the current time.
    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    /// Runs one update pass as if the current time were `now`.
    ///
    /// A tag whose period has not elapsed since its last update is left
    /// unchanged; otherwise it advances one step, clamping at its bounds,
    /// and the new value is encoded into its region buffer.
    pub fn tick_at(&mut self, now: Instant) {
        for tag in &mut self.tags {
            let elapsed = now.duration_since(tag.last_tick);
            if elapsed < tag.descriptor.period {
                continue;
            }

            tag.advance();
            // Offsets derived the buffer size at build time, so the encode
            // cannot go out of range for a correctly built map.
            if let Err(e) = tag.region.write_real(tag.descriptor.offset, tag.current) {
                warn!("could not update {}: {e}", tag.descriptor.address());
            }
            tag.last_tick = now;
        }
    }

    /// Runs the polling loop on the current thread until `token` is
    /// cancelled.
    pub fn run(mut self, token: ShutdownToken) {
        info!(
            "scheduler running: {} tags, poll interval {:?}",
            self.tags.len(),
            self.poll_interval
        );
        while !token.is_cancelled() {
            self.tick();
            thread::sleep(self.poll_interval);
        }
        info!("scheduler stopped");
    }

    /// Spawns the polling loop on a background thread.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the thread cannot be spawned.
    pub fn spawn(self, token: ShutdownToken) -> Result<JoinHandle<()>> {
        let handle = thread::Builder::new()
            .name("tag-scheduler".into())
            .spawn(move || self.run(token))?;
        Ok(handle)
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("tags", &self.tags.len())
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::Area;

    fn setup(tags: Vec<TagDescriptor>) -> (RegionMap, Scheduler) {
        let map = RegionMap::build(&tags);
        let scheduler = Scheduler::bind(&tags, &map);
        (map, scheduler)
    }

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn test_phase_sequence() {
        let (map, mut scheduler) = setup(vec![TagDescriptor::new(1, 0, 0.0, 10.0, 5.0, 100)]);
        let base = Instant::now();

        let read = |map: &RegionMap| map.read_real(Area::Db(1), 0).unwrap();

        // initial value before any period elapses
        scheduler.tick_at(base);
        assert_eq!(read(&map), 0.0);

        let expected = [5.0, 10.0, 5.0, 0.0, 5.0, 10.0];
        for (i, want) in expected.iter().enumerate() {
            scheduler.tick_at(base + ms(100 * (i as u64 + 1)));
            assert_eq!(read(&map), *want, "sample {i}");
        }
    }

    #[test]
    fn test_no_update_before_period_elapses() {
        let (map, mut scheduler) = setup(vec![TagDescriptor::new(1, 0, 0.0, 10.0, 5.0, 100)]);
        let base = Instant::now();

        scheduler.tick_at(base + ms(100));
        assert_eq!(map.read_real(Area::Db(1), 0).unwrap(), 5.0);

        // intermediate samples return the unchanged prior value
        scheduler.tick_at(base + ms(150));
        scheduler.tick_at(base + ms(199));
        assert_eq!(map.read_real(Area::Db(1), 0).unwrap(), 5.0);

        scheduler.tick_at(base + ms(200));
        assert_eq!(map.read_real(Area::Db(1), 0).unwrap(), 10.0);
    }

    #[test]
    fn test_waveform_stays_bounded_with_non_dividing_step() {
        // 3 does not divide 10, so the wave clamps at both ends.
        let (map, mut scheduler) = setup(vec![TagDescriptor::new(1, 0, 0.0, 10.0, 3.0, 100)]);
        let base = Instant::now();

        let mut seen_min = false;
        let mut seen_max = false;
        for i in 1..=50u64 {
            scheduler.tick_at(base + ms(100 * i));
            let value = map.read_real(Area::Db(1), 0).unwrap();
            assert!((0.0..=10.0).contains(&value), "value {value} escaped bounds");
            if value == 0.0 {
                seen_min = true;
            }
            if value == 10.0 {
                seen_max = true;
            }
        }
        assert!(seen_min && seen_max, "wave never touched its bounds");
    }

    #[test]
    fn test_tags_have_independent_periods() {
        let tags = vec![
            TagDescriptor::new(1, 0, 0.0, 100.0, 1.0, 100),
            TagDescriptor::new(1, 4, 0.0, 100.0, 1.0, 300),
        ];
        let (map, mut scheduler) = setup(tags);
        let base = Instant::now();

        for i in 1..=6u64 {
            scheduler.tick_at(base + ms(100 * i));
        }

        // fast tag advanced 6 times, slow tag twice
        assert_eq!(map.read_real(Area::Db(1), 0).unwrap(), 6.0);
        assert_eq!(map.read_real(Area::Db(1), 4).unwrap(), 2.0);
    }

    #[test]
    fn test_tags_own_disjoint_ranges() {
        let tags = vec![
            TagDescriptor::new(1, 0, 0.0, 10.0, 1.0, 100),
            TagDescriptor::new(1, 4, 50.0, 60.0, 1.0, 100),
        ];
        let (map, mut scheduler) = setup(tags);
        let base = Instant::now();
        scheduler.tick_at(base + ms(100));

        assert_eq!(map.read_real(Area::Db(1), 0).unwrap(), 1.0);
        assert_eq!(map.read_real(Area::Db(1), 4).unwrap(), 51.0);
    }

    #[test]
    fn test_constant_tag_stays_clamped() {
        let (map, mut scheduler) = setup(vec![TagDescriptor::new(1, 0, 5.0, 5.0, 1.0, 100)]);
        let base = Instant::now();
        for i in 1..=4u64 {
            scheduler.tick_at(base + ms(100 * i));
            assert_eq!(map.read_real(Area::Db(1), 0).unwrap(), 5.0);
        }
    }

    // An external write and a scheduler write to the same offset race with
    // no defined precedence. This is an accepted simulation limitation, not
    // a bug: whichever writer runs last wins.
    #[test]
    fn test_external_write_race_is_last_write_wins() {
        let (map, mut scheduler) = setup(vec![TagDescriptor::new(1, 0, 0.0, 10.0, 5.0, 100)]);
        let base = Instant::now();

        // External write lands between periods: the scheduler leaves it
        // alone until the next boundary...
        map.write_real(Area::Db(1), 0, 99.0).unwrap();
        scheduler.tick_at(base + ms(50));
        assert_eq!(map.read_real(Area::Db(1), 0).unwrap(), 99.0);

        // ...then overwrites it from its own waveform state.
        scheduler.tick_at(base + ms(100));
        assert_eq!(map.read_real(Area::Db(1), 0).unwrap(), 5.0);
    }

    #[test]
    fn test_unbound_descriptor_is_skipped() {
        let valid = TagDescriptor::new(1, 0, 0.0, 10.0, 1.0, 100);
        let invalid = TagDescriptor::new(2, 0, 10.0, 0.0, 1.0, 100);
        let map = RegionMap::build(&[valid.clone(), invalid.clone()]);
        let scheduler = Scheduler::bind(&[valid, invalid], &map);
        assert_eq!(scheduler.tag_count(), 1);
    }

    #[test]
    fn test_invalid_descriptor_with_valid_sibling_is_not_scheduled() {
        // The valid tag allocates DB1, but the rejected one must still not
        // drive a waveform into it.
        let valid = TagDescriptor::new(1, 0, 0.0, 10.0, 1.0, 100);
        let invalid = TagDescriptor::new(1, 4, 10.0, 0.0, 1.0, 100);
        let map = RegionMap::build(&[valid.clone(), invalid.clone()]);
        let scheduler = Scheduler::bind(&[valid, invalid], &map);
        assert_eq!(scheduler.tag_count(), 1);
    }

    #[test]
    fn test_shutdown_token_stops_loop() {
        let (_, scheduler) = setup(vec![TagDescriptor::new(1, 0, 0.0, 10.0, 1.0, 10)]);
        let scheduler = scheduler.with_poll_interval(ms(1));
        let token = ShutdownToken::new();
        let handle = scheduler.spawn(token.clone()).unwrap();

        thread::sleep(ms(20));
        token.cancel();
        handle.join().unwrap();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_token_clones_share_state() {
        let token = ShutdownToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
