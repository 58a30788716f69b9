//! Simulator assembly: configuration in, running register image out.
//!
//! [`Simulator`] wires the pieces together the way a server process uses
//! them: tag descriptors (usually from CSV) build the [`RegionMap`], the
//! regions are handed to the external protocol stack through a
//! [`RegionRegistrar`], and the scheduler thread keeps the tag values moving
//! until shutdown.
//!
//! # Example
//!
//! ```no_run
//! use s7_regsim::{Simulator, SimulatorConfig};
//!
//! let mut sim = Simulator::from_csv("address.csv", SimulatorConfig::default());
//! sim.start().unwrap();
//!
//! // ... protocol stack serves reads against sim.regions() ...
//!
//! sim.shutdown();
//! ```

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::{error, info, warn};

use crate::area::Area;
use crate::config::{load_csv, TagDescriptor};
use crate::error::Result;
use crate::region::{Region, RegionMap};
use crate::scheduler::{Scheduler, ShutdownToken, DEFAULT_POLL_INTERVAL};

/// The registration boundary offered by an external protocol server.
///
/// Regions are shared by reference and must stay at a stable address and
/// size for the registrar's lifetime; the simulator guarantees both.
pub trait RegionRegistrar {
    /// Registers one region for remote access.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SimError::Registration`] (or any other error) when
    /// the server rejects the region.
    fn register(&mut self, area: Area, region: &Arc<Region>) -> Result<()>;
}

/// Startup options for the simulator.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Scheduler polling interval. Keep it finer than the fastest tag
    /// period.
    pub poll_interval: Duration,
    /// Whether to allocate the five fixed process areas alongside the data
    /// blocks.
    pub process_areas: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            process_areas: true,
        }
    }
}

impl SimulatorConfig {
    /// Sets a custom scheduler polling interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Enables or disables the fixed process areas.
    pub fn with_process_areas(mut self, enabled: bool) -> Self {
        self.process_areas = enabled;
        self
    }
}

/// A complete simulated register image with its update scheduler.
pub struct Simulator {
    regions: Arc<RegionMap>,
    descriptors: Vec<TagDescriptor>,
    poll_interval: Duration,
    token: ShutdownToken,
    handle: Option<JoinHandle<()>>,
}

impl Simulator {
    /// Builds a simulator from tag descriptors.
    ///
    /// Malformed descriptors were already reported and skipped by the
    /// builder; an empty descriptor list produces a minimal simulator
    /// rather than an error.
    pub fn from_descriptors(descriptors: Vec<TagDescriptor>, config: SimulatorConfig) -> Self {
        let mut map = RegionMap::build(&descriptors);
        if config.process_areas {
            map = map.with_process_areas();
        }
        info!(
            "simulator ready: {} regions, {} tag descriptors",
            map.len(),
            descriptors.len()
        );

        Self {
            regions: Arc::new(map),
            descriptors,
            poll_interval: config.poll_interval,
            token: ShutdownToken::new(),
            handle: None,
        }
    }

    /// Builds a simulator from a CSV configuration file.
    ///
    /// An unreadable or partially malformed file degrades to a smaller or
    /// empty tag set (reported by warnings) instead of failing startup.
    pub fn from_csv<P: AsRef<std::path::Path>>(path: P, config: SimulatorConfig) -> Self {
        Self::from_descriptors(load_csv(path), config)
    }

    /// The register image, shared with the scheduler and the protocol stack.
    pub fn regions(&self) -> &Arc<RegionMap> {
        &self.regions
    }

    /// Number of tag descriptors driving the scheduler.
    pub fn tag_count(&self) -> usize {
        self.descriptors.len()
    }

    /// A token that cancels the scheduler loop when triggered.
    pub fn shutdown_token(&self) -> ShutdownToken {
        self.token.clone()
    }

    /// Offers every region to the registrar.
    ///
    /// All regions are attempted even after a failure, so startup logs show
    /// the full picture; the first failure is then returned and startup
    /// should abort.
    pub fn register_with(&self, registrar: &mut dyn RegionRegistrar) -> Result<()> {
        let mut first_failure = None;
        for region in self.regions.regions() {
            match registrar.register(region.area(), region) {
                Ok(()) => info!("registered {} ({} bytes)", region.area(), region.size()),
                Err(e) => {
                    error!("{e}");
                    if first_failure.is_none() {
                        first_failure = Some(e);
                    }
                }
            }
        }
        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Starts the scheduler thread. Calling it twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the thread cannot be spawned.
    pub fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }
        let scheduler = Scheduler::bind(&self.descriptors, &self.regions)
            .with_poll_interval(self.poll_interval);
        self.handle = Some(scheduler.spawn(self.token.clone())?);
        Ok(())
    }

    /// Cancels the scheduler and waits for it to finish. Terminal and
    /// idempotent; latency is at most one polling interval.
    pub fn shutdown(&mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("scheduler thread panicked during shutdown");
            }
        }
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("regions", &self.regions.len())
            .field("tags", &self.descriptors.len())
            .field("running", &self.handle.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimError;

    fn descriptors() -> Vec<TagDescriptor> {
        vec![
            TagDescriptor::new(101, 0, 0.0, 10.0, 1.0, 10),
            TagDescriptor::new(101, 4, 0.0, 10.0, 1.0, 10),
            TagDescriptor::new(102, 0, -1.0, 1.0, 0.5, 10),
        ]
    }

    #[test]
    fn test_from_descriptors_allocates_regions() {
        let sim = Simulator::from_descriptors(descriptors(), SimulatorConfig::default());
        // 2 data blocks + 5 process areas
        assert_eq!(sim.regions().len(), 7);
        assert_eq!(sim.tag_count(), 3);
    }

    #[test]
    fn test_process_areas_can_be_disabled() {
        let config = SimulatorConfig::default().with_process_areas(false);
        let sim = Simulator::from_descriptors(descriptors(), config);
        assert_eq!(sim.regions().len(), 2);
    }

    #[test]
    fn test_empty_configuration_is_not_fatal() {
        let config = SimulatorConfig::default().with_process_areas(false);
        let mut sim = Simulator::from_descriptors(Vec::new(), config);
        assert!(sim.regions().is_empty());
        sim.start().unwrap();
        sim.shutdown();
    }

    struct RecordingRegistrar {
        seen: Vec<Area>,
        reject: Option<Area>,
    }

    impl RegionRegistrar for RecordingRegistrar {
        fn register(&mut self, area: Area, _region: &Arc<Region>) -> Result<()> {
            self.seen.push(area);
            if self.reject == Some(area) {
                return Err(SimError::registration(area, "rejected by test registrar"));
            }
            Ok(())
        }
    }

    #[test]
    fn test_register_with_offers_every_region() {
        let config = SimulatorConfig::default().with_process_areas(false);
        let sim = Simulator::from_descriptors(descriptors(), config);

        let mut registrar = RecordingRegistrar {
            seen: Vec::new(),
            reject: None,
        };
        sim.register_with(&mut registrar).unwrap();
        assert_eq!(registrar.seen, vec![Area::Db(101), Area::Db(102)]);
    }

    #[test]
    fn test_registration_failure_still_attempts_siblings() {
        let config = SimulatorConfig::default().with_process_areas(false);
        let sim = Simulator::from_descriptors(descriptors(), config);

        let mut registrar = RecordingRegistrar {
            seen: Vec::new(),
            reject: Some(Area::Db(101)),
        };
        let err = sim.register_with(&mut registrar).unwrap_err();

        // Both regions were offered before startup failed.
        assert_eq!(registrar.seen.len(), 2);
        assert!(matches!(err, SimError::Registration { .. }));
    }

    #[test]
    fn test_start_runs_scheduler_until_shutdown() {
        // A bound of 1000 keeps the waveform rising for the whole test, so
        // the value is strictly positive once the scheduler has run.
        let tags = vec![TagDescriptor::new(101, 0, 0.0, 1000.0, 1.0, 20)];
        let config = SimulatorConfig::default()
            .with_process_areas(false)
            .with_poll_interval(Duration::from_millis(1));
        let mut sim = Simulator::from_descriptors(tags, config);
        sim.start().unwrap();

        std::thread::sleep(Duration::from_millis(100));
        sim.shutdown();

        let value = sim.regions().read_real(Area::Db(101), 0).unwrap();
        assert!(value > 0.0, "tag never advanced: {value}");
    }

    #[test]
    fn test_start_twice_is_noop() {
        let config = SimulatorConfig::default().with_process_areas(false);
        let mut sim = Simulator::from_descriptors(descriptors(), config);
        sim.start().unwrap();
        sim.start().unwrap();
        sim.shutdown();
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let mut sim = Simulator::from_descriptors(descriptors(), SimulatorConfig::default());
        sim.start().unwrap();
        sim.shutdown();
        sim.shutdown();
    }
}
