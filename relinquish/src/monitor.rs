//! Leak monitoring for tracked resources.
//!
//! Explicit release is mandatory: nothing releases a resource behind the
//! owner's back when it is dropped. To find the ones that were forgotten,
//! create states with [`ReleaseState::tracked`](crate::ReleaseState::tracked).
//! They register here on creation and deregister when marked released, so the
//! detector's contents are exactly the tracked resources still alive.

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use crate::types::ResourceId;

/// Registry of tracked resources that have not been released yet.
#[derive(Debug, Default)]
pub struct LeakDetector {
    active_resources: Mutex<HashMap<ResourceId, ResourceInfo>>,
}

#[derive(Debug, Clone)]
struct ResourceInfo {
    name: String,
    acquired_at: DateTime<Utc>,
    acquired: Instant,
    location: Option<String>,
}

impl LeakDetector {
    /// Create a new leak detector
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource acquisition
    pub fn register_acquisition(&self, id: ResourceId, name: &str, location: Option<String>) {
        self.active_resources.lock().insert(
            id,
            ResourceInfo {
                name: name.to_string(),
                acquired_at: Utc::now(),
                acquired: Instant::now(),
                location,
            },
        );
    }

    /// Register a resource release. Unknown ids are ignored.
    pub fn register_release(&self, id: ResourceId) {
        self.active_resources.lock().remove(&id);
    }

    /// Whether `id` is registered and not yet released
    pub fn is_tracked(&self, id: ResourceId) -> bool {
        self.active_resources.lock().contains_key(&id)
    }

    /// Get statistics about active resources
    pub fn stats(&self) -> LeakStats {
        let resources = self.active_resources.lock();
        let mut by_name = BTreeMap::new();
        let mut oldest_age = Duration::ZERO;

        for info in resources.values() {
            *by_name.entry(info.name.clone()).or_insert(0) += 1;
            oldest_age = oldest_age.max(info.acquired.elapsed());
        }

        LeakStats {
            total_active: resources.len(),
            by_name,
            oldest_resource_age: oldest_age,
        }
    }

    /// Find potentially leaked resources (alive for longer than `threshold`),
    /// oldest first
    pub fn find_potential_leaks(&self, threshold: Duration) -> Vec<LeakReport> {
        let mut leaks: Vec<_> = self
            .active_resources
            .lock()
            .iter()
            .filter(|(_, info)| info.acquired.elapsed() > threshold)
            .map(|(id, info)| LeakReport {
                id: *id,
                name: info.name.clone(),
                acquired_at: info.acquired_at,
                location: info.location.clone(),
            })
            .collect();
        leaks.sort_by_key(|leak| leak.id);
        leaks
    }

    /// Logs every potential leak at `warn` level and returns how many there were
    pub fn report_leaks(&self, threshold: Duration) -> usize {
        let leaks = self.find_potential_leaks(threshold);
        for leak in &leaks {
            warn!(
                resource = %leak.name,
                id = %leak.id,
                acquired_at = %leak.acquired_at,
                location = leak.location.as_deref().unwrap_or("unknown"),
                "resource still alive past leak threshold"
            );
        }
        leaks.len()
    }
}

/// Statistics about tracked resources that are still alive
#[derive(Debug, Default, Clone, Serialize)]
pub struct LeakStats {
    /// Total number of active resources
    pub total_active: usize,
    /// Count of active resources by name
    pub by_name: BTreeMap<String, usize>,
    /// Age of the oldest active resource
    pub oldest_resource_age: Duration,
}

/// One resource that outlived the leak threshold
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeakReport {
    /// Registration id
    pub id: ResourceId,
    /// Resource name
    pub name: String,
    /// Wall-clock time of registration
    pub acquired_at: DateTime<Utc>,
    /// Source location that created the resource
    pub location: Option<String>,
}

/// Global resource leak detector instance
static GLOBAL_LEAK_DETECTOR: OnceLock<LeakDetector> = OnceLock::new();

/// Get the global resource leak detector
pub fn global_leak_detector() -> &'static LeakDetector {
    GLOBAL_LEAK_DETECTOR.get_or_init(LeakDetector::new)
}
