// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 kdds developers

/// QoS (Quality of Service) policies for DataWriter and DataReader.
///
/// The profile is frozen at entity creation except for the small mutable
/// subset (ownership strength, user data, deadline period), which endpoints
/// publish through an `arc-swap` snapshot.
/// Deadline QoS policy - expected data update period.
pub mod deadline;
/// Destination order QoS policy - reception vs source timestamp ordering.
pub mod destination_order;
/// Lifespan QoS policy - data expiration time.
pub mod lifespan;
/// Liveliness QoS policy - writer aliveness assertions.
pub mod liveliness;
/// Ownership QoS policy - exclusive vs shared writers.
pub mod ownership;
/// Partition QoS policy - logical data separation.
pub mod partition;

use std::time::Duration;

pub use deadline::Deadline;
pub use destination_order::DestinationOrder;
pub use lifespan::Lifespan;
pub use liveliness::{Liveliness, LivelinessKind};
pub use ownership::{Ownership, OwnershipKind};
pub use partition::Partition;

/// Special value meaning "no limit" for resource limits.
/// Corresponds to DDS LENGTH_UNLIMITED (-1 as i32).
pub const LENGTH_UNLIMITED: usize = usize::MAX;

/// QoS profile - collection of policies for Writer/Reader.
///
/// Validated at creation (fail-fast on invalid config).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QosProfile {
    /// Reliability policy.
    pub reliability: Reliability,
    /// Upper bound on how long `write` may block when the history is full.
    pub max_blocking_time: Duration,
    /// History policy (KeepLast or KeepAll).
    pub history: History,
    /// Durability policy.
    pub durability: Durability,
    /// Resource limits (sample counts, instances).
    pub resource_limits: ResourceLimits,
    /// Deadline policy.
    pub deadline: Deadline,
    /// Lifespan policy.
    pub lifespan: Lifespan,
    /// Liveliness policy.
    pub liveliness: Liveliness,
    /// Ownership policy.
    pub ownership: Ownership,
    /// Destination order policy.
    pub destination_order: DestinationOrder,
    /// Partition policy.
    pub partition: Partition,
    /// WRITER_DATA_LIFECYCLE: unregistering an instance also disposes it.
    pub autodispose_unregistered: bool,
    /// User data blob. `None` means absent; `Some(vec![])` means present
    /// and empty - the getter must not confuse the two.
    pub user_data: Option<Vec<u8>>,
}

impl Default for QosProfile {
    fn default() -> Self {
        Self {
            reliability: Reliability::BestEffort,
            max_blocking_time: Duration::from_millis(100),
            history: History::KeepLast(1),
            durability: Durability::Volatile,
            resource_limits: ResourceLimits::default(),
            deadline: Deadline::default(),
            lifespan: Lifespan::default(),
            liveliness: Liveliness::default(),
            ownership: Ownership::default(),
            destination_order: DestinationOrder::default(),
            partition: Partition::default(),
            autodispose_unregistered: true,
            user_data: None,
        }
    }
}

impl QosProfile {
    /// Reliable profile with KEEP_ALL history.
    #[must_use]
    pub fn reliable() -> Self {
        Self {
            reliability: Reliability::Reliable,
            history: History::KeepAll,
            ..Default::default()
        }
    }

    /// Best-effort profile (the default).
    #[must_use]
    pub fn best_effort() -> Self {
        Self::default()
    }

    // Fluent builders for the policies the kernel tests exercise.

    #[must_use]
    pub fn history_keep_last(mut self, depth: u32) -> Self {
        self.history = History::KeepLast(depth);
        self
    }

    #[must_use]
    pub fn history_keep_all(mut self) -> Self {
        self.history = History::KeepAll;
        self
    }

    #[must_use]
    pub fn durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    #[must_use]
    pub fn resource_limits(mut self, limits: ResourceLimits) -> Self {
        self.resource_limits = limits;
        self
    }

    #[must_use]
    pub fn max_blocking_time(mut self, budget: Duration) -> Self {
        self.max_blocking_time = budget;
        self
    }

    #[must_use]
    pub fn deadline(mut self, period: Duration) -> Self {
        self.deadline = Deadline::new(period);
        self
    }

    #[must_use]
    pub fn lifespan(mut self, duration: Duration) -> Self {
        self.lifespan = Lifespan::new(duration);
        self
    }

    #[must_use]
    pub fn liveliness(mut self, liveliness: Liveliness) -> Self {
        self.liveliness = liveliness;
        self
    }

    #[must_use]
    pub fn by_source_timestamp(mut self) -> Self {
        self.destination_order = DestinationOrder::BySourceTimestamp;
        self
    }

    #[must_use]
    pub fn partitions(mut self, names: &[&str]) -> Self {
        self.partition = Partition::new(names);
        self
    }

    #[must_use]
    pub fn autodispose_unregistered(mut self, autodispose: bool) -> Self {
        self.autodispose_unregistered = autodispose;
        self
    }

    #[must_use]
    pub fn user_data(mut self, data: Vec<u8>) -> Self {
        self.user_data = Some(data);
        self
    }

    /// Validate the policy combination.
    ///
    /// # Errors
    ///
    /// Returns a message naming the offending policy.
    pub fn validate(&self) -> Result<(), String> {
        match self.history {
            History::KeepLast(0) => {
                return Err("History::KeepLast(n) requires n > 0".to_string());
            }
            History::KeepAll => {
                if self.resource_limits.max_samples == 0 {
                    return Err(
                        "History::KeepAll requires ResourceLimits.max_samples > 0".to_string()
                    );
                }
            }
            History::KeepLast(_) => {}
        }

        let rl = &self.resource_limits;
        if rl.max_instances != LENGTH_UNLIMITED
            && rl.max_samples_per_instance != LENGTH_UNLIMITED
            && rl.max_samples != LENGTH_UNLIMITED
            && rl.max_samples < rl.max_samples_per_instance.saturating_mul(rl.max_instances)
        {
            return Err(format!(
                "max_samples ({}) must be >= max_samples_per_instance ({}) * max_instances ({})",
                rl.max_samples, rl.max_samples_per_instance, rl.max_instances
            ));
        }

        if let History::KeepLast(depth) = self.history {
            if rl.max_samples_per_instance != LENGTH_UNLIMITED
                && (depth as usize) > rl.max_samples_per_instance
            {
                return Err(
                    "History depth must be <= ResourceLimits.max_samples_per_instance".to_string(),
                );
            }
        }

        Ok(())
    }
}

/// Reliability policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Reliability {
    /// Fire-and-forget (no ACKs, no retransmission).
    #[default]
    BestEffort,
    /// Guaranteed delivery via the HEARTBEAT/ACKNACK protocol.
    Reliable,
}

impl Reliability {
    /// Offered (writer) must be at least as strong as requested (reader).
    #[must_use]
    pub fn is_compatible_with(&self, requested: &Reliability) -> bool {
        !(matches!(self, Reliability::BestEffort) && matches!(requested, Reliability::Reliable))
    }
}

/// History policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum History {
    /// Keep last N samples per instance (bounded, pushes out oldest).
    KeepLast(u32),
    /// Keep everything within resource limits; overflow rejects.
    KeepAll,
}

impl Default for History {
    fn default() -> Self {
        Self::KeepLast(1)
    }
}

/// Durability policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Durability {
    /// No persistence; late joiners see nothing.
    #[default]
    Volatile,
    /// Writer keeps history for late joiners while it lives.
    TransientLocal,
    /// History outlives the writer (external durability service).
    Persistent,
}

impl Durability {
    /// Offered (writer) must be at least as durable as requested (reader).
    #[must_use]
    pub fn is_compatible_with(&self, requested: &Durability) -> bool {
        self >= requested
    }
}

/// Resource limits for Writer/Reader history.
///
/// All three counts default to unlimited, per the DDS defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Maximum total samples across all instances.
    pub max_samples: usize,
    /// Maximum distinct instances.
    pub max_instances: usize,
    /// Maximum samples per instance.
    pub max_samples_per_instance: usize,
    /// Byte cap on unacknowledged writer history (KEEP_ALL blocking bound).
    pub max_quota_bytes: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_samples: LENGTH_UNLIMITED,
            max_instances: LENGTH_UNLIMITED,
            max_samples_per_instance: LENGTH_UNLIMITED,
            max_quota_bytes: 100_000_000,
        }
    }
}

impl ResourceLimits {
    /// Bounded limits used heavily by tests.
    #[must_use]
    pub fn bounded(
        max_samples: usize,
        max_instances: usize,
        max_samples_per_instance: usize,
    ) -> Self {
        Self {
            max_samples,
            max_instances,
            max_samples_per_instance,
            ..Default::default()
        }
    }
}
