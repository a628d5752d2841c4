//! Engine configuration.

use std::time::Duration;

use super::ConflictStrategy;
use crate::core::{
    EVENT_CHANNEL_CAPACITY, MAINTENANCE_INTERVAL, PENDING_RETENTION, SESSION_IDLE_TIMEOUT,
};

/// Sync engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long applied updates stay in the conflict window.
    pub retention: Duration,
    /// Sessions idle for longer are torn down by maintenance.
    pub session_idle_timeout: Duration,
    /// Period of the maintenance loop.
    pub maintenance_interval: Duration,
    /// Strategy for sessions created locally.
    pub conflict_strategy: ConflictStrategy,
    /// Capacity of the engine event channel.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retention: PENDING_RETENTION,
            session_idle_timeout: SESSION_IDLE_TIMEOUT,
            maintenance_interval: MAINTENANCE_INTERVAL,
            conflict_strategy: ConflictStrategy::default(),
            event_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }
}

/// Builder for [`EngineConfig`].
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Start from the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the conflict window retention.
    pub fn retention(mut self, retention: Duration) -> Self {
        self.config.retention = retention;
        self
    }

    /// Set the session idle timeout.
    pub fn session_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.session_idle_timeout = timeout;
        self
    }

    /// Set the maintenance period.
    pub fn maintenance_interval(mut self, interval: Duration) -> Self {
        self.config.maintenance_interval = interval;
        self
    }

    /// Set the strategy for locally created sessions.
    pub fn conflict_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.config.conflict_strategy = strategy;
        self
    }

    /// Set the event channel capacity (at least 1).
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity.max(1);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> EngineConfig {
        self.config
    }
}
