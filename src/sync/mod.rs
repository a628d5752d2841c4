//! Sync Layer
//!
//! Implements:
//! - Sessions with per-origin sequence numbers and a retention window
//! - The action set (`player_move`, `game_event`, `score_update`, `game_state`)
//! - Order-independent conflict resolution (last-write-wins or field-level
//!   transform)
//! - Full-state transfer for late joiners
//! - Update subscriptions and lifecycle events

pub mod apply;
mod config;
mod engine;
mod events;
mod listeners;
mod log;
mod message;
mod reconcile;
mod registry;
mod session;
mod update;

pub use config::{EngineConfig, EngineConfigBuilder};
pub use engine::{MaintenanceReport, ProcessResult, SyncEngine};
pub use events::{EndReason, EngineEvent};
pub use listeners::{ListenerRegistry, SubscriptionId, UpdateListener};
pub use log::{EntryStatus, LogEntry, UpdateLog};
pub use message::{
    MembershipChange, SessionAnnouncement, SessionNotice, StateSnapshot, SyncMessage,
};
pub use reconcile::{lww_order, ReconcileOutcome};
pub use registry::{SessionHandle, SessionRegistry};
pub use session::{ConflictStrategy, SyncSession};
pub use update::{Action, StateUpdate};
