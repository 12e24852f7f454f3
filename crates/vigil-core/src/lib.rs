//! # Vigil Core Library
//!
//! Vigil watches heartbeat signals from monitored users and reacts when
//! a user goes silent: it classifies the silence into a severity level,
//! decides whether an alert should actually fire, delivers it across
//! fallback channels with retry, escalates sustained emergencies, and
//! runs a multi-party confirmation protocol before any report goes to
//! outside services.
//!
//! ## Architecture
//!
//! - **Alert Engine**: a single-threaded cooperative engine that owns
//!   all live state and is driven by the caller through `evaluate()`
//!   and `tick()` -- no internal threads, no wall-clock timers
//! - **Collaborators**: storage, transports and sensors are reached
//!   only through injected trait objects
//! - **Events**: every externally observable decision is a typed event
//!   the embedding application drains
//!
//! ## Key Components
//!
//! - [`AlertEngine`]: the engine itself
//! - [`AlertLevelCalculator`]: silence classification with contextual
//!   threshold multipliers
//! - [`SuppressionPolicy`]: cooldowns, quiet hours and rate limiting
//! - [`ConfirmationCoordinator`]: the emergency confirmation protocol
//! - [`EngineConfig`]: TOML-loadable configuration

pub mod config;
pub mod confirmation;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod escalation;
pub mod events;
pub mod level;
pub mod report;
pub mod retry;
pub mod scheduler;
pub mod sources;
pub mod suppression;

pub use config::EngineConfig;
pub use confirmation::{
    ConfirmationCoordinator, ConfirmationRequest, ConfirmationStatus, ContactDecision,
};
pub use engine::{AlertEngine, Collaborators, EvaluationOutcome, ResponseOutcome, SubjectStatus};
pub use error::{ConfigError, CoreError};
pub use escalation::EscalationState;
pub use events::Event;
pub use level::{AlertEvent, AlertLevel, AlertLevelCalculator, CalendarContext, ThresholdSet};
pub use sources::{Clock, HeartbeatRecord, ManualClock, SystemClock};
pub use suppression::{QuietHours, SuppressionPolicy, UserNotificationPrefs};
