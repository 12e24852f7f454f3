//! Multi-channel notification dispatch.
//!
//! Channels are attempted strictly in priority order, stopping at the
//! first success. Every attempt and its outcome is recorded. A channel
//! that overruns the per-channel time budget is treated as failed for
//! this attempt even if it eventually reported success -- no partial
//! credit. When every channel fails the alert is not dropped; the
//! caller hands it to the retry queue.

use std::rc::Rc;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::level::AlertEvent;
use crate::sources::{Channel, Clock};

/// One channel attempt and what came of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchAttempt {
    pub channel: String,
    pub success: bool,
    pub detail: Option<String>,
    pub elapsed_ms: i64,
}

/// The outcome of dispatching one alert across the channel list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    /// Name of the channel that delivered the alert, if any did.
    pub delivered_via: Option<String>,
    pub attempts: Vec<DispatchAttempt>,
}

impl DispatchOutcome {
    pub fn delivered(&self) -> bool {
        self.delivered_via.is_some()
    }
}

/// Tries an ordered list of channels and records what happened.
pub struct NotificationDispatcher {
    channels: Vec<Box<dyn Channel>>,
    channel_timeout: Duration,
    clock: Rc<dyn Clock>,
}

impl NotificationDispatcher {
    pub fn new(
        channels: Vec<Box<dyn Channel>>,
        channel_timeout_secs: u32,
        clock: Rc<dyn Clock>,
    ) -> Self {
        Self {
            channels,
            channel_timeout: Duration::seconds(i64::from(channel_timeout_secs)),
            clock,
        }
    }

    /// Attempt delivery of one alert. Stops at the first success.
    pub fn dispatch(&self, event: &AlertEvent) -> DispatchOutcome {
        let mut attempts = Vec::new();
        let mut delivered_via = None;

        for channel in &self.channels {
            let started = self.clock.now();
            let result = channel.send(event);
            let elapsed = self.clock.now() - started;
            let timed_out = elapsed > self.channel_timeout;

            let attempt = match (result, timed_out) {
                (Ok(()), false) => DispatchAttempt {
                    channel: channel.name().to_string(),
                    success: true,
                    detail: None,
                    elapsed_ms: elapsed.num_milliseconds(),
                },
                (Ok(()), true) => DispatchAttempt {
                    channel: channel.name().to_string(),
                    success: false,
                    detail: Some("timed out".to_string()),
                    elapsed_ms: elapsed.num_milliseconds(),
                },
                (Err(e), _) => DispatchAttempt {
                    channel: channel.name().to_string(),
                    success: false,
                    detail: Some(if timed_out {
                        format!("timed out: {e}")
                    } else {
                        e.to_string()
                    }),
                    elapsed_ms: elapsed.num_milliseconds(),
                },
            };

            let success = attempt.success;
            if !success {
                tracing::warn!(
                    channel = %attempt.channel,
                    alert_id = %event.id,
                    detail = attempt.detail.as_deref().unwrap_or(""),
                    "channel delivery failed"
                );
            }
            attempts.push(attempt);

            if success {
                delivered_via = Some(channel.name().to_string());
                break;
            }
        }

        DispatchOutcome {
            delivered_via,
            attempts,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}
