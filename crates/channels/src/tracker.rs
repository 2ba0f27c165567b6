//! Correlation between caller-chosen tracker ids and sent messages, so a
//! later response can edit an earlier one in place.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    chrono::{DateTime, Utc},
    hal_common::types::MessageStamp,
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info},
};

/// Default time-to-live for tracked messages, in minutes.
pub const DEFAULT_TTL_MINUTES: u32 = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedMessage {
    /// `None` while the gateway has not acknowledged the send yet.
    pub stamp: Option<MessageStamp>,
    pub ttl_minutes: u32,
}

impl TrackedMessage {
    /// Whether the entry should be dropped at `now`. Entries without a
    /// stamp are always expired.
    fn expired(&self, now: DateTime<Utc>) -> bool {
        match &self.stamp {
            Some(stamp) => {
                now - stamp.sent_at > chrono::Duration::minutes(i64::from(self.ttl_minutes))
            },
            None => true,
        }
    }
}

/// Tracker map guarded by one lock shared by every operation, the reaper
/// included.
#[derive(Debug, Default)]
pub struct Tracker {
    entries: Mutex<HashMap<String, TrackedMessage>>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `tracker_id`.
    pub fn track(&self, tracker_id: &str, stamp: Option<MessageStamp>, ttl_minutes: u32) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(tracker_id.to_string(), TrackedMessage { stamp, ttl_minutes });
    }

    /// Stamp of the message sent under `tracker_id`, if it was sent and
    /// acknowledged.
    pub fn timestamp_for(&self, tracker_id: &str) -> Option<MessageStamp> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(tracker_id).and_then(|t| t.stamp.clone())
    }

    /// Fill in the stamp of a pending entry once the gateway acknowledges
    /// the send. Returns `false` when nothing is tracked under that id.
    pub fn update_tracking(&self, correlation_id: &str, stamp: MessageStamp) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get_mut(correlation_id) {
            Some(entry) => {
                entry.stamp = Some(stamp);
                true
            },
            None => {
                debug!(correlation_id, "ack for untracked message");
                false
            },
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|id, entry| {
            let keep = !entry.expired(now);
            if !keep {
                debug!(tracker_id = %id, "tracked message expired");
            }
            keep
        });
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sweep every `period` until `cancel` fires.
    pub fn spawn_reaper(
        self: &Arc<Self>,
        period: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        info!("tracker reaper stopped");
                        break;
                    },
                    _ = ticker.tick() => {
                        let removed = tracker.sweep(Utc::now());
                        if removed > 0 {
                            debug!(removed, remaining = tracker.len(), "tracker sweep");
                        }
                    },
                }
            }
        })
    }
}
