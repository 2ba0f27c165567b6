//! Single consumer of the outbound queue: decides post vs. edit and keeps
//! the tracker in sync with what was actually sent.

use std::{collections::HashMap, sync::Arc};

use {
    hal_common::types::{Destination, OutboundResponse},
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crate::{gateway::ChatGateway, outbound::OutboundReceiver, tracker::Tracker};

pub struct DeliveryWorker {
    gateway: Arc<dyn ChatGateway>,
    tracker: Arc<Tracker>,
    default_ttl_minutes: u32,
    resolved: HashMap<Destination, String>,
}

impl DeliveryWorker {
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        tracker: Arc<Tracker>,
        default_ttl_minutes: u32,
    ) -> Self {
        Self {
            gateway,
            tracker,
            default_ttl_minutes,
            resolved: HashMap::new(),
        }
    }

    /// Drain `queue` in arrival order until every sender is gone or `cancel`
    /// fires. On cancellation already queued responses are still delivered.
    pub fn spawn(
        mut self,
        mut queue: OutboundReceiver,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    response = queue.recv() => match response {
                        Some(response) => self.deliver(response).await,
                        None => break,
                    },
                    () = cancel.cancelled() => {
                        queue.close();
                        while let Some(response) = queue.recv().await {
                            self.deliver(response).await;
                        }
                        break;
                    },
                }
            }
            info!("delivery worker stopped");
        })
    }

    /// Deliver one response. Failures are logged and the response dropped.
    pub async fn deliver(&mut self, response: OutboundResponse) {
        let OutboundResponse {
            destination,
            tracker_id,
            ttl_minutes,
            content,
        } = response;

        let Some(destination) = destination else {
            warn!(tracker_id = ?tracker_id, "dropping response without destination");
            return;
        };
        let Some(content) = content else {
            warn!(%destination, tracker_id = ?tracker_id, "dropping response without content");
            return;
        };
        let Some(channel_id) = self.channel_for(&destination).await else {
            warn!(%destination, "cannot resolve destination, dropping response");
            return;
        };

        let tracked = tracker_id
            .as_deref()
            .and_then(|id| self.tracker.timestamp_for(id).map(|stamp| (id, stamp)));

        if let Some((id, stamp)) = tracked {
            match self.gateway.edit(&channel_id, &stamp, &content).await {
                Ok(()) => {
                    debug!(channel_id, tracker_id = id, token = %stamp.token, "edited message");
                    let ttl = ttl_minutes.unwrap_or(self.default_ttl_minutes);
                    self.tracker.track(id, Some(stamp), ttl);
                },
                Err(e) => {
                    error!(channel_id, tracker_id = id, error = %e, "failed to edit message");
                },
            }
            return;
        }

        match self.gateway.send(&channel_id, &content).await {
            Ok(stamp) => {
                debug!(channel_id, token = %stamp.token, "posted message");
                if let Some(id) = tracker_id.as_deref() {
                    let ttl = ttl_minutes.unwrap_or(self.default_ttl_minutes);
                    self.tracker.track(id, Some(stamp), ttl);
                }
            },
            Err(e) => {
                error!(channel_id, tracker_id = ?tracker_id, error = %e, "failed to post message");
            },
        }
    }

    async fn channel_for(&mut self, destination: &Destination) -> Option<String> {
        if !destination.needs_resolution() {
            return Some(destination.to_string());
        }
        if let Some(id) = self.resolved.get(destination) {
            return Some(id.clone());
        }
        let id = self.gateway.resolve(destination).await?;
        self.resolved.insert(destination.clone(), id.clone());
        Some(id)
    }
}
