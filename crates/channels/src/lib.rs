//! Chat transport boundary and the outbound delivery path.
//!
//! A `ChatGateway` streams inbound events and performs sends/edits. Responses
//! flow through one bounded queue to a single `DeliveryWorker`, which uses
//! the `Tracker` to decide whether to post or edit.

pub mod console;
pub mod delivery;
pub mod error;
pub mod gateway;
pub mod outbound;
pub mod tracker;

pub use {
    console::ConsoleGateway,
    delivery::DeliveryWorker,
    error::{Error, Result},
    gateway::{ChatGateway, EventReceiver, EventSender, GatewayEvent},
    outbound::{OutboundReceiver, OutboundSender, outbound_queue},
    tracker::{DEFAULT_TTL_MINUTES, TrackedMessage, Tracker},
};
