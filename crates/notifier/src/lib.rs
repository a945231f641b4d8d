//! Notification delivery: channel senders, per-kind policies, message content
//! and the dispatcher that walks channels in policy order, logging every attempt.

pub mod channel;
pub mod content;
pub mod dispatcher;
pub mod email;
pub mod log;
pub mod policy;
pub mod whatsapp;

pub use channel::{Channel, DeliveryError, DeliveryReceipt, OutboundMessage};
pub use content::{ContentGenerator, MessageContent};
pub use dispatcher::{DeliveryAttempt, DeliveryOutcome, Notifier};
pub use log::{DeliveryLog, MemoryDeliveryLog, PgDeliveryLog};
pub use policy::{DeliveryMode, KindPolicy, PreferenceGate};
