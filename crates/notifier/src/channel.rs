//! Channel abstraction shared by the WhatsApp and email senders.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use fitkit_common::error::AppError;
use fitkit_common::types::ChannelType;

/// A single message addressed to one recipient on one channel.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    /// E.164 phone number for WhatsApp, mailbox for email
    pub to: String,
    /// Used as the email subject; ignored by WhatsApp
    pub subject: String,
    pub body: String,
    /// File attached to the message, if the channel supports attachments
    pub attachment: Option<PathBuf>,
}

/// What a provider told us after accepting a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub provider_message_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("provider rejected message ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("message could not be built: {0}")]
    Build(String),
}

impl From<DeliveryError> for AppError {
    fn from(err: DeliveryError) -> Self {
        AppError::DeliveryFailed(err.to_string())
    }
}

/// A delivery medium.
#[async_trait]
pub trait Channel: Send + Sync {
    fn channel_type(&self) -> ChannelType;

    /// Hand the message to the provider. `Ok` means the provider accepted it.
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, DeliveryError>;
}
