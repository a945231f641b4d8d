//! The notifier walks a kind's channel list, sends, and records every attempt.
//!
//! Each attempt is logged `pending` before the provider call and moved to
//! `sent` or `failed` afterwards. Provider failures are logged and the next
//! channel is tried; they never propagate out of `deliver`.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use fitkit_common::config::AppConfig;
use fitkit_common::error::AppError;
use fitkit_common::types::{
    ChannelType, DeliveryStatus, NotificationKind, NotificationPreferences, User,
};

use crate::channel::{Channel, OutboundMessage};
use crate::content::MessageContent;
use crate::email::SmtpEmail;
use crate::log::DeliveryLog;
use crate::policy::{DeliveryMode, KindPolicy};
use crate::whatsapp::TwilioWhatsApp;

/// Result of one channel attempt.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryAttempt {
    pub channel: ChannelType,
    pub status: DeliveryStatus,
    pub log_id: Option<Uuid>,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryOutcome {
    pub kind: NotificationKind,
    pub user_id: Uuid,
    pub attempts: Vec<DeliveryAttempt>,
}

impl DeliveryOutcome {
    pub fn delivered(&self) -> bool {
        self.attempts.iter().any(|a| a.status == DeliveryStatus::Sent)
    }

    pub fn sent_channels(&self) -> Vec<ChannelType> {
        self.attempts
            .iter()
            .filter(|a| a.status == DeliveryStatus::Sent)
            .map(|a| a.channel)
            .collect()
    }

    fn last_error(&self) -> Option<&str> {
        self.attempts.iter().rev().find_map(|a| a.error.as_deref())
    }
}

pub struct Notifier {
    whatsapp: Option<Arc<dyn Channel>>,
    email: Option<Arc<dyn Channel>>,
    log: Arc<dyn DeliveryLog>,
}

impl Notifier {
    pub fn new(
        whatsapp: Option<Arc<dyn Channel>>,
        email: Option<Arc<dyn Channel>>,
        log: Arc<dyn DeliveryLog>,
    ) -> Self {
        Self {
            whatsapp,
            email,
            log,
        }
    }

    /// Build senders for every provider with credentials. Missing providers
    /// leave their channel disabled.
    pub fn from_config(config: &AppConfig, log: Arc<dyn DeliveryLog>) -> Self {
        let whatsapp = config.twilio().and_then(|creds| match TwilioWhatsApp::new(creds) {
            Ok(sender) => Some(Arc::new(sender) as Arc<dyn Channel>),
            Err(e) => {
                tracing::warn!(error = %e, "WhatsApp client could not be built, WhatsApp disabled");
                None
            }
        });

        let email = config.smtp().and_then(|creds| match SmtpEmail::new(creds) {
            Ok(sender) => Some(Arc::new(sender) as Arc<dyn Channel>),
            Err(e) => {
                tracing::warn!(error = %e, "SMTP transport could not be built, email disabled");
                None
            }
        });

        Self::new(whatsapp, email, log)
    }

    pub fn is_configured(&self, channel: ChannelType) -> bool {
        self.sender(channel).is_some()
    }

    fn sender(&self, channel: ChannelType) -> Option<&Arc<dyn Channel>> {
        match channel {
            ChannelType::Whatsapp => self.whatsapp.as_ref(),
            ChannelType::Email => self.email.as_ref(),
        }
    }

    /// Recipient address for `channel`, or `None` when the channel is unusable
    /// for this user and kind.
    pub fn address_for(
        &self,
        kind: NotificationKind,
        channel: ChannelType,
        user: &User,
        prefs: &NotificationPreferences,
    ) -> Option<String> {
        if !self.is_configured(channel) {
            return None;
        }
        let policy = KindPolicy::for_kind(kind);
        match channel {
            ChannelType::Whatsapp => {
                if !prefs.whatsapp_enabled {
                    return None;
                }
                if policy.requires_verified_phone && !user.phone_verified {
                    return None;
                }
                user.phone_number.clone().filter(|p| !p.is_empty())
            }
            ChannelType::Email => {
                if !prefs.email_enabled {
                    return None;
                }
                user.email.clone().filter(|e| !e.is_empty())
            }
        }
    }

    /// Channels of the kind's policy this user can be reached on, in order.
    pub fn usable_channels(
        &self,
        kind: NotificationKind,
        user: &User,
        prefs: &NotificationPreferences,
    ) -> Vec<ChannelType> {
        KindPolicy::for_kind(kind)
            .channels
            .iter()
            .copied()
            .filter(|c| self.address_for(kind, *c, user, prefs).is_some())
            .collect()
    }

    /// Send `content` according to the kind's policy.
    pub async fn deliver(
        &self,
        kind: NotificationKind,
        user: &User,
        prefs: &NotificationPreferences,
        content: &MessageContent,
    ) -> DeliveryOutcome {
        let policy = KindPolicy::for_kind(kind);
        let mut outcome = DeliveryOutcome {
            kind,
            user_id: user.id,
            attempts: Vec::new(),
        };

        for &channel in policy.channels {
            let Some(to) = self.address_for(kind, channel, user, prefs) else {
                tracing::debug!(user_id = %user.id, kind = %kind, channel = %channel, "Channel not usable, skipping");
                continue;
            };
            let Some(sender) = self.sender(channel) else {
                continue;
            };

            let attempt = self.attempt(sender.as_ref(), kind, user.id, to, content).await;
            let sent = attempt.status == DeliveryStatus::Sent;
            outcome.attempts.push(attempt);

            if sent && policy.mode == DeliveryMode::Fallback {
                break;
            }
        }

        if outcome.attempts.is_empty() {
            tracing::info!(user_id = %user.id, kind = %kind, "No usable channel for notification");
        }
        outcome
    }

    /// Like [`deliver`](Self::deliver) but turns "nothing went out" into an error
    /// for callers answering a request.
    pub async fn deliver_or_error(
        &self,
        kind: NotificationKind,
        user: &User,
        prefs: &NotificationPreferences,
        content: &MessageContent,
    ) -> Result<DeliveryOutcome, AppError> {
        let policy = KindPolicy::for_kind(kind);
        if !policy.channels.iter().any(|c| self.is_configured(*c)) {
            return Err(AppError::ConfigurationMissing(format!(
                "no provider configured for {kind}"
            )));
        }

        let outcome = self.deliver(kind, user, prefs, content).await;
        if outcome.delivered() {
            return Ok(outcome);
        }
        match outcome.last_error() {
            Some(err) => Err(AppError::DeliveryFailed(err.to_string())),
            None => Err(AppError::Validation(
                "No enabled notification channel for this user".to_string(),
            )),
        }
    }

    async fn attempt(
        &self,
        sender: &dyn Channel,
        kind: NotificationKind,
        user_id: Uuid,
        to: String,
        content: &MessageContent,
    ) -> DeliveryAttempt {
        let channel = sender.channel_type();
        let message = match channel {
            ChannelType::Whatsapp => OutboundMessage {
                to,
                subject: content.subject.clone(),
                body: content.whatsapp_text().to_string(),
                attachment: None,
            },
            ChannelType::Email => OutboundMessage {
                to,
                subject: content.subject.clone(),
                body: content.body.clone(),
                attachment: content.attachment.clone(),
            },
        };
        let logged_text = match channel {
            ChannelType::Whatsapp => message.body.clone(),
            ChannelType::Email => format!("Subject: {}\n\n{}", message.subject, message.body),
        };

        let log_id = match self
            .log
            .record_pending(user_id, kind, channel, &logged_text)
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::error!(user_id = %user_id, channel = %channel, error = %e, "Failed to record pending notification");
                None
            }
        };

        match sender.send(&message).await {
            Ok(receipt) => {
                if let Some(id) = log_id
                    && let Err(e) = self
                        .log
                        .mark_sent(id, receipt.provider_message_id.as_deref())
                        .await
                {
                    tracing::error!(log_id = %id, error = %e, "Failed to mark notification sent");
                }
                tracing::info!(user_id = %user_id, kind = %kind, channel = %channel, "Notification sent");
                DeliveryAttempt {
                    channel,
                    status: DeliveryStatus::Sent,
                    log_id,
                    provider_message_id: receipt.provider_message_id,
                    error: None,
                }
            }
            Err(err) => {
                let error = err.to_string();
                if let Some(id) = log_id
                    && let Err(e) = self.log.mark_failed(id, &error).await
                {
                    tracing::error!(log_id = %id, error = %e, "Failed to mark notification failed");
                }
                tracing::warn!(user_id = %user_id, kind = %kind, channel = %channel, error = %error, "Delivery failed");
                DeliveryAttempt {
                    channel,
                    status: DeliveryStatus::Failed,
                    log_id,
                    provider_message_id: None,
                    error: Some(error),
                }
            }
        }
    }
}
