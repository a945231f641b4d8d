//! WhatsApp delivery through the Twilio Messages API.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use fitkit_common::config::TwilioCredentials;
use fitkit_common::types::ChannelType;

use crate::channel::{Channel, DeliveryError, DeliveryReceipt, OutboundMessage};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Sends WhatsApp messages via Twilio's REST API.
pub struct TwilioWhatsApp {
    client: reqwest::Client,
    credentials: TwilioCredentials,
}

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TwilioError {
    message: Option<String>,
    code: Option<i64>,
}

impl TwilioWhatsApp {
    pub fn new(credentials: TwilioCredentials) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DeliveryError::Build(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            credentials,
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.credentials.api_base.trim_end_matches('/'),
            self.credentials.account_sid
        )
    }
}

/// Twilio addresses WhatsApp recipients as `whatsapp:+<E.164>`.
pub fn whatsapp_address(phone: &str) -> String {
    if phone.starts_with("whatsapp:") {
        phone.to_string()
    } else {
        format!("whatsapp:{phone}")
    }
}

#[async_trait]
impl Channel for TwilioWhatsApp {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Whatsapp
    }

    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, DeliveryError> {
        if message.to.trim().is_empty() {
            return Err(DeliveryError::InvalidRecipient("empty phone number".to_string()));
        }

        let to = whatsapp_address(&message.to);
        let form = [
            ("From", self.credentials.from.as_str()),
            ("To", to.as_str()),
            ("Body", message.body.as_str()),
        ];

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.credentials.account_sid, Some(&self.credentials.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body: TwilioError = response.json().await.unwrap_or(TwilioError {
                message: None,
                code: None,
            });
            let message = match (body.code, body.message) {
                (Some(code), Some(msg)) => format!("{msg} (code {code})"),
                (None, Some(msg)) => msg,
                _ => "no error body".to_string(),
            };
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let resource: MessageResource = response
            .json()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        tracing::info!(sid = ?resource.sid, "WhatsApp message accepted by Twilio");

        Ok(DeliveryReceipt {
            provider_message_id: resource.sid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_sender(api_base: &str) -> TwilioWhatsApp {
        TwilioWhatsApp::new(TwilioCredentials {
            account_sid: "AC123".to_string(),
            auth_token: "token".to_string(),
            from: "whatsapp:+14155238886".to_string(),
            api_base: api_base.to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_whatsapp_address_prefix() {
        assert_eq!(whatsapp_address("+15551234567"), "whatsapp:+15551234567");
        assert_eq!(
            whatsapp_address("whatsapp:+15551234567"),
            "whatsapp:+15551234567"
        );
    }

    #[test]
    fn test_messages_url() {
        let sender = make_sender("https://api.twilio.com/");
        assert_eq!(
            sender.messages_url(),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Messages.json"
        );
    }

    #[tokio::test]
    async fn test_empty_recipient_rejected_without_request() {
        let sender = make_sender("http://127.0.0.1:9");
        let message = OutboundMessage {
            to: " ".to_string(),
            subject: String::new(),
            body: "hi".to_string(),
            attachment: None,
        };
        let err = sender.send(&message).await.unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidRecipient(_)));
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_transport_error() {
        let sender = make_sender("http://127.0.0.1:9");
        let message = OutboundMessage {
            to: "+15551234567".to_string(),
            subject: String::new(),
            body: "hi".to_string(),
            attachment: None,
        };
        let err = sender.send(&message).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Transport(_)));
    }
}
