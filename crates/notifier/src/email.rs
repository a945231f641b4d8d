//! Email delivery over SMTP (STARTTLS) with optional file attachment.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use fitkit_common::config::SmtpCredentials;
use fitkit_common::types::ChannelType;

use crate::channel::{Channel, DeliveryError, DeliveryReceipt, OutboundMessage};

const SMTP_TIMEOUT: Duration = Duration::from_secs(20);

pub struct SmtpEmail {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpEmail {
    pub fn new(credentials: SmtpCredentials) -> Result<Self, DeliveryError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&credentials.server)
            .map_err(|e| DeliveryError::Transport(e.to_string()))?
            .port(credentials.port)
            .credentials(Credentials::new(credentials.username, credentials.password))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        Ok(Self {
            transport,
            from: credentials.from,
        })
    }

    async fn build(&self, message: &OutboundMessage) -> Result<Message, DeliveryError> {
        let builder = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| DeliveryError::Build(format!("sender address: {e}")))?,
            )
            .to(message
                .to
                .parse()
                .map_err(|e| DeliveryError::InvalidRecipient(format!("{}: {e}", message.to)))?)
            .subject(message.subject.clone());

        let built = match &message.attachment {
            None => builder
                .header(ContentType::TEXT_PLAIN)
                .body(message.body.clone()),
            Some(path) => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|e| DeliveryError::Build(format!("attachment {}: {e}", path.display())))?;
                let content_type = ContentType::parse(content_type_for(path))
                    .map_err(|e| DeliveryError::Build(e.to_string()))?;
                let attachment = Attachment::new(attachment_name(path)).body(bytes, content_type);
                builder.multipart(
                    MultiPart::mixed()
                        .singlepart(SinglePart::plain(message.body.clone()))
                        .singlepart(attachment),
                )
            }
        };

        built.map_err(|e| DeliveryError::Build(e.to_string()))
    }
}

fn attachment_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string())
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl Channel for SmtpEmail {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Email
    }

    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, DeliveryError> {
        let email = self.build(message).await?;
        let response = self
            .transport
            .send(email)
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        tracing::info!(
            code = %response.code(),
            attachment = message.attachment.is_some(),
            "Email accepted by SMTP relay"
        );

        Ok(DeliveryReceipt::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_attachment_content_type() {
        assert_eq!(content_type_for(Path::new("r/report.pdf")), "application/pdf");
        assert_eq!(content_type_for(Path::new("r/data.bin")), "application/octet-stream");
    }

    #[test]
    fn test_attachment_name() {
        let path = PathBuf::from("/tmp/reports/fitkit_report_monthly.pdf");
        assert_eq!(attachment_name(&path), "fitkit_report_monthly.pdf");
    }
}
