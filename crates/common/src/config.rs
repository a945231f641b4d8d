use chrono::{FixedOffset, Offset, Utc};
use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Product name used in message templates
    pub app_name: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Port the HTTP API binds to (default: 3000)
    pub api_port: u16,

    /// JWT secret for API authentication
    pub jwt_secret: String,

    /// JWT token expiry in hours
    pub jwt_expiry_hours: u64,

    /// Twilio account SID for WhatsApp delivery
    pub twilio_account_sid: Option<String>,

    /// Twilio auth token for WhatsApp delivery
    pub twilio_auth_token: Option<String>,

    /// WhatsApp sender, e.g. `whatsapp:+14155238886`
    pub twilio_whatsapp_from: String,

    /// Twilio REST base URL (overridable for sandboxes)
    pub twilio_api_base: String,

    /// SMTP relay host
    pub smtp_server: String,

    /// SMTP submission port (STARTTLS)
    pub smtp_port: u16,

    pub smtp_username: Option<String>,

    pub smtp_password: Option<String>,

    /// Email sender address
    pub email_from: String,

    /// Google Generative Language API key for message generation
    pub google_api_key: Option<String>,

    /// Gemini model name
    pub gemini_model: String,

    /// Endpoint that turns aggregated nutrition data into PDF bytes
    pub report_renderer_url: Option<String>,

    /// Directory rendered reports are written to before delivery
    pub reports_dir: String,

    /// Offset from UTC, in minutes, used for wall-clock triggers and quiet hours
    pub utc_offset_minutes: i32,

    /// Secret mixed into OTP hashes
    pub otp_hash_secret: String,

    /// Whether the background scheduler starts with the API server
    pub scheduler_enabled: bool,
}

/// Largest UTC offset, in minutes, that `FixedOffset` accepts.
pub const MAX_UTC_OFFSET_MINUTES: i32 = 24 * 60 - 1;

fn parse_utc_offset(raw: &str) -> anyhow::Result<i32> {
    let minutes: i32 = raw
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("NOTIFY_UTC_OFFSET_MINUTES must be a valid i32"))?;
    if !(-MAX_UTC_OFFSET_MINUTES..=MAX_UTC_OFFSET_MINUTES).contains(&minutes) {
        anyhow::bail!(
            "NOTIFY_UTC_OFFSET_MINUTES must be between -{MAX_UTC_OFFSET_MINUTES} and {MAX_UTC_OFFSET_MINUTES}"
        );
    }
    Ok(minutes)
}

fn offset_from_minutes(minutes: i32) -> FixedOffset {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| Utc.fix())
}

/// Credentials for the Twilio WhatsApp API.
#[derive(Debug, Clone)]
pub struct TwilioCredentials {
    pub account_sid: String,
    pub auth_token: String,
    pub from: String,
    pub api_base: String,
}

/// Credentials for the SMTP relay.
#[derive(Debug, Clone)]
pub struct SmtpCredentials {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let jwt_secret = std::env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;

        Ok(Self {
            app_name: std::env::var("APP_NAME").unwrap_or_else(|_| "FITKIT".to_string()),
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("API_PORT must be a valid u16"))?,
            otp_hash_secret: std::env::var("OTP_HASH_SECRET")
                .unwrap_or_else(|_| jwt_secret.clone()),
            jwt_secret,
            jwt_expiry_hours: std::env::var("JWT_EXPIRY_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("JWT_EXPIRY_HOURS must be a valid u64"))?,
            twilio_account_sid: non_empty_var("TWILIO_ACCOUNT_SID"),
            twilio_auth_token: non_empty_var("TWILIO_AUTH_TOKEN"),
            twilio_whatsapp_from: std::env::var("TWILIO_WHATSAPP_FROM")
                .unwrap_or_else(|_| "whatsapp:+14155238886".to_string()),
            twilio_api_base: std::env::var("TWILIO_API_BASE")
                .unwrap_or_else(|_| "https://api.twilio.com".to_string()),
            smtp_server: std::env::var("SMTP_SERVER")
                .unwrap_or_else(|_| "smtp.gmail.com".to_string()),
            smtp_port: std::env::var("SMTP_PORT")
                .unwrap_or_else(|_| "587".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("SMTP_PORT must be a valid u16"))?,
            smtp_username: non_empty_var("SMTP_USERNAME"),
            smtp_password: non_empty_var("SMTP_PASSWORD"),
            email_from: std::env::var("FROM_EMAIL")
                .unwrap_or_else(|_| "noreply@fitkit.com".to_string()),
            google_api_key: non_empty_var("GOOGLE_API_KEY"),
            gemini_model: std::env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-2.0-flash".to_string()),
            report_renderer_url: non_empty_var("REPORT_RENDERER_URL"),
            reports_dir: std::env::var("REPORTS_DIR").unwrap_or_else(|_| "reports".to_string()),
            utc_offset_minutes: parse_utc_offset(
                &std::env::var("NOTIFY_UTC_OFFSET_MINUTES").unwrap_or_else(|_| "0".to_string()),
            )?,
            scheduler_enabled: std::env::var("SCHEDULER_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("SCHEDULER_ENABLED must be true or false"))?,
        })
    }

    /// Twilio credentials, or `None` when WhatsApp delivery is not configured.
    pub fn twilio(&self) -> Option<TwilioCredentials> {
        Some(TwilioCredentials {
            account_sid: self.twilio_account_sid.clone()?,
            auth_token: self.twilio_auth_token.clone()?,
            from: self.twilio_whatsapp_from.clone(),
            api_base: self.twilio_api_base.clone(),
        })
    }

    /// SMTP credentials, or `None` when email delivery is not configured.
    pub fn smtp(&self) -> Option<SmtpCredentials> {
        Some(SmtpCredentials {
            server: self.smtp_server.clone(),
            port: self.smtp_port,
            username: self.smtp_username.clone()?,
            password: self.smtp_password.clone()?,
            from: self.email_from.clone(),
        })
    }

    /// Local offset for schedule and quiet-hour evaluation.
    ///
    /// Out-of-range values fall back to UTC.
    pub fn local_offset(&self) -> FixedOffset {
        offset_from_minutes(self.utc_offset_minutes)
    }

    /// Names of providers whose credentials are absent.
    pub fn missing_providers(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.twilio().is_none() {
            missing.push("whatsapp");
        }
        if self.smtp().is_none() {
            missing.push("email");
        }
        if self.google_api_key.is_none() {
            missing.push("ai_content");
        }
        if self.report_renderer_url.is_none() {
            missing.push("pdf_reports");
        }
        missing
    }

    /// Log a warning for every provider that will be disabled.
    pub fn log_missing_providers(&self) {
        for provider in self.missing_providers() {
            tracing::warn!(provider, "Configuration missing, feature disabled");
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_utc_offset() {
        assert_eq!(parse_utc_offset("0").unwrap(), 0);
        assert_eq!(parse_utc_offset("330").unwrap(), 330);
        assert_eq!(parse_utc_offset("-1439").unwrap(), -1439);
        assert!(parse_utc_offset("1440").is_err());
        assert!(parse_utc_offset("2147483647").is_err());
        assert!(parse_utc_offset("-2147483648").is_err());
        assert!(parse_utc_offset("ist").is_err());
    }

    #[test]
    fn test_offset_from_minutes_never_overflows() {
        assert_eq!(offset_from_minutes(330).local_minus_utc(), 330 * 60);
        assert_eq!(offset_from_minutes(i32::MAX).local_minus_utc(), 0);
        assert_eq!(offset_from_minutes(i32::MIN).local_minus_utc(), 0);
        assert_eq!(offset_from_minutes(1440).local_minus_utc(), 0);
    }
}
