//! Phone verification with one-time codes.
//!
//! Codes are six digits, stored only as a SHA-256 hash keyed by a server
//! secret and the phone number, and expire five minutes after issue. A new
//! code replaces any unconsumed one for the same user. Consumption is a
//! conditional `UPDATE ... WHERE consumed = false`, so a code verifies at most
//! once even when two requests race.

use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use fitkit_common::error::AppError;
use fitkit_common::types::{ChannelType, NotificationKind, OtpRecord, User};

use crate::context::EngineContext;
use crate::preferences::PreferenceService;
use crate::users::UserService;

pub const OTP_TTL_MINUTES: i64 = 5;
pub const OTP_LENGTH: usize = 6;

static PHONE_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\+[1-9]\d{1,14}$").ok());

/// Returned to the caller after a code went out.
#[derive(Debug, Clone, Serialize)]
pub struct OtpSent {
    pub phone_number: String,
    pub expires_at: DateTime<Utc>,
    pub expires_in_seconds: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhoneStatus {
    pub phone_number: Option<String>,
    pub phone_verified: bool,
    pub whatsapp_enabled: bool,
}

/// Strip spaces, dashes and parentheses, then require E.164 (`+` and up to 15 digits).
pub fn normalize_phone(raw: &str) -> Result<String, AppError> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();

    let pattern = PHONE_PATTERN
        .as_ref()
        .ok_or_else(|| AppError::Internal("phone pattern failed to compile".to_string()))?;

    if !pattern.is_match(&cleaned) {
        return Err(AppError::Validation(
            "Phone number must be in international format, e.g. +14155552671".to_string(),
        ));
    }
    Ok(cleaned)
}

pub fn validate_code_format(code: &str) -> Result<(), AppError> {
    if code.len() != OTP_LENGTH || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::Validation("OTP must be exactly 6 digits".to_string()));
    }
    Ok(())
}

pub fn generate_code() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{n:06}")
}

pub fn hash_code(secret: &str, phone: &str, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(b":");
    hasher.update(phone.as_bytes());
    hasher.update(b":");
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

/// Accept `code` against `record` at `now`.
pub fn check_code(
    record: &OtpRecord,
    secret: &str,
    code: &str,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    if !record.is_usable(now) {
        return Err(AppError::InvalidOrExpired);
    }
    let expected = hash_code(secret, &record.phone_number, code);
    if !constant_time_eq(expected.as_bytes(), record.code_hash.as_bytes()) {
        return Err(AppError::InvalidOrExpired);
    }
    Ok(())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub struct OtpService;

impl OtpService {
    /// Store `raw_phone` on the user and send a fresh code to it over WhatsApp.
    pub async fn send(ctx: &EngineContext, user_id: Uuid, raw_phone: &str) -> Result<OtpSent, AppError> {
        let phone = normalize_phone(raw_phone)?;
        let prefs = PreferenceService::get(&ctx.pool, user_id).await?;
        if !prefs.whatsapp_enabled {
            return Err(AppError::Validation(
                "WhatsApp notifications are disabled; enable them to verify a phone number"
                    .to_string(),
            ));
        }
        if !ctx.notifier.is_configured(ChannelType::Whatsapp) {
            return Err(AppError::ConfigurationMissing("whatsapp".to_string()));
        }

        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE phone_number = $1 AND id <> $2)",
        )
        .bind(&phone)
        .bind(user_id)
        .fetch_one(&ctx.pool)
        .await?;
        if taken {
            return Err(AppError::Validation(
                "Phone number is already registered to another account".to_string(),
            ));
        }

        let code = generate_code();
        let expires_at = Utc::now() + Duration::minutes(OTP_TTL_MINUTES);

        let mut tx = ctx.pool.begin().await?;

        // A changed number loses its verified flag; re-sending to the same number keeps it.
        let user: User = sqlx::query_as(
            r#"
            UPDATE users
            SET phone_verified = (phone_verified AND phone_number IS NOT DISTINCT FROM $2),
                phone_number = $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&phone)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;

        sqlx::query("DELETE FROM otp_records WHERE user_id = $1 AND consumed = false")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO otp_records (user_id, phone_number, code_hash, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user_id)
        .bind(&phone)
        .bind(hash_code(&ctx.otp_secret, &phone, &code))
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let content = ctx.content.otp(&code, OTP_TTL_MINUTES);
        ctx.notifier
            .deliver_or_error(NotificationKind::OtpVerification, &user, &prefs, &content)
            .await?;

        tracing::info!(user_id = %user_id, "OTP sent");

        Ok(OtpSent {
            phone_number: phone,
            expires_at,
            expires_in_seconds: OTP_TTL_MINUTES * 60,
        })
    }

    /// Check `code` against the latest unconsumed record for the user's phone,
    /// consume it and mark the phone verified. A welcome message follows.
    pub async fn verify(ctx: &EngineContext, user_id: Uuid, code: &str) -> Result<User, AppError> {
        validate_code_format(code)?;

        let user = UserService::get(&ctx.pool, user_id).await?;
        let phone = user
            .phone_number
            .clone()
            .ok_or_else(|| AppError::Validation("No phone number on file; request a code first".to_string()))?;

        let record: OtpRecord = sqlx::query_as(
            r#"
            SELECT * FROM otp_records
            WHERE user_id = $1 AND phone_number = $2 AND consumed = false
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(&phone)
        .fetch_optional(&ctx.pool)
        .await?
        .ok_or(AppError::InvalidOrExpired)?;

        check_code(&record, &ctx.otp_secret, code, Utc::now())?;

        let mut tx = ctx.pool.begin().await?;

        let consumed = sqlx::query(
            "UPDATE otp_records SET consumed = true WHERE id = $1 AND consumed = false AND expires_at > NOW()",
        )
        .bind(record.id)
        .execute(&mut *tx)
        .await?;
        if consumed.rows_affected() == 0 {
            return Err(AppError::InvalidOrExpired);
        }

        let user: User = sqlx::query_as(
            "UPDATE users SET phone_verified = true, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(user_id = %user_id, "Phone number verified");

        let prefs = PreferenceService::get(&ctx.pool, user_id).await?;
        let welcome = ctx.content.welcome(&user);
        let outcome = ctx
            .notifier
            .deliver(NotificationKind::Welcome, &user, &prefs, &welcome)
            .await;
        if !outcome.delivered() {
            tracing::warn!(user_id = %user_id, "Welcome message not delivered");
        }

        Ok(user)
    }

    pub async fn status(ctx: &EngineContext, user_id: Uuid) -> Result<PhoneStatus, AppError> {
        let user = UserService::get(&ctx.pool, user_id).await?;
        let prefs = PreferenceService::get(&ctx.pool, user_id).await?;
        Ok(PhoneStatus {
            phone_number: user.phone_number,
            phone_verified: user.phone_verified,
            whatsapp_enabled: prefs.whatsapp_enabled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    fn make_record(phone: &str, code: &str, issued: DateTime<Utc>) -> OtpRecord {
        OtpRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            phone_number: phone.to_string(),
            code_hash: hash_code(SECRET, phone, code),
            consumed: false,
            expires_at: issued + Duration::minutes(OTP_TTL_MINUTES),
            created_at: issued,
        }
    }

    #[test]
    fn test_normalize_phone_strips_formatting() {
        assert_eq!(normalize_phone("+1 (415) 555-2671").unwrap(), "+14155552671");
        assert_eq!(normalize_phone("+44 7700 900123").unwrap(), "+447700900123");
    }

    #[test]
    fn test_normalize_phone_rejects_invalid() {
        for raw in ["4155552671", "+0123456", "+1", "+1234567890123456", "+1415abc2671", ""] {
            assert!(
                matches!(normalize_phone(raw), Err(AppError::Validation(_))),
                "{raw:?} accepted"
            );
        }
    }

    #[test]
    fn test_generated_codes_are_six_digits() {
        for _ in 0..200 {
            let code = generate_code();
            assert!(validate_code_format(&code).is_ok(), "bad code {code}");
        }
    }

    #[test]
    fn test_code_format() {
        assert!(validate_code_format("123456").is_ok());
        assert!(validate_code_format("12345").is_err());
        assert!(validate_code_format("1234567").is_err());
        assert!(validate_code_format("12a456").is_err());
    }

    #[test]
    fn test_hash_binds_phone_and_secret() {
        let base = hash_code(SECRET, "+15551234567", "123456");
        assert_eq!(base.len(), 64);
        assert_eq!(base, hash_code(SECRET, "+15551234567", "123456"));
        assert_ne!(base, hash_code(SECRET, "+15557654321", "123456"));
        assert_ne!(base, hash_code("other", "+15551234567", "123456"));
        assert_ne!(base, hash_code(SECRET, "+15551234567", "654321"));
    }

    #[test]
    fn test_check_code_within_expiry() {
        let issued = Utc::now();
        let record = make_record("+15551234567", "123456", issued);

        assert!(check_code(&record, SECRET, "123456", issued + Duration::minutes(4)).is_ok());
        assert!(matches!(
            check_code(&record, SECRET, "123456", issued + Duration::minutes(5)),
            Err(AppError::InvalidOrExpired)
        ));
        assert!(matches!(
            check_code(&record, SECRET, "654321", issued),
            Err(AppError::InvalidOrExpired)
        ));
    }

    #[test]
    fn test_code_verifies_once() {
        let issued = Utc::now();
        let mut record = make_record("+15551234567", "123456", issued);

        assert!(check_code(&record, SECRET, "123456", issued).is_ok());
        record.consumed = true;
        assert!(matches!(
            check_code(&record, SECRET, "123456", issued),
            Err(AppError::InvalidOrExpired)
        ));
    }
}
