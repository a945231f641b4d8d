use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Notification delivery status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

/// Delivery medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Whatsapp,
    Email,
}

/// Every kind of message this service sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    MealReminder,
    ManualReminder,
    DailySummary,
    WeeklySummary,
    MonthlySummary,
    OtpVerification,
    Welcome,
    PdfExport,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 8] = [
        NotificationKind::MealReminder,
        NotificationKind::ManualReminder,
        NotificationKind::DailySummary,
        NotificationKind::WeeklySummary,
        NotificationKind::MonthlySummary,
        NotificationKind::OtpVerification,
        NotificationKind::Welcome,
        NotificationKind::PdfExport,
    ];
}

/// A user of the nutrition tracker, as far as notifications are concerned.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: Option<String>,
    pub name: Option<String>,
    pub phone_number: Option<String>,
    pub phone_verified: bool,
    pub last_meal_at: Option<DateTime<Utc>>,
    pub daily_calorie_goal: f64,
    pub daily_protein_goal: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Name used in greetings.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or("there")
    }
}

/// Per-user notification toggles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationPreferences {
    pub user_id: Uuid,
    pub whatsapp_enabled: bool,
    pub email_enabled: bool,
    /// Hours without a logged meal before a reminder is due (1..=24)
    pub reminder_frequency: i32,
    pub daily_summary: bool,
    pub weekly_summary: bool,
    pub monthly_summary: bool,
    /// Local hour (0..=23) quiet hours begin
    pub quiet_hours_start: i32,
    /// Local hour (0..=23) quiet hours end (exclusive)
    pub quiet_hours_end: i32,
}

impl NotificationPreferences {
    pub const DEFAULT_REMINDER_FREQUENCY: i32 = 5;
    pub const DEFAULT_QUIET_HOURS_START: i32 = 22;
    pub const DEFAULT_QUIET_HOURS_END: i32 = 7;

    /// Preferences applied when a user has never saved any.
    pub fn defaults_for(user_id: Uuid) -> Self {
        Self {
            user_id,
            whatsapp_enabled: true,
            email_enabled: true,
            reminder_frequency: Self::DEFAULT_REMINDER_FREQUENCY,
            daily_summary: true,
            weekly_summary: true,
            monthly_summary: true,
            quiet_hours_start: Self::DEFAULT_QUIET_HOURS_START,
            quiet_hours_end: Self::DEFAULT_QUIET_HOURS_END,
        }
    }

    pub fn quiet_hours(&self) -> QuietHours {
        QuietHours::new(self.quiet_hours_start, self.quiet_hours_end)
    }
}

/// A daily window, in local hours, during which proactive messages are held back.
///
/// `start > end` wraps midnight (22..7 covers 22:00-06:59). `start == end` is an
/// empty window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    pub start: u32,
    pub end: u32,
}

impl QuietHours {
    pub fn new(start: i32, end: i32) -> Self {
        Self {
            start: start.clamp(0, 23) as u32,
            end: end.clamp(0, 23) as u32,
        }
    }

    pub fn contains(&self, hour: u32) -> bool {
        use std::cmp::Ordering;
        match self.start.cmp(&self.end) {
            Ordering::Equal => false,
            Ordering::Less => hour >= self.start && hour < self.end,
            Ordering::Greater => hour >= self.start || hour < self.end,
        }
    }
}

/// One delivery attempt on one channel.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub notification_type: NotificationKind,
    pub channel: ChannelType,
    pub status: DeliveryStatus,
    pub message_content: Option<String>,
    pub provider_message_id: Option<String>,
    pub error_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A hashed one-time code issued for phone verification.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OtpRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub phone_number: String,
    pub code_hash: String,
    pub consumed: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl OtpRecord {
    /// Unconsumed and not yet expired.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.consumed && now < self.expires_at
    }
}

/// Nutrition totals for one user and day, produced by the meal tracker.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DailySummary {
    pub user_id: Uuid,
    pub date: NaiveDate,
    pub total_calories: f64,
    pub total_protein: f64,
    pub total_carbs: f64,
    pub total_fat: f64,
    pub total_fiber: f64,
    pub meals_count: i32,
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Pending => write!(f, "pending"),
            DeliveryStatus::Sent => write!(f, "sent"),
            DeliveryStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelType::Whatsapp => write!(f, "whatsapp"),
            ChannelType::Email => write!(f, "email"),
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationKind::MealReminder => write!(f, "meal_reminder"),
            NotificationKind::ManualReminder => write!(f, "manual_reminder"),
            NotificationKind::DailySummary => write!(f, "daily_summary"),
            NotificationKind::WeeklySummary => write!(f, "weekly_summary"),
            NotificationKind::MonthlySummary => write!(f, "monthly_summary"),
            NotificationKind::OtpVerification => write!(f, "otp_verification"),
            NotificationKind::Welcome => write!(f, "welcome"),
            NotificationKind::PdfExport => write!(f, "pdf_export"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_hours_wrapping_midnight() {
        let quiet = QuietHours::new(22, 7);
        assert!(quiet.contains(22));
        assert!(quiet.contains(23));
        assert!(quiet.contains(0));
        assert!(quiet.contains(6));
        assert!(!quiet.contains(7));
        assert!(!quiet.contains(14));
        assert!(!quiet.contains(21));
    }

    #[test]
    fn test_quiet_hours_same_day() {
        let quiet = QuietHours::new(13, 15);
        assert!(!quiet.contains(12));
        assert!(quiet.contains(13));
        assert!(quiet.contains(14));
        assert!(!quiet.contains(15));
    }

    #[test]
    fn test_quiet_hours_empty_window() {
        let quiet = QuietHours::new(9, 9);
        assert!((0..24).all(|h| !quiet.contains(h)));
    }

    #[test]
    fn test_default_preferences() {
        let prefs = NotificationPreferences::defaults_for(Uuid::new_v4());
        assert!(prefs.whatsapp_enabled);
        assert!(prefs.email_enabled);
        assert_eq!(prefs.reminder_frequency, 5);
        assert_eq!(prefs.quiet_hours(), QuietHours::new(22, 7));
    }

    #[test]
    fn test_kind_display_matches_serde() {
        for kind in NotificationKind::ALL {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, serde_json::json!(kind.to_string()));
        }
    }

    #[test]
    fn test_display_name_fallback() {
        let mut user = User {
            id: Uuid::new_v4(),
            email: None,
            name: Some("  ".to_string()),
            phone_number: None,
            phone_verified: false,
            last_meal_at: None,
            daily_calorie_goal: 2000.0,
            daily_protein_goal: 60.0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(user.display_name(), "there");
        user.name = Some("Asha".to_string());
        assert_eq!(user.display_name(), "Asha");
    }

    #[test]
    fn test_otp_record_usability() {
        let now = Utc::now();
        let mut record = OtpRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            phone_number: "+15551234567".to_string(),
            code_hash: "abc".to_string(),
            consumed: false,
            expires_at: now + chrono::Duration::minutes(5),
            created_at: now,
        };
        assert!(record.is_usable(now));
        assert!(!record.is_usable(now + chrono::Duration::minutes(5)));
        record.consumed = true;
        assert!(!record.is_usable(now));
    }
}
