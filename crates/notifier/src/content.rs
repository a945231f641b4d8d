//! Message content. Reminder and summary text is generated by Gemini when an API
//! key is configured; any failure falls back to fixed templates.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, Timelike};
use serde::Deserialize;
use serde_json::json;

use fitkit_common::types::{DailySummary, User};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Text for one notification, before it is addressed to a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent {
    pub subject: String,
    pub body: String,
    /// Replaces `body` on WhatsApp when set
    pub whatsapp_body: Option<String>,
    /// Attached to email only
    pub attachment: Option<PathBuf>,
}

impl MessageContent {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            whatsapp_body: None,
            attachment: None,
        }
    }

    pub fn whatsapp_text(&self) -> &str {
        self.whatsapp_body.as_deref().unwrap_or(&self.body)
    }
}

/// Weekly aggregates used by the weekly summary text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeeklyStats {
    pub days_tracked: usize,
    pub total_meals: i64,
    pub total_calories: f64,
    pub avg_calories: f64,
    pub avg_protein: f64,
}

impl WeeklyStats {
    pub fn from_summaries(summaries: &[DailySummary]) -> Self {
        let days_tracked = summaries.len();
        let total_calories: f64 = summaries.iter().map(|s| s.total_calories).sum();
        let total_protein: f64 = summaries.iter().map(|s| s.total_protein).sum();
        let total_meals = summaries.iter().map(|s| i64::from(s.meals_count)).sum();
        let days = days_tracked.max(1) as f64;
        Self {
            days_tracked,
            total_meals,
            total_calories,
            avg_calories: total_calories / days,
            avg_protein: total_protein / days,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

pub struct ContentGenerator {
    /// `None` for template-only generators.
    client: Option<reqwest::Client>,
    api_key: Option<String>,
    api_base: String,
    model: String,
    app_name: String,
}

impl ContentGenerator {
    pub fn new(
        api_key: Option<String>,
        model: impl Into<String>,
        app_name: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client: Some(client),
            api_key,
            api_base: GEMINI_API_BASE.to_string(),
            model: model.into(),
            app_name: app_name.into(),
        })
    }

    /// Templates only; no network calls.
    pub fn templates_only(app_name: impl Into<String>) -> Self {
        Self {
            client: None,
            api_key: None,
            api_base: GEMINI_API_BASE.to_string(),
            model: String::new(),
            app_name: app_name.into(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// The key travels in the `x-goog-api-key` header so it never appears
    /// in request URLs or in the errors that quote them.
    async fn request(
        &self,
        client: &reqwest::Client,
        key: &str,
        prompt: &str,
    ) -> Result<GenerateResponse, reqwest::Error> {
        let url = format!("{}/models/{}:generateContent", self.api_base, self.model);
        let body = json!({ "contents": [{ "parts": [{ "text": prompt }] }] });

        client
            .post(&url)
            .header("x-goog-api-key", key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<GenerateResponse>()
            .await
    }

    async fn generate(&self, prompt: &str) -> Option<String> {
        let client = self.client.as_ref()?;
        let key = self.api_key.as_deref()?;
        let result = self.request(client, key, prompt).await;

        match result {
            Ok(parsed) => {
                let text = parsed
                    .candidates
                    .into_iter()
                    .next()
                    .and_then(|c| c.content.parts.into_iter().find_map(|p| p.text))
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty());
                if text.is_none() {
                    tracing::warn!(model = %self.model, "AI returned no text, using template");
                }
                text
            }
            Err(e) => {
                tracing::warn!(error = %e.without_url(), model = %self.model, "AI content generation failed, using template");
                None
            }
        }
    }

    pub async fn meal_reminder(&self, user: &User, now_local: DateTime<FixedOffset>) -> MessageContent {
        let last_meal = user
            .last_meal_at
            .map(|t| t.with_timezone(&now_local.timezone()).format("%I:%M %p").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let prompt = format!(
            "Generate a friendly, encouraging WhatsApp meal reminder message for a {app} user.\n\
             User name: {name}\nLast meal time: {last_meal}\nCurrent time: {now}\n\
             Keep it under 150 characters, be warm and not pushy, include an emoji, \
             and suggest a meal that suits the current time.",
            app = self.app_name,
            name = user.display_name(),
            now = now_local.format("%I:%M %p"),
        );

        let body = match self.generate(&prompt).await {
            Some(text) => text,
            None => fallback_reminder(&self.app_name, user.display_name(), now_local.hour()),
        };
        MessageContent::new(format!("🍽️ {} meal reminder", self.app_name), body)
    }

    pub async fn daily_summary(&self, user: &User, summary: &DailySummary) -> MessageContent {
        let calorie_pct = percent_of(summary.total_calories, user.daily_calorie_goal);
        let protein_pct = percent_of(summary.total_protein, user.daily_protein_goal);
        let prompt = format!(
            "Generate a daily nutrition summary message for WhatsApp/Email.\n\
             User: {name}\nDate: {date}\n\
             Calories: {cal:.0} / {cal_goal:.0} ({calorie_pct}%)\n\
             Protein: {protein:.1}g / {protein_goal:.0}g ({protein_pct}%)\n\
             Carbs: {carbs:.1}g\nFat: {fat:.1}g\nFiber: {fiber:.1}g\nMeals logged: {meals}\n\
             Congratulate achievements, give gentle guidance, suggest tomorrow's focus, \
             keep an encouraging tone and stay under 300 words.",
            name = user.display_name(),
            date = summary.date.format("%B %d, %Y"),
            cal = summary.total_calories,
            cal_goal = user.daily_calorie_goal,
            protein = summary.total_protein,
            protein_goal = user.daily_protein_goal,
            carbs = summary.total_carbs,
            fat = summary.total_fat,
            fiber = summary.total_fiber,
            meals = summary.meals_count,
        );

        let body = match self.generate(&prompt).await {
            Some(text) => text,
            None => fallback_daily(summary),
        };
        MessageContent::new(
            format!("📊 Your Daily Nutrition Summary - {}", summary.date.format("%B %d, %Y")),
            body,
        )
    }

    pub async fn weekly_summary(
        &self,
        user: &User,
        summaries: &[DailySummary],
        week_start: NaiveDate,
    ) -> MessageContent {
        let stats = WeeklyStats::from_summaries(summaries);
        let prompt = format!(
            "Generate a weekly nutrition summary for {name}.\n\
             Days tracked: {days}/7\nTotal meals: {meals}\n\
             Average daily calories: {avg_cal:.0} (Goal: {cal_goal:.0})\n\
             Average daily protein: {avg_protein:.1}g (Goal: {protein_goal:.0}g)\n\
             Total calories this week: {total:.0}\n\
             Celebrate consistency, point out patterns, suggest specific improvements \
             for next week and keep it engaging.",
            name = user.display_name(),
            days = stats.days_tracked,
            meals = stats.total_meals,
            avg_cal = stats.avg_calories,
            cal_goal = user.daily_calorie_goal,
            avg_protein = stats.avg_protein,
            protein_goal = user.daily_protein_goal,
            total = stats.total_calories,
        );

        let body = match self.generate(&prompt).await {
            Some(text) => text,
            None => fallback_weekly(&stats),
        };
        MessageContent::new(
            format!(
                "📈 Your Weekly Nutrition Report - Week of {}",
                week_start.format("%B %d")
            ),
            body,
        )
    }

    /// Report delivery text. The PDF travels by email; WhatsApp gets a pointer to it.
    pub fn report(&self, user: &User, label: &str, date: NaiveDate, pdf: PathBuf) -> MessageContent {
        let title = title_case(label);
        let body = format!(
            "📄 Your {app} {title} Report\n\n\
             Hi {name}! 👋\n\n\
             Your personalized nutrition report is ready. It includes a detailed nutrition \
             breakdown, daily trends and recommendations for the days ahead.\n\n\
             The PDF is attached to this email.\n\n\
             Keep up the great work! 💪",
            app = self.app_name,
            name = user.display_name(),
        );
        let whatsapp = format!(
            "📄 Hi {name}! Your {app} {title} Report is ready. Check your email for the PDF. 💪",
            name = user.display_name(),
            app = self.app_name,
        );
        MessageContent {
            subject: format!(
                "📊 Your {app} {title} Report - {date}",
                app = self.app_name,
                date = date.format("%B %d, %Y")
            ),
            body,
            whatsapp_body: Some(whatsapp),
            attachment: Some(pdf),
        }
    }

    pub fn otp(&self, code: &str, expiry_minutes: i64) -> MessageContent {
        MessageContent::new(
            format!("{} verification code", self.app_name),
            format!(
                "🔐 Your {app} verification code is: {code}\n\n\
                 This code expires in {expiry_minutes} minutes. Don't share it with anyone.",
                app = self.app_name,
            ),
        )
    }

    pub fn welcome(&self, user: &User) -> MessageContent {
        MessageContent::new(
            format!("Welcome to {}", self.app_name),
            format!(
                "🎉 Welcome to {app} notifications, {name}!\n\n\
                 Your phone number is verified. You'll receive meal reminders and \
                 nutrition summaries here. You can change what you get in your \
                 notification preferences at any time.",
                app = self.app_name,
                name = user.display_name(),
            ),
        )
    }
}

/// Meal suggested for a local hour.
pub fn meal_for_hour(hour: u32) -> &'static str {
    match hour {
        6..=10 => "breakfast",
        11..=15 => "lunch",
        16..=18 => "snack",
        _ => "dinner",
    }
}

pub fn fallback_reminder(app_name: &str, name: &str, hour: u32) -> String {
    format!(
        "🍽️ Hey {name}! Time for {meal}? Don't forget to log your meal in {app_name}. \
         Your health journey matters! 💪",
        meal = meal_for_hour(hour),
    )
}

pub fn fallback_daily(summary: &DailySummary) -> String {
    format!(
        "📊 Daily Summary - {date}\n\n\
         🍽️ Meals logged: {meals}\n\
         🔥 Calories: {cal:.0}\n\
         💪 Protein: {protein:.1}g\n\
         🌾 Carbs: {carbs:.1}g\n\
         🥑 Fat: {fat:.1}g\n\n\
         Keep up the great work! 🎉",
        date = summary.date.format("%B %d"),
        meals = summary.meals_count,
        cal = summary.total_calories,
        protein = summary.total_protein,
        carbs = summary.total_carbs,
        fat = summary.total_fat,
    )
}

pub fn fallback_weekly(stats: &WeeklyStats) -> String {
    format!(
        "📈 Weekly Summary\n\n\
         🗓️ Days tracked: {days}/7\n\
         🍽️ Total meals: {meals}\n\
         🔥 Avg daily calories: {cal:.0}\n\
         💪 Avg daily protein: {protein:.1}g\n\n\
         Great progress this week! Keep it up! 🎉",
        days = stats.days_tracked,
        meals = stats.total_meals,
        cal = stats.avg_calories,
        protein = stats.avg_protein,
    )
}

fn percent_of(value: f64, goal: f64) -> i64 {
    if goal > 0.0 {
        (value / goal * 100.0).round() as i64
    } else {
        0
    }
}

fn title_case(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn make_user() -> User {
        User {
            id: Uuid::new_v4(),
            email: Some("asha@example.com".to_string()),
            name: Some("Asha".to_string()),
            phone_number: Some("+15551234567".to_string()),
            phone_verified: true,
            last_meal_at: None,
            daily_calorie_goal: 2000.0,
            daily_protein_goal: 60.0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn make_summary(day: u32, calories: f64, protein: f64, meals: i32) -> DailySummary {
        DailySummary {
            user_id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
            total_calories: calories,
            total_protein: protein,
            total_carbs: 200.0,
            total_fat: 50.0,
            total_fiber: 20.0,
            meals_count: meals,
        }
    }

    #[test]
    fn test_meal_for_hour_boundaries() {
        assert_eq!(meal_for_hour(5), "dinner");
        assert_eq!(meal_for_hour(6), "breakfast");
        assert_eq!(meal_for_hour(10), "breakfast");
        assert_eq!(meal_for_hour(11), "lunch");
        assert_eq!(meal_for_hour(15), "lunch");
        assert_eq!(meal_for_hour(16), "snack");
        assert_eq!(meal_for_hour(18), "snack");
        assert_eq!(meal_for_hour(19), "dinner");
        assert_eq!(meal_for_hour(0), "dinner");
    }

    #[test]
    fn test_weekly_stats_averages() {
        let stats = WeeklyStats::from_summaries(&[
            make_summary(1, 1800.0, 50.0, 3),
            make_summary(2, 2200.0, 70.0, 4),
        ]);
        assert_eq!(stats.days_tracked, 2);
        assert_eq!(stats.total_meals, 7);
        assert_eq!(stats.avg_calories, 2000.0);
        assert_eq!(stats.avg_protein, 60.0);
    }

    #[test]
    fn test_weekly_stats_empty_does_not_divide_by_zero() {
        let stats = WeeklyStats::from_summaries(&[]);
        assert_eq!(stats.avg_calories, 0.0);
    }

    #[test]
    fn test_percent_of_zero_goal() {
        assert_eq!(percent_of(1500.0, 2000.0), 75);
        assert_eq!(percent_of(1500.0, 0.0), 0);
    }

    #[tokio::test]
    async fn test_reminder_uses_template_without_api_key() {
        let generator = ContentGenerator::templates_only("FITKIT");
        let now = FixedOffset::east_opt(0)
            .unwrap()
            .from_utc_datetime(&NaiveDate::from_ymd_opt(2025, 3, 3).unwrap().and_hms_opt(12, 0, 0).unwrap());

        let content = generator.meal_reminder(&make_user(), now).await;
        assert!(content.body.contains("Hey Asha! Time for lunch?"));
        assert!(content.body.contains("FITKIT"));
    }

    #[tokio::test]
    async fn test_daily_summary_template_subject() {
        let generator = ContentGenerator::templates_only("FITKIT");
        let content = generator
            .daily_summary(&make_user(), &make_summary(4, 1650.0, 55.5, 3))
            .await;
        assert_eq!(content.subject, "📊 Your Daily Nutrition Summary - March 04, 2025");
        assert!(content.body.contains("Meals logged: 3"));
        assert!(content.body.contains("Protein: 55.5g"));
    }

    #[test]
    fn test_report_content_points_whatsapp_to_email() {
        let generator = ContentGenerator::templates_only("FITKIT");
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let content = generator.report(&make_user(), "monthly", date, PathBuf::from("r.pdf"));

        assert_eq!(content.subject, "📊 Your FITKIT Monthly Report - March 01, 2025");
        assert!(content.whatsapp_text().contains("Check your email"));
        assert_eq!(content.attachment, Some(PathBuf::from("r.pdf")));
    }

    #[test]
    fn test_otp_content_mentions_expiry() {
        let content = ContentGenerator::templates_only("FITKIT").otp("123456", 5);
        assert!(content.body.contains("123456"));
        assert!(content.body.contains("expires in 5 minutes"));
        assert_eq!(content.whatsapp_text(), content.body);
    }

    #[tokio::test]
    async fn test_failed_request_error_omits_api_key() {
        let key = "SECRET-KEY-123";
        let generator = ContentGenerator::new(Some(key.to_string()), "gemini-x", "FITKIT")
            .unwrap()
            .with_api_base("http://127.0.0.1:9");
        let client = generator.client.clone().unwrap();

        let err = generator
            .request(&client, key, "hello")
            .await
            .unwrap_err();

        assert!(!err.to_string().contains(key));
        assert!(!err.without_url().to_string().contains(key));
    }

    #[tokio::test]
    async fn test_unreachable_model_falls_back_to_template() {
        let generator = ContentGenerator::new(Some("k".to_string()), "gemini-x", "FITKIT")
            .unwrap()
            .with_api_base("http://127.0.0.1:9");

        let content = generator.daily_summary(&make_user(), &make_summary(3, 1800.0, 55.5, 3)).await;

        assert!(content.body.contains("Meals logged: 3"));
    }
}
