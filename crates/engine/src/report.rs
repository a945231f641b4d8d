//! Nutrition reports: window selection, aggregation of daily summaries, and
//! the renderer contract that turns an aggregate into a PDF on disk.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use fitkit_common::error::AppError;
use fitkit_common::types::{DailySummary, User};

use crate::users::UserService;

const RENDER_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    Weekly,
    Monthly,
    Quarterly,
    Custom,
}

impl ReportType {
    pub fn default_days(self) -> u32 {
        match self {
            ReportType::Weekly => 7,
            ReportType::Monthly => 30,
            ReportType::Quarterly => 90,
            ReportType::Custom => 7,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReportType::Weekly => "weekly",
            ReportType::Monthly => "monthly",
            ReportType::Quarterly => "quarterly",
            ReportType::Custom => "custom",
        }
    }
}

impl std::str::FromStr for ReportType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weekly" => Ok(ReportType::Weekly),
            "monthly" => Ok(ReportType::Monthly),
            "quarterly" => Ok(ReportType::Quarterly),
            "custom" => Ok(ReportType::Custom),
            other => Err(AppError::Validation(format!(
                "Invalid report_type '{other}'. Valid types: weekly, monthly, quarterly, custom"
            ))),
        }
    }
}

/// The span of days a report covers, ending today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportWindow {
    pub report_type: ReportType,
    pub days: u32,
}

impl ReportWindow {
    pub const MAX_DAYS: i64 = 365;

    /// `days_back` overrides the type's default span when given.
    pub fn new(report_type: ReportType, days_back: Option<i64>) -> Result<Self, AppError> {
        let days = match days_back {
            None => report_type.default_days(),
            Some(d) if (1..=Self::MAX_DAYS).contains(&d) => d as u32,
            Some(_) => {
                return Err(AppError::Validation(
                    "days_back must be between 1 and 365".to_string(),
                ));
            }
        };
        Ok(Self { report_type, days })
    }

    pub fn monthly() -> Self {
        Self {
            report_type: ReportType::Monthly,
            days: ReportType::Monthly.default_days(),
        }
    }

    /// Inclusive `(start, end)` covering `days` calendar days up to `today`.
    pub fn range(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let start = today - ChronoDuration::days(i64::from(self.days.max(1)) - 1);
        (start, today)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportTotals {
    pub days_tracked: usize,
    pub total_meals: i64,
    pub avg_calories: f64,
    pub avg_protein: f64,
    pub avg_carbs: f64,
    pub avg_fat: f64,
    pub avg_fiber: f64,
    /// Days whose calories landed within 10% of the goal
    pub calorie_goal_days: usize,
    /// Days whose protein reached the goal
    pub protein_goal_days: usize,
    /// Tracked days as a percentage of the window
    pub tracking_consistency: f64,
}

impl ReportTotals {
    pub fn compute(summaries: &[DailySummary], window_days: u32, calorie_goal: f64, protein_goal: f64) -> Self {
        let days_tracked = summaries.len();
        let n = days_tracked.max(1) as f64;
        let avg = |f: fn(&DailySummary) -> f64| summaries.iter().map(f).sum::<f64>() / n;

        let calorie_goal_days = summaries
            .iter()
            .filter(|s| calorie_goal > 0.0 && (s.total_calories - calorie_goal).abs() <= calorie_goal * 0.1)
            .count();
        let protein_goal_days = summaries
            .iter()
            .filter(|s| protein_goal > 0.0 && s.total_protein >= protein_goal)
            .count();

        Self {
            days_tracked,
            total_meals: summaries.iter().map(|s| i64::from(s.meals_count)).sum(),
            avg_calories: avg(|s| s.total_calories),
            avg_protein: avg(|s| s.total_protein),
            avg_carbs: avg(|s| s.total_carbs),
            avg_fat: avg(|s| s.total_fat),
            avg_fiber: avg(|s| s.total_fiber),
            calorie_goal_days,
            protein_goal_days,
            tracking_consistency: days_tracked as f64 / f64::from(window_days.max(1)) * 100.0,
        }
    }
}

/// Everything the renderer needs to draw a report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportData {
    pub user_id: Uuid,
    pub user_name: String,
    pub report_type: ReportType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days_covered: u32,
    pub daily_calorie_goal: f64,
    pub daily_protein_goal: f64,
    pub totals: ReportTotals,
    pub summaries: Vec<DailySummary>,
}

impl ReportData {
    pub fn build(user: &User, window: ReportWindow, today: NaiveDate, summaries: Vec<DailySummary>) -> Self {
        let (start_date, end_date) = window.range(today);
        let totals = ReportTotals::compute(
            &summaries,
            window.days,
            user.daily_calorie_goal,
            user.daily_protein_goal,
        );
        Self {
            user_id: user.id,
            user_name: user.display_name().to_string(),
            report_type: window.report_type,
            start_date,
            end_date,
            days_covered: window.days,
            daily_calorie_goal: user.daily_calorie_goal,
            daily_protein_goal: user.daily_protein_goal,
            totals,
            summaries,
        }
    }
}

pub struct ReportService;

impl ReportService {
    /// Load the user's summaries for `window` ending `today`. Fails with
    /// `NotFound` when nothing was tracked in the window.
    pub async fn aggregate(
        pool: &PgPool,
        user: &User,
        window: ReportWindow,
        today: NaiveDate,
    ) -> Result<ReportData, AppError> {
        let (start, end) = window.range(today);
        let summaries = UserService::summaries_between(pool, user.id, start, end).await?;
        if summaries.is_empty() {
            return Err(AppError::NotFound(format!(
                "No nutrition data between {start} and {end}"
            )));
        }
        Ok(ReportData::build(user, window, today, summaries))
    }

    /// Delete a delivered report file.
    pub async fn discard(path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove report file");
        }
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("renderer request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("renderer returned status {0}")]
    Status(u16),

    #[error("renderer returned an empty document")]
    EmptyDocument,

    #[error("could not write report: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RenderError> for AppError {
    fn from(err: RenderError) -> Self {
        AppError::DeliveryFailed(format!("report rendering failed: {err}"))
    }
}

/// Turns aggregated report data into a PDF file and returns its path.
#[async_trait]
pub trait ReportRenderer: Send + Sync {
    async fn render(&self, data: &ReportData) -> Result<PathBuf, RenderError>;
}

/// POSTs the aggregate as JSON to an external rendering service and writes the
/// returned PDF bytes into the reports directory.
pub struct HttpReportRenderer {
    client: reqwest::Client,
    url: String,
    reports_dir: PathBuf,
}

impl HttpReportRenderer {
    pub fn new(url: impl Into<String>, reports_dir: impl Into<PathBuf>) -> Result<Self, RenderError> {
        let client = reqwest::Client::builder().timeout(RENDER_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: url.into(),
            reports_dir: reports_dir.into(),
        })
    }
}

pub fn report_file_name(data: &ReportData) -> String {
    format!(
        "fitkit_{}_report_{}_{}.pdf",
        data.report_type.as_str(),
        data.user_id.simple(),
        Utc::now().format("%Y%m%d_%H%M%S")
    )
}

#[async_trait]
impl ReportRenderer for HttpReportRenderer {
    async fn render(&self, data: &ReportData) -> Result<PathBuf, RenderError> {
        let response = self.client.post(&self.url).json(data).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RenderError::Status(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(RenderError::EmptyDocument);
        }

        tokio::fs::create_dir_all(&self.reports_dir).await?;
        let path = self.reports_dir.join(report_file_name(data));
        tokio::fs::write(&path, &bytes).await?;

        tracing::info!(
            user_id = %data.user_id,
            report_type = data.report_type.as_str(),
            bytes = bytes.len(),
            path = %path.display(),
            "Report rendered"
        );
        Ok(path)
    }
}
