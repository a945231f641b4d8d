//! Job bodies run by the scheduler, and the on-demand operations behind the
//! manual API endpoints.
//!
//! A failure for one user is logged and counted; it never stops the batch.

use std::path::Path;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, NaiveDate, Timelike, Utc};
use serde::Serialize;
use uuid::Uuid;

use fitkit_common::error::AppError;
use fitkit_common::types::{NotificationKind, NotificationPreferences, User};
use fitkit_notifier::{ContentGenerator, DeliveryOutcome, Notifier};

use crate::context::EngineContext;
use crate::eligibility::{SkipReason, check_reminder, check_scheduled};
use crate::history::HistoryService;
use crate::preferences::PreferenceService;
use crate::report::{ReportData, ReportService, ReportType, ReportWindow};
use crate::users::{Recipient, UserService};

pub const LOG_RETENTION_DAYS: i32 = 90;
pub const REPORT_FILE_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Per-run tally of a batch job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobReport {
    pub considered: usize,
    pub delivered: usize,
    pub undelivered: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl JobReport {
    fn record(&mut self, user_id: Uuid, result: Result<DeliveryOutcome, SkipReason>) {
        self.considered += 1;
        match result {
            Ok(outcome) if outcome.delivered() => self.delivered += 1,
            Ok(_) => self.undelivered += 1,
            Err(reason) => {
                tracing::debug!(user_id = %user_id, reason = %reason, "User skipped");
                self.skipped += 1;
            }
        }
    }

    fn record_error(&mut self, user_id: Uuid, error: &AppError) {
        self.considered += 1;
        self.errors += 1;
        tracing::error!(user_id = %user_id, error = %error, "Job step failed for user");
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub logs_deleted: u64,
    pub otps_deleted: u64,
    pub report_files_deleted: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub total_users: i64,
    pub notifications_last_24h: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportDelivery {
    pub report_type: ReportType,
    pub days_covered: u32,
    pub outcome: DeliveryOutcome,
}

fn has_channel(notifier: &Notifier, kind: NotificationKind, user: &User, prefs: &NotificationPreferences) -> bool {
    !notifier.usable_channels(kind, user, prefs).is_empty()
}

/// Send a meal reminder when the user is due and outside quiet hours.
pub async fn remind_if_due(
    notifier: &Notifier,
    content: &ContentGenerator,
    recipient: &Recipient,
    now: DateTime<Utc>,
    local: DateTime<FixedOffset>,
    last_reminder_at: Option<DateTime<Utc>>,
) -> Result<DeliveryOutcome, SkipReason> {
    let Recipient { user, prefs } = recipient;
    check_reminder(
        user,
        prefs,
        now,
        local.hour(),
        last_reminder_at,
        has_channel(notifier, NotificationKind::MealReminder, user, prefs),
    )?;

    let message = content.meal_reminder(user, local).await;
    Ok(notifier
        .deliver(NotificationKind::MealReminder, user, prefs, &message)
        .await)
}

pub async fn run_meal_reminders(ctx: &EngineContext) -> anyhow::Result<JobReport> {
    let now = Utc::now();
    let local = now.with_timezone(&ctx.offset);
    let mut report = JobReport::default();

    for recipient in UserService::list_reachable(&ctx.pool).await? {
        let user_id = recipient.user.id;
        let last = match HistoryService::last_meal_reminder_at(&ctx.pool, user_id).await {
            Ok(last) => last,
            Err(e) => {
                report.record_error(user_id, &e);
                continue;
            }
        };
        let result = remind_if_due(&ctx.notifier, &ctx.content, &recipient, now, local, last).await;
        report.record(user_id, result);
    }

    tracing::info!(?report, "Meal reminder job finished");
    Ok(report)
}

async fn daily_summary_for(
    ctx: &EngineContext,
    recipient: &Recipient,
    today: NaiveDate,
    hour: u32,
) -> Result<Result<DeliveryOutcome, SkipReason>, AppError> {
    let Recipient { user, prefs } = recipient;
    let kind = NotificationKind::DailySummary;
    if let Err(reason) = check_scheduled(kind, prefs, hour, has_channel(&ctx.notifier, kind, user, prefs)) {
        return Ok(Err(reason));
    }
    let Some(summary) = UserService::summary_for(&ctx.pool, user.id, today).await? else {
        return Ok(Err(SkipReason::NoData));
    };
    let message = ctx.content.daily_summary(user, &summary).await;
    Ok(Ok(ctx.notifier.deliver(kind, user, prefs, &message).await))
}

pub async fn run_daily_summaries(ctx: &EngineContext) -> anyhow::Result<JobReport> {
    let local = ctx.now_local();
    let mut report = JobReport::default();

    for recipient in UserService::list_reachable(&ctx.pool).await? {
        match daily_summary_for(ctx, &recipient, local.date_naive(), local.hour()).await {
            Ok(result) => report.record(recipient.user.id, result),
            Err(e) => report.record_error(recipient.user.id, &e),
        }
    }

    tracing::info!(?report, "Daily summary job finished");
    Ok(report)
}

/// First day of the seven-day span ending `today`.
pub fn week_start(today: NaiveDate) -> NaiveDate {
    today - ChronoDuration::days(6)
}

async fn weekly_summary_for(
    ctx: &EngineContext,
    recipient: &Recipient,
    today: NaiveDate,
    hour: u32,
) -> Result<Result<DeliveryOutcome, SkipReason>, AppError> {
    let Recipient { user, prefs } = recipient;
    let kind = NotificationKind::WeeklySummary;
    if let Err(reason) = check_scheduled(kind, prefs, hour, has_channel(&ctx.notifier, kind, user, prefs)) {
        return Ok(Err(reason));
    }
    let start = week_start(today);
    let summaries = UserService::summaries_between(&ctx.pool, user.id, start, today).await?;
    if summaries.is_empty() {
        return Ok(Err(SkipReason::NoData));
    }
    let message = ctx.content.weekly_summary(user, &summaries, start).await;
    Ok(Ok(ctx.notifier.deliver(kind, user, prefs, &message).await))
}

pub async fn run_weekly_summaries(ctx: &EngineContext) -> anyhow::Result<JobReport> {
    let local = ctx.now_local();
    let mut report = JobReport::default();

    for recipient in UserService::list_reachable(&ctx.pool).await? {
        match weekly_summary_for(ctx, &recipient, local.date_naive(), local.hour()).await {
            Ok(result) => report.record(recipient.user.id, result),
            Err(e) => report.record_error(recipient.user.id, &e),
        }
    }

    tracing::info!(?report, "Weekly summary job finished");
    Ok(report)
}

/// Render `data`, send it under `kind`, and delete the file afterwards.
async fn render_and_deliver(
    ctx: &EngineContext,
    kind: NotificationKind,
    recipient: &Recipient,
    data: &ReportData,
    today: NaiveDate,
    strict: bool,
) -> Result<DeliveryOutcome, AppError> {
    let renderer = ctx
        .renderer
        .as_ref()
        .ok_or_else(|| AppError::ConfigurationMissing("pdf_reports".to_string()))?;
    let path = renderer.render(data).await?;

    let message = ctx
        .content
        .report(&recipient.user, data.report_type.as_str(), today, path.clone());
    let result = if strict {
        ctx.notifier
            .deliver_or_error(kind, &recipient.user, &recipient.prefs, &message)
            .await
    } else {
        Ok(ctx
            .notifier
            .deliver(kind, &recipient.user, &recipient.prefs, &message)
            .await)
    };

    ReportService::discard(&path).await;
    result
}

async fn monthly_report_for(
    ctx: &EngineContext,
    recipient: &Recipient,
    today: NaiveDate,
    hour: u32,
) -> Result<Result<DeliveryOutcome, SkipReason>, AppError> {
    let Recipient { user, prefs } = recipient;
    let kind = NotificationKind::MonthlySummary;
    if let Err(reason) = check_scheduled(kind, prefs, hour, has_channel(&ctx.notifier, kind, user, prefs)) {
        return Ok(Err(reason));
    }
    let data = match ReportService::aggregate(&ctx.pool, user, ReportWindow::monthly(), today).await {
        Ok(data) => data,
        Err(AppError::NotFound(_)) => return Ok(Err(SkipReason::NoData)),
        Err(e) => return Err(e),
    };
    let outcome = render_and_deliver(ctx, kind, recipient, &data, today, false).await?;
    Ok(Ok(outcome))
}

pub async fn run_monthly_reports(ctx: &EngineContext) -> anyhow::Result<JobReport> {
    if ctx.renderer.is_none() {
        tracing::warn!("Report renderer not configured, monthly reports skipped");
        return Ok(JobReport::default());
    }

    let local = ctx.now_local();
    let mut report = JobReport::default();

    for recipient in UserService::list_reachable(&ctx.pool).await? {
        match monthly_report_for(ctx, &recipient, local.date_naive(), local.hour()).await {
            Ok(result) => report.record(recipient.user.id, result),
            Err(e) => report.record_error(recipient.user.id, &e),
        }
    }

    tracing::info!(?report, "Monthly report job finished");
    Ok(report)
}

/// A file whose last modification is older than `max_age` at `now`.
pub fn is_stale(modified: SystemTime, now: SystemTime, max_age: Duration) -> bool {
    now.duration_since(modified)
        .map(|age| age > max_age)
        .unwrap_or(false)
}

async fn remove_stale_reports(dir: &Path, max_age: Duration) -> anyhow::Result<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let now = SystemTime::now();
    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        if is_stale(metadata.modified()?, now, max_age) {
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(path = %entry.path().display(), error = %e, "Failed to remove old report"),
            }
        }
    }
    Ok(removed)
}

pub async fn run_cleanup(ctx: &EngineContext) -> anyhow::Result<CleanupReport> {
    let logs = sqlx::query(
        "DELETE FROM notification_logs WHERE created_at < NOW() - make_interval(days => $1)",
    )
    .bind(LOG_RETENTION_DAYS)
    .execute(&ctx.pool)
    .await?;

    let otps = sqlx::query("DELETE FROM otp_records WHERE consumed OR expires_at < NOW()")
        .execute(&ctx.pool)
        .await?;

    let files = remove_stale_reports(&ctx.reports_dir, REPORT_FILE_MAX_AGE).await?;

    let report = CleanupReport {
        logs_deleted: logs.rows_affected(),
        otps_deleted: otps.rows_affected(),
        report_files_deleted: files,
    };
    tracing::info!(?report, "Cleanup finished");
    Ok(report)
}

pub async fn run_health_check(ctx: &EngineContext) -> anyhow::Result<HealthSnapshot> {
    let snapshot = HealthSnapshot {
        total_users: UserService::count(&ctx.pool).await?,
        notifications_last_24h: HistoryService::count_since(
            &ctx.pool,
            Utc::now() - ChronoDuration::hours(24),
        )
        .await?,
    };
    tracing::info!(
        total_users = snapshot.total_users,
        notifications_last_24h = snapshot.notifications_last_24h,
        "Health check"
    );
    Ok(snapshot)
}

async fn load_recipient(ctx: &EngineContext, user_id: Uuid) -> Result<Recipient, AppError> {
    let user = UserService::get(&ctx.pool, user_id).await?;
    let prefs = PreferenceService::get(&ctx.pool, user_id).await?;
    Ok(Recipient { user, prefs })
}

/// Immediate reminder requested by the user. Ignores timing and quiet hours.
pub async fn send_manual_reminder(ctx: &EngineContext, user_id: Uuid) -> Result<DeliveryOutcome, AppError> {
    let Recipient { user, prefs } = load_recipient(ctx, user_id).await?;
    if !user.phone_verified {
        return Err(AppError::Validation(
            "Phone number must be verified before sending a test reminder".to_string(),
        ));
    }

    let message = ctx.content.meal_reminder(&user, ctx.now_local()).await;
    ctx.notifier
        .deliver_or_error(NotificationKind::ManualReminder, &user, &prefs, &message)
        .await
}

pub async fn send_daily_summary_now(ctx: &EngineContext, user_id: Uuid) -> Result<DeliveryOutcome, AppError> {
    let Recipient { user, prefs } = load_recipient(ctx, user_id).await?;
    if !prefs.daily_summary {
        return Err(AppError::Validation(
            "Daily summaries are disabled in your preferences".to_string(),
        ));
    }

    let today = ctx.now_local().date_naive();
    let summary = UserService::summary_for(&ctx.pool, user_id, today)
        .await?
        .ok_or_else(|| AppError::NotFound("No nutrition data for today".to_string()))?;

    let message = ctx.content.daily_summary(&user, &summary).await;
    ctx.notifier
        .deliver_or_error(NotificationKind::DailySummary, &user, &prefs, &message)
        .await
}

pub async fn send_weekly_summary_now(ctx: &EngineContext, user_id: Uuid) -> Result<DeliveryOutcome, AppError> {
    let Recipient { user, prefs } = load_recipient(ctx, user_id).await?;
    if !prefs.weekly_summary {
        return Err(AppError::Validation(
            "Weekly summaries are disabled in your preferences".to_string(),
        ));
    }

    let today = ctx.now_local().date_naive();
    let start = week_start(today);
    let summaries = UserService::summaries_between(&ctx.pool, user_id, start, today).await?;
    if summaries.is_empty() {
        return Err(AppError::NotFound("No nutrition data for this week".to_string()));
    }

    let message = ctx.content.weekly_summary(&user, &summaries, start).await;
    ctx.notifier
        .deliver_or_error(NotificationKind::WeeklySummary, &user, &prefs, &message)
        .await
}

/// Render a report for `window` and send it as a PDF export.
pub async fn generate_and_send_report(
    ctx: &EngineContext,
    user_id: Uuid,
    window: ReportWindow,
) -> Result<ReportDelivery, AppError> {
    if ctx.renderer.is_none() {
        return Err(AppError::ConfigurationMissing("pdf_reports".to_string()));
    }
    let recipient = load_recipient(ctx, user_id).await?;
    let today = ctx.now_local().date_naive();
    let data = ReportService::aggregate(&ctx.pool, &recipient.user, window, today).await?;

    let outcome =
        render_and_deliver(ctx, NotificationKind::PdfExport, &recipient, &data, today, true).await?;

    Ok(ReportDelivery {
        report_type: window.report_type,
        days_covered: window.days,
        outcome,
    })
}
