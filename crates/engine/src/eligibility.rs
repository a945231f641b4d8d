//! Eligibility rules for scheduled sends.
//!
//! Pure functions over a user, their preferences and the clock, so the jobs
//! only have to fetch inputs and act on the verdict.

use chrono::{DateTime, Duration, Utc};

use fitkit_common::types::{NotificationKind, NotificationPreferences, User};
use fitkit_notifier::policy::KindPolicy;

/// A meal reminder is not repeated within this many hours.
pub const REMINDER_DEDUPE_HOURS: i64 = 2;

/// Why a user was passed over by a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    QuietHours,
    NotDue,
    RecentlyReminded,
    NoChannel,
    NoData,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Disabled => write!(f, "disabled by preferences"),
            SkipReason::QuietHours => write!(f, "inside quiet hours"),
            SkipReason::NotDue => write!(f, "not due yet"),
            SkipReason::RecentlyReminded => write!(f, "reminded recently"),
            SkipReason::NoChannel => write!(f, "no usable channel"),
            SkipReason::NoData => write!(f, "no nutrition data"),
        }
    }
}

/// Hours since the last logged meal reach the user's reminder frequency.
/// A user who never logged a meal is always due.
pub fn reminder_due(user: &User, prefs: &NotificationPreferences, now: DateTime<Utc>) -> bool {
    match user.last_meal_at {
        None => true,
        Some(last) => now - last >= Duration::hours(i64::from(prefs.reminder_frequency)),
    }
}

pub fn check_reminder(
    user: &User,
    prefs: &NotificationPreferences,
    now: DateTime<Utc>,
    local_hour: u32,
    last_reminder_at: Option<DateTime<Utc>>,
    has_channel: bool,
) -> Result<(), SkipReason> {
    let policy = KindPolicy::for_kind(NotificationKind::MealReminder);
    if !policy.allowed_at(prefs, local_hour) {
        return Err(SkipReason::QuietHours);
    }
    if !reminder_due(user, prefs, now) {
        return Err(SkipReason::NotDue);
    }
    if let Some(sent) = last_reminder_at
        && now - sent < Duration::hours(REMINDER_DEDUPE_HOURS)
    {
        return Err(SkipReason::RecentlyReminded);
    }
    if !has_channel {
        return Err(SkipReason::NoChannel);
    }
    Ok(())
}

/// Gate, quiet-hour and channel checks shared by the summary and report jobs.
pub fn check_scheduled(
    kind: NotificationKind,
    prefs: &NotificationPreferences,
    local_hour: u32,
    has_channel: bool,
) -> Result<(), SkipReason> {
    let policy = KindPolicy::for_kind(kind);
    if !policy.enabled_by(prefs) {
        return Err(SkipReason::Disabled);
    }
    if !policy.allowed_at(prefs, local_hour) {
        return Err(SkipReason::QuietHours);
    }
    if !has_channel {
        return Err(SkipReason::NoChannel);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn make_user(last_meal_hours_ago: Option<i64>, now: DateTime<Utc>) -> User {
        User {
            id: Uuid::new_v4(),
            email: Some("sam@example.com".to_string()),
            name: Some("Sam".to_string()),
            phone_number: Some("+447700900123".to_string()),
            phone_verified: true,
            last_meal_at: last_meal_hours_ago.map(|h| now - Duration::hours(h)),
            daily_calorie_goal: 2000.0,
            daily_protein_goal: 60.0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_reminder_due_after_frequency() {
        let now = Utc::now();
        let prefs = NotificationPreferences::defaults_for(Uuid::new_v4());

        assert!(reminder_due(&make_user(Some(6), now), &prefs, now));
        assert!(reminder_due(&make_user(Some(5), now), &prefs, now));
        assert!(!reminder_due(&make_user(Some(4), now), &prefs, now));
        assert!(reminder_due(&make_user(None, now), &prefs, now));
    }

    #[test]
    fn test_afternoon_reminder_eligible() {
        let now = Utc::now();
        let user = make_user(Some(6), now);
        let prefs = NotificationPreferences::defaults_for(user.id);

        assert_eq!(check_reminder(&user, &prefs, now, 14, None, true), Ok(()));
    }

    #[test]
    fn test_no_reminder_inside_quiet_hours() {
        let now = Utc::now();
        let user = make_user(Some(12), now);
        let prefs = NotificationPreferences::defaults_for(user.id);

        for hour in (22..24).chain(0..7) {
            assert_eq!(
                check_reminder(&user, &prefs, now, hour, None, true),
                Err(SkipReason::QuietHours),
                "hour {hour}"
            );
        }
    }

    #[test]
    fn test_quiet_hours_hold_back_every_scheduled_kind() {
        let prefs = NotificationPreferences::defaults_for(Uuid::new_v4());
        for kind in [
            NotificationKind::DailySummary,
            NotificationKind::WeeklySummary,
            NotificationKind::MonthlySummary,
        ] {
            assert_eq!(check_scheduled(kind, &prefs, 23, true), Err(SkipReason::QuietHours));
            assert_eq!(check_scheduled(kind, &prefs, 20, true), Ok(()));
        }
    }

    #[test]
    fn test_recent_reminder_suppresses_duplicate() {
        let now = Utc::now();
        let user = make_user(Some(8), now);
        let prefs = NotificationPreferences::defaults_for(user.id);

        let recent = Some(now - Duration::minutes(90));
        assert_eq!(
            check_reminder(&user, &prefs, now, 12, recent, true),
            Err(SkipReason::RecentlyReminded)
        );

        let older = Some(now - Duration::hours(3));
        assert_eq!(check_reminder(&user, &prefs, now, 12, older, true), Ok(()));
    }

    #[test]
    fn test_no_channel_skips() {
        let now = Utc::now();
        let user = make_user(None, now);
        let prefs = NotificationPreferences::defaults_for(user.id);
        assert_eq!(
            check_reminder(&user, &prefs, now, 12, None, false),
            Err(SkipReason::NoChannel)
        );
    }

    #[test]
    fn test_disabled_summary_skipped() {
        let mut prefs = NotificationPreferences::defaults_for(Uuid::new_v4());
        prefs.daily_summary = false;
        assert_eq!(
            check_scheduled(NotificationKind::DailySummary, &prefs, 21, true),
            Err(SkipReason::Disabled)
        );
    }
}
