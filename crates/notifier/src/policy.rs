//! Per-kind delivery policy: which channels are tried, in what order, whether
//! all of them or only the first success, and which gates apply.

use fitkit_common::types::{ChannelType, NotificationKind, NotificationPreferences};

/// How a policy walks its channel list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Try channels in order and stop at the first that succeeds.
    Fallback,
    /// Attempt every usable channel.
    AllChannels,
}

/// Preference flag that must be set for the kind to be sent at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferenceGate {
    None,
    DailySummary,
    WeeklySummary,
    MonthlySummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindPolicy {
    pub kind: NotificationKind,
    pub channels: &'static [ChannelType],
    pub mode: DeliveryMode,
    pub gate: PreferenceGate,
    pub respects_quiet_hours: bool,
    /// WhatsApp requires `phone_verified` unless this is false (the OTP itself).
    pub requires_verified_phone: bool,
}

const WHATSAPP_THEN_EMAIL: &[ChannelType] = &[ChannelType::Whatsapp, ChannelType::Email];
const WHATSAPP_ONLY: &[ChannelType] = &[ChannelType::Whatsapp];

const POLICIES: [KindPolicy; 8] = [
    KindPolicy {
        kind: NotificationKind::MealReminder,
        channels: WHATSAPP_THEN_EMAIL,
        mode: DeliveryMode::Fallback,
        gate: PreferenceGate::None,
        respects_quiet_hours: true,
        requires_verified_phone: true,
    },
    KindPolicy {
        kind: NotificationKind::ManualReminder,
        channels: WHATSAPP_THEN_EMAIL,
        mode: DeliveryMode::Fallback,
        gate: PreferenceGate::None,
        respects_quiet_hours: false,
        requires_verified_phone: true,
    },
    KindPolicy {
        kind: NotificationKind::DailySummary,
        channels: WHATSAPP_THEN_EMAIL,
        mode: DeliveryMode::Fallback,
        gate: PreferenceGate::DailySummary,
        respects_quiet_hours: true,
        requires_verified_phone: true,
    },
    KindPolicy {
        kind: NotificationKind::WeeklySummary,
        channels: WHATSAPP_THEN_EMAIL,
        mode: DeliveryMode::Fallback,
        gate: PreferenceGate::WeeklySummary,
        respects_quiet_hours: true,
        requires_verified_phone: true,
    },
    KindPolicy {
        kind: NotificationKind::MonthlySummary,
        channels: WHATSAPP_THEN_EMAIL,
        mode: DeliveryMode::AllChannels,
        gate: PreferenceGate::MonthlySummary,
        respects_quiet_hours: true,
        requires_verified_phone: true,
    },
    KindPolicy {
        kind: NotificationKind::OtpVerification,
        channels: WHATSAPP_ONLY,
        mode: DeliveryMode::Fallback,
        gate: PreferenceGate::None,
        respects_quiet_hours: false,
        requires_verified_phone: false,
    },
    KindPolicy {
        kind: NotificationKind::Welcome,
        channels: WHATSAPP_ONLY,
        mode: DeliveryMode::Fallback,
        gate: PreferenceGate::None,
        respects_quiet_hours: false,
        requires_verified_phone: true,
    },
    KindPolicy {
        kind: NotificationKind::PdfExport,
        channels: WHATSAPP_THEN_EMAIL,
        mode: DeliveryMode::AllChannels,
        gate: PreferenceGate::None,
        respects_quiet_hours: false,
        requires_verified_phone: true,
    },
];

impl KindPolicy {
    pub fn for_kind(kind: NotificationKind) -> &'static KindPolicy {
        match kind {
            NotificationKind::MealReminder => &POLICIES[0],
            NotificationKind::ManualReminder => &POLICIES[1],
            NotificationKind::DailySummary => &POLICIES[2],
            NotificationKind::WeeklySummary => &POLICIES[3],
            NotificationKind::MonthlySummary => &POLICIES[4],
            NotificationKind::OtpVerification => &POLICIES[5],
            NotificationKind::Welcome => &POLICIES[6],
            NotificationKind::PdfExport => &POLICIES[7],
        }
    }

    /// Whether the user's toggles allow this kind.
    pub fn enabled_by(&self, prefs: &NotificationPreferences) -> bool {
        match self.gate {
            PreferenceGate::None => true,
            PreferenceGate::DailySummary => prefs.daily_summary,
            PreferenceGate::WeeklySummary => prefs.weekly_summary,
            PreferenceGate::MonthlySummary => prefs.monthly_summary,
        }
    }

    /// Whether the kind may go out at `local_hour` given the user's quiet hours.
    pub fn allowed_at(&self, prefs: &NotificationPreferences, local_hour: u32) -> bool {
        !self.respects_quiet_hours || !prefs.quiet_hours().contains(local_hour)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_every_kind_maps_to_its_own_policy() {
        for kind in NotificationKind::ALL {
            assert_eq!(KindPolicy::for_kind(kind).kind, kind);
        }
    }

    #[test]
    fn test_otp_and_welcome_are_whatsapp_only() {
        for kind in [NotificationKind::OtpVerification, NotificationKind::Welcome] {
            assert_eq!(KindPolicy::for_kind(kind).channels, &[ChannelType::Whatsapp]);
        }
        assert!(!KindPolicy::for_kind(NotificationKind::OtpVerification).requires_verified_phone);
    }

    #[test]
    fn test_reports_go_to_all_channels() {
        assert_eq!(
            KindPolicy::for_kind(NotificationKind::MonthlySummary).mode,
            DeliveryMode::AllChannels
        );
        assert_eq!(
            KindPolicy::for_kind(NotificationKind::PdfExport).mode,
            DeliveryMode::AllChannels
        );
        assert_eq!(
            KindPolicy::for_kind(NotificationKind::MealReminder).mode,
            DeliveryMode::Fallback
        );
    }

    #[test]
    fn test_summary_gates_follow_preferences() {
        let mut prefs = NotificationPreferences::defaults_for(Uuid::new_v4());
        prefs.weekly_summary = false;
        assert!(KindPolicy::for_kind(NotificationKind::DailySummary).enabled_by(&prefs));
        assert!(!KindPolicy::for_kind(NotificationKind::WeeklySummary).enabled_by(&prefs));
        assert!(KindPolicy::for_kind(NotificationKind::ManualReminder).enabled_by(&prefs));
    }

    #[test]
    fn test_quiet_hours_only_bind_scheduled_kinds() {
        let prefs = NotificationPreferences::defaults_for(Uuid::new_v4());
        let reminder = KindPolicy::for_kind(NotificationKind::MealReminder);
        let manual = KindPolicy::for_kind(NotificationKind::ManualReminder);

        assert!(!reminder.allowed_at(&prefs, 23));
        assert!(reminder.allowed_at(&prefs, 14));
        assert!(manual.allowed_at(&prefs, 23));
    }
}
