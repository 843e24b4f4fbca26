//! Campaign analytics computed from local registrations.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::db::StatusCounts;
use crate::models::{Gender, PersonKind, Registration, SyncStatus, ATTENDANCE_DAYS};

const UNKNOWN: &str = "UNKNOWN";

/// Attendance on one campaign day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DayCount {
    /// 1-based campaign day
    pub day: usize,
    pub count: usize,
}

/// Value distributions, keyed by upper-cased value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Demographics {
    pub gender: BTreeMap<String, usize>,
    pub education: BTreeMap<String, usize>,
    pub marital_status: BTreeMap<String, usize>,
}

/// Headline numbers for a campaign.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignStats {
    pub total_registered: usize,
    pub participants: usize,
    pub facilitators: usize,
    /// Participants present on at least one day
    pub unique_attendees: usize,
    pub daily: Vec<DayCount>,
    /// Mean of the daily counts, one decimal
    pub average_daily_attendance: f64,
    pub demographics: Demographics,
    pub sync: StatusCounts,
}

impl CampaignStats {
    /// Attendance and demographics cover participants only; facilitators are
    /// counted separately.
    #[must_use]
    pub fn compute(registrations: &[Registration]) -> Self {
        let mut stats = Self {
            total_registered: registrations.len(),
            participants: 0,
            facilitators: 0,
            unique_attendees: 0,
            daily: (1..=ATTENDANCE_DAYS)
                .map(|day| DayCount { day, count: 0 })
                .collect(),
            average_daily_attendance: 0.0,
            demographics: Demographics::default(),
            sync: StatusCounts::default(),
        };

        for registration in registrations {
            match registration.sync_status {
                SyncStatus::Pending => stats.sync.pending += 1,
                SyncStatus::Synced => stats.sync.synced += 1,
                SyncStatus::Failed => stats.sync.failed += 1,
                SyncStatus::NeedsReview => stats.sync.needs_review += 1,
            }

            let fields = &registration.fields;
            if fields.kind == PersonKind::Facilitator {
                stats.facilitators += 1;
                continue;
            }
            stats.participants += 1;

            if fields.attendance.days_attended() > 0 {
                stats.unique_attendees += 1;
            }
            for (slot, present) in stats.daily.iter_mut().zip(fields.attendance.days()) {
                if *present {
                    slot.count += 1;
                }
            }

            let gender = match fields.gender {
                Gender::Unknown => None,
                known => Some(known.as_str()),
            };
            bump(&mut stats.demographics.gender, gender);
            bump(&mut stats.demographics.education, fields.education.as_deref());
            bump(
                &mut stats.demographics.marital_status,
                fields.marital_status.as_deref(),
            );
        }

        let total: usize = stats.daily.iter().map(|day| day.count).sum();
        #[allow(clippy::cast_precision_loss)]
        let average = total as f64 / ATTENDANCE_DAYS as f64;
        stats.average_daily_attendance = (average * 10.0).round() / 10.0;
        stats
    }
}

fn bump(distribution: &mut BTreeMap<String, usize>, value: Option<&str>) {
    let key = value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map_or_else(|| UNKNOWN.to_string(), str::to_uppercase);
    *distribution.entry(key).or_default() += 1;
}
