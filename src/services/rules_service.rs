/*!
 * Rules Engine Service
 *
 * Pure planning logic: decides which notifications a domain object owes,
 * with what fire time and job id, and whether a dispatch should be
 * suppressed at the transport boundary ("just log"). Nothing here does
 * I/O; ingest handlers feed it snapshots and prior history, dispatch
 * feeds it eligibility flags.
 */

use chrono::{DateTime, Duration, Months, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

use crate::config::RulesConfig;
use crate::models::{NotificationType, ProgrammeMembershipEvent};

/// Week milestones for programme start reminders, most distant first
pub const REMINDER_WEEKS: [u32; 6] = [12, 8, 4, 2, 1, 0];

/// Days before the CCT date that each POG notification targets
const POG_12_MONTH_LEAD_DAYS: i64 = 365;
const POG_6_MONTH_LEAD_DAYS: i64 = 182;

/// Days before a placement start that its reminder targets
const PLACEMENT_LEAD_DAYS: i64 = 84;

/// A notification the rules engine has decided to schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedNotification {
    pub notification_type: NotificationType,
    /// Deterministic job id; rescheduling the same id replaces
    pub job_id: String,
    /// Intended fire instant, before scheduler jitter
    pub fire_at: DateTime<Utc>,
    /// Day-of milestones spread over the configured jitter window
    pub day_of_milestone: bool,
}

/// Eligibility flags feeding the suppress-vs-send decision
#[derive(Debug, Clone, Copy, Default)]
pub struct EligibilityFlags {
    pub valid_recipient: bool,
    pub messaging_enabled: bool,
    pub has_dummy_role: bool,
    pub whitelisted: bool,
    /// A required contact failed to resolve. Callers must set this for
    /// BOTH a missing delivery address AND an LO-targeted notification
    /// whose local office directory fell back to the default wording;
    /// the second case is easy to miss because the fallback still
    /// renders ("your local office") while delivery must be suppressed.
    pub contact_missing: bool,
}

/// Rules engine
#[derive(Clone)]
pub struct RulesService {
    config: RulesConfig,
}

impl RulesService {
    pub fn new(config: RulesConfig) -> Self {
        Self { config }
    }

    /// Deterministic job id for a notification about a domain object
    pub fn job_id(notification_type: NotificationType, reference_id: &str) -> String {
        format!("{}-{}", notification_type.as_str(), reference_id)
    }

    /// "Today" in the configured timezone
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.config.timezone).date_naive()
    }

    /// Midnight of a local date as a UTC instant
    pub fn local_midnight_utc(&self, date: NaiveDate) -> DateTime<Utc> {
        local_midnight_utc(self.config.timezone, date)
    }

    // ========================================================================
    // PROGRAMME MEMBERSHIP RULES
    // ========================================================================

    /// Whether a programme membership is excluded from all notifications
    pub fn is_programme_membership_excluded(
        &self,
        event: &ProgrammeMembershipEvent,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(start_date) = event.start_date else {
            return true;
        };
        if start_date < self.today(now) {
            return true;
        }

        let curricula = event.curricula.as_deref().unwrap_or_default();
        if curricula.is_empty() {
            return true;
        }

        let has_included_subtype = curricula.iter().any(|c| {
            c.sub_type.as_deref().is_some_and(|sub_type| {
                self.config
                    .included_curriculum_subtypes
                    .iter()
                    .any(|included| included.eq_ignore_ascii_case(sub_type))
            })
        });
        if !has_included_subtype {
            return true;
        }

        let has_excluded_specialty = curricula.iter().any(|c| {
            c.specialty.as_deref().is_some_and(|specialty| {
                self.config
                    .excluded_specialties
                    .iter()
                    .any(|excluded| excluded == &specialty.to_uppercase())
            })
        });

        has_excluded_specialty
    }

    /// The scheduled (email) notifications a non-excluded programme
    /// membership owes at ingest time. Reminders whose deadline has
    /// passed are skipped, never sent late.
    pub fn plan_programme_notifications(
        &self,
        event: &ProgrammeMembershipEvent,
        now: DateTime<Utc>,
    ) -> Vec<PlannedNotification> {
        let Some(start_date) = event.start_date else {
            return Vec::new();
        };

        let mut planned = vec![PlannedNotification {
            notification_type: NotificationType::ProgrammeCreated,
            job_id: Self::job_id(NotificationType::ProgrammeCreated, &event.tis_id),
            fire_at: now,
            day_of_milestone: false,
        }];

        let start_instant = self.local_midnight_utc(start_date);
        planned.push(PlannedNotification {
            notification_type: NotificationType::ProgrammeDayOne,
            job_id: Self::job_id(NotificationType::ProgrammeDayOne, &event.tis_id),
            fire_at: start_instant,
            day_of_milestone: true,
        });

        for weeks in REMINDER_WEEKS {
            let deadline_date = start_date - Duration::days(i64::from(weeks) * 7);
            let deadline = self.local_midnight_utc(deadline_date);
            if deadline <= now {
                continue;
            }

            let Some(notification_type) = NotificationType::programme_week(weeks) else {
                continue;
            };
            planned.push(PlannedNotification {
                notification_type,
                job_id: Self::job_id(notification_type, &event.tis_id),
                fire_at: deadline,
                day_of_milestone: weeks == 0,
            });
        }

        if let Some(pog) = self.plan_pog_notification(event, now) {
            planned.push(pog);
        }

        planned
    }

    /// The single period-of-grace notification owed, if any.
    ///
    /// A CCT at least the 12-month cutoff away owes the 12-month
    /// notification; one at least the POG cutoff away owes the 6-month
    /// notification; a CCT inside the cutoff window owes neither.
    pub fn plan_pog_notification(
        &self,
        event: &ProgrammeMembershipEvent,
        now: DateTime<Utc>,
    ) -> Option<PlannedNotification> {
        let cct = event.cct_date()?;
        let today = self.today(now);

        let twelve_month_cutoff = today
            .checked_add_months(Months::new(self.config.pog_12_month_cutoff_months))?;
        let pog_cutoff = today + Duration::weeks(i64::from(self.config.pog_cutoff_weeks));

        let (notification_type, lead_days) = if cct >= twelve_month_cutoff {
            (NotificationType::ProgrammePogMonth12, POG_12_MONTH_LEAD_DAYS)
        } else if cct >= pog_cutoff {
            (NotificationType::ProgrammePogMonth6, POG_6_MONTH_LEAD_DAYS)
        } else {
            return None;
        };

        let target_date = cct - Duration::days(lead_days);
        let fire_at = self.local_midnight_utc(target_date).max(now);

        Some(PlannedNotification {
            notification_type,
            job_id: Self::job_id(notification_type, &event.tis_id),
            fire_at,
            day_of_milestone: true,
        })
    }

    /// The in-app notifications owed at programme-create time
    pub fn plan_programme_in_app(&self) -> [NotificationType; 5] {
        [
            NotificationType::EPortfolio,
            NotificationType::IndemnityInsurance,
            NotificationType::Ltft,
            NotificationType::Deferral,
            NotificationType::Sponsorship,
        ]
    }

    // ========================================================================
    // DEFERRAL / POG EXTENSION
    // ========================================================================

    /// Whether a start-date move counts as a deferral
    pub fn is_deferral(&self, old_start: NaiveDate, new_start: NaiveDate) -> bool {
        (new_start - old_start).num_days() > self.config.deferral_more_than_days
    }

    /// Fire time for a deferred PROGRAMME_CREATED: keep the original
    /// lead time relative to the new start date; a lead that has
    /// already passed fires immediately.
    pub fn deferred_fire_time(
        &self,
        old_start: NaiveDate,
        old_sent_at: DateTime<Utc>,
        new_start: NaiveDate,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let old_start_instant = self.local_midnight_utc(old_start);
        let lead_days = (old_start_instant - old_sent_at).num_days().max(0);

        let fire_at = self.local_midnight_utc(new_start) - Duration::days(lead_days);
        fire_at.max(now)
    }

    /// Whether a CCT move warrants rescheduling the POG notification
    pub fn is_pog_extension(&self, old_cct: NaiveDate, new_cct: NaiveDate) -> bool {
        new_cct >= old_cct + Duration::days(self.config.deferral_more_than_days)
    }

    // ========================================================================
    // PLACEMENT RULES
    // ========================================================================

    /// The scheduled notification a placement owes at ingest time, if
    /// its 12-week deadline is still in the future
    pub fn plan_placement_notification(
        &self,
        tis_id: &str,
        start_date: Option<NaiveDate>,
        now: DateTime<Utc>,
    ) -> Option<PlannedNotification> {
        let start_date = start_date?;
        let deadline = self.local_midnight_utc(start_date - Duration::days(PLACEMENT_LEAD_DAYS));
        if deadline <= now {
            return None;
        }

        Some(PlannedNotification {
            notification_type: NotificationType::PlacementUpdatedWeek12,
            job_id: Self::job_id(NotificationType::PlacementUpdatedWeek12, tis_id),
            fire_at: deadline,
            day_of_milestone: false,
        })
    }

    // ========================================================================
    // LTFT RULES
    // ========================================================================

    /// Trainee-channel notification type for an LTFT form state
    pub fn ltft_notification_type(state: Option<&str>) -> NotificationType {
        match state {
            Some("APPROVED") => NotificationType::LtftApproved,
            Some("SUBMITTED") => NotificationType::LtftSubmitted,
            Some("UNSUBMITTED") => NotificationType::LtftUnsubmitted,
            Some("WITHDRAWN") => NotificationType::LtftWithdrawn,
            _ => NotificationType::LtftUpdated,
        }
    }

    /// TPD-channel notification type for an LTFT form state; only
    /// approvals and submissions notify the TPD
    pub fn ltft_tpd_notification_type(state: Option<&str>) -> Option<NotificationType> {
        match state {
            Some("APPROVED") => Some(NotificationType::LtftApprovedTpd),
            Some("SUBMITTED") => Some(NotificationType::LtftSubmittedTpd),
            _ => None,
        }
    }

    // ========================================================================
    // SUPPRESS-VS-SEND
    // ========================================================================

    /// The just-log decision: dummy roles always suppress, the
    /// whitelist overrides every other check, and otherwise any failed
    /// eligibility check suppresses real delivery.
    pub fn just_log(flags: EligibilityFlags) -> bool {
        if flags.has_dummy_role {
            return true;
        }
        if flags.whitelisted {
            return false;
        }
        !flags.valid_recipient || !flags.messaging_enabled || flags.contact_missing
    }

    /// Just-in-time applicability re-check at fire time
    pub fn is_still_applicable(
        notification_type: NotificationType,
        new_starter: bool,
        in_pilot: bool,
        in_rollout: bool,
    ) -> bool {
        match notification_type {
            // The correction path always applies
            NotificationType::PlacementRollout2024Correction => true,
            NotificationType::PlacementUpdatedWeek12 => in_pilot || in_rollout,
            notification_type if notification_type.is_email() => new_starter || in_rollout,
            _ => true,
        }
    }
}

/// Midnight of a local date as a UTC instant, resolving DST folds to
/// the earlier instant and DST gaps to the following hour
fn local_midnight_utc(tz: Tz, date: NaiveDate) -> DateTime<Utc> {
    let naive = date.and_hms_opt(0, 0, 0).expect("midnight is always valid");
    match tz.from_local_datetime(&naive).earliest() {
        Some(instant) => instant.with_timezone(&Utc),
        None => {
            let shifted = naive + Duration::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .map(|instant| instant.with_timezone(&Utc))
                .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Curriculum;

    fn rules() -> RulesService {
        RulesService::new(RulesConfig {
            timezone: chrono_tz::Europe::London,
            deferral_more_than_days: 7,
            pog_cutoff_weeks: 12,
            pog_12_month_cutoff_months: 6,
            whitelisted_trainees: vec!["whitelisted-1".to_string()],
            dummy_roles: vec!["Placeholder".to_string()],
            included_curriculum_subtypes: vec!["MEDICAL_CURRICULUM".to_string()],
            excluded_specialties: vec![
                "PUBLIC HEALTH MEDICINE".to_string(),
                "FOUNDATION".to_string(),
            ],
        })
    }

    fn curriculum(sub_type: &str, specialty: &str) -> Curriculum {
        Curriculum {
            sub_type: Some(sub_type.to_string()),
            specialty: Some(specialty.to_string()),
            block_indemnity: false,
            end_date: None,
            eligible_for_period_of_grace: false,
        }
    }

    fn programme(start_date: &str, curricula: Vec<Curriculum>) -> ProgrammeMembershipEvent {
        ProgrammeMembershipEvent {
            tis_id: "pm-1".to_string(),
            person_id: "40".to_string(),
            programme_name: Some("General Practice".to_string()),
            managing_deanery: Some("North West".to_string()),
            start_date: Some(start_date.parse().unwrap()),
            curricula: Some(curricula),
            ..Default::default()
        }
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn instant(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    // ------------------------------------------------------------------
    // Exclusion
    // ------------------------------------------------------------------

    #[test]
    fn test_excluded_without_start_date() {
        let rules = rules();
        let mut event = programme(
            "2030-01-15",
            vec![curriculum("MEDICAL_CURRICULUM", "Cardiology")],
        );
        event.start_date = None;
        assert!(rules.is_programme_membership_excluded(&event, Utc::now()));
    }

    #[test]
    fn test_excluded_when_started_in_the_past() {
        let rules = rules();
        let event = programme(
            "2026-01-01",
            vec![curriculum("MEDICAL_CURRICULUM", "Cardiology")],
        );
        assert!(rules.is_programme_membership_excluded(&event, instant("2026-06-01T12:00:00Z")));
    }

    #[test]
    fn test_start_today_is_not_excluded() {
        let rules = rules();
        let event = programme(
            "2026-06-01",
            vec![curriculum("MEDICAL_CURRICULUM", "Cardiology")],
        );
        assert!(!rules.is_programme_membership_excluded(&event, instant("2026-06-01T08:00:00Z")));
    }

    #[test]
    fn test_excluded_without_curricula() {
        let rules = rules();
        let mut event = programme("2030-01-15", vec![]);
        assert!(rules.is_programme_membership_excluded(&event, Utc::now()));

        event.curricula = None;
        assert!(rules.is_programme_membership_excluded(&event, Utc::now()));
    }

    #[test]
    fn test_excluded_without_included_subtype() {
        let rules = rules();
        let event = programme("2030-01-15", vec![curriculum("DENTAL_CURRICULUM", "Dental")]);
        assert!(rules.is_programme_membership_excluded(&event, Utc::now()));
    }

    #[test]
    fn test_subtype_match_is_case_insensitive() {
        let rules = rules();
        let event = programme(
            "2030-01-15",
            vec![curriculum("Medical_Curriculum", "Cardiology")],
        );
        assert!(!rules.is_programme_membership_excluded(&event, instant("2026-06-01T00:00:00Z")));
    }

    #[test]
    fn test_excluded_specialty_wins_over_included_subtype() {
        let rules = rules();
        let event = programme(
            "2030-01-15",
            vec![
                curriculum("MEDICAL_CURRICULUM", "Cardiology"),
                curriculum("MEDICAL_CURRICULUM", "Foundation"),
            ],
        );
        assert!(rules.is_programme_membership_excluded(&event, Utc::now()));
    }

    // ------------------------------------------------------------------
    // Programme planning (scenario S1 shape)
    // ------------------------------------------------------------------

    #[test]
    fn test_plan_programme_full_set_when_all_deadlines_future() {
        let rules = rules();
        let mut event = programme(
            "2030-01-15",
            vec![curriculum("MEDICAL_CURRICULUM", "Cardiology")],
        );
        event.curricula.as_mut().unwrap()[0].eligible_for_period_of_grace = true;
        event.curricula.as_mut().unwrap()[0].end_date = Some(date("2032-07-01"));

        let now = instant("2026-06-01T12:00:00Z");
        let planned = rules.plan_programme_notifications(&event, now);

        let types: Vec<_> = planned.iter().map(|p| p.notification_type).collect();
        assert!(types.contains(&NotificationType::ProgrammeCreated));
        assert!(types.contains(&NotificationType::ProgrammeDayOne));
        for weeks in [12u32, 8, 4, 2, 1, 0] {
            assert!(
                types.contains(&NotificationType::programme_week(weeks).unwrap()),
                "missing week {} reminder",
                weeks
            );
        }
        // CCT is well beyond 6 months: the 12-month POG notification only
        assert!(types.contains(&NotificationType::ProgrammePogMonth12));
        assert!(!types.contains(&NotificationType::ProgrammePogMonth6));
        assert_eq!(planned.len(), 9);
    }

    #[test]
    fn test_week_12_reminder_fires_84_days_before_start() {
        let rules = rules();
        let event = programme(
            "2030-01-15",
            vec![curriculum("MEDICAL_CURRICULUM", "Cardiology")],
        );
        let planned =
            rules.plan_programme_notifications(&event, instant("2026-06-01T12:00:00Z"));

        let week12 = planned
            .iter()
            .find(|p| p.notification_type == NotificationType::ProgrammeUpdatedWeek12)
            .unwrap();
        // 2030-01-15 minus 84 days is 2029-10-23, midnight UK (still BST)
        assert_eq!(week12.fire_at, instant("2029-10-22T23:00:00Z"));
    }

    #[test]
    fn test_job_ids_are_deterministic() {
        let rules = rules();
        let event = programme(
            "2030-01-15",
            vec![curriculum("MEDICAL_CURRICULUM", "Cardiology")],
        );
        let planned =
            rules.plan_programme_notifications(&event, instant("2026-06-01T12:00:00Z"));

        let created = planned
            .iter()
            .find(|p| p.notification_type == NotificationType::ProgrammeCreated)
            .unwrap();
        assert_eq!(created.job_id, "PROGRAMME_CREATED-pm-1");
    }

    #[test]
    fn test_start_today_skips_positive_week_reminders() {
        let rules = rules();
        let event = programme(
            "2026-06-01",
            vec![curriculum("MEDICAL_CURRICULUM", "Cardiology")],
        );
        // 08:00 UK on the start day: week-K deadlines with K > 0 passed,
        // and the week-0 midnight deadline has passed too
        let planned =
            rules.plan_programme_notifications(&event, instant("2026-06-01T07:00:00Z"));

        let types: Vec<_> = planned.iter().map(|p| p.notification_type).collect();
        assert!(types.contains(&NotificationType::ProgrammeCreated));
        assert!(types.contains(&NotificationType::ProgrammeDayOne));
        for weeks in [12u32, 8, 4, 2, 1, 0] {
            assert!(!types.contains(&NotificationType::programme_week(weeks).unwrap()));
        }
    }

    // ------------------------------------------------------------------
    // POG planning
    // ------------------------------------------------------------------

    fn pog_event(cct: &str) -> ProgrammeMembershipEvent {
        let mut curriculum = curriculum("MEDICAL_CURRICULUM", "Cardiology");
        curriculum.eligible_for_period_of_grace = true;
        curriculum.end_date = Some(date(cct));
        programme("2030-01-15", vec![curriculum])
    }

    #[test]
    fn test_pog_12_month_when_cct_beyond_six_months() {
        let rules = rules();
        let now = instant("2026-06-01T12:00:00Z");

        let planned = rules.plan_pog_notification(&pog_event("2032-07-01"), now).unwrap();
        assert_eq!(planned.notification_type, NotificationType::ProgrammePogMonth12);
        // 2032-07-01 minus 365 days is 2031-07-02, midnight UK (BST)
        assert_eq!(planned.fire_at, instant("2031-07-01T23:00:00Z"));
    }

    #[test]
    fn test_pog_6_month_when_cct_between_cutoffs() {
        let rules = rules();
        let now = instant("2026-06-01T12:00:00Z");

        // CCT five months out: inside the 6-month cutoff, beyond 12 weeks
        let planned = rules.plan_pog_notification(&pog_event("2026-11-01"), now).unwrap();
        assert_eq!(planned.notification_type, NotificationType::ProgrammePogMonth6);
        // Target date has passed (CCT - 182 days); fires immediately
        assert_eq!(planned.fire_at, now);
    }

    #[test]
    fn test_pog_none_when_cct_inside_cutoff_window() {
        let rules = rules();
        let now = instant("2026-06-01T12:00:00Z");

        // CCT eight weeks out: inside the 12-week window
        assert!(rules.plan_pog_notification(&pog_event("2026-07-27"), now).is_none());
    }

    #[test]
    fn test_pog_boundary_cct_exactly_six_months_included() {
        let rules = rules();
        let now = instant("2026-06-01T12:00:00Z");

        let planned = rules.plan_pog_notification(&pog_event("2026-12-01"), now).unwrap();
        assert_eq!(planned.notification_type, NotificationType::ProgrammePogMonth12);
    }

    #[test]
    fn test_pog_none_without_cct() {
        let rules = rules();
        let event = programme(
            "2030-01-15",
            vec![curriculum("MEDICAL_CURRICULUM", "Cardiology")],
        );
        assert!(rules.plan_pog_notification(&event, Utc::now()).is_none());
    }

    // ------------------------------------------------------------------
    // Deferral
    // ------------------------------------------------------------------

    #[test]
    fn test_deferral_threshold_is_strict() {
        let rules = rules();
        assert!(!rules.is_deferral(date("2030-01-15"), date("2030-01-22")));
        assert!(rules.is_deferral(date("2030-01-15"), date("2030-01-23")));
        // Moving earlier is never a deferral
        assert!(!rules.is_deferral(date("2030-01-15"), date("2029-12-01")));
    }

    #[test]
    fn test_deferred_fire_time_keeps_lead_days() {
        let rules = rules();
        // Original notification sent 10 days before the old start
        let old_sent_at = instant("2030-01-05T00:00:00Z");
        let fire_at = rules.deferred_fire_time(
            date("2030-01-15"),
            old_sent_at,
            date("2030-02-15"),
            instant("2030-01-20T00:00:00Z"),
        );

        // New start midnight minus the same 10-day lead
        assert_eq!(fire_at, instant("2030-02-05T00:00:00Z"));
    }

    #[test]
    fn test_deferred_fire_time_zero_lead_fires_on_start() {
        let rules = rules();
        let old_start = date("2030-01-15");
        let old_sent_at = rules.local_midnight_utc(old_start);

        let fire_at = rules.deferred_fire_time(
            old_start,
            old_sent_at,
            date("2030-02-15"),
            instant("2030-01-20T00:00:00Z"),
        );
        assert_eq!(fire_at, rules.local_midnight_utc(date("2030-02-15")));
    }

    #[test]
    fn test_deferred_fire_time_in_past_fires_now() {
        let rules = rules();
        // A 60-day lead against a new start only 10 days out
        let now = instant("2030-02-05T00:00:00Z");
        let fire_at = rules.deferred_fire_time(
            date("2030-01-15"),
            instant("2029-11-16T00:00:00Z"),
            date("2030-02-15"),
            now,
        );
        assert_eq!(fire_at, now);
    }

    #[test]
    fn test_pog_extension_threshold_inclusive() {
        let rules = rules();
        assert!(rules.is_pog_extension(date("2032-07-01"), date("2032-07-08")));
        assert!(!rules.is_pog_extension(date("2032-07-01"), date("2032-07-07")));
        assert!(!rules.is_pog_extension(date("2032-07-01"), date("2032-06-01")));
    }

    // ------------------------------------------------------------------
    // Placement
    // ------------------------------------------------------------------

    #[test]
    fn test_placement_reminder_84_days_before_start() {
        let rules = rules();
        let planned = rules
            .plan_placement_notification(
                "pl-1",
                Some(date("2030-01-15")),
                instant("2026-06-01T12:00:00Z"),
            )
            .unwrap();

        assert_eq!(planned.notification_type, NotificationType::PlacementUpdatedWeek12);
        assert_eq!(planned.job_id, "PLACEMENT_UPDATED_WEEK_12-pl-1");
        assert_eq!(planned.fire_at, instant("2029-10-23T00:00:00Z"));
    }

    #[test]
    fn test_placement_skipped_when_deadline_passed() {
        let rules = rules();
        assert!(rules
            .plan_placement_notification(
                "pl-1",
                Some(date("2026-07-01")),
                instant("2026-06-01T12:00:00Z"),
            )
            .is_none());
        assert!(rules
            .plan_placement_notification("pl-1", None, Utc::now())
            .is_none());
    }

    // ------------------------------------------------------------------
    // LTFT
    // ------------------------------------------------------------------

    #[test]
    fn test_ltft_state_mapping() {
        assert_eq!(
            RulesService::ltft_notification_type(Some("APPROVED")),
            NotificationType::LtftApproved
        );
        assert_eq!(
            RulesService::ltft_notification_type(Some("SUBMITTED")),
            NotificationType::LtftSubmitted
        );
        assert_eq!(
            RulesService::ltft_notification_type(Some("UNSUBMITTED")),
            NotificationType::LtftUnsubmitted
        );
        assert_eq!(
            RulesService::ltft_notification_type(Some("WITHDRAWN")),
            NotificationType::LtftWithdrawn
        );
        assert_eq!(
            RulesService::ltft_notification_type(Some("REJECTED")),
            NotificationType::LtftUpdated
        );
        assert_eq!(
            RulesService::ltft_notification_type(None),
            NotificationType::LtftUpdated
        );
    }

    #[test]
    fn test_ltft_tpd_only_for_approved_and_submitted() {
        assert_eq!(
            RulesService::ltft_tpd_notification_type(Some("APPROVED")),
            Some(NotificationType::LtftApprovedTpd)
        );
        assert_eq!(
            RulesService::ltft_tpd_notification_type(Some("SUBMITTED")),
            Some(NotificationType::LtftSubmittedTpd)
        );
        assert_eq!(RulesService::ltft_tpd_notification_type(Some("WITHDRAWN")), None);
        assert_eq!(RulesService::ltft_tpd_notification_type(None), None);
    }

    // ------------------------------------------------------------------
    // Suppress-vs-send
    // ------------------------------------------------------------------

    #[test]
    fn test_just_log_when_ineligible() {
        assert!(RulesService::just_log(EligibilityFlags {
            valid_recipient: false,
            messaging_enabled: true,
            ..Default::default()
        }));
        assert!(RulesService::just_log(EligibilityFlags {
            valid_recipient: true,
            messaging_enabled: false,
            ..Default::default()
        }));
        assert!(RulesService::just_log(EligibilityFlags {
            valid_recipient: true,
            messaging_enabled: true,
            contact_missing: true,
            ..Default::default()
        }));
    }

    #[test]
    fn test_send_when_fully_eligible() {
        assert!(!RulesService::just_log(EligibilityFlags {
            valid_recipient: true,
            messaging_enabled: true,
            ..Default::default()
        }));
    }

    #[test]
    fn test_whitelist_overrides_kill_switch() {
        // Scenario S4: whitelist wins over messagingEnabled=false
        assert!(!RulesService::just_log(EligibilityFlags {
            valid_recipient: false,
            messaging_enabled: false,
            whitelisted: true,
            ..Default::default()
        }));
    }

    #[test]
    fn test_dummy_role_wins_over_whitelist() {
        assert!(RulesService::just_log(EligibilityFlags {
            valid_recipient: true,
            messaging_enabled: true,
            has_dummy_role: true,
            whitelisted: true,
            ..Default::default()
        }));
    }

    #[test]
    fn test_applicability_recheck() {
        assert!(RulesService::is_still_applicable(
            NotificationType::ProgrammeUpdatedWeek4,
            true,
            false,
            false
        ));
        assert!(RulesService::is_still_applicable(
            NotificationType::ProgrammeUpdatedWeek4,
            false,
            false,
            true
        ));
        assert!(!RulesService::is_still_applicable(
            NotificationType::ProgrammeUpdatedWeek4,
            false,
            false,
            false
        ));
        assert!(RulesService::is_still_applicable(
            NotificationType::PlacementUpdatedWeek12,
            false,
            true,
            false
        ));
        // The correction path always applies
        assert!(RulesService::is_still_applicable(
            NotificationType::PlacementRollout2024Correction,
            false,
            false,
            false
        ));
    }

    // ------------------------------------------------------------------
    // Local time handling
    // ------------------------------------------------------------------

    #[test]
    fn test_local_midnight_respects_bst() {
        let rules = rules();
        // January: UK is on GMT
        assert_eq!(
            rules.local_midnight_utc(date("2030-01-15")),
            instant("2030-01-15T00:00:00Z")
        );
        // July: UK is on BST (UTC+1)
        assert_eq!(
            rules.local_midnight_utc(date("2030-07-15")),
            instant("2030-07-14T23:00:00Z")
        );
    }

    #[test]
    fn test_today_uses_configured_timezone() {
        let rules = rules();
        // 23:30 UTC on July 1st is 00:30 on July 2nd in London
        assert_eq!(
            rules.today(instant("2030-07-01T23:30:00Z")),
            date("2030-07-02")
        );
    }
}
