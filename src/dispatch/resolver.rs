//! Technician availability resolution.
//!
//! Pure functions over in-memory data: the service loads the day's leaves
//! and assignments, the resolver partitions the candidates. Every candidate
//! that survives the region/skill/status narrowing lands in exactly one of
//! the assignable or excluded lists.

use chrono::NaiveTime;

use crate::dispatch::models::{
    AvailabilityQuery, AvailabilityReport, ExcludedTechnician, ExclusionReason, SkillMatch,
    Technician, TechnicianLeave, TechnicianStatus, WorkAssignment,
};

/// Half-open interval overlap. Touching endpoints do not conflict, so a
/// 09:00~12:00 job composes with a 12:00~14:00 job.
pub fn overlap(a_start: NaiveTime, a_end: NaiveTime, b_start: NaiveTime, b_end: NaiveTime) -> bool {
    a_start < b_end && b_start < a_end
}

/// Partition technicians into assignable and excluded-with-reason for the
/// requested window.
///
/// Leave records block the whole day even when marked partial-day; the
/// schedule board treats a leave as "not reachable today" rather than a
/// bookable gap.
pub fn resolve(
    technicians: &[Technician],
    leaves: &[TechnicianLeave],
    assignments: &[WorkAssignment],
    query: &AvailabilityQuery,
) -> AvailabilityReport {
    let mut assignable = Vec::new();
    let mut excluded = Vec::new();

    for tech in technicians {
        if tech.status != TechnicianStatus::Active {
            continue;
        }
        if let Some(region) = query.region {
            if !tech.region.matches(region) {
                continue;
            }
        }
        if !matches_skills(tech, query) {
            continue;
        }

        if let Some(reason) = exclusion_for(tech, leaves, assignments, query) {
            excluded.push(ExcludedTechnician {
                technician: tech.clone(),
                reason_text: reason.to_string(),
                reason,
            });
        } else {
            assignable.push(tech.clone());
        }
    }

    AvailabilityReport {
        assignable,
        excluded,
    }
}

fn matches_skills(tech: &Technician, query: &AvailabilityQuery) -> bool {
    if query.skills.is_empty() {
        return true;
    }
    match query.skill_match {
        SkillMatch::All => query.skills.iter().all(|s| tech.has_skill(s)),
        SkillMatch::Any => query.skills.iter().any(|s| tech.has_skill(s)),
    }
}

fn exclusion_for(
    tech: &Technician,
    leaves: &[TechnicianLeave],
    assignments: &[WorkAssignment],
    query: &AvailabilityQuery,
) -> Option<ExclusionReason> {
    let on_leave = leaves
        .iter()
        .any(|l| l.technician_email == tech.email && l.leave_date == query.date);
    if on_leave {
        return Some(ExclusionReason::OnLeave);
    }

    assignments
        .iter()
        .find(|a| {
            a.technician_email == tech.email
                && a.work_date == query.date
                && overlap(a.start_time, a.end_time, query.start_time, query.end_time)
        })
        .map(|a| ExclusionReason::Overlap {
            start: a.start_time,
            end: a.end_time,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use proptest::prelude::*;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn tech(email: &str, region: super::super::models::Region) -> Technician {
        Technician {
            id: Uuid::new_v4(),
            email: email.to_string(),
            display_name: format!("師傅 {}", email),
            region,
            skills: HashMap::from([("aircon".to_string(), true)]),
            status: TechnicianStatus::Active,
            scheme: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn leave(email: &str, full_day: bool) -> TechnicianLeave {
        TechnicianLeave {
            id: 1,
            technician_email: email.to_string(),
            leave_date: date(),
            full_day,
            start_time: (!full_day).then(|| t(14, 0)),
            end_time: (!full_day).then(|| t(16, 0)),
            reason: "家庭因素".to_string(),
            created_at: Utc::now(),
        }
    }

    fn work(email: &str, start: NaiveTime, end: NaiveTime) -> WorkAssignment {
        WorkAssignment {
            id: 1,
            technician_email: email.to_string(),
            order_id: Uuid::new_v4(),
            work_date: date(),
            start_time: start,
            end_time: end,
            created_at: Utc::now(),
        }
    }

    fn query(start: NaiveTime, end: NaiveTime) -> AvailabilityQuery {
        AvailabilityQuery {
            date: date(),
            start_time: start,
            end_time: end,
            region: None,
            skills: vec![],
            skill_match: SkillMatch::All,
        }
    }

    use super::super::models::Region;

    #[test]
    fn test_overlap_half_open() {
        assert!(overlap(t(9, 0), t(12, 0), t(11, 0), t(13, 0)));
        assert!(!overlap(t(9, 0), t(12, 0), t(12, 0), t(14, 0)));
        assert!(overlap(t(9, 0), t(17, 0), t(10, 0), t(11, 0)));
        assert!(!overlap(t(9, 0), t(10, 0), t(10, 0), t(10, 0)));
    }

    #[test]
    fn test_full_day_leave_blocks_any_window() {
        let techs = vec![tech("a@x.tw", Region::North)];
        let leaves = vec![leave("a@x.tw", true)];
        let report = resolve(&techs, &leaves, &[], &query(t(9, 0), t(12, 0)));
        assert!(report.assignable.is_empty());
        assert_eq!(report.excluded.len(), 1);
        assert_eq!(report.excluded[0].reason, ExclusionReason::OnLeave);
        assert_eq!(report.excluded[0].reason_text, "請假");
    }

    #[test]
    fn test_partial_day_leave_blocks_whole_day() {
        // A 14:00~16:00 leave still blocks a morning window.
        let techs = vec![tech("a@x.tw", Region::North)];
        let leaves = vec![leave("a@x.tw", false)];
        let report = resolve(&techs, &leaves, &[], &query(t(9, 0), t(12, 0)));
        assert!(report.assignable.is_empty());
        assert_eq!(report.excluded[0].reason, ExclusionReason::OnLeave);
    }

    #[test]
    fn test_overlapping_assignment_excludes_with_interval() {
        let techs = vec![tech("a@x.tw", Region::North)];
        let work = vec![work("a@x.tw", t(11, 0), t(13, 0))];
        let report = resolve(&techs, &[], &work, &query(t(9, 0), t(12, 0)));
        assert!(report.assignable.is_empty());
        assert_eq!(report.excluded[0].reason_text, "重疊 11:00~13:00");
    }

    #[test]
    fn test_touching_assignment_does_not_exclude() {
        let techs = vec![tech("a@x.tw", Region::North)];
        let work = vec![work("a@x.tw", t(12, 0), t(14, 0))];
        let report = resolve(&techs, &[], &work, &query(t(9, 0), t(12, 0)));
        assert_eq!(report.assignable.len(), 1);
        assert!(report.excluded.is_empty());
    }

    #[test]
    fn test_leave_takes_precedence_over_overlap() {
        let techs = vec![tech("a@x.tw", Region::North)];
        let leaves = vec![leave("a@x.tw", true)];
        let work = vec![work("a@x.tw", t(9, 0), t(12, 0))];
        let report = resolve(&techs, &leaves, &work, &query(t(9, 0), t(12, 0)));
        assert_eq!(report.excluded[0].reason, ExclusionReason::OnLeave);
    }

    #[test]
    fn test_region_filter_narrows_candidates() {
        let techs = vec![
            tech("north@x.tw", Region::North),
            tech("south@x.tw", Region::South),
            tech("roam@x.tw", Region::All),
        ];
        let mut q = query(t(9, 0), t(12, 0));
        q.region = Some(Region::North);
        let report = resolve(&techs, &[], &[], &q);
        let emails: Vec<_> = report.assignable.iter().map(|t| t.email.as_str()).collect();
        assert_eq!(emails, vec!["north@x.tw", "roam@x.tw"]);
    }

    #[test]
    fn test_skill_filter_modes() {
        let mut plumber = tech("p@x.tw", Region::All);
        plumber.skills = HashMap::from([("plumbing".to_string(), true)]);
        let both = {
            let mut t = tech("b@x.tw", Region::All);
            t.skills = HashMap::from([
                ("plumbing".to_string(), true),
                ("aircon".to_string(), true),
            ]);
            t
        };
        let techs = vec![plumber, both];

        let mut q = query(t(9, 0), t(12, 0));
        q.skills = vec!["plumbing".to_string(), "aircon".to_string()];
        q.skill_match = SkillMatch::All;
        assert_eq!(resolve(&techs, &[], &[], &q).assignable.len(), 1);

        q.skill_match = SkillMatch::Any;
        assert_eq!(resolve(&techs, &[], &[], &q).assignable.len(), 2);
    }

    #[test]
    fn test_suspended_technicians_are_not_candidates() {
        let mut suspended = tech("s@x.tw", Region::All);
        suspended.status = TechnicianStatus::Suspended;
        let report = resolve(&[suspended], &[], &[], &query(t(9, 0), t(12, 0)));
        assert!(report.assignable.is_empty());
        assert!(report.excluded.is_empty());
    }

    proptest! {
        /// Every surviving candidate lands in exactly one output list.
        #[test]
        fn prop_partition_is_total_and_disjoint(
            n_techs in 1usize..8,
            leave_mask in 0u8..=255,
            work_starts in prop::collection::vec(0u32..22, 0..8),
        ) {
            let techs: Vec<Technician> = (0..n_techs)
                .map(|i| tech(&format!("t{}@x.tw", i), Region::All))
                .collect();
            let leaves: Vec<TechnicianLeave> = techs
                .iter()
                .enumerate()
                .filter(|(i, _)| leave_mask & (1 << (i % 8)) != 0)
                .map(|(_, t)| leave(&t.email, true))
                .collect();
            let assignments: Vec<WorkAssignment> = work_starts
                .iter()
                .enumerate()
                .map(|(i, &h)| {
                    let email = &techs[i % techs.len()].email;
                    work(email, t(h, 0), t(h + 2, 0))
                })
                .collect();

            let report = resolve(&techs, &leaves, &assignments, &query(t(9, 0), t(12, 0)));

            let mut seen: Vec<&str> = report
                .assignable
                .iter()
                .map(|t| t.email.as_str())
                .chain(report.excluded.iter().map(|e| e.technician.email.as_str()))
                .collect();
            seen.sort_unstable();
            let mut expected: Vec<&str> = techs.iter().map(|t| t.email.as_str()).collect();
            expected.sort_unstable();
            prop_assert_eq!(seen, expected);
        }

        /// Overlap is symmetric and irreflexive on empty intervals.
        #[test]
        fn prop_overlap_symmetry(a in 0u32..23, b in 1u32..24, c in 0u32..23, d in 1u32..24) {
            prop_assume!(a < b && c < d);
            let (a, b, c, d) = (t(a, 0), t(b, 0), t(c, 0), t(d, 0));
            prop_assert_eq!(overlap(a, b, c, d), overlap(c, d, a, b));
        }
    }
}
