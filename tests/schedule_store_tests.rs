use chrono::{DateTime, Duration, TimeZone, Utc};
use schedule_board::{ConflictKind, Job, LoadOutcome, Machine, Schedule, ScheduleError};

fn d(y: i32, m: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, day, 0, 0, 0).unwrap()
}

fn machines() -> Vec<Machine> {
    vec![
        Machine::new("M1", "Press", 1.0),
        Machine::new("M2", "Lathe", 2.0),
    ]
}

fn jobs() -> Vec<Job> {
    vec![
        Job::new("J1", "M1", d(2024, 3, 1), d(2024, 3, 3)),
        Job::new("J2", "M1", d(2024, 3, 2), d(2024, 3, 4)),
        Job::new("J3", "M2", d(2024, 3, 1), d(2024, 3, 2)),
    ]
}

fn applied(outcome: LoadOutcome) -> schedule_board::LoadSummary {
    match outcome {
        LoadOutcome::Applied(summary) => summary,
        other => panic!("expected an applied load, got {other:?}"),
    }
}

#[test]
fn load_classifies_every_job() {
    let mut schedule = Schedule::new();
    let summary = applied(schedule.load(jobs(), machines()).unwrap());

    assert_eq!(summary.job_count, 3);
    assert_eq!(summary.machine_count, 2);
    assert_eq!(summary.conflicts.count(ConflictKind::Capacity), 2);
    assert_eq!(schedule.conflict_of("J1"), Some(ConflictKind::Capacity));
    assert_eq!(schedule.conflict_of("J3"), Some(ConflictKind::None));
    assert!(schedule.job("J2").unwrap().conflict_detail.is_some());
    assert_eq!(schedule.conflict_of("missing"), None);
}

#[test]
fn invalid_loads_are_rejected_without_touching_state() {
    let mut schedule = Schedule::with_data(jobs(), machines()).unwrap();

    let mut duplicated = jobs();
    duplicated.push(Job::new("J1", "M2", d(2024, 4, 1), d(2024, 4, 2)));
    assert!(matches!(
        schedule.load(duplicated, machines()),
        Err(ScheduleError::InvalidData(_))
    ));

    let backwards = vec![Job::new("J9", "M1", d(2024, 3, 5), d(2024, 3, 1))];
    assert!(schedule.load(backwards, machines()).is_err());

    assert_eq!(schedule.job_count(), 3);
    assert_eq!(schedule.job("J1").unwrap().machine_id, "M1");
}

#[test]
fn loads_are_deferred_while_a_move_is_pending() {
    let mut schedule = Schedule::with_data(jobs(), machines()).unwrap();
    schedule.begin_pending("J1");

    let outcome = schedule.load(vec![], machines()).unwrap();
    assert_eq!(
        outcome,
        LoadOutcome::Deferred {
            pending_job: "J1".into()
        }
    );
    assert_eq!(schedule.job_count(), 3);

    schedule.end_pending();
    applied(schedule.load(vec![], machines()).unwrap());
    assert_eq!(schedule.job_count(), 0);
}

#[test]
fn confirmed_moves_override_stale_fetches_until_echoed() {
    let mut schedule = Schedule::with_data(jobs(), machines()).unwrap();
    schedule
        .commit("J1", "M2", d(2024, 3, 5), d(2024, 3, 7))
        .unwrap();

    for round in 1..=4u32 {
        let summary = applied(schedule.load(jobs(), machines()).unwrap());
        assert_eq!(summary.reconcile.overridden, vec!["J1".to_string()]);
        let job = schedule.job("J1").unwrap();
        assert_eq!(job.machine_id, "M2");
        assert_eq!(job.start, d(2024, 3, 5));
        assert_eq!(
            schedule.confirmed_update("J1").unwrap().mismatched_fetches,
            round
        );
    }

    let mut echoed = jobs();
    echoed[0] = Job::new(
        "J1",
        "M2",
        d(2024, 3, 5) + Duration::hours(6),
        d(2024, 3, 7) + Duration::hours(6),
    );
    let summary = applied(schedule.load(echoed, machines()).unwrap());
    assert_eq!(summary.reconcile.synced, vec!["J1".to_string()]);
    assert!(schedule.confirmed_update("J1").is_none());
    assert_eq!(
        schedule.job("J1").unwrap().start,
        d(2024, 3, 5) + Duration::hours(6)
    );
}

#[test]
fn reconcile_is_idempotent() {
    let mut schedule = Schedule::with_data(jobs(), machines()).unwrap();
    schedule
        .commit("J2", "M2", d(2024, 3, 10), d(2024, 3, 12))
        .unwrap();

    let (once, first) = schedule.reconcile(jobs());
    let (twice, second) = schedule.reconcile(once.clone());

    assert_eq!(once, twice);
    assert_eq!(first.overridden, vec!["J2".to_string()]);
    assert_eq!(second.synced, vec!["J2".to_string()]);
    let (thrice, third) = schedule.reconcile(twice.clone());
    assert_eq!(thrice, twice);
    assert!(third.is_empty());
}

#[test]
fn rollback_restores_the_snapshot_exactly() {
    let mut schedule = Schedule::with_data(jobs(), machines()).unwrap();
    let snapshot = schedule.job("J3").unwrap().clone();

    schedule
        .commit("J3", "M1", d(2024, 3, 20), d(2024, 3, 21))
        .unwrap();
    assert!(schedule.confirmed_update("J3").is_some());

    schedule.rollback("J3", &snapshot);
    assert_eq!(schedule.job("J3"), Some(&snapshot));
    assert!(schedule.confirmed_update("J3").is_none());
}

#[test]
fn unknown_jobs_cannot_be_moved() {
    let mut schedule = Schedule::with_data(jobs(), machines()).unwrap();
    assert_eq!(
        schedule.apply_optimistic("J404", "M1", d(2024, 3, 1), d(2024, 3, 2)),
        Err(ScheduleError::UnknownJob("J404".into()))
    );
    assert!(schedule.commit("J404", "M1", d(2024, 3, 1), d(2024, 3, 2)).is_err());
    assert_eq!(schedule.confirmed_update_count(), 0);
}

#[test]
fn confirmed_updates_are_bounded_oldest_first() {
    let mut schedule = Schedule::with_limits(2, 3);
    schedule.load(jobs(), machines()).unwrap();

    schedule.commit("J1", "M2", d(2024, 5, 1), d(2024, 5, 3)).unwrap();
    schedule.commit("J2", "M2", d(2024, 5, 4), d(2024, 5, 6)).unwrap();
    schedule.commit("J3", "M1", d(2024, 5, 7), d(2024, 5, 8)).unwrap();

    assert_eq!(schedule.confirmed_update_count(), 2);
    assert!(schedule.confirmed_update("J1").is_none());
    assert!(schedule.confirmed_update("J3").is_some());
}

#[test]
fn machine_load_accounts_for_capacity() {
    let schedule = Schedule::with_data(jobs(), machines()).unwrap();

    // J3 books one of the two days on M2, which has capacity 2.
    let load = schedule
        .machine_load("M2", d(2024, 3, 1), d(2024, 3, 3))
        .unwrap();
    assert!((load - 25.0).abs() < 1e-9);

    assert_eq!(schedule.machine_load("M9", d(2024, 3, 1), d(2024, 3, 3)), None);
    assert_eq!(schedule.machine_load("M1", d(2024, 3, 3), d(2024, 3, 1)), None);
    assert_eq!(schedule.jobs_on_machine("M1").len(), 2);
}

#[test]
fn reapplied_snapshots_do_not_age_confirmed_moves() {
    let mut schedule = Schedule::with_data(jobs(), machines()).unwrap();
    schedule
        .commit("J1", "M2", d(2024, 3, 5), d(2024, 3, 7))
        .unwrap();

    schedule.load(jobs(), machines()).unwrap();
    for _ in 0..5 {
        let summary = applied(schedule.reapply(jobs(), machines()).unwrap());
        assert_eq!(summary.reconcile.overridden, vec!["J1".to_string()]);
    }

    assert_eq!(schedule.job("J1").unwrap().machine_id, "M2");
    assert_eq!(
        schedule.confirmed_update("J1").unwrap().mismatched_fetches,
        1
    );
}

#[test]
fn machine_load_needs_a_window_of_at_least_a_second() {
    let schedule = Schedule::with_data(jobs(), machines()).unwrap();
    let start = d(2024, 3, 1);

    let load = schedule
        .machine_load("M2", start, start + Duration::seconds(30))
        .unwrap();
    assert!((load - 50.0).abs() < 1e-9);

    assert_eq!(
        schedule.machine_load("M2", start, start + Duration::milliseconds(500)),
        None
    );
}
