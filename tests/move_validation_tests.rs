use chrono::{DateTime, TimeZone, Utc};
use schedule_board::{
    DependencyGraph, Job, Machine, MoveConflict, MoveValidator, Schedule, parse_instant,
};

fn d(y: i32, m: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, day, 0, 0, 0).unwrap()
}

fn fixture() -> (Schedule, DependencyGraph) {
    let mut j2 = Job::new("J2", "M2", d(2024, 3, 6), d(2024, 3, 8));
    j2.prerequisites = vec!["J1".into()];
    let jobs = vec![
        Job::new("J1", "M1", d(2024, 3, 1), d(2024, 3, 5)),
        j2,
        Job::new("J3", "M1", d(2024, 3, 10), d(2024, 3, 12)),
    ];
    let machines = vec![
        Machine::new("M1", "Press", 1.0),
        Machine::new("M2", "Lathe", 1.0),
    ];
    let schedule = Schedule::with_data(jobs, machines).unwrap();
    let mut graph = DependencyGraph::new();
    graph.add_dependency("J1", "J2").unwrap();
    (schedule, graph)
}

#[test]
fn starting_before_a_prerequisite_ends_is_a_dependency_error() {
    let (schedule, graph) = fixture();
    let job = schedule.job("J2").unwrap().clone();

    let result = MoveValidator::new(&schedule, &graph).validate_move(&job, "M2", d(2024, 3, 4));

    assert!(!result.valid);
    assert_eq!(result.conflict_type, Some(MoveConflict::Dependency));
    let message = result.message.unwrap();
    assert!(message.contains("J1"), "message should name the prerequisite: {message}");
    assert!(message.contains("2024-03-05"), "message should name its end date: {message}");
    assert_eq!(schedule.job("J2").unwrap().start, d(2024, 3, 6));
}

#[test]
fn starting_exactly_when_the_prerequisite_ends_is_allowed() {
    let (schedule, graph) = fixture();
    let job = schedule.job("J2").unwrap().clone();
    let result = MoveValidator::new(&schedule, &graph).validate_move(&job, "M2", d(2024, 3, 5));
    assert!(result.valid, "{result:?}");
}

#[test]
fn unknown_machine_is_a_validation_error() {
    let (schedule, graph) = fixture();
    let job = schedule.job("J1").unwrap().clone();
    let result = MoveValidator::new(&schedule, &graph).validate_move(&job, "M9", d(2024, 3, 20));
    assert_eq!(result.conflict_type, Some(MoveConflict::Validation));
    assert_eq!(result.message.as_deref(), Some("Machine M9 does not exist"));
}

#[test]
fn overlapping_the_target_machine_is_a_capacity_error() {
    let (schedule, graph) = fixture();
    let job = schedule.job("J2").unwrap().clone();
    let result = MoveValidator::new(&schedule, &graph).validate_move(&job, "M1", d(2024, 3, 11));
    assert_eq!(result.conflict_type, Some(MoveConflict::Capacity));
    assert_eq!(
        result.message.as_deref(),
        Some("1 overlapping job(s) on machine M1")
    );
}

#[test]
fn touching_intervals_and_the_job_itself_do_not_count_as_overlap() {
    let (schedule, graph) = fixture();
    let validator = MoveValidator::new(&schedule, &graph);

    let j2 = schedule.job("J2").unwrap().clone();
    assert!(validator.validate_move(&j2, "M1", d(2024, 3, 12)).valid);

    let j3 = schedule.job("J3").unwrap().clone();
    assert!(validator.validate_move(&j3, "M1", d(2024, 3, 11)).valid);
}

#[test]
fn parses_dates_and_instants() {
    assert_eq!(parse_instant("2024-03-04").unwrap(), d(2024, 3, 4));
    assert_eq!(
        parse_instant("2024-03-04T10:00:00+02:00").unwrap(),
        Utc.with_ymd_and_hms(2024, 3, 4, 8, 0, 0).unwrap()
    );
    let err = parse_instant("next tuesday").unwrap_err();
    assert_eq!(err.conflict_type, Some(MoveConflict::Validation));
}
