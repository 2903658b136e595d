use chrono::{DateTime, TimeZone, Utc};
use schedule_board::{
    BackendError, Config, ConflictKind, ConflictReport, Dashboard, DashboardError, DependencyEdge,
    InMemoryBackend, Job, LoadOutcome, Machine, MoveConflict, MoveEffect, MoveTarget,
    ScheduleEvent, ScheduleSnapshot,
};
use std::sync::Arc;
use std::time::Duration;

fn d(y: i32, m: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, day, 0, 0, 0).unwrap()
}

fn snapshot() -> ScheduleSnapshot {
    let mut j2 = Job::new("J2", "M1", d(2024, 3, 6), d(2024, 3, 7));
    j2.prerequisites = vec!["J1".into()];
    ScheduleSnapshot {
        machines: vec![
            Machine::new("M1", "Press", 1.0),
            Machine::new("M2", "Lathe", 1.0),
        ],
        jobs: vec![Job::new("J1", "M1", d(2024, 3, 1), d(2024, 3, 5)), j2],
    }
}

async fn board_with(config: Config) -> (Arc<InMemoryBackend>, Dashboard) {
    let backend = Arc::new(InMemoryBackend::new(snapshot(), Vec::new()));
    let dashboard = Dashboard::new(backend.clone(), &config);
    dashboard.initialize().await.unwrap();
    (backend, dashboard)
}

async fn board() -> (Arc<InMemoryBackend>, Dashboard) {
    board_with(Config::default()).await
}

#[tokio::test]
async fn confirmed_move_lands_on_the_new_machine() {
    let (backend, dashboard) = board().await;
    let mut events = dashboard.subscribe();

    let effect = dashboard
        .propose_move("J1", MoveTarget::new("M2", d(2024, 3, 8)))
        .unwrap();
    assert!(matches!(effect, MoveEffect::ConfirmationRequired { .. }));

    match dashboard.confirm().await.unwrap() {
        MoveEffect::Committed { notification } => {
            assert_eq!(notification.machine_id, "M2");
            assert_eq!(notification.end, d(2024, 3, 12));
        }
        other => panic!("expected a committed move, got {other:?}"),
    }

    assert_eq!(backend.commits().len(), 1);
    let job = dashboard.job("J1").unwrap();
    assert_eq!(job.machine_id, "M2");
    assert_eq!(job.start, d(2024, 3, 8));
    assert_eq!(dashboard.conflict_of("J1"), Some(ConflictKind::None));
    assert_eq!(
        dashboard.with_state(|state| state.schedule.confirmed_update_count()),
        0
    );
    assert!(matches!(
        events.try_recv().unwrap(),
        ScheduleEvent::JobUpdated { notification } if notification.job_id == "J1"
    ));
}

#[tokio::test]
async fn dependency_violation_is_rejected_before_reaching_the_backend() {
    let (backend, dashboard) = board().await;

    match dashboard
        .propose_move("J2", MoveTarget::new("M1", d(2024, 3, 4)))
        .unwrap()
    {
        MoveEffect::Rejected { result } => {
            assert_eq!(result.conflict_type, Some(MoveConflict::Dependency));
            assert!(result.message.unwrap().contains("J1"));
        }
        other => panic!("expected a rejection, got {other:?}"),
    }

    assert!(backend.commits().is_empty());
    assert_eq!(dashboard.job("J2").unwrap().start, d(2024, 3, 6));
    assert_eq!(dashboard.move_state().name(), "idle");
}

#[tokio::test]
async fn failed_commit_rolls_back_and_reports_the_backend_message() {
    let (backend, dashboard) = board().await;
    let mut events = dashboard.subscribe();
    backend.fail_next_commit(BackendError::client(
        400,
        r#"Server error: {"Message": "Target date is in the past"}"#,
    ));

    dashboard
        .propose_move("J1", MoveTarget::new("M2", d(2024, 3, 8)))
        .unwrap();
    let effect = dashboard.confirm().await.unwrap();

    assert_eq!(
        effect,
        MoveEffect::Failed {
            job_id: "J1".into(),
            message: "Target date is in the past".into(),
        }
    );
    assert_eq!(dashboard.job("J1").unwrap().machine_id, "M1");
    assert!(events.try_recv().is_err());
    assert_eq!(dashboard.move_state().name(), "idle");
}

#[tokio::test]
async fn lagging_backend_keeps_the_confirmed_placement() {
    let (backend, dashboard) = board().await;
    backend.set_echo_commits(false);

    dashboard
        .propose_move("J1", MoveTarget::new("M2", d(2024, 3, 8)))
        .unwrap();
    dashboard.confirm().await.unwrap();
    dashboard.refresh(true).await.unwrap();

    assert_eq!(backend.snapshot().jobs[0].machine_id, "M1");
    assert_eq!(dashboard.job("J1").unwrap().machine_id, "M2");
    assert_eq!(
        dashboard.with_state(|state| state.schedule.confirmed_update_count()),
        1
    );
}

#[tokio::test]
async fn cached_refreshes_do_not_count_as_stale_fetches() {
    let (backend, dashboard) = board().await;
    backend.set_echo_commits(false);
    let mismatches = |dashboard: &Dashboard| {
        dashboard.with_state(|state| {
            state
                .schedule
                .confirmed_update("J1")
                .map(|update| update.mismatched_fetches)
        })
    };

    dashboard
        .propose_move("J1", MoveTarget::new("M2", d(2024, 3, 8)))
        .unwrap();
    dashboard.confirm().await.unwrap();
    assert_eq!(mismatches(&dashboard), Some(1));
    let fetches = backend.fetch_count();

    for _ in 0..3 {
        dashboard.refresh(false).await.unwrap();
    }
    assert_eq!(backend.fetch_count(), fetches);
    assert_eq!(mismatches(&dashboard), Some(1));
    assert_eq!(dashboard.job("J1").unwrap().machine_id, "M2");

    dashboard.refresh(true).await.unwrap();
    assert_eq!(mismatches(&dashboard), Some(2));
}

#[tokio::test]
async fn refresh_is_deferred_while_a_move_awaits_confirmation() {
    let (_backend, dashboard) = board().await;
    dashboard
        .propose_move("J1", MoveTarget::new("M2", d(2024, 3, 8)))
        .unwrap();

    assert_eq!(
        dashboard.refresh(true).await.unwrap(),
        LoadOutcome::Deferred {
            pending_job: "J1".into()
        }
    );

    dashboard.cancel().unwrap();
    assert_eq!(dashboard.job("J1").unwrap().machine_id, "M1");
    assert!(matches!(
        dashboard.refresh(true).await.unwrap(),
        LoadOutcome::Applied(_)
    ));
}

#[tokio::test(start_paused = true)]
async fn concurrent_fetches_share_one_backend_call() {
    let backend = Arc::new(InMemoryBackend::new(snapshot(), Vec::new()));
    backend.set_fetch_delay(Some(Duration::from_millis(50)));
    let dashboard = Dashboard::new(backend.clone(), &Config::default());

    let (first, second) = tokio::join!(dashboard.refresh(false), dashboard.refresh(false));
    first.unwrap();
    second.unwrap();
    assert_eq!(backend.fetch_count(), 1);

    dashboard.refresh(false).await.unwrap();
    assert_eq!(backend.fetch_count(), 1);

    dashboard.refresh(true).await.unwrap();
    assert_eq!(backend.fetch_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn slow_fetches_surface_as_timeouts() {
    let config = Config {
        fetch_timeout: Duration::from_millis(100),
        cache_window: Duration::ZERO,
        ..Config::default()
    };
    let (backend, dashboard) = board_with(config).await;
    backend.set_fetch_delay(Some(Duration::from_secs(5)));

    let err = dashboard.refresh(true).await.unwrap_err();
    assert_eq!(
        err,
        DashboardError::Backend(BackendError::Timeout(Duration::from_millis(100)))
    );
    assert_eq!(err.to_string(), "request timed out after 100ms");

    // The background conflict refresh swallows the same failure.
    assert_eq!(
        dashboard.refresh_conflicts_in_background().await,
        ConflictReport::default()
    );
}

#[tokio::test]
async fn background_conflict_refresh_reports_current_conflicts() {
    let mut overlapping = snapshot();
    overlapping
        .jobs
        .push(Job::new("J3", "M1", d(2024, 3, 4), d(2024, 3, 6)));
    let backend = Arc::new(InMemoryBackend::new(overlapping, Vec::new()));
    let dashboard = Dashboard::new(backend, &Config::default());

    let report = dashboard.refresh_conflicts_in_background().await;
    assert_eq!(report.kind_of("J1"), ConflictKind::Capacity);
    assert_eq!(report.kind_of("J3"), ConflictKind::Capacity);
    assert_eq!(report.kind_of("J2"), ConflictKind::None);
}

#[tokio::test]
async fn dependencies_merge_backend_edges_with_job_prerequisites() {
    let backend = Arc::new(InMemoryBackend::new(
        snapshot(),
        vec![
            DependencyEdge::new("J2", "J3"),
            DependencyEdge::new("J3", "J1"),
        ],
    ));
    let dashboard = Dashboard::new(backend, &Config::default());
    dashboard.initialize().await.unwrap();

    // J3 -> J1 is accepted first, so the J1 -> J2 prerequisite would close a cycle.
    assert_eq!(
        dashboard.dependencies(),
        vec![
            DependencyEdge::new("J2", "J3"),
            DependencyEdge::new("J3", "J1"),
        ]
    );

    let mut events = dashboard.subscribe();
    assert!(dashboard.add_dependency("J1", "J2").is_err());
    let edge = dashboard.add_dependency("J1", "J4").unwrap();
    assert_eq!(
        events.try_recv().unwrap(),
        ScheduleEvent::DependencyCreated { edge }
    );
}
