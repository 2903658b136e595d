use schedule_board::backend::{
    FileBackend, InMemoryBackend, ScheduleBackend, ScheduleSnapshot, load_jobs_from_csv,
    save_jobs_to_csv,
};
use schedule_board::{
    Config, Dashboard, DashboardError, Job, LoadOutcome, MoveEffect, MoveState, MoveTarget,
    build_backend, parse_instant, telemetry,
};
use std::io::{self, BufRead, Write};
use std::sync::Arc;

fn render_text_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (ci, cell) in row.iter().enumerate() {
            if cell.len() > widths[ci] {
                widths[ci] = cell.len();
            }
        }
    }

    let mut sep = String::from("+");
    for w in &widths {
        sep.push_str(&"-".repeat(*w + 2));
        sep.push('+');
    }

    let mut out = String::new();
    out.push_str(&sep);
    out.push('\n');
    out.push_str(&render_row(&widths, headers.iter().copied()));
    out.push('\n');
    out.push_str(&sep);
    out.push('\n');
    for row in rows {
        out.push_str(&render_row(&widths, row.iter().map(String::as_str)));
        out.push('\n');
    }
    out.push_str(&sep);
    out
}

fn render_row<'a>(widths: &[usize], cells: impl Iterator<Item = &'a str>) -> String {
    let mut line = String::from("|");
    for (ci, cell) in cells.enumerate() {
        line.push(' ');
        line.push_str(cell);
        line.push_str(&" ".repeat(widths[ci].saturating_sub(cell.len())));
        line.push_str(" |");
    }
    line
}

fn render_jobs(jobs: &[Job]) -> String {
    let rows: Vec<Vec<String>> = jobs
        .iter()
        .map(|job| {
            vec![
                job.id.clone(),
                job.name.clone(),
                job.machine_id.clone(),
                job.start.format("%Y-%m-%d %H:%M").to_string(),
                job.end.format("%Y-%m-%d %H:%M").to_string(),
                job.conflict.as_str().to_string(),
                job.prerequisites.join(","),
            ]
        })
        .collect();
    render_text_table(
        &["id", "name", "machine", "start", "end", "conflict", "prerequisites"],
        &rows,
    )
}

fn print_help() {
    println!(
        "Commands:\n  help                               Show this help\n  show                               Show jobs with their conflict flags\n  machines                           List machines\n  conflicts                          Re-run conflict detection and list flagged jobs\n  deps                               List dependency edges\n  dep add <prereq> <dependent>       Add a dependency edge\n  check                              Report dependency ordering violations\n  drag <job>                         Pick up a job\n  drop <machine> <date>              Drop the dragged job (YYYY-MM-DD or RFC 3339)\n  move <job> <machine> <date>        Drag and drop in one step\n  confirm                            Commit the pending move\n  cancel                             Abandon the current move\n  state                              Show the move state\n  refresh [force]                    Fetch the schedule from the backend\n  load <json_path>                   Switch to a schedule file backend\n  export csv <path>                  Write jobs to CSV\n  import csv <path>                  Replace jobs with a CSV file\n  quit|exit                          Exit"
    );
}

fn describe_effect(effect: &MoveEffect) -> String {
    match effect {
        MoveEffect::DragStarted { job_id } => format!("Dragging job {job_id}."),
        MoveEffect::Rejected { result } => format!(
            "Move rejected ({}): {}",
            result.conflict_type.map(|c| c.as_str()).unwrap_or("validation"),
            result.message.as_deref().unwrap_or_default()
        ),
        MoveEffect::ConfirmationRequired { prompt } => {
            format!("{} (confirm/cancel)", prompt.message())
        }
        MoveEffect::CommitRequested { request } => {
            format!("Commit requested for job {}.", request.job_id)
        }
        MoveEffect::Committed { notification } => notification.message(),
        MoveEffect::Cancelled { job_id } => format!("Move of job {job_id} cancelled."),
        MoveEffect::Failed { job_id, message } => format!("Move of job {job_id} failed: {message}"),
    }
}

fn describe_state(state: &MoveState) -> String {
    match state {
        MoveState::Idle => "idle".to_string(),
        MoveState::Dragging { snapshot } => format!("dragging {}", snapshot.id),
        MoveState::PendingConfirmation { pending } => format!(
            "pending_confirmation {} -> {} @ {}",
            pending.job_id(),
            pending.target_machine_id,
            pending.target_start.format("%Y-%m-%d %H:%M")
        ),
        MoveState::Committing { pending } => format!("committing {}", pending.job_id()),
    }
}

fn print_effect(result: Result<MoveEffect, DashboardError>) {
    match result {
        Ok(effect) => println!("{}", describe_effect(&effect)),
        Err(e) => println!("Error: {}", e),
    }
}

fn print_outcome(dashboard: &Dashboard, result: Result<LoadOutcome, DashboardError>) {
    match result {
        Ok(LoadOutcome::Applied(summary)) => {
            println!(
                "Loaded ({})\n{}",
                summary.to_cli_summary(),
                render_jobs(&dashboard.jobs())
            );
        }
        Ok(LoadOutcome::Deferred { pending_job }) => {
            println!("Load deferred: move of job {pending_job} is awaiting confirmation.")
        }
        Err(e) => println!("Refresh error: {}", e),
    }
}

async fn switch_backend(
    config: &Config,
    backend: Arc<dyn ScheduleBackend>,
) -> (Dashboard, Result<LoadOutcome, DashboardError>) {
    let dashboard = Dashboard::new(backend, config);
    let outcome = dashboard.initialize().await;
    (dashboard, outcome)
}

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(2);
        }
    };
    telemetry::init_tracing(&config.log_filter, config.log_json);

    let backend = match build_backend(&config) {
        Ok(backend) => backend,
        Err(e) => {
            eprintln!("Backend error: {}", e);
            std::process::exit(2);
        }
    };
    let (mut dashboard, outcome) = switch_backend(&config, backend).await;

    println!("Schedule Board (CLI) - type 'help' for commands\n");
    print_outcome(&dashboard, outcome);

    let stdin = io::stdin();
    let mut lines = stdin.lock();
    let mut line = String::new();
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        line.clear();
        match lines.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let mut parts = input.split_whitespace();
        let cmd = parts.next().unwrap_or("");

        match cmd {
            "help" => print_help(),
            "quit" | "exit" => break,
            "show" => println!("{}", render_jobs(&dashboard.jobs())),
            "machines" => {
                let jobs = dashboard.jobs();
                let rows: Vec<Vec<String>> = dashboard
                    .machines()
                    .iter()
                    .map(|m| {
                        let count = jobs.iter().filter(|j| j.machine_id == m.id).count();
                        vec![
                            m.id.clone(),
                            m.name.clone(),
                            format!("{:.1}", m.capacity),
                            count.to_string(),
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    render_text_table(&["id", "name", "capacity", "jobs"], &rows)
                );
            }
            "conflicts" => {
                let report = dashboard.refresh_conflicts_in_background().await;
                println!("Conflicts ({})", report.to_cli_summary());
                for assessment in report.conflicted() {
                    let reason = assessment
                        .detail
                        .as_ref()
                        .map(|d| d.reason.as_str())
                        .unwrap_or_default();
                    println!("  {} [{}] {}", assessment.job_id, assessment.kind.as_str(), reason);
                }
            }
            "deps" => {
                let edges = dashboard.dependencies();
                if edges.is_empty() {
                    println!("No dependencies.");
                }
                for edge in edges {
                    println!("  {} -> {}", edge.prerequisite, edge.dependent);
                }
            }
            "dep" => match (parts.next(), parts.next(), parts.next()) {
                (Some("add"), Some(prerequisite), Some(dependent)) => {
                    match dashboard.add_dependency(prerequisite, dependent) {
                        Ok(edge) => {
                            println!("Dependency added: {} -> {}", edge.prerequisite, edge.dependent)
                        }
                        Err(e) => println!("Error: {}", e),
                    }
                }
                _ => println!("Usage: dep add <prereq> <dependent>"),
            },
            "check" => {
                let violations = dashboard.temporal_violations();
                if violations.is_empty() {
                    println!("No dependency violations.");
                }
                for violation in violations {
                    println!("  {}", violation);
                }
            }
            "drag" => match parts.next() {
                Some(job_id) => print_effect(dashboard.begin_drag(job_id)),
                None => println!("Usage: drag <job>"),
            },
            "drop" => match (parts.next(), parts.next()) {
                (Some(machine_id), Some(date_s)) => match parse_instant(date_s) {
                    Ok(start) => print_effect(dashboard.drop_on(MoveTarget::new(machine_id, start))),
                    Err(result) => println!("Error: {}", result.message.unwrap_or_default()),
                },
                _ => println!("Usage: drop <machine> <date>"),
            },
            "move" => match (parts.next(), parts.next(), parts.next()) {
                (Some(job_id), Some(machine_id), Some(date_s)) => match parse_instant(date_s) {
                    Ok(start) => print_effect(
                        dashboard.propose_move(job_id, MoveTarget::new(machine_id, start)),
                    ),
                    Err(result) => println!("Error: {}", result.message.unwrap_or_default()),
                },
                _ => println!("Usage: move <job> <machine> <date>"),
            },
            "confirm" => print_effect(dashboard.confirm().await),
            "cancel" => print_effect(dashboard.cancel()),
            "state" => println!("Move state: {}", describe_state(&dashboard.move_state())),
            "refresh" => {
                let force = matches!(parts.next(), Some("force"));
                let outcome = dashboard.refresh(force).await;
                print_outcome(&dashboard, outcome);
            }
            "load" => match parts.next() {
                Some(path) => {
                    let backend: Arc<dyn ScheduleBackend> = Arc::new(FileBackend::new(path));
                    let (next, outcome) = switch_backend(&config, backend).await;
                    if outcome.is_ok() {
                        dashboard = next;
                    }
                    print_outcome(&dashboard, outcome);
                }
                None => println!("Usage: load <json_path>"),
            },
            "export" => match (parts.next(), parts.next()) {
                (Some("csv"), Some(path)) => match save_jobs_to_csv(&dashboard.jobs(), path) {
                    Ok(()) => println!("Exported jobs to {}.", path),
                    Err(e) => println!("Export error: {}", e),
                },
                _ => println!("Usage: export csv <path>"),
            },
            "import" => match (parts.next(), parts.next()) {
                (Some("csv"), Some(path)) => match load_jobs_from_csv(path) {
                    Ok(jobs) => {
                        let snapshot = ScheduleSnapshot {
                            machines: dashboard.machines(),
                            jobs,
                        };
                        let backend: Arc<dyn ScheduleBackend> = Arc::new(InMemoryBackend::new(
                            snapshot,
                            dashboard.dependencies(),
                        ));
                        let (next, outcome) = switch_backend(&config, backend).await;
                        if outcome.is_ok() {
                            dashboard = next;
                        }
                        print_outcome(&dashboard, outcome);
                    }
                    Err(e) => println!("Import error: {}", e),
                },
                _ => println!("Usage: import csv <path>"),
            },
            _ => println!("Unknown command '{}'. Type 'help'.", cmd),
        }
    }
}
