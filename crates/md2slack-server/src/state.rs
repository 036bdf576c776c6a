use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use md2slack_core::config::SlackConfig;
use md2slack_core::render::{markdown_to_html, render_report};
use md2slack_core::slack::SlackClient;
use md2slack_core::storage::Store;
use md2slack_core::task::TaskChange;
use md2slack_llm::Llm;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub const MAX_LOGS: usize = 300;
pub const MAX_ERRORS: usize = 20;

/// Repo name used for storage when a run has not named one.
pub const UNKNOWN_REPO: &str = "unknown";

// ---------------------------------------------------------------------------
// Run board
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Running,
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub status: StageStatus,
    pub note: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub duration: String,
}

impl Stage {
    fn pending(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: StageStatus::Pending,
            note: String::new(),
            started_at: None,
            duration: String::new(),
        }
    }
}

/// Everything the Workspace polls from `/api/state`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub repo: String,
    pub date: String,
    pub stages: Vec<Stage>,
    pub logs: Vec<String>,
    pub errors: Vec<String>,
    pub status_line: String,
    pub report: String,
    pub report_html: String,
    pub tasks: Vec<TaskChange>,
    pub next_actions: Vec<String>,
}

fn push_capped(list: &mut Vec<String>, line: &str, max: usize) {
    if line.is_empty() {
        return;
    }
    list.push(line.to_string());
    if list.len() > max {
        let excess = list.len() - max;
        list.drain(..excess);
    }
}

/// Shared progress of the current report run. The CLI pipeline writes to it
/// and the HTTP handlers read and edit it.
pub struct RunBoard {
    stage_names: Vec<String>,
    inner: Mutex<Snapshot>,
}

impl RunBoard {
    pub fn new(stage_names: Vec<String>) -> Self {
        let board = Self {
            stage_names,
            inner: Mutex::new(Snapshot::default()),
        };
        board.reset("", "");
        board
    }

    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fresh stages, logs, errors and status line. Tasks and the report stay.
    pub fn reset(&self, date: &str, repo: &str) {
        let mut s = self.lock();
        s.repo = repo.to_string();
        s.date = date.to_string();
        s.stages = self.stage_names.iter().map(|n| Stage::pending(n)).collect();
        s.logs.clear();
        s.errors.clear();
        s.status_line.clear();
    }

    pub fn set_repo(&self, repo: &str) {
        self.lock().repo = repo.to_string();
    }

    /// Mark stage `idx` running, renaming it when `name` is non-empty.
    /// Out-of-range indices are ignored.
    pub fn stage_start(&self, idx: usize, name: &str) {
        let mut s = self.lock();
        let Some(stage) = s.stages.get_mut(idx) else {
            return;
        };
        stage.status = StageStatus::Running;
        if !name.is_empty() {
            stage.name = name.to_string();
        }
        stage.started_at = Some(Utc::now());
        stage.duration.clear();
    }

    pub fn stage_done(&self, idx: usize, note: &str) {
        let mut s = self.lock();
        let Some(stage) = s.stages.get_mut(idx) else {
            return;
        };
        stage.status = StageStatus::Done;
        stage.note = note.to_string();
        if let Some(started) = stage.started_at {
            let elapsed = (Utc::now() - started).to_std().unwrap_or_default();
            stage.duration = format!("{:?}", Duration::from_millis(elapsed.as_millis() as u64));
        }
    }

    /// Set every stage to `status` with `note`.
    pub fn mark_all(&self, status: StageStatus, note: &str) {
        for stage in &mut self.lock().stages {
            stage.status = status;
            stage.note = note.to_string();
        }
    }

    pub fn log(&self, line: &str) {
        push_capped(&mut self.lock().logs, line, MAX_LOGS);
    }

    /// Record an error and mirror it into the log.
    pub fn error(&self, line: &str) {
        if line.is_empty() {
            return;
        }
        let mut s = self.lock();
        push_capped(&mut s.errors, line, MAX_ERRORS);
        push_capped(&mut s.logs, &format!("ERROR: {line}"), MAX_LOGS);
    }

    pub fn status(&self, line: &str) {
        self.lock().status_line = line.to_string();
    }

    pub fn snapshot(&self) -> Snapshot {
        self.lock().clone()
    }

    pub fn tasks(&self) -> Vec<TaskChange> {
        self.lock().tasks.clone()
    }

    pub fn next_actions(&self) -> Vec<String> {
        self.lock().next_actions.clone()
    }

    /// `(repo, date)` of the current run.
    pub fn scope(&self) -> (String, String) {
        let s = self.lock();
        (s.repo.clone(), s.date.clone())
    }

    pub fn report(&self) -> String {
        self.lock().report.clone()
    }

    /// Replace the task list and re-render the report from it.
    pub fn set_tasks(&self, tasks: Vec<TaskChange>, next_actions: Vec<String>) {
        let mut s = self.lock();
        let report = render_report(&s.date, &[], &tasks, &next_actions);
        s.report_html = markdown_to_html(&report);
        s.report = report;
        s.tasks = tasks;
        s.next_actions = next_actions;
    }

    pub fn set_report(&self, report: &str) {
        let mut s = self.lock();
        s.report = report.to_string();
        s.report_html = markdown_to_html(report);
    }

    /// Show a day loaded from history. A blank report clears the preview and
    /// resets the stages; otherwise every stage reads as done.
    pub fn load_history(&self, repo: &str, date: &str, tasks: Vec<TaskChange>, report: &str) {
        {
            let mut s = self.lock();
            s.tasks = tasks;
            s.date = date.to_string();
            s.repo = repo.to_string();
            if report.is_empty() {
                s.report.clear();
                s.report_html.clear();
            } else {
                s.report = report.to_string();
                s.report_html = markdown_to_html(report);
            }
        }
        if report.is_empty() {
            self.mark_all(StageStatus::Pending, "");
        } else {
            self.mark_all(StageStatus::Done, "Loaded from history");
        }
    }

    /// Drop the task list and report, resetting the stages.
    pub fn clear_tasks(&self) {
        {
            let mut s = self.lock();
            s.tasks.clear();
            s.report.clear();
            s.report_html.clear();
        }
        self.mark_all(StageStatus::Pending, "");
    }
}

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// Slack credentials plus the client that posts with them.
pub struct Slack {
    pub config: SlackConfig,
    pub client: SlackClient,
}

/// What the handlers call into. `None` fields switch the matching routes
/// off.
pub struct Services {
    pub store: Arc<Store>,
    pub llm: Option<Llm>,
    pub slack: Option<Slack>,
    /// Skip posting to Slack.
    pub debug: bool,
    /// Working directory; its repository becomes the default project.
    pub cwd: PathBuf,
    pub settings_path: PathBuf,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// A report run queued from the Workspace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub repo_path: String,
    #[serde(default)]
    pub author: String,
}

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub board: Arc<RunBoard>,
    pub services: Arc<Services>,
    run_tx: mpsc::Sender<RunRequest>,
}

impl AppState {
    /// Build the state and the receiving end of the run queue. The queue
    /// holds one request; a second is refused until the first is taken.
    pub fn new(board: Arc<RunBoard>, services: Services) -> (Self, mpsc::Receiver<RunRequest>) {
        let (run_tx, run_rx) = mpsc::channel(1);
        let state = Self {
            board,
            services: Arc::new(services),
            run_tx,
        };
        (state, run_rx)
    }

    /// Queue `req`; false when a run is already waiting.
    pub fn try_queue_run(&self, req: RunRequest) -> bool {
        self.run_tx.try_send(req).is_ok()
    }

    /// Persist `tasks` and the current report for the run's repo and day on
    /// the blocking pool. Failures are logged, not returned.
    pub async fn save(&self, tasks: Vec<TaskChange>) {
        let (repo, date) = self.board.scope();
        let repo = if repo.is_empty() {
            UNKNOWN_REPO.to_string()
        } else {
            repo
        };
        let report = self.board.report();
        let store = Arc::clone(&self.services.store);
        let (log_repo, log_date) = (repo.clone(), date.clone());
        let saved = tokio::task::spawn_blocking(move || {
            persist_tasks(&store, &repo, &date, &tasks, &report)
        })
        .await;
        match saved {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(repo = %log_repo, date = %log_date, error = %e, "saving tasks failed")
            }
            Err(e) => tracing::warn!(error = %e, "task join error"),
        }
    }
}

/// Replace the day's task rows and rewrite its history record, keeping the
/// commit summaries a report run stored there.
fn persist_tasks(
    store: &Store,
    repo: &str,
    date: &str,
    tasks: &[TaskChange],
    report: &str,
) -> md2slack_core::Result<()> {
    store.replace_tasks(repo, date, tasks)?;
    let summaries = store
        .load_history(repo, date)?
        .map(|record| record.summaries)
        .unwrap_or_default();
    store.save_history(repo, date, tasks, &[], &summaries, report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board() -> RunBoard {
        RunBoard::new(vec!["One".into(), "Two".into()])
    }

    #[test]
    fn reset_builds_pending_stages() {
        let b = board();
        b.log("hello");
        b.reset("2026-01-05", "repo");
        let s = b.snapshot();
        assert_eq!(s.date, "2026-01-05");
        assert_eq!(s.stages.len(), 2);
        assert!(s.stages.iter().all(|st| st.status == StageStatus::Pending));
        assert!(s.logs.is_empty());
    }

    #[test]
    fn stages_track_running_and_done() {
        let b = board();
        b.stage_start(0, "Renamed");
        b.stage_start(7, "ignored");
        let s = b.snapshot();
        assert_eq!(s.stages[0].status, StageStatus::Running);
        assert_eq!(s.stages[0].name, "Renamed");
        assert!(s.stages[0].started_at.is_some());

        b.stage_done(0, "3 commits");
        let s = b.snapshot();
        assert_eq!(s.stages[0].status, StageStatus::Done);
        assert_eq!(s.stages[0].note, "3 commits");
        assert!(s.stages[0].duration.ends_with('s'));
    }

    #[test]
    fn logs_and_errors_are_capped() {
        let b = board();
        for i in 0..(MAX_LOGS + 5) {
            b.log(&format!("line {i}"));
        }
        b.log("");
        for i in 0..(MAX_ERRORS + 3) {
            b.error(&format!("bad {i}"));
        }
        let s = b.snapshot();
        assert_eq!(s.logs.len(), MAX_LOGS);
        assert_eq!(s.errors.len(), MAX_ERRORS);
        assert_eq!(s.errors[0], "bad 3");
        assert_eq!(s.logs.last().map(String::as_str), Some("ERROR: bad 22"));
    }

    #[test]
    fn set_tasks_renders_report() {
        let b = board();
        b.reset("2026-01-05", "repo");
        b.set_tasks(vec![TaskChange::new("delivery", "ship api")], vec![]);
        let s = b.snapshot();
        assert!(s.report.starts_with("Daily Status Report 2026-01-05"));
        assert!(s.report.contains("Ship api"));
        assert!(s.report_html.contains("<strong>Tasks</strong>"));
    }

    #[test]
    fn history_and_clear() {
        let b = board();
        b.load_history("repo", "2026-01-05", vec![TaskChange::new("fix", "a")], "report");
        let s = b.snapshot();
        assert!(s.stages.iter().all(|st| st.note == "Loaded from history"));
        assert_eq!(s.report_html.trim(), "<p>report</p>");

        b.clear_tasks();
        let s = b.snapshot();
        assert!(s.tasks.is_empty());
        assert_eq!(s.report, "");
        assert!(s.stages.iter().all(|st| st.status == StageStatus::Pending));
    }

    #[test]
    fn stage_status_serializes_lowercase() {
        let json = serde_json::to_value(Stage::pending("x")).unwrap();
        assert_eq!(json["status"], "pending");
        assert!(json.get("started_at").is_none());
    }

    #[test]
    fn persisting_tasks_keeps_summaries_and_drops_groups() {
        use md2slack_core::task::{CommitSummary, GroupedTask};
        let store = Store::in_memory().unwrap();
        let summary = CommitSummary {
            commit: "abc12".into(),
            summary: "Added retries".into(),
            ..Default::default()
        };
        let group = GroupedTask {
            epic: "Uploads".into(),
            tasks: vec![0],
            ..Default::default()
        };
        store
            .save_history("r", "d", &[], &[group], &[summary.clone()], "")
            .unwrap();

        persist_tasks(&store, "r", "d", &[TaskChange::new("delivery", "x")], "report").unwrap();

        let record = store.load_history("r", "d").unwrap().unwrap();
        assert_eq!(record.summaries, vec![summary]);
        assert!(record.groups.is_empty());
        assert_eq!(record.report, "report");
        assert_eq!(store.load_tasks("r", "d").unwrap().len(), 1);
    }
}
