use anyhow::{Context, Result};
use md2slack_core::config::Config;
use md2slack_core::gitdiff::{self, repo_name_at};
use md2slack_core::paths;
use md2slack_core::render::render_report;
use md2slack_core::slack::{convert_to_blocks, SlackClient};
use md2slack_core::storage::Store;
use md2slack_core::task::TaskChange;
use md2slack_llm::pipeline::{
    fallback_tasks_from_summaries, generate_tasks_from_context, incorporate_extra_context,
    refine_tasks, review_tasks, suggest_next_actions, summarize_commits,
};
use md2slack_llm::{Callbacks, Llm, LlmOptions, Partial, TaskContext};
use md2slack_server::{AppState, RunBoard, RunRequest, Services, Slack};
use regex::Regex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use super::web_addr::resolve_web_addr;

pub const STAGE_NAMES: [&str; 6] = [
    "Preparing commit context",
    "Summarizing commits",
    "Generating tasks",
    "Reviewing tasks",
    "Suggesting next actions",
    "Rendering report",
];

pub struct RunOptions {
    pub debug: bool,
    pub web: bool,
    pub web_addr: Option<String>,
    pub open: bool,
    pub dates: Vec<String>,
    pub extra: String,
}

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

/// `01-05-2026,01-06-2026` → both dates; blanks dropped.
pub fn split_dates(arg: &str) -> Vec<String> {
    arg.split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .collect()
}

fn paste_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\x1b\[\d+~").expect("static regex"))
}

/// Join the trailing words and drop bracketed-paste markers such as `ESC[200~`.
pub fn clean_extra(words: &[String]) -> String {
    paste_marker_re()
        .replace_all(&words.join(" "), "")
        .into_owned()
}

fn elapsed(since: Instant) -> String {
    format!("{:?}", Duration::from_millis(since.elapsed().as_millis() as u64))
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Where a run reports its progress: the console, or the Workspace board.
pub enum Progress {
    Console,
    Board(Arc<RunBoard>),
}

impl Progress {
    fn stage_start(&self, idx: usize) {
        match self {
            Progress::Console => {
                tracing::info!("{}...", STAGE_NAMES.get(idx).copied().unwrap_or_default())
            }
            Progress::Board(board) => board.stage_start(idx, ""),
        }
    }

    fn stage_done(&self, idx: usize, note: &str) {
        match self {
            Progress::Console => tracing::info!(
                "{}: {note}",
                STAGE_NAMES.get(idx).copied().unwrap_or_default()
            ),
            Progress::Board(board) => board.stage_done(idx, note),
        }
    }

    fn log(&self, msg: &str) {
        match self {
            Progress::Console => tracing::info!("{msg}"),
            Progress::Board(board) => board.log(msg),
        }
    }

    fn error(&self, msg: &str) {
        match self {
            Progress::Console => tracing::warn!("{msg}"),
            Progress::Board(board) => board.error(msg),
        }
    }

    fn tasks(&self, tasks: &[TaskChange], next_actions: &[String]) {
        if let Progress::Board(board) = self {
            board.set_tasks(tasks.to_vec(), next_actions.to_vec());
        }
    }

    fn board(&self) -> Option<&Arc<RunBoard>> {
        match self {
            Progress::Board(board) => Some(board),
            Progress::Console => None,
        }
    }
}

/// Model log, tool log and tool status lines feed the board.
pub fn board_callbacks(board: &Arc<RunBoard>) -> Callbacks {
    let llm_log = Arc::clone(board);
    let tool_log = Arc::clone(board);
    let status = Arc::clone(board);
    Callbacks {
        on_llm_log: Some(Arc::new(move |line: &str| llm_log.log(line))),
        on_tool_log: Some(Arc::new(move |line: &str| tool_log.log(line))),
        on_tool_status: Some(Arc::new(move |line: &str| status.status(line))),
        ..Callbacks::default()
    }
}

/// The placeholder emitted when nothing could be synthesized for a day.
pub fn no_commits_task() -> TaskChange {
    TaskChange {
        task_type: "chore".into(),
        task_intent: "No qualifying commits for the day".into(),
        scope: "daily-report".into(),
        technical_why: "No commit summaries or tasks could be synthesized for the selected date."
            .into(),
        is_manual: true,
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Reporter
// ---------------------------------------------------------------------------

/// Runs the report pipeline for one day at a time.
pub struct Reporter {
    pub config: Config,
    pub llm: Llm,
    pub store: Arc<Store>,
    pub slack: SlackClient,
    pub progress: Progress,
    pub debug: bool,
}

impl Reporter {
    fn warn_on<T>(&self, partial: Partial<T>, what: &str) -> T {
        if let Some(e) = &partial.error {
            self.progress.error(&format!("Warning: failed to {what}: {e}"));
        }
        partial.value
    }

    /// Collect facts, synthesize tasks, render and save the report, then
    /// deliver it. Failures are reported as progress, never returned.
    pub async fn process_date(&self, date: &str, repo_path: &Path, author: Option<&str>, extra: &str) {
        let date = date.trim();
        if date.is_empty() {
            return;
        }
        let repo_name = repo_name_at(repo_path);
        println!("\n--- Processing Date: {date} (Repo: {repo_name}) ---");
        let run_start = Instant::now();

        if let Some(board) = self.progress.board() {
            board.reset(date, &repo_name);
            match self.store.load_history(&repo_name, date) {
                Ok(Some(record)) => board.load_history(&repo_name, date, record.tasks, &record.report),
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "loading previous session failed"),
            }
        }

        // Stage 0: commit facts
        let stage_start = Instant::now();
        self.progress.stage_start(0);
        let facts = {
            let (date, extra, repo, author) = (
                date.to_string(),
                extra.to_string(),
                repo_path.to_path_buf(),
                author.map(str::to_string),
            );
            tokio::task::spawn_blocking(move || {
                gitdiff::generate_facts(&date, &extra, &repo, author.as_deref())
            })
            .await
        };
        let facts = match facts {
            Ok(Ok(facts)) => facts,
            Ok(Err(e)) => {
                eprintln!("Error generating facts for {date}: {e}");
                self.progress.error(&e.to_string());
                return;
            }
            Err(e) => {
                eprintln!("Error generating facts for {date}: {e}");
                self.progress.error(&format!("task join error: {e}"));
                return;
            }
        };
        if self.debug {
            println!("--- Git Diff Facts ---");
            match serde_json::to_string_pretty(&facts) {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("Error encoding facts: {e}"),
            }
        }
        let allowed: BTreeSet<String> = facts.commits.iter().map(|c| c.hash.clone()).collect();
        self.progress
            .stage_done(0, &format!("{} commits", facts.commits.len()));
        self.progress
            .log(&format!("Stage 1 done in {}", elapsed(stage_start)));

        // Stage 1: per-commit summaries
        let stage_start = Instant::now();
        self.progress.stage_start(1);
        let summaries = self.warn_on(
            summarize_commits(&self.llm, &facts.commits, &facts.diffs, &facts.semantic).await,
            "summarize commits",
        );
        self.progress
            .stage_done(1, &format!("{} summaries", summaries.len()));
        self.progress
            .log(&format!("Stage 2 done in {}", elapsed(stage_start)));

        let ctx = TaskContext {
            commits: &facts.commits,
            summaries: &summaries,
            semantics: &facts.semantic,
            extra: &facts.extra,
            allowed: Some(&allowed),
        };

        // Stage 2: tasks from extra context, then from commits
        let stage_start = Instant::now();
        self.progress.stage_start(2);
        let mut tasks = self.warn_on(
            incorporate_extra_context(&self.llm, &facts.extra).await,
            "incorporate extra context",
        );
        tasks.extend(self.warn_on(
            generate_tasks_from_context(&self.llm, ctx).await,
            "generate tasks",
        ));
        self.progress.stage_done(2, &format!("{} tasks", tasks.len()));
        self.progress
            .log(&format!("Stage 3 done in {}", elapsed(stage_start)));

        // Stage 3: review, then refine
        let stage_start = Instant::now();
        self.progress.stage_start(3);
        let mut tasks = self.warn_on(review_tasks(&self.llm, tasks, ctx).await, "review tasks");
        self.progress.stage_done(3, &format!("{} tasks", tasks.len()));
        self.progress.tasks(&tasks, &[]);
        self.progress
            .log(&format!("Stage 4 done in {}", elapsed(stage_start)));

        let stage_start = Instant::now();
        tasks = refine_tasks(&self.llm, tasks).await;
        self.progress.tasks(&tasks, &[]);
        self.progress
            .log(&format!("Stage 4.5 done in {}", elapsed(stage_start)));

        if tasks.is_empty() && !summaries.is_empty() {
            self.progress
                .error("Warning: no tasks synthesized, falling back to summary-based tasks");
            tasks = fallback_tasks_from_summaries(&summaries);
        }
        if tasks.is_empty() {
            self.progress.error(&format!(
                "Warning: no tasks synthesized for {date}; emitting fallback task"
            ));
            tasks = vec![no_commits_task()];
        }

        // Stage 4: next actions
        let stage_start = Instant::now();
        self.progress.stage_start(4);
        let next_actions = match suggest_next_actions(&self.llm, &tasks).await {
            Ok(actions) => actions,
            Err(e) => {
                self.progress
                    .error(&format!("Warning: failed to suggest next actions: {e}"));
                Vec::new()
            }
        };
        self.progress
            .stage_done(4, &format!("{} actions", next_actions.len()));
        self.progress.tasks(&tasks, &next_actions);
        self.progress
            .log(&format!("Stage 5 done in {}", elapsed(stage_start)));

        // Stage 5: render and save
        let stage_start = Instant::now();
        self.progress.stage_start(5);
        let report = render_report(date, &[], &tasks, &next_actions);
        self.progress.tasks(&tasks, &next_actions);
        self.progress.stage_done(5, "ready");
        self.progress
            .log(&format!("Stage 6 done in {}", elapsed(stage_start)));
        println!("\n--- FINAL REPORT ---");
        println!("{report}");

        let saved = self
            .store
            .replace_tasks(&repo_name, date, &tasks)
            .and_then(|()| {
                self.store
                    .save_history(&repo_name, date, &tasks, &[], &summaries, &report)
            });
        if let Err(e) = saved {
            self.progress
                .error(&format!("Warning: failed to save history for {date}: {e}"));
        }

        self.deliver(date, &report).await;
        self.progress
            .log(&format!("Total elapsed: {}", elapsed(run_start)));
    }

    async fn deliver(&self, date: &str, report: &str) {
        if self.debug {
            println!("--- LLM Report ---");
            println!("{report}");
            println!("--- Slack Blocks ---");
            match serde_json::to_string_pretty(&convert_to_blocks(report)) {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("Error converting to blocks: {e}"),
            }
        } else if self.progress.board().is_none() {
            println!("Sending to Slack...");
            if let Err(e) = self.slack.send_markdown(&self.config.slack, report).await {
                eprintln!("Error sending to Slack for {date}: {e}");
                return;
            }
            println!("Daily Status Report for {date} sent successfully!");
        } else {
            println!("Web UI enabled: report ready; use the Send button to post to Slack.");
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(opts: RunOptions) -> Result<()> {
    let cwd = std::env::current_dir().context("determining current directory")?;
    let config = Config::load(&cwd).context("loading config")?;
    let store = Arc::new(Store::open_default().context("opening database")?);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        if opts.web {
            serve(opts, cwd, config, store).await
        } else {
            let reporter = Reporter {
                llm: Llm::new(LlmOptions::from_config(&config.llm, &cwd)),
                config,
                store,
                slack: SlackClient::default(),
                progress: Progress::Console,
                debug: opts.debug,
            };
            for date in &opts.dates {
                reporter.process_date(date, &cwd, None, &opts.extra).await;
            }
            Ok(())
        }
    })
}

/// Serve the Workspace, run the dates given on the command line, then keep
/// running whatever the Workspace queues until interrupted.
async fn serve(opts: RunOptions, cwd: PathBuf, config: Config, store: Arc<Store>) -> Result<()> {
    let addr = match opts.web_addr {
        Some(addr) => addr,
        None => resolve_web_addr(
            &config.server.host,
            config.server.port,
            config.server.auto_increment_port,
        )?,
    };
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    let board = Arc::new(RunBoard::new(
        STAGE_NAMES.iter().map(|s| s.to_string()).collect(),
    ));
    let llm = Llm::new(LlmOptions::from_config(&config.llm, &cwd)).with_callbacks(board_callbacks(&board));
    let services = Services {
        store: Arc::clone(&store),
        llm: Some(llm.clone()),
        slack: Some(Slack {
            config: config.slack.clone(),
            client: SlackClient::default(),
        }),
        debug: opts.debug,
        cwd: cwd.clone(),
        settings_path: paths::settings_path()?,
    };
    let (state, mut runs) = AppState::new(Arc::clone(&board), services);
    let server = tokio::spawn(md2slack_server::serve_on(state, listener, opts.open));

    let reporter = Reporter {
        config,
        llm,
        store,
        slack: SlackClient::default(),
        progress: Progress::Board(board),
        debug: opts.debug,
    };
    for date in &opts.dates {
        reporter.process_date(date, &cwd, None, &opts.extra).await;
    }

    let queued = async {
        while let Some(req) = runs.recv().await {
            let RunRequest {
                date,
                repo_path,
                author,
            } = req;
            let repo = if repo_path.is_empty() {
                cwd.clone()
            } else {
                PathBuf::from(repo_path)
            };
            let author = Some(author.as_str()).filter(|a| !a.is_empty());
            reporter.process_date(&date, &repo, author, "").await;
        }
    };

    tokio::select! {
        _ = queued => Ok(()),
        res = server => res.context("server task failed")?,
        _ = tokio::signal::ctrl_c() => Ok(()),
    }
}
