//! SQLite persistence for report history and the per-day task list.

use crate::error::{Md2SlackError, Result};
use crate::io::ensure_dir;
use crate::paths;
use crate::task::{CommitSummary, GroupedTask, TaskChange};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_name TEXT,
    date TEXT,
    data TEXT,
    report TEXT,
    UNIQUE(repo_name, date)
);
CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    repo_name TEXT NOT NULL,
    date TEXT NOT NULL,
    task_json TEXT NOT NULL,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_tasks_repo_date ON tasks(repo_name, date);
";

/// A saved report for one repo and day.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HistoryRecord {
    pub date: String,
    #[serde(default)]
    pub tasks: Vec<TaskChange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<GroupedTask>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub summaries: Vec<CommitSummary>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub report: String,
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open the database at [`paths::db_path`], creating parent directories.
    pub fn open_default() -> Result<Self> {
        Self::open(&paths::db_path()?)
    }

    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                ensure_dir(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock leaves the connection usable.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    pub fn save_history(
        &self,
        repo_name: &str,
        date: &str,
        tasks: &[TaskChange],
        groups: &[GroupedTask],
        summaries: &[CommitSummary],
        report: &str,
    ) -> Result<()> {
        let record = HistoryRecord {
            date: date.to_string(),
            tasks: tasks.to_vec(),
            groups: groups.to_vec(),
            summaries: summaries.to_vec(),
            report: report.to_string(),
        };
        let data = serde_json::to_string(&record)?;
        self.conn().execute(
            "INSERT INTO history (repo_name, date, data, report)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(repo_name, date) DO UPDATE SET
                data = excluded.data,
                report = excluded.report",
            params![repo_name, date, data, report],
        )?;
        tracing::debug!(repo_name, date, tasks = tasks.len(), "saved history");
        Ok(())
    }

    pub fn load_history(&self, repo_name: &str, date: &str) -> Result<Option<HistoryRecord>> {
        let row: Option<(String, Option<String>)> = self
            .conn()
            .query_row(
                "SELECT data, report FROM history WHERE repo_name = ?1 AND date = ?2",
                params![repo_name, date],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((data, report)) = row else {
            return Ok(None);
        };
        let mut record: HistoryRecord = serde_json::from_str(&data)?;
        if record.report.is_empty() {
            record.report = report.unwrap_or_default();
        }
        Ok(Some(record))
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    pub fn load_tasks(&self, repo_name: &str, date: &str) -> Result<Vec<TaskChange>> {
        load_tasks(&self.conn(), repo_name, date)
    }

    /// Insert a task, assigning an id when it has none. Returns the id and
    /// the day's full list.
    pub fn create_task(
        &self,
        repo_name: &str,
        date: &str,
        mut task: TaskChange,
    ) -> Result<(String, Vec<TaskChange>)> {
        if task.id.is_empty() {
            task.id = next_task_id();
        }
        let conn = self.conn();
        conn.execute(
            "INSERT INTO tasks (id, repo_name, date, task_json) VALUES (?1, ?2, ?3, ?4)",
            params![task.id, repo_name, date, serde_json::to_string(&task)?],
        )?;
        let tasks = load_tasks(&conn, repo_name, date)?;
        Ok((task.id, tasks))
    }

    pub fn update_task(
        &self,
        repo_name: &str,
        date: &str,
        task_id: &str,
        mut task: TaskChange,
    ) -> Result<Vec<TaskChange>> {
        task.id = task_id.to_string();
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE tasks SET task_json = ?1, updated_at = CURRENT_TIMESTAMP
             WHERE repo_name = ?2 AND date = ?3 AND id = ?4",
            params![serde_json::to_string(&task)?, repo_name, date, task_id],
        )?;
        if changed == 0 {
            return Err(Md2SlackError::TaskNotFound(task_id.to_string()));
        }
        load_tasks(&conn, repo_name, date)
    }

    pub fn delete_tasks(
        &self,
        repo_name: &str,
        date: &str,
        ids: &[String],
    ) -> Result<Vec<TaskChange>> {
        let conn = self.conn();
        if !ids.is_empty() {
            let placeholders = vec!["?"; ids.len()].join(",");
            let sql = format!(
                "DELETE FROM tasks WHERE repo_name = ? AND date = ? AND id IN ({placeholders})"
            );
            let args = [repo_name, date]
                .into_iter()
                .chain(ids.iter().map(String::as_str));
            conn.execute(&sql, params_from_iter(args))?;
        }
        load_tasks(&conn, repo_name, date)
    }

    pub fn delete_all_tasks(&self, repo_name: &str, date: &str) -> Result<()> {
        self.conn().execute(
            "DELETE FROM tasks WHERE repo_name = ?1 AND date = ?2",
            params![repo_name, date],
        )?;
        Ok(())
    }

    /// Swap the day's task list for `tasks` in one transaction.
    pub fn replace_tasks(&self, repo_name: &str, date: &str, tasks: &[TaskChange]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM tasks WHERE repo_name = ?1 AND date = ?2",
            params![repo_name, date],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO tasks (id, repo_name, date, task_json) VALUES (?1, ?2, ?3, ?4)",
            )?;
            let mut taken = tx.prepare("SELECT 1 FROM tasks WHERE id = ?1")?;
            let mut seen = HashSet::new();
            for task in tasks {
                let mut task = task.clone();
                // Ids are global; repeats within the batch or from another
                // day get a fresh one.
                if task.id.is_empty()
                    || seen.contains(&task.id)
                    || taken.exists(params![task.id])?
                {
                    task.id = next_task_id();
                }
                seen.insert(task.id.clone());
                stmt.execute(params![task.id, repo_name, date, serde_json::to_string(&task)?])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

fn load_tasks(conn: &Connection, repo_name: &str, date: &str) -> Result<Vec<TaskChange>> {
    let mut stmt = conn.prepare(
        "SELECT id, task_json FROM tasks
         WHERE repo_name = ?1 AND date = ?2
         ORDER BY created_at ASC, rowid ASC",
    )?;
    let rows = stmt.query_map(params![repo_name, date], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    let mut tasks = Vec::new();
    for row in rows {
        let (id, raw) = row?;
        let mut task: TaskChange = serde_json::from_str(&raw)?;
        if task.id.is_empty() {
            task.id = id;
        }
        tasks.push(task);
    }
    Ok(tasks)
}

/// `task-<unix nanos>`, strictly increasing within the process.
fn next_task_id() -> String {
    static LAST: AtomicU64 = AtomicU64::new(0);
    let now = chrono::Utc::now()
        .timestamp_nanos_opt()
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or_default();
    let mut prev = LAST.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev + 1);
        match LAST.compare_exchange(prev, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return format!("task-{next}"),
            Err(actual) => prev = actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn task(intent: &str) -> TaskChange {
        let mut t = TaskChange::new("delivery", intent);
        t.scope = "core".into();
        t
    }

    #[test]
    fn task_crud_is_scoped_by_day() {
        let store = Store::in_memory().unwrap();
        let (id_a, tasks_a) = store.create_task("repoA", "2026-02-06", task("meet team")).unwrap();
        assert!(id_a.starts_with("task-"));
        assert_eq!(tasks_a.len(), 1);
        assert_eq!(tasks_a[0].id, id_a);

        let (id_b, _) = store.create_task("repoA", "2026-02-07", task("build feature")).unwrap();
        assert_ne!(id_a, id_b);

        let mut edited = tasks_a[0].clone();
        edited.task_intent = "meet team updated".into();
        let updated = store.update_task("repoA", "2026-02-06", &id_a, edited).unwrap();
        assert_eq!(updated[0].task_intent, "meet team updated");

        let left = store
            .delete_tasks("repoA", "2026-02-06", &[id_a.clone()])
            .unwrap();
        assert!(left.is_empty());
        assert_eq!(store.load_tasks("repoA", "2026-02-07").unwrap().len(), 1);
    }

    #[test]
    fn update_missing_task_fails() {
        let store = Store::in_memory().unwrap();
        let err = store
            .update_task("r", "d", "task-404", task("x"))
            .unwrap_err();
        assert_eq!(err.to_string(), "task_id task-404 not found");
    }

    #[test]
    fn replace_assigns_ids_and_keeps_order() {
        let store = Store::in_memory().unwrap();
        store.create_task("r", "d", task("old")).unwrap();
        store
            .replace_tasks("r", "d", &[task("one"), task("two"), task("three")])
            .unwrap();
        let tasks = store.load_tasks("r", "d").unwrap();
        let intents: Vec<_> = tasks.iter().map(|t| t.task_intent.as_str()).collect();
        assert_eq!(intents, vec!["one", "two", "three"]);
        assert!(tasks.iter().all(|t| !t.id.is_empty()));
    }

    #[test]
    fn replace_gives_repeated_ids_fresh_ones() {
        let store = Store::in_memory().unwrap();
        store.replace_tasks("r", "d", &[task("before")]).unwrap();
        let mut a = task("first half");
        a.id = "task-1".into();
        let mut b = task("second half");
        b.id = "task-1".into();

        store.replace_tasks("r", "d", &[a, b]).unwrap();

        let tasks = store.load_tasks("r", "d").unwrap();
        let intents: Vec<_> = tasks.iter().map(|t| t.task_intent.as_str()).collect();
        assert_eq!(intents, vec!["first half", "second half"]);
        assert_eq!(tasks[0].id, "task-1");
        assert_ne!(tasks[1].id, "task-1");
    }

    #[test]
    fn replace_keeps_same_day_ids_but_not_other_days() {
        let store = Store::in_memory().unwrap();
        let (id, _) = store.create_task("r", "d1", task("elsewhere")).unwrap();
        let (own, _) = store.create_task("r", "d2", task("mine")).unwrap();
        let mut copied = task("copied");
        copied.id = id.clone();
        let mut kept = task("mine");
        kept.id = own.clone();

        store.replace_tasks("r", "d2", &[kept, copied]).unwrap();

        let tasks = store.load_tasks("r", "d2").unwrap();
        assert_eq!(tasks[0].id, own);
        assert_ne!(tasks[1].id, id);
        assert_eq!(store.load_tasks("r", "d1").unwrap()[0].id, id);
    }

    #[test]
    fn delete_all_only_touches_one_day() {
        let store = Store::in_memory().unwrap();
        store.create_task("r", "d1", task("a")).unwrap();
        store.create_task("r", "d2", task("b")).unwrap();
        store.delete_all_tasks("r", "d1").unwrap();
        assert!(store.load_tasks("r", "d1").unwrap().is_empty());
        assert_eq!(store.load_tasks("r", "d2").unwrap().len(), 1);
    }

    #[test]
    fn history_upserts_and_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(&dir.path().join("nested").join("md2slack.db")).unwrap();
        assert!(store.load_history("repo", "02-05-2026").unwrap().is_none());

        store
            .save_history("repo", "02-05-2026", &[task("first")], &[], &[], "report v1")
            .unwrap();
        store
            .save_history("repo", "02-05-2026", &[task("second")], &[], &[], "report v2")
            .unwrap();
        let rec = store.load_history("repo", "02-05-2026").unwrap().unwrap();
        assert_eq!(rec.tasks[0].task_intent, "second");
        assert_eq!(rec.report, "report v2");
    }

    #[test]
    fn task_ids_are_unique_in_a_burst() {
        let ids: std::collections::HashSet<_> = (0..100).map(|_| next_task_id()).collect();
        assert_eq!(ids.len(), 100);
    }
}
