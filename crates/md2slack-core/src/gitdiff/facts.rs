use super::parser::{split_commits, Commit};
use super::semantic::{
    commit_semantic, extract_signals, group_signals, CommitDiff, CommitSemantic, SemanticChange,
};
use crate::error::{Md2SlackError, Result};
use crate::task::CommitSummary;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Everything the model pipeline needs to know about one day of commits.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GitFacts {
    pub date: String,
    pub author: String,
    #[serde(default, rename = "extra_context", skip_serializing_if = "String::is_empty")]
    pub extra: String,
    pub changes: Vec<SemanticChange>,
    pub commits: Vec<Commit>,
    pub diffs: Vec<CommitDiff>,
    pub semantic: Vec<CommitSemantic>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub summaries: Vec<CommitSummary>,
}

// ---------------------------------------------------------------------------
// Git helpers
// ---------------------------------------------------------------------------

fn git(repo: &Path, args: &[&str]) -> Result<String> {
    let output = std::process::Command::new("git")
        .args(args)
        .current_dir(repo)
        .output()?;
    if !output.status.success() {
        return Err(Md2SlackError::Git {
            command: args.first().copied().unwrap_or_default().to_string(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Name of the repository's top-level directory, or `unknown` when `path`
/// is not inside a git work tree.
pub fn repo_name_at(path: &Path) -> String {
    git(path, &["rev-parse", "--show-toplevel"])
        .ok()
        .and_then(|top| {
            Path::new(&top)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
        })
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn is_git_repo(path: &Path) -> bool {
    git(path, &["rev-parse", "--is-inside-work-tree"]).is_ok_and(|out| out == "true")
}

pub fn git_user_name(path: &Path) -> Option<String> {
    git(path, &["config", "user.name"])
        .ok()
        .filter(|name| !name.is_empty())
}

/// Distinct commit days (`YYYY-MM-DD`) within the last `days` days, newest first.
pub fn recent_commit_days(path: &Path, days: u32) -> Result<Vec<String>> {
    let since = format!("--since={days} days ago");
    let out = git(path, &["log", "--all", &since, "--format=%cd", "--date=short"])?;
    let unique: BTreeSet<&str> = out.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    Ok(unique.into_iter().rev().map(str::to_string).collect())
}

/// One row of the commit graph shown in the Workspace.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GraphCommit {
    pub hash: String,
    pub parents: Vec<String>,
    pub author: String,
    pub date: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refs: Vec<String>,
}

const GRAPH_SEP: char = '\u{1f}';

pub fn git_graph(path: &Path, limit: usize) -> Result<Vec<GraphCommit>> {
    let format = format!("--format=%h{GRAPH_SEP}%p{GRAPH_SEP}%an{GRAPH_SEP}%ad{GRAPH_SEP}%s{GRAPH_SEP}%D");
    let limit = format!("-n{limit}");
    let out = git(path, &["log", "--all", "--date=short", &limit, &format])?;
    Ok(out.lines().filter_map(parse_graph_line).collect())
}

fn parse_graph_line(line: &str) -> Option<GraphCommit> {
    let mut parts = line.split(GRAPH_SEP);
    let hash = parts.next()?.trim().to_string();
    if hash.is_empty() {
        return None;
    }
    let parents = parts
        .next()
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    let author = parts.next().unwrap_or_default().to_string();
    let date = parts.next().unwrap_or_default().to_string();
    let message = parts.next().unwrap_or_default().to_string();
    let refs = parts
        .next()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect();
    Some(GraphCommit {
        hash,
        parents,
        author,
        date,
        message,
        refs,
    })
}

/// Author names of the last `n` commits, in log order (duplicates kept).
pub fn log_authors(path: &Path, n: usize) -> Result<Vec<String>> {
    let n = format!("-n{n}");
    let out = git(path, &["log", "--format=%an", &n])?;
    Ok(out
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

// ---------------------------------------------------------------------------
// Facts
// ---------------------------------------------------------------------------

/// Dates arrive as `MM-DD-YYYY`; git's date parser is happier with ISO.
pub fn git_date(date: &str) -> String {
    NaiveDate::parse_from_str(date.trim(), "%m-%d-%Y")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|_| date.trim().to_string())
}

/// Collect the day's commits by `author_override` (or the configured git
/// user) and derive their semantic signals.
pub fn generate_facts(
    date: &str,
    extra: &str,
    repo_path: &Path,
    author_override: Option<&str>,
) -> Result<GitFacts> {
    if repo_path.as_os_str().is_empty() {
        return Err(Md2SlackError::RepoPathRequired);
    }

    let author = author_override
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .or_else(|| git_user_name(repo_path))
        .unwrap_or_default();

    let day = git_date(date);
    let author_arg = format!("--author={author}");
    let since = format!("--since={day} 00:00:00");
    let until = format!("--until={day} 23:59:59");
    let raw = git(
        repo_path,
        &["log", &author_arg, &since, &until, "--no-merges", "-p", "-U1", "--all"],
    )?;

    let mut facts = facts_from_log(&raw);
    tracing::debug!(date, author = %author, commits = facts.commits.len(), "collected git facts");
    facts.date = date.to_string();
    facts.author = author;
    facts.extra = extra.to_string();
    Ok(facts)
}

/// Parse a raw `git log -p` dump into facts (without date or author).
pub fn facts_from_log(raw: &str) -> GitFacts {
    let mut facts = GitFacts::default();
    for chunk in split_commits(raw) {
        let hash = chunk.commit.hash.clone();
        let signals: Vec<_> = chunk.commit.files.iter().map(extract_signals).collect();
        facts.changes.extend(group_signals(&hash, &signals));
        facts.semantic.push(commit_semantic(&hash, &signals));
        facts.diffs.push(CommitDiff {
            commit: hash,
            diff: chunk.raw,
        });
        facts.commits.push(chunk.commit);
    }
    facts
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn empty_repo_path_is_rejected() {
        let err = generate_facts("02-05-2026", "", &PathBuf::new(), Some("Override Name"))
            .unwrap_err();
        assert!(matches!(err, Md2SlackError::RepoPathRequired));
    }

    #[test]
    fn git_date_converts_us_format() {
        assert_eq!(git_date("02-05-2026"), "2026-02-05");
        assert_eq!(git_date("2026-02-05"), "2026-02-05");
    }

    #[test]
    fn facts_from_log_fills_every_view() {
        let raw = "commit abcdef0\nAuthor: a\n\n    Add retry\ndiff --git a/src/net/client.ts b/src/net/client.ts\n+for (let attempt = 0; attempt < 3; attempt++) {\n";
        let facts = facts_from_log(raw);
        assert_eq!(facts.commits.len(), 1);
        assert_eq!(facts.diffs[0].commit, "abcde");
        assert!(facts.diffs[0].diff.contains("Add retry"));
        assert_eq!(facts.semantic[0].files_touched, 1);
        assert!(facts.changes[0].signals[0]
            .types
            .contains(&"retry_logic".to_string()));
    }

    #[test]
    fn graph_line_parsing() {
        let line = format!("abc1234{s}p1 p2{s}Dev{s}2026-02-05{s}Merge x{s}HEAD -> main, origin/main", s = GRAPH_SEP);
        let c = parse_graph_line(&line).unwrap();
        assert_eq!(c.parents, vec!["p1", "p2"]);
        assert_eq!(c.refs, vec!["HEAD -> main", "origin/main"]);
        assert!(parse_graph_line("").is_none());
    }

    #[test]
    fn repo_name_outside_git_is_unknown() {
        let dir = tempfile::TempDir::new().unwrap();
        assert_eq!(repo_name_at(dir.path()), "unknown");
        assert!(!is_git_repo(dir.path()));
    }

    #[test]
    fn helpers_inside_a_fresh_repo() {
        let dir = tempfile::TempDir::new().unwrap();
        let ok = std::process::Command::new("git")
            .args(["init", "-q"])
            .current_dir(dir.path())
            .status()
            .map(|s| s.success())
            .unwrap_or(false);
        if !ok {
            return;
        }
        assert!(is_git_repo(dir.path()));
        assert_eq!(
            repo_name_at(dir.path()),
            dir.path().file_name().unwrap().to_string_lossy()
        );
    }
}
