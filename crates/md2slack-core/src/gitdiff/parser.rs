use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// One file touched by a commit, with its added and removed lines.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DiffFile {
    pub path: String,
    pub is_new: bool,
    pub is_deleted: bool,
    pub is_test: bool,
    #[serde(default)]
    pub additions: Vec<String>,
    #[serde(default)]
    pub deletions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Commit {
    /// Short hash, at most 5 characters.
    pub hash: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub files: Vec<DiffFile>,
}

/// Raw text of one commit as it appeared in the log.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitChunk {
    pub commit: Commit,
    pub raw: String,
}

const HASH_LEN: usize = 5;

fn diff_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^diff --git a/(.*) b/(.*)").expect("static regex"))
}

pub fn is_test_file(path: &str) -> bool {
    path.contains("/test") || path.contains(".spec.") || path.contains(".test.")
}

/// Parse `git log -p` output into commits.
pub fn parse_git_log(raw: &str) -> Vec<Commit> {
    split_commits(raw).into_iter().map(|c| c.commit).collect()
}

/// Like [`parse_git_log`] but keeps each commit's raw text for prompting.
pub fn split_commits(raw: &str) -> Vec<CommitChunk> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }
    let normalized = format!("\n{raw}");
    normalized
        .split("\ncommit ")
        .filter_map(|chunk| {
            let chunk = chunk.trim();
            let lines: Vec<&str> = chunk.lines().collect();
            let hash = lines.first()?.split_whitespace().next()?;
            let hash: String = hash.chars().take(HASH_LEN).collect();
            Some(CommitChunk {
                commit: Commit {
                    hash,
                    message: commit_message(&lines),
                    files: parse_files(&lines),
                },
                raw: format!("commit {chunk}"),
            })
        })
        .collect()
}

/// Message body: the 4-space indented lines between the header and the first diff.
fn commit_message(lines: &[&str]) -> String {
    lines
        .iter()
        .skip(1)
        .take_while(|l| !l.starts_with("diff --git"))
        .filter_map(|l| l.strip_prefix("    "))
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn parse_files(lines: &[&str]) -> Vec<DiffFile> {
    let mut files = Vec::new();
    let mut current: Option<DiffFile> = None;

    for line in lines {
        if line.starts_with("diff --git") {
            if let Some(done) = current.take() {
                files.push(done);
            }
            let path = match diff_header().captures(line) {
                Some(caps) => caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
                None => line
                    .split_whitespace()
                    .nth(3)
                    .map(|p| p.trim_start_matches("b/").to_string())
                    .unwrap_or_default(),
            };
            current = Some(DiffFile {
                is_test: is_test_file(&path),
                path,
                ..Default::default()
            });
            continue;
        }

        let Some(file) = current.as_mut() else {
            continue;
        };
        if line.starts_with("new file mode") {
            file.is_new = true;
        }
        if line.starts_with("deleted file mode") {
            file.is_deleted = true;
        }
        if let Some(added) = line.strip_prefix('+') {
            if !line.starts_with("+++") {
                file.additions.push(added.to_string());
            }
        }
        if let Some(removed) = line.strip_prefix('-') {
            if !line.starts_with("---") {
                file.deletions.push(removed.to_string());
            }
        }
    }

    if let Some(done) = current {
        files.push(done);
    }
    files
}
