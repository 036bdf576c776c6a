use crate::error::{Md2SlackError, Result};
use crate::gitdiff;
use crate::io::atomic_write_private;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Workspace preferences: known project checkouts and author names.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub project_paths: Vec<String>,
    #[serde(default)]
    pub usernames: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectInfo {
    pub name: String,
    pub path: String,
}

impl Settings {
    /// A missing file yields empty settings.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        let settings: Settings = serde_json::from_str(&text)?;
        Ok(settings.normalized())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(&self.clone().normalized())?;
        atomic_write_private(path, data.as_bytes())
    }

    pub fn normalized(mut self) -> Self {
        self.project_paths = normalize_list(&self.project_paths);
        self.usernames = normalize_list(&self.usernames);
        self
    }
}

/// Trim, drop empties, dedupe case-insensitively keeping the first spelling,
/// then sort.
pub fn normalize_list<S: AsRef<str>>(values: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out: Vec<String> = values
        .iter()
        .map(|v| v.as_ref().trim())
        .filter(|v| !v.is_empty())
        .filter(|v| seen.insert(v.to_lowercase()))
        .map(str::to_string)
        .collect();
    out.sort();
    out
}

/// Add `cwd` to the project list when it is a repository and not yet listed.
pub fn ensure_default_project_path(paths: &[String], cwd: &Path, is_repo: bool) -> Vec<String> {
    let mut out = normalize_list(paths);
    let cwd = cwd.to_string_lossy();
    if is_repo && !cwd.is_empty() && !out.iter().any(|p| p.eq_ignore_ascii_case(&cwd)) {
        out.push(cwd.into_owned());
        out = normalize_list(&out);
    }
    out
}

pub fn build_project_info(paths: &[String]) -> Vec<ProjectInfo> {
    normalize_list(paths)
        .into_iter()
        .map(|path| ProjectInfo {
            name: gitdiff::repo_name_at(Path::new(&path)),
            path,
        })
        .collect()
}

/// Candidate author names for a repository: the configured user plus
/// everyone in the last 200 commits.
pub fn scan_users(repo_path: &str) -> Result<Vec<String>> {
    let repo_path = repo_path.trim();
    if repo_path.is_empty() {
        return Err(Md2SlackError::RepoPathRequired);
    }
    let path = Path::new(repo_path);
    let mut users: Vec<String> = gitdiff::git_user_name(path).into_iter().collect();
    match gitdiff::log_authors(path, 200) {
        Ok(authors) => users.extend(authors),
        Err(e) => tracing::debug!(error = %e, repo = repo_path, "git log for authors failed"),
    }
    Ok(normalize_list(&users))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn save_then_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("webui.json");
        let s = Settings {
            project_paths: vec!["/tmp/repo".into()],
            usernames: vec!["Iago".into()],
        };
        s.save(&path).unwrap();
        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded, s);
        assert!(std::fs::read_to_string(&path).unwrap().contains("\n  "));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let loaded = Settings::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(loaded, Settings::default());
    }

    #[test]
    fn normalize_dedupes_case_insensitively() {
        let out = normalize_list(&["  bob ", "Alice", "BOB", "", "alice"]);
        assert_eq!(out, vec!["Alice", "bob"]);
    }

    #[test]
    fn default_project_added_only_for_repos() {
        let cwd = Path::new("/work/repo");
        let existing = vec!["/a".to_string()];
        assert_eq!(
            ensure_default_project_path(&existing, cwd, true),
            vec!["/a", "/work/repo"]
        );
        assert_eq!(ensure_default_project_path(&existing, cwd, false), vec!["/a"]);
        let already = vec!["/work/repo".to_string()];
        assert_eq!(ensure_default_project_path(&already, cwd, true).len(), 1);
    }

    #[test]
    fn scan_users_requires_path() {
        let err = scan_users("  ").unwrap_err();
        assert_eq!(err.to_string(), "repo path is required");
    }

    #[test]
    fn project_info_names_non_repos_unknown() {
        let dir = TempDir::new().unwrap();
        let info = build_project_info(&[dir.path().to_string_lossy().into_owned()]);
        assert_eq!(info[0].name, "unknown");
    }
}
