use crate::error::{Md2SlackError, Result};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const APP_DIR: &str = ".md2slack";
pub const PROMPTS_DIR: &str = "prompts";
pub const CONFIG_FILE: &str = "config.ini";
pub const DB_FILE: &str = "md2slack.db";
pub const SETTINGS_FILE: &str = "webui.json";

/// Overrides the SQLite database location.
pub const DB_PATH_ENV: &str = "MD2SLACK_DB_PATH";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn home_dir() -> Result<PathBuf> {
    home::home_dir().ok_or(Md2SlackError::HomeNotFound)
}

/// `~/.md2slack`
pub fn app_dir() -> Result<PathBuf> {
    Ok(home_dir()?.join(APP_DIR))
}

pub fn db_path() -> Result<PathBuf> {
    if let Ok(p) = std::env::var(DB_PATH_ENV) {
        if !p.trim().is_empty() {
            return Ok(PathBuf::from(p));
        }
    }
    Ok(app_dir()?.join(DB_FILE))
}

pub fn settings_path() -> Result<PathBuf> {
    Ok(app_dir()?.join(SETTINGS_FILE))
}

/// Candidate config files, most specific first.
pub fn config_candidates(cwd: &Path) -> Vec<PathBuf> {
    let mut out = vec![cwd.join(CONFIG_FILE)];
    if let Ok(dir) = app_dir() {
        out.push(dir.join(CONFIG_FILE));
    }
    out
}

/// Directories searched for prompt files: `./prompts` then `~/.md2slack/prompts`.
pub fn prompt_dirs(cwd: &Path) -> Vec<PathBuf> {
    let mut out = vec![cwd.join(PROMPTS_DIR)];
    if let Ok(dir) = app_dir() {
        out.push(dir.join(PROMPTS_DIR));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_candidates_prefer_cwd() {
        let cwd = PathBuf::from("/work/repo");
        let c = config_candidates(&cwd);
        assert_eq!(c[0], PathBuf::from("/work/repo/config.ini"));
    }

    #[test]
    fn prompt_dirs_start_local() {
        let dirs = prompt_dirs(Path::new("/tmp/x"));
        assert_eq!(dirs[0], PathBuf::from("/tmp/x/prompts"));
        if dirs.len() > 1 {
            assert!(dirs[1].ends_with(".md2slack/prompts"));
        }
    }
}
