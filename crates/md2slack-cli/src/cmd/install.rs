use anyhow::{Context, Result};
use md2slack_core::paths;
use std::path::{Path, PathBuf};

/// Link `~/.md2slack` to the current directory so its `config.ini`,
/// `prompts/` and binary are picked up from anywhere.
pub fn run() -> Result<()> {
    println!("Installing in user mode (no sudo required)...");
    let home = paths::home_dir()?;
    let cwd = std::env::current_dir().context("determining current directory")?;
    let source = std::fs::canonicalize(&cwd).unwrap_or(cwd);

    let link = link_app_dir(&home, &source)?;
    println!("Linked {} -> {}", link.display(), source.display());

    println!("\nInstallation successful!");
    println!("Please add the following to your ~/.bashrc or ~/.zshrc:\n");
    println!("export PATH=$PATH:$HOME/{}\n", paths::APP_DIR);
    println!("Then run: source ~/.bashrc");
    Ok(())
}

/// Point `home/.md2slack` at `source`. An old link is replaced; a real
/// directory is moved aside to `.md2slack.bak`.
pub fn link_app_dir(home: &Path, source: &Path) -> Result<PathBuf> {
    let link = home.join(paths::APP_DIR);

    if let Ok(meta) = std::fs::symlink_metadata(&link) {
        if meta.file_type().is_symlink() {
            println!("Removing existing ~/{} symlink...", paths::APP_DIR);
            std::fs::remove_file(&link)
                .with_context(|| format!("removing {}", link.display()))?;
        } else if meta.is_dir() {
            let backup = home.join(format!("{}.bak", paths::APP_DIR));
            println!(
                "Backing up existing ~/{0} directory to ~/{0}.bak",
                paths::APP_DIR
            );
            std::fs::rename(&link, &backup)
                .with_context(|| format!("moving {} aside", link.display()))?;
        }
    }

    symlink_dir(source, &link).with_context(|| format!("linking {}", link.display()))?;
    Ok(link)
}

#[cfg(unix)]
fn symlink_dir(source: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(source, link)
}

#[cfg(windows)]
fn symlink_dir(source: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(source, link)
}
