use thiserror::Error;

#[derive(Debug, Error)]
pub enum Md2SlackError {
    #[error("home directory not found: set HOME environment variable")]
    HomeNotFound,

    #[error("task_id {0} not found")]
    TaskNotFound(String),

    #[error("repo path is required")]
    RepoPathRequired,

    #[error("git {command} failed: {message}")]
    Git { command: String, message: String },

    #[error("please configure bot_token and channel_id in config.ini")]
    SlackNotConfigured,

    #[error("slack error: {0}")]
    Slack(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Md2SlackError>;
