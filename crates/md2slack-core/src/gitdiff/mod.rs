//! Day-of-work facts pulled from `git log -p`: commits, per-file semantic
//! signals, and the small git queries the Workspace needs.

mod facts;
mod parser;
mod semantic;

pub use facts::{
    facts_from_log, generate_facts, git_date, git_graph, git_user_name, is_git_repo, log_authors,
    recent_commit_days, repo_name_at, GitFacts, GraphCommit,
};
pub use parser::{is_test_file, parse_git_log, split_commits, Commit, CommitChunk, DiffFile};
pub use semantic::{
    commit_semantic, domain_key, extract_signals, group_signals, CommitDiff, CommitSemantic,
    SemanticChange, Signal,
};
