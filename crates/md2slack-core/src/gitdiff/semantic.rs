use super::parser::DiffFile;
use crate::hints::DETECTORS;
use serde::{Deserialize, Serialize};

pub const SIGNAL_NEW_FILE: &str = "new_file";
pub const SIGNAL_TEST_ADDED: &str = "test_added";
pub const SIGNAL_TEST_MODIFIED: &str = "test_modified";

/// Signal types and hints observed in one file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Signal {
    pub file: String,
    pub types: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<String>,
}

/// Signals of one commit grouped by domain key.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SemanticChange {
    pub commit: String,
    pub signals: Vec<Signal>,
    pub files_touched: usize,
    pub touches_tests: bool,
}

/// All signals of one commit, flattened.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CommitSemantic {
    pub commit: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signals: Vec<Signal>,
    pub files_touched: usize,
    pub touches_tests: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CommitDiff {
    pub commit: String,
    pub diff: String,
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

pub fn extract_signals(file: &DiffFile) -> Signal {
    let mut signal = Signal {
        file: file.path.clone(),
        ..Default::default()
    };

    if file.is_new {
        push_unique(&mut signal.types, SIGNAL_NEW_FILE);
    }
    if file.is_test {
        let t = if file.is_new {
            SIGNAL_TEST_ADDED
        } else {
            SIGNAL_TEST_MODIFIED
        };
        push_unique(&mut signal.types, t);
    }

    for line in &file.additions {
        for detector in DETECTORS {
            if let Some((ty, hint)) = detector.detect(line, &file.path) {
                push_unique(&mut signal.types, ty);
                push_unique(&mut signal.hints, hint);
            }
        }
    }
    signal
}

/// Coarse area of a path: its parent directory name once nested deep enough.
pub fn domain_key(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() > 2 {
        parts[parts.len() - 2].to_string()
    } else {
        path.to_string()
    }
}

fn is_test_signal(signal: &Signal) -> bool {
    signal
        .types
        .iter()
        .any(|t| t == SIGNAL_TEST_ADDED || t == SIGNAL_TEST_MODIFIED)
}

/// Group per-file signals by domain key, preserving first-seen order.
pub fn group_signals(hash: &str, signals: &[Signal]) -> Vec<SemanticChange> {
    let mut keys: Vec<String> = Vec::new();
    let mut groups: Vec<SemanticChange> = Vec::new();

    for signal in signals.iter().filter(|s| !s.types.is_empty()) {
        let key = domain_key(&signal.file);
        let idx = match keys.iter().position(|k| *k == key) {
            Some(i) => i,
            None => {
                keys.push(key);
                groups.push(SemanticChange {
                    commit: hash.to_string(),
                    ..Default::default()
                });
                groups.len() - 1
            }
        };
        let group = &mut groups[idx];
        group.signals.push(signal.clone());
        group.files_touched += 1;
        if is_test_signal(signal) {
            group.touches_tests = true;
        }
    }
    groups
}

/// Flatten a commit's file signals into one summary record.
pub fn commit_semantic(hash: &str, signals: &[Signal]) -> CommitSemantic {
    let kept: Vec<Signal> = signals
        .iter()
        .filter(|s| !s.types.is_empty())
        .cloned()
        .collect();
    CommitSemantic {
        commit: hash.to_string(),
        files_touched: signals.len(),
        touches_tests: kept.iter().any(is_test_signal),
        signals: kept,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, new: bool, adds: &[&str]) -> DiffFile {
        DiffFile {
            path: path.into(),
            is_new: new,
            is_test: super::super::parser::is_test_file(path),
            additions: adds.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn new_test_file_signals() {
        let s = extract_signals(&file("src/a.test.ts", true, &[]));
        assert_eq!(s.types, vec!["new_file", "test_added"]);
        assert!(s.hints.is_empty());
    }

    #[test]
    fn detector_hits_are_deduplicated() {
        let s = extract_signals(&file(
            "src/api/handler.ts",
            false,
            &["try {", "} catch (e) {", "if err != nil {"],
        ));
        assert_eq!(s.types.iter().filter(|t| *t == "error_handling").count(), 1);
        assert_eq!(
            s.hints.iter().filter(|h| *h == "guarded failure path").count(),
            1
        );
        assert!(s.types.contains(&"logic_change".to_string()));
    }

    #[test]
    fn domain_key_uses_parent_when_nested() {
        assert_eq!(domain_key("src/auth/login.ts"), "auth");
        assert_eq!(domain_key("src/main.rs"), "src/main.rs");
        assert_eq!(domain_key("README.md"), "README.md");
    }

    #[test]
    fn grouping_counts_files_per_domain() {
        let signals = vec![
            extract_signals(&file("src/auth/login.ts", false, &["return x"])),
            extract_signals(&file("src/auth/login.test.ts", false, &[])),
            extract_signals(&file("src/db/pool.ts", false, &["return y"])),
            Signal {
                file: "docs/x/readme.md".into(),
                ..Default::default()
            },
        ];
        let groups = group_signals("abcde", &signals);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].files_touched, 2);
        assert!(groups[0].touches_tests);
        assert!(!groups[1].touches_tests);
        assert_eq!(groups[1].commit, "abcde");
    }

    #[test]
    fn commit_semantic_skips_untyped_signals() {
        let signals = vec![
            Signal {
                file: "a".into(),
                ..Default::default()
            },
            extract_signals(&file("t/x.test.ts", true, &[])),
        ];
        let sem = commit_semantic("abc", &signals);
        assert_eq!(sem.files_touched, 2);
        assert_eq!(sem.signals.len(), 1);
        assert!(sem.touches_tests);
    }
}
