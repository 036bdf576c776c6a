use crate::task::{GroupedTask, TaskChange};
use pulldown_cmark::{html, Options, Parser};
use std::fmt::Write as _;

const NO_NEXT_ACTIONS: &str = "- Continue ongoing deliveries";

/// Render the Slack-flavoured Markdown report for one day.
pub fn render_report(
    date: &str,
    groups: &[GroupedTask],
    tasks: &[TaskChange],
    next_actions: &[String],
) -> String {
    let mut out = format!("Daily Status Report {date}\n\n**Tasks**\n");

    if groups.is_empty() {
        for task in tasks {
            out.push_str(&render_task(task));
            out.push('\n');
        }
    } else {
        for group in groups {
            let epic = group.epic.trim();
            if !epic.is_empty() && !epic.eq_ignore_ascii_case("none") {
                let _ = write!(out, "\n*Epic: {epic}*\n");
            }
            for task in group.tasks.iter().filter_map(|&i| tasks.get(i)) {
                out.push_str(&render_task(task));
                out.push('\n');
            }
        }
    }

    out.push_str("\n**Any Blockers?**\nNo\n\n");
    out.push_str("**What do you plan to do next?**\n");
    let actions: Vec<&str> = next_actions
        .iter()
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .collect();
    if actions.is_empty() {
        out.push_str(NO_NEXT_ACTIONS);
        out.push('\n');
    } else {
        for action in actions {
            let action = action.trim_start_matches(['-', '*']).trim_start();
            let _ = writeln!(out, "- {action}");
        }
    }
    out
}

fn render_task(task: &TaskChange) -> String {
    let mut out = format!(
        "- {} — **{}h Done** :check:",
        capitalize(task.task_intent.trim()),
        format_hours(task.display_hours())
    );
    for line in task.technical_why.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let line = line.strip_prefix("- ").unwrap_or(line);
        let _ = write!(out, "\n  - {line}");
    }
    if !task.commits.is_empty() {
        let _ = write!(out, "\n  - commits: `{}`", task.commits.join("`, `"));
    }
    out
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `2` for whole hours, `1.5` otherwise.
fn format_hours(h: f64) -> String {
    if h.fract() == 0.0 {
        format!("{h:.0}")
    } else {
        let s = format!("{h:.2}");
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// HTML preview of a report for the Workspace.
pub fn markdown_to_html(md: &str) -> String {
    if md.trim().is_empty() {
        return "<em>(empty)</em>".to_string();
    }
    let mut opts = Options::empty();
    opts.insert(Options::ENABLE_STRIKETHROUGH);
    opts.insert(Options::ENABLE_TABLES);
    let mut out = String::with_capacity(md.len() * 3 / 2);
    html::push_html(&mut out, Parser::new_ext(md, opts));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(intent: &str, hours: Option<f64>) -> TaskChange {
        let mut t = TaskChange::new("delivery", intent);
        t.estimated_hours = hours;
        t.technical_why = "Raised the limit\n- Added a retry".into();
        t.commits = vec!["abc12".into(), "def34".into()];
        t
    }

    #[test]
    fn report_layout() {
        let report = render_report("02-05-2026", &[], &[task("fix login", Some(2.0))], &[]);
        assert_eq!(
            report,
            "Daily Status Report 02-05-2026\n\n**Tasks**\n\
- Fix login — **2h Done** :check:\n  - Raised the limit\n  - Added a retry\n  - commits: `abc12`, `def34`\n\
\n**Any Blockers?**\nNo\n\n**What do you plan to do next?**\n- Continue ongoing deliveries\n"
        );
    }

    #[test]
    fn hours_default_and_fractions() {
        let r = render_report("d", &[], &[task("a", None), task("b", Some(1.5))], &[]);
        assert!(r.contains("- A — **1h Done**"));
        assert!(r.contains("- B — **1.5h Done**"));
    }

    #[test]
    fn groups_render_epics_and_skip_bad_indices() {
        let tasks = vec![task("one", Some(1.0)), task("two", Some(1.0))];
        let groups = vec![
            GroupedTask {
                epic: "Auth".into(),
                tasks: vec![1, 9],
                confidence: 0.9,
            },
            GroupedTask {
                epic: "none".into(),
                tasks: vec![0],
                confidence: 0.5,
            },
        ];
        let r = render_report("d", &groups, &tasks, &[]);
        assert!(r.contains("\n*Epic: Auth*\n- Two"));
        assert!(!r.contains("Epic: none"));
        assert!(r.find("- Two").unwrap() < r.find("- One").unwrap());
    }

    #[test]
    fn next_actions_replace_default_line() {
        let r = render_report("d", &[], &[], &["- Ship the API".into(), "  ".into()]);
        assert!(r.ends_with("**What do you plan to do next?**\n- Ship the API\n"));
    }

    #[test]
    fn html_preview() {
        assert_eq!(markdown_to_html("  \n"), "<em>(empty)</em>");
        let html = markdown_to_html("**Tasks**\n- item");
        assert!(html.contains("<strong>Tasks</strong>"));
        assert!(html.contains("<li>item</li>"));
    }
}
