use crate::cast;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// TaskChange
// ---------------------------------------------------------------------------

/// One line of the daily report: a unit of work synthesized from commits or
/// entered by hand.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct TaskChange {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub task_type: String,
    pub task_intent: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub details: String,
    pub scope: String,
    pub commits: Vec<String>,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub technical_why: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_historical: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_manual: bool,
}

impl TaskChange {
    pub fn new(task_type: impl Into<String>, intent: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            task_intent: intent.into(),
            ..Default::default()
        }
    }

    /// Build a task from an arbitrary JSON object, tolerating the shapes
    /// models produce (arrays for strings, strings for numbers, and so on).
    pub fn from_value(v: &Value) -> Self {
        let field = |name: &str| v.get(name).unwrap_or(&Value::Null);
        let first = |names: &[&str]| {
            names
                .iter()
                .map(|n| cast::string(field(n)))
                .find(|s| !s.is_empty())
                .unwrap_or_default()
        };

        let technical_why = match field("technical_why") {
            Value::Array(items) => items
                .iter()
                .map(cast::string)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
            Value::String(s) => s.trim().to_string(),
            other => cast::string(other),
        };

        Self {
            id: cast::string(field("id")),
            task_type: first(&["task_type", "type"]),
            task_intent: first(&["task_intent", "intent"]),
            title: cast::string(field("title")),
            details: cast::string(field("details")),
            scope: cast::string(field("scope")),
            commits: cast::string_list(field("commits")),
            confidence: cast::float(field("confidence")).unwrap_or(0.0),
            estimated_hours: cast::float(field("estimated_hours")),
            technical_why,
            is_historical: cast::boolean(field("is_historical")),
            is_manual: cast::boolean(field("is_manual")),
        }
    }

    /// Hours shown in the report: missing or non-positive estimates count as 1.
    pub fn display_hours(&self) -> f64 {
        match self.estimated_hours {
            Some(h) if h > 0.0 => h,
            _ => 1.0,
        }
    }
}

impl<'de> Deserialize<'de> for TaskChange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = Value::deserialize(deserializer)?;
        if !v.is_object() {
            return Err(serde::de::Error::custom("expected a task object"));
        }
        Ok(Self::from_value(&v))
    }
}

/// Drop tasks without an intent; historical tasks always survive.
pub fn prune_tasks(tasks: Vec<TaskChange>) -> Vec<TaskChange> {
    tasks
        .into_iter()
        .filter(|t| t.is_historical || !t.task_intent.trim().is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// Model stage outputs
// ---------------------------------------------------------------------------

/// Per-commit summary written by the model.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CommitSummary {
    pub commit: String,
    pub summary: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub area: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub impact: String,
}

impl<'de> Deserialize<'de> for CommitSummary {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = Value::deserialize(deserializer)?;
        if !v.is_object() {
            return Err(serde::de::Error::custom("expected a commit summary object"));
        }
        let s = |k: &str| v.get(k).map(cast::string).unwrap_or_default();
        Ok(Self {
            commit: s("commit"),
            summary: s("summary"),
            area: s("area"),
            impact: s("impact"),
        })
    }
}

/// Intent classification of a single commit.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CommitChange {
    pub commit: String,
    pub change_type: String,
    pub intent: String,
    pub scope: String,
    pub signals: Vec<String>,
    pub confidence: f64,
}

impl<'de> Deserialize<'de> for CommitChange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = Value::deserialize(deserializer)?;
        if !v.is_object() {
            return Err(serde::de::Error::custom("expected a commit change object"));
        }
        let get = |k: &str| v.get(k).unwrap_or(&Value::Null);
        Ok(Self {
            commit: cast::string(get("commit")),
            change_type: cast::string(get("change_type")),
            intent: cast::string(get("intent")),
            scope: cast::string(get("scope")),
            signals: cast::string_list(get("signals")),
            confidence: cast::float(get("confidence")).unwrap_or(0.0),
        })
    }
}

/// Epic grouping of task indices.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct GroupedTask {
    pub epic: String,
    pub tasks: Vec<usize>,
    pub confidence: f64,
}

impl<'de> Deserialize<'de> for GroupedTask {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = Value::deserialize(deserializer)?;
        if !v.is_object() {
            return Err(serde::de::Error::custom("expected a task group object"));
        }
        let get = |k: &str| v.get(k).unwrap_or(&Value::Null);
        Ok(Self {
            epic: cast::string(get("epic")),
            tasks: cast::int_list(get("tasks"))
                .into_iter()
                .filter_map(|i| usize::try_from(i).ok())
                .collect(),
            confidence: cast::float(get("confidence")).unwrap_or(0.0),
        })
    }
}
