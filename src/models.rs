//! Task entity and API payloads.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TaskError};

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident, $label:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = TaskError;

            fn from_str(value: &str) -> Result<Self> {
                match value {
                    $($text => Ok($name::$variant),)+
                    other => Err(TaskError::InvalidInput(format!(
                        "invalid {} '{}'; expected one of {}",
                        $label,
                        other,
                        $name::ALL.iter().map(|v| v.as_str()).collect::<Vec<_>>().join(", ")
                    ))),
                }
            }
        }
    };
}

text_enum!(
    /// Supported task states.
    TaskStatus, "status", {
        Open => "open",
        InProgress => "in_progress",
        Blocked => "blocked",
        Completed => "completed",
        Closed => "closed",
    }
);

text_enum!(
    /// Supported task priorities.
    TaskPriority, "priority", {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
);

text_enum!(
    /// Supported task categories.
    TaskType, "task_type", {
        Feature => "feature",
        Bug => "bug",
        Improvement => "improvement",
        Research => "research",
        Chore => "chore",
    }
);

impl TaskStatus {
    /// Completed and closed tasks carry a `closed_at`.
    pub fn is_finished(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Closed)
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Open
    }
}

/// A stored task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub team_name: String,
    pub member_name: String,
    pub task_title: String,
    pub task_type: TaskType,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
    pub source_tool: String,
    pub cycle_time: Option<f64>,
}

impl TaskRecord {
    /// Keep `closed_at` consistent with `status`.
    fn reconcile_closed_at(&mut self, now: DateTime<Utc>) {
        if self.status.is_finished() {
            self.closed_at = Some(self.closed_at.unwrap_or(now));
        } else {
            self.closed_at = None;
        }
    }
}

/// Payload used to create a task.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskCreate {
    #[serde(default)]
    pub task_id: Option<String>,
    pub team_name: String,
    pub member_name: String,
    pub task_title: String,
    pub task_type: TaskType,
    pub priority: TaskPriority,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, deserialize_with = "timestamp::deserialize_option")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp::deserialize_option")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp::deserialize_option")]
    pub last_updated: Option<DateTime<Utc>>,
    pub source_tool: String,
    #[serde(default)]
    pub cycle_time: Option<f64>,
}

impl TaskCreate {
    pub fn validate(&self) -> Result<()> {
        require_text("team_name", &self.team_name)?;
        require_text("member_name", &self.member_name)?;
        require_text("task_title", &self.task_title)?;
        require_text("source_tool", &self.source_tool)?;
        if let Some(task_id) = &self.task_id {
            require_text("task_id", task_id)?;
        }
        check_cycle_time(self.cycle_time)
    }

    /// Resolve defaults into the record to insert.
    pub fn into_record(self, now: DateTime<Utc>) -> Result<TaskRecord> {
        self.validate()?;

        let mut record = TaskRecord {
            task_id: self
                .task_id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            team_name: self.team_name,
            member_name: self.member_name,
            task_title: self.task_title,
            task_type: self.task_type,
            priority: self.priority,
            status: self.status,
            created_at: self.created_at.unwrap_or(now),
            closed_at: self.closed_at,
            last_updated: self.last_updated.unwrap_or(now),
            source_tool: self.source_tool,
            cycle_time: self.cycle_time,
        };
        record.reconcile_closed_at(now);
        Ok(record)
    }
}

/// Payload used to partially update a task. Absent fields are untouched;
/// `closed_at` and `cycle_time` may be explicitly set to null.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskUpdate {
    pub team_name: Option<String>,
    pub member_name: Option<String>,
    pub task_title: Option<String>,
    pub task_type: Option<TaskType>,
    pub priority: Option<TaskPriority>,
    pub status: Option<TaskStatus>,
    #[serde(default, deserialize_with = "timestamp::deserialize_option")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp::deserialize_patch")]
    pub closed_at: Option<Option<DateTime<Utc>>>,
    pub source_tool: Option<String>,
    #[serde(default, deserialize_with = "deserialize_patch")]
    pub cycle_time: Option<Option<f64>>,
}

impl TaskUpdate {
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("team_name", &self.team_name),
            ("member_name", &self.member_name),
            ("task_title", &self.task_title),
            ("source_tool", &self.source_tool),
        ] {
            if let Some(value) = value {
                require_text(field, value)?;
            }
        }
        check_cycle_time(self.cycle_time.flatten())
    }

    /// Apply the patch, then re-derive `closed_at` and stamp `last_updated`.
    pub fn apply_to(self, record: &mut TaskRecord, now: DateTime<Utc>) -> Result<()> {
        self.validate()?;

        if let Some(team_name) = self.team_name {
            record.team_name = team_name;
        }
        if let Some(member_name) = self.member_name {
            record.member_name = member_name;
        }
        if let Some(task_title) = self.task_title {
            record.task_title = task_title;
        }
        if let Some(task_type) = self.task_type {
            record.task_type = task_type;
        }
        if let Some(priority) = self.priority {
            record.priority = priority;
        }
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(created_at) = self.created_at {
            record.created_at = created_at;
        }
        if let Some(closed_at) = self.closed_at {
            record.closed_at = closed_at;
        }
        if let Some(source_tool) = self.source_tool {
            record.source_tool = source_tool;
        }
        if let Some(cycle_time) = self.cycle_time {
            record.cycle_time = cycle_time;
        }

        record.reconcile_closed_at(now);
        record.last_updated = now;
        Ok(())
    }
}

/// Filters accepted by the task listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub team_name: Option<String>,
    pub member_name: Option<String>,
    pub priority: Option<TaskPriority>,
    pub task_type: Option<TaskType>,
    pub source_tool: Option<String>,
}

impl TaskFilter {
    /// Build from decoded query-string pairs; empty values are ignored.
    pub fn from_query(params: &HashMap<String, String>) -> Result<Self> {
        let value = |key: &str| {
            params
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Ok(Self {
            status: value("status").map(|v| v.parse()).transpose()?,
            team_name: value("team_name"),
            member_name: value("member_name"),
            priority: value("priority").map(|v| v.parse()).transpose()?,
            task_type: value("task_type").map(|v| v.parse()).transpose()?,
            source_tool: value("source_tool"),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

impl HealthCheck {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: Utc::now(),
        }
    }
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(TaskError::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn check_cycle_time(cycle_time: Option<f64>) -> Result<()> {
    match cycle_time {
        Some(days) if !days.is_finite() || days < 0.0 => Err(TaskError::InvalidInput(
            "cycle_time must be a non-negative number of days".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Distinguishes an explicit `null` (`Some(None)`) from an absent field (`None`).
fn deserialize_patch<'de, T, D>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Timestamps with an offset, or naive ones read as UTC.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{de, Deserialize, Deserializer};

    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];

    pub fn parse(value: &str) -> Option<DateTime<Utc>> {
        let value = value.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Some(dt.with_timezone(&Utc));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
            .map(|naive| naive.and_utc())
    }

    pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp '{}'", raw))))
            .transpose()
    }

    pub fn deserialize_patch<'de, D>(deserializer: D) -> Result<Option<Option<DateTime<Utc>>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserialize_option(deserializer).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 15, 0, 0).unwrap()
    }

    fn create_payload(extra: serde_json::Value) -> TaskCreate {
        let mut body = serde_json::json!({
            "team_name": "Platform",
            "member_name": "Emma",
            "task_title": "Upgrade ingestion workers",
            "task_type": "feature",
            "priority": "critical",
            "source_tool": "Github"
        });
        if let (Some(body), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
            body.extend(extra.clone());
        }
        serde_json::from_value(body).unwrap()
    }

    fn stored(status: TaskStatus, closed_at: Option<DateTime<Utc>>) -> TaskRecord {
        TaskRecord {
            task_id: "T-1001".to_string(),
            team_name: "Pulse Analytics".to_string(),
            member_name: "Alice".to_string(),
            task_title: "Add trend graph smoothing".to_string(),
            task_type: TaskType::Feature,
            priority: TaskPriority::High,
            status,
            created_at: now() - Duration::days(7),
            closed_at,
            last_updated: now() - Duration::days(1),
            source_tool: "Linear".to_string(),
            cycle_time: Some(3.5),
        }
    }

    #[test]
    fn create_fills_defaults() {
        let record = create_payload(serde_json::json!({})).into_record(now()).unwrap();
        assert_eq!(record.status, TaskStatus::Open);
        assert_eq!(record.created_at, now());
        assert_eq!(record.last_updated, now());
        assert_eq!(record.closed_at, None);
        assert!(uuid::Uuid::parse_str(&record.task_id).is_ok());
    }

    #[test]
    fn create_closes_finished_tasks() {
        let record = create_payload(serde_json::json!({"status": "completed"}))
            .into_record(now())
            .unwrap();
        assert_eq!(record.closed_at, Some(now()));
    }

    #[test]
    fn create_clears_closed_at_for_open_tasks() {
        let record = create_payload(serde_json::json!({
            "status": "blocked",
            "closed_at": "2025-03-01T10:00:00Z"
        }))
        .into_record(now())
        .unwrap();
        assert_eq!(record.closed_at, None);
    }

    #[test]
    fn create_reads_naive_timestamps_as_utc() {
        let record = create_payload(serde_json::json!({
            "task_id": "T-2001",
            "created_at": "2025-03-01 09:30"
        }))
        .into_record(now())
        .unwrap();
        assert_eq!(record.task_id, "T-2001");
        assert_eq!(record.created_at, Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap());
    }

    #[test]
    fn create_rejects_blank_text_and_negative_cycle_time() {
        let blank = create_payload(serde_json::json!({"team_name": "  "}));
        assert!(matches!(blank.into_record(now()), Err(TaskError::InvalidInput(_))));

        let negative = create_payload(serde_json::json!({"cycle_time": -1.0}));
        assert!(matches!(negative.into_record(now()), Err(TaskError::InvalidInput(_))));
    }

    #[test]
    fn unknown_enum_value_fails_to_deserialize() {
        let body = serde_json::json!({
            "team_name": "Platform", "member_name": "Emma", "task_title": "x",
            "task_type": "epic", "priority": "high", "source_tool": "Jira"
        });
        assert!(serde_json::from_value::<TaskCreate>(body).is_err());
    }

    #[test]
    fn update_keeps_absent_fields_and_stamps_last_updated() {
        let mut record = stored(TaskStatus::InProgress, None);
        let patch: TaskUpdate = serde_json::from_value(serde_json::json!({"priority": "low"})).unwrap();
        patch.apply_to(&mut record, now()).unwrap();

        assert_eq!(record.priority, TaskPriority::Low);
        assert_eq!(record.team_name, "Pulse Analytics");
        assert_eq!(record.cycle_time, Some(3.5));
        assert_eq!(record.last_updated, now());
    }

    #[test]
    fn update_to_finished_status_sets_closed_at_once() {
        let mut record = stored(TaskStatus::InProgress, None);
        let patch: TaskUpdate = serde_json::from_value(serde_json::json!({"status": "closed"})).unwrap();
        patch.apply_to(&mut record, now()).unwrap();
        assert_eq!(record.closed_at, Some(now()));

        let earlier = now() - Duration::hours(3);
        let mut record = stored(TaskStatus::Completed, Some(earlier));
        TaskUpdate::default().apply_to(&mut record, now()).unwrap();
        assert_eq!(record.closed_at, Some(earlier));
    }

    #[test]
    fn reopening_clears_closed_at() {
        let mut record = stored(TaskStatus::Closed, Some(now() - Duration::days(1)));
        let patch: TaskUpdate = serde_json::from_value(serde_json::json!({"status": "open"})).unwrap();
        patch.apply_to(&mut record, now()).unwrap();
        assert_eq!(record.closed_at, None);
    }

    #[test]
    fn explicit_null_clears_cycle_time() {
        let patch: TaskUpdate = serde_json::from_value(serde_json::json!({"cycle_time": null})).unwrap();
        assert_eq!(patch.cycle_time, Some(None));
        let absent: TaskUpdate = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(absent.cycle_time, None);

        let mut record = stored(TaskStatus::Open, None);
        patch.apply_to(&mut record, now()).unwrap();
        assert_eq!(record.cycle_time, None);
    }

    #[test]
    fn filter_parses_enums_and_skips_blank_values() {
        let params: HashMap<String, String> = [
            ("status", "in_progress"),
            ("priority", "high"),
            ("team_name", "pulse"),
            ("member_name", " "),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let filter = TaskFilter::from_query(&params).unwrap();
        assert_eq!(filter.status, Some(TaskStatus::InProgress));
        assert_eq!(filter.priority, Some(TaskPriority::High));
        assert_eq!(filter.team_name.as_deref(), Some("pulse"));
        assert_eq!(filter.member_name, None);
    }

    #[test]
    fn filter_rejects_unknown_status() {
        let params = HashMap::from([("status".to_string(), "done".to_string())]);
        let err = TaskFilter::from_query(&params).unwrap_err();
        assert!(err.to_string().contains("expected one of open, in_progress, blocked, completed, closed"));
    }
}
