// Data shapes exchanged with the Kualitee API and the request values the
// modules build from user input.

use crate::error::ValidationError;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Form key holding the root cause analysis on a defect.
pub const RCA_FIELD: &str = "custom_field_11665";

/// Kualitee returns ids sometimes as numbers, sometimes as strings. We keep
/// them as strings since they are only ever echoed back.
fn id_string<'de, D>(de: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let v = serde_json::Value::deserialize(de)?;
    Ok(value_to_string(&v))
}

pub(crate) fn value_to_string(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A test cycle as listed by `/cycle/list`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Cycle {
    #[serde(deserialize_with = "id_string", default)]
    pub id: String,
    #[serde(default)]
    pub cycle_name: String,
    #[serde(default)]
    pub status: String,
}

/// One row from `/test_case_execution/list`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct TestCase {
    #[serde(deserialize_with = "id_string", default)]
    pub testcase_id: String,
    #[serde(default)]
    pub tc_name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub summary: String,
    #[serde(deserialize_with = "id_string", default)]
    pub build_id: String,
    #[serde(deserialize_with = "id_string", default)]
    pub testscenario_id: String,
    #[serde(deserialize_with = "id_string", default)]
    pub attachments_exist: String,
    #[serde(deserialize_with = "id_string", default)]
    pub executed_by: String,
}

impl TestCase {
    pub fn has_attachment(&self) -> bool {
        self.attachments_exist == "1"
    }
}

/// Outcome recorded against a test case execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Passed,
    Failed,
    Blocked,
}

impl ExecutionStatus {
    pub const ALL: [ExecutionStatus; 3] = [
        ExecutionStatus::Passed,
        ExecutionStatus::Failed,
        ExecutionStatus::Blocked,
    ];

    /// Value the service expects in the `status` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Passed => "Passed",
            ExecutionStatus::Failed => "Failed",
            ExecutionStatus::Blocked => "Blocked",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pass" | "passed" => Ok(ExecutionStatus::Passed),
            "fail" | "failed" => Ok(ExecutionStatus::Failed),
            "block" | "blocked" => Ok(ExecutionStatus::Blocked),
            _ => Err(ValidationError::UnknownStatus(s.trim().to_string())),
        }
    }
}

/// Everything needed to record one execution result in a cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct TestCycleUpdate {
    pub cycle_id: String,
    pub tc_id: String,
    pub build_id: String,
    pub testscenario_id: String,
    pub status: ExecutionStatus,
    pub attachment: Option<PathBuf>,
}

impl TestCycleUpdate {
    pub fn new(cycle_id: &str, test_case: &TestCase, status: ExecutionStatus) -> Self {
        TestCycleUpdate {
            cycle_id: cycle_id.to_string(),
            tc_id: test_case.testcase_id.clone(),
            build_id: test_case.build_id.clone(),
            testscenario_id: test_case.testscenario_id.clone(),
            status,
            attachment: None,
        }
    }

    pub fn with_attachment(mut self, path: PathBuf) -> Self {
        self.attachment = Some(path);
        self
    }
}

/// Field changes for a single defect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefectUpdate {
    pub defect_id: String,
    pub fields: BTreeMap<String, String>,
}

impl DefectUpdate {
    pub fn new(defect_id: impl Into<String>) -> Self {
        DefectUpdate {
            defect_id: defect_id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn set(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn status(&self) -> Option<&str> {
        self.fields.get("status").map(String::as_str)
    }

    /// Merge this update over the defect's current details. The service
    /// replaces the whole record on update, so every scalar field we were
    /// given is sent back: nulls become empty strings, arrays are joined
    /// with commas and nested objects are dropped.
    pub fn merge_over(&self, details: &DefectDetails) -> BTreeMap<String, String> {
        let mut form = BTreeMap::new();
        for (key, value) in &details.0 {
            let text = match value {
                serde_json::Value::Object(_) => continue,
                serde_json::Value::Array(items) => items
                    .iter()
                    .map(value_to_string)
                    .collect::<Vec<_>>()
                    .join(","),
                other => value_to_string(other),
            };
            form.insert(key.clone(), text);
        }
        for (key, value) in &self.fields {
            form.insert(key.clone(), value.clone());
        }
        form.insert("id".into(), self.defect_id.clone());
        form.insert("defect_id".into(), self.defect_id.clone());
        form
    }
}

/// Full defect record from `/defects/details`. Kept as a raw JSON object so
/// unknown fields survive the round trip through `merge_over`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefectDetails(pub serde_json::Map<String, serde_json::Value>);

impl DefectDetails {
    /// String view of a field, `None` when absent or empty.
    pub fn field(&self, key: &str) -> Option<String> {
        self.0
            .get(key)
            .map(value_to_string)
            .filter(|s| !s.is_empty())
    }

    pub fn field_or_na(&self, key: &str) -> String {
        self.field(key).unwrap_or_else(|| "N/A".into())
    }

    /// Raw workflow status, e.g. `close`.
    pub fn status(&self) -> String {
        self.field("status").unwrap_or_default()
    }

    /// `(label, value)` pairs for custom fields with a value set.
    pub fn custom_fields(&self) -> Vec<(String, String)> {
        self.array("custom_fields")
            .iter()
            .filter_map(|f| {
                let label = f
                    .get("custom_field_label")
                    .map(value_to_string)
                    .unwrap_or_else(|| "Unknown".into());
                let value = f.get("custom_field_value").map(value_to_string)?;
                (!value.is_empty()).then_some((label, value))
            })
            .collect()
    }

    pub fn comments(&self) -> Vec<DefectComment> {
        self.array("bug_comments")
            .iter()
            .map(|c| {
                let get = |k: &str| c.get(k).map(value_to_string).unwrap_or_default();
                DefectComment {
                    date: get("date"),
                    commented_by: get("commented_by"),
                    status: get("status"),
                    comment: get("comment"),
                }
            })
            .collect()
    }

    fn array(&self, key: &str) -> &[serde_json::Value] {
        match self.0.get(key) {
            Some(serde_json::Value::Array(items)) => items,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefectComment {
    pub date: String,
    pub commented_by: String,
    pub status: String,
    pub comment: String,
}

/// Root cause options accepted by the project's RCA custom field.
pub const RCA_OPTIONS: &[&str] = &[
    "Application Issues:",
    "Code: Bug",
    "Code: Deployment Issue",
    "Code: Misalignment b/w Prod & Test Lab",
    "Code: Missed during deployment",
    "Configuration: Bug",
    "Configuration: Change",
    "Configuration: Missed",
    "Database issue",
    "Design Issue: Code Change",
    "Design Issue: Design Change",
    "Environment Issues",
    "Infra Issues",
    "Intermittent Connectivity Issues",
    "Production BAU",
    "Req. - NA / OOS",
    "Requirements: Missed",
    "Requirements: New/Change",
    "Retrofit Issue",
    "Service Request (Not Defect)",
    "Test Data: Incorrect test data provided to test team",
    "Test: Duplicate Defect",
    "Test: Incorrect test data used for test",
    "Test: Missed by E2E team",
    "Test: Test Case Error",
    "Test: Test Data issue",
    "Test: Test Device Issue",
    "Test: Test User Error",
];
