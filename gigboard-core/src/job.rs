//! Job listings: the records the board is built around.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::fmt;

use crate::{fields_of, from_fields_of, now_millis, DocumentKind, Fields, KindError};

/// Lifecycle status shown on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum JobStatus {
    #[default]
    Open,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Open,
        JobStatus::InProgress,
        JobStatus::Completed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Open => "Open",
            JobStatus::InProgress => "In Progress",
            JobStatus::Completed => "Completed",
            JobStatus::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetType {
    #[default]
    Fixed,
    Hourly,
}

/// Categories offered by the job form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobCategory {
    Plumbing,
    Tutoring,
    Repairs,
    Cleaning,
    Moving,
    Gardening,
    Electrical,
    Painting,
    Carpentry,
    Other,
}

impl JobCategory {
    pub const ALL: [JobCategory; 10] = [
        JobCategory::Plumbing,
        JobCategory::Tutoring,
        JobCategory::Repairs,
        JobCategory::Cleaning,
        JobCategory::Moving,
        JobCategory::Gardening,
        JobCategory::Electrical,
        JobCategory::Painting,
        JobCategory::Carpentry,
        JobCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobCategory::Plumbing => "Plumbing",
            JobCategory::Tutoring => "Tutoring",
            JobCategory::Repairs => "Repairs",
            JobCategory::Cleaning => "Cleaning",
            JobCategory::Moving => "Moving",
            JobCategory::Gardening => "Gardening",
            JobCategory::Electrical => "Electrical",
            JobCategory::Painting => "Painting",
            JobCategory::Carpentry => "Carpentry",
            JobCategory::Other => "Other",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(name.trim()))
    }

    /// Comma-separated category list, as embedded in generation prompts.
    pub fn joined() -> String {
        Self::ALL
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for JobCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A local job listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub title: String,
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    /// Free-form amount; generated listings sometimes carry it as a number.
    #[serde(default, deserialize_with = "string_or_number")]
    pub budget: String,
    #[serde(default)]
    pub budget_type: BudgetType,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub status: JobStatus,
    /// Epoch milliseconds.
    #[serde(default)]
    pub created_at: i64,
}

impl Job {
    /// Fields that must be filled in before a job can be posted.
    pub const REQUIRED: [&'static str; 4] = ["title", "category", "description", "location"];

    /// Field name carrying the creation timestamp; the dashboard sorts on it.
    pub const CREATED_AT: &'static str = "createdAt";

    pub fn new(title: impl Into<String>, category: JobCategory) -> Self {
        Self {
            title: title.into(),
            category: category.as_str().to_string(),
            description: String::new(),
            location: String::new(),
            budget: String::new(),
            budget_type: BudgetType::Fixed,
            date: String::new(),
            time: String::new(),
            status: JobStatus::Open,
            created_at: now_millis(),
        }
    }

    /// Blank values for a new job form.
    pub fn form_defaults() -> Fields {
        let defaults = json!({
            "title": "",
            "category": "",
            "description": "",
            "location": "",
            "budget": "",
            "budgetType": "fixed",
            "date": "",
            "time": "",
            "status": JobStatus::Open.as_str(),
        });
        match defaults {
            Value::Object(map) => map,
            _ => Fields::new(),
        }
    }
}

impl DocumentKind for Job {
    const KIND: &'static str = "job";

    fn to_fields(&self) -> Result<Fields, KindError> {
        fields_of(Self::KIND, self)
    }

    fn from_fields(fields: &Fields) -> Result<Self, KindError> {
        from_fields_of(Self::KIND, fields)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}
