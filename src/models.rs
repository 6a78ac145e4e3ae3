use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::AppError;

/// Subject recorded for predictions that are not tied to a course.
pub const GENERAL_SUBJECT: &str = "General Performance";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Grade {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(Grade::A),
            "B" => Ok(Grade::B),
            "C" => Ok(Grade::C),
            "D" => Ok(Grade::D),
            "F" => Ok(Grade::F),
            other => Err(format!("unknown grade '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(format!("unknown priority '{other}'")),
        }
    }
}

/// Goal lifecycle. Any status may move to any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GoalStatus {
    Pending,
    InProgress,
    Completed,
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalStatus::Pending => "pending",
            GoalStatus::InProgress => "in-progress",
            GoalStatus::Completed => "completed",
        }
    }
}

impl FromStr for GoalStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(GoalStatus::Pending),
            "in-progress" => Ok(GoalStatus::InProgress),
            "completed" => Ok(GoalStatus::Completed),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub roll_number: String,
    pub department: String,
    pub semester: i32,
    pub created_at: DateTime<Utc>,
}

/// Student row together with its stored credential. Never serialized.
#[derive(Debug, Clone)]
pub struct StudentCredentials {
    pub student: Student,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct NewStudent {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub roll_number: String,
    pub department: String,
    pub semester: i32,
}

/// The five academic metrics, each validated to [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricInputs {
    pub attendance: f64,
    pub assignment_score: f64,
    pub internal_marks: f64,
    pub project_marks: f64,
    pub final_exam_marks: f64,
}

/// Metrics as submitted by a client. Form clients send numbers as strings,
/// so each field is kept raw until validated.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricFields {
    pub attendance: Option<Value>,
    pub assignment_score: Option<Value>,
    pub internal_marks: Option<Value>,
    pub project_marks: Option<Value>,
    pub final_exam_marks: Option<Value>,
}

impl MetricFields {
    pub fn from_inputs(inputs: &MetricInputs) -> Self {
        Self {
            attendance: Some(Value::from(inputs.attendance)),
            assignment_score: Some(Value::from(inputs.assignment_score)),
            internal_marks: Some(Value::from(inputs.internal_marks)),
            project_marks: Some(Value::from(inputs.project_marks)),
            final_exam_marks: Some(Value::from(inputs.final_exam_marks)),
        }
    }

    pub fn validate(&self) -> Result<MetricInputs, AppError> {
        let fields = [
            ("attendance", &self.attendance),
            ("assignmentScore", &self.assignment_score),
            ("internalMarks", &self.internal_marks),
            ("projectMarks", &self.project_marks),
            ("finalExamMarks", &self.final_exam_marks),
        ];
        let missing = fields
            .iter()
            .filter(|(_, value)| is_absent(value))
            .map(|(name, _)| *name)
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(AppError::Validation(format!(
                "All performance fields are required (missing: {})",
                missing.join(", ")
            )));
        }

        let mut values = [0.0_f64; 5];
        for (slot, (name, value)) in values.iter_mut().zip(fields.iter()) {
            let number = numeric_field(value).ok_or_else(|| {
                AppError::Validation(format!("{name} must be a number"))
            })?;
            if !number.is_finite() || !(0.0..=100.0).contains(&number) {
                return Err(AppError::Validation(format!(
                    "{name} must be between 0 and 100"
                )));
            }
            *slot = number;
        }

        Ok(MetricInputs {
            attendance: values[0],
            assignment_score: values[1],
            internal_marks: values[2],
            project_marks: values[3],
            final_exam_marks: values[4],
        })
    }
}

fn is_absent(value: &Option<Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.trim().is_empty(),
        Some(_) => false,
    }
}

/// Accepts JSON numbers and numeric strings.
pub fn numeric_field(value: &Option<Value>) -> Option<f64> {
    match value.as_ref()? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceRecord {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub student_id: Uuid,
    pub subject: String,
    #[serde(flatten)]
    pub metrics: MetricInputs,
    pub predicted_grade: Grade,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPerformanceRecord {
    pub student_id: Uuid,
    pub subject: String,
    pub metrics: MetricInputs,
    pub predicted_grade: Grade,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyGoal {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub student_id: Uuid,
    pub subject: String,
    pub topic: String,
    pub deadline: NaiveDate,
    pub priority: Priority,
    pub status: GoalStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewStudyGoal {
    pub student_id: Uuid,
    pub subject: String,
    pub topic: String,
    pub deadline: NaiveDate,
    pub priority: Priority,
    pub status: GoalStatus,
}

/// Partial update for a goal; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyGoalPatch {
    pub subject: Option<String>,
    pub topic: Option<String>,
    pub deadline: Option<NaiveDate>,
    pub priority: Option<Priority>,
    pub status: Option<GoalStatus>,
}

impl StudyGoalPatch {
    pub fn is_empty(&self) -> bool {
        self.subject.is_none()
            && self.topic.is_none()
            && self.deadline.is_none()
            && self.priority.is_none()
            && self.status.is_none()
    }

    pub fn apply(&self, goal: &mut StudyGoal) {
        if let Some(subject) = &self.subject {
            goal.subject = subject.clone();
        }
        if let Some(topic) = &self.topic {
            goal.topic = topic.clone();
        }
        if let Some(deadline) = self.deadline {
            goal.deadline = deadline;
        }
        if let Some(priority) = self.priority {
            goal.priority = priority;
        }
        if let Some(status) = self.status {
            goal.status = status;
        }
    }
}

/// Which path produced a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Ai,
    Fallback,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Ai => "ai",
            Provenance::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    #[serde(rename = "predictedGrade")]
    pub grade: Grade,
    pub confidence: f64,
    #[serde(rename = "predictedValue")]
    pub predicted_value: f64,
    pub suggestions: Vec<String>,
    #[serde(skip)]
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRequest {
    pub student_id: Option<Uuid>,
    #[serde(flatten)]
    pub metrics: MetricFields,
}
