use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::ai::{generate_with_timeout, strip_code_fences, TextGenerator};
use crate::models::{GoalStatus, NewStudyGoal, PerformanceRecord, Priority, StudyGoal};
use crate::store::{Store, StoreError};

pub const WEAK_SUBJECT_LIMIT: usize = 3;
pub const PLAN_GOAL_COUNT: usize = 5;
pub const PLAN_HORIZON_DAYS: i64 = 14;
pub const REVIEW_DEADLINE_DAYS: i64 = 7;
pub const PRACTICE_DEADLINE_DAYS: i64 = 3;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("not enough performance data to generate a plan")]
    InsufficientData,
    #[error("failed to load performance history: {0}")]
    History(#[source] StoreError),
    #[error("ai study plan unusable: {0}")]
    Generation(String),
    #[error("saved {} goal(s) before persistence failed: {source}", .saved.len())]
    Database {
        saved: Vec<StudyGoal>,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubjectAverage {
    pub subject: String,
    pub average: f64,
    pub records: usize,
}

/// Mean final-exam marks per subject, weakest first. Ties go to the
/// alphabetically earlier subject.
pub fn rank_subjects(records: &[PerformanceRecord]) -> Vec<SubjectAverage> {
    let mut totals: HashMap<&str, (f64, usize)> = HashMap::new();
    for record in records {
        let entry = totals.entry(record.subject.as_str()).or_insert((0.0, 0));
        entry.0 += record.metrics.final_exam_marks;
        entry.1 += 1;
    }

    let mut averages: Vec<SubjectAverage> = totals
        .into_iter()
        .map(|(subject, (total, count))| SubjectAverage {
            subject: subject.to_string(),
            average: total / count as f64,
            records: count,
        })
        .collect();

    averages.sort_by(|a, b| {
        a.average
            .partial_cmp(&b.average)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.subject.cmp(&b.subject))
    });
    averages
}

pub fn weak_subjects(records: &[PerformanceRecord]) -> Vec<String> {
    rank_subjects(records)
        .into_iter()
        .take(WEAK_SUBJECT_LIMIT)
        .map(|entry| entry.subject)
        .collect()
}

pub fn plan_prompt(weak: &[String], today: NaiveDate) -> String {
    let first = today + ChronoDuration::days(1);
    let last = today + ChronoDuration::days(PLAN_HORIZON_DAYS);
    format!(
        "Create a study plan for a student who is weak in the following subjects: {subjects}.
Generate {count} specific, actionable study goals.

Output strictly in JSON format as an array of objects with this structure:
[
  {{
    \"subject\": \"Subject Name\",
    \"topic\": \"Specific Topic to Study\",
    \"deadline\": \"YYYY-MM-DD\",
    \"priority\": \"high\" or \"medium\"
  }}
]
Deadlines must fall between {first} and {last}, spread over the two weeks starting tomorrow.
Do not include any markdown formatting or explanation. Just the JSON array.",
        subjects = weak.join(", "),
        count = PLAN_GOAL_COUNT,
    )
}

#[derive(Debug, Deserialize)]
struct AiGoal {
    subject: String,
    topic: String,
    deadline: String,
    priority: String,
}

pub fn parse_deadline(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|stamp| stamp.with_timezone(&Utc).date_naive())
        })
}

/// Parses the model's goal array. Every goal must carry a usable date and
/// priority; an empty array is rejected. Deadlines are clamped into the
/// window the prompt asks for and `low` priorities are raised to `medium`.
pub fn parse_ai_goals(
    text: &str,
    student_id: Uuid,
    today: NaiveDate,
) -> Result<Vec<NewStudyGoal>, PlanError> {
    let earliest = today + ChronoDuration::days(1);
    let latest = today + ChronoDuration::days(PLAN_HORIZON_DAYS);
    let cleaned = strip_code_fences(text);
    let goals: Vec<AiGoal> = serde_json::from_str(&cleaned)
        .map_err(|err| PlanError::Generation(format!("reply is not a goal array: {err}")))?;
    if goals.is_empty() {
        return Err(PlanError::Generation("reply contained no goals".to_string()));
    }

    goals
        .into_iter()
        .map(|goal| {
            let deadline = parse_deadline(&goal.deadline).ok_or_else(|| {
                PlanError::Generation(format!("invalid deadline '{}'", goal.deadline))
            })?;
            let deadline = deadline.clamp(earliest, latest);
            let priority = match goal.priority.parse::<Priority>() {
                Ok(Priority::Low) => Priority::Medium,
                Ok(priority) => priority,
                Err(err) => return Err(PlanError::Generation(err)),
            };
            if goal.subject.trim().is_empty() || goal.topic.trim().is_empty() {
                return Err(PlanError::Generation("goal missing subject or topic".to_string()));
            }
            Ok(NewStudyGoal {
                student_id,
                subject: goal.subject.trim().to_string(),
                topic: goal.topic.trim().to_string(),
                deadline,
                priority,
                status: GoalStatus::Pending,
            })
        })
        .collect()
}

/// Template plan used when the AI provider is unavailable: a review goal per
/// weak subject plus past-paper practice for the weakest one.
pub fn fallback_goals(student_id: Uuid, weak: &[String], today: NaiveDate) -> Vec<NewStudyGoal> {
    let mut goals: Vec<NewStudyGoal> = weak
        .iter()
        .map(|subject| NewStudyGoal {
            student_id,
            subject: subject.clone(),
            topic: format!("Review core concepts of {subject}"),
            deadline: today + ChronoDuration::days(REVIEW_DEADLINE_DAYS),
            priority: Priority::Medium,
            status: GoalStatus::Pending,
        })
        .collect();

    if let Some(weakest) = weak.first() {
        goals.push(NewStudyGoal {
            student_id,
            subject: weakest.clone(),
            topic: format!("Practice past papers for {weakest}"),
            deadline: today + ChronoDuration::days(PRACTICE_DEADLINE_DAYS),
            priority: Priority::High,
            status: GoalStatus::Pending,
        });
    }
    goals
}

pub struct StudyPlanOrchestrator {
    generator: Arc<dyn TextGenerator>,
    store: Arc<dyn Store>,
    ai_timeout: Duration,
}

impl StudyPlanOrchestrator {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        store: Arc<dyn Store>,
        ai_timeout: Duration,
    ) -> Self {
        Self {
            generator,
            store,
            ai_timeout,
        }
    }

    pub async fn generate_plan(&self, student_id: Uuid) -> Result<Vec<StudyGoal>, PlanError> {
        self.generate_plan_on(student_id, Utc::now().date_naive())
            .await
    }

    /// Builds and saves a plan as of `today`. Goals come back in the order
    /// they were generated and saved.
    pub async fn generate_plan_on(
        &self,
        student_id: Uuid,
        today: NaiveDate,
    ) -> Result<Vec<StudyGoal>, PlanError> {
        let records = self
            .store
            .performance_for_student(student_id)
            .await
            .map_err(PlanError::History)?;
        let weak = weak_subjects(&records);
        if weak.is_empty() {
            return Err(PlanError::InsufficientData);
        }
        info!(
            student_id = %student_id,
            records = records.len(),
            weak_subjects = %weak.join(", "),
            "generating study plan"
        );

        let prompt = plan_prompt(&weak, today);
        let planned =
            match generate_with_timeout(self.generator.as_ref(), &prompt, self.ai_timeout).await {
                Ok(text) => parse_ai_goals(&text, student_id, today).map_err(|err| {
                    error!(
                        student_id = %student_id,
                        reply_len = text.len(),
                        error = %err,
                        "ai study plan could not be parsed"
                    );
                    err
                })?,
                Err(err) if err.is_unavailable() => {
                    warn!(
                        student_id = %student_id,
                        error = %err,
                        "ai unavailable; using template study plan"
                    );
                    fallback_goals(student_id, &weak, today)
                }
                Err(err) => return Err(PlanError::Generation(err.to_string())),
            };

        self.persist(planned).await
    }

    async fn persist(&self, planned: Vec<NewStudyGoal>) -> Result<Vec<StudyGoal>, PlanError> {
        let mut saved = Vec::with_capacity(planned.len());
        for goal in planned {
            match self.store.insert_goal(goal).await {
                Ok(goal) => saved.push(goal),
                Err(source) => return Err(PlanError::Database { saved, source }),
            }
        }
        info!(goals = saved.len(), "study plan saved");
        Ok(saved)
    }
}
