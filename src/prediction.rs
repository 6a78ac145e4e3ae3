use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::ai::{generate_with_timeout, strip_code_fences, AiError, TextGenerator};
use crate::error::AppError;
use crate::models::{
    Grade, MetricInputs, NewPerformanceRecord, PredictionRequest, PredictionResult, Provenance,
    GENERAL_SUBJECT,
};
use crate::scoring::{self, MAX_SUGGESTIONS};
use crate::store::Store;

/// Confidence reported for formula-based predictions.
pub const FALLBACK_CONFIDENCE: f64 = 85.0;

pub struct PredictionOrchestrator {
    generator: Arc<dyn TextGenerator>,
    store: Arc<dyn Store>,
    ai_timeout: Duration,
}

impl PredictionOrchestrator {
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

    /// Predicts a grade for the submitted metrics. Only validation failures
    /// reach the caller: AI problems fall back to the weighted formula and a
    /// failed history write is logged while the prediction is still returned.
    pub async fn predict(&self, request: &PredictionRequest) -> Result<PredictionResult, AppError> {
        let metrics = request.metrics.validate()?;

        let result = match self.ai_prediction(&metrics).await {
            Ok(result) => result,
            Err(err) => {
                warn!(error = %err, "ai prediction failed; using weighted formula");
                fallback_prediction(&metrics)
            }
        };
        info!(
            grade = %result.grade,
            provenance = result.provenance.as_str(),
            "prediction generated"
        );

        if let Some(student_id) = request.student_id {
            self.record(student_id, metrics, result.grade).await;
        }
        Ok(result)
    }

    async fn ai_prediction(&self, metrics: &MetricInputs) -> Result<PredictionResult, AiError> {
        let prompt = prediction_prompt(metrics);
        let text = generate_with_timeout(self.generator.as_ref(), &prompt, self.ai_timeout).await?;
        parse_ai_prediction(&text)
    }

    async fn record(&self, student_id: Uuid, metrics: MetricInputs, grade: Grade) {
        let record = NewPerformanceRecord {
            student_id,
            subject: GENERAL_SUBJECT.to_string(),
            metrics,
            predicted_grade: grade,
        };
        if let Err(err) = self.store.insert_performance(record).await {
            error!(
                student_id = %student_id,
                error = %err,
                "failed to persist prediction inputs"
            );
        }
    }
}

pub fn fallback_prediction(metrics: &MetricInputs) -> PredictionResult {
    let (weighted, grade) = scoring::score(metrics);
    PredictionResult {
        grade,
        confidence: FALLBACK_CONFIDENCE,
        predicted_value: weighted,
        suggestions: scoring::suggest_for(metrics),
        provenance: Provenance::Fallback,
    }
}

pub fn prediction_prompt(metrics: &MetricInputs) -> String {
    format!(
        "Act as an academic performance analyzer. Based on the following student marks, \
predict their final grade (A, B, C, D, or F), a confidence score (0-100), a weighted \
average score (0-100), and provide 3 specific, actionable suggestions for improvement.

Input Data:
- Attendance: {}%
- Assignment Score: {}%
- Internal Marks: {}%
- Project Marks: {}%
- Final Exam Marks: {}%

Provide the output purely in valid JSON format with no markdown or additional text. Structure:
{{
  \"predictedGrade\": \"Grade\",
  \"confidence\": Number,
  \"predictedValue\": Number,
  \"suggestions\": [\"Suggestion 1\", \"Suggestion 2\", \"Suggestion 3\"]
}}",
        metrics.attendance,
        metrics.assignment_score,
        metrics.internal_marks,
        metrics.project_marks,
        metrics.final_exam_marks,
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AiPrediction {
    predicted_grade: String,
    confidence: f64,
    predicted_value: f64,
    #[serde(default)]
    suggestions: Vec<String>,
}

/// Parses a model reply into a prediction. Anything that does not fit the
/// expected object is `Malformed`.
pub fn parse_ai_prediction(text: &str) -> Result<PredictionResult, AiError> {
    let cleaned = strip_code_fences(text);
    let payload: AiPrediction =
        serde_json::from_str(&cleaned).map_err(|err| AiError::Malformed(err.to_string()))?;
    let grade = payload
        .predicted_grade
        .parse::<Grade>()
        .map_err(AiError::Malformed)?;
    if !payload.confidence.is_finite() || !payload.predicted_value.is_finite() {
        return Err(AiError::Malformed("non-finite score".to_string()));
    }

    let mut suggestions: Vec<String> = payload
        .suggestions
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    suggestions.truncate(MAX_SUGGESTIONS);

    Ok(PredictionResult {
        grade,
        confidence: payload.confidence.clamp(0.0, 100.0),
        predicted_value: payload.predicted_value.clamp(0.0, 100.0),
        suggestions,
        provenance: Provenance::Ai,
    })
}
