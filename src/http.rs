use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{FromRequestParts, Path, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, Method, Request, StatusCode};
use axum::middleware::{from_fn_with_state, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::ai::TextGenerator;
use crate::auth::{hash_password, verify_password, TokenSigner};
use crate::error::AppError;
use crate::models::{
    numeric_field, GoalStatus, MetricFields, NewPerformanceRecord, NewStudent, NewStudyGoal,
    PredictionRequest, PredictionResult, Priority, StudyGoalPatch,
};
use crate::prediction::PredictionOrchestrator;
use crate::scoring;
use crate::store::Store;
use crate::study_plan::{parse_deadline, StudyPlanOrchestrator};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub predictions: Arc<PredictionOrchestrator>,
    pub plans: Arc<StudyPlanOrchestrator>,
    pub tokens: Arc<TokenSigner>,
    /// Empty means any origin.
    pub cors_allowed_origins: Arc<Vec<String>>,
}

impl AppState {
    /// Wires both orchestrators to the same store and AI capability.
    pub fn new(
        store: Arc<dyn Store>,
        generator: Arc<dyn TextGenerator>,
        tokens: TokenSigner,
        ai_timeout: Duration,
    ) -> Self {
        Self {
            predictions: Arc::new(PredictionOrchestrator::new(
                generator.clone(),
                store.clone(),
                ai_timeout,
            )),
            plans: Arc::new(StudyPlanOrchestrator::new(
                generator,
                store.clone(),
                ai_timeout,
            )),
            store,
            tokens: Arc::new(tokens),
            cors_allowed_origins: Arc::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_allowed_origins = Arc::new(origins);
        self
    }
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/students/register", post(register_handler))
        .route("/students/login", post(login_handler))
        .route("/students/profile", get(profile_handler))
        .route("/performance/add", post(add_performance_handler))
        .route("/performance", get(all_performance_handler))
        .route("/performance/", get(all_performance_handler))
        .route("/performance/:student_id", get(student_performance_handler))
        .route("/prediction/predict", post(predict_handler))
        .route("/study-goals/add", post(create_goal_handler))
        .route("/study-goals/generate", post(generate_plan_handler))
        .route("/study-goals/update/:id", put(update_goal_handler))
        .route("/study-goals/delete/:id", delete(delete_goal_handler))
        .route("/study-goals/:student_id", get(student_goals_handler));

    Router::new()
        .route("/", get(landing_handler))
        .route("/healthz", get(healthz_handler))
        .nest("/api", api)
        .layer(from_fn_with_state(state.clone(), cors_middleware))
        .layer(axum::middleware::from_fn(request_log_middleware))
        .with_state(state)
}

/// Student identity proven by a bearer token.
#[derive(Debug, Clone, Copy)]
pub struct AuthStudent(pub Uuid);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthStudent {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Not authorized, no token".to_string()))?;
        let student_id = state
            .tokens
            .verify(token)
            .map_err(|_| AppError::Unauthorized("Not authorized, token failed".to_string()))?;
        Ok(AuthStudent(student_id))
    }
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| AppError::Validation(rejection.body_text()))
}

fn path_id(path: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, AppError> {
    path.map(|Path(id)| id)
        .map_err(|_| AppError::Validation("Invalid id".to_string()))
}

fn required(value: Option<String>, field: &str) -> Result<String, AppError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation(format!("{field} is required")))
}

async fn landing_handler() -> &'static str {
    "Student Performance AI API Running"
}

async fn healthz_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub roll_number: Option<String>,
    pub department: Option<String>,
    pub semester: Option<Value>,
}

async fn register_handler(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = json_body(payload)?;
    let name = required(request.name, "name")?;
    let email = required(request.email, "email")?.to_ascii_lowercase();
    let password = request
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::Validation("password is required".to_string()))?;
    let roll_number = required(request.roll_number, "rollNumber")?;
    let department = required(request.department, "department")?;
    let semester = numeric_field(&request.semester)
        .filter(|s| s.fract() == 0.0 && *s >= 1.0 && *s <= 20.0)
        .ok_or_else(|| AppError::Validation("semester must be a whole number".to_string()))?
        as i32;

    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|err| AppError::Internal(err.to_string()))?
        .map_err(|err| AppError::Internal(err.to_string()))?;

    let student = state
        .store
        .create_student(NewStudent {
            name,
            email,
            password_hash,
            roll_number,
            department,
            semester,
        })
        .await?;
    info!(student_id = %student.id, "student registered");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Student registered successfully", "student": student })),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

async fn login_handler(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let request = json_body(payload)?;
    let (Some(email), Some(password)) = (request.email, request.password) else {
        return Err(AppError::Validation(
            "Email and password are required".to_string(),
        ));
    };
    let invalid = || AppError::Unauthorized("Invalid email or password".to_string());

    let credentials = state
        .store
        .student_credentials(&email.trim().to_ascii_lowercase())
        .await?
        .ok_or_else(invalid)?;
    let stored_hash = credentials.password_hash.clone();
    let matches = tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
        .await
        .map_err(|err| AppError::Internal(err.to_string()))?;
    if !matches {
        return Err(invalid());
    }

    let token = state
        .tokens
        .issue(credentials.student.id)
        .map_err(|err| AppError::Internal(err.to_string()))?;
    Ok(Json(json!({
        "message": "Login successful",
        "token": token,
        "student": credentials.student,
    })))
}

async fn profile_handler(
    State(state): State<AppState>,
    AuthStudent(student_id): AuthStudent,
) -> Result<Json<Value>, AppError> {
    let student = state
        .store
        .find_student(student_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Student not found".to_string()))?;
    Ok(Json(json!(student)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPerformanceRequest {
    pub student_id: Option<Uuid>,
    pub subject: Option<String>,
    #[serde(flatten)]
    pub metrics: MetricFields,
}

async fn add_performance_handler(
    State(state): State<AppState>,
    AuthStudent(auth_id): AuthStudent,
    payload: Result<Json<AddPerformanceRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = json_body(payload)?;
    let subject = required(request.subject, "subject")?;
    let metrics = request.metrics.validate()?;
    let (_, grade) = scoring::score(&metrics);

    let performance = state
        .store
        .insert_performance(NewPerformanceRecord {
            student_id: request.student_id.unwrap_or(auth_id),
            subject,
            metrics,
            predicted_grade: grade,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Performance data added successfully",
            "performance": performance,
        })),
    )
        .into_response())
}

async fn student_performance_handler(
    State(state): State<AppState>,
    _auth: AuthStudent,
    student_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Value>, AppError> {
    let student_id = path_id(student_id)?;
    let records = state.store.performance_for_student(student_id).await?;
    Ok(Json(json!(records)))
}

async fn all_performance_handler(
    State(state): State<AppState>,
    _auth: AuthStudent,
) -> Result<Json<Value>, AppError> {
    let records = state.store.all_performance().await?;
    Ok(Json(json!(records)))
}

#[derive(Serialize)]
struct PredictionResponse<'a> {
    #[serde(flatten)]
    result: &'a PredictionResult,
    message: &'static str,
}

async fn predict_handler(
    State(state): State<AppState>,
    payload: Result<Json<PredictionRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = json_body(payload)?;
    let result = state.predictions.predict(&request).await?;
    Ok(Json(PredictionResponse {
        result: &result,
        message: "Prediction generated successfully",
    })
    .into_response())
}

async fn student_goals_handler(
    State(state): State<AppState>,
    student_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Value>, AppError> {
    let student_id = path_id(student_id)?;
    let goals = state.store.goals_for_student(student_id).await?;
    Ok(Json(json!(goals)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGoalRequest {
    pub student_id: Option<Uuid>,
    pub subject: Option<String>,
    pub topic: Option<String>,
    pub deadline: Option<String>,
    pub priority: Option<String>,
}

async fn create_goal_handler(
    State(state): State<AppState>,
    payload: Result<Json<CreateGoalRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = json_body(payload)?;
    let student_id = request
        .student_id
        .ok_or_else(|| AppError::Validation("studentId is required".to_string()))?;
    let subject = required(request.subject, "subject")?;
    let topic = required(request.topic, "topic")?;
    let raw_deadline = required(request.deadline, "deadline")?;
    let deadline = parse_deadline(&raw_deadline)
        .ok_or_else(|| AppError::Validation(format!("invalid deadline '{raw_deadline}'")))?;
    let priority = match request.priority.as_deref().map(str::trim) {
        None | Some("") => Priority::Medium,
        Some(raw) => raw.parse::<Priority>().map_err(AppError::Validation)?,
    };

    let goal = state
        .store
        .insert_goal(NewStudyGoal {
            student_id,
            subject,
            topic,
            deadline,
            priority,
            status: GoalStatus::Pending,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(json!(goal))).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratePlanRequest {
    pub student_id: Option<Uuid>,
}

async fn generate_plan_handler(
    State(state): State<AppState>,
    payload: Result<Json<GeneratePlanRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = json_body(payload)?;
    let student_id = request
        .student_id
        .ok_or_else(|| AppError::Validation("studentId is required".to_string()))?;
    let goals = state.plans.generate_plan(student_id).await?;
    Ok((StatusCode::CREATED, Json(json!(goals))).into_response())
}

async fn update_goal_handler(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<StudyGoalPatch>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let id = path_id(id)?;
    let patch = json_body(payload)?;
    if patch.is_empty() {
        return Err(AppError::Validation("No fields to update".to_string()));
    }
    let goal = state
        .store
        .update_goal(id, patch)
        .await?
        .ok_or_else(|| AppError::NotFound("Goal not found".to_string()))?;
    Ok(Json(json!(goal)))
}

async fn delete_goal_handler(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Value>, AppError> {
    let id = path_id(id)?;
    if !state.store.delete_goal(id).await? {
        return Err(AppError::NotFound("Goal not found".to_string()));
    }
    Ok(Json(json!({ "message": "Goal deleted successfully" })))
}

fn allowed_origin(state: &AppState, headers: &HeaderMap) -> Option<HeaderValue> {
    let origin = headers.get("origin")?;
    if state.cors_allowed_origins.is_empty() {
        return Some(HeaderValue::from_static("*"));
    }
    let text = origin.to_str().ok()?;
    state
        .cors_allowed_origins
        .iter()
        .any(|allowed| allowed == text)
        .then(|| origin.clone())
}

async fn cors_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let origin = allowed_origin(&state, req.headers());
    if req.method() == Method::OPTIONS {
        let mut resp = StatusCode::NO_CONTENT.into_response();
        if let Some(value) = origin {
            let headers = resp.headers_mut();
            headers.insert("access-control-allow-origin", value);
            headers.insert(
                "access-control-allow-methods",
                HeaderValue::from_static("GET,POST,PUT,DELETE,OPTIONS"),
            );
            headers.insert(
                "access-control-allow-headers",
                HeaderValue::from_static("authorization,content-type"),
            );
        }
        return resp;
    }

    let mut resp = next.run(req).await;
    if let Some(value) = origin {
        resp.headers_mut()
            .insert("access-control-allow-origin", value);
    }
    resp
}

async fn request_log_middleware(req: Request<Body>, next: Next) -> Response {
    let started = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let resp = next.run(req).await;
    info!(
        method = %method,
        path = %path,
        status = resp.status().as_u16(),
        latency_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    resp
}
