use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use student_performance_ai::ai::AiError;
use student_performance_ai::{build_router, AppState, CannedGenerator, MemoryStore, TokenSigner};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

async fn spawn_app(generator: CannedGenerator) -> SocketAddr {
    let state = AppState::new(
        Arc::new(MemoryStore::new()),
        Arc::new(generator),
        TokenSigner::new("test-secret", 7),
        Duration::from_millis(300),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, build_router(state))
            .await
            .expect("serve");
    });
    addr
}

async fn send_raw(
    addr: SocketAddr,
    method: &str,
    path: &str,
    token: Option<&str>,
    body: Option<&Value>,
) -> (u16, String, String) {
    let mut stream = tokio::net::TcpStream::connect(addr)
        .await
        .expect("connect server");
    let mut req = format!("{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n");
    if let Some(token) = token {
        req.push_str(&format!("Authorization: Bearer {token}\r\n"));
    }
    let payload = body.map(Value::to_string).unwrap_or_default();
    if body.is_some() {
        req.push_str("Content-Type: application/json\r\n");
    }
    req.push_str(&format!("Content-Length: {}\r\n\r\n{payload}", payload.len()));
    stream
        .write_all(req.as_bytes())
        .await
        .expect("write request");
    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .await
        .expect("read response");
    let (head, body) = response
        .split_once("\r\n\r\n")
        .expect("http response must have separator");
    let status = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse::<u16>().ok())
        .expect("http status");
    (status, head.to_string(), body.to_string())
}

async fn send_json(
    addr: SocketAddr,
    method: &str,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (u16, Value) {
    let (status, _, raw) = send_raw(addr, method, path, token, body.as_ref()).await;
    let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
    (status, value)
}

fn registration(email: &str) -> Value {
    json!({
        "name": "Avery Lee",
        "email": email,
        "password": "hunter22",
        "rollNumber": format!("R-{email}"),
        "department": "Computer Science",
        "semester": "3",
    })
}

/// Registers and logs in, returning the student id and bearer token.
async fn sign_up(addr: SocketAddr, email: &str) -> (String, String) {
    let (status, body) =
        send_json(addr, "POST", "/api/students/register", None, Some(registration(email))).await;
    assert_eq!(status, 201, "{body}");
    let (status, body) = send_json(
        addr,
        "POST",
        "/api/students/login",
        None,
        Some(json!({ "email": email, "password": "hunter22" })),
    )
    .await;
    assert_eq!(status, 200, "{body}");
    let id = body["student"]["_id"].as_str().expect("id").to_string();
    let token = body["token"].as_str().expect("token").to_string();
    (id, token)
}

fn metrics(subject: &str, attendance: f64, score: f64) -> Value {
    json!({
        "subject": subject,
        "attendance": attendance,
        "assignmentScore": score,
        "internalMarks": score,
        "projectMarks": score,
        "finalExamMarks": score,
    })
}

#[tokio::test]
async fn landing_and_health_respond() {
    let addr = spawn_app(CannedGenerator::failing(AiError::NotConfigured)).await;
    let (status, _, body) = send_raw(addr, "GET", "/", None, None).await;
    assert_eq!(status, 200);
    assert!(body.contains("API Running"));

    let (status, body) = send_json(addr, "GET", "/healthz", None, None).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn register_login_and_profile_flow() {
    let addr = spawn_app(CannedGenerator::failing(AiError::NotConfigured)).await;

    let (status, body) = send_json(
        addr,
        "POST",
        "/api/students/register",
        None,
        Some(registration("avery@example.edu")),
    )
    .await;
    assert_eq!(status, 201);
    assert_eq!(body["message"], "Student registered successfully");
    assert_eq!(body["student"]["semester"], 3);
    assert!(body["student"].get("password").is_none());
    assert!(body["student"].get("passwordHash").is_none());

    let (status, body) = send_json(
        addr,
        "POST",
        "/api/students/register",
        None,
        Some(registration("avery@example.edu")),
    )
    .await;
    assert_eq!(status, 400, "duplicate email: {body}");

    let (status, body) = send_json(
        addr,
        "POST",
        "/api/students/login",
        None,
        Some(json!({ "email": "avery@example.edu", "password": "wrong" })),
    )
    .await;
    assert_eq!(status, 401);
    assert_eq!(body["message"], "Invalid email or password");

    let (status, body) = send_json(
        addr,
        "POST",
        "/api/students/login",
        None,
        Some(json!({ "email": "AVERY@example.edu", "password": "hunter22" })),
    )
    .await;
    assert_eq!(status, 200);
    let token = body["token"].as_str().expect("token").to_string();

    let (status, profile) =
        send_json(addr, "GET", "/api/students/profile", Some(&token), None).await;
    assert_eq!(status, 200);
    assert_eq!(profile["email"], "avery@example.edu");
    assert_eq!(profile["_id"], body["student"]["_id"]);
}

#[tokio::test]
async fn protected_routes_require_a_valid_token() {
    let addr = spawn_app(CannedGenerator::failing(AiError::NotConfigured)).await;

    let (status, _) = send_json(addr, "GET", "/api/students/profile", None, None).await;
    assert_eq!(status, 401);
    let (status, _) = send_json(addr, "GET", "/api/performance", Some("forged.token.sig"), None).await;
    assert_eq!(status, 401);
    let (status, _) = send_json(
        addr,
        "POST",
        "/api/performance/add",
        None,
        Some(metrics("Physics", 90.0, 90.0)),
    )
    .await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn performance_records_are_graded_and_listed() {
    let addr = spawn_app(CannedGenerator::failing(AiError::NotConfigured)).await;
    let (student_id, token) = sign_up(addr, "kiara@example.edu").await;

    let (status, body) = send_json(
        addr,
        "POST",
        "/api/performance/add",
        Some(&token),
        Some(metrics("Physics", 95.0, 92.0)),
    )
    .await;
    assert_eq!(status, 201, "{body}");
    assert_eq!(body["performance"]["predictedGrade"], "A");
    assert_eq!(body["performance"]["studentId"], student_id.as_str());

    let (status, body) = send_json(
        addr,
        "POST",
        "/api/performance/add",
        Some(&token),
        Some(json!({ "subject": "Physics", "attendance": 80 })),
    )
    .await;
    assert_eq!(status, 400);
    assert!(body["message"].as_str().expect("message").contains("required"));

    let (status, body) = send_json(
        addr,
        "POST",
        "/api/performance/add",
        Some(&token),
        Some(metrics("Physics", 120.0, 50.0)),
    )
    .await;
    assert_eq!(status, 400, "{body}");

    let (status, list) = send_json(
        addr,
        "GET",
        &format!("/api/performance/{student_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(list.as_array().expect("array").len(), 1);

    let (status, _) = send_json(addr, "GET", "/api/performance/not-a-uuid", Some(&token), None).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn prediction_falls_back_when_ai_is_unavailable() {
    let addr = spawn_app(CannedGenerator::failing(AiError::RateLimited { status: 429 })).await;
    let (status, body) = send_json(
        addr,
        "POST",
        "/api/prediction/predict",
        None,
        Some(json!({
            "attendance": "80",
            "assignmentScore": 70,
            "internalMarks": 60,
            "projectMarks": 75,
            "finalExamMarks": 65,
        })),
    )
    .await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["predictedGrade"], "C");
    assert_eq!(body["confidence"], 85.0);
    let predicted = body["predictedValue"].as_f64().expect("number");
    assert!((predicted - 68.5).abs() < 1e-9);
    assert_eq!(body["message"], "Prediction generated successfully");
    assert!(body.get("provenance").is_none());
    assert!(body["suggestions"].as_array().expect("array").len() <= 3);

    let (status, _) = send_json(
        addr,
        "POST",
        "/api/prediction/predict",
        None,
        Some(json!({ "attendance": 80 })),
    )
    .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn study_plan_generation_uses_fallback_goals() {
    let addr = spawn_app(CannedGenerator::failing(AiError::Unavailable(
        "status 503".to_string(),
    )))
    .await;
    let (student_id, token) = sign_up(addr, "jules@example.edu").await;

    let (status, body) = send_json(
        addr,
        "POST",
        "/api/study-goals/generate",
        None,
        Some(json!({ "studentId": student_id })),
    )
    .await;
    assert_eq!(status, 400, "no history yet: {body}");

    for (subject, score) in [("Math", 40.0), ("Physics", 55.0), ("Chemistry", 70.0), ("Art", 95.0)] {
        let (status, _) = send_json(
            addr,
            "POST",
            "/api/performance/add",
            Some(&token),
            Some(metrics(subject, 90.0, score)),
        )
        .await;
        assert_eq!(status, 201);
    }

    let (status, goals) = send_json(
        addr,
        "POST",
        "/api/study-goals/generate",
        None,
        Some(json!({ "studentId": student_id })),
    )
    .await;
    assert_eq!(status, 201, "{goals}");
    let goals = goals.as_array().expect("array");
    assert_eq!(goals.len(), 4);
    let subjects: Vec<&str> = goals
        .iter()
        .map(|goal| goal["subject"].as_str().expect("subject"))
        .collect();
    assert!(!subjects.contains(&"Art"));
    assert!(goals.iter().all(|goal| goal["status"] == "pending"));

    let (status, listed) = send_json(
        addr,
        "GET",
        &format!("/api/study-goals/{student_id}"),
        None,
        None,
    )
    .await;
    assert_eq!(status, 200);
    let listed = listed.as_array().expect("array");
    assert_eq!(listed.len(), 4);
    assert_eq!(listed[0]["subject"], "Math");
    assert_eq!(listed[0]["priority"], "high");
}

#[tokio::test]
async fn goal_crud_round_trip() {
    let addr = spawn_app(CannedGenerator::failing(AiError::NotConfigured)).await;
    let (student_id, _) = sign_up(addr, "mina@example.edu").await;

    let (status, goal) = send_json(
        addr,
        "POST",
        "/api/study-goals/add",
        None,
        Some(json!({
            "studentId": student_id,
            "subject": "Math",
            "topic": "Integrals",
            "deadline": "2030-05-01",
        })),
    )
    .await;
    assert_eq!(status, 201, "{goal}");
    assert_eq!(goal["priority"], "medium");
    assert_eq!(goal["status"], "pending");
    let goal_id = goal["_id"].as_str().expect("id").to_string();

    let (status, updated) = send_json(
        addr,
        "PUT",
        &format!("/api/study-goals/update/{goal_id}"),
        None,
        Some(json!({ "status": "in-progress" })),
    )
    .await;
    assert_eq!(status, 200, "{updated}");
    assert_eq!(updated["status"], "in-progress");
    assert_eq!(updated["topic"], "Integrals");

    let (status, _) = send_json(
        addr,
        "PUT",
        &format!("/api/study-goals/update/{goal_id}"),
        None,
        Some(json!({ "status": "abandoned" })),
    )
    .await;
    assert_eq!(status, 400);

    let (status, body) = send_json(
        addr,
        "DELETE",
        &format!("/api/study-goals/delete/{goal_id}"),
        None,
        None,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Goal deleted successfully");

    let (status, _) = send_json(
        addr,
        "DELETE",
        &format!("/api/study-goals/delete/{goal_id}"),
        None,
        None,
    )
    .await;
    assert_eq!(status, 404);

    let (status, _) = send_json(
        addr,
        "PUT",
        &format!("/api/study-goals/update/{goal_id}"),
        None,
        Some(json!({ "status": "completed" })),
    )
    .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn cors_preflight_is_answered() {
    let addr = spawn_app(CannedGenerator::failing(AiError::NotConfigured)).await;
    let mut stream = tokio::net::TcpStream::connect(addr)
        .await
        .expect("connect server");
    let req = format!(
        "OPTIONS /api/students/login HTTP/1.1\r\nHost: {addr}\r\nOrigin: http://localhost:5173\r\n\
         Access-Control-Request-Method: POST\r\nConnection: close\r\n\r\n"
    );
    stream.write_all(req.as_bytes()).await.expect("write request");
    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .await
        .expect("read response");
    assert!(response.starts_with("HTTP/1.1 204"));
    assert!(response
        .to_ascii_lowercase()
        .contains("access-control-allow-origin: *"));
}

#[tokio::test]
async fn records_for_unregistered_students_are_not_found() {
    let addr = spawn_app(CannedGenerator::failing(AiError::NotConfigured)).await;
    let (_, token) = sign_up(addr, "noor@example.edu").await;
    let stranger = "6f1c2b1e-8d4a-4f6e-9c55-0f3a3c9b7e21";

    let (status, body) = send_json(
        addr,
        "POST",
        "/api/study-goals/add",
        None,
        Some(json!({
            "studentId": stranger,
            "subject": "Math",
            "topic": "Integrals",
            "deadline": "2030-05-01",
        })),
    )
    .await;
    assert_eq!(status, 404, "{body}");
    assert_eq!(body["message"], "Student not found");

    let mut record = metrics("Physics", 90.0, 90.0);
    record["studentId"] = json!(stranger);
    let (status, body) =
        send_json(addr, "POST", "/api/performance/add", Some(&token), Some(record)).await;
    assert_eq!(status, 404, "{body}");

    let (status, goals) = send_json(
        addr,
        "GET",
        &format!("/api/study-goals/{stranger}"),
        None,
        None,
    )
    .await;
    assert_eq!(status, 200);
    assert!(goals.as_array().expect("array").is_empty());
}
