//! Student performance tracking service: grade prediction, AI study plans
//! and the REST surface around them.

pub mod ai;
pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod models;
pub mod prediction;
pub mod scoring;
pub mod store;
pub mod study_plan;

pub use ai::{CannedGenerator, DisabledGenerator, GeminiClient, TextGenerator};
pub use auth::TokenSigner;
pub use config::AppConfig;
pub use error::AppError;
pub use http::{build_router, AppState};
pub use prediction::PredictionOrchestrator;
pub use store::{memory::MemoryStore, postgres::PgStore, Store, StoreError};
pub use study_plan::StudyPlanOrchestrator;
