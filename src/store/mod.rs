use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    NewPerformanceRecord, NewStudent, NewStudyGoal, PerformanceRecord, Student,
    StudentCredentials, StudyGoal, StudyGoalPatch,
};

pub mod bootstrap;
pub mod memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Conflict(String),
    #[error("student {0} is not registered")]
    UnknownStudent(Uuid),
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("stored value is invalid: {0}")]
    Corrupt(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence for students, performance records and study goals. Each
/// write is a single atomic record insert or update.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fails with `Conflict` when the email or roll number is taken.
    async fn create_student(&self, new: NewStudent) -> Result<Student, StoreError>;
    async fn student_credentials(
        &self,
        email: &str,
    ) -> Result<Option<StudentCredentials>, StoreError>;
    async fn find_student(&self, id: Uuid) -> Result<Option<Student>, StoreError>;

    /// Fails with `UnknownStudent` when the owning student does not exist.
    async fn insert_performance(
        &self,
        new: NewPerformanceRecord,
    ) -> Result<PerformanceRecord, StoreError>;
    /// Newest first.
    async fn performance_for_student(
        &self,
        student_id: Uuid,
    ) -> Result<Vec<PerformanceRecord>, StoreError>;
    /// Newest first.
    async fn all_performance(&self) -> Result<Vec<PerformanceRecord>, StoreError>;

    async fn insert_goal(&self, new: NewStudyGoal) -> Result<StudyGoal, StoreError>;
    /// Sorted by deadline ascending.
    async fn goals_for_student(&self, student_id: Uuid) -> Result<Vec<StudyGoal>, StoreError>;
    async fn update_goal(
        &self,
        id: Uuid,
        patch: StudyGoalPatch,
    ) -> Result<Option<StudyGoal>, StoreError>;
    async fn delete_goal(&self, id: Uuid) -> Result<bool, StoreError>;
}
