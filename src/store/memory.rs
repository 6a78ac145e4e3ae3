use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Store, StoreError};
use crate::models::{
    NewPerformanceRecord, NewStudent, NewStudyGoal, PerformanceRecord, Student,
    StudentCredentials, StudyGoal, StudyGoalPatch,
};

/// Process-local store for development and tests. Writes can be made to
/// fail on demand.
#[derive(Default)]
pub struct MemoryStore {
    pub students: Mutex<Vec<StudentCredentials>>,
    pub performance: Mutex<Vec<PerformanceRecord>>,
    pub goals: Mutex<Vec<StudyGoal>>,
    pub fail_performance_writes: AtomicBool,
    pub fail_performance_reads: AtomicBool,
    /// `Some(n)`: the next `n` goal inserts succeed, later ones fail.
    pub goal_write_budget: Mutex<Option<usize>>,
    pub performance_writes: AtomicU64,
    pub goal_writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn limit_goal_writes(&self, remaining: usize) {
        *self.goal_write_budget.lock().await = Some(remaining);
    }

    /// Mirrors the foreign keys on the Postgres record tables.
    async fn require_student(&self, student_id: Uuid) -> Result<(), StoreError> {
        let students = self.students.lock().await;
        if students.iter().any(|entry| entry.student.id == student_id) {
            Ok(())
        } else {
            Err(StoreError::UnknownStudent(student_id))
        }
    }

    /// Registers a placeholder student and returns its id.
    #[cfg(test)]
    pub(crate) async fn enroll(&self, email: &str) -> Uuid {
        self.create_student(NewStudent {
            name: "Test Student".to_string(),
            email: email.to_string(),
            password_hash: "unused".to_string(),
            roll_number: format!("ROLL-{email}"),
            department: "Testing".to_string(),
            semester: 1,
        })
        .await
        .expect("enroll student")
        .id
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_student(&self, new: NewStudent) -> Result<Student, StoreError> {
        let mut students = self.students.lock().await;
        if students.iter().any(|existing| {
            existing.student.email == new.email || existing.student.roll_number == new.roll_number
        }) {
            return Err(StoreError::Conflict(
                "Student already exists with this email or roll number".to_string(),
            ));
        }
        let student = Student {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            roll_number: new.roll_number,
            department: new.department,
            semester: new.semester,
            created_at: Utc::now(),
        };
        students.push(StudentCredentials {
            student: student.clone(),
            password_hash: new.password_hash,
        });
        Ok(student)
    }

    async fn student_credentials(
        &self,
        email: &str,
    ) -> Result<Option<StudentCredentials>, StoreError> {
        Ok(self
            .students
            .lock()
            .await
            .iter()
            .find(|entry| entry.student.email == email)
            .cloned())
    }

    async fn find_student(&self, id: Uuid) -> Result<Option<Student>, StoreError> {
        Ok(self
            .students
            .lock()
            .await
            .iter()
            .find(|entry| entry.student.id == id)
            .map(|entry| entry.student.clone()))
    }

    async fn insert_performance(
        &self,
        new: NewPerformanceRecord,
    ) -> Result<PerformanceRecord, StoreError> {
        if self.fail_performance_writes.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable(
                "performance writes disabled".to_string(),
            ));
        }
        self.require_student(new.student_id).await?;
        let record = PerformanceRecord {
            id: Uuid::new_v4(),
            student_id: new.student_id,
            subject: new.subject,
            metrics: new.metrics,
            predicted_grade: new.predicted_grade,
            created_at: Utc::now(),
        };
        self.performance.lock().await.push(record.clone());
        self.performance_writes.fetch_add(1, Ordering::Relaxed);
        Ok(record)
    }

    async fn performance_for_student(
        &self,
        student_id: Uuid,
    ) -> Result<Vec<PerformanceRecord>, StoreError> {
        if self.fail_performance_reads.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable(
                "performance reads disabled".to_string(),
            ));
        }
        Ok(self
            .performance
            .lock()
            .await
            .iter()
            .rev()
            .filter(|record| record.student_id == student_id)
            .cloned()
            .collect())
    }

    async fn all_performance(&self) -> Result<Vec<PerformanceRecord>, StoreError> {
        Ok(self.performance.lock().await.iter().rev().cloned().collect())
    }

    async fn insert_goal(&self, new: NewStudyGoal) -> Result<StudyGoal, StoreError> {
        self.require_student(new.student_id).await?;
        {
            let mut budget = self.goal_write_budget.lock().await;
            if let Some(remaining) = budget.as_mut() {
                if *remaining == 0 {
                    return Err(StoreError::Unavailable("goal writes exhausted".to_string()));
                }
                *remaining -= 1;
            }
        }
        let goal = StudyGoal {
            id: Uuid::new_v4(),
            student_id: new.student_id,
            subject: new.subject,
            topic: new.topic,
            deadline: new.deadline,
            priority: new.priority,
            status: new.status,
            created_at: Utc::now(),
        };
        self.goals.lock().await.push(goal.clone());
        self.goal_writes.fetch_add(1, Ordering::Relaxed);
        Ok(goal)
    }

    async fn goals_for_student(&self, student_id: Uuid) -> Result<Vec<StudyGoal>, StoreError> {
        let mut goals: Vec<StudyGoal> = self
            .goals
            .lock()
            .await
            .iter()
            .filter(|goal| goal.student_id == student_id)
            .cloned()
            .collect();
        goals.sort_by(|a, b| a.deadline.cmp(&b.deadline));
        Ok(goals)
    }

    async fn update_goal(
        &self,
        id: Uuid,
        patch: StudyGoalPatch,
    ) -> Result<Option<StudyGoal>, StoreError> {
        let mut goals = self.goals.lock().await;
        let Some(goal) = goals.iter_mut().find(|goal| goal.id == id) else {
            return Ok(None);
        };
        patch.apply(goal);
        Ok(Some(goal.clone()))
    }

    async fn delete_goal(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut goals = self.goals.lock().await;
        let before = goals.len();
        goals.retain(|goal| goal.id != id);
        Ok(goals.len() != before)
    }
}
