use anyhow::Context;
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{Store, StoreError};
use crate::models::{
    MetricInputs, NewPerformanceRecord, NewStudent, NewStudyGoal, PerformanceRecord, Student,
    StudentCredentials, StudyGoal, StudyGoalPatch,
};

const STUDENT_COLUMNS: &str =
    "id, name, email, password_hash, roll_number, department, semester, created_at";
const PERFORMANCE_COLUMNS: &str = "id, student_id, subject, attendance, assignment_score, \
     internal_marks, project_marks, final_exam_marks, predicted_grade, created_at";
const GOAL_COLUMNS: &str =
    "id, student_id, subject, topic, deadline, priority, status, created_at";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("failed to connect to Postgres")?;
        Ok(Self { pool })
    }

    pub async fn init_db(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("failed to apply migrations")?;
        Ok(())
    }
}

fn student_from_row(row: &PgRow) -> Result<StudentCredentials, StoreError> {
    Ok(StudentCredentials {
        student: Student {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            roll_number: row.try_get("roll_number")?,
            department: row.try_get("department")?,
            semester: row.try_get("semester")?,
            created_at: row.try_get("created_at")?,
        },
        password_hash: row.try_get("password_hash")?,
    })
}

fn performance_from_row(row: &PgRow) -> Result<PerformanceRecord, StoreError> {
    let grade: String = row.try_get("predicted_grade")?;
    Ok(PerformanceRecord {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        subject: row.try_get("subject")?,
        metrics: MetricInputs {
            attendance: row.try_get("attendance")?,
            assignment_score: row.try_get("assignment_score")?,
            internal_marks: row.try_get("internal_marks")?,
            project_marks: row.try_get("project_marks")?,
            final_exam_marks: row.try_get("final_exam_marks")?,
        },
        predicted_grade: grade.parse().map_err(StoreError::Corrupt)?,
        created_at: row.try_get("created_at")?,
    })
}

fn goal_from_row(row: &PgRow) -> Result<StudyGoal, StoreError> {
    let priority: String = row.try_get("priority")?;
    let status: String = row.try_get("status")?;
    Ok(StudyGoal {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        subject: row.try_get("subject")?,
        topic: row.try_get("topic")?,
        deadline: row.try_get("deadline")?,
        priority: priority.parse().map_err(StoreError::Corrupt)?,
        status: status.parse().map_err(StoreError::Corrupt)?,
        created_at: row.try_get("created_at")?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

/// Both record tables reference `students`, so a foreign key failure on
/// insert means the owner is not registered.
fn owner_error(student_id: Uuid) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |err| {
        if is_foreign_key_violation(&err) {
            StoreError::UnknownStudent(student_id)
        } else {
            StoreError::Sqlx(err)
        }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_student(&self, new: NewStudent) -> Result<Student, StoreError> {
        let query = format!(
            "INSERT INTO student_performance.students \
             (id, name, email, password_hash, roll_number, department, semester) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {STUDENT_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(&new.name)
            .bind(&new.email)
            .bind(&new.password_hash)
            .bind(&new.roll_number)
            .bind(&new.department)
            .bind(new.semester)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    StoreError::Conflict(
                        "Student already exists with this email or roll number".to_string(),
                    )
                } else {
                    StoreError::Sqlx(err)
                }
            })?;
        Ok(student_from_row(&row)?.student)
    }

    async fn student_credentials(
        &self,
        email: &str,
    ) -> Result<Option<StudentCredentials>, StoreError> {
        let query =
            format!("SELECT {STUDENT_COLUMNS} FROM student_performance.students WHERE email = $1");
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(student_from_row).transpose()
    }

    async fn find_student(&self, id: Uuid) -> Result<Option<Student>, StoreError> {
        let query =
            format!("SELECT {STUDENT_COLUMNS} FROM student_performance.students WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row
            .as_ref()
            .map(student_from_row)
            .transpose()?
            .map(|credentials| credentials.student))
    }

    async fn insert_performance(
        &self,
        new: NewPerformanceRecord,
    ) -> Result<PerformanceRecord, StoreError> {
        let query = format!(
            "INSERT INTO student_performance.performance_records \
             (id, student_id, subject, attendance, assignment_score, internal_marks, \
              project_marks, final_exam_marks, predicted_grade) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {PERFORMANCE_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(new.student_id)
            .bind(&new.subject)
            .bind(new.metrics.attendance)
            .bind(new.metrics.assignment_score)
            .bind(new.metrics.internal_marks)
            .bind(new.metrics.project_marks)
            .bind(new.metrics.final_exam_marks)
            .bind(new.predicted_grade.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(owner_error(new.student_id))?;
        performance_from_row(&row)
    }

    async fn performance_for_student(
        &self,
        student_id: Uuid,
    ) -> Result<Vec<PerformanceRecord>, StoreError> {
        let query = format!(
            "SELECT {PERFORMANCE_COLUMNS} FROM student_performance.performance_records \
             WHERE student_id = $1 ORDER BY created_at DESC"
        );
        let rows = sqlx::query(&query)
            .bind(student_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(performance_from_row).collect()
    }

    async fn all_performance(&self) -> Result<Vec<PerformanceRecord>, StoreError> {
        let query = format!(
            "SELECT {PERFORMANCE_COLUMNS} FROM student_performance.performance_records \
             ORDER BY created_at DESC"
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(performance_from_row).collect()
    }

    async fn insert_goal(&self, new: NewStudyGoal) -> Result<StudyGoal, StoreError> {
        let query = format!(
            "INSERT INTO student_performance.study_goals \
             (id, student_id, subject, topic, deadline, priority, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {GOAL_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(new.student_id)
            .bind(&new.subject)
            .bind(&new.topic)
            .bind(new.deadline)
            .bind(new.priority.as_str())
            .bind(new.status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(owner_error(new.student_id))?;
        goal_from_row(&row)
    }

    async fn goals_for_student(&self, student_id: Uuid) -> Result<Vec<StudyGoal>, StoreError> {
        let query = format!(
            "SELECT {GOAL_COLUMNS} FROM student_performance.study_goals \
             WHERE student_id = $1 ORDER BY deadline ASC, created_at ASC"
        );
        let rows = sqlx::query(&query)
            .bind(student_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(goal_from_row).collect()
    }

    async fn update_goal(
        &self,
        id: Uuid,
        patch: StudyGoalPatch,
    ) -> Result<Option<StudyGoal>, StoreError> {
        let query = format!(
            "UPDATE student_performance.study_goals SET \
             subject = COALESCE($2, subject), \
             topic = COALESCE($3, topic), \
             deadline = COALESCE($4, deadline), \
             priority = COALESCE($5, priority), \
             status = COALESCE($6, status) \
             WHERE id = $1 \
             RETURNING {GOAL_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(patch.subject)
            .bind(patch.topic)
            .bind(patch.deadline)
            .bind(patch.priority.map(|p| p.as_str()))
            .bind(patch.status.map(|s| s.as_str()))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(goal_from_row).transpose()
    }

    async fn delete_goal(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM student_performance.study_goals WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
