use std::path::Path;

use anyhow::Context;

use super::{Store, StoreError};
use crate::auth::hash_password;
use crate::models::{MetricInputs, NewPerformanceRecord, NewStudent};
use crate::scoring;

pub const SEED_PASSWORD: &str = "scholar-demo-2026";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub students: usize,
    pub records: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
    pub unknown_students: usize,
}

/// Inserts demo students with a spread of subject results. Students that
/// already exist are left alone along with their records.
pub async fn seed(store: &dyn Store) -> anyhow::Result<SeedSummary> {
    let students = vec![
        ("Avery Lee", "avery.lee@example.edu", "CS-2026-001", "Computer Science", 3),
        ("Jules Moreno", "jules.moreno@example.edu", "ME-2025-014", "Mechanical", 5),
        ("Kiara Patel", "kiara.patel@example.edu", "EE-2026-007", "Electrical", 2),
    ];
    let results: [(&str, [f64; 5]); 4] = [
        ("Mathematics", [82.0, 74.0, 58.0, 70.0, 48.0]),
        ("Physics", [90.0, 88.0, 79.0, 85.0, 81.0]),
        ("Chemistry", [70.0, 65.0, 55.0, 60.0, 62.0]),
        ("Data Structures", [95.0, 92.0, 88.0, 91.0, 90.0]),
    ];

    let password_hash = hash_password(SEED_PASSWORD).context("failed to hash seed password")?;
    let mut summary = SeedSummary::default();

    for (offset, (name, email, roll_number, department, semester)) in
        students.into_iter().enumerate()
    {
        let student = match store
            .create_student(NewStudent {
                name: name.to_string(),
                email: email.to_string(),
                password_hash: password_hash.clone(),
                roll_number: roll_number.to_string(),
                department: department.to_string(),
                semester,
            })
            .await
        {
            Ok(student) => student,
            Err(StoreError::Conflict(_)) => continue,
            Err(err) => return Err(err).context("failed to seed student"),
        };
        summary.students += 1;

        for (subject, values) in results.iter() {
            // Shift each student so their weak subjects differ.
            let shift = (offset as f64) * 6.0;
            let metrics = MetricInputs {
                attendance: values[0],
                assignment_score: values[1],
                internal_marks: values[2],
                project_marks: values[3],
                final_exam_marks: (values[4] + shift).min(100.0),
            };
            let (_, grade) = scoring::score(&metrics);
            store
                .insert_performance(NewPerformanceRecord {
                    student_id: student.id,
                    subject: subject.to_string(),
                    metrics,
                    predicted_grade: grade,
                })
                .await
                .context("failed to seed performance record")?;
            summary.records += 1;
        }
    }

    Ok(summary)
}

#[derive(Debug, serde::Deserialize)]
struct CsvRow {
    email: String,
    subject: String,
    attendance: f64,
    assignment_score: f64,
    internal_marks: f64,
    project_marks: f64,
    final_exam_marks: f64,
}

/// Bulk-loads performance rows keyed by student email. Rows for unknown
/// students are skipped and counted.
pub async fn import_csv(store: &dyn Store, csv_path: &Path) -> anyhow::Result<ImportSummary> {
    let reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    import_rows(store, reader).await
}

async fn import_rows<R: std::io::Read>(
    store: &dyn Store,
    mut reader: csv::Reader<R>,
) -> anyhow::Result<ImportSummary> {
    let mut summary = ImportSummary::default();

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid csv row {}", index + 1))?;
        let metrics = MetricInputs {
            attendance: row.attendance,
            assignment_score: row.assignment_score,
            internal_marks: row.internal_marks,
            project_marks: row.project_marks,
            final_exam_marks: row.final_exam_marks,
        };
        crate::models::MetricFields::from_inputs(&metrics)
            .validate()
            .map_err(|err| anyhow::anyhow!("row {}: {err}", index + 1))?;

        let email = row.email.trim().to_ascii_lowercase();
        let Some(credentials) = store.student_credentials(&email).await? else {
            summary.unknown_students += 1;
            continue;
        };

        let (_, grade) = scoring::score(&metrics);
        store
            .insert_performance(NewPerformanceRecord {
                student_id: credentials.student.id,
                subject: row.subject.trim().to_string(),
                metrics,
                predicted_grade: grade,
            })
            .await?;
        summary.inserted += 1;
    }

    Ok(summary)
}
