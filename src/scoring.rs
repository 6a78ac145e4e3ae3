use crate::models::{Grade, MetricInputs};

pub const ATTENDANCE_WEIGHT: f64 = 0.15;
pub const ASSIGNMENT_WEIGHT: f64 = 0.20;
pub const INTERNAL_WEIGHT: f64 = 0.25;
pub const PROJECT_WEIGHT: f64 = 0.15;
pub const FINAL_EXAM_WEIGHT: f64 = 0.25;

pub const MAX_SUGGESTIONS: usize = 3;

const ATTENDANCE_SUGGESTION: &str = "Improve attendance to ensure better engagement.";
const ASSIGNMENT_SUGGESTION: &str = "Focus on submitting higher quality assignments.";
const INTERNAL_SUGGESTION: &str = "Prepare better for internal assessments.";
const PROJECT_SUGGESTION: &str = "Put more effort into practical projects.";
const ENCOURAGEMENT: &str = "Keep up the good work! Aim for consistency.";

/// Fixed-coefficient combination of the five metrics. Inputs are not range
/// checked here.
pub fn weighted_score(metrics: &MetricInputs) -> f64 {
    metrics.attendance * ATTENDANCE_WEIGHT
        + metrics.assignment_score * ASSIGNMENT_WEIGHT
        + metrics.internal_marks * INTERNAL_WEIGHT
        + metrics.project_marks * PROJECT_WEIGHT
        + metrics.final_exam_marks * FINAL_EXAM_WEIGHT
}

pub fn grade_for(weighted: f64) -> Grade {
    match weighted {
        w if w >= 85.0 => Grade::A,
        w if w >= 70.0 => Grade::B,
        w if w >= 55.0 => Grade::C,
        w if w >= 40.0 => Grade::D,
        _ => Grade::F,
    }
}

pub fn score(metrics: &MetricInputs) -> (f64, Grade) {
    let weighted = weighted_score(metrics);
    (weighted, grade_for(weighted))
}

/// Remediation messages in fixed order, at most three. Final exam marks do
/// not contribute.
pub fn suggest(attendance: f64, assignment: f64, internal: f64, project: f64) -> Vec<String> {
    let rules = [
        (attendance < 75.0, ATTENDANCE_SUGGESTION),
        (assignment < 70.0, ASSIGNMENT_SUGGESTION),
        (internal < 60.0, INTERNAL_SUGGESTION),
        (project < 60.0, PROJECT_SUGGESTION),
    ];

    let mut suggestions: Vec<String> = rules
        .iter()
        .filter(|(triggered, _)| *triggered)
        .map(|(_, message)| message.to_string())
        .collect();

    if suggestions.is_empty() {
        suggestions.push(ENCOURAGEMENT.to_string());
    }
    suggestions.truncate(MAX_SUGGESTIONS);
    suggestions
}

pub fn suggest_for(metrics: &MetricInputs) -> Vec<String> {
    suggest(
        metrics.attendance,
        metrics.assignment_score,
        metrics.internal_marks,
        metrics.project_marks,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(values: [f64; 5]) -> MetricInputs {
        MetricInputs {
            attendance: values[0],
            assignment_score: values[1],
            internal_marks: values[2],
            project_marks: values[3],
            final_exam_marks: values[4],
        }
    }

    #[test]
    fn grade_boundaries_are_exact() {
        assert_eq!(grade_for(85.0), Grade::A);
        assert_eq!(grade_for(84.999), Grade::B);
        assert_eq!(grade_for(70.0), Grade::B);
        assert_eq!(grade_for(69.999), Grade::C);
        assert_eq!(grade_for(55.0), Grade::C);
        assert_eq!(grade_for(54.999), Grade::D);
        assert_eq!(grade_for(40.0), Grade::D);
        assert_eq!(grade_for(39.999), Grade::F);
        assert_eq!(grade_for(0.0), Grade::F);
    }

    #[test]
    fn weights_match_reference_formula() {
        let (weighted, grade) = score(&metrics([80.0, 70.0, 60.0, 75.0, 65.0]));
        let expected = 80.0 * 0.15 + 70.0 * 0.20 + 60.0 * 0.25 + 75.0 * 0.15 + 65.0 * 0.25;
        assert!((weighted - expected).abs() < 1e-9);
        assert!((weighted - 68.5).abs() < 1e-9);
        assert_eq!(grade, Grade::C);

        let (top, _) = score(&metrics([100.0; 5]));
        assert!((top - 100.0).abs() < 1e-9);
    }

    #[test]
    fn score_is_monotonic_in_each_input() {
        let steps = [0.0, 12.5, 39.0, 55.5, 70.0, 84.0, 99.0, 100.0];
        for field in 0..5 {
            for base in [0.0, 40.0, 77.0, 100.0] {
                let mut previous: Option<(f64, Grade)> = None;
                for step in steps {
                    let mut values = [base; 5];
                    values[field] = step;
                    let current = score(&metrics(values));
                    if let Some((prev_score, prev_grade)) = previous {
                        assert!(current.0 >= prev_score);
                        // Grades are ordered A < B < ... so a better grade is "less".
                        assert!(current.1 as u8 <= prev_grade as u8);
                    }
                    previous = Some(current);
                }
            }
        }
    }

    #[test]
    fn single_low_attendance_suggestion() {
        assert_eq!(
            suggest(60.0, 80.0, 80.0, 80.0),
            vec!["Improve attendance to ensure better engagement.".to_string()]
        );
    }

    #[test]
    fn encouragement_when_nothing_triggers() {
        assert_eq!(
            suggest(90.0, 90.0, 90.0, 90.0),
            vec!["Keep up the good work! Aim for consistency.".to_string()]
        );
    }

    #[test]
    fn suggestions_keep_rule_order_and_truncate() {
        assert_eq!(
            suggest(10.0, 10.0, 10.0, 10.0),
            vec![
                "Improve attendance to ensure better engagement.".to_string(),
                "Focus on submitting higher quality assignments.".to_string(),
                "Prepare better for internal assessments.".to_string(),
            ]
        );
        assert_eq!(
            suggest(90.0, 50.0, 90.0, 10.0),
            vec![
                "Focus on submitting higher quality assignments.".to_string(),
                "Put more effort into practical projects.".to_string(),
            ]
        );
    }

    #[test]
    fn thresholds_are_strict() {
        assert_eq!(suggest(75.0, 70.0, 60.0, 60.0), vec![ENCOURAGEMENT.to_string()]);
    }
}
