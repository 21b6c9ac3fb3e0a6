//! crates/exam_core/src/scoring.rs
//!
//! Pure scoring of a finished exam attempt. Executed exactly once, at the
//! transition into the terminal phase.

use std::collections::{BTreeMap, BTreeSet};

use uuid::Uuid;

use crate::domain::{Question, ScoreReport};

/// Normalizes an answer for comparison: trimmed and case-folded.
fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Scores one attempt.
///
/// A question whose index is flagged contributes 0 regardless of the answer,
/// but its point value still counts toward `total`. For a question with an
/// options list, a numeric answer string resolves to the matching option's
/// text; a textual answer must itself be one of the options. Deterministic:
/// the same inputs always produce the same report.
pub fn score_exam(
    questions: &[Question],
    answers: &BTreeMap<Uuid, String>,
    flagged: &BTreeSet<usize>,
) -> ScoreReport {
    let mut score = 0;
    let mut total = 0;

    for (index, question) in questions.iter().enumerate() {
        let points = question.points();
        total += points;

        if flagged.contains(&index) {
            continue;
        }
        let Some(expected) = question.correct_answer.as_deref() else {
            continue;
        };
        let Some(given) = answers.get(&question.id) else {
            continue;
        };

        let expected = normalize(expected);
        let given = normalize(given);

        match question.options.as_deref() {
            Some(options) if !options.is_empty() => {
                // A numeric answer selects an option by index.
                if let Ok(option_index) = given.parse::<usize>() {
                    if option_index < options.len()
                        && normalize(&options[option_index]) == expected
                    {
                        score += points;
                    }
                } else if options.iter().any(|option| normalize(option) == given)
                    && given == expected
                {
                    score += points;
                }
            }
            _ => {
                if given == expected {
                    score += points;
                }
            }
        }
    }

    ScoreReport { score, total }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: Uuid, answer: &str, points: u32) -> Question {
        Question {
            id,
            prompt: format!("prompt for {answer}"),
            options: None,
            correct_answer: Some(answer.to_string()),
            points: Some(points),
        }
    }

    fn choice_question(id: Uuid, options: &[&str], answer: &str, points: u32) -> Question {
        Question {
            id,
            prompt: "pick one".to_string(),
            options: Some(options.iter().map(|s| s.to_string()).collect()),
            correct_answer: Some(answer.to_string()),
            points: Some(points),
        }
    }

    #[test]
    fn two_question_example() {
        let q1 = Uuid::new_v4();
        let q2 = Uuid::new_v4();
        let questions = vec![question(q1, "A", 1), question(q2, "B", 2)];
        let answers: BTreeMap<_, _> =
            [(q1, "A".to_string()), (q2, "B".to_string())].into_iter().collect();

        let report = score_exam(&questions, &answers, &BTreeSet::new());
        assert_eq!(report, ScoreReport { score: 3, total: 3 });

        // Flagging Q1 drops its point from the score but not from the total.
        let flagged: BTreeSet<_> = [0].into_iter().collect();
        let report = score_exam(&questions, &answers, &flagged);
        assert_eq!(report, ScoreReport { score: 2, total: 3 });
    }

    #[test]
    fn scoring_is_deterministic_and_idempotent() {
        let q1 = Uuid::new_v4();
        let questions = vec![question(q1, "forty-two", 3)];
        let answers: BTreeMap<_, _> = [(q1, "  Forty-Two ".to_string())].into_iter().collect();
        let flagged = BTreeSet::new();

        let first = score_exam(&questions, &answers, &flagged);
        let second = score_exam(&questions, &answers, &flagged);
        assert_eq!(first, second);
        assert_eq!(first, ScoreReport { score: 3, total: 3 });
    }

    #[test]
    fn flagged_correct_answer_scores_zero_but_counts_toward_total() {
        let q1 = Uuid::new_v4();
        let questions = vec![question(q1, "yes", 5)];
        let answers: BTreeMap<_, _> = [(q1, "yes".to_string())].into_iter().collect();
        let flagged: BTreeSet<_> = [0].into_iter().collect();

        let report = score_exam(&questions, &answers, &flagged);
        assert_eq!(report, ScoreReport { score: 0, total: 5 });
    }

    #[test]
    fn numeric_answer_resolves_to_option_text() {
        let q1 = Uuid::new_v4();
        let questions = vec![choice_question(q1, &["Red", "Green", "Blue"], "green", 2)];
        let answers: BTreeMap<_, _> = [(q1, "1".to_string())].into_iter().collect();

        let report = score_exam(&questions, &answers, &BTreeSet::new());
        assert_eq!(report, ScoreReport { score: 2, total: 2 });

        // An out-of-range index scores nothing.
        let answers: BTreeMap<_, _> = [(q1, "7".to_string())].into_iter().collect();
        let report = score_exam(&questions, &answers, &BTreeSet::new());
        assert_eq!(report, ScoreReport { score: 0, total: 2 });
    }

    #[test]
    fn textual_answer_must_be_one_of_the_options() {
        let q1 = Uuid::new_v4();
        let questions = vec![choice_question(q1, &["Red", "Green"], "green", 1)];

        let answers: BTreeMap<_, _> = [(q1, "GREEN ".to_string())].into_iter().collect();
        let report = score_exam(&questions, &answers, &BTreeSet::new());
        assert_eq!(report.score, 1);

        // Matching the expected answer with a string that is not an option
        // scores nothing for an options question.
        let questions = vec![choice_question(q1, &["Red", "Blue"], "green", 1)];
        let answers: BTreeMap<_, _> = [(q1, "green".to_string())].into_iter().collect();
        let report = score_exam(&questions, &answers, &BTreeSet::new());
        assert_eq!(report.score, 0);
    }

    #[test]
    fn missing_point_value_defaults_to_one() {
        let q1 = Uuid::new_v4();
        let questions = vec![Question {
            id: q1,
            prompt: "free text".to_string(),
            options: None,
            correct_answer: Some("ok".to_string()),
            points: None,
        }];
        let answers: BTreeMap<_, _> = [(q1, "ok".to_string())].into_iter().collect();

        let report = score_exam(&questions, &answers, &BTreeSet::new());
        assert_eq!(report, ScoreReport { score: 1, total: 1 });
    }

    #[test]
    fn unanswered_and_unkeyed_questions_score_zero() {
        let q1 = Uuid::new_v4();
        let q2 = Uuid::new_v4();
        let questions = vec![
            question(q1, "a", 1),
            Question {
                id: q2,
                prompt: "no key".to_string(),
                options: None,
                correct_answer: None,
                points: Some(4),
            },
        ];
        let answers: BTreeMap<_, _> = [(q2, "anything".to_string())].into_iter().collect();

        let report = score_exam(&questions, &answers, &BTreeSet::new());
        assert_eq!(report, ScoreReport { score: 0, total: 5 });
    }
}
