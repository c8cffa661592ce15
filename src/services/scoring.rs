use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::db::models::{Answer, Attempt, Question};
use crate::repositories::{AnswerRepository, CatalogRepository};
use crate::services::ServiceResult;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub(crate) struct ScoreSummary {
    pub(crate) score: f64,
    pub(crate) total_points: f64,
    pub(crate) percentage: i32,
    pub(crate) answered: usize,
    pub(crate) graded: usize,
    pub(crate) pending: usize,
}

/// `round(100 * score / total)` with halves away from zero; 0 for an empty test.
pub(crate) fn percentage(score: f64, total_points: f64) -> i32 {
    if total_points <= 0.0 {
        return 0;
    }
    (100.0 * score / total_points).round() as i32
}

/// Answers outside the scope are ignored; `scope` is the attempt's question set.
pub(crate) fn compute_score(scope: &[Question], answers: &[Answer]) -> ScoreSummary {
    let in_scope: HashSet<&str> = scope.iter().map(|question| question.id.as_str()).collect();
    let total_points: f64 = scope.iter().map(|question| question.points).sum();

    let scoped: Vec<&Answer> =
        answers.iter().filter(|answer| in_scope.contains(answer.question_id.as_str())).collect();
    let score: f64 = scoped.iter().map(|answer| answer.points_earned).sum();
    let graded = scoped.iter().filter(|answer| answer.is_correct.is_some()).count();

    ScoreSummary {
        score,
        total_points,
        percentage: percentage(score, total_points),
        answered: scoped.len(),
        graded,
        pending: scoped.len() - graded,
    }
}

/// The attempt's questions in presentation order: the recorded subset, or every
/// question of the test when none was recorded.
pub(crate) fn scope_questions(attempt: &Attempt, questions: Vec<Question>) -> Vec<Question> {
    let Some(selected) = &attempt.selected_question_ids else {
        return questions;
    };

    selected
        .iter()
        .filter_map(|id| questions.iter().find(|question| &question.id == id).cloned())
        .collect()
}

/// Recomputes scores from the current answer rows on every call.
#[derive(Clone)]
pub(crate) struct ScoreAggregator {
    catalog: Arc<dyn CatalogRepository>,
    answers: Arc<dyn AnswerRepository>,
}

impl ScoreAggregator {
    pub(crate) fn new(catalog: Arc<dyn CatalogRepository>, answers: Arc<dyn AnswerRepository>) -> Self {
        Self { catalog, answers }
    }

    pub(crate) async fn compute(&self, attempt: &Attempt) -> ServiceResult<ScoreSummary> {
        let questions = self.catalog.list_questions(&attempt.test_id).await?;
        let scope = scope_questions(attempt, questions);
        let answers = self.answers.list_by_attempt(&attempt.id).await?;
        Ok(compute_score(&scope, &answers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::QuestionType;
    use crate::test_support::{answer_row, attempt_row, question_row};

    #[test]
    fn percentage_rounds_half_away_from_zero() {
        assert_eq!(percentage(25.0, 40.0), 63);
        assert_eq!(percentage(1.0, 8.0), 13);
        assert_eq!(percentage(1.0, 3.0), 33);
        assert_eq!(percentage(40.0, 40.0), 100);
    }

    #[test]
    fn percentage_is_zero_without_points() {
        assert_eq!(percentage(0.0, 0.0), 0);
        assert_eq!(percentage(5.0, 0.0), 0);
    }

    #[test]
    fn mixed_test_scores_twenty_five_of_forty() {
        let scope = vec![
            question_row("q1", "t1", QuestionType::SingleChoice, 10.0),
            question_row("q2", "t1", QuestionType::SingleChoice, 10.0),
            question_row("q3", "t1", QuestionType::Code, 20.0),
        ];
        let answers = vec![
            answer_row("a1", "q1", Some(true), 10.0),
            answer_row("a1", "q2", Some(false), 0.0),
            answer_row("a1", "q3", Some(false), 15.0),
        ];

        let summary = compute_score(&scope, &answers);

        assert_eq!(summary.score, 25.0);
        assert_eq!(summary.total_points, 40.0);
        assert_eq!(summary.percentage, 63);
        assert_eq!((summary.answered, summary.graded, summary.pending), (3, 3, 0));
    }

    #[test]
    fn out_of_scope_answers_and_pending_rows_are_reported_separately() {
        let scope = vec![
            question_row("q1", "t1", QuestionType::SingleChoice, 5.0),
            question_row("q2", "t1", QuestionType::FreeText, 5.0),
        ];
        let answers = vec![
            answer_row("a1", "q1", Some(true), 5.0),
            answer_row("a1", "q2", None, 0.0),
            answer_row("a1", "q9", Some(true), 50.0),
        ];

        let summary = compute_score(&scope, &answers);

        assert_eq!(summary.score, 5.0);
        assert_eq!(summary.percentage, 50);
        assert_eq!((summary.answered, summary.graded, summary.pending), (2, 1, 1));
        assert!(summary.score <= summary.total_points);
    }

    #[test]
    fn scope_follows_recorded_subset_order() {
        let questions = vec![
            question_row("q1", "t1", QuestionType::SingleChoice, 1.0),
            question_row("q2", "t1", QuestionType::SingleChoice, 2.0),
            question_row("q3", "t1", QuestionType::SingleChoice, 3.0),
        ];
        let mut attempt = attempt_row("a1", "t1", "s1");

        attempt.selected_question_ids = Some(vec!["q3".into(), "q1".into()]);
        let scope = scope_questions(&attempt, questions.clone());
        let ids: Vec<&str> = scope.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["q3", "q1"]);

        attempt.selected_question_ids = None;
        assert_eq!(scope_questions(&attempt, questions.clone()).len(), 3);

        attempt.selected_question_ids = Some(Vec::new());
        assert!(scope_questions(&attempt, questions).is_empty());
    }
}
