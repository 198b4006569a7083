//! Quiz grading: a completed answer sequence becomes a 0–100 score.
//!
//! Answers are compared by pattern-matching on the question variant. A
//! submission in the other representation (a boolean for a multiple-choice
//! question, an index for a true/false question) is simply incorrect.

use serde::Serialize;

use crate::domain::{Answer, Quest, Question};
use crate::error::ValidationError;

/// Result of grading one attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub correct: usize,
    pub total: usize,
    pub score: u32,
    pub passed: bool,
}

pub fn is_correct(question: &Question, answer: &Answer) -> bool {
    match (question, answer) {
        (Question::MultipleChoice { correct_index, .. }, Answer::Choice(picked)) => picked == correct_index,
        (Question::TrueFalse { correct_boolean, .. }, Answer::Boolean(picked)) => picked == correct_boolean,
        _ => false,
    }
}

/// `round(100 * correct / total)`, rounding halves up.
pub fn percentage(correct: usize, total: usize) -> u32 {
    debug_assert!(total > 0 && correct <= total);
    ((200 * correct + total) / (2 * total)) as u32
}

/// Grade a full, ordered answer sequence against the quest's questions.
pub fn grade(quest: &Quest, answers: &[Answer]) -> Result<Grade, ValidationError> {
    let total = quest.questions.len();
    if total == 0 {
        return Err(ValidationError::EmptyQuiz);
    }
    if answers.len() != total {
        return Err(ValidationError::AnswerCountMismatch { expected: total, got: answers.len() });
    }

    let correct = quest
        .questions
        .iter()
        .zip(answers)
        .filter(|(q, a)| is_correct(q, a))
        .count();
    let score = percentage(correct, total);

    Ok(Grade { correct, total, score, passed: score >= quest.passing_score })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::QuestStatus;

    fn mc(correct_index: usize) -> Question {
        Question::MultipleChoice {
            prompt: "pick".into(),
            options: vec!["a".into(), "b".into(), "c".into()],
            correct_index,
        }
    }

    fn tf(correct_boolean: bool) -> Question {
        Question::TrueFalse { prompt: "true?".into(), correct_boolean }
    }

    fn quest(questions: Vec<Question>, passing_score: u32) -> Quest {
        Quest {
            id: "q".into(),
            chapter_id: "ch1".into(),
            order: 1,
            title: "Quest".into(),
            topic: String::new(),
            passing_score,
            reward_points: 100,
            status: QuestStatus::Published,
            image_url: None,
            content: vec![],
            questions,
        }
    }

    #[test]
    fn four_of_five_is_eighty() {
        let q = quest(vec![mc(0), mc(1), tf(true), mc(2), tf(false)], 80);
        let answers = [Answer::Choice(0), Answer::Choice(1), Answer::Boolean(true), Answer::Choice(0), Answer::Boolean(false)];
        let g = grade(&q, &answers).unwrap();
        assert_eq!((g.correct, g.score), (4, 80));
        assert!(g.passed, "passing score is inclusive");
    }

    #[test]
    fn one_of_three_rounds_to_thirty_three() {
        let q = quest(vec![mc(0), mc(0), mc(0)], 50);
        let g = grade(&q, &[Answer::Choice(0), Answer::Choice(1), Answer::Choice(2)]).unwrap();
        assert_eq!(g.score, 33);
        assert!(!g.passed);
    }

    #[test]
    fn rounding_matches_half_up() {
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(1, 8), 13);
        assert_eq!(percentage(0, 4), 0);
        assert_eq!(percentage(7, 7), 100);
    }

    #[test]
    fn cross_representation_answers_are_wrong() {
        let q = quest(vec![mc(0), tf(false), tf(true)], 0);
        let g = grade(&q, &[Answer::Boolean(false), Answer::Choice(0), Answer::Choice(1)]).unwrap();
        assert_eq!(g.correct, 0);
        assert_eq!(g.score, 0);
        assert!(g.passed, "a zero threshold passes any score");
    }

    #[test]
    fn mismatched_answer_count_is_rejected() {
        let q = quest(vec![mc(0), mc(1)], 50);
        assert_eq!(
            grade(&q, &[Answer::Choice(0)]),
            Err(ValidationError::AnswerCountMismatch { expected: 2, got: 1 })
        );
        assert_eq!(grade(&quest(vec![], 50), &[]), Err(ValidationError::EmptyQuiz));
    }

    #[test]
    fn grading_is_deterministic() {
        let q = quest(vec![mc(1), tf(true), mc(2)], 60);
        let answers = [Answer::Choice(1), Answer::Boolean(false), Answer::Choice(2)];
        let first = grade(&q, &answers).unwrap();
        for _ in 0..5 {
            assert_eq!(grade(&q, &answers).unwrap(), first);
        }
    }
}
