//! Server-authoritative scoring and ranking. Both operations are pure: same
//! inputs, same outputs, no side effects on the score data.

use crate::{
    dao::models::{ParticipantEntity, QuestionEntity},
    dto::session::LeaderboardEntry,
};

/// Result of scoring one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoredAnswer {
    /// Whether the submission matched the correct answer.
    pub is_correct: bool,
    /// Points awarded: the question's value when correct, zero otherwise.
    pub points_earned: u32,
}

/// Score a submission against a question's correct answer.
///
/// Correctness is a case-insensitive, whitespace-trimmed exact string match.
/// No partial credit; the question kind never changes the comparison.
pub fn score_answer(question: &QuestionEntity, submitted: &str) -> ScoredAnswer {
    let is_correct =
        submitted.trim().to_lowercase() == question.correct_answer.trim().to_lowercase();

    ScoredAnswer {
        is_correct,
        points_earned: if is_correct { question.points } else { 0 },
    }
}

/// Compute dense 1-based standings: score descending, ties broken by earliest
/// `joined_at` (first to join ranks higher). Recomputed from scratch on every
/// call.
pub fn rank(participants: &[ParticipantEntity]) -> Vec<LeaderboardEntry> {
    let mut ordered: Vec<&ParticipantEntity> = participants.iter().collect();
    ordered.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.joined_at.cmp(&b.joined_at))
    });

    ordered
        .into_iter()
        .enumerate()
        .map(|(position, participant)| LeaderboardEntry {
            rank: position as u32 + 1,
            participant_id: participant.id,
            participant_name: participant.display_name.clone(),
            score: participant.score,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use uuid::Uuid;

    use super::*;
    use crate::dao::models::QuestionKind;

    fn question(correct: &str, points: u32) -> QuestionEntity {
        QuestionEntity {
            id: Uuid::new_v4(),
            kind: QuestionKind::MultipleChoice,
            prompt: "Which band recorded Bohemian Rhapsody?".into(),
            options: vec!["Queen".into(), "The Beatles".into()],
            audio_url: None,
            correct_answer: correct.into(),
            explanation: None,
            points,
            time_limit_secs: 30,
        }
    }

    fn participant(name: &str, score: u32, joined_offset_secs: u64) -> ParticipantEntity {
        ParticipantEntity {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            user_id: None,
            display_name: name.into(),
            score,
            is_connected: true,
            joined_at: SystemTime::UNIX_EPOCH + Duration::from_secs(joined_offset_secs),
        }
    }

    #[test]
    fn exact_match_earns_the_question_points() {
        let scored = score_answer(&question("Queen", 10), "Queen");
        assert!(scored.is_correct);
        assert_eq!(scored.points_earned, 10);
    }

    #[test]
    fn comparison_ignores_case_and_surrounding_whitespace() {
        let q = question(" Queen ", 10);
        for submitted in ["queen", "QUEEN", "  Queen  ", "qUeEn"] {
            assert!(score_answer(&q, submitted).is_correct, "submitted: {submitted:?}");
        }
    }

    #[test]
    fn wrong_answer_earns_nothing() {
        let scored = score_answer(&question("Queen", 10), "The Beatles");
        assert!(!scored.is_correct);
        assert_eq!(scored.points_earned, 0);
    }

    #[test]
    fn scoring_is_deterministic_across_calls() {
        let q = question("Queen", 10);
        let first = score_answer(&q, "queen");
        let second = score_answer(&q, "queen");
        assert_eq!(first, second);
    }

    #[test]
    fn rank_orders_by_score_then_join_time() {
        let participants = vec![
            participant("late-low", 5, 30),
            participant("early-high", 20, 10),
            participant("late-high", 20, 20),
        ];

        let standings = rank(&participants);
        let names: Vec<&str> = standings
            .iter()
            .map(|entry| entry.participant_name.as_str())
            .collect();
        assert_eq!(names, ["early-high", "late-high", "late-low"]);
        assert_eq!(
            standings.iter().map(|e| e.rank).collect::<Vec<_>>(),
            [1, 2, 3]
        );
    }

    #[test]
    fn tied_scores_rank_the_earlier_joiner_first() {
        let first = participant("first", 10, 1);
        let second = participant("second", 10, 2);
        let standings = rank(&[second.clone(), first.clone()]);

        assert_eq!(standings[0].participant_id, first.id);
        assert_eq!(standings[0].rank, 1);
        assert_eq!(standings[1].participant_id, second.id);
        assert_eq!(standings[1].rank, 2);
    }

    #[test]
    fn rank_is_idempotent() {
        let participants = vec![
            participant("a", 10, 1),
            participant("b", 10, 2),
            participant("c", 0, 3),
        ];
        assert_eq!(rank(&participants), rank(&participants));
    }
}
