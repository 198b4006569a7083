//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{Answer, ContentBlock, Quest, QuestStatus, Question, Role, SystemConfig, User};
use crate::engine::streak::StreakChange;
use crate::engine::Transition;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    Chapters {
        #[serde(rename = "userId")]
        user_id: String,
    },
    SubmitQuest {
        #[serde(rename = "userId")]
        user_id: String,
        #[serde(rename = "questId")]
        quest_id: String,
        answers: Vec<Answer>,
    },
    AskTutor {
        topic: String,
        question: String,
    },
    Suggestions {
        topic: String,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Chapters { chapters: Vec<ChapterView> },
    QuestOutcome { outcome: QuestOutcomeOut },
    TutorReply { reply: TutorOut },
    Suggestions { questions: Vec<String> },
    Error { code: String, message: String, retryable: bool },
}

/// Account as seen by clients. Never carries the secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOut {
    pub id: String,
    pub display_name: String,
    pub credential: String,
    pub role: Role,
    pub xp: u32,
    pub streak: u32,
    pub last_completion_date: Option<NaiveDate>,
    pub unlocked_chapters: BTreeSet<String>,
}

pub fn user_out(u: &User) -> UserOut {
    UserOut {
        id: u.id.clone(),
        display_name: u.display_name.clone(),
        credential: u.credential_id.clone(),
        role: u.role,
        xp: u.xp,
        streak: u.streak,
        last_completion_date: u.last_completion_date,
        unlocked_chapters: u.unlocked_chapters.clone(),
    }
}

/// One entry of the chapter board.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterView {
    pub id: String,
    pub title: String,
    pub order: u32,
    pub total_quests: u32,
    pub unlocked: bool,
    pub quests: Vec<QuestCard>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestCard {
    pub id: String,
    pub order: u32,
    pub title: String,
    pub topic: String,
    pub status: QuestStatus,
    pub reward_points: u32,
    pub locked: bool,
    pub completed: bool,
    pub passed: bool,
    pub score: Option<u32>,
}

/// Question without its answer key.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuestionOut {
    MultipleChoice { prompt: String, options: Vec<String> },
    TrueFalse { prompt: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestOut {
    pub id: String,
    pub chapter_id: String,
    pub order: u32,
    pub title: String,
    pub topic: String,
    pub passing_score: u32,
    pub reward_points: u32,
    pub status: QuestStatus,
    pub image_url: Option<String>,
    pub content: Vec<ContentBlock>,
    pub questions: Vec<QuestionOut>,
}

/// Convert a full `Quest` (internal) to the learner-facing DTO.
pub fn quest_out(q: &Quest) -> QuestOut {
    QuestOut {
        id: q.id.clone(),
        chapter_id: q.chapter_id.clone(),
        order: q.order,
        title: q.title.clone(),
        topic: q.topic.clone(),
        passing_score: q.passing_score,
        reward_points: q.reward_points,
        status: q.status,
        image_url: q.image_url.clone(),
        content: q.content.clone(),
        questions: q
            .questions
            .iter()
            .map(|question| match question {
                Question::MultipleChoice { prompt, options, .. } => {
                    QuestionOut::MultipleChoice { prompt: prompt.clone(), options: options.clone() }
                }
                Question::TrueFalse { prompt, .. } => QuestionOut::TrueFalse { prompt: prompt.clone() },
            })
            .collect(),
    }
}

/// "Not passed" is a normal outcome, distinct from a failed save.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttemptResult {
    Passed,
    NotPassed,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StreakOut {
    Unchanged,
    Extended,
    Started,
}

impl From<StreakChange> for StreakOut {
    fn from(c: StreakChange) -> Self {
        match c {
            StreakChange::Unchanged => StreakOut::Unchanged,
            StreakChange::Extended => StreakOut::Extended,
            StreakChange::Started => StreakOut::Started,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestOutcomeOut {
    pub result: AttemptResult,
    pub quest_id: String,
    pub score: u32,
    pub correct: usize,
    pub total: usize,
    pub first_pass: bool,
    pub xp_awarded: u32,
    pub streak_change: Option<StreakOut>,
    pub newly_unlocked: Vec<String>,
    pub user: UserOut,
}

pub fn outcome_out(t: &Transition) -> QuestOutcomeOut {
    QuestOutcomeOut {
        result: if t.grade.passed { AttemptResult::Passed } else { AttemptResult::NotPassed },
        quest_id: t.record.quest_id.clone(),
        score: t.grade.score,
        correct: t.grade.correct,
        total: t.grade.total,
        first_pass: t.first_pass,
        xp_awarded: t.xp_awarded,
        streak_change: t.streak_change.map(StreakOut::from),
        newly_unlocked: t.newly_unlocked.clone(),
        user: user_out(&t.user),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorOut {
    pub text: String,
    /// True when the AI backend failed and a canned message was substituted.
    pub fallback: bool,
}

//
// HTTP request/response DTOs
//

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterIn {
    pub display_name: String,
    pub credential: String,
    pub secret: String,
}

#[derive(Deserialize)]
pub struct LoginIn {
    pub credential: String,
    pub secret: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorQuery {
    pub actor_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitIn {
    pub user_id: String,
    pub answers: Vec<Answer>,
}

#[derive(Deserialize)]
pub struct TutorIn {
    pub topic: String,
    pub question: String,
}

#[derive(Debug, Deserialize)]
pub struct TopicQuery {
    #[serde(default)]
    pub topic: String,
}

#[derive(Serialize)]
pub struct SuggestionsOut {
    pub questions: Vec<String>,
}

#[derive(Serialize)]
pub struct TopicOut {
    pub topic: String,
    pub fallback: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionIn {
    pub actor_id: String,
    pub display_name: String,
    pub credential: String,
    pub secret: String,
    pub role: Role,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustXpIn {
    pub actor_id: String,
    pub delta: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveQuestIn {
    pub actor_id: String,
    pub quest: Quest,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestStatusIn {
    pub actor_id: String,
    pub status: QuestStatus,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateIn {
    pub actor_id: String,
    pub quest_count: u32,
    pub questions_per_quest: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveConfigIn {
    pub actor_id: String,
    pub config: SystemConfig,
}

/// One row of the teacher's class overview.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentStatsOut {
    pub id: String,
    pub display_name: String,
    pub credential: String,
    pub xp: u32,
    pub streak: u32,
    /// Published quests with a completion record.
    pub completed: usize,
    /// `completed` over published quests, rounded to a whole percent.
    pub progress_percent: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassStatsOut {
    pub total_students: usize,
    pub active_quests: usize,
    pub students: Vec<StudentStatsOut>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicConfigOut {
    pub maintenance_mode: bool,
    pub announcement_text: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[derive(Serialize)]
pub struct OkOut {
    pub ok: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quest_out_hides_answer_keys() {
        let q = crate::seeds::seed_quests().remove(0);
        let json = serde_json::to_string(&quest_out(&q)).unwrap();
        assert!(!json.contains("correctIndex"));
        assert!(!json.contains("correctBoolean"));
        assert!(json.contains("\"kind\":\"multiple_choice\""));
    }

    #[test]
    fn ws_submit_parses_mixed_answers() {
        let raw = r#"{"type":"submit_quest","userId":"u3","questId":"q1","answers":[0,true,1]}"#;
        match serde_json::from_str::<ClientWsMessage>(raw).unwrap() {
            ClientWsMessage::SubmitQuest { answers, .. } => {
                assert_eq!(answers, vec![Answer::Choice(0), Answer::Boolean(true), Answer::Choice(1)]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn user_out_never_contains_secret() {
        let mut u = crate::seeds::seed_users(&crate::seeds::seed_chapters()).remove(0);
        u.secret = "s3cr3t-value".into();
        let json = serde_json::to_string(&user_out(&u)).unwrap();
        assert!(!json.contains("secret"));
        assert!(!json.contains(&u.secret));
    }
}
