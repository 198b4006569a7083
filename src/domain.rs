//! Domain models: accounts, curriculum (chapters/quests/questions), completion
//! records and the global system configuration.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Account role. Fixed at creation; never changed through self-service.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
  Student,
  Teacher,
  Admin,
}

impl Role {
  /// Teachers and admins manage curriculum and are never gated by unlocks.
  pub fn is_staff(self) -> bool {
    matches!(self, Role::Teacher | Role::Admin)
  }
}

/// A learner or staff account.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
  pub id: String,
  pub display_name: String,
  /// Username or email, trimmed and lower-cased.
  #[serde(rename = "credential")]
  pub credential_id: String,
  /// Compared verbatim on login.
  pub secret: String,
  pub role: Role,
  #[serde(default)] pub xp: u32,
  #[serde(default)] pub streak: u32,
  #[serde(default)] pub last_completion_date: Option<NaiveDate>,
  #[serde(default)] pub unlocked_chapters: BTreeSet<String>,
}

impl User {
  pub fn has_unlocked(&self, chapter_id: &str) -> bool {
    self.unlocked_chapters.contains(chapter_id)
  }
}

/// Ordered curriculum unit. `total_quests` is advisory only.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
  pub id: String,
  pub title: String,
  pub order: u32,
  #[serde(default)] pub total_quests: u32,
}

/// Visibility of a quest. Only published quests count for students.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
  #[default]
  Draft,
  Published,
}

/// Lesson content shown before the quiz.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
  H1 { text: String },
  H2 { text: String },
  P { text: String },
  List { items: Vec<String> },
}

/// One gradeable item. The correct answer's representation is fixed by the
/// variant, so a multiple-choice key can never be compared against a boolean.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Question {
  MultipleChoice {
    prompt: String,
    options: Vec<String>,
    #[serde(rename = "correctIndex")]
    correct_index: usize,
  },
  TrueFalse {
    prompt: String,
    #[serde(rename = "correctBoolean")]
    correct_boolean: bool,
  },
}

impl Question {
  pub fn prompt(&self) -> &str {
    match self {
      Question::MultipleChoice { prompt, .. } | Question::TrueFalse { prompt, .. } => prompt,
    }
  }
}

/// A submitted answer. Deserialized from a bare JSON number or boolean; a
/// string such as `"0"` or `"true"` is rejected at the boundary.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Answer {
  Choice(usize),
  Boolean(bool),
}

/// Gradeable lesson + quiz unit belonging to exactly one chapter.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Quest {
  pub id: String,
  pub chapter_id: String,
  pub order: u32,
  pub title: String,
  #[serde(default)] pub topic: String,
  /// Percentage threshold (0–100), inclusive.
  pub passing_score: u32,
  pub reward_points: u32,
  #[serde(default)] pub status: QuestStatus,
  #[serde(default)] pub image_url: Option<String>,
  #[serde(default)] pub content: Vec<ContentBlock>,
  pub questions: Vec<Question>,
}

impl Quest {
  pub fn is_published(&self) -> bool {
    self.status == QuestStatus::Published
  }
}

/// Latest attempt of one user at one quest. Keyed by `(user_id, quest_id)`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRecord {
  pub user_id: String,
  pub quest_id: String,
  /// Score of the most recent attempt.
  pub score: u32,
  pub completed_at: DateTime<Utc>,
  /// First passing attempt. Set once, never cleared; marks the reward as claimed.
  #[serde(default)] pub passed_at: Option<DateTime<Utc>>,
}

impl CompletionRecord {
  pub fn has_passed(&self) -> bool {
    self.passed_at.is_some()
  }
}

/// Global singleton configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SystemConfig {
  #[serde(default)] pub maintenance_mode: bool,
  #[serde(default)] pub announcement_text: String,
  #[serde(default)] pub semester: String,
  #[serde(default)] pub year: String,
}

impl Default for SystemConfig {
  fn default() -> Self {
    Self {
      maintenance_mode: false,
      announcement_text: String::new(),
      semester: "2".into(),
      year: "2025/2026".into(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn question_kinds_use_distinct_answer_keys() {
    let json = r#"[
      {"kind":"multiple_choice","prompt":"Pick","options":["a","b"],"correctIndex":1},
      {"kind":"true_false","prompt":"Yes?","correctBoolean":false}
    ]"#;
    let qs: Vec<Question> = serde_json::from_str(json).unwrap();
    assert!(matches!(qs[0], Question::MultipleChoice { correct_index: 1, .. }));
    assert!(matches!(qs[1], Question::TrueFalse { correct_boolean: false, .. }));
  }

  #[test]
  fn answers_keep_their_json_representation() {
    let answers: Vec<Answer> = serde_json::from_str("[0, true, 2, false]").unwrap();
    assert_eq!(
      answers,
      vec![Answer::Choice(0), Answer::Boolean(true), Answer::Choice(2), Answer::Boolean(false)]
    );
    assert!(serde_json::from_str::<Vec<Answer>>(r#"["0"]"#).is_err());
  }

  #[test]
  fn user_round_trips_with_camel_case_fields() {
    let raw = r#"{"id":"u1","displayName":"Ana","credential":"ana@school.id","secret":"pw",
      "role":"STUDENT","xp":10,"lastCompletionDate":"2026-01-02","unlockedChapters":["ch1"]}"#;
    let u: User = serde_json::from_str(raw).unwrap();
    assert_eq!(u.streak, 0);
    assert_eq!(u.last_completion_date, NaiveDate::from_ymd_opt(2026, 1, 2));
    assert!(u.has_unlocked("ch1"));
    assert!(!u.role.is_staff());
  }
}
