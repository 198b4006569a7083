//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - The learner's chapter board and quest detail (answer keys stripped)
//!   - Quest submission through the reward ledger
//!   - Curriculum administration (save, publish, delete, AI drafts)
//!   - System configuration
//!   - Tutor replies with friendly fallbacks

use chrono::Local;
use rand::seq::SliceRandom;
use tracing::{error, info, instrument, warn};

use crate::accounts::{leaderboard, require_actor};
use crate::domain::{Answer, Quest, QuestStatus, Question, Role, SystemConfig, User};
use crate::engine::unlock;
use crate::error::{GenerationError, ServiceError, ValidationError};
use crate::protocol::{
  outcome_out, quest_out, ChapterView, ClassStatsOut, PublicConfigOut, QuestCard, QuestOut, QuestOutcomeOut,
  StudentStatsOut, TopicOut, TutorOut,
};
use crate::seeds::FALLBACK_TOPICS;
use crate::state::AppState;
use crate::store::{guarded, Store};
use crate::tutor::DraftRequest;
use crate::util::{new_id, trunc_for_log};

async fn load_user(state: &AppState, user_id: &str) -> Result<User, ServiceError> {
  guarded(state.store_timeout, state.store.get_user(user_id))
    .await?
    .ok_or_else(|| ServiceError::not_found("user", user_id))
}

pub async fn user_profile(state: &AppState, user_id: &str) -> Result<User, ServiceError> {
  load_user(state, user_id).await
}

/// Chapters in order with per-quest lock/completion state for `user_id`.
/// Students see published quests only; staff see everything, never locked.
#[instrument(level = "info", skip(state))]
pub async fn chapter_board(state: &AppState, user_id: &str) -> Result<Vec<ChapterView>, ServiceError> {
  let t = state.store_timeout;
  let user = load_user(state, user_id).await?;
  let chapters = guarded(t, state.store.get_chapters()).await?;
  let quests = guarded(t, state.store.get_quests(None)).await?;
  let completions = guarded(t, state.store.get_completions(user_id)).await?;
  let staff = user.role.is_staff();

  let board = unlock::ordered(&chapters)
    .into_iter()
    .map(|c| {
      let cards = quests
        .iter()
        .filter(|q| q.chapter_id == c.id && (staff || q.is_published()))
        .map(|q| {
          let record = completions.iter().find(|r| r.quest_id == q.id);
          QuestCard {
            id: q.id.clone(),
            order: q.order,
            title: q.title.clone(),
            topic: q.topic.clone(),
            status: q.status,
            reward_points: q.reward_points,
            locked: !unlock::quest_accessible(&user, q, &quests, &completions),
            completed: record.is_some(),
            passed: record.is_some_and(|r| r.has_passed()),
            score: record.map(|r| r.score),
          }
        })
        .collect();
      ChapterView {
        id: c.id.clone(),
        title: c.title.clone(),
        order: c.order,
        total_quests: c.total_quests,
        unlocked: staff || user.has_unlocked(&c.id),
        quests: cards,
      }
    })
    .collect();
  Ok(board)
}

/// Lesson + questions for a quest the user may open.
#[instrument(level = "info", skip(state))]
pub async fn quest_detail(state: &AppState, user_id: &str, quest_id: &str) -> Result<QuestOut, ServiceError> {
  let t = state.store_timeout;
  let user = load_user(state, user_id).await?;
  let quest = guarded(t, state.store.get_quest(quest_id))
    .await?
    .filter(|q| q.is_published() || user.role.is_staff())
    .ok_or_else(|| ServiceError::not_found("quest", quest_id))?;
  let quests = guarded(t, state.store.get_quests(Some(&quest.chapter_id))).await?;
  let completions = guarded(t, state.store.get_completions(user_id)).await?;
  if !unlock::quest_accessible(&user, &quest, &quests, &completions) {
    return Err(ServiceError::Locked(format!("quest '{}' is not unlocked yet", quest_id)));
  }
  Ok(quest_out(&quest))
}

/// Grade and record an attempt at the current local time.
#[instrument(level = "info", skip(state, answers), fields(answers = answers.len()))]
pub async fn submit_quest(
  state: &AppState,
  user_id: &str,
  quest_id: &str,
  answers: &[Answer],
) -> Result<QuestOutcomeOut, ServiceError> {
  let transition = state.ledger.complete_quest(user_id, quest_id, answers, Local::now()).await?;
  Ok(outcome_out(&transition))
}

/// Class overview for staff: every student by XP with their share of
/// published quests attempted.
#[instrument(level = "info", skip(state))]
pub async fn class_stats(state: &AppState, actor_id: &str) -> Result<ClassStatsOut, ServiceError> {
  let t = state.store_timeout;
  require_actor(state.store.as_ref(), t, actor_id, Role::is_staff).await?;
  let active: Vec<String> = guarded(t, state.store.get_quests(None))
    .await?
    .into_iter()
    .filter(Quest::is_published)
    .map(|q| q.id)
    .collect();

  let mut students = Vec::new();
  for u in leaderboard(state.store.as_ref(), t).await? {
    let records = guarded(t, state.store.get_completions(&u.id)).await?;
    let completed = records.iter().filter(|r| active.contains(&r.quest_id)).count();
    let progress_percent = if active.is_empty() {
      0
    } else {
      ((200 * completed + active.len()) / (2 * active.len())) as u32
    };
    students.push(StudentStatsOut {
      id: u.id,
      display_name: u.display_name,
      credential: u.credential_id,
      xp: u.xp,
      streak: u.streak,
      completed,
      progress_percent,
    });
  }
  Ok(ClassStatsOut { total_students: students.len(), active_quests: active.len(), students })
}

/// Structural checks applied to every quest written by staff or generation.
pub fn validate_quest(q: &Quest) -> Result<(), ValidationError> {
  if q.title.trim().is_empty() {
    return Err(ValidationError::InvalidQuest("title must not be empty".into()));
  }
  if q.chapter_id.trim().is_empty() {
    return Err(ValidationError::InvalidQuest("chapterId must not be empty".into()));
  }
  if q.passing_score > 100 {
    return Err(ValidationError::InvalidQuest(format!("passingScore {} exceeds 100", q.passing_score)));
  }
  if q.questions.is_empty() {
    return Err(ValidationError::EmptyQuiz);
  }
  for (i, question) in q.questions.iter().enumerate() {
    if question.prompt().trim().is_empty() {
      return Err(ValidationError::InvalidQuest(format!("question {} has no prompt", i + 1)));
    }
    if let Question::MultipleChoice { options, correct_index, .. } = question {
      if options.len() < 2 {
        return Err(ValidationError::InvalidQuest(format!("question {} needs at least two options", i + 1)));
      }
      if *correct_index >= options.len() {
        return Err(ValidationError::InvalidQuest(format!(
          "question {} has correctIndex {} but {} options",
          i + 1,
          correct_index,
          options.len()
        )));
      }
    }
  }
  Ok(())
}

/// Create or replace a quest (staff only). An empty id gets a fresh one.
#[instrument(level = "info", skip(state, quest), fields(quest_id = %quest.id, chapter_id = %quest.chapter_id))]
pub async fn save_quest(state: &AppState, actor_id: &str, mut quest: Quest) -> Result<Quest, ServiceError> {
  let t = state.store_timeout;
  require_actor(state.store.as_ref(), t, actor_id, Role::is_staff).await?;
  validate_quest(&quest)?;
  let chapters = guarded(t, state.store.get_chapters()).await?;
  if !chapters.iter().any(|c| c.id == quest.chapter_id) {
    return Err(ServiceError::not_found("chapter", quest.chapter_id.clone()));
  }
  if quest.id.trim().is_empty() {
    quest.id = new_id("q");
  }
  guarded(t, state.store.save_quest(&quest)).await?;
  info!(target: "questline", quest_id = %quest.id, status = ?quest.status, "Quest saved");
  Ok(quest)
}

#[instrument(level = "info", skip(state))]
pub async fn set_quest_status(
  state: &AppState,
  actor_id: &str,
  quest_id: &str,
  status: QuestStatus,
) -> Result<Quest, ServiceError> {
  let t = state.store_timeout;
  require_actor(state.store.as_ref(), t, actor_id, Role::is_staff).await?;
  let mut quest = guarded(t, state.store.get_quest(quest_id))
    .await?
    .ok_or_else(|| ServiceError::not_found("quest", quest_id))?;
  if status == QuestStatus::Published {
    validate_quest(&quest)?;
  }
  quest.status = status;
  guarded(t, state.store.save_quest(&quest)).await?;
  info!(target: "questline", %quest_id, ?status, "Quest status changed");
  Ok(quest)
}

#[instrument(level = "info", skip(state))]
pub async fn delete_quest(state: &AppState, actor_id: &str, quest_id: &str) -> Result<(), ServiceError> {
  let t = state.store_timeout;
  require_actor(state.store.as_ref(), t, actor_id, Role::is_staff).await?;
  if guarded(t, state.store.get_quest(quest_id)).await?.is_none() {
    return Err(ServiceError::not_found("quest", quest_id));
  }
  guarded(t, state.store.delete_quest(quest_id)).await?;
  info!(target: "questline", %quest_id, "Quest deleted");
  Ok(())
}

fn check_range(field: &'static str, value: u32, max: u32) -> Result<(), ValidationError> {
  if value == 0 || value > max {
    return Err(ValidationError::InvalidField { field, reason: format!("must be between 1 and {}", max) });
  }
  Ok(())
}

/// Bulk-generate draft quests for a chapter. Nothing is stored on failure.
#[instrument(level = "info", skip(state))]
pub async fn generate_chapter_drafts(
  state: &AppState,
  actor_id: &str,
  chapter_id: &str,
  quest_count: u32,
  questions_per_quest: u32,
) -> Result<Vec<Quest>, ServiceError> {
  let t = state.store_timeout;
  let limits = &state.config.generation;
  require_actor(state.store.as_ref(), t, actor_id, Role::is_staff).await?;
  check_range("questCount", quest_count, limits.max_quests)?;
  check_range("questionsPerQuest", questions_per_quest, limits.max_questions_per_quest)?;

  let chapter = guarded(t, state.store.get_chapters())
    .await?
    .into_iter()
    .find(|c| c.id == chapter_id)
    .ok_or_else(|| ServiceError::not_found("chapter", chapter_id))?;
  let existing = guarded(t, state.store.get_quests(Some(chapter_id))).await?;
  let first_order = existing.iter().map(|q| q.order).max().unwrap_or(0) + 1;

  let tutor = state.tutor.as_ref().ok_or(GenerationError::Disabled)?;
  let req = DraftRequest {
    chapter_id,
    chapter_title: &chapter.title,
    quest_count,
    questions_per_quest,
    first_order,
  };
  let drafts = tutor.generate_drafts(&state.config.prompts, limits, &req).await.map_err(|e| {
    error!(target: "tutor", %chapter_id, error = %e, "Draft generation failed");
    e
  })?;

  for d in &drafts {
    validate_quest(d)?;
  }
  for d in &drafts {
    guarded(t, state.store.save_quest(d)).await?;
  }
  info!(target: "questline", %chapter_id, drafts = drafts.len(), "Generated draft quests stored");
  Ok(drafts)
}

pub async fn system_config(state: &AppState) -> Result<SystemConfig, ServiceError> {
  Ok(guarded(state.store_timeout, state.store.get_config()).await?.unwrap_or_default())
}

pub async fn public_config(state: &AppState) -> Result<PublicConfigOut, ServiceError> {
  let cfg = system_config(state).await?;
  Ok(PublicConfigOut { maintenance_mode: cfg.maintenance_mode, announcement_text: cfg.announcement_text })
}

pub async fn admin_config(state: &AppState, actor_id: &str) -> Result<SystemConfig, ServiceError> {
  require_actor(state.store.as_ref(), state.store_timeout, actor_id, |r| r == Role::Admin).await?;
  system_config(state).await
}

#[instrument(level = "info", skip(state, config), fields(maintenance = config.maintenance_mode))]
pub async fn save_system_config(state: &AppState, actor_id: &str, config: SystemConfig) -> Result<SystemConfig, ServiceError> {
  require_actor(state.store.as_ref(), state.store_timeout, actor_id, |r| r == Role::Admin).await?;
  guarded(state.store_timeout, state.store.save_config(&config)).await?;
  info!(target: "questline", maintenance = config.maintenance_mode, "System config saved");
  Ok(config)
}

/// Tutor answer; any generation failure becomes the configured fallback text.
#[instrument(level = "info", skip(state, question), fields(question_len = question.len()))]
pub async fn ask_tutor(state: &AppState, topic: &str, question: &str) -> TutorOut {
  let fallback = || TutorOut { text: state.config.messages.tutor_fallback.clone(), fallback: true };
  if question.trim().is_empty() {
    return fallback();
  }
  let Some(tutor) = &state.tutor else {
    warn!(target: "tutor", "Tutor disabled; using fallback message.");
    return fallback();
  };
  match tutor.ask(&state.config.prompts, topic, question).await {
    Ok(text) => {
      info!(target: "tutor", %topic, reply = %trunc_for_log(&text, 60), "Tutor replied");
      TutorOut { text, fallback: false }
    }
    Err(e) => {
      error!(target: "tutor", %topic, error = %e, "Tutor call failed; using fallback message.");
      fallback()
    }
  }
}

/// AI-suggested topic for a new quest, or a random built-in one.
#[instrument(level = "info", skip(state))]
pub async fn suggest_topic(state: &AppState) -> TopicOut {
  if let Some(tutor) = &state.tutor {
    match tutor.suggest_topic(&state.config.prompts).await {
      Ok(topic) if !topic.is_empty() => return TopicOut { topic, fallback: false },
      Ok(_) => warn!(target: "tutor", "Empty topic suggestion; using local list."),
      Err(e) => error!(target: "tutor", error = %e, "Topic suggestion failed; using local list."),
    }
  }
  let topic = FALLBACK_TOPICS
    .choose(&mut rand::thread_rng())
    .copied()
    .unwrap_or("Random Journey")
    .to_string();
  TopicOut { topic, fallback: true }
}
