//! Loading application configuration (prompts, engine, store, generation
//! limits, user-facing fallback messages) from TOML.
//!
//! See `AppConfig` for the expected schema. Every section is optional.

use std::{path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{error, info};

use crate::engine::EngineConfig;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)] pub prompts: Prompts,
  #[serde(default)] pub engine: EngineSection,
  #[serde(default)] pub store: StoreSection,
  #[serde(default)] pub generation: GenerationSection,
  #[serde(default)] pub messages: Messages,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EngineSection {
  pub track_streaks: bool,
}

impl Default for EngineSection {
  fn default() -> Self { Self { track_streaks: true } }
}

impl From<&EngineSection> for EngineConfig {
  fn from(s: &EngineSection) -> Self {
    EngineConfig { track_streaks: s.track_streaks }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StoreSection {
  /// JSON snapshot file; in-memory only when unset.
  pub snapshot_path: Option<PathBuf>,
  /// Per-call timeout for store operations.
  pub timeout_ms: u64,
}

impl Default for StoreSection {
  fn default() -> Self { Self { snapshot_path: None, timeout_ms: 5_000 } }
}

impl StoreSection {
  pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms.max(1)) }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GenerationSection {
  pub default_passing_score: u32,
  pub default_reward_points: u32,
  pub max_quests: u32,
  pub max_questions_per_quest: u32,
}

impl Default for GenerationSection {
  fn default() -> Self {
    Self { default_passing_score: 80, default_reward_points: 100, max_quests: 10, max_questions_per_quest: 10 }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Messages {
  /// Shown instead of a tutor answer when the AI backend fails.
  pub tutor_fallback: String,
}

impl Default for Messages {
  fn default() -> Self {
    Self { tutor_fallback: "Sorry, the tutor is busy right now. Please try again in a moment!".into() }
  }
}

/// Prompts used by the tutor client. Defaults target junior-high English
/// lessons; override them in TOML to retarget the curriculum.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  // Tutor chat
  pub tutor_system: String,
  pub tutor_user_template: String,
  // Bulk quest generation
  pub quest_gen_system: String,
  pub quest_gen_user_template: String,
  // Topic suggestion
  pub topic_system: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      tutor_system: "You are a friendly AI English tutor for junior high school students. Explain simply and clearly, keep it encouraging, and use short examples.".into(),
      tutor_user_template: "Current topic: {topic}\nStudent asks: \"{question}\"".into(),
      quest_gen_system: "You are a curriculum designer. Respond ONLY with strict JSON.".into(),
      quest_gen_user_template: "Create {quest_count} quests for chapter '{chapter_title}' (id {chapter_id}). Each quest has {questions_per_quest} questions.\nReturn JSON {\"quests\": [{\"title\": string, \"topic\": string, \"content\": [{\"type\": \"h1\"|\"h2\"|\"p\", \"text\": string} | {\"type\": \"list\", \"items\": [string]}], \"questions\": [{\"kind\": \"multiple_choice\", \"prompt\": string, \"options\": [string], \"correctIndex\": number} | {\"kind\": \"true_false\", \"prompt\": string, \"correctBoolean\": boolean}]}]}".into(),
      topic_system: "Suggest ONE specific topic for a new English lesson quest for 8th graders. Output ONLY the topic title.".into(),
    }
  }
}

/// Load `AppConfig` from APP_CONFIG_PATH. On any IO/parsing error, defaults are used.
pub fn load_app_config_from_env() -> AppConfig {
  let mut cfg = match std::env::var("APP_CONFIG_PATH") {
    Ok(path) => load_app_config(&path).unwrap_or_default(),
    Err(_) => AppConfig::default(),
  };
  if let Ok(p) = std::env::var("STORE_PATH") {
    cfg.store.snapshot_path = Some(PathBuf::from(p));
  }
  cfg
}

fn load_app_config(path: &str) -> Option<AppConfig> {
  match std::fs::read_to_string(path) {
    Ok(s) => match toml::from_str::<AppConfig>(&s) {
      Ok(cfg) => {
        info!(target: "questline", %path, "Loaded app config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "questline", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "questline", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
