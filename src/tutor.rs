//! Minimal OpenAI-compatible client for the tutor and content generation.
//!
//! We only call chat.completions and request either plain text or a strict JSON object.
//! Calls are instrumented and log model names, latencies, and response sizes (not contents).
//!
//! NOTE: We never log the API key. Nothing here touches grading or rewards;
//! every failure is reported as a `GenerationError` for the caller to soften.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::config::{GenerationSection, Prompts};
use crate::domain::{ContentBlock, Quest, QuestStatus, Question};
use crate::error::GenerationError;
use crate::util::{fill_template, new_id};

#[derive(Clone)]
pub struct Tutor {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub fast_model: String,
  pub strong_model: String,
}

/// Parameters of one bulk generation request.
#[derive(Clone, Debug)]
pub struct DraftRequest<'a> {
  pub chapter_id: &'a str,
  pub chapter_title: &'a str,
  pub quest_count: u32,
  pub questions_per_quest: u32,
  /// First `order` to assign; drafts are appended after existing quests.
  pub first_order: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeneratedBatch {
  #[serde(default)] quests: Vec<GeneratedQuest>,
}

#[derive(Debug, Deserialize)]
struct GeneratedQuest {
  title: String,
  #[serde(default)] topic: String,
  #[serde(default)] content: Vec<ContentBlock>,
  #[serde(default)] questions: Vec<serde_json::Value>,
}

impl Tutor {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let fast_model =
      std::env::var("OPENAI_FAST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let strong_model =
      std::env::var("OPENAI_STRONG_MODEL").unwrap_or_else(|_| "gpt-4o".into());

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, fast_model, strong_model })
  }

  async fn chat(
    &self,
    model: &str,
    system: &str,
    user: &str,
    temperature: f32,
    json: bool,
  ) -> Result<String, GenerationError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: model.to_string(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      response_format: json.then(|| ResponseFormat { r#type: "json_object".into() }),
    };

    let start = std::time::Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, "questline-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await?;

    if !res.status().is_success() {
      let status = res.status().as_u16();
      let body = res.text().await.unwrap_or_default();
      let message = extract_openai_error(&body).unwrap_or(body);
      return Err(GenerationError::Api { status, message });
    }

    let body: ChatCompletionResponse = res.json().await?;
    if let Some(usage) = &body.usage {
      info!(target: "tutor", prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default()
      .trim()
      .to_string();
    info!(target: "tutor", elapsed = ?start.elapsed(), response_len = text.len(), "Model response received");

    if text.is_empty() {
      return Err(GenerationError::Parse("empty completion".into()));
    }
    Ok(text)
  }

  /// Answer a learner's question about the current topic.
  #[instrument(level = "info", skip(self, prompts, question), fields(%topic, question_len = question.len(), model = %self.fast_model))]
  pub async fn ask(&self, prompts: &Prompts, topic: &str, question: &str) -> Result<String, GenerationError> {
    let user = fill_template(&prompts.tutor_user_template, &[("topic", topic), ("question", question)]);
    self.chat(&self.fast_model, &prompts.tutor_system, &user, 0.7, false).await
  }

  /// Propose a topic title for a new quest.
  #[instrument(level = "info", skip(self, prompts))]
  pub async fn suggest_topic(&self, prompts: &Prompts) -> Result<String, GenerationError> {
    let text = self.chat(&self.fast_model, &prompts.topic_system, "Suggest a topic.", 0.9, false).await?;
    Ok(text.lines().next().unwrap_or_default().trim_matches(|c| c == '"' || c == '\'').to_string())
  }

  /// Generate draft quests for a chapter. Invalid items are dropped; an
  /// output with no usable quest is an error.
  #[instrument(
    level = "info",
    skip(self, prompts, limits),
    fields(chapter_id = %req.chapter_id, quest_count = req.quest_count, per_quest = req.questions_per_quest, model = %self.strong_model)
  )]
  pub async fn generate_drafts(
    &self,
    prompts: &Prompts,
    limits: &GenerationSection,
    req: &DraftRequest<'_>,
  ) -> Result<Vec<Quest>, GenerationError> {
    let quest_count = req.quest_count.to_string();
    let per_quest = req.questions_per_quest.to_string();
    let user = fill_template(
      &prompts.quest_gen_user_template,
      &[
        ("chapter_id", req.chapter_id),
        ("chapter_title", req.chapter_title),
        ("quest_count", &quest_count),
        ("questions_per_quest", &per_quest),
      ],
    );
    let raw = self.chat(&self.strong_model, &prompts.quest_gen_system, &user, 0.8, true).await?;
    let batch: GeneratedBatch = serde_json::from_str(&raw).map_err(|e| {
      error!(target: "tutor", error = %e, "Generated batch is not valid JSON");
      GenerationError::Parse(e.to_string())
    })?;
    drafts_from_batch(batch, limits, req)
  }
}

/// Turn model output into draft quests, keeping only well-formed questions.
pub(crate) fn drafts_from_batch(
  batch: GeneratedBatch,
  limits: &GenerationSection,
  req: &DraftRequest<'_>,
) -> Result<Vec<Quest>, GenerationError> {
  let wanted = req.quest_count as usize;
  let mut out = Vec::new();
  for gq in batch.quests {
    if out.len() == wanted {
      break;
    }
    let questions: Vec<Question> = gq
      .questions
      .into_iter()
      .filter_map(|v| serde_json::from_value::<Question>(v).ok())
      .filter(question_is_well_formed)
      .take(req.questions_per_quest as usize)
      .collect();
    if questions.is_empty() || gq.title.trim().is_empty() {
      warn!(target: "tutor", title = %gq.title, "Dropping generated quest without usable questions");
      continue;
    }
    out.push(Quest {
      id: new_id("q"),
      chapter_id: req.chapter_id.to_string(),
      order: req.first_order + out.len() as u32,
      title: gq.title.trim().to_string(),
      topic: gq.topic,
      passing_score: limits.default_passing_score,
      reward_points: limits.default_reward_points,
      status: QuestStatus::Draft,
      image_url: None,
      content: gq.content,
      questions,
    });
  }
  if out.is_empty() {
    return Err(GenerationError::Parse("no usable quests in model output".into()));
  }
  Ok(out)
}

fn question_is_well_formed(q: &Question) -> bool {
  match q {
    Question::MultipleChoice { prompt, options, correct_index } => {
      !prompt.trim().is_empty() && options.len() >= 2 && *correct_index < options.len()
    }
    Question::TrueFalse { prompt, .. } => !prompt.trim().is_empty(),
  }
}

/// Starter questions offered in the tutor panel, chosen by topic keywords.
pub fn suggested_questions(topic: &str) -> Vec<&'static str> {
  let t = topic.to_lowercase();
  let picks: &[&'static str] = if t.contains("introduction") {
    &["What is an orientation?", "Show me a re-orientation example", "How are events ordered?"]
  } else if t.contains("irregular") {
    &["What is the past form of 'drink'?", "List common irregular verbs", "Drink, drank or drunk?"]
  } else if t.contains("regular") {
    &["When do I add -ed?", "More past tense examples", "What does 'watch' become?"]
  } else if t.contains("historical") {
    &["Example of a historical recount", "What makes it historical?", "How is it different from a personal recount?"]
  } else if t.contains("biograph") {
    &["How do I write a biography?", "Who can be the subject?", "How do I order life events?"]
  } else if t.contains("battle") || t.contains("final") {
    &["Review everything with me", "Tips for the final quiz", "Quiz me with a random question"]
  } else {
    &["Explain this topic", "Give me an example sentence", "What is the generic structure?"]
  };
  picks.to_vec()
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
