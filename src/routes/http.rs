//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Failures are returned as `ServiceError`, which renders its own status and JSON body.

use std::sync::Arc;
use axum::{extract::{Path, Query, State}, Json, response::IntoResponse};
use tracing::{info, instrument};

use crate::accounts::{self, NewAccount};
use crate::domain::{Quest, SystemConfig};
use crate::error::ServiceError;
use crate::logic;
use crate::protocol::*;
use crate::state::AppState;
use crate::tutor::suggested_questions;

type ApiResult<T> = Result<Json<T>, ServiceError>;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

pub async fn http_public_config(State(state): State<Arc<AppState>>) -> ApiResult<PublicConfigOut> {
  Ok(Json(logic::public_config(&state).await?))
}

#[instrument(level = "info", skip(state, body), fields(credential = %body.credential))]
pub async fn http_register(
  State(state): State<Arc<AppState>>,
  Json(body): Json<RegisterIn>,
) -> ApiResult<UserOut> {
  let user = accounts::register(state.store.as_ref(), state.store_timeout, body.display_name, body.credential, body.secret).await?;
  Ok(Json(user_out(&user)))
}

#[instrument(level = "info", skip(state, body), fields(credential = %body.credential))]
pub async fn http_login(
  State(state): State<Arc<AppState>>,
  Json(body): Json<LoginIn>,
) -> ApiResult<UserOut> {
  let user = accounts::login(state.store.as_ref(), state.store_timeout, &body.credential, &body.secret).await?;
  Ok(Json(user_out(&user)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_user(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<UserOut> {
  Ok(Json(user_out(&logic::user_profile(&state, &id).await?)))
}

pub async fn http_leaderboard(State(state): State<Arc<AppState>>) -> ApiResult<Vec<UserOut>> {
  let board = accounts::leaderboard(state.store.as_ref(), state.store_timeout).await?;
  Ok(Json(board.iter().map(user_out).collect()))
}

#[instrument(level = "info", skip(state), fields(user_id = %q.user_id))]
pub async fn http_chapters(
  State(state): State<Arc<AppState>>,
  Query(q): Query<UserQuery>,
) -> ApiResult<Vec<ChapterView>> {
  Ok(Json(logic::chapter_board(&state, &q.user_id).await?))
}

#[instrument(level = "info", skip(state), fields(user_id = %q.user_id))]
pub async fn http_quest_detail(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Query(q): Query<UserQuery>,
) -> ApiResult<QuestOut> {
  Ok(Json(logic::quest_detail(&state, &q.user_id, &id).await?))
}

#[instrument(level = "info", skip(state, body), fields(user_id = %body.user_id, answers = body.answers.len()))]
pub async fn http_submit_quest(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<SubmitIn>,
) -> ApiResult<QuestOutcomeOut> {
  let out = logic::submit_quest(&state, &body.user_id, &id, &body.answers).await?;
  info!(target: "questline", quest_id = %id, score = out.score, result = ?out.result, xp = out.xp_awarded, "HTTP quest submitted");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, body), fields(topic = %body.topic, question_len = body.question.len()))]
pub async fn http_ask_tutor(
  State(state): State<Arc<AppState>>,
  Json(body): Json<TutorIn>,
) -> impl IntoResponse {
  Json(logic::ask_tutor(&state, &body.topic, &body.question).await)
}

pub async fn http_suggestions(Query(q): Query<TopicQuery>) -> impl IntoResponse {
  let questions = suggested_questions(&q.topic).into_iter().map(String::from).collect();
  Json(SuggestionsOut { questions })
}

pub async fn http_suggest_topic(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(logic::suggest_topic(&state).await)
}

//
// Staff endpoints. The acting user is named in the body or query.
//

#[instrument(level = "info", skip(state, body), fields(actor_id = %body.actor_id, role = ?body.role))]
pub async fn http_provision_user(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ProvisionIn>,
) -> ApiResult<UserOut> {
  let new = NewAccount { display_name: body.display_name, credential: body.credential, secret: body.secret, role: body.role };
  let user = accounts::provision(state.store.as_ref(), state.store_timeout, &body.actor_id, new).await?;
  Ok(Json(user_out(&user)))
}

#[instrument(level = "info", skip(state), fields(actor_id = %q.actor_id))]
pub async fn http_list_users(
  State(state): State<Arc<AppState>>,
  Query(q): Query<ActorQuery>,
) -> ApiResult<Vec<UserOut>> {
  let users = accounts::list_users(state.store.as_ref(), state.store_timeout, &q.actor_id).await?;
  Ok(Json(users.iter().map(user_out).collect()))
}

#[instrument(level = "info", skip(state), fields(actor_id = %q.actor_id))]
pub async fn http_class_stats(
  State(state): State<Arc<AppState>>,
  Query(q): Query<ActorQuery>,
) -> ApiResult<ClassStatsOut> {
  Ok(Json(logic::class_stats(&state, &q.actor_id).await?))
}

#[instrument(level = "info", skip(state), fields(actor_id = %q.actor_id))]
pub async fn http_delete_user(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Query(q): Query<ActorQuery>,
) -> ApiResult<OkOut> {
  accounts::delete_user(&state.ledger, &q.actor_id, &id).await?;
  Ok(Json(OkOut { ok: true }))
}

#[instrument(level = "info", skip(state, body), fields(actor_id = %body.actor_id, delta = body.delta))]
pub async fn http_adjust_xp(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<AdjustXpIn>,
) -> ApiResult<UserOut> {
  let user = accounts::adjust_xp(&state.ledger, &body.actor_id, &id, body.delta).await?;
  Ok(Json(user_out(&user)))
}

#[instrument(level = "info", skip(state, body), fields(actor_id = %body.actor_id))]
pub async fn http_save_quest(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SaveQuestIn>,
) -> ApiResult<Quest> {
  Ok(Json(logic::save_quest(&state, &body.actor_id, body.quest).await?))
}

#[instrument(level = "info", skip(state, body), fields(actor_id = %body.actor_id, status = ?body.status))]
pub async fn http_set_quest_status(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<QuestStatusIn>,
) -> ApiResult<Quest> {
  Ok(Json(logic::set_quest_status(&state, &body.actor_id, &id, body.status).await?))
}

#[instrument(level = "info", skip(state), fields(actor_id = %q.actor_id))]
pub async fn http_delete_quest(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Query(q): Query<ActorQuery>,
) -> ApiResult<OkOut> {
  logic::delete_quest(&state, &q.actor_id, &id).await?;
  Ok(Json(OkOut { ok: true }))
}

#[instrument(level = "info", skip(state, body), fields(actor_id = %body.actor_id, quest_count = body.quest_count))]
pub async fn http_generate_drafts(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<GenerateIn>,
) -> ApiResult<Vec<Quest>> {
  let drafts = logic::generate_chapter_drafts(&state, &body.actor_id, &id, body.quest_count, body.questions_per_quest).await?;
  Ok(Json(drafts))
}

#[instrument(level = "info", skip(state), fields(actor_id = %q.actor_id))]
pub async fn http_get_admin_config(
  State(state): State<Arc<AppState>>,
  Query(q): Query<ActorQuery>,
) -> ApiResult<SystemConfig> {
  Ok(Json(logic::admin_config(&state, &q.actor_id).await?))
}

#[instrument(level = "info", skip(state, body), fields(actor_id = %body.actor_id))]
pub async fn http_save_config(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SaveConfigIn>,
) -> ApiResult<SystemConfig> {
  Ok(Json(logic::save_system_config(&state, &body.actor_id, body.config).await?))
}
