//! Seed data written on first run: default accounts, the starter curriculum
//! and the global system configuration.

use tracing::{info, instrument};

use crate::domain::{Chapter, ContentBlock, Question, Quest, QuestStatus, Role, SystemConfig, User};
use crate::engine::unlock::initial_unlocks;
use crate::error::StoreError;
use crate::store::{DocumentStore, Store};

/// Topics offered when the generation service cannot suggest one.
pub const FALLBACK_TOPICS: &[&str] = &[
  "A Memorable Holiday",
  "My First Day at School",
  "A Trip to the Museum",
  "An Unforgettable Birthday",
  "A Famous Inventor's Life",
];

pub fn seed_chapters() -> Vec<Chapter> {
  vec![
    Chapter { id: "ch1".into(), title: "Recount Basics".into(), order: 1, total_quests: 3 },
    Chapter { id: "ch2".into(), title: "Telling It In Order".into(), order: 2, total_quests: 3 },
    Chapter { id: "ch3".into(), title: "Recount Master".into(), order: 3, total_quests: 3 },
  ]
}

fn mc(prompt: &str, options: &[&str], correct_index: usize) -> Question {
  Question::MultipleChoice {
    prompt: prompt.into(),
    options: options.iter().map(|s| s.to_string()).collect(),
    correct_index,
  }
}

fn tf(prompt: &str, correct_boolean: bool) -> Question {
  Question::TrueFalse { prompt: prompt.into(), correct_boolean }
}

fn p(text: &str) -> ContentBlock { ContentBlock::P { text: text.into() } }
fn h1(text: &str) -> ContentBlock { ContentBlock::H1 { text: text.into() } }
fn list(items: &[&str]) -> ContentBlock { ContentBlock::List { items: items.iter().map(|s| s.to_string()).collect() } }

fn quest(id: &str, chapter_id: &str, order: u32, topic: &str, content: Vec<ContentBlock>, questions: Vec<Question>) -> Quest {
  Quest {
    id: id.into(),
    chapter_id: chapter_id.into(),
    order,
    title: format!("Quest {}", &id[1..]),
    topic: topic.into(),
    passing_score: 80,
    reward_points: 100,
    status: QuestStatus::Published,
    image_url: None,
    content,
    questions,
  }
}

pub fn seed_quests() -> Vec<Quest> {
  vec![
    quest("q1", "ch1", 1, "Introduction to Recount Text",
      vec![
        h1("What is a recount text?"),
        p("A recount retells past events or experiences in the order they happened."),
        list(&["Orientation: who, where and when.", "Events: what happened, in order.", "Re-orientation: closing remark."]),
      ],
      vec![
        mc("What is the main purpose of a recount text?", &["To retell past events", "To explain how to make something", "To persuade the reader", "To describe an object"], 0),
        mc("Which part introduces the characters and setting?", &["Events", "Orientation", "Re-orientation", "Conclusion"], 1),
        tf("Recount texts are usually written in the simple past tense.", true),
        mc("What does the 'Events' part contain?", &["Introductions", "A sequence of happenings", "A moral message", "Ingredients"], 1),
        tf("The orientation comes at the end of the text.", false),
      ]),
    quest("q2", "ch1", 2, "Simple Past: Regular Verbs",
      vec![h1("Regular verbs"), p("Regular verbs form the past tense by adding -ed."), list(&["walk -> walked", "play -> played", "visit -> visited"])],
      vec![
        mc("The past form of 'cook' is…", &["cooked", "cooking", "cooks", "cook"], 0),
        tf("'I played football yesterday' is in the past tense.", true),
        mc("The past form of 'visit' is…", &["visit", "visited", "visits", "visiting"], 1),
        tf("Regular verbs end in -ing in the past tense.", false),
        mc("Which sentence is in the past tense?", &["She dance last night", "She danced last night", "She dancing last night", "She dances last night"], 1),
      ]),
    quest("q3", "ch1", 3, "Simple Past: Irregular Verbs",
      vec![h1("Irregular verbs"), p("Irregular verbs change form in their own way."), list(&["go -> went", "eat -> ate", "see -> saw"])],
      vec![
        mc("The past form of 'go' is…", &["goed", "went", "gone", "going"], 1),
        mc("The past form of 'eat' is…", &["eaten", "eated", "ate", "eats"], 2),
        tf("The past form of 'see' is 'saw'.", true),
        tf("The past form of 'buy' is 'buyed'.", false),
        mc("The past form of 'write' is…", &["wrote", "writed", "written", "writes"], 0),
      ]),
    quest("q4", "ch2", 1, "Time Connectives",
      vec![h1("Time connectives"), p("Connectives keep events in order."), list(&["First", "Then", "After that", "Finally"])],
      vec![
        mc("Which word usually starts the first event?", &["Finally", "First", "After that", "Then"], 1),
        tf("'Finally' is used for the last event.", true),
        mc("Which connective fits the middle of a story?", &["Then", "Once upon a time", "In conclusion", "Firstly"], 0),
      ]),
    quest("q5", "ch2", 2, "Personal Recount",
      vec![h1("Personal recount"), p("A personal recount tells the writer's own experience, using 'I' or 'we'.")],
      vec![
        mc("Which pronoun is common in a personal recount?", &["They", "I", "It", "She"], 1),
        tf("A personal recount includes the writer's feelings.", true),
        tf("A personal recount is written in the future tense.", false),
      ]),
    quest("q6", "ch2", 3, "Historical Recount",
      vec![h1("Historical recount"), p("A historical recount retells important events from the past in detail.")],
      vec![
        tf("A historical recount reports real past events.", true),
        mc("Which is most likely a historical recount?", &["My holiday in Bali", "The Proclamation of Independence", "How to bake bread", "My pet cat"], 1),
        tf("Historical recounts should include dates and places.", true),
      ]),
    quest("q7", "ch3", 1, "Biographical Recount",
      vec![h1("Biographical recount"), p("A biography retells the life of a person in time order.")],
      vec![
        mc("A biography tells the story of…", &["a place", "a person's life", "a recipe", "an animal"], 1),
        tf("A biography is usually written in the third person.", true),
        tf("A biography skips the person's childhood by rule.", false),
      ]),
    quest("q8", "ch3", 2, "Adverbs of Time",
      vec![h1("Adverbs of time"), p("Adverbs of time say when something happened."), list(&["yesterday", "last week", "two days ago"])],
      vec![
        mc("Which is an adverb of time?", &["quickly", "yesterday", "happily", "carefully"], 1),
        tf("'Last week' refers to the past.", true),
        mc("Complete: 'We went to the zoo ___.'", &["tomorrow", "next week", "two days ago", "soon"], 2),
      ]),
    quest("q9", "ch3", 3, "Final Battle: Recount Master",
      vec![h1("Final battle"), p("Review everything: structure, past tense, connectives and time adverbs.")],
      vec![
        mc("Which part closes a recount?", &["Orientation", "Events", "Re-orientation", "Title"], 2),
        mc("The past form of 'run' is…", &["runned", "ran", "run", "running"], 1),
        tf("'After that' is a time connective.", true),
        tf("Recount texts usually use the present continuous tense.", false),
        mc("Which sentence is a good orientation?", &["Finally, we went home.", "Last Sunday, my family went to the beach.", "Then we swam.", "It was fun."], 1),
      ]),
  ]
}

fn account(id: &str, name: &str, credential: &str, secret: &str, role: Role, chapters: &[Chapter]) -> User {
  User {
    id: id.into(),
    display_name: name.into(),
    credential_id: credential.into(),
    secret: secret.into(),
    role,
    xp: 0,
    streak: 0,
    last_completion_date: None,
    unlocked_chapters: initial_unlocks(chapters),
  }
}

pub fn seed_users(chapters: &[Chapter]) -> Vec<User> {
  vec![
    account("u1", "Super Admin", "admin@school.id", "admin", Role::Admin, chapters),
    account("u2", "Mr. Budi", "teacher@school.id", "teacher", Role::Teacher, chapters),
    account("u3", "Ahmad Ridwan", "student@school.id", "student", Role::Student, chapters),
  ]
}

/// First-run bootstrap: fill an empty store with the defaults.
#[instrument(level = "info", skip(store))]
pub async fn seed_if_empty(store: &DocumentStore) -> Result<bool, StoreError> {
  if !store.is_empty().await {
    return Ok(false);
  }
  let chapters = seed_chapters();
  for c in &chapters {
    store.save_chapter(c).await?;
  }
  for q in seed_quests() {
    store.save_quest(&q).await?;
  }
  for u in seed_users(&chapters) {
    store.save_user(&u).await?;
  }
  if store.get_config().await?.is_none() {
    store.save_config(&SystemConfig::default()).await?;
  }
  info!(target: "store", "Seeded empty store with default curriculum and accounts");
  Ok(true)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::engine::grader::grade;
  use crate::domain::Answer;

  #[test]
  fn every_seed_quest_is_valid_and_passable() {
    let chapters = seed_chapters();
    for q in seed_quests() {
      assert!(chapters.iter().any(|c| c.id == q.chapter_id), "{} has a chapter", q.id);
      crate::logic::validate_quest(&q).unwrap();
      let answers: Vec<Answer> = q.questions.iter().map(|question| match question {
        Question::MultipleChoice { correct_index, .. } => Answer::Choice(*correct_index),
        Question::TrueFalse { correct_boolean, .. } => Answer::Boolean(*correct_boolean),
      }).collect();
      assert_eq!(grade(&q, &answers).unwrap().score, 100);
    }
  }

  #[tokio::test]
  async fn seeding_runs_once() {
    let store = DocumentStore::in_memory();
    assert!(seed_if_empty(&store).await.unwrap());
    assert!(!seed_if_empty(&store).await.unwrap());
    assert_eq!(store.get_chapters().await.unwrap().len(), 3);
    assert_eq!(store.get_quests(Some("ch2")).await.unwrap().len(), 3);
    let student = store.find_user_by_credential("student@school.id").await.unwrap().unwrap();
    assert!(student.has_unlocked("ch1"));
    assert!(!student.has_unlocked("ch2"));
  }
}
