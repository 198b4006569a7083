//! Progression engine: turns one graded quest attempt into the next user
//! profile and the completion record to persist.
//!
//! Pure computation. Callers read fresh state, call [`ProgressionEngine::attempt`],
//! and persist the returned [`Transition`] (see `ledger`).

pub mod grader;
pub mod streak;
pub mod unlock;

use chrono::{DateTime, Local, Utc};
use tracing::debug;

use crate::domain::{Answer, Chapter, CompletionRecord, Quest, User};
use crate::error::ValidationError;

use self::grader::Grade;
use self::streak::StreakChange;

#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    /// Maintain daily streaks on first-time passes.
    pub track_streaks: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { track_streaks: true }
    }
}

/// Read-only view of the curriculum the engine evaluates against.
#[derive(Clone, Copy)]
pub struct Curriculum<'a> {
    pub chapters: &'a [Chapter],
    pub quests: &'a [Quest],
}

/// Everything one attempt changes.
#[derive(Clone, Debug)]
pub struct Transition {
    pub grade: Grade,
    /// Updated profile; equal to the input when nothing was awarded.
    pub user: User,
    /// Upserted record for `(user.id, quest.id)`.
    pub record: CompletionRecord,
    /// Record that existed before this attempt, if any.
    pub previous: Option<CompletionRecord>,
    /// This attempt is the first passing one for the pair.
    pub first_pass: bool,
    pub xp_awarded: u32,
    pub streak_change: Option<StreakChange>,
    pub newly_unlocked: Vec<String>,
}

impl Transition {
    pub fn user_changed(&self) -> bool {
        self.first_pass || !self.newly_unlocked.is_empty()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ProgressionEngine {
    config: EngineConfig,
}

impl ProgressionEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Grade `answers` and compute the resulting transition.
    pub fn attempt(
        &self,
        user: &User,
        quest: &Quest,
        answers: &[Answer],
        completions: &[CompletionRecord],
        curriculum: Curriculum<'_>,
        now: DateTime<Local>,
    ) -> Result<Transition, ValidationError> {
        let grade = grader::grade(quest, answers)?;
        Ok(self.apply(user, quest, grade, completions, curriculum, now))
    }

    /// Apply an already computed grade.
    ///
    /// The record is always upserted with the latest score. Reward and streak
    /// happen only on the first passing attempt of the pair. Chapter unlocks are
    /// re-evaluated on every attempt so curriculum edits (an unpublished or
    /// deleted quest) cannot leave a finished chapter gating the next one.
    pub fn apply(
        &self,
        user: &User,
        quest: &Quest,
        grade: Grade,
        completions: &[CompletionRecord],
        curriculum: Curriculum<'_>,
        now: DateTime<Local>,
    ) -> Transition {
        let completed_at = now.with_timezone(&Utc);
        let previous = completions
            .iter()
            .find(|r| r.user_id == user.id && r.quest_id == quest.id)
            .cloned();
        let already_passed = previous.as_ref().is_some_and(CompletionRecord::has_passed);
        let first_pass = grade.passed && !already_passed;

        let record = CompletionRecord {
            user_id: user.id.clone(),
            quest_id: quest.id.clone(),
            score: grade.score,
            completed_at,
            passed_at: match &previous {
                Some(p) if p.passed_at.is_some() => p.passed_at,
                _ if grade.passed => Some(completed_at),
                _ => None,
            },
        };

        let mut next = user.clone();
        let mut xp_awarded = 0;
        let mut streak_change = None;

        if first_pass {
            xp_awarded = quest.reward_points;
            next.xp = next.xp.saturating_add(quest.reward_points);

            if self.config.track_streaks {
                let today = now.date_naive();
                let (value, change) = streak::next_streak(next.streak, next.last_completion_date, today);
                next.streak = value;
                next.last_completion_date = Some(today);
                streak_change = Some(change);
            }
        }

        let mut passed = unlock::passed_quests(completions);
        if record.has_passed() {
            passed.insert(quest.id.as_str());
        }
        let newly_unlocked = unlock::newly_unlocked(&next.unlocked_chapters, curriculum.chapters, curriculum.quests, &passed);
        next.unlocked_chapters.extend(newly_unlocked.iter().cloned());

        debug!(
            target: "progression",
            user_id = %user.id,
            quest_id = %quest.id,
            score = grade.score,
            passed = grade.passed,
            first_pass,
            xp_awarded,
            unlocked = ?newly_unlocked,
            "Attempt evaluated"
        );

        Transition { grade, user: next, record, previous, first_pass, xp_awarded, streak_change, newly_unlocked }
    }
}
