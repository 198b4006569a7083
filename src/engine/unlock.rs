//! Chapter unlocking and intra-chapter quest gating.
//!
//! Chapter `k+1` opens once every published quest of chapter `k` has a passed
//! completion record. Chapters with no published quests never open the next
//! one. Unlocks only ever add to `unlocked_chapters`.

use std::collections::{BTreeSet, HashSet};

use crate::domain::{Chapter, CompletionRecord, Quest, User};

/// Chapters sorted by `order`.
pub fn ordered(chapters: &[Chapter]) -> Vec<&Chapter> {
    let mut out: Vec<&Chapter> = chapters.iter().collect();
    out.sort_by_key(|c| c.order);
    out
}

/// The chapter every account starts with.
pub fn first_chapter(chapters: &[Chapter]) -> Option<&Chapter> {
    chapters.iter().min_by_key(|c| c.order)
}

/// Initial unlock set for a freshly created account.
pub fn initial_unlocks(chapters: &[Chapter]) -> BTreeSet<String> {
    first_chapter(chapters).map(|c| c.id.clone()).into_iter().collect()
}

/// Quest ids the user has passed at least once.
pub fn passed_quests(completions: &[CompletionRecord]) -> HashSet<&str> {
    completions
        .iter()
        .filter(|r| r.has_passed())
        .map(|r| r.quest_id.as_str())
        .collect()
}

/// Published quests of a chapter, in intra-chapter order.
pub fn published_in<'a>(chapter_id: &str, quests: &'a [Quest]) -> Vec<&'a Quest> {
    let mut out: Vec<&Quest> = quests
        .iter()
        .filter(|q| q.chapter_id == chapter_id && q.is_published())
        .collect();
    out.sort_by_key(|q| q.order);
    out
}

/// True when the chapter has at least one published quest and all of them are passed.
pub fn chapter_complete(chapter_id: &str, quests: &[Quest], passed: &HashSet<&str>) -> bool {
    let published = published_in(chapter_id, quests);
    !published.is_empty() && published.iter().all(|q| passed.contains(q.id.as_str()))
}

/// Chapters that become unlocked given the current pass set, in order.
/// Already-unlocked chapters are never returned and never removed.
pub fn newly_unlocked(
    unlocked: &BTreeSet<String>,
    chapters: &[Chapter],
    quests: &[Quest],
    passed: &HashSet<&str>,
) -> Vec<String> {
    let ordered = ordered(chapters);
    let mut open: BTreeSet<&str> = unlocked.iter().map(String::as_str).collect();
    let mut fresh = Vec::new();

    for pair in ordered.windows(2) {
        let (current, next) = (pair[0], pair[1]);
        if open.contains(next.id.as_str()) {
            continue;
        }
        if open.contains(current.id.as_str()) && chapter_complete(&current.id, quests, passed) {
            open.insert(next.id.as_str());
            fresh.push(next.id.clone());
        }
    }
    fresh
}

/// Whether `user` may open `quest`. Staff are never gated. Students need the
/// chapter unlocked and the previous published quest attempted, unless they
/// already have a record for this quest.
pub fn quest_accessible(user: &User, quest: &Quest, quests: &[Quest], completions: &[CompletionRecord]) -> bool {
    if user.role.is_staff() {
        return true;
    }
    if !quest.is_published() || !user.has_unlocked(&quest.chapter_id) {
        return false;
    }
    let attempted: HashSet<&str> = completions.iter().map(|r| r.quest_id.as_str()).collect();
    if attempted.contains(quest.id.as_str()) {
        return true;
    }
    let siblings = published_in(&quest.chapter_id, quests);
    match siblings.iter().position(|q| q.id == quest.id) {
        Some(0) => true,
        Some(i) => attempted.contains(siblings[i - 1].id.as_str()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{QuestStatus, Role};
    use chrono::Utc;

    fn chapter(id: &str, order: u32) -> Chapter {
        Chapter { id: id.into(), title: id.to_uppercase(), order, total_quests: 2 }
    }

    fn quest(id: &str, chapter_id: &str, order: u32, status: QuestStatus) -> Quest {
        Quest {
            id: id.into(),
            chapter_id: chapter_id.into(),
            order,
            title: id.into(),
            topic: String::new(),
            passing_score: 80,
            reward_points: 100,
            status,
            image_url: None,
            content: vec![],
            questions: vec![],
        }
    }

    fn passed(quest_id: &str) -> CompletionRecord {
        CompletionRecord {
            user_id: "u".into(),
            quest_id: quest_id.into(),
            score: 100,
            completed_at: Utc::now(),
            passed_at: Some(Utc::now()),
        }
    }

    fn failed(quest_id: &str) -> CompletionRecord {
        CompletionRecord { passed_at: None, score: 10, ..passed(quest_id) }
    }

    fn student(unlocked: &[&str]) -> User {
        User {
            id: "u".into(),
            display_name: "U".into(),
            credential_id: "u@x".into(),
            secret: "pw".into(),
            role: Role::Student,
            xp: 0,
            streak: 0,
            last_completion_date: None,
            unlocked_chapters: unlocked.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn curriculum() -> (Vec<Chapter>, Vec<Quest>) {
        let chapters = vec![chapter("b", 2), chapter("a", 1), chapter("c", 3)];
        let quests = vec![
            quest("a1", "a", 1, QuestStatus::Published),
            quest("a2", "a", 2, QuestStatus::Published),
            quest("a3", "a", 3, QuestStatus::Draft),
            quest("b1", "b", 1, QuestStatus::Published),
        ];
        (chapters, quests)
    }

    #[test]
    fn first_chapter_is_lowest_order() {
        let (chapters, _) = curriculum();
        assert_eq!(first_chapter(&chapters).unwrap().id, "a");
        assert_eq!(initial_unlocks(&chapters), BTreeSet::from(["a".to_string()]));
    }

    #[test]
    fn next_chapter_waits_for_every_published_quest() {
        let (chapters, quests) = curriculum();
        let unlocked = BTreeSet::from(["a".to_string()]);

        let records = vec![passed("a1")];
        assert!(newly_unlocked(&unlocked, &chapters, &quests, &passed_quests(&records)).is_empty());

        // a3 is a draft and does not gate the chapter.
        let records = vec![passed("a1"), passed("a2")];
        assert_eq!(newly_unlocked(&unlocked, &chapters, &quests, &passed_quests(&records)), vec!["b"]);
    }

    #[test]
    fn draft_attempts_do_not_count() {
        let (chapters, quests) = curriculum();
        let unlocked = BTreeSet::from(["a".to_string()]);
        let records = vec![passed("a1"), passed("a3")];
        assert!(newly_unlocked(&unlocked, &chapters, &quests, &passed_quests(&records)).is_empty());
    }

    #[test]
    fn failed_records_do_not_complete_a_chapter() {
        let (chapters, quests) = curriculum();
        let unlocked = BTreeSet::from(["a".to_string()]);
        let records = vec![passed("a1"), failed("a2")];
        assert!(newly_unlocked(&unlocked, &chapters, &quests, &passed_quests(&records)).is_empty());
    }

    #[test]
    fn empty_chapter_never_opens_the_next() {
        let chapters = vec![chapter("a", 1), chapter("b", 2)];
        let quests = vec![quest("a1", "a", 1, QuestStatus::Draft)];
        let unlocked = BTreeSet::from(["a".to_string()]);
        let records = vec![passed("a1")];
        assert!(!chapter_complete("a", &quests, &passed_quests(&records)));
        assert!(newly_unlocked(&unlocked, &chapters, &quests, &passed_quests(&records)).is_empty());
    }

    #[test]
    fn already_unlocked_chapters_are_not_reported() {
        let (chapters, quests) = curriculum();
        let unlocked = BTreeSet::from(["a".to_string(), "b".to_string()]);
        let records = vec![passed("a1"), passed("a2"), passed("b1")];
        assert_eq!(newly_unlocked(&unlocked, &chapters, &quests, &passed_quests(&records)), vec!["c"]);
    }

    #[test]
    fn quest_gating_follows_intra_chapter_order() {
        let (_, quests) = curriculum();
        let user = student(&["a"]);
        let a1 = &quests[0];
        let a2 = &quests[1];
        let b1 = &quests[3];

        assert!(quest_accessible(&user, a1, &quests, &[]));
        assert!(!quest_accessible(&user, a2, &quests, &[]));
        assert!(quest_accessible(&user, a2, &quests, &[failed("a1")]));
        assert!(!quest_accessible(&user, b1, &quests, &[]), "chapter b is locked");
        assert!(!quest_accessible(&user, &quests[2], &quests, &[]), "drafts are hidden");

        let staff = User { role: Role::Teacher, ..student(&[]) };
        assert!(quest_accessible(&staff, b1, &quests, &[]));
    }
}
