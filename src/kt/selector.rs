//! Difficulty-aware content selection.
//!
//! The target difficulty is the student's mastery scaled onto the skill's
//! item range; items already answered correctly are skipped until the whole
//! pool is exhausted, after which the least recently answered item is
//! offered for review.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::{StateRepository, StorageError};
use crate::kt::error::KtError;
use crate::kt::state_store::KnowledgeStateStore;
use crate::kt::types::{ContentItem, ContentItemId, Response, SkillId, StudentId};

#[async_trait]
pub trait ContentCatalog: Send + Sync {
    async fn items_for_skill(&self, skill: &SkillId) -> Result<Vec<ContentItem>, StorageError>;

    async fn item(&self, id: &ContentItemId) -> Result<Option<ContentItem>, StorageError>;
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryCatalog {
    items: HashMap<ContentItemId, ContentItem>,
    by_skill: HashMap<SkillId, Vec<ContentItemId>>,
}

impl InMemoryCatalog {
    pub fn new<I: IntoIterator<Item = ContentItem>>(items: I) -> Self {
        let mut catalog = Self::default();
        for item in items {
            catalog.insert(item);
        }
        catalog
    }

    pub fn insert(&mut self, item: ContentItem) {
        let ids = self.by_skill.entry(item.skill_id.clone()).or_default();
        if !ids.contains(&item.id) {
            ids.push(item.id.clone());
        }
        self.items.insert(item.id.clone(), item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl ContentCatalog for InMemoryCatalog {
    async fn items_for_skill(&self, skill: &SkillId) -> Result<Vec<ContentItem>, StorageError> {
        Ok(self
            .by_skill
            .get(skill)
            .map(|ids| ids.iter().filter_map(|id| self.items.get(id).cloned()).collect())
            .unwrap_or_default())
    }

    async fn item(&self, id: &ContentItemId) -> Result<Option<ContentItem>, StorageError> {
        Ok(self.items.get(id).cloned())
    }
}

pub struct ContentSelector {
    catalog: Arc<dyn ContentCatalog>,
    store: Arc<KnowledgeStateStore>,
    repo: Arc<dyn StateRepository>,
}

impl ContentSelector {
    pub fn new(
        catalog: Arc<dyn ContentCatalog>,
        store: Arc<KnowledgeStateStore>,
        repo: Arc<dyn StateRepository>,
    ) -> Self {
        Self {
            catalog,
            store,
            repo,
        }
    }

    pub async fn select_next(
        &self,
        student: &StudentId,
        skill: &SkillId,
    ) -> Result<ContentItem, KtError> {
        let mastery = self.store.get(student, skill).await?;
        let items = self.catalog.items_for_skill(skill).await?;
        if items.is_empty() {
            return Err(KtError::NoContentAvailable(skill.clone()));
        }
        let history = self.repo.responses_for(student, skill).await?;

        choose_item(&items, mastery, &history)
            .cloned()
            .ok_or_else(|| KtError::NoContentAvailable(skill.clone()))
    }
}

pub fn target_difficulty(mastery: f64, max_difficulty: u32) -> u32 {
    (mastery.clamp(0.0, 1.0) * f64::from(max_difficulty)).round() as u32
}

pub fn choose_item<'a>(
    items: &'a [ContentItem],
    mastery: f64,
    history: &[Response],
) -> Option<&'a ContentItem> {
    let max_difficulty = items.iter().map(|i| i.difficulty).max()?;
    let target = target_difficulty(mastery, max_difficulty);

    let answered_correctly: HashSet<&ContentItemId> = history
        .iter()
        .filter(|r| r.correct)
        .map(|r| &r.item_id)
        .collect();

    let fresh = items
        .iter()
        .filter(|i| !answered_correctly.contains(&i.id))
        .min_by(|a, b| {
            let key = |i: &ContentItem| (i.difficulty.abs_diff(target), i.difficulty);
            key(*a).cmp(&key(*b)).then_with(|| a.id.cmp(&b.id))
        });
    if fresh.is_some() {
        return fresh;
    }

    let mut last_answered: HashMap<&ContentItemId, DateTime<Utc>> = HashMap::new();
    for r in history {
        last_answered
            .entry(&r.item_id)
            .and_modify(|t| *t = (*t).max(r.answered_at))
            .or_insert(r.answered_at);
    }

    items.iter().min_by(|a, b| {
        last_answered
            .get(&a.id)
            .cmp(&last_answered.get(&b.id))
            .then_with(|| a.id.cmp(&b.id))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn items() -> Vec<ContentItem> {
        (1..=5)
            .map(|d| ContentItem::new(format!("q{d}"), "a", d))
            .collect()
    }

    fn answered(item: &str, correct: bool, minutes_ago: i64) -> Response {
        let item = ContentItem::new(item, "a", 1);
        Response::new(
            "s".into(),
            &item,
            correct,
            Utc::now() - Duration::minutes(minutes_ago),
        )
    }

    #[test]
    fn test_target_difficulty_is_proportional() {
        assert_eq!(target_difficulty(0.0, 5), 0);
        assert_eq!(target_difficulty(0.5, 5), 3);
        assert_eq!(target_difficulty(1.0, 5), 5);
        assert_eq!(target_difficulty(0.62, 10), 6);
    }

    #[test]
    fn test_picks_nearest_difficulty() {
        let items = items();
        assert_eq!(choose_item(&items, 0.6, &[]).unwrap().id.as_str(), "q3");
        assert_eq!(choose_item(&items, 0.0, &[]).unwrap().id.as_str(), "q1");
        assert_eq!(choose_item(&items, 0.99, &[]).unwrap().id.as_str(), "q5");
    }

    #[test]
    fn test_skips_correctly_answered_items() {
        let items = items();
        let history = vec![answered("q3", true, 5), answered("q4", false, 4)];
        let chosen = choose_item(&items, 0.6, &history).unwrap();
        // q2 and q4 are equally near; the easier one wins.
        assert_eq!(chosen.id.as_str(), "q2");

        let history = vec![answered("q3", true, 5), answered("q2", true, 4)];
        assert_eq!(choose_item(&items, 0.6, &history).unwrap().id.as_str(), "q4");
    }

    #[test]
    fn test_review_least_recently_answered_when_exhausted() {
        let items = items();
        let history = vec![
            answered("q1", true, 10),
            answered("q2", true, 50),
            answered("q3", true, 30),
            answered("q4", true, 20),
            answered("q5", true, 40),
            answered("q2", false, 1),
        ];
        assert_eq!(choose_item(&items, 0.5, &history).unwrap().id.as_str(), "q5");
    }

    #[test]
    fn test_empty_pool() {
        assert!(choose_item(&[], 0.5, &[]).is_none());
    }
}
