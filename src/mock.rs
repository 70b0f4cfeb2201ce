//! In-memory article store for testing purposes.
//!
//! [`MockArticleStore`] holds newsgroups and articles in memory, counts calls
//! per operation and can be told to fail or stall specific operations. Clones
//! share state, so a test can keep a handle while the frontend owns another.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::article::{Article, MessageId};
use crate::error::{Error, Result};
use crate::store::ArticleStore;

/// The four store operations, for failure and delay injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// [`ArticleStore::list_groups`]
    ListGroups,
    /// [`ArticleStore::list_articles`]
    ListArticles,
    /// [`ArticleStore::fetch_article`]
    FetchArticle,
    /// [`ArticleStore::post_article`]
    PostArticle,
}

/// Number of calls received per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// `list_groups` calls
    pub list_groups: usize,
    /// `list_articles` calls
    pub list_articles: usize,
    /// `fetch_article` calls
    pub fetch_article: usize,
    /// `post_article` calls
    pub post_article: usize,
}

impl CallCounts {
    /// Calls across all operations.
    pub fn total(&self) -> usize {
        self.list_groups + self.list_articles + self.fetch_article + self.post_article
    }

    fn bump(&mut self, op: StoreOp) {
        match op {
            StoreOp::ListGroups => self.list_groups += 1,
            StoreOp::ListArticles => self.list_articles += 1,
            StoreOp::FetchArticle => self.fetch_article += 1,
            StoreOp::PostArticle => self.post_article += 1,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    groups: BTreeMap<String, Vec<Article>>,
    calls: CallCounts,
    next_failures: HashMap<StoreOp, VecDeque<Error>>,
    failures: HashMap<StoreOp, Error>,
    delays: HashMap<StoreOp, Duration>,
    posted: Vec<Article>,
}

/// A recording [`ArticleStore`] backed by memory.
///
/// Posted articles are appended to their newsgroup, so later listings see
/// them. Posting a Message-ID that already exists fails with
/// [`Error::InjectionFailed`], like a real backend refusing a duplicate.
#[derive(Debug, Clone, Default)]
pub struct MockArticleStore {
    state: Arc<Mutex<MockState>>,
}

impl MockArticleStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the state from the others
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add an empty newsgroup.
    pub fn with_group(self, name: impl Into<String>) -> Self {
        self.state().groups.entry(name.into()).or_default();
        self
    }

    /// Add an article to its newsgroup, creating the group if needed.
    pub fn with_article(self, article: Article) -> Self {
        self.insert(article);
        self
    }

    /// Add an article after construction.
    pub fn insert(&self, article: Article) {
        self.state()
            .groups
            .entry(article.newsgroup.clone())
            .or_default()
            .push(article);
    }

    /// Remove an article, e.g. to simulate expiry.
    pub fn remove(&self, id: &MessageId) {
        for articles in self.state().groups.values_mut() {
            articles.retain(|article| &article.message_id != id);
        }
    }

    /// Fail the next call of `op` with `error`. Queued errors are used in order.
    pub fn fail_next(&self, op: StoreOp, error: Error) {
        self.state()
            .next_failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Fail every call of `op` with `error` until [`MockArticleStore::recover`].
    pub fn fail_always(&self, op: StoreOp, error: Error) {
        self.state().failures.insert(op, error);
    }

    /// Clear persistent failures of `op`.
    pub fn recover(&self, op: StoreOp) {
        self.state().failures.remove(&op);
    }

    /// Delay every call of `op` before it runs.
    pub fn set_delay(&self, op: StoreOp, delay: Duration) {
        self.state().delays.insert(op, delay);
    }

    /// Remove the delay of `op`.
    pub fn clear_delay(&self, op: StoreOp) {
        self.state().delays.remove(&op);
    }

    /// Calls received so far.
    pub fn calls(&self) -> CallCounts {
        self.state().calls
    }

    /// Reset the call counters.
    pub fn reset_calls(&self) {
        self.state().calls = CallCounts::default();
    }

    /// Articles accepted through `post_article`, in order.
    pub fn posted(&self) -> Vec<Article> {
        self.state().posted.clone()
    }

    /// Record the call, wait for the configured delay, then report an injected failure.
    async fn enter(&self, op: StoreOp) -> Result<()> {
        let delay = {
            let mut state = self.state();
            state.calls.bump(op);
            state.delays.get(&op).copied()
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if let Some(error) = state.next_failures.get_mut(&op).and_then(VecDeque::pop_front) {
            return Err(error);
        }
        match state.failures.get(&op) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ArticleStore for MockArticleStore {
    async fn list_groups(&self) -> Result<Vec<String>> {
        self.enter(StoreOp::ListGroups).await?;
        Ok(self.state().groups.keys().cloned().collect())
    }

    async fn list_articles(&self, group: &str) -> Result<Vec<Article>> {
        self.enter(StoreOp::ListArticles).await?;
        self.state()
            .groups
            .get(group)
            .cloned()
            .ok_or_else(|| Error::UnknownNewsgroup(group.to_string()))
    }

    async fn fetch_article(&self, group: &str, id: &MessageId) -> Result<Article> {
        self.enter(StoreOp::FetchArticle).await?;
        self.state()
            .groups
            .get(group)
            .and_then(|articles| articles.iter().find(|a| &a.message_id == id))
            .cloned()
            .ok_or_else(|| Error::ArticleNotFound(id.clone()))
    }

    async fn post_article(&self, article: &Article) -> Result<()> {
        self.enter(StoreOp::PostArticle).await?;
        let mut state = self.state();

        let duplicate = state
            .groups
            .values()
            .flatten()
            .any(|existing| existing.message_id == article.message_id);
        if duplicate {
            return Err(Error::InjectionFailed(format!(
                "441 duplicate Message-ID {}",
                article.message_id.to_wire()
            )));
        }

        state
            .groups
            .entry(article.newsgroup.clone())
            .or_default()
            .push(article.clone());
        state.posted.push(article.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn article(id: &str, group: &str) -> Article {
        Article {
            message_id: MessageId::new(id),
            newsgroup: group.to_string(),
            subject: Some("Hi".to_string()),
            author: "Anonymous".to_string(),
            references: vec![],
            date: Utc::now(),
            body: "body".to_string(),
            attachment: None,
        }
    }

    #[tokio::test]
    async fn test_mock_store_lists_and_fetches() {
        let store = MockArticleStore::new()
            .with_group("empty")
            .with_article(article("1@host", "chat"));

        assert_eq!(store.list_groups().await.unwrap(), vec!["chat", "empty"]);
        assert_eq!(store.list_articles("chat").await.unwrap().len(), 1);
        assert!(store.list_articles("empty").await.unwrap().is_empty());
        assert_eq!(
            store.list_articles("nope").await.unwrap_err(),
            Error::UnknownNewsgroup("nope".to_string())
        );
        assert!(store
            .fetch_article("chat", &MessageId::new("1@host"))
            .await
            .is_ok());
        assert!(store
            .fetch_article("chat", &MessageId::new("2@host"))
            .await
            .unwrap_err()
            .is_not_found());

        let calls = store.calls();
        assert_eq!(calls.list_groups, 1);
        assert_eq!(calls.list_articles, 3);
        assert_eq!(calls.fetch_article, 2);
        assert_eq!(calls.total(), 6);
    }

    #[tokio::test]
    async fn test_mock_store_failures() {
        let store = MockArticleStore::new().with_group("chat");

        store.fail_next(StoreOp::ListGroups, Error::BackendUnavailable("down".into()));
        assert!(store.list_groups().await.unwrap_err().is_transient());
        assert!(store.list_groups().await.is_ok());

        store.fail_always(StoreOp::ListArticles, Error::BackendUnavailable("down".into()));
        assert!(store.list_articles("chat").await.is_err());
        assert!(store.list_articles("chat").await.is_err());
        store.recover(StoreOp::ListArticles);
        assert!(store.list_articles("chat").await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_store_post_rejects_duplicates() {
        let store = MockArticleStore::new();
        let a = article("1@host", "chat");

        store.post_article(&a).await.unwrap();
        let err = store.post_article(&a).await.unwrap_err();
        assert!(matches!(err, Error::InjectionFailed(_)));

        assert_eq!(store.posted().len(), 1);
        assert_eq!(store.list_articles("chat").await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_store_delay() {
        let store = MockArticleStore::new().with_group("chat");
        store.set_delay(StoreOp::ListGroups, Duration::from_secs(5));

        let started = tokio::time::Instant::now();
        store.list_groups().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(5));
    }
}
