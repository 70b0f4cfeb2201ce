//! The article store capability consumed by the frontend.
//!
//! An [`ArticleStore`] performs the raw exchanges with the news backend. The
//! frontend never sees connection state: it calls these four operations and
//! treats failures as opaque [`Error`](crate::Error) values. Reconnection,
//! pooling and authentication are the implementation's concern; see
//! [`NntpArticleStore`](crate::nntp::NntpArticleStore) for the NNTP one and
//! [`MockArticleStore`](crate::mock::MockArticleStore) for tests.

use std::sync::Arc;

use async_trait::async_trait;

use crate::article::{Article, MessageId};
use crate::error::Result;

/// Asynchronous access to the news backend.
#[async_trait]
pub trait ArticleStore: Send + Sync + 'static {
    /// List the names of all newsgroups the backend carries.
    ///
    /// Fails with `BackendUnavailable` if the server cannot be reached.
    async fn list_groups(&self) -> Result<Vec<String>>;

    /// Fetch every available article of a newsgroup, in no particular order.
    ///
    /// Fails with `UnknownNewsgroup` or `BackendUnavailable`.
    async fn list_articles(&self, group: &str) -> Result<Vec<Article>>;

    /// Fetch a single article.
    ///
    /// Fails with `ArticleNotFound` if the backend does not have it.
    async fn fetch_article(&self, group: &str, id: &MessageId) -> Result<Article>;

    /// Inject a new article.
    ///
    /// Fails with `InjectionFailed` when the backend rejects it, or
    /// `BackendUnavailable`.
    async fn post_article(&self, article: &Article) -> Result<()>;
}

#[async_trait]
impl<T: ArticleStore + ?Sized> ArticleStore for Arc<T> {
    async fn list_groups(&self) -> Result<Vec<String>> {
        (**self).list_groups().await
    }

    async fn list_articles(&self, group: &str) -> Result<Vec<Article>> {
        (**self).list_articles(group).await
    }

    async fn fetch_article(&self, group: &str, id: &MessageId) -> Result<Article> {
        (**self).fetch_article(group, id).await
    }

    async fn post_article(&self, article: &Article) -> Result<()> {
        (**self).post_article(article).await
    }
}
