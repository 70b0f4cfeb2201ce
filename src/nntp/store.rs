//! [`ArticleStore`] backed by a single NNTP reader session.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::command::ArticleSpec;
use super::connection::NntpConnection;
use super::error::NntpError;
use super::stream::{AsyncStream, TokioStream};
use crate::article::{self, Article, MessageId};
use crate::error::{Error, Result};
use crate::store::ArticleStore;

/// Connection settings for [`NntpArticleStore`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NntpSettings {
    /// Server address as "host:port" (default: "127.0.0.1:119")
    #[serde(default = "default_address")]
    pub address: String,

    /// AUTHINFO user; authentication is skipped when unset
    #[serde(default)]
    pub username: Option<String>,

    /// AUTHINFO password
    #[serde(default)]
    pub password: Option<String>,

    /// Most recent articles fetched per newsgroup listing (default: 500)
    #[serde(default = "default_article_window")]
    pub article_window: usize,

    /// Timeout for connecting, MODE READER and authentication (default: 10s)
    #[serde(
        default = "default_connect_timeout",
        with = "crate::config::duration_serde"
    )]
    pub connect_timeout: Duration,
}

impl Default for NntpSettings {
    fn default() -> Self {
        Self {
            address: default_address(),
            username: None,
            password: None,
            article_window: default_article_window(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

impl NntpSettings {
    /// Settings for the server at `address`, everything else defaulted.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    /// Parse settings from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Self =
            toml::from_str(content).map_err(|e| Error::Config(format!("invalid nntp settings: {e}")))?;
        if settings.article_window == 0 {
            return Err(Error::Config("article_window must be at least 1".to_string()));
        }
        Ok(settings)
    }

    /// Use AUTHINFO USER/PASS with these credentials.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Limit listings to the `window` most recent articles.
    pub fn with_article_window(mut self, window: usize) -> Self {
        self.article_window = window;
        self
    }
}

fn default_address() -> String {
    "127.0.0.1:119".to_string()
}

fn default_article_window() -> usize {
    500
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Article store talking to an NNTP server.
///
/// One session is kept and shared by all calls, one exchange at a time. It
/// is opened on first use. A wire failure discards it and the next call
/// reconnects; calls themselves are never retried.
///
/// The session is checked out of its slot for the duration of a call, so a
/// caller cancelled mid-exchange (for instance by a timeout) drops the
/// half-used connection instead of returning it out of sync.
pub struct NntpArticleStore<S: AsyncStream = TokioStream> {
    settings: NntpSettings,
    session: Mutex<Option<NntpConnection<S>>>,
}

impl NntpArticleStore<TokioStream> {
    /// Create a store over TCP. No connection is made until the first call.
    pub fn new(settings: NntpSettings) -> Self {
        Self::with_stream(settings)
    }
}

impl<S: AsyncStream> NntpArticleStore<S> {
    /// Create a store over a custom stream type.
    pub fn with_stream(settings: NntpSettings) -> Self {
        Self {
            settings,
            session: Mutex::new(None),
        }
    }

    /// The settings this store was created with.
    pub fn settings(&self) -> &NntpSettings {
        &self.settings
    }

    /// Whether a session is currently open.
    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Send QUIT and drop the session, if any.
    pub async fn close(&self) {
        let Some(conn) = self.session.lock().await.take() else {
            return;
        };
        if let Err(e) = conn.quit().await {
            debug!(error = %e, "QUIT failed");
        }
    }

    async fn connect(&self) -> Result<NntpConnection<S>> {
        let settings = &self.settings;
        let handshake = async {
            let mut conn = NntpConnection::<S>::connect(&settings.address).await?;
            conn.mode_reader().await?;
            if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
                conn.authenticate(username, password).await?;
            }
            Ok::<_, NntpError>(conn)
        };

        match tokio::time::timeout(settings.connect_timeout, handshake).await {
            Ok(Ok(conn)) => {
                info!(
                    address = %settings.address,
                    posting_allowed = conn.is_posting_allowed(),
                    "connected to news server"
                );
                Ok(conn)
            }
            Ok(Err(e)) => {
                warn!(address = %settings.address, error = %e, "news server handshake failed");
                Err(e.into_store_error())
            }
            Err(_) => Err(Error::BackendUnavailable(format!(
                "connecting to {} timed out after {:?}",
                settings.address, settings.connect_timeout
            ))),
        }
    }

    async fn checkout(&self, slot: &mut Option<NntpConnection<S>>) -> Result<NntpConnection<S>> {
        match slot.take() {
            Some(conn) => Ok(conn),
            None => self.connect().await,
        }
    }

    fn checkin<T>(
        &self,
        slot: &mut Option<NntpConnection<S>>,
        conn: NntpConnection<S>,
        result: &std::result::Result<T, NntpError>,
    ) {
        match result {
            Err(e) if e.breaks_session() => {
                warn!(address = %self.settings.address, error = %e, "dropping news server session");
            }
            _ => *slot = Some(conn),
        }
    }

    async fn read_group(
        &self,
        conn: &mut NntpConnection<S>,
        group: &str,
    ) -> std::result::Result<Vec<Article>, NntpError> {
        let (count, first, last) = conn.group(group).await?;
        if count == 0 || last < first {
            return Ok(Vec::new());
        }

        let window = self.settings.article_window.max(1);
        let low = last.saturating_sub(window as u64 - 1).max(first);
        let numbers = conn.listgroup(group, Some(format!("{low}-{last}"))).await?;
        let start = numbers.len().saturating_sub(window);

        let mut articles = Vec::with_capacity(numbers.len() - start);
        for &number in &numbers[start..] {
            let raw = match conn.article(ArticleSpec::Number(number)).await {
                Ok(raw) => raw,
                // Expired or cancelled between LISTGROUP and ARTICLE
                Err(NntpError::Protocol { code: 423 | 430, .. }) => {
                    debug!(group, number, "article vanished, skipping");
                    continue;
                }
                Err(e) => return Err(e),
            };
            match Article::from_wire(&raw) {
                Ok(mut article) => {
                    article.newsgroup = group.to_string();
                    articles.push(article);
                }
                Err(e) => warn!(group, number, error = %e, "skipping undecodable article"),
            }
        }

        debug!(group, fetched = articles.len(), "read newsgroup");
        Ok(articles)
    }
}

#[async_trait]
impl<S: AsyncStream> ArticleStore for NntpArticleStore<S> {
    async fn list_groups(&self) -> Result<Vec<String>> {
        let mut slot = self.session.lock().await;
        let mut conn = self.checkout(&mut slot).await?;
        let result = conn.list_active().await;
        self.checkin(&mut slot, conn, &result);

        let groups = result.map_err(NntpError::into_store_error)?;
        Ok(groups.into_iter().map(|group| group.name).collect())
    }

    async fn list_articles(&self, group: &str) -> Result<Vec<Article>> {
        let mut slot = self.session.lock().await;
        let mut conn = self.checkout(&mut slot).await?;
        let result = self.read_group(&mut conn, group).await;
        self.checkin(&mut slot, conn, &result);

        result.map_err(|e| match e {
            NntpError::Protocol { code: 411, .. } => Error::UnknownNewsgroup(group.to_string()),
            other => other.into_store_error(),
        })
    }

    async fn fetch_article(&self, group: &str, id: &MessageId) -> Result<Article> {
        let mut slot = self.session.lock().await;
        let mut conn = self.checkout(&mut slot).await?;
        let result = conn.article(ArticleSpec::MessageId(id.to_wire())).await;
        self.checkin(&mut slot, conn, &result);

        let raw = result.map_err(|e| match e {
            NntpError::Protocol { code: 423 | 430, .. } => Error::ArticleNotFound(id.clone()),
            other => other.into_store_error(),
        })?;

        if !article::newsgroups(&raw).iter().any(|g| g == group) {
            debug!(%id, group, "article is not posted to this newsgroup");
            return Err(Error::ArticleNotFound(id.clone()));
        }
        let mut article = Article::from_wire(&raw)?;
        article.newsgroup = group.to_string();
        Ok(article)
    }

    async fn post_article(&self, article: &Article) -> Result<()> {
        let text = article.to_wire();

        let mut slot = self.session.lock().await;
        let mut conn = self.checkout(&mut slot).await?;
        let result = conn.post(&text).await;
        self.checkin(&mut slot, conn, &result);

        result.map_err(|e| match e {
            NntpError::Protocol {
                code: code @ (440 | 441),
                message,
            } => Error::InjectionFailed(format!("{code} {message}")),
            other => other.into_store_error(),
        })?;
        info!(id = %article.message_id, newsgroup = %article.newsgroup, "article injected");
        Ok(())
    }
}
