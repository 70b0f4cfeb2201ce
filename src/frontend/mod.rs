//! The imageboard frontend: cached thread views over an [`ArticleStore`].
//!
//! [`Frontend`] is built once at startup and shared (typically as
//! `Arc<Frontend<S>>`) with the HTTP handlers, which call:
//!
//! - [`Frontend::list_newsgroups`]: newsgroup names, served stale on backend failure
//! - [`Frontend::get_newsgroup_view`]: thread listing of a newsgroup
//! - [`Frontend::get_thread`]: one thread with all its replies
//! - [`Frontend::submit_post`]: validate, build and inject a post
//!
//! [`Frontend::run`] starts the background staleness sweep.
//!
//! Every store call is bounded by `call_timeout` and never retried. A failed
//! fetch leaves the cache untouched; an accepted post invalidates its
//! newsgroup before the call returns, so the next read fetches again.

mod cache;

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use cache::CacheStats;

use crate::article::{Article, MessageId};
use crate::config::FrontendConfig;
use crate::error::{Error, Result};
use crate::posting::{PostRequest, PostValidator};
use crate::store::ArticleStore;
use crate::threading::{assemble, NewsgroupView, Thread};
use cache::{Cache, CacheEntry, Lookup, Ticket};

/// Result of [`Frontend::list_newsgroups`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewsgroupList {
    /// Newsgroup names, sorted
    pub names: Vec<String>,
    /// Set when the backend was unreachable and the last known list is served
    pub stale: bool,
}

/// Published after a post was accepted by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostEvent {
    /// Newsgroup the post went to
    pub newsgroup: String,
    /// Message-ID of the new article
    pub message_id: MessageId,
    /// Root of the thread the post belongs to (the post itself for new threads)
    pub root: MessageId,
}

/// Orchestrates the store, the thread assembler and the post builder.
pub struct Frontend<S: ArticleStore> {
    store: S,
    config: FrontendConfig,
    cache: Arc<Cache>,
    known_groups: Mutex<Option<Vec<String>>>,
    events: broadcast::Sender<PostEvent>,
    started: AtomicBool,
    shutdown: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<S: ArticleStore> Frontend<S> {
    /// Create a frontend over `store`.
    ///
    /// Fails with [`Error::Config`] if the configuration does not validate.
    pub fn new(store: S, config: FrontendConfig) -> Result<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.event_capacity);
        Ok(Self {
            store,
            config,
            cache: Arc::new(Cache::new()),
            known_groups: Mutex::new(None),
            events,
            started: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            sweeper: Mutex::new(None),
        })
    }

    /// The active configuration.
    pub fn config(&self) -> &FrontendConfig {
        &self.config
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Receive a [`PostEvent`] for every accepted post from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PostEvent> {
        self.events.subscribe()
    }

    /// List the newsgroups this frontend serves.
    ///
    /// Not cached. When the backend is unreachable the last successful list is
    /// returned with `stale` set; without one the error is returned.
    pub async fn list_newsgroups(&self) -> Result<NewsgroupList> {
        match self.call("list_groups", self.store.list_groups()).await {
            Ok(mut names) => {
                names.retain(|name| self.config.allows_newsgroup(name));
                names.sort();
                names.dedup();
                *lock(&self.known_groups) = Some(names.clone());
                Ok(NewsgroupList {
                    names,
                    stale: false,
                })
            }
            Err(e) if e.is_transient() => {
                let last_known = lock(&self.known_groups).clone();
                match last_known {
                    Some(names) => {
                        warn!(error = %e, "backend unavailable, serving last known newsgroup list");
                        Ok(NewsgroupList { names, stale: true })
                    }
                    None => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Thread listing of `newsgroup`, most recently active first.
    pub async fn get_newsgroup_view(&self, newsgroup: &str) -> Result<Arc<NewsgroupView>> {
        self.ensure_served(newsgroup)?;
        let (entry, _) = self.load(newsgroup).await?;
        Ok(entry.assembly.view())
    }

    /// The thread of `newsgroup` rooted at `root`.
    ///
    /// A cached assembly without that root is refetched once before failing
    /// with [`Error::ThreadNotFound`], so threads created by other gateways
    /// show up without waiting for the staleness window. Entries younger
    /// than `refetch_min_age` are trusted as they are.
    pub async fn get_thread(&self, newsgroup: &str, root: &MessageId) -> Result<Arc<Thread>> {
        self.ensure_served(newsgroup)?;

        let (entry, cached) = self.load(newsgroup).await?;
        if let Some(thread) = entry.assembly.thread(root) {
            return Ok(thread);
        }

        if cached && !entry.is_fresh(self.config.refetch_min_age) {
            debug!(newsgroup = %newsgroup, root = %root, "thread not in cached assembly, refetching");
            let ticket = self.cache.ticket(newsgroup).await;
            let entry = self.refresh(newsgroup, ticket).await?;
            if let Some(thread) = entry.assembly.thread(root) {
                return Ok(thread);
            }
        }

        Err(Error::ThreadNotFound {
            newsgroup: newsgroup.to_string(),
            root: root.clone(),
        })
    }

    /// Validate, build and inject a post; returns the new Message-ID.
    ///
    /// Field errors are reported before any backend call. For replies the
    /// parent must exist in the same newsgroup. On success the newsgroup's
    /// cache entry is invalidated and a [`PostEvent`] is published; on
    /// failure the cache is left as it was.
    pub async fn submit_post(&self, request: PostRequest) -> Result<MessageId> {
        let validator = PostValidator::new(&self.config);
        validator.check(&request)?;

        let parent = match &request.parent {
            Some(id) => Some(self.resolve_parent(&request.newsgroup, id).await?),
            None => None,
        };
        let article = validator.build(request, parent.as_ref())?;

        if let Err(e) = self
            .call("post_article", self.store.post_article(&article))
            .await
        {
            warn!(
                newsgroup = %article.newsgroup,
                message_id = %article.message_id,
                error = %e,
                "post rejected"
            );
            return Err(e);
        }

        self.cache.invalidate(&article.newsgroup).await;

        let root = article
            .references
            .first()
            .unwrap_or(&article.message_id)
            .clone();
        info!(
            newsgroup = %article.newsgroup,
            message_id = %article.message_id,
            root = %root,
            "post accepted"
        );

        // No subscribers is fine
        let _ = self.events.send(PostEvent {
            newsgroup: article.newsgroup,
            message_id: article.message_id.clone(),
            root,
        });

        Ok(article.message_id)
    }

    /// Drop the cached assembly of `newsgroup`.
    pub async fn invalidate(&self, newsgroup: &str) {
        debug!(newsgroup = %newsgroup, "cache invalidated");
        self.cache.invalidate(newsgroup).await;
    }

    /// Current cache occupancy.
    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Start the periodic staleness sweep on the current tokio runtime.
    ///
    /// Returns immediately. Only the first call starts anything; later calls
    /// (and calls outside a runtime) return `false`.
    pub fn run(&self) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            return false;
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "no tokio runtime, staleness sweep not started");
                self.started.store(false, Ordering::SeqCst);
                return false;
            }
        };

        let cache = Arc::clone(&self.cache);
        let token = self.shutdown.clone();
        let period = self.config.sweep_interval;
        let window = self.config.staleness_window;

        let task = handle.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately
            interval.tick().await;

            info!(interval_secs = period.as_secs(), "cache sweep started");
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        info!("cache sweep stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        let evicted = cache.sweep(window).await;
                        if evicted > 0 {
                            debug!(evicted, "evicted stale cache entries");
                        }
                    }
                }
            }
        });
        *lock(&self.sweeper) = Some(task);
        true
    }

    /// Stop the background sweep and wait for it to finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let task = lock(&self.sweeper).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "cache sweep task failed");
            }
        }
    }

    fn ensure_served(&self, newsgroup: &str) -> Result<()> {
        if self.config.allows_newsgroup(newsgroup) {
            Ok(())
        } else {
            Err(Error::UnknownNewsgroup(newsgroup.to_string()))
        }
    }

    /// The assembly of `newsgroup`, and whether it came from the cache.
    async fn load(&self, newsgroup: &str) -> Result<(Arc<CacheEntry>, bool)> {
        match self
            .cache
            .lookup(newsgroup, self.config.staleness_window)
            .await
        {
            Lookup::Hit(entry) => {
                debug!(newsgroup = %newsgroup, "cache hit");
                Ok((entry, true))
            }
            Lookup::Miss(ticket) => {
                debug!(newsgroup = %newsgroup, "cache miss");
                Ok((self.refresh(newsgroup, ticket).await?, false))
            }
        }
    }

    /// Fetch and assemble `newsgroup`; the cache is only touched on success.
    async fn refresh(&self, newsgroup: &str, ticket: Ticket) -> Result<Arc<CacheEntry>> {
        let articles = self
            .call("list_articles", self.store.list_articles(newsgroup))
            .await?;
        let assembly = assemble(newsgroup, articles);

        let orphans = assembly.orphans().count();
        if orphans > 0 {
            warn!(newsgroup = %newsgroup, orphans, "replies without a resolvable thread root");
        }

        Ok(self.cache.store(ticket, assembly).await)
    }

    /// Find the parent of a reply, from the cache or the backend.
    async fn resolve_parent(&self, newsgroup: &str, id: &MessageId) -> Result<Article> {
        if let Some(entry) = self.cache.peek(newsgroup).await {
            if let Some(article) = entry.assembly.article(id) {
                return Ok(article.clone());
            }
        }

        match self
            .call("fetch_article", self.store.fetch_article(newsgroup, id))
            .await
        {
            Ok(article) if article.newsgroup == newsgroup => Ok(article),
            Ok(article) => Err(Error::validation(
                "parent",
                format!("{id} belongs to {}", article.newsgroup),
            )),
            Err(Error::ArticleNotFound(_)) => {
                Err(Error::validation("parent", format!("{id} does not exist")))
            }
            Err(e) => Err(e),
        }
    }

    /// Run a store call under the configured timeout.
    async fn call<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let after = self.config.call_timeout;
        match tokio::time::timeout(after, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, timeout_secs = after.as_secs(), "backend call timed out");
                Err(Error::BackendTimeout { operation, after })
            }
        }
    }
}

impl<S: ArticleStore> Drop for Frontend<S> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
