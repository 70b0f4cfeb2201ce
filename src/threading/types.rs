//! Output types of the thread assembler.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::article::{Article, MessageId};

/// How an article was placed during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Resolution {
    /// Empty References: the article starts a thread.
    Root,
    /// Attached to the last entry of its References chain.
    DirectParent(MessageId),
    /// The direct parent is missing; attached to the closest ancestor present.
    NearestAncestor {
        /// The direct parent that could not be found
        missing: MessageId,
        /// The ancestor the reply was attached to instead
        attached_to: MessageId,
    },
    /// No ancestor resolves to a thread root; excluded from all threads.
    Orphan,
}

impl Resolution {
    /// The article this one hangs under, if any.
    pub fn attached_to(&self) -> Option<&MessageId> {
        match self {
            Resolution::DirectParent(parent) => Some(parent),
            Resolution::NearestAncestor { attached_to, .. } => Some(attached_to),
            Resolution::Root | Resolution::Orphan => None,
        }
    }
}

/// A root article and its resolved replies.
///
/// Replies are flattened in posting order (Date ascending, Message-ID as
/// tie-break); [`Thread::parent_of`] gives the tree edge of each reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Thread {
    root: Article,
    replies: Vec<Article>,
    parents: BTreeMap<MessageId, MessageId>,
    subject: String,
    last_activity: DateTime<Utc>,
}

impl Thread {
    pub(crate) fn new(
        root: Article,
        replies: Vec<Article>,
        parents: BTreeMap<MessageId, MessageId>,
        subject: String,
    ) -> Self {
        let last_activity = replies
            .iter()
            .map(|reply| reply.date)
            .fold(root.date, |latest, date| latest.max(date));
        Self {
            root,
            replies,
            parents,
            subject,
            last_activity,
        }
    }

    /// The article that started the thread.
    pub fn root(&self) -> &Article {
        &self.root
    }

    /// Message-ID of the root article.
    pub fn root_id(&self) -> &MessageId {
        &self.root.message_id
    }

    /// Replies in posting order.
    pub fn replies(&self) -> &[Article] {
        &self.replies
    }

    /// Normalized thread subject (without Re: prefixes).
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Latest Date over the root and all replies.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    /// Number of replies.
    pub fn reply_count(&self) -> usize {
        self.replies.len()
    }

    /// Root plus replies.
    pub fn article_count(&self) -> usize {
        1 + self.replies.len()
    }

    /// The article a reply was attached to.
    pub fn parent_of(&self, reply: &MessageId) -> Option<&MessageId> {
        self.parents.get(reply)
    }

    /// Find an article of this thread.
    pub fn find(&self, id: &MessageId) -> Option<&Article> {
        self.iter().find(|article| &article.message_id == id)
    }

    /// Whether the thread contains the article.
    pub fn contains(&self, id: &MessageId) -> bool {
        self.find(id).is_some()
    }

    /// Root first, then replies in posting order.
    pub fn iter(&self) -> impl Iterator<Item = &Article> {
        std::iter::once(&self.root).chain(self.replies.iter())
    }

    /// Listing entry for this thread.
    pub fn summary(&self) -> ThreadSummary {
        ThreadSummary {
            root_id: self.root.message_id.clone(),
            subject: self.subject.clone(),
            reply_count: self.replies.len(),
            created: self.root.date,
            last_activity: self.last_activity,
        }
    }
}

/// Listing entry for one thread of a newsgroup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadSummary {
    /// Message-ID of the root article
    pub root_id: MessageId,
    /// Normalized subject of the root article
    pub subject: String,
    /// Number of replies attached to the thread
    pub reply_count: usize,
    /// Date of the root article
    pub created: DateTime<Utc>,
    /// Latest Date in the thread ("last bump")
    pub last_activity: DateTime<Utc>,
}

/// Thread listing of a newsgroup, most recently active first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewsgroupView {
    /// Newsgroup name
    pub name: String,
    /// Thread summaries ordered by last activity, descending
    pub threads: Vec<ThreadSummary>,
}

impl NewsgroupView {
    /// Number of threads.
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    /// Whether the newsgroup has no threads.
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Summary of the thread rooted at `root`.
    pub fn find(&self, root: &MessageId) -> Option<&ThreadSummary> {
        self.threads.iter().find(|t| &t.root_id == root)
    }
}

/// Everything the assembler derived from one newsgroup's article set.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub(crate) view: Arc<NewsgroupView>,
    pub(crate) threads: Vec<Arc<Thread>>,
    pub(crate) by_root: HashMap<MessageId, usize>,
    pub(crate) resolutions: BTreeMap<MessageId, Resolution>,
    pub(crate) articles: HashMap<MessageId, Article>,
}

impl Assembly {
    /// Newsgroup name.
    pub fn group(&self) -> &str {
        &self.view.name
    }

    /// Thread listing.
    pub fn view(&self) -> Arc<NewsgroupView> {
        Arc::clone(&self.view)
    }

    /// Threads ordered like the listing.
    pub fn threads(&self) -> &[Arc<Thread>] {
        &self.threads
    }

    /// Thread rooted at `root`, if `root` is a thread root.
    pub fn thread(&self, root: &MessageId) -> Option<Arc<Thread>> {
        self.by_root
            .get(root)
            .map(|&index| Arc::clone(&self.threads[index]))
    }

    /// How an article was placed.
    pub fn resolution(&self, id: &MessageId) -> Option<&Resolution> {
        self.resolutions.get(id)
    }

    /// Articles excluded from every thread, in Message-ID order.
    pub fn orphans(&self) -> impl Iterator<Item = &MessageId> {
        self.resolutions
            .iter()
            .filter(|(_, resolution)| **resolution == Resolution::Orphan)
            .map(|(id, _)| id)
    }

    /// Any input article, orphans included.
    pub fn article(&self, id: &MessageId) -> Option<&Article> {
        self.articles.get(id)
    }

    /// Number of distinct input articles.
    pub fn article_count(&self) -> usize {
        self.articles.len()
    }
}
