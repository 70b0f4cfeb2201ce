//! # nntpchan-frontend
//!
//! The frontend core of an anonymous imageboard whose posts live on an NNTP
//! news server. A newsgroup is a board; a root article and its replies,
//! linked through `References`, form a thread.
//!
//! The crate sits between HTTP handlers and the news backend:
//!
//! - [`store`]: the [`ArticleStore`] capability the frontend consumes
//! - [`nntp`]: the NNTP implementation of it, on a sans-io protocol client
//! - [`threading`]: assembling flat article lists into ordered threads
//! - [`posting`]: validating submissions and building articles from them
//! - [`frontend`]: the [`Frontend`] with its per-newsgroup cache
//! - [`mock`]: an in-memory [`ArticleStore`] for tests
//!
//! ## Example
//!
//! ```rust
//! use nntpchan_frontend::mock::MockArticleStore;
//! use nntpchan_frontend::{Frontend, FrontendConfig, PostRequest};
//!
//! # #[tokio::main]
//! # async fn main() -> nntpchan_frontend::Result<()> {
//! let store = MockArticleStore::new().with_group("overchan.test");
//! let frontend = Frontend::new(store, FrontendConfig::default())?;
//!
//! let root = frontend
//!     .submit_post(PostRequest::new_thread("overchan.test", "hello", "first post"))
//!     .await?;
//! let thread = frontend.get_thread("overchan.test", &root).await?;
//! assert_eq!(thread.reply_count(), 0);
//! # Ok(())
//! # }
//! ```
//!
//! With a real server, use [`nntp::NntpArticleStore`] in place of the mock.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod article;
pub mod config;
pub mod error;
pub mod frontend;
pub mod nntp;
pub mod posting;
pub mod store;
pub mod threading;

// In-memory store for testing
pub mod mock;

pub use article::{Article, Attachment, MessageId};
pub use config::FrontendConfig;
pub use error::{Error, Result};
pub use frontend::{CacheStats, Frontend, NewsgroupList, PostEvent};
pub use posting::{AttachmentUpload, PostRequest, PostValidator};
pub use store::ArticleStore;
pub use threading::{NewsgroupView, Resolution, Thread, ThreadSummary};
