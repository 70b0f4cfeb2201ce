//! Thread assembly for imageboard newsgroups.
//!
//! Turns the flat article set of a newsgroup into threads: a root article
//! plus every reply whose References chain leads back to it.
//!
//! - [`assemble`]: Build an [`Assembly`] from an unordered article set
//! - [`Thread`]: A root article and its replies in posting order
//! - [`NewsgroupView`]: The thread listing, most recently active first
//! - [`Resolution`]: How each article was placed (root, reply, orphan)
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use nntpchan_frontend::article::{Article, MessageId};
//! use nntpchan_frontend::threading::assemble;
//!
//! let root = Article {
//!     message_id: MessageId::new("1@host"),
//!     newsgroup: "overchan.test".to_string(),
//!     subject: Some("hi".to_string()),
//!     author: "Anonymous".to_string(),
//!     references: vec![],
//!     date: Utc::now(),
//!     body: "first".to_string(),
//!     attachment: None,
//! };
//! let reply = Article {
//!     message_id: MessageId::new("2@host"),
//!     subject: None,
//!     references: root.reply_references(),
//!     body: "second".to_string(),
//!     ..root.clone()
//! };
//!
//! let assembly = assemble("overchan.test", vec![reply, root]);
//! let thread = assembly.thread(&MessageId::new("1@host")).unwrap();
//! assert_eq!(thread.reply_count(), 1);
//! ```

mod algorithm;
mod types;

pub use algorithm::{assemble, normalize_subject};
pub use types::{Assembly, NewsgroupView, Resolution, Thread, ThreadSummary};
