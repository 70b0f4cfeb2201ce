//! NNTP implementation of [`ArticleStore`](crate::store::ArticleStore).
//!
//! The protocol layer is sans-io: [`Client`] turns [`Command`]s into bytes
//! and buffered bytes into [`Response`]s without touching a socket.
//! [`NntpConnection`] drives it over any [`AsyncStream`], and
//! [`NntpArticleStore`] maps the four store operations onto reader
//! commands.
//!
//! ```rust,no_run
//! use nntpchan_frontend::nntp::{NntpArticleStore, NntpSettings};
//! use nntpchan_frontend::ArticleStore;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = NntpArticleStore::new(NntpSettings::new("news.example.com:119"));
//! let groups = store.list_groups().await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod command;
mod connection;
mod error;
mod response;
mod store;
mod stream;

pub use client::Client;
pub use command::{ArticleSpec, Command};
pub use connection::NntpConnection;
pub use error::NntpError;
pub use response::{ActiveGroup, Response};
pub use store::{NntpArticleStore, NntpSettings};
pub use stream::{AsyncStream, TokioStream};
