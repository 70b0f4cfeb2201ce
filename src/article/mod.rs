//! Article model shared by the store, the thread assembler and the post builder.
//!
//! - [`MessageId`] - canonical (bracket-less) Message-ID with generation and checks
//! - [`Article`] - an immutable post in decoded form
//! - [`Attachment`] - an optional binary blob carried by a post
//!
//! The NNTP wire representation lives in the `wire` submodule
//! ([`Article::to_wire`] and [`Article::from_wire`]).

mod wire;

pub(crate) use wire::newsgroups;

use std::fmt;
use std::sync::LazyLock;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Poster name used when a submission does not carry one.
pub const DEFAULT_AUTHOR: &str = "Anonymous";

static WELL_FORMED_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^<[a-zA-Z0-9$.]{2,128}@[a-zA-Z0-9\-.]{2,63}>$").expect("valid regex")
});

/// A Message-ID, stored without the surrounding angle brackets.
///
/// `"<abc@host>"` and `"abc@host"` construct equal values; [`MessageId::to_wire`]
/// restores the bracketed form for headers and commands.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct MessageId(String);

impl MessageId {
    /// Create a Message-ID, stripping whitespace and angle brackets.
    pub fn new(id: impl AsRef<str>) -> Self {
        let id = id.as_ref().trim();
        let id = id.strip_prefix('<').unwrap_or(id);
        let id = id.strip_suffix('>').unwrap_or(id);
        Self(id.to_string())
    }

    /// Generate a fresh Message-ID for an article injected by this instance.
    ///
    /// The local part combines 8 random bytes with the current unix time, so
    /// collisions are negligible but not impossible; the backend has the final
    /// say when the article is posted.
    pub fn generate(instance: &str) -> Self {
        let entropy: [u8; 8] = rand::thread_rng().gen();
        let hex: String = entropy.iter().map(|b| format!("{b:02x}")).collect();
        Self(format!("{hex}${}@{instance}", Utc::now().timestamp()))
    }

    /// The bare id.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Host part after the last `@`; empty when there is none.
    ///
    /// For ids from [`MessageId::generate`] this is the injecting instance.
    pub fn domain(&self) -> &str {
        self.0.rsplit_once('@').map_or("", |(_, host)| host)
    }

    /// The bracketed form used on the wire.
    pub fn to_wire(&self) -> String {
        format!("<{}>", self.0)
    }

    /// Whether the id matches the format this gateway generates and accepts from peers.
    pub fn is_well_formed(&self) -> bool {
        WELL_FORMED_ID.is_match(&self.to_wire())
    }

    /// Whether the id can be placed in a header or command line verbatim.
    pub fn is_safe(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= 250
            && self.0.contains('@')
            && !self
                .0
                .chars()
                .any(|c| c.is_whitespace() || c.is_control() || c == '<' || c == '>')
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<MessageId> for String {
    fn from(id: MessageId) -> Self {
        id.0
    }
}

/// A single post, root or reply.
///
/// Articles are immutable once built; the assembler and the cache share
/// clones freely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    /// Globally unique id, assigned once before injection
    pub message_id: MessageId,
    /// Newsgroup the article was posted to
    pub newsgroup: String,
    /// Subject line (optional for replies)
    pub subject: Option<String>,
    /// Poster display name
    pub author: String,
    /// Ancestor ids, oldest first; empty for thread roots
    pub references: Vec<MessageId>,
    /// Creation time
    pub date: DateTime<Utc>,
    /// Text body
    pub body: String,
    /// Optional binary attachment
    pub attachment: Option<Attachment>,
}

impl Article {
    /// Whether this article starts a thread.
    pub fn is_root(&self) -> bool {
        self.references.is_empty()
    }

    /// The direct parent, i.e. the last entry of the References chain.
    pub fn parent_id(&self) -> Option<&MessageId> {
        self.references.last()
    }

    /// References for a reply to this article: its own chain plus its id.
    pub fn reply_references(&self) -> Vec<MessageId> {
        let mut references = self.references.clone();
        references.push(self.message_id.clone());
        references
    }
}

/// Binary payload attached to an article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    /// Original filename, if supplied
    pub filename: Option<String>,
    /// MIME content type, e.g. "image/png"
    pub content_type: String,
    /// Decoded bytes
    pub data: Bytes,
}

/// Check a newsgroup name: dot-separated, non-empty components of
/// lowercase ASCII letters, digits, `+`, `-` or `_`.
pub fn is_valid_newsgroup_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 128
        && name.split('.').all(|part| {
            !part.is_empty()
                && part.chars().all(|c| {
                    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '+' | '-' | '_')
                })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_normalization() {
        assert_eq!(MessageId::new("<1@host>"), MessageId::new("1@host"));
        assert_eq!(MessageId::new("  <a.b@c>  ").as_str(), "a.b@c");
        assert_eq!(MessageId::new("1@host").to_wire(), "<1@host>");
        assert_eq!(MessageId::from("<x@y>").to_string(), "x@y");
    }

    #[test]
    fn test_message_id_domain() {
        assert_eq!(MessageId::new("<1@host.example>").domain(), "host.example");
        assert_eq!(MessageId::new("a@b@c").domain(), "c");
        assert_eq!(MessageId::new("no-at-sign").domain(), "");
        assert_eq!(MessageId::generate("node1").domain(), "node1");
    }

    #[test]
    fn test_generated_ids_are_well_formed_and_distinct() {
        let a = MessageId::generate("nntpchan.example");
        let b = MessageId::generate("nntpchan.example");
        assert!(a.is_well_formed(), "{a} should be well formed");
        assert!(a.is_safe());
        assert!(a.as_str().ends_with("@nntpchan.example"));
        assert!(a.as_str().contains('$'));
        assert_ne!(a, b);
    }

    #[test]
    fn test_well_formed_rejects_short_or_odd_ids() {
        assert!(!MessageId::new("1@host").is_well_formed());
        assert!(!MessageId::new("no-at-sign").is_well_formed());
        assert!(!MessageId::new("bad space@host").is_well_formed());
        assert!(MessageId::new("<ab12$99@host.example>").is_well_formed());
    }

    #[test]
    fn test_is_safe() {
        assert!(MessageId::new("1@host").is_safe());
        assert!(!MessageId::new("").is_safe());
        assert!(!MessageId::new("no-at").is_safe());
        assert!(!MessageId::new("a@b\r\nQUIT").is_safe());
        assert!(!MessageId::new("a b@c").is_safe());
    }

    #[test]
    fn test_reply_references() {
        let root = Article {
            message_id: MessageId::new("1@host"),
            newsgroup: "overchan.test".to_string(),
            subject: Some("Hi".to_string()),
            author: DEFAULT_AUTHOR.to_string(),
            references: vec![],
            date: Utc::now(),
            body: "first".to_string(),
            attachment: None,
        };
        assert!(root.is_root());
        assert_eq!(root.parent_id(), None);
        assert_eq!(root.reply_references(), vec![MessageId::new("1@host")]);

        let reply = Article {
            message_id: MessageId::new("2@host"),
            references: root.reply_references(),
            ..root.clone()
        };
        assert!(!reply.is_root());
        assert_eq!(reply.parent_id(), Some(&MessageId::new("1@host")));
        assert_eq!(
            reply.reply_references(),
            vec![MessageId::new("1@host"), MessageId::new("2@host")]
        );
    }

    #[test]
    fn test_newsgroup_names() {
        assert!(is_valid_newsgroup_name("overchan.test"));
        assert!(is_valid_newsgroup_name("chat"));
        assert!(is_valid_newsgroup_name("alt.binaries.x-y_z+1"));
        assert!(!is_valid_newsgroup_name(""));
        assert!(!is_valid_newsgroup_name("overchan..test"));
        assert!(!is_valid_newsgroup_name(".overchan"));
        assert!(!is_valid_newsgroup_name("Overchan.Test"));
        assert!(!is_valid_newsgroup_name("overchan test"));
    }
}
