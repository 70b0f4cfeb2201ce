//! Thread assembly algorithm.
//!
//! Reconstructs reply trees from a flat, unordered article set using each
//! article's References chain. The result only depends on the set itself:
//! every map that drives iteration is ordered by Message-ID, and replies are
//! sorted by (Date, Message-ID).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::types::{Assembly, NewsgroupView, Resolution, Thread};
use crate::article::{Article, MessageId};

/// Assemble the threads of `group` from its articles.
///
/// Steps:
/// 1. Index articles by Message-ID (duplicates keep the earliest copy)
/// 2. Resolve each reply's attach target: the direct parent (last
///    References entry) if present, otherwise the nearest ancestor found
///    walking References backwards, otherwise the reply is an orphan
/// 3. Follow attach targets to a root; chains that cycle or end at an
///    orphan make the reply an orphan too
/// 4. Gather each root's replies in posting order
/// 5. Order threads by last activity, most recent first
pub fn assemble(group: &str, articles: impl IntoIterator<Item = Article>) -> Assembly {
    // Step 1: Index
    let mut by_id: BTreeMap<MessageId, Article> = BTreeMap::new();
    for article in articles {
        match by_id.get(&article.message_id) {
            Some(existing) if dedupe_key(existing) <= dedupe_key(&article) => {}
            _ => {
                by_id.insert(article.message_id.clone(), article);
            }
        }
    }

    // Step 2: Resolve attach targets
    let mut resolutions: BTreeMap<MessageId, Resolution> = by_id
        .values()
        .map(|article| (article.message_id.clone(), resolve(article, &by_id)))
        .collect();

    // Step 3: Find the root of every article
    let mut roots: BTreeMap<MessageId, Option<MessageId>> = BTreeMap::new();
    for id in by_id.keys() {
        find_root(id, &resolutions, &mut roots);
    }
    for (id, root) in &roots {
        if root.is_none() {
            resolutions.insert(id.clone(), Resolution::Orphan);
        }
    }

    // Step 4: Gather replies per root
    let mut members: BTreeMap<&MessageId, Vec<&MessageId>> = BTreeMap::new();
    for (id, root) in &roots {
        if let Some(root) = root {
            if root != id {
                members.entry(root).or_default().push(id);
            } else {
                members.entry(root).or_default();
            }
        }
    }

    let mut threads: Vec<Thread> = Vec::with_capacity(members.len());
    for (root_id, reply_ids) in members {
        let Some(root) = by_id.get(root_id) else {
            continue;
        };
        let mut replies: Vec<Article> = reply_ids
            .iter()
            .filter_map(|id| by_id.get(*id))
            .cloned()
            .collect();
        replies.sort_by(|a, b| (a.date, &a.message_id).cmp(&(b.date, &b.message_id)));

        let parents: BTreeMap<MessageId, MessageId> = replies
            .iter()
            .filter_map(|reply| {
                resolutions
                    .get(&reply.message_id)
                    .and_then(Resolution::attached_to)
                    .map(|parent| (reply.message_id.clone(), parent.clone()))
            })
            .collect();

        let subject = normalize_subject(root.subject.as_deref().unwrap_or_default());
        threads.push(Thread::new(root.clone(), replies, parents, subject));
    }

    // Step 5: Most recent activity first
    threads.sort_by(|a, b| {
        b.last_activity()
            .cmp(&a.last_activity())
            .then_with(|| a.root_id().cmp(b.root_id()))
    });

    let view = NewsgroupView {
        name: group.to_string(),
        threads: threads.iter().map(Thread::summary).collect(),
    };
    let threads: Vec<Arc<Thread>> = threads.into_iter().map(Arc::new).collect();
    let by_root = threads
        .iter()
        .enumerate()
        .map(|(index, thread)| (thread.root_id().clone(), index))
        .collect();

    let orphan_count = resolutions
        .values()
        .filter(|r| **r == Resolution::Orphan)
        .count();
    debug!(
        newsgroup = %group,
        articles = by_id.len(),
        threads = threads.len(),
        orphans = orphan_count,
        "assembled newsgroup"
    );

    Assembly {
        view: Arc::new(view),
        threads,
        by_root,
        resolutions,
        articles: by_id.into_iter().collect::<HashMap<_, _>>(),
    }
}

/// Total order over copies of one Message-ID; the smallest copy is kept.
///
/// Earliest Date first, then every other field, so the surviving copy never
/// depends on input order.
fn dedupe_key(
    article: &Article,
) -> (
    DateTime<Utc>,
    &str,
    Option<&str>,
    &[MessageId],
    &str,
    &str,
    Option<(&str, Option<&str>, &[u8])>,
) {
    (
        article.date,
        article.body.as_str(),
        article.subject.as_deref(),
        article.references.as_slice(),
        article.author.as_str(),
        article.newsgroup.as_str(),
        article
            .attachment
            .as_ref()
            .map(|a| (a.content_type.as_str(), a.filename.as_deref(), &a.data[..])),
    )
}

/// Decide where a single article attaches.
fn resolve(article: &Article, by_id: &BTreeMap<MessageId, Article>) -> Resolution {
    let Some(direct) = article.parent_id() else {
        return Resolution::Root;
    };

    let found = article
        .references
        .iter()
        .rev()
        .filter(|candidate| **candidate != article.message_id)
        .find(|candidate| by_id.contains_key(*candidate));

    match found {
        Some(parent) if parent == direct => Resolution::DirectParent(parent.clone()),
        Some(ancestor) => Resolution::NearestAncestor {
            missing: direct.clone(),
            attached_to: ancestor.clone(),
        },
        None => Resolution::Orphan,
    }
}

/// Follow attach targets from `start` to a root, memoizing every visited id.
///
/// Iterative so deep reply chains cannot overflow the stack.
fn find_root(
    start: &MessageId,
    resolutions: &BTreeMap<MessageId, Resolution>,
    memo: &mut BTreeMap<MessageId, Option<MessageId>>,
) -> Option<MessageId> {
    let mut path: Vec<MessageId> = Vec::new();
    let mut on_path: BTreeSet<MessageId> = BTreeSet::new();
    let mut current = start.clone();

    let root = loop {
        if let Some(known) = memo.get(&current) {
            break known.clone();
        }
        if !on_path.insert(current.clone()) {
            // Reference cycle
            break None;
        }
        path.push(current.clone());

        match resolutions.get(&current) {
            Some(Resolution::Root) => break Some(current.clone()),
            Some(resolution) => match resolution.attached_to() {
                Some(next) => current = next.clone(),
                None => break None,
            },
            None => break None,
        }
    };

    for id in path {
        memo.insert(id, root.clone());
    }
    root
}

/// Normalize a subject line by removing Re:, Fwd:, etc. prefixes.
pub fn normalize_subject(subject: &str) -> String {
    let mut normalized = subject.trim().to_string();

    // Common prefixes to remove (case-insensitive)
    let prefixes = ["re:", "fwd:", "fw:", "aw:", "sv:", "antw:"];

    loop {
        let lower = normalized.to_lowercase();
        let mut found = false;

        for prefix in &prefixes {
            if lower.starts_with(prefix) {
                normalized = normalized[prefix.len()..].trim_start().to_string();
                found = true;
                break;
            }
        }

        // [Fwd: ...] style
        if normalized.starts_with('[') {
            if let Some(end) = normalized.find(']') {
                let bracket_content = normalized[1..end].to_lowercase();
                if prefixes
                    .iter()
                    .any(|p| bracket_content.starts_with(p.trim_end_matches(':')))
                {
                    normalized = normalized[end + 1..].trim_start().to_string();
                    found = true;
                }
            }
        }

        if !found {
            break;
        }
    }

    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn make_article(id: &str, subject: Option<&str>, minute: u32, references: &[&str]) -> Article {
        Article {
            message_id: MessageId::new(id),
            newsgroup: "overchan.test".to_string(),
            subject: subject.map(str::to_string),
            author: "Anonymous".to_string(),
            references: references.iter().map(MessageId::new).collect(),
            date: Utc.with_ymd_and_hms(2024, 1, 1, 12, minute, 0).unwrap(),
            body: format!("body of {id}"),
            attachment: None,
        }
    }

    fn id(s: &str) -> MessageId {
        MessageId::new(s)
    }

    #[test]
    fn test_normalize_subject() {
        assert_eq!(normalize_subject("Hello World"), "Hello World");
        assert_eq!(normalize_subject("Re: Hello World"), "Hello World");
        assert_eq!(normalize_subject("RE: Hello World"), "Hello World");
        assert_eq!(normalize_subject("Re: Re: Hello World"), "Hello World");
        assert_eq!(normalize_subject("Fwd: Hello World"), "Hello World");
        assert_eq!(normalize_subject("Re: Fwd: Hello World"), "Hello World");
        assert_eq!(normalize_subject("Aw: Hello World"), "Hello World");
        assert_eq!(
            normalize_subject("[Fwd: Something] Hello World"),
            "Hello World"
        );
        assert_eq!(normalize_subject(""), "");
    }

    #[test]
    fn test_assemble_empty() {
        let assembly = assemble("overchan.test", Vec::new());
        assert_eq!(assembly.group(), "overchan.test");
        assert!(assembly.threads().is_empty());
        assert!(assembly.view().is_empty());
    }

    #[test]
    fn test_assemble_single_root() {
        let assembly = assemble(
            "overchan.test",
            vec![make_article("root@x", Some("Hello"), 0, &[])],
        );

        assert_eq!(assembly.threads().len(), 1);
        let thread = assembly.thread(&id("root@x")).unwrap();
        assert_eq!(thread.article_count(), 1);
        assert_eq!(thread.subject(), "Hello");
        assert_eq!(assembly.resolution(&id("root@x")), Some(&Resolution::Root));
    }

    #[test]
    fn test_assemble_nested_replies_in_date_order() {
        let articles = vec![
            make_article("root@x", Some("Hello"), 0, &[]),
            make_article("late@x", None, 30, &["root@x", "early@x"]),
            make_article("early@x", None, 10, &["root@x"]),
            make_article("middle@x", None, 20, &["root@x"]),
        ];

        let assembly = assemble("overchan.test", articles);
        let thread = assembly.thread(&id("root@x")).unwrap();

        let order: Vec<&str> = thread.replies().iter().map(|a| a.message_id.as_str()).collect();
        assert_eq!(order, vec!["early@x", "middle@x", "late@x"]);
        assert_eq!(thread.parent_of(&id("late@x")), Some(&id("early@x")));
        assert_eq!(thread.parent_of(&id("middle@x")), Some(&id("root@x")));
        assert_eq!(
            thread.last_activity(),
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 30, 0).unwrap()
        );

        let summary = &assembly.view().threads[0];
        assert_eq!(summary.reply_count, 3);
        assert_eq!(summary.subject, "Hello");
    }

    #[test]
    fn test_assemble_orders_threads_by_last_activity() {
        let articles = vec![
            make_article("old@x", Some("Old"), 0, &[]),
            make_article("new@x", Some("New"), 5, &[]),
            // A late reply bumps the old thread above the new one
            make_article("bump@x", None, 40, &["old@x"]),
        ];

        let assembly = assemble("overchan.test", articles);
        let view = assembly.view();
        let roots: Vec<&str> = view.threads.iter().map(|t| t.root_id.as_str()).collect();
        assert_eq!(roots, vec!["old@x", "new@x"]);
        assert_eq!(view.threads[0].reply_count, 1);
    }

    #[test]
    fn test_assemble_tie_break_by_message_id() {
        let articles = vec![
            make_article("b@x", Some("B"), 0, &[]),
            make_article("a@x", Some("A"), 0, &[]),
            make_article("r2@x", None, 7, &["a@x"]),
            make_article("r1@x", None, 7, &["a@x"]),
            make_article("r3@x", None, 7, &["b@x"]),
        ];

        let assembly = assemble("overchan.test", articles);
        let thread_ids: Vec<String> = assembly
            .threads()
            .iter()
            .map(|t| t.root_id().to_string())
            .collect();
        assert_eq!(thread_ids, vec!["a@x", "b@x"]);

        let replies: Vec<&str> = assembly.threads()[0]
            .replies()
            .iter()
            .map(|a| a.message_id.as_str())
            .collect();
        assert_eq!(replies, vec!["r1@x", "r2@x"]);
    }

    #[test]
    fn test_assemble_is_independent_of_input_order() {
        let articles = vec![
            make_article("r@x", Some("Root"), 0, &[]),
            make_article("a@x", None, 1, &["r@x"]),
            make_article("b@x", None, 1, &["r@x", "a@x"]),
            make_article("c@x", None, 3, &["r@x", "gone@x"]),
            make_article("s@x", Some("Second"), 2, &[]),
            make_article("t@x", None, 2, &["s@x"]),
            make_article("o@x", None, 4, &["nowhere@x"]),
        ];
        let mut reversed = articles.clone();
        reversed.reverse();
        let mut rotated = articles.clone();
        rotated.rotate_left(3);

        let first = assemble("overchan.test", articles);
        for other in [reversed, rotated] {
            let second = assemble("overchan.test", other);
            assert_eq!(first.view(), second.view());
            assert_eq!(first.threads(), second.threads());
            assert_eq!(
                first.orphans().collect::<Vec<_>>(),
                second.orphans().collect::<Vec<_>>()
            );
        }
    }

    #[test]
    fn test_missing_parent_attaches_to_grandparent() {
        let articles = vec![
            make_article("grand@x", Some("Top"), 0, &[]),
            // "parent@x" expired from the backend
            make_article("child@x", None, 5, &["grand@x", "parent@x"]),
        ];

        let assembly = assemble("overchan.test", articles);
        assert_eq!(
            assembly.resolution(&id("child@x")),
            Some(&Resolution::NearestAncestor {
                missing: id("parent@x"),
                attached_to: id("grand@x"),
            })
        );

        let thread = assembly.thread(&id("grand@x")).unwrap();
        assert_eq!(thread.reply_count(), 1);
        assert_eq!(thread.parent_of(&id("child@x")), Some(&id("grand@x")));
    }

    #[test]
    fn test_unresolvable_reply_is_orphaned_not_promoted() {
        let articles = vec![
            make_article("root@x", Some("Root"), 0, &[]),
            make_article("lost@x", None, 5, &["gone1@x", "gone2@x"]),
            // Hangs under the orphan, so it is orphaned as well
            make_article("under-lost@x", None, 6, &["gone1@x", "gone2@x", "lost@x"]),
        ];

        let assembly = assemble("overchan.test", articles);
        assert_eq!(assembly.threads().len(), 1);
        assert!(assembly.thread(&id("lost@x")).is_none());
        assert!(assembly.thread(&id("gone2@x")).is_none());
        assert!(!assembly.threads()[0].contains(&id("lost@x")));

        let orphans: Vec<&str> = assembly.orphans().map(MessageId::as_str).collect();
        assert_eq!(orphans, vec!["lost@x", "under-lost@x"]);
        // Orphans are still known for parent lookups
        assert!(assembly.article(&id("lost@x")).is_some());
    }

    #[test]
    fn test_reference_cycle_is_orphaned() {
        let articles = vec![
            make_article("a@x", None, 0, &["b@x"]),
            make_article("b@x", None, 1, &["a@x"]),
            make_article("self@x", None, 2, &["self@x"]),
        ];

        let assembly = assemble("overchan.test", articles);
        assert!(assembly.threads().is_empty());
        assert_eq!(assembly.orphans().count(), 3);
    }

    #[test]
    fn test_duplicate_ids_keep_earliest_copy() {
        let mut late = make_article("dup@x", Some("Late"), 9, &[]);
        late.body = "late".to_string();
        let early = make_article("dup@x", Some("Early"), 1, &[]);

        let one = assemble("overchan.test", vec![late.clone(), early.clone()]);
        let two = assemble("overchan.test", vec![early, late]);

        assert_eq!(one.article_count(), 1);
        assert_eq!(one.threads(), two.threads());
        assert_eq!(one.threads()[0].subject(), "Early");
    }

    #[test]
    fn test_summary_uses_normalized_subject() {
        let articles = vec![
            make_article("root@x", Some("Re: Fwd: Hello"), 0, &[]),
            make_article("a@x", None, 1, &["root@x"]),
        ];
        let assembly = assemble("overchan.test", articles);

        let thread = &assembly.threads()[0];
        assert_eq!(thread.subject(), "Hello");
        assert_eq!(thread.summary().subject, "Hello");
        assert_eq!(assembly.view().threads[0].subject, "Hello");
    }

    #[test]
    fn test_duplicate_ids_differing_only_in_headers() {
        let a = make_article("dup@x", Some("A"), 1, &[]);
        let b = make_article("dup@x", Some("B"), 1, &[]);

        let one = assemble("overchan.test", vec![a.clone(), b.clone()]);
        let two = assemble("overchan.test", vec![b, a]);

        assert_eq!(one.view(), two.view());
        assert_eq!(one.threads(), two.threads());
        assert_eq!(one.threads()[0].subject(), "A");

        // Same date, body and subject; only the chain differs
        let root = make_article("root@x", Some("Root"), 0, &[]);
        let direct = make_article("dup@x", None, 2, &["root@x"]);
        let mut nested = direct.clone();
        nested.references = vec![id("other@x"), id("root@x")];

        let one = assemble(
            "overchan.test",
            vec![root.clone(), direct.clone(), nested.clone()],
        );
        let two = assemble("overchan.test", vec![nested, direct, root]);
        assert_eq!(one.threads(), two.threads());
        assert_eq!(
            one.resolution(&id("dup@x")),
            two.resolution(&id("dup@x"))
        );
    }

    #[test]
    fn test_deep_chain_does_not_overflow() {
        let mut articles = vec![make_article("n0@x", Some("Deep"), 0, &[])];
        let mut chain: Vec<String> = vec!["n0@x".to_string()];
        for i in 1..5000 {
            let name = format!("n{i}@x");
            let refs: Vec<&str> = chain.iter().rev().take(1).map(String::as_str).collect();
            let mut article = make_article(&name, None, 0, &refs);
            article.date = article.date + chrono::Duration::seconds(i);
            articles.push(article);
            chain.push(name);
        }

        let assembly = assemble("overchan.test", articles);
        let thread = assembly.thread(&id("n0@x")).unwrap();
        assert_eq!(thread.reply_count(), 4999);
    }
}
