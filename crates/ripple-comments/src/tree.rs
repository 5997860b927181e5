//! Flat list ⇄ nested tree transformations with pin-aware ordering.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use ripple_service::Comment;

/// Build the nested reply tree from a flat comment list.
///
/// Comments with a null parent become roots in original list order
/// (creation order). Every other comment is appended to its parent's
/// `replies`; a comment whose parent id is absent from the list — for
/// example one referencing an already-deleted comment — is dropped from
/// the rendered tree, never promoted to top level.
pub fn nest(flat: Vec<Comment>) -> Vec<Comment> {
    let known: HashSet<String> = flat.iter().map(|c| c.id.clone()).collect();

    let mut children: HashMap<String, Vec<Comment>> = HashMap::new();
    let mut roots: Vec<Comment> = Vec::new();
    for mut comment in flat {
        comment.replies = Vec::new();
        match comment.parent_id.clone() {
            None => roots.push(comment),
            Some(parent) if known.contains(&parent) => {
                children.entry(parent).or_default().push(comment);
            }
            // Dangling parent reference: drop.
            Some(_) => {}
        }
    }

    fn attach(node: &mut Comment, children: &mut HashMap<String, Vec<Comment>>) {
        if let Some(mut kids) = children.remove(&node.id) {
            for kid in &mut kids {
                attach(kid, children);
            }
            node.replies = kids;
        }
    }

    for root in &mut roots {
        attach(root, &mut children);
    }
    roots
}

/// Flatten a nested tree back into a creation-ordered wire list.
///
/// Inverse of [`nest`] up to ordering: every node appears exactly once
/// with empty `replies`, sorted by `created_at` so the output matches the
/// service's creation-order contract.
pub fn flatten(tree: Vec<Comment>) -> Vec<Comment> {
    fn walk(nodes: Vec<Comment>, out: &mut Vec<Comment>) {
        for mut node in nodes {
            let replies = std::mem::take(&mut node.replies);
            out.push(node);
            walk(replies, out);
        }
    }
    let mut out = Vec::new();
    walk(tree, &mut out);
    out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    out
}

/// Order top-level comments: pinned before unpinned, most recently pinned
/// first among pinned, oldest first among unpinned.
///
/// The sort is stable, so repeated calls with the same input produce
/// identical output and ties keep their relative order. Re-applied after
/// every pin/unpin toggle and after insert/delete.
pub fn sort_pinned(mut comments: Vec<Comment>) -> Vec<Comment> {
    comments.sort_by(|a, b| match (a.is_pinned, b.is_pinned) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (true, true) => b.pinned_at.cmp(&a.pinned_at),
        (false, false) => a.created_at.cmp(&b.created_at),
    });
    comments
}

/// Count every node of the tree, including nested replies at any depth.
///
/// Used to reconcile the denormalized `comments_count` on the parent
/// entity against the authoritative tree size.
pub fn count_all(comments: &[Comment]) -> u64 {
    comments
        .iter()
        .map(|c| 1 + count_all(&c.replies))
        .sum()
}

/// Remove exactly the target node wherever it occurs in the tree.
///
/// The removed node's replies are re-parented to the node's own parent:
/// they take the removed node's position (becoming roots when a root was
/// removed) and the immediate parent's `replies_count` is decremented by
/// one. Siblings and unrelated subtrees are untouched. Returns the new
/// tree and whether anything was removed.
pub fn remove_comment(mut roots: Vec<Comment>, target_id: &str) -> (Vec<Comment>, bool) {
    if let Some(pos) = roots.iter().position(|c| c.id == target_id) {
        let removed = roots.remove(pos);
        let mut lifted = removed.replies;
        for kid in &mut lifted {
            kid.parent_id = None;
        }
        roots.splice(pos..pos, lifted);
        return (roots, true);
    }

    fn descend(node: &mut Comment, target_id: &str) -> bool {
        if let Some(pos) = node.replies.iter().position(|c| c.id == target_id) {
            let removed = node.replies.remove(pos);
            let mut lifted = removed.replies;
            for kid in &mut lifted {
                kid.parent_id = Some(node.id.clone());
            }
            node.replies.splice(pos..pos, lifted);
            node.replies_count = node.replies_count.saturating_sub(1);
            return true;
        }
        for reply in &mut node.replies {
            if descend(reply, target_id) {
                return true;
            }
        }
        false
    }

    let mut removed = false;
    for root in &mut roots {
        if descend(root, target_id) {
            removed = true;
            break;
        }
    }
    (roots, removed)
}

/// Insert a comment at its parent position, or as a root when it has none.
///
/// The parent's `replies_count` is incremented. Returns the new tree and
/// whether the insert landed; a reply whose parent is missing leaves the
/// tree unchanged.
pub fn insert_comment(mut roots: Vec<Comment>, comment: Comment) -> (Vec<Comment>, bool) {
    match comment.parent_id.clone() {
        None => {
            roots.push(comment);
            (roots, true)
        }
        Some(parent_id) => {
            let inserted = match find_mut(&mut roots, &parent_id) {
                Some(parent) => {
                    parent.replies.push(comment);
                    parent.replies_count += 1;
                    true
                }
                None => false,
            };
            (roots, inserted)
        }
    }
}

/// Find a node by id at any depth.
pub fn find<'a>(roots: &'a [Comment], id: &str) -> Option<&'a Comment> {
    for comment in roots {
        if comment.id == id {
            return Some(comment);
        }
        if let Some(found) = find(&comment.replies, id) {
            return Some(found);
        }
    }
    None
}

/// Find a node by id at any depth, mutably.
pub fn find_mut<'a>(roots: &'a mut [Comment], id: &str) -> Option<&'a mut Comment> {
    for comment in roots {
        if comment.id == id {
            return Some(comment);
        }
        if let Some(found) = find_mut(&mut comment.replies, id) {
            return Some(found);
        }
    }
    None
}

/// Apply a field patch to the node with the given id, returning the new
/// tree and whether the node was found.
pub fn update_comment(
    mut roots: Vec<Comment>,
    id: &str,
    patch: impl FnOnce(&mut Comment),
) -> (Vec<Comment>, bool) {
    let updated = match find_mut(&mut roots, id) {
        Some(comment) => {
            patch(comment);
            true
        }
        None => false,
    };
    (roots, updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn comment(id: &str, parent: Option<&str>, minute: i64) -> Comment {
        let created = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute);
        Comment::new(id, "author", format!("comment {id}"), parent.map(str::to_string), created)
    }

    #[test]
    fn nest_builds_two_roots_with_one_reply() {
        // The canonical shape: [1, 2->1, 3] nests into roots 1 (reply 2) and 3.
        let flat = vec![
            comment("1", None, 0),
            comment("2", Some("1"), 1),
            comment("3", None, 2),
        ];

        let tree = nest(flat);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].id, "1");
        assert_eq!(tree[0].replies.len(), 1);
        assert_eq!(tree[0].replies[0].id, "2");
        assert_eq!(tree[1].id, "3");
        assert_eq!(count_all(&tree), 3);
    }

    #[test]
    fn nest_drops_orphans_instead_of_promoting() {
        let flat = vec![
            comment("1", None, 0),
            comment("2", Some("gone"), 1),
            comment("3", Some("2"), 2),
        ];

        let tree = nest(flat);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].id, "1");
        // The orphan chain under the dangling reference disappears entirely.
        assert_eq!(count_all(&tree), 1);
    }

    #[test]
    fn nest_handles_deep_chains() {
        let flat = vec![
            comment("1", None, 0),
            comment("2", Some("1"), 1),
            comment("3", Some("2"), 2),
            comment("4", Some("3"), 3),
        ];

        let tree = nest(flat);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].replies[0].replies[0].replies[0].id, "4");
        assert_eq!(count_all(&tree), 4);
    }

    #[test]
    fn flatten_inverts_nest() {
        let flat = vec![
            comment("1", None, 0),
            comment("2", Some("1"), 1),
            comment("3", None, 2),
            comment("4", Some("2"), 3),
        ];

        let roundtrip = flatten(nest(flat.clone()));
        assert_eq!(roundtrip, flat);
    }

    #[test]
    fn sort_pinned_orders_pins_then_age() {
        let mut pinned_old = comment("old-pin", None, 5);
        pinned_old.is_pinned = true;
        pinned_old.pinned_at = Some(Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap());
        let mut pinned_new = comment("new-pin", None, 9);
        pinned_new.is_pinned = true;
        pinned_new.pinned_at = Some(Utc.with_ymd_and_hms(2026, 1, 3, 0, 0, 0).unwrap());

        let sorted = sort_pinned(vec![
            comment("late", None, 30),
            pinned_old,
            comment("early", None, 1),
            pinned_new,
        ]);

        let ids: Vec<&str> = sorted.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["new-pin", "old-pin", "early", "late"]);
    }

    #[test]
    fn sort_pinned_is_deterministic() {
        let input = vec![
            comment("a", None, 3),
            comment("b", None, 1),
            comment("c", None, 2),
        ];
        let first = sort_pinned(input.clone());
        let second = sort_pinned(input);
        assert_eq!(first, second);
    }

    fn three_level_tree() -> Vec<Comment> {
        let mut root = comment("root", None, 0);
        let mut mid = comment("mid", Some("root"), 1);
        mid.replies.push(comment("leaf", Some("mid"), 2));
        mid.replies_count = 1;
        root.replies.push(mid);
        root.replies.push(comment("sibling", Some("root"), 3));
        root.replies_count = 2;
        vec![root, comment("other", None, 4)]
    }

    #[test]
    fn remove_nested_node_lifts_its_reply_to_the_parent() {
        let (tree, removed) = remove_comment(three_level_tree(), "mid");
        assert!(removed);
        assert_eq!(tree.len(), 2);
        let ids: Vec<&str> = tree[0].replies.iter().map(|c| c.id.as_str()).collect();
        // The lifted leaf takes mid's position, ahead of the sibling.
        assert_eq!(ids, vec!["leaf", "sibling"]);
        assert_eq!(tree[0].replies[0].parent_id.as_deref(), Some("root"));
        assert_eq!(tree[0].replies_count, 1);
        // One node removed; everything else survives.
        assert_eq!(count_all(&tree), 4);
    }

    #[test_case(1 ; "single root")]
    #[test_case(3 ; "several roots")]
    fn count_matches_flat_length(roots: usize) {
        let mut flat = Vec::new();
        for i in 0..roots {
            flat.push(comment(&format!("r{i}"), None, i as i64));
            flat.push(comment(&format!("c{i}"), Some(&format!("r{i}")), 10 + i as i64));
        }
        assert_eq!(count_all(&nest(flat.clone())), flat.len() as u64);
    }

    #[test]
    fn remove_root_lifts_children_in_place() {
        let mut root = comment("root", None, 0);
        root.replies.push(comment("kid-a", Some("root"), 1));
        root.replies.push(comment("kid-b", Some("root"), 2));
        root.replies_count = 2;

        let (tree, removed) =
            remove_comment(vec![comment("first", None, 0), root, comment("last", None, 5)], "root");
        assert!(removed);
        let ids: Vec<&str> = tree.iter().map(|c| c.id.as_str()).collect();
        // Lifted children take the removed root's position.
        assert_eq!(ids, vec!["first", "kid-a", "kid-b", "last"]);
        assert!(tree.iter().all(|c| c.parent_id.is_none()));
    }

    #[test]
    fn remove_decrements_parent_replies_count() {
        let mut root = comment("root", None, 0);
        root.replies.push(comment("kid", Some("root"), 1));
        root.replies_count = 1;

        let (tree, removed) = remove_comment(vec![root], "kid");
        assert!(removed);
        assert_eq!(tree[0].replies_count, 0);
        assert!(tree[0].replies.is_empty());
    }

    #[test]
    fn remove_missing_target_is_a_no_op() {
        let tree = vec![comment("1", None, 0)];
        let (out, removed) = remove_comment(tree.clone(), "nope");
        assert!(!removed);
        assert_eq!(out, tree);
    }

    #[test]
    fn insert_reply_lands_under_parent() {
        let tree = nest(vec![comment("1", None, 0)]);
        let (tree, inserted) = insert_comment(tree, comment("2", Some("1"), 1));
        assert!(inserted);
        assert_eq!(tree[0].replies.len(), 1);
        assert_eq!(tree[0].replies_count, 1);

        let (tree, inserted) = insert_comment(tree, comment("3", Some("missing"), 2));
        assert!(!inserted);
        assert_eq!(count_all(&tree), 2);
    }

    #[test]
    fn update_patches_nested_nodes() {
        let tree = nest(vec![comment("1", None, 0), comment("2", Some("1"), 1)]);
        let (tree, updated) = update_comment(tree, "2", |c| {
            c.content = "edited".to_string();
            c.is_edited = true;
        });
        assert!(updated);
        assert_eq!(tree[0].replies[0].content, "edited");
        assert!(tree[0].replies[0].is_edited);
    }
}
