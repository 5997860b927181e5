//! Structural cross-view invalidation.

use std::sync::Arc;

use tracing::{debug, trace};

use ripple_service::FeedItem;

use crate::collections::{CacheUpdate, CollectionCache};

/// What a patch is aimed at.
///
/// Like/save/count changes target an entity id; follow changes target an
/// author, patching `followed_author` on every cached item by that author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchTarget {
    Entity(String),
    Author(String),
}

/// A partial interaction update. `None` fields are left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InteractionPatch {
    pub liked: Option<bool>,
    pub saved: Option<bool>,
    pub followed_author: Option<bool>,
    pub likes_count: Option<u64>,
    pub comments_count: Option<u64>,
}

impl InteractionPatch {
    pub fn liked(liked: bool, likes_count: u64) -> Self {
        Self {
            liked: Some(liked),
            likes_count: Some(likes_count),
            ..Self::default()
        }
    }

    pub fn saved(saved: bool) -> Self {
        Self {
            saved: Some(saved),
            ..Self::default()
        }
    }

    pub fn followed(followed_author: bool) -> Self {
        Self {
            followed_author: Some(followed_author),
            ..Self::default()
        }
    }

    pub fn comments_count(comments_count: u64) -> Self {
        Self {
            comments_count: Some(comments_count),
            ..Self::default()
        }
    }

    fn apply(&self, item: &mut FeedItem) {
        if let Some(liked) = self.liked {
            item.interaction.liked = liked;
        }
        if let Some(saved) = self.saved {
            item.interaction.saved = saved;
        }
        if let Some(followed) = self.followed_author {
            item.interaction.followed_author = followed;
        }
        if let Some(likes) = self.likes_count {
            item.interaction.likes_count = likes;
        }
        if let Some(comments) = self.comments_count {
            item.interaction.comments_count = comments;
        }
    }
}

/// Applies a committed or tentative state change to every cached
/// collection page referencing the target.
///
/// Pages are matched structurally — by scanning item ids (or author ids)
/// — rather than through a registry of dependent keys, so collection views
/// introduced later are covered automatically. No refetch is triggered;
/// the patch is applied in place and announced on the update channel.
#[derive(Clone)]
pub struct CacheInvalidator {
    collections: Arc<CollectionCache>,
}

impl CacheInvalidator {
    pub fn new(collections: Arc<CollectionCache>) -> Self {
        Self { collections }
    }

    /// Patch every cached page containing the target. Returns how many
    /// items were touched.
    pub fn broadcast(&self, target: &PatchTarget, patch: InteractionPatch) -> usize {
        let mut touched = 0;
        let mut updates = Vec::new();

        self.collections.for_each_page_mut(|key, items| {
            for item in items.iter_mut() {
                let matches = match target {
                    PatchTarget::Entity(id) => item.id == *id,
                    PatchTarget::Author(id) => item.author_id == *id,
                };
                if matches {
                    patch.apply(item);
                    touched += 1;
                    updates.push(CacheUpdate::ItemPatched {
                        collection: key.to_string(),
                        entity_id: item.id.clone(),
                        interaction: item.interaction,
                    });
                }
            }
        });

        for update in updates {
            self.collections.broadcast(update);
        }

        if touched > 0 {
            debug!(?target, touched, "patched cached collections");
        } else {
            trace!(?target, "patch matched no cached items");
        }
        touched
    }
}
