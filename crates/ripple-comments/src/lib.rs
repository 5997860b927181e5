//! Pure comment-tree transformations.
//!
//! A comment list arrives flat from the service; these functions build the
//! nested reply tree, keep pinned comments ordered, and mutate the tree by
//! returning new trees. The "current tree" is always the latest output,
//! never a shared mutable object.

mod tree;

pub use tree::{
    count_all, find, find_mut, flatten, insert_comment, nest, remove_comment, sort_pinned,
    update_comment,
};
