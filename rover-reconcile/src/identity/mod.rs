mod cache;
mod id;

pub use cache::{
    NodeCache, bind_id, container_for_id, find_deepest_cached_ancestor, is_valid, lookup_node,
    purge, resolve_id,
};
pub use id::{Identifier, KEY_PREFIX, SEPARATOR};
