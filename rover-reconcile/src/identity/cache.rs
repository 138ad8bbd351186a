use super::Identifier;
use crate::context::RenderContext;
use crate::document::{Document, NodeId};
use crate::error::{ReconcileError, Result};
use crate::mount::find_component_root;
use std::collections::HashMap;
use tracing::trace;

/// Identifier to node map owned by one render context.
///
/// Entries may go stale when the document changes underneath them; every
/// read goes through [`is_valid`] before trusting an entry.
#[derive(Debug, Default)]
pub struct NodeCache {
    nodes: HashMap<Identifier, NodeId>,
}

impl NodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &Identifier) -> Option<NodeId> {
        self.nodes.get(id).copied()
    }

    pub fn insert(&mut self, id: Identifier, node: NodeId) -> Option<NodeId> {
        self.nodes.insert(id, node)
    }

    pub fn remove(&mut self, id: &Identifier) -> Option<NodeId> {
        self.nodes.remove(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drop `root` and every identifier beneath it.
    pub fn purge_root(&mut self, root: &Identifier) -> usize {
        let before = self.nodes.len();
        self.nodes
            .retain(|id, _| id != root && !root.is_ancestor_of(id));
        before - self.nodes.len()
    }
}

fn read_id<D: Document>(ctx: &RenderContext<D>, node: NodeId) -> Option<Identifier> {
    ctx.document
        .get_attribute(node, &ctx.config.id_attribute)
        .map(Identifier::from)
}

/// Read the identifier written on `node` and cache the node under it.
///
/// Fails with `IdentifierCollision` when the identifier is already cached for
/// a different node that is still valid.
pub fn resolve_id<D: Document>(
    ctx: &mut RenderContext<D>,
    node: NodeId,
) -> Result<Option<Identifier>> {
    let Some(id) = read_id(ctx, node) else {
        return Ok(None);
    };
    if let Some(cached) = ctx.node_cache.get(&id) {
        if cached != node && is_valid(ctx, cached, &id)? {
            return Err(ReconcileError::IdentifierCollision(id));
        }
    }
    ctx.node_cache.insert(id.clone(), node);
    Ok(Some(id))
}

/// Write `id` onto `node` and cache it, forgetting the node's previous
/// identifier.
pub fn bind_id<D: Document>(ctx: &mut RenderContext<D>, node: NodeId, id: &Identifier) {
    match read_id(ctx, node) {
        Some(old) if &old == id => {}
        old => {
            if let Some(old) = old {
                if ctx.node_cache.get(&old) == Some(node) {
                    ctx.node_cache.remove(&old);
                }
            }
            ctx.document
                .set_attribute(node, &ctx.config.id_attribute, id.as_str());
        }
    }
    ctx.node_cache.insert(id.clone(), node);
}

/// Node currently carrying `id`, searching the document when the cache has
/// nothing valid.
pub fn lookup_node<D: Document>(ctx: &mut RenderContext<D>, id: &Identifier) -> Result<NodeId> {
    match ctx.node_cache.get(id) {
        Some(node) if is_valid(ctx, node, id)? => return Ok(node),
        Some(_) => trace!("stale node cache entry for {}", id),
        None => trace!("node cache miss for {}", id),
    }
    let container = container_for_id(ctx, id)?;
    let node = find_component_root(ctx, container, id)?;
    ctx.node_cache.insert(id.clone(), node);
    Ok(node)
}

/// A cached node is valid while it still carries `id` and still sits under
/// the container registered for the id's root.
///
/// A live node carrying some other identifier means the document was edited
/// behind the reconciler's back, which is an error rather than a miss.
pub fn is_valid<D: Document>(ctx: &RenderContext<D>, node: NodeId, id: &Identifier) -> Result<bool> {
    if ctx.document.kind(node).is_none() {
        return Ok(false);
    }
    let found = ctx.document.get_attribute(node, &ctx.config.id_attribute);
    if found != Some(id.as_str()) {
        return Err(ReconcileError::UnexpectedExternalMutation {
            id: id.clone(),
            found: found.map(str::to_string),
        });
    }
    Ok(ctx
        .root_containers
        .get(&id.root_prefix())
        .is_some_and(|&container| ctx.document.contains(container, node)))
}

pub fn purge<D: Document>(ctx: &mut RenderContext<D>, id: &Identifier) {
    ctx.node_cache.remove(id);
}

/// Deepest prefix of `target` (possibly `target` itself) whose cache entry is
/// valid, walking down from the root and stopping at the first gap.
pub fn find_deepest_cached_ancestor<D: Document>(
    ctx: &RenderContext<D>,
    target: &Identifier,
) -> Result<Option<(Identifier, NodeId)>> {
    let mut deepest = None;
    for ancestor in target.ancestors() {
        match ctx.node_cache.get(&ancestor) {
            Some(node) if is_valid(ctx, node, &ancestor)? => deepest = Some((ancestor, node)),
            _ => break,
        }
    }
    Ok(deepest)
}

/// Container registered for the root `id` lives under.
pub fn container_for_id<D: Document>(ctx: &RenderContext<D>, id: &Identifier) -> Result<NodeId> {
    let root = id.root_prefix();
    ctx.root_containers
        .get(&root)
        .copied()
        .ok_or(ReconcileError::UnregisteredRoot(root))
}
