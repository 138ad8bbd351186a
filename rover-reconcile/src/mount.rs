use crate::context::{Diagnostic, RenderCallback, RenderContext};
use crate::document::{Document, NodeId, NodeKind};
use crate::element::{Element, Renderable};
use crate::error::{ReconcileError, Result};
use crate::identity::{self, Identifier};
use crate::markup_reuse;
use crate::reconciler::{HostContext, InstanceHandle, instantiate};
use crate::transaction::{PendingUpdate, batched_updates};
use smallvec::{SmallVec, smallvec};
use tracing::{debug, trace};

fn check_container<D: Document>(ctx: &RenderContext<D>, container: NodeId) -> Result<()> {
    let kind = ctx.document.kind(container);
    if kind.is_some_and(NodeKind::is_mountable) {
        Ok(())
    } else {
        Err(ReconcileError::InvalidContainer {
            node: container,
            kind,
        })
    }
}

/// Bind `container` to a root identifier, reusing the root written into its
/// existing markup when that root is not already taken by another container.
pub fn register_container<D: Document>(ctx: &mut RenderContext<D>, container: NodeId) -> Result<Identifier> {
    check_container(ctx, container)?;
    let existing = match ctx.document.root_element(container) {
        Some(root) => identity::resolve_id(ctx, root)?
            .filter(Identifier::is_reconciler_id)
            .map(|id| id.root_prefix()),
        None => None,
    };
    let root_id = match existing {
        Some(root)
            if ctx
                .root_containers
                .get(&root)
                .is_none_or(|&registered| registered == container) =>
        {
            root
        }
        _ => ctx.mint_root_id(),
    };
    ctx.root_containers.insert(root_id.clone(), container);
    debug!("registered container {:?} as root {}", container, root_id);
    Ok(root_id)
}

/// Root currently mounted in `container`, if any.
fn mounted_root<D: Document>(ctx: &mut RenderContext<D>, container: NodeId) -> Result<Option<Identifier>> {
    let Some(node) = ctx.document.root_element(container) else {
        return Ok(None);
    };
    let Some(id) = identity::resolve_id(ctx, node)? else {
        return Ok(None);
    };
    let root = id.root_prefix();
    let mounted = ctx.root_instances.contains_key(&root)
        && ctx.root_containers.get(&root) == Some(&container);
    Ok(mounted.then_some(root))
}

/// Render `element` into `container`.
///
/// A compatible element updates the mounted root in place and returns its
/// existing handle. Anything else unmounts what is there and mounts fresh,
/// keeping server-rendered markup when its checksum matches.
pub fn render<D: Document>(
    ctx: &mut RenderContext<D>,
    element: impl Into<Renderable>,
    container: NodeId,
    callback: Option<RenderCallback<D>>,
) -> Result<InstanceHandle> {
    let element = element
        .into()
        .into_element()
        .map_err(ReconcileError::InvalidElement)?;
    check_container(ctx, container)?;

    let previous = mounted_root(ctx, container)?;
    if let Some(root) = &previous {
        if let Some(instance) = ctx.root_instances.get(root) {
            if instance.element().is_compatible_with(&element) {
                let handle = instance.handle();
                batched_updates(ctx, |ctx| {
                    enqueue_update(ctx, &handle, element, callback)
                })?;
                return Ok(handle);
            }
        }
        unmount_component_at_node(ctx, container)?;
    }

    let reusable = match ctx.document.root_element(container) {
        Some(node) => ctx
            .document
            .get_attribute(node, &ctx.config.id_attribute)
            .is_some_and(|id| Identifier::from(id).is_reconciler_id()),
        None => false,
    };
    if !reusable
        && ctx.document.first_child(container).is_some()
        && ctx.config.report_foreign_markup
    {
        ctx.report(Diagnostic::ContainerHasForeignMarkup { container });
    }
    let should_reuse = reusable && previous.is_none();

    batched_updates(ctx, move |ctx| {
        let root_id = register_container(ctx, container)?;
        let handle = match mount_root(ctx, element, &root_id, container, should_reuse) {
            Ok(handle) => handle,
            Err(err) => {
                ctx.root_containers.remove(&root_id);
                ctx.node_cache.purge_root(&root_id);
                return Err(err);
            }
        };
        if let Some(callback) = callback {
            callback(ctx, &handle)?;
        }
        Ok(handle)
    })
}

fn mount_root<D: Document>(
    ctx: &mut RenderContext<D>,
    element: Element,
    root_id: &Identifier,
    container: NodeId,
    should_reuse: bool,
) -> Result<InstanceHandle> {
    let mut instance = instantiate(ctx, element, root_id.clone());
    let reconciler = ctx.reconciler.clone();
    let markup = reconciler.mount(ctx, &mut instance, HostContext::default())?;
    markup_reuse::mount_image_into_node(ctx, &markup, container, should_reuse)?;
    debug!("mounted root {} into {:?}", root_id, container);
    let handle = instance.handle();
    ctx.root_instances.insert(root_id.clone(), instance);
    Ok(handle)
}

/// Unmount whatever is mounted in `container`. Returns false when nothing
/// was mounted there.
pub fn unmount_component_at_node<D: Document>(ctx: &mut RenderContext<D>, container: NodeId) -> Result<bool> {
    check_container(ctx, container)?;
    let Some(root) = mounted_root(ctx, container)? else {
        return Ok(false);
    };
    let Some(instance) = ctx.root_instances.remove(&root) else {
        return Ok(false);
    };

    let reconciler = ctx.reconciler.clone();
    reconciler.unmount(ctx, &instance);

    let target = match ctx.document.kind(container) {
        Some(NodeKind::Document) => ctx.document.root_element(container),
        _ => Some(container),
    };
    if let Some(target) = target {
        ctx.document.clear_children(target);
    }

    ctx.root_containers.remove(&root);
    ctx.node_cache.purge_root(&root);
    ctx.batch.update_queue.retain(|update| update.root != root);
    ctx.batch.callback_queue.retain(|(handle, _)| handle.id() != &root);
    ctx.batch.dirty_instances.remove(&root);
    debug!("unmounted root {} from {:?}", root, container);
    Ok(true)
}

/// Find the node carrying `target` beneath `ancestor`.
///
/// The scan starts at the deepest cached ancestor of `target`, walks sibling
/// chains and only descends into nodes whose identifier is a prefix of the
/// target, or that carry no identifier at all. Every identified node it
/// passes is cached.
pub fn find_component_root<D: Document>(
    ctx: &mut RenderContext<D>,
    ancestor: NodeId,
    target: &Identifier,
) -> Result<NodeId> {
    let start = match identity::find_deepest_cached_ancestor(ctx, target)? {
        Some((id, node)) if &id == target => return Ok(node),
        Some((_, node)) => node,
        None => ancestor,
    };
    trace!("searching for {} below {:?}", target, start);

    let mut first_children: SmallVec<[Option<NodeId>; 8]> = smallvec![ctx.document.first_child(start)];
    let mut cursor = 0;
    while cursor < first_children.len() {
        let mut child = first_children[cursor];
        cursor += 1;
        let mut found = None;
        while let Some(node) = child {
            match identity::resolve_id(ctx, node)? {
                Some(id) if &id == target => found = Some(node),
                Some(id) => {
                    if id.is_ancestor_of(target) {
                        first_children.clear();
                        cursor = 0;
                        first_children.push(ctx.document.first_child(node));
                    }
                }
                None => first_children.push(ctx.document.first_child(node)),
            }
            child = ctx.document.next_sibling(node);
        }
        if let Some(node) = found {
            return Ok(node);
        }
    }

    Err(ReconcileError::ComponentNotFound {
        target: target.clone(),
        ancestor: ctx
            .document
            .get_attribute(ancestor, &ctx.config.id_attribute)
            .map(Identifier::from),
    })
}

/// Queue `element` as the next element of the root behind `handle`. The
/// update lands on the next flush of this context.
pub fn enqueue_update<D: Document>(
    ctx: &mut RenderContext<D>,
    handle: &InstanceHandle,
    element: impl Into<Renderable>,
    callback: Option<RenderCallback<D>>,
) -> Result<()> {
    let element = element
        .into()
        .into_element()
        .map_err(ReconcileError::InvalidElement)?;
    let root = handle.id();
    if !handle.is_owned_by(ctx) || !ctx.root_instances.contains_key(root) {
        return Err(ReconcileError::StaleInstance(root.clone()));
    }
    trace!("queued update for {}", root);
    ctx.batch.dirty_instances.insert(root.clone());
    ctx.batch.update_queue.push_back(PendingUpdate {
        root: root.clone(),
        element,
        callback,
    });
    Ok(())
}

/// Apply every queued update now.
pub fn flush<D: Document>(ctx: &mut RenderContext<D>) -> Result<()> {
    batched_updates(ctx, |_| Ok(()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MemoryDocument;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn setup() -> (RenderContext<MemoryDocument>, NodeId) {
        let mut doc = MemoryDocument::new();
        let container = doc.create_element("main");
        doc.append_child(doc.document_node(), container).unwrap();
        (RenderContext::new(doc), container)
    }

    #[test]
    fn test_register_rejects_text_nodes() {
        let (mut ctx, _) = setup();
        let text = ctx.document_mut().create_text("x");

        assert!(matches!(
            register_container(&mut ctx, text),
            Err(ReconcileError::InvalidContainer {
                kind: Some(NodeKind::Text),
                ..
            })
        ));
    }

    #[test]
    fn test_register_reuses_root_in_markup() {
        let (mut ctx, container) = setup();
        ctx.document_mut()
            .insert_markup(container, r#"<div data-rover-id=".5"><i data-rover-id=".5.0"></i></div>"#)
            .unwrap();

        assert_eq!(register_container(&mut ctx, container).unwrap().as_str(), ".5");
        // Registering again keeps the same root.
        assert_eq!(register_container(&mut ctx, container).unwrap().as_str(), ".5");
    }

    #[test]
    fn test_register_mints_for_foreign_markup() {
        let (mut ctx, container) = setup();
        ctx.document_mut()
            .insert_markup(container, r#"<div id="app"></div>"#)
            .unwrap();

        assert_eq!(register_container(&mut ctx, container).unwrap().as_str(), ".0");
    }

    #[test]
    fn test_find_descends_into_unidentified_wrappers() {
        let (mut ctx, container) = setup();
        ctx.document_mut()
            .insert_markup(
                container,
                concat!(
                    r#"<div data-rover-id=".0">"#,
                    r#"<p data-rover-id=".0.0">x</p>"#,
                    r#"<section><b data-rover-id=".0.1">y</b></section>"#,
                    "</div>"
                ),
            )
            .unwrap();
        register_container(&mut ctx, container).unwrap();

        let node = find_component_root(&mut ctx, container, &Identifier::from(".0.1")).unwrap();
        assert_eq!(ctx.document().tag(node), Some("b"));
        assert!(ctx.cached_node(&Identifier::from(".0.0")).is_some());
    }

    #[test]
    fn test_find_reports_missing_target() {
        let (mut ctx, container) = setup();
        render(&mut ctx, Element::host("div").text("x"), container, None).unwrap();

        let err = find_component_root(&mut ctx, container, &Identifier::from(".0.7")).unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::ComponentNotFound { ref target, .. } if target.as_str() == ".0.7"
        ));
    }

    #[test]
    fn test_render_rejects_invalid_input() {
        let (mut ctx, container) = setup();
        let err = render(&mut ctx, "just text", container, None).unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidElement(_)));
        assert!(!ctx.is_batching());
        assert_eq!(ctx.root_count(), 0);
    }

    #[test]
    fn test_foreign_markup_is_flagged_and_replaced() {
        let (mut ctx, container) = setup();
        ctx.document_mut()
            .insert_markup(container, "<p>loading</p>")
            .unwrap();

        render(&mut ctx, Element::host("div"), container, None).unwrap();

        assert_eq!(
            ctx.diagnostics(),
            &[Diagnostic::ContainerHasForeignMarkup { container }]
        );
        assert_eq!(ctx.document().inner_markup(container), r#"<div data-rover-id=".0"></div>"#);
    }

    #[test]
    fn test_enqueue_waits_for_flush() {
        let (mut ctx, container) = setup();
        let handle = render(&mut ctx, Element::host("p").text("a"), container, None).unwrap();

        enqueue_update(&mut ctx, &handle, Element::host("p").text("b"), None).unwrap();
        assert_eq!(ctx.pending_updates(), 1);
        assert!(ctx.document().inner_markup(container).contains(">a<"));

        flush(&mut ctx).unwrap();
        assert_eq!(ctx.pending_updates(), 0);
        assert!(ctx.document().inner_markup(container).contains(">b<"));
    }

    #[test]
    fn test_unmount_drops_queued_updates() {
        let (mut ctx, container) = setup();
        let handle = render(&mut ctx, Element::host("p"), container, None).unwrap();
        enqueue_update(&mut ctx, &handle, Element::host("p").text("late"), None).unwrap();

        assert!(unmount_component_at_node(&mut ctx, container).unwrap());
        assert_eq!(ctx.pending_updates(), 0);
        assert!(matches!(
            enqueue_update(&mut ctx, &handle, Element::host("p"), None),
            Err(ReconcileError::StaleInstance(_))
        ));
    }

    #[test]
    fn test_render_into_document_requires_server_markup() {
        let mut ctx = RenderContext::new(MemoryDocument::new());
        let document = ctx.document().document_node();

        let err = render(&mut ctx, Element::host("html"), document, None).unwrap_err();
        assert!(matches!(err, ReconcileError::DocumentRootMismatch { offset: None, .. }));
        assert_eq!(ctx.root_count(), 0);
        assert!(ctx.root_container(&Identifier::root(0)).is_none());
        assert!(!ctx.is_batching());
    }

    #[test]
    fn test_unmount_from_callback_drops_pending_callbacks() {
        let (mut ctx, first) = setup();
        let second = ctx.document_mut().create_element("aside");
        let root = ctx.document().document_node();
        ctx.document_mut().append_child(root, second).unwrap();
        let a = render(&mut ctx, Element::host("p").text("a"), first, None).unwrap();
        let b = render(&mut ctx, Element::host("p").text("b"), second, None).unwrap();
        let ran = Arc::new(AtomicBool::new(false));
        let seen = ran.clone();

        batched_updates(&mut ctx, |ctx| {
            enqueue_update(
                ctx,
                &a,
                Element::host("p").text("a2"),
                Some(Box::new(move |ctx: &mut RenderContext<MemoryDocument>, _: &InstanceHandle| -> Result<()> {
                    assert!(unmount_component_at_node(ctx, second)?);
                    assert!(ctx.batch.callback_queue.is_empty());
                    Ok(())
                })),
            )?;
            enqueue_update(
                ctx,
                &b,
                Element::host("p").text("b2"),
                Some(Box::new(move |_: &mut RenderContext<MemoryDocument>, _: &InstanceHandle| -> Result<()> {
                    seen.store(true, Ordering::SeqCst);
                    Ok(())
                })),
            )
        })
        .unwrap();

        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(ctx.root_count(), 1);
        assert_eq!(ctx.document().inner_markup(second), "");
        assert!(ctx.document().inner_markup(first).contains(">a2<"));
    }
}
