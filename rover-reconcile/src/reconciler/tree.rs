use super::{HostContext, MountedInstance, Reconciler};
use crate::config::RenderConfig;
use crate::context::RenderContext;
use crate::document::{Document, NodeId, escape, write_close_tag, write_open_tag};
use crate::element::{CompositeElement, Element, HostElement};
use crate::error::{ReconcileError, Result};
use crate::identity::{self, Identifier};

/// Default reconciler: writes markup on mount and patches the document
/// position by position on update.
#[derive(Debug, Default, Clone, Copy)]
pub struct TreeReconciler;

impl<D: Document> Reconciler<D> for TreeReconciler {
    fn mount(
        &self,
        ctx: &mut RenderContext<D>,
        instance: &mut MountedInstance,
        host: HostContext,
    ) -> Result<String> {
        let writer = MarkupWriter {
            config: &ctx.config,
            host,
        };
        let mut out = String::new();
        writer.mount(instance, &mut out)?;
        Ok(out)
    }

    fn update(&self, ctx: &mut RenderContext<D>, instance: &mut MountedInstance, next: Element) -> Result<()> {
        if instance.element().is_compatible_with(&next) {
            update_instance(ctx, instance, next)
        } else {
            replace_instance(ctx, instance, next)
        }
    }

    fn unmount(&self, ctx: &mut RenderContext<D>, instance: &MountedInstance) {
        purge_subtree(ctx, instance);
    }
}

struct MarkupWriter<'a> {
    config: &'a RenderConfig,
    host: HostContext,
}

impl MarkupWriter<'_> {
    fn mount(&self, instance: &mut MountedInstance, out: &mut String) -> Result<()> {
        let element = instance.element().clone();
        match &element {
            Element::Text(text) => self.write_text(instance.id(), text, out),
            Element::Composite(composite) => {
                let mut rendered = instance.child(instance.id().clone(), render_checked(composite)?);
                self.mount(&mut rendered, out)?;
                instance.children_mut().push(rendered);
            }
            Element::Host(host) => self.mount_host(instance, host, out)?,
        }
        Ok(())
    }

    fn mount_host(&self, instance: &mut MountedInstance, host: &HostElement, out: &mut String) -> Result<()> {
        let attributes = host
            .attributes()
            .filter(|(name, _)| !is_reserved(self.config, name));
        write_open_tag(out, host.tag(), attributes.chain(self.id_pair(instance.id())));

        if let Some(text) = host.inline_text() {
            out.push_str(&escape(text));
        } else {
            for (index, element) in host.child_elements().iter().enumerate() {
                let id = child_id(instance.id(), index, element);
                let mut child = instance.child(id, element.clone());
                self.mount(&mut child, out)?;
                instance.children_mut().push(child);
            }
        }
        write_close_tag(out, host.tag());
        Ok(())
    }

    /// Loose text gets its own span so it can be addressed by identifier.
    fn write_text(&self, id: &Identifier, text: &str, out: &mut String) {
        write_open_tag(out, "span", self.id_pair(id));
        out.push_str(&escape(text));
        write_close_tag(out, "span");
    }

    fn id_pair<'a>(&'a self, id: &'a Identifier) -> Option<(&'a str, &'a str)> {
        (!self.host.static_markup).then(|| (self.config.id_attribute.as_str(), id.as_str()))
    }
}

fn is_reserved(config: &RenderConfig, name: &str) -> bool {
    name == config.id_attribute || name == config.checksum_attribute
}

fn child_id(parent: &Identifier, index: usize, element: &Element) -> Identifier {
    match element.key() {
        Some(key) => parent.child_keyed(key),
        None => parent.child_at(index),
    }
}

fn render_checked(composite: &CompositeElement) -> Result<Element> {
    let rendered = composite.render();
    rendered.validate().map_err(ReconcileError::InvalidElement)?;
    Ok(rendered)
}

fn mount_fresh<D: Document>(ctx: &RenderContext<D>, instance: &mut MountedInstance) -> Result<String> {
    let writer = MarkupWriter {
        config: &ctx.config,
        host: HostContext::default(),
    };
    let mut out = String::new();
    writer.mount(instance, &mut out)?;
    Ok(out)
}

fn bind_created<D: Document>(ctx: &mut RenderContext<D>, created: &[NodeId], instance: &MountedInstance) {
    if let Some(&node) = created.first() {
        identity::bind_id(ctx, node, instance.id());
    }
}

fn purge_subtree<D: Document>(ctx: &mut RenderContext<D>, instance: &MountedInstance) {
    for id in instance.subtree_ids() {
        identity::purge(ctx, &id);
    }
}

fn update_instance<D: Document>(
    ctx: &mut RenderContext<D>,
    instance: &mut MountedInstance,
    next: Element,
) -> Result<()> {
    let prev = instance.element().clone();
    match (&prev, &next) {
        (Element::Text(old), Element::Text(new)) if old != new => {
            let node = identity::lookup_node(ctx, instance.id())?;
            ctx.document.set_text_content(node, new);
        }
        (Element::Composite(_), Element::Composite(composite)) => {
            let rendered = render_checked(composite)?;
            if let Some(child) = instance.children_mut().first_mut() {
                if child.element().is_compatible_with(&rendered) {
                    update_instance(ctx, child, rendered)?;
                } else {
                    replace_instance(ctx, child, rendered)?;
                }
            }
        }
        (Element::Host(old), Element::Host(new)) => update_host(ctx, instance, old, new)?,
        _ => {}
    }
    instance.set_element(next);
    Ok(())
}

fn update_host<D: Document>(
    ctx: &mut RenderContext<D>,
    instance: &mut MountedInstance,
    prev: &HostElement,
    next: &HostElement,
) -> Result<()> {
    let node = identity::lookup_node(ctx, instance.id())?;
    let config = ctx.config.clone();

    for (name, _) in prev.attributes() {
        if !is_reserved(&config, name) && next.attribute(name).is_none() {
            ctx.document.remove_attribute(node, name);
        }
    }
    for (name, value) in next.attributes() {
        if !is_reserved(&config, name) && prev.attribute(name) != Some(value) {
            ctx.document.set_attribute(node, name, value);
        }
    }

    match (prev.inline_text(), next.inline_text()) {
        (Some(old), Some(new)) => {
            if old != new {
                ctx.document.set_text_content(node, new);
            }
        }
        (_, Some(new)) => {
            for child in instance.children() {
                purge_subtree(ctx, child);
            }
            instance.children_mut().clear();
            ctx.document.set_text_content(node, new);
        }
        (Some(_), None) => {
            let mut markup = String::new();
            let mut children = Vec::with_capacity(next.child_elements().len());
            for (index, element) in next.child_elements().iter().enumerate() {
                let mut child = instance.child(child_id(instance.id(), index, element), element.clone());
                markup.push_str(&mount_fresh(ctx, &mut child)?);
                children.push(child);
            }
            let created = ctx.document.insert_markup(node, &markup)?;
            for (&node, child) in created.iter().zip(&children) {
                identity::bind_id(ctx, node, child.id());
            }
            *instance.children_mut() = children;
        }
        (None, None) => update_children(ctx, instance, node, next.child_elements())?,
    }
    Ok(())
}

enum Step {
    Update(MountedInstance, Element),
    Replace(NodeId, MountedInstance),
    Append(MountedInstance),
}

/// Positional child diff.
///
/// Old nodes are resolved and replaced subtrees purged before the document
/// changes, while every identifier still names exactly one node.
fn update_children<D: Document>(
    ctx: &mut RenderContext<D>,
    instance: &mut MountedInstance,
    parent: NodeId,
    next: &[Element],
) -> Result<()> {
    let old_nodes = instance
        .children()
        .iter()
        .map(|child| identity::lookup_node(ctx, child.id()))
        .collect::<Result<Vec<_>>>()?;
    let previous = std::mem::take(instance.children_mut());
    let mut old = previous.into_iter().zip(old_nodes);

    let mut steps = Vec::with_capacity(next.len());
    for (index, element) in next.iter().enumerate() {
        let id = child_id(instance.id(), index, element);
        match old.next() {
            Some((existing, _))
                if existing.id() == &id && existing.element().is_compatible_with(element) =>
            {
                steps.push(Step::Update(existing, element.clone()));
            }
            Some((existing, node)) => {
                purge_subtree(ctx, &existing);
                steps.push(Step::Replace(node, instance.child(id, element.clone())));
            }
            None => steps.push(Step::Append(instance.child(id, element.clone()))),
        }
    }
    let removed: Vec<(MountedInstance, NodeId)> = old.collect();
    for (existing, _) in &removed {
        purge_subtree(ctx, existing);
    }

    let mut children = Vec::with_capacity(steps.len());
    for step in steps {
        let child = match step {
            Step::Update(mut existing, element) => {
                update_instance(ctx, &mut existing, element)?;
                existing
            }
            Step::Replace(node, mut fresh) => {
                let markup = mount_fresh(ctx, &mut fresh)?;
                let created = ctx.document.replace_with_markup(node, &markup)?;
                bind_created(ctx, &created, &fresh);
                fresh
            }
            Step::Append(mut fresh) => {
                let markup = mount_fresh(ctx, &mut fresh)?;
                let created = ctx.document.append_markup(parent, &markup)?;
                bind_created(ctx, &created, &fresh);
                fresh
            }
        };
        children.push(child);
    }
    for (_, node) in removed {
        ctx.document.remove_node(node);
    }
    *instance.children_mut() = children;
    Ok(())
}

/// Swap the subtree at `slot` for a fresh mount of `next` under the same
/// identifier.
fn replace_instance<D: Document>(
    ctx: &mut RenderContext<D>,
    slot: &mut MountedInstance,
    next: Element,
) -> Result<()> {
    let node = identity::lookup_node(ctx, slot.id())?;
    purge_subtree(ctx, slot);
    let mut fresh = slot.child(slot.id().clone(), next);
    let markup = mount_fresh(ctx, &mut fresh)?;
    let created = ctx.document.replace_with_markup(node, &markup)?;
    bind_created(ctx, &created, &fresh);
    *slot = fresh;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MemoryDocument;
    use crate::element::Component;
    use crate::error::ElementDiagnosis;
    use crate::mount::render;
    use crate::reconciler::instantiate;

    fn list(items: &[&str]) -> Element {
        Element::host("ul")
            .attr("class", "list")
            .children(items.iter().map(|item| Element::host("li").text(*item)))
            .into()
    }

    fn setup() -> (RenderContext<MemoryDocument>, NodeId) {
        let mut doc = MemoryDocument::new();
        let container = doc.create_element("main");
        doc.append_child(doc.document_node(), container).unwrap();
        (RenderContext::new(doc), container)
    }

    fn markup(ctx: &RenderContext<MemoryDocument>, container: NodeId) -> String {
        ctx.document().inner_markup(container)
    }

    struct Label(&'static str);

    impl Component for Label {
        fn render(&self) -> Element {
            Element::host("label").text(self.0).into()
        }
    }

    #[test]
    fn test_mount_markup() {
        let (mut ctx, _) = setup();
        let element: Element = Element::host("ul")
            .attr("class", "list")
            .attr("data-rover-id", "ignored")
            .child(Element::host("li").with_key("a").text("A"))
            .child(Element::host("li").text("B <3"))
            .text("tail")
            .into();
        let mut instance = instantiate(&ctx, element, Identifier::root(0));

        let markup = TreeReconciler
            .mount(&mut ctx, &mut instance, HostContext::default())
            .unwrap();

        assert_eq!(
            markup,
            concat!(
                r#"<ul class="list" data-rover-id=".0">"#,
                r#"<li data-rover-id=".0.$a">A</li>"#,
                r#"<li data-rover-id=".0.1">B &lt;3</li>"#,
                r#"<span data-rover-id=".0.2">tail</span>"#,
                "</ul>"
            )
        );
        assert_eq!(instance.children().len(), 3);
    }

    #[test]
    fn test_static_markup_has_no_ids() {
        let (mut ctx, _) = setup();
        let element: Element = Element::component(Label("hi")).into();
        let mut instance = instantiate(&ctx, element, Identifier::root(4));

        let markup = TreeReconciler
            .mount(
                &mut ctx,
                &mut instance,
                HostContext {
                    static_markup: true,
                },
            )
            .unwrap();

        assert_eq!(markup, "<label>hi</label>");
        assert_eq!(instance.children()[0].id(), instance.id());
    }

    #[test]
    fn test_identical_update_touches_nothing() {
        let (mut ctx, container) = setup();
        render(&mut ctx, list(&["a", "b"]), container, None).unwrap();
        ctx.document_mut().reset_stats();

        render(&mut ctx, list(&["a", "b"]), container, None).unwrap();

        assert_eq!(ctx.document().stats().mutations, 0);
    }

    #[test]
    fn test_text_and_attribute_patch() {
        let (mut ctx, container) = setup();
        render(&mut ctx, list(&["a", "b"]), container, None).unwrap();
        ctx.document_mut().reset_stats();

        let next = Element::host("ul")
            .attr("title", "t")
            .child(Element::host("li").text("a"))
            .child(Element::host("li").text("B"));
        render(&mut ctx, next, container, None).unwrap();

        assert_eq!(
            markup(&ctx, container),
            r#"<ul data-rover-id=".0" title="t"><li data-rover-id=".0.0">a</li><li data-rover-id=".0.1">B</li></ul>"#
        );
        // class removed, title set, one text patch
        assert_eq!(ctx.document().stats().mutations, 3);
        assert_eq!(ctx.document().stats().nodes_created, 1);
    }

    #[test]
    fn test_children_appended_and_removed() {
        let (mut ctx, container) = setup();
        render(&mut ctx, list(&["a"]), container, None).unwrap();

        render(&mut ctx, list(&["a", "b", "c"]), container, None).unwrap();
        assert!(markup(&ctx, container).ends_with(r#"<li data-rover-id=".0.2">c</li></ul>"#));

        render(&mut ctx, list(&["a"]), container, None).unwrap();
        assert_eq!(
            markup(&ctx, container),
            r#"<ul class="list" data-rover-id=".0"><li data-rover-id=".0.0">a</li></ul>"#
        );
        assert_eq!(ctx.cached_node(&Identifier::from(".0.2")), None);
    }

    #[test]
    fn test_incompatible_child_is_replaced() {
        let (mut ctx, container) = setup();
        render(&mut ctx, list(&["a", "b"]), container, None).unwrap();

        let next = Element::host("ul")
            .attr("class", "list")
            .child(Element::host("li").text("a"))
            .child(Element::component(Label("b")));
        render(&mut ctx, next, container, None).unwrap();

        assert_eq!(
            markup(&ctx, container),
            r#"<ul class="list" data-rover-id=".0"><li data-rover-id=".0.0">a</li><label data-rover-id=".0.1">b</label></ul>"#
        );
    }

    #[test]
    fn test_keyed_swap() {
        let (mut ctx, container) = setup();
        let keyed = |order: [&'static str; 2]| -> Element {
            Element::host("ul")
                .children(order.map(|key| Element::host("li").with_key(key).text(key)))
                .into()
        };
        render(&mut ctx, keyed(["x", "y"]), container, None).unwrap();
        render(&mut ctx, keyed(["y", "x"]), container, None).unwrap();

        assert_eq!(
            markup(&ctx, container),
            r#"<ul data-rover-id=".0"><li data-rover-id=".0.$y">y</li><li data-rover-id=".0.$x">x</li></ul>"#
        );

        // Both cache entries point at the live nodes.
        for key in ["x", "y"] {
            let id = Identifier::from(format!(".0.${}", key));
            let node = ctx.cached_node(&id).unwrap();
            assert_eq!(ctx.document().get_attribute(node, "data-rover-id"), Some(id.as_str()));
        }
    }

    #[test]
    fn test_switch_between_inline_text_and_children() {
        let (mut ctx, container) = setup();
        render(&mut ctx, Element::host("div").text("plain"), container, None).unwrap();

        render(
            &mut ctx,
            Element::host("div").child(Element::host("b").text("bold")).text("!"),
            container,
            None,
        )
        .unwrap();
        assert_eq!(
            markup(&ctx, container),
            r#"<div data-rover-id=".0"><b data-rover-id=".0.0">bold</b><span data-rover-id=".0.1">!</span></div>"#
        );

        render(&mut ctx, Element::host("div").text("plain"), container, None).unwrap();
        assert_eq!(markup(&ctx, container), r#"<div data-rover-id=".0">plain</div>"#);
        assert_eq!(ctx.cached_node(&Identifier::from(".0.0")), None);
    }

    #[test]
    fn test_composite_rerender() {
        let (mut ctx, container) = setup();
        render(&mut ctx, Element::component(Label("one")), container, None).unwrap();
        render(&mut ctx, Element::component(Label("two")), container, None).unwrap();

        assert_eq!(markup(&ctx, container), r#"<label data-rover-id=".0">two</label>"#);
    }

    struct Tagged(&'static str);

    impl Component for Tagged {
        fn render(&self) -> Element {
            Element::host("section").child(Element::host(self.0)).into()
        }
    }

    #[test]
    fn test_composite_output_is_validated() {
        let (mut ctx, container) = setup();
        let err = render(&mut ctx, Element::component(Tagged("my tag")), container, None).unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::InvalidElement(ElementDiagnosis::InvalidTagName(ref name)) if name == "my tag"
        ));
        assert_eq!(markup(&ctx, container), "");
        assert_eq!(ctx.root_count(), 0);

        render(&mut ctx, Element::component(Tagged("p")), container, None).unwrap();
        let before = markup(&ctx, container);
        let err = render(&mut ctx, Element::component(Tagged("p onload")), container, None).unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidElement(_)));
        assert_eq!(markup(&ctx, container), before);
    }
}
