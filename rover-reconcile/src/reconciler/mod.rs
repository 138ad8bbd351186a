mod tree;

pub use tree::TreeReconciler;

use crate::context::{ContextToken, RenderContext};
use crate::document::Document;
use crate::element::Element;
use crate::error::Result;
use crate::identity::Identifier;
use smartstring::alias::String as SmartString;
use std::sync::Weak;

/// Per-node mount, diff and unmount, driven by the mount manager without it
/// knowing which element kinds are involved.
pub trait Reconciler<D: Document>: Send + Sync + 'static {
    /// Build the instance subtree for `instance.element()` and return its
    /// markup. Must not touch the document.
    fn mount(
        &self,
        ctx: &mut RenderContext<D>,
        instance: &mut MountedInstance,
        host: HostContext,
    ) -> Result<String>;

    /// Bring the document and the instance subtree in line with `next`.
    fn update(&self, ctx: &mut RenderContext<D>, instance: &mut MountedInstance, next: Element) -> Result<()>;

    /// Forget everything the context knows about the instance subtree.
    fn unmount(&self, ctx: &mut RenderContext<D>, instance: &MountedInstance);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostContext {
    /// Emit markup without identifier attributes.
    pub static_markup: bool,
}

/// One mounted element and its mounted children.
///
/// A composite instance has exactly one child, its rendered element, which
/// shares the composite's identifier.
#[derive(Debug)]
pub struct MountedInstance {
    id: Identifier,
    element: Element,
    children: Vec<MountedInstance>,
    owner: Weak<ContextToken>,
}

impl MountedInstance {
    /// Create a child instance owned by the same context as `self`.
    pub fn child(&self, id: Identifier, element: Element) -> MountedInstance {
        MountedInstance {
            id,
            element,
            children: Vec::new(),
            owner: self.owner.clone(),
        }
    }

    pub fn id(&self) -> &Identifier {
        &self.id
    }

    pub fn element(&self) -> &Element {
        &self.element
    }

    /// Replace the current element, returning the previous one.
    pub fn set_element(&mut self, element: Element) -> Element {
        std::mem::replace(&mut self.element, element)
    }

    pub fn children(&self) -> &[MountedInstance] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut Vec<MountedInstance> {
        &mut self.children
    }

    /// Every identifier in this subtree, the instance's own first.
    pub fn subtree_ids(&self) -> Vec<Identifier> {
        let mut ids = Vec::new();
        let mut stack = vec![self];
        while let Some(instance) = stack.pop() {
            if ids.last() != Some(&instance.id) {
                ids.push(instance.id.clone());
            }
            stack.extend(instance.children.iter().rev());
        }
        ids
    }

    pub fn handle(&self) -> InstanceHandle {
        InstanceHandle {
            id: self.id.clone(),
            kind: self.element.kind_name().into(),
            owner: self.owner.clone(),
        }
    }
}

/// Public reference to a mounted root.
///
/// Handles compare equal when they name the same root of the same context.
#[derive(Debug, Clone)]
pub struct InstanceHandle {
    id: Identifier,
    kind: SmartString,
    owner: Weak<ContextToken>,
}

impl InstanceHandle {
    pub fn id(&self) -> &Identifier {
        &self.id
    }

    /// Tag or component name of the element the root was mounted from.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn is_owned_by<D: Document>(&self, ctx: &RenderContext<D>) -> bool {
        ctx.is_owner(&self.owner)
    }

    /// False once the owning context has been dropped.
    pub fn is_alive(&self) -> bool {
        self.owner.strong_count() > 0
    }
}

impl PartialEq for InstanceHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Weak::ptr_eq(&self.owner, &other.owner)
    }
}

impl Eq for InstanceHandle {}

/// Create the instance for `element` at `id`, owned by `ctx`.
pub fn instantiate<D: Document>(ctx: &RenderContext<D>, element: Element, id: Identifier) -> MountedInstance {
    MountedInstance {
        id,
        element,
        children: Vec::new(),
        owner: ctx.owner(),
    }
}
