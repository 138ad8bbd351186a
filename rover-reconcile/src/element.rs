use crate::document::is_valid_name;
use crate::error::ElementDiagnosis;
use serde::Deserialize;
use serde_json::Value;
use smartstring::alias::String as SmartString;
use std::any::{TypeId, type_name};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A composite component: something that renders to another element tree.
///
/// The component value carries its own props; two composite elements are
/// update-compatible when they were built from the same concrete type.
pub trait Component: Send + Sync + 'static {
    fn render(&self) -> Element;
}

/// Identity of a component type, the "constructor" of a composite element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentKind {
    type_id: TypeId,
    name: &'static str,
}

impl ComponentKind {
    pub fn of<C: Component>() -> Self {
        let full = type_name::<C>();
        Self {
            type_id: TypeId::of::<C>(),
            name: full.rsplit("::").next().unwrap_or(full),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

#[derive(Clone)]
pub struct CompositeElement {
    kind: ComponentKind,
    component: Arc<dyn Component>,
    key: Option<SmartString>,
}

impl CompositeElement {
    pub fn new<C: Component>(component: C) -> Self {
        Self {
            kind: ComponentKind::of::<C>(),
            component: Arc::new(component),
            key: None,
        }
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn render(&self) -> Element {
        self.component.render()
    }
}

impl fmt::Debug for CompositeElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeElement")
            .field("kind", &self.kind.name)
            .field("key", &self.key)
            .finish()
    }
}

/// Primitive element that maps to one document element.
#[derive(Debug, Clone)]
pub struct HostElement {
    tag: SmartString,
    key: Option<SmartString>,
    attributes: Vec<(SmartString, String)>,
    children: Vec<Element>,
}

impl HostElement {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.into(),
            key: None,
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Set an attribute, replacing an earlier value for the same name.
    pub fn attr(mut self, name: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        match self.attributes.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((name.into(), value)),
        }
        self
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn child(mut self, child: impl Into<Element>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children<I, E>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Element>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }

    pub fn text(self, text: impl Into<String>) -> Self {
        self.child(Element::Text(text.into()))
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn child_elements(&self) -> &[Element] {
        &self.children
    }

    /// Text written directly inside the element: the case of exactly one
    /// text child.
    pub fn inline_text(&self) -> Option<&str> {
        match self.children.as_slice() {
            [Element::Text(text)] => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Element {
    Host(HostElement),
    Composite(CompositeElement),
    Text(String),
}

impl Element {
    pub fn host(tag: &str) -> HostElement {
        HostElement::new(tag)
    }

    pub fn component<C: Component>(component: C) -> CompositeElement {
        CompositeElement::new(component)
    }

    pub fn text(text: impl Into<String>) -> Element {
        Element::Text(text.into())
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            Element::Host(host) => host.key(),
            Element::Composite(composite) => composite.key(),
            Element::Text(_) => None,
        }
    }

    /// Tag name, component name, or `#text`.
    pub fn kind_name(&self) -> &str {
        match self {
            Element::Host(host) => host.tag(),
            Element::Composite(composite) => composite.kind().name(),
            Element::Text(_) => "#text",
        }
    }

    /// Whether `next` can be applied to an instance mounted from `self` in
    /// place: same concrete kind and same key.
    pub fn is_compatible_with(&self, next: &Element) -> bool {
        match (self, next) {
            (Element::Text(_), Element::Text(_)) => true,
            (Element::Host(prev), Element::Host(next)) => {
                prev.tag == next.tag && prev.key == next.key
            }
            (Element::Composite(prev), Element::Composite(next)) => {
                prev.kind == next.kind && prev.key == next.key
            }
            _ => false,
        }
    }

    /// Check every tag and attribute name in the host subtree. Composite
    /// output is checked when the composite renders.
    pub fn validate(&self) -> Result<(), ElementDiagnosis> {
        let Element::Host(host) = self else {
            return Ok(());
        };
        if !is_valid_name(host.tag()) {
            return Err(ElementDiagnosis::InvalidTagName(host.tag().to_string()));
        }
        if let Some((name, _)) = host.attributes().find(|(name, _)| !is_valid_name(name)) {
            return Err(ElementDiagnosis::InvalidAttributeName(name.to_string()));
        }
        host.child_elements().iter().try_for_each(Element::validate)
    }
}

impl From<HostElement> for Element {
    fn from(host: HostElement) -> Self {
        Element::Host(host)
    }
}

impl From<CompositeElement> for Element {
    fn from(composite: CompositeElement) -> Self {
        Element::Composite(composite)
    }
}

impl From<&str> for Element {
    fn from(text: &str) -> Self {
        Element::Text(text.to_string())
    }
}

impl From<String> for Element {
    fn from(text: String) -> Self {
        Element::Text(text)
    }
}

/// Anything a caller may hand to `render`. Only element trees are mountable;
/// the other shapes exist so mistakes get a precise diagnosis.
#[derive(Debug, Clone)]
pub enum Renderable {
    Element(Element),
    Text(String),
    Constructor(ComponentKind),
    /// A declarative description, e.g. received over the wire.
    Json(Value),
}

impl Renderable {
    /// Validate and return the element tree to mount at a root.
    pub fn into_element(self) -> Result<Element, ElementDiagnosis> {
        match self {
            Renderable::Element(Element::Text(text)) | Renderable::Text(text) => {
                Err(ElementDiagnosis::LooksLikeString(text))
            }
            Renderable::Element(element) => element.validate().map(|()| element),
            Renderable::Constructor(kind) => Err(ElementDiagnosis::LooksLikeConstructor(kind.name())),
            Renderable::Json(value) => {
                let element = element_from_json(value)?;
                element.validate().map(|()| element)
            }
        }
    }
}

impl From<Element> for Renderable {
    fn from(element: Element) -> Self {
        Renderable::Element(element)
    }
}

impl From<HostElement> for Renderable {
    fn from(host: HostElement) -> Self {
        Renderable::Element(Element::Host(host))
    }
}

impl From<CompositeElement> for Renderable {
    fn from(composite: CompositeElement) -> Self {
        Renderable::Element(Element::Composite(composite))
    }
}

impl From<&str> for Renderable {
    fn from(text: &str) -> Self {
        Renderable::Text(text.to_string())
    }
}

impl From<String> for Renderable {
    fn from(text: String) -> Self {
        Renderable::Text(text)
    }
}

impl From<ComponentKind> for Renderable {
    fn from(kind: ComponentKind) -> Self {
        Renderable::Constructor(kind)
    }
}

impl From<Value> for Renderable {
    fn from(value: Value) -> Self {
        Renderable::Json(value)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct HostDescription {
    tag: String,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    attributes: BTreeMap<String, Value>,
    #[serde(default)]
    children: Vec<ChildDescription>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ChildDescription {
    Text(String),
    Host(HostDescription),
}

impl From<HostDescription> for HostElement {
    fn from(description: HostDescription) -> Self {
        let mut host = HostElement::new(&description.tag);
        if let Some(key) = description.key.as_deref() {
            host = host.with_key(key);
        }
        for (name, value) in description.attributes {
            let value = match value {
                Value::String(text) => text,
                other => other.to_string(),
            };
            host = host.attr(&name, value);
        }
        host.children(description.children.into_iter().map(|child| match child {
            ChildDescription::Text(text) => Element::Text(text),
            ChildDescription::Host(host) => Element::Host(host.into()),
        }))
    }
}

fn element_from_json(value: Value) -> Result<Element, ElementDiagnosis> {
    match &value {
        Value::String(text) => return Err(ElementDiagnosis::LooksLikeString(text.clone())),
        Value::Object(map) if map.contains_key("$$typeof") => {
            return Err(ElementDiagnosis::LooksLikeForeignElement(
                "object with a `$$typeof` marker".to_string(),
            ));
        }
        Value::Object(map) if map.contains_key("type") && map.contains_key("props") => {
            return Err(ElementDiagnosis::LooksLikeForeignElement(
                "object with `type` and `props` keys".to_string(),
            ));
        }
        _ => {}
    }
    serde_json::from_value::<HostDescription>(value)
        .map(|description| Element::Host(description.into()))
        .map_err(|err| ElementDiagnosis::LooksLikeForeignElement(err.to_string()))
}
