pub mod config;
pub mod context;
pub mod document;
pub mod element;
pub mod error;
pub mod identity;
pub mod logging;
pub mod markup_reuse;
pub mod mount;
pub mod reconciler;
pub mod server;
pub mod transaction;

// Re-export key types
pub use config::RenderConfig;
pub use context::{ContextToken, Diagnostic, RenderCallback, RenderContext};
pub use document::{Document, MemoryDocument, NodeId, NodeKind};
pub use element::{Component, ComponentKind, Element, HostElement, Renderable};
pub use error::{DocumentError, ElementDiagnosis, ReconcileError, Result};
pub use identity::Identifier;
pub use mount::{enqueue_update, find_component_root, flush, register_container, render, unmount_component_at_node};
pub use reconciler::{HostContext, InstanceHandle, MountedInstance, Reconciler, TreeReconciler};
pub use server::{render_to_static_markup, render_to_string};
pub use transaction::batched_updates;
