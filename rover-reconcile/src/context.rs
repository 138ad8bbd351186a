use crate::config::RenderConfig;
use crate::document::{Document, NodeId};
use crate::error::Result;
use crate::identity::{Identifier, NodeCache};
use crate::reconciler::{InstanceHandle, MountedInstance, Reconciler, TreeReconciler};
use crate::transaction::BatchState;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::warn;

/// Callback run once a render or update has landed in the document.
pub type RenderCallback<D> =
    Box<dyn FnOnce(&mut RenderContext<D>, &InstanceHandle) -> Result<()> + Send>;

/// Identity of one render context. Instances and handles keep a `Weak` to it,
/// never an owning reference.
#[derive(Debug, Default)]
pub struct ContextToken {
    _private: (),
}

/// Warning-level findings that do not stop a render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A mount replaced content the reconciler did not write.
    ContainerHasForeignMarkup { container: NodeId },
    /// Server markup in an ordinary container did not match and was replaced.
    MarkupMismatch {
        container: NodeId,
        offset: usize,
        client: String,
        server: String,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::ContainerHasForeignMarkup { container } => write!(
                f,
                "replacing content of {:?} that was not rendered by this reconciler",
                container
            ),
            Diagnostic::MarkupMismatch {
                container,
                offset,
                client,
                server,
            } => write!(
                f,
                "server markup in {:?} differs at byte {}: client {:?}, server {:?}",
                container, offset, client, server
            ),
        }
    }
}

/// All mutable state of one render session.
///
/// Every mount, lookup, update and flush takes the context explicitly, so
/// independent sessions can share a process (or run on separate threads)
/// without seeing each other's identifiers, roots or queues.
pub struct RenderContext<D: Document> {
    token: Arc<ContextToken>,
    pub(crate) document: D,
    pub(crate) config: RenderConfig,
    pub(crate) reconciler: Arc<dyn Reconciler<D>>,
    pub(crate) node_cache: NodeCache,
    pub(crate) root_containers: HashMap<Identifier, NodeId>,
    pub(crate) root_instances: HashMap<Identifier, MountedInstance>,
    pub(crate) batch: BatchState<D>,
    next_root_index: u64,
    server_roots: StdRng,
    diagnostics: Vec<Diagnostic>,
}

impl<D: Document> RenderContext<D> {
    pub fn new(document: D) -> Self {
        Self::with_config(document, RenderConfig::default())
    }

    pub fn with_config(document: D, config: RenderConfig) -> Self {
        Self {
            token: Arc::new(ContextToken::default()),
            document,
            config,
            reconciler: Arc::new(TreeReconciler),
            node_cache: NodeCache::new(),
            root_containers: HashMap::new(),
            root_instances: HashMap::new(),
            batch: BatchState::new(),
            next_root_index: 0,
            server_roots: StdRng::from_entropy(),
            diagnostics: Vec::new(),
        }
    }

    pub fn with_reconciler(mut self, reconciler: impl Reconciler<D>) -> Self {
        self.reconciler = Arc::new(reconciler);
        self
    }

    /// Seed the generator behind server root identifiers, for reproducible
    /// server markup.
    pub fn with_server_seed(mut self, seed: u64) -> Self {
        self.server_roots = StdRng::seed_from_u64(seed);
        self
    }

    pub fn document(&self) -> &D {
        &self.document
    }

    /// Direct document access, e.g. for embedding code that edits content
    /// the reconciler does not manage.
    pub fn document_mut(&mut self) -> &mut D {
        &mut self.document
    }

    pub fn into_document(self) -> D {
        self.document
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub(crate) fn owner(&self) -> Weak<ContextToken> {
        Arc::downgrade(&self.token)
    }

    pub(crate) fn is_owner(&self, owner: &Weak<ContextToken>) -> bool {
        std::ptr::eq(owner.as_ptr(), Arc::as_ptr(&self.token))
    }

    /// Next root identifier not registered to any container.
    pub(crate) fn mint_root_id(&mut self) -> Identifier {
        loop {
            let id = Identifier::root(self.next_root_index);
            self.next_root_index += 1;
            if !self.root_containers.contains_key(&id) {
                return id;
            }
        }
    }

    /// Root identifier for server-rendered markup. Drawn at random from a
    /// space client roots never use, so markup from separate server contexts
    /// can sit next to client-rendered roots on one page.
    pub(crate) fn mint_server_root_id(&mut self) -> Identifier {
        Identifier::server_root(self.server_roots.next_u64())
    }

    pub(crate) fn report(&mut self, diagnostic: Diagnostic) {
        warn!("{}", diagnostic);
        self.diagnostics.push(diagnostic);
    }

    /// Outermost batching transactions closed so far.
    pub fn flush_count(&self) -> u64 {
        self.batch.flush_count
    }

    pub fn is_batching(&self) -> bool {
        self.batch.is_batching
    }

    pub fn pending_updates(&self) -> usize {
        self.batch.update_queue.len()
    }

    pub fn cached_node(&self, id: &Identifier) -> Option<NodeId> {
        self.node_cache.get(id)
    }

    pub fn cache_len(&self) -> usize {
        self.node_cache.len()
    }

    /// Roots with a mounted instance.
    pub fn root_count(&self) -> usize {
        self.root_instances.len()
    }

    pub fn root_container(&self, root: &Identifier) -> Option<NodeId> {
        self.root_containers.get(root).copied()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}

impl<D: Document> fmt::Debug for RenderContext<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("roots", &self.root_instances.len())
            .field("cached_nodes", &self.node_cache.len())
            .field("is_batching", &self.batch.is_batching)
            .field("flush_count", &self.batch.flush_count)
            .finish_non_exhaustive()
    }
}
