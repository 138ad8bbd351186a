use crate::context::{RenderCallback, RenderContext};
use crate::document::Document;
use crate::element::Element;
use crate::error::Result;
use crate::identity::Identifier;
use crate::reconciler::InstanceHandle;
use std::collections::{HashSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

/// Replace-element request for a mounted root.
pub(crate) struct PendingUpdate<D: Document> {
    pub(crate) root: Identifier,
    pub(crate) element: Element,
    pub(crate) callback: Option<RenderCallback<D>>,
}

pub(crate) struct BatchState<D: Document> {
    pub(crate) is_batching: bool,
    pub(crate) update_queue: VecDeque<PendingUpdate<D>>,
    pub(crate) callback_queue: VecDeque<(InstanceHandle, RenderCallback<D>)>,
    pub(crate) dirty_instances: HashSet<Identifier>,
    pub(crate) flush_count: u64,
}

impl<D: Document> BatchState<D> {
    pub(crate) fn new() -> Self {
        Self {
            is_batching: false,
            update_queue: VecDeque::new(),
            callback_queue: VecDeque::new(),
            dirty_instances: HashSet::new(),
            flush_count: 0,
        }
    }

    fn discard(&mut self) -> usize {
        let dropped = self.update_queue.len() + self.callback_queue.len();
        self.update_queue.clear();
        self.callback_queue.clear();
        self.dirty_instances.clear();
        dropped
    }
}

/// Run `f` as one batching transaction.
///
/// Only the outermost call flushes: nested calls run `f` directly and leave
/// the queued work to the transaction already open. The batching flag is
/// cleared on every exit path, panics included.
pub fn batched_updates<D, T, F>(ctx: &mut RenderContext<D>, f: F) -> Result<T>
where
    D: Document,
    F: FnOnce(&mut RenderContext<D>) -> Result<T>,
{
    if ctx.batch.is_batching {
        return f(ctx);
    }

    ctx.batch.is_batching = true;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let result = f(ctx);
        let drained = drain_queues(ctx);
        match (result, drained) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(drain_err)) => {
                warn!("flush after failed transaction also failed: {}", drain_err);
                Err(err)
            }
        }
    }));
    ctx.batch.is_batching = false;
    ctx.batch.flush_count += 1;

    let dropped = ctx.batch.discard();
    if dropped > 0 {
        warn!("dropped {} queued updates after an aborted flush", dropped);
    }

    match outcome {
        Ok(result) => result,
        Err(payload) => panic::resume_unwind(payload),
    }
}

/// Apply queued updates in FIFO order, then their callbacks. Callbacks may
/// queue more updates; the loop runs until both queues are empty.
fn drain_queues<D: Document>(ctx: &mut RenderContext<D>) -> Result<()> {
    let mut applied = 0usize;
    loop {
        if let Some(update) = ctx.batch.update_queue.pop_front() {
            apply_update(ctx, update)?;
            applied += 1;
            continue;
        }
        if let Some((handle, callback)) = ctx.batch.callback_queue.pop_front() {
            callback(ctx, &handle)?;
            continue;
        }
        break;
    }
    ctx.batch.dirty_instances.clear();
    debug!("flush #{} applied {} updates", ctx.batch.flush_count + 1, applied);
    Ok(())
}

fn apply_update<D: Document>(ctx: &mut RenderContext<D>, update: PendingUpdate<D>) -> Result<()> {
    let PendingUpdate {
        root,
        element,
        callback,
    } = update;
    let Some(mut instance) = ctx.root_instances.remove(&root) else {
        warn!("skipping update for unmounted root {}", root);
        return Ok(());
    };

    let reconciler = ctx.reconciler.clone();
    let result = reconciler.update(ctx, &mut instance, element);
    let handle = instance.handle();
    ctx.root_instances.insert(root, instance);
    result?;

    if let Some(callback) = callback {
        ctx.batch.callback_queue.push_back((handle, callback));
    }
    Ok(())
}
