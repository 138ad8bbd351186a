//! Markup generation for server-side rendering.
//!
//! Each request should use its own [`RenderContext`]; the context only lends
//! its configuration, reconciler and server root generator. Nothing stays
//! mounted.

use crate::context::RenderContext;
use crate::document::Document;
use crate::element::Renderable;
use crate::error::{ReconcileError, Result};
use crate::markup_reuse::add_checksum_to_markup;
use crate::reconciler::{HostContext, instantiate};
use crate::transaction::batched_updates;
use tracing::debug;

/// Markup with identifiers and a checksum on the root, ready for a client
/// context to mount over without rewriting it.
pub fn render_to_string<D: Document>(ctx: &mut RenderContext<D>, element: impl Into<Renderable>) -> Result<String> {
    render_markup(ctx, element.into(), false)
}

/// Plain markup with no reconciler attributes.
pub fn render_to_static_markup<D: Document>(
    ctx: &mut RenderContext<D>,
    element: impl Into<Renderable>,
) -> Result<String> {
    render_markup(ctx, element.into(), true)
}

fn render_markup<D: Document>(ctx: &mut RenderContext<D>, element: Renderable, static_markup: bool) -> Result<String> {
    let element = element
        .into_element()
        .map_err(ReconcileError::InvalidElement)?;
    let root_id = ctx.mint_server_root_id();

    batched_updates(ctx, move |ctx| {
        let mut instance = instantiate(ctx, element, root_id);
        let reconciler = ctx.reconciler.clone();
        let markup = reconciler.mount(ctx, &mut instance, HostContext { static_markup })?;
        reconciler.unmount(ctx, &instance);
        debug!("rendered {} bytes of server markup for {}", markup.len(), instance.id());

        if static_markup {
            Ok(markup)
        } else {
            Ok(add_checksum_to_markup(&markup, &ctx.config.checksum_attribute))
        }
    })
}
