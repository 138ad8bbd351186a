use crate::context::{Diagnostic, RenderContext};
use crate::document::{Document, NodeId, NodeKind};
use crate::error::{ReconcileError, Result};
use crate::identity;
use tracing::{debug, warn};

const MOD_ADLER: u32 = 65521;
/// Largest run of bytes before the sums must be reduced to avoid overflow.
const NMAX: usize = 5552;
const EXCERPT_LEN: usize = 20;

/// Adler-32 checksum.
pub fn adler32(data: &[u8]) -> u32 {
    let mut a: u32 = 1;
    let mut b: u32 = 0;
    for chunk in data.chunks(NMAX) {
        for &byte in chunk {
            a += u32::from(byte);
            b += a;
        }
        a %= MOD_ADLER;
        b %= MOD_ADLER;
    }
    (b << 16) | a
}

/// Add the checksum of `markup` as `attribute` on its first tag.
pub fn add_checksum_to_markup(markup: &str, attribute: &str) -> String {
    let checksum = adler32(markup.as_bytes());
    match markup.find('>') {
        Some(end) => format!(
            "{} {}=\"{}\"{}",
            &markup[..end],
            attribute,
            checksum,
            &markup[end..]
        ),
        None => markup.to_string(),
    }
}

/// Whether `existing_checksum`, read off a server-rendered root, was computed
/// from exactly `markup`.
pub fn can_reuse_markup(markup: &str, existing_checksum: Option<&str>) -> bool {
    existing_checksum
        .and_then(|value| value.trim().parse::<u32>().ok())
        .is_some_and(|checksum| checksum == adler32(markup.as_bytes()))
}

/// Byte offset of the first differing character, or the shorter length when
/// one string is a prefix of the other.
pub fn first_difference_index(a: &str, b: &str) -> usize {
    a.char_indices()
        .zip(b.chars())
        .find(|((_, left), right)| left != right)
        .map(|((index, _), _)| index)
        .unwrap_or_else(|| a.len().min(b.len()))
}

fn excerpt(markup: &str, offset: usize) -> String {
    let start = offset.saturating_sub(EXCERPT_LEN / 2);
    let start = (0..=start).rev().find(|&i| markup.is_char_boundary(i)).unwrap_or(0);
    markup[start..].chars().take(EXCERPT_LEN).collect()
}

/// Put freshly generated `markup` into `container`.
///
/// With `should_reuse`, the container's existing root is kept untouched when
/// its checksum matches. A mismatch in an ordinary container is reported and
/// the content replaced; the document root is never replaced.
pub fn mount_image_into_node<D: Document>(
    ctx: &mut RenderContext<D>,
    markup: &str,
    container: NodeId,
    should_reuse: bool,
) -> Result<()> {
    let is_document = ctx.document.kind(container) == Some(NodeKind::Document);

    if should_reuse {
        if let Some(root) = ctx.document.root_element(container) {
            let attribute = ctx.config.checksum_attribute.clone();
            let existing = ctx
                .document
                .get_attribute(root, &attribute)
                .map(str::to_string);
            if can_reuse_markup(markup, existing.as_deref()) {
                debug!("reusing server markup in {:?}", container);
                return Ok(());
            }

            if let Some(value) = &existing {
                ctx.document.remove_attribute(root, &attribute);
                let server = ctx.document.serialize(root);
                ctx.document.set_attribute(root, &attribute, value);
                report_mismatch(ctx, markup, &server, container, is_document)?;
            } else {
                let server = ctx.document.serialize(root);
                report_mismatch(ctx, markup, &server, container, is_document)?;
            }
        }
    }

    if is_document {
        return Err(ReconcileError::DocumentRootMismatch {
            reason: "a new tree cannot be rendered into a document node without matching server markup"
                .to_string(),
            offset: None,
        });
    }

    let created = ctx.document.insert_markup(container, markup)?;
    if let Some(&root) = created.first() {
        identity::resolve_id(ctx, root)?;
    }
    Ok(())
}

fn report_mismatch<D: Document>(
    ctx: &mut RenderContext<D>,
    client: &str,
    server: &str,
    container: NodeId,
    is_document: bool,
) -> Result<()> {
    let offset = first_difference_index(client, server);
    if is_document {
        return Err(ReconcileError::DocumentRootMismatch {
            reason: format!(
                "server markup differs at byte {}: client {:?}, server {:?}",
                offset,
                excerpt(client, offset),
                excerpt(server, offset)
            ),
            offset: Some(offset),
        });
    }
    warn!("replacing server markup in {:?} that failed the checksum", container);
    ctx.report(Diagnostic::MarkupMismatch {
        container,
        offset,
        client: excerpt(client, offset),
        server: excerpt(server, offset),
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MemoryDocument;

    #[test]
    fn test_adler32_known_values() {
        assert_eq!(adler32(b""), 1);
        assert_eq!(adler32(b"Wikipedia"), 0x11E6_0398);
    }

    #[test]
    fn test_adler32_long_input_reduces() {
        let data = vec![0xffu8; 100_000];
        let checksum = adler32(&data);
        assert!(checksum & 0xffff < MOD_ADLER);
        assert!(checksum >> 16 < MOD_ADLER);
    }

    #[test]
    fn test_add_checksum_targets_first_tag() {
        let markup = r#"<div data-rover-id=".0"><b>x</b></div>"#;
        let with = add_checksum_to_markup(markup, "data-rover-checksum");
        let expected = format!(
            r#"<div data-rover-id=".0" data-rover-checksum="{}"><b>x</b></div>"#,
            adler32(markup.as_bytes())
        );
        assert_eq!(with, expected);
    }

    #[test]
    fn test_can_reuse_markup() {
        let markup = "<p>hi</p>";
        let checksum = adler32(markup.as_bytes()).to_string();
        assert!(can_reuse_markup(markup, Some(&checksum)));
        assert!(!can_reuse_markup("<p>ho</p>", Some(&checksum)));
        assert!(!can_reuse_markup(markup, Some("not a number")));
        assert!(!can_reuse_markup(markup, None));
    }

    #[test]
    fn test_first_difference_index() {
        assert_eq!(first_difference_index("abcdef", "abcxef"), 3);
        assert_eq!(first_difference_index("abc", "abcdef"), 3);
        assert_eq!(first_difference_index("same", "same"), 4);
        assert_eq!(first_difference_index("é1", "é2"), 2);
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        let text = "ééééééééééééééé<x>";
        let offset = text.find('<').unwrap();
        let piece = excerpt(text, offset);
        assert!(piece.contains("<x>"));
    }

    #[test]
    fn test_mismatch_in_document_is_fatal() {
        let mut doc = MemoryDocument::new();
        let root = doc.document_node();
        doc.insert_markup(
            root,
            r#"<html data-rover-id=".0" data-rover-checksum="1"><body data-rover-id=".0.0"></body></html>"#,
        )
        .unwrap();
        let mut ctx = RenderContext::new(doc);

        let err = mount_image_into_node(
            &mut ctx,
            r#"<html data-rover-id=".0"><body data-rover-id=".0.0">x</body></html>"#,
            root,
            true,
        )
        .unwrap_err();

        assert!(matches!(err, ReconcileError::DocumentRootMismatch { offset: Some(_), .. }));
        // The checksum attribute was restored.
        let html = ctx.document().root_element(root).unwrap();
        assert_eq!(ctx.document().get_attribute(html, "data-rover-checksum"), Some("1"));
    }
}
