//! Markup text helpers shared by the reconciler's writer and the in-memory
//! document, so generated and serialized markup agree byte for byte.

use crate::error::DocumentError;
use std::borrow::Cow;

/// Parsed markup fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupNode {
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
        children: Vec<MarkupNode>,
    },
    Text(String),
}

/// Escape text and attribute values.
pub fn escape(input: &str) -> Cow<'_, str> {
    if !input.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(input);
    }
    let mut out = String::with_capacity(input.len() + 8);
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    Cow::Owned(out)
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':')
}

/// True when `name` can be written as a tag or attribute name and read back
/// unchanged.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(is_name_char)
}

fn unescape(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').and_then(|semi| {
            let entity = &rest[1..semi];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|ch| (ch, semi + 1))
        });
        match decoded {
            Some((ch, consumed)) => {
                out.push(ch);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

pub fn write_open_tag<'a, I>(out: &mut String, tag: &str, attributes: I)
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    out.push('<');
    out.push_str(tag);
    for (name, value) in attributes {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&escape(value));
        out.push('"');
    }
    out.push('>');
}

pub fn write_close_tag(out: &mut String, tag: &str) {
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

pub fn write_node(out: &mut String, node: &MarkupNode) {
    match node {
        MarkupNode::Text(text) => out.push_str(&escape(text)),
        MarkupNode::Element {
            tag,
            attributes,
            children,
        } => {
            write_open_tag(
                out,
                tag,
                attributes.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            );
            for child in children {
                write_node(out, child);
            }
            write_close_tag(out, tag);
        }
    }
}

/// Parse the markup subset the reconciler writes: elements with quoted
/// attributes, text, and character references.
pub fn parse_fragment(markup: &str) -> Result<Vec<MarkupNode>, DocumentError> {
    let mut parser = Parser { src: markup, pos: 0 };
    parser.parse_nodes(None)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn error(&self, message: impl Into<String>) -> DocumentError {
        DocumentError::MalformedMarkup {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let rest = self.rest();
        let len = rest.find(|c: char| !pred(c)).unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    fn skip_whitespace(&mut self) {
        self.take_while(char::is_whitespace);
    }

    fn parse_nodes(&mut self, closing: Option<&str>) -> Result<Vec<MarkupNode>, DocumentError> {
        let mut nodes = Vec::new();
        loop {
            let rest = self.rest();
            if rest.is_empty() {
                return match closing {
                    None => Ok(nodes),
                    Some(tag) => Err(self.error(format!("missing </{}>", tag))),
                };
            }
            if let Some(after) = rest.strip_prefix("</") {
                let Some(tag) = closing else {
                    return Err(self.error("closing tag without an open element"));
                };
                let end = after.find('>').ok_or_else(|| self.error("unterminated closing tag"))?;
                let name = after[..end].trim();
                if name != tag {
                    return Err(self.error(format!("expected </{}>, found </{}>", tag, name)));
                }
                self.pos += end + 3;
                return Ok(nodes);
            }
            if rest.starts_with('<') {
                nodes.push(self.parse_element()?);
            } else {
                let end = rest.find('<').unwrap_or(rest.len());
                nodes.push(MarkupNode::Text(unescape(&rest[..end])));
                self.pos += end;
            }
        }
    }

    fn parse_element(&mut self) -> Result<MarkupNode, DocumentError> {
        self.pos += 1;
        let tag = self
            .take_while(is_name_char)
            .to_string();
        if tag.is_empty() {
            return Err(self.error("expected a tag name"));
        }

        let mut attributes = Vec::new();
        loop {
            self.skip_whitespace();
            let rest = self.rest();
            if rest.starts_with("/>") {
                self.pos += 2;
                return Ok(MarkupNode::Element {
                    tag,
                    attributes,
                    children: Vec::new(),
                });
            }
            if rest.starts_with('>') {
                self.pos += 1;
                break;
            }
            if rest.is_empty() {
                return Err(self.error(format!("unterminated <{}>", tag)));
            }

            let name = self.take_while(|c| !c.is_whitespace() && !matches!(c, '=' | '>' | '/'));
            if name.is_empty() {
                return Err(self.error("expected an attribute name"));
            }
            self.skip_whitespace();
            let value = if self.rest().starts_with('=') {
                self.pos += 1;
                self.skip_whitespace();
                self.parse_quoted()?
            } else {
                String::new()
            };
            attributes.push((name.to_string(), value));
        }

        let children = self.parse_nodes(Some(&tag))?;
        Ok(MarkupNode::Element {
            tag,
            attributes,
            children,
        })
    }

    fn parse_quoted(&mut self) -> Result<String, DocumentError> {
        let rest = self.rest();
        let quote = match rest.chars().next() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(self.error("expected a quoted attribute value")),
        };
        let end = rest[1..]
            .find(quote)
            .ok_or_else(|| self.error("unterminated attribute value"))?;
        let value = unescape(&rest[1..end + 1]);
        self.pos += end + 2;
        Ok(value)
    }
}
