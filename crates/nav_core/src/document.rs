//! Detached model of a server-rendered HTML document.
//!
//! The container element carrying `data-template` is the sole routing
//! signal between server-rendered fragments and the client page registry.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use url::Url;

use crate::error::DocumentError;

/// Attribute naming the active template on the content container.
pub const TEMPLATE_ATTR: &str = "data-template";

/// A fetched document reduced to what navigation needs: the template id,
/// the container's raw inner markup, and the link/image inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDocument {
    pub template: String,
    /// Byte-exact inner markup of the content container.
    pub markup: String,
    /// Every `<a href>` in the document, in document order.
    pub anchors: Vec<String>,
    /// Every `<img src>` in the document, in document order.
    pub images: Vec<String>,
}

impl ContentDocument {
    /// Parses a full HTML body. Lenient about HTML quirks (unmatched end
    /// tags, unquoted entities); strict about the one thing that matters:
    /// a container with a `data-template` attribute must exist.
    pub fn parse(html: &str) -> Result<Self, DocumentError> {
        let mut reader = Reader::from_str(html);
        reader.config_mut().trim_text(false);
        reader.config_mut().enable_all_checks(false);

        let mut template: Option<String> = None;
        let mut markup: Option<String> = None;
        let mut anchors = Vec::new();
        let mut images = Vec::new();
        // (tag name, byte offset where the container's inner markup starts)
        let mut container: Option<(String, usize)> = None;
        let mut depth = 0usize;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    collect_inventory(&e, &mut anchors, &mut images)?;
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    if container.is_none() && markup.is_none() {
                        if let Some(value) = attr_value(&e, TEMPLATE_ATTR)? {
                            template = Some(value);
                            container = Some((name, reader.buffer_position() as usize));
                            continue;
                        }
                    }
                    if let Some((tag, _)) = &container {
                        if *tag == name {
                            depth += 1;
                        }
                    }
                }
                Event::Empty(e) => {
                    collect_inventory(&e, &mut anchors, &mut images)?;
                    if container.is_none() && markup.is_none() {
                        if let Some(value) = attr_value(&e, TEMPLATE_ATTR)? {
                            template = Some(value);
                            markup = Some(String::new());
                        }
                    }
                }
                Event::End(e) => {
                    if let Some((tag, inner_start)) = &container {
                        if e.name().as_ref() == tag.as_bytes() {
                            if depth == 0 {
                                // The end tag is `</tag>`: name length plus 3.
                                let inner_end =
                                    reader.buffer_position() as usize - (tag.len() + 3);
                                markup = Some(html[*inner_start..inner_end].to_string());
                                container = None;
                            } else {
                                depth -= 1;
                            }
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some((tag, _)) = container {
            return Err(DocumentError::UnterminatedContainer { tag });
        }
        match (template, markup) {
            (Some(template), Some(markup)) => Ok(Self {
                template,
                markup,
                anchors,
                images,
            }),
            _ => Err(DocumentError::MissingContainer),
        }
    }
}

fn collect_inventory(
    e: &BytesStart<'_>,
    anchors: &mut Vec<String>,
    images: &mut Vec<String>,
) -> Result<(), DocumentError> {
    match e.name().as_ref() {
        b"a" => {
            if let Some(href) = attr_value(e, "href")? {
                anchors.push(href);
            }
        }
        b"img" => {
            if let Some(src) = attr_value(e, "src")? {
                images.push(src);
            }
        }
        _ => {}
    }
    Ok(())
}

fn attr_value(e: &BytesStart<'_>, key: &str) -> Result<Option<String>, DocumentError> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == key.as_bytes() {
            return Ok(Some(std::str::from_utf8(attr.value.as_ref())?.to_string()));
        }
    }
    Ok(None)
}

/// Whether an href belongs to the given origin. Relative hrefs are local
/// by definition; absolute ones are compared origin-to-origin. Anything
/// unparseable is treated as foreign and left to the default handling.
pub fn is_same_origin(href: &str, origin: &Url) -> bool {
    match Url::parse(href) {
        Ok(url) => url.origin() == origin.origin(),
        Err(url::ParseError::RelativeUrlWithoutBase) => true,
        Err(_) => false,
    }
}
