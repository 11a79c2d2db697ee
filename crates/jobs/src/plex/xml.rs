//! Minimal element tree over quick-xml
//!
//! Plex payloads are attribute-heavy MediaContainer documents, so text nodes
//! are dropped and only element names and attributes are kept.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::PlexError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    /// Attribute value; blank values count as missing
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// First non-blank value among several attribute spellings
    pub fn attr_any(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.attr(k))
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Every element below this one with the given name, depth first
    pub fn descendants(&self, name: &str) -> Vec<&XmlNode> {
        let mut found = Vec::new();
        self.collect_descendants(name, &mut found);
        found
    }

    fn collect_descendants<'a>(&'a self, name: &str, found: &mut Vec<&'a XmlNode>) {
        for child in &self.children {
            if child.name == name {
                found.push(child);
            }
            child.collect_descendants(name, found);
        }
    }

    /// The document element
    pub fn root(&self) -> Option<&XmlNode> {
        self.children.first()
    }
}

/// Parse a document into a synthetic node whose children are the top-level elements.
/// A body without any element is an error.
pub fn parse(xml: &str) -> Result<XmlNode, PlexError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut stack = vec![XmlNode {
        name: "#document".to_string(),
        ..Default::default()
    }];

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(start)) => stack.push(element(&start)?),
            Ok(Event::Empty(empty)) => {
                let node = element(&empty)?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(node);
                }
            }
            Ok(Event::End(_)) => {
                if stack.len() < 2 {
                    return Err(PlexError::Xml("unbalanced closing tag".to_string()));
                }
                if let Some(node) = stack.pop() {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(node);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(PlexError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if stack.len() != 1 {
        return Err(PlexError::Xml("unexpected end of document".to_string()));
    }
    match stack.pop() {
        Some(doc) if !doc.children.is_empty() => Ok(doc),
        _ => Err(PlexError::Xml("empty document".to_string())),
    }
}

fn element(start: &BytesStart<'_>) -> Result<XmlNode, PlexError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| PlexError::Xml(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| PlexError::Xml(e.to_string()))?
            .into_owned();
        attrs.push((key, value));
    }

    Ok(XmlNode {
        name,
        attrs,
        children: Vec::new(),
    })
}
