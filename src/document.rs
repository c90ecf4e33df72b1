//! Metadata Documents
//!
//! A small owned element tree over the XML files that hold extended data types
//! and tables. Parsing and serialization go through `quick-xml`; the tree keeps
//! element order, attributes and CDATA sections.
//!
//! Writing normalizes the document: tab indentation, a UTF-8 declaration, no
//! byte-order mark. Comments, processing instructions and a DOCTYPE are not
//! kept, and text values lose surrounding whitespace. Metadata exported by the
//! tooling already has this shape, so in practice only migrated elements change.

use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{MigrationError, Result};

/// Character content of an element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    CData(String),
}

impl Content {
    pub fn as_str(&self) -> &str {
        match self {
            Content::Text(s) | Content::CData(s) => s,
        }
    }
}

/// One element of a metadata document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub content: Option<Content>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Element holding a single text value: `<Name>value</Name>`
    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: Some(Content::Text(text.into())),
            ..Self::default()
        }
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn child_element(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// Parse a document from XML text
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event()? {
                Event::Start(start) => stack.push(Self::from_start(&start)?),
                Event::Empty(start) => {
                    let element = Self::from_start(&start)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| MigrationError::Malformed("unbalanced end tag".to_string()))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    if let Some(current) = stack.last_mut() {
                        let text = text.unescape()?;
                        current.content = Some(Content::Text(text.into_owned()));
                    }
                }
                Event::CData(data) => {
                    if let Some(current) = stack.last_mut() {
                        let data = String::from_utf8_lossy(&data.into_inner()).into_owned();
                        current.content = Some(Content::CData(data));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(MigrationError::Malformed(format!("unclosed element <{}>", open.name)));
        }
        root.ok_or_else(|| MigrationError::Malformed("document has no root element".to_string()))
    }

    fn from_start(start: &BytesStart<'_>) -> Result<Self> {
        let mut element = Self::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
        for attr in start.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            element.attributes.push((key, value));
        }
        Ok(element)
    }

    /// Serialize as a tab-indented XML document with declaration
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b'\t', 1);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        self.write_to(&mut writer)?;

        let mut xml = String::from_utf8(writer.into_inner())
            .map_err(|e| MigrationError::Malformed(e.to_string()))?;
        xml.push('\n');
        Ok(xml)
    }

    fn write_to<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.content.is_none() && self.children.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }

        writer.write_event(Event::Start(start))?;
        match &self.content {
            Some(Content::Text(text)) => writer.write_event(Event::Text(BytesText::new(text)))?,
            Some(Content::CData(data)) => {
                writer.write_event(Event::CData(BytesCData::new(data.as_str())))?
            }
            None => {}
        }
        for child in &self.children {
            child.write_to(writer)?;
        }
        writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))?;
        Ok(())
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    /// Trimmed, non-empty character content
    pub fn text(&self) -> Option<&str> {
        self.content
            .as_ref()
            .map(|c| c.as_str().trim())
            .filter(|t| !t.is_empty())
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(Element::text)
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Remove the first child with this name
    pub fn remove_child(&mut self, name: &str) -> Option<Element> {
        let idx = self.children.iter().position(|c| c.name == name)?;
        Some(self.children.remove(idx))
    }

    /// Get the named child, appending an empty one if it does not exist
    pub fn ensure_child(&mut self, name: &str) -> &mut Element {
        let idx = match self.children.iter().position(|c| c.name == name) {
            Some(idx) => idx,
            None => {
                self.children.push(Element::new(name));
                self.children.len() - 1
            }
        };
        &mut self.children[idx]
    }

    pub fn set_child_text(&mut self, name: &str, value: impl Into<String>) {
        self.ensure_child(name).content = Some(Content::Text(value.into()));
    }
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        return Ok(());
    }
    if root.is_some() {
        return Err(MigrationError::Malformed("multiple root elements".to_string()));
    }
    *root = Some(element);
    Ok(())
}
