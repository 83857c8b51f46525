//! Minimal XML tree and writer over `quick-xml`.
//!
//! The authority's responses are small, so they are parsed into a tree and
//! navigated by local name; namespace prefixes are ignored.

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use thiserror::Error;

/// XML read/write error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("XML error: {0}")]
pub struct XmlError(pub String);

fn xml<E: std::fmt::Display>(e: E) -> XmlError {
    XmlError(e.to_string())
}

/// An element with its local name, concatenated text and children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    /// Local name, without prefix.
    pub name: String,
    /// Text content directly inside the element.
    pub text: String,
    /// Child elements in document order.
    pub children: Vec<Element>,
}

impl Element {
    /// Parses a document and returns its root element.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed XML or an empty document.
    pub fn parse(input: &str) -> Result<Self, XmlError> {
        let mut reader = Reader::from_str(input);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Self> = Vec::new();
        let mut root: Option<Self> = None;

        loop {
            match reader.read_event().map_err(xml)? {
                Event::Start(start) => stack.push(Self::named(&start)),
                Event::Empty(start) => {
                    let element = Self::named(&start);
                    attach(&mut stack, &mut root, element);
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| XmlError("unbalanced end tag".to_string()))?;
                    attach(&mut stack, &mut root, element);
                }
                Event::Text(text) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&text.unescape().map_err(xml)?);
                    }
                }
                Event::CData(data) => {
                    if let Some(current) = stack.last_mut() {
                        current
                            .text
                            .push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(XmlError("unexpected end of document".to_string()));
        }
        root.ok_or_else(|| XmlError("empty document".to_string()))
    }

    fn named(start: &BytesStart<'_>) -> Self {
        Self {
            name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
            ..Self::default()
        }
    }

    /// First direct child named `name`.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Self> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All direct children named `name`.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Self> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// First descendant named `name`, depth first, including `self`.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Self> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }

    /// Follows a path of direct children.
    #[must_use]
    pub fn path(&self, names: &[&str]) -> Option<&Self> {
        names.iter().try_fold(self, |element, name| element.child(name))
    }

    /// Trimmed text of the first direct child named `name`.
    #[must_use]
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.trim())
    }
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => *root = Some(element),
    }
}

/// A SOAP fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapFault {
    /// Fault code without namespace prefix.
    pub code: String,
    /// Fault string.
    pub message: String,
}

impl SoapFault {
    /// Extracts the fault from a parsed envelope, if there is one.
    #[must_use]
    pub fn from_envelope(envelope: &Element) -> Option<Self> {
        let fault = envelope.find("Fault")?;
        let raw_code = fault.child_text("faultcode").unwrap_or_default();
        let code = raw_code.rsplit(':').next().unwrap_or(raw_code).to_string();
        let message = fault.child_text("faultstring").unwrap_or_default().to_string();
        Some(Self { code, message })
    }
}

/// Builds a document element by element. Text is escaped.
pub struct XmlWriter {
    inner: Writer<Vec<u8>>,
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Writer::new(Vec::new()),
        }
    }

    /// Writes the `<?xml version="1.0" encoding="UTF-8"?>` declaration.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn declaration(&mut self) -> Result<(), XmlError> {
        self.inner
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml)
    }

    /// Opens `name` with attributes.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn open_with(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), XmlError> {
        let start = BytesStart::new(name).with_attributes(attributes.iter().copied());
        self.inner.write_event(Event::Start(start)).map_err(xml)
    }

    /// Opens `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn open(&mut self, name: &str) -> Result<(), XmlError> {
        self.open_with(name, &[])
    }

    /// Closes `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn close(&mut self, name: &str) -> Result<(), XmlError> {
        self.inner
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(xml)
    }

    /// Writes `<name>value</name>`.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn leaf(&mut self, name: &str, value: impl AsRef<str>) -> Result<(), XmlError> {
        self.open(name)?;
        self.inner
            .write_event(Event::Text(BytesText::new(value.as_ref())))
            .map_err(xml)?;
        self.close(name)
    }

    /// Returns the document.
    ///
    /// # Errors
    ///
    /// Returns an error if the output is not UTF-8.
    pub fn finish(self) -> Result<String, XmlError> {
        String::from_utf8(self.inner.into_inner()).map_err(xml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_ignores_prefixes() {
        let root = Element::parse(
            r#"<?xml version="1.0"?>
            <soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
              <soap:Body><r:Result xmlns:r="urn:x"><r:Nro>42</r:Nro><r:Empty/></r:Result></soap:Body>
            </soap:Envelope>"#,
        )
        .unwrap();
        assert_eq!(root.name, "Envelope");
        let result = root.find("Result").unwrap();
        assert_eq!(result.child_text("Nro"), Some("42"));
        assert!(result.child("Empty").is_some());
        assert_eq!(root.path(&["Body", "Result", "Nro"]).unwrap().text, "42");
    }

    #[test]
    fn test_parse_unescapes_text() {
        let root = Element::parse("<a>&lt;b&gt;1&lt;/b&gt;</a>").unwrap();
        assert_eq!(root.text, "<b>1</b>");
        let nested = Element::parse(&root.text).unwrap();
        assert_eq!(nested.name, "b");
    }

    #[test]
    fn test_parse_errors() {
        assert!(Element::parse("").is_err());
        assert!(Element::parse("<a><b></a>").is_err());
    }

    #[test]
    fn test_fault() {
        let root = Element::parse(
            "<Envelope><Body><Fault><faultcode>ns1:coe.alreadyAuthenticated</faultcode>\
             <faultstring>El CEE ya posee un TA valido</faultstring></Fault></Body></Envelope>",
        )
        .unwrap();
        let fault = SoapFault::from_envelope(&root).unwrap();
        assert_eq!(fault.code, "coe.alreadyAuthenticated");
        assert_eq!(fault.message, "El CEE ya posee un TA valido");
    }

    #[test]
    fn test_writer_escapes() {
        let mut writer = XmlWriter::new();
        writer.open_with("root", &[("xmlns", "urn:x")]).unwrap();
        writer.leaf("name", "A & B <SA>").unwrap();
        writer.close("root").unwrap();
        assert_eq!(
            writer.finish().unwrap(),
            r#"<root xmlns="urn:x"><name>A &amp; B &lt;SA&gt;</name></root>"#
        );
    }

    proptest! {
        #[test]
        fn prop_written_text_parses_back(value in "[A-Za-z0-9&<>'\" .,-]{0,40}") {
            let mut writer = XmlWriter::new();
            writer.open("root").unwrap();
            writer.leaf("name", &value).unwrap();
            writer.close("root").unwrap();
            let root = Element::parse(&writer.finish().unwrap()).unwrap();
            prop_assert_eq!(root.child_text("name"), Some(value.trim()));
        }
    }
}
