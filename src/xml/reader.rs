//! Pull-style XML event reader.

use quick_xml::events::Event as QEvent;
use quick_xml::Reader as QReader;

use crate::error::Result;

/// One parsed XML event. Element and attribute names are local names
/// (namespace prefixes stripped), which absorbs prefix variation across
/// producers without needing full namespace resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlEvent {
    StartElement {
        name: String,
        attrs: Vec<(String, String)>,
    },
    EndElement {
        name: String,
    },
    Characters(String),
    EndDocument,
}

/// Wraps a `quick_xml` reader over an in-memory XML document. DTD and
/// external-entity resolution are never enabled: `quick_xml` does not
/// support either, so this is unconditional by construction.
pub struct XmlReader<'a> {
    inner: QReader<&'a [u8]>,
    done: bool,
    /// Set after emitting the synthetic `StartElement` for a self-closing
    /// tag, so the next call emits the matching `EndElement` without
    /// consuming another underlying event.
    pending_empty_end: Option<String>,
}

impl<'a> XmlReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let mut inner = QReader::from_reader(data);
        inner.config_mut().trim_text(true);
        XmlReader {
            inner,
            done: false,
            pending_empty_end: None,
        }
    }

    /// Reads the next event. Whitespace-only character runs are filtered
    /// and never surfaced to the caller. Self-closing (`<c/>`) tags are
    /// expanded into a `StartElement`/`EndElement` pair.
    pub fn next_event(&mut self) -> Result<XmlEvent> {
        if let Some(name) = self.pending_empty_end.take() {
            return Ok(XmlEvent::EndElement { name });
        }
        if self.done {
            return Ok(XmlEvent::EndDocument);
        }
        loop {
            match self.inner.read_event()? {
                QEvent::Start(e) => {
                    let name = local_name(&e.name());
                    let mut attrs = Vec::new();
                    for attr in e.attributes() {
                        let attr = attr?;
                        let key = local_name(&attr.key);
                        let value = attr.decode_and_unescape_value(self.inner.decoder())?;
                        attrs.push((key, value.into_owned()));
                    }
                    return Ok(XmlEvent::StartElement { name, attrs });
                }
                QEvent::Empty(e) => {
                    let name = local_name(&e.name());
                    let mut attrs = Vec::new();
                    for attr in e.attributes() {
                        let attr = attr?;
                        let key = local_name(&attr.key);
                        let value = attr.decode_and_unescape_value(self.inner.decoder())?;
                        attrs.push((key, value.into_owned()));
                    }
                    self.pending_empty_end = Some(name.clone());
                    return Ok(XmlEvent::StartElement { name, attrs });
                }
                QEvent::End(e) => {
                    return Ok(XmlEvent::EndElement {
                        name: local_name(&e.name()),
                    });
                }
                QEvent::Text(e) => {
                    let text = e.unescape()?.into_owned();
                    if text.trim().is_empty() {
                        continue;
                    }
                    return Ok(XmlEvent::Characters(text));
                }
                QEvent::CData(e) => {
                    let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                    if text.trim().is_empty() {
                        continue;
                    }
                    return Ok(XmlEvent::Characters(text));
                }
                QEvent::Eof => {
                    self.done = true;
                    return Ok(XmlEvent::EndDocument);
                }
                _ => continue,
            }
        }
    }

    /// Concatenates character runs until the matching end element,
    /// returning the accumulated text.
    pub fn element_text(&mut self) -> Result<String> {
        let mut text = String::new();
        loop {
            match self.next_event()? {
                XmlEvent::Characters(s) => text.push_str(&s),
                XmlEvent::EndElement { .. } | XmlEvent::EndDocument => return Ok(text),
                XmlEvent::StartElement { .. } => {
                    // Nested markup inside a text-bearing element; skip it
                    // but keep accumulating text at this level.
                    self.skip_element()?;
                }
            }
        }
    }

    /// Skips to the end of the element just opened (nesting-aware).
    pub fn skip_element(&mut self) -> Result<()> {
        let mut depth = 1u32;
        loop {
            match self.next_event()? {
                XmlEvent::StartElement { .. } => depth += 1,
                XmlEvent::EndElement { .. } => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                XmlEvent::EndDocument => return Ok(()),
                XmlEvent::Characters(_) => {}
            }
        }
    }
}

fn local_name(name: &quick_xml::name::QName) -> String {
    String::from_utf8_lossy(name.local_name().as_ref()).into_owned()
}

/// Looks up an attribute by local name.
pub fn attr<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_start_attrs_text_end() {
        let xml = br#"<c r="A1" t="s"><v>3</v></c>"#;
        let mut r = XmlReader::new(xml);
        match r.next_event().unwrap() {
            XmlEvent::StartElement { name, attrs } => {
                assert_eq!(name, "c");
                assert_eq!(attr(&attrs, "r"), Some("A1"));
                assert_eq!(attr(&attrs, "t"), Some("s"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(
            r.next_event().unwrap(),
            XmlEvent::StartElement {
                name: "v".into(),
                attrs: vec![]
            }
        );
        assert_eq!(r.next_event().unwrap(), XmlEvent::Characters("3".into()));
        assert_eq!(
            r.next_event().unwrap(),
            XmlEvent::EndElement { name: "v".into() }
        );
        assert_eq!(
            r.next_event().unwrap(),
            XmlEvent::EndElement { name: "c".into() }
        );
    }

    #[test]
    fn whitespace_only_runs_are_filtered() {
        let xml = b"<a>\n  <b/>\n</a>";
        let mut r = XmlReader::new(xml);
        assert_eq!(
            r.next_event().unwrap(),
            XmlEvent::StartElement {
                name: "a".into(),
                attrs: vec![]
            }
        );
        // Whitespace between <a> and <b/> must not surface as Characters.
        assert_eq!(
            r.next_event().unwrap(),
            XmlEvent::StartElement {
                name: "b".into(),
                attrs: vec![]
            }
        );
    }

    #[test]
    fn element_text_concatenates_character_runs() {
        let xml = b"<t>hello <b>bold</b> world</t>";
        let mut r = XmlReader::new(xml);
        r.next_event().unwrap(); // consume <t>
        assert_eq!(r.element_text().unwrap(), "hello bold world");
    }

    #[test]
    fn namespace_prefixes_are_stripped_from_names() {
        let xml = br#"<x:sheet r:id="rId1"/>"#;
        let mut r = XmlReader::new(xml);
        match r.next_event().unwrap() {
            XmlEvent::StartElement { name, attrs } => {
                assert_eq!(name, "sheet");
                assert_eq!(attr(&attrs, "id"), Some("rId1"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
