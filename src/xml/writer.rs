//! Event-driven XML writer with manual attribute/escape discipline.

use std::fmt::Write as _;

use super::escape;

/// Builds an XML document one element at a time into an in-memory string
/// buffer.
#[derive(Debug, Default)]
pub struct XmlWriter {
    buf: String,
    stack: Vec<String>,
}

impl XmlWriter {
    pub fn new() -> Self {
        XmlWriter::default()
    }

    pub fn with_declaration() -> Self {
        let mut w = Self::new();
        w.buf
            .push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        w
    }

    pub fn start_element(&mut self, name: &str, attrs: &[(&str, &str)]) -> &mut Self {
        self.write_open_tag(name, attrs, false);
        self.stack.push(name.to_string());
        self
    }

    pub fn empty_element(&mut self, name: &str, attrs: &[(&str, &str)]) -> &mut Self {
        self.write_open_tag(name, attrs, true);
        self
    }

    pub fn end_element(&mut self) -> &mut Self {
        let name = self
            .stack
            .pop()
            .expect("end_element called with no open element");
        let _ = write!(self.buf, "</{name}>");
        self
    }

    pub fn text(&mut self, data: &str) -> &mut Self {
        self.buf.push_str(&escape(data));
        self
    }

    /// Appends `raw` unescaped, for already-serialized fragments (e.g.
    /// round-tripped conditional-formatting blocks).
    pub fn raw(&mut self, raw: &str) -> &mut Self {
        self.buf.push_str(raw);
        self
    }

    fn write_open_tag(&mut self, name: &str, attrs: &[(&str, &str)], self_close: bool) {
        let _ = write!(self.buf, "<{name}");
        for (key, value) in attrs {
            let _ = write!(self.buf, r#" {key}="{}""#, escape(value));
        }
        if self_close {
            self.buf.push_str("/>");
        } else {
            self.buf.push('>');
        }
    }

    pub fn finish(self) -> String {
        assert!(
            self.stack.is_empty(),
            "XmlWriter::finish called with unclosed elements: {:?}",
            self.stack
        );
        self.buf
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_nested_elements_with_attributes() {
        let mut w = XmlWriter::new();
        w.start_element("c", &[("r", "A1"), ("t", "s")]);
        w.start_element("v", &[]);
        w.text("3");
        w.end_element();
        w.end_element();
        assert_eq!(w.finish(), r#"<c r="A1" t="s"><v>3</v></c>"#);
    }

    #[test]
    fn empty_element_self_closes() {
        let mut w = XmlWriter::new();
        w.empty_element("c", &[("r", "B2"), ("s", "4")]);
        assert_eq!(w.finish(), r#"<c r="B2" s="4"/>"#);
    }

    #[test]
    fn escapes_attribute_values_and_text() {
        let mut w = XmlWriter::new();
        w.start_element("t", &[]);
        w.text("<a> & \"b\"");
        w.end_element();
        assert_eq!(w.finish(), "<t>&lt;a&gt; &amp; &quot;b&quot;</t>");
    }

    #[test]
    #[should_panic]
    fn finish_panics_on_unclosed_elements() {
        let mut w = XmlWriter::new();
        w.start_element("a", &[]);
        let _ = w.finish();
    }
}
