//! A small pull-style XML reader and an event-driven writer, tuned for the
//! XLSX part schemas.

mod reader;
mod writer;

pub use reader::{attr, XmlEvent, XmlReader};
pub use writer::XmlWriter;

/// Escapes `text` for use as XML character data or an attribute value:
/// `<`, `>`, `&`, `"`, and any code point outside the XML-legal control
/// range (U+0000..U+001F except TAB/LF/CR) are replaced.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\t' | '\n' | '\r' => out.push(ch),
            c if (c as u32) <= 0x1F => {
                // Not representable in XML 1.0; drop silently.
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_reserved_characters() {
        assert_eq!(escape("<a>&\"b\""), "&lt;a&gt;&amp;&quot;b&quot;");
    }

    #[test]
    fn drops_illegal_control_characters_but_keeps_tab_lf_cr() {
        let input = "a\u{0001}b\tc\nd\re";
        assert_eq!(escape(input), "ab\tc\nd\re");
    }
}
