//! Encodes and decodes `xl/styles.xml`: deduplicated font/fill/border/
//! number-format sub-tables plus the `xf` (cell format) records that
//! reference them by index.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::model::{
    Alignment, Border, BorderSide, BorderStyle, Fill, Font, HorizontalAlign, Style, VerticalAlign,
};
use crate::xml::{attr, XmlEvent, XmlReader, XmlWriter};

const FIRST_CUSTOM_NUMBER_FORMAT_ID: u32 = 164;

fn builtin_number_format_id(code: &str) -> Option<u32> {
    Some(match code {
        "General" => 0,
        "0" => 1,
        "0.00" => 2,
        "#,##0" => 3,
        "#,##0.00" => 4,
        "0%" => 9,
        "0.00%" => 10,
        "0.00E+00" => 11,
        "# ?/?" => 12,
        "# ??/??" => 13,
        "mm-dd-yy" => 14,
        "d-mmm-yy" => 15,
        "d-mmm" => 16,
        "mmm-yy" => 17,
        "h:mm AM/PM" => 18,
        "h:mm:ss AM/PM" => 19,
        "h:mm" => 20,
        "h:mm:ss" => 21,
        "m/d/yy h:mm" => 22,
        "@" => 49,
        _ => return None,
    })
}

fn builtin_number_format_code(id: u32) -> Option<&'static str> {
    Some(match id {
        0 => "General",
        1 => "0",
        2 => "0.00",
        3 => "#,##0",
        4 => "#,##0.00",
        9 => "0%",
        10 => "0.00%",
        11 => "0.00E+00",
        12 => "# ?/?",
        13 => "# ??/??",
        14 => "mm-dd-yy",
        15 => "d-mmm-yy",
        16 => "d-mmm",
        17 => "mmm-yy",
        18 => "h:mm AM/PM",
        19 => "h:mm:ss AM/PM",
        20 => "h:mm",
        21 => "h:mm:ss",
        22 => "m/d/yy h:mm",
        49 => "@",
        _ => return None,
    })
}

fn argb_to_rgb_hex(argb: u32) -> String {
    format!("{argb:08X}")
}

fn rgb_hex_to_argb(s: &str) -> u32 {
    u32::from_str_radix(s.trim_start_matches('#'), 16).unwrap_or(0xFF000000)
}

fn border_style_name(style: BorderStyle) -> Option<&'static str> {
    Some(match style {
        BorderStyle::None => return None,
        BorderStyle::Thin => "thin",
        BorderStyle::Medium => "medium",
        BorderStyle::Thick => "thick",
        BorderStyle::Dashed => "dashed",
        BorderStyle::Dotted => "dotted",
        BorderStyle::Double => "double",
        BorderStyle::Hair => "hair",
    })
}

fn border_style_from_name(name: &str) -> BorderStyle {
    match name {
        "thin" => BorderStyle::Thin,
        "medium" => BorderStyle::Medium,
        "thick" => BorderStyle::Thick,
        "dashed" => BorderStyle::Dashed,
        "dotted" => BorderStyle::Dotted,
        "double" => BorderStyle::Double,
        "hair" => BorderStyle::Hair,
        _ => BorderStyle::None,
    }
}

#[derive(Clone, PartialEq)]
struct FontKey {
    name: String,
    size_bits: u64,
    bold: bool,
    italic: bool,
    underline: bool,
    strikethrough: bool,
    color_argb: u32,
}

impl std::hash::Hash for FontKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.size_bits.hash(state);
        self.bold.hash(state);
        self.italic.hash(state);
        self.underline.hash(state);
        self.strikethrough.hash(state);
        self.color_argb.hash(state);
    }
}
impl Eq for FontKey {}

impl From<&Font> for FontKey {
    fn from(f: &Font) -> Self {
        FontKey {
            name: f.name.clone(),
            size_bits: f.size.to_bits(),
            bold: f.bold,
            italic: f.italic,
            underline: f.underline,
            strikethrough: f.strikethrough,
            color_argb: f.color_argb,
        }
    }
}

fn border_side_key(side: &BorderSide) -> (u8, u32) {
    let style = match side.style {
        BorderStyle::None => 0,
        BorderStyle::Thin => 1,
        BorderStyle::Medium => 2,
        BorderStyle::Thick => 3,
        BorderStyle::Dashed => 4,
        BorderStyle::Dotted => 5,
        BorderStyle::Double => 6,
        BorderStyle::Hair => 7,
    };
    (style, side.argb)
}

fn border_key(b: &Border) -> [(u8, u32); 4] {
    [
        border_side_key(&b.left),
        border_side_key(&b.right),
        border_side_key(&b.top),
        border_side_key(&b.bottom),
    ]
}

/// A built styles table: deduplicated sub-tables and one `xf` per input
/// [`Style`], in the same order.
struct BuiltStyles {
    fonts: Vec<Font>,
    fills: Vec<Fill>,
    borders: Vec<Border>,
    number_formats: Vec<(u32, String)>,
    xfs: Vec<Xf>,
}

struct Xf {
    font_id: u32,
    fill_id: u32,
    border_id: u32,
    num_fmt_id: u32,
    alignment: Option<Alignment>,
    unlocked: bool,
}

fn build(styles: &[Style]) -> BuiltStyles {
    let mut fonts: Vec<Font> = Vec::new();
    let mut font_index: HashMap<FontKey, u32> = HashMap::new();

    let mut fills: Vec<Fill> = vec![Fill { argb: 0 }, Fill { argb: 0x00000000 }];
    let mut fill_index: HashMap<u32, u32> = HashMap::new();
    fill_index.insert(0, 0); // fill[0] = none (sentinel key distinct from a real "no fill" request)

    let mut borders: Vec<Border> = vec![Border::default()];
    let mut border_index: HashMap<[(u8, u32); 4], u32> = HashMap::new();
    border_index.insert(border_key(&Border::default()), 0);

    let mut number_formats: Vec<(u32, String)> = Vec::new();
    let mut number_format_index: HashMap<String, u32> = HashMap::new();
    let mut next_custom_id = FIRST_CUSTOM_NUMBER_FORMAT_ID;

    let mut xfs = Vec::with_capacity(styles.len());

    for style in styles {
        let font_key = FontKey::from(&style.font);
        let font_id = *font_index.entry(font_key).or_insert_with(|| {
            let id = fonts.len() as u32;
            fonts.push(style.font.clone());
            id
        });

        let fill_id = if style.fill.argb == 0 {
            0
        } else {
            *fill_index.entry(style.fill.argb).or_insert_with(|| {
                let id = fills.len() as u32;
                fills.push(style.fill);
                id
            })
        };

        let bkey = border_key(&style.border);
        let border_id = *border_index.entry(bkey).or_insert_with(|| {
            let id = borders.len() as u32;
            borders.push(style.border);
            id
        });

        let num_fmt_id = match &style.number_format {
            None => 0,
            Some(code) => {
                if let Some(id) = builtin_number_format_id(code) {
                    id
                } else if let Some(&id) = number_format_index.get(code) {
                    id
                } else {
                    let id = next_custom_id;
                    next_custom_id += 1;
                    number_format_index.insert(code.clone(), id);
                    number_formats.push((id, code.clone()));
                    id
                }
            }
        };

        let alignment = if style.alignment == Alignment::default() {
            None
        } else {
            Some(style.alignment)
        };

        xfs.push(Xf {
            font_id,
            fill_id,
            border_id,
            num_fmt_id,
            alignment,
            unlocked: !style.locked,
        });
    }

    BuiltStyles {
        fonts,
        fills,
        borders,
        number_formats,
        xfs,
    }
}

fn write_font(w: &mut XmlWriter, font: &Font) {
    w.start_element("font", &[]);
    if font.bold {
        w.empty_element("b", &[]);
    }
    if font.italic {
        w.empty_element("i", &[]);
    }
    if font.underline {
        w.empty_element("u", &[]);
    }
    if font.strikethrough {
        w.empty_element("strike", &[]);
    }
    w.empty_element("sz", &[("val", &font.size.to_string())]);
    let color = argb_to_rgb_hex(font.color_argb);
    w.empty_element("color", &[("rgb", &color)]);
    w.empty_element("name", &[("val", &font.name)]);
    w.end_element();
}

fn write_fill(w: &mut XmlWriter, fill: &Fill, index: usize) {
    w.start_element("fill", &[]);
    if index == 1 {
        w.empty_element("patternFill", &[("patternType", "gray125")]);
    } else if fill.argb == 0 {
        w.empty_element("patternFill", &[("patternType", "none")]);
    } else {
        w.start_element("patternFill", &[("patternType", "solid")]);
        let color = argb_to_rgb_hex(fill.argb);
        w.empty_element("fgColor", &[("rgb", &color)]);
        w.empty_element("bgColor", &[("indexed", "64")]);
        w.end_element();
    }
    w.end_element();
}

fn write_border_side(w: &mut XmlWriter, tag: &str, side: &BorderSide) {
    match border_style_name(side.style) {
        None => {
            w.empty_element(tag, &[]);
        }
        Some(name) => {
            w.start_element(tag, &[("style", name)]);
            let color = argb_to_rgb_hex(side.argb);
            w.empty_element("color", &[("rgb", &color)]);
            w.end_element();
        }
    }
}

fn write_border(w: &mut XmlWriter, border: &Border) {
    w.start_element("border", &[]);
    write_border_side(w, "left", &border.left);
    write_border_side(w, "right", &border.right);
    write_border_side(w, "top", &border.top);
    write_border_side(w, "bottom", &border.bottom);
    w.empty_element("diagonal", &[]);
    w.end_element();
}

fn horizontal_name(h: HorizontalAlign) -> Option<&'static str> {
    Some(match h {
        HorizontalAlign::General => return None,
        HorizontalAlign::Left => "left",
        HorizontalAlign::Center => "center",
        HorizontalAlign::Right => "right",
        HorizontalAlign::Fill => "fill",
        HorizontalAlign::Justify => "justify",
    })
}

fn vertical_name(v: VerticalAlign) -> Option<&'static str> {
    Some(match v {
        VerticalAlign::Bottom => return None,
        VerticalAlign::Top => "top",
        VerticalAlign::Middle => "center",
    })
}

fn write_xf(w: &mut XmlWriter, xf: &Xf, tag: &str) {
    let font_id = xf.font_id.to_string();
    let fill_id = xf.fill_id.to_string();
    let border_id = xf.border_id.to_string();
    let num_fmt_id = xf.num_fmt_id.to_string();

    let mut attrs: Vec<(&str, &str)> = vec![
        ("numFmtId", &num_fmt_id),
        ("fontId", &font_id),
        ("fillId", &fill_id),
        ("borderId", &border_id),
        ("xfId", "0"),
    ];
    if xf.num_fmt_id != 0 {
        attrs.push(("applyNumberFormat", "1"));
    }
    if xf.font_id != 0 {
        attrs.push(("applyFont", "1"));
    }
    if xf.fill_id != 0 {
        attrs.push(("applyFill", "1"));
    }
    if xf.border_id != 0 {
        attrs.push(("applyBorder", "1"));
    }
    if xf.alignment.is_some() {
        attrs.push(("applyAlignment", "1"));
    }
    if xf.unlocked {
        attrs.push(("applyProtection", "1"));
    }

    if xf.alignment.is_none() && !xf.unlocked {
        w.empty_element(tag, &attrs);
        return;
    }

    w.start_element(tag, &attrs);
    if let Some(alignment) = &xf.alignment {
        let mut align_attrs: Vec<(&str, &str)> = Vec::new();
        if let Some(h) = horizontal_name(alignment.horizontal) {
            align_attrs.push(("horizontal", h));
        }
        if let Some(v) = vertical_name(alignment.vertical) {
            align_attrs.push(("vertical", v));
        }
        if alignment.wrap_text {
            align_attrs.push(("wrapText", "1"));
        }
        w.empty_element("alignment", &align_attrs);
    }
    if xf.unlocked {
        w.empty_element("protection", &[("locked", "0")]);
    }
    w.end_element();
}

/// Serializes the workbook's style table to `xl/styles.xml`.
pub fn to_xml(styles: &[Style]) -> String {
    let built = build(styles);
    let mut w = XmlWriter::with_declaration();
    w.start_element(
        "styleSheet",
        &[(
            "xmlns",
            "http://schemas.openxmlformats.org/spreadsheetml/2006/main",
        )],
    );

    if !built.number_formats.is_empty() {
        let count = built.number_formats.len().to_string();
        w.start_element("numFmts", &[("count", &count)]);
        for (id, code) in &built.number_formats {
            let id_str = id.to_string();
            w.empty_element("numFmt", &[("numFmtId", &id_str), ("formatCode", code)]);
        }
        w.end_element();
    }

    let font_count = built.fonts.len().to_string();
    w.start_element("fonts", &[("count", &font_count)]);
    for font in &built.fonts {
        write_font(&mut w, font);
    }
    w.end_element();

    let fill_count = built.fills.len().to_string();
    w.start_element("fills", &[("count", &fill_count)]);
    for (i, fill) in built.fills.iter().enumerate() {
        write_fill(&mut w, fill, i);
    }
    w.end_element();

    let border_count = built.borders.len().to_string();
    w.start_element("borders", &[("count", &border_count)]);
    for border in &built.borders {
        write_border(&mut w, border);
    }
    w.end_element();

    w.start_element("cellStyleXfs", &[("count", "1")]);
    w.empty_element(
        "xf",
        &[
            ("numFmtId", "0"),
            ("fontId", "0"),
            ("fillId", "0"),
            ("borderId", "0"),
        ],
    );
    w.end_element();

    let xf_count = built.xfs.len().to_string();
    w.start_element("cellXfs", &[("count", &xf_count)]);
    for xf in &built.xfs {
        write_xf(&mut w, xf, "xf");
    }
    w.end_element();

    w.start_element("cellStyles", &[("count", "1")]);
    w.empty_element(
        "cellStyle",
        &[("name", "Normal"), ("xfId", "0"), ("builtinId", "0")],
    );
    w.end_element();

    w.end_element(); // styleSheet
    w.finish()
}

/// Parses `xl/styles.xml` back into an ordered list of [`Style`] values, one
/// per `cellXfs` entry in document order.
pub fn from_xml(xml: &[u8]) -> Result<Vec<Style>> {
    let mut fonts: Vec<Font> = Vec::new();
    let mut fills: Vec<Fill> = Vec::new();
    let mut borders: Vec<Border> = Vec::new();
    let mut number_formats: HashMap<u32, String> = HashMap::new();
    let mut xfs: Vec<Style> = Vec::new();

    let mut reader = XmlReader::new(xml);
    loop {
        match reader.next_event()? {
            XmlEvent::StartElement { name, attrs } => match name.as_str() {
                "numFmt" => {
                    let id = attr(&attrs, "numFmtId")
                        .and_then(|v| v.parse::<u32>().ok())
                        .unwrap_or(0);
                    let code = attr(&attrs, "formatCode").unwrap_or_default().to_string();
                    number_formats.insert(id, code);
                }
                "font" => fonts.push(read_font(&mut reader)?),
                "fill" => fills.push(read_fill(&mut reader)?),
                "border" => borders.push(read_border(&mut reader)?),
                "xf" => {
                    // Only `cellXfs`-level `xf` elements carry per-cell
                    // formatting; `cellStyleXfs` entries are skipped by
                    // virtue of never being referenced below.
                    let style = read_xf(&attrs, &mut reader, &fonts, &fills, &borders, &number_formats)?;
                    xfs.push(style);
                }
                _ => {}
            },
            XmlEvent::EndElement { name } if name == "cellStyleXfs" => {
                // Anything collected while inside cellStyleXfs belongs to
                // the default style record, not a usable cell format; drop it.
                xfs.clear();
            }
            XmlEvent::EndDocument => break,
            _ => {}
        }
    }

    if xfs.is_empty() {
        xfs.push(Style::default());
    }
    Ok(xfs)
}

fn read_font(reader: &mut XmlReader) -> Result<Font> {
    let mut font = Font {
        name: "Calibri".to_string(),
        size: 11.0,
        bold: false,
        italic: false,
        underline: false,
        strikethrough: false,
        color_argb: 0xFF000000,
    };
    loop {
        match reader.next_event()? {
            XmlEvent::StartElement { name, attrs } => match name.as_str() {
                "b" => font.bold = true,
                "i" => font.italic = true,
                "u" => font.underline = true,
                "strike" => font.strikethrough = true,
                "sz" => {
                    if let Some(v) = attr(&attrs, "val").and_then(|v| v.parse::<f64>().ok()) {
                        font.size = v;
                    }
                }
                "color" => {
                    if let Some(rgb) = attr(&attrs, "rgb") {
                        font.color_argb = rgb_hex_to_argb(rgb);
                    }
                }
                "name" => {
                    if let Some(v) = attr(&attrs, "val") {
                        font.name = v.to_string();
                    }
                }
                _ => {}
            },
            XmlEvent::EndElement { name } if name == "font" => break,
            XmlEvent::EndDocument => break,
            _ => {}
        }
    }
    Ok(font)
}

fn read_fill(reader: &mut XmlReader) -> Result<Fill> {
    let mut fill = Fill { argb: 0 };
    loop {
        match reader.next_event()? {
            XmlEvent::StartElement { name, attrs } if name == "patternFill" => {
                if attr(&attrs, "patternType") == Some("solid") {
                    loop {
                        match reader.next_event()? {
                            XmlEvent::StartElement { name, attrs } if name == "fgColor" => {
                                if let Some(rgb) = attr(&attrs, "rgb") {
                                    fill.argb = rgb_hex_to_argb(rgb);
                                }
                            }
                            XmlEvent::EndElement { name } if name == "patternFill" => break,
                            XmlEvent::EndDocument => break,
                            _ => {}
                        }
                    }
                }
            }
            XmlEvent::EndElement { name } if name == "fill" => break,
            XmlEvent::EndDocument => break,
            _ => {}
        }
    }
    Ok(fill)
}

fn read_border(reader: &mut XmlReader) -> Result<Border> {
    let mut border = Border::default();
    loop {
        match reader.next_event()? {
            XmlEvent::StartElement { name, attrs } => {
                let side = match name.as_str() {
                    "left" => Some(&mut border.left),
                    "right" => Some(&mut border.right),
                    "top" => Some(&mut border.top),
                    "bottom" => Some(&mut border.bottom),
                    _ => None,
                };
                if let Some(side) = side {
                    if let Some(style_name) = attr(&attrs, "style") {
                        side.style = border_style_from_name(style_name);
                        side.argb = read_side_color(reader, &name)?;
                    }
                }
            }
            XmlEvent::EndElement { name } if name == "border" => break,
            XmlEvent::EndDocument => break,
            _ => {}
        }
    }
    Ok(border)
}

fn read_side_color(reader: &mut XmlReader, closing_tag: &str) -> Result<u32> {
    let mut argb = 0xFF000000;
    loop {
        match reader.next_event()? {
            XmlEvent::StartElement { name, attrs } if name == "color" => {
                if let Some(rgb) = attr(&attrs, "rgb") {
                    argb = rgb_hex_to_argb(rgb);
                }
            }
            XmlEvent::EndElement { name } if name == closing_tag => break,
            XmlEvent::EndDocument => break,
            _ => {}
        }
    }
    Ok(argb)
}

fn read_xf(
    attrs: &[(String, String)],
    reader: &mut XmlReader,
    fonts: &[Font],
    fills: &[Fill],
    borders: &[Border],
    number_formats: &HashMap<u32, String>,
) -> Result<Style> {
    let font_id = attr(attrs, "fontId").and_then(|v| v.parse::<usize>().ok()).unwrap_or(0);
    let fill_id = attr(attrs, "fillId").and_then(|v| v.parse::<usize>().ok()).unwrap_or(0);
    let border_id = attr(attrs, "borderId").and_then(|v| v.parse::<usize>().ok()).unwrap_or(0);
    let num_fmt_id = attr(attrs, "numFmtId").and_then(|v| v.parse::<u32>().ok()).unwrap_or(0);

    let mut style = Style {
        font: fonts.get(font_id).cloned().unwrap_or_default(),
        fill: fills.get(fill_id).copied().unwrap_or_default(),
        border: borders.get(border_id).copied().unwrap_or_default(),
        number_format: if num_fmt_id == 0 {
            None
        } else {
            builtin_number_format_code(num_fmt_id)
                .map(str::to_string)
                .or_else(|| number_formats.get(&num_fmt_id).cloned())
        },
        locked: true,
        alignment: Alignment::default(),
    };

    // A self-closing `<xf .../>` never reaches here with child content;
    // `next_event` already expanded it into Start/End, so this loop just
    // drains whatever's between them (alignment/protection, if present).
    loop {
        match reader.next_event()? {
            XmlEvent::StartElement { name, attrs } if name == "alignment" => {
                let mut alignment = Alignment::default();
                if let Some(h) = attr(&attrs, "horizontal") {
                    alignment.horizontal = match h {
                        "left" => HorizontalAlign::Left,
                        "center" => HorizontalAlign::Center,
                        "right" => HorizontalAlign::Right,
                        "fill" => HorizontalAlign::Fill,
                        "justify" => HorizontalAlign::Justify,
                        _ => HorizontalAlign::General,
                    };
                }
                if let Some(v) = attr(&attrs, "vertical") {
                    alignment.vertical = match v {
                        "top" => VerticalAlign::Top,
                        "center" => VerticalAlign::Middle,
                        _ => VerticalAlign::Bottom,
                    };
                }
                alignment.wrap_text = attr(&attrs, "wrapText") == Some("1");
                style.alignment = alignment;
            }
            XmlEvent::StartElement { name, attrs } if name == "protection" => {
                if attr(&attrs, "locked") == Some("0") {
                    style.locked = false;
                }
            }
            XmlEvent::EndElement { name } if name == "xf" => break,
            XmlEvent::EndDocument => break,
            _ => {}
        }
    }

    Ok(style)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BorderSide, BorderStyle};

    #[test]
    fn default_style_round_trips() {
        let styles = vec![Style::default()];
        let xml = to_xml(&styles);
        let parsed = from_xml(xml.as_bytes()).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].font.name, "Calibri");
    }

    #[test]
    fn fonts_are_deduplicated_across_styles() {
        let mut a = Style::default();
        a.font.bold = true;
        let mut b = Style::default();
        b.font.bold = true;
        b.fill.argb = 0x00FF0000;
        let built = build(&[a, b]);
        assert_eq!(built.fonts.len(), 1);
        assert_eq!(built.fills.len(), 3); // none, gray125, one custom
    }

    #[test]
    fn custom_number_formats_start_at_164() {
        let mut a = Style::default();
        a.number_format = Some("0.0000".to_string());
        let built = build(&[Style::default(), a]);
        assert_eq!(built.number_formats, vec![(164, "0.0000".to_string())]);
    }

    #[test]
    fn border_and_alignment_round_trip() {
        let mut style = Style::default();
        style.border.left = BorderSide {
            style: BorderStyle::Thin,
            argb: 0xFF00FF00,
        };
        style.alignment.horizontal = HorizontalAlign::Center;
        style.alignment.wrap_text = true;
        style.locked = false;

        let xml = to_xml(&[Style::default(), style.clone()]);
        let parsed = from_xml(xml.as_bytes()).unwrap();
        assert_eq!(parsed[1].border.left.style, BorderStyle::Thin);
        assert_eq!(parsed[1].alignment.horizontal, HorizontalAlign::Center);
        assert!(parsed[1].alignment.wrap_text);
        assert!(!parsed[1].locked);
    }
}
