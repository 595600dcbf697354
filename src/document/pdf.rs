//! Page Layout
//!
//! Lays text out on A4 pages with the standard Type1 fonts, so no font data
//! has to be embedded. Handles greedy word wrap, fill colors and automatic
//! page breaks; object numbering, streams and the cross-reference table are
//! left to `pdf-writer`. Glyph widths are approximated per font family.

use pdf_writer::{Content, Name, Pdf, Rect, Ref, Str};

/// A4 width in points
pub const PAGE_WIDTH: f32 = 595.28;
/// A4 height in points
pub const PAGE_HEIGHT: f32 = 841.89;

const POINTS_PER_MM: f32 = 72.0 / 25.4;

// Object 1 is the catalog, 2 the page tree, fonts follow
const FIRST_FONT_ID: i32 = 3;

/// Standard font family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontFamily {
    Helvetica,
    Times,
    Courier,
}

/// Font style
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontStyle {
    Regular,
    Bold,
    Italic,
}

/// One of the nine standard fonts a page can reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Font {
    pub family: FontFamily,
    pub style: FontStyle,
}

impl Font {
    pub const FAMILIES: [FontFamily; 3] = [FontFamily::Helvetica, FontFamily::Times, FontFamily::Courier];
    pub const STYLES: [FontStyle; 3] = [FontStyle::Regular, FontStyle::Bold, FontStyle::Italic];

    pub const fn new(family: FontFamily, style: FontStyle) -> Self {
        Self { family, style }
    }

    /// PostScript name of the standard font
    pub fn base_name(&self) -> &'static str {
        match (self.family, self.style) {
            (FontFamily::Helvetica, FontStyle::Regular) => "Helvetica",
            (FontFamily::Helvetica, FontStyle::Bold) => "Helvetica-Bold",
            (FontFamily::Helvetica, FontStyle::Italic) => "Helvetica-Oblique",
            (FontFamily::Times, FontStyle::Regular) => "Times-Roman",
            (FontFamily::Times, FontStyle::Bold) => "Times-Bold",
            (FontFamily::Times, FontStyle::Italic) => "Times-Italic",
            (FontFamily::Courier, FontStyle::Regular) => "Courier",
            (FontFamily::Courier, FontStyle::Bold) => "Courier-Bold",
            (FontFamily::Courier, FontStyle::Italic) => "Courier-Oblique",
        }
    }

    /// Position in the page resource dictionary (`/F1` .. `/F9`, zero based)
    fn index(&self) -> usize {
        let family = match self.family {
            FontFamily::Helvetica => 0,
            FontFamily::Times => 1,
            FontFamily::Courier => 2,
        };
        let style = match self.style {
            FontStyle::Regular => 0,
            FontStyle::Bold => 1,
            FontStyle::Italic => 2,
        };
        family * 3 + style
    }

    fn resource_name(&self) -> String {
        format!("F{}", self.index() + 1)
    }

    fn object_id(&self) -> Ref {
        Ref::new(FIRST_FONT_ID + self.index() as i32)
    }

    /// Average glyph advance as a fraction of the font size
    fn average_advance(&self) -> f32 {
        match (self.family, self.style) {
            (FontFamily::Courier, _) => 0.6,
            (FontFamily::Helvetica, FontStyle::Bold) => 0.58,
            (FontFamily::Helvetica, _) => 0.54,
            (FontFamily::Times, FontStyle::Bold) => 0.52,
            (FontFamily::Times, _) => 0.48,
        }
    }

    fn all() -> impl Iterator<Item = Font> {
        Self::FAMILIES
            .into_iter()
            .flat_map(|family| Self::STYLES.into_iter().map(move |style| Font::new(family, style)))
    }
}

impl Default for Font {
    fn default() -> Self {
        Font::new(FontFamily::Helvetica, FontStyle::Regular)
    }
}

/// Fill color for text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0, 0, 0);
    pub const WHITE: Rgb = Rgb(255, 255, 255);

    fn components(&self) -> (f32, f32, f32) {
        let unit = |c: u8| f32::from(c) / 255.0;
        (unit(self.0), unit(self.1), unit(self.2))
    }
}

/// In-progress document: one content stream per page
pub struct PdfDocument {
    pages: Vec<Content>,
    cursor_y: f32,
    font: Font,
    font_size: f32,
    color: Rgb,
    margin_left: f32,
    margin_right: f32,
    margin_top: f32,
    margin_bottom: f32,
}

impl Default for PdfDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfDocument {
    /// Empty document with 10 mm side/top margins and a 15 mm page-break margin
    pub fn new() -> Self {
        Self {
            pages: Vec::new(),
            cursor_y: 0.0,
            font: Font::default(),
            font_size: 12.0,
            color: Rgb::BLACK,
            margin_left: 10.0 * POINTS_PER_MM,
            margin_right: 10.0 * POINTS_PER_MM,
            margin_top: 10.0 * POINTS_PER_MM,
            margin_bottom: 15.0 * POINTS_PER_MM,
        }
    }

    /// Start a new page and move the cursor to its top margin
    pub fn add_page(&mut self) {
        self.pages.push(Content::new());
        self.cursor_y = self.margin_top;
    }

    /// Number of pages so far
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn set_font(&mut self, font: Font, size: f32) {
        self.font = font;
        self.font_size = size;
    }

    pub fn set_text_color(&mut self, color: Rgb) {
        self.color = color;
    }

    /// Write `text` wrapped to the text width, one `line_height` per line
    pub fn paragraph(&mut self, line_height: f32, text: &str) {
        for line in self.wrap(text) {
            self.write_line(line_height, &line);
        }
    }

    /// Write `text` on a single line
    pub fn line(&mut self, line_height: f32, text: &str) {
        self.write_line(line_height, text);
    }

    fn text_width(&self) -> f32 {
        PAGE_WIDTH - self.margin_left - self.margin_right
    }

    fn wrap(&self, text: &str) -> Vec<String> {
        let advance = self.font_size * self.font.average_advance();
        let max_chars = ((self.text_width() / advance).floor() as usize).max(1);

        let mut lines = Vec::new();
        let mut current = String::new();
        for word in text.split_whitespace() {
            if !current.is_empty() && current.len() + 1 + word.len() > max_chars {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        if !current.is_empty() {
            lines.push(current);
        }
        lines
    }

    fn write_line(&mut self, line_height: f32, text: &str) {
        if self.pages.is_empty() || self.cursor_y + line_height > PAGE_HEIGHT - self.margin_bottom {
            self.add_page();
        }

        // Baseline sits near the bottom of the line box
        let baseline = PAGE_HEIGHT - (self.cursor_y + line_height * 0.5 + self.font_size * 0.35);
        let font_name = self.font.resource_name();
        let (r, g, b) = self.color.components();
        let encoded = encode_text(text);

        if let Some(page) = self.pages.last_mut() {
            page.begin_text();
            page.set_font(Name(font_name.as_bytes()), self.font_size);
            page.set_fill_rgb(r, g, b);
            page.next_line(self.margin_left, baseline);
            page.show(Str(&encoded));
            page.end_text();
        }
        self.cursor_y += line_height;
    }

    /// Serialize to PDF bytes
    pub fn finish(mut self) -> Vec<u8> {
        if self.pages.is_empty() {
            self.add_page();
        }

        let first_page_id = FIRST_FONT_ID + Font::all().count() as i32;
        let page_id = |i: usize| Ref::new(first_page_id + 2 * i as i32);
        let content_id = |i: usize| Ref::new(first_page_id + 2 * i as i32 + 1);

        let catalog_id = Ref::new(1);
        let page_tree_id = Ref::new(2);

        let mut pdf = Pdf::new();
        pdf.catalog(catalog_id).pages(page_tree_id);
        pdf.pages(page_tree_id)
            .kids((0..self.pages.len()).map(page_id))
            .count(self.pages.len() as i32);

        for font in Font::all() {
            pdf.type1_font(font.object_id())
                .base_font(Name(font.base_name().as_bytes()))
                .encoding_predefined(Name(b"WinAnsiEncoding"));
        }

        let font_names: Vec<(String, Ref)> = Font::all()
            .map(|font| (font.resource_name(), font.object_id()))
            .collect();

        for (i, content) in self.pages.into_iter().enumerate() {
            {
                let mut page = pdf.page(page_id(i));
                page.media_box(Rect::new(0.0, 0.0, PAGE_WIDTH, PAGE_HEIGHT));
                page.parent(page_tree_id);
                page.contents(content_id(i));
                let mut resources = page.resources();
                let mut fonts = resources.fonts();
                for (name, id) in &font_names {
                    fonts.pair(Name(name.as_bytes()), *id);
                }
            }
            pdf.stream(content_id(i), &content.finish());
        }

        pdf.finish()
    }
}

/// WinAnsi bytes for `text`; anything outside printable ASCII becomes `?`
fn encode_text(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            ' '..='~' => c as u8,
            _ => b'?',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_text(bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }

    fn page_objects(text: &str) -> usize {
        text.matches("/Type /Page").count() - text.matches("/Type /Pages").count()
    }

    #[test]
    fn test_empty_document_has_one_page() {
        let bytes = PdfDocument::new().finish();
        let text = as_text(&bytes);
        assert!(text.starts_with("%PDF-"));
        assert!(text.trim_end().ends_with("%%EOF"));
        assert!(text.contains("/Count 1"));
        assert_eq!(page_objects(&text), 1);
    }

    #[test]
    fn test_page_tree_matches_layout() {
        let mut doc = PdfDocument::new();
        doc.add_page();
        doc.line(14.0, "hello");
        doc.add_page();
        doc.line(14.0, "world");
        assert_eq!(doc.page_count(), 2);

        let text = as_text(&doc.finish());
        assert!(text.contains("/Count 2"));
        assert_eq!(page_objects(&text), 2);
        assert!(text.contains("hello"));
        assert!(text.contains("world"));
    }

    #[test]
    fn test_all_standard_fonts_declared() {
        let text = as_text(&PdfDocument::new().finish());
        for name in [
            "Helvetica",
            "Helvetica-Bold",
            "Helvetica-Oblique",
            "Times-Roman",
            "Times-Bold",
            "Times-Italic",
            "Courier",
            "Courier-Bold",
            "Courier-Oblique",
        ] {
            assert!(text.contains(&format!("/BaseFont /{}", name)), "{}", name);
        }
        assert!(text.contains("/WinAnsiEncoding"));
    }

    #[test]
    fn test_font_resource_names() {
        let mut doc = PdfDocument::new();
        doc.set_font(Font::new(FontFamily::Courier, FontStyle::Italic), 11.0);
        doc.line(14.0, "mono");
        let text = as_text(&doc.finish());
        assert!(text.contains("/F9 11 Tf"));
    }

    #[test]
    fn test_text_color_operator() {
        let mut doc = PdfDocument::new();
        doc.set_text_color(Rgb::WHITE);
        doc.line(7.0, "noise");
        let text = as_text(&doc.finish());
        assert!(text.contains("1 1 1 rg"));
    }

    #[test]
    fn test_paragraph_wraps_long_text() {
        let mut doc = PdfDocument::new();
        doc.set_font(Font::new(FontFamily::Courier, FontStyle::Regular), 12.0);
        let long = vec!["market"; 60].join(" ");
        doc.paragraph(14.0, &long);
        let text = as_text(&doc.finish());
        assert!(text.matches(" Tj").count() > 1);
    }

    #[test]
    fn test_automatic_page_break() {
        let mut doc = PdfDocument::new();
        doc.add_page();
        for _ in 0..100 {
            doc.line(20.0, "overflow");
        }
        assert!(doc.page_count() > 1);
    }

    #[test]
    fn test_encode_text() {
        assert_eq!(encode_text("plain"), b"plain".to_vec());
        assert_eq!(encode_text("caf\u{e9}"), b"caf?".to_vec());
    }
}
