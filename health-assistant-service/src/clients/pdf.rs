use printpdf::*;
use std::io::BufWriter;
use triage_flow::{DocumentExport, ServiceError};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 20.0;
const FONT_SIZE: f32 = 12.0;
const LINE_HEIGHT: f32 = 6.0;
/// Helvetica at 12 pt fits roughly this many characters between the margins
const WRAP_COLUMNS: usize = 85;

/// A4, Helvetica, word-wrapped and paged
#[derive(Debug, Clone)]
pub struct PdfExporter {
    title: String,
}

impl PdfExporter {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }
}

impl Default for PdfExporter {
    fn default() -> Self {
        Self::new("Personalized Nutrition Plan")
    }
}

impl DocumentExport for PdfExporter {
    fn render(&self, plain_text: &str) -> Result<Vec<u8>, ServiceError> {
        let (doc, page1, layer1) =
            PdfDocument::new(&self.title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let font = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| ServiceError::Request(format!("PDF font error: {e}")))?;

        let mut layer = doc.get_page(page1).get_layer(layer1);
        let mut y = PAGE_HEIGHT - MARGIN;

        for line in plain_text.lines().flat_map(|l| wrap_line(&latin1(l), WRAP_COLUMNS)) {
            if y < MARGIN {
                let (page, page_layer) =
                    doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
                layer = doc.get_page(page).get_layer(page_layer);
                y = PAGE_HEIGHT - MARGIN;
            }
            if !line.is_empty() {
                layer.use_text(line, FONT_SIZE, Mm(MARGIN), Mm(y), &font);
            }
            y -= LINE_HEIGHT;
        }

        let mut buf = BufWriter::new(Vec::new());
        doc.save(&mut buf)
            .map_err(|e| ServiceError::Request(format!("PDF save error: {e}")))?;
        buf.into_inner()
            .map_err(|e| ServiceError::Request(format!("PDF buffer error: {e}")))
    }
}

/// The builtin font only covers Latin-1; other characters (emoji, Indic scripts) are dropped.
fn latin1(line: &str) -> String {
    line.chars().filter(|c| (*c as u32) < 0x100).collect()
}

/// Greedy word wrap. Blank input yields one blank line so paragraph breaks survive.
fn wrap_line(line: &str, columns: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in line.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > columns {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }

    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}
