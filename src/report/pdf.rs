//! PDF rendering of a diagnosis report
//!
//! Hand-laid A4 pages in the base-14 Helvetica fonts. Text is wrapped on an
//! average glyph width, tables are drawn with stroked lines only, and the QR
//! code is painted as one filled rectangle per dark module.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use tracing::debug;

use super::export::ReportExporter;
use super::qr::QrMatrix;
use crate::models::ReportRecord;
use crate::types::{AppError, AppResult};

pub const TITLE: &str = "CROP DISEASE DIAGNOSIS REPORT";
pub const SUMMARY_HEADING: &str = "Diagnosis Summary";
pub const SYMPTOMS_HEADING: &str = "Observed Symptoms";
pub const TREATMENTS_HEADING: &str = "Treatment Options";
pub const INSTRUCTIONS_HEADING: &str = "Application Instructions";
pub const PREVENTION_HEADING: &str = "Prevention Tips";
pub const NO_TREATMENTS: &str = "No treatments found for this disease. Follow the prevention tips below.";

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 50.0;
const BOTTOM: f32 = 70.0;
const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;

const BODY_SIZE: f32 = 10.0;
const LEADING: f32 = 14.0;
const TABLE_SIZE: f32 = 9.0;
const TABLE_LEADING: f32 = 11.0;
const CELL_PAD: f32 = 4.0;
const QR_SIZE: f32 = 110.0;

#[derive(Debug, Clone, Copy)]
enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }

    fn glyph_width(self) -> f32 {
        match self {
            Font::Regular => 0.5,
            Font::Bold => 0.56,
        }
    }
}

/// Renders [`ReportRecord`]s as printable PDF documents
#[derive(Debug, Clone, Default)]
pub struct PdfExporter {
    public_base_url: Option<String>,
}

impl PdfExporter {
    pub fn new(public_base_url: Option<String>) -> Self {
        Self { public_base_url }
    }

    pub fn qr_for(&self, record: &ReportRecord) -> AppResult<QrMatrix> {
        QrMatrix::encode(QrMatrix::payload_for(&record.id, self.public_base_url.as_deref()))
    }

    fn layout(&self, record: &ReportRecord) -> AppResult<Vec<Vec<Operation>>> {
        let mut page = Layout::new();
        let diagnosis = &record.diagnosis;

        page.paragraph(Font::Bold, 18.0, 0.0, TITLE);
        page.spacer(4.0);
        page.paragraph(Font::Regular, BODY_SIZE, 0.0, &format!("Diagnosis ID: {}", record.id));
        page.paragraph(
            Font::Regular,
            BODY_SIZE,
            0.0,
            &format!("Date: {}", record.created_at.format("%Y-%m-%d %H:%M UTC")),
        );

        page.heading(SUMMARY_HEADING);
        let (disease, confidence) = if diagnosis.is_inconclusive() {
            ("Not identified".to_string(), "-".to_string())
        } else {
            (
                diagnosis.disease_name.clone(),
                format!("{:.0}%", diagnosis.confidence * 100.0),
            )
        };
        page.table(
            &[140.0, CONTENT_WIDTH - 140.0],
            None,
            &[
                vec!["Disease".to_string(), disease],
                vec!["Crop".to_string(), diagnosis.crop.clone()],
                vec!["Confidence".to_string(), confidence],
                vec!["Severity".to_string(), diagnosis.severity.to_string()],
            ],
        );
        if !diagnosis.reasoning.is_empty() {
            page.spacer(4.0);
            page.paragraph(Font::Regular, BODY_SIZE, 0.0, &diagnosis.reasoning);
        }

        if !record.notices.is_empty() {
            page.heading("Report Notices");
            for notice in &record.notices {
                page.paragraph(
                    Font::Regular,
                    BODY_SIZE,
                    0.0,
                    &format!("[{}] {}", notice.section, notice.message),
                );
            }
        }

        let explanation = &record.explanation;
        if !explanation.is_empty() {
            page.heading("About This Disease");
            page.paragraph(Font::Regular, BODY_SIZE, 0.0, &explanation.summary);
            for (label, text) in [
                ("Cause", &explanation.cause),
                ("How it spreads", &explanation.spread),
                ("Impact", &explanation.impact),
            ] {
                if !text.is_empty() {
                    page.paragraph(Font::Regular, BODY_SIZE, 0.0, &format!("{}: {}", label, text));
                }
            }
            if !explanation.favorable_conditions.is_empty() {
                page.paragraph(
                    Font::Regular,
                    BODY_SIZE,
                    0.0,
                    &format!("Favoured by: {}", explanation.favorable_conditions.join(", ")),
                );
            }
        }

        if !record.instructions.immediate_action.is_empty() {
            page.heading("Immediate Action");
            page.paragraph(Font::Bold, BODY_SIZE, 0.0, &record.instructions.immediate_action);
        }

        page.heading(SYMPTOMS_HEADING);
        if diagnosis.symptoms.is_empty() {
            page.paragraph(Font::Regular, BODY_SIZE, 0.0, "No symptoms recorded.");
        }
        for symptom in &diagnosis.symptoms {
            page.paragraph(Font::Regular, BODY_SIZE, 10.0, &format!("[ ] {}", symptom));
        }

        page.heading(TREATMENTS_HEADING);
        if record.treatments.is_empty() {
            page.paragraph(Font::Regular, BODY_SIZE, 0.0, NO_TREATMENTS);
        } else {
            let rows: Vec<Vec<String>> = record
                .treatments
                .iter()
                .map(|t| {
                    vec![
                        t.name.clone(),
                        t.category.to_string(),
                        or_dash(&t.dosage),
                        or_dash(&t.frequency),
                        or_dash(&t.safety_notes),
                    ]
                })
                .collect();
            page.table(
                &[110.0, 60.0, 95.0, 85.0, CONTENT_WIDTH - 350.0],
                Some(&["Treatment", "Type", "Dosage", "Frequency", "Safety"]),
                &rows,
            );
        }

        page.heading(INSTRUCTIONS_HEADING);
        let instructions = &record.instructions;
        if !instructions.recommended_treatment.is_empty() {
            page.paragraph(
                Font::Bold,
                BODY_SIZE,
                0.0,
                &format!("Recommended: {}", instructions.recommended_treatment),
            );
            if !instructions.rationale.is_empty() {
                page.paragraph(Font::Regular, BODY_SIZE, 0.0, &instructions.rationale);
            }
        }
        if instructions.steps.is_empty() {
            page.paragraph(
                Font::Regular,
                BODY_SIZE,
                0.0,
                "No application steps. Follow the prevention tips below.",
            );
        }
        for step in &instructions.steps {
            let text = if step.title.is_empty() {
                format!("{}. [{}] {}", step.number, step.phase, step.instruction)
            } else {
                format!("{}. [{}] {}: {}", step.number, step.phase, step.title, step.instruction)
            };
            page.paragraph(Font::Regular, BODY_SIZE, 0.0, &text);
        }

        page.heading(PREVENTION_HEADING);
        for tip in &instructions.prevention {
            page.paragraph(Font::Regular, BODY_SIZE, 10.0, &format!("- {}", tip));
        }

        let qr = self.qr_for(record)?;
        page.qr_code(&qr);

        Ok(page.finish())
    }

    fn render(&self, record: &ReportRecord) -> AppResult<Vec<u8>> {
        let pages = self.layout(record)?;

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let regular_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let bold_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => regular_id,
                "F2" => bold_id,
            },
        });

        let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
        for operations in pages {
            let encoded = Content { operations }
                .encode()
                .map_err(|e| AppError::Export(format!("Failed to encode page content: {}", e)))?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        let media_box: Vec<Object> = vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()];
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => media_box,
            }),
        );

        let info_id = doc.add_object(dictionary! {
            "Title" => Object::string_literal(format!("Crop Disease Diagnosis {}", record.id)),
            "Producer" => Object::string_literal("crop-doctor"),
        });
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)
            .map_err(|e| AppError::Export(format!("Failed to write PDF: {}", e)))?;

        debug!(report_id = %record.id, pages = count, bytes = bytes.len(), "PDF rendered");
        Ok(bytes)
    }
}

impl ReportExporter for PdfExporter {
    fn content_type(&self) -> &'static str {
        "application/pdf"
    }

    fn file_name(&self, record: &ReportRecord) -> String {
        format!("report_{}.pdf", record.id)
    }

    fn export(&self, record: &ReportRecord) -> AppResult<Vec<u8>> {
        self.render(record)
    }
}

/// Top-down cursor over a growing list of pages
struct Layout {
    pages: Vec<Vec<Operation>>,
    ops: Vec<Operation>,
    y: f32,
}

impl Layout {
    fn new() -> Self {
        Self {
            pages: Vec::new(),
            ops: Vec::new(),
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn ensure(&mut self, height: f32) {
        if self.y - height < BOTTOM {
            self.break_page();
        }
    }

    fn break_page(&mut self) {
        self.pages.push(std::mem::take(&mut self.ops));
        self.y = PAGE_HEIGHT - MARGIN;
    }

    fn spacer(&mut self, height: f32) {
        self.y -= height;
    }

    fn heading(&mut self, text: &str) {
        // keep a heading on the same page as its first lines
        self.ensure(LEADING * 4.0);
        self.spacer(10.0);
        self.paragraph(Font::Bold, 13.0, 0.0, text);
        self.spacer(2.0);
    }

    fn paragraph(&mut self, font: Font, size: f32, indent: f32, text: &str) {
        let leading = size * 1.4;
        for line in wrap(text, max_chars(CONTENT_WIDTH - indent, font, size)) {
            self.ensure(leading);
            self.y -= leading;
            self.ops.extend(text_ops(font, size, MARGIN + indent, self.y, &line));
        }
    }

    fn table(&mut self, widths: &[f32], header: Option<&[&str]>, rows: &[Vec<String>]) {
        if let Some(header) = header {
            let cells: Vec<String> = header.iter().map(|h| h.to_string()).collect();
            self.table_row(widths, &cells, Font::Bold);
        }
        for row in rows {
            self.table_row(widths, row, Font::Regular);
        }
    }

    fn table_row(&mut self, widths: &[f32], cells: &[String], font: Font) {
        let max_lines = row_line_capacity();
        let wrapped: Vec<Vec<String>> = cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| {
                let chars = max_chars(width - 2.0 * CELL_PAD, font, TABLE_SIZE);
                let mut lines = wrap(cell, chars);
                // a row never spans pages; overlong cells are cut
                if lines.len() > max_lines {
                    lines.truncate(max_lines);
                    if let Some(last) = lines.last_mut() {
                        *last = ellipsize(last, chars);
                    }
                }
                lines
            })
            .collect();
        let lines = wrapped.iter().map(Vec::len).max().unwrap_or(1).max(1);
        let height = lines as f32 * TABLE_LEADING + 2.0 * CELL_PAD;

        self.ensure(height);
        let top = self.y;
        let bottom = top - height;

        self.ops.push(Operation::new("w", vec![0.5.into()]));
        let mut x = MARGIN;
        for (cell_lines, width) in wrapped.iter().zip(widths) {
            for (i, line) in cell_lines.iter().enumerate() {
                let baseline = top - CELL_PAD - TABLE_SIZE - i as f32 * TABLE_LEADING;
                self.ops.extend(text_ops(font, TABLE_SIZE, x + CELL_PAD, baseline, line));
            }
            self.stroke(x, top, x, bottom);
            x += width;
        }
        self.stroke(x, top, x, bottom);
        self.stroke(MARGIN, top, x, top);
        self.stroke(MARGIN, bottom, x, bottom);

        self.y = bottom;
    }

    fn stroke(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) {
        self.ops.push(Operation::new("m", vec![x1.into(), y1.into()]));
        self.ops.push(Operation::new("l", vec![x2.into(), y2.into()]));
        self.ops.push(Operation::new("S", vec![]));
    }

    fn qr_code(&mut self, qr: &QrMatrix) {
        let module = QR_SIZE / qr.width as f32;
        self.ensure(QR_SIZE + LEADING * 3.0);
        self.spacer(10.0);
        self.paragraph(Font::Bold, BODY_SIZE, 0.0, "Scan to look up this report");

        let top = self.y - 6.0;
        self.ops.push(Operation::new("q", vec![]));
        self.ops.push(Operation::new("g", vec![0.into()]));
        for (col, row) in qr.dark_modules() {
            self.ops.push(Operation::new(
                "re",
                vec![
                    (MARGIN + col as f32 * module).into(),
                    (top - (row + 1) as f32 * module).into(),
                    module.into(),
                    module.into(),
                ],
            ));
        }
        self.ops.push(Operation::new("f", vec![]));
        self.ops.push(Operation::new("Q", vec![]));

        self.y = top - QR_SIZE;
        self.paragraph(Font::Regular, 8.0, 0.0, &qr.payload);
    }

    /// Close the last page and stamp every page with the footer
    fn finish(mut self) -> Vec<Vec<Operation>> {
        if !self.ops.is_empty() || self.pages.is_empty() {
            self.break_page();
        }

        let total = self.pages.len();
        for (i, ops) in self.pages.iter_mut().enumerate() {
            ops.extend(text_ops(
                Font::Regular,
                8.0,
                MARGIN,
                40.0,
                "AI-assisted diagnosis. Confirm with a local agricultural extension officer before applying chemicals.",
            ));
            ops.extend(text_ops(
                Font::Regular,
                8.0,
                MARGIN,
                28.0,
                &format!("Crop Doctor report - page {} of {}", i + 1, total),
            ));
        }
        self.pages
    }
}

fn text_ops(font: Font, size: f32, x: f32, y: f32, text: &str) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![font.resource().into(), size.into()]),
        Operation::new("Td", vec![x.into(), y.into()]),
        Operation::new("Tj", vec![Object::string_literal(encode_winansi(text))]),
        Operation::new("ET", vec![]),
    ]
}

fn max_chars(width: f32, font: Font, size: f32) -> usize {
    ((width / (size * font.glyph_width())) as usize).max(1)
}

/// Greedy word wrap; words longer than a line are split
fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(max_chars);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        let word: String = word.into_iter().collect();
        if word.is_empty() {
            continue;
        }

        let word_len = word.chars().count();
        if !current.is_empty() && current.chars().count() + 1 + word_len > max_chars {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Lines of table text that fit on an empty page
fn row_line_capacity() -> usize {
    (((PAGE_HEIGHT - MARGIN - BOTTOM - 2.0 * CELL_PAD) / TABLE_LEADING) as usize).max(1)
}

fn ellipsize(line: &str, max_chars: usize) -> String {
    let mut cut: String = line.chars().take(max_chars.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

/// Encode text for the WinAnsi base fonts: Latin-1 passes through,
/// typographic punctuation maps to its WinAnsi slot, anything else is `?`
fn encode_winansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\t' | '\n' | '\r' => b' ',
            c if c.is_ascii_control() => b'?',
            c if (c as u32) < 0x80 => c as u8,
            c if (0xA0..=0xFF).contains(&(c as u32)) => c as u32 as u8,
            '\u{20AC}' => 0x80,
            '\u{201A}' => 0x82,
            '\u{0192}' => 0x83,
            '\u{201E}' => 0x84,
            '\u{2026}' => 0x85,
            '\u{2020}' => 0x86,
            '\u{2021}' => 0x87,
            '\u{02C6}' => 0x88,
            '\u{2030}' => 0x89,
            '\u{0160}' => 0x8A,
            '\u{2039}' => 0x8B,
            '\u{0152}' => 0x8C,
            '\u{017D}' => 0x8E,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{02DC}' => 0x98,
            '\u{2122}' => 0x99,
            '\u{0161}' => 0x9A,
            '\u{203A}' => 0x9B,
            '\u{0153}' => 0x9C,
            '\u{017E}' => 0x9E,
            '\u{0178}' => 0x9F,
            _ => b'?',
        })
        .collect()
}

fn or_dash(value: &str) -> String {
    if value.trim().is_empty() {
        "-".to_string()
    } else {
        value.to_string()
    }
}
