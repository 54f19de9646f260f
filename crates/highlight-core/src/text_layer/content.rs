//! Content stream interpreter producing positioned glyph runs

use std::collections::HashMap;

use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};

use super::fonts::FontInfo;
use super::{number, resolve, Rect};

/// TJ adjustments beyond this (thousandths of an em) are read as a word gap
const TJ_SPACE_THRESHOLD: f64 = 250.0;
/// Glyph box extent below / above the baseline, as a fraction of font size
const DESCENT: f64 = 0.2;
const ASCENT: f64 = 0.8;

type Matrix = [f64; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

fn multiply(m: &Matrix, n: &Matrix) -> Matrix {
    [
        m[0] * n[0] + m[1] * n[2],
        m[0] * n[1] + m[1] * n[3],
        m[2] * n[0] + m[3] * n[2],
        m[2] * n[1] + m[3] * n[3],
        m[4] * n[0] + m[5] * n[2] + n[4],
        m[4] * n[1] + m[5] * n[3] + n[5],
    ]
}

fn translate(tx: f64, ty: f64) -> Matrix {
    [1.0, 0.0, 0.0, 1.0, tx, ty]
}

fn apply(m: &Matrix, x: f64, y: f64) -> (f64, f64) {
    (m[0] * x + m[2] * y + m[4], m[1] * x + m[3] * y + m[5])
}

/// A single positioned character
#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    pub ch: char,
    pub rect: Rect,
}

/// Glyphs shown by one text-showing operator
#[derive(Debug, Clone, Default)]
pub struct GlyphRun {
    pub glyphs: Vec<Glyph>,
    /// Baseline in user space
    pub baseline: f64,
    /// Effective font size in user space
    pub size: f64,
}

impl GlyphRun {
    pub fn start_x(&self) -> f64 {
        self.glyphs.first().map(|g| g.rect.x0).unwrap_or(0.0)
    }

    pub fn end_x(&self) -> f64 {
        self.glyphs.last().map(|g| g.rect.x1).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    font: Option<Vec<u8>>,
    font_size: f64,
    char_spacing: f64,
    word_spacing: f64,
    horizontal_scale: f64,
    leading: f64,
    rise: f64,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: IDENTITY,
            font: None,
            font_size: 12.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

struct Interpreter<'a> {
    fonts: &'a HashMap<Vec<u8>, FontInfo>,
    fallback_font: FontInfo,
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    runs: Vec<GlyphRun>,
}

impl<'a> Interpreter<'a> {
    fn new(fonts: &'a HashMap<Vec<u8>, FontInfo>) -> Self {
        Self {
            fonts,
            fallback_font: FontInfo::default(),
            state: GraphicsState::default(),
            stack: Vec::new(),
            text_matrix: IDENTITY,
            line_matrix: IDENTITY,
            runs: Vec::new(),
        }
    }

    fn operand(operands: &[Object], idx: usize) -> f64 {
        operands.get(idx).and_then(number).unwrap_or(0.0)
    }

    fn move_line(&mut self, tx: f64, ty: f64) {
        self.line_matrix = multiply(&translate(tx, ty), &self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        let leading = self.state.leading;
        self.move_line(0.0, -leading);
    }

    fn run(&mut self, operations: &[lopdf::content::Operation]) {
        for op in operations {
            let operands = &op.operands;
            match op.operator.as_str() {
                "q" => self.stack.push(self.state.clone()),
                "Q" => {
                    if let Some(saved) = self.stack.pop() {
                        self.state = saved;
                    }
                }
                "cm" if operands.len() >= 6 => {
                    let m: Matrix = std::array::from_fn(|i| Self::operand(operands, i));
                    self.state.ctm = multiply(&m, &self.state.ctm);
                }
                "BT" => {
                    self.text_matrix = IDENTITY;
                    self.line_matrix = IDENTITY;
                }
                "Tf" if operands.len() >= 2 => {
                    self.state.font = operands[0].as_name().ok().map(|n| n.to_vec());
                    self.state.font_size = Self::operand(operands, 1);
                }
                "Tc" => self.state.char_spacing = Self::operand(operands, 0),
                "Tw" => self.state.word_spacing = Self::operand(operands, 0),
                "Tz" => self.state.horizontal_scale = Self::operand(operands, 0) / 100.0,
                "TL" => self.state.leading = Self::operand(operands, 0),
                "Ts" => self.state.rise = Self::operand(operands, 0),
                "Td" => self.move_line(Self::operand(operands, 0), Self::operand(operands, 1)),
                "TD" => {
                    let ty = Self::operand(operands, 1);
                    self.state.leading = -ty;
                    self.move_line(Self::operand(operands, 0), ty);
                }
                "Tm" if operands.len() >= 6 => {
                    let m: Matrix = std::array::from_fn(|i| Self::operand(operands, i));
                    self.text_matrix = m;
                    self.line_matrix = m;
                }
                "T*" => self.next_line(),
                "Tj" => {
                    if let Some(Object::String(bytes, _)) = operands.first() {
                        let mut run = self.begin_run();
                        self.show(bytes, &mut run);
                        self.push_run(run);
                    }
                }
                "'" => {
                    self.next_line();
                    if let Some(Object::String(bytes, _)) = operands.first() {
                        let mut run = self.begin_run();
                        self.show(bytes, &mut run);
                        self.push_run(run);
                    }
                }
                "\"" if operands.len() >= 3 => {
                    self.state.word_spacing = Self::operand(operands, 0);
                    self.state.char_spacing = Self::operand(operands, 1);
                    self.next_line();
                    if let Object::String(bytes, _) = &operands[2] {
                        let mut run = self.begin_run();
                        self.show(bytes, &mut run);
                        self.push_run(run);
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = operands.first() {
                        let mut run = self.begin_run();
                        for item in items {
                            match item {
                                Object::String(bytes, _) => self.show(bytes, &mut run),
                                other => {
                                    if let Some(adjust) = number(other) {
                                        self.adjust(adjust, &mut run);
                                    }
                                }
                            }
                        }
                        self.push_run(run);
                    }
                }
                _ => {}
            }
        }
    }

    fn font(&self) -> &FontInfo {
        self.state
            .font
            .as_ref()
            .and_then(|name| self.fonts.get(name))
            .unwrap_or(&self.fallback_font)
    }

    /// Text space to user space for the current text position
    fn text_to_user(&self) -> Matrix {
        multiply(&self.text_matrix, &self.state.ctm)
    }

    fn begin_run(&self) -> GlyphRun {
        let m = self.text_to_user();
        let (_, baseline) = apply(&m, 0.0, self.state.rise);
        let scale = (m[2] * m[2] + m[3] * m[3]).sqrt();
        GlyphRun {
            glyphs: Vec::new(),
            baseline,
            size: (self.state.font_size * scale).abs(),
        }
    }

    fn push_run(&mut self, run: GlyphRun) {
        if !run.glyphs.is_empty() {
            self.runs.push(run);
        }
    }

    /// Bounding box in user space of a text-space box starting at the current position
    fn glyph_rect(&self, advance: f64) -> Rect {
        let m = self.text_to_user();
        let size = self.state.font_size;
        let rise = self.state.rise;
        let corners = [
            apply(&m, 0.0, rise - DESCENT * size),
            apply(&m, advance, rise - DESCENT * size),
            apply(&m, 0.0, rise + ASCENT * size),
            apply(&m, advance, rise + ASCENT * size),
        ];
        Rect::bounding(&corners)
    }

    fn show(&mut self, bytes: &[u8], run: &mut GlyphRun) {
        let glyphs = self.font().decode(bytes);
        let two_byte = self.font().is_two_byte();
        let size = self.state.font_size;
        let h_scale = self.state.horizontal_scale;

        for glyph in glyphs {
            let glyph_advance = glyph.width / 1000.0 * size * h_scale;
            let rect = self.glyph_rect(glyph_advance);
            for ch in glyph.text.chars() {
                run.glyphs.push(Glyph { ch, rect });
            }

            let word_spacing = if !two_byte && glyph.code == 32 {
                self.state.word_spacing
            } else {
                0.0
            };
            let tx = (glyph.width / 1000.0 * size + self.state.char_spacing + word_spacing)
                * h_scale;
            self.text_matrix = multiply(&translate(tx, 0.0), &self.text_matrix);
        }
    }

    /// Apply a TJ position adjustment, emitting a space for large gaps
    fn adjust(&mut self, adjust: f64, run: &mut GlyphRun) {
        let tx = -adjust / 1000.0 * self.state.font_size * self.state.horizontal_scale;
        if -adjust > TJ_SPACE_THRESHOLD {
            let ends_with_space = run.glyphs.last().map_or(true, |g| g.ch.is_whitespace());
            if !ends_with_space {
                let rect = self.glyph_rect(tx);
                run.glyphs.push(Glyph { ch: ' ', rect });
            }
        }
        self.text_matrix = multiply(&translate(tx, 0.0), &self.text_matrix);
    }
}

/// Font resources of a page, looked up through inherited `Resources`
fn page_fonts(doc: &Document, page_id: ObjectId) -> HashMap<Vec<u8>, FontInfo> {
    let mut fonts = HashMap::new();
    let Some(resources) = super::inherited(doc, page_id, b"Resources") else {
        return fonts;
    };
    let Some(font_dict) = resources
        .as_dict()
        .ok()
        .and_then(|r| r.get(b"Font").ok())
        .map(|f| resolve(doc, f))
        .and_then(|f| f.as_dict().ok())
    else {
        return fonts;
    };

    for (name, font) in font_dict.iter() {
        if let Ok(dict) = resolve(doc, font).as_dict() {
            fonts.insert(name.clone(), FontInfo::from_dict(doc, dict));
        }
    }
    fonts
}

/// Run the page's content stream and collect glyph runs in stream order
pub fn extract_runs(doc: &Document, page_id: ObjectId) -> Result<Vec<GlyphRun>, lopdf::Error> {
    let data = doc.get_page_content(page_id)?;
    let content = Content::decode(&data)?;
    let fonts = page_fonts(doc, page_id);

    let mut interpreter = Interpreter::new(&fonts);
    interpreter.run(&content.operations);
    Ok(interpreter.runs)
}
