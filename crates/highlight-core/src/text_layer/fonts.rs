//! Font decoding: character codes to Unicode text and glyph widths

use std::collections::HashMap;

use lopdf::{Dictionary, Document, Object, Stream};
use tracing::warn;

use super::{number, resolve};

/// Glyph width used when a font carries no width information (1/1000 em)
const FALLBACK_WIDTH: f64 = 500.0;
/// Widest code range a CMap or `W` entry may expand (one two-byte plane)
const MAX_RANGE_SPAN: u32 = 0xFFFF;
/// Total codes all ranges of one font may expand into
const MAX_MAPPED_CODES: u64 = 1 << 20;

/// One decoded character code
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedGlyph {
    pub code: u32,
    pub text: String,
    /// Advance width in thousandths of an em
    pub width: f64,
}

/// The parts of a font dictionary needed to decode shown strings
#[derive(Debug, Clone)]
pub struct FontInfo {
    /// Type0 fonts use two-byte codes (Identity-H and friends)
    two_byte: bool,
    to_unicode: Option<HashMap<u32, String>>,
    first_char: u32,
    widths: Vec<f64>,
    cid_widths: HashMap<u32, f64>,
    default_width: f64,
}

impl Default for FontInfo {
    /// Single-byte Latin-1 font with uniform half-em glyphs
    fn default() -> Self {
        Self {
            two_byte: false,
            to_unicode: None,
            first_char: 0,
            widths: Vec::new(),
            cid_widths: HashMap::new(),
            default_width: FALLBACK_WIDTH,
        }
    }
}

impl FontInfo {
    pub fn from_dict(doc: &Document, font: &Dictionary) -> Self {
        let subtype = font
            .get(b"Subtype")
            .ok()
            .and_then(|o| o.as_name_str().ok())
            .unwrap_or("");

        let to_unicode = font
            .get(b"ToUnicode")
            .ok()
            .map(|o| resolve(doc, o))
            .and_then(|o| o.as_stream().ok())
            .and_then(stream_bytes)
            .map(|bytes| parse_to_unicode(&bytes))
            .filter(|map| !map.is_empty());

        if subtype == "Type0" {
            let descendant = font
                .get(b"DescendantFonts")
                .ok()
                .map(|o| resolve(doc, o))
                .and_then(|o| o.as_array().ok())
                .and_then(|arr| arr.first())
                .map(|o| resolve(doc, o))
                .and_then(|o| o.as_dict().ok());

            let default_width = descendant
                .and_then(|d| d.get(b"DW").ok())
                .and_then(number)
                .unwrap_or(1000.0);
            let cid_widths = descendant
                .and_then(|d| d.get(b"W").ok())
                .map(|o| resolve(doc, o))
                .and_then(|o| o.as_array().ok())
                .map(|arr| parse_cid_widths(doc, arr))
                .unwrap_or_default();

            return Self {
                two_byte: true,
                to_unicode,
                first_char: 0,
                widths: Vec::new(),
                cid_widths,
                default_width,
            };
        }

        let first_char = font
            .get(b"FirstChar")
            .ok()
            .and_then(number)
            .map(|n| n.max(0.0) as u32)
            .unwrap_or(0);
        let widths = font
            .get(b"Widths")
            .ok()
            .map(|o| resolve(doc, o))
            .and_then(|o| o.as_array().ok())
            .map(|arr| {
                arr.iter()
                    .map(|w| number(resolve(doc, w)).unwrap_or(0.0))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            two_byte: false,
            to_unicode,
            first_char,
            widths,
            cid_widths: HashMap::new(),
            default_width: FALLBACK_WIDTH,
        }
    }

    pub fn is_two_byte(&self) -> bool {
        self.two_byte
    }

    /// Split a shown string into character codes and decode each one
    pub fn decode(&self, bytes: &[u8]) -> Vec<DecodedGlyph> {
        let codes: Vec<u32> = if self.two_byte {
            bytes
                .chunks(2)
                .map(|pair| match pair {
                    [hi, lo] => u32::from(*hi) << 8 | u32::from(*lo),
                    [single] => u32::from(*single),
                    _ => 0,
                })
                .collect()
        } else {
            bytes.iter().map(|&b| u32::from(b)).collect()
        };

        codes
            .into_iter()
            .map(|code| DecodedGlyph {
                code,
                text: self.text_for(code),
                width: self.width_for(code),
            })
            .collect()
    }

    fn text_for(&self, code: u32) -> String {
        if let Some(text) = self.to_unicode.as_ref().and_then(|m| m.get(&code)) {
            return text.clone();
        }
        if self.two_byte {
            return char::from_u32(code).map(String::from).unwrap_or_default();
        }
        win_ansi_char(code as u8).to_string()
    }

    fn width_for(&self, code: u32) -> f64 {
        if self.two_byte {
            return self
                .cid_widths
                .get(&code)
                .copied()
                .unwrap_or(self.default_width);
        }
        code.checked_sub(self.first_char)
            .and_then(|idx| self.widths.get(idx as usize))
            .copied()
            .filter(|w| *w > 0.0)
            .unwrap_or(self.default_width)
    }
}

/// Stream data, decoded when the stream declares a filter
fn stream_bytes(stream: &Stream) -> Option<Vec<u8>> {
    if stream.dict.has(b"Filter") {
        stream.decompressed_content().ok()
    } else {
        Some(stream.content.clone())
    }
}

/// Map a single-byte code through WinAnsiEncoding (Latin-1 plus the
/// typographic punctuation in 0x80..0x9F)
fn win_ansi_char(byte: u8) -> char {
    match byte {
        0x80 => '€',
        0x85 => '…',
        0x91 => '‘',
        0x92 => '’',
        0x93 => '“',
        0x94 => '”',
        0x95 => '•',
        0x96 => '–',
        0x97 => '—',
        0x99 => '™',
        0xA0 => ' ',
        b => b as char,
    }
}

/// Parse the `W` array of a CIDFont: `c [w1 w2 ...]` or `c_first c_last w`
fn parse_cid_widths(doc: &Document, arr: &[Object]) -> HashMap<u32, f64> {
    let mut widths = HashMap::new();
    let mut budget = CodeBudget::new();
    let mut i = 0;
    while i < arr.len() {
        let Some(first) = number(resolve(doc, &arr[i])) else {
            break;
        };
        let first = first.max(0.0) as u32;
        match arr.get(i + 1).map(|o| resolve(doc, o)) {
            Some(Object::Array(list)) => {
                for (offset, w) in list.iter().enumerate() {
                    let Some(cid) = u32::try_from(offset)
                        .ok()
                        .and_then(|offset| first.checked_add(offset))
                    else {
                        break;
                    };
                    if let Some(w) = number(resolve(doc, w)) {
                        widths.insert(cid, w);
                    }
                }
                i += 2;
            }
            Some(last) => {
                let (Some(last), Some(w)) = (
                    number(last),
                    arr.get(i + 2).map(|o| resolve(doc, o)).and_then(number),
                ) else {
                    break;
                };
                let last = last.max(0.0) as u32;
                if budget.take(first, last) {
                    for cid in first..=last {
                        widths.insert(cid, w);
                    }
                }
                i += 3;
            }
            None => break,
        }
    }
    widths
}

/// Bounds the number of codes a single font may expand ranges into
struct CodeBudget {
    remaining: u64,
}

impl CodeBudget {
    fn new() -> Self {
        Self {
            remaining: MAX_MAPPED_CODES,
        }
    }

    /// Reserve the inclusive range `lo..=hi`; false when it is inverted,
    /// wider than `MAX_RANGE_SPAN`, or exceeds what is left
    fn take(&mut self, lo: u32, hi: u32) -> bool {
        let Some(span) = hi.checked_sub(lo) else {
            warn!("Skipping inverted code range {:#x}..{:#x}", lo, hi);
            return false;
        };
        let count = u64::from(span) + 1;
        if span > MAX_RANGE_SPAN || count > self.remaining {
            warn!(
                "Skipping code range {:#x}..{:#x} of {} codes in font",
                lo, hi, count
            );
            return false;
        }
        self.remaining -= count;
        true
    }
}

#[derive(Debug, PartialEq)]
enum CMapToken {
    Hex(Vec<u8>),
    ArrayStart,
    ArrayEnd,
    Word(String),
}

fn tokenize_cmap(data: &[u8]) -> Vec<CMapToken> {
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < data.len() {
        match data[i] {
            b'<' if data.get(i + 1) == Some(&b'<') => i += 2,
            b'>' if data.get(i + 1) == Some(&b'>') => i += 2,
            b'<' => {
                let start = i + 1;
                let end = data[start..]
                    .iter()
                    .position(|&b| b == b'>')
                    .map(|p| start + p)
                    .unwrap_or(data.len());
                tokens.push(CMapToken::Hex(decode_hex(&data[start..end])));
                i = end + 1;
            }
            b'[' => {
                tokens.push(CMapToken::ArrayStart);
                i += 1;
            }
            b']' => {
                tokens.push(CMapToken::ArrayEnd);
                i += 1;
            }
            b'%' => {
                while i < data.len() && data[i] != b'\n' && data[i] != b'\r' {
                    i += 1;
                }
            }
            b if b.is_ascii_whitespace() => i += 1,
            _ => {
                let start = i;
                while i < data.len()
                    && !data[i].is_ascii_whitespace()
                    && !matches!(data[i], b'<' | b'>' | b'[' | b']' | b'%')
                {
                    i += 1;
                }
                tokens.push(CMapToken::Word(
                    String::from_utf8_lossy(&data[start..i]).into_owned(),
                ));
            }
        }
    }
    tokens
}

fn decode_hex(digits: &[u8]) -> Vec<u8> {
    let nibbles: Vec<u8> = digits
        .iter()
        .filter_map(|&b| (b as char).to_digit(16).map(|d| d as u8))
        .collect();
    nibbles
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => hi << 4 | lo,
            [hi] => hi << 4,
            _ => 0,
        })
        .collect()
}

fn code_of(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| acc << 8 | u32::from(b))
}

fn utf16_text(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [single] => u16::from(*single),
            _ => 0,
        })
        .collect();
    String::from_utf16_lossy(&units)
}

/// Parse the `bfchar` and `bfrange` sections of a ToUnicode CMap.
///
/// Ranges that are inverted or implausibly wide are skipped.
pub fn parse_to_unicode(data: &[u8]) -> HashMap<u32, String> {
    let tokens = tokenize_cmap(data);
    let mut map = HashMap::new();
    let mut budget = CodeBudget::new();
    let mut i = 0;

    while i < tokens.len() {
        match &tokens[i] {
            CMapToken::Word(w) if w == "beginbfchar" => {
                i += 1;
                while i + 1 < tokens.len() {
                    match (&tokens[i], &tokens[i + 1]) {
                        (CMapToken::Hex(src), CMapToken::Hex(dst)) => {
                            map.insert(code_of(src), utf16_text(dst));
                            i += 2;
                        }
                        _ => break,
                    }
                }
            }
            CMapToken::Word(w) if w == "beginbfrange" => {
                i += 1;
                while i + 2 < tokens.len() {
                    let (CMapToken::Hex(lo), CMapToken::Hex(hi)) = (&tokens[i], &tokens[i + 1])
                    else {
                        break;
                    };
                    let (lo, hi) = (code_of(lo), code_of(hi));
                    match &tokens[i + 2] {
                        CMapToken::Hex(dst) => {
                            if budget.take(lo, hi) {
                                let mut units: Vec<u16> = dst
                                    .chunks(2)
                                    .map(|p| match p {
                                        [a, b] => u16::from_be_bytes([*a, *b]),
                                        [a] => u16::from(*a),
                                        _ => 0,
                                    })
                                    .collect();
                                for code in lo..=hi {
                                    map.insert(code, String::from_utf16_lossy(&units));
                                    if let Some(last) = units.last_mut() {
                                        *last = last.wrapping_add(1);
                                    }
                                }
                            }
                            i += 3;
                        }
                        CMapToken::ArrayStart => {
                            i += 3;
                            // Entries past `hi` or past u32::MAX are ignored
                            let mut code = Some(lo);
                            while i < tokens.len() {
                                match &tokens[i] {
                                    CMapToken::Hex(dst) => {
                                        if let Some(c) = code.filter(|c| *c <= hi) {
                                            map.insert(c, utf16_text(dst));
                                        }
                                        code = code.and_then(|c| c.checked_add(1));
                                        i += 1;
                                    }
                                    CMapToken::ArrayEnd => {
                                        i += 1;
                                        break;
                                    }
                                    _ => break,
                                }
                            }
                        }
                        _ => break,
                    }
                }
            }
            _ => i += 1,
        }
    }

    map
}
