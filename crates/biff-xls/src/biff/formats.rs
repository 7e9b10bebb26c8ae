//! XF (extended format) table and number formats.
//!
//! Cells carry an XF index. The workbook globals hold one `XF` record per index and `FORMAT`
//! records for custom number format codes; built-in codes are implied by their id.

use std::collections::BTreeMap;

use serde::Serialize;

use super::strings;
use super::BiffVersion;

const XF_FLAG_LOCKED: u16 = 0x0001;
const XF_FLAG_HIDDEN: u16 = 0x0002;
const XF_FLAG_STYLE: u16 = 0x0004;
const XF_PARENT_SHIFT: u16 = 4;
/// `ixfParent` value used by style XFs (no parent).
const XF_NO_PARENT: u16 = 0x0FFF;

/// Maps an XF index to its resolved formatting.
pub trait FormattingRegistry {
    /// `None` when `xf` is beyond the table.
    fn resolve(&self, xf: u32) -> Option<ResolvedFormat>;

    /// Number of XF entries; indices `0..xf_count()` resolve.
    fn xf_count(&self) -> usize;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedFormat {
    pub cell_format: CellFormat,
    pub number_format: Option<NumberFormat>,
}

impl ResolvedFormat {
    /// Placeholder for an XF index that doesn't resolve.
    pub fn general(xf: u32) -> Self {
        Self {
            cell_format: CellFormat {
                xf_index: xf,
                font_index: 0,
                locked: true,
                formula_hidden: false,
                is_style: false,
                parent: None,
            },
            number_format: Some(NumberFormat {
                index: 0,
                code: Some("General".to_string()),
                is_date: false,
            }),
        }
    }

    pub fn is_date(&self) -> bool {
        self.number_format.as_ref().is_some_and(|f| f.is_date)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellFormat {
    pub xf_index: u32,
    pub font_index: u16,
    pub locked: bool,
    /// Formula text hidden when the sheet is protected.
    pub formula_hidden: bool,
    pub is_style: bool,
    /// Parent style XF for cell XFs.
    pub parent: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NumberFormat {
    pub index: u16,
    /// `None` for reserved locale-specific ids with no FORMAT record.
    pub code: Option<String>,
    pub is_date: bool,
}

/// Parsed `XF` record ([MS-XLS] 2.4.353); BIFF7 and BIFF8 share the leading fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct XfRecord {
    pub(crate) font_index: u16,
    pub(crate) format_index: u16,
    pub(crate) flags: u16,
}

pub(crate) fn parse_xf(data: &[u8]) -> Result<XfRecord, String> {
    let header = data
        .get(0..6)
        .ok_or_else(|| format!("XF record too short (len={})", data.len()))?;
    Ok(XfRecord {
        font_index: u16::from_le_bytes([header[0], header[1]]),
        format_index: u16::from_le_bytes([header[2], header[3]]),
        flags: u16::from_le_bytes([header[4], header[5]]),
    })
}

/// Parse `FORMAT` ([MS-XLS] 2.4.126): `[ifmt: u16][stFormat]`.
pub(crate) fn parse_format(
    data: &[u8],
    version: BiffVersion,
    codepage: u16,
) -> Result<(u16, String), String> {
    let id = super::read_u16(data, 0).ok_or("FORMAT record too short")?;
    let rest = &data[2..];
    let (code, _) = match version {
        BiffVersion::Biff8 => strings::parse_string(rest, version, codepage)?,
        BiffVersion::Biff7 => strings::parse_short_string(rest, version, codepage)?,
    };
    Ok((id, code))
}

/// XF records plus custom number formats, built from the workbook globals.
#[derive(Debug, Clone, Default)]
pub struct XfTable {
    xfs: Vec<XfRecord>,
    formats: BTreeMap<u16, String>,
}

impl XfTable {
    pub(crate) fn push_xf(&mut self, xf: XfRecord) {
        self.xfs.push(xf);
    }

    pub(crate) fn insert_format(&mut self, id: u16, code: String) {
        self.formats.insert(id, code);
    }

    pub fn len(&self) -> usize {
        self.xfs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xfs.is_empty()
    }

    fn number_format(&self, id: u16) -> Option<NumberFormat> {
        let code = self
            .formats
            .get(&id)
            .cloned()
            .or_else(|| builtin_format_code(id).map(str::to_string));
        let is_date = match &code {
            Some(_) if !self.formats.contains_key(&id) => is_reserved_datetime_format_id(id),
            Some(code) => looks_like_datetime(code),
            None if is_reserved_datetime_format_id(id) => true,
            None => return None,
        };
        Some(NumberFormat {
            index: id,
            code,
            is_date,
        })
    }
}

impl FormattingRegistry for XfTable {
    fn xf_count(&self) -> usize {
        self.xfs.len()
    }

    fn resolve(&self, xf: u32) -> Option<ResolvedFormat> {
        let record = self.xfs.get(xf as usize)?;
        let parent = record.flags >> XF_PARENT_SHIFT;
        Some(ResolvedFormat {
            cell_format: CellFormat {
                xf_index: xf,
                font_index: record.font_index,
                locked: record.flags & XF_FLAG_LOCKED != 0,
                formula_hidden: record.flags & XF_FLAG_HIDDEN != 0,
                is_style: record.flags & XF_FLAG_STYLE != 0,
                parent: (parent != XF_NO_PARENT).then_some(parent),
            },
            number_format: self.number_format(record.format_index),
        })
    }
}

fn builtin_format_code(id: u16) -> Option<&'static str> {
    Some(match id {
        0 => "General",
        1 => "0",
        2 => "0.00",
        3 => "#,##0",
        4 => "#,##0.00",
        5 => "\"$\"#,##0_);(\"$\"#,##0)",
        6 => "\"$\"#,##0_);[Red](\"$\"#,##0)",
        7 => "\"$\"#,##0.00_);(\"$\"#,##0.00)",
        8 => "\"$\"#,##0.00_);[Red](\"$\"#,##0.00)",
        9 => "0%",
        10 => "0.00%",
        11 => "0.00E+00",
        12 => "# ?/?",
        13 => "# ??/??",
        14 => "m/d/yyyy",
        15 => "d-mmm-yy",
        16 => "d-mmm",
        17 => "mmm-yy",
        18 => "h:mm AM/PM",
        19 => "h:mm:ss AM/PM",
        20 => "h:mm",
        21 => "h:mm:ss",
        22 => "m/d/yyyy h:mm",
        37 => "#,##0_);(#,##0)",
        38 => "#,##0_);[Red](#,##0)",
        39 => "#,##0.00_);(#,##0.00)",
        40 => "#,##0.00_);[Red](#,##0.00)",
        41 => "_(* #,##0_);_(* (#,##0);_(* \"-\"_);_(@_)",
        42 => "_(\"$\"* #,##0_);_(\"$\"* (#,##0);_(\"$\"* \"-\"_);_(@_)",
        43 => "_(* #,##0.00_);_(* (#,##0.00);_(* \"-\"??_);_(@_)",
        44 => "_(\"$\"* #,##0.00_);_(\"$\"* (#,##0.00);_(\"$\"* \"-\"??_);_(@_)",
        45 => "mm:ss",
        46 => "[h]:mm:ss",
        47 => "mm:ss.0",
        48 => "##0.0E+0",
        49 => "@",
        _ => return None,
    })
}

fn is_reserved_datetime_format_id(id: u16) -> bool {
    // 14-22 and 45-47 are the standard date/time ids; the others are reserved for
    // locale-specific date formats.
    matches!(id, 14..=22 | 45..=47 | 27..=36 | 50..=58)
}

/// Token heuristic for custom format codes: any unquoted y/d/h/s, an `m` adjacent to one of
/// those, elapsed-time brackets, or an AM/PM marker in the first section.
fn looks_like_datetime(code: &str) -> bool {
    let section = first_section(code);
    let mut in_quotes = false;
    let mut prev: Option<char> = None;
    let mut chars = section.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == '"' {
                in_quotes = false;
            }
            continue;
        }

        match ch {
            '"' => in_quotes = true,
            '\\' | '_' | '*' => {
                chars.next();
            }
            '[' => {
                let mut content = String::new();
                for c in chars.by_ref() {
                    if c == ']' {
                        break;
                    }
                    content.push(c);
                }
                let lower = content.to_ascii_lowercase();
                if matches!(lower.as_str(), "h" | "hh" | "m" | "mm" | "s" | "ss") {
                    return true;
                }
            }
            'y' | 'Y' | 'd' | 'D' | 'h' | 'H' | 's' | 'S' => return true,
            'm' | 'M' => {
                let near_date_token = |c: Option<char>| {
                    matches!(c, Some('y' | 'Y' | 'd' | 'D' | 'h' | 'H' | 's' | 'S' | ':' | '/'))
                };
                if near_date_token(prev) || near_date_token(chars.peek().copied()) {
                    return true;
                }
            }
            'a' | 'A' => {
                let rest: String = std::iter::once(ch).chain(chars.clone().take(4)).collect();
                let rest = rest.to_ascii_lowercase();
                if rest.starts_with("am/pm") || rest.starts_with("a/p") {
                    return true;
                }
            }
            _ => {}
        }
        prev = Some(ch);
    }
    false
}

/// First `;`-separated section, respecting quotes.
fn first_section(code: &str) -> &str {
    let mut in_quotes = false;
    for (i, ch) in code.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => return &code[..i],
            _ => {}
        }
    }
    code
}
