#![allow(dead_code)]

// Writes just enough of a workbook stream to exercise the decoder. Record ids are named so the
// fixtures stay readable.
pub const RECORD_BOF: u16 = 0x0809;
pub const RECORD_EOF: u16 = 0x000A;
pub const RECORD_CONTINUE: u16 = 0x003C;
pub const RECORD_CODEPAGE: u16 = 0x0042;
pub const RECORD_DATEMODE: u16 = 0x0022;
pub const RECORD_BOUNDSHEET: u16 = 0x0085;
pub const RECORD_SST: u16 = 0x00FC;
pub const RECORD_XF: u16 = 0x00E0;
pub const RECORD_FORMAT: u16 = 0x041E;
pub const RECORD_SUPBOOK: u16 = 0x01AE;
pub const RECORD_EXTERNSHEET: u16 = 0x0017;
pub const RECORD_NAME: u16 = 0x0018;
pub const RECORD_WINDOW1: u16 = 0x003D;

pub const RECORD_DIMENSIONS: u16 = 0x0200;
pub const RECORD_ROW: u16 = 0x0208;
pub const RECORD_COLINFO: u16 = 0x007D;
pub const RECORD_MERGEDCELLS: u16 = 0x00E5;
pub const RECORD_WSBOOL: u16 = 0x0081;
pub const RECORD_BLANK: u16 = 0x0201;
pub const RECORD_NUMBER: u16 = 0x0203;
pub const RECORD_LABEL: u16 = 0x0204;
pub const RECORD_BOOLERR: u16 = 0x0205;
pub const RECORD_RK: u16 = 0x027E;
pub const RECORD_MULRK: u16 = 0x00BD;
pub const RECORD_LABELSST: u16 = 0x00FD;
pub const RECORD_FORMULA: u16 = 0x0006;
pub const RECORD_STRING: u16 = 0x0207;
pub const RECORD_SHRFMLA: u16 = 0x04BC;
pub const RECORD_ARRAY: u16 = 0x0221;

const BOF_VERSION_BIFF8: u16 = 0x0600;
const BOF_VERSION_BIFF7: u16 = 0x0500;
const BOF_DT_GLOBALS: u16 = 0x0005;
const BOF_DT_WORKSHEET: u16 = 0x0010;
const BOF_DT_CHART: u16 = 0x0020;

const FORMULA_FLAG_SHARED: u16 = 0x0008;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Biff7,
    Biff8,
}

impl Version {
    fn bof_version(self) -> u16 {
        match self {
            Version::Biff7 => BOF_VERSION_BIFF7,
            Version::Biff8 => BOF_VERSION_BIFF8,
        }
    }
}

pub fn record(id: u16, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

fn bof(version: Version, dt: u16) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&version.bof_version().to_le_bytes());
    payload.extend_from_slice(&dt.to_le_bytes());
    // rupBuild, rupYear, bfh, sfo (BIFF8 only, harmless for BIFF7 readers of this decoder).
    payload.extend_from_slice(&0x0DBBu16.to_le_bytes());
    payload.extend_from_slice(&0x07CCu16.to_le_bytes());
    payload.extend_from_slice(&[0u8; 8]);
    record(RECORD_BOF, &payload)
}

pub fn eof() -> Vec<u8> {
    record(RECORD_EOF, &[])
}

/// Compressed (8-bit) BIFF8 `XLUnicodeString` with a 16-bit length.
pub fn xl_string(s: &str) -> Vec<u8> {
    let mut out = (s.len() as u16).to_le_bytes().to_vec();
    out.push(0);
    out.extend_from_slice(s.as_bytes());
    out
}

/// `ShortXLUnicodeString` (BIFF8) or a byte string with an 8-bit length (BIFF7).
fn short_string(version: Version, s: &str) -> Vec<u8> {
    let mut out = vec![s.len() as u8];
    if version == Version::Biff8 {
        out.push(0);
    }
    out.extend_from_slice(s.as_bytes());
    out
}

fn cell_header(row: u16, col: u16, xf: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(6);
    out.extend_from_slice(&row.to_le_bytes());
    out.extend_from_slice(&col.to_le_bytes());
    out.extend_from_slice(&xf.to_le_bytes());
    out
}

pub fn sst(strings: &[&str]) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&(strings.len() as u32).to_le_bytes());
    payload.extend_from_slice(&(strings.len() as u32).to_le_bytes());
    for s in strings {
        payload.extend_from_slice(&xl_string(s));
    }
    record(RECORD_SST, &payload)
}

/// Minimal cell XF pointing at number format `ifmt`.
pub fn xf(ifmt: u16) -> Vec<u8> {
    let mut payload = vec![0u8; 20];
    payload[2..4].copy_from_slice(&ifmt.to_le_bytes());
    record(RECORD_XF, &payload)
}

pub fn format(ifmt: u16, code: &str) -> Vec<u8> {
    let mut payload = ifmt.to_le_bytes().to_vec();
    payload.extend_from_slice(&xl_string(code));
    record(RECORD_FORMAT, &payload)
}

pub fn datemode(flag: u16) -> Vec<u8> {
    record(RECORD_DATEMODE, &flag.to_le_bytes())
}

fn boundsheet(version: Version, offset: u32, hidden: u8, name: &str) -> Vec<u8> {
    let mut payload = offset.to_le_bytes().to_vec();
    payload.push(hidden);
    payload.push(0x00);
    payload.extend_from_slice(&short_string(version, name));
    record(RECORD_BOUNDSHEET, &payload)
}

pub fn dimensions(first_row: u32, last_row: u32, first_col: u16, last_col: u16) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&first_row.to_le_bytes());
    payload.extend_from_slice(&last_row.to_le_bytes());
    payload.extend_from_slice(&first_col.to_le_bytes());
    payload.extend_from_slice(&last_col.to_le_bytes());
    payload.extend_from_slice(&[0, 0]);
    record(RECORD_DIMENSIONS, &payload)
}

/// `ROW` with an explicit height and option bits (`0x20` collapsed).
pub fn row(index: u16, height: u16, options: u32) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&index.to_le_bytes());
    payload.extend_from_slice(&[0, 0, 0, 0]);
    payload.extend_from_slice(&height.to_le_bytes());
    payload.extend_from_slice(&[0, 0, 0, 0]);
    payload.extend_from_slice(&options.to_le_bytes());
    record(RECORD_ROW, &payload)
}

pub fn colinfo(first: u16, last: u16, width: u16, options: u16) -> Vec<u8> {
    let mut payload = Vec::new();
    for field in [first, last, width, 0, options, 0] {
        payload.extend_from_slice(&field.to_le_bytes());
    }
    record(RECORD_COLINFO, &payload)
}

pub fn merged_cells(ranges: &[(u16, u16, u16, u16)]) -> Vec<u8> {
    let mut payload = (ranges.len() as u16).to_le_bytes().to_vec();
    for &(rw_first, rw_last, col_first, col_last) in ranges {
        for field in [rw_first, rw_last, col_first, col_last] {
            payload.extend_from_slice(&field.to_le_bytes());
        }
    }
    record(RECORD_MERGEDCELLS, &payload)
}

pub fn number(row: u16, col: u16, xf: u16, value: f64) -> Vec<u8> {
    let mut payload = cell_header(row, col, xf);
    payload.extend_from_slice(&value.to_le_bytes());
    record(RECORD_NUMBER, &payload)
}

pub fn labelsst(row: u16, col: u16, xf: u16, index: u32) -> Vec<u8> {
    let mut payload = cell_header(row, col, xf);
    payload.extend_from_slice(&index.to_le_bytes());
    record(RECORD_LABELSST, &payload)
}

/// `LABEL` with an inline string in the layout of `version`.
pub fn label(version: Version, row: u16, col: u16, text: &str) -> Vec<u8> {
    let mut payload = cell_header(row, col, 0);
    match version {
        Version::Biff8 => payload.extend_from_slice(&xl_string(text)),
        Version::Biff7 => {
            payload.extend_from_slice(&(text.len() as u16).to_le_bytes());
            payload.extend_from_slice(text.as_bytes());
        }
    }
    record(RECORD_LABEL, &payload)
}

pub fn boolerr(row: u16, col: u16, value: u8, is_error: bool) -> Vec<u8> {
    let mut payload = cell_header(row, col, 0);
    payload.push(value);
    payload.push(u8::from(is_error));
    record(RECORD_BOOLERR, &payload)
}

pub fn blank(row: u16, col: u16) -> Vec<u8> {
    record(RECORD_BLANK, &cell_header(row, col, 0))
}

/// `MULRK` holding raw RK values for consecutive columns starting at `first_col`.
pub fn mulrk(row: u16, first_col: u16, rks: &[u32]) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&row.to_le_bytes());
    payload.extend_from_slice(&first_col.to_le_bytes());
    for rk in rks {
        payload.extend_from_slice(&0u16.to_le_bytes());
        payload.extend_from_slice(&rk.to_le_bytes());
    }
    let last_col = first_col + rks.len() as u16 - 1;
    payload.extend_from_slice(&last_col.to_le_bytes());
    record(RECORD_MULRK, &payload)
}

/// RK encoding of a small integer.
pub fn rk_int(value: i32) -> u32 {
    ((value << 2) as u32) | 0x02
}

/// The 8 result bytes of a FORMULA record.
pub enum FormulaValue {
    Number(f64),
    String,
    Bool(bool),
    Error(u8),
    EmptyString,
}

impl FormulaValue {
    fn bytes(&self) -> [u8; 8] {
        let special = |kind: u8, value: u8| [kind, 0, value, 0, 0, 0, 0xFF, 0xFF];
        match self {
            FormulaValue::Number(n) => n.to_le_bytes(),
            FormulaValue::String => special(0x00, 0),
            FormulaValue::Bool(b) => special(0x01, u8::from(*b)),
            FormulaValue::Error(code) => special(0x02, *code),
            FormulaValue::EmptyString => special(0x03, 0),
        }
    }
}

pub fn formula(row: u16, col: u16, xf: u16, value: FormulaValue, rgce: &[u8]) -> Vec<u8> {
    formula_with_flags(row, col, xf, value, 0, rgce)
}

fn formula_with_flags(
    row: u16,
    col: u16,
    xf: u16,
    value: FormulaValue,
    flags: u16,
    rgce: &[u8],
) -> Vec<u8> {
    let mut payload = cell_header(row, col, xf);
    payload.extend_from_slice(&value.bytes());
    payload.extend_from_slice(&flags.to_le_bytes());
    payload.extend_from_slice(&0u32.to_le_bytes());
    payload.extend_from_slice(&(rgce.len() as u16).to_le_bytes());
    payload.extend_from_slice(rgce);
    record(RECORD_FORMULA, &payload)
}

/// A shared-formula participant: its program is `PtgExp` naming the anchor.
pub fn shared_participant(row: u16, col: u16, anchor: (u16, u16), value: f64) -> Vec<u8> {
    shared_participant_with_xf(row, col, 0, anchor, value)
}

pub fn shared_participant_with_xf(
    row: u16,
    col: u16,
    xf: u16,
    anchor: (u16, u16),
    value: f64,
) -> Vec<u8> {
    formula_with_flags(
        row,
        col,
        xf,
        FormulaValue::Number(value),
        FORMULA_FLAG_SHARED,
        &ptg_exp(anchor.0, anchor.1),
    )
}

pub fn ptg_exp(row: u16, col: u16) -> Vec<u8> {
    let mut out = vec![0x01];
    out.extend_from_slice(&row.to_le_bytes());
    out.extend_from_slice(&col.to_le_bytes());
    out
}

/// `PtgRefN` with both parts relative.
pub fn ptg_ref_n(row_offset: i16, col_offset: i8) -> Vec<u8> {
    let mut out = vec![0x2C];
    out.extend_from_slice(&row_offset.to_le_bytes());
    out.push(col_offset as u8);
    out.push(0xC0);
    out
}

/// `PtgRef` with both parts relative.
pub fn ptg_ref(row: u16, col: u8) -> Vec<u8> {
    let mut out = vec![0x24];
    out.extend_from_slice(&row.to_le_bytes());
    out.push(col);
    out.push(0xC0);
    out
}

pub fn ptg_int(value: u16) -> Vec<u8> {
    let mut out = vec![0x1E];
    out.extend_from_slice(&value.to_le_bytes());
    out
}

pub const PTG_ADD: u8 = 0x03;

pub fn shrfmla(range: (u16, u16, u8, u8), rgce: &[u8]) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&range.0.to_le_bytes());
    payload.extend_from_slice(&range.1.to_le_bytes());
    payload.extend_from_slice(&[range.2, range.3, 0, 1]);
    payload.extend_from_slice(&(rgce.len() as u16).to_le_bytes());
    payload.extend_from_slice(rgce);
    record(RECORD_SHRFMLA, &payload)
}

pub fn array(range: (u16, u16, u8, u8), rgce: &[u8]) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&range.0.to_le_bytes());
    payload.extend_from_slice(&range.1.to_le_bytes());
    payload.extend_from_slice(&[range.2, range.3]);
    payload.extend_from_slice(&0u16.to_le_bytes());
    payload.extend_from_slice(&0u32.to_le_bytes());
    payload.extend_from_slice(&(rgce.len() as u16).to_le_bytes());
    payload.extend_from_slice(rgce);
    record(RECORD_ARRAY, &payload)
}

/// `SUPBOOK` for the workbook's own sheets.
pub fn supbook_internal(sheet_count: u16) -> Vec<u8> {
    let mut payload = sheet_count.to_le_bytes().to_vec();
    payload.extend_from_slice(&[0x01, 0x04]);
    record(RECORD_SUPBOOK, &payload)
}

/// `EXTERNSHEET` with `(iSupBook, itabFirst, itabLast)` entries.
pub fn externsheet(entries: &[(u16, i16, i16)]) -> Vec<u8> {
    let mut payload = (entries.len() as u16).to_le_bytes().to_vec();
    for &(supbook, first, last) in entries {
        payload.extend_from_slice(&supbook.to_le_bytes());
        payload.extend_from_slice(&first.to_le_bytes());
        payload.extend_from_slice(&last.to_le_bytes());
    }
    record(RECORD_EXTERNSHEET, &payload)
}

/// Workbook-scoped BIFF8 `NAME` with a compressed name.
pub fn defined_name(name: &str, rgce: &[u8]) -> Vec<u8> {
    let mut payload = 0u16.to_le_bytes().to_vec();
    payload.push(0);
    payload.push(name.len() as u8);
    payload.extend_from_slice(&(rgce.len() as u16).to_le_bytes());
    payload.extend_from_slice(&0u16.to_le_bytes());
    payload.extend_from_slice(&0u16.to_le_bytes());
    payload.extend_from_slice(&[0; 4]);
    payload.push(0);
    payload.extend_from_slice(name.as_bytes());
    payload.extend_from_slice(rgce);
    record(RECORD_NAME, &payload)
}

/// `PtgRef3d` with absolute row and column.
pub fn ptg_ref3d(ixti: u16, row: u16, col: u8) -> Vec<u8> {
    let mut out = vec![0x3A];
    out.extend_from_slice(&ixti.to_le_bytes());
    out.extend_from_slice(&row.to_le_bytes());
    out.push(col);
    out.push(0x00);
    out
}

pub fn ptg_name(index: u32) -> Vec<u8> {
    let mut out = vec![0x23];
    out.extend_from_slice(&index.to_le_bytes());
    out
}

pub fn string_result(text: &str) -> Vec<u8> {
    record(RECORD_STRING, &xl_string(text))
}

/// A sheet for [`WorkbookBuilder`]: its name, visibility byte and body records (without the
/// surrounding BOF/EOF).
pub struct SheetFixture {
    pub name: String,
    pub hidden: u8,
    pub body: Vec<u8>,
    pub chart: bool,
    /// Leave out the sheet's EOF record.
    pub truncated: bool,
}

impl SheetFixture {
    pub fn new(name: &str, body: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            hidden: 0,
            body,
            chart: false,
            truncated: false,
        }
    }

    pub fn chart(name: &str) -> Self {
        Self {
            chart: true,
            ..Self::new(name, Vec::new())
        }
    }
}

/// Assembles a globals substream plus one substream per sheet, with `BOUNDSHEET` offsets
/// pointing at the real BOF positions.
pub struct WorkbookBuilder {
    version: Version,
    globals: Vec<u8>,
    sheets: Vec<SheetFixture>,
}

impl WorkbookBuilder {
    pub fn new(version: Version) -> Self {
        Self {
            version,
            globals: Vec::new(),
            sheets: Vec::new(),
        }
    }

    pub fn biff8() -> Self {
        Self::new(Version::Biff8)
    }

    pub fn globals_record(mut self, bytes: Vec<u8>) -> Self {
        self.globals.extend(bytes);
        self
    }

    pub fn sheet(mut self, sheet: SheetFixture) -> Self {
        self.sheets.push(sheet);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let globals = |offsets: &[u32]| {
            let mut out = bof(self.version, BOF_DT_GLOBALS);
            out.extend_from_slice(&self.globals);
            for (sheet, offset) in self.sheets.iter().zip(offsets) {
                out.extend(boundsheet(self.version, *offset, sheet.hidden, &sheet.name));
            }
            out.extend(eof());
            out
        };

        // BOUNDSHEET sizes don't depend on the offsets, so one dry run fixes the layout.
        let mut offset = globals(&vec![0; self.sheets.len()]).len();
        let mut offsets = Vec::with_capacity(self.sheets.len());
        let mut substreams = Vec::new();
        for sheet in &self.sheets {
            offsets.push(offset as u32);
            let dt = if sheet.chart {
                BOF_DT_CHART
            } else {
                BOF_DT_WORKSHEET
            };
            let mut substream = bof(self.version, dt);
            substream.extend_from_slice(&sheet.body);
            if !sheet.truncated {
                substream.extend(eof());
            }
            offset += substream.len();
            substreams.push(substream);
        }

        let mut out = globals(&offsets);
        for substream in substreams {
            out.extend(substream);
        }
        out
    }
}

pub fn concat(records: impl IntoIterator<Item = Vec<u8>>) -> Vec<u8> {
    records.into_iter().flatten().collect()
}
