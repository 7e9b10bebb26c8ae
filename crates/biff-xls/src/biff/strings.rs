//! String decoding for BIFF7 byte strings and BIFF8 Unicode strings.
//!
//! BIFF8 strings ([MS-XLS] 2.5.268, 2.5.293, 2.5.296) may span `CONTINUE` boundaries. When the
//! character data is split, the continued fragment starts with a fresh option-flags byte that
//! says whether the remaining characters are compressed (8-bit) or UTF-16LE. [`FragmentCursor`]
//! reads across those boundaries; a contiguous payload is just a cursor with one fragment.
//!
//! Compressed BIFF8 characters are the low bytes of UTF-16 code units, so only BIFF7 byte
//! strings go through the workbook codepage.

use std::collections::BTreeSet;
use std::sync::{Mutex, OnceLock};

use encoding_rs::{
    Encoding, BIG5, EUC_KR, GBK, SHIFT_JIS, UTF_8, WINDOWS_1250, WINDOWS_1251, WINDOWS_1252,
    WINDOWS_1253, WINDOWS_1254, WINDOWS_1255, WINDOWS_1256, WINDOWS_1257, WINDOWS_1258,
    WINDOWS_874,
};

use super::records::LogicalBiffRecord;
use super::BiffVersion;

const STR_FLAG_HIGH_BYTE: u8 = 0x01;
const STR_FLAG_EXT: u8 = 0x04;
const STR_FLAG_RICH_TEXT: u8 = 0x08;

/// Codepage that means "UTF-16" in a CODEPAGE record; 8-bit data then falls back to Latin-1.
const CODEPAGE_UTF16: u16 = 1200;

pub(crate) fn encoding_for_codepage(codepage: u16) -> Option<&'static Encoding> {
    Some(match codepage {
        874 => WINDOWS_874,
        932 => SHIFT_JIS,
        936 => GBK,
        949 => EUC_KR,
        950 => BIG5,
        1250 => WINDOWS_1250,
        1251 => WINDOWS_1251,
        1252 => WINDOWS_1252,
        1253 => WINDOWS_1253,
        1254 => WINDOWS_1254,
        1255 => WINDOWS_1255,
        1256 => WINDOWS_1256,
        1257 => WINDOWS_1257,
        1258 => WINDOWS_1258,
        65001 => UTF_8,
        _ => return None,
    })
}

/// Decode 8-bit string bytes using `codepage`.
///
/// Unknown codepages map bytes 1:1 to U+0000..U+00FF so ASCII survives and nothing is lost.
pub(crate) fn decode_ansi(codepage: u16, bytes: &[u8]) -> String {
    if let Some(encoding) = encoding_for_codepage(codepage) {
        let (cow, _, _) = encoding.decode(bytes);
        return cow.into_owned();
    }
    if codepage != CODEPAGE_UTF16 {
        warn_unsupported_codepage(codepage);
    }
    latin1(bytes)
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().copied().map(char::from).collect()
}

fn warn_unsupported_codepage(codepage: u16) {
    static WARNED: OnceLock<Mutex<BTreeSet<u16>>> = OnceLock::new();

    let warned = WARNED.get_or_init(|| Mutex::new(BTreeSet::new()));
    let mut warned = match warned.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if warned.insert(codepage) {
        log::warn!("unsupported CODEPAGE {codepage}; decoding 8-bit strings as Latin-1");
    }
}

fn decode_utf16le(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// Width of a string's character-count prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CchWidth {
    U8,
    U16,
}

/// Parse a version-appropriate "short" string (8-bit length): a BIFF7 byte string or a BIFF8
/// `ShortXLUnicodeString`. Returns the string and the number of bytes consumed.
pub(crate) fn parse_short_string(
    input: &[u8],
    version: BiffVersion,
    codepage: u16,
) -> Result<(String, usize), String> {
    match version {
        BiffVersion::Biff7 => parse_byte_string(input, CchWidth::U8, codepage),
        BiffVersion::Biff8 => {
            let mut cursor = FragmentCursor::single(input);
            let value = cursor.read_biff8_string(CchWidth::U8)?;
            Ok((value, cursor.position()))
        }
    }
}

/// Parse a version-appropriate string with a 16-bit length: a BIFF7 byte string or a BIFF8
/// `XLUnicodeString`.
pub(crate) fn parse_string(
    input: &[u8],
    version: BiffVersion,
    codepage: u16,
) -> Result<(String, usize), String> {
    match version {
        BiffVersion::Biff7 => parse_byte_string(input, CchWidth::U16, codepage),
        BiffVersion::Biff8 => {
            let mut cursor = FragmentCursor::single(input);
            let value = cursor.read_biff8_string(CchWidth::U16)?;
            Ok((value, cursor.position()))
        }
    }
}

/// BIFF7 byte string: length prefix followed by codepage bytes.
pub(crate) fn parse_byte_string(
    input: &[u8],
    width: CchWidth,
    codepage: u16,
) -> Result<(String, usize), String> {
    let (cch, start) = match width {
        CchWidth::U8 => (*input.first().ok_or("unexpected end of string")? as usize, 1),
        CchWidth::U16 => {
            let bytes = input.get(0..2).ok_or("unexpected end of string")?;
            (u16::from_le_bytes([bytes[0], bytes[1]]) as usize, 2)
        }
    };
    let end = start + cch;
    let bytes = input.get(start..end).ok_or("unexpected end of string")?;
    Ok((decode_ansi(codepage, bytes), end))
}

/// Cursor over the physical fragments of a logical record.
///
/// Plain reads cross fragment boundaries transparently. BIFF8 character data goes through
/// [`FragmentCursor::read_biff8_chars`], which consumes the option-flags byte that starts each
/// continued fragment.
pub(crate) struct FragmentCursor<'a> {
    fragments: Vec<&'a [u8]>,
    frag_idx: usize,
    offset: usize,
    /// Total bytes in fragments before `frag_idx`.
    base: usize,
}

impl<'a> FragmentCursor<'a> {
    pub(crate) fn new(fragments: Vec<&'a [u8]>) -> Self {
        Self {
            fragments,
            frag_idx: 0,
            offset: 0,
            base: 0,
        }
    }

    pub(crate) fn single(data: &'a [u8]) -> Self {
        Self::new(vec![data])
    }

    pub(crate) fn from_record(record: &'a LogicalBiffRecord<'_>) -> Self {
        Self::new(record.fragments().collect())
    }

    /// Offset into the joined payload.
    pub(crate) fn position(&self) -> usize {
        self.base + self.offset
    }

    fn remaining_in_fragment(&self) -> usize {
        self.fragments
            .get(self.frag_idx)
            .map(|f| f.len().saturating_sub(self.offset))
            .unwrap_or(0)
    }

    fn advance_fragment(&mut self) -> Result<(), String> {
        let current = self
            .fragments
            .get(self.frag_idx)
            .ok_or("unexpected end of record")?;
        self.base += current.len();
        self.frag_idx += 1;
        self.offset = 0;
        if self.frag_idx >= self.fragments.len() {
            return Err("unexpected end of record".to_string());
        }
        Ok(())
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, String> {
        loop {
            let frag = self
                .fragments
                .get(self.frag_idx)
                .ok_or("unexpected end of record")?;
            if let Some(&b) = frag.get(self.offset) {
                self.offset += 1;
                return Ok(b);
            }
            self.advance_fragment()?;
        }
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, String> {
        Ok(u16::from_le_bytes([self.read_u8()?, self.read_u8()?]))
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, String> {
        Ok(u32::from_le_bytes([
            self.read_u8()?,
            self.read_u8()?,
            self.read_u8()?,
            self.read_u8()?,
        ]))
    }

    /// Skip `n` bytes of non-character data (no flag bytes at boundaries).
    pub(crate) fn skip(&mut self, mut n: usize) -> Result<(), String> {
        while n > 0 {
            let available = self.remaining_in_fragment();
            if available == 0 {
                self.advance_fragment()?;
                continue;
            }
            let take = n.min(available);
            self.offset += take;
            n -= take;
        }
        Ok(())
    }

    /// Read `cch` characters, starting compressed or UTF-16 per `high_byte`.
    pub(crate) fn read_biff8_chars(&mut self, cch: usize, mut high_byte: bool) -> Result<String, String> {
        let mut out = String::new();
        let mut remaining = cch;
        while remaining > 0 {
            if self.remaining_in_fragment() == 0 {
                self.advance_fragment()?;
                let flags = self.read_u8()?;
                high_byte = flags & STR_FLAG_HIGH_BYTE != 0;
                continue;
            }

            let bytes_per_char = if high_byte { 2 } else { 1 };
            let available = self.remaining_in_fragment() / bytes_per_char;
            if available == 0 {
                return Err("string continuation split mid-character".to_string());
            }
            let take = remaining.min(available);
            let start = self.offset;
            let end = start + take * bytes_per_char;
            let bytes = &self.fragments[self.frag_idx][start..end];
            self.offset = end;

            if high_byte {
                out.push_str(&decode_utf16le(bytes));
            } else {
                out.push_str(&latin1(bytes));
            }
            remaining -= take;
        }
        Ok(out)
    }

    /// Read an option-flags byte and then `cch` characters (e.g. the name in a NAME record).
    pub(crate) fn read_biff8_flagged_chars(&mut self, cch: usize) -> Result<String, String> {
        let flags = self.read_u8()?;
        self.read_biff8_chars(cch, flags & STR_FLAG_HIGH_BYTE != 0)
    }

    /// Read a full BIFF8 string: length, flags, optional rich-run and ext sizes, characters, then
    /// skip the rich-run and ext payloads.
    pub(crate) fn read_biff8_string(&mut self, width: CchWidth) -> Result<String, String> {
        let cch = match width {
            CchWidth::U8 => self.read_u8()? as usize,
            CchWidth::U16 => self.read_u16()? as usize,
        };
        let flags = self.read_u8()?;
        let runs = if flags & STR_FLAG_RICH_TEXT != 0 {
            self.read_u16()? as usize
        } else {
            0
        };
        let ext = if flags & STR_FLAG_EXT != 0 {
            self.read_u32()? as usize
        } else {
            0
        };
        let value = self.read_biff8_chars(cch, flags & STR_FLAG_HIGH_BYTE != 0)?;
        self.skip(runs * 4)?;
        self.skip(ext)?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decodes_compressed_and_utf16_strings() {
        let compressed = [3, 0, 0, b'a', b'b', b'c', 0xEE];
        assert_eq!(
            parse_string(&compressed, BiffVersion::Biff8, 1252).unwrap(),
            ("abc".to_string(), 6)
        );

        let utf16 = [2, 0, STR_FLAG_HIGH_BYTE, 0x3B, 0x04, 0x30, 0x00];
        assert_eq!(
            parse_string(&utf16, BiffVersion::Biff8, 1252).unwrap(),
            ("\u{043B}0".to_string(), 7)
        );
    }

    #[test]
    fn skips_rich_runs_and_ext_payloads() {
        let mut input = vec![2, 0, STR_FLAG_RICH_TEXT | STR_FLAG_EXT];
        input.extend_from_slice(&1u16.to_le_bytes());
        input.extend_from_slice(&3u32.to_le_bytes());
        input.extend_from_slice(b"hi");
        input.extend_from_slice(&[0; 4]);
        input.extend_from_slice(&[0; 3]);
        let (value, consumed) = parse_string(&input, BiffVersion::Biff8, 1252).unwrap();
        assert_eq!(value, "hi");
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn biff7_strings_use_the_codepage() {
        let input = [2, 0xC0, 0xE9];
        let (value, consumed) = parse_short_string(&input, BiffVersion::Biff7, 1251).unwrap();
        assert_eq!(value, "Ай");
        assert_eq!(consumed, 3);

        let input = [1, 0, 0xE9];
        let (value, _) = parse_string(&input, BiffVersion::Biff7, 1252).unwrap();
        assert_eq!(value, "é");
    }

    #[test]
    fn unsupported_codepages_fall_back_to_latin1() {
        assert_eq!(decode_ansi(12345, &[b'A', 0xE9]), "Aé");
    }

    #[test]
    fn continued_character_data_switches_encoding_at_boundaries() {
        // "ab" compressed, then a continued fragment that re-declares UTF-16 for "cd".
        let first = [4u8, 0, 0, b'a', b'b'];
        let second = [STR_FLAG_HIGH_BYTE, b'c', 0, b'd', 0];
        let mut cursor = FragmentCursor::new(vec![&first, &second]);
        let value = cursor.read_biff8_string(CchWidth::U16).unwrap();
        assert_eq!(value, "abcd");
        assert_eq!(cursor.position(), first.len() + second.len());
    }

    #[test]
    fn plain_reads_do_not_consume_flag_bytes() {
        let first = [0x34u8];
        let second = [0x12u8, 0xFF];
        let mut cursor = FragmentCursor::new(vec![&first, &second]);
        assert_eq!(cursor.read_u16().unwrap(), 0x1234);
        assert_eq!(cursor.read_u8().unwrap(), 0xFF);
        assert!(cursor.read_u8().is_err());
    }

    #[test]
    fn truncated_strings_are_errors() {
        assert!(parse_string(&[5, 0, 0, b'a'], BiffVersion::Biff8, 1252).is_err());
        assert!(parse_short_string(&[3, b'a'], BiffVersion::Biff7, 1252).is_err());
    }
}
