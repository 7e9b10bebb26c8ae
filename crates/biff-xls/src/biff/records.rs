//! Physical and logical BIFF record framing.
//!
//! A physical record is `[id: u16][len: u16][data: len bytes]`. A `CONTINUE` record extends the
//! payload of the record before it; [`RecordStream`] joins those fragments into one logical
//! record and keeps the fragment sizes so string decoders can find the continuation boundaries.

use std::borrow::Cow;

use crate::BiffError;

/// BIFF `CONTINUE` record id.
pub(crate) const RECORD_CONTINUE: u16 = 0x003C;
/// BIFF `EOF` record id.
pub(crate) const RECORD_EOF: u16 = 0x000A;
/// BIFF8 `BOF` record id.
pub(crate) const RECORD_BOF_BIFF8: u16 = 0x0809;
/// Pre-BIFF8 `BOF` record id.
pub(crate) const RECORD_BOF_BIFF7: u16 = 0x0009;

// Caps for coalescing `CONTINUE` runs, so a crafted stream cannot force unbounded allocation.
#[cfg(not(test))]
pub(crate) const MAX_LOGICAL_RECORD_BYTES: usize = 16 * 1024 * 1024;
#[cfg(test)]
pub(crate) const MAX_LOGICAL_RECORD_BYTES: usize = 1024;

#[cfg(not(test))]
pub(crate) const MAX_LOGICAL_RECORD_FRAGMENTS: usize = 4096;
#[cfg(test)]
pub(crate) const MAX_LOGICAL_RECORD_FRAGMENTS: usize = 64;

pub(crate) fn is_bof_record(record_id: u16) -> bool {
    record_id == RECORD_BOF_BIFF8 || record_id == RECORD_BOF_BIFF7
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PhysicalRecord<'a> {
    /// Offset of the record header in the parent stream.
    pub(crate) offset: usize,
    pub(crate) record_id: u16,
    pub(crate) data: &'a [u8],
}

impl PhysicalRecord<'_> {
    /// Offset of the record that follows this one.
    pub(crate) fn end(&self) -> usize {
        self.offset + 4 + self.data.len()
    }
}

/// Iterator over physical records.
///
/// A truncated header or a payload running past the end of the stream yields one
/// `FormatCorrupt` error and ends iteration.
#[derive(Debug, Clone)]
pub(crate) struct PhysicalRecordIter<'a> {
    stream: &'a [u8],
    offset: usize,
}

impl<'a> PhysicalRecordIter<'a> {
    pub(crate) fn from_offset(stream: &'a [u8], offset: usize) -> Result<Self, BiffError> {
        if offset > stream.len() {
            return Err(BiffError::FormatCorrupt {
                offset,
                record_id: None,
                message: format!("record offset out of bounds (len={})", stream.len()),
            });
        }
        Ok(Self { stream, offset })
    }

    pub(crate) fn position(&self) -> usize {
        self.offset
    }

    fn fail(&mut self, record_id: Option<u16>, message: String) -> Option<Result<PhysicalRecord<'a>, BiffError>> {
        let offset = self.offset;
        self.offset = self.stream.len();
        Some(Err(BiffError::FormatCorrupt {
            offset,
            record_id,
            message,
        }))
    }
}

impl<'a> Iterator for PhysicalRecordIter<'a> {
    type Item = Result<PhysicalRecord<'a>, BiffError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.stream.len() {
            return None;
        }

        let Some(header) = self
            .offset
            .checked_add(4)
            .and_then(|end| self.stream.get(self.offset..end))
        else {
            return self.fail(None, "truncated record header".to_string());
        };
        let record_id = u16::from_le_bytes([header[0], header[1]]);
        let len = u16::from_le_bytes([header[2], header[3]]) as usize;

        let data_start = self.offset + 4;
        let data_end = data_start + len;
        let Some(data) = self.stream.get(data_start..data_end) else {
            let message = format!(
                "record length {len} extends past end of stream (len={})",
                self.stream.len()
            );
            return self.fail(Some(record_id), message);
        };

        let offset = self.offset;
        self.offset = data_end;
        Some(Ok(PhysicalRecord {
            offset,
            record_id,
            data,
        }))
    }
}

/// A record with any trailing `CONTINUE` fragments joined onto its payload.
#[derive(Debug, Clone)]
pub(crate) struct LogicalBiffRecord<'a> {
    /// Offset of the first physical record header.
    pub(crate) offset: usize,
    pub(crate) record_id: u16,
    pub(crate) data: Cow<'a, [u8]>,
    /// Size of each physical fragment, in `data` order.
    pub(crate) fragment_sizes: Vec<usize>,
    /// Offset of the first record after the last fragment.
    pub(crate) next_offset: usize,
}

impl<'a> LogicalBiffRecord<'a> {
    pub(crate) fn fragments(&self) -> FragmentIter<'_> {
        FragmentIter {
            data: self.data.as_ref(),
            sizes: &self.fragment_sizes,
            idx: 0,
            offset: 0,
        }
    }

    pub(crate) fn corrupt(&self, message: impl Into<String>) -> BiffError {
        BiffError::corrupt(self.offset, self.record_id, message)
    }
}

pub(crate) struct FragmentIter<'a> {
    data: &'a [u8],
    sizes: &'a [usize],
    idx: usize,
    offset: usize,
}

impl<'a> Iterator for FragmentIter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let size = *self.sizes.get(self.idx)?;
        let start = self.offset;
        let end = start.checked_add(size)?;
        let out = self.data.get(start..end)?;
        self.idx += 1;
        self.offset = end;
        Some(out)
    }
}

/// Sequential reader of logical records with an explicit byte position.
///
/// Every record id absorbs the `CONTINUE` records that follow it. A stream is cheap to clone,
/// and [`RecordStream::at`] opens an independent cursor over the same bytes, so a forward
/// re-scan never disturbs the primary pass.
#[derive(Debug, Clone)]
pub(crate) struct RecordStream<'a> {
    iter: PhysicalRecordIter<'a>,
    finished: bool,
}

impl<'a> RecordStream<'a> {
    pub(crate) fn new(stream: &'a [u8]) -> Self {
        Self {
            iter: PhysicalRecordIter { stream, offset: 0 },
            finished: false,
        }
    }

    /// Open a cursor positioned at `offset`, which must be a record boundary.
    pub(crate) fn at(stream: &'a [u8], offset: usize) -> Result<Self, BiffError> {
        let iter = PhysicalRecordIter::from_offset(stream, offset).map_err(|_| {
            BiffError::StreamCorrupt {
                offset,
                message: format!("position is past the end of the stream (len={})", stream.len()),
            }
        })?;
        Ok(Self {
            iter,
            finished: false,
        })
    }

    /// Byte offset of the next record this stream will yield.
    pub(crate) fn position(&self) -> usize {
        self.iter.position()
    }

    fn peek_is_continue(&self) -> bool {
        matches!(
            self.iter.clone().next(),
            Some(Ok(PhysicalRecord {
                record_id: RECORD_CONTINUE,
                ..
            }))
        )
    }
}

impl<'a> Iterator for RecordStream<'a> {
    type Item = Result<LogicalBiffRecord<'a>, BiffError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let first = match self.iter.next()? {
            Ok(record) => record,
            Err(err) => {
                self.finished = true;
                return Some(Err(err));
            }
        };

        // Only copy when a CONTINUE record actually follows.
        if !self.peek_is_continue() {
            return Some(Ok(LogicalBiffRecord {
                offset: first.offset,
                record_id: first.record_id,
                data: Cow::Borrowed(first.data),
                fragment_sizes: vec![first.data.len()],
                next_offset: first.end(),
            }));
        }

        let mut fragment_sizes = vec![first.data.len()];
        let mut combined = first.data.to_vec();
        let mut next_offset = first.end();

        while self.peek_is_continue() {
            let next = match self.iter.next() {
                Some(Ok(record)) => record,
                Some(Err(err)) => {
                    self.finished = true;
                    return Some(Err(err));
                }
                None => break,
            };

            if combined.len().saturating_add(next.data.len()) > MAX_LOGICAL_RECORD_BYTES {
                self.finished = true;
                return Some(Err(BiffError::corrupt(
                    first.offset,
                    first.record_id,
                    format!("continued record exceeds {MAX_LOGICAL_RECORD_BYTES} bytes"),
                )));
            }
            if fragment_sizes.len() >= MAX_LOGICAL_RECORD_FRAGMENTS {
                self.finished = true;
                return Some(Err(BiffError::corrupt(
                    first.offset,
                    first.record_id,
                    format!("continued record exceeds {MAX_LOGICAL_RECORD_FRAGMENTS} fragments"),
                )));
            }

            fragment_sizes.push(next.data.len());
            combined.extend_from_slice(next.data);
            next_offset = next.end();
        }

        Some(Ok(LogicalBiffRecord {
            offset: first.offset,
            record_id: first.record_id,
            data: Cow::Owned(combined),
            fragment_sizes,
            next_offset,
        }))
    }
}

/// Find the offset of the first BOF header at or after `offset`, walking physical records.
///
/// Returns `None` when the stream ends or its framing breaks before another BOF.
pub(crate) fn find_next_bof(stream: &[u8], offset: usize) -> Option<usize> {
    let iter = PhysicalRecordIter::from_offset(stream, offset).ok()?;
    for record in iter {
        let record = record.ok()?;
        if is_bof_record(record.record_id) {
            return Some(record.offset);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biff::test_util::record;
    use pretty_assertions::assert_eq;

    #[test]
    fn iterates_physical_records_with_bounds_checks() {
        let stream = [record(0x0001, &[1, 2, 3]), record(0x0002, &[4])].concat();
        let mut iter = PhysicalRecordIter::from_offset(&stream, 0).unwrap();

        let r1 = iter.next().unwrap().unwrap();
        assert_eq!(r1.offset, 0);
        assert_eq!(r1.record_id, 0x0001);
        assert_eq!(r1.data, &[1, 2, 3]);
        assert_eq!(r1.end(), 7);

        let r2 = iter.next().unwrap().unwrap();
        assert_eq!(r2.record_id, 0x0002);
        assert_eq!(r2.data, &[4]);
        assert!(iter.next().is_none());
    }

    #[test]
    fn truncated_header_is_format_corrupt() {
        let stream = vec![0x01, 0x02, 0x03];
        let mut iter = PhysicalRecordIter::from_offset(&stream, 0).unwrap();
        let err = iter.next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            BiffError::FormatCorrupt {
                offset: 0,
                record_id: None,
                ..
            }
        ));
        assert!(iter.next().is_none());
    }

    #[test]
    fn declared_length_is_verified_against_the_stream() {
        let mut stream = record(0x0001, &[9]);
        stream.extend_from_slice(&0x0203u16.to_le_bytes());
        stream.extend_from_slice(&14u16.to_le_bytes());
        stream.extend_from_slice(&[1, 2]);

        let mut iter = RecordStream::new(&stream);
        assert_eq!(iter.next().unwrap().unwrap().record_id, 0x0001);
        let err = iter.next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            BiffError::FormatCorrupt {
                offset: 5,
                record_id: Some(0x0203),
                ..
            }
        ));
        assert!(iter.next().is_none());
    }

    #[test]
    fn coalesces_continue_fragments_and_tracks_position() {
        let stream = [
            record(0x00AA, &[1, 2]),
            record(RECORD_CONTINUE, &[3]),
            record(RECORD_CONTINUE, &[4, 5]),
            record(0x00BB, &[9]),
        ]
        .concat();

        let mut iter = RecordStream::new(&stream);
        let first = iter.next().unwrap().unwrap();
        assert_eq!(first.record_id, 0x00AA);
        assert_eq!(first.data.as_ref(), &[1, 2, 3, 4, 5]);
        assert_eq!(first.fragment_sizes, vec![2, 1, 2]);
        assert_eq!(iter.position(), first.next_offset);
        let fragments: Vec<&[u8]> = first.fragments().collect();
        assert_eq!(fragments, vec![&[1u8, 2][..], &[3][..], &[4, 5][..]]);
        assert_eq!(first.next_offset, 6 + 5 + 6);

        let second = iter.next().unwrap().unwrap();
        assert_eq!(second.record_id, 0x00BB);
        assert_eq!(second.fragment_sizes, vec![1]);
        assert!(iter.next().is_none());
    }

    #[test]
    fn independent_cursor_does_not_move_the_primary_stream() {
        let stream = [
            record(0x0001, &[1]),
            record(0x0002, &[2]),
            record(0x0003, &[3]),
        ]
        .concat();

        let mut primary = RecordStream::new(&stream);
        primary.next().unwrap().unwrap();
        let resume_at = primary.position();

        let mut scan = RecordStream::at(&stream, resume_at).unwrap();
        assert_eq!(scan.next().unwrap().unwrap().record_id, 0x0002);
        assert_eq!(scan.next().unwrap().unwrap().record_id, 0x0003);

        assert_eq!(primary.position(), resume_at);
        assert_eq!(primary.next().unwrap().unwrap().record_id, 0x0002);
    }

    #[test]
    fn seeking_past_the_end_is_stream_corrupt() {
        let stream = record(0x0001, &[1]);
        let err = RecordStream::at(&stream, 100).unwrap_err();
        assert!(matches!(err, BiffError::StreamCorrupt { offset: 100, .. }));
    }

    #[test]
    fn errors_on_oversized_continued_record() {
        let mut parts = vec![record(0x00AA, &[0u8])];
        let chunk = vec![0u8; 64];
        let mut total = 1;
        while total <= MAX_LOGICAL_RECORD_BYTES {
            parts.push(record(RECORD_CONTINUE, &chunk));
            total += chunk.len();
        }
        let stream = parts.concat();

        let mut iter = RecordStream::new(&stream);
        let err = iter.next().unwrap().unwrap_err();
        assert!(err.to_string().contains("exceeds"), "err={err}");
        assert!(iter.next().is_none());
    }

    #[test]
    fn errors_on_excessive_continue_fragments() {
        let mut parts = vec![record(0x00AA, &[])];
        for _ in 0..=MAX_LOGICAL_RECORD_FRAGMENTS {
            parts.push(record(RECORD_CONTINUE, &[]));
        }
        let stream = parts.concat();

        let mut iter = RecordStream::new(&stream);
        let err = iter.next().unwrap().unwrap_err();
        assert!(err.to_string().contains("fragments"), "err={err}");
        assert!(iter.next().is_none());
    }

    #[test]
    fn finds_next_bof_by_physical_walk() {
        let stream = [
            record(0x0001, &[1]),
            record(0x0002, &[2]),
            record(RECORD_BOF_BIFF8, &[0, 6, 0x10, 0]),
        ]
        .concat();
        assert_eq!(find_next_bof(&stream, 0), Some(10));
        assert_eq!(find_next_bof(&stream, 11), None);
        assert_eq!(find_next_bof(&stream[..12], 0), None);
    }
}
