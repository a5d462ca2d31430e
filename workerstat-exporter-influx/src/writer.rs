use std::{
    ops::{Deref, DerefMut},
    vec::Drain,
};

use workerstat_core::{FieldValue, Measurement, TagSet};

pub(crate) const SMALLEST_VALID_POINT: &[u8] = b"a v=0i 0\n";

/// Outcome of writing a single point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteResult {
    /// The point was written to the current payload.
    Written,

    /// The point had nothing that could be expressed in the line protocol: an empty series name, or
    /// no fields left after dropping non-finite floats.
    Invalid,

    /// The point is larger than the maximum payload length on its own.
    TooLarge,
}

#[cfg(test)]
impl WriteResult {
    pub const fn is_written(self) -> bool {
        matches!(self, WriteResult::Written)
    }
}

/// A complete payload, ready to be sent.
pub struct Payload<'a> {
    pub data: &'a [u8],
    pub points: u64,
}

/// Writes points in the InfluxDB line protocol into larger buffers for more efficient network I/O.
///
/// Points are always newline delimited, so many points can be sent in a single payload and split
/// apart by the server. A maximum payload length bounds each payload: a payload always holds one or
/// more complete points and never exceeds the limit. A point that does not fit in an empty payload
/// is discarded.
pub(crate) struct PayloadWriter {
    max_payload_len: usize,
    payloads_buf: Vec<u8>,
    offsets: Vec<(usize, u64)>,
    current_points: u64,
    line_buf: Vec<u8>,
    int_writer: itoa::Buffer,
    float_writer: ryu::Buffer,
}

impl PayloadWriter {
    /// Creates a new `PayloadWriter` with the given maximum payload length.
    pub fn new(max_payload_len: usize) -> Self {
        assert!(
            max_payload_len >= SMALLEST_VALID_POINT.len(),
            "maximum payload length is too small to allow any points to be written (must be {} or greater)",
            SMALLEST_VALID_POINT.len()
        );

        Self {
            max_payload_len,
            payloads_buf: Vec::new(),
            offsets: Vec::new(),
            current_points: 0,
            line_buf: Vec::new(),
            int_writer: itoa::Buffer::new(),
            float_writer: ryu::Buffer::new(),
        }
    }

    fn last_offset(&self) -> usize {
        self.offsets.last().map(|(offset, _)| *offset).unwrap_or(0)
    }

    fn current_payload_len(&self) -> usize {
        self.payloads_buf.len() - self.last_offset()
    }

    /// Finalizes the current payload, if it holds anything, and starts a new one.
    fn finalize_current_payload(&mut self) {
        if self.current_payload_len() == 0 {
            return;
        }

        self.offsets.push((self.payloads_buf.len(), self.current_points));
        self.current_points = 0;
    }

    /// Commits the line buffer to the current payload, starting a new payload first if the line
    /// would not fit.
    fn commit(&mut self) -> WriteResult {
        let line_len = self.line_buf.len();
        if line_len > self.max_payload_len {
            self.line_buf.clear();
            return WriteResult::TooLarge;
        }

        if self.current_payload_len() + line_len > self.max_payload_len {
            self.finalize_current_payload();
        }

        self.payloads_buf.extend_from_slice(&self.line_buf);
        self.line_buf.clear();
        self.current_points += 1;

        WriteResult::Written
    }

    /// Writes a point.
    ///
    /// The line is made of the series name, then every tag with a non-empty value, then every field
    /// that can be represented, then the timestamp in nanoseconds.
    pub fn write_point(
        &mut self,
        series: &str,
        point: &Measurement,
        tags: &TagSet,
        timestamp: u64,
    ) -> WriteResult {
        self.line_buf.clear();
        if series.is_empty() {
            return WriteResult::Invalid;
        }

        escape_into(&mut self.line_buf, series, &[b',', b' ']);

        for tag in tags {
            // Empty tag values are rejected by the server.
            if tag.key().is_empty() || tag.value().is_empty() {
                continue;
            }

            self.line_buf.push(b',');
            escape_into(&mut self.line_buf, tag.key(), &[b',', b'=', b' ']);
            self.line_buf.push(b'=');
            escape_into(&mut self.line_buf, tag.value(), &[b',', b'=', b' ']);
        }

        let mut wrote_field = false;
        for (name, value) in point.iter() {
            if name.is_empty() {
                continue;
            }

            let start = self.line_buf.len();
            self.line_buf.push(if wrote_field { b',' } else { b' ' });
            escape_into(&mut self.line_buf, name, &[b',', b'=', b' ']);
            self.line_buf.push(b'=');

            if self.write_field_value(value) {
                wrote_field = true;
            } else {
                self.line_buf.truncate(start);
            }
        }

        if !wrote_field {
            self.line_buf.clear();
            return WriteResult::Invalid;
        }

        self.line_buf.push(b' ');
        self.line_buf.extend_from_slice(self.int_writer.format(timestamp).as_bytes());
        self.line_buf.push(b'\n');

        self.commit()
    }

    fn write_field_value(&mut self, value: &FieldValue) -> bool {
        match value {
            FieldValue::Integer(v) => {
                self.line_buf.extend_from_slice(self.int_writer.format(*v).as_bytes());
                self.line_buf.push(b'i');
            }
            FieldValue::UInteger(v) => {
                // 1.x servers have no unsigned field type, and a field must keep one type within a
                // series, so values past `i64::MAX` saturate.
                let v = i64::try_from(*v).unwrap_or(i64::MAX);
                self.line_buf.extend_from_slice(self.int_writer.format(v).as_bytes());
                self.line_buf.push(b'i');
            }
            FieldValue::Float(v) => {
                if !v.is_finite() {
                    return false;
                }
                self.line_buf.extend_from_slice(self.float_writer.format(*v).as_bytes());
            }
            FieldValue::Str(s) => {
                self.line_buf.push(b'"');
                escape_into(&mut self.line_buf, s, &[b'"', b'\\']);
                self.line_buf.push(b'"');
            }
            FieldValue::Boolean(b) => {
                self.line_buf.extend_from_slice(if *b { b"true" } else { b"false" });
            }
        }

        true
    }

    /// Gets the number of points written since the payloads were last taken.
    pub fn pending_points(&self) -> u64 {
        self.current_points + self.offsets.iter().map(|(_, points)| points).sum::<u64>()
    }

    /// Returns a consuming iterator over all payloads written by this writer.
    ///
    /// The payloads are cleared from the writer when the iterator is dropped.
    pub fn payloads(&mut self) -> Payloads<'_> {
        self.finalize_current_payload();
        self.line_buf.clear();

        Payloads::new(&mut self.payloads_buf, &mut self.offsets)
    }
}

/// Iterator over all payloads written by a `PayloadWriter`.
pub(crate) struct Payloads<'a> {
    payloads_buf: ConsumingBufferSwap<'a, u8>,
    start: usize,
    offsets: Drain<'a, (usize, u64)>,
}

impl<'a> Payloads<'a> {
    fn new(payloads_buf: &'a mut Vec<u8>, offsets: &'a mut Vec<(usize, u64)>) -> Self {
        Self {
            payloads_buf: ConsumingBufferSwap::new(payloads_buf),
            start: 0,
            offsets: offsets.drain(..),
        }
    }

    /// Returns the number of remaining payloads.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Returns the next payload, or `None` if there are no more.
    pub fn next_payload(&mut self) -> Option<Payload<'_>> {
        let (offset, points) = self.offsets.next()?;

        let data = &self.payloads_buf[self.start..offset];
        self.start = offset;

        Some(Payload { data, points })
    }
}

// Swaps the source buffer out for an empty one up front, so the source ends up cleared even if
// `Drop` never runs. On drop, the original allocation is cleared and handed back for reuse.
struct ConsumingBufferSwap<'a, T> {
    source: &'a mut Vec<T>,
    original: Vec<T>,
}

impl<'a, T> ConsumingBufferSwap<'a, T> {
    fn new(source: &'a mut Vec<T>) -> Self {
        let original = std::mem::take(source);
        Self { source, original }
    }
}

impl<T> Drop for ConsumingBufferSwap<'_, T> {
    fn drop(&mut self) {
        self.original.clear();
        std::mem::swap(self.source, &mut self.original);
    }
}

impl<T> Deref for ConsumingBufferSwap<'_, T> {
    type Target = Vec<T>;

    fn deref(&self) -> &Self::Target {
        &self.original
    }
}

impl<T> DerefMut for ConsumingBufferSwap<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.original
    }
}

fn escape_into(buf: &mut Vec<u8>, s: &str, special: &[u8]) {
    for &b in s.as_bytes() {
        // Line breaks would end the line early, and cannot be escaped.
        if b == b'\n' || b == b'\r' {
            buf.push(b' ');
            continue;
        }

        if special.contains(&b) {
            buf.push(b'\\');
        }
        buf.push(b);
    }
}
