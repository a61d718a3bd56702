//! Fixed-size gaze records as written by the sensor-side helper.
//!
//! Wire format: a plain byte stream of 8-byte records, each
//! `[x: f32 big-endian][y: f32 big-endian]`. There is no header or length
//! prefix; a reader may see a record split across two reads.

use tracing::debug;

use crate::RawPoint;

/// Size of one encoded `(x, y)` record in bytes.
pub const RECORD_SIZE: usize = 8;

/// Incremental decoder that carries partial records between reads.
#[derive(Debug, Default)]
pub struct RecordDecoder {
    partial: Vec<u8>,
    dropped: u64,
}

impl RecordDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode every complete record in `partial ++ bytes`.
    ///
    /// Trailing bytes that do not make up a whole record are kept for the
    /// next call. Records with a non-finite coordinate are skipped.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<RawPoint> {
        self.partial.extend_from_slice(bytes);

        let complete = self.partial.len() / RECORD_SIZE * RECORD_SIZE;
        let mut points = Vec::with_capacity(complete / RECORD_SIZE);

        for record in self.partial[..complete].chunks_exact(RECORD_SIZE) {
            let x = f32::from_be_bytes([record[0], record[1], record[2], record[3]]);
            let y = f32::from_be_bytes([record[4], record[5], record[6], record[7]]);
            let point = RawPoint::new(f64::from(x), f64::from(y));
            if point.is_finite() {
                points.push(point);
            } else {
                self.dropped += 1;
                debug!(x, y, "dropping non-finite gaze record");
            }
        }

        self.partial.drain(..complete);
        points
    }

    /// Bytes of an incomplete record waiting for more input.
    pub fn buffered(&self) -> usize {
        self.partial.len()
    }

    /// Records skipped because a coordinate was NaN or infinite.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Encode points in the helper's record format.
///
/// Coordinates are narrowed to `f32`, matching what the helper writes.
pub fn encode_points(points: &[RawPoint]) -> Vec<u8> {
    let mut out = Vec::with_capacity(points.len() * RECORD_SIZE);
    for point in points {
        out.extend_from_slice(&(point.x as f32).to_be_bytes());
        out.extend_from_slice(&(point.y as f32).to_be_bytes());
    }
    out
}
