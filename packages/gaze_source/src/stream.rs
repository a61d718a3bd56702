use std::collections::VecDeque;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::framing::{RECORD_SIZE, RecordDecoder};
use crate::{RawPoint, SampleSource, SourceError};

/// Most points held between two pulls (the helper's pipe capacity).
/// Older points are discarded first once this fills up.
pub const MAX_PENDING_POINTS: usize = 65535;

const READ_CHUNK: usize = RECORD_SIZE * 512;

enum Origin {
    Path(PathBuf),
    Reader(Option<Box<dyn Read + Send>>),
}

/// State shared between the reader thread and `pull`.
#[derive(Default)]
struct Shared {
    pending: Mutex<VecDeque<RawPoint>>,
    closed: AtomicBool,
    /// Points dropped because the pending queue was full
    discarded: AtomicU64,
    /// Records skipped by the decoder
    invalid: AtomicU64,
}

/// A [`SampleSource`] over a blocking byte stream of gaze records.
///
/// `init` opens the stream and starts a reader thread that decodes records
/// into a bounded queue; `pull` just empties that queue.
pub struct StreamSource {
    name: String,
    origin: Origin,
    shared: Option<Arc<Shared>>,
}

impl StreamSource {
    /// Read records from a file or named pipe, opened during `init`.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: format!("stream:{}", path.display()),
            origin: Origin::Path(path),
            shared: None,
        }
    }

    /// Read records from an already-open stream (stdin, a socket, a test buffer).
    pub fn from_reader(name: impl Into<String>, reader: impl Read + Send + 'static) -> Self {
        Self {
            name: name.into(),
            origin: Origin::Reader(Some(Box::new(reader))),
            shared: None,
        }
    }

    fn open(&mut self) -> Result<Box<dyn Read + Send>, SourceError> {
        match &mut self.origin {
            Origin::Path(path) => {
                let file = File::open(&*path).map_err(|e| {
                    SourceError::Init(format!("failed to open {}: {}", path.display(), e))
                })?;
                Ok(Box::new(file))
            }
            Origin::Reader(reader) => reader
                .take()
                .ok_or_else(|| SourceError::Init("reader already consumed".to_string())),
        }
    }
}

impl SampleSource for StreamSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self) -> Result<(), SourceError> {
        if self.shared.is_some() {
            return Ok(());
        }

        let reader = self.open()?;
        let shared = Arc::new(Shared::default());
        let thread_shared = shared.clone();
        let name = self.name.clone();

        std::thread::Builder::new()
            .name("gaze-stream-reader".to_string())
            .spawn(move || read_loop(reader, &thread_shared, &name))?;

        info!(source = %self.name, "stream source reader started");
        self.shared = Some(shared);
        Ok(())
    }

    fn pull(&mut self) -> Result<Vec<RawPoint>, SourceError> {
        let shared = self.shared.as_ref().ok_or(SourceError::NotInitialized)?;

        // Read the flag before draining: the reader only sets it after its
        // last push, so a closed stream never hides pending points.
        let closed = shared.closed.load(Ordering::Acquire);
        let points: Vec<RawPoint> = {
            let mut pending = shared
                .pending
                .lock()
                .map_err(|_| SourceError::Read("pending queue poisoned".to_string()))?;
            pending.drain(..).collect()
        };

        if points.is_empty() && closed {
            return Err(SourceError::Closed);
        }
        Ok(points)
    }

    fn discarded(&self) -> u64 {
        self.shared
            .as_ref()
            .map(|s| s.discarded.load(Ordering::Relaxed) + s.invalid.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

fn read_loop(mut reader: Box<dyn Read + Send>, shared: &Shared, name: &str) {
    let mut decoder = RecordDecoder::new();
    let mut buffer = vec![0u8; READ_CHUNK];

    loop {
        match reader.read(&mut buffer) {
            Ok(0) => {
                info!(source = %name, "stream source reached EOF");
                break;
            }
            Ok(n) => {
                let points = decoder.feed(&buffer[..n]);
                shared.invalid.store(decoder.dropped(), Ordering::Relaxed);
                if points.is_empty() {
                    continue;
                }
                let Ok(mut pending) = shared.pending.lock() else {
                    warn!(source = %name, "pending queue poisoned, stopping reader");
                    break;
                };
                pending.extend(points);
                let overflow = pending.len().saturating_sub(MAX_PENDING_POINTS);
                if overflow > 0 {
                    pending.drain(..overflow);
                    shared.discarded.fetch_add(overflow as u64, Ordering::Relaxed);
                    debug!(source = %name, overflow, "pending queue full, discarded oldest points");
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(source = %name, "error reading gaze stream: {}", e);
                break;
            }
        }
    }

    if decoder.buffered() > 0 {
        debug!(source = %name, bytes = decoder.buffered(), "discarding trailing partial record");
    }
    shared.closed.store(true, Ordering::Release);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode_points;
    use std::io::{Cursor, Write};
    use std::time::{Duration, Instant};

    /// Pull until the source reports closed, collecting everything seen.
    fn pull_until_closed(source: &mut StreamSource) -> Vec<RawPoint> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut seen = Vec::new();
        loop {
            match source.pull() {
                Ok(points) => seen.extend(points),
                Err(SourceError::Closed) => return seen,
                Err(e) => panic!("unexpected error: {e}"),
            }
            assert!(Instant::now() < deadline, "reader never closed");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn pull_before_init_fails() {
        let mut source = StreamSource::from_reader("test", Cursor::new(Vec::new()));
        assert!(matches!(source.pull(), Err(SourceError::NotInitialized)));
    }

    #[test]
    fn reads_all_records_then_closes() {
        let expected = vec![
            RawPoint::new(0.5, 0.5),
            RawPoint::new(0.25, 0.75),
            RawPoint::new(1.0, 0.0),
        ];
        let mut source =
            StreamSource::from_reader("test", Cursor::new(encode_points(&expected)));
        source.init().unwrap();

        assert_eq!(pull_until_closed(&mut source), expected);
        // Stays closed
        assert!(matches!(source.pull(), Err(SourceError::Closed)));
    }

    #[test]
    fn pending_queue_is_bounded() {
        let points: Vec<RawPoint> = (0..MAX_PENDING_POINTS + 10)
            .map(|i| RawPoint::new((i % 4) as f64 / 4.0, 0.5))
            .collect();
        let mut source = StreamSource::from_reader("test", Cursor::new(encode_points(&points)));
        source.init().unwrap();

        // Let the reader finish before the first pull so the bound applies.
        let deadline = Instant::now() + Duration::from_secs(5);
        while !source.shared.as_ref().unwrap().closed.load(Ordering::Acquire) {
            assert!(Instant::now() < deadline, "reader never finished");
            std::thread::sleep(Duration::from_millis(5));
        }

        let seen = pull_until_closed(&mut source);
        assert_eq!(seen.len(), MAX_PENDING_POINTS);
        assert_eq!(source.discarded(), 10);
        assert_eq!(seen.last(), points.last());
    }

    #[test]
    fn non_finite_records_count_as_discarded() {
        let points = [
            RawPoint::new(0.5, 0.5),
            RawPoint::new(f64::NAN, 0.5),
            RawPoint::new(0.25, f64::INFINITY),
            RawPoint::new(0.75, 0.25),
        ];
        let mut source = StreamSource::from_reader("test", Cursor::new(encode_points(&points)));
        assert_eq!(source.discarded(), 0);
        source.init().unwrap();

        assert_eq!(
            pull_until_closed(&mut source),
            vec![RawPoint::new(0.5, 0.5), RawPoint::new(0.75, 0.25)]
        );
        assert_eq!(source.discarded(), 2);
    }

    #[test]
    fn reads_from_file_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&encode_points(&[RawPoint::new(0.125, 0.875)]))
            .unwrap();
        file.flush().unwrap();

        let mut source = StreamSource::from_path(file.path());
        assert!(source.name().starts_with("stream:"));
        source.init().unwrap();
        assert_eq!(pull_until_closed(&mut source), vec![RawPoint::new(0.125, 0.875)]);
    }

    #[test]
    fn missing_path_fails_init() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = StreamSource::from_path(dir.path().join("nope.fifo"));
        assert!(matches!(source.init(), Err(SourceError::Init(_))));
    }
}
