//! Gaze sample sources.
//!
//! A [`SampleSource`] is anything that can hand over the raw `(x, y)` gaze
//! points captured since it was last asked. This crate knows nothing about
//! caching, timestamps or clients; the relay owns all of that.
//!
//! # Example
//!
//! ```no_run
//! use gaze_source::{SampleSource, StreamSource};
//!
//! let mut source = StreamSource::from_path("/tmp/gaze.fifo");
//! source.init().unwrap();
//!
//! loop {
//!     for point in source.pull().unwrap_or_default() {
//!         println!("{:.3} {:.3}", point.x, point.y);
//!     }
//!     std::thread::sleep(std::time::Duration::from_millis(100));
//! }
//! ```

mod error;
pub mod framing;
mod scripted;
mod source;
mod stream;
mod synthetic;

pub use error::SourceError;
pub use framing::{RECORD_SIZE, RecordDecoder, encode_points};
pub use scripted::{ScriptStep, ScriptedSource};
pub use source::{RawPoint, SampleSource};
pub use stream::{MAX_PENDING_POINTS, StreamSource};
pub use synthetic::SyntheticSource;
