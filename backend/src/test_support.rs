//! Test utilities for the backend crate.
//!
//! Shared by unit tests in `src/` and the integration tests in `tests/`
//! (through the `test-support` feature). Nothing here is compiled into the
//! service binary.

pub mod clock;
pub mod doubles;
pub mod memory_store;

pub use clock::{MutableClock, RecordingSleeper, TokioClock};
pub use doubles::{RecordingNotifier, ScriptedDatasetSource, StaticDirectory, StaticTokenProvider};
pub use memory_store::MemoryStore;
