//! Test related functionality used internally within onestep-transfer.
//!

#![doc(hidden)]

use crate::error::Error::{ConcurrencyError, DownloadError, IoError, UploadError};
use crate::error::Result;
use crate::io::source::ObjectSource;
use crate::io::writer::ObjectWriter;
use crate::io::ObjectMeta;
use crate::transfer::progress::ProgressSink;
use crate::transfer::range::ByteRange;
use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

const CONSTANT_SEED: u64 = 42;

/// The default benchmark size. 16 MiB.
pub const BENCH_FILE_SIZE: u64 = 16777216;

/// The default benchmark file name.
pub const BENCH_FILE_NAME: &str = "bench_file";

/// The default test file size. 10 MiB.
pub const TEST_FILE_SIZE: u64 = 10485760;

/// The default test file name.
pub const TEST_FILE_NAME: &str = "test_file";

/// The default directory name.
pub const DIRECTORY: &str = "data";

/// Keep some state locked behind a mutex for writing files synchronously when running tests in
/// parallel.
static GENERATED_FILES: LazyLock<Mutex<HashSet<PathBuf>>> =
    LazyLock::new(|| Mutex::new(HashSet::default()));

/// Deterministic random bytes.
pub fn random_bytes(size: usize, seed: u64) -> Vec<u8> {
    let mut buf = vec![0; size];
    StdRng::seed_from_u64(seed).fill_bytes(&mut buf);
    buf
}

/// Generate test files in an ignored directory.
pub struct TestFileBuilder {
    directory: PathBuf,
    rng: StdRng,
    file_size: u64,
    file_name: String,
    overwrite: bool,
}

impl Default for TestFileBuilder {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DIRECTORY),
            rng: StdRng::from_os_rng(),
            file_size: TEST_FILE_SIZE,
            file_name: TEST_FILE_NAME.to_string(),
            overwrite: false,
        }
    }
}

impl TestFileBuilder {
    /// Add the random seed to generate the file with.
    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Use a constant seed with repeatable results to generate the file.
    pub fn with_constant_seed(self) -> Self {
        self.with_random_seed(CONSTANT_SEED)
    }

    /// Set the file size.
    pub fn with_file_size(mut self, file_size: u64) -> Self {
        self.file_size = file_size;
        self
    }

    /// Set the file name.
    pub fn with_file_name(mut self, file_name: String) -> Self {
        self.file_name = file_name;
        self
    }

    /// Set the directory to write the file to. Relative directories are resolved against the
    /// workspace root.
    pub fn with_directory(mut self, directory: PathBuf) -> Self {
        self.directory = directory;
        self
    }

    /// Always overwrite the file, even if it exists.
    pub fn overwrite(mut self) -> Self {
        self.overwrite = true;
        self
    }

    /// Generate a file for benchmarking.
    pub fn generate_bench_defaults(self) -> Result<PathBuf> {
        self.with_constant_seed()
            .with_file_size(BENCH_FILE_SIZE)
            .with_file_name(BENCH_FILE_NAME.to_string())
            .generate()
    }

    /// Generate a file for testing.
    pub fn generate_test_defaults(self) -> Result<PathBuf> {
        self.with_constant_seed().generate()
    }

    /// Generate the file.
    pub fn generate(mut self) -> Result<PathBuf> {
        // Files are shared between tests running in parallel, so only one test may write a given
        // file and the others must wait until it is complete.
        let mut files = GENERATED_FILES
            .lock()
            .map_err(|err| ConcurrencyError(err.to_string()))?;

        let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .parent()
            .map(PathBuf::from)
            .ok_or_else(|| IoError(io::Error::other("missing workspace root")))?;
        let directory = root.join(&self.directory);
        let file = directory.join(&self.file_name);

        if files.contains(&file) && !self.overwrite {
            return Ok(file);
        }

        fs::create_dir_all(&directory)?;
        if !file.exists() || self.overwrite {
            let mut buf = vec![0; usize::try_from(self.file_size)?];
            self.rng.fill_bytes(&mut buf);
            fs::write(&file, buf)?;
        }

        files.insert(file.clone());

        Ok(file)
    }
}

/// Tracks chunks that were read from a source but not yet written to a destination.
#[derive(Debug, Default)]
pub struct InFlight {
    current: AtomicU64,
    max: AtomicU64,
}

impl InFlight {
    fn acquire(&self) {
        let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(current, Ordering::SeqCst);
    }

    fn release(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    /// The largest number of chunks in flight at once.
    pub fn max(&self) -> u64 {
        self.max.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct SourceState {
    failures: HashMap<u64, u32>,
    requested: Vec<ByteRange>,
    fetches: u64,
}

/// An in-memory source with injectable failures.
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Bytes,
    reported_size: Option<u64>,
    state: Arc<Mutex<SourceState>>,
    in_flight: Option<Arc<InFlight>>,
    cancel_after: Option<(u64, CancellationToken)>,
}

impl MemorySource {
    /// Create a source serving `data`.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            reported_size: None,
            state: Default::default(),
            in_flight: None,
            cancel_after: None,
        }
    }

    /// Fail the range starting at `start` for the first `times` requests.
    pub fn with_failures(self, start: u64, times: u32) -> Self {
        self.lock().failures.insert(start, times);
        self
    }

    /// Report a size that differs from the data.
    pub fn with_reported_size(mut self, size: u64) -> Self {
        self.reported_size = Some(size);
        self
    }

    /// Count successful fetches as in flight until the writer releases them.
    pub fn with_in_flight(mut self, in_flight: Arc<InFlight>) -> Self {
        self.in_flight = Some(in_flight);
        self
    }

    /// Cancel the token once `fetches` requests have been made.
    pub fn with_cancel_after(mut self, fetches: u64, cancel: CancellationToken) -> Self {
        self.cancel_after = Some((fetches, cancel));
        self
    }

    /// The number of range requests made, including failed ones.
    pub fn fetches(&self) -> u64 {
        self.lock().fetches
    }

    /// The ranges that were successfully served, in request order.
    pub fn requested(&self) -> Vec<ByteRange> {
        self.lock().requested.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SourceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ObjectMeta for MemorySource {
    fn location(&self) -> String {
        "memory://source".to_string()
    }
}

#[async_trait::async_trait]
impl ObjectSource for MemorySource {
    async fn size(&self) -> Result<u64> {
        Ok(self.reported_size.unwrap_or(self.data.len() as u64))
    }

    async fn get_range(&self, range: ByteRange) -> Result<Bytes> {
        {
            let mut state = self.lock();
            state.fetches += 1;

            if let Some((after, cancel)) = &self.cancel_after {
                if state.fetches >= *after {
                    cancel.cancel();
                }
            }

            if let Some(remaining) = state.failures.get_mut(&range.start()) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(DownloadError(format!("injected failure for {range}")));
                }
            }

            state.requested.push(range);
        }

        let start = usize::try_from(range.start())?;
        if start >= self.data.len() {
            return Err(DownloadError(format!("{range} is past the end of the data")));
        }
        let end = usize::try_from(range.end())?.min(self.data.len() - 1);
        if let Some(in_flight) = &self.in_flight {
            in_flight.acquire();
        }

        Ok(self.data.slice(start..=end))
    }
}

#[derive(Debug, Default)]
struct WriterState {
    data: Vec<u8>,
    writes: usize,
    closes: usize,
    aborts: usize,
}

/// An in-memory destination recording everything written to it.
#[derive(Debug, Clone, Default)]
pub struct MemoryWriter {
    state: Arc<Mutex<WriterState>>,
    fail_on_write: Option<usize>,
    fail_close: bool,
    write_delay: Option<Duration>,
    in_flight: Option<Arc<InFlight>>,
}

impl MemoryWriter {
    /// Fail the `n`th write, counting from one.
    pub fn with_write_failure(mut self, n: usize) -> Self {
        self.fail_on_write = Some(n);
        self
    }

    /// Fail when finalizing.
    pub fn with_close_failure(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Sleep before each write.
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    /// Release in flight chunks after each write.
    pub fn with_in_flight(mut self, in_flight: Arc<InFlight>) -> Self {
        self.in_flight = Some(in_flight);
        self
    }

    /// The bytes written so far.
    pub fn data(&self) -> Vec<u8> {
        self.lock().data.clone()
    }

    /// The number of write calls, including failed ones.
    pub fn writes(&self) -> usize {
        self.lock().writes
    }

    /// The number of close calls.
    pub fn closes(&self) -> usize {
        self.lock().closes
    }

    /// The number of abort calls.
    pub fn aborts(&self) -> usize {
        self.lock().aborts
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WriterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ObjectMeta for MemoryWriter {
    fn location(&self) -> String {
        "memory://destination".to_string()
    }
}

#[async_trait::async_trait]
impl ObjectWriter for MemoryWriter {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        if let Some(delay) = self.write_delay {
            sleep(delay).await;
        }

        let mut state = self.lock();
        state.writes += 1;
        if let Some(in_flight) = &self.in_flight {
            in_flight.release();
        }

        if self.fail_on_write == Some(state.writes) {
            return Err(UploadError(format!("injected failure on write {}", state.writes)));
        }

        state.data.extend_from_slice(data);
        Ok(())
    }

    async fn abort(&mut self) -> Result<()> {
        self.lock().aborts += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.lock().closes += 1;
        if self.fail_close {
            return Err(UploadError("injected failure on close".to_string()));
        }

        Ok(())
    }
}

/// Records every progress report.
#[derive(Debug, Clone, Default)]
pub struct RecordingProgress {
    reports: Arc<Mutex<Vec<(u64, u64)>>>,
}

impl RecordingProgress {
    /// The reports made so far.
    pub fn reports(&self) -> Vec<(u64, u64)> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ProgressSink for RecordingProgress {
    fn report(&self, written: u64, total: u64) {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((written, total));
    }
}
