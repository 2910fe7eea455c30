//! Purpose: Persistent FIFO queue over one memory-mapped ring file.
//! Exports: `CircularFileQueue`, `QueueOptions`, `QueueInfo`.
//! Role: Owns the file, the mapping and the cursors behind one monitor (mutex + condvar).
//! Invariants: Every header mutation is written to the mapping before the lock is released.
//! Invariants: `pop` waits only while the queue is open and empty; `close` wakes all waiters.
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use fs2::FileExt;
use libc::{EACCES, EPERM};
use memmap2::MmapMut;
use serde::Serialize;
use tracing::{debug, warn};

use crate::core::error::{Error, ErrorKind};
use crate::core::header::{self, Header, DATA_START, MAX_FILE_SIZE};
use crate::core::ring::{self, RingGeometry};

#[derive(Clone, Copy, Debug)]
pub struct QueueOptions {
    pub file_size: u32,
}

impl QueueOptions {
    pub fn new(file_size: u32) -> Self {
        Self { file_size }
    }
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self::new(MAX_FILE_SIZE)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct QueueInfo {
    pub path: PathBuf,
    pub file_size: u32,
    pub capacity: u32,
    pub used_bytes: u32,
    pub free_bytes: u32,
    pub start: u32,
    pub end: u32,
    pub count: u32,
}

struct Ring {
    file: File,
    mmap: MmapMut,
    geometry: RingGeometry,
    header: Header,
}

impl Ring {
    fn push(&mut self, data: &[u8], needed: u32) -> Result<(), Error> {
        let free = self.header.free_bytes(self.geometry);
        if needed > free {
            return Err(Error::new(ErrorKind::NotEnoughSpace)
                .with_message(format!("record needs {needed} bytes, {free} free")));
        }

        let end = ring::encode_at(&mut self.mmap, self.geometry, self.header.end, data);
        self.header.end = end;
        header::write_end(&mut self.mmap, end);

        self.header.count += 1;
        header::write_count(&mut self.mmap, self.header.count);
        Ok(())
    }

    fn pop(&mut self) -> Result<Vec<u8>, Error> {
        let used = self.header.used_bytes(self.geometry);
        let (payload, start) =
            ring::decode_at(&self.mmap, self.geometry, self.header.start, used)?;
        self.header.start = start;
        header::write_start(&mut self.mmap, start);

        self.header.count -= 1;
        header::write_count(&mut self.mmap, self.header.count);
        Ok(payload)
    }

    fn info(&self, path: &Path) -> QueueInfo {
        QueueInfo {
            path: path.to_path_buf(),
            file_size: self.geometry.file_size(),
            capacity: self.geometry.capacity(),
            used_bytes: self.header.used_bytes(self.geometry),
            free_bytes: self.header.free_bytes(self.geometry),
            start: self.header.start,
            end: self.header.end,
            count: self.header.count,
        }
    }

    fn close(self, path: &Path) -> Result<(), Error> {
        let Ring {
            file, mmap, header, ..
        } = self;
        let flushed = mmap.flush();
        drop(mmap);
        flushed.map_err(|err| io_error(path, err))?;
        file.sync_all().map_err(|err| io_error(path, err))?;
        debug!(
            path = %path.display(),
            start = header.start,
            end = header.end,
            count = header.count,
            "closed queue"
        );
        Ok(())
    }
}

/// A fixed-capacity FIFO queue persisted in a single memory-mapped file.
///
/// Share it between threads with `Arc`. `push` never blocks; `pop` blocks while the
/// queue is empty and returns `ErrorKind::Closed` once `close` runs.
pub struct CircularFileQueue {
    path: PathBuf,
    state: Mutex<Option<Ring>>,
    ready: Condvar,
}

impl CircularFileQueue {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::open_with_options(path, QueueOptions::default())
    }

    pub fn open_with_options(path: impl AsRef<Path>, options: QueueOptions) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let geometry = RingGeometry::new(DATA_START, options.file_size)?;

        let mut open = OpenOptions::new();
        open.read(true).write(true).create(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            open.mode(0o755);
        }
        let file = open.open(&path).map_err(|err| io_error(&path, err))?;

        file.try_lock_exclusive().map_err(|err| {
            warn!(path = %path.display(), error = %err, "queue file is locked");
            Error::new(lock_error_kind(&err))
                .with_message("queue file already open")
                .with_path(&path)
                .with_source(err)
        })?;

        let actual_size = file
            .metadata()
            .map(|meta| meta.len())
            .map_err(|err| io_error(&path, err))?;
        let expected_size = u64::from(options.file_size);
        if actual_size == 0 {
            file.set_len(expected_size).map_err(|err| io_error(&path, err))?;
        } else if actual_size != expected_size {
            warn!(
                path = %path.display(),
                actual_size,
                expected_size,
                "queue file size mismatch"
            );
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!(
                    "queue file is {actual_size} bytes, expected {expected_size}"
                ))
                .with_path(&path));
        }

        let mmap = unsafe { MmapMut::map_mut(&file).map_err(|err| io_error(&path, err))? };

        let header = Header::read(&mmap, geometry);
        if let Err(err) = header.validate(geometry) {
            warn!(
                path = %path.display(),
                start = header.start,
                end = header.end,
                count = header.count,
                "rejecting queue header"
            );
            return Err(err.with_path(&path));
        }
        debug!(
            path = %path.display(),
            start = header.start,
            end = header.end,
            count = header.count,
            "opened queue"
        );

        Ok(Self {
            path,
            state: Mutex::new(Some(Ring {
                file,
                mmap,
                geometry,
                header,
            })),
            ready: Condvar::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn size(&self) -> usize {
        self.lock()
            .as_ref()
            .map_or(0, |ring| ring.header.count as usize)
    }

    pub fn push(&self, data: &[u8]) -> Result<(), Error> {
        let needed = ring::framed_len(data.len())?;
        let mut state = self.lock();
        let ring = state.as_mut().ok_or_else(|| self.closed())?;
        ring.push(data, needed)?;
        self.ready.notify_one();
        Ok(())
    }

    /// Removes the oldest record, waiting for a push while the queue is empty.
    pub fn pop(&self) -> Result<Vec<u8>, Error> {
        let mut state = self.lock();
        loop {
            let ring = state.as_mut().ok_or_else(|| self.closed())?;
            if ring.header.count > 0 {
                return ring.pop();
            }
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn try_pop(&self) -> Result<Option<Vec<u8>>, Error> {
        self.pop_before(Instant::now())
    }

    pub fn pop_timeout(&self, timeout: Duration) -> Result<Option<Vec<u8>>, Error> {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.pop_before(deadline),
            None => self.pop().map(Some),
        }
    }

    pub fn flush(&self) -> Result<(), Error> {
        let state = self.lock();
        let ring = state.as_ref().ok_or_else(|| self.closed())?;
        ring.mmap.flush().map_err(|err| io_error(&self.path, err))
    }

    pub fn info(&self) -> Result<QueueInfo, Error> {
        let state = self.lock();
        let ring = state.as_ref().ok_or_else(|| self.closed())?;
        Ok(ring.info(&self.path))
    }

    /// Wakes every blocked `pop` with `Closed`, then flushes and unmaps the file.
    ///
    /// Closing an already closed queue is a no-op.
    pub fn close(&self) -> Result<(), Error> {
        let ring = self.lock().take();
        self.ready.notify_all();
        match ring {
            Some(ring) => ring.close(&self.path),
            None => Ok(()),
        }
    }

    fn pop_before(&self, deadline: Instant) -> Result<Option<Vec<u8>>, Error> {
        let mut state = self.lock();
        loop {
            let ring = state.as_mut().ok_or_else(|| self.closed())?;
            if ring.header.count > 0 {
                return ring.pop().map(Some);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let (guard, _) = self
                .ready
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Ring>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn closed(&self) -> Error {
        Error::new(ErrorKind::Closed)
            .with_message("queue is closed")
            .with_path(&self.path)
    }
}

fn io_error(path: &Path, err: io::Error) -> Error {
    let kind = match err.kind() {
        io::ErrorKind::PermissionDenied => ErrorKind::Permission,
        _ => ErrorKind::Io,
    };
    Error::new(kind).with_path(path).with_source(err)
}

fn lock_error_kind(err: &io::Error) -> ErrorKind {
    let errno = err.raw_os_error().unwrap_or_default();
    if errno == EACCES || errno == EPERM {
        return ErrorKind::Permission;
    }
    match err.kind() {
        io::ErrorKind::WouldBlock => ErrorKind::Busy,
        io::ErrorKind::PermissionDenied => ErrorKind::Permission,
        _ => ErrorKind::Io,
    }
}
