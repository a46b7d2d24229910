//! The handle: the public, seekable, random-access view over a remote
//! resource, backed by the slice directory and fragment store and fed by a
//! small pool of range-request workers.

use std::io;
use std::sync::{Arc, Condvar, Mutex, RwLock};

use crate::error::{ErrorKind, Result};
use crate::fragment::FragmentStore;
use crate::slices::SliceDirectory;
use crate::worker;

/// Tunable constants, mirroring the fixed constants of the original design.
#[derive(Debug, Clone)]
pub struct Options {
    pub(crate) slice_size: u64,
    pub(crate) slice_window: usize,
    pub(crate) fragment_size: u64,
    pub(crate) max_workers: usize,
    pub(crate) recv_buffer: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            slice_size: 1024,
            slice_window: 8,
            fragment_size: 16 * 1024 * 1024,
            max_workers: 2,
            recv_buffer: 1024,
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slice_size(mut self, value: u64) -> Self {
        self.slice_size = value;
        self
    }

    pub fn slice_window(mut self, value: usize) -> Self {
        self.slice_window = value;
        self
    }

    pub fn fragment_size(mut self, value: u64) -> Self {
        self.fragment_size = value;
        self
    }

    pub fn max_workers(mut self, value: usize) -> Self {
        self.max_workers = value.max(1);
        self
    }

    pub fn recv_buffer(mut self, value: usize) -> Self {
        self.recv_buffer = value.max(1);
        self
    }
}

#[derive(Debug, Default)]
pub(crate) struct Status {
    pub(crate) fatal: Option<ErrorKind>,
    pub(crate) saw_200: bool,
    pub(crate) saw_206: bool,
    pub(crate) done: bool,
    pub(crate) closed: bool,
}

impl Status {
    fn admit_200(&mut self) -> bool {
        if self.fatal.is_some() || self.saw_200 || self.saw_206 {
            return false;
        }
        self.saw_200 = true;
        true
    }

    fn admit_206(&mut self) -> bool {
        if self.fatal.is_some() || self.saw_200 {
            return false;
        }
        self.saw_206 = true;
        true
    }
}

pub(crate) struct State {
    pub(crate) slices: SliceDirectory,
    pub(crate) length: i64,
    pub(crate) read_pointer: u64,
    pub(crate) workers: usize,
    pub(crate) status: Status,
}

impl State {
    pub(crate) fn admit_200(&mut self) -> bool {
        self.status.admit_200()
    }

    pub(crate) fn admit_206(&mut self) -> bool {
        self.status.admit_206()
    }
}

/// Seed capacity, in bytes, for the slice directory before the resource's
/// length is known. A directory sized straight from an unknown (`-1`) length
/// would start with zero slices, leaving the very first worker nothing to
/// claim; a fixed placeholder window, independent of the configured slice
/// size, gives it somewhere to start.
const INITIAL_DIRECTORY_BYTES: i64 = 16 * 1024;

pub(crate) struct HandleInner {
    pub(crate) uri: String,
    pub(crate) options: Options,
    pub(crate) client: reqwest::blocking::Client,
    pub(crate) state: Mutex<State>,
    pub(crate) fragments: RwLock<FragmentStore>,
    pub(crate) condvar: Condvar,
}

impl HandleInner {
    /// Marks the handle closed, drops the fragment store, and wakes every
    /// waiting reader. Idempotent. Shared by [`Handle::close`] and a worker's
    /// fatal-error path, since both must tear the handle down the same way.
    pub(crate) fn shutdown(&self) {
        let mut state = self.state.lock().unwrap();
        if state.status.closed {
            return;
        }
        state.status.closed = true;
        drop(state);

        self.fragments.write().unwrap().close();
        self.condvar.notify_all();
    }
}

/// A seekable, random-access byte stream over an HTTP resource, backed by a
/// local cache of downloaded byte ranges.
///
/// Handles are not `Clone`: a single handle assumes a single reader. Dropping
/// a handle closes it.
pub struct Handle {
    pub(crate) inner: Arc<HandleInner>,
}

impl Handle {
    /// Opens `uri` with default options, spawning the first worker.
    pub fn open(uri: impl Into<String>) -> Result<Self> {
        Self::open_with_options(uri, Options::default())
    }

    pub fn open_with_options(uri: impl Into<String>, options: Options) -> Result<Self> {
        let uri = uri.into();
        let client = reqwest::blocking::Client::builder().build()?;

        let mut fragments = FragmentStore::new(options.fragment_size);
        fragments.resize(-1, options.fragment_size)?;

        let state = State {
            slices: SliceDirectory::new(INITIAL_DIRECTORY_BYTES, options.slice_size),
            length: -1,
            read_pointer: 0,
            workers: 0,
            status: Status::default(),
        };

        let inner = Arc::new(HandleInner {
            uri,
            options,
            client,
            state: Mutex::new(state),
            fragments: RwLock::new(fragments),
            condvar: Condvar::new(),
        });

        log::info!("opening range file handle for {}", inner.uri);
        worker::spawn(Arc::clone(&inner));

        Ok(Self { inner })
    }

    /// The resource's length in bytes, once known from a response; `None`
    /// before the first worker completes.
    pub fn length(&self) -> Option<u64> {
        let state = self.inner.state.lock().unwrap();
        if state.length >= 0 { Some(state.length as u64) } else { None }
    }

    /// Blocks until bytes are available at the current read pointer, then
    /// copies up to `buf.len()` of them in. Returns `Ok(0)` at end of file or
    /// after [`Handle::close`]; returns the handle's sticky error once a
    /// fatal condition is recorded, since a fatal error tears down the
    /// fragment store (see [`HandleInner::shutdown`]) and there is nothing
    /// left behind it to drain.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut state = self.inner.state.lock().unwrap();
        loop {
            if let Some(kind) = state.status.fatal {
                return Err(kind.into_error());
            }
            if state.status.closed {
                return Ok(0);
            }
            if state.length >= 0 && state.read_pointer >= state.length as u64 {
                return Ok(0);
            }
            let slice_idx = (state.read_pointer / self.inner.options.slice_size) as usize;
            if state.slices.ready_run(slice_idx) > 0 {
                break;
            }
            state = self.inner.condvar.wait(state).unwrap();
        }

        let slice_idx = (state.read_pointer / self.inner.options.slice_size) as usize;
        let ready = state.slices.ready_run(slice_idx) as u64;
        let avail = ready * self.inner.options.slice_size;
        let avail = if state.length >= 0 { avail.min(state.length as u64 - state.read_pointer) } else { avail };
        let want = (avail as usize).min(buf.len());

        let fragments = self.inner.fragments.read().unwrap();
        let copied = copy_out(&fragments, &mut buf[..want], state.read_pointer, self.inner.options.fragment_size)?;
        drop(fragments);

        state.read_pointer += copied as u64;
        Ok(copied)
    }

    /// Moves the read pointer. Never blocks. If the ready run beyond the new
    /// pointer is thinner than a full window, an extra worker is spawned to
    /// start refilling it.
    pub fn seek(&self, pos: io::SeekFrom) -> Result<u64> {
        let mut state = self.inner.state.lock().unwrap();
        let base = state.read_pointer as i64;
        let new_pos = match pos {
            io::SeekFrom::Start(off) => off as i64,
            io::SeekFrom::Current(off) => base + off,
            io::SeekFrom::End(off) => {
                if state.length < 0 {
                    return Err(ErrorKind::BadRequest.into_error());
                }
                state.length + off
            }
        };
        if new_pos < 0 {
            return Err(ErrorKind::BadRequest.into_error());
        }
        state.read_pointer = new_pos as u64;

        let slice_idx = (state.read_pointer / self.inner.options.slice_size) as usize;
        let ready = state.slices.ready_run(slice_idx);
        let window_bytes = self.inner.options.slice_window as u64 * self.inner.options.slice_size;
        let thin = (ready as u64 * self.inner.options.slice_size) < window_bytes;
        drop(state);

        if thin {
            worker::spawn(Arc::clone(&self.inner));
        }
        self.inner.condvar.notify_all();
        Ok(new_pos as u64)
    }

    /// Marks the handle closed, drops its fragment storage, and wakes any
    /// blocked reader. Idempotent; in-flight workers notice on their next
    /// status check and their writes become no-ops.
    pub fn close(&self) -> Result<()> {
        self.inner.shutdown();
        Ok(())
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl io::Read for Handle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Handle::read(self, buf).map_err(io::Error::other)
    }
}

impl io::Seek for Handle {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        Handle::seek(self, pos).map_err(io::Error::other)
    }
}

fn copy_out(fragments: &FragmentStore, buf: &mut [u8], read_pointer: u64, fragment_size: u64) -> Result<usize> {
    let mut copied = 0;
    let mut offset = read_pointer;
    while copied < buf.len() {
        let frag_idx = (offset / fragment_size) as usize;
        let in_frag = offset % fragment_size;
        let n = fragments.read(&mut buf[copied..], frag_idx, in_frag)?;
        if n == 0 {
            break;
        }
        copied += n;
        offset += n as u64;
    }
    Ok(copied)
}
