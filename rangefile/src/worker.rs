//! One-shot range-request workers. A worker registers itself against the
//! handle's worker cap, claims a run of unready slices, issues a single range
//! request, and streams the response into the fragment store. A 206 worker
//! that completes successfully spawns its own successor so the resource keeps
//! filling in until every slice is ready.

use std::io::Read as _;
use std::sync::Arc;
use std::thread;

use reqwest::header::{CONNECTION, CONTENT_RANGE, RANGE};
use reqwest::StatusCode;

use crate::error::{ErrorKind, Result};
use crate::handle::HandleInner;
use crate::range::{self, format_range_header};

pub(crate) fn spawn(inner: Arc<HandleInner>) {
    let result = thread::Builder::new().name("rangefile-worker".into()).spawn(move || Worker { inner }.run());
    if let Err(e) = result {
        log::error!("failed to spawn range file worker thread: {e}");
    }
}

struct Worker {
    inner: Arc<HandleInner>,
}

struct Registration<'a>(&'a HandleInner);

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.0.state.lock().unwrap().workers -= 1;
    }
}

impl Worker {
    fn run(self) {
        if !self.try_register() {
            return;
        }
        let _registration = Registration(&self.inner);

        let Some((begin, end)) = self.claim() else { return };

        let (first, last) = match self.build_range(begin, end) {
            Ok(v) => v,
            Err(_) => {
                self.fail_before_receive(begin, end, ErrorKind::BadRange);
                return;
            }
        };

        let response = self
            .inner
            .client
            .get(self.inner.uri.as_str())
            .header(RANGE, format_range_header(first, last))
            .header(CONNECTION, "keep-alive")
            .send();

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                log::warn!("range request to {} failed: {e}", self.inner.uri);
                self.fail_before_receive(begin, end, ErrorKind::BadRequest);
                return;
            }
        };

        match response.status() {
            StatusCode::OK => self.handle_200(response, begin, end),
            StatusCode::PARTIAL_CONTENT => self.handle_206(response, begin, end),
            other => {
                log::warn!("unexpected status {other} from {}", self.inner.uri);
                self.fail_before_receive(begin, end, ErrorKind::BadStatus);
            }
        }
    }

    fn try_register(&self) -> bool {
        let mut state = self.inner.state.lock().unwrap();
        let pre = state.workers;
        state.workers += 1;
        if pre > self.inner.options.max_workers - 1 {
            state.workers -= 1;
            false
        } else {
            true
        }
    }

    fn claim(&self) -> Option<(usize, usize)> {
        let mut state = self.inner.state.lock().unwrap();
        if state.status.fatal.is_some() || state.status.closed {
            return None;
        }
        let slice_size = self.inner.options.slice_size;
        let window = self.inner.options.slice_window;
        let rp_idx = (state.read_pointer / slice_size) as usize;

        let (mut begin, mut end) = state.slices.claim_after(rp_idx, window);
        if begin == end && rp_idx != 0 {
            (begin, end) = state.slices.claim_after(0, window);
        }
        if begin == end {
            if state.length > 0 {
                state.status.done = true;
                drop(state);
                self.inner.condvar.notify_all();
            }
            return None;
        }
        Some((begin, end))
    }

    fn build_range(&self, begin: usize, end: usize) -> Result<(u64, u64)> {
        let length = self.inner.state.lock().unwrap().length;
        range::build_range(begin, end, self.inner.options.slice_size, length)
    }

    fn admit_200(&self) -> bool {
        self.inner.state.lock().unwrap().admit_200()
    }

    fn admit_206(&self) -> bool {
        self.inner.state.lock().unwrap().admit_206()
    }

    fn reset_length(&self, new_length: i64) -> Result<()> {
        if new_length < 0 {
            return Ok(());
        }
        let mut state = self.inner.state.lock().unwrap();
        if new_length == state.length {
            return Ok(());
        }
        state.length = new_length;
        state.slices.resize(new_length, self.inner.options.slice_size);
        // Held across the fragment resize too: the fragment-file sequence is
        // part of what the state mutex protects, so `length`/`slices` must
        // never observe a new size before the fragment vector matches it.
        self.inner.fragments.write().unwrap().resize(new_length, self.inner.options.fragment_size)?;
        Ok(())
    }

    fn release_claim(&self, begin: usize, end: usize) {
        if begin >= end {
            return;
        }
        self.inner.state.lock().unwrap().slices.rollback(begin, end);
    }

    fn fail_before_receive(&self, begin: usize, end: usize, kind: ErrorKind) {
        self.release_claim(begin, end);
        self.fail(kind);
    }

    fn fail(&self, kind: ErrorKind) {
        log::error!("range file worker for {} failed with {kind:?}", self.inner.uri);
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.status.fatal.is_none() {
                state.status.fatal = Some(kind);
            }
        }
        // A fatal error implicitly closes the handle: no further worker will
        // ever make progress, so the fragment store is torn down the same
        // way an explicit `Handle::close` would.
        self.inner.shutdown();
    }

    fn handle_200(&self, response: reqwest::blocking::Response, begin: usize, end: usize) {
        if !self.admit_200() {
            // Some other stream already owns the full download; it will
            // eventually cover the slices we claimed too.
            return;
        }
        let Some(length) = response.content_length() else {
            self.fail_before_receive(begin, end, ErrorKind::BadStatus);
            return;
        };
        if let Err(e) = self.reset_length(length as i64) {
            log::error!("failed to size fragment store for {}: {e}", self.inner.uri);
            self.fail_before_receive(begin, end, ErrorKind::BadRequest);
            return;
        }
        if self.receive(response, 0, length).is_ok() {
            let mut state = self.inner.state.lock().unwrap();
            state.status.done = true;
            drop(state);
            self.inner.condvar.notify_all();
        }
    }

    fn handle_206(&self, response: reqwest::blocking::Response, begin: usize, end: usize) {
        if !self.admit_206() {
            return;
        }
        let header = response.headers().get(CONTENT_RANGE).and_then(|v| v.to_str().ok()).map(str::to_owned);
        let Some(header) = header else {
            self.fail_before_receive(begin, end, ErrorKind::BadResponse);
            return;
        };
        let parsed = match range::parse_content_range(&header) {
            Ok(p) => p,
            Err(_) => {
                self.fail_before_receive(begin, end, ErrorKind::BadResponse);
                return;
            }
        };
        if let Err(e) = self.reset_length(parsed.total as i64) {
            log::error!("failed to size fragment store for {}: {e}", self.inner.uri);
            self.fail_before_receive(begin, end, ErrorKind::BadResponse);
            return;
        }
        if self.receive(response, parsed.first, parsed.last + 1).is_ok() {
            spawn(Arc::clone(&self.inner));
        }
    }

    fn receive(&self, mut body: reqwest::blocking::Response, mut offset: u64, end: u64) -> Result<()> {
        let mut buf = vec![0u8; self.inner.options.recv_buffer];
        while offset < end {
            if self.inner.state.lock().unwrap().status.closed {
                return Ok(());
            }
            let want = ((end - offset) as usize).min(buf.len());
            match read_until_full(&mut body, &mut buf[..want]) {
                Ok(0) => break,
                Ok(n) => {
                    self.write_and_mark(offset, &buf[..n]);
                    offset += n as u64;
                }
                Err(e) => {
                    log::warn!("range response body from {} ended early: {e}", self.inner.uri);
                    let slice_size = self.inner.options.slice_size;
                    let begin_slice = offset.div_ceil(slice_size) as usize;
                    let end_slice = end.div_ceil(slice_size) as usize;
                    if end_slice > begin_slice {
                        self.release_claim(begin_slice, end_slice);
                    }
                    self.fail(ErrorKind::RecvFailed);
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    fn write_and_mark(&self, begin: u64, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let wrote = self.inner.fragments.read().unwrap().write(data, begin);
        if let Err(e) = wrote {
            log::warn!("fragment write at offset {begin} failed: {e}");
            return;
        }

        let slice_size = self.inner.options.slice_size;
        let total_end = begin + data.len() as u64;
        let mut state = self.inner.state.lock().unwrap();
        let begin_slice = (begin / slice_size) as usize;
        let end_slice = if state.length >= 0 && total_end == state.length as u64 {
            total_end.div_ceil(slice_size) as usize
        } else {
            (total_end / slice_size) as usize
        };
        if end_slice > begin_slice {
            state.slices.commit_ready(begin_slice, end_slice);
        }
        drop(state);
        self.inner.condvar.notify_all();
    }
}

fn read_until_full(reader: &mut impl std::io::Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
