//! The fragment store: a sequence of fixed-size, anonymous scratch files that
//! back the downloaded bytes of a handle. Each fragment is a plain temp file;
//! positional reads and writes never disturb a shared cursor, so callers on
//! different threads can address the same fragment concurrently.

use std::io;
use std::os::unix::fs::FileExt;

use tempfile::NamedTempFile;

pub struct FragmentStore {
    fragment_size: u64,
    fragments: Vec<NamedTempFile>,
}

impl FragmentStore {
    pub fn new(fragment_size: u64) -> Self {
        Self { fragment_size, fragments: Vec::new() }
    }

    fn fragment_count_for(length: i64, fragment_size: u64) -> usize {
        if length <= 0 {
            1
        } else {
            ((length as u64).div_ceil(fragment_size)) as usize
        }
    }

    /// Ensures exactly enough fragment files exist for `length` bytes at the
    /// given fragment size. Growing appends freshly allocated temp files;
    /// shrinking drops (and so deletes) the trailing ones.
    pub fn resize(&mut self, length: i64, fragment_size: u64) -> io::Result<()> {
        self.fragment_size = fragment_size;
        let count = Self::fragment_count_for(length, fragment_size);
        while self.fragments.len() < count {
            self.fragments.push(NamedTempFile::new()?);
        }
        self.fragments.truncate(count);
        Ok(())
    }

    /// Writes `data` at logical offset `begin`, splitting the write across
    /// fragment boundaries as needed.
    pub fn write(&self, data: &[u8], begin: u64) -> io::Result<()> {
        let mut frag_idx = (begin / self.fragment_size) as usize;
        let mut in_frag = begin % self.fragment_size;
        let mut off = 0usize;
        while off < data.len() {
            let frag_remaining = (self.fragment_size - in_frag) as usize;
            let chunk = frag_remaining.min(data.len() - off);
            let file = self
                .fragments
                .get(frag_idx)
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "fragment index out of range"))?;
            file.as_file().write_all_at(&data[off..off + chunk], in_frag)?;
            off += chunk;
            frag_idx += 1;
            in_frag = 0;
        }
        Ok(())
    }

    /// Reads into `buf` from a single fragment, clipped to that fragment's
    /// remaining bytes. Callers that need to cross a fragment boundary issue
    /// multiple calls.
    pub fn read(&self, buf: &mut [u8], frag_idx: usize, in_frag_offset: u64) -> io::Result<usize> {
        let file = self
            .fragments
            .get(frag_idx)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "fragment index out of range"))?;
        let max = (self.fragment_size - in_frag_offset) as usize;
        let len = buf.len().min(max);
        file.as_file().read_at(&mut buf[..len], in_frag_offset)
    }

    pub fn fragment_size(&self) -> u64 {
        self.fragment_size
    }

    /// Drops every fragment file, deleting the backing storage.
    pub fn close(&mut self) {
        self.fragments.clear();
    }
}
