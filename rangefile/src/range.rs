//! Building `Range` request headers and parsing `Content-Range` responses.

use crate::error::{ErrorKind, Result};

/// Computes the `[first, last]` inclusive byte bounds (as used in a `Range`
/// header) for claimed slices `[begin_slice, end_slice)`, clipped to `length`
/// when it is known. Returns `BadRange` if the computed bounds are empty or
/// inverted.
pub fn build_range(begin_slice: usize, end_slice: usize, slice_size: u64, length: i64) -> Result<(u64, u64)> {
    let first = begin_slice as u64 * slice_size;
    let raw_last = end_slice as u64 * slice_size;
    let last = if length > 0 { raw_last.min(length as u64) } else { raw_last };
    if last <= first {
        return Err(ErrorKind::BadRange.into_error());
    }
    Ok((first, last - 1))
}

pub fn format_range_header(first: u64, last: u64) -> String {
    format!("bytes={first}-{last}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub first: u64,
    pub last: u64,
    pub total: u64,
}

/// Parses a `Content-Range: bytes <first>-<last>/<total>` header value.
pub fn parse_content_range(header: &str) -> Result<ContentRange> {
    let bad = || ErrorKind::BadResponse.into_error();

    let rest = header.strip_prefix("bytes ").ok_or_else(bad)?;
    let (range, total) = rest.split_once('/').ok_or_else(bad)?;
    let (first, last) = range.split_once('-').ok_or_else(bad)?;

    let first: u64 = first.trim().parse().map_err(|_| bad())?;
    let last: u64 = last.trim().parse().map_err(|_| bad())?;
    let total: u64 = total.trim().parse().map_err(|_| bad())?;

    if total == 0 || first >= last || last >= total {
        return Err(bad());
    }

    Ok(ContentRange { first, last, total })
}
