//! A seekable, random-access byte stream over an HTTP resource that supports
//! range requests.
//!
//! [`Handle::open`] starts downloading a resource in the background and
//! returns immediately; [`Handle::read`] blocks only until the bytes it needs
//! have arrived, and [`Handle::seek`] jumps the read pointer anywhere in the
//! resource, pulling in a fresh worker if the new position isn't already
//! warm. Downloaded bytes are cached in on-disk scratch files for the life of
//! the handle and are not persisted across handles.

pub mod error;
mod fragment;
mod handle;
mod range;
mod slices;
mod worker;

pub use error::{Error, ErrorKind, Result};
pub use handle::{Handle, Options};
