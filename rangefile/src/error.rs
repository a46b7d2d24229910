macro_rules! multi_error {
    ($name:ident($($manual:ident),*); $($err:ident = $obj:ty);*) => {
        pub mod $name {
            use backtrace::Backtrace;

            #[derive(Debug)]
            pub enum Inner {
                $($err($obj),)*
                $($manual),*
            }

            impl std::fmt::Display for Inner { fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { std::fmt::Debug::fmt(self, f) } }
            impl std::error::Error for Inner {}

            $(impl From<$obj> for Inner { fn from(value: $obj) -> Self { Self::$err(value) } })*

            pub struct Error {
                inner: Inner,
                backtrace: Backtrace,
            }

            impl<Err> From<Err> for Error where Err: Into<Inner> {
                fn from(err: Err) -> Self {
                    Self {
                        inner: err.into(),
                        backtrace: Backtrace::new(),
                    }
                }
            }

            impl std::error::Error for Error {}
            impl std::fmt::Display for Error {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { std::fmt::Debug::fmt(self, f) }
            }

            impl std::fmt::Debug for Error {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    write!(f, "{:?}\n", &self.inner)?;
                    match std::env::var("RUST_BACKTRACE").as_ref().map(|i| i.as_ref()) {
                        Ok("full") => write!(f, "{:#?}", self.backtrace),
                        Ok("1") => write!(f, "{:?}", self.backtrace),
                        _ => write!(f, ""),
                    }
                }
            }
        }
    }
}

multi_error! { global();
    ManualError = crate::error::ManualError;
    IoError = std::io::Error;
    ReqwestError = reqwest::Error
}

pub type Result<T> = ::std::result::Result<T, global::Error>;
pub use global::Error;

/// The sticky error kinds of the handle's `status` (see the handle state machine).
///
/// Once one of these is recorded on a handle it is never replaced; every subsequent
/// read surfaces it after draining whatever bytes were already made ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The computed byte range for a claim was empty or inverted.
    BadRange,
    /// The range request could not be built or dispatched.
    BadRequest,
    /// The server responded with neither 200 nor 206.
    BadStatus,
    /// A 206 response's `Content-Range` header was missing or malformed.
    BadResponse,
    /// The response body ended with an I/O error before the claimed range was filled.
    RecvFailed,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

impl ErrorKind {
    /// Builds a fresh [`Error`] carrying this kind, for returning to a caller.
    pub fn into_error(self) -> Error {
        ManualError::Fatal(self).into()
    }
}

#[derive(Debug, Clone)]
pub enum ManualError {
    Fatal(ErrorKind),
}

impl std::error::Error for ManualError {}

impl std::fmt::Display for ManualError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_error_kind_names_itself_in_its_rendered_error() {
        let kinds = [
            (ErrorKind::BadRange, "BadRange"),
            (ErrorKind::BadRequest, "BadRequest"),
            (ErrorKind::BadStatus, "BadStatus"),
            (ErrorKind::BadResponse, "BadResponse"),
            (ErrorKind::RecvFailed, "RecvFailed"),
        ];
        for (kind, name) in kinds {
            let rendered = format!("{}", kind.into_error());
            assert!(rendered.contains(name), "expected {rendered:?} to mention {name}");
        }
    }
}
