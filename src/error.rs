use std::{fmt, io};

/// Represents an error while reading, writing or converting MIDI data.
///
/// This type wraps an [`ErrorKind`] together with the chain of contexts that led to it.
/// Use [`Error::kind`] to find out what exactly went wrong, and [`Error::source`] to walk the
/// chain.
///
/// The `Debug` representation prints the whole chain, which makes `unwrap()` in tests and
/// examples informative.
pub struct Error {
    inner: Box<Chained>,
}

struct Chained {
    this: ErrorKind,
    src: Option<Error>,
    io: Option<io::Error>,
}

impl Error {
    /// Create a new error with the given `ErrorKind`.
    #[inline]
    pub fn new(kind: ErrorKind) -> Error {
        Error::from(kind)
    }

    /// More information about the error itself.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.inner.this
    }

    /// The underlying cause for this error.
    #[inline]
    pub fn source(&self) -> Option<&Error> {
        self.inner.src.as_ref()
    }

    /// The innermost error kind of the chain, usually the most specific one.
    pub fn root_kind(&self) -> ErrorKind {
        let mut err = self;
        while let Some(src) = err.source() {
            err = src;
        }
        err.kind()
    }

    /// Whether this error or any error in its chain is of the given kind.
    ///
    /// Only the variant is compared, the attached message is ignored.
    pub fn is(&self, kind: ErrorKind) -> bool {
        let mut maybe_err = Some(self);
        while let Some(err) = maybe_err {
            if err.kind().same_variant(&kind) {
                return true;
            }
            maybe_err = err.source();
        }
        false
    }

    pub(crate) fn chain_ctx(self, ctx: ErrorKind) -> Error {
        Error {
            inner: Box::new(Chained {
                this: ctx,
                src: Some(self),
                io: None,
            }),
        }
    }
}
impl From<ErrorKind> for Error {
    #[inline]
    fn from(kind: ErrorKind) -> Error {
        Error {
            inner: Box::new(Chained {
                this: kind,
                src: None,
                io: None,
            }),
        }
    }
}
impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        let kind = match err.kind() {
            io::ErrorKind::UnexpectedEof => {
                ErrorKind::NotEnoughBytes("reached the end of the underlying stream")
            }
            other => ErrorKind::Io(other),
        };
        Error {
            inner: Box::new(Chained {
                this: kind,
                src: None,
                io: Some(err),
            }),
        }
    }
}
impl fmt::Display for Error {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.kind(), f)
    }
}
impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.kind())?;
        if let Some(io) = &self.inner.io {
            write!(f, " ({})", io)?;
        }
        let mut maybe_src = self.source();
        while let Some(src) = maybe_src {
            writeln!(f)?;
            write!(f, "  caused by: {}", src.kind())?;
            if let Some(io) = &src.inner.io {
                write!(f, " ({})", io)?;
            }
            maybe_src = src.source();
        }
        Ok(())
    }
}
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self.source() {
            Some(src) => Some(src as &(dyn std::error::Error + 'static)),
            None => self
                .inner
                .io
                .as_ref()
                .map(|io| io as &(dyn std::error::Error + 'static)),
        }
    }
}

/// The type of error that occurred.
///
/// Every malformed-input condition has its own kind, and most of them are only raised when the
/// corresponding policy in [`ReadingSettings`](crate::ReadingSettings) is set to `Abort`.
/// The attached string is a non-normative description of what exactly failed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    #[error("malformed variable-length quantity: {0}")]
    MalformedVlq(&'static str),
    #[error("invalid channel event parameter value: {0}")]
    InvalidChannelEventParameterValue(&'static str),
    #[error("invalid meta event parameter value: {0}")]
    InvalidMetaEventParameterValue(&'static str),
    #[error("invalid system common event parameter value: {0}")]
    InvalidSystemCommonEventParameterValue(&'static str),
    #[error("invalid chunk size: {0}")]
    InvalidChunkSize(&'static str),
    #[error("not enough bytes: {0}")]
    NotEnoughBytes(&'static str),
    #[error("no header chunk: {0}")]
    NoHeaderChunk(&'static str),
    #[error("missed end of track event: {0}")]
    MissedEndOfTrackEvent(&'static str),
    #[error("unexpected running status: {0}")]
    UnexpectedRunningStatus(&'static str),
    #[error("unknown channel event: {0}")]
    UnknownChannelEvent(&'static str),
    #[error("unknown file format: {0}")]
    UnknownFileFormat(&'static str),
    #[error("unknown chunk id: {0}")]
    UnknownChunkId(&'static str),
    #[error("unexpected track chunks count: {0}")]
    UnexpectedTrackChunksCount(&'static str),
    #[error("unsupported time division: {0}")]
    UnsupportedTimeDivision(&'static str),
    #[error("negative value: {0}")]
    NegativeValue(&'static str),
    #[error("value out of range: {0}")]
    OutOfRange(&'static str),
    #[error("invalid operation: {0}")]
    InvalidOperation(&'static str),
    #[error("invalid midi: {0}")]
    Invalid(&'static str),
    #[error("i/o error: {0:?}")]
    Io(io::ErrorKind),
}
impl ErrorKind {
    /// Get the informative message on what exact part of the MIDI format was not respected.
    pub fn message(&self) -> &'static str {
        use self::ErrorKind::*;
        match *self {
            MalformedVlq(msg)
            | InvalidChannelEventParameterValue(msg)
            | InvalidMetaEventParameterValue(msg)
            | InvalidSystemCommonEventParameterValue(msg)
            | InvalidChunkSize(msg)
            | NotEnoughBytes(msg)
            | NoHeaderChunk(msg)
            | MissedEndOfTrackEvent(msg)
            | UnexpectedRunningStatus(msg)
            | UnknownChannelEvent(msg)
            | UnknownFileFormat(msg)
            | UnknownChunkId(msg)
            | UnexpectedTrackChunksCount(msg)
            | UnsupportedTimeDivision(msg)
            | NegativeValue(msg)
            | OutOfRange(msg)
            | InvalidOperation(msg)
            | Invalid(msg) => msg,
            Io(_) => "i/o error",
        }
    }

    fn same_variant(&self, other: &ErrorKind) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Build an `ErrorKind` of the given variant with a static message.
macro_rules! err {
    ($kind:ident, $msg:expr) => {
        $crate::error::ErrorKind::$kind($msg)
    };
}

pub(crate) trait ResultExt<T> {
    fn context(self, ctx: ErrorKind) -> StdResult<T, Error>;
}
impl<T> ResultExt<T> for StdResult<T, Error> {
    #[inline]
    fn context(self, ctx: ErrorKind) -> StdResult<T, Error> {
        self.map_err(|err| err.chain_ctx(ctx))
    }
}
impl<T> ResultExt<T> for StdResult<T, ErrorKind> {
    #[inline]
    fn context(self, ctx: ErrorKind) -> StdResult<T, Error> {
        self.map_err(|errkind| Error::from(errkind).chain_ctx(ctx))
    }
}

/// The result type used throughout the crate.
pub type Result<T> = StdResult<T, Error>;
pub(crate) use std::result::Result as StdResult;
