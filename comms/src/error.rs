use std::{error::Error, fmt, io};

/// The comms module's result type.
pub type Result<T> = std::result::Result<T, CommErr>;

/// Communication layer failures.
#[derive(Debug)]
pub enum CommErr {
    Io(io::Error),
    /// The producing side of an exchange went away before resolving the handle.
    Lost,
    BucketCountMismatch {
        got: usize,
        expected: usize,
    },
}

impl fmt::Display for CommErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommErr::Io(e) => write!(f, "io error: {e}"),
            CommErr::Lost => write!(f, "exchange abandoned before the result was produced"),
            CommErr::BucketCountMismatch { got, expected } => write!(
                f,
                "all-to-all input has {got} destination buckets, expected world size {expected}"
            ),
        }
    }
}

impl Error for CommErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CommErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CommErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<CommErr> for io::Error {
    fn from(value: CommErr) -> Self {
        match value {
            CommErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}
