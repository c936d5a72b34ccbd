//! Crate-wide error type.
//!
//! Every fallible call site in this crate goes through the [err_at] macro,
//! which stamps the call site (`file!():line!()`) onto the error so that a
//! log line or a test failure can point straight at the code that raised it.

use std::{fmt, result};

/// Error taxonomy for the indexing engine (spec §7).
///
/// `NoMatch`, `Unindexed` and `FallbackFull` from the taxonomy are *not*
/// variants here: they are first-class planner/search outcomes (see
/// [crate::planner::PlanOutcome] and [crate::search::ScopeOutcome]) and never
/// travel through `Result`'s error channel at a public boundary. `Unindexed`
/// still appears below because a handful of internal helpers find it
/// convenient to propagate it with `?` before the caller folds it back into
/// a `PlanOutcome`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A uniqueness constraint was violated, or could not be enforced
    /// because the index key was truncated.
    ConstraintViolation(String, String),
    /// A stored index record failed a version/format check.
    CorruptedIndex(String, String),
    /// Allocation failure, backing-store I/O error, invalid configuration.
    OperationsError(String, String),
    /// The planner could not produce a sound candidate set.
    Unindexed(String, String),
    /// Wraps a backing-store I/O failure.
    IOError(String, String),
    /// A numeric or byte-length conversion failed.
    FailConvert(String, String),
    /// Caller-supplied input was malformed (e.g. canonicalisation failure).
    InvalidInput(String, String),
    /// Operation intentionally unimplemented (e.g. read-only database).
    NotImplemented(String, String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Error::*;

        match self {
            ConstraintViolation(l, m) => write!(f, "[{}] constraint violation: {}", l, m),
            CorruptedIndex(l, m) => write!(f, "[{}] corrupted index: {}", l, m),
            OperationsError(l, m) => write!(f, "[{}] operations error: {}", l, m),
            Unindexed(l, m) => write!(f, "[{}] unindexed: {}", l, m),
            IOError(l, m) => write!(f, "[{}] io error: {}", l, m),
            FailConvert(l, m) => write!(f, "[{}] conversion failed: {}", l, m),
            InvalidInput(l, m) => write!(f, "[{}] invalid input: {}", l, m),
            NotImplemented(l, m) => write!(f, "[{}] not implemented: {}", l, m),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

/// Stamp the current call site onto an `Error` variant.
///
/// ```ignore
/// err_at!(IOError, fs::read(path))?;
/// err_at!(InvalidInput, msg: "bad attribute {:?}", name)?;
/// ```
#[macro_export]
macro_rules! err_at {
    ($v:ident, msg: $($arg:expr),+) => {{
        let location = format!("{}:{}", file!(), line!());
        Err($crate::error::Error::$v(location, format!($($arg),+)))
    }};
    ($v:ident, $e:expr) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let location = format!("{}:{}", file!(), line!());
                Err($crate::error::Error::$v(location, format!("{}", err)))
            }
        }
    }};
}
