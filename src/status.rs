//! Outcome of a ledger state transition

use std::fmt;

/// Result of processing a transaction or block.
///
/// - `Accepted`: terminal success
/// - `AlreadyHave`: duplicate, not an error
/// - `InFuture`: may become valid later, caller can retry
/// - `Invalid`: permanently rejected for this exact input
/// - `NotReachable`: references a chain point that is not known yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Accepted,
    AlreadyHave(String),
    InFuture(String),
    Invalid(String),
    NotReachable(String),
}

impl Status {
    pub fn invalid(detail: impl Into<String>) -> Self {
        Status::Invalid(detail.into())
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Status::Accepted)
    }

    /// Prefix the detail of a failed status, keeping its variant.
    ///
    /// # Panics
    ///
    /// Wrapping `Accepted` is a programming error.
    pub fn not_accepted(self, prefix: &str) -> Self {
        match self {
            Status::Accepted => panic!("not_accepted called on Accepted ({prefix})"),
            Status::AlreadyHave(d) => Status::AlreadyHave(format!("{prefix}: {d}")),
            Status::InFuture(d) => Status::InFuture(format!("{prefix}: {d}")),
            Status::Invalid(d) => Status::Invalid(format!("{prefix}: {d}")),
            Status::NotReachable(d) => Status::NotReachable(format!("{prefix}: {d}")),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Accepted => write!(f, "Accepted"),
            Status::AlreadyHave(d) => write!(f, "Already have {d}"),
            Status::InFuture(d) => write!(f, "In future {d}"),
            Status::Invalid(d) => write!(f, "Invalid {d}"),
            Status::NotReachable(d) => write!(f, "Not reachable {d}"),
        }
    }
}

/// Early-return the status unless it is `Accepted`.
#[macro_export]
macro_rules! ensure_accepted {
    ($status:expr) => {
        match $status {
            $crate::status::Status::Accepted => {}
            other => return Ok(other),
        }
    };
    ($status:expr, $prefix:expr) => {
        match $status {
            $crate::status::Status::Accepted => {}
            other => return Ok(other.not_accepted($prefix)),
        }
    };
}
