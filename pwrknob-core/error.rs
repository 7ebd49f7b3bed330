use std::path::PathBuf;

use thiserror::Error;

use crate::props::PropertyValue;

#[derive(Error, Debug)]
pub enum PwrknobError {
    #[error("unknown property '{name}', known properties are: {known}")]
    UnknownProperty { name: String, known: String },

    #[error(
        "cannot access {prop} using the '{mechanism}' mechanism, \
         use one of the following mechanism(s) instead: {supported}"
    )]
    UnsupportedMechanism {
        prop: &'static str,
        mechanism: &'static str,
        supported: String,
    },

    #[error("cannot use the read-only '{mechanism}' mechanism for modifying {prop}")]
    ReadOnlyMechanism {
        prop: &'static str,
        mechanism: &'static str,
    },

    #[error("{prop} is read-only and cannot be modified")]
    ReadOnlyProperty { prop: &'static str },

    /// The "not found" failure class: a mechanism that does not exist on
    /// this platform/kernel. Drives transparent fallback in the resolver
    /// and is only surfaced when no mechanism is left to try.
    #[error("{what} is not supported on this platform")]
    NotSupported { what: String },

    #[error("{0}")]
    ScopeViolation(String),

    /// Sibling CPUs of one die/package disagree on a property whose I/O
    /// scope is finer than its scope. Carries every conflicting
    /// (CPU, value) pair; the framework never picks a winner.
    #[error(
        "cannot determine the value of {prop} for {unit}: {details}\n\
         This is possible because {prop} has '{scope}' scope, but '{ioscope}' I/O scope.\n\
         Use per-CPU access instead."
    )]
    AmbiguousScope {
        prop: &'static str,
        unit: String,
        scope: &'static str,
        ioscope: &'static str,
        details: String,
        pairs: Vec<(u32, PropertyValue)>,
    },

    #[error("value '{value}' for {prop} is out of range, must be within {min}..={max}")]
    OutOfRange {
        prop: &'static str,
        value: String,
        min: i64,
        max: i64,
    },

    #[error("bad value '{value}' for {prop}: {reason}")]
    InvalidValue {
        prop: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("permission denied while {what}: {guidance}")]
    PermissionDenied { what: String, guidance: String },

    #[error(
        "verification failed for register 0x{addr:X} on CPU {cpu}: \
         wrote 0x{expected:X} but read back 0x{actual:X} in the modified bits"
    )]
    VerifyFailed {
        addr: u64,
        cpu: u32,
        expected: u64,
        actual: u64,
    },

    #[error("a register-write transaction is already open")]
    TransactionAlreadyOpen,

    #[error("commit requested but no register-write transaction is open")]
    TransactionNotOpen,

    #[error("path '{path}' does not exist")]
    FileNotFound { path: PathBuf },

    #[error("CPU affinity operation failed: {0}")]
    Affinity(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PwrknobError {
    /// Whether this error belongs to the "not found" failure class that
    /// the mechanism resolver treats as "unsupported here, try the next
    /// mechanism". Everything else propagates immediately.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PwrknobError::NotSupported { .. } | PwrknobError::FileNotFound { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PwrknobError>;
