//! # Errors
//!
//! Tally uses a small structured error set that can be carried through
//! `anyhow::Error` across async call chains and downcast again at the
//! transport boundary. Core goals:
//! - consistent status codes + class names
//! - domain kinds (`NotFound`, `Access`, `Config`, `TransientIo`) stay
//!   distinguishable all the way to the layer that renders them
//! - transport-agnostic (the HTTP crate decides how to serialize)

use std::fmt;

use anyhow::Error as AnyError;

/// A convenience result type for Tally core APIs.
pub type TallyResult<T> = std::result::Result<T, AnyError>;

/// Error classes Tally distinguishes, with their HTTP mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No record for the requested key. 404.
    NotFound,
    /// The backing store denied the read. 403 internally; the HTTP layer
    /// renders it as not-found so existence is not leaked.
    Access,
    /// A tenant record is missing or carries a malformed connection config.
    /// Operator-facing, not a user retry case. 500.
    Config,
    /// Network or backend hiccup during fetch or provisioning. Safe to retry
    /// the whole navigation. 503.
    TransientIo,
    /// Malformed request input. 400.
    BadRequest,
    /// Request was well-formed but failed validation. 422.
    Unprocessable,
    /// Anything else. 500.
    General,
}

impl ErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::Access => 403,
            ErrorKind::Config => 500,
            ErrorKind::TransientIo => 503,
            ErrorKind::BadRequest => 400,
            ErrorKind::Unprocessable => 422,
            ErrorKind::General => 500,
        }
    }

    /// Error `name` (e.g. "NotFound")
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Access => "Access",
            ErrorKind::Config => "Config",
            ErrorKind::TransientIo => "TransientIo",
            ErrorKind::BadRequest => "BadRequest",
            ErrorKind::Unprocessable => "Unprocessable",
            ErrorKind::General => "GeneralError",
        }
    }

    /// Error `className` (kebab-cased)
    pub fn class_name(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not-found",
            ErrorKind::Access => "access",
            ErrorKind::Config => "config",
            ErrorKind::TransientIo => "transient-io",
            ErrorKind::BadRequest => "bad-request",
            ErrorKind::Unprocessable => "unprocessable",
            ErrorKind::General => "general-error",
        }
    }
}

/// A structured Tally error that can live inside `anyhow::Error`.
///
/// Fields:
/// - kind (carries status code + class name)
/// - message
/// - data (optional)
/// - errors (optional, field-level validation detail)
#[derive(Debug)]
pub struct TallyError {
    pub kind: ErrorKind,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub errors: Option<serde_json::Value>,
    pub source: Option<AnyError>,
}

impl TallyError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: None,
            errors: None,
            source: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_errors(mut self, errors: serde_json::Value) -> Self {
        self.errors = Some(errors);
        self
    }

    pub fn with_source(mut self, source: AnyError) -> Self {
        self.source = Some(source);
        self
    }

    pub fn code(&self) -> u16 {
        self.kind.status_code()
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn class_name(&self) -> &'static str {
        self.kind.class_name()
    }

    /// Convert into `anyhow::Error` so it flows through async pipelines.
    pub fn into_anyhow(self) -> AnyError {
        AnyError::new(self)
    }

    /// Downcast an `anyhow::Error` to a `TallyError` if possible.
    pub fn from_anyhow(err: &AnyError) -> Option<&TallyError> {
        err.downcast_ref::<TallyError>()
    }

    /// Turn any error into a TallyError:
    /// - if it's already a TallyError, keep it (lossless)
    /// - otherwise wrap as General
    pub fn normalize(err: AnyError) -> TallyError {
        match err.downcast::<TallyError>() {
            Ok(tally) => tally,
            Err(other) => TallyError::new(ErrorKind::General, other.to_string()).with_source(other),
        }
    }

    /// A version suitable for returning to clients:
    /// - keep kind/message/code/class_name/data/errors
    /// - drop the inner `source` (stack/secret details)
    pub fn sanitize_for_client(&self) -> TallyError {
        TallyError {
            kind: self.kind,
            message: self.message.clone(),
            data: self.data.clone(),
            errors: self.errors.clone(),
            source: None,
        }
    }

    /// JSON payload for transports.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;

        let mut base = json!({
            "name": self.name(),
            "message": self.message,
            "code": self.code(),
            "className": self.class_name(),
        });

        if let Some(d) = &self.data {
            base["data"] = d.clone();
        }
        if let Some(e) = &self.errors {
            base["errors"] = e.clone();
        }
        base
    }

    // ---- Constructors ----

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }
    pub fn access(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Access, msg)
    }
    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, msg)
    }
    pub fn transient_io(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransientIo, msg)
    }
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, msg)
    }
    pub fn unprocessable(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unprocessable, msg)
    }
    pub fn general(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::General, msg)
    }
}

impl fmt::Display for TallyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name(), self.code(), self.message)
    }
}

impl std::error::Error for TallyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Convenience helper for "bail with TallyError".
#[macro_export]
macro_rules! bail_tally {
    ($ctor:ident, $msg:expr) => {
        return Err($crate::errors::TallyError::$ctor($msg).into_anyhow());
    };
    ($ctor:ident, $fmt:expr, $($arg:tt)*) => {
        return Err($crate::errors::TallyError::$ctor(format!($fmt, $($arg)*)).into_anyhow());
    };
}
