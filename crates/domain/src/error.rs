use std::collections::HashMap;

/// A closed set of error kinds grouped by numeric range, mirroring the
/// taxonomy this subsystem was distilled from: input (E00x), external-host
/// (E10x), fetch (E20x), memory (E30x), system (E40x).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidParam,
    MissingParam,
    OutOfRange,
    BadFormat,

    HostUnreachable,
    AuthFailed,
    EntityNotFound,
    ServiceFailed,
    CircuitOpen,

    FetchTimeout,
    PageLoadFailed,
    FetchNoResults,
    ProviderError,
    BadUrl,
    TooLarge,

    StoreFailed,
    RetrieveFailed,
    EmbeddingFailed,
    GraphQueryFailed,
    NotFound,

    RateLimited,
    Timeout,
    CommandFailed,
    FsNotFound,
    FsDenied,
    Internal,
}

impl ErrorKind {
    /// The `E###` code for this kind.
    pub fn code(self) -> &'static str {
        use ErrorKind::*;
        match self {
            InvalidParam => "E001",
            MissingParam => "E002",
            OutOfRange => "E003",
            BadFormat => "E004",

            HostUnreachable => "E101",
            AuthFailed => "E102",
            EntityNotFound => "E103",
            ServiceFailed => "E104",
            CircuitOpen => "E105",

            FetchTimeout => "E201",
            PageLoadFailed => "E202",
            FetchNoResults => "E203",
            ProviderError => "E204",
            BadUrl => "E205",
            TooLarge => "E206",

            StoreFailed => "E301",
            RetrieveFailed => "E302",
            EmbeddingFailed => "E303",
            GraphQueryFailed => "E304",
            NotFound => "E305",

            RateLimited => "E401",
            Timeout => "E402",
            CommandFailed => "E403",
            FsNotFound => "E404",
            FsDenied => "E405",
            Internal => "E499",
        }
    }

    /// Whether this kind defaults to retryable, per the fixed retryable set:
    /// host-unreachable, fetch-timeout, page-load-failed, provider-error,
    /// embedding-failed, rate-limited, timeout, circuit-open.
    pub fn retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::HostUnreachable
                | ErrorKind::FetchTimeout
                | ErrorKind::PageLoadFailed
                | ErrorKind::ProviderError
                | ErrorKind::EmbeddingFailed
                | ErrorKind::RateLimited
                | ErrorKind::Timeout
                | ErrorKind::CircuitOpen
        )
    }
}

/// The shared error type for the memory subsystem.
#[derive(Debug, Clone)]
pub struct MemoryError {
    pub kind: ErrorKind,
    pub message: String,
    pub detail: HashMap<String, String>,
}

impl MemoryError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: HashMap::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.detail.insert(key.into(), value.into());
        self
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn retryable(&self) -> bool {
        self.kind.retryable()
    }
}

impl std::fmt::Display for MemoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.retryable() {
            write!(f, "[RETRYABLE] [{}] {}", self.code(), self.message)
        } else {
            write!(f, "[{}] {}", self.code(), self.message)
        }
    }
}

impl std::error::Error for MemoryError {}

impl From<std::io::Error> for MemoryError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => MemoryError::new(ErrorKind::FsNotFound, e.to_string()),
            std::io::ErrorKind::PermissionDenied => {
                MemoryError::new(ErrorKind::FsDenied, e.to_string())
            }
            _ => MemoryError::new(ErrorKind::Internal, e.to_string()),
        }
    }
}

impl From<serde_json::Error> for MemoryError {
    fn from(e: serde_json::Error) -> Self {
        MemoryError::new(ErrorKind::BadFormat, format!("json: {e}"))
    }
}

impl From<rusqlite::Error> for MemoryError {
    fn from(e: rusqlite::Error) -> Self {
        MemoryError::new(ErrorKind::StoreFailed, format!("sqlite: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, MemoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_wire_format_has_prefix() {
        let e = MemoryError::new(ErrorKind::Timeout, "deadline exceeded");
        assert_eq!(e.to_string(), "[RETRYABLE] [E402] deadline exceeded");
    }

    #[test]
    fn non_retryable_wire_format_has_no_prefix() {
        let e = MemoryError::new(ErrorKind::InvalidParam, "bad session id");
        assert_eq!(e.to_string(), "[E001] bad session id");
    }

    #[test]
    fn auth_failed_is_not_retryable() {
        assert!(!ErrorKind::AuthFailed.retryable());
    }

    #[test]
    fn embedding_failed_is_retryable() {
        assert!(ErrorKind::EmbeddingFailed.retryable());
    }
}
