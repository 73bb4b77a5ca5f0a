// shared/src/lib.rs

/// Failure reported by an injected collaborator, carried as-is.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// `Storage::get` was called for a key it does not hold. The engine
    /// always guards reads with `contains`, so hitting this from `Cache`
    /// means a storage implementation broke its contract.
    #[error("not found")]
    NotFound,
    #[error("fetch failed: {0}")]
    Fetch(#[source] BoxError),
    #[error("storage failed: {0}")]
    Storage(#[source] BoxError),
    #[error("ledger failed: {0}")]
    Ledger(#[source] BoxError),
}

impl Error {
    pub fn fetch(err: impl Into<BoxError>) -> Self {
        Self::Fetch(err.into())
    }

    pub fn storage(err: impl Into<BoxError>) -> Self {
        Self::Storage(err.into())
    }

    pub fn ledger(err: impl Into<BoxError>) -> Self {
        Self::Ledger(err.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
