//! Pagination types for list queries.
//!
//! A [`PageCursor`] pins a paginated sequence to the epoch it started in
//! (`anchor`, e.g. the chain tip or the newest timestamp at first page) and
//! records how many items were already returned (`offset`). Replaying the
//! same cursor always yields the same window, and following `next` never
//! returns an item twice within one epoch.
//!
//! On the wire a cursor is an opaque hex token that also carries the scope
//! it was minted for, so a transfers cursor cannot be fed to a timeseries
//! query.

use thiserror::Error;

/// Maximum accepted length of an encoded cursor.
pub const MAX_CURSOR_LENGTH: usize = 256;

/// Resume position inside a paginated sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    /// Epoch anchor fixed by the first page.
    pub anchor: u64,
    /// Number of items already returned in this epoch.
    pub offset: u64,
}

/// Why a cursor token was rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CursorError {
    #[error("cursor too long")]
    TooLong,
    #[error("cursor is not valid hex")]
    NotHex,
    #[error("cursor is malformed")]
    Malformed,
    #[error("cursor was issued for `{found}`, not `{expected}`")]
    WrongScope { expected: String, found: String },
}

impl PageCursor {
    pub fn new(anchor: u64, offset: u64) -> Self {
        Self { anchor, offset }
    }

    /// Cursor for the window following `taken` more items.
    pub fn advance(&self, taken: u64) -> Self {
        Self {
            anchor: self.anchor,
            offset: self.offset.saturating_add(taken),
        }
    }

    /// Encode into an opaque token bound to `scope`.
    pub fn encode(&self, scope: &str) -> String {
        hex::encode(format!("{}:{}:{}", scope, self.anchor, self.offset))
    }

    /// Decode a token previously produced by [`PageCursor::encode`] for `scope`.
    pub fn decode(scope: &str, token: &str) -> Result<Self, CursorError> {
        if token.len() > MAX_CURSOR_LENGTH {
            return Err(CursorError::TooLong);
        }

        let bytes = hex::decode(token).map_err(|_| CursorError::NotHex)?;
        let text = String::from_utf8(bytes).map_err(|_| CursorError::Malformed)?;

        let mut parts = text.rsplitn(3, ':');
        let offset = parts.next().ok_or(CursorError::Malformed)?;
        let anchor = parts.next().ok_or(CursorError::Malformed)?;
        let found = parts.next().ok_or(CursorError::Malformed)?;

        if found != scope {
            return Err(CursorError::WrongScope {
                expected: scope.to_string(),
                found: found.to_string(),
            });
        }

        Ok(Self {
            anchor: anchor.parse().map_err(|_| CursorError::Malformed)?,
            offset: offset.parse().map_err(|_| CursorError::Malformed)?,
        })
    }
}

/// One page of results plus the cursor of the next page.
///
/// `next` is `None` once the sequence is exhausted.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<PageCursor>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next: Option<PageCursor>) -> Self {
        Self { items, next }
    }

    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next: None,
        }
    }
}

/// Cursor scope for the ETH transfers sequence.
pub const TRANSFERS_SCOPE: &str = "transfers";

/// Cursor scope for a metric's timeseries.
pub fn timeseries_scope(key: &str) -> String {
    format!("timeseries/{}", key)
}
