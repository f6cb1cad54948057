//! Opaque cursor pagination for list operations.
//!
//! A cursor is the URL-safe base64 encoding of the decimal offset of the next
//! item. Clients must treat it as opaque; anything that does not decode to an
//! offset within the list is rejected.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::types::{HostError, HostResult};

/// Page size used when a provider is not configured with one.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// One page of a listing plus the cursor for the next page, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default, rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_cursor: Option<String>) -> Self {
        Self { items, next_cursor }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_cursor: self.next_cursor,
        }
    }
}

/// Slice `items` starting at `cursor`, returning at most `size` entries.
pub fn paginate<T: Clone>(items: &[T], cursor: Option<&str>, size: usize) -> HostResult<Page<T>> {
    let start = match cursor {
        Some(c) => decode_cursor(c)?,
        None => 0,
    };
    if start > items.len() {
        return Err(HostError::InvalidCursor(format!(
            "offset {start} is past the end of the list"
        )));
    }

    let end = items.len().min(start.saturating_add(size.max(1)));
    let next_cursor = (end < items.len()).then(|| encode_cursor(end));

    Ok(Page::new(items[start..end].to_vec(), next_cursor))
}

/// Encode an offset as an opaque cursor.
pub fn encode_cursor(offset: usize) -> String {
    URL_SAFE_NO_PAD.encode(offset.to_string())
}

/// Decode an opaque cursor back into an offset.
pub fn decode_cursor(cursor: &str) -> HostResult<usize> {
    let bytes = URL_SAFE_NO_PAD
        .decode(cursor.trim())
        .map_err(|_| HostError::InvalidCursor(cursor.to_string()))?;
    let text = String::from_utf8(bytes).map_err(|_| HostError::InvalidCursor(cursor.to_string()))?;
    text.parse::<usize>()
        .map_err(|_| HostError::InvalidCursor(cursor.to_string()))
}
