//! Cursor-based pagination.
//!
//! Cursors are opaque continuation tokens: base64 over an internal
//! `offset:<n>` payload. Clients must treat them as black boxes; the
//! server validates on decode so a tampered cursor surfaces as
//! `InvalidParams` rather than a wild offset.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::Value;

use crate::error::ProtocolError;

/// Safety bound for cursor walks against a misbehaving server.
pub const MAX_PAGE_WALK: usize = 1_000;

/// One page of a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

impl<T> PageResult<T> {
    pub fn complete(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
            has_more: false,
        }
    }
}

/// Encode a continuation offset as an opaque cursor.
pub fn encode_cursor(offset: usize) -> String {
    URL_SAFE_NO_PAD.encode(format!("offset:{offset}"))
}

/// Decode a cursor back to its offset. Empty cursors mean "start from the
/// beginning".
pub fn decode_cursor(cursor: &str) -> Result<usize, ProtocolError> {
    if cursor.is_empty() {
        return Ok(0);
    }
    let invalid = || ProtocolError::InvalidParams(format!("invalid cursor: {cursor}"));
    let bytes = URL_SAFE_NO_PAD.decode(cursor).map_err(|_| invalid())?;
    let text = String::from_utf8(bytes).map_err(|_| invalid())?;
    let offset = text.strip_prefix("offset:").ok_or_else(invalid)?;
    offset.parse::<usize>().map_err(|_| invalid())
}

/// Slice one page out of an ordered snapshot.
///
/// The final page carries no cursor, giving callers a deterministic
/// loop-termination signal.
pub fn paginate<T: Clone>(
    items: &[T],
    cursor: Option<&str>,
    page_size: usize,
) -> Result<PageResult<T>, ProtocolError> {
    let start = decode_cursor(cursor.unwrap_or(""))?;
    if start > items.len() {
        return Err(ProtocolError::InvalidParams(format!(
            "cursor offset {start} is past the end of the listing"
        )));
    }
    let page_size = page_size.max(1);
    let end = (start + page_size).min(items.len());
    let has_more = end < items.len();
    Ok(PageResult {
        items: items[start..end].to_vec(),
        next_cursor: has_more.then(|| encode_cursor(end)),
        has_more,
    })
}

/// Parse a `{<items>: [...], nextCursor: ...}` listing result received
/// from a server.
pub fn parse_page(result: &Value, items_field: &str) -> Result<PageResult<Value>, ProtocolError> {
    let obj = result.as_object().ok_or_else(|| {
        ProtocolError::InvalidRequest("list result is not a JSON object".to_string())
    })?;
    let items = match obj.get(items_field) {
        Some(Value::Array(items)) => items.clone(),
        Some(_) => {
            return Err(ProtocolError::InvalidRequest(format!(
                "\"{items_field}\" is not an array"
            )))
        }
        None => Vec::new(),
    };
    let next_cursor = obj
        .get("nextCursor")
        .and_then(Value::as_str)
        .filter(|c| !c.is_empty())
        .map(str::to_string);
    let has_more = next_cursor.is_some();
    Ok(PageResult {
        items,
        next_cursor,
        has_more,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_roundtrip() {
        for offset in [0, 1, 7, 10_000] {
            assert_eq!(decode_cursor(&encode_cursor(offset)).unwrap(), offset);
        }
    }

    #[test]
    fn test_empty_cursor_starts_at_beginning() {
        assert_eq!(decode_cursor("").unwrap(), 0);
    }

    #[test]
    fn test_tampered_cursor_rejected() {
        assert!(matches!(
            decode_cursor("not-base64!!"),
            Err(ProtocolError::InvalidParams(_))
        ));
        let bogus = URL_SAFE_NO_PAD.encode("offset:not-a-number");
        assert!(matches!(
            decode_cursor(&bogus),
            Err(ProtocolError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_paginate_walk_yields_all_items_once() {
        let items: Vec<i32> = (0..10).collect();
        let mut collected = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0;
        loop {
            let page = paginate(&items, cursor.as_deref(), 3).unwrap();
            collected.extend(page.items);
            pages += 1;
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        assert_eq!(collected, items);
        assert_eq!(pages, 4);
    }

    #[test]
    fn test_paginate_single_page() {
        let items = vec!["a", "b"];
        let page = paginate(&items, None, 50).unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(page.next_cursor.is_none());
        assert!(!page.has_more);
    }

    #[test]
    fn test_paginate_empty_listing() {
        let items: Vec<i32> = Vec::new();
        let page = paginate(&items, None, 10).unwrap();
        assert!(page.items.is_empty());
        assert!(!page.has_more);
    }

    #[test]
    fn test_paginate_cursor_past_end_rejected() {
        let items = vec![1, 2, 3];
        let cursor = encode_cursor(10);
        assert!(matches!(
            paginate(&items, Some(cursor.as_str()), 2),
            Err(ProtocolError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_parse_page() {
        let result = serde_json::json!({
            "tools": [{"name": "a"}, {"name": "b"}],
            "nextCursor": "abc"
        });
        let page = parse_page(&result, "tools").unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.next_cursor.as_deref(), Some("abc"));
        assert!(page.has_more);
    }

    #[test]
    fn test_parse_page_last_page() {
        let result = serde_json::json!({ "resources": [] });
        let page = parse_page(&result, "resources").unwrap();
        assert!(page.items.is_empty());
        assert!(page.next_cursor.is_none());
    }
}
