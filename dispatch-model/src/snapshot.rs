//! Poll endpoint payloads.

use serde::{Deserialize, Serialize};

/// A snapshot listing. Endpoints return either a bare array or the array
/// wrapped as `{"data": [...]}` (optionally with a `total`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Listing<T> {
    Bare(Vec<T>),
    Wrapped {
        data: Vec<T>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total: Option<u64>,
    },
}

impl<T> Listing<T> {
    pub fn into_items(self) -> Vec<T> {
        match self {
            Listing::Bare(items) | Listing::Wrapped { data: items, .. } => items,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Listing::Bare(items) | Listing::Wrapped { data: items, .. } => {
                items.len()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the listing holds every matching row, judged by the reported
    /// total when present and by the page limit otherwise.
    pub fn is_complete(&self, page_limit: usize) -> bool {
        match self {
            Listing::Wrapped {
                data,
                total: Some(total),
            } => data.len() as u64 >= *total,
            _ => self.len() < page_limit,
        }
    }
}

impl<T> Default for Listing<T> {
    fn default() -> Self {
        Listing::Bare(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::post::Post;

    #[test]
    fn bare_and_wrapped_listings_decode() {
        let bare: Listing<Post> =
            serde_json::from_str(r#"[{"id":"A"},{"id":"B"}]"#).unwrap();
        let wrapped: Listing<Post> =
            serde_json::from_str(r#"{"data":[{"id":"A"}],"total":4}"#).unwrap();
        assert_eq!(bare.len(), 2);
        assert!(bare.is_complete(50));
        assert!(!wrapped.is_complete(50));
        assert_eq!(wrapped.into_items()[0].id.as_str(), "A");
    }

    #[test]
    fn full_page_without_total_is_not_complete() {
        let listing: Listing<Post> =
            serde_json::from_str(r#"[{"id":"A"},{"id":"B"}]"#).unwrap();
        assert!(!listing.is_complete(2));
    }
}
