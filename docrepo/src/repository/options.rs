//! Option sets and result summaries for repository operations
//!
//! Reads take [`QueryOptions`]; writes, deletes and bulk calls take
//! [`SessionOptions`]. Both carry an optional [`Session`] that binds the call to
//! a running transaction.

use serde::{Deserialize, Serialize};

use crate::document::{Document, Filter};
use crate::store::{FindQuery, OrderDirection, Populate, Session};

/// Options for read operations
///
/// ```rust
/// use docrepo::repository::{OrderDirection, QueryOptions};
/// use docrepo::doc;
///
/// let options = QueryOptions::new()
///     .select(doc! { "name": 1, "email": 1 })
///     .sort_by("createdAt", OrderDirection::Descending)
///     .limit(20);
/// assert_eq!(options.limit, Some(20));
/// ```
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Inclusion or exclusion projection
    pub select: Option<Document>,
    /// Relations to expand
    pub populate: Vec<Populate>,
    /// Sort keys, most significant first
    pub sort: Vec<(String, OrderDirection)>,
    /// Maximum number of results
    pub limit: Option<u64>,
    /// Number of results to skip
    pub skip: Option<u64>,
    /// Transaction session to bind the read to
    pub session: Option<Session>,
}

impl QueryOptions {
    /// Empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict returned fields
    #[must_use]
    pub fn select(mut self, projection: Document) -> Self {
        self.select = Some(projection);
        self
    }

    /// Expand a relation
    #[must_use]
    pub fn populate(mut self, populate: Populate) -> Self {
        self.populate.push(populate);
        self
    }

    /// Append a sort key
    #[must_use]
    pub fn sort_by(mut self, field: impl Into<String>, direction: OrderDirection) -> Self {
        self.sort.push((field.into(), direction));
        self
    }

    /// Limit the number of results
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip results
    #[must_use]
    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Bind to a transaction session
    #[must_use]
    pub fn session(mut self, session: &Session) -> Self {
        self.session = Some(session.clone());
        self
    }

    pub(crate) fn to_find_query(&self, filter: Filter) -> FindQuery {
        FindQuery {
            filter,
            projection: self.select.clone(),
            sort: self.sort.clone(),
            skip: self.skip,
            limit: self.limit,
            populate: self.populate.clone(),
        }
    }
}

impl From<&Session> for QueryOptions {
    fn from(session: &Session) -> Self {
        Self::new().session(session)
    }
}

/// Options for write, delete and bulk operations
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Transaction session to bind the write to
    pub session: Option<Session>,
}

impl SessionOptions {
    /// No session: the write runs directly
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind to a transaction session
    pub fn with_session(session: &Session) -> Self {
        Self {
            session: Some(session.clone()),
        }
    }
}

impl From<&Session> for SessionOptions {
    fn from(session: &Session) -> Self {
        Self::with_session(session)
    }
}

/// Page request (1-indexed)
///
/// ```rust
/// use docrepo::repository::PaginationOptions;
///
/// let page = PaginationOptions::new(3, 20);
/// assert_eq!(page.skip(), 40);
///
/// // zero values fall back to the defaults
/// let fixed = PaginationOptions::new(0, 0).normalized();
/// assert_eq!((fixed.page, fixed.limit), (1, 10));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationOptions {
    /// Page number, starting at 1
    pub page: u64,
    /// Page size
    pub limit: u64,
}

impl PaginationOptions {
    /// Default page number
    pub const DEFAULT_PAGE: u64 = 1;
    /// Default page size
    pub const DEFAULT_LIMIT: u64 = 10;

    /// Create a page request
    #[must_use]
    pub const fn new(page: u64, limit: u64) -> Self {
        Self { page, limit }
    }

    /// Replace zero page or limit with the defaults
    #[must_use]
    pub const fn normalized(self) -> Self {
        Self {
            page: if self.page == 0 {
                Self::DEFAULT_PAGE
            } else {
                self.page
            },
            limit: if self.limit == 0 {
                Self::DEFAULT_LIMIT
            } else {
                self.limit
            },
        }
    }

    /// Number of documents before this page
    #[must_use]
    pub const fn skip(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

impl Default for PaginationOptions {
    fn default() -> Self {
        Self {
            page: Self::DEFAULT_PAGE,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

/// Page metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    /// Documents matching the filter
    pub total: u64,
    /// Current page
    pub page: u64,
    /// Page size
    pub limit: u64,
    /// Number of pages
    pub pages: u64,
    /// Whether a later page exists
    pub has_next: bool,
    /// Whether an earlier page exists
    pub has_prev: bool,
}

impl PaginationMeta {
    /// Compute page metadata; `limit` must be non-zero (use
    /// [`PaginationOptions::normalized`])
    pub fn new(total: u64, page: u64, limit: u64) -> Self {
        let pages = total.div_ceil(limit.max(1));
        Self {
            total,
            page,
            limit,
            pages,
            has_next: page < pages,
            has_prev: page > 1,
        }
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginatedResult<T> {
    /// Documents on this page
    pub data: Vec<T>,
    /// Page metadata
    pub pagination: PaginationMeta,
}

impl<T> PaginatedResult<T> {
    /// Transform the page contents, keeping the metadata
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PaginatedResult<U> {
        PaginatedResult {
            data: self.data.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}

/// Result of `update_many`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateManyResult {
    /// Documents matching the filter
    pub matched_count: u64,
    /// Documents actually changed
    pub modified_count: u64,
}

/// Result of `delete_many`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteManyResult {
    /// Documents removed
    pub deleted_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use serde_json::json;

    #[test]
    fn test_pagination_meta_invariant() {
        for (total, page, limit, pages, next, prev) in [
            (25, 1, 10, 3, true, false),
            (25, 3, 10, 3, false, true),
            (30, 2, 10, 3, true, true),
            (0, 1, 10, 0, false, false),
            (1, 1, 1, 1, false, false),
            (5, 9, 2, 3, false, true),
        ] {
            let meta = PaginationMeta::new(total, page, limit);
            assert_eq!(meta.pages, pages, "total={total} limit={limit}");
            assert_eq!(meta.has_next, next);
            assert_eq!(meta.has_prev, prev);
        }
    }

    #[test]
    fn test_pagination_options() {
        assert_eq!(PaginationOptions::default(), PaginationOptions::new(1, 10));
        assert_eq!(PaginationOptions::new(1, 10).skip(), 0);
        assert_eq!(PaginationOptions::new(2, 10).skip(), 10);
        assert_eq!(
            PaginationOptions::new(0, 5).normalized(),
            PaginationOptions::new(1, 5)
        );
    }

    #[test]
    fn test_paginated_result_wire_shape() {
        let result = PaginatedResult {
            data: vec![json!({ "name": "a" })],
            pagination: PaginationMeta::new(25, 1, 10),
        };
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "data": [{ "name": "a" }],
                "pagination": {
                    "total": 25, "page": 1, "limit": 10, "pages": 3,
                    "hasNext": true, "hasPrev": false
                }
            })
        );
    }

    #[test]
    fn test_query_options_to_find_query() {
        let options = QueryOptions::new()
            .select(doc! { "name": 1 })
            .populate(Populate::new("author", "users"))
            .sort_by("price", OrderDirection::Ascending)
            .skip(5)
            .limit(10);
        let query = options.to_find_query(doc! { "status": "active" });
        assert_eq!(query.filter, doc! { "status": "active" });
        assert_eq!(query.projection, Some(doc! { "name": 1 }));
        assert_eq!(query.sort, vec![("price".to_string(), OrderDirection::Ascending)]);
        assert_eq!((query.skip, query.limit), (Some(5), Some(10)));
        assert_eq!(query.populate.len(), 1);
    }

    #[test]
    fn test_session_binding() {
        let session = Session::detached();
        let read = QueryOptions::from(&session);
        let write = SessionOptions::from(&session);
        assert!(read.session.as_ref().is_some_and(|s| s.same_as(&session)));
        assert!(write.session.as_ref().is_some_and(|s| s.same_as(&session)));
        assert!(SessionOptions::new().session.is_none());
    }

    #[test]
    fn test_summary_wire_shapes() {
        assert_eq!(
            serde_json::to_value(UpdateManyResult { matched_count: 2, modified_count: 1 }).unwrap(),
            json!({ "matchedCount": 2, "modifiedCount": 1 })
        );
        assert_eq!(
            serde_json::to_value(DeleteManyResult { deleted_count: 4 }).unwrap(),
            json!({ "deletedCount": 4 })
        );
    }
}
