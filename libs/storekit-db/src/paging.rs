//! Offset pagination: [`Page`] value object and the engine that slices a query.

use sea_orm::{ConnectionTrait, EntityTrait, PaginatorTrait, QuerySelect, Select};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Result;

/// Page parameters that can never produce a valid page.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PageError {
    #[error("From: {from} > Index: {index}, must From <= Index")]
    OriginAfterIndex { from: u64, index: u64 },

    #[error("page size must be at least 1")]
    ZeroSize,
}

/// Which page to fetch.
///
/// `from` is the index of the first page: 1 by default, 0 for zero-based
/// paging.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub index: u64,
    pub size: u64,
    pub from: u64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, 10)
    }
}

impl PageRequest {
    #[must_use]
    pub const fn new(index: u64, size: u64) -> Self {
        Self {
            index,
            size,
            from: 1,
        }
    }

    #[must_use]
    pub const fn with_origin(self, from: u64) -> Self {
        Self { from, ..self }
    }

    /// # Errors
    /// `PageError::OriginAfterIndex` when `from > index`, `PageError::ZeroSize`
    /// when `size == 0`.
    pub const fn validate(&self) -> std::result::Result<(), PageError> {
        if self.from > self.index {
            return Err(PageError::OriginAfterIndex {
                from: self.from,
                index: self.index,
            });
        }
        if self.size == 0 {
            return Err(PageError::ZeroSize);
        }
        Ok(())
    }

    /// Rows to skip before this page.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.index.saturating_sub(self.from).saturating_mul(self.size)
    }
}

/// One page of results plus the counts needed to navigate.
///
/// `total_filtered` counts rows matching the query; `total` is a grand total
/// supplied by the caller and kept as given.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub index: u64,
    pub size: u64,
    pub from: u64,
    pub total: u64,
    pub total_filtered: u64,
    pub pages: u64,
    pub items: Vec<T>,
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Page<T> {
    /// A page with no items and all counters at zero.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            index: 0,
            size: 0,
            from: 0,
            total: 0,
            total_filtered: 0,
            pages: 0,
            items: Vec::new(),
        }
    }

    fn assemble(req: PageRequest, total: u64, total_filtered: u64, items: Vec<T>) -> Self {
        Self {
            index: req.index,
            size: req.size,
            from: req.from,
            total,
            total_filtered,
            pages: total_filtered.div_ceil(req.size),
            items,
        }
    }

    /// Paginate an in-memory collection.
    ///
    /// # Errors
    /// Returns `PageError` when the request is invalid; nothing is sliced.
    pub fn from_items(
        items: impl IntoIterator<Item = T>,
        req: PageRequest,
        total: u64,
    ) -> std::result::Result<Self, PageError> {
        req.validate()?;
        let all: Vec<T> = items.into_iter().collect();
        let total_filtered = all.len() as u64;
        let skip = usize::try_from(req.offset()).unwrap_or(usize::MAX);
        let take = usize::try_from(req.size).unwrap_or(usize::MAX);
        let slice = all.into_iter().skip(skip).take(take).collect();
        Ok(Self::assemble(req, total, total_filtered, slice))
    }

    #[must_use]
    pub const fn has_previous(&self) -> bool {
        self.index.saturating_sub(self.from) > 0
    }

    #[must_use]
    pub const fn has_next(&self) -> bool {
        self.index.saturating_sub(self.from).saturating_add(1) < self.pages
    }

    /// Convert the items of this page, keeping every counter.
    pub fn map<R>(self, converter: impl FnOnce(Vec<T>) -> Vec<R>) -> Page<R> {
        Page {
            index: self.index,
            size: self.size,
            from: self.from,
            total: self.total,
            total_filtered: self.total_filtered,
            pages: self.pages,
            items: converter(self.items),
        }
    }
}

/// Count `select`, then fetch the requested slice of it.
///
/// Filtering and ordering must already be applied to `select`.
///
/// # Errors
/// `DbError::Page` for invalid page parameters (checked before any query
/// runs), `DbError::Sea` when a query fails.
pub async fn paginate<E, C>(
    select: Select<E>,
    conn: &C,
    req: PageRequest,
    total: u64,
) -> Result<Page<E::Model>>
where
    E: EntityTrait,
    E::Model: Sync,
    C: ConnectionTrait,
{
    req.validate()?;
    let total_filtered = select.clone().count(conn).await?;
    let items = select
        .offset(req.offset())
        .limit(req.size)
        .all(conn)
        .await?;
    Ok(Page::assemble(req, total, total_filtered, items))
}

/// Like [`paginate`], applying `converter` to the fetched slice only.
///
/// # Errors
/// Same as [`paginate`].
pub async fn paginate_with<E, C, R>(
    select: Select<E>,
    conn: &C,
    req: PageRequest,
    total: u64,
    converter: impl FnOnce(Vec<E::Model>) -> Vec<R>,
) -> Result<Page<R>>
where
    E: EntityTrait,
    E::Model: Sync,
    C: ConnectionTrait,
{
    Ok(paginate(select, conn, req, total).await?.map(converter))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn page(index: u64, size: u64, n: u64) -> Page<u64> {
        Page::from_items(1..=n, PageRequest::new(index, size), 0).unwrap()
    }

    #[test]
    fn twenty_five_items_in_pages_of_ten() {
        let first = page(1, 10, 25);
        assert_eq!(first.pages, 3);
        assert!(!first.has_previous());
        assert!(first.has_next());
        assert_eq!(first.items.len(), 10);

        let last = page(3, 10, 25);
        assert!(last.has_previous());
        assert!(!last.has_next());
        assert_eq!(last.items, vec![21, 22, 23, 24, 25]);
    }

    #[test]
    fn item_count_matches_formula() {
        for n in [0_u64, 1, 9, 10, 11, 37] {
            for size in 1..=12_u64 {
                for index in 1..=6_u64 {
                    let p = page(index, size, n);
                    let expected = n.saturating_sub((index - 1) * size).min(size);
                    assert_eq!(p.items.len() as u64, expected, "n={n} size={size} index={index}");
                    assert_eq!(p.pages, n.div_ceil(size));
                }
            }
        }
    }

    #[test]
    fn zero_based_origin() {
        let p = Page::from_items(0..25, PageRequest::new(0, 10).with_origin(0), 0).unwrap();
        assert_eq!(p.items.first(), Some(&0));
        assert!(!p.has_previous());
        assert!(p.has_next());
    }

    #[test]
    fn origin_after_index_is_rejected() {
        let err = Page::from_items(0..5, PageRequest::new(1, 10).with_origin(2), 0).unwrap_err();
        assert_eq!(err, PageError::OriginAfterIndex { from: 2, index: 1 });
        assert_eq!(err.to_string(), "From: 2 > Index: 1, must From <= Index");
        assert_eq!(
            Page::from_items(0..5, PageRequest::new(1, 0), 0).unwrap_err(),
            PageError::ZeroSize
        );
    }

    #[test]
    fn map_keeps_counters_and_total() {
        let p = Page::from_items(1..=25, PageRequest::new(2, 10), 40).unwrap();
        let mapped = p.map(|items| items.into_iter().map(|i| i.to_string()).collect());
        assert_eq!(mapped.total, 40);
        assert_eq!(mapped.total_filtered, 25);
        assert_eq!(mapped.items.first().map(String::as_str), Some("11"));
    }

    #[test]
    fn empty_page_has_no_neighbours() {
        let p = Page::<u8>::empty();
        assert!(p.items.is_empty());
        assert!(!p.has_previous());
        assert!(!p.has_next());
    }
}
