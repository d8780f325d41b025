//! Pagination for the run-listing endpoint.

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

const DEFAULT_PER_PAGE: u32 = 20;
const MAX_PER_PAGE: u32 = 100;

/// Query parameters for paged listings. Pages are 1-indexed; out-of-range
/// values are clamped rather than rejected.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaginationParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PaginationParams {
    pub fn per_page(&self) -> u32 {
        self.per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE)
    }

    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    /// SQL LIMIT, sized for the run store's signature.
    pub fn limit(&self) -> i64 {
        i64::from(self.per_page())
    }

    /// SQL OFFSET.
    pub fn offset(&self) -> i64 {
        i64::from((self.page() - 1) * self.per_page())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaginationMeta {
    pub page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

impl PaginationMeta {
    fn new(params: &PaginationParams, total_items: u64) -> Self {
        let per_page = params.per_page();
        let total_pages = total_items.div_ceil(u64::from(per_page)) as u32;
        Self {
            page: params.page(),
            per_page,
            total_items,
            total_pages,
        }
    }
}

/// One page of results plus the metadata a client needs to fetch the rest.
#[derive(Debug, Serialize)]
pub struct Paginated<T: Serialize> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T: Serialize> Paginated<T> {
    pub fn new(data: Vec<T>, params: &PaginationParams, total_items: u64) -> Self {
        Self {
            data,
            pagination: PaginationMeta::new(params, total_items),
        }
    }
}

impl<T: Serialize> IntoResponse for Paginated<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_clamping() {
        let params = PaginationParams::default();
        assert_eq!(params.limit(), 20);
        assert_eq!(params.offset(), 0);

        let params = PaginationParams {
            page: Some(0),
            per_page: Some(10_000),
        };
        assert_eq!(params.per_page(), MAX_PER_PAGE);
        assert_eq!(params.page(), 1);
    }

    #[test]
    fn offset_follows_the_page() {
        let params = PaginationParams {
            page: Some(3),
            per_page: Some(25),
        };
        assert_eq!(params.limit(), 25);
        assert_eq!(params.offset(), 50);
    }

    #[test]
    fn total_pages_rounds_up() {
        let params = PaginationParams {
            page: Some(1),
            per_page: Some(20),
        };
        let meta = PaginationMeta::new(&params, 41);
        assert_eq!(meta.total_pages, 3);
        assert_eq!(PaginationMeta::new(&params, 0).total_pages, 0);
    }
}
