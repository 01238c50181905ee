use serde::Serialize;

/// Pagination metadata included in list responses.
#[derive(Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Current page number (1-based).
    #[schema(example = 1)]
    pub current_page: u64,
    #[schema(example = 3)]
    pub total_pages: u64,
    /// Total number of matching sessions across all pages.
    #[schema(example = 47)]
    pub total_sessions: u64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

impl Pagination {
    pub fn new(page: u64, per_page: u64, total: u64) -> Self {
        let total_pages = total.div_ceil(per_page.max(1));
        Self {
            current_page: page,
            total_pages,
            total_sessions: total,
            has_next_page: page < total_pages,
            has_prev_page: page > 1,
        }
    }
}
