use crate::errors::ApiError;
use crate::models::{AmazonProductRecord, NewAmazonProduct};
use async_trait::async_trait;

pub const DEFAULT_LIST_LIMIT: u32 = 50;

#[derive(Debug, Clone, Default)]
pub struct ListProductsParams {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub active_only: bool,
}

#[derive(Debug, Clone)]
pub struct ListProductsResult {
    pub items: Vec<AmazonProductRecord>,
    pub total: u64,
}

#[async_trait]
pub trait ProductRepository: Clone + Send + Sync + 'static {
    async fn find_by_asin(&self, asin: &str) -> Result<Option<AmazonProductRecord>, ApiError>;

    /// Inserts the product unless its ASIN is already cataloged. Returns
    /// whether a row was written.
    async fn insert_if_absent(&self, product: &NewAmazonProduct) -> Result<bool, ApiError>;

    async fn list(&self, params: &ListProductsParams) -> Result<ListProductsResult, ApiError>;
}
