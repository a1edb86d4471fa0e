use super::traits::{DEFAULT_LIST_LIMIT, ListProductsParams, ListProductsResult, ProductRepository};
use crate::errors::ApiError;
use crate::models::{AmazonProductRecord, NewAmazonProduct};
use crate::schema::amazon_products;
use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error};

#[derive(Clone)]
pub struct SqliteProductRepository {
    db: Arc<Mutex<SqliteConnection>>,
}

impl SqliteProductRepository {
    pub fn new(db: Arc<Mutex<SqliteConnection>>) -> Self {
        Self { db }
    }

    fn conn(&self) -> Result<MutexGuard<'_, SqliteConnection>, ApiError> {
        self.db.lock().map_err(|_| {
            error!("Database connection mutex poisoned");
            ApiError::InternalError
        })
    }
}

#[async_trait]
impl ProductRepository for SqliteProductRepository {
    async fn find_by_asin(&self, asin: &str) -> Result<Option<AmazonProductRecord>, ApiError> {
        let mut conn = self.conn()?;
        let result = amazon_products::table
            .filter(amazon_products::asin.eq(asin))
            .select(AmazonProductRecord::as_select())
            .first(&mut *conn)
            .optional()?;
        Ok(result)
    }

    async fn insert_if_absent(&self, product: &NewAmazonProduct) -> Result<bool, ApiError> {
        let mut conn = self.conn()?;

        let existing: i64 = amazon_products::table
            .filter(amazon_products::asin.eq(&product.asin))
            .count()
            .get_result(&mut *conn)?;
        if existing > 0 {
            debug!(asin = %product.asin, "Product already cataloged");
            return Ok(false);
        }

        // UNIQUE(asin) closes the gap between the check and the insert
        let inserted = diesel::insert_or_ignore_into(amazon_products::table)
            .values(product)
            .execute(&mut *conn)?;
        Ok(inserted > 0)
    }

    async fn list(&self, params: &ListProductsParams) -> Result<ListProductsResult, ApiError> {
        let mut conn = self.conn()?;

        let mut query = amazon_products::table
            .select(AmazonProductRecord::as_select())
            .order(amazon_products::created_at.desc())
            .then_order_by(amazon_products::id.desc())
            .limit(i64::from(params.limit.unwrap_or(DEFAULT_LIST_LIMIT)))
            .offset(i64::from(params.offset.unwrap_or(0)))
            .into_boxed();
        let mut count_query = amazon_products::table.count().into_boxed();

        if params.active_only {
            query = query.filter(amazon_products::is_active.eq(true));
            count_query = count_query.filter(amazon_products::is_active.eq(true));
        }

        let items = query.load(&mut *conn)?;
        let total: i64 = count_query.get_result(&mut *conn)?;

        Ok(ListProductsResult {
            items,
            total: total.max(0) as u64,
        })
    }
}
