use crate::amazon::AmazonProduct;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = crate::schema::amazon_products)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AmazonProductRecord {
    pub id: i32,
    pub asin: String,
    pub title: String,
    pub description: String,
    pub price: String,
    pub rating: f64,
    pub reviews: i32,
    pub image: String,
    pub url: String,
    pub category: String,
    /// JSON array of tag strings
    pub tags: String,
    pub is_active: bool,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

impl AmazonProductRecord {
    /// Tags decoded from their stored JSON form. Malformed rows yield no tags.
    pub fn tag_list(&self) -> Vec<String> {
        serde_json::from_str(&self.tags).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Insertable, Deserialize)]
#[diesel(table_name = crate::schema::amazon_products)]
pub struct NewAmazonProduct {
    pub asin: String,
    pub title: String,
    pub description: String,
    pub price: String,
    pub rating: f64,
    pub reviews: i32,
    pub image: String,
    pub url: String,
    pub category: String,
    pub tags: String,
    pub is_active: bool,
}

impl From<&AmazonProduct> for NewAmazonProduct {
    fn from(product: &AmazonProduct) -> Self {
        NewAmazonProduct {
            asin: product.asin.clone(),
            title: product.title.clone(),
            description: product.description.clone(),
            price: product.price.clone(),
            rating: product.rating,
            reviews: i32::try_from(product.reviews).unwrap_or(i32::MAX),
            image: product.image.clone(),
            url: product.url.clone(),
            category: product.category.clone(),
            tags: serde_json::to_string(&product.tags).unwrap_or_else(|_| "[]".to_string()),
            is_active: true,
        }
    }
}
