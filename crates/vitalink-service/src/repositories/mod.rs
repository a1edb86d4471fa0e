mod products;
mod traits;

pub use products::SqliteProductRepository;
pub use traits::{DEFAULT_LIST_LIMIT, ListProductsParams, ListProductsResult, ProductRepository};
