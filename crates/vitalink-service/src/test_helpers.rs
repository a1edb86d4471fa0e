use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

pub fn establish_test_connection() -> SqliteConnection {
    crate::db::establish_connection(":memory:").expect("Failed to create in-memory database")
}

pub mod test_utils {
    use super::*;
    use crate::schema::amazon_products;

    pub fn count_products(conn: &mut SqliteConnection) -> i64 {
        amazon_products::table
            .count()
            .get_result(conn)
            .expect("Failed to count products")
    }
}
