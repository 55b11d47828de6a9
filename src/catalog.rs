//! Products the company stocks, in the order the inventory screen shows them.

use crate::{errors::ServiceError, repositories::inventory_store::InventoryStore};
use sea_orm::ConnectionTrait;
use tracing::debug;

/// Current name of the PP board (formerly "PP Tape").
pub const PP_BOARD: &str = "לוח PP מ\"מ 4";

pub const PRODUCTS: [&str; 17] = [
    "Floorliner - Vapor Shield",
    "Floorliner - Original Shield",
    "Allprotect - White Shield",
    "Allprotect - Original",
    "Allprotect - Flex",
    "Allprotect - Original cut to 20cm",
    "Allprotect - Flex cut to 10cm",
    "Allprotect - Flex cut to 15cm",
    "Allprotect - Flex cut to 17cm",
    "Allprotect - Flex cut to 20cm",
    "Allprotect - Flex cut to 25cm",
    PP_BOARD,
    "סרט דבק",
    "זווית פינה קשיחה",
    "פרופיל U מוקצף 18 מ\"מ",
    "פרופיל U מוקצף 45 מ\"מ",
    "פרופיל U מוקצף 120 מ\"מ",
];

/// Position of `product_name` in the catalog, if it is a catalog product.
pub fn position(product_name: &str) -> Option<usize> {
    PRODUCTS.iter().position(|name| *name == product_name)
}

/// Makes sure every catalog product has a stock row.
pub async fn ensure_catalog_items<C>(conn: &C) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    for name in PRODUCTS {
        InventoryStore::get_or_create(conn, name).await?;
    }
    debug!(count = PRODUCTS.len(), "catalog items ensured");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn catalog_names_are_unique() {
        let unique: HashSet<_> = PRODUCTS.iter().collect();
        assert_eq!(unique.len(), PRODUCTS.len());
    }

    #[test]
    fn legacy_tape_name_is_gone() {
        assert!(position("PP Tape").is_none());
        assert_eq!(position(PP_BOARD), Some(11));
        assert_eq!(position("Floorliner - Vapor Shield"), Some(0));
    }
}
