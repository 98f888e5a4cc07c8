//! Persistence seams.
//!
//! The catalog side ([`CatalogStore`]) holds categories and products and is the
//! only place stock changes. [`RecordStore`] keeps the write-once records that
//! customers create: orders, contact messages and newsletter subscriptions.
//! Both have a MongoDB implementation for the server and an in-memory one.

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use thiserror::Error;

use crate::models::{Category, Contact, Order, Product, Subscription};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Mongo(#[from] mongodb::error::Error),

    #[error("duplicate value for unique field '{0}'")]
    Duplicate(&'static str),

    #[error("not enough stock left for product {0}")]
    InsufficientStock(String),
}

/// A stock change for one product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLine {
    pub product_id: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub in_stock_only: bool,
    pub featured_only: bool,
    pub category_ids: Option<Vec<String>>,
    /// Case-insensitive substring of the name or the description.
    pub search: Option<String>,
}

impl ProductFilter {
    pub fn in_stock() -> Self {
        ProductFilter {
            in_stock_only: true,
            ..Default::default()
        }
    }

    pub fn matches(&self, product: &Product) -> bool {
        if self.in_stock_only && !product.in_stock() {
            return false;
        }
        if self.featured_only && !product.is_featured {
            return false;
        }
        if let Some(ids) = &self.category_ids {
            if !ids.iter().any(|id| id == &product.category_id) {
                return false;
            }
        }
        if let Some(term) = &self.search {
            let term = term.to_lowercase();
            return product.name.to_lowercase().contains(&term)
                || product.description.to_lowercase().contains(&term);
        }
        true
    }
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_categories(&self) -> Result<Vec<Category>, StoreError>;

    async fn get_category(&self, id: &str) -> Result<Option<Category>, StoreError>;

    async fn find_category_by_slug(&self, slug: &str) -> Result<Option<Category>, StoreError>;

    /// Products matching `filter`, in storage order.
    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError>;

    async fn get_product(&self, id: &str) -> Result<Option<Product>, StoreError>;

    /// Takes every line out of stock or none of them.
    ///
    /// Each line is applied only while the product still has at least the
    /// requested quantity. On the first line that cannot be applied the lines
    /// already taken are put back and [`StoreError::InsufficientStock`] names
    /// the product that ran short.
    async fn reserve_stock(&self, lines: &[StockLine]) -> Result<(), StoreError>;

    /// Puts previously reserved quantities back.
    async fn release_stock(&self, lines: &[StockLine]) -> Result<(), StoreError>;
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError>;

    /// Newest first.
    async fn list_orders(&self) -> Result<Vec<Order>, StoreError>;

    async fn get_order(&self, id: &ObjectId) -> Result<Option<Order>, StoreError>;

    /// Returns the updated order, or `None` when no order has this id.
    async fn update_order_status(
        &self,
        id: &ObjectId,
        status: &str,
    ) -> Result<Option<Order>, StoreError>;

    /// Returns the removed order, or `None` when no order has this id.
    async fn delete_order(&self, id: &ObjectId) -> Result<Option<Order>, StoreError>;

    async fn insert_contact(&self, contact: &Contact) -> Result<(), StoreError>;

    /// Newest first.
    async fn list_contacts(&self) -> Result<Vec<Contact>, StoreError>;

    async fn get_contact(&self, id: &ObjectId) -> Result<Option<Contact>, StoreError>;

    /// `false` when no contact message has this id.
    async fn delete_contact(&self, id: &ObjectId) -> Result<bool, StoreError>;

    /// Fails with [`StoreError::Duplicate`] when the email is already subscribed.
    async fn insert_subscription(&self, subscription: &Subscription) -> Result<(), StoreError>;
}
