use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

use super::{CatalogStore, ProductFilter, RecordStore, StockLine, StoreError};
use crate::models::{Category, Contact, Order, Product, Subscription};

#[derive(Default)]
struct Tables {
    categories: BTreeMap<String, Category>,
    products: BTreeMap<String, Product>,
    orders: Vec<Order>,
    contacts: Vec<Contact>,
    subscriptions: Vec<Subscription>,
}

/// Store kept entirely in process memory.
///
/// A single lock guards all tables, so a stock reservation is checked and
/// applied without any other request observing it half done.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_category(&self, category: Category) {
        self.tables
            .write()
            .categories
            .insert(category.id.clone(), category);
    }

    pub fn add_product(&self, product: Product) {
        self.tables.write().products.insert(product.id.clone(), product);
    }

    pub fn stock_of(&self, product_id: &str) -> Option<i64> {
        self.tables.read().products.get(product_id).map(|p| p.stock)
    }

    pub fn order_count(&self) -> usize {
        self.tables.read().orders.len()
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        Ok(self.tables.read().categories.values().cloned().collect())
    }

    async fn get_category(&self, id: &str) -> Result<Option<Category>, StoreError> {
        Ok(self.tables.read().categories.get(id).cloned())
    }

    async fn find_category_by_slug(&self, slug: &str) -> Result<Option<Category>, StoreError> {
        Ok(self
            .tables
            .read()
            .categories
            .values()
            .find(|c| c.slug == slug)
            .cloned())
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        Ok(self
            .tables
            .read()
            .products
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect())
    }

    async fn get_product(&self, id: &str) -> Result<Option<Product>, StoreError> {
        Ok(self.tables.read().products.get(id).cloned())
    }

    async fn reserve_stock(&self, lines: &[StockLine]) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        let mut remaining: HashMap<&str, i64> = HashMap::new();
        for line in lines {
            let current = match remaining.get(line.product_id.as_str()) {
                Some(stock) => *stock,
                None => tables
                    .products
                    .get(&line.product_id)
                    .map(|p| p.stock)
                    .ok_or_else(|| StoreError::InsufficientStock(line.product_id.clone()))?,
            };
            if current < line.quantity {
                return Err(StoreError::InsufficientStock(line.product_id.clone()));
            }
            remaining.insert(line.product_id.as_str(), current - line.quantity);
        }
        for (id, stock) in remaining {
            if let Some(product) = tables.products.get_mut(id) {
                product.stock = stock;
            }
        }
        Ok(())
    }

    async fn release_stock(&self, lines: &[StockLine]) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        for line in lines {
            if let Some(product) = tables.products.get_mut(&line.product_id) {
                product.stock += line.quantity;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        self.tables.write().orders.push(order.clone());
        Ok(())
    }

    async fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        Ok(self.tables.read().orders.iter().rev().cloned().collect())
    }

    async fn get_order(&self, id: &ObjectId) -> Result<Option<Order>, StoreError> {
        Ok(self.tables.read().orders.iter().find(|o| &o.id == id).cloned())
    }

    async fn update_order_status(
        &self,
        id: &ObjectId,
        status: &str,
    ) -> Result<Option<Order>, StoreError> {
        let mut tables = self.tables.write();
        Ok(tables.orders.iter_mut().find(|o| &o.id == id).map(|order| {
            order.status = status.to_string();
            order.clone()
        }))
    }

    async fn delete_order(&self, id: &ObjectId) -> Result<Option<Order>, StoreError> {
        let mut tables = self.tables.write();
        let position = tables.orders.iter().position(|o| &o.id == id);
        Ok(position.map(|index| tables.orders.remove(index)))
    }

    async fn insert_contact(&self, contact: &Contact) -> Result<(), StoreError> {
        self.tables.write().contacts.push(contact.clone());
        Ok(())
    }

    async fn list_contacts(&self) -> Result<Vec<Contact>, StoreError> {
        Ok(self.tables.read().contacts.iter().rev().cloned().collect())
    }

    async fn get_contact(&self, id: &ObjectId) -> Result<Option<Contact>, StoreError> {
        Ok(self.tables.read().contacts.iter().find(|c| &c.id == id).cloned())
    }

    async fn delete_contact(&self, id: &ObjectId) -> Result<bool, StoreError> {
        let mut tables = self.tables.write();
        let before = tables.contacts.len();
        tables.contacts.retain(|c| &c.id != id);
        Ok(tables.contacts.len() != before)
    }

    async fn insert_subscription(&self, subscription: &Subscription) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if tables
            .subscriptions
            .iter()
            .any(|s| s.email == subscription.email)
        {
            return Err(StoreError::Duplicate("email"));
        }
        tables.subscriptions.push(subscription.clone());
        Ok(())
    }
}
