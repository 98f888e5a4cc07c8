use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, Document},
    error::{ErrorKind, WriteFailure},
    options::{FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument},
    Client, Collection, Database, IndexModel,
};
use tracing::{debug, error, info, warn};

use super::{CatalogStore, ProductFilter, RecordStore, StockLine, StoreError};
use crate::models::{Category, Contact, Order, Product, Subscription};

const DUPLICATE_KEY: i32 = 11000;

#[derive(Clone)]
pub struct MongoStore {
    database: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, database_name: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri).await?;
        let store = MongoStore {
            database: client.database(database_name),
        };
        store.ensure_indexes().await?;
        info!("Connected to MongoDB database '{}'", database_name);
        Ok(store)
    }

    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        let unique = || IndexOptions::builder().unique(true).build();
        self.categories()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "slug": 1 })
                    .options(unique())
                    .build(),
                None,
            )
            .await?;
        self.subscriptions()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "email": 1 })
                    .options(unique())
                    .build(),
                None,
            )
            .await?;
        self.products()
            .create_index(IndexModel::builder().keys(doc! { "category_id": 1 }).build(), None)
            .await?;
        Ok(())
    }

    fn categories(&self) -> Collection<Category> {
        self.database.collection("categories")
    }

    fn products(&self) -> Collection<Product> {
        self.database.collection("products")
    }

    fn orders(&self) -> Collection<Order> {
        self.database.collection("orders")
    }

    fn contacts(&self) -> Collection<Contact> {
        self.database.collection("contacts")
    }

    fn subscriptions(&self) -> Collection<Subscription> {
        self.database.collection("newsletter")
    }

    /// Best effort; a failure here leaves stock lower than it should be, so it
    /// is logged loudly.
    async fn put_back(&self, lines: &[StockLine]) {
        if let Err(e) = self.release_stock(lines).await {
            error!("Failed to restore stock after aborted reservation {:?}: {}", lines, e);
        }
    }
}

fn product_query(filter: &ProductFilter) -> Document {
    let mut query = doc! {};
    if filter.in_stock_only {
        query.insert("stock", doc! { "$gt": 0_i64 });
    }
    if filter.featured_only {
        query.insert("is_featured", true);
    }
    if let Some(ids) = &filter.category_ids {
        query.insert("category_id", doc! { "$in": ids.clone() });
    }
    if let Some(term) = &filter.search {
        let pattern = regex::escape(term);
        query.insert(
            "$or",
            vec![
                doc! { "name": { "$regex": pattern.as_str(), "$options": "i" } },
                doc! { "description": { "$regex": pattern.as_str(), "$options": "i" } },
            ],
        );
    }
    query
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        *err.kind,
        ErrorKind::Write(WriteFailure::WriteError(ref write_error)) if write_error.code == DUPLICATE_KEY
    )
}

fn newest_first() -> FindOptions {
    FindOptions::builder().sort(doc! { "_id": -1 }).build()
}

#[async_trait]
impl CatalogStore for MongoStore {
    async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        let cursor = self.categories().find(None, None).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn get_category(&self, id: &str) -> Result<Option<Category>, StoreError> {
        Ok(self.categories().find_one(doc! { "_id": id }, None).await?)
    }

    async fn find_category_by_slug(&self, slug: &str) -> Result<Option<Category>, StoreError> {
        Ok(self.categories().find_one(doc! { "slug": slug }, None).await?)
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        let query = product_query(filter);
        debug!("Querying products with {}", query);
        let cursor = self.products().find(query, None).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn get_product(&self, id: &str) -> Result<Option<Product>, StoreError> {
        Ok(self.products().find_one(doc! { "_id": id }, None).await?)
    }

    async fn reserve_stock(&self, lines: &[StockLine]) -> Result<(), StoreError> {
        let mut applied: Vec<StockLine> = Vec::with_capacity(lines.len());
        for line in lines {
            let filter = doc! {
                "_id": line.product_id.as_str(),
                "stock": { "$gte": line.quantity },
            };
            let update = doc! { "$inc": { "stock": -line.quantity } };
            match self.products().update_one(filter, update, None).await {
                Ok(result) if result.modified_count == 1 => applied.push(line.clone()),
                Ok(_) => {
                    warn!(
                        "Stock for product {} dropped below {} during reservation",
                        line.product_id, line.quantity
                    );
                    self.put_back(&applied).await;
                    return Err(StoreError::InsufficientStock(line.product_id.clone()));
                }
                Err(e) => {
                    self.put_back(&applied).await;
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    async fn release_stock(&self, lines: &[StockLine]) -> Result<(), StoreError> {
        for line in lines {
            self.products()
                .update_one(
                    doc! { "_id": line.product_id.as_str() },
                    doc! { "$inc": { "stock": line.quantity } },
                    None,
                )
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MongoStore {
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        self.orders().insert_one(order, None).await?;
        Ok(())
    }

    async fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        let cursor = self.orders().find(None, newest_first()).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn get_order(&self, id: &ObjectId) -> Result<Option<Order>, StoreError> {
        Ok(self.orders().find_one(doc! { "_id": *id }, None).await?)
    }

    async fn update_order_status(
        &self,
        id: &ObjectId,
        status: &str,
    ) -> Result<Option<Order>, StoreError> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        Ok(self
            .orders()
            .find_one_and_update(
                doc! { "_id": *id },
                doc! { "$set": { "status": status } },
                options,
            )
            .await?)
    }

    async fn delete_order(&self, id: &ObjectId) -> Result<Option<Order>, StoreError> {
        Ok(self
            .orders()
            .find_one_and_delete(doc! { "_id": *id }, None)
            .await?)
    }

    async fn insert_contact(&self, contact: &Contact) -> Result<(), StoreError> {
        self.contacts().insert_one(contact, None).await?;
        Ok(())
    }

    async fn list_contacts(&self) -> Result<Vec<Contact>, StoreError> {
        let cursor = self.contacts().find(None, newest_first()).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn get_contact(&self, id: &ObjectId) -> Result<Option<Contact>, StoreError> {
        Ok(self.contacts().find_one(doc! { "_id": *id }, None).await?)
    }

    async fn delete_contact(&self, id: &ObjectId) -> Result<bool, StoreError> {
        let result = self.contacts().delete_one(doc! { "_id": *id }, None).await?;
        Ok(result.deleted_count == 1)
    }

    async fn insert_subscription(&self, subscription: &Subscription) -> Result<(), StoreError> {
        match self.subscriptions().insert_one(subscription, None).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(StoreError::Duplicate("email")),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_stock_query_filters_on_positive_stock() {
        let query = product_query(&ProductFilter::in_stock());
        assert_eq!(query, doc! { "stock": { "$gt": 0_i64 } });
    }

    #[test]
    fn search_term_is_escaped_and_matched_on_both_fields() {
        let query = product_query(&ProductFilter {
            search: Some("a+b".into()),
            ..Default::default()
        });
        let alternatives = query.get_array("$or").unwrap();
        assert_eq!(alternatives.len(), 2);
        assert_eq!(
            alternatives[0].as_document().unwrap(),
            &doc! { "name": { "$regex": "a\\+b", "$options": "i" } }
        );
    }

    #[test]
    fn category_ids_become_an_in_clause() {
        let query = product_query(&ProductFilter {
            category_ids: Some(vec!["tools".into(), "garden".into()]),
            ..Default::default()
        });
        assert_eq!(query, doc! { "category_id": { "$in": ["tools", "garden"] } });
    }
}
