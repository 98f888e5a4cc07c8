//! Order intake: turns a submitted order form into a persisted order.
//!
//! The flow is parse, validate every line against the catalog, reserve stock
//! for all lines as one unit, store the attachment and the order, then queue
//! the customer and admin emails. Validation stops at the first failing line.
//! Nothing is changed until every line has passed, and anything changed after
//! the reservation is undone if a later step fails. Email delivery happens in
//! the background and cannot fail an order that has already been stored.

use chrono::Utc;
use mongodb::bson::oid::ObjectId;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use tera::Context;
use tracing::{debug, info, instrument, warn};
use validator::Validate;

use crate::dto::OrderStatusUpdate;
use crate::errors::AppError;
use crate::media::{Attachment, MediaStorage};
use crate::models::{Order, Platform, DEFAULT_CUSTOMER_NAME, PENDING_STATUS};
use crate::notifier::Notifier;
use crate::store::{CatalogStore, RecordStore, StockLine, StoreError};

pub const MAX_ORDER_QUANTITY: i64 = 10;

/// `total_amount` holds at most ten digits, two of them decimals.
const MAX_TOTAL_EXCLUSIVE: i64 = 100_000_000;

pub const CUSTOMER_TEMPLATE: &str = "emails/client_email_template.html";
pub const ADMIN_TEMPLATE: &str = "emails/admin_email_template.html";
pub const CUSTOMER_SUBJECT: &str = "Thank you for your order!";

/// An order form as it arrives from the client.
#[derive(Debug, Default)]
pub struct PlaceOrder {
    pub platform: Option<String>,
    /// JSON object with `items`, `total`, `email` and an optional `name`.
    pub order_details: Option<String>,
    pub attachment: Option<Attachment>,
}

#[derive(Debug)]
struct LineItem {
    product_id: String,
    quantity: Option<i64>,
}

#[derive(Debug)]
struct OrderDetails {
    platform: Platform,
    email: String,
    name: String,
    total: Decimal,
    items: Vec<LineItem>,
    raw_items: Value,
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn parse_total(value: &Value) -> Result<Decimal, AppError> {
    let parsed = match value {
        Value::Number(n) => Decimal::from_str(&n.to_string()),
        Value::String(s) => Decimal::from_str(s.trim()),
        _ => return Err(AppError::invalid_payload()),
    }
    .map_err(|_| AppError::InvalidPayload("A valid number is required for total.".to_string()))?;

    let mut total = parsed.round_dp(2);
    total.rescale(2);
    if total.abs() >= Decimal::from(MAX_TOTAL_EXCLUSIVE) {
        return Err(AppError::InvalidPayload(
            "Ensure that there are no more than 10 digits in total.".to_string(),
        ));
    }
    Ok(total)
}

fn parse_quantity(value: Option<&Value>) -> Option<i64> {
    let value = value?;
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| f as i64)
    })
}

fn parse_items(items: &Value) -> Result<Vec<LineItem>, AppError> {
    let items = items.as_array().ok_or_else(AppError::invalid_payload)?;
    items
        .iter()
        .map(|item| {
            let fields = item.as_object().ok_or_else(AppError::invalid_payload)?;
            let product_id = match fields.get("id") {
                Some(Value::String(id)) => id.clone(),
                Some(Value::Number(id)) if id.is_i64() || id.is_u64() => id.to_string(),
                _ => return Err(AppError::invalid_payload()),
            };
            Ok(LineItem {
                product_id,
                quantity: parse_quantity(fields.get("quantity")),
            })
        })
        .collect()
}

fn parse_order(platform: Option<&str>, raw: Option<&str>) -> Result<OrderDetails, AppError> {
    let raw = raw.ok_or_else(AppError::invalid_payload)?;
    let details: Value = serde_json::from_str(raw).map_err(|_| AppError::invalid_payload())?;
    let fields = details.as_object().ok_or_else(AppError::invalid_payload)?;

    let items = fields.get("items").cloned().unwrap_or(Value::Array(Vec::new()));
    let email = fields.get("email").and_then(Value::as_str).unwrap_or_default();
    let name = fields
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_CUSTOMER_NAME);
    let platform = platform.unwrap_or_default();

    if email.is_empty() || platform.is_empty() || !is_truthy(&items) {
        return Err(AppError::MissingFields);
    }
    let total = match fields.get("total") {
        Some(total) if is_truthy(total) => total,
        _ => return Err(AppError::MissingFields),
    };

    let platform = Platform::from_str(platform).map_err(AppError::UnsupportedPlatform)?;
    let total = parse_total(total)?;
    let parsed_items = parse_items(&items)?;

    Ok(OrderDetails {
        platform,
        email: email.to_string(),
        name: name.to_string(),
        total,
        items: parsed_items,
        raw_items: items,
    })
}

#[derive(Clone)]
pub struct OrderIntake {
    catalog: Arc<dyn CatalogStore>,
    records: Arc<dyn RecordStore>,
    media: MediaStorage,
    notifier: Notifier,
    admin_email: String,
}

impl OrderIntake {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        records: Arc<dyn RecordStore>,
        media: MediaStorage,
        notifier: Notifier,
        admin_email: impl Into<String>,
    ) -> Self {
        OrderIntake {
            catalog,
            records,
            media,
            notifier,
            admin_email: admin_email.into(),
        }
    }

    #[instrument(name = "orders::place", skip_all, fields(platform = request.platform.as_deref()))]
    pub async fn place(&self, request: PlaceOrder) -> Result<Order, AppError> {
        let details = parse_order(request.platform.as_deref(), request.order_details.as_deref())?;
        debug!("Parsed order with {} line items", details.items.len());

        let lines = self.validate_items(&details.items).await?;
        self.reserve(&lines).await?;

        let order = match self.persist(details, request.attachment.as_ref()).await {
            Ok(order) => order,
            Err(e) => {
                warn!("Order could not be stored, restoring stock: {}", e);
                if let Err(release_error) = self.catalog.release_stock(&lines).await {
                    warn!("Failed to restore stock {:?}: {}", lines, release_error);
                }
                return Err(e);
            }
        };

        info!(
            "Order {} placed by {} for {}",
            order.id, order.customer_email, order.total_amount
        );
        self.notify(&order);
        Ok(order)
    }

    /// Moves an order to another status. Stock is not touched.
    #[instrument(name = "orders::update_status", skip(self))]
    pub async fn update_status(
        &self,
        id: &ObjectId,
        update: OrderStatusUpdate,
    ) -> Result<Order, AppError> {
        update.validate()?;
        let status = update.status.trim();
        if status.is_empty() {
            return Err(AppError::BadRequest("This field may not be blank.".to_string()));
        }
        let order = self
            .records
            .update_order_status(id, status)
            .await?
            .ok_or_else(|| AppError::NotFound("Not found.".to_string()))?;
        info!("Order {} is now {}", order.id, order.status);
        Ok(order)
    }

    /// Deletes an order and its attachment. Reserved stock stays deducted.
    #[instrument(name = "orders::delete", skip(self))]
    pub async fn delete(&self, id: &ObjectId) -> Result<(), AppError> {
        let order = self
            .records
            .delete_order(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Not found.".to_string()))?;
        if let Some(path) = &order.file {
            self.media.remove(path).await;
        }
        info!("Deleted order {}", order.id);
        Ok(())
    }

    async fn validate_items(&self, items: &[LineItem]) -> Result<Vec<StockLine>, AppError> {
        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            let product = self
                .catalog
                .get_product(&item.product_id)
                .await?
                .ok_or_else(|| AppError::ProductNotFound(item.product_id.clone()))?;

            let Some(quantity) = item.quantity else {
                return Err(AppError::InvalidQuantity(product.name));
            };
            if product.stock < quantity {
                return Err(AppError::InsufficientStock {
                    name: product.name,
                    available: product.stock,
                    requested: quantity,
                });
            }
            if quantity <= 0 {
                return Err(AppError::InvalidQuantity(product.name));
            }
            if quantity > MAX_ORDER_QUANTITY {
                return Err(AppError::QuantityLimitExceeded {
                    name: product.name,
                    max: MAX_ORDER_QUANTITY,
                });
            }

            lines.push(StockLine {
                product_id: product.id,
                quantity,
            });
        }
        Ok(lines)
    }

    /// A line can still run short here when another order took the stock
    /// after validation read it.
    async fn reserve(&self, lines: &[StockLine]) -> Result<(), AppError> {
        match self.catalog.reserve_stock(lines).await {
            Ok(()) => Ok(()),
            Err(StoreError::InsufficientStock(product_id)) => {
                let requested = lines
                    .iter()
                    .filter(|line| line.product_id == product_id)
                    .map(|line| line.quantity)
                    .sum();
                match self.catalog.get_product(&product_id).await? {
                    Some(product) => Err(AppError::InsufficientStock {
                        name: product.name,
                        available: product.stock,
                        requested,
                    }),
                    None => Err(AppError::ProductNotFound(product_id)),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(
        &self,
        details: OrderDetails,
        attachment: Option<&Attachment>,
    ) -> Result<Order, AppError> {
        let file = match attachment {
            Some(attachment) => Some(self.media.save_order_file(attachment).await?),
            None => None,
        };

        let order = Order {
            id: ObjectId::new(),
            customer_name: details.name,
            customer_email: details.email,
            platform: details.platform,
            order_details: details.raw_items,
            total_amount: details.total,
            file,
            created_at: Utc::now(),
            status: PENDING_STATUS.to_string(),
        };

        if let Err(e) = self.records.insert_order(&order).await {
            if let Some(path) = &order.file {
                self.media.remove(path).await;
            }
            return Err(e.into());
        }
        Ok(order)
    }

    fn notify(&self, order: &Order) {
        let mut customer = Context::new();
        customer.insert("customer_name", &order.customer_name);
        customer.insert("platform", order.platform.as_str());
        customer.insert("total_amount", &order.total_amount);
        customer.insert("items", &order.order_details);
        customer.insert("platform_message", order.platform.offer_message());
        if let Err(e) = self.notifier.send_templated(
            CUSTOMER_TEMPLATE,
            CUSTOMER_SUBJECT,
            &customer,
            vec![order.customer_email.clone()],
        ) {
            warn!("Customer email for order {} not queued: {}", order.id, e);
        }

        let mut admin = Context::new();
        admin.insert("customer_name", &order.customer_name);
        admin.insert("customer_email", &order.customer_email);
        admin.insert("platform", order.platform.as_str());
        admin.insert("total_amount", &order.total_amount);
        admin.insert("items", &order.order_details);
        if let Err(e) = self.notifier.send_templated(
            ADMIN_TEMPLATE,
            format!("New Order Received from {}", order.customer_name),
            &admin,
            vec![self.admin_email.clone()],
        ) {
            warn!("Admin email for order {} not queued: {}", order.id, e);
        }
    }
}
