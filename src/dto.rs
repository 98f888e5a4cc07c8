//! Request and response shapes for each endpoint.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{Category, Contact, Feature, Image, Order, Platform, Product, Subscription};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CategoryResponse {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub description: String,
    pub slug: String,
}

impl From<Category> for CategoryResponse {
    fn from(category: Category) -> Self {
        CategoryResponse {
            id: category.id,
            name: category.name,
            icon: category.icon,
            description: category.description,
            slug: category.slug,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProductResponse {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    pub description: String,
    pub features: Vec<Feature>,
    pub images: Vec<Image>,
    pub category: CategoryResponse,
    pub stock: i64,
    pub rating: Decimal,
    pub reviews: i64,
    pub is_featured: bool,
    pub color: String,
}

impl ProductResponse {
    pub fn new(product: Product, category: Category) -> Self {
        ProductResponse {
            id: product.id,
            name: product.name,
            price: product.price,
            description: product.description,
            features: product.features,
            images: product.images,
            category: category.into(),
            stock: product.stock,
            rating: product.rating,
            reviews: product.reviews,
            is_featured: product.is_featured,
            color: product.color,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct ProductListQuery {
    pub search: Option<String>,
    /// Comma separated category ids.
    pub categories: Option<String>,
    pub sort: Option<String>,
    /// Page number or `last`. Anything else is an invalid page.
    pub page: Option<String>,
    /// Falls back to the default size when not a positive integer.
    pub page_size: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Page<T> {
    pub count: usize,
    pub next: Option<usize>,
    pub previous: Option<usize>,
    pub results: Vec<T>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OrderResponse {
    pub id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub platform: Platform,
    pub order_details: serde_json::Value,
    pub total_amount: Decimal,
    pub file: Option<String>,
    pub created_at: DateTime<Utc>,
    pub status: String,
}

impl OrderResponse {
    pub fn new(order: Order, media_url: &str) -> Self {
        OrderResponse {
            id: order.id.to_hex(),
            customer_name: order.customer_name,
            customer_email: order.customer_email,
            platform: order.platform,
            order_details: order.order_details,
            total_amount: order.total_amount,
            file: order.file.map(|path| format!("{}{}", media_url, path)),
            created_at: order.created_at,
            status: order.status,
        }
    }
}

/// Body of `PATCH /store/orders/{id}`.
#[derive(Debug, Deserialize, Validate)]
pub struct OrderStatusUpdate {
    #[validate(length(min = 1, max = 20))]
    pub status: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ContactRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 200))]
    pub subject: String,
    #[validate(length(min = 1))]
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ContactResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl From<Contact> for ContactResponse {
    fn from(contact: Contact) -> Self {
        ContactResponse {
            id: contact.id.to_hex(),
            name: contact.name,
            email: contact.email,
            subject: contact.subject,
            message: contact.message,
            created_at: contact.created_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct NewsletterRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct SubscriptionResponse {
    pub id: String,
    pub email: String,
    pub subscribed_at: DateTime<Utc>,
}

impl From<Subscription> for SubscriptionResponse {
    fn from(subscription: Subscription) -> Self {
        SubscriptionResponse {
            id: subscription.id.to_hex(),
            email: subscription.email,
            subscribed_at: subscription.subscribed_at,
        }
    }
}
