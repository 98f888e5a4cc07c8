use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_CATEGORY_ICON: &str = "🔧";
pub const DEFAULT_CUSTOMER_NAME: &str = "Anonymous";
pub const PENDING_STATUS: &str = "pending";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Category {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default = "default_icon")]
    pub icon: String,
    #[serde(default)]
    pub description: String,
    pub slug: String,
}

fn default_icon() -> String {
    DEFAULT_CATEGORY_ICON.to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Feature {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Image {
    pub url: String,
    #[serde(default)]
    pub alt_text: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Product {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub price: Decimal,
    pub description: String,
    pub category_id: String,
    pub stock: i64,
    pub rating: Decimal,
    #[serde(default)]
    pub reviews: i64,
    #[serde(default)]
    pub is_featured: bool,
    pub color: String,
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default)]
    pub images: Vec<Image>,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn in_stock(&self) -> bool {
        self.stock > 0
    }
}

/// Sales channel an order was placed through.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Fiverr,
    Upwork,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Fiverr => "fiverr",
            Platform::Upwork => "upwork",
        }
    }

    /// Follow-up text placed in the customer confirmation email.
    pub fn offer_message(&self) -> &'static str {
        match self {
            Platform::Fiverr => {
                "I will be sending you a personalized offer from Fiverr within the next 12 hours. \
                 You can accept it so I can start your project."
            }
            Platform::Upwork => {
                "I will be sending you a personalized proposal from Upwork within the next 12 hours. \
                 You can accept it so I can start your project."
            }
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fiverr" => Ok(Platform::Fiverr),
            "upwork" => Ok(Platform::Upwork),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Order {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub customer_name: String,
    pub customer_email: String,
    pub platform: Platform,
    /// Line items exactly as the client submitted them.
    pub order_details: serde_json::Value,
    pub total_amount: Decimal,
    #[serde(default)]
    pub file: Option<String>,
    pub created_at: DateTime<Utc>,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Contact {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Subscription {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub email: String,
    pub subscribed_at: DateTime<Utc>,
}
