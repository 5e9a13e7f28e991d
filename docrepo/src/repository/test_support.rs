//! Fixtures shared by the repository tests

use serde::{Deserialize, Serialize};

use crate::model::Model;
use crate::schema::{FieldRule, Schema};
use crate::store::MemoryStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Product {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub stock_quantity: i64,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Product {
    pub fn new(name: &str, price: f64) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            price,
            stock_quantity: 0,
            status: "draft".to_string(),
            created_at: None,
            updated_at: None,
        }
    }

    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }
}

pub(crate) fn product_model(store: &MemoryStore) -> Model<MemoryStore> {
    Model::builder("Product", store.clone())
        .schema(
            Schema::new()
                .field("name", FieldRule::string().required())
                .field("price", FieldRule::number().required().min(0.0))
                .field("stockQuantity", FieldRule::integer().min(0.0).default_value(0))
                .field(
                    "status",
                    FieldRule::string()
                        .one_of(["draft", "active", "archived"])
                        .default_value("draft"),
                ),
        )
        .timestamps(true)
        .build()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Order {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub order_number: String,
    #[serde(default)]
    pub total: f64,
}

pub(crate) fn order_model(store: &MemoryStore) -> Model<MemoryStore> {
    Model::builder("Order", store.clone())
        .schema(Schema::new().field("orderNumber", FieldRule::string().required()))
        .timestamps(true)
        .build()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OrderItem {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub order_id: String,
    pub product_id: String,
    pub quantity: i64,
}

pub(crate) fn order_item_model(store: &MemoryStore) -> Model<MemoryStore> {
    Model::builder("OrderItem", store.clone())
        .schema(
            Schema::new()
                .field("orderId", FieldRule::string().required())
                .field("productId", FieldRule::string().required())
                .field("quantity", FieldRule::integer().required().min(1.0)),
        )
        .build()
}
