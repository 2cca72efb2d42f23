//! Catalog — typed `products` rows and a REST client for them.
//!
//! DESIGN
//! ======
//! `Product` mirrors the table row; `NewProduct` and `ProductPatch` are the
//! insert and update shapes. Requests go through the provider client so they
//! carry the signed-in user's token and row-level security applies.

use std::sync::Arc;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::provider::{ProviderError, SupabaseClient};

const PRODUCTS_TABLE: &str = "products";

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("invalid product: {0}")]
    Invalid(String),
    #[error("product {0} not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub created_at: String,
    pub updated_at: String,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub image_url: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub stock: Option<i32>,
    #[serde(default)]
    pub featured: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: f64,
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub featured: Option<bool>,
}

impl NewProduct {
    /// # Errors
    ///
    /// Rejects blank names, negative or non-finite prices and negative stock.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.name.trim().is_empty() {
            return Err(CatalogError::Invalid("name is required".into()));
        }
        validate_price(self.price)?;
        validate_stock(self.stock)
    }
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub featured: Option<bool>,
}

impl ProductPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// # Errors
    ///
    /// Same field rules as [`NewProduct::validate`], applied to set fields only.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(CatalogError::Invalid("name cannot be blank".into()));
        }
        if let Some(price) = self.price {
            validate_price(price)?;
        }
        validate_stock(self.stock)
    }
}

fn validate_price(price: f64) -> Result<(), CatalogError> {
    if !price.is_finite() || price < 0.0 {
        return Err(CatalogError::Invalid(format!("price must be a non-negative number, got {price}")));
    }
    Ok(())
}

fn validate_stock(stock: Option<i32>) -> Result<(), CatalogError> {
    match stock {
        Some(s) if s < 0 => Err(CatalogError::Invalid(format!("stock cannot be negative, got {s}"))),
        _ => Ok(()),
    }
}

#[async_trait::async_trait]
pub trait ProductStore: Send + Sync {
    /// All products, newest first.
    async fn list(&self) -> Result<Vec<Product>, CatalogError>;
    async fn get(&self, id: Uuid) -> Result<Product, CatalogError>;
    async fn create(&self, product: &NewProduct) -> Result<Product, CatalogError>;
    async fn update(&self, id: Uuid, patch: &ProductPatch) -> Result<Product, CatalogError>;
    async fn delete(&self, id: Uuid) -> Result<(), CatalogError>;
}

/// `ProductStore` backed by the provider's REST endpoint.
pub struct RestProducts {
    client: Arc<SupabaseClient>,
}

impl RestProducts {
    #[must_use]
    pub fn new(client: Arc<SupabaseClient>) -> Self {
        Self { client }
    }

    async fn call(&self, method: Method, query: &str, body: Option<&impl Serialize>) -> Result<String, CatalogError> {
        let url = format!("{}?{query}", self.client.rest_url(PRODUCTS_TABLE));
        let token = self.client.bearer_token().await?;
        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(token)
            .header("Prefer", "return=representation");
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(self.client.execute(request).await?)
    }
}

#[async_trait::async_trait]
impl ProductStore for RestProducts {
    async fn list(&self) -> Result<Vec<Product>, CatalogError> {
        let body = self
            .call(Method::GET, "select=*&order=created_at.desc", None::<&()>)
            .await?;
        parse_rows(&body)
    }

    async fn get(&self, id: Uuid) -> Result<Product, CatalogError> {
        let body = self
            .call(Method::GET, &id_filter(id), None::<&()>)
            .await?;
        single_row(id, &body)
    }

    async fn create(&self, product: &NewProduct) -> Result<Product, CatalogError> {
        product.validate()?;
        let body = self
            .call(Method::POST, "select=*", Some(product))
            .await?;
        let created = parse_rows(&body)?
            .into_iter()
            .next()
            .ok_or_else(|| CatalogError::Provider(ProviderError::Parse("insert returned no rows".into())))?;
        info!(product_id = %created.id, name = %created.name, "product created");
        Ok(created)
    }

    async fn update(&self, id: Uuid, patch: &ProductPatch) -> Result<Product, CatalogError> {
        if patch.is_empty() {
            return Err(CatalogError::Invalid("nothing to update".into()));
        }
        patch.validate()?;
        let body = self
            .call(Method::PATCH, &id_filter(id), Some(patch))
            .await?;
        let updated = single_row(id, &body)?;
        info!(product_id = %id, "product updated");
        Ok(updated)
    }

    async fn delete(&self, id: Uuid) -> Result<(), CatalogError> {
        let body = self
            .call(Method::DELETE, &id_filter(id), None::<&()>)
            .await?;
        single_row(id, &body)?;
        info!(product_id = %id, "product deleted");
        Ok(())
    }
}

fn id_filter(id: Uuid) -> String {
    format!("id=eq.{id}&select=*")
}

fn parse_rows(body: &str) -> Result<Vec<Product>, CatalogError> {
    serde_json::from_str(body).map_err(|e| CatalogError::Provider(ProviderError::Parse(e.to_string())))
}

fn single_row(id: Uuid, body: &str) -> Result<Product, CatalogError> {
    parse_rows(body)?
        .into_iter()
        .next()
        .ok_or(CatalogError::NotFound(id))
}

#[cfg(test)]
#[path = "catalog_test.rs"]
mod tests;
