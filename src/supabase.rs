use crate::config::StoreCredentials;
use crate::enrich::models::{CatalogRecord, EnrichmentOutcome, ImageRef};
use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use urlencoding::encode;

const PRODUCT_COLUMNS: &str =
    "title,description,product_type,vendor,ai_color,ai_material,ai_vision_analysis,enrichment_status";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("invalid response: {0}")]
    Deserialize(String),
}

/// The catalog store as the enrichment pipeline sees it: one record read,
/// one image read, one partial write.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn fetch_product(&self, product_id: &str) -> Result<Option<CatalogRecord>, StoreError>;

    /// Images ordered by position, at most `limit`.
    async fn fetch_images(
        &self,
        product_id: &str,
        limit: usize,
    ) -> Result<Vec<ImageRef>, StoreError>;

    async fn update_enrichment(
        &self,
        product_id: &str,
        outcome: &EnrichmentOutcome,
    ) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
pub struct SupabaseClient {
    base_url: String,
    service_key: String,
    http: Client,
}

impl SupabaseClient {
    pub fn new(credentials: &StoreCredentials, http: Client) -> Self {
        Self {
            base_url: credentials.base_url.trim_end_matches('/').to_string(),
            service_key: credentials.service_key.clone(),
            http,
        }
    }

    fn rest(&self, table: &str, query: &str) -> String {
        format!("{}/rest/v1/{table}?{query}", self.base_url)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
    }
}

#[async_trait]
impl CatalogStore for SupabaseClient {
    async fn fetch_product(&self, product_id: &str) -> Result<Option<CatalogRecord>, StoreError> {
        let url = self.rest(
            "products",
            &format!(
                "id=eq.{}&select={PRODUCT_COLUMNS}&limit=1",
                encode(product_id)
            ),
        );
        let response = self
            .authorized(self.http.get(url))
            .send()
            .await
            .map_err(|err| StoreError::Request(err.to_string()))?;

        if !response.status().is_success() {
            return Err(StoreError::Status(response.status().as_u16()));
        }

        let mut rows: Vec<CatalogRecord> = response
            .json()
            .await
            .map_err(|err| StoreError::Deserialize(err.to_string()))?;
        Ok(rows.pop())
    }

    async fn fetch_images(
        &self,
        product_id: &str,
        limit: usize,
    ) -> Result<Vec<ImageRef>, StoreError> {
        let url = self.rest(
            "product_images",
            &format!(
                "product_id=eq.{}&select=src,alt,position&order=position.asc&limit={limit}",
                encode(product_id)
            ),
        );
        let response = self
            .authorized(self.http.get(url))
            .send()
            .await
            .map_err(|err| StoreError::Request(err.to_string()))?;

        if !response.status().is_success() {
            return Err(StoreError::Status(response.status().as_u16()));
        }

        response
            .json()
            .await
            .map_err(|err| StoreError::Deserialize(err.to_string()))
    }

    async fn update_enrichment(
        &self,
        product_id: &str,
        outcome: &EnrichmentOutcome,
    ) -> Result<(), StoreError> {
        let url = self.rest("products", &format!("id=eq.{}", encode(product_id)));
        let response = self
            .authorized(self.http.patch(url))
            .header("Prefer", "return=minimal")
            .json(outcome)
            .send()
            .await
            .map_err(|err| StoreError::Request(err.to_string()))?;

        if !response.status().is_success() {
            return Err(StoreError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}
