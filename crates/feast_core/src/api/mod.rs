//! Remote restaurant API client.
//!
//! # Responsibility
//! - Fetch the restaurant list from the fixed REST endpoint.
//! - Parse results into layers obtained from the database manager.
//!
//! # Invariants
//! - Elements are parsed sequentially and returned in payload order.
//! - `fetch_restaurants` never commits the layer it parses into.

use crate::config::ApiConfig;
use crate::model::restaurant::{Restaurant, StoredRestaurant};
use crate::parser::{JsonObject, RestaurantParser};
use crate::store::layer::{Layer, LayerError};
use crate::store::manager::DatabaseManager;
use log::{error, info};
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

const RESTAURANTS_PATH: &str = "/restaurants";

/// Errors surfaced by API calls.
#[derive(Debug)]
pub enum ApiError {
    /// The HTTP client could not be built.
    Client(reqwest::Error),
    Transport(reqwest::Error),
    Status { status: u16, url: String },
    Decode(serde_json::Error),
    Layer(LayerError),
}

impl ApiError {
    fn code(&self) -> &'static str {
        match self {
            Self::Client(_) => "api_client",
            Self::Transport(_) => "api_transport",
            Self::Status { .. } => "api_status",
            Self::Decode(_) => "api_decode",
            Self::Layer(_) => "api_layer",
        }
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Client(err) => write!(f, "failed to build http client: {err}"),
            Self::Transport(err) => write!(f, "request failed: {err}"),
            Self::Status { status, url } => write!(f, "GET {url} returned status {status}"),
            Self::Decode(err) => write!(f, "unexpected response body: {err}"),
            Self::Layer(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ApiError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Client(err) | Self::Transport(err) => Some(err),
            Self::Status { .. } => None,
            Self::Decode(err) => Some(err),
            Self::Layer(err) => Some(err),
        }
    }
}

impl From<LayerError> for ApiError {
    fn from(value: LayerError) -> Self {
        Self::Layer(value)
    }
}

/// `{ "_items": [ {...}, ... ] }`
#[derive(Debug, Deserialize)]
struct RestaurantsEnvelope {
    #[serde(rename = "_items")]
    items: Vec<JsonObject>,
}

/// Decodes a restaurants response body into its item objects.
pub fn decode_items(body: &[u8]) -> Result<Vec<JsonObject>, ApiError> {
    serde_json::from_slice::<RestaurantsEnvelope>(body)
        .map(|envelope| envelope.items)
        .map_err(ApiError::Decode)
}

/// Client for the Feast REST API.
#[derive(Clone)]
pub struct FeastApi {
    client: reqwest::Client,
    base_url: String,
    manager: DatabaseManager,
}

impl FeastApi {
    pub fn new(config: &ApiConfig, manager: DatabaseManager) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(ApiError::Client)?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            manager,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetches all restaurants.
    ///
    /// Records are parsed into a throwaway background layer that is dropped
    /// without saving; use [`FeastApi::fetch_restaurants_into`] to keep them.
    ///
    /// # Panics
    /// Panics when an item lacks a string `_id` or `name`.
    pub async fn fetch_restaurants(&self) -> Result<Vec<Restaurant>, ApiError> {
        let layer = self.manager.background_layer();
        let parsed = self.fetch_restaurants_into(&layer).await?;
        Ok(parsed.into_iter().map(|row| row.restaurant).collect())
    }

    /// Fetches all restaurants into `layer` without saving it.
    ///
    /// # Panics
    /// Panics when an item lacks a string `_id` or `name`.
    pub async fn fetch_restaurants_into(
        &self,
        layer: &Layer,
    ) -> Result<Vec<StoredRestaurant>, ApiError> {
        let url = format!("{}{}", self.base_url, RESTAURANTS_PATH);
        let started_at = Instant::now();
        info!("event=api_fetch module=api status=start url={url}");

        let result = self.fetch_into(&url, layer).await;
        match &result {
            Ok(parsed) => info!(
                "event=api_fetch module=api status=ok url={} duration_ms={} items={}",
                url,
                started_at.elapsed().as_millis(),
                parsed.len()
            ),
            Err(err) => error!(
                "event=api_fetch module=api status=error url={} duration_ms={} error_code={} error={}",
                url,
                started_at.elapsed().as_millis(),
                err.code(),
                err
            ),
        }
        result
    }

    async fn fetch_into(&self, url: &str, layer: &Layer) -> Result<Vec<StoredRestaurant>, ApiError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(ApiError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.bytes().await.map_err(ApiError::Transport)?;
        let items = decode_items(&body)?;

        let parser = RestaurantParser::new(layer.clone());
        Ok(parser.parse_many(&items).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::{decode_items, ApiError};

    #[test]
    fn decode_items_requires_items_array_of_objects() {
        let items = decode_items(br#"{"_items":[{"_id":"r1","name":"Cafe A"}],"_meta":{}}"#)
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["_id"], "r1");

        for body in [
            &br#"[{"_id":"r1","name":"Cafe A"}]"#[..],
            &br#"{"items":[]}"#[..],
            &br#"{"_items":[1,2]}"#[..],
            &b"not json"[..],
        ] {
            assert!(matches!(decode_items(body), Err(ApiError::Decode(_))));
        }
    }
}
