//! Narrow interfaces to the external collaborators the pipeline consumes.
//!
//! Every collaborator call made by the pipeline goes through [`bounded`], which applies a
//! single timeout and never retries.

use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::input::ImageAttachment;

/// Failure reported by an external collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl From<anyhow::Error> for ServiceError {
    fn from(err: anyhow::Error) -> Self {
        ServiceError::Request(err.to_string())
    }
}

/// Generative model used for assessments, image analysis and nutrition plans
#[async_trait]
pub trait InferenceService: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError>;

    async fn generate_with_image(
        &self,
        prompt: &str,
        image: &ImageAttachment,
    ) -> Result<String, ServiceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// A place record as returned by the nearby search, in collaborator order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    pub name: Option<String>,
    pub rating: Option<f32>,
    /// Short address ("vicinity")
    pub address: Option<String>,
    pub business_status: Option<String>,
    pub location: Option<Coordinates>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyQuery {
    pub center: Coordinates,
    pub radius_meters: u32,
    /// Pipe separated place types, e.g. `hospital|clinic|doctor`
    pub place_types: String,
    pub keyword: String,
}

#[async_trait]
pub trait GeoService: Send + Sync {
    /// `Ok(None)` when the address cannot be resolved
    async fn geocode(&self, address: &str) -> Result<Option<Coordinates>, ServiceError>;

    async fn nearby_search(&self, query: &NearbyQuery) -> Result<Vec<Facility>, ServiceError>;
}

#[async_trait]
pub trait NarrationService: Send + Sync {
    /// Returns MP3 audio bytes
    async fn synthesize(
        &self,
        text: &str,
        language_code: &str,
        region_variant: &str,
    ) -> Result<Vec<u8>, ServiceError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
}

#[async_trait]
pub trait ProductSearch: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ServiceError>;
}

/// Renders plain text into a downloadable document (PDF)
pub trait DocumentExport: Send + Sync {
    fn render(&self, plain_text: &str) -> Result<Vec<u8>, ServiceError>;
}

/// The full set of collaborators a standard pipeline is wired with
#[derive(Clone)]
pub struct Collaborators {
    pub inference: Arc<dyn InferenceService>,
    pub geo: Arc<dyn GeoService>,
    pub narration: Arc<dyn NarrationService>,
    pub products: Arc<dyn ProductSearch>,
    pub exporter: Arc<dyn DocumentExport>,
}

/// Await a collaborator call with a single timeout.
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ServiceError::Timeout(limit)),
    }
}
