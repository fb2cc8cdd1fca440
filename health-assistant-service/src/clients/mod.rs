//! Concrete collaborators behind the `triage_flow` service traits.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;
use triage_flow::{
    Collaborators, Coordinates, Facility, GeoService, NarrationService, NearbyQuery,
    ProductSearch, SearchHit, ServiceError,
};

use crate::config::ServiceConfig;

pub mod firecrawl;
pub mod maps;
pub mod openrouter;
pub mod pdf;
pub mod speech;

pub use firecrawl::FirecrawlSearch;
pub use maps::GoogleMapsClient;
pub use openrouter::OpenRouterInference;
pub use pdf::PdfExporter;
pub use speech::TranslateSpeech;

/// Stand-in for a collaborator whose API key is missing; every call fails with
/// [`ServiceError::NotConfigured`].
pub struct Unconfigured(pub &'static str);

#[async_trait]
impl GeoService for Unconfigured {
    async fn geocode(&self, _address: &str) -> Result<Option<Coordinates>, ServiceError> {
        Err(ServiceError::NotConfigured(self.0))
    }

    async fn nearby_search(&self, _query: &NearbyQuery) -> Result<Vec<Facility>, ServiceError> {
        Err(ServiceError::NotConfigured(self.0))
    }
}

#[async_trait]
impl ProductSearch for Unconfigured {
    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<SearchHit>, ServiceError> {
        Err(ServiceError::NotConfigured(self.0))
    }
}

#[async_trait]
impl NarrationService for Unconfigured {
    async fn synthesize(
        &self,
        _text: &str,
        _language_code: &str,
        _region_variant: &str,
    ) -> Result<Vec<u8>, ServiceError> {
        Err(ServiceError::NotConfigured(self.0))
    }
}

/// Wire every collaborator from the process configuration
pub fn collaborators(config: &ServiceConfig) -> Collaborators {
    let http = reqwest::Client::new();

    let geo: Arc<dyn GeoService> = match &config.google_maps_api_key {
        Some(key) => Arc::new(GoogleMapsClient::new(http.clone(), key.clone())),
        None => {
            warn!("GOOGLE_MAPS_API_KEY not set; emergency location services will be limited");
            Arc::new(Unconfigured("Google Maps"))
        }
    };

    let products: Arc<dyn ProductSearch> = match &config.firecrawl_api_key {
        Some(key) => Arc::new(FirecrawlSearch::new(http.clone(), key.clone())),
        None => {
            warn!("FIRECRAWL_API_KEY not set; medication purchase links will not be available");
            Arc::new(Unconfigured("Firecrawl"))
        }
    };

    Collaborators {
        inference: Arc::new(OpenRouterInference::new(
            http.clone(),
            config.openrouter_api_key.clone(),
            config.text_model.clone(),
            config.vision_model.clone(),
        )),
        geo,
        narration: Arc::new(TranslateSpeech::new(http)),
        products,
        exporter: Arc::new(PdfExporter::default()),
    }
}
