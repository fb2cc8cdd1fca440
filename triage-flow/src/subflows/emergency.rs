use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::{error, info, warn};

use super::{SubFlow, SubFlowInput, SubFlowOutcome, SubFlowOutput};
use crate::{
    config::EmergencyConfig,
    error::{FlowError, Result},
    services::{Coordinates, Facility, GeoService, NearbyQuery, bounded},
    session::SessionState,
};

pub const EMERGENCY: &str = "emergency";

pub const NO_FACILITIES_WARNING: &str = "No nearby medical facilities found";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub label: String,
    pub number: String,
}

/// Fixed numbers always shown alongside the lookup
pub fn emergency_contacts() -> Vec<EmergencyContact> {
    [
        ("Local Emergency", "102 or 112"),
        ("Poison Control", "1800-425-1213"),
        ("Mental Health Crisis", "14416"),
    ]
    .into_iter()
    .map(|(label, number)| EmergencyContact {
        label: label.to_string(),
        number: number.to_string(),
    })
    .collect()
}

/// Text summary line for one facility
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilitySummary {
    pub rank: usize,
    pub name: String,
    pub rating: String,
    pub address: String,
}

impl FacilitySummary {
    fn new(rank: usize, facility: &Facility) -> Self {
        Self {
            rank,
            name: facility
                .name
                .clone()
                .unwrap_or_else(|| "Medical Facility".to_string()),
            rating: facility
                .rating
                .map(|r| r.to_string())
                .unwrap_or_else(|| "Not rated".to_string()),
            address: facility
                .address
                .clone()
                .unwrap_or_else(|| "Address not available".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyLookupResult {
    pub location_query: String,
    pub coordinates: Option<Coordinates>,
    /// Facilities for map display, in collaborator order
    pub facilities: Vec<Facility>,
    pub summary: Vec<FacilitySummary>,
    pub contacts: Vec<EmergencyContact>,
}

/// Nearby-care lookup. Results are returned to the caller only; the session is not touched.
pub struct EmergencyLookupFlow {
    geo: Arc<dyn GeoService>,
    config: EmergencyConfig,
    timeout: Duration,
}

impl EmergencyLookupFlow {
    pub fn new(geo: Arc<dyn GeoService>, config: EmergencyConfig, timeout: Duration) -> Self {
        Self {
            geo,
            config,
            timeout,
        }
    }

    pub async fn lookup(&self, location: &str) -> (EmergencyLookupResult, Vec<String>) {
        let mut warnings = Vec::new();
        let mut result = EmergencyLookupResult {
            location_query: location.to_string(),
            coordinates: None,
            facilities: Vec::new(),
            summary: Vec::new(),
            contacts: emergency_contacts(),
        };

        let center = match bounded(self.timeout, self.geo.geocode(location)).await {
            Ok(Some(center)) => center,
            Ok(None) => {
                warn!(location, "Location could not be geocoded");
                warnings.push(format!("Could not find location: {location}"));
                return (result, warnings);
            }
            Err(e) => {
                error!(location, error = %e, "Geocoding failed");
                warnings.push(format!("Error fetching medical facilities: {e}"));
                return (result, warnings);
            }
        };
        result.coordinates = Some(center);

        let query = NearbyQuery {
            center,
            radius_meters: self.config.radius_meters,
            place_types: self.config.place_types.clone(),
            keyword: self.config.keyword.clone(),
        };
        let places = match bounded(self.timeout, self.geo.nearby_search(&query)).await {
            Ok(places) => places,
            Err(e) => {
                error!(error = %e, "Nearby search failed");
                warnings.push(format!("Error fetching medical facilities: {e}"));
                return (result, warnings);
            }
        };

        if places.is_empty() {
            warnings.push(NO_FACILITIES_WARNING.to_string());
        }

        result.summary = places
            .iter()
            .take(self.config.summary_limit)
            .enumerate()
            .map(|(i, place)| FacilitySummary::new(i + 1, place))
            .collect();
        result.facilities = places.into_iter().take(self.config.map_limit).collect();

        info!(
            facilities = result.facilities.len(),
            lat = center.lat,
            lng = center.lng,
            "Nearby facilities resolved"
        );
        (result, warnings)
    }
}

#[async_trait]
impl SubFlow for EmergencyLookupFlow {
    fn id(&self) -> &str {
        EMERGENCY
    }

    async fn run(&self, _state: &mut SessionState, input: &SubFlowInput) -> Result<SubFlowOutcome> {
        let location = input
            .location
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .ok_or_else(|| {
                FlowError::Validation("Please enter your location to find nearby care".to_string())
            })?;

        let (result, warnings) = self.lookup(location).await;
        Ok(SubFlowOutcome::new(SubFlowOutput::Emergency(result))
            .with_warnings(warnings)
            .with_status("Seek immediate medical attention"))
    }
}
