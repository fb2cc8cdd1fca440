use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::Value;
use tracing::info;
use triage_flow::{Coordinates, Facility, GeoService, NearbyQuery, ServiceError};

const GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";
const NEARBY_SEARCH_URL: &str = "https://maps.googleapis.com/maps/api/place/nearbysearch/json";

/// Google Maps Geocoding and Places Nearby Search
pub struct GoogleMapsClient {
    http: reqwest::Client,
    api_key: String,
}

impl GoogleMapsClient {
    pub fn new(http: reqwest::Client, api_key: String) -> Self {
        Self { http, api_key }
    }

    async fn get_json(&self, url: &str) -> anyhow::Result<Value> {
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("Google Maps request failed: {}", response.status()));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl GeoService for GoogleMapsClient {
    async fn geocode(&self, address: &str) -> Result<Option<Coordinates>, ServiceError> {
        let url = format!(
            "{}?address={}&key={}",
            GEOCODE_URL,
            urlencoding::encode(address),
            urlencoding::encode(&self.api_key)
        );
        let body = self.get_json(&url).await?;
        let coordinates = parse_geocode(&body)?;
        info!(found = coordinates.is_some(), "Geocoding finished");
        Ok(coordinates)
    }

    async fn nearby_search(&self, query: &NearbyQuery) -> Result<Vec<Facility>, ServiceError> {
        let url = format!(
            "{}?location={},{}&radius={}&type={}&keyword={}&key={}",
            NEARBY_SEARCH_URL,
            query.center.lat,
            query.center.lng,
            query.radius_meters,
            urlencoding::encode(&query.place_types),
            urlencoding::encode(&query.keyword),
            urlencoding::encode(&self.api_key)
        );
        let body = self.get_json(&url).await?;
        let places = parse_places(&body)?;
        info!(count = places.len(), "Nearby search finished");
        Ok(places)
    }
}

/// `OK` and `ZERO_RESULTS` are answers; every other status is a failure.
fn check_status(body: &Value) -> Result<bool, ServiceError> {
    match body["status"].as_str() {
        Some("OK") => Ok(true),
        Some("ZERO_RESULTS") => Ok(false),
        Some(status) => Err(ServiceError::InvalidResponse(format!(
            "{status}: {}",
            body["error_message"].as_str().unwrap_or("no details")
        ))),
        None => Err(ServiceError::InvalidResponse(
            "missing status field".to_string(),
        )),
    }
}

fn coordinates(value: &Value) -> Option<Coordinates> {
    Some(Coordinates {
        lat: value["lat"].as_f64()?,
        lng: value["lng"].as_f64()?,
    })
}

fn parse_geocode(body: &Value) -> Result<Option<Coordinates>, ServiceError> {
    if !check_status(body)? {
        return Ok(None);
    }
    Ok(coordinates(&body["results"][0]["geometry"]["location"]))
}

fn parse_places(body: &Value) -> Result<Vec<Facility>, ServiceError> {
    if !check_status(body)? {
        return Ok(Vec::new());
    }
    let results = body["results"].as_array().cloned().unwrap_or_default();
    Ok(results
        .iter()
        .map(|place| Facility {
            name: place["name"].as_str().map(str::to_string),
            rating: place["rating"].as_f64().map(|r| r as f32),
            address: place["vicinity"].as_str().map(str::to_string),
            business_status: place["business_status"].as_str().map(str::to_string),
            location: coordinates(&place["geometry"]["location"]),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn geocode_reads_first_result() {
        let body = json!({
            "status": "OK",
            "results": [{ "geometry": { "location": { "lat": 17.385, "lng": 78.4867 } } }]
        });
        assert_eq!(
            parse_geocode(&body).unwrap(),
            Some(Coordinates {
                lat: 17.385,
                lng: 78.4867
            })
        );
        assert_eq!(
            parse_geocode(&json!({ "status": "ZERO_RESULTS", "results": [] })).unwrap(),
            None
        );
    }

    #[test]
    fn denied_request_is_an_error() {
        let body = json!({ "status": "REQUEST_DENIED", "error_message": "bad key" });
        assert_eq!(
            parse_geocode(&body),
            Err(ServiceError::InvalidResponse("REQUEST_DENIED: bad key".to_string()))
        );
    }

    #[test]
    fn places_keep_collaborator_order() {
        let body = json!({
            "status": "OK",
            "results": [
                { "name": "Apollo Hospital", "rating": 4.4, "vicinity": "Jubilee Hills",
                  "business_status": "OPERATIONAL",
                  "geometry": { "location": { "lat": 17.42, "lng": 78.41 } } },
                { "name": "Care Clinic" }
            ]
        });
        let places = parse_places(&body).unwrap();
        assert_eq!(places.len(), 2);
        assert_eq!(places[0].name.as_deref(), Some("Apollo Hospital"));
        assert_eq!(places[0].address.as_deref(), Some("Jubilee Hills"));
        assert_eq!(places[1].rating, None);
        assert_eq!(places[1].location, None);
    }
}
