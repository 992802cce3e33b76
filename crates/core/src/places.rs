//! Business discovery: Google Places lookup with a fixed fallback catalog.
//! Runs a text search then parallel detail fetches, filters down to
//! businesses that actually have a phone number, and falls back to the
//! hardcoded catalog whenever the API key is missing, the call fails, or it
//! returns nothing.

use futures::future::join_all;
use serde::Deserialize;

use crate::config::PlacesConfig;
use crate::domain::Business;

const PLACES_API_URL: &str = "https://maps.googleapis.com/maps/api/place";
const DEFAULT_MAX_RESULTS: usize = 3;
const SEARCH_RADIUS_METERS: u32 = 10_000;

pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

pub struct PlacesResolver {
    http: reqwest::Client,
    api_key: Option<String>,
    demo_mode: bool,
}

impl PlacesResolver {
    pub fn new(config: &PlacesConfig, demo_mode: bool) -> Self {
        PlacesResolver {
            http: reqwest::Client::new(),
            api_key: config.google_places_api_key.clone(),
            demo_mode,
        }
    }

    /// Search for businesses matching `query`, optionally biased toward
    /// `location`/`near`. Always returns at least the fallback catalog's
    /// matching entries — this call never fails outward, matching the
    /// "demo reliability" contract of the original.
    pub async fn search_businesses(
        &self,
        query: &str,
        location: Option<&str>,
        near: Option<&LatLng>,
        max_results: usize,
    ) -> Vec<Business> {
        if self.demo_mode {
            tracing::info!("demo mode enabled, using fallback catalog");
            return fallback_businesses(query, max_results);
        }

        let Some(api_key) = self.api_key.as_deref() else {
            tracing::info!("google places api key not set, using fallback catalog");
            return fallback_businesses(query, max_results);
        };

        match self.search_places_api(api_key, query, location, near, max_results).await {
            Ok(businesses) if !businesses.is_empty() => businesses,
            Ok(_) => {
                tracing::info!(query, "no places results, using fallback catalog");
                fallback_businesses(query, max_results)
            }
            Err(err) => {
                tracing::warn!(error = %err, query, "places api error, using fallback catalog");
                fallback_businesses(query, max_results)
            }
        }
    }

    async fn search_places_api(
        &self,
        api_key: &str,
        query: &str,
        location: Option<&str>,
        near: Option<&LatLng>,
        max_results: usize,
    ) -> reqwest::Result<Vec<Business>> {
        let search_query = match location {
            Some(loc) => format!("{query} in {loc}"),
            None => query.to_string(),
        };

        let mut request = self
            .http
            .get(format!("{PLACES_API_URL}/textsearch/json"))
            .query(&[("query", search_query.as_str()), ("key", api_key)]);

        if let Some(coords) = near {
            request = request.query(&[
                ("location", format!("{},{}", coords.lat, coords.lng)),
                ("radius", SEARCH_RADIUS_METERS.to_string()),
            ]);
        }

        let search: TextSearchResponse = request.send().await?.error_for_status()?.json().await?;

        // Over-fetch since some results won't have phone numbers.
        let candidates: Vec<&str> = search
            .results
            .iter()
            .filter_map(|r| r.place_id.as_deref())
            .take(max_results * 2)
            .collect();

        let detail_futures = candidates
            .into_iter()
            .map(|place_id| self.fetch_place_details(api_key, place_id));
        let details = join_all(detail_futures).await;

        let mut businesses = Vec::new();
        for result in details {
            match result {
                Ok(Some(business)) => {
                    businesses.push(business);
                    if businesses.len() >= max_results {
                        break;
                    }
                }
                Ok(None) => {}
                Err(err) => tracing::warn!(error = %err, "place details fetch failed"),
            }
        }
        Ok(businesses)
    }

    async fn fetch_place_details(&self, api_key: &str, place_id: &str) -> reqwest::Result<Option<Business>> {
        let response: PlaceDetailsResponse = self
            .http
            .get(format!("{PLACES_API_URL}/details/json"))
            .query(&[
                ("place_id", place_id),
                (
                    "fields",
                    "name,formatted_phone_number,international_phone_number,formatted_address,rating,geometry",
                ),
                ("key", api_key),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let Some(result) = response.result else { return Ok(None) };

        let phone = result
            .international_phone_number
            .or(result.formatted_phone_number)
            .map(|p| p.replace(' ', ""));

        let Some(phone) = phone else { return Ok(None) };

        Ok(Some(Business {
            id: place_id.to_string(),
            name: result.name.unwrap_or_else(|| "Unknown".to_string()),
            phone,
            address: result.formatted_address,
            rating: result.rating,
            lat: result.geometry.as_ref().map(|g| g.location.lat),
            lng: result.geometry.as_ref().map(|g| g.location.lng),
        }))
    }
}

#[derive(Deserialize)]
struct TextSearchResponse {
    #[serde(default)]
    results: Vec<TextSearchResult>,
}

#[derive(Deserialize)]
struct TextSearchResult {
    place_id: Option<String>,
}

#[derive(Deserialize)]
struct PlaceDetailsResponse {
    result: Option<PlaceDetailsResult>,
}

#[derive(Deserialize)]
struct PlaceDetailsResult {
    name: Option<String>,
    formatted_phone_number: Option<String>,
    international_phone_number: Option<String>,
    formatted_address: Option<String>,
    rating: Option<f32>,
    geometry: Option<Geometry>,
}

#[derive(Deserialize)]
struct Geometry {
    location: GeometryLocation,
}

#[derive(Deserialize)]
struct GeometryLocation {
    lat: f64,
    lng: f64,
}

/// Hardcoded UK business catalog used whenever the Places API is
/// unavailable. Kept small and deterministic, not meant to be
/// comprehensive — it exists for demo reliability, not production search.
fn fallback_businesses(query: &str, max_results: usize) -> Vec<Business> {
    let query_lower = query.to_lowercase();
    let catalog = fallback_catalog();

    let index = catalog
        .iter()
        .position(|(key, _)| *key == query_lower)
        .or_else(|| catalog.iter().position(|(key, _)| key.contains(&query_lower.as_str()) || query_lower.contains(key)))
        .unwrap_or_else(|| catalog.iter().position(|(key, _)| *key == "default").unwrap());

    catalog[index].1.iter().take(max_results).cloned().collect()
}

fn fallback_catalog() -> Vec<(&'static str, Vec<Business>)> {
    vec![
        (
            "plumber",
            vec![
                business("fallback_plumber_1", "Pimlico Plumbers", "+442078331111", "1 Sail Street, London SE11 6NQ", 4.5, 51.4875, -0.1087),
                business("fallback_plumber_2", "Mr. Plumber London", "+442072230987", "15 High Street, London EC1V 9JX", 4.3, 51.5246, -0.0952),
                business("fallback_plumber_3", "HomeServe UK", "+443301238888", "Cable Drive, Walsall WS2 7BN", 4.1, 52.5860, -1.9826),
            ],
        ),
        (
            "electrician",
            vec![
                business("fallback_electrician_1", "London Electrical Services", "+442071234567", "10 Electric Avenue, London SW9 8LA", 4.6, 51.4613, -0.1156),
                business("fallback_electrician_2", "Spark Electrical", "+442089876543", "25 Power Street, London NW1 8XY", 4.4, 51.5362, -0.1426),
            ],
        ),
        (
            "locksmith",
            vec![business("fallback_locksmith_1", "London Locksmiths 24/7", "+442074561234", "Lock Lane, London W1 2AB", 4.7, 51.5155, -0.1419)],
        ),
        (
            "default",
            vec![
                business("fallback_default_1", "Callforge Demo Business 1", "+15005550006", "123 Demo Street, London", 4.5, 51.5074, -0.1278),
                business("fallback_default_2", "Callforge Demo Business 2", "+15005550006", "456 Test Road, London", 4.3, 51.5124, -0.1231),
            ],
        ),
    ]
}

fn business(id: &str, name: &str, phone: &str, address: &str, rating: f32, lat: f64, lng: f64) -> Business {
    Business {
        id: id.to_string(),
        name: name.to_string(),
        phone: phone.to_string(),
        address: Some(address.to_string()),
        rating: Some(rating),
        lat: Some(lat),
        lng: Some(lng),
    }
}

pub fn default_max_results() -> usize {
    DEFAULT_MAX_RESULTS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_returns_catalog_entries() {
        let businesses = fallback_businesses("plumber", 3);
        assert_eq!(businesses.len(), 3);
        assert!(businesses[0].name.contains("Plumbers"));
    }

    #[test]
    fn partial_match_finds_catalog_key() {
        let businesses = fallback_businesses("emergency electrician", 2);
        assert_eq!(businesses.len(), 2);
        assert!(businesses[0].name.contains("Electrical") || businesses[0].name.contains("Spark"));
    }

    #[test]
    fn unknown_query_falls_back_to_default() {
        let businesses = fallback_businesses("dog walker", 1);
        assert_eq!(businesses.len(), 1);
        assert!(businesses[0].name.contains("Demo Business"));
    }

    #[test]
    fn respects_max_results() {
        let businesses = fallback_businesses("plumber", 1);
        assert_eq!(businesses.len(), 1);
    }
}
