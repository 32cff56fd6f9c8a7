//! Geocoding and distance helpers.
//!
//! Destinations are resolved through a Nominatim-compatible HTTP endpoint;
//! distance is the great-circle mileage from the configured base coordinates.

use crate::api::APP_USER_AGENT;
use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info_span, Instrument};
use url::Url;

const EARTH_RADIUS_MILES: f64 = 3958.8;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// One row of a Nominatim search response; coordinates come back as strings.
#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

pub struct Geocoder {
    client: Client,
    search_url: Url,
    base: Coordinates,
}

impl Geocoder {
    /// # Errors
    /// Returns an error if the endpoint URL is invalid or the HTTP client
    /// cannot be created.
    pub fn new(endpoint: &str, base: Coordinates) -> Result<Self> {
        let mut base_url =
            Url::parse(endpoint).with_context(|| format!("invalid geocoder endpoint: {endpoint}"))?;
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }
        let search_url = base_url
            .join("search")
            .with_context(|| format!("invalid geocoder endpoint: {endpoint}"))?;

        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(5))
            .build()
            .context("failed to build geocoder HTTP client")?;

        Ok(Self {
            client,
            search_url,
            base,
        })
    }

    /// Resolve a free-form destination to coordinates.
    ///
    /// Returns `Ok(None)` when the provider has no match for the query.
    ///
    /// # Errors
    /// Returns an error if the provider is unreachable or replies with
    /// something other than a search result list.
    pub async fn geocode(&self, destination: &str) -> Result<Option<Coordinates>> {
        let span = info_span!(
            "geocoder.search",
            http.method = "GET",
            url = %self.search_url
        );
        async {
            let response = self
                .client
                .get(self.search_url.clone())
                .query(&[("q", destination), ("format", "json"), ("limit", "1")])
                .send()
                .await
                .context("failed to send geocoding request")?;

            if !response.status().is_success() {
                return Err(anyhow!(
                    "geocoding request failed with status {}",
                    response.status()
                ));
            }

            let places: Vec<Place> = response
                .json()
                .await
                .context("invalid geocoding response")?;

            places.first().map(Place::coordinates).transpose()
        }
        .instrument(span)
        .await
    }

    /// Great-circle miles from the configured base to the given point.
    #[must_use]
    pub fn miles_from_base(&self, destination: Coordinates) -> f64 {
        haversine_miles(self.base, destination)
    }
}

impl Place {
    fn coordinates(&self) -> Result<Coordinates> {
        let latitude = self
            .lat
            .parse::<f64>()
            .with_context(|| format!("invalid latitude: {}", self.lat))?;
        let longitude = self
            .lon
            .parse::<f64>()
            .with_context(|| format!("invalid longitude: {}", self.lon))?;
        Ok(Coordinates {
            latitude,
            longitude,
        })
    }
}

/// Great-circle distance between two points, in miles.
#[must_use]
pub fn haversine_miles(from: Coordinates, to: Coordinates) -> f64 {
    let lat_from = from.latitude.to_radians();
    let lat_to = to.latitude.to_radians();
    let delta_lat = (to.latitude - from.latitude).to_radians();
    let delta_lon = (to.longitude - from.longitude).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat_from.cos() * lat_to.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_MILES * c
}

#[cfg(test)]
mod tests {
    use super::*;

    const ITHACA: Coordinates = Coordinates {
        latitude: 42.4534,
        longitude: -76.475_266,
    };

    const NEW_YORK: Coordinates = Coordinates {
        latitude: 40.7128,
        longitude: -74.006,
    };

    #[test]
    fn haversine_zero_for_same_point() {
        assert!(haversine_miles(ITHACA, ITHACA) < f64::EPSILON);
    }

    #[test]
    fn haversine_known_pair_within_tolerance() {
        // Ithaca to Manhattan is roughly 170 miles as the crow flies.
        let miles = haversine_miles(ITHACA, NEW_YORK);
        assert!((160.0..180.0).contains(&miles), "got {miles}");
    }

    #[test]
    fn haversine_is_symmetric() {
        let forward = haversine_miles(ITHACA, NEW_YORK);
        let reverse = haversine_miles(NEW_YORK, ITHACA);
        assert!((forward - reverse).abs() < 1e-9);
    }

    #[test]
    fn place_parses_string_coordinates() {
        let place: Place =
            serde_json::from_str(r#"{"lat": "42.4534", "lon": "-76.475266"}"#).unwrap();
        let coordinates = place.coordinates().unwrap();
        assert_eq!(coordinates, ITHACA);
    }

    #[test]
    fn place_rejects_garbage_coordinates() {
        let place: Place = serde_json::from_str(r#"{"lat": "north", "lon": "west"}"#).unwrap();
        assert!(place.coordinates().is_err());
    }

    #[test]
    fn geocoder_rejects_invalid_endpoint() {
        assert!(Geocoder::new("not a url", ITHACA).is_err());
    }

    #[test]
    fn geocoder_joins_search_path() {
        let geocoder = Geocoder::new("https://nominatim.openstreetmap.org", ITHACA).unwrap();
        assert_eq!(
            geocoder.search_url.as_str(),
            "https://nominatim.openstreetmap.org/search"
        );
    }
}
