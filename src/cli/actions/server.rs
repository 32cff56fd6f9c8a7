use crate::{
    api,
    api::handlers::auth::AuthConfig,
    geo::{Coordinates, Geocoder},
};
use anyhow::Result;
use std::sync::Arc;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub geocoder_url: String,
    pub base_lat: f64,
    pub base_lon: f64,
    pub session_ttl_seconds: i64,
    pub refresh_ttl_seconds: Option<i64>,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the geocoder endpoint is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = AuthConfig::new()
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_refresh_ttl_seconds(args.refresh_ttl_seconds);

    let base = Coordinates {
        latitude: args.base_lat,
        longitude: args.base_lon,
    };
    let geocoder = Geocoder::new(&args.geocoder_url, base)?;

    api::new(args.port, args.dsn, auth_config, Arc::new(geocoder)).await
}
