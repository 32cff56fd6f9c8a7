//! Trip endpoints: list upcoming trips, post a trip, join as rider, delete.
//!
//! Flow Overview:
//! 1) Mutating routes authenticate the bearer session token.
//! 2) The destination is geocoded and the distance measured from the
//!    configured base coordinates.
//! 3) Trip membership lives in explicit join tables, written transactionally
//!    with the trip row.

use anyhow::Context;
use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, PgPool, Row};
use std::{collections::HashMap, sync::Arc};
use tracing::{error, Instrument};
use utoipa::ToSchema;

use super::auth::{principal::require_session, storage::SessionUser};
use super::users::UserSummary;
use crate::geo::Geocoder;

/// Wire format for trip dates, e.g. `08-31-2026`.
pub(crate) const DATE_FORMAT: &str = "%m-%d-%Y";

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TripCreate {
    destination: String,
    date: String,
    gas_price: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RiderAdd {
    user_id: i64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TripSummary {
    pub id: i64,
    pub destination: String,
    pub date: String,
    pub distance: i32,
    pub gas_price: String,
}

impl TripSummary {
    pub(crate) fn from_row(row: &PgRow) -> Self {
        let trip_date: NaiveDate = row.get("trip_date");
        Self {
            id: row.get("id"),
            destination: row.get("destination"),
            date: trip_date.format(DATE_FORMAT).to_string(),
            distance: row.get("distance_miles"),
            gas_price: row.get("gas_price"),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TripDetail {
    pub id: i64,
    pub destination: String,
    pub date: String,
    pub distance: i32,
    pub gas_price: String,
    pub drivers: Vec<UserSummary>,
    pub riders: Vec<UserSummary>,
}

impl TripDetail {
    fn assemble(summary: TripSummary, drivers: Vec<UserSummary>, riders: Vec<UserSummary>) -> Self {
        Self {
            id: summary.id,
            destination: summary.destination,
            date: summary.date,
            distance: summary.distance,
            gas_price: summary.gas_price,
            drivers,
            riders,
        }
    }
}

#[derive(ToSchema, Serialize, Debug)]
pub struct TripList {
    pub trips: Vec<TripDetail>,
}

#[derive(Debug)]
enum TripError {
    NotFound(&'static str),
    Forbidden(&'static str),
    Internal(anyhow::Error),
}

impl IntoResponse for TripError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message).into_response(),
            Self::Forbidden(message) => (StatusCode::FORBIDDEN, message).into_response(),
            Self::Internal(err) => {
                error!("Failed to handle trip request: {err}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

#[utoipa::path(
    get,
    path = "/trips",
    responses(
        (status = 200, description = "Upcoming trips with drivers and riders", body = TripList)
    ),
    tag = "trips"
)]
pub async fn list_trips(pool: Extension<PgPool>) -> impl IntoResponse {
    let today = Utc::now().date_naive();
    match fetch_upcoming_trips(&pool, today).await {
        Ok(trips) => (StatusCode::OK, Json(TripList { trips })).into_response(),
        Err(err) => {
            error!("Failed to list trips: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/trips",
    request_body = TripCreate,
    responses(
        (status = 201, description = "Trip created with the caller as driver", body = TripDetail),
        (status = 400, description = "Invalid body, date, session token, or destination", body = String),
        (status = 502, description = "Geocoding provider unavailable", body = String)
    ),
    tag = "trips"
)]
pub async fn create_trip(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    geocoder: Extension<Arc<Geocoder>>,
    payload: Option<Json<TripCreate>>,
) -> impl IntoResponse {
    let driver = match require_session(&headers, &pool).await {
        Ok(user) => user,
        Err(failure) => return failure.into_response(),
    };

    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Invalid body".to_string()).into_response();
    };

    let destination = request.destination.trim();
    let gas_price = request.gas_price.trim();
    if destination.is_empty() || gas_price.is_empty() {
        return (StatusCode::BAD_REQUEST, "Invalid body".to_string()).into_response();
    }

    let Ok(date) = NaiveDate::parse_from_str(request.date.trim(), DATE_FORMAT) else {
        return (
            StatusCode::BAD_REQUEST,
            "Invalid date, expected MM-DD-YYYY".to_string(),
        )
            .into_response();
    };

    let place = match geocoder.geocode(destination).await {
        Ok(Some(place)) => place,
        Ok(None) => {
            return (StatusCode::BAD_REQUEST, "Destination not found".to_string()).into_response()
        }
        Err(err) => {
            error!("Geocoding failed: {err}");
            return (
                StatusCode::BAD_GATEWAY,
                "Geocoding unavailable".to_string(),
            )
                .into_response();
        }
    };
    let distance = geocoder.miles_from_base(place).round() as i32;

    match insert_trip(&pool, &driver, destination, date, distance, gas_price).await {
        Ok(trip) => (StatusCode::CREATED, Json(trip)).into_response(),
        Err(err) => {
            error!("Failed to create trip: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to create trip".to_string(),
            )
                .into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/trips/{trip_id}/add",
    request_body = RiderAdd,
    params(
        ("trip_id" = i64, Path, description = "Trip id")
    ),
    responses(
        (status = 200, description = "Rider added", body = TripDetail),
        (status = 400, description = "Invalid body or session token", body = String),
        (status = 404, description = "Unknown trip or user", body = String)
    ),
    tag = "trips"
)]
pub async fn add_rider(
    Path(trip_id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<RiderAdd>>,
) -> impl IntoResponse {
    if let Err(failure) = require_session(&headers, &pool).await {
        return failure.into_response();
    }

    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Invalid body".to_string()).into_response();
    };

    match join_trip(&pool, trip_id, request.user_id).await {
        Ok(trip) => (StatusCode::OK, Json(trip)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/trips/{trip_id}",
    params(
        ("trip_id" = i64, Path, description = "Trip id")
    ),
    responses(
        (status = 200, description = "Trip deleted", body = TripDetail),
        (status = 400, description = "Invalid session token", body = String),
        (status = 403, description = "Caller does not drive this trip", body = String),
        (status = 404, description = "Unknown trip", body = String)
    ),
    tag = "trips"
)]
pub async fn delete_trip(
    Path(trip_id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> impl IntoResponse {
    let actor = match require_session(&headers, &pool).await {
        Ok(user) => user,
        Err(failure) => return failure.into_response(),
    };

    match remove_trip(&pool, trip_id, actor.id).await {
        Ok(trip) => (StatusCode::OK, Json(trip)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Clone, Copy, Debug)]
enum Membership {
    Drivers,
    Riders,
}

impl Membership {
    const fn query(self) -> &'static str {
        match self {
            Self::Drivers => {
                r"
                SELECT m.trip_id, u.id, u.name, u.username
                FROM trip_drivers m
                JOIN users u ON u.id = m.user_id
                WHERE m.trip_id = ANY($1)
                ORDER BY u.id
                "
            }
            Self::Riders => {
                r"
                SELECT m.trip_id, u.id, u.name, u.username
                FROM trip_riders m
                JOIN users u ON u.id = m.user_id
                WHERE m.trip_id = ANY($1)
                ORDER BY u.id
                "
            }
        }
    }
}

async fn fetch_members(
    pool: &PgPool,
    trip_ids: &[i64],
    membership: Membership,
) -> anyhow::Result<HashMap<i64, Vec<UserSummary>>> {
    let query = membership.query();
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(trip_ids)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to fetch trip members")?;

    let mut members: HashMap<i64, Vec<UserSummary>> = HashMap::new();
    for row in rows {
        members
            .entry(row.get("trip_id"))
            .or_default()
            .push(UserSummary {
                id: row.get("id"),
                name: row.get("name"),
                username: row.get("username"),
            });
    }
    Ok(members)
}

async fn fetch_upcoming_trips(pool: &PgPool, today: NaiveDate) -> anyhow::Result<Vec<TripDetail>> {
    let query = r"
        SELECT id, destination, trip_date, distance_miles, gas_price
        FROM trips
        WHERE trip_date >= $1
        ORDER BY trip_date, id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(today)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list trips")?;

    let summaries: Vec<TripSummary> = rows.iter().map(TripSummary::from_row).collect();
    let trip_ids: Vec<i64> = summaries.iter().map(|summary| summary.id).collect();

    let mut drivers = fetch_members(pool, &trip_ids, Membership::Drivers).await?;
    let mut riders = fetch_members(pool, &trip_ids, Membership::Riders).await?;

    Ok(summaries
        .into_iter()
        .map(|summary| {
            let trip_drivers = drivers.remove(&summary.id).unwrap_or_default();
            let trip_riders = riders.remove(&summary.id).unwrap_or_default();
            TripDetail::assemble(summary, trip_drivers, trip_riders)
        })
        .collect())
}

pub(crate) async fn fetch_trip_detail(
    pool: &PgPool,
    trip_id: i64,
) -> anyhow::Result<Option<TripDetail>> {
    let query = r"
        SELECT id, destination, trip_date, distance_miles, gas_price
        FROM trips
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(trip_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch trip")?;

    let Some(row) = row else {
        return Ok(None);
    };
    let summary = TripSummary::from_row(&row);

    let mut drivers = fetch_members(pool, &[trip_id], Membership::Drivers).await?;
    let mut riders = fetch_members(pool, &[trip_id], Membership::Riders).await?;

    Ok(Some(TripDetail::assemble(
        summary,
        drivers.remove(&trip_id).unwrap_or_default(),
        riders.remove(&trip_id).unwrap_or_default(),
    )))
}

/// Trip row and driver link commit together or not at all.
async fn insert_trip(
    pool: &PgPool,
    driver: &SessionUser,
    destination: &str,
    date: NaiveDate,
    distance: i32,
    gas_price: &str,
) -> anyhow::Result<TripDetail> {
    let mut tx = pool.begin().await.context("begin trip transaction")?;

    let query = r"
        INSERT INTO trips (destination, trip_date, distance_miles, gas_price)
        VALUES ($1, $2, $3, $4)
        RETURNING id, destination, trip_date, distance_miles, gas_price
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(destination)
        .bind(date)
        .bind(distance)
        .bind(gas_price)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert trip")?;
    let summary = TripSummary::from_row(&row);

    let query = "INSERT INTO trip_drivers (user_id, trip_id) VALUES ($1, $2)";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(driver.id)
        .bind(summary.id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert trip driver")?;

    tx.commit().await.context("commit trip transaction")?;

    Ok(TripDetail::assemble(
        summary,
        vec![UserSummary {
            id: driver.id,
            name: driver.name.clone(),
            username: driver.username.clone(),
        }],
        Vec::new(),
    ))
}

async fn join_trip(pool: &PgPool, trip_id: i64, user_id: i64) -> Result<TripDetail, TripError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|err| TripError::Internal(err.into()))?;

    let rider = sqlx::query("SELECT 1 FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|err| TripError::Internal(err.into()))?;
    if rider.is_none() {
        return Err(TripError::NotFound("User not found!"));
    }

    let trip = sqlx::query("SELECT 1 FROM trips WHERE id = $1")
        .bind(trip_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|err| TripError::Internal(err.into()))?;
    if trip.is_none() {
        return Err(TripError::NotFound("Trip not found!"));
    }

    // Membership is a set: joining twice is a no-op.
    sqlx::query("INSERT INTO trip_riders (user_id, trip_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
        .bind(user_id)
        .bind(trip_id)
        .execute(&mut *tx)
        .await
        .map_err(|err| TripError::Internal(err.into()))?;

    tx.commit()
        .await
        .map_err(|err| TripError::Internal(err.into()))?;

    fetch_trip_detail(pool, trip_id)
        .await
        .map_err(TripError::Internal)?
        .ok_or(TripError::NotFound("Trip not found!"))
}

async fn remove_trip(pool: &PgPool, trip_id: i64, actor_id: i64) -> Result<TripDetail, TripError> {
    let detail = fetch_trip_detail(pool, trip_id)
        .await
        .map_err(TripError::Internal)?
        .ok_or(TripError::NotFound("Trip not found!"))?;

    let mut tx = pool
        .begin()
        .await
        .map_err(|err| TripError::Internal(err.into()))?;

    let is_driver = sqlx::query("SELECT 1 FROM trip_drivers WHERE trip_id = $1 AND user_id = $2")
        .bind(trip_id)
        .bind(actor_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|err| TripError::Internal(err.into()))?;
    if is_driver.is_none() {
        return Err(TripError::Forbidden("Trip can only be deleted by driver!"));
    }

    // Join-table rows go with the trip via ON DELETE CASCADE.
    let result = sqlx::query("DELETE FROM trips WHERE id = $1")
        .bind(trip_id)
        .execute(&mut *tx)
        .await
        .map_err(|err| TripError::Internal(err.into()))?;
    if result.rows_affected() == 0 {
        return Err(TripError::NotFound("Trip not found!"));
    }

    tx.commit()
        .await
        .map_err(|err| TripError::Internal(err.into()))?;

    Ok(detail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_format_round_trips() {
        let date = NaiveDate::parse_from_str("08-31-2026", DATE_FORMAT).unwrap();
        assert_eq!(date.format(DATE_FORMAT).to_string(), "08-31-2026");
    }

    #[test]
    fn date_format_rejects_other_shapes() {
        assert!(NaiveDate::parse_from_str("2026-08-31", DATE_FORMAT).is_err());
        assert!(NaiveDate::parse_from_str("31-08-2026", DATE_FORMAT).is_err());
        assert!(NaiveDate::parse_from_str("tomorrow", DATE_FORMAT).is_err());
    }

    #[test]
    fn trip_detail_serializes_wire_keys() {
        let detail = TripDetail {
            id: 1,
            destination: "New York, NY".to_string(),
            date: "08-31-2026".to_string(),
            distance: 170,
            gas_price: "3.50".to_string(),
            drivers: Vec::new(),
            riders: Vec::new(),
        };
        let value = serde_json::to_value(&detail).unwrap();
        assert_eq!(
            value.get("date").and_then(serde_json::Value::as_str),
            Some("08-31-2026")
        );
        assert_eq!(
            value.get("distance").and_then(serde_json::Value::as_i64),
            Some(170)
        );
        assert!(value.get("drivers").is_some());
        assert!(value.get("riders").is_some());
    }

    #[test]
    fn trip_create_rejects_missing_fields() {
        let value = serde_json::json!({ "destination": "New York, NY" });
        assert!(serde_json::from_value::<TripCreate>(value).is_err());
    }
}
