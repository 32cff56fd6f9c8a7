//! User profile and rating endpoints.

use anyhow::Context;
use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use tracing::{error, Instrument};
use utoipa::ToSchema;

use super::auth::principal::require_session;
use super::trips::TripSummary;

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
pub struct UserSummary {
    pub id: i64,
    pub name: String,
    pub username: String,
}

/// `average_rating` is the arithmetic mean of received ratings, or the
/// documented sentinel `-1.0` for a user with no ratings at all.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserDetail {
    pub id: i64,
    pub name: String,
    pub username: String,
    pub balance: f64,
    pub trips: Vec<TripSummary>,
    pub average_rating: f64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RatingCreate {
    rating: i32,
    review: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RatingDetail {
    pub id: i64,
    pub user: UserSummary,
    pub rating: i32,
    pub review: String,
}

#[utoipa::path(
    get,
    path = "/users/{user_id}",
    params(
        ("user_id" = i64, Path, description = "User id")
    ),
    responses(
        (status = 200, description = "User with trips and average rating", body = UserDetail),
        (status = 404, description = "Unknown user", body = String)
    ),
    tag = "users"
)]
pub async fn get_user(Path(user_id): Path<i64>, pool: Extension<PgPool>) -> impl IntoResponse {
    match fetch_user_detail(&pool, user_id).await {
        Ok(Some(detail)) => (StatusCode::OK, Json(detail)).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "User not found!".to_string()).into_response(),
        Err(err) => {
            error!("Failed to fetch user: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/users/{user_id}/rating",
    request_body = RatingCreate,
    params(
        ("user_id" = i64, Path, description = "Reviewee user id")
    ),
    responses(
        (status = 201, description = "Anonymous rating created", body = RatingDetail),
        (status = 400, description = "Invalid body, rating, or session token", body = String),
        (status = 403, description = "Users cannot rate themselves", body = String),
        (status = 404, description = "Unknown user", body = String)
    ),
    tag = "users"
)]
pub async fn add_rating(
    Path(reviewee_id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<RatingCreate>>,
) -> impl IntoResponse {
    let actor = match require_session(&headers, &pool).await {
        Ok(user) => user,
        Err(failure) => return failure.into_response(),
    };

    if actor.id == reviewee_id {
        return (StatusCode::FORBIDDEN, "Cannot create self rating".to_string()).into_response();
    }

    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Invalid body".to_string()).into_response();
    };

    if !(1..=5).contains(&request.rating) {
        return (
            StatusCode::BAD_REQUEST,
            "Rating must be an integer between 1-5!".to_string(),
        )
            .into_response();
    }

    let review = request.review.unwrap_or_default();
    match insert_rating(&pool, reviewee_id, request.rating, &review).await {
        Ok(Some(rating)) => (StatusCode::CREATED, Json(rating)).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "User not found!".to_string()).into_response(),
        Err(err) => {
            error!("Failed to create rating: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to create rating".to_string(),
            )
                .into_response()
        }
    }
}

fn average_or_sentinel(average: Option<f64>) -> f64 {
    average.unwrap_or(-1.0)
}

async fn fetch_user_detail(pool: &PgPool, user_id: i64) -> anyhow::Result<Option<UserDetail>> {
    let query = "SELECT id, name, username, balance FROM users WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch user")?;

    let Some(row) = row else {
        return Ok(None);
    };

    let query = r"
        SELECT t.id, t.destination, t.trip_date, t.distance_miles, t.gas_price
        FROM trips t
        JOIN (
            SELECT trip_id FROM trip_drivers WHERE user_id = $1
            UNION
            SELECT trip_id FROM trip_riders WHERE user_id = $1
        ) links ON links.trip_id = t.id
        ORDER BY t.trip_date, t.id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let trip_rows = sqlx::query(query)
        .bind(user_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to fetch user trips")?;

    let query = r"
        SELECT AVG(rating)::DOUBLE PRECISION AS average
        FROM ratings
        WHERE user_id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let average_row = sqlx::query(query)
        .bind(user_id)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to fetch average rating")?;

    Ok(Some(UserDetail {
        id: row.get("id"),
        name: row.get("name"),
        username: row.get("username"),
        balance: row.get("balance"),
        trips: trip_rows.iter().map(TripSummary::from_row).collect(),
        average_rating: average_or_sentinel(average_row.get("average")),
    }))
}

/// Insert an anonymous rating for the reviewee.
///
/// Returns `Ok(None)` when the reviewee does not exist; reviewee lookup and
/// rating insert commit together.
async fn insert_rating(
    pool: &PgPool,
    reviewee_id: i64,
    rating: i32,
    review: &str,
) -> anyhow::Result<Option<RatingDetail>> {
    let mut tx = pool.begin().await.context("begin rating transaction")?;

    let query = "SELECT id, name, username FROM users WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let reviewee = sqlx::query(query)
        .bind(reviewee_id)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to fetch reviewee")?;

    let Some(reviewee) = reviewee else {
        return Ok(None);
    };

    let query = r"
        INSERT INTO ratings (user_id, rating, review)
        VALUES ($1, $2, $3)
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(reviewee_id)
        .bind(rating)
        .bind(review)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert rating")?;

    tx.commit().await.context("commit rating transaction")?;

    Ok(Some(RatingDetail {
        id: row.get("id"),
        user: UserSummary {
            id: reviewee.get("id"),
            name: reviewee.get("name"),
            username: reviewee.get("username"),
        },
        rating,
        review: review.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_sentinel_for_unrated_users() {
        assert!((average_or_sentinel(None) - (-1.0)).abs() < f64::EPSILON);
    }

    #[test]
    fn average_passes_real_means_through() {
        assert!((average_or_sentinel(Some(3.5)) - 3.5).abs() < f64::EPSILON);
        // A real low score is not the sentinel.
        assert!((average_or_sentinel(Some(1.0)) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rating_create_defaults_review_to_absent() {
        let value = serde_json::json!({ "rating": 4 });
        let decoded: RatingCreate = serde_json::from_value(value).unwrap();
        assert_eq!(decoded.rating, 4);
        assert_eq!(decoded.review, None);
    }

    #[test]
    fn rating_detail_serializes_reviewee() {
        let detail = RatingDetail {
            id: 1,
            user: UserSummary {
                id: 2,
                name: "Bob".to_string(),
                username: "bob".to_string(),
            },
            rating: 5,
            review: "great driver".to_string(),
        };
        let value = serde_json::to_value(&detail).unwrap();
        assert_eq!(
            value
                .get("user")
                .and_then(|user| user.get("username"))
                .and_then(serde_json::Value::as_str),
            Some("bob")
        );
    }
}
