//! `Json`, `Query` and `Path` extractors that reject with the API error body.
//!
//! axum's own extractors answer malformed input with a plain-text body.
//! These wrap them and turn every rejection into a `bad_request` so clients
//! always get `{detail, code}`.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ApiError;

/// JSON request body, and JSON response.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for Json<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(Json(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

/// Query string.
#[derive(Debug, Clone, Copy, Default)]
pub struct Query<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequestParts<S> for Query<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        axum::extract::Query::<T>::from_request_parts(parts, state)
            .await
            .map(|axum::extract::Query(value)| Query(value))
            .map_err(query_rejection)
    }
}

/// Path parameters.
#[derive(Debug, Clone, Copy)]
pub struct Path<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequestParts<S> for Path<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        axum::extract::Path::<T>::from_request_parts(parts, state)
            .await
            .map(|axum::extract::Path(value)| Path(value))
            .map_err(path_rejection)
    }
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    ApiError::bad_request(rejection.body_text())
}

fn query_rejection(rejection: QueryRejection) -> ApiError {
    ApiError::bad_request(rejection.body_text())
}

fn path_rejection(rejection: PathRejection) -> ApiError {
    ApiError::bad_request(rejection.body_text())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use pulse_models::PageQuery;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Note {
        text: String,
    }

    fn json_request(body: &'static str) -> Request {
        axum::http::Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_json_accepts_valid_body() {
        let Json(note) = Json::<Note>::from_request(json_request(r#"{"text":"hi"}"#), &())
            .await
            .unwrap();
        assert_eq!(note.text, "hi");
    }

    #[tokio::test]
    async fn test_json_rejection_is_bad_request() {
        let err = Json::<Note>::from_request(json_request("{not json"), &())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "bad_request");

        let missing_type = axum::http::Request::builder()
            .method("POST")
            .uri("/")
            .body(Body::from(r#"{"text":"hi"}"#))
            .unwrap();
        let err = Json::<Note>::from_request(missing_type, &()).await.unwrap_err();
        assert_eq!(err.code(), "bad_request");
    }

    #[tokio::test]
    async fn test_query_rejection_is_bad_request() {
        let request = axum::http::Request::builder()
            .uri("/?limit=lots")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();
        let err = Query::<PageQuery>::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "bad_request");
    }
}
