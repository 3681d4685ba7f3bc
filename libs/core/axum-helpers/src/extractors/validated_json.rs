//! JSON body extractor that runs `validator` rules before the handler.

use crate::errors::AppError;
use axum::extract::{FromRequest, Json, Request};
use serde::de::DeserializeOwned;
use validator::Validate;

/// Deserializes the body as JSON and validates it.
///
/// Malformed JSON keeps axum's status and message; rule violations answer
/// `400` with the per-field errors in `details`.
///
/// ```ignore
/// async fn add(ValidatedJson(input): ValidatedJson<AddEmailConfig>) -> impl IntoResponse { .. }
/// ```
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(data) = Json::<T>::from_request(req, state).await?;
        data.validate()?;
        Ok(ValidatedJson(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use serde::Deserialize;

    #[derive(Deserialize, Validate)]
    struct Sender {
        #[validate(email)]
        email: String,
    }

    fn request(body: &'static str) -> Request {
        Request::builder()
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_accepts_valid_body() {
        let ValidatedJson(sender) = ValidatedJson::<Sender>::from_request(
            request(r#"{"email":"ada@example.com"}"#),
            &(),
        )
        .await
        .unwrap();
        assert_eq!(sender.email, "ada@example.com");
    }

    #[tokio::test]
    async fn test_rule_violation_is_bad_request() {
        let Err(rejection) =
            ValidatedJson::<Sender>::from_request(request(r#"{"email":"nope"}"#), &()).await
        else {
            panic!("invalid email accepted");
        };
        assert_eq!(rejection.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_json_is_rejected() {
        let Err(rejection) = ValidatedJson::<Sender>::from_request(request("{"), &()).await else {
            panic!("malformed body accepted");
        };
        assert!(rejection.into_response().status().is_client_error());
    }
}
