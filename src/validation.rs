use rocket::Request;
use rocket::data::{self, Data, FromData, Limits};
use rocket::http::Status;
use rocket::outcome::Outcome;
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::error::AppError;

/// JSON request body whose parse failures surface as `AppError::Validation`
/// with the serde message, instead of Rocket's bare 400/422.
///
/// Take it as `Result<JsonBody<T>, AppError>` so the handler answers the
/// error itself.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

impl<T> JsonBody<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

pub fn parse_body<T: DeserializeOwned>(raw: &str) -> Result<T, AppError> {
    serde_json::from_str(raw).map_err(|e| AppError::Validation(e.to_string()))
}

#[rocket::async_trait]
impl<'r, T: DeserializeOwned> FromData<'r> for JsonBody<T> {
    type Error = AppError;

    async fn from_data(req: &'r Request<'_>, data: Data<'r>) -> data::Outcome<'r, Self> {
        let limit = req.limits().get("json").unwrap_or(Limits::JSON);

        let raw = match data.open(limit).into_string().await {
            Ok(raw) if raw.is_complete() => raw.into_inner(),
            Ok(_) => {
                return Outcome::Error((
                    Status::PayloadTooLarge,
                    AppError::Validation(format!("request body exceeds {}", limit)),
                ));
            }
            Err(e) => {
                return Outcome::Error((
                    Status::InternalServerError,
                    AppError::Internal(e.to_string()),
                ));
            }
        };

        match parse_body(&raw) {
            Ok(value) => Outcome::Success(JsonBody(value)),
            Err(e) => Outcome::Error((Status::InternalServerError, e)),
        }
    }
}

pub trait JsonValidateExt<T> {
    /// Unwraps the body after running its `validator` rules.
    fn validate_custom(self) -> Result<T, AppError>;
}

impl<T: Validate> JsonValidateExt<T> for JsonBody<T> {
    fn validate_custom(self) -> Result<T, AppError> {
        let inner = self.into_inner();
        inner.validate()?;
        Ok(inner)
    }
}
