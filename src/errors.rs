use std::path::PathBuf;

use axum::http::StatusCode;
use thiserror::Error;

/// Structured error types for the inference gateway.
///
/// Each variant carries the context of the stage that produced it. Only `Decode`,
/// `MissingInput`, `PayloadTooLarge` and `Auth` are ever shown to a caller verbatim; the
/// rest collapse into a generic 500 and keep their detail in the server log.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Decode error: {reason}")]
    Decode { reason: String },

    #[error("Missing input: {field}")]
    MissingInput { field: String },

    #[error("Payload too large: {reason}")]
    PayloadTooLarge { reason: String },

    #[error("Unknown model: no pipeline registered for {key}")]
    UnknownModel { key: String },

    #[error("Inference error: {operation} failed for {model}")]
    Inference {
        model: String,
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Model load error: {operation} failed for {model}")]
    ModelLoad {
        model: String,
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Model output error: {model} produced shape {actual:?}, expected {expected:?}")]
    ModelOutput {
        model: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Authentication error: {reason}")]
    Auth { reason: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unexpected fault: {operation}")]
    Unexpected {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Message returned for every fault that is not the caller's doing.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

impl GatewayError {
    pub fn missing_input(field: &str) -> Self {
        Self::MissingInput {
            field: field.to_string(),
        }
    }

    pub fn auth(reason: &str) -> Self {
        Self::Auth {
            reason: reason.to_string(),
        }
    }

    pub fn unexpected<E>(operation: &str, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Unexpected {
            operation: operation.to_string(),
            source: source.into(),
        }
    }

    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Decode { .. } | Self::MissingInput { .. } => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Auth { .. } => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text placed in the `error` field of the response envelope.
    pub fn public_message(&self) -> String {
        match self {
            Self::Decode { .. } => "Invalid image data".to_string(),
            Self::MissingInput { field } if field == "image" => "No image provided".to_string(),
            Self::MissingInput { field } => format!("Missing field: {field}"),
            Self::PayloadTooLarge { .. } => "Upload exceeds the size limit".to_string(),
            Self::Auth { reason } => reason.clone(),
            _ => INTERNAL_ERROR_MESSAGE.to_string(),
        }
    }

    /// Client-side faults are logged at warn, everything else at error.
    pub const fn is_client_fault(&self) -> bool {
        matches!(
            self,
            Self::Decode { .. }
                | Self::MissingInput { .. }
                | Self::PayloadTooLarge { .. }
                | Self::Auth { .. }
        )
    }
}

/// Malformed or unsupported image bytes are the caller's fault.
impl From<image::ImageError> for GatewayError {
    fn from(err: image::ImageError) -> Self {
        Self::Decode {
            reason: err.to_string(),
        }
    }
}

/// Shape errors only arise while reshaping fixed-size pipeline tensors, so they are
/// programming faults rather than bad input.
impl From<ndarray::ShapeError> for GatewayError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Unexpected {
            operation: "tensor shape conversion".to_string(),
            source: Box::new(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            GatewayError::missing_input("image").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::Decode {
                reason: "truncated".to_string()
            }
            .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::auth("Missing Authorization header").status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GatewayError::UnknownModel {
                key: "colorize".to_string()
            }
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_detail_is_not_public() {
        let err = GatewayError::Inference {
            model: "flood".to_string(),
            operation: "session run".to_string(),
            source: "input dims [1, 3] do not match".into(),
        };
        assert_eq!(err.public_message(), INTERNAL_ERROR_MESSAGE);
        assert!(!err.is_client_fault());
        assert!(err.to_string().contains("flood"));
    }

    #[test]
    fn test_payload_too_large_is_client_fault() {
        let err = GatewayError::PayloadTooLarge {
            reason: "length limit exceeded".to_string(),
        };
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.public_message(), "Upload exceeds the size limit");
        assert!(err.is_client_fault());
    }

    #[test]
    fn test_question_mark_conversions() {
        fn decode() -> Result<image::DynamicImage> {
            Ok(image::load_from_memory(b"not an image")?)
        }
        fn reshape() -> Result<ndarray::Array2<f32>> {
            Ok(ndarray::Array2::from_shape_vec((2, 2), vec![0.0; 3])?)
        }

        let err = decode().unwrap_err();
        assert!(matches!(err, GatewayError::Decode { .. }));
        assert!(err.is_client_fault());

        let err = reshape().unwrap_err();
        assert!(matches!(err, GatewayError::Unexpected { .. }));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_missing_image_message() {
        assert_eq!(
            GatewayError::missing_input("image").public_message(),
            "No image provided"
        );
    }
}
