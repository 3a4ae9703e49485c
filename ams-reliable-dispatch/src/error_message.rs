use serde::{Deserialize, Serialize};

use crate::errors::DispatchError;

/// Root of an error response: `{"error": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(rename = "error")]
    pub body: ApiErrorBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub code: u16,
    pub message: String,
    pub status: String,
}

impl ApiError {
    fn new(code: u16, message: impl Into<String>, status: &str) -> Self {
        ApiError {
            body: ApiErrorBody {
                code,
                message: message.into(),
                status: status.to_string(),
            },
        }
    }

    pub fn code(&self) -> u16 {
        self.body.code
    }

    /// Compact JSON form, e.g.
    /// `{"error":{"code":408,"message":"ack timeout","status":"TIMEOUT"}}`.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl From<&DispatchError> for ApiError {
    fn from(err: &DispatchError) -> Self {
        match err {
            DispatchError::AckTimeout => ApiError::new(408, "ack timeout", "TIMEOUT"),
            DispatchError::InvalidOffset { .. } => {
                ApiError::new(400, "Offset out of bounds", "INVALID_ARGUMENT")
            }
            DispatchError::InvalidAckId(_) | DispatchError::UnknownAckId(_) => {
                ApiError::new(400, "Invalid ack id", "INVALID_ARGUMENT")
            }
            DispatchError::InvalidName(kind) => {
                ApiError::new(400, format!("Invalid {} name", kind), "INVALID_ARGUMENT")
            }
            DispatchError::InvalidArgument(arg) => {
                ApiError::new(400, format!("Invalid {} Arguments", arg), "INVALID_ARGUMENT")
            }
            DispatchError::TimestampOutOfBounds(_) => ApiError::new(
                409,
                "Timestamp is out of bounds for the subscription's topic/partition",
                "CONFLICT",
            ),
            DispatchError::SubscriptionNotFound(_) => {
                ApiError::new(404, "Subscription doesn't exist", "NOT_FOUND")
            }
            DispatchError::TopicNotFound(_) => ApiError::new(404, "Topic doesn't exist", "NOT_FOUND"),
            DispatchError::SubscriptionAlreadyExists(_) => {
                ApiError::new(409, "Subscription already exists", "ALREADY_EXISTS")
            }
            DispatchError::TopicAlreadyExists(_) => {
                ApiError::new(409, "Topic already exists", "ALREADY_EXISTS")
            }
            DispatchError::Storage(e) => ApiError::new(500, e.to_string(), "INTERNAL_SERVER_ERROR"),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        ApiError::from(&err)
    }
}
