use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::HandlerError;

/// Request handed to an out-of-process handler.
#[derive(Debug, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub url: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body_base64: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub status: u16,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub body_base64: Option<String>,
}

impl RequestEnvelope {
    /// Read `request` fully into an envelope.
    pub async fn from_request(request: Request<Body>) -> Result<Self, HandlerError> {
        let (parts, body) = request.into_parts();
        let headers = parts
            .headers
            .iter()
            .map(|(key, value)| {
                (
                    key.as_str().to_string(),
                    value.to_str().unwrap_or("").to_string(),
                )
            })
            .collect();

        let bytes = axum::body::to_bytes(body, usize::MAX)
            .await
            .map_err(|err| HandlerError::Body(err.to_string()))?;
        let body_base64 = if bytes.is_empty() {
            None
        } else {
            Some(base64::engine::general_purpose::STANDARD.encode(&bytes))
        };

        Ok(Self {
            url: parts.uri.to_string(),
            method: parts.method.as_str().to_string(),
            headers,
            body_base64,
        })
    }
}

impl ResponseEnvelope {
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn into_response(self) -> Result<Response<Body>, HandlerError> {
        let status = StatusCode::from_u16(self.status)
            .map_err(|_| HandlerError::Body(format!("invalid status {}", self.status)))?;
        let mut response = Response::builder().status(status);
        for (key, value) in self.headers {
            if key.eq_ignore_ascii_case("set-cookie") && value.contains('\n') {
                for part in value.split('\n').filter(|part| !part.is_empty()) {
                    response = response.header(&key, part);
                }
                continue;
            }
            response = response.header(&key, value);
        }

        let body = match self.body_base64 {
            Some(body_base64) => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(body_base64.as_bytes())
                    .map_err(|err| HandlerError::Body(format!("Failed to decode body: {}", err)))?;
                Body::from(bytes)
            }
            None => Body::from(self.body),
        };
        response
            .body(body)
            .map_err(|err| HandlerError::Body(err.to_string()))
    }
}
