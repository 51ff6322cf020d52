//! Request body extractor accepting multipart, urlencoded or JSON bodies.

use std::collections::HashMap;

use axum::{
    Form,
    body::Bytes,
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
};
use serde_json::Value;

use crate::error::GatewayError;

/// File part of a multipart body.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Bytes,
}

/// Flat string fields of a request body, plus at most one uploaded file.
#[derive(Debug, Default)]
pub struct FormFields {
    fields: HashMap<String, String>,
    pub file: Option<UploadedFile>,
}

impl FormFields {
    /// Field value, `None` when absent or blank.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn parse<T: std::str::FromStr>(&self, name: &str) -> Result<Option<T>, GatewayError> {
        self.text(name)
            .map(|raw| {
                raw.parse::<T>().map_err(|_| {
                    GatewayError::BadRequest(format!("invalid value for {}: {}", name, raw))
                })
            })
            .transpose()
    }

    /// Checkbox-style flag: `true`, `1`, `yes`, `on` (case-insensitive).
    pub fn flag(&self, name: &str) -> bool {
        self.text(name).is_some_and(|raw| {
            matches!(
                raw.to_ascii_lowercase().as_str(),
                "true" | "1" | "yes" | "on" | "y"
            )
        })
    }

    async fn from_multipart(mut multipart: Multipart) -> Result<Self, GatewayError> {
        let mut form = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| GatewayError::BadRequest(e.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if let Some(file_name) = field.file_name().map(str::to_string) {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| GatewayError::BadRequest(e.body_text()))?;
                if !bytes.is_empty() {
                    form.file = Some(UploadedFile { file_name, bytes });
                }
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| GatewayError::BadRequest(e.body_text()))?;
                form.fields.insert(name, value);
            }
        }
        Ok(form)
    }

    fn from_json(body: &[u8]) -> Result<Self, GatewayError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }

        let object: serde_json::Map<String, Value> = serde_json::from_slice(body)
            .map_err(|e| GatewayError::BadRequest(format!("invalid JSON body: {}", e)))?;

        let fields = object
            .into_iter()
            .filter_map(|(key, value)| match value {
                Value::Null => None,
                Value::String(text) => Some((key, text)),
                other => Some((key, other.to_string())),
            })
            .collect();

        Ok(Self { fields, file: None })
    }
}

impl<S> FromRequest<S> for FormFields
where
    S: Send + Sync,
{
    type Rejection = GatewayError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| GatewayError::BadRequest(e.body_text()))?;
            Self::from_multipart(multipart).await
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(fields) = Form::<HashMap<String, String>>::from_request(req, state)
                .await
                .map_err(|e| GatewayError::BadRequest(e.body_text()))?;
            Ok(Self { fields, file: None })
        } else {
            let body = Bytes::from_request(req, state)
                .await
                .map_err(|e| GatewayError::BadRequest(e.body_text()))?;
            Self::from_json(&body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_values_are_flattened() {
        let form =
            FormFields::from_json(br#"{"query": " tomato ", "top_k": 5, "force": true, "x": null}"#)
                .unwrap();
        assert_eq!(form.text("query"), Some("tomato"));
        assert_eq!(form.parse::<usize>("top_k").unwrap(), Some(5));
        assert!(form.flag("force"));
        assert_eq!(form.text("x"), None);
    }

    #[test]
    fn empty_body_has_no_fields() {
        let form = FormFields::from_json(b"  ").unwrap();
        assert_eq!(form.text("query"), None);
        assert!(!form.flag("force"));
    }

    #[test]
    fn bad_values_are_rejected() {
        let form = FormFields::from_json(br#"{"threshold": "high"}"#).unwrap();
        assert!(matches!(
            form.parse::<f32>("threshold"),
            Err(GatewayError::BadRequest(_))
        ));
        assert!(FormFields::from_json(b"[1, 2]").is_err());
    }
}
