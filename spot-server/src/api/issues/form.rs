//! Multipart form reader
//!
//! Collects text fields and file fields of a `multipart/form-data` body.
//! A field counts as a file when the client sent a file name for it.

use axum::extract::Multipart;
use shared::error::{AppError, ErrorCode};
use std::collections::HashMap;

use crate::media::Upload;

#[derive(Debug, Default)]
pub struct Form {
    fields: HashMap<String, String>,
    files: HashMap<String, Upload>,
}

impl Form {
    pub async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::validation(format!("Invalid multipart request: {e}")))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            let file_name = field.file_name().map(str::to_string);
            if file_name.is_some() {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::validation(format!("Multipart error: {e}")))?
                    .to_vec();
                form.files.insert(name, Upload { file_name, data });
            } else {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::validation(format!("Multipart error: {e}")))?;
                form.fields.insert(name, text);
            }
        }
        Ok(form)
    }

    /// Trimmed, non-empty text field
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn required(&self, name: &str) -> Result<&str, AppError> {
        self.text(name)
            .ok_or_else(|| {
                AppError::with_message(ErrorCode::RequiredField, format!("Field '{name}' is required"))
            })
    }

    /// Coordinate field; unparsable reads as missing (reported as an invalid location)
    pub fn coordinate(&self, name: &str) -> Option<f64> {
        self.text(name).and_then(|v| v.parse::<f64>().ok())
    }

    pub fn take_file(&mut self, name: &str) -> Option<Upload> {
        self.files.remove(name).filter(|u| !u.data.is_empty())
    }
}
