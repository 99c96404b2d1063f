//! Multipart form reader shared by the upload endpoints.

use std::{collections::HashMap, str::FromStr};

use axum::extract::Multipart;
use serde::de::DeserializeOwned;

use crate::{error::AppError, upload::UploadedFile};

/// Text fields and files of one multipart request.
#[derive(Debug, Default)]
pub struct FormData {
    fields: HashMap<String, Vec<String>>,
    files: Vec<UploadedFile>,
}

impl FormData {
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = FormData::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(format!("Invalid multipart request: {e}")))?
        {
            let name = field.name().unwrap_or_default().to_string();
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);

            match file_name {
                Some(file_name) => {
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| AppError::BadRequest(format!("Multipart error: {e}")))?;
                    // Browsers send an empty part for an untouched file input.
                    if file_name.is_empty() && bytes.is_empty() {
                        continue;
                    }
                    form.files.push(UploadedFile {
                        field: name,
                        file_name,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
                None => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| AppError::BadRequest(format!("Multipart error: {e}")))?;
                    form.push_text(name, text);
                }
            }
        }

        Ok(form)
    }

    pub fn push_text(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.entry(name.into()).or_default().push(value.into());
    }

    /// First value of a field, `None` when absent or blank.
    pub fn text(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .and_then(|values| values.first())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    pub fn required(&self, name: &str) -> Result<String, AppError> {
        self.text(name)
            .ok_or_else(|| AppError::BadRequest(format!("{name} is required")))
    }

    pub fn parse<T: FromStr>(&self, name: &str) -> Result<Option<T>, AppError> {
        self.text(name)
            .map(|v| {
                v.parse::<T>()
                    .map_err(|_| AppError::BadRequest(format!("{name} is invalid")))
            })
            .transpose()
    }

    pub fn json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, AppError> {
        self.text(name)
            .map(|v| {
                serde_json::from_str::<T>(&v)
                    .map_err(|e| AppError::BadRequest(format!("{name} is invalid: {e}")))
            })
            .transpose()
    }

    /// Accepts `true`/`false`/`1`/`0`; absent means false.
    pub fn flag(&self, name: &str) -> Result<bool, AppError> {
        match self.text(name).as_deref() {
            None | Some("false") | Some("0") => Ok(false),
            Some("true") | Some("1") => Ok(true),
            Some(_) => Err(AppError::BadRequest(format!("{name} must be a boolean"))),
        }
    }

    /// A list given as a JSON array, a comma separated string or repeated
    /// fields. `None` when the field was not sent at all.
    pub fn list(&self, name: &str) -> Result<Option<Vec<String>>, AppError> {
        let Some(values) = self.fields.get(name) else {
            return Ok(None);
        };

        let mut out = Vec::new();
        for value in values {
            let value = value.trim();
            if value.starts_with('[') {
                let parsed: Vec<String> = serde_json::from_str(value)
                    .map_err(|e| AppError::BadRequest(format!("{name} is invalid: {e}")))?;
                out.extend(parsed);
            } else {
                out.extend(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|v| !v.is_empty())
                        .map(str::to_string),
                );
            }
        }
        Ok(Some(out))
    }

    /// Removes and returns the files sent under any of `names`.
    pub fn take_files(&mut self, names: &[&str]) -> Vec<UploadedFile> {
        let (taken, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.files)
            .into_iter()
            .partition(|f| names.contains(&f.field.as_str()));
        self.files = rest;
        taken
    }

    pub fn take_file(&mut self, names: &[&str]) -> Option<UploadedFile> {
        self.take_files(names).into_iter().next()
    }
}
