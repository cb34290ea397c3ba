//! Flat field-dictionary representation of an [`AssetRecord`].
//!
//! Snapshot logs store each record as a JSON object whose keys are exactly the
//! record's field names. Old logs predate some fields and newer ones may carry
//! fields this version doesn't know about, so parsing is deliberately lenient:
//! anything unrecognized or malformed is logged and dropped, never raised.

use crate::error::{ErrorKind, Result};
use crate::record::{AssetRecord, kb_display};
use crate::status::{DownloadStatus, ModStatus};
use exn::ResultExt;
use serde_json::{Map, Number, Value};
use std::path::PathBuf;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

impl AssetRecord {
    /// Builds a record from a flat field dictionary.
    ///
    /// `key` is the dictionary's key in the snapshot log and becomes the
    /// record's `id` unless the dictionary carries its own `id` field.
    /// Unrecognized keys and malformed values are logged at `warn` level and
    /// otherwise ignored, leaving the field at its unset sentinel.
    pub fn from_fields(key: &str, fields: &Map<String, Value>) -> Self {
        let mut record = AssetRecord::new(key);
        for (name, value) in fields {
            if let Err(err) = record.apply_field(name, value) {
                tracing::warn!(id = key, field = %name, error = %err, "Dropping malformed snapshot field");
            }
        }
        record
    }

    /// Sets a single field from its JSON value. Unknown field names are
    /// logged and ignored; only malformed values for known fields error.
    fn apply_field(&mut self, name: &str, value: &Value) -> Result<()> {
        match name {
            "id" => {
                if let Some(id) = optional_string("id", value)?
                    && !id.is_empty()
                {
                    self.id = id;
                }
            },
            "image_name" => self.image_name = optional_string("image_name", value)?,
            "author" => self.author = optional_string("author", value)?,
            "description" => self.description = optional_string("description", value)?,
            "resolution" => self.resolution = optional_string("resolution", value)?,
            "image_date" => self.image_date = optional_string("image_date", value)?,
            "filename" => self.filename = optional_string("filename", value)?,
            "file_size" => self.file_size = file_size(value)?,
            "locations" => {
                self.locations.clear();
                for location in string_list("locations", value)? {
                    self.add_location(PathBuf::from(location));
                }
            },
            "page_url" => self.page_url = optional_string("page_url", value)?,
            "image_url" => self.image_url = optional_string("image_url", value)?,
            "dl_status" => {
                self.dl_status = match optional_string("dl_status", value)? {
                    Some(s) => s.parse::<DownloadStatus>()?,
                    None => DownloadStatus::NotSet,
                }
            },
            "mod_status" => {
                self.mod_status = match optional_string("mod_status", value)? {
                    Some(s) => s.parse::<ModStatus>()?,
                    None => ModStatus::NotSet,
                }
            },
            "downloaded_on" => self.downloaded_on = timestamp(value)?,
            "download_duration" => self.download_duration = duration(value)?,
            "error_info" => self.error_info = optional_string("error_info", value)?,
            "classification_metadata" | "classification" => {
                for tag in string_list("classification_metadata", value)? {
                    self.add_classification(tag);
                }
            },
            _ => tracing::warn!(id = %self.id, field = name, "Ignoring unrecognized snapshot field"),
        }
        Ok(())
    }

    /// The inverse of [`from_fields`](Self::from_fields): every field, with
    /// unset optional values written as `null`.
    pub fn to_fields(&self) -> Map<String, Value> {
        fn opt(value: &Option<String>) -> Value {
            value.clone().map(Value::String).unwrap_or(Value::Null)
        }
        let mut map = Map::new();
        map.insert("id".into(), Value::String(self.id.clone()));
        map.insert("image_name".into(), opt(&self.image_name));
        map.insert("author".into(), opt(&self.author));
        map.insert("description".into(), opt(&self.description));
        map.insert("resolution".into(), opt(&self.resolution));
        map.insert("image_date".into(), opt(&self.image_date));
        map.insert("filename".into(), opt(&self.filename));
        map.insert("file_size".into(), opt(&self.file_size));
        map.insert(
            "locations".into(),
            Value::Array(self.locations.iter().map(|l| Value::String(l.to_string_lossy().into_owned())).collect()),
        );
        map.insert("page_url".into(), opt(&self.page_url));
        map.insert("image_url".into(), opt(&self.image_url));
        map.insert("dl_status".into(), Value::String(self.dl_status.as_str().to_string()));
        map.insert("mod_status".into(), Value::String(self.mod_status.as_str().to_string()));
        map.insert(
            "downloaded_on".into(),
            // Formatting an in-range OffsetDateTime as RFC 3339 only fails for
            // years outside 0..=9999; treat those as unset.
            self.downloaded_on.and_then(|d| d.format(&Rfc3339).ok()).map(Value::String).unwrap_or(Value::Null),
        );
        map.insert(
            "download_duration".into(),
            self.download_duration
                .and_then(|d| Number::from_f64(d.as_secs_f64()))
                .map(Value::Number)
                .unwrap_or(Value::Null),
        );
        map.insert("error_info".into(), opt(&self.error_info));
        map.insert(
            "classification_metadata".into(),
            Value::Array(self.classification_metadata.iter().cloned().map(Value::String).collect()),
        );
        map
    }
}

fn optional_string(field: &'static str, value: &Value) -> Result<Option<String>> {
    Ok(match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        // Resolutions and dates occasionally arrive as bare numbers.
        Value::Number(n) => Some(n.to_string()),
        _ => exn::bail!(ErrorKind::InvalidType { field, expected: "a string" }),
    })
}

fn string_list(field: &'static str, value: &Value) -> Result<Vec<String>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => {
            let mut list = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => list.push(s.clone()),
                    _ => exn::bail!(ErrorKind::InvalidType { field, expected: "a list of strings" }),
                }
            }
            Ok(list)
        },
        _ => exn::bail!(ErrorKind::InvalidType { field, expected: "a list of strings" }),
    }
}

fn file_size(value: &Value) -> Result<Option<String>> {
    Ok(match value {
        // A raw byte count from a very old log.
        Value::Number(n) => match n.as_u64() {
            Some(bytes) => Some(kb_display(bytes)),
            None => exn::bail!(ErrorKind::ParseError { field: "file_size", value: n.to_string() }),
        },
        other => optional_string("file_size", other)?,
    })
}

fn timestamp(value: &Value) -> Result<Option<OffsetDateTime>> {
    let Some(raw) = optional_string("downloaded_on", value)? else {
        return Ok(None);
    };
    if let Ok(parsed) = OffsetDateTime::parse(&raw, &Rfc3339) {
        return Ok(Some(parsed));
    }
    let legacy = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let parsed = PrimitiveDateTime::parse(&raw, legacy)
        .or_raise(|| ErrorKind::ParseError { field: "downloaded_on", value: raw.clone() })?;
    Ok(Some(parsed.assume_utc()))
}

fn duration(value: &Value) -> Result<Option<Duration>> {
    Ok(match value {
        Value::Null => None,
        Value::Number(n) => {
            let seconds = n.as_f64().unwrap_or(f64::NAN);
            Some(
                Duration::try_from_secs_f64(seconds)
                    .or_raise(|| ErrorKind::ParseError { field: "download_duration", value: n.to_string() })?,
            )
        },
        Value::String(s) => {
            let seconds = s
                .trim()
                .parse::<f64>()
                .or_raise(|| ErrorKind::ParseError { field: "download_duration", value: s.clone() })?;
            Some(
                Duration::try_from_secs_f64(seconds)
                    .or_raise(|| ErrorKind::ParseError { field: "download_duration", value: s.clone() })?,
            )
        },
        _ => exn::bail!(ErrorKind::InvalidType { field: "download_duration", expected: "a number of seconds" }),
    })
}
