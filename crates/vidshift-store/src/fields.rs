//! Flat string-field encoding of job records for hash storage.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use vidshift_models::{JobId, JobPatch, JobRecord, JobStatus, TransformOptions};

use crate::error::{StoreError, StoreResult};

pub const FIELD_ID: &str = "id";
pub const FIELD_FILENAME: &str = "filename";
pub const FIELD_OPTIONS: &str = "options";
pub const FIELD_STATUS: &str = "status";
pub const FIELD_PROGRESS: &str = "progress";
pub const FIELD_MESSAGE: &str = "message";
pub const FIELD_OUTPUT_FILENAME: &str = "output_filename";
pub const FIELD_ERROR: &str = "error";
pub const FIELD_CREATED_AT: &str = "created_at";
pub const FIELD_COMPLETED_AT: &str = "completed_at";

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Encode a full record. Unset optional fields are omitted.
pub fn record_fields(record: &JobRecord) -> StoreResult<Vec<(&'static str, String)>> {
    let mut fields = vec![
        (FIELD_ID, record.id.to_string()),
        (FIELD_FILENAME, record.filename.clone()),
        (FIELD_OPTIONS, serde_json::to_string(&record.options)?),
        (FIELD_STATUS, record.status.as_str().to_string()),
        (FIELD_PROGRESS, record.progress.to_string()),
        (FIELD_MESSAGE, record.message.clone()),
        (FIELD_CREATED_AT, timestamp(&record.created_at)),
    ];
    if let Some(ref output) = record.output_filename {
        fields.push((FIELD_OUTPUT_FILENAME, output.clone()));
    }
    if let Some(ref error) = record.error {
        fields.push((FIELD_ERROR, error.clone()));
    }
    if let Some(ref completed_at) = record.completed_at {
        fields.push((FIELD_COMPLETED_AT, timestamp(completed_at)));
    }
    Ok(fields)
}

/// Encode only the fields a patch sets.
pub fn patch_fields(patch: &JobPatch) -> Vec<(&'static str, String)> {
    let mut fields = Vec::new();
    if let Some(status) = patch.status {
        fields.push((FIELD_STATUS, status.as_str().to_string()));
    }
    if let Some(progress) = patch.progress {
        fields.push((FIELD_PROGRESS, progress.to_string()));
    }
    if let Some(ref message) = patch.message {
        fields.push((FIELD_MESSAGE, message.clone()));
    }
    if let Some(ref output) = patch.output_filename {
        fields.push((FIELD_OUTPUT_FILENAME, output.clone()));
    }
    if let Some(ref error) = patch.error {
        fields.push((FIELD_ERROR, error.clone()));
    }
    if let Some(ref completed_at) = patch.completed_at {
        fields.push((FIELD_COMPLETED_AT, timestamp(completed_at)));
    }
    fields
}

/// Decode a record from its hash fields.
pub fn parse_record(id: &JobId, mut map: HashMap<String, String>) -> StoreResult<JobRecord> {
    let mut take = |field: &str| map.remove(field);

    let filename = take(FIELD_FILENAME).ok_or_else(|| StoreError::corrupt(id, "missing filename"))?;

    let options: TransformOptions = match take(FIELD_OPTIONS) {
        Some(json) => serde_json::from_str(&json)?,
        None => TransformOptions::default(),
    };

    let status_raw = take(FIELD_STATUS).ok_or_else(|| StoreError::corrupt(id, "missing status"))?;
    let status =
        JobStatus::parse(&status_raw).ok_or_else(|| StoreError::corrupt(id, format!("unknown status {status_raw:?}")))?;

    let progress = match take(FIELD_PROGRESS) {
        Some(p) => p
            .parse::<u8>()
            .map_err(|_| StoreError::corrupt(id, format!("invalid progress {p:?}")))?
            .min(100),
        None => 0,
    };

    let created_at = match take(FIELD_CREATED_AT) {
        Some(ts) => parse_timestamp(id, &ts)?,
        None => return Err(StoreError::corrupt(id, "missing created_at")),
    };
    let completed_at = take(FIELD_COMPLETED_AT)
        .map(|ts| parse_timestamp(id, &ts))
        .transpose()?;

    Ok(JobRecord {
        id: id.clone(),
        filename,
        options,
        status,
        progress,
        message: take(FIELD_MESSAGE).unwrap_or_default(),
        output_filename: take(FIELD_OUTPUT_FILENAME),
        error: take(FIELD_ERROR),
        created_at,
        completed_at,
    })
}

fn parse_timestamp(id: &JobId, value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::corrupt(id, format!("invalid timestamp {value:?}: {e}")))
}

/// Flatten field pairs into alternating script arguments.
pub fn flatten(fields: &[(&'static str, String)]) -> Vec<String> {
    fields
        .iter()
        .flat_map(|(k, v)| [k.to_string(), v.clone()])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidshift_models::{FrameFilter, JobOutcome};

    fn to_map(fields: Vec<(&'static str, String)>) -> HashMap<String, String> {
        fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn test_record_survives_hash_encoding() {
        let options = TransformOptions {
            filter: FrameFilter::Sharpen,
            speed: 1.5,
            ..Default::default()
        };
        let mut record = JobRecord::new(JobId::new(), "holiday.mov", options);
        record.apply(&JobPatch::terminal(&JobOutcome::Completed {
            output_filename: "processed_x_holiday.mov".into(),
        }));

        let map = to_map(record_fields(&record).unwrap());
        assert!(map.contains_key(FIELD_COMPLETED_AT));
        assert!(!map.contains_key(FIELD_ERROR));

        let parsed = parse_record(&record.id, map).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_patch_fields_only_set() {
        let fields = patch_fields(&JobPatch::progress(45, "Starting frame processing..."));
        let keys: Vec<_> = fields.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![FIELD_PROGRESS, FIELD_MESSAGE]);
        assert_eq!(flatten(&fields).len(), 4);
    }

    #[test]
    fn test_corrupt_status() {
        let record = JobRecord::new(JobId::new(), "a.mp4", TransformOptions::default());
        let mut map = to_map(record_fields(&record).unwrap());
        map.insert(FIELD_STATUS.into(), "exploded".into());
        assert!(matches!(parse_record(&record.id, map), Err(StoreError::Corrupt { .. })));
    }
}
