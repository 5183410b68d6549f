//! Common validation utilities.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use validator::ValidationError;

/// Maximum length of a subject identifier (prison number or case reference).
const MAX_SUBJECT_ID_LENGTH: usize = 20;

lazy_static! {
    static ref SUBJECT_ID_PATTERN: Regex = Regex::new(r"^[A-Za-z0-9]+$").unwrap();
    static ref SERVICE_NAME_PATTERN: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]*$").unwrap();
}

/// Validates that a string contains at least one non-whitespace character.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value must not be blank".into());
        Err(err)
    } else {
        Ok(())
    }
}

/// Validates a subject identifier: alphanumeric, no whitespace, bounded length.
pub fn validate_subject_identifier(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() || value.len() > MAX_SUBJECT_ID_LENGTH {
        let mut err = ValidationError::new("subject_id_length");
        err.message = Some(
            format!("Subject identifier must be 1 to {MAX_SUBJECT_ID_LENGTH} characters").into(),
        );
        return Err(err);
    }

    if !SUBJECT_ID_PATTERN.is_match(value) {
        let mut err = ValidationError::new("subject_id_format");
        err.message = Some("Subject identifier must be alphanumeric".into());
        return Err(err);
    }

    Ok(())
}

/// Validates an encoded service list: comma separated, at least one entry,
/// every entry a plain service name.
pub fn validate_services(value: &str) -> Result<(), ValidationError> {
    let names = split_services(value);

    if names.is_empty() {
        let mut err = ValidationError::new("services_empty");
        err.message = Some("At least one service must be requested".into());
        return Err(err);
    }

    if let Some(bad) = names.iter().find(|n| !SERVICE_NAME_PATTERN.is_match(n)) {
        let mut err = ValidationError::new("services_format");
        err.message = Some(format!("Invalid service name: {bad}").into());
        return Err(err);
    }

    Ok(())
}

/// Validates that an inclusive date range is not inverted.
pub fn validate_date_range(from: Option<NaiveDate>, to: NaiveDate) -> Result<(), ValidationError> {
    match from {
        Some(from) if from > to => {
            let mut err = ValidationError::new("date_range");
            err.message = Some("dateFrom must not be after dateTo".into());
            Err(err)
        }
        _ => Ok(()),
    }
}

/// Split an encoded service list into trimmed, non-empty, de-duplicated names,
/// keeping first-seen order.
pub fn split_services(value: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in value.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        if !names.iter().any(|existing| existing == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Re-encode a service list in its canonical comma-separated form.
pub fn normalize_services(value: &str) -> String {
    split_services(value).join(",")
}
