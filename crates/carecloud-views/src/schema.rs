//! Resident form validation.
//!
//! Turns the raw values captured by the resident form into a
//! [`NewResident`] payload, or the per-field messages the form shows.

use std::sync::LazyLock;

use carecloud_core::models::{NewResident, ResidentPatch};
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const FULL_NAME_REQUIRED: &str = "Full name is required!";
pub const INVALID_EMAIL: &str = "Invalid email address!";
pub const PHONE_REQUIRED: &str = "Phone is required!";
pub const ADDRESS_REQUIRED: &str = "Address is required!";
pub const DATE_OF_BIRTH_REQUIRED: &str = "Date of birth is required!";
pub const PCP_REQUIRED: &str = "Primary Care Physician is required!";

/// Date format of the date input.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Values as captured by the resident form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResidentFormInput {
    pub full_name: String,
    pub email: Option<String>,
    pub phone: String,
    pub address: String,
    pub date_of_birth: String,
    pub pcp: String,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_number: Option<String>,
    pub emergency_contact_relationship: Option<String>,
    pub dnc_consent: Option<bool>,
    pub health_conditions: Option<String>,
}

/// A validation failure on one field.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{field}: {message}")]
pub struct FieldError {
    /// Form field name
    pub field: &'static str,
    pub message: &'static str,
}

/// Validate form input into a creation payload.
///
/// All failing fields are reported together, in form order.
pub fn validate_resident(input: &ResidentFormInput) -> Result<NewResident, Vec<FieldError>> {
    let mut errors = Vec::new();

    let full_name = required(&input.full_name, "fullName", FULL_NAME_REQUIRED, &mut errors);
    let email = optional(&input.email);
    if let Some(email) = &email {
        if !is_email(email) {
            errors.push(FieldError {
                field: "email",
                message: INVALID_EMAIL,
            });
        }
    }
    let phone = required(&input.phone, "phone", PHONE_REQUIRED, &mut errors);
    let address = required(&input.address, "address", ADDRESS_REQUIRED, &mut errors);
    let date_of_birth = match NaiveDate::parse_from_str(input.date_of_birth.trim(), DATE_FORMAT) {
        Ok(date) => Some(date),
        Err(_) => {
            errors.push(FieldError {
                field: "dateOfBirth",
                message: DATE_OF_BIRTH_REQUIRED,
            });
            None
        }
    };
    let pcp = required(&input.pcp, "pcp", PCP_REQUIRED, &mut errors);

    match (full_name, phone, address, date_of_birth, pcp) {
        (Some(full_name), Some(phone), Some(address), Some(date_of_birth), Some(pcp))
            if errors.is_empty() =>
        {
            let mut resident = NewResident::new(full_name, phone, address, date_of_birth, pcp);
            resident.email = email;
            resident.emergency_contact_name = optional(&input.emergency_contact_name);
            resident.emergency_contact_number = optional(&input.emergency_contact_number);
            resident.emergency_contact_relationship =
                optional(&input.emergency_contact_relationship);
            resident.dnc_consent = input.dnc_consent;
            resident.health_conditions = optional(&input.health_conditions);
            Ok(resident)
        }
        _ => Err(errors),
    }
}

/// Validate form input for an update.
///
/// The update form carries every field, so the same rules apply. The result
/// writes every captured field; blank optional fields are left untouched.
pub fn validate_resident_update(
    input: &ResidentFormInput,
) -> Result<ResidentPatch, Vec<FieldError>> {
    let resident = validate_resident(input)?;
    Ok(ResidentPatch {
        full_name: Some(resident.full_name),
        phone: Some(resident.phone),
        address: Some(resident.address),
        date_of_birth: Some(resident.date_of_birth),
        pcp: Some(resident.pcp),
        photo: None,
        email: resident.email,
        emergency_contact_name: resident.emergency_contact_name,
        emergency_contact_number: resident.emergency_contact_number,
        emergency_contact_relationship: resident.emergency_contact_relationship,
        dnc_consent: resident.dnc_consent,
        health_conditions: resident.health_conditions,
    })
}

fn required(
    value: &str,
    field: &'static str,
    message: &'static str,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        errors.push(FieldError { field, message });
        None
    } else {
        Some(value.to_string())
    }
}

// Blank optional inputs count as not given.
fn optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Same shape the dashboard's email inputs accept: dot-separated local
/// atoms, then a dotted domain ending in an alphabetic TLD of two or more.
#[allow(clippy::expect_used)] // good regex, it doesn't panic
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[A-Z0-9_'+\-]+(?:\.[A-Z0-9_'+\-]+)*@(?:[A-Z0-9][A-Z0-9\-]*\.)+[A-Z]{2,}$")
        .expect("static regex should not panic")
});

fn is_email(value: &str) -> bool {
    EMAIL_REGEX.is_match(value)
}
