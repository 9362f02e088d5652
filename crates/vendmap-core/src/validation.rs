//! Field rules for machine records.
//!
//! [`validate`] reports every violated rule in one pass, in a fixed order:
//! latitude, longitude, description, payment methods, category, status.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::machines::{Category, Coordinate, NewMachine, OperatingStatus, PaymentMethod};

pub const MAX_DESCRIPTION_CHARS: usize = 500;

pub const ERR_LATITUDE: &str = "Invalid latitude: must be between -90 and 90";
pub const ERR_LONGITUDE: &str = "Invalid longitude: must be between -180 and 180";
pub const ERR_DESCRIPTION_REQUIRED: &str = "Description is required";
pub const ERR_DESCRIPTION_TOO_LONG: &str = "Description must be 500 characters or less";
pub const ERR_PAYMENT_REQUIRED: &str = "At least one payment method is required";
pub const ERR_PAYMENT_INVALID: &str = "Invalid payment methods";
pub const ERR_CATEGORY: &str = "Invalid category";
pub const ERR_STATUS: &str = "Invalid operating status";

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

/// A machine as submitted by a client, before any rule has been checked.
///
/// Enumerated fields arrive in their wire form and are only turned into
/// typed values by [`MachineDraft::into_new_machine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineDraft {
    pub latitude: f64,
    pub longitude: f64,
    pub description: String,
    pub category: String,
    pub status: String,
    pub payment_methods: Vec<String>,
}

impl From<NewMachine> for MachineDraft {
    fn from(machine: NewMachine) -> Self {
        Self {
            latitude: machine.coordinate.latitude,
            longitude: machine.coordinate.longitude,
            description: machine.description,
            category: machine.category.as_str().to_string(),
            status: machine.status.as_str().to_string(),
            payment_methods: machine
                .payment_methods
                .iter()
                .map(|m| m.as_str().to_string())
                .collect(),
        }
    }
}

/// Outcome of [`validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validation {
    pub errors: Vec<String>,
}

impl Validation {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A draft broke at least one rule. Carries every violation, in rule order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation failed: {}", .errors.join("; "))]
pub struct ValidationError {
    pub errors: Vec<String>,
}

#[must_use]
pub fn validate_latitude(latitude: f64) -> bool {
    latitude.is_finite() && (-90.0..=90.0).contains(&latitude)
}

#[must_use]
pub fn validate_longitude(longitude: f64) -> bool {
    longitude.is_finite() && (-180.0..=180.0).contains(&longitude)
}

#[must_use]
pub fn validate_description(description: &str) -> bool {
    let trimmed = description.trim();
    !trimmed.is_empty() && trimmed.chars().count() <= MAX_DESCRIPTION_CHARS
}

/// Parse payment methods, rejecting empty lists, duplicates and unknown values.
#[must_use]
pub fn parse_payment_methods(raw: &[String]) -> Option<Vec<PaymentMethod>> {
    if raw.is_empty() {
        return None;
    }
    let mut seen = HashSet::new();
    let mut methods = Vec::with_capacity(raw.len());
    for value in raw {
        let method = value.parse::<PaymentMethod>().ok()?;
        if !seen.insert(method) {
            return None;
        }
        methods.push(method);
    }
    Some(methods)
}

/// Check every rule and collect all violations.
#[must_use]
pub fn validate(draft: &MachineDraft) -> Validation {
    check(draft).0
}

fn check(draft: &MachineDraft) -> (Validation, Option<NewMachine>) {
    let mut errors = Vec::new();

    if !validate_latitude(draft.latitude) {
        errors.push(ERR_LATITUDE.to_string());
    }
    if !validate_longitude(draft.longitude) {
        errors.push(ERR_LONGITUDE.to_string());
    }

    let description = draft.description.trim();
    if description.is_empty() {
        errors.push(ERR_DESCRIPTION_REQUIRED.to_string());
    } else if description.chars().count() > MAX_DESCRIPTION_CHARS {
        errors.push(ERR_DESCRIPTION_TOO_LONG.to_string());
    }

    let payment_methods = if draft.payment_methods.is_empty() {
        errors.push(ERR_PAYMENT_REQUIRED.to_string());
        None
    } else {
        let parsed = parse_payment_methods(&draft.payment_methods);
        if parsed.is_none() {
            errors.push(ERR_PAYMENT_INVALID.to_string());
        }
        parsed
    };

    let category = draft.category.parse::<Category>().ok();
    if category.is_none() {
        errors.push(ERR_CATEGORY.to_string());
    }

    let status = draft.status.parse::<OperatingStatus>().ok();
    if status.is_none() {
        errors.push(ERR_STATUS.to_string());
    }

    let machine = match (payment_methods, category, status) {
        (Some(payment_methods), Some(category), Some(status)) if errors.is_empty() => {
            Some(NewMachine {
                coordinate: Coordinate::new(draft.latitude, draft.longitude),
                description: description.to_string(),
                category,
                status,
                payment_methods,
            })
        }
        _ => None,
    };

    (Validation { errors }, machine)
}

impl MachineDraft {
    /// Sanitize the description, check every rule and produce the typed
    /// creation payload.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] with all violated rules when any check fails.
    pub fn into_new_machine(self) -> Result<NewMachine, ValidationError> {
        let draft = MachineDraft {
            description: sanitize_input(&self.description),
            ..self
        };
        match check(&draft) {
            (_, Some(machine)) => Ok(machine),
            (validation, None) => Err(ValidationError {
                errors: validation.errors,
            }),
        }
    }
}

/// Strip markup from free text: trims, drops `<...>` tags, then any stray
/// angle brackets. Ampersands are kept.
#[must_use]
pub fn sanitize_input(input: &str) -> String {
    let without_tags = HTML_TAG.replace_all(input.trim(), "");
    without_tags
        .chars()
        .filter(|c| *c != '<' && *c != '>')
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
#[path = "validation_test.rs"]
mod tests;
