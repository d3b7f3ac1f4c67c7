use lazy_static::lazy_static;
use regex::Regex;
use time::{macros::format_description, Date};

use crate::error::{AppError, FieldError};
use crate::repairs::dto::CreateRepairRequest;

pub const MAX_PRICE: f64 = 10_000.0;
pub const MAX_COMMENT_LEN: usize = 500;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// French mobile numbers: `06`/`07` followed by 8 digits, or the same with
/// a `+33` / `0033` country prefix.
pub(crate) fn is_valid_mobile(phone: &str) -> bool {
    lazy_static! {
        static ref MOBILE_RE: Regex = Regex::new(r"^(\+33|0033|0)[67]\d{8}$").unwrap();
    }
    MOBILE_RE.is_match(phone)
}

pub(crate) fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(|c| !c.is_whitespace()).collect()
}

fn is_iso_date(s: &str) -> bool {
    Date::parse(s, format_description!("[year]-[month]-[day]")).is_ok()
}

/// A create request that passed validation, trimmed and normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRepair {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub serial_number: String,
    pub fault: String,
    pub price: f64,
    pub return_date: String,
    pub responsible_initials: String,
}

fn min_len(errors: &mut Vec<FieldError>, field: &'static str, value: &str, min: usize) {
    if value.chars().count() < min {
        errors.push(FieldError::new(
            field,
            format!("must contain at least {min} characters"),
        ));
    }
}

pub fn validate_new_repair(req: CreateRepairRequest) -> Result<NewRepair, AppError> {
    let repair = NewRepair {
        first_name: req.first_name.trim().to_string(),
        last_name: req.last_name.trim().to_string(),
        email: req.email.trim().to_lowercase(),
        phone: normalize_phone(&req.phone),
        serial_number: req.serial_number.trim().to_string(),
        fault: req.fault.trim().to_string(),
        price: req.price.unwrap_or(f64::NAN),
        return_date: req.return_date.trim().to_string(),
        responsible_initials: req.responsible_initials.trim().to_string(),
    };

    let mut errors = Vec::new();
    min_len(&mut errors, "firstName", &repair.first_name, 2);
    min_len(&mut errors, "lastName", &repair.last_name, 2);
    if !is_valid_email(&repair.email) {
        errors.push(FieldError::new("email", "invalid email"));
    }
    if !is_valid_mobile(&repair.phone) {
        errors.push(FieldError::new("phone", "invalid mobile phone number"));
    }
    min_len(&mut errors, "serialNumber", &repair.serial_number, 3);
    min_len(&mut errors, "fault", &repair.fault, 5);
    if !(0.0..=MAX_PRICE).contains(&repair.price) {
        errors.push(FieldError::new(
            "price",
            format!("must be between 0 and {MAX_PRICE}"),
        ));
    }
    if !is_iso_date(&repair.return_date) {
        errors.push(FieldError::new("returnDate", "expected YYYY-MM-DD"));
    }
    min_len(&mut errors, "responsibleInitials", &repair.responsible_initials, 1);

    if errors.is_empty() {
        Ok(repair)
    } else {
        Err(AppError::Validation(errors))
    }
}

pub fn validate_comment(comment: Option<String>) -> Result<Option<String>, AppError> {
    match comment.map(|c| c.trim().to_string()) {
        Some(c) if c.chars().count() > MAX_COMMENT_LEN => Err(AppError::validation(
            "finalComment",
            format!("must be at most {MAX_COMMENT_LEN} characters"),
        )),
        Some(c) if c.is_empty() => Ok(None),
        other => Ok(other),
    }
}
