mod repository;

pub use repository::*;

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex_lite::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use validator::{Validate, ValidationError};

/// Length of both NIN and BVN.
pub const IDENTIFIER_LENGTH: usize = 11;

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9]{7,15}$").unwrap());

/// Customer as submitted on onboarding and saved on database.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct User {
    /// Generated by the database, never read from a request.
    #[serde(default, skip_deserializing)]
    pub id: i64,
    #[validate(
        length(min = 1, max = 100, message = "First name must be 1 to 100 characters long."),
        custom(function = "validate_not_blank", message = "First name is required."),
        custom(function = "validate_no_nul", message = "Must not contain NUL characters.")
    )]
    pub firstname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(
        length(max = 100, message = "Middle name must be at most 100 characters long."),
        custom(function = "validate_no_nul", message = "Must not contain NUL characters.")
    )]
    pub middlename: Option<String>,
    #[validate(
        length(min = 1, max = 100, message = "Last name must be 1 to 100 characters long."),
        custom(function = "validate_not_blank", message = "Last name is required."),
        custom(function = "validate_no_nul", message = "Must not contain NUL characters.")
    )]
    pub lastname: String,
    #[validate(
        email(message = "Email must be formatted."),
        length(max = 254, message = "Email must be at most 254 characters long."),
        custom(function = "validate_no_nul", message = "Must not contain NUL characters.")
    )]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(
        length(max = 255, message = "Address must be at most 255 characters long."),
        custom(function = "validate_no_nul", message = "Must not contain NUL characters.")
    )]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(
        length(max = 255, message = "City must be at most 255 characters long."),
        custom(function = "validate_no_nul", message = "Must not contain NUL characters.")
    )]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(
        length(max = 255, message = "State must be at most 255 characters long."),
        custom(function = "validate_no_nul", message = "Must not contain NUL characters.")
    )]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(
        length(max = 16, message = "Postal code must be at most 16 characters long."),
        custom(function = "validate_no_nul", message = "Must not contain NUL characters.")
    )]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(
        length(max = 64, message = "Country must be at most 64 characters long."),
        custom(function = "validate_no_nul", message = "Must not contain NUL characters.")
    )]
    pub country: Option<String>,
    /// `YYYY-MM-DD`, or a RFC 3339 timestamp whose date part is kept.
    #[serde(
        default,
        deserialize_with = "deserialize_birth_date",
        skip_serializing_if = "Option::is_none"
    )]
    #[validate(custom(
        function = "validate_birth_date",
        message = "Date of birth cannot be in the future."
    ))]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(
        function = "validate_phone_number",
        message = "Phone number must be 7 to 15 digits, optionally prefixed by '+'."
    ))]
    pub phone_number: Option<String>,
    #[validate(custom(function = "validate_identifier", message = "NIN must be 11 digits."))]
    pub nin: String,
    #[validate(custom(function = "validate_identifier", message = "BVN must be 11 digits."))]
    pub bvn: String,
    #[validate(
        length(min = 1, max = 32, message = "Account type must be 1 to 32 characters long."),
        custom(function = "validate_not_blank", message = "Account type is required."),
        custom(function = "validate_no_nul", message = "Must not contain NUL characters.")
    )]
    pub account_type: String,
}

/// Reject strings made only of whitespace.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }

    Ok(())
}

/// NIN and BVN are fixed-length numeric identifiers.
pub fn validate_identifier(value: &str) -> Result<(), ValidationError> {
    if value.len() != IDENTIFIER_LENGTH || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValidationError::new("identifier"));
    }

    Ok(())
}

/// PostgreSQL text columns cannot hold `\0`.
pub fn validate_no_nul(value: &str) -> Result<(), ValidationError> {
    if value.contains('\0') {
        return Err(ValidationError::new("nul"));
    }

    Ok(())
}

pub fn validate_phone_number(value: &str) -> Result<(), ValidationError> {
    if !PHONE_RE.is_match(value) {
        return Err(ValidationError::new("phone_number"));
    }

    Ok(())
}

pub fn validate_birth_date(date: &NaiveDate) -> Result<(), ValidationError> {
    if *date > Utc::now().date_naive() {
        return Err(ValidationError::new("date_of_birth"));
    }

    Ok(())
}

fn deserialize_birth_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };

    if let Ok(date) = NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
        return Ok(Some(date));
    }

    DateTime::parse_from_rfc3339(&raw)
        .map(|timestamp| Some(timestamp.date_naive()))
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn ada() -> User {
        User {
            firstname: "Ada".into(),
            lastname: "Lovelace".into(),
            email: "ada@example.com".into(),
            nin: "12345678901".into(),
            bvn: "22345678901".into(),
            account_type: "savings".into(),
            ..Default::default()
        }
    }

    fn failing_fields(user: &User) -> Vec<String> {
        let mut fields = match user.validate() {
            Ok(()) => Vec::new(),
            Err(errors) => errors
                .field_errors()
                .keys()
                .map(|field| field.to_string())
                .collect(),
        };
        fields.sort();
        fields
    }

    #[test]
    fn test_minimal_user_is_valid() {
        assert!(ada().validate().is_ok());
    }

    #[test]
    fn test_complete_user_is_valid() {
        let user = User {
            middlename: Some("King".into()),
            address: Some("12 St James's Square".into()),
            city: Some("London".into()),
            state: Some("Greater London".into()),
            postal_code: Some("SW1Y 4JH".into()),
            country: Some("GB".into()),
            date_of_birth: NaiveDate::from_ymd_opt(1815, 12, 10),
            phone_number: Some("+2348012345678".into()),
            ..ada()
        };

        assert!(user.validate().is_ok());
    }

    #[test]
    fn test_required_fields() {
        let user = User {
            firstname: String::default(),
            lastname: "   ".into(),
            email: String::default(),
            nin: String::default(),
            bvn: String::default(),
            account_type: String::default(),
            ..Default::default()
        };

        assert_eq!(
            failing_fields(&user),
            ["account_type", "bvn", "email", "firstname", "lastname", "nin"]
        );
    }

    #[test]
    fn test_identifiers_must_be_eleven_digits() {
        for nin in ["1234567890", "123456789012", "1234567890a", "+2345678901"] {
            let user = User {
                nin: nin.into(),
                ..ada()
            };
            assert_eq!(failing_fields(&user), ["nin"], "{nin}");
        }

        let user = User {
            bvn: "2234567890 ".into(),
            ..ada()
        };
        assert_eq!(failing_fields(&user), ["bvn"]);
    }

    #[test]
    fn test_email_format() {
        let user = User {
            email: "ada.example.com".into(),
            ..ada()
        };
        assert_eq!(failing_fields(&user), ["email"]);
    }

    #[test]
    fn test_optional_fields_format() {
        let user = User {
            phone_number: Some("080-1234".into()),
            date_of_birth: Some(Utc::now().date_naive() + chrono::Days::new(1)),
            postal_code: Some("x".repeat(17)),
            ..ada()
        };

        assert_eq!(
            failing_fields(&user),
            ["date_of_birth", "phone_number", "postal_code"]
        );
    }

    #[test]
    fn test_nul_is_rejected() {
        let user = User {
            firstname: "Ada\0".into(),
            city: Some("Lon\0don".into()),
            account_type: "\0".into(),
            ..ada()
        };

        assert_eq!(failing_fields(&user), ["account_type", "city", "firstname"]);
    }

    #[test]
    fn test_birth_date_formats() {
        let parse = |date: &str| {
            serde_json::from_value::<User>(serde_json::json!({
                "firstname": "Ada",
                "lastname": "Lovelace",
                "email": "ada@example.com",
                "nin": "12345678901",
                "bvn": "22345678901",
                "account_type": "savings",
                "date_of_birth": date,
            }))
            .map(|user| user.date_of_birth)
        };
        let birth = NaiveDate::from_ymd_opt(1815, 12, 10);

        assert_eq!(parse("1815-12-10").unwrap(), birth);
        assert_eq!(parse("1815-12-10T00:00:00Z").unwrap(), birth);
        assert_eq!(parse("1815-12-10T23:30:00+01:00").unwrap(), birth);
        assert!(parse("10/12/1815").is_err());

        let user = User {
            date_of_birth: birth,
            ..ada()
        };
        assert_eq!(
            serde_json::to_value(&user).unwrap()["date_of_birth"],
            "1815-12-10"
        );
    }

    #[test]
    fn test_deserialize_ignores_id() {
        let user: User = serde_json::from_str(
            r#"{"id":42,"firstname":"Ada","lastname":"Lovelace","email":"ada@example.com",
                "nin":"12345678901","bvn":"22345678901","account_type":"savings",
                "date_of_birth":"1815-12-10"}"#,
        )
        .unwrap();

        assert_eq!(user.id, 0);
        assert_eq!(user.date_of_birth, NaiveDate::from_ymd_opt(1815, 12, 10));
        assert!(user.middlename.is_none());
    }
}
