//! Contact-form submissions: the raw inbound shape and its validated form.
//!
//! [`RawSubmission`] is what the HTTP layer hands over. A [`Submission`] can
//! only be obtained through [`Submission::parse`], so anything holding one has
//! passed every field rule.

use serde::Deserialize;
use serde_json::Value;

use super::email;
use super::error::{FieldError, ValidationErrors};
use super::escape::{escape_html, trim_field};

/// One inbound field before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "Value")]
pub enum FieldValue {
    #[default]
    Missing,
    Text(String),
    /// Arrays and objects; never valid for a text field.
    Unsupported,
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Missing,
            Value::String(text) => Self::Text(text),
            Value::Bool(flag) => Self::Text(flag.to_string()),
            Value::Number(number) => Self::Text(number.to_string()),
            Value::Array(_) | Value::Object(_) => Self::Unsupported,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl FieldValue {
    fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Missing | Self::Unsupported => None,
        }
    }
}

/// Unvalidated request body. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RawSubmission {
    pub name: FieldValue,
    pub email: FieldValue,
    pub subject: FieldValue,
    pub message: FieldValue,
}

/// A submission whose text fields are trimmed and escaped and whose address
/// is canonical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    name: String,
    email: String,
    subject: String,
    message: String,
}

impl Submission {
    /// Check all four fields independently and collect every failure.
    pub fn parse(raw: RawSubmission) -> Result<Self, ValidationErrors> {
        let mut errors = Vec::new();

        let name = text_field("name", &raw.name, &mut errors);
        let email = email_field(&raw.email, &mut errors);
        let subject = text_field("subject", &raw.subject, &mut errors);
        let message = text_field("message", &raw.message, &mut errors);

        if let Some(errors) = ValidationErrors::from_vec(errors) {
            return Err(errors);
        }

        Ok(Self {
            name: name.unwrap_or_default(),
            email: email.unwrap_or_default(),
            subject: subject.unwrap_or_default(),
            message: message.unwrap_or_default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

fn text_field(
    path: &'static str,
    value: &FieldValue,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    let Some(text) = value.as_text() else {
        errors.push(FieldError::invalid(path, None));
        return None;
    };

    let trimmed = trim_field(text);
    if trimmed.is_empty() {
        errors.push(FieldError::invalid(path, Some(trimmed.to_string())));
        return None;
    }

    Some(escape_html(trimmed))
}

fn email_field(value: &FieldValue, errors: &mut Vec<FieldError>) -> Option<String> {
    let Some(text) = value.as_text() else {
        errors.push(FieldError::invalid("email", None));
        return None;
    };

    let canonical = email::parse_address(text).and_then(|address| email::normalize(&address));
    if canonical.is_none() {
        errors.push(FieldError::invalid("email", Some(text.to_string())));
    }
    canonical
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str, email: &str, subject: &str, message: &str) -> RawSubmission {
        RawSubmission {
            name: name.into(),
            email: email.into(),
            subject: subject.into(),
            message: message.into(),
        }
    }

    #[test]
    fn valid_submission_is_trimmed_escaped_and_normalised() {
        let submission = Submission::parse(raw(
            "  Ana <b>  ",
            "Ana@Example.com",
            " Hi & bye ",
            "\tHello\n",
        ))
        .expect("valid submission");

        assert_eq!(submission.name(), "Ana &lt;b&gt;");
        assert_eq!(submission.email(), "ana@example.com");
        assert_eq!(submission.subject(), "Hi &amp; bye");
        assert_eq!(submission.message(), "Hello");
    }

    #[test]
    fn empty_name_is_reported_alone() {
        let errors = Submission::parse(raw("", "ana@example.com", "Hi", "Hello"))
            .expect_err("empty name must fail");

        assert_eq!(errors.paths(), vec!["name"]);
        assert_eq!(errors.errors()[0].value.as_deref(), Some(""));
    }

    #[test]
    fn whitespace_only_fields_fail() {
        let errors = Submission::parse(raw("ana", "ana@example.com", "   ", "\n\t"))
            .expect_err("blank fields must fail");
        assert_eq!(errors.paths(), vec!["subject", "message"]);
    }

    #[test]
    fn all_failures_are_collected_in_field_order() {
        let errors = Submission::parse(RawSubmission::default()).expect_err("empty body");
        assert_eq!(errors.paths(), vec!["name", "email", "subject", "message"]);
        assert!(errors.errors().iter().all(|error| error.value.is_none()));
    }

    #[test]
    fn invalid_email_keeps_raw_value() {
        let errors = Submission::parse(raw("Ana", "not-an-email", "Hi", "Hello"))
            .expect_err("bad email");
        assert_eq!(errors.paths(), vec!["email"]);
        assert_eq!(errors.errors()[0].value.as_deref(), Some("not-an-email"));
    }

    #[test]
    fn json_scalars_are_coerced_and_containers_rejected() {
        let raw: RawSubmission = serde_json::from_value(serde_json::json!({
            "name": 42,
            "email": "ana@example.com",
            "subject": true,
            "message": ["Hello"],
            "extra": "ignored",
        }))
        .expect("deserializes");

        assert_eq!(raw.name, FieldValue::Text("42".to_string()));
        assert_eq!(raw.subject, FieldValue::Text("true".to_string()));
        assert_eq!(raw.message, FieldValue::Unsupported);

        let errors = Submission::parse(raw).expect_err("array message");
        assert_eq!(errors.paths(), vec!["message"]);
    }

    #[test]
    fn null_is_treated_as_missing() {
        let raw: RawSubmission = serde_json::from_value(serde_json::json!({
            "name": null,
            "email": "ana@example.com",
            "subject": "Hi",
            "message": "Hello",
        }))
        .expect("deserializes");
        assert_eq!(raw.name, FieldValue::Missing);
    }
}
