//! Form schema model.
//!
//! A [`Form`] is built once when definitions are loaded and is immutable for
//! the lifetime of the process. Construction validates the invariants every
//! other component relies on: unique field names, no collision with the
//! control inputs the HTTP layer reserves, and patterns on string fields only.

mod access;
mod field;
mod target;
mod value;

use std::collections::HashSet;

use serde::Serialize;
use thiserror::Error;

pub use access::{AccessCodes, AccessPolicy, Credentials};
pub use field::{Field, FieldOption, FieldPattern, FieldType};
pub use target::{BrokerTarget, NotificationTarget, RetryPolicy, WebhookTarget};
pub use value::{DATE_FORMAT, FieldMap, FieldValue};

/// Form input carrying the anti-forgery token.
pub const XSRF_FIELD: &str = "_xsrf";
/// Form input carrying the submitter's IANA time zone.
pub const TIMEZONE_FIELD: &str = "__tz";
/// Form input carrying an access code.
pub const CODE_FIELD: &str = "accessCode";

const RESERVED_FIELDS: [&str; 3] = [XSRF_FIELD, TIMEZONE_FIELD, CODE_FIELD];

/// Default message template shown after a stored submission.
pub const DEFAULT_SUCCESS_MESSAGE: &str = "Thank you for the submission!";
/// Default message template shown when storage fails.
pub const DEFAULT_FAILURE_MESSAGE: &str = "Something went wrong: `{{ error }}`";

/// Reasons a form definition is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormValidationError {
    /// The form has no name.
    #[error("form name must not be empty")]
    EmptyName,
    /// The form has no storage table.
    #[error("form `{form}` must name a storage table")]
    EmptyTable {
        /// Offending form.
        form: String,
    },
    /// A field has no name.
    #[error("form `{form}` has a field without a name")]
    EmptyFieldName {
        /// Offending form.
        form: String,
    },
    /// Two fields share a name.
    #[error("form `{form}` declares field `{field}` more than once")]
    DuplicateField {
        /// Offending form.
        form: String,
        /// Repeated field name.
        field: String,
    },
    /// A field shadows a control input.
    #[error("form `{form}` field `{field}` uses a reserved input name")]
    ReservedField {
        /// Offending form.
        form: String,
        /// Reserved field name.
        field: String,
    },
    /// A pattern is declared on a non-string field.
    #[error("form `{form}` field `{field}` declares a pattern but is of type {kind}")]
    PatternOnNonString {
        /// Offending form.
        form: String,
        /// Field carrying the pattern.
        field: String,
        /// Declared type.
        kind: &'static str,
    },
}

/// Unvalidated form components.
#[derive(Debug, Clone)]
pub struct FormParts {
    /// Unique form name, used in URLs.
    pub name: String,
    /// Display title; the name when empty.
    pub title: String,
    /// Markdown description.
    pub description: String,
    /// Storage table or collection.
    pub table: String,
    /// Input fields in display order.
    pub fields: Vec<Field>,
    /// Admission policy.
    pub policy: Option<AccessPolicy>,
    /// Access-code gate.
    pub codes: AccessCodes,
    /// Notification sinks.
    pub targets: Vec<NotificationTarget>,
    /// Success message template.
    pub success_message: String,
    /// Failure message template.
    pub failure_message: String,
}

impl FormParts {
    /// Parts for a form named `name` storing into a table of the same name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            title: String::new(),
            description: String::new(),
            table: name.clone(),
            name,
            fields: Vec::new(),
            policy: None,
            codes: AccessCodes::default(),
            targets: Vec::new(),
            success_message: DEFAULT_SUCCESS_MESSAGE.to_owned(),
            failure_message: DEFAULT_FAILURE_MESSAGE.to_owned(),
        }
    }
}

/// Form fields exposed to templates as `form`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FormSummary<'a> {
    /// Form name.
    pub name: &'a str,
    /// Display title.
    pub title: &'a str,
    /// Markdown description.
    pub description: &'a str,
    /// Storage table.
    pub table: &'a str,
}

/// Validated, immutable form definition.
///
/// # Examples
/// ```
/// use web_form::domain::form::{Field, FieldType, Form, FormParts};
///
/// let mut parts = FormParts::new("signup");
/// parts.fields = vec![
///     Field::new("name", FieldType::String).required(),
///     Field::new("year", FieldType::Integer).required(),
/// ];
/// let form = Form::try_new(parts).expect("valid form");
/// assert_eq!(form.table(), "signup");
/// assert_eq!(form.title(), "signup");
/// ```
#[derive(Debug, Clone)]
pub struct Form {
    name: String,
    title: String,
    description: String,
    table: String,
    fields: Vec<Field>,
    policy: Option<AccessPolicy>,
    codes: AccessCodes,
    targets: Vec<NotificationTarget>,
    success_message: String,
    failure_message: String,
}

impl Form {
    /// Validate `parts` and build the form.
    pub fn try_new(parts: FormParts) -> Result<Self, FormValidationError> {
        let FormParts {
            name,
            title,
            description,
            table,
            fields,
            policy,
            codes,
            targets,
            success_message,
            failure_message,
        } = parts;

        if name.trim().is_empty() {
            return Err(FormValidationError::EmptyName);
        }
        if table.trim().is_empty() {
            return Err(FormValidationError::EmptyTable { form: name });
        }
        validate_fields(&name, &fields)?;

        Ok(Self {
            title: if title.trim().is_empty() {
                name.clone()
            } else {
                title
            },
            name,
            description,
            table,
            fields,
            policy,
            codes,
            targets,
            success_message,
            failure_message,
        })
    }

    /// Unique form name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Markdown description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Storage table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Fields in display order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Admission policy, if any.
    pub fn policy(&self) -> Option<&AccessPolicy> {
        self.policy.as_ref()
    }

    /// Access-code gate.
    pub fn codes(&self) -> &AccessCodes {
        &self.codes
    }

    /// Notification sinks.
    pub fn targets(&self) -> &[NotificationTarget] {
        &self.targets
    }

    /// Success message template.
    pub fn success_message(&self) -> &str {
        &self.success_message
    }

    /// Failure message template.
    pub fn failure_message(&self) -> &str {
        &self.failure_message
    }

    /// Template-facing summary of the form.
    pub fn summary(&self) -> FormSummary<'_> {
        FormSummary {
            name: &self.name,
            title: &self.title,
            description: &self.description,
            table: &self.table,
        }
    }

    /// Whether the caller passes the admission policy.
    ///
    /// Forms without a policy admit everyone.
    pub fn is_allowed(&self, credentials: Option<&Credentials>) -> bool {
        self.policy
            .as_ref()
            .is_none_or(|policy| policy.is_allowed(credentials))
    }

    /// Every template the form renders, for eager compilation.
    pub fn templates(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter_map(|field| field.default.as_deref())
            .chain([self.success_message.as_str(), self.failure_message.as_str()])
            .chain(self.targets.iter().flat_map(NotificationTarget::templates))
    }
}

fn validate_fields(form: &str, fields: &[Field]) -> Result<(), FormValidationError> {
    let mut seen = HashSet::with_capacity(fields.len());
    for field in fields {
        if field.name.is_empty() {
            return Err(FormValidationError::EmptyFieldName {
                form: form.to_owned(),
            });
        }
        if RESERVED_FIELDS.contains(&field.name.as_str()) {
            return Err(FormValidationError::ReservedField {
                form: form.to_owned(),
                field: field.name.clone(),
            });
        }
        if !seen.insert(field.name.as_str()) {
            return Err(FormValidationError::DuplicateField {
                form: form.to_owned(),
                field: field.name.clone(),
            });
        }
        if field.pattern.is_some() && field.kind != FieldType::String {
            return Err(FormValidationError::PatternOnNonString {
                form: form.to_owned(),
                field: field.name.clone(),
                kind: field.kind.as_str(),
            });
        }
    }
    Ok(())
}
