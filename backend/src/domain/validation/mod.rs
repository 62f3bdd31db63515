//! Field validation and coercion.
//!
//! Every field is processed independently: one field's failure never stops
//! the others from being checked, so a response can report all problems at
//! once.

mod coerce;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::domain::form::{Field, FieldMap, FieldType, FieldValue, Form};
use crate::domain::ports::TemplateRenderer;

pub use coerce::{ClientTimezone, DATE_TIME_FORMAT};

/// Ordered multi-value request input.
///
/// # Examples
/// ```
/// use web_form::domain::validation::FormInput;
///
/// let input: FormInput = [("tag", "a"), ("tag", "b"), ("name", "Ann")]
///     .into_iter()
///     .collect();
/// assert_eq!(input.values("tag").collect::<Vec<_>>(), vec!["a", "b"]);
/// assert_eq!(input.first("name"), Some("Ann"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormInput(Vec<(String, String)>);

impl FormInput {
    /// Wrap decoded key/value pairs.
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        Self(pairs)
    }

    /// Every value submitted under `name`, in order.
    pub fn values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// First value submitted under `name`.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Whether no input was submitted.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormInput {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// Why a field was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldErrorKind {
    /// An empty value was supplied for a required field.
    #[error("value is required")]
    Required,
    /// A required field ended up without any value.
    #[error("at least one option should be selected")]
    NothingSelected,
    /// A value is not one of the declared options.
    #[error("selected option `{value}` is not allowed")]
    OptionNotAllowed {
        /// Submitted value.
        value: String,
    },
    /// A string value does not match the declared pattern.
    #[error("value does not match pattern `{pattern}`")]
    PatternMismatch {
        /// Pattern source.
        pattern: String,
    },
    /// A value could not be coerced into the declared type.
    #[error("`{value}` is not a valid {expected}: {reason}")]
    InvalidValue {
        /// Declared type name.
        expected: &'static str,
        /// Submitted value.
        value: String,
        /// Parser message.
        reason: String,
    },
    /// The default-value template failed to render.
    #[error("default value could not be computed: {message}")]
    DefaultValue {
        /// Renderer message.
        message: String,
    },
}

/// Validation failure of one field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {kind}")]
pub struct FieldError {
    /// Field name.
    pub field: String,
    /// Underlying cause.
    pub kind: FieldErrorKind,
}

impl FieldError {
    fn new(field: &Field, kind: FieldErrorKind) -> Self {
        Self {
            field: field.name.clone(),
            kind,
        }
    }
}

/// Renders default-value templates against the request context.
#[derive(Clone, Copy)]
pub struct FieldDefaults<'a> {
    renderer: &'a dyn TemplateRenderer,
    context: &'a Value,
}

impl<'a> FieldDefaults<'a> {
    /// Bind a renderer to the per-request template context.
    pub fn new(renderer: &'a dyn TemplateRenderer, context: &'a Value) -> Self {
        Self { renderer, context }
    }

    /// Rendered default of `field`, empty when none is declared.
    pub fn render(&self, field: &Field) -> Result<String, FieldErrorKind> {
        match field.default.as_deref() {
            None | Some("") => Ok(String::new()),
            Some(template) => self
                .renderer
                .render(template, self.context)
                .map_err(|error| FieldErrorKind::DefaultValue {
                    message: error.to_string(),
                }),
        }
    }
}

/// Validate `input` against every field of `form`.
///
/// Returns the typed values of all fields that passed together with one
/// [`FieldError`] per failing field. A non-empty error list rejects the whole
/// submission.
pub fn validate_fields(
    form: &Form,
    input: &FormInput,
    timezone: ClientTimezone,
    defaults: FieldDefaults<'_>,
) -> (FieldMap, Vec<FieldError>) {
    let mut values = FieldMap::new();
    let mut errors = Vec::new();
    for field in form.fields() {
        match validate_field(field, input, timezone, defaults) {
            Ok(Some(value)) => {
                values.insert(field.name.clone(), value);
            }
            Ok(None) => {}
            Err(kind) => errors.push(FieldError::new(field, kind)),
        }
    }
    (values, errors)
}

fn validate_field(
    field: &Field,
    input: &FormInput,
    timezone: ClientTimezone,
    defaults: FieldDefaults<'_>,
) -> Result<Option<FieldValue>, FieldErrorKind> {
    let mut raw = raw_values(field, input, defaults)?;

    if let Some(rejected) = raw.iter().find(|value| !field.accepts_option(value)) {
        return Err(FieldErrorKind::OptionNotAllowed {
            value: rejected.clone(),
        });
    }
    if raw.is_empty() && !field.multiple {
        raw.push(String::new());
    }

    let mut parsed = Vec::with_capacity(raw.len());
    for value in &raw {
        if let Some(value) = parse_value(field, value, timezone, defaults)? {
            parsed.push(value);
        }
    }

    if field.required && parsed.is_empty() {
        return Err(FieldErrorKind::NothingSelected);
    }

    if field.multiple {
        Ok(Some(FieldValue::Array(parsed)))
    } else {
        Ok(parsed.into_iter().next())
    }
}

/// Values to process for `field`: the rendered default for computed fields,
/// otherwise the deduplicated submitted values.
fn raw_values(
    field: &Field,
    input: &FormInput,
    defaults: FieldDefaults<'_>,
) -> Result<Vec<String>, FieldErrorKind> {
    if field.is_computed() {
        return defaults.render(field).map(|value| vec![value]);
    }
    let mut unique: Vec<String> = Vec::new();
    for value in input.values(&field.name) {
        if !unique.iter().any(|seen| seen == value) {
            unique.push(value.to_owned());
        }
    }
    Ok(unique)
}

fn parse_value(
    field: &Field,
    raw: &str,
    timezone: ClientTimezone,
    defaults: FieldDefaults<'_>,
) -> Result<Option<FieldValue>, FieldErrorKind> {
    let mut value = raw.trim().to_owned();
    if value.is_empty() && !field.is_computed() {
        value = defaults.render(field)?.trim().to_owned();
        if !value.is_empty() && !field.accepts_option(&value) {
            return Err(FieldErrorKind::OptionNotAllowed { value });
        }
    }
    if value.is_empty() {
        return if field.required {
            Err(FieldErrorKind::Required)
        } else {
            Ok(None)
        };
    }
    if field.kind == FieldType::String {
        if let Some(pattern) = &field.pattern {
            if !pattern.is_match(&value) {
                return Err(FieldErrorKind::PatternMismatch {
                    pattern: pattern.as_str().to_owned(),
                });
            }
        }
    }
    coerce::coerce(field.kind, &value, timezone)
        .map(Some)
        .map_err(|reason| FieldErrorKind::InvalidValue {
            expected: field.kind.as_str(),
            value,
            reason,
        })
}
