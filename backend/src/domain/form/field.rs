//! Field definitions.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Declared type a field's raw text is coerced into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldType {
    /// Text, the default.
    #[default]
    String,
    /// Signed 64-bit integer.
    Integer,
    /// Double precision float.
    Float,
    /// `1`, `t`, `true`, `0`, `f`, `false` in common casings.
    Boolean,
    /// `YYYY-MM-DD`.
    Date,
    /// `YYYY-MM-DDTHH:MM` in the submitter's time zone.
    DateTime,
}

impl FieldType {
    /// Name used in configuration files and error messages.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::DateTime => "date-time",
        }
    }
}

/// One entry of a closed choice set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOption {
    /// Text shown to the user.
    pub label: String,
    /// Submitted value; the label is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl FieldOption {
    /// Build an option whose value equals its label.
    pub fn labelled(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: None,
        }
    }

    /// Value compared against submitted text.
    pub fn effective_value(&self) -> &str {
        self.value.as_deref().unwrap_or(&self.label)
    }
}

/// Compiled validation pattern for string fields.
///
/// Matching is unanchored: the pattern only has to match somewhere in the
/// value. Anchor explicitly with `^...$` to require a full match.
#[derive(Debug, Clone)]
pub struct FieldPattern(Regex);

impl FieldPattern {
    /// Compile a pattern.
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        Regex::new(source).map(Self)
    }

    /// Whether `value` contains a match.
    pub fn is_match(&self, value: &str) -> bool {
        self.0.is_match(value)
    }

    /// Source text of the pattern.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for FieldPattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

/// One input slot of a form.
///
/// Construct with [`Field::new`] and the builder-style modifiers; the owning
/// [`Form`](super::Form) validates cross-field invariants.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Input name, unique within the form.
    pub name: String,
    /// Human-readable label.
    pub label: String,
    /// Markdown help text.
    pub description: Option<String>,
    /// Declared type.
    pub kind: FieldType,
    /// At least one value must be supplied.
    pub required: bool,
    /// Shown but not editable; value comes from `default`.
    pub disabled: bool,
    /// Not shown; value comes from `default`.
    pub hidden: bool,
    /// Accept several values and store an array.
    pub multiple: bool,
    /// Render as a text area.
    pub multiline: bool,
    /// Icon name for the input decoration.
    pub icon: Option<String>,
    /// Template rendered to produce the default value.
    pub default: Option<String>,
    /// Pattern for string values.
    pub pattern: Option<FieldPattern>,
    /// Closed choice set; empty means free input.
    pub options: Vec<FieldOption>,
}

impl Field {
    /// Create an optional field of the given type labelled with its name.
    pub fn new(name: impl Into<String>, kind: FieldType) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            description: None,
            kind,
            required: false,
            disabled: false,
            hidden: false,
            multiple: false,
            multiline: false,
            icon: None,
            default: None,
            pattern: None,
            options: Vec::new(),
        }
    }

    /// Mark the field as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Hide the field; its value always comes from the default template.
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Disable the field; its value always comes from the default template.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    /// Collect every submitted value into an array.
    #[must_use]
    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    /// Set the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set the default-value template.
    #[must_use]
    pub fn with_default(mut self, template: impl Into<String>) -> Self {
        self.default = Some(template.into());
        self
    }

    /// Set the string pattern.
    #[must_use]
    pub fn with_pattern(mut self, pattern: FieldPattern) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Restrict input to a closed choice set.
    #[must_use]
    pub fn with_options(mut self, options: impl IntoIterator<Item = FieldOption>) -> Self {
        self.options = options.into_iter().collect();
        self
    }

    /// Whether the value is computed server-side instead of read from input.
    pub fn is_computed(&self) -> bool {
        self.hidden || self.disabled
    }

    /// Whether `value` is one of the declared options.
    ///
    /// Always true for fields without options.
    pub fn accepts_option(&self, value: &str) -> bool {
        self.options.is_empty()
            || self
                .options
                .iter()
                .any(|option| option.effective_value() == value)
    }
}
