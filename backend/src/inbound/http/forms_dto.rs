//! Form page payloads.

use std::collections::BTreeMap;

use actix_web::http::StatusCode;
use serde::Serialize;

use crate::domain::form::{Field, FieldOption, Form};
use crate::domain::submission::{ResultView, SubmissionOutcome};
use crate::domain::validation::FieldError;

/// Entry of the form index.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSummaryResponse {
    pub name: String,
    pub title: String,
    pub description: String,
}

impl From<&Form> for FormSummaryResponse {
    fn from(form: &Form) -> Self {
        Self {
            name: form.name().to_owned(),
            title: form.title().to_owned(),
            description: form.description().to_owned(),
        }
    }
}

/// Field metadata needed to draw an input.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldResponse {
    pub name: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub required: bool,
    pub disabled: bool,
    pub hidden: bool,
    pub multiple: bool,
    pub multiline: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FieldOption>,
}

impl From<&Field> for FieldResponse {
    fn from(field: &Field) -> Self {
        Self {
            name: field.name.clone(),
            label: field.label.clone(),
            description: field.description.clone(),
            kind: field.kind.as_str(),
            required: field.required,
            disabled: field.disabled,
            hidden: field.hidden,
            multiple: field.multiple,
            multiline: field.multiline,
            icon: field.icon.clone(),
            pattern: field.pattern.as_ref().map(|pattern| pattern.as_str().to_owned()),
            options: field.options.clone(),
        }
    }
}

/// Form definition as shown to clients.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormResponse {
    pub name: String,
    pub title: String,
    pub description: String,
    pub fields: Vec<FieldResponse>,
    pub requires_code: bool,
}

impl From<&Form> for FormResponse {
    fn from(form: &Form) -> Self {
        Self {
            name: form.name().to_owned(),
            title: form.title().to_owned(),
            description: form.description().to_owned(),
            fields: form.fields().iter().map(FieldResponse::from).collect(),
            requires_code: !form.codes().is_empty(),
        }
    }
}

/// One rejected field.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldErrorResponse {
    pub field: String,
    pub message: String,
}

impl From<&FieldError> for FieldErrorResponse {
    fn from(error: &FieldError) -> Self {
        Self {
            field: error.field.clone(),
            message: error.kind.to_string(),
        }
    }
}

/// Terminal state name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OutcomeKind {
    Rendered,
    Denied,
    Invalid,
    Stored,
    Failed,
}

/// Response to `GET` or `POST /forms/{name}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormPageResponse {
    pub outcome: OutcomeKind,
    pub form: FormResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<BTreeMap<String, Vec<String>>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldErrorResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denial: Option<String>,
    pub prompt_code: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xsrf: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turnstile_site_key: Option<String>,
}

impl FormPageResponse {
    /// Page for `outcome` on `form`.
    pub fn new(form: &Form, outcome: SubmissionOutcome) -> Self {
        let mut page = Self {
            outcome: OutcomeKind::Rendered,
            form: FormResponse::from(form),
            values: None,
            errors: Vec::new(),
            denial: None,
            prompt_code: false,
            result: None,
            xsrf: None,
            turnstile_site_key: None,
        };
        match outcome {
            SubmissionOutcome::Rendered(view) => {
                page.values = Some(view.values);
            }
            SubmissionOutcome::Denied(denial) => {
                page.outcome = OutcomeKind::Denied;
                page.prompt_code = denial.prompts_for_code();
                page.denial = Some(denial.to_string());
            }
            SubmissionOutcome::Invalid { view, errors } => {
                page.outcome = OutcomeKind::Invalid;
                page.values = Some(view.values);
                page.errors = errors.iter().map(FieldErrorResponse::from).collect();
            }
            SubmissionOutcome::Stored(result) => {
                page.outcome = OutcomeKind::Stored;
                page.result = Some(result);
            }
            SubmissionOutcome::Failed(result) => {
                page.outcome = OutcomeKind::Failed;
                page.result = Some(result);
            }
        }
        page
    }

    /// HTTP status for the page.
    pub fn status(&self) -> StatusCode {
        match self.outcome {
            OutcomeKind::Rendered => StatusCode::OK,
            OutcomeKind::Denied if self.prompt_code => StatusCode::UNAUTHORIZED,
            OutcomeKind::Denied => StatusCode::FORBIDDEN,
            OutcomeKind::Invalid => StatusCode::UNPROCESSABLE_ENTITY,
            OutcomeKind::Stored => StatusCode::CREATED,
            OutcomeKind::Failed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
