//! Request-level submission pipeline.
//!
//! [`SubmissionService::handle`] sequences the admission gates, the fresh
//! render, field validation, persistence and notification fan-out. Every
//! failure ends as a [`SubmissionOutcome`]; nothing escapes as an error.

mod registry;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::domain::access::{
    AccessController, AccessDenial, AccessRequest, RequestMethod, SessionState, XsrfTokens,
};
use crate::domain::form::{CODE_FIELD, Credentials, FieldMap, Form, TIMEZONE_FIELD};
use crate::domain::notification::NotificationEvent;
use crate::domain::ports::{StoredRecord, SubmissionStore, TemplateRenderer};
use crate::domain::validation::{
    ClientTimezone, FieldDefaults, FieldError, FormInput, validate_fields,
};

pub use registry::{FormRegistry, NotificationFactory, RegisteredForm, RegistryError};

/// Everything the pipeline needs from one inbound request.
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    /// Request method.
    pub method: RequestMethod,
    /// Submitted form input; empty for renders.
    pub input: FormInput,
    /// Anti-forgery tokens; `None` disables the check.
    pub xsrf: Option<XsrfTokens>,
    /// Caller identity, if authenticated.
    pub credentials: Option<Credentials>,
    /// Session state carried over from the previous round-trip.
    pub session: SessionState,
    /// Request headers exposed to default-value templates.
    pub headers: BTreeMap<String, String>,
    /// Query parameters exposed to default-value templates.
    pub query: BTreeMap<String, String>,
    /// Client address, for captcha providers.
    pub remote_ip: Option<String>,
    /// Fires when the caller goes away.
    pub cancel: CancellationToken,
}

impl SubmissionRequest {
    /// Request with no input, identity, or session.
    pub fn new(method: RequestMethod) -> Self {
        Self {
            method,
            input: FormInput::default(),
            xsrf: None,
            credentials: None,
            session: SessionState::default(),
            headers: BTreeMap::new(),
            query: BTreeMap::new(),
            remote_ip: None,
            cancel: CancellationToken::new(),
        }
    }
}

/// Pre-filled values per field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormView {
    /// Values to show, keyed by field name.
    pub values: BTreeMap<String, Vec<String>>,
}

/// Rendered outcome of a persistence attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultView {
    /// Rendered success or failure message.
    pub message: String,
    /// Stored record, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<StoredRecord>,
    /// Storage error, on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Terminal state of one request.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    /// Blank form with current defaults.
    Rendered(FormView),
    /// An admission gate refused the request.
    Denied(AccessDenial),
    /// Validation failed; nothing was stored.
    Invalid {
        /// Echo of the submitted values.
        view: FormView,
        /// One error per failing field.
        errors: Vec<FieldError>,
    },
    /// The record was stored and notifications were queued.
    Stored(ResultView),
    /// Storage failed; no notification was queued.
    Failed(ResultView),
}

/// Outcome plus the session state to hand back to the client.
#[derive(Debug, Clone)]
pub struct SubmissionResponse {
    /// What happened.
    pub outcome: SubmissionOutcome,
    /// Session state for the next round-trip.
    pub session: SessionState,
}

/// Orchestrates admission, validation, storage, and dispatch.
#[derive(Clone)]
pub struct SubmissionService {
    access: AccessController,
    store: Arc<dyn SubmissionStore>,
    renderer: Arc<dyn TemplateRenderer>,
}

impl SubmissionService {
    /// Service backed by the given collaborators.
    pub fn new(
        access: AccessController,
        store: Arc<dyn SubmissionStore>,
        renderer: Arc<dyn TemplateRenderer>,
    ) -> Self {
        Self {
            access,
            store,
            renderer,
        }
    }

    /// Shared template renderer.
    pub fn renderer(&self) -> &Arc<dyn TemplateRenderer> {
        &self.renderer
    }

    /// Run one request through the pipeline.
    pub async fn handle(
        &self,
        form: &RegisteredForm,
        request: SubmissionRequest,
    ) -> SubmissionResponse {
        let definition = form.definition();
        let mut session = request.session.clone();
        let access = AccessRequest {
            method: request.method,
            xsrf: request.xsrf.as_ref(),
            credentials: request.credentials.as_ref(),
            submitted_code: request.input.first(CODE_FIELD),
            input: &request.input,
            remote_ip: request.remote_ip.as_deref(),
        };
        if let Err(denial) = self.access.evaluate(definition, &access, &mut session).await {
            info!(form = definition.name(), reason = %denial, "submission denied");
            return SubmissionResponse {
                outcome: SubmissionOutcome::Denied(denial),
                session,
            };
        }

        let context = default_context(definition, &request, &session);
        let defaults = FieldDefaults::new(self.renderer.as_ref(), &context);

        let fresh = session.take_fresh();
        if request.method == RequestMethod::Get || fresh {
            return SubmissionResponse {
                outcome: SubmissionOutcome::Rendered(blank_view(definition, defaults)),
                session,
            };
        }

        let timezone = resolve_timezone(&request.input, &session);
        let (values, errors) = validate_fields(definition, &request.input, timezone, defaults);
        if !errors.is_empty() {
            info!(
                form = definition.name(),
                errors = errors.len(),
                "form validation failed"
            );
            return SubmissionResponse {
                outcome: SubmissionOutcome::Invalid {
                    view: echo_view(definition, &request.input, defaults),
                    errors,
                },
                session: request.session,
            };
        }

        let outcome = self.persist(form, values, &request.cancel).await;
        if matches!(outcome, SubmissionOutcome::Stored(_)) {
            session.mark_fresh();
            if let Some(name) = timezone.name() {
                session.set_timezone(name);
            }
        }
        SubmissionResponse { outcome, session }
    }

    async fn persist(
        &self,
        form: &RegisteredForm,
        values: FieldMap,
        cancel: &CancellationToken,
    ) -> SubmissionOutcome {
        let definition = form.definition();
        let stored = tokio::select! {
            biased;
            () = cancel.cancelled() => Err("request cancelled".to_owned()),
            stored = self.store.store(definition.table(), &values) => {
                stored.map_err(|err| err.to_string())
            }
        };

        let record = match stored {
            Ok(record) => record,
            Err(message) => {
                error!(form = definition.name(), table = definition.table(), error = %message, "failed to store submission");
                let context = json!({
                    "form": definition.summary(),
                    "result": Value::Null,
                    "error": message,
                });
                return SubmissionOutcome::Failed(ResultView {
                    message: self.render_message(definition.failure_message(), &context),
                    record: None,
                    error: Some(message),
                });
            }
        };

        info!(form = definition.name(), id = record.id.as_deref(), "submission stored");
        let context = json!({
            "form": definition.summary(),
            "result": record,
            "error": "",
        });
        let message = self.render_message(definition.success_message(), &context);
        self.notify(form, &record, cancel).await;
        SubmissionOutcome::Stored(ResultView {
            message,
            record: Some(record),
            error: None,
        })
    }

    async fn notify(&self, form: &RegisteredForm, record: &StoredRecord, cancel: &CancellationToken) {
        if form.notifications().is_empty() {
            return;
        }
        let definition = form.definition();
        let event = NotificationEvent::new(Arc::clone(definition), record.clone());
        for notification in form.notifications() {
            match notification.dispatch(cancel, &event).await {
                Ok(()) => {}
                Err(err) if err.affects_only_this_target() => {
                    error!(form = definition.name(), sink = %notification.describe(), error = %err, "failed to prepare notification");
                }
                Err(err) => {
                    error!(form = definition.name(), sink = %notification.describe(), error = %err, "notification dispatch aborted");
                    break;
                }
            }
        }
    }

    fn render_message(&self, template: &str, context: &Value) -> String {
        self.renderer
            .render(template, context)
            .unwrap_or_else(|err| {
                warn!(error = %err, "failed to render result message");
                template.to_owned()
            })
    }
}

/// Timezone from the submission, then the session, then the server.
fn resolve_timezone(input: &FormInput, session: &SessionState) -> ClientTimezone {
    let candidate = input
        .first(TIMEZONE_FIELD)
        .filter(|name| !name.trim().is_empty())
        .or_else(|| session.timezone());
    match candidate {
        None => ClientTimezone::ServerLocal,
        Some(name) => ClientTimezone::parse(name).unwrap_or_else(|| {
            warn!(tz = name, "unknown client timezone, using server local time");
            ClientTimezone::ServerLocal
        }),
    }
}

/// `{form, headers, query, code, user, email, groups}` for default values.
fn default_context(form: &Form, request: &SubmissionRequest, session: &SessionState) -> Value {
    let credentials = request.credentials.clone().unwrap_or_default();
    json!({
        "form": form.summary(),
        "headers": request.headers,
        "query": request.query,
        "code": session.access_code().unwrap_or_default(),
        "user": credentials.user,
        "email": credentials.email,
        "groups": credentials.groups,
    })
}

fn blank_view(form: &Form, defaults: FieldDefaults<'_>) -> FormView {
    let values = form
        .fields()
        .iter()
        .filter_map(|field| match defaults.render(field) {
            Ok(value) if value.is_empty() => None,
            Ok(value) => Some((field.name.clone(), vec![value])),
            Err(err) => {
                warn!(form = form.name(), field = %field.name, error = %err, "default value failed to render");
                None
            }
        })
        .collect();
    FormView { values }
}

fn echo_view(form: &Form, input: &FormInput, defaults: FieldDefaults<'_>) -> FormView {
    let mut view = blank_view(form, defaults);
    for field in form.fields().iter().filter(|field| !field.is_computed()) {
        let submitted: Vec<String> = input.values(&field.name).map(str::to_owned).collect();
        if submitted.is_empty() {
            view.values.remove(&field.name);
        } else {
            view.values.insert(field.name.clone(), submitted);
        }
    }
    view
}
