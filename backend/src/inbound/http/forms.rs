//! Form HTTP handlers.
//!
//! ```text
//! GET  /              index of forms visible to the caller
//! GET  /forms/{name}  blank form with defaults
//! POST /forms/{name}  submit (application/x-www-form-urlencoded)
//! ```

use std::collections::BTreeMap;

use actix_web::{HttpRequest, HttpResponse, get, post, web};
use tokio_util::sync::CancellationToken;

use crate::domain::access::{RequestMethod, XsrfTokens};
use crate::domain::form::{Credentials, XSRF_FIELD};
use crate::domain::submission::SubmissionRequest;
use crate::domain::validation::FormInput;
use crate::domain::Error;
use crate::inbound::http::ApiResult;
use crate::inbound::http::cache_control::no_store_header;
use crate::inbound::http::forms_dto::{FormPageResponse, FormSummaryResponse};
use crate::inbound::http::identity::credentials_from_headers;
use crate::inbound::http::session::FormSession;
use crate::inbound::http::state::HttpState;
use crate::inbound::http::xsrf::XsrfToken;

/// List the forms the caller may open.
#[get("/")]
pub async fn list_forms(
    state: web::Data<HttpState>,
    request: HttpRequest,
) -> ApiResult<web::Json<Vec<FormSummaryResponse>>> {
    if state.options.disable_listing {
        return Err(Error::not_found("form listing is disabled"));
    }
    let credentials = caller(&state, &request);
    let forms = state
        .registry
        .visible(credentials.as_ref())
        .map(FormSummaryResponse::from)
        .collect();
    Ok(web::Json(forms))
}

/// Render a blank form.
#[get("/forms/{name}")]
pub async fn show_form(
    state: web::Data<HttpState>,
    session: FormSession,
    name: web::Path<String>,
    request: HttpRequest,
) -> ApiResult<HttpResponse> {
    handle(&state, &session, &name, &request, RequestMethod::Get, FormInput::default()).await
}

/// Submit a form.
#[post("/forms/{name}")]
pub async fn submit_form(
    state: web::Data<HttpState>,
    session: FormSession,
    name: web::Path<String>,
    request: HttpRequest,
    body: web::Bytes,
) -> ApiResult<HttpResponse> {
    let input: FormInput = url::form_urlencoded::parse(&body).into_owned().collect();
    handle(&state, &session, &name, &request, RequestMethod::Post, input).await
}

async fn handle(
    state: &HttpState,
    session: &FormSession,
    name: &str,
    request: &HttpRequest,
    method: RequestMethod,
    input: FormInput,
) -> ApiResult<HttpResponse> {
    let form = state
        .registry
        .get(name)
        .ok_or_else(|| Error::not_found(format!("form `{name}` not found")))?;
    let definition = form.definition();
    let xsrf = XsrfToken::for_request(request);

    // Dropping the handler (client gone) cancels storage and dispatch.
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();

    let mut submission = SubmissionRequest::new(method);
    submission.xsrf = (!state.options.disable_xsrf).then(|| XsrfTokens {
        submitted: input.first(XSRF_FIELD).map(str::to_owned),
        issued: xsrf.issued(),
    });
    submission.input = input;
    submission.credentials = caller(state, request);
    submission.session = session.load(definition.name())?;
    submission.headers = header_map(request);
    submission.query = query_map(request);
    submission.remote_ip = remote_ip(state, request);
    submission.cancel = cancel;

    let response = state.service.handle(form, submission).await;
    session.store(definition.name(), &response.session)?;

    let mut page = FormPageResponse::new(definition, response.outcome);
    if !state.options.disable_xsrf {
        page.xsrf = Some(xsrf.value().to_owned());
    }
    page.turnstile_site_key = state.options.turnstile_site_key.clone();

    let mut builder = HttpResponse::build(page.status());
    builder.insert_header(no_store_header());
    if let Some(cookie) = xsrf.cookie(state.options.cookie_secure) {
        builder.cookie(cookie);
    }
    Ok(builder.json(page))
}

fn caller(state: &HttpState, request: &HttpRequest) -> Option<Credentials> {
    state
        .options
        .trusted_identity_headers
        .then(|| credentials_from_headers(request.headers()))
        .flatten()
}

fn header_map(request: &HttpRequest) -> BTreeMap<String, String> {
    request
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_owned(), value.to_owned()))
        })
        .collect()
}

fn query_map(request: &HttpRequest) -> BTreeMap<String, String> {
    url::form_urlencoded::parse(request.query_string().as_bytes())
        .into_owned()
        .collect()
}

fn remote_ip(state: &HttpState, request: &HttpRequest) -> Option<String> {
    if state.options.trusted_identity_headers {
        let info = request.connection_info();
        return info.realip_remote_addr().map(str::to_owned);
    }
    request.peer_addr().map(|addr| addr.ip().to_string())
}

#[cfg(test)]
#[path = "forms_tests.rs"]
mod tests;
