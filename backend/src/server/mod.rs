//! Server construction and middleware wiring.

mod config;

pub use config::ServerConfig;

use config::SessionCookie;

use actix_web::dev::{Server, ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::middleware::DefaultHeaders;
use actix_web::{App, HttpServer, web};

use web_form::Trace;
use web_form::inbound::http::forms::{list_forms, show_form, submit_form};
use web_form::inbound::http::health::{HealthState, live, ready};
use web_form::inbound::http::session::session_middleware;
use web_form::inbound::http::state::HttpState;

#[derive(Clone)]
struct AppDependencies {
    health_state: web::Data<HealthState>,
    http_state: web::Data<HttpState>,
    session: SessionCookie,
}

fn security_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add(("X-Frame-Options", "DENY"))
        .add(("X-Content-Type-Options", "nosniff"))
        .add(("Referrer-Policy", "strict-origin-when-cross-origin"))
}

fn build_app(
    deps: AppDependencies,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let AppDependencies {
        health_state,
        http_state,
        session,
    } = deps;

    let forms = web::scope("")
        .wrap(session_middleware(session.key, session.secure, session.same_site))
        .service(list_forms)
        .service(show_form)
        .service(submit_form);

    App::new()
        .app_data(health_state)
        .app_data(http_state)
        .wrap(security_headers())
        .wrap(Trace)
        .service(ready)
        .service(live)
        .service(forms)
}

/// Construct an Actix HTTP server serving the loaded forms.
///
/// Signal handling is left to the caller, which drains the notification
/// dispatchers after the server stops.
///
/// # Errors
/// Propagates [`std::io::Error`] when binding the socket fails.
pub fn create_server(
    health_state: web::Data<HealthState>,
    http_state: web::Data<HttpState>,
    config: ServerConfig,
) -> std::io::Result<Server> {
    let server_health_state = health_state.clone();
    let ServerConfig { session, bind_addr } = config;

    let server = HttpServer::new(move || {
        build_app(AppDependencies {
            health_state: server_health_state.clone(),
            http_state: http_state.clone(),
            session: session.clone(),
        })
    })
    .disable_signals()
    .bind(bind_addr)?
    .run();

    health_state.mark_ready();
    Ok(server)
}
