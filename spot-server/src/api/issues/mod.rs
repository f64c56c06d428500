//! Issue API
//!
//! | Path | Method | Auth |
//! |------|--------|------|
//! | /api/issues | POST | citizen, admin |
//! | /api/issues | GET | admin |
//! | /api/issues/otp-send | POST | none (rate limited) |
//! | /api/issues/anonymous | POST | none (rate limited) |
//! | /api/issues/my-reports | GET | citizen |
//! | /api/issues/track/{ticket_id} | GET | none |
//! | /api/issues/authority/dashboard | GET | authority |
//! | /api/issues/{ticket_id}/status | PUT | authority, admin |
//! | /api/issues/{ticket_id}/resolve | PUT | authority, admin |
//! | /api/issues/{ticket_id}/verify | PUT | none (rate limited) |

mod form;
mod handler;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
};

use crate::auth::rate_limit::{PublicRoute, throttle};
use crate::state::ServerState;

/// Multipart overhead allowed on top of the image size limit
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn router(state: &ServerState) -> Router<ServerState> {
    Router::new().nest("/api/issues", routes(state))
}

fn routes(state: &ServerState) -> Router<ServerState> {
    // Room for the image itself plus text fields; oversize images then
    // fail in the media store with a precise error
    let body_limit = DefaultBodyLimit::max(
        state
            .config
            .max_upload_bytes
            .saturating_mul(2)
            .saturating_add(FORM_OVERHEAD_BYTES),
    );

    let public_routes = Router::new()
        .route(
            "/otp-send",
            post(handler::otp_send).route_layer(middleware::from_fn_with_state(
                (state.clone(), PublicRoute::OtpSend),
                throttle,
            )),
        )
        .route(
            "/anonymous",
            post(handler::anonymous)
                .route_layer(middleware::from_fn_with_state(
                    (state.clone(), PublicRoute::Anonymous),
                    throttle,
                ))
                .layer(body_limit),
        )
        .route(
            "/{ticket_id}/verify",
            put(handler::verify).route_layer(middleware::from_fn_with_state(
                (state.clone(), PublicRoute::Verify),
                throttle,
            )),
        )
        .route("/track/{ticket_id}", get(handler::track));

    let protected_routes = Router::new()
        .route(
            "/",
            post(handler::create)
                .get(handler::list_all)
                .layer(body_limit),
        )
        .route("/my-reports", get(handler::my_reports))
        .route("/authority/dashboard", get(handler::dashboard))
        .route("/{ticket_id}/status", put(handler::update_status))
        .route(
            "/{ticket_id}/resolve",
            put(handler::resolve).layer(body_limit),
        );

    public_routes.merge(protected_routes)
}
