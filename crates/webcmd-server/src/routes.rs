//! HTTP routes: `GET /` shows the output, `POST /` submits input.

use crate::page::{self, DONE_MESSAGE};
use crate::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Form, Router,
};
use serde::Deserialize;
use tracing::{info, warn};

/// Input that restarts a finished session instead of being forwarded.
const RESTART: &str = "restart";

/// Build the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(show_output).post(submit_input))
        .with_state(state)
}

/// Render the latest output, or the "done" notice.
async fn show_output(State(state): State<AppState>) -> Response {
    let session = state.current().await;
    let body = if session.is_done() {
        DONE_MESSAGE.to_string()
    } else {
        match session.read_output().await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => format!(
                "Error occurred reading file {}: {e}",
                session.output_path().display()
            ),
        }
    };

    match page::render(state.command(), &body) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            warn!(error = %e, "failed to render page");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to render page").into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubmitForm {
    #[serde(default)]
    cmd: String,
}

/// Forward input to the subprocess, or restart it.
async fn submit_input(
    State(state): State<AppState>,
    Form(form): Form<SubmitForm>,
) -> impl IntoResponse {
    if form.cmd == RESTART {
        match state.restart_if_done().await {
            Ok(true) => info!(command = %state.command(), "commander restarted"),
            Ok(false) => {}
            Err(e) => warn!(command = %state.command(), error = %e, "error restarting"),
        }
        return Redirect::to("/");
    }

    let session = state.current().await;
    if let Err(e) = session.write_input(&form.cmd).await {
        warn!(error = %e, "input not delivered");
    }
    tokio::time::sleep(state.input_delay()).await;
    Redirect::to("/")
}
