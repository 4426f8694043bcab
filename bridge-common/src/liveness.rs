use std::ops::Add;
use std::sync::{Arc, RwLock};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{routing, Router};
use time::{Duration, OffsetDateTime};
use tracing::warn;

/// Deadline-based liveness for the consumer loop.
///
/// The poll loop reports in on every tick; if it fails to report within the
/// configured deadline the probe turns unhealthy, so a wedged loop takes the
/// process out of rotation even though it is still running. A probe that has
/// never been reported to is unhealthy as well.
#[derive(Clone)]
pub struct Liveness {
    component: String,
    deadline: Duration,
    healthy_until: Arc<RwLock<Option<OffsetDateTime>>>,
}

#[derive(Debug, PartialEq, Eq)]
pub struct LivenessStatus {
    pub component: String,
    pub alive: bool,
}

impl IntoResponse for LivenessStatus {
    fn into_response(self) -> Response {
        let body = format!("{:?}", self);
        match self.alive {
            true => (StatusCode::OK, body),
            false => (StatusCode::INTERNAL_SERVER_ERROR, body),
        }
        .into_response()
    }
}

impl Liveness {
    pub fn new(component: &str, deadline: Duration) -> Self {
        Self {
            component: component.to_owned(),
            deadline,
            healthy_until: Arc::new(RwLock::new(None)),
        }
    }

    /// Report the component healthy until the deadline from now. Must be
    /// called more frequently than the configured deadline.
    pub fn report_healthy(&self) {
        let until = OffsetDateTime::now_utc().add(self.deadline);
        match self.healthy_until.write() {
            Ok(mut guard) => *guard = Some(until),
            // Poisoned lock: just warn, the probe will fail and the process restart.
            Err(_) => warn!("poisoned liveness lock for {}", self.component),
        }
    }

    pub fn status(&self) -> LivenessStatus {
        let alive = match self.healthy_until.read() {
            Ok(guard) => guard
                .map(|until| until.gt(&OffsetDateTime::now_utc()))
                .unwrap_or(false),
            Err(_) => false,
        };

        if !alive {
            warn!("{} liveness check failed", self.component);
        }

        LivenessStatus {
            component: self.component.clone(),
            alive,
        }
    }
}

/// Build a router serving this probe on `/_liveness`.
pub fn liveness_router(liveness: Liveness) -> Router {
    Router::new().route(
        "/_liveness",
        routing::get(move || std::future::ready(liveness.status())),
    )
}
