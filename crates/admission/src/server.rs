//! Webhook HTTP server.
//!
//! Serves the mutating hook on `/mutate--v1-pod` and the validating hook on
//! `/validate--v1-pod`, both registered with failurePolicy=fail and
//! sideEffects=none for create and update.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Json, State};
use axum::routing::post;
use axum::Router;
use k8s_openapi::api::core::v1::Pod;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use kube::core::DynamicObject;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use slurm_bridge_domain::{BridgeError, Result};

use crate::{AdmissionError, PodAdmission};

pub fn router(admission: Arc<PodAdmission>) -> Router {
    Router::new()
        .route("/mutate--v1-pod", post(mutate))
        .route("/validate--v1-pod", post(validate))
        .with_state(admission)
}

/// Serve until the token is cancelled.
pub async fn serve(
    admission: Arc<PodAdmission>,
    addr: SocketAddr,
    token: CancellationToken,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| BridgeError::InvalidConfig(format!("bind webhook {addr}: {e}")))?;
    info!(%addr, "admission webhook listening");
    axum::serve(listener, router(admission))
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await
        .map_err(|e| BridgeError::InvalidConfig(format!("webhook server: {e}")))
}

pub(crate) async fn mutate(
    State(admission): State<Arc<PodAdmission>>,
    Json(review): Json<AdmissionReview<Pod>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req: AdmissionRequest<Pod> = match review.try_into() {
        Ok(req) => req,
        Err(e) => return Json(AdmissionResponse::invalid(e.to_string()).into_review()),
    };
    let response = AdmissionResponse::from(&req);
    let Some(pod) = req.object.as_ref() else {
        return Json(response.deny("admission request carried no pod").into_review());
    };

    let mut mutated = pod.clone();
    if let Err(e) = admission.default(&mut mutated).await {
        // Fail closed: the plugin's invariants depend on defaulting.
        warn!(error = %e, "pod defaulting failed");
        return Json(response.deny(e.to_string()).into_review());
    }

    let original = match serde_json::to_value(pod) {
        Ok(value) => value,
        Err(e) => return Json(AdmissionResponse::invalid(e.to_string()).into_review()),
    };
    let changed = match serde_json::to_value(&mutated) {
        Ok(value) => value,
        Err(e) => return Json(AdmissionResponse::invalid(e.to_string()).into_review()),
    };
    match response.with_patch(json_patch::diff(&original, &changed)) {
        Ok(response) => Json(response.into_review()),
        Err(e) => Json(AdmissionResponse::invalid(e.to_string()).into_review()),
    }
}

pub(crate) async fn validate(
    State(admission): State<Arc<PodAdmission>>,
    Json(review): Json<AdmissionReview<Pod>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req: AdmissionRequest<Pod> = match review.try_into() {
        Ok(req) => req,
        Err(e) => return Json(AdmissionResponse::invalid(e.to_string()).into_review()),
    };
    let response = AdmissionResponse::from(&req);

    let outcome = match req.operation {
        Operation::Create => match req.object.as_ref() {
            Some(pod) => admission.validate_create(pod).await,
            None => Err(AdmissionError::Denied(
                "admission request carried no pod".to_string(),
            )),
        },
        Operation::Update => match (req.old_object.as_ref(), req.object.as_ref()) {
            (Some(old), Some(new)) => admission.validate_update(old, new).await,
            _ => Err(AdmissionError::Denied(
                "admission request carried no pod".to_string(),
            )),
        },
        Operation::Delete => match req.old_object.as_ref() {
            Some(pod) => admission.validate_delete(pod).await,
            None => Ok(()),
        },
        _ => Ok(()),
    };

    match outcome {
        Ok(()) => {
            debug!("admission allowed");
            Json(response.into_review())
        }
        Err(e) => Json(response.deny(e.to_string()).into_review()),
    }
}
