use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{HeaderValue, Method, Request, StatusCode, header},
};
use metrics_util::debugging::DebuggingRecorder;
use serde_json::json;
use tower::ServiceExt;

use contact_relay::application::contact::{ContactService, MailEnvelope, SUBMISSIONS_METRIC};
use contact_relay::application::mailer::{MailTransport, OutboundEmail, TransportError};
use contact_relay::infra::http::{
    ContactRateLimiter, CorsPolicy, HttpState, PeerAddr, RATE_LIMITED_METRIC, build_router,
};

struct AcceptingTransport;

#[async_trait]
impl MailTransport for AcceptingTransport {
    async fn send(&self, _email: OutboundEmail) -> Result<(), TransportError> {
        Ok(())
    }
}

struct RejectingTransport;

#[async_trait]
impl MailTransport for RejectingTransport {
    async fn send(&self, _email: OutboundEmail) -> Result<(), TransportError> {
        Err(TransportError::delivery("550 mailbox unavailable"))
    }
}

struct StalledTransport;

#[async_trait]
impl MailTransport for StalledTransport {
    async fn send(&self, _email: OutboundEmail) -> Result<(), TransportError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    }
}

fn relay_app(transport: Arc<dyn MailTransport>, max_requests: u32) -> Router {
    let contact = ContactService::new(
        transport,
        MailEnvelope {
            sender: "relay@example.org".to_string(),
            recipient: "owner@example.org".to_string(),
        },
        Duration::from_millis(100),
    );
    build_router(HttpState {
        contact: Arc::new(contact),
        rate_limiter: Arc::new(ContactRateLimiter::new(
            Duration::from_secs(60),
            max_requests,
        )),
        cors: Arc::new(CorsPolicy::new(HeaderValue::from_static(
            "http://localhost:3000",
        ))),
        max_body_bytes: 4096,
    })
}

fn submission(name: &str) -> Request<Body> {
    let body = json!({
        "name": name,
        "email": "ana@example.com",
        "subject": "Hi",
        "message": "Hello",
    });
    let mut request = Request::builder()
        .method(Method::POST)
        .uri("/send-email")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build");
    request
        .extensions_mut()
        .insert(ConnectInfo(PeerAddr(SocketAddr::from(([198, 51, 100, 4], 443)))));
    request
}

#[tokio::test]
async fn relay_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let app = relay_app(Arc::new(AcceptingTransport), 2);
    let statuses = [
        (submission("Ana"), StatusCode::OK),
        (submission(""), StatusCode::BAD_REQUEST),
        (submission("Ana"), StatusCode::TOO_MANY_REQUESTS),
    ];
    for (request, expected) in statuses {
        let response = app
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond");
        assert_eq!(response.status(), expected);
    }

    for transport in [
        Arc::new(RejectingTransport) as Arc<dyn MailTransport>,
        Arc::new(StalledTransport),
    ] {
        let response = relay_app(transport, 10)
            .oneshot(submission("Ana"))
            .await
            .expect("router should respond");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    let snapshot = snapshotter.snapshot().into_vec();
    let names: HashSet<String> = snapshot
        .iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();
    for metric in [SUBMISSIONS_METRIC, RATE_LIMITED_METRIC] {
        assert!(names.contains(metric), "missing metric: {metric}");
    }

    let outcomes: HashSet<String> = snapshot
        .iter()
        .filter(|(composite_key, _, _, _)| composite_key.key().name() == SUBMISSIONS_METRIC)
        .flat_map(|(composite_key, _, _, _)| {
            composite_key
                .key()
                .labels()
                .filter(|label| label.key() == "outcome")
                .map(|label| label.value().to_string())
                .collect::<Vec<_>>()
        })
        .collect();
    for outcome in ["sent", "invalid", "failed", "timed_out"] {
        assert!(outcomes.contains(outcome), "missing outcome {outcome}: {outcomes:?}");
    }
}
