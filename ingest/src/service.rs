//! HTTP surface of the gateway.
//!
//! A single route: `POST /data-gateway/{recordTypeName}`. The service
//! authenticates the caller, enforces the batch size limit, hands the batch
//! to the [`BulkProcessor`], and maps request-level failures to status codes.
//! Per-record failures never surface here; they ride inside a 200 response.

use crate::errors::{GatewayError, Result};
use crate::metrics_defs::REQUESTS_REJECTED;
use crate::processor::BulkProcessor;
use crate::protocol::{IngestRequest, IngestResponse};
use datastore::permissions::Principal;
use datastore::store::StoreError;
use http::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use http::{Method, StatusCode};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

const ROUTE_PREFIX: &str = "/data-gateway/";

#[derive(Clone)]
pub struct GatewayService {
    processor: Arc<BulkProcessor>,
    /// Bearer token -> permission profile
    clients: Arc<HashMap<String, String>>,
    max_records: usize,
}

impl GatewayService {
    pub fn new(
        processor: Arc<BulkProcessor>,
        clients: HashMap<String, String>,
        max_records: usize,
    ) -> Self {
        Self {
            processor,
            clients: Arc::new(clients),
            max_records,
        }
    }

    /// Full request lifecycle, generic over the body so tests can drive it
    /// without a socket. Always resolves to a response; transport-level
    /// errors are the caller's concern.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<BoxBody<Bytes, GatewayError>>
    where
        B: Body,
        B::Error: std::error::Error,
    {
        if req.method() != Method::POST {
            reject("method");
            return error_response(
                StatusCode::METHOD_NOT_ALLOWED,
                "Only POST is supported".to_string(),
            );
        }

        let path = req.uri().path().to_string();
        let Some(type_name) = path.strip_prefix(ROUTE_PREFIX).filter(|t| !t.is_empty()) else {
            reject("route");
            return error_response(StatusCode::NOT_FOUND, format!("No route for {path}"));
        };

        let principal = match self.authenticate(&req) {
            Ok(principal) => principal,
            Err(message) => {
                reject("unauthenticated");
                tracing::warn!(path = %path, "Rejected unauthenticated request");
                return error_response(StatusCode::UNAUTHORIZED, message);
            }
        };

        let bytes = match req.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                reject("body");
                let err = GatewayError::RequestBodyError(e.to_string());
                return error_response(status_for(&err), err.to_string());
            }
        };

        let request = match IngestRequest::from_bytes(&bytes) {
            Ok(request) => request,
            Err(e) => {
                reject("malformed");
                return error_response(StatusCode::BAD_REQUEST, format!("Invalid request body: {e}"));
            }
        };

        if request.data.len() > self.max_records {
            reject("batch_too_large");
            let err = GatewayError::BatchTooLarge {
                got: request.data.len(),
                limit: self.max_records,
            };
            return error_response(StatusCode::BAD_REQUEST, err.to_string());
        }

        match self.processor.process(&principal, type_name, request).await {
            Ok(results) => match (IngestResponse { results }).to_bytes() {
                Ok(body) => json_response(StatusCode::OK, body),
                Err(e) => error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    GatewayError::from(e).to_string(),
                ),
            },
            Err(e) => {
                tracing::warn!(record_type = %type_name, error = %e, "Batch rejected");
                error_response(status_for(&e), e.to_string())
            }
        }
    }

    fn authenticate<B>(&self, req: &Request<B>) -> Result<Principal, String> {
        let header = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| "Missing Authorization header".to_string())?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| "Authorization header must use the Bearer scheme".to_string())?;
        let profile = self
            .clients
            .get(token)
            .ok_or_else(|| "Unrecognized client token".to_string())?;
        Ok(Principal::new(profile.clone()))
    }
}

fn status_for(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::UnknownRecordType(_) => StatusCode::NOT_FOUND,
        GatewayError::RequestBodyError(_) | GatewayError::BatchTooLarge { .. } => {
            StatusCode::BAD_REQUEST
        }
        GatewayError::Store(StoreError::UnknownExternalIdField { .. }) => StatusCode::BAD_REQUEST,
        e if e.is_authorization() => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(reason: &'static str) {
    metrics::counter!(REQUESTS_REJECTED.name, "reason" => reason).increment(1);
}

fn json_response(status: StatusCode, body: Bytes) -> Response<BoxBody<Bytes, GatewayError>> {
    let mut response = Response::new(Full::new(body).map_err(|never| match never {}).boxed());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn error_response(status: StatusCode, message: String) -> Response<BoxBody<Bytes, GatewayError>> {
    let body = serde_json::json!({ "error": message }).to_string();
    json_response(status, Bytes::from(body))
}

impl Service<Request<Incoming>> for GatewayService {
    type Response = Response<BoxBody<Bytes, GatewayError>>;
    type Error = GatewayError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { Ok(service.handle(req).await) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::PermissionGuard;
    use crate::handlers::HandlerRegistry;
    use datastore::permissions::ProfilePermissions;
    use datastore::schema::{FieldDef, RecordSchema, SchemaCatalog};
    use datastore::MemoryStore;
    use serde_json::{json, Value as JsonValue};

    fn service() -> (GatewayService, Arc<MemoryStore>) {
        let schemas = SchemaCatalog::new(vec![RecordSchema {
            type_name: "Order".to_string(),
            fields: vec![
                FieldDef {
                    name: "orderNumber".to_string(),
                    required: true,
                },
                FieldDef {
                    name: "totalAmount".to_string(),
                    required: false,
                },
            ],
            relationships: vec![],
        }])
        .unwrap();
        let store = Arc::new(MemoryStore::new(schemas));
        let permissions: ProfilePermissions = serde_yaml::from_str(
            r#"
integration:
    Order:
        modify: true
        readonly_fields: [totalAmount]
"#,
        )
        .unwrap();
        let processor = Arc::new(BulkProcessor::new(
            store.clone(),
            PermissionGuard::new(Arc::new(permissions)),
            Arc::new(HandlerRegistry::default()),
        ));
        let clients = HashMap::from([("sekrit".to_string(), "integration".to_string())]);
        (GatewayService::new(processor, clients, 3), store)
    }

    fn post(path: &str, token: Option<&str>, body: JsonValue) -> Request<Full<Bytes>> {
        let mut builder = Request::builder().method(Method::POST).uri(path);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        builder
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }

    async fn body_json(response: Response<BoxBody<Bytes, GatewayError>>) -> JsonValue {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn batch(records: JsonValue) -> JsonValue {
        json!({"externalIdField": "orderNumber", "data": records})
    }

    #[tokio::test]
    async fn test_successful_batch_returns_per_record_results() {
        let (service, store) = service();
        let response = service
            .handle(post(
                "/data-gateway/Order",
                Some("sekrit"),
                batch(json!([{"orderNumber": "A-1"}, {"orderNumber": "A-2"}])),
            ))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let body = body_json(response).await;
        let results = body["results"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["index"], 0);
        assert_eq!(results[0]["status"], "Success");
        assert!(results[0]["id"].is_string());
        assert_eq!(store.row_count("Order"), 2);
    }

    #[tokio::test]
    async fn test_partial_failure_still_returns_200() {
        let (service, _) = service();
        let response = service
            .handle(post(
                "/data-gateway/Order",
                Some("sekrit"),
                batch(json!([{"orderNumber": "A-1"}, {}])),
            ))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let results = body["results"].as_array().unwrap();
        assert_eq!(results[0]["status"], "Success");
        assert_eq!(results[1]["status"], "Error");
    }

    #[tokio::test]
    async fn test_missing_or_unknown_token_is_unauthorized() {
        let (service, _) = service();
        let response = service
            .handle(post("/data-gateway/Order", None, batch(json!([]))))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = service
            .handle(post("/data-gateway/Order", Some("wrong"), batch(json!([]))))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_permission_violation_is_forbidden() {
        let (service, store) = service();
        let response = service
            .handle(post(
                "/data-gateway/Order",
                Some("sekrit"),
                batch(json!([{"orderNumber": "A-1", "totalAmount": 10}])),
            ))
            .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("totalAmount"));
        assert_eq!(store.row_count("Order"), 0);
    }

    #[tokio::test]
    async fn test_unknown_record_type_is_not_found() {
        let (service, _) = service();
        let response = service
            .handle(post("/data-gateway/Ghost", Some("sekrit"), batch(json!([]))))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_oversized_batch_is_rejected() {
        let (service, store) = service();
        let records: Vec<JsonValue> = (0..4)
            .map(|i| json!({"orderNumber": format!("A-{i}")}))
            .collect();
        let response = service
            .handle(post(
                "/data-gateway/Order",
                Some("sekrit"),
                batch(json!(records)),
            ))
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("limit"));
        assert_eq!(store.row_count("Order"), 0);
    }

    #[tokio::test]
    async fn test_unknown_external_id_field_is_bad_request() {
        let (service, store) = service();
        let response = service
            .handle(post(
                "/data-gateway/Order",
                Some("sekrit"),
                json!({"externalIdField": "ghost", "data": [{"orderNumber": "A-1"}]}),
            ))
            .await;

        // A whole-call store refusal is the caller's mistake, not a 500
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("ghost"));
        assert_eq!(store.row_count("Order"), 0);
    }

    #[tokio::test]
    async fn test_body_read_failure_is_bad_request() {
        use hyper::body::Frame;
        use std::task::{Context, Poll};

        // A body that dies mid-transfer, the way a dropped connection does
        struct FailingBody;

        impl Body for FailingBody {
            type Data = Bytes;
            type Error = std::io::Error;

            fn poll_frame(
                self: Pin<&mut Self>,
                _cx: &mut Context<'_>,
            ) -> Poll<Option<std::result::Result<Frame<Bytes>, Self::Error>>> {
                Poll::Ready(Some(Err(std::io::Error::other("connection reset"))))
            }
        }

        let (service, _) = service();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/data-gateway/Order")
            .header(AUTHORIZATION, "Bearer sekrit")
            .body(FailingBody)
            .unwrap();

        let response = service.handle(request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let (service, _) = service();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/data-gateway/Order")
            .header(AUTHORIZATION, "Bearer sekrit")
            .body(Full::new(Bytes::from_static(b"not json")))
            .unwrap();
        assert_eq!(service.handle(request).await.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_wrong_method_and_route() {
        let (service, _) = service();
        let request = Request::builder()
            .method(Method::GET)
            .uri("/data-gateway/Order")
            .header(AUTHORIZATION, "Bearer sekrit")
            .body(Full::new(Bytes::new()))
            .unwrap();
        assert_eq!(
            service.handle(request).await.status(),
            StatusCode::METHOD_NOT_ALLOWED
        );

        let response = service
            .handle(post("/elsewhere", Some("sekrit"), batch(json!([]))))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
