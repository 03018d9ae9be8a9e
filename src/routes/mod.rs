pub mod actions;
pub mod api;
pub mod sse;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Inventory and triage
        .route("/api/resources", get(api::handle_resources))
        .route("/api/analyzer/issues", get(api::handle_issues))
        .route("/api/namespaces", get(api::handle_namespaces))
        // Cluster views
        .route("/api/cluster/overview", get(api::handle_overview))
        .route("/api/cluster/nodes", get(api::handle_nodes))
        .route("/api/cluster/pods", get(api::handle_pods))
        .route("/api/cluster/deployments", get(api::handle_deployments))
        .route("/api/cluster/top-pods", get(api::handle_top_pods))
        // Single objects
        .route(
            "/api/resources/{kind}/{namespace}/{name}",
            get(api::handle_get_object).delete(actions::handle_delete),
        )
        .route(
            "/api/resources/{kind}/{namespace}/{name}/restart",
            post(actions::handle_restart),
        )
        .route(
            "/api/resources/{kind}/{namespace}/{name}/scale",
            post(actions::handle_scale),
        )
        .route(
            "/api/custom/{group}/{version}/{plural}",
            get(api::handle_custom),
        )
        // Live metrics
        .route("/api/stream", get(sse::handle_metrics_stream))
        // Health
        .route("/healthz", get(api::handle_healthz))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Role, mint_token};
    use crate::clients::Patch;
    use crate::clients::fake::FakeGateway;
    use crate::config::Config;
    use crate::models::kind::ResourceKind;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    const SECRET: &str = "router-test-secret";

    fn cluster() -> FakeGateway {
        FakeGateway::new()
            .with(
                ResourceKind::Pod,
                json!({
                    "metadata": {"name": "web-1", "namespace": "shop"},
                    "status": {"phase": "Running", "containerStatuses": [
                        {"name": "app", "state": {"waiting": {"reason": "CrashLoopBackOff"}}}
                    ]}
                }),
            )
            .with(
                ResourceKind::Deployment,
                json!({
                    "metadata": {"name": "web", "namespace": "shop"},
                    "spec": {"replicas": 2},
                    "status": {"availableReplicas": 2, "readyReplicas": 2}
                }),
            )
            .with(
                ResourceKind::Node,
                json!({"metadata": {"name": "n1"}, "status": {"conditions": [{"type": "Ready", "status": "True"}]}}),
            )
    }

    fn app_with(gw: Arc<FakeGateway>, config_yaml: &str) -> Router {
        let cfg = Config::from_yaml(config_yaml, Some(SECRET.to_string())).unwrap();
        build_router(AppState::new(gw, Arc::new(cfg), CancellationToken::new()))
    }

    fn app(gw: Arc<FakeGateway>) -> Router {
        app_with(gw, "listen_port: 8080\n")
    }

    fn token(role: Role) -> String {
        mint_token(SECRET, "tester", Some(&role.to_string()), 600)
    }

    fn request(method: &str, uri: &str, role: Option<Role>, body: Option<Value>) -> Request<Body> {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(role) = role {
            req = req.header(header::AUTHORIZATION, format!("Bearer {}", token(role)));
        }
        match body {
            Some(b) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn resources_require_a_token() {
        let (status, body) = send(app(Arc::new(cluster())), request("GET", "/api/resources", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].as_str().unwrap().contains("missing token"));
    }

    #[tokio::test]
    async fn resources_scan_with_filters() {
        let gw = Arc::new(cluster());
        let (status, body) = send(
            app(gw.clone()),
            request(
                "GET",
                "/api/resources?namespace=all&problemsOnly=true",
                Some(Role::Viewer),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let items = body["items"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["kind"], "Pod");
        assert_eq!(items[0]["issue"], "CrashLoopBackOff");
        assert_eq!(items[0]["severity"], "critical");
        assert_eq!(items[0]["lastSeen"], Value::Null);
        assert!(gw.calls().contains(&"list pods all".to_string()));
    }

    #[tokio::test]
    async fn unknown_resource_type_is_400() {
        let (status, body) = send(
            app(Arc::new(cluster())),
            request("GET", "/api/resources?resourceType=widgets", Some(Role::Viewer), None),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("widgets"));
    }

    #[tokio::test]
    async fn overview_counts_nodes() {
        let (status, body) = send(
            app(Arc::new(cluster().metrics_down())),
            request("GET", "/api/cluster/overview", Some(Role::Viewer), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["nodeCount"], 1);
        assert_eq!(body["readyCount"], 1);
        assert_eq!(body["metricsAvailable"], false);
        assert_eq!(body["totalCpuCores"], 0.0);
    }

    #[tokio::test]
    async fn restart_needs_editor() {
        let gw = Arc::new(cluster());
        let uri = "/api/resources/deployments/shop/web/restart";

        let (status, _) = send(app(gw.clone()), request("POST", uri, Some(Role::Viewer), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(gw.patches.lock().unwrap().is_empty());

        let (status, body) = send(app(gw.clone()), request("POST", uri, Some(Role::Editor), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Success");
        let patches = gw.patches.lock().unwrap();
        assert_eq!(patches.len(), 1);
        assert!(matches!(&patches[0], (ResourceKind::Deployment, ns, name, Patch::Merge(_)) if ns == "shop" && name == "web"));
    }

    #[tokio::test]
    async fn restart_rejects_pods() {
        let (status, _) = send(
            app(Arc::new(cluster())),
            request("POST", "/api/resources/pod/shop/web-1/restart", Some(Role::Admin), None),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn scale_validates_replicas() {
        let gw = Arc::new(cluster());
        let uri = "/api/resources/deployment/shop/web/scale";

        let (status, _) = send(
            app(gw.clone()),
            request("POST", uri, Some(Role::Editor), Some(json!({"replicas": -1}))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            app(gw.clone()),
            request("POST", uri, Some(Role::Editor), Some(json!({"replicas": 5}))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            gw.patches.lock().unwrap()[0].3,
            Patch::Json(json!([{"op": "replace", "path": "/spec/replicas", "value": 5}]))
        );
    }

    #[tokio::test]
    async fn delete_needs_admin_and_reports_missing() {
        let gw = Arc::new(cluster());

        let (status, _) = send(
            app(gw.clone()),
            request("DELETE", "/api/resources/pods/shop/web-1", Some(Role::Editor), None),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            app(gw.clone()),
            request("DELETE", "/api/resources/pods/shop/missing", Some(Role::Admin), None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            app(gw.clone()),
            request("DELETE", "/api/resources/pods/shop/web-1", Some(Role::Admin), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(gw.deletes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn raw_object_as_yaml() {
        let resp = app(Arc::new(cluster()))
            .oneshot(request(
                "GET",
                "/api/resources/deployment/shop/web?format=yaml",
                Some(Role::Viewer),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/yaml");
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("name: web"));
        assert!(text.contains("replicas: 2"));
    }

    #[tokio::test]
    async fn stream_auth_is_checked_before_opening() {
        let gw = Arc::new(cluster());

        let (status, _) = send(app(gw.clone()), request("GET", "/api/stream", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // Viewers are not in the allowed set here
        let restricted = "auth:\n  stream_roles: [editor, admin]\n";
        let uri = format!("/api/stream?token={}", token(Role::Viewer));
        let (status, _) = send(app_with(gw.clone(), restricted), request("GET", &uri, None, None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // An admin narrowing to viewer is refused too
        let uri = format!("/api/stream?token={}&role=viewer", token(Role::Admin));
        let (status, _) = send(app_with(gw.clone(), restricted), request("GET", &uri, None, None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn stream_opens_as_event_stream() {
        let uri = format!("/api/stream?access_token={}", token(Role::Viewer));
        let resp = app(Arc::new(cluster()))
            .oneshot(request("GET", &uri, None, None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/event-stream");
    }

    #[tokio::test]
    async fn traversal_in_object_path_is_rejected() {
        let gw = Arc::new(cluster().with(
            ResourceKind::Secret,
            json!({"metadata": {"name": "db", "namespace": "default"}, "data": {"password": "aHVudGVyMg=="}}),
        ));

        let (status, _) = send(
            app(gw.clone()),
            request("GET", "/api/resources/secrets/default/db", Some(Role::Viewer), None),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(
            app(gw.clone()),
            request(
                "GET",
                "/api/resources/configmaps/default/x%2F..%2F..%2Fsecrets%2Fdb",
                Some(Role::Viewer),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("invalid name"));

        let (status, _) = send(
            app(gw.clone()),
            request(
                "POST",
                "/api/resources/deployments/shop/web%2F..%2F..%2Fsecrets%2Fdb/restart",
                Some(Role::Editor),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            app(gw.clone()),
            request(
                "POST",
                "/api/resources/deployments/..%2Fdefault/web/scale",
                Some(Role::Editor),
                Some(json!({"replicas": 0})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            app(gw.clone()),
            request("DELETE", "/api/resources/pods/shop/%2E%2E", Some(Role::Admin), None),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("\"..\""));

        assert_eq!(gw.calls(), Vec::<String>::new());
        assert!(gw.patches.lock().unwrap().is_empty());
        assert!(gw.deletes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_namespace_query_is_rejected() {
        let gw = Arc::new(cluster());
        for uri in [
            "/api/resources?namespace=..%2F..%2Fsecrets",
            "/api/analyzer/issues?namespace=shop%2Fpods",
            "/api/cluster/pods?namespace=Shop",
            "/api/cluster/deployments?namespace=.",
        ] {
            let (status, _) = send(app(gw.clone()), request("GET", uri, Some(Role::Viewer), None)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        }
        assert_eq!(gw.calls(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn custom_objects_by_namespace() {
        let gw = Arc::new(
            FakeGateway::new()
                .with_custom(json!({"kind": "Certificate", "metadata": {"name": "site-tls", "namespace": "web"}}))
                .with_custom(json!({"kind": "Certificate", "metadata": {"name": "ops-tls", "namespace": "ops"}})),
        );

        let (status, body) = send(
            app(gw.clone()),
            request(
                "GET",
                "/api/custom/cert-manager.io/v1/certificates?namespace=web",
                Some(Role::Viewer),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let items = body["items"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["metadata"]["name"], "site-tls");
        assert_eq!(gw.calls(), vec!["list certificates.cert-manager.io/v1 web".to_string()]);

        let (status, body) = send(
            app(gw.clone()),
            request("GET", "/api/custom/cert-manager.io/v1/certificates", Some(Role::Viewer), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["items"].as_array().unwrap().len(), 2);

        for uri in [
            "/api/custom/..%2F..%2Fapi/v1/secrets",
            "/api/custom/cert-manager.io/v1%2F..%2F..%2F..%2Fapi%2Fv1/secrets",
            "/api/custom/cert-manager.io/v1/certificates%2Fx",
            "/api/custom/cert-manager.io/v1/certificates?namespace=..%2Fkube-system",
        ] {
            let (status, _) = send(app(gw.clone()), request("GET", uri, Some(Role::Viewer), None)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        }
        assert_eq!(gw.calls().len(), 2);
    }

    #[tokio::test]
    async fn healthz_is_open() {
        let (status, body) = send(app(Arc::new(cluster())), request("GET", "/healthz", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["cluster"]["reachable"], true);
    }
}
