//! Google Cloud implementation of `ControlPlaneClient`.
//!
//! Services map to Cloud Run Admin API v2 resources and the database to
//! a Cloud SQL Admin API v1 instance:
//!
//! ```text
//! deploy_service            GET + PATCH  run  v2/projects/{p}/locations/{r}/services/{s}, poll operation
//! update_traffic            GET + PATCH  run  (traffic = 100% LATEST), poll operation
//! patch_database_activation PATCH        sql  v1/projects/{p}/instances/{db}, poll until DONE
//! list_revisions            GET          run  .../services/{s}/revisions (paged) + service traffic
//! delete_revision           DELETE       run  .../services/{s}/revisions/{id}
//! ```
//!
//! The bearer token is supplied by the caller and never refreshed here.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tracing::{debug, info};

use fleet_core::{
    ActivationPolicy, DatabaseInstance, ExecutionSettings, ManagedService, Revision, RevisionId,
    TrafficTarget,
};

use crate::client::ControlPlaneClient;
use crate::error::{ControlPlaneError, ControlPlaneResult, classify_rpc_code, classify_status};
use crate::transport::{HttpResponse, HttpsTransport};

const RUN_ENDPOINT: &str = "https://run.googleapis.com";
const SQL_ENDPOINT: &str = "https://sqladmin.googleapis.com";
/// Template label changed on every deploy so each rollout creates a revision.
const ROLLOUT_LABEL: &str = "fleet-rollout";

/// Base URLs of the two admin APIs, overridable for tests.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub run: String,
    pub sql: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            run: RUN_ENDPOINT.to_string(),
            sql: SQL_ENDPOINT.to_string(),
        }
    }
}

pub struct GoogleCloudClient {
    http: HttpsTransport,
    token: String,
    endpoints: Endpoints,
    poll_interval: Duration,
}

impl GoogleCloudClient {
    pub fn new(token: impl Into<String>, settings: &ExecutionSettings) -> ControlPlaneResult<Self> {
        Ok(Self {
            http: HttpsTransport::with_webpki_roots(settings.call_timeout)?,
            token: token.into(),
            endpoints: Endpoints::default(),
            poll_interval: settings.poll_interval,
        })
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    fn service_url(&self, service: &ManagedService) -> String {
        format!(
            "{}/v2/projects/{}/locations/{}/services/{}",
            self.endpoints.run, service.project, service.region, service.name
        )
    }

    async fn call(
        &self,
        method: http::Method,
        url: &str,
        body: Option<&Value>,
    ) -> ControlPlaneResult<Value> {
        let response = self.http.send(method, url, Some(&self.token), body).await?;
        ok_json(response)
    }

    async fn get_service(&self, service: &ManagedService) -> ControlPlaneResult<Value> {
        self.call(http::Method::GET, &self.service_url(service), None).await
    }

    /// Write back a modified service and wait for the rollout to finish.
    async fn replace_service(&self, service: &ManagedService, body: &Value) -> ControlPlaneResult<()> {
        let operation = self
            .call(http::Method::PATCH, &self.service_url(service), Some(body))
            .await?;
        self.wait_run_operation(operation).await
    }

    /// Poll a Cloud Run long-running operation until `done`.
    async fn wait_run_operation(&self, mut operation: Value) -> ControlPlaneResult<()> {
        loop {
            if operation["done"].as_bool().unwrap_or(false) {
                if let Some(error) = operation.get("error") {
                    return Err(classify_rpc_code(
                        error["code"].as_i64().unwrap_or(2),
                        error["message"].as_str().unwrap_or("operation failed"),
                    ));
                }
                return Ok(());
            }

            let name = operation["name"].as_str().ok_or_else(|| {
                ControlPlaneError::Permanent("operation response has no name".to_string())
            })?;
            let url = format!("{}/v2/{}", self.endpoints.run, name);
            tokio::time::sleep(self.poll_interval).await;
            debug!(operation = name, "polling run operation");
            operation = self.call(http::Method::GET, &url, None).await?;
        }
    }

    /// Poll a Cloud SQL operation until its status is `DONE`.
    async fn wait_sql_operation(&self, project: &str, mut operation: Value) -> ControlPlaneResult<()> {
        loop {
            if operation["status"].as_str() == Some("DONE") {
                if let Some(first) = operation["error"]["errors"].as_array().and_then(|e| e.first()) {
                    return Err(ControlPlaneError::Permanent(format!(
                        "{}: {}",
                        first["code"].as_str().unwrap_or("ERROR"),
                        first["message"].as_str().unwrap_or("operation failed")
                    )));
                }
                return Ok(());
            }

            let name = operation["name"].as_str().ok_or_else(|| {
                ControlPlaneError::Permanent("sql operation response has no name".to_string())
            })?;
            let url = format!("{}/v1/projects/{project}/operations/{name}", self.endpoints.sql);
            tokio::time::sleep(self.poll_interval).await;
            debug!(operation = name, "polling sql operation");
            operation = self.call(http::Method::GET, &url, None).await?;
        }
    }
}

#[async_trait]
impl ControlPlaneClient for GoogleCloudClient {
    async fn deploy_service(
        &self,
        service: &ManagedService,
        min_instances: u32,
    ) -> ControlPlaneResult<RevisionId> {
        let mut body = self.get_service(service).await?;
        let nonce = Utc::now().timestamp_millis().to_string();
        apply_deploy(&mut body, service, min_instances, &nonce)?;

        info!(service = %service.name, min_instances, image = %service.image, "deploying");
        self.replace_service(service, &body).await?;

        let updated = self.get_service(service).await?;
        updated["latestCreatedRevision"]
            .as_str()
            .map(short_name)
            .ok_or_else(|| {
                ControlPlaneError::Transient(format!(
                    "service {} reports no latest revision yet",
                    service.name
                ))
            })
    }

    async fn update_traffic(
        &self,
        service: &ManagedService,
        target: &TrafficTarget,
    ) -> ControlPlaneResult<()> {
        let mut body = self.get_service(service).await?;
        body["traffic"] = traffic_body(target);
        info!(service = %service.name, %target, "routing traffic");
        self.replace_service(service, &body).await
    }

    async fn patch_database_activation(
        &self,
        database: &DatabaseInstance,
        policy: ActivationPolicy,
    ) -> ControlPlaneResult<()> {
        let url = format!(
            "{}/v1/projects/{}/instances/{}",
            self.endpoints.sql, database.project, database.name
        );
        let body = json!({ "settings": { "activationPolicy": policy.as_str() } });

        info!(database = %database.name, %policy, "patching activation policy");
        let operation = self.call(http::Method::PATCH, &url, Some(&body)).await?;
        self.wait_sql_operation(&database.project, operation).await
    }

    async fn list_revisions(&self, service: &ManagedService) -> ControlPlaneResult<Vec<Revision>> {
        let svc = self.get_service(service).await?;
        let mut raw = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = format!("{}/revisions?pageSize=100", self.service_url(service));
            if let Some(token) = &page_token {
                url.push_str("&pageToken=");
                url.push_str(&encode_query_value(token));
            }
            let page = self.call(http::Method::GET, &url, None).await?;
            if let Some(items) = page["revisions"].as_array() {
                raw.extend(items.iter().cloned());
            }
            match page["nextPageToken"].as_str() {
                Some(token) if !token.is_empty() => page_token = Some(token.to_string()),
                _ => break,
            }
        }

        parse_revisions(&service.name, &svc, &raw)
    }

    async fn delete_revision(
        &self,
        service: &ManagedService,
        revision_id: &str,
    ) -> ControlPlaneResult<()> {
        let url = format!("{}/revisions/{revision_id}", self.service_url(service));
        let response = self
            .http
            .send(http::Method::DELETE, &url, Some(&self.token), None)
            .await?;

        if response.status == 404 {
            return Err(ControlPlaneError::AlreadyAbsent(format!(
                "{}/{revision_id}",
                service.name
            )));
        }
        ok_json(response).map(|_| ())
    }
}

fn ok_json(response: HttpResponse) -> ControlPlaneResult<Value> {
    if response.is_success() {
        response.json()
    } else {
        Err(classify_status(response.status, &response.error_message()))
    }
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
fn encode_query_value(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

/// Last path segment of a resource name.
fn short_name(name: &str) -> String {
    name.rsplit('/').next().unwrap_or(name).to_string()
}

/// Set image, instance floor, resources and rollout label on a service template.
fn apply_deploy(
    body: &mut Value,
    service: &ManagedService,
    min_instances: u32,
    nonce: &str,
) -> ControlPlaneResult<()> {
    let template = body
        .get_mut("template")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| {
            ControlPlaneError::Permanent(format!("service {} has no template", service.name))
        })?;

    if let Some(scaling) = template.entry("scaling").or_insert_with(|| json!({})).as_object_mut() {
        scaling.insert("minInstanceCount".to_string(), json!(min_instances));
    }
    if let Some(labels) = template.entry("labels").or_insert_with(|| json!({})).as_object_mut() {
        labels.insert(ROLLOUT_LABEL.to_string(), json!(nonce));
    }
    // Let the control plane name the new revision.
    template.remove("revision");

    let container = template
        .get_mut("containers")
        .and_then(Value::as_array_mut)
        .and_then(|c| c.first_mut())
        .and_then(Value::as_object_mut)
        .ok_or_else(|| {
            ControlPlaneError::Permanent(format!("service {} has no container", service.name))
        })?;
    container.insert("image".to_string(), json!(service.image));

    if !service.resources.is_empty() {
        let resources = container.entry("resources").or_insert_with(|| json!({}));
        if let Some(limits) = resources
            .as_object_mut()
            .and_then(|r| r.entry("limits").or_insert_with(|| json!({})).as_object_mut())
        {
            if let Some(cpu) = &service.resources.cpu {
                limits.insert("cpu".to_string(), json!(cpu));
            }
            if let Some(memory) = &service.resources.memory {
                limits.insert("memory".to_string(), json!(memory));
            }
        }
    }

    Ok(())
}

fn traffic_body(target: &TrafficTarget) -> Value {
    match target {
        TrafficTarget::Latest => json!([{
            "type": "TRAFFIC_TARGET_ALLOCATION_TYPE_LATEST",
            "percent": 100
        }]),
        TrafficTarget::Revision(id) => json!([{
            "type": "TRAFFIC_TARGET_ALLOCATION_TYPE_REVISION",
            "revision": id,
            "percent": 100
        }]),
    }
}

/// Join raw revisions with the service's traffic statuses.
fn parse_revisions(service_name: &str, service: &Value, raw: &[Value]) -> ControlPlaneResult<Vec<Revision>> {
    let latest_ready = service["latestReadyRevision"].as_str().map(short_name);

    let mut traffic: HashMap<String, u8> = HashMap::new();
    for status in service["trafficStatuses"].as_array().into_iter().flatten() {
        let percent = status["percent"].as_u64().unwrap_or(0).min(100) as u8;
        let revision = match status["revision"].as_str().filter(|r| !r.is_empty()) {
            Some(r) => Some(short_name(r)),
            None if status["type"].as_str() == Some("TRAFFIC_TARGET_ALLOCATION_TYPE_LATEST") => {
                latest_ready.clone()
            }
            None => None,
        };
        if let Some(revision) = revision {
            let entry = traffic.entry(revision).or_insert(0);
            *entry = entry.saturating_add(percent).min(100);
        }
    }

    raw.iter()
        .map(|r| {
            let id = r["name"].as_str().map(short_name).ok_or_else(|| {
                ControlPlaneError::Permanent("revision without a name".to_string())
            })?;
            let created = r["createTime"].as_str().unwrap_or_default();
            let created_at = DateTime::parse_from_rfc3339(created)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| {
                    ControlPlaneError::Permanent(format!("revision {id} has bad createTime '{created}': {e}"))
                })?;

            Ok(Revision {
                service_name: service_name.to_string(),
                traffic_percent: traffic.get(&id).copied().unwrap_or(0),
                is_latest: latest_ready.as_deref() == Some(id.as_str()),
                revision_id: id,
                created_at,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::ResourceOverrides;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    const SERVICE_PATH: &str = "/v2/projects/geo/locations/europe-west8/services/geoserver";
    const REVISIONS: &str = "projects/geo/locations/europe-west8/services/geoserver/revisions";

    /// A request seen by the local admin API.
    struct Captured {
        line: String,
        body: String,
    }

    impl Captured {
        fn json(&self) -> Value {
            serde_json::from_str(&self.body).unwrap()
        }
    }

    async fn read_request(socket: &mut TcpStream) -> Captured {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            let Some(end) = text.find("\r\n\r\n") else {
                assert!(n > 0, "connection closed mid-request");
                continue;
            };
            let length = text[..end]
                .lines()
                .filter_map(|l| l.split_once(':'))
                .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length || n == 0 {
                return Captured {
                    line: text.lines().next().unwrap_or_default().to_string(),
                    body: text[end + 4..].to_string(),
                };
            }
        }
    }

    /// Answer one request per connection with `responses`, in order, and
    /// hand back every request received.
    async fn admin_api(responses: Vec<(u16, Value)>) -> (GoogleCloudClient, JoinHandle<Vec<Captured>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let mut captured = Vec::new();
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                captured.push(read_request(&mut socket).await);
                let body = body.to_string();
                let response = format!(
                    "HTTP/1.1 {status} STUB\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
            }
            captured
        });

        let settings = ExecutionSettings {
            call_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(1),
            ..ExecutionSettings::default()
        };
        let client = GoogleCloudClient::new("t0ken", &settings)
            .unwrap()
            .with_endpoints(Endpoints {
                run: base.clone(),
                sql: base,
            });
        (client, server)
    }

    async fn requests(server: JoinHandle<Vec<Captured>>) -> Vec<Captured> {
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("admin api did not receive every expected request")
            .unwrap()
    }

    fn database() -> DatabaseInstance {
        DatabaseInstance {
            name: "geodb".to_string(),
            project: "geo".to_string(),
            activation_policy: ActivationPolicy::Always,
        }
    }

    fn service() -> ManagedService {
        ManagedService {
            name: "geoserver".to_string(),
            image: "europe-west8-docker.pkg.dev/geo/images/geoserver:2.24".to_string(),
            region: "europe-west8".to_string(),
            project: "geo".to_string(),
            min_instances: 1,
            resources: ResourceOverrides {
                cpu: Some("2".to_string()),
                memory: Some("4Gi".to_string()),
            },
            depends_on_database: true,
            ready_url: None,
        }
    }

    #[test]
    fn apply_deploy_rewrites_template() {
        let mut body = json!({
            "name": "projects/geo/locations/europe-west8/services/geoserver",
            "template": {
                "revision": "geoserver-00007-abc",
                "scaling": { "maxInstanceCount": 3 },
                "containers": [{ "image": "old:1", "resources": { "limits": { "cpu": "1" } } }]
            }
        });

        apply_deploy(&mut body, &service(), 0, "1700000000000").unwrap();

        let template = &body["template"];
        assert_eq!(template["scaling"]["minInstanceCount"], 0);
        assert_eq!(template["scaling"]["maxInstanceCount"], 3);
        assert_eq!(template["labels"][ROLLOUT_LABEL], "1700000000000");
        assert!(template.get("revision").is_none());
        let container = &template["containers"][0];
        assert_eq!(container["image"], "europe-west8-docker.pkg.dev/geo/images/geoserver:2.24");
        assert_eq!(container["resources"]["limits"]["cpu"], "2");
        assert_eq!(container["resources"]["limits"]["memory"], "4Gi");
    }

    #[test]
    fn apply_deploy_without_template_is_permanent() {
        let mut body = json!({ "name": "x" });
        let err = apply_deploy(&mut body, &service(), 1, "n").unwrap_err();
        assert!(matches!(err, ControlPlaneError::Permanent(_)));
    }

    #[test]
    fn traffic_to_latest() {
        let body = traffic_body(&TrafficTarget::Latest);
        assert_eq!(body[0]["type"], "TRAFFIC_TARGET_ALLOCATION_TYPE_LATEST");
        assert_eq!(body[0]["percent"], 100);
    }

    #[test]
    fn parse_revisions_joins_traffic() {
        let svc = json!({
            "latestReadyRevision": "projects/geo/locations/europe-west8/services/geoserver/revisions/geoserver-00003-c",
            "trafficStatuses": [
                { "type": "TRAFFIC_TARGET_ALLOCATION_TYPE_LATEST", "percent": 90 },
                { "type": "TRAFFIC_TARGET_ALLOCATION_TYPE_REVISION", "revision": "geoserver-00001-a", "percent": 10 }
            ]
        });
        let raw = vec![
            json!({ "name": "projects/geo/locations/europe-west8/services/geoserver/revisions/geoserver-00001-a", "createTime": "2024-05-01T10:00:00Z" }),
            json!({ "name": "projects/geo/locations/europe-west8/services/geoserver/revisions/geoserver-00002-b", "createTime": "2024-05-02T10:00:00Z" }),
            json!({ "name": "projects/geo/locations/europe-west8/services/geoserver/revisions/geoserver-00003-c", "createTime": "2024-05-03T10:00:00.123456Z" }),
        ];

        let revisions = parse_revisions("geoserver", &svc, &raw).unwrap();
        assert_eq!(revisions.len(), 3);
        assert_eq!(revisions[0].revision_id, "geoserver-00001-a");
        assert_eq!(revisions[0].traffic_percent, 10);
        assert_eq!(revisions[1].traffic_percent, 0);
        assert!(!revisions[1].is_latest);
        assert_eq!(revisions[2].traffic_percent, 90);
        assert!(revisions[2].is_latest);
    }

    #[test]
    fn parse_revisions_rejects_bad_timestamp() {
        let raw = vec![json!({ "name": "r-1", "createTime": "yesterday" })];
        assert!(parse_revisions("svc", &json!({}), &raw).is_err());
    }

    #[test]
    fn page_tokens_are_percent_encoded() {
        assert_eq!(encode_query_value("CgRz-ZQ_~.1"), "CgRz-ZQ_~.1");
        assert_eq!(encode_query_value("a+b/c=="), "a%2Bb%2Fc%3D%3D");
        assert_eq!(encode_query_value("x&pageSize=1"), "x%26pageSize%3D1");
    }

    #[test]
    fn short_name_takes_last_segment() {
        assert_eq!(short_name("projects/p/locations/r/services/s/revisions/s-001"), "s-001");
        assert_eq!(short_name("s-001"), "s-001");
    }

    #[tokio::test]
    async fn deploy_polls_operation_and_returns_latest_revision() {
        let (client, server) = admin_api(vec![
            (200, json!({
                "name": "projects/geo/locations/europe-west8/services/geoserver",
                "template": { "containers": [{ "image": "old:1" }] }
            })),
            (200, json!({ "name": "projects/geo/locations/europe-west8/operations/op-1", "done": false })),
            (200, json!({ "name": "projects/geo/locations/europe-west8/operations/op-1", "done": true })),
            (200, json!({ "latestCreatedRevision": format!("{REVISIONS}/geoserver-00008-xyz") })),
        ])
        .await;

        let revision = client.deploy_service(&service(), 0).await.unwrap();

        assert_eq!(revision, "geoserver-00008-xyz");
        let seen = requests(server).await;
        let lines: Vec<&str> = seen.iter().map(|c| c.line.as_str()).collect();
        assert_eq!(
            lines,
            vec![
                format!("GET {SERVICE_PATH} HTTP/1.1"),
                format!("PATCH {SERVICE_PATH} HTTP/1.1"),
                "GET /v2/projects/geo/locations/europe-west8/operations/op-1 HTTP/1.1".to_string(),
                format!("GET {SERVICE_PATH} HTTP/1.1"),
            ]
        );
        let patched = seen[1].json();
        assert_eq!(patched["template"]["containers"][0]["image"], service().image);
        assert_eq!(patched["template"]["scaling"]["minInstanceCount"], 0);
    }

    #[tokio::test]
    async fn failed_run_operation_is_classified_by_rpc_code() {
        let (client, server) = admin_api(vec![
            (200, json!({ "template": { "containers": [{ "image": "old:1" }] } })),
            (200, json!({
                "name": "projects/geo/locations/europe-west8/operations/op-2",
                "done": true,
                "error": { "code": 14, "message": "backend unavailable" }
            })),
            (200, json!({ "template": {}, "traffic": [] })),
            (200, json!({
                "name": "projects/geo/locations/europe-west8/operations/op-3",
                "done": true,
                "error": { "code": 9, "message": "revision not ready" }
            })),
        ])
        .await;

        let deploy = client.deploy_service(&service(), 1).await.unwrap_err();
        assert!(deploy.is_transient(), "{deploy}");

        let traffic = client
            .update_traffic(&service(), &TrafficTarget::Latest)
            .await
            .unwrap_err();
        assert!(matches!(traffic, ControlPlaneError::Permanent(ref m) if m.contains("revision not ready")));

        let seen = requests(server).await;
        assert_eq!(seen[3].json()["traffic"][0]["type"], "TRAFFIC_TARGET_ALLOCATION_TYPE_LATEST");
    }

    #[tokio::test]
    async fn database_patch_polls_until_done() {
        let (client, server) = admin_api(vec![
            (200, json!({ "name": "op-9", "status": "PENDING" })),
            (200, json!({ "name": "op-9", "status": "RUNNING" })),
            (200, json!({ "name": "op-9", "status": "DONE" })),
        ])
        .await;

        client
            .patch_database_activation(&database(), ActivationPolicy::Never)
            .await
            .unwrap();

        let seen = requests(server).await;
        assert_eq!(seen[0].line, "PATCH /v1/projects/geo/instances/geodb HTTP/1.1");
        assert_eq!(seen[0].json()["settings"]["activationPolicy"], "NEVER");
        assert_eq!(seen[1].line, "GET /v1/projects/geo/operations/op-9 HTTP/1.1");
        assert_eq!(seen[2].line, "GET /v1/projects/geo/operations/op-9 HTTP/1.1");
    }

    #[tokio::test]
    async fn database_operation_error_is_permanent() {
        let (client, server) = admin_api(vec![(
            200,
            json!({
                "name": "op-10",
                "status": "DONE",
                "error": { "errors": [{ "code": "INVALID_REQUEST", "message": "instance is stopped" }] }
            }),
        )])
        .await;

        let err = client
            .patch_database_activation(&database(), ActivationPolicy::Always)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ControlPlaneError::Permanent("INVALID_REQUEST: instance is stopped".to_string())
        );
        requests(server).await;
    }

    #[tokio::test]
    async fn list_revisions_follows_page_tokens() {
        let (client, server) = admin_api(vec![
            (200, json!({
                "latestReadyRevision": format!("{REVISIONS}/geoserver-00002-b"),
                "trafficStatuses": [{ "type": "TRAFFIC_TARGET_ALLOCATION_TYPE_LATEST", "percent": 100 }]
            })),
            (200, json!({
                "revisions": [{ "name": format!("{REVISIONS}/geoserver-00001-a"), "createTime": "2024-05-01T10:00:00Z" }],
                "nextPageToken": "a+b/c=="
            })),
            (200, json!({
                "revisions": [{ "name": format!("{REVISIONS}/geoserver-00002-b"), "createTime": "2024-05-02T10:00:00Z" }]
            })),
        ])
        .await;

        let revisions = client.list_revisions(&service()).await.unwrap();

        let ids: Vec<&str> = revisions.iter().map(|r| r.revision_id.as_str()).collect();
        assert_eq!(ids, vec!["geoserver-00001-a", "geoserver-00002-b"]);
        assert!(revisions[1].is_latest);
        assert_eq!(revisions[1].traffic_percent, 100);
        assert_eq!(revisions[0].traffic_percent, 0);

        let seen = requests(server).await;
        assert_eq!(seen[1].line, format!("GET {SERVICE_PATH}/revisions?pageSize=100 HTTP/1.1"));
        assert_eq!(
            seen[2].line,
            format!("GET {SERVICE_PATH}/revisions?pageSize=100&pageToken=a%2Bb%2Fc%3D%3D HTTP/1.1")
        );
    }

    #[tokio::test]
    async fn delete_maps_not_found_to_already_absent() {
        let (client, server) = admin_api(vec![
            (404, json!({ "error": { "code": 404, "message": "revision not found" } })),
            (403, json!({ "error": { "code": 403, "message": "caller lacks run.revisions.delete" } })),
        ])
        .await;

        let gone = client.delete_revision(&service(), "geoserver-00001-a").await;
        assert_eq!(
            gone,
            Err(ControlPlaneError::AlreadyAbsent("geoserver/geoserver-00001-a".to_string()))
        );
        let denied = client
            .delete_revision(&service(), "geoserver-00002-b")
            .await
            .unwrap_err();
        assert!(matches!(denied, ControlPlaneError::Permanent(ref m) if m.contains("run.revisions.delete")));

        let seen = requests(server).await;
        assert_eq!(
            seen[0].line,
            format!("DELETE {SERVICE_PATH}/revisions/geoserver-00001-a HTTP/1.1")
        );
    }
}
