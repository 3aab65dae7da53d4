use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::IgnoredAny;
use serde_json::Value;
use std::collections::BTreeMap;
use std::env;
use std::error::Error as StdError;

use age_guard_core::{PackageMetadata, PackageVersion, RegistryClient, RegistryError};

const DEFAULT_REGISTRY_BASE_URL: &str = "https://registry.npmjs.org";
const REGISTRY_KEY: &str = "npm";

#[derive(Clone)]
pub struct NpmRegistryClient {
    http: Client,
    base_url: String,
}

impl Default for NpmRegistryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl NpmRegistryClient {
    pub fn new() -> Self {
        Self::with_http_client(Client::new())
    }

    pub fn with_http_client(http: Client) -> Self {
        let base_url = env::var("AGE_GUARD_NPM_REGISTRY_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_REGISTRY_BASE_URL.to_string());
        Self { http, base_url }
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
        }
    }

    fn encode_package_name(package: &str) -> String {
        package.replace('/', "%2f")
    }
}

#[async_trait]
impl RegistryClient for NpmRegistryClient {
    fn registry(&self) -> &'static str {
        REGISTRY_KEY
    }

    async fn fetch_package(&self, package: &str) -> Result<PackageMetadata, RegistryError> {
        let encoded_name = Self::encode_package_name(package);
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), encoded_name);
        tracing::debug!(%url, "fetching package metadata");

        let response = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| reqwest_transport_error("unable to query npm registry", &url, e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound {
                registry: REGISTRY_KEY,
                package: package.to_string(),
            });
        }

        if !response.status().is_success() {
            return Err(RegistryError::Transport {
                message: format!("npm registry returned status {}", response.status()),
            });
        }

        let body: NpmPackageResponse =
            response
                .json()
                .await
                .map_err(|e| RegistryError::InvalidResponse {
                    message: format!("failed to parse npm response JSON: {e}"),
                })?;

        Ok(body.into_metadata(package))
    }
}

#[derive(Debug, Deserialize)]
struct NpmPackageResponse {
    #[serde(rename = "dist-tags", default)]
    dist_tags: BTreeMap<String, String>,
    #[serde(default)]
    versions: BTreeMap<String, IgnoredAny>,
    #[serde(default)]
    time: BTreeMap<String, Value>,
}

impl NpmPackageResponse {
    fn into_metadata(self, package: &str) -> PackageMetadata {
        let time = self.time;
        let versions = self
            .versions
            .into_keys()
            .map(|version| {
                let published = time
                    .get(&version)
                    .and_then(Value::as_str)
                    .and_then(parse_publish_time);
                if published.is_none() {
                    tracing::debug!(package, %version, "missing or invalid publish time");
                }
                let entry = PackageVersion {
                    version: version.clone(),
                    published,
                };
                (version, entry)
            })
            .collect();

        PackageMetadata {
            name: package.to_string(),
            latest: self.dist_tags.get("latest").cloned(),
            dist_tags: self.dist_tags,
            versions,
        }
    }
}

fn parse_publish_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|value| value.with_timezone(&Utc))
}

fn reqwest_transport_error(
    context: &str,
    request_url: &str,
    error: reqwest::Error,
) -> RegistryError {
    let mut details = vec![format!("request_url={request_url}")];

    let mut kinds = Vec::new();
    if error.is_timeout() {
        kinds.push("timeout");
    }
    if error.is_connect() {
        kinds.push("connect");
    }
    if error.is_request() {
        kinds.push("request");
    }
    if error.is_body() {
        kinds.push("body");
    }
    if error.is_decode() {
        kinds.push("decode");
    }
    if kinds.is_empty() {
        kinds.push("unknown");
    }
    details.push(format!("kinds={}", kinds.join(",")));

    let mut sources = Vec::new();
    let mut current = error.source();
    while let Some(source) = current {
        sources.push(source.to_string());
        if sources.len() >= 4 {
            break;
        }
        current = source.source();
    }
    if !sources.is_empty() {
        details.push(format!("source_chain={}", sources.join(" | ")));
    }

    details.push(
        "hint=set AGE_GUARD_NPM_REGISTRY_BASE_URL when a registry mirror is required".to_string(),
    );

    RegistryError::Transport {
        message: format!("{context}: {error}; {}", details.join("; ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn scoped_names_keep_at_sign_and_escape_slash() {
        assert_eq!(
            NpmRegistryClient::encode_package_name("@types/node"),
            "@types%2fnode"
        );
        assert_eq!(NpmRegistryClient::encode_package_name("lodash"), "lodash");
    }

    #[tokio::test]
    async fn parses_versions_times_and_dist_tags() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/demo-lib"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "demo-lib",
                "dist-tags": { "latest": "1.1.0", "next": "2.0.0-beta.1" },
                "versions": {
                    "1.0.0": { "scripts": {} },
                    "1.1.0": {},
                    "2.0.0-beta.1": {}
                },
                "time": {
                    "created": "2023-12-01T00:00:00.000Z",
                    "modified": "2024-05-01T00:00:00.000Z",
                    "1.0.0": "2024-01-01T00:00:00.000Z",
                    "1.1.0": "not a timestamp"
                }
            })))
            .mount(&mock_server)
            .await;

        let client = NpmRegistryClient::with_base_url(mock_server.uri());
        let metadata = client.fetch_package("demo-lib").await.expect("metadata");

        assert_eq!(metadata.name, "demo-lib");
        assert_eq!(metadata.latest.as_deref(), Some("1.1.0"));
        assert_eq!(
            metadata.dist_tags.get("next").map(String::as_str),
            Some("2.0.0-beta.1")
        );
        assert_eq!(metadata.versions.len(), 3);
        assert_eq!(
            metadata.published("1.0.0").map(|value| value.to_rfc3339()),
            Some("2024-01-01T00:00:00+00:00".to_string())
        );
        assert_eq!(metadata.published("1.1.0"), None);
        assert_eq!(metadata.published("2.0.0-beta.1"), None);
        assert!(!metadata.versions.contains_key("created"));
    }

    #[tokio::test]
    async fn requests_scoped_packages_with_escaped_slash() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/@scope%2fpkg"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "dist-tags": { "latest": "0.1.0" },
                "versions": { "0.1.0": {} },
                "time": { "0.1.0": "2024-01-01T00:00:00Z" }
            })))
            .mount(&mock_server)
            .await;

        let client = NpmRegistryClient::with_base_url(format!("{}/", mock_server.uri()));
        let metadata = client.fetch_package("@scope/pkg").await.expect("metadata");
        assert_eq!(metadata.name, "@scope/pkg");
        assert_eq!(metadata.latest.as_deref(), Some("0.1.0"));
    }

    #[tokio::test]
    async fn maps_404_to_not_found() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let client = NpmRegistryClient::with_base_url(mock_server.uri());
        let err = client.fetch_package("missing").await.expect_err("404");
        assert!(matches!(err, RegistryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn maps_5xx_to_transport_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let client = NpmRegistryClient::with_base_url(mock_server.uri());
        let err = client.fetch_package("flaky").await.expect_err("503");
        assert!(matches!(err, RegistryError::Transport { .. }));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn malformed_json_is_invalid_response() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(r#"{"versions": ["#, "application/json"),
            )
            .mount(&mock_server)
            .await;

        let client = NpmRegistryClient::with_base_url(mock_server.uri());
        let err = client.fetch_package("broken").await.expect_err("bad json");
        assert!(matches!(err, RegistryError::InvalidResponse { .. }));
    }
}
