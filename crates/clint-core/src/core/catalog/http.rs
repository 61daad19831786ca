use anyhow::{Context, Result};
use clint_domain::catalog::{api_root, collection_uri, resource_uri};
use clint_domain::{Catalog, CatalogResponse, EntityKind};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, LOCATION};
use reqwest::Method;
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::core::config::CatalogConfig;
use crate::core::tooling::OperatorError;

const USER_AGENT: &str = concat!("clint/", env!("CARGO_PKG_VERSION"));

/// Tastypie-style REST catalog.
///
/// Every request carries `format=json`; credentials go in an
/// `Authorization: ApiKey user:key` header and are never logged.
pub struct HttpCatalog {
    client: Client,
    base: Url,
    api_root: String,
    auth: Option<String>,
}

impl HttpCatalog {
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        let raw = config.url.as_deref().ok_or_else(|| {
            OperatorError::new("missing_catalog_url", "catalog URL is not configured")
                .with_hint("Set CLINT_CATALOG_URL or [catalog].url in the config file.")
        })?;
        let base = Url::parse(raw).map_err(|err| {
            OperatorError::new(
                "invalid_catalog_url",
                format!("catalog URL '{raw}' is not valid"),
            )
            .with("url", raw)
            .with("error", err.to_string())
        })?;
        // No timeout unless configured; callers wrap cancellation themselves.
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()
            .context("failed to build catalog http client")?;
        let auth = match (&config.user, &config.api_key) {
            (Some(user), Some(key)) => Some(format!("ApiKey {user}:{key}")),
            _ => None,
        };
        Ok(Self {
            client,
            api_root: api_root(base.path(), &config.api_version),
            base,
            auth,
        })
    }

    /// `path` already carries the mount prefix, via `api_root`.
    fn url(&self, path: &str) -> Url {
        let mut url = self.base.clone();
        url.set_path(path);
        url.set_query(None);
        url.query_pairs_mut().append_pair("format", "json");
        url
    }

    fn send(
        &self,
        method: Method,
        kind: EntityKind,
        url: Url,
        body: Option<&Map<String, Value>>,
    ) -> Result<CatalogResponse> {
        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .header(ACCEPT, "application/json");
        if let Some(auth) = &self.auth {
            request = request.header(AUTHORIZATION, auth);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .with_context(|| format!("{method} {url} failed"))?;
        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let text = response
            .text()
            .with_context(|| format!("reading {method} {url} response"))?;
        debug!(%method, %kind, path = url.path(), status, "catalog request");
        let mut reply = CatalogResponse::new(status, text);
        reply.location = location;
        Ok(reply)
    }
}

impl Catalog for HttpCatalog {
    fn api_root(&self) -> &str {
        &self.api_root
    }

    fn get(&self, kind: EntityKind, id: &str) -> Result<CatalogResponse> {
        let url = self.url(&resource_uri(&self.api_root, kind, id));
        self.send(Method::GET, kind, url, None)
    }

    fn query(&self, kind: EntityKind, filters: &[(&str, &str)]) -> Result<CatalogResponse> {
        let mut url = self.url(&collection_uri(&self.api_root, kind));
        url.query_pairs_mut().extend_pairs(filters.iter().copied());
        self.send(Method::GET, kind, url, None)
    }

    fn post(&self, kind: EntityKind, fields: &Map<String, Value>) -> Result<CatalogResponse> {
        let url = self.url(&collection_uri(&self.api_root, kind));
        self.send(Method::POST, kind, url, Some(fields))
    }

    fn put(
        &self,
        kind: EntityKind,
        id: &str,
        fields: &Map<String, Value>,
    ) -> Result<CatalogResponse> {
        let url = self.url(&resource_uri(&self.api_root, kind, id));
        self.send(Method::PUT, kind, url, Some(fields))
    }
}

#[cfg(test)]
mod tests {
    use std::panic;
    use std::sync::Arc;

    use clint_domain::{Bag, Item, Record, SaveKind, SharedCatalog};
    use httptest::{matchers::*, responders::*, Expectation, Server};
    use serde_json::json;

    use super::*;
    use crate::core::tooling::ReportedError;

    fn server() -> Option<Server> {
        match panic::catch_unwind(Server::run) {
            Ok(server) => Some(server),
            Err(_) => {
                eprintln!("skipping catalog http test (httptest server unavailable)");
                None
            }
        }
    }

    fn catalog(server: &Server, path: &str) -> Result<SharedCatalog> {
        let config = CatalogConfig {
            url: Some(server.url_str(path)),
            api_version: "v1".to_string(),
            user: Some("curator".to_string()),
            api_key: Some("s3cret".to_string()),
            timeout: None,
        };
        Ok(Arc::new(HttpCatalog::new(&config)?))
    }

    #[test]
    fn get_sends_credentials_and_format() -> Result<()> {
        let Some(server) = server() else {
            return Ok(());
        };
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/api/v1/item/I1/"),
                request::query(url_decoded(contains(("format", "json")))),
                request::headers(contains(("authorization", "ApiKey curator:s3cret"))),
            ])
            .respond_with(json_encoded(json!({
                "id": "I1",
                "title": "Scan 1",
                "local_id": "scan-0001",
                "resource_uri": "/api/v1/item/I1/",
            }))),
        );
        let mut item = Record::<Item>::load(catalog(&server, "/")?, "I1")?;
        assert_eq!(item.title()?.as_deref(), Some("Scan 1"));
        Ok(())
    }

    #[test]
    fn create_reads_identity_from_location() -> Result<()> {
        let Some(server) = server() else {
            return Ok(());
        };
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/inventory/api/v1/bag/"),
                request::body(json_decoded(|body: &serde_json::Value| {
                    body["bagname"] == "scan-0001" && body["item"] == "/inventory/api/v1/item/I1/"
                })),
            ])
            .respond_with(
                status_code(201)
                    .insert_header("Location", "http://catalog.example/inventory/api/v1/bag/B1/"),
            ),
        );
        server.expect(
            Expectation::matching(request::method_path("PUT", "/inventory/api/v1/bag/B1/"))
                .respond_with(status_code(204)),
        );
        let mut bag = Record::<Bag>::new(catalog(&server, "/inventory/")?);
        bag.set_bagname("scan-0001")?;
        bag.set_item("I1")?;
        assert_eq!(bag.save()?, SaveKind::Created);
        assert_eq!(bag.id(), Some("B1"));
        bag.set_path("/bags/scan-0001")?;
        assert_eq!(bag.save()?, SaveKind::Updated);
        Ok(())
    }

    #[test]
    fn missing_ids_fall_back_to_the_alternate_key() -> Result<()> {
        let Some(server) = server() else {
            return Ok(());
        };
        server.expect(
            Expectation::matching(request::method_path("GET", "/api/v1/bag/scan-0001/"))
                .respond_with(status_code(404)),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/api/v1/bag/"),
                request::query(url_decoded(contains(("bagname", "scan-0001")))),
            ])
            .respond_with(json_encoded(json!({
                "meta": { "total_count": 1 },
                "objects": [{ "id": "B4", "bagname": "scan-0001" }],
            }))),
        );
        let bag = Record::<Bag>::load(catalog(&server, "/")?, "scan-0001")?;
        assert_eq!(bag.id(), Some("B4"));
        Ok(())
    }

    #[test]
    fn missing_url_is_an_operator_error() {
        let config = CatalogConfig::default();
        let err = HttpCatalog::new(&config)
            .err()
            .expect("url is required");
        let operator = err.downcast_ref::<OperatorError>().expect("operator error");
        assert_eq!(operator.reason(), "missing_catalog_url");
        assert!(operator.details().contains_key("hint"));
    }
}
