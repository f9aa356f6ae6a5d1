// REST collaborator
//
// Wraps `reqwest::Client` with collection URL construction and error-body
// extraction. Every record type goes through the same four verbs; the
// `ResourceApi` trait is the seam the sync core consumes.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::model::{EntityId, Organization, OrganizationOption, Resource, Staff};
use crate::transport::TransportConfig;

/// CRUD operations for one record type.
///
/// Implemented by [`RestClient`] for every [`Resource`]; tests substitute
/// in-memory fakes.
#[async_trait]
pub trait ResourceApi<R: Resource>: Send + Sync + 'static {
    /// One authoritative read of the whole collection.
    async fn read_all(&self) -> Result<Vec<R>, Error>;

    async fn fetch(&self, id: &EntityId) -> Result<R, Error>;

    async fn create(&self, draft: &R::Draft) -> Result<R, Error>;

    async fn update(&self, id: &EntityId, patch: &R::Patch) -> Result<R, Error>;

    async fn delete(&self, id: &EntityId) -> Result<(), Error>;
}

/// The full office API: CRUD for both record types plus the lookup
/// endpoints pickers and filtered views use.
#[async_trait]
pub trait OfficeApi: ResourceApi<Organization> + ResourceApi<Staff> {
    /// `GET /organizations/dropdown`: `{_id, name}` pairs for pickers.
    async fn organization_options(&self) -> Result<Vec<OrganizationOption>, Error>;

    /// `GET /staff?organization={id}`: staff of a single organization.
    async fn staff_for_organization(&self, organization: &EntityId) -> Result<Vec<Staff>, Error>;
}

/// HTTP client for the office management REST API.
///
/// Records are returned bare (no envelope). Failures carry the server's
/// `message` field when the body has one.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
    transport: TransportConfig,
}

impl RestClient {
    /// Create a client rooted at `base_url` (e.g. `http://localhost:3000/api`).
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            base_url,
            transport: transport.clone(),
        })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            transport: TransportConfig::default(),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builder ──────────────────────────────────────────────────

    /// Append path segments to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    // ── Request helpers ──────────────────────────────────────────────

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {}", url);
        let resp = self.send(self.http.get(url)).await?;
        read_json(resp).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
        body: &(impl Serialize + Sync),
    ) -> Result<T, Error> {
        let resp = self.send(builder.json(body)).await?;
        read_json(resp).await
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, Error> {
        builder.send().await.map_err(|e| self.transport.classify(e))
    }
}

#[async_trait]
impl<R: Resource> ResourceApi<R> for RestClient {
    async fn read_all(&self) -> Result<Vec<R>, Error> {
        let url = self.endpoint(&[R::PATH])?;
        self.get_json(url).await
    }

    async fn fetch(&self, id: &EntityId) -> Result<R, Error> {
        let url = self.endpoint(&[R::PATH, id.as_str()])?;
        self.get_json(url).await
    }

    async fn create(&self, draft: &R::Draft) -> Result<R, Error> {
        let url = self.endpoint(&[R::PATH])?;
        debug!("POST {}", url);
        self.send_json(self.http.post(url), draft).await
    }

    async fn update(&self, id: &EntityId, patch: &R::Patch) -> Result<R, Error> {
        let url = self.endpoint(&[R::PATH, id.as_str()])?;
        debug!("PUT {}", url);
        self.send_json(self.http.put(url), patch).await
    }

    async fn delete(&self, id: &EntityId) -> Result<(), Error> {
        let url = self.endpoint(&[R::PATH, id.as_str()])?;
        debug!("DELETE {}", url);
        let resp = self.send(self.http.delete(url)).await?;
        check_status(resp).await?;
        Ok(())
    }
}

#[async_trait]
impl OfficeApi for RestClient {
    async fn organization_options(&self) -> Result<Vec<OrganizationOption>, Error> {
        let url = self.endpoint(&[Organization::PATH, "dropdown"])?;
        self.get_json(url).await
    }

    async fn staff_for_organization(&self, organization: &EntityId) -> Result<Vec<Staff>, Error> {
        let mut url = self.endpoint(&[Staff::PATH])?;
        url.query_pairs_mut()
            .append_pair("organization", organization.as_str());
        self.get_json(url).await
    }
}

// ── Response handling ────────────────────────────────────────────────

async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
    let resp = check_status(resp).await?;
    let body = resp.text().await?;
    serde_json::from_str(&body).map_err(|e| {
        let preview = body.chars().take(200).collect::<String>();
        Error::Deserialization {
            message: format!("{e} (body preview: {preview:?})"),
            body: body.clone(),
        }
    })
}

/// Pass successful responses through; turn anything else into
/// [`Error::Http`] carrying the most specific message available.
async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = error_message(&body).unwrap_or_else(|| format!("Error Code: {}", status.as_u16()));
    Err(Error::Http {
        status: status.as_u16(),
        message,
    })
}

/// Extract `message` from an error body. Validation failures send an
/// array of messages, which are joined.
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let message = match value.get("message")? {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(serde_json::Value::as_str)
            .collect::<Vec<_>>()
            .join("; "),
        _ => return None,
    };
    (!message.is_empty()).then_some(message)
}
