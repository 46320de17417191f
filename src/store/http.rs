//! REST-backed [`PhoneStore`].
//!
//! Talks to a document database exposing a collection as JSON under
//! `{base}/{collection}.json`, with one child per record at
//! `{base}/{collection}/{id}.json`. Only `200 OK` counts as success.

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use crate::config::Config;
use crate::domain::{Phone, PhoneDraft, PhoneId};

use super::{PhoneStore, RemoteError};

/// Body returned by a create request.
#[derive(Deserialize)]
struct CreatedEnvelope {
    name: String,
}

#[derive(Debug, Clone)]
pub struct HttpStore {
    client: Client,
    base_url: String,
    collection: String,
}

impl HttpStore {
    pub fn new(base_url: impl Into<String>, collection: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url, collection)
    }

    pub fn with_client(
        client: Client,
        base_url: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            collection: collection.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.base_url.clone(), config.collection.clone())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self) -> String {
        format!("{}/{}.json", self.base_url, self.collection)
    }

    fn record_url(&self, id: &PhoneId) -> String {
        format!("{}/{}/{}.json", self.base_url, self.collection, id)
    }

    /// Sends the request and returns the body of a `200 OK` response.
    async fn send(&self, request: RequestBuilder) -> Result<String, RemoteError> {
        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::transport(e.to_string()))?;
        read_ok_body(response).await
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        tracing::debug!(%method, %url, "store request");
        self.client.request(method, url)
    }
}

async fn read_ok_body(response: Response) -> Result<String, RemoteError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| RemoteError::new(Some(status.as_u16()), e.to_string()))?;
    if status != StatusCode::OK {
        tracing::debug!(status = status.as_u16(), "store request rejected");
        return Err(RemoteError::new(Some(status.as_u16()), body));
    }
    Ok(body)
}

fn decode_error(what: &str, err: serde_json::Error) -> RemoteError {
    RemoteError::new(Some(StatusCode::OK.as_u16()), format!("malformed {what}: {err}"))
}

/// Turns the collection root into phones. Anything but an object is empty.
fn phones_from_root(root: Value) -> Result<Vec<Phone>, RemoteError> {
    let Value::Object(records) = root else {
        return Ok(Vec::new());
    };
    let mut phones = records
        .into_iter()
        .map(|(id, fields)| {
            let draft: PhoneDraft = serde_json::from_value(fields)
                .map_err(|e| decode_error(&format!("record {id}"), e))?;
            Ok(draft.with_id(PhoneId::new(id)))
        })
        .collect::<Result<Vec<_>, RemoteError>>()?;
    // Push ids sort in creation order.
    phones.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(phones)
}

impl PhoneStore for HttpStore {
    async fn add(&self, draft: &PhoneDraft) -> Result<Phone, RemoteError> {
        let request = self.request(Method::POST, self.collection_url()).json(draft);
        let body = self.send(request).await?;
        let created: CreatedEnvelope =
            serde_json::from_str(&body).map_err(|e| decode_error("create response", e))?;
        Ok(draft.clone().with_id(PhoneId::new(created.name)))
    }

    async fn update(&self, phone: &Phone) -> Result<Phone, RemoteError> {
        let request = self
            .request(Method::PATCH, self.record_url(&phone.id))
            .json(&phone.draft());
        self.send(request).await?;
        Ok(phone.clone())
    }

    async fn list(&self) -> Result<Vec<Phone>, RemoteError> {
        let body = self
            .send(self.request(Method::GET, self.collection_url()))
            .await?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        let root: Value =
            serde_json::from_str(&body).map_err(|e| decode_error("collection", e))?;
        phones_from_root(root)
    }

    async fn remove(&self, id: &PhoneId) -> Result<(), RemoteError> {
        self.send(self.request(Method::DELETE, self.record_url(id)))
            .await?;
        Ok(())
    }
}
