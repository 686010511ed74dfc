//! Thin client for the Sanity-compatible content API that stores comment
//! documents. Only the operations the comment store needs: parameterized
//! queries, document creation, fetch by id, and `patch(id).set(..).commit()`.

use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::config::CmsConfig;

#[derive(thiserror::Error, Debug)]
pub enum CmsError {
    #[error("content api request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("content api returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("could not build content api url: {0}")]
    BadUrl(String),

    #[error("content api returned an unexpected shape: {0}")]
    Shape(&'static str),
}

#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    query_url: String,
    mutate_url: String,
    doc_url: String,
    token: String,
}

#[derive(serde::Deserialize)]
struct QueryResponse<T> {
    result: T,
}

#[derive(serde::Deserialize)]
struct MutateResponse {
    results: Vec<MutateResult>,
}

#[derive(serde::Deserialize)]
struct MutateResult {
    document: Option<Value>,
}

#[derive(serde::Deserialize)]
struct DocumentsResponse {
    documents: Vec<Value>,
}

/// Query parameters are JSON-encoded and prefixed with `$`, matching how the
/// content API binds `$name` placeholders inside a query.
fn query_pairs(query: &str, params: &[(&str, Value)]) -> Vec<(String, String)> {
    let mut pairs = vec![("query".to_string(), query.to_string())];
    for (name, value) in params {
        pairs.push((format!("${name}"), value.to_string()));
    }
    pairs
}

fn create_mutation(document: &Value) -> Value {
    json!({ "mutations": [{ "create": document }] })
}

impl Client {
    pub fn new(http: reqwest::Client, config: &CmsConfig) -> Self {
        let base = format!(
            "https://{}.api.sanity.io/v{}",
            config.project_id, config.api_version
        );
        Client {
            http,
            query_url: format!("{base}/data/query/{}", config.dataset),
            mutate_url: format!("{base}/data/mutate/{}", config.dataset),
            doc_url: format!("{base}/data/doc/{}", config.dataset),
            token: config.write_token.clone(),
        }
    }

    pub async fn query<T: DeserializeOwned>(
        &self,
        query: &str,
        params: &[(&str, Value)],
    ) -> Result<T, CmsError> {
        let url = reqwest::Url::parse_with_params(&self.query_url, query_pairs(query, params))
            .map_err(|e| CmsError::BadUrl(e.to_string()))?;

        let response = self.http.get(url).bearer_auth(&self.token).send().await?;
        let response = read_api_error(response).await?;

        Ok(response.json::<QueryResponse<T>>().await?.result)
    }

    pub async fn create<T: DeserializeOwned>(&self, document: Value) -> Result<T, CmsError> {
        let url = reqwest::Url::parse_with_params(
            &self.mutate_url,
            [("returnDocuments", "true"), ("returnIds", "true")],
        )
        .map_err(|e| CmsError::BadUrl(e.to_string()))?;

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&create_mutation(&document))
            .send()
            .await?;
        let response = read_api_error(response).await?;

        let created = response
            .json::<MutateResponse>()
            .await?
            .results
            .into_iter()
            .next()
            .and_then(|r| r.document)
            .ok_or(CmsError::Shape("create returned no document"))?;

        serde_json::from_value(created)
            .map_err(|_| CmsError::Shape("created document failed to decode"))
    }

    pub async fn get_document<T: DeserializeOwned>(&self, id: &str) -> Result<Option<T>, CmsError> {
        let url = format!("{}/{id}", self.doc_url);
        let response = self.http.get(url).bearer_auth(&self.token).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = read_api_error(response).await?;

        let Some(document) = response
            .json::<DocumentsResponse>()
            .await?
            .documents
            .into_iter()
            .next()
        else {
            return Ok(None);
        };

        serde_json::from_value(document)
            .map(Some)
            .map_err(|_| CmsError::Shape("document failed to decode"))
    }

    pub fn patch(&self, id: &str) -> Patch<'_> {
        Patch {
            client: self,
            id: id.to_string(),
            set: serde_json::Map::new(),
        }
    }
}

pub struct Patch<'a> {
    client: &'a Client,
    id: String,
    set: serde_json::Map<String, Value>,
}

impl Patch<'_> {
    pub fn set(mut self, fields: Value) -> Self {
        if let Value::Object(fields) = fields {
            self.set.extend(fields);
        }
        self
    }

    fn mutation(&self) -> Value {
        json!({ "mutations": [{ "patch": { "id": self.id, "set": self.set } }] })
    }

    pub async fn commit(self) -> Result<(), CmsError> {
        let response = self
            .client
            .http
            .post(&self.client.mutate_url)
            .bearer_auth(&self.client.token)
            .json(&self.mutation())
            .send()
            .await?;
        read_api_error(response).await?;

        Ok(())
    }
}

/// The content API reports failures as `{"error": {"description": ...}}`;
/// surface that description when present, the raw body otherwise.
async fn read_api_error(response: reqwest::Response) -> Result<reqwest::Response, CmsError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/description")
                .and_then(|d| d.as_str())
                .map(str::to_string)
        })
        .unwrap_or(body);

    Err(CmsError::Api {
        status: status.as_u16(),
        message,
    })
}
