//! Blocking REST client for articles, collections and auth.

use super::models::{
    Article, ArticleCreate, ArticleUpdate, Collection, CollectionCreate, CollectionUpdate,
    Credentials, ErrorBody, Registration, Token, User,
};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub const MAX_COLLECTION_NAME: usize = 100;

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("Please login first")]
    NotAuthenticated,
    #[error("{detail}")]
    Api { status: StatusCode, detail: String },
    #[error("{0}")]
    Invalid(String),
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl CloudError {
    pub fn is_unauthorized(&self) -> bool {
        match self {
            CloudError::NotAuthenticated => true,
            CloudError::Api { status, .. } => *status == StatusCode::UNAUTHORIZED,
            _ => false,
        }
    }
}

pub type CloudResult<T> = Result<T, CloudError>;

#[derive(Debug, Clone)]
pub struct CloudClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl CloudClient {
    pub fn new(base_url: &str, timeout: Duration) -> CloudResult<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authed(&self, request: RequestBuilder) -> CloudResult<RequestBuilder> {
        let token = self.token.as_deref().ok_or(CloudError::NotAuthenticated)?;
        Ok(request.bearer_auth(token))
    }

    pub fn register(&self, email: &str, password: &str, name: Option<&str>) -> CloudResult<User> {
        let request = self.http.post(self.url("/auth/register")).json(&Registration {
            email,
            password,
            name,
        });
        json_response(request.send()?)
    }

    pub fn login(&self, email: &str, password: &str) -> CloudResult<Token> {
        let request = self
            .http
            .post(self.url("/auth/login"))
            .json(&Credentials { email, password });
        json_response(request.send()?)
    }

    pub fn me(&self) -> CloudResult<User> {
        let request = self.authed(self.http.get(self.url("/auth/me")))?;
        json_response(request.send()?)
    }

    pub fn create_article(&self, article: &ArticleCreate) -> CloudResult<Article> {
        let request = self.authed(self.http.post(self.url("/articles")).json(article))?;
        json_response(request.send()?)
    }

    pub fn list_articles(
        &self,
        skip: usize,
        limit: usize,
        collection_id: Option<&str>,
    ) -> CloudResult<Vec<Article>> {
        let url = self.url(&articles_query(skip, limit, collection_id));
        let request = self.authed(self.http.get(url))?;
        json_response(request.send()?)
    }

    pub fn get_article(&self, id: &str) -> CloudResult<Article> {
        let request = self.authed(self.http.get(self.url(&format!("/articles/{id}"))))?;
        json_response(request.send()?)
    }

    pub fn update_article(&self, id: &str, update: &ArticleUpdate) -> CloudResult<Article> {
        let request = self.authed(
            self.http
                .patch(self.url(&format!("/articles/{id}")))
                .json(update),
        )?;
        json_response(request.send()?)
    }

    pub fn delete_article(&self, id: &str) -> CloudResult<()> {
        let request = self.authed(self.http.delete(self.url(&format!("/articles/{id}"))))?;
        empty_response(request.send()?)
    }

    pub fn list_collections(&self) -> CloudResult<Vec<Collection>> {
        let request = self.authed(self.http.get(self.url("/collections")))?;
        json_response(request.send()?)
    }

    pub fn create_collection(&self, collection: &CollectionCreate) -> CloudResult<Collection> {
        validate_collection_name(&collection.name)?;
        let request = self.authed(self.http.post(self.url("/collections")).json(collection))?;
        json_response(request.send()?)
    }

    pub fn get_collection(&self, id: &str) -> CloudResult<Collection> {
        let request = self.authed(self.http.get(self.url(&format!("/collections/{id}"))))?;
        json_response(request.send()?)
    }

    pub fn update_collection(&self, id: &str, update: &CollectionUpdate) -> CloudResult<Collection> {
        if let Some(name) = &update.name {
            validate_collection_name(name)?;
        }
        let request = self.authed(
            self.http
                .patch(self.url(&format!("/collections/{id}")))
                .json(update),
        )?;
        json_response(request.send()?)
    }

    pub fn delete_collection(&self, id: &str) -> CloudResult<()> {
        let request = self.authed(self.http.delete(self.url(&format!("/collections/{id}"))))?;
        empty_response(request.send()?)
    }
}

fn articles_query(skip: usize, limit: usize, collection_id: Option<&str>) -> String {
    let mut path = format!("/articles?skip={skip}&limit={limit}");
    if let Some(id) = collection_id.filter(|id| !id.is_empty()) {
        path.push_str("&collection_id=");
        path.push_str(id);
    }
    path
}

pub fn validate_collection_name(name: &str) -> CloudResult<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CloudError::Invalid("Collection name is required".to_string()));
    }
    if trimmed.chars().count() > MAX_COLLECTION_NAME {
        return Err(CloudError::Invalid(format!(
            "Collection name must be at most {MAX_COLLECTION_NAME} characters"
        )));
    }
    Ok(())
}

fn json_response<T: DeserializeOwned>(response: Response) -> CloudResult<T> {
    let response = check_status(response)?;
    Ok(response.json()?)
}

fn empty_response(response: Response) -> CloudResult<()> {
    check_status(response).map(|_| ())
}

fn check_status(response: Response) -> CloudResult<Response> {
    let status = response.status();
    if status.is_success() {
        debug!(%status, url = %response.url(), "Cloud request succeeded");
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    let error = api_error(status, &body);
    warn!(%status, "Cloud request failed: {error}");
    Err(error)
}

fn api_error(status: StatusCode, body: &str) -> CloudError {
    let detail = serde_json::from_str::<ErrorBody>(body)
        .map(|body| body.message())
        .ok()
        .filter(|detail| !detail.is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        });
    CloudError::Api { status, detail }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_query_includes_collection_only_when_set() {
        assert_eq!(articles_query(0, 50, None), "/articles?skip=0&limit=50");
        assert_eq!(
            articles_query(10, 5, Some("c1")),
            "/articles?skip=10&limit=5&collection_id=c1"
        );
        assert_eq!(articles_query(0, 50, Some("")), "/articles?skip=0&limit=50");
    }

    #[test]
    fn api_errors_surface_detail() {
        let error = api_error(StatusCode::BAD_REQUEST, r#"{"detail":"Email already registered"}"#);
        assert_eq!(error.to_string(), "Email already registered");

        let error = api_error(StatusCode::NOT_FOUND, "<html>oops</html>");
        assert_eq!(error.to_string(), "Not Found");
    }

    #[test]
    fn unauthorized_errors_are_recognized() {
        let error = api_error(StatusCode::UNAUTHORIZED, r#"{"detail":"Could not validate"}"#);
        assert!(error.is_unauthorized());
        assert!(CloudError::NotAuthenticated.is_unauthorized());
        assert!(!CloudError::Invalid("x".into()).is_unauthorized());
    }

    #[test]
    fn collection_names_are_bounded() {
        assert!(validate_collection_name("Reading list").is_ok());
        assert!(validate_collection_name("   ").is_err());
        assert!(validate_collection_name(&"x".repeat(100)).is_ok());
        assert!(validate_collection_name(&"x".repeat(101)).is_err());
    }

    #[test]
    fn calls_without_token_fail_fast() {
        let client = CloudClient::new("http://127.0.0.1:9/", Duration::from_millis(100)).unwrap();
        assert!(matches!(
            client.list_articles(0, 50, None),
            Err(CloudError::NotAuthenticated)
        ));
        assert_eq!(client.url("/x"), "http://127.0.0.1:9/x");
    }
}
