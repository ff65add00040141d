//! Base for JSON web service clients.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use url::Url;

use crate::classifier::{JsonResponseFactory, StatusClassifier};
use crate::engine::execute;
use crate::error::ClientError;
use crate::mapper::{AutoMapper, AutoResponse};
use crate::request::RequestDescription;
use crate::response::JsonWebServiceResponse;
use crate::settings::RequestSettings;

/// Creates requests relative to a base URI and runs them with shared
/// settings.
///
/// # Example
///
/// ```ignore
/// let client = JsonServiceClient::new(Url::parse("https://api.example.com/v1/")?)
///     .with_settings(settings);
///
/// let widget: GetWidget = client.get("widgets/42").await?;
/// let created: GetWidget = client
///     .execute(client.create_request("widgets")?.with_post_method())
///     .await?;
/// ```
#[derive(Clone, Debug)]
pub struct JsonServiceClient {
    base_uri: Url,
    settings: Option<Arc<RequestSettings>>,
}

impl JsonServiceClient {
    pub fn new(base_uri: Url) -> Self {
        Self {
            base_uri,
            settings: None,
        }
    }

    pub fn with_settings(mut self, settings: Arc<RequestSettings>) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn base_uri(&self) -> &Url {
        &self.base_uri
    }

    pub fn settings(&self) -> Option<&Arc<RequestSettings>> {
        self.settings.as_ref()
    }

    /// `relative` appended to the base URI with exactly one `/` between.
    pub fn request_uri(&self, relative: &str) -> Result<Url, ClientError> {
        if relative.is_empty() {
            return Ok(self.base_uri.clone());
        }
        let text = format!(
            "{}/{}",
            self.base_uri.as_str().trim_end_matches('/'),
            relative.trim_start_matches('/')
        );
        Url::parse(&text).map_err(ClientError::handler)
    }

    /// A request for `relative`, carrying the client's settings.
    pub fn create_request(&self, relative: &str) -> Result<RequestDescription, ClientError> {
        let mut request =
            RequestDescription::new(self.request_uri(relative)?).map_err(ClientError::handler)?;
        request.settings = self.settings.clone();
        Ok(request)
    }

    /// Run `request` and map the response into `T`.
    pub async fn execute<T: AutoResponse>(&self, request: RequestDescription) -> Result<T, ClientError> {
        execute(request, &AutoMapper::<T>::new()).await
    }

    /// `GET relative`, mapped into `T`.
    pub async fn get<T: AutoResponse>(&self, relative: &str) -> Result<T, ClientError> {
        self.execute(self.create_request(relative)?).await
    }

    /// `GET relative`, accepting `200 OK` and `201 Created` and decoding
    /// JSON.
    pub async fn get_json<T>(&self, relative: &str) -> Result<JsonWebServiceResponse<T>, ClientError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let classifier = StatusClassifier::new().with_factory(JsonResponseFactory::<T>::new());
        execute(self.create_request(relative)?, &classifier).await
    }
}
