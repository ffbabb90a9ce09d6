use std::sync::Arc;

use reqwest::StatusCode;

use crate::api::ApiClient;
use crate::error::RemoteError;

use super::{Identity, IdentitySource};

const IDENTITY_PATH: &str = "/api/auth/me";

/// Reads the signed-in user from the tracker's auth endpoint.
///
/// A 401 is treated as "signed out" rather than an error.
pub struct HttpIdentitySource {
    api: Arc<ApiClient>,
}

impl HttpIdentitySource {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl IdentitySource for HttpIdentitySource {
    async fn fetch_identity(&self) -> Result<Option<Identity>, RemoteError> {
        let response = self.api.get(IDENTITY_PATH).send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        let identity = response.error_for_status()?.json::<Identity>().await?;
        Ok(Some(identity))
    }

    fn name(&self) -> &str {
        "http"
    }
}
