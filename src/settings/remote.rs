//! HTTP-backed remote settings store.

use std::sync::Arc;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::ApiClient;
use crate::day::DayStartTime;
use crate::error::RemoteError;

use super::SettingsRemote;

const SETTINGS_PATH: &str = "/api/settings";

/// Wire shape of `GET`/`PUT /api/settings`.
#[derive(Debug, Serialize, Deserialize)]
struct SettingsBody {
    #[serde(rename = "dayStartTime", default, skip_serializing_if = "Option::is_none")]
    day_start_time: Option<String>,
}

/// Reads and writes the day start time through the tracker's settings API.
pub struct HttpSettingsRemote {
    api: Arc<ApiClient>,
}

impl HttpSettingsRemote {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl SettingsRemote for HttpSettingsRemote {
    async fn fetch_day_start_time(&self) -> Result<Option<DayStartTime>, RemoteError> {
        let response = self.api.get(SETTINGS_PATH).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("remote settings not found");
            return Ok(None);
        }

        let body: SettingsBody = response.error_for_status()?.json().await?;
        match body.day_start_time {
            Some(raw) => Ok(Some(raw.parse()?)),
            None => Ok(None),
        }
    }

    async fn put_day_start_time(&self, value: DayStartTime) -> Result<(), RemoteError> {
        let body = SettingsBody {
            day_start_time: Some(value.to_string()),
        };
        self.api
            .put(SETTINGS_PATH)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    fn name(&self) -> &str {
        "http"
    }
}
