// Refresh-token exchange

use anyhow::Context;
use reqwest::{Client, Url};

use super::types::{RefreshRequest, RefreshResponse};
use crate::error::{ApiError, Result};

/// Exchange a refresh token for a new access token
///
/// Sent directly on the transport: no Authorization header and no 401
/// retry. Any non-success answer is a refresh failure.
pub async fn exchange_refresh_token(client: &Client, url: &Url, refresh: &str) -> Result<String> {
    tracing::info!("Refreshing access token...");

    let request = RefreshRequest {
        refresh: refresh.to_string(),
    };

    let response = client
        .post(url.clone())
        .json(&request)
        .send()
        .await
        .map_err(ApiError::network)?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        tracing::warn!(
            status = status.as_u16(),
            body = %error_text,
            "Token refresh rejected"
        );
        return Err(ApiError::status(status.as_u16(), error_text));
    }

    let data: RefreshResponse = response
        .json()
        .await
        .context("Failed to parse token refresh response")?;

    if data.access.is_empty() {
        return Err(anyhow::anyhow!("Token refresh response does not contain access").into());
    }

    tracing::info!(
        refresh_rotated = data.refresh.is_some(),
        "Access token refreshed"
    );
    Ok(data.access)
}
