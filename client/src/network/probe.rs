//! Liveness probing.

use async_trait::async_trait;

/// Checks whether the remote service is reachable.
///
/// Only success or failure matters; no response body is interpreted. The
/// monitor applies its own timeout around [`LivenessProbe::check`].
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn check(&self) -> bool;
}

/// Probe that issues `HEAD <health url>` and accepts any 2xx status.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl LivenessProbe for HttpProbe {
    async fn check(&self) -> bool {
        match self.client.head(&self.url).send().await {
            Ok(response) => {
                let ok = response.status().is_success();
                if !ok {
                    tracing::debug!(status = %response.status(), "Liveness probe rejected");
                }
                ok
            }
            Err(e) => {
                tracing::debug!(error = %e, "Liveness probe failed");
                false
            }
        }
    }
}
