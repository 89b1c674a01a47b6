use tracing::{info, warn};

use crate::config::VisionConfig;
use crate::error::{Result, ScanError};

use super::client::VisionClient;

#[derive(Debug, Clone)]
enum VisionBackend {
    Api { client: VisionClient },
    Unavailable { reason: String },
}

/// Process-wide handle to the remote vision model.
///
/// Built once at startup. A missing credential does not abort construction;
/// it leaves the provider unavailable and every query fails with a
/// configuration error instead of returning empty content.
#[derive(Debug, Clone)]
pub struct VisionProvider {
    backend: VisionBackend,
}

impl VisionProvider {
    pub fn new(config: &VisionConfig) -> Self {
        let backend = match VisionClient::new(config) {
            Ok(client) => {
                info!(model = %client.model(), base_url = %client.base_url(), "Vision backend initialized");
                VisionBackend::Api { client }
            }
            Err(e) => {
                let reason = format!("Vision backend unavailable: {e}");
                warn!("{}", reason);
                VisionBackend::Unavailable { reason }
            }
        };

        Self { backend }
    }

    pub fn unavailable(reason: &str) -> Self {
        Self {
            backend: VisionBackend::Unavailable {
                reason: reason.to_string(),
            },
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self.backend, VisionBackend::Api { .. })
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        match &self.backend {
            VisionBackend::Unavailable { reason } => Some(reason),
            VisionBackend::Api { .. } => None,
        }
    }

    pub fn model(&self) -> Option<&str> {
        match &self.backend {
            VisionBackend::Api { client } => Some(client.model()),
            VisionBackend::Unavailable { .. } => None,
        }
    }

    pub async fn query(&self, image_base64: &str, mime_type: &str, prompt: &str) -> Result<String> {
        match &self.backend {
            VisionBackend::Api { client } => client.query(image_base64, mime_type, prompt).await,
            VisionBackend::Unavailable { reason } => Err(ScanError::Config(reason.clone())),
        }
    }
}
