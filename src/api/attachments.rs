//! Caption attachments. Captions are replaced, never edited in place:
//! delete the old attachment, create a new one.

use crate::api::client::ApiClient;
use crate::error::{AuraError, Result};
use crate::models::Attachment;
use std::sync::Arc;
use tracing::debug;

const MAX_CAPTION_LENGTH: usize = 140;

pub struct AttachmentApi {
    client: Arc<ApiClient>,
}

impl AttachmentApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    pub async fn create_caption(
        &self,
        asset_id: &str,
        frame_id: &str,
        text: &str,
    ) -> Result<Attachment> {
        validate_caption(text)?;

        let response = self
            .client
            .post(
                "/attachments.json",
                serde_json::json!({
                    "asset_id": asset_id,
                    "frame_id": frame_id,
                    "type": "caption",
                    "text": text,
                }),
            )
            .await?;

        serde_json::from_value(response.get("attachment").cloned().unwrap_or_default()).map_err(
            |e| AuraError::Api {
                status: 200,
                message: format!("malformed attachment payload: {e}"),
            },
        )
    }

    /// Delete an attachment. An already-absent attachment counts as
    /// success: the intent (no caption) holds either way.
    pub async fn delete_caption(&self, attachment_id: &str) -> Result<()> {
        match self
            .client
            .delete(&format!("/attachments/{attachment_id}.json"))
            .await
        {
            Ok(_) => Ok(()),
            Err(AuraError::NotFound(_)) => {
                debug!(attachment_id, "attachment already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

fn validate_caption(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(AuraError::Validation("caption cannot be empty".to_string()));
    }
    if text.chars().count() > MAX_CAPTION_LENGTH {
        return Err(AuraError::Validation(format!(
            "caption cannot exceed {MAX_CAPTION_LENGTH} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_caption() {
        assert!(validate_caption("Summer trip").is_ok());
        assert!(validate_caption("   ").is_err());
        assert!(validate_caption(&"x".repeat(141)).is_err());
        assert!(validate_caption(&"x".repeat(140)).is_ok());
    }
}
