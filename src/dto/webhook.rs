use serde::Serialize;
use utoipa::ToSchema;

/// Acknowledgement sent for every webhook delivery, duplicates included.
#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
    pub duplicate: bool,
}
