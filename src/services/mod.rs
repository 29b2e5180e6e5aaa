/// OpenAPI documentation generation.
pub mod documentation;
/// Payload construction for the rating service.
pub mod formatter;
/// Health check service.
pub mod health_service;
/// Scheduled and manual rating refresh.
pub mod rating_sync_service;
/// Periodic background jobs.
pub mod scheduler;
/// Score workflow transitions and revision-checked match writes.
pub mod score_service;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
/// Result submission pipeline.
pub mod submission_service;
/// Inbound rating-change notifications.
pub mod webhook_service;
