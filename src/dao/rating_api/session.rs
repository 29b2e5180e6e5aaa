use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use tokio::{sync::Mutex, time::timeout};
use tracing::{debug, warn};

use crate::{
    clock::Clock,
    dao::rating_api::{RatingApi, RatingApiError, RatingApiResult},
};

/// Tokens are renewed this long before the service would expire them.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

struct CachedToken {
    value: String,
    expires_at: SystemTime,
}

/// Rating-service client together with its credential cache.
///
/// Every pipeline invocation obtains its token here first; a failed or hung exchange is reported
/// to the caller and no token is cached.
pub struct RatingSession {
    api: Arc<dyn RatingApi>,
    clock: Arc<dyn Clock>,
    token_timeout: Duration,
    cached: Mutex<Option<CachedToken>>,
}

impl RatingSession {
    pub fn new(api: Arc<dyn RatingApi>, clock: Arc<dyn Clock>, token_timeout: Duration) -> Self {
        Self {
            api,
            clock,
            token_timeout,
            cached: Mutex::new(None),
        }
    }

    pub fn api(&self) -> &Arc<dyn RatingApi> {
        &self.api
    }

    /// Return a valid bearer token, exchanging credentials when the cached one is stale.
    pub async fn access_token(&self) -> RatingApiResult<String> {
        let mut cached = self.cached.lock().await;
        let now = self.clock.now();
        if let Some(token) = cached.as_ref()
            && token.expires_at > now
        {
            return Ok(token.value.clone());
        }

        let exchanged = match timeout(self.token_timeout, self.api.exchange_token()).await {
            Ok(result) => result,
            Err(_) => Err(RatingApiError::Timeout { endpoint: "token" }),
        };
        let token = match exchanged {
            Ok(token) => token,
            Err(err) => {
                cached.take();
                warn!(error = %err, "rating service token exchange failed");
                return Err(err);
            }
        };

        let lifetime = token.expires_in.saturating_sub(EXPIRY_MARGIN);
        debug!(lifetime_secs = lifetime.as_secs(), "obtained rating service token");
        *cached = Some(CachedToken {
            value: token.value.clone(),
            expires_at: now + lifetime,
        });
        Ok(token.value)
    }

    /// Drop the cached token so the next call exchanges credentials again.
    pub async fn invalidate(&self) {
        self.cached.lock().await.take();
    }
}
