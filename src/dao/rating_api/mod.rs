//! Client boundary to the external rating-verification service.

pub mod client;
pub mod error;
pub mod models;
pub mod session;

use futures::{
    FutureExt,
    future::{BoxFuture, ready},
};

pub use self::client::{HttpRatingApi, RatingApiSettings};
pub use self::error::{RatingApiError, RatingApiResult};
pub use self::models::{AccessToken, CreatedMatch, MatchPayload, PlayerRatings};
pub use self::session::RatingSession;

/// Remote operations consumed from the rating service.
pub trait RatingApi: Send + Sync {
    /// Exchange client credentials for a bearer token.
    fn exchange_token(&self) -> BoxFuture<'static, RatingApiResult<AccessToken>>;

    /// Create a match record. The service rejects identifiers it has already seen.
    fn create_match(
        &self,
        token: String,
        payload: MatchPayload,
    ) -> BoxFuture<'static, RatingApiResult<CreatedMatch>>;

    /// Fetch ratings for a batch of rating holders.
    fn lookup_players(
        &self,
        token: String,
        external_ids: Vec<String>,
    ) -> BoxFuture<'static, RatingApiResult<Vec<PlayerRatings>>>;

    /// Register rating-change notifications for the given holders.
    fn subscribe(
        &self,
        token: String,
        external_ids: Vec<String>,
    ) -> BoxFuture<'static, RatingApiResult<()>>;

    /// Cancel rating-change notifications for the given holders.
    fn unsubscribe(
        &self,
        token: String,
        external_ids: Vec<String>,
    ) -> BoxFuture<'static, RatingApiResult<()>>;
}

/// Stand-in used when no client credentials are configured. Every call fails, so the relay
/// never attempts a submission while local score keeping keeps working.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledRatingApi;

impl DisabledRatingApi {
    fn refuse<T: Send + 'static>() -> BoxFuture<'static, RatingApiResult<T>> {
        ready(Err(RatingApiError::MissingCredentials)).boxed()
    }
}

impl RatingApi for DisabledRatingApi {
    fn exchange_token(&self) -> BoxFuture<'static, RatingApiResult<AccessToken>> {
        Self::refuse()
    }

    fn create_match(
        &self,
        _token: String,
        _payload: MatchPayload,
    ) -> BoxFuture<'static, RatingApiResult<CreatedMatch>> {
        Self::refuse()
    }

    fn lookup_players(
        &self,
        _token: String,
        _external_ids: Vec<String>,
    ) -> BoxFuture<'static, RatingApiResult<Vec<PlayerRatings>>> {
        Self::refuse()
    }

    fn subscribe(
        &self,
        _token: String,
        _external_ids: Vec<String>,
    ) -> BoxFuture<'static, RatingApiResult<()>> {
        Self::refuse()
    }

    fn unsubscribe(
        &self,
        _token: String,
        _external_ids: Vec<String>,
    ) -> BoxFuture<'static, RatingApiResult<()>> {
        Self::refuse()
    }
}
