use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::dao::rating_api::{
    RatingApi,
    error::{RatingApiError, RatingApiResult},
    models::{
        AccessToken, CreatedMatch, ErrorResponse, LookupResponse, MatchPayload, PlayerIdsRequest,
        PlayerRatings, TokenResponse,
    },
};

const USER_AGENT: &str = concat!("score-relay-back/", env!("CARGO_PKG_VERSION"));

/// Connection settings of the HTTP client.
#[derive(Debug, Clone)]
pub struct RatingApiSettings {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub request_timeout: Duration,
}

/// [`RatingApi`] backed by the service's HTTPS endpoints.
#[derive(Clone)]
pub struct HttpRatingApi {
    inner: Arc<Inner>,
}

struct Inner {
    client: Client,
    settings: RatingApiSettings,
}

impl HttpRatingApi {
    pub fn new(settings: RatingApiSettings) -> RatingApiResult<Self> {
        if settings.client_id.is_empty() || settings.client_secret.is_empty() {
            return Err(RatingApiError::MissingCredentials);
        }
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.request_timeout)
            .build()
            .map_err(RatingApiError::ClientConstruction)?;

        Ok(Self {
            inner: Arc::new(Inner { client, settings }),
        })
    }
}

impl Inner {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        self.client.request(method, self.url(path)).bearer_auth(token)
    }

    async fn send(endpoint: &'static str, request: RequestBuilder) -> RatingApiResult<Response> {
        let response = request.send().await.map_err(|source| {
            if source.is_timeout() {
                RatingApiError::Timeout { endpoint }
            } else {
                RatingApiError::Transport { endpoint, source }
            }
        })?;

        let status = response.status();
        debug!(endpoint, status = status.as_u16(), "rating service responded");
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|err| err.message)
            .unwrap_or(body);
        Err(RatingApiError::Rejected {
            endpoint,
            status: status.as_u16(),
            message,
        })
    }

    async fn json<T: DeserializeOwned>(
        endpoint: &'static str,
        response: Response,
    ) -> RatingApiResult<T> {
        response
            .json::<T>()
            .await
            .map_err(|err| RatingApiError::Decode {
                endpoint,
                message: err.to_string(),
            })
    }
}

impl RatingApi for HttpRatingApi {
    fn exchange_token(&self) -> BoxFuture<'static, RatingApiResult<AccessToken>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            const ENDPOINT: &str = "token";
            let request = inner.client.post(inner.url("/oauth/token")).form(&[
                ("grant_type", "client_credentials"),
                ("client_id", inner.settings.client_id.as_str()),
                ("client_secret", inner.settings.client_secret.as_str()),
            ]);
            let response = Inner::send(ENDPOINT, request).await?;
            let token: TokenResponse = Inner::json(ENDPOINT, response).await?;
            Ok(AccessToken {
                value: token.access_token,
                expires_in: Duration::from_secs(token.expires_in),
            })
        })
    }

    fn create_match(
        &self,
        token: String,
        payload: MatchPayload,
    ) -> BoxFuture<'static, RatingApiResult<CreatedMatch>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            const ENDPOINT: &str = "match-create";
            let request = inner
                .authorized(Method::POST, "/v1/matches", &token)
                .json(&payload);
            let response = Inner::send(ENDPOINT, request).await?;
            Inner::json(ENDPOINT, response).await
        })
    }

    fn lookup_players(
        &self,
        token: String,
        external_ids: Vec<String>,
    ) -> BoxFuture<'static, RatingApiResult<Vec<PlayerRatings>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            const ENDPOINT: &str = "player-lookup";
            let request = inner
                .authorized(Method::POST, "/v1/players/lookup", &token)
                .json(&PlayerIdsRequest {
                    player_ids: &external_ids,
                });
            let response = Inner::send(ENDPOINT, request).await?;
            let body: LookupResponse = Inner::json(ENDPOINT, response).await?;
            Ok(body.players)
        })
    }

    fn subscribe(
        &self,
        token: String,
        external_ids: Vec<String>,
    ) -> BoxFuture<'static, RatingApiResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let request = inner
                .authorized(Method::POST, "/v1/subscriptions", &token)
                .json(&PlayerIdsRequest {
                    player_ids: &external_ids,
                });
            Inner::send("subscribe", request).await.map(|_| ())
        })
    }

    fn unsubscribe(
        &self,
        token: String,
        external_ids: Vec<String>,
    ) -> BoxFuture<'static, RatingApiResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let request = inner
                .authorized(Method::DELETE, "/v1/subscriptions", &token)
                .json(&PlayerIdsRequest {
                    player_ids: &external_ids,
                });
            Inner::send("unsubscribe", request).await.map(|_| ())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refuses_missing_credentials() {
        let settings = RatingApiSettings {
            base_url: "https://ratings.invalid".into(),
            client_id: String::new(),
            client_secret: "secret".into(),
            request_timeout: Duration::from_secs(5),
        };
        assert!(matches!(
            HttpRatingApi::new(settings),
            Err(RatingApiError::MissingCredentials)
        ));
    }
}
