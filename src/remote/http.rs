use super::types::{ChangeEvent, ReputationRemote, IDENTITY_HEADER};
use crate::config::Config;
use crate::error::{Error, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

/// `ReputationRemote` backed by the service's HTTP API.
pub struct HttpRemote {
    client: Client,
    base_url: Url,
    identity: String,
}

impl HttpRemote {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("yachts-rs/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::transport(format!("HTTP client init failed: {e}")))?;
        Self::with_client(client, &config.api_base_url, &config.identity)
    }

    /// Build with a custom reqwest client.
    pub fn with_client(client: Client, base_url: &str, identity: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::InvalidArgument(format!("bad API base URL '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::InvalidArgument(format!(
                "API base URL '{base_url}' cannot carry a path"
            )));
        }
        Ok(Self {
            client,
            base_url,
            identity: identity.to_string(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // cannot_be_a_base was rejected in the constructor
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_text(&self, segments: &[&str]) -> Result<String> {
        let url = self.endpoint(segments);
        debug!(url = %url, "Remote request");

        let response = self
            .client
            .get(url)
            .header(IDENTITY_HEADER, &self.identity)
            .send()
            .await
            .map_err(Error::transport)?;

        let status = response.status();
        let body = response.text().await.map_err(Error::transport)?;

        if !status.is_success() {
            return Err(Error::Remote {
                status: Some(status.as_u16()),
                body,
            });
        }
        Ok(body)
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let body = self.get_text(segments).await?;
        parse_json(&body)
    }
}

fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| Error::Remote {
        status: None,
        body: format!("unparseable response ({e}): {body}"),
    })
}

fn parse_size(body: &str) -> Result<u64> {
    body.trim().parse().map_err(|_| Error::Remote {
        status: None,
        body: format!("database size is not an integer: {body}"),
    })
}

#[async_trait::async_trait]
impl ReputationRemote for HttpRemote {
    async fn fetch_full_list(&self) -> Result<Vec<String>> {
        self.get_json(&["all"]).await
    }

    async fn check_domain(&self, domain: &str) -> Result<bool> {
        self.get_json(&["check", domain]).await
    }

    async fn fetch_database_size(&self) -> Result<u64> {
        let body = self.get_text(&["dbsize"]).await?;
        parse_size(&body)
    }

    async fn fetch_recent(&self, seconds: u32) -> Result<Vec<ChangeEvent>> {
        let seconds = seconds.to_string();
        self.get_json(&["recent", &seconds]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(base: &str) -> HttpRemote {
        HttpRemote::with_client(Client::new(), base, "test").unwrap()
    }

    #[test]
    fn test_endpoint_joins_segments() {
        let r = remote("https://phish.sinking.yachts/v2");
        assert_eq!(
            r.endpoint(&["check", "evil.example"]).as_str(),
            "https://phish.sinking.yachts/v2/check/evil.example"
        );

        let r = remote("https://phish.sinking.yachts/v2/");
        assert_eq!(
            r.endpoint(&["all"]).as_str(),
            "https://phish.sinking.yachts/v2/all"
        );
    }

    #[test]
    fn test_endpoint_escapes_domain() {
        let r = remote("http://localhost:8080");
        assert_eq!(
            r.endpoint(&["check", "a/b"]).as_str(),
            "http://localhost:8080/check/a%2Fb"
        );
    }

    #[test]
    fn test_bad_base_url_is_invalid_argument() {
        let res = HttpRemote::with_client(Client::new(), "not a url", "test");
        assert!(matches!(res, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("12345\n").unwrap(), 12345);
        assert!(matches!(
            parse_size("lots"),
            Err(Error::Remote { status: None, .. })
        ));
    }

    #[test]
    fn test_parse_json_failure_is_remote_error() {
        let res: Result<bool> = parse_json("maybe");
        assert!(matches!(res, Err(Error::Remote { status: None, .. })));
    }
}
