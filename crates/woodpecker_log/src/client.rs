//! RFC 6962 submission client.
//!
//! `POST <url>/ct/v1/add-pre-chain` and `POST <url>/ct/v1/add-chain` with a
//! JSON body `{"chain": [base64 DER, ...]}`. Failed calls are not retried.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;
use woodpecker_core::{CertChain, DigitallySigned, SignedCertificateTimestamp};

use crate::error::{LogError, LogResult};
use crate::trait_::LogSubmitter;

/// User-Agent sent with every request
pub const USER_AGENT: &str = concat!(
    "woodpecker/",
    env!("CARGO_PKG_VERSION"),
    " (+https://github.com/sunlight-woodpecker/woodpecker)"
);

/// Per-request timeout used when none is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

const ADD_PRE_CHAIN: &str = "ct/v1/add-pre-chain";
const ADD_CHAIN: &str = "ct/v1/add-chain";
const MAX_ERROR_BODY: usize = 512;

/// Build the pooled HTTP client shared by all log collaborators
///
/// # Errors
///
/// Returns [`LogError::Setup`] if the TLS backend cannot be initialised
pub fn http_client(timeout: Duration) -> LogResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| LogError::setup(format!("building HTTP client: {e}")))
}

#[derive(Debug, Serialize)]
struct AddChainRequest {
    chain: Vec<String>,
}

impl AddChainRequest {
    fn new(chain: &CertChain) -> Self {
        Self {
            chain: chain
                .certificates()
                .iter()
                .map(|der| BASE64.encode(der))
                .collect(),
        }
    }
}

/// JSON body of an add-chain or add-pre-chain response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddChainResponse {
    /// SCT version
    pub sct_version: u8,
    /// Base64 log ID
    pub id: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    /// Base64 CT extensions
    #[serde(default)]
    pub extensions: String,
    /// Base64 `digitally-signed` struct
    pub signature: String,
}

impl AddChainResponse {
    /// Encode an SCT as a response body
    #[must_use]
    pub fn from_sct(sct: &SignedCertificateTimestamp) -> Option<Self> {
        Some(Self {
            sct_version: sct.version,
            id: BASE64.encode(sct.log_id),
            timestamp: sct.timestamp,
            extensions: BASE64.encode(&sct.extensions),
            signature: BASE64.encode(sct.signature.to_bytes().ok()?),
        })
    }

    /// Decode the SCT carried by this response
    ///
    /// # Errors
    ///
    /// Returns a description of the first field that does not decode
    pub fn into_sct(self) -> Result<SignedCertificateTimestamp, String> {
        let id = BASE64
            .decode(&self.id)
            .map_err(|e| format!("id: {e}"))?;
        let log_id: [u8; 32] = id
            .try_into()
            .map_err(|id: Vec<u8>| format!("id is {} bytes, expected 32", id.len()))?;
        let extensions = BASE64
            .decode(&self.extensions)
            .map_err(|e| format!("extensions: {e}"))?;
        let signature = BASE64
            .decode(&self.signature)
            .map_err(|e| format!("signature: {e}"))?;
        let signature = DigitallySigned::from_bytes(&signature).map_err(|e| e.to_string())?;

        Ok(SignedCertificateTimestamp {
            version: self.sct_version,
            log_id,
            timestamp: self.timestamp,
            extensions,
            signature,
        })
    }
}

/// HTTP client for one log's submission endpoint
#[derive(Debug, Clone)]
pub struct HttpLogClient {
    client: reqwest::Client,
    base: String,
}

impl HttpLogClient {
    /// Create a client for the log at `url`
    #[must_use]
    pub fn new(client: reqwest::Client, url: &Url) -> Self {
        Self {
            client,
            base: url.as_str().trim_end_matches('/').to_string(),
        }
    }

    /// Log submission URL without trailing slash
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base)
    }

    async fn submit(&self, path: &str, chain: &CertChain) -> LogResult<SignedCertificateTimestamp> {
        let endpoint = self.endpoint(path);
        let transport = |e: reqwest::Error| LogError::Transport {
            endpoint: endpoint.clone(),
            reason: e.to_string(),
        };

        let response = self
            .client
            .post(&endpoint)
            .json(&AddChainRequest::new(chain))
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(LogError::Submission {
                endpoint: endpoint.clone(),
                status: status.as_u16(),
                body: error_body(response.text().await),
            });
        }

        let body = response.bytes().await.map_err(transport)?;
        let decoded: AddChainResponse =
            serde_json::from_slice(&body).map_err(|e| LogError::Decode {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;
        let sct = decoded.into_sct().map_err(|reason| LogError::Decode {
            endpoint: endpoint.clone(),
            reason,
        })?;

        debug!(
            endpoint = %endpoint,
            log_id = %sct.log_id_hex(),
            timestamp = sct.timestamp,
            "submission accepted"
        );
        Ok(sct)
    }
}

/// Body of a rejection, or why it could not be read
fn error_body<E: std::fmt::Display>(read: Result<String, E>) -> String {
    match read {
        Ok(body) => truncate(body.trim(), MAX_ERROR_BODY),
        Err(e) => format!("<body unreadable: {e}>"),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

#[async_trait]
impl LogSubmitter for HttpLogClient {
    async fn add_pre_chain(&self, chain: &CertChain) -> LogResult<SignedCertificateTimestamp> {
        self.submit(ADD_PRE_CHAIN, chain).await
    }

    async fn add_chain(&self, chain: &CertChain) -> LogResult<SignedCertificateTimestamp> {
        self.submit(ADD_CHAIN, chain).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::{Reply, TestLog};
    use woodpecker_core::CtExtensions;

    fn sample_sct() -> SignedCertificateTimestamp {
        SignedCertificateTimestamp {
            version: 0,
            log_id: [0x42; 32],
            timestamp: 1_737_000_000_123,
            extensions: CtExtensions::with_leaf_index(77)
                .unwrap()
                .to_bytes()
                .unwrap(),
            signature: DigitallySigned {
                hash_algorithm: 4,
                signature_algorithm: 3,
                signature: vec![0x30, 0x02, 0x01, 0x00],
            },
        }
    }

    fn client_for(base: &str) -> HttpLogClient {
        let url = Url::parse(base).unwrap();
        HttpLogClient::new(http_client(Duration::from_secs(5)).unwrap(), &url)
    }

    #[test]
    fn test_response_roundtrip() {
        let sct = sample_sct();
        let response = AddChainResponse::from_sct(&sct).unwrap();
        let json = serde_json::to_string(&response).unwrap();
        let decoded: AddChainResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.into_sct().unwrap(), sct);
    }

    #[test]
    fn test_response_short_log_id() {
        let mut response = AddChainResponse::from_sct(&sample_sct()).unwrap();
        response.id = BASE64.encode([1u8; 31]);
        let err = response.into_sct().unwrap_err();
        assert!(err.contains("31 bytes"), "{err}");
    }

    #[test]
    fn test_response_missing_extensions_field() {
        let json = r#"{"sct_version":0,"id":"QkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkI=","timestamp":5,"signature":"BAMAAA=="}"#;
        let response: AddChainResponse = serde_json::from_str(json).unwrap();
        let sct = response.into_sct().unwrap();
        assert!(sct.extensions.is_empty());
        assert_eq!(sct.signature.hash_algorithm, 4);
    }

    #[test]
    fn test_request_body() {
        let chain = CertChain::new(vec![1, 2, 3], vec![4, 5]);
        let body = serde_json::to_string(&AddChainRequest::new(&chain)).unwrap();
        assert_eq!(body, r#"{"chain":["AQID","BAU="]}"#);
    }

    #[test]
    fn test_endpoint_join() {
        let client = client_for("https://log.example/2025h1/");
        assert_eq!(client.base_url(), "https://log.example/2025h1");
        assert_eq!(
            client.endpoint(ADD_CHAIN),
            "https://log.example/2025h1/ct/v1/add-chain"
        );
    }

    #[test]
    fn test_error_body() {
        assert_eq!(error_body::<String>(Ok("  bad chain\n".into())), "bad chain");
        assert_eq!(
            error_body(Err("connection reset")),
            "<body unreadable: connection reset>"
        );
        let long = "x".repeat(MAX_ERROR_BODY * 2);
        assert!(error_body::<String>(Ok(long)).len() <= MAX_ERROR_BODY + 3);
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("ééé", 3), "é...");
    }

    #[tokio::test]
    async fn test_add_pre_chain_success() {
        let body = serde_json::to_string(&AddChainResponse::from_sct(&sample_sct()).unwrap()).unwrap();
        let log = TestLog::start(vec![Reply::ok(body)]).await;
        let client = client_for(log.base());

        let chain = CertChain::new(vec![1, 2, 3], vec![4, 5]);
        let sct = client.add_pre_chain(&chain).await.unwrap();
        assert_eq!(sct, sample_sct());
        assert_eq!(sct.leaf_index().unwrap(), 77);

        let requests = log.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].line(), "POST /ct/v1/add-pre-chain");
        assert_eq!(requests[0].body_text(), r#"{"chain":["AQID","BAU="]}"#);
    }

    #[tokio::test]
    async fn test_add_chain_rejected() {
        let log = TestLog::start(vec![Reply::status(400, "unknown issuer")]).await;
        let client = client_for(log.base());

        let err = client
            .add_chain(&CertChain::new(vec![1], vec![2]))
            .await
            .unwrap_err();
        match err {
            LogError::Submission {
                endpoint,
                status,
                body,
            } => {
                assert!(endpoint.ends_with("/ct/v1/add-chain"));
                assert_eq!(status, 400);
                assert_eq!(body, "unknown issuer");
            }
            other => panic!("expected Submission, got {other:?}"),
        }
        assert_eq!(log.requests()[0].line(), "POST /ct/v1/add-chain");
    }

    #[tokio::test]
    async fn test_add_chain_under_prefix() {
        let body = serde_json::to_string(&AddChainResponse::from_sct(&sample_sct()).unwrap()).unwrap();
        let log = TestLog::start(vec![Reply::ok(body)]).await;
        let client = client_for(&format!("{}/mon/", log.base()));

        client
            .add_chain(&CertChain::new(vec![1], vec![2]))
            .await
            .unwrap();
        assert_eq!(log.requests()[0].line(), "POST /mon/ct/v1/add-chain");
    }

    #[tokio::test]
    async fn test_add_chain_garbage_response() {
        let log = TestLog::start(vec![Reply::ok("not json")]).await;
        let err = client_for(log.base())
            .add_chain(&CertChain::new(vec![1], vec![2]))
            .await
            .unwrap_err();
        assert!(matches!(err, LogError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client_for(&format!("http://{addr}"))
            .add_chain(&CertChain::new(vec![1], vec![2]))
            .await
            .unwrap_err();
        assert!(matches!(err, LogError::Transport { .. }));
    }
}
