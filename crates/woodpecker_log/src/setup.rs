//! Log setup from a configured log descriptor.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use crate::checkpoint::CheckpointVerifier;
use crate::client::HttpLogClient;
use crate::error::{LogError, LogResult};
use crate::tile::HttpTileFetcher;
use crate::verifier::TileVerifier;

/// One log under test, as configured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogDescriptor {
    /// Submission prefix
    pub url: String,
    /// Base64 DER SubjectPublicKeyInfo
    #[serde(rename = "publickey")]
    pub public_key: String,
    /// Monitoring (tile) prefix
    pub monitoring: String,
    /// Start of the accepted NotAfter window, inclusive
    #[serde(rename = "notafterstart", default)]
    pub not_after_start: Option<DateTime<Utc>>,
    /// End of the accepted NotAfter window, exclusive
    #[serde(rename = "notafterlimit", default)]
    pub not_after_limit: Option<DateTime<Utc>>,
}

/// The network collaborators for one log
#[derive(Debug, Clone)]
pub struct LogClients {
    /// Short name for logs and reports, the submission URL
    pub name: String,
    /// add-chain / add-pre-chain client
    pub submitter: Arc<HttpLogClient>,
    /// Checkpoint and tile reader
    pub verifier: Arc<TileVerifier>,
}

fn parse_url(field: &str, value: &str) -> LogResult<Url> {
    let url = Url::parse(value).map_err(|e| LogError::setup(format!("{field} {value:?}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(LogError::setup(format!(
            "{field} {value:?}: unsupported scheme {scheme}"
        ))),
    }
}

/// Validate a log descriptor and build its collaborators on `client`.
///
/// A NotAfter window that excludes the validity of certificates issued now is
/// logged, not rejected.
///
/// # Errors
///
/// Returns [`LogError::Setup`] for a bad public key, URL or NotAfter window
pub fn connect(descriptor: &LogDescriptor, client: &reqwest::Client) -> LogResult<LogClients> {
    let spki = BASE64
        .decode(descriptor.public_key.trim())
        .map_err(|e| LogError::setup(format!("public key is not base64: {e}")))?;
    let checkpoints = CheckpointVerifier::new(&spki)?;
    let log_id = BASE64.encode(checkpoints.log_id());

    let url = parse_url("url", &descriptor.url)?;
    let monitoring = parse_url("monitoring", &descriptor.monitoring)?;

    if let (Some(start), Some(limit)) = (descriptor.not_after_start, descriptor.not_after_limit) {
        if start >= limit {
            return Err(LogError::setup(format!(
                "notafterstart {start} is not before notafterlimit {limit}"
            )));
        }
    }
    let not_after = Utc::now().checked_add_months(Months::new(3));
    if let Some(not_after) = not_after {
        let early = descriptor.not_after_start.is_some_and(|start| not_after < start);
        let late = descriptor.not_after_limit.is_some_and(|limit| not_after >= limit);
        if early || late {
            warn!(
                log = %descriptor.url,
                %not_after,
                start = ?descriptor.not_after_start,
                limit = ?descriptor.not_after_limit,
                "issued certificates fall outside the log's NotAfter window"
            );
        }
    }

    let fetcher = Arc::new(HttpTileFetcher::new(client.clone(), &monitoring));
    let clients = LogClients {
        name: descriptor.url.clone(),
        submitter: Arc::new(HttpLogClient::new(client.clone(), &url)),
        verifier: Arc::new(TileVerifier::new(fetcher, checkpoints)),
    };
    info!(
        log = %clients.name,
        monitoring = %monitoring,
        log_id = %log_id,
        "log configured"
    );
    Ok(clients)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use openssl::ec::{EcGroup, EcKey};
    use openssl::nid::Nid;
    use openssl::pkey::PKey;

    fn public_key() -> String {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();
        BASE64.encode(key.public_key_to_der().unwrap())
    }

    fn descriptor() -> LogDescriptor {
        LogDescriptor {
            url: "https://log.example/2025h1/".into(),
            public_key: public_key(),
            monitoring: "https://mon.example/2025h1/".into(),
            not_after_start: None,
            not_after_limit: None,
        }
    }

    fn setup_reason(result: LogResult<LogClients>) -> String {
        match result {
            Err(LogError::Setup { reason }) => reason,
            other => panic!("expected setup error, got {other:?}"),
        }
    }

    #[test]
    fn test_connect() {
        let clients = connect(&descriptor(), &reqwest::Client::new()).unwrap();
        assert_eq!(clients.name, "https://log.example/2025h1/");
        assert_eq!(clients.submitter.base_url(), "https://log.example/2025h1");
    }

    #[test]
    fn test_bad_base64_key() {
        let mut descriptor = descriptor();
        descriptor.public_key = "not base64!".into();
        let reason = setup_reason(connect(&descriptor, &reqwest::Client::new()));
        assert!(reason.contains("base64"), "{reason}");
    }

    #[test]
    fn test_unparsable_key() {
        let mut descriptor = descriptor();
        descriptor.public_key = BASE64.encode(b"garbage");
        setup_reason(connect(&descriptor, &reqwest::Client::new()));
    }

    #[test]
    fn test_bad_urls() {
        let mut bad_url = descriptor();
        bad_url.url = "not a url".into();
        assert!(setup_reason(connect(&bad_url, &reqwest::Client::new())).starts_with("url"));

        let mut bad_monitoring = descriptor();
        bad_monitoring.monitoring = "ftp://mon.example/".into();
        let reason = setup_reason(connect(&bad_monitoring, &reqwest::Client::new()));
        assert!(reason.contains("unsupported scheme"), "{reason}");
    }

    #[test]
    fn test_inverted_window() {
        let mut descriptor = descriptor();
        descriptor.not_after_start = Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        descriptor.not_after_limit = Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        let reason = setup_reason(connect(&descriptor, &reqwest::Client::new()));
        assert!(reason.contains("notafterstart"), "{reason}");
    }

    #[test]
    fn test_window_excluding_now_is_accepted() {
        let mut descriptor = descriptor();
        descriptor.not_after_start = Some(Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap());
        descriptor.not_after_limit = Some(Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap());
        assert!(connect(&descriptor, &reqwest::Client::new()).is_ok());
    }

    #[test]
    fn test_descriptor_yaml_keys() {
        let json = serde_json::json!({
            "url": "https://log.example/",
            "publickey": "AAAA",
            "monitoring": "https://mon.example/",
            "notafterstart": "2025-01-01T00:00:00Z",
        });
        let descriptor: LogDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(descriptor.public_key, "AAAA");
        assert_eq!(
            descriptor.not_after_start,
            Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(descriptor.not_after_limit, None);
    }
}
