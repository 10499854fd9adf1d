use std::str::FromStr;

use serde_json::Value;

use super::Error;

fn friendbot_uri(friendbot_url: &str, address: &str) -> Result<http::Uri, Error> {
    let base = friendbot_url.trim_end_matches('/');
    let url = format!("{base}/?addr={address}");
    http::Uri::from_str(&url).map_err(|_| Error::InvalidUrl(url))
}

pub(super) async fn fund(friendbot_url: &str, address: &str) -> Result<(), Error> {
    let uri = friendbot_uri(friendbot_url, address)?;
    tracing::debug!("URL {uri:?}");
    let response = match uri.scheme_str() {
        Some("http") => hyper::Client::new().get(uri.clone()).await?,
        Some("https") => {
            let https = hyper_tls::HttpsConnector::new();
            hyper::Client::builder()
                .build::<_, hyper::Body>(https)
                .get(uri.clone())
                .await?
        }
        _ => {
            return Err(Error::InvalidUrl(uri.to_string()));
        }
    };
    let status = response.status();
    let body = hyper::body::to_bytes(response.into_body()).await?;
    if status.is_success() {
        return Ok(());
    }
    let detail = serde_json::from_slice::<Value>(&body)
        .ok()
        .and_then(|res| Some(res.get("detail")?.as_str()?.to_string()));
    tracing::debug!(?detail, "friendbot returned {status}");
    match detail {
        Some(detail) if detail.contains("account already funded to starting balance") => {
            tracing::debug!("friendbot reports account already funded");
            Ok(())
        }
        Some(detail) => Err(Error::FailedToFundAccount(detail)),
        None => Err(Error::FailedToFundAccount(format!("status {status}"))),
    }
}
