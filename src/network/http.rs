use super::NetworkError;
use isahc::ResponseExt;
use serde::Deserialize;
use url::Url;

#[derive(Debug, Deserialize)]
struct WsStartResponse {
    ok: bool,

    #[serde(default)]
    url: Option<Url>,

    #[serde(default)]
    error: Option<String>,
}

/// Ask the node for a websocket session URL.
pub async fn ws_start(node: &Url) -> Result<Url, NetworkError> {
    let json = isahc::post_async(node.as_str(), ())
        .await?
        .text_async()
        .await?;

    let response: WsStartResponse = serde_json::from_str(&json)?;

    if !response.ok {
        return Err(NetworkError::Negotiation(
            response.error.unwrap_or_else(|| "unknown error".into()),
        ));
    }

    response
        .url
        .ok_or_else(|| NetworkError::Negotiation("response did not include a url".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_parsing() {
        let ok: WsStartResponse =
            serde_json::from_str(r#"{"ok": true, "url": "wss://krist.example/gateway/abc"}"#)
                .unwrap();
        assert!(ok.ok);
        assert_eq!(
            ok.url.unwrap().as_str(),
            "wss://krist.example/gateway/abc"
        );

        let refused: WsStartResponse =
            serde_json::from_str(r#"{"ok": false, "error": "rate_limit_hit"}"#).unwrap();
        assert!(!refused.ok);
        assert_eq!(refused.error.as_deref(), Some("rate_limit_hit"));
    }
}
