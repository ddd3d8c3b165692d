use crate::error::DispatchError;
use crate::link::{LinkHandle, MediaKind};
use crate::store::CommandAction;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};
use url::Url;

/// Execute the action bound to a matched command.
///
/// Every failure surfaces as a `DispatchError` for the caller to log and
/// answer with the generic in-chat notice; nothing here panics or unwinds
/// into the session event loop.
pub async fn respond(
    handle: &dyn LinkHandle,
    chat: &str,
    action: &CommandAction,
    http: &reqwest::Client,
    asset_root: &Path,
) -> Result<(), DispatchError> {
    match action {
        CommandAction::Text { response } => {
            handle.send_text(chat, response).await.map_err(Into::into)
        }
        CommandAction::Image { media_url, caption } => {
            send_media(
                handle,
                chat,
                MediaKind::Image,
                media_url,
                caption.as_deref(),
                http,
                asset_root,
            )
            .await
        }
        CommandAction::Video { media_url, caption } => {
            send_media(
                handle,
                chat,
                MediaKind::Video,
                media_url,
                caption.as_deref(),
                http,
                asset_root,
            )
            .await
        }
        CommandAction::Api {
            api_url,
            api_response_path,
        } => {
            let value = fetch_api_value(http, api_url, api_response_path).await?;
            handle.send_text(chat, &value).await.map_err(Into::into)
        }
    }
}

pub async fn send_media(
    handle: &dyn LinkHandle,
    chat: &str,
    kind: MediaKind,
    reference: &str,
    caption: Option<&str>,
    http: &reqwest::Client,
    asset_root: &Path,
) -> Result<(), DispatchError> {
    let bytes = resolve_media(http, asset_root, reference).await?;
    handle
        .send_media(chat, kind, bytes, caption)
        .await
        .map_err(Into::into)
}

/// An absolute http(s) URL is fetched remotely; anything else resolves as a
/// path under the static asset root.
pub async fn resolve_media(
    http: &reqwest::Client,
    asset_root: &Path,
    reference: &str,
) -> Result<Vec<u8>, DispatchError> {
    if is_remote(reference) {
        let response = http.get(reference).send().await?.error_for_status()?;
        return Ok(response.bytes().await?.to_vec());
    }

    let path = local_asset_path(asset_root, reference)?;
    tokio::fs::read(&path)
        .await
        .map_err(|e| DispatchError::Media(format!("read {}: {e}", path.display())))
}

/// GET the API, parse JSON, walk the dotted response path, and render the
/// leaf as text. Each segment must be a direct field of the current object.
pub async fn fetch_api_value(
    http: &reqwest::Client,
    api_url: &str,
    response_path: &str,
) -> Result<String, DispatchError> {
    let payload: Value = http
        .get(api_url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    extract_path(&payload, response_path)
}

pub fn extract_path(payload: &Value, response_path: &str) -> Result<String, DispatchError> {
    let mut current = payload;
    for segment in response_path.split('.') {
        current = current
            .get(segment)
            .ok_or_else(|| DispatchError::InvalidResponsePath {
                path: response_path.to_string(),
            })?;
    }
    Ok(render_leaf(current))
}

fn render_leaf(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_remote(reference: &str) -> bool {
    Url::parse(reference)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

fn local_asset_path(asset_root: &Path, reference: &str) -> Result<PathBuf, DispatchError> {
    let relative = Path::new(reference.trim_start_matches('/'));
    if relative
        .components()
        .any(|component| matches!(component, Component::ParentDir))
    {
        return Err(DispatchError::Media(format!(
            "path escapes asset root: {reference}"
        )));
    }
    Ok(asset_root.join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn extract_path_walks_nested_objects() {
        let payload = json!({"data": {"text": "hello"}});
        assert_eq!(extract_path(&payload, "data.text").unwrap(), "hello");
    }

    #[test]
    fn extract_path_renders_non_string_leaf() {
        let payload = json!({"result": 42});
        assert_eq!(extract_path(&payload, "result").unwrap(), "42");
    }

    #[test]
    fn extract_path_missing_segment_fails() {
        let payload = json!({"data": {"text": "hello"}});
        let err = extract_path(&payload, "data.missing").unwrap_err();
        assert!(matches!(err, DispatchError::InvalidResponsePath { .. }));
    }

    #[test]
    fn extract_path_does_not_traverse_through_leaf() {
        let payload = json!({"data": "flat"});
        assert!(extract_path(&payload, "data.text").is_err());
    }

    #[test]
    fn remote_detection() {
        assert!(is_remote("https://cdn.example.com/poster.png"));
        assert!(is_remote("http://cdn.example.com/poster.png"));
        assert!(!is_remote("poster.png"));
        assert!(!is_remote("media/poster.png"));
        assert!(!is_remote("file:///etc/passwd"));
    }

    #[test]
    fn local_asset_path_rejects_parent_components() {
        let root = Path::new("/srv/assets");
        assert!(local_asset_path(root, "../secret").is_err());
        assert!(local_asset_path(root, "media/../../secret").is_err());
        assert_eq!(
            local_asset_path(root, "/media/poster.png").unwrap(),
            root.join("media/poster.png")
        );
    }

    #[tokio::test]
    async fn fetch_api_value_extracts_field() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quote"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "text": "stay curious" }
            })))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let value = fetch_api_value(&http, &format!("{}/quote", server.uri()), "data.text")
            .await
            .unwrap();
        assert_eq!(value, "stay curious");
    }

    #[tokio::test]
    async fn fetch_api_value_bad_path_reports_invalid_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quote"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let err = fetch_api_value(&http, &format!("{}/quote", server.uri()), "data.text")
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidResponsePath { .. }));
    }

    #[tokio::test]
    async fn fetch_api_value_http_error_is_dispatch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quote"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let err = fetch_api_value(&http, &format!("{}/quote", server.uri()), "result")
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Http(_)));
    }

    #[tokio::test]
    async fn fetch_api_value_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"result": "late"}))
                    .set_delay(std::time::Duration::from_millis(300)),
            )
            .mount(&server)
            .await;

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(50))
            .build()
            .unwrap();
        let err = fetch_api_value(&http, &format!("{}/slow", server.uri()), "result")
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Http(_)));
    }

    #[tokio::test]
    async fn resolve_media_reads_local_asset() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("media")).unwrap();
        std::fs::write(dir.path().join("media/poster.png"), b"png-bytes").unwrap();

        let http = reqwest::Client::new();
        let bytes = resolve_media(&http, dir.path(), "media/poster.png")
            .await
            .unwrap();
        assert_eq!(bytes, b"png-bytes");
    }

    #[tokio::test]
    async fn resolve_media_fetches_remote_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/poster.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"remote-bytes".to_vec()))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let bytes = resolve_media(
            &http,
            Path::new("/nonexistent"),
            &format!("{}/poster.png", server.uri()),
        )
        .await
        .unwrap();
        assert_eq!(bytes, b"remote-bytes");
    }

    #[tokio::test]
    async fn resolve_media_missing_local_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let http = reqwest::Client::new();
        let err = resolve_media(&http, dir.path(), "missing.png")
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Media(_)));
    }
}
