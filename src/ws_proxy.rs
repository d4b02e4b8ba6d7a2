//! WebSocket proxying for the `/ws` prefix.
//!
//! The client handshake is accepted locally, then an upstream connection is
//! opened to the backend with the scheme swapped to `ws`/`wss`. Frames relay
//! in both directions until either side closes; closing one end tears down
//! the other promptly.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{HeaderMap, Uri};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error};

use crate::config::ProxyConfig;
use crate::server::ProxyState;

/// Upgrade a `/ws` request and relay it to the backend. Non-upgrade requests
/// are rejected by the `WebSocketUpgrade` extractor before this body runs.
pub async fn ws_proxy(
    State(state): State<ProxyState>,
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let path = uri.path().to_string();
    let query = uri.query().map(|value| value.to_string());

    let protocols = headers
        .get("sec-websocket-protocol")
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect::<Vec<String>>()
        })
        .unwrap_or_default();
    let ws = if protocols.is_empty() {
        ws
    } else {
        ws.protocols(protocols)
    };

    debug!(path = %path, query = ?query, "WebSocket upgrade");

    ws.on_upgrade(move |socket| async move {
        if let Err(error) =
            proxy_websocket(&state.config, &path, query.as_deref(), &headers, socket).await
        {
            error!("WebSocket proxy error: {error}");
        }
    })
}

fn build_ws_request(
    config: &ProxyConfig,
    path: &str,
    query: Option<&str>,
    headers: &HeaderMap,
) -> Result<axum::http::Request<()>, Box<dyn std::error::Error + Send + Sync>> {
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;

    let url = config.ws_target_url(path, query)?;
    let mut request = url.to_string().into_client_request()?;

    if let Some(value) = headers.get("sec-websocket-protocol") {
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", value.clone());
    }
    // Do not forward Sec-WebSocket-Extensions. tokio-tungstenite does not
    // support permessage-deflate unless explicitly enabled, and negotiating
    // extensions here can cause upstream handshake failures.
    for name in ["origin", "user-agent", "cookie", "authorization"] {
        if let Some(value) = headers.get(name) {
            request.headers_mut().insert(name, value.clone());
        }
    }

    Ok(request)
}

fn try_set_ws_nodelay(ws: &WebSocketStream<MaybeTlsStream<TcpStream>>) {
    match ws.get_ref() {
        MaybeTlsStream::Plain(stream) => {
            if let Err(err) = stream.set_nodelay(true) {
                debug!(error = %err, "Failed to enable TCP_NODELAY for WebSocket upstream");
            }
        }
        _ => {
            debug!("Skipping TCP_NODELAY for TLS WebSocket upstream");
        }
    }
}

async fn proxy_websocket(
    config: &ProxyConfig,
    path: &str,
    query: Option<&str>,
    headers: &HeaderMap,
    client_socket: WebSocket,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let request = build_ws_request(config, path, query, headers)?;

    let (upstream_ws, response) = tokio_tungstenite::connect_async(request).await?;
    if let Some(protocol) = response
        .headers()
        .get("sec-websocket-protocol")
        .and_then(|value| value.to_str().ok())
    {
        debug!(protocol = %protocol, "upstream websocket protocol");
    }
    try_set_ws_nodelay(&upstream_ws);
    let (mut upstream_sink, mut upstream_stream) = upstream_ws.split();
    let (mut client_sink, mut client_stream) = client_socket.split();

    let mut client_to_upstream = tokio::spawn(async move {
        while let Some(msg_result) = client_stream.next().await {
            match msg_result {
                Ok(Message::Binary(data)) => {
                    if upstream_sink
                        .send(TungsteniteMessage::Binary(data.to_vec()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Ok(Message::Text(text)) => {
                    if upstream_sink
                        .send(TungsteniteMessage::Text(text.to_string()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Ok(Message::Ping(data)) => {
                    if upstream_sink
                        .send(TungsteniteMessage::Ping(data.to_vec()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Ok(Message::Pong(data)) => {
                    if upstream_sink
                        .send(TungsteniteMessage::Pong(data.to_vec()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Ok(Message::Close(_)) => break,
                Err(_) => break,
            }
        }
        let _ = upstream_sink.send(TungsteniteMessage::Close(None)).await;
    });

    let mut upstream_to_client = tokio::spawn(async move {
        while let Some(msg_result) = upstream_stream.next().await {
            match msg_result {
                Ok(TungsteniteMessage::Binary(data)) => {
                    if client_sink.send(Message::Binary(data.into())).await.is_err() {
                        break;
                    }
                }
                Ok(TungsteniteMessage::Text(text)) => {
                    if client_sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Ok(TungsteniteMessage::Ping(data)) => {
                    if client_sink.send(Message::Ping(data.into())).await.is_err() {
                        break;
                    }
                }
                Ok(TungsteniteMessage::Pong(data)) => {
                    if client_sink.send(Message::Pong(data.into())).await.is_err() {
                        break;
                    }
                }
                Ok(TungsteniteMessage::Close(_)) => break,
                Ok(TungsteniteMessage::Frame(_)) => {}
                Err(_) => break,
            }
        }
        let _ = client_sink.send(Message::Close(None)).await;
    });

    // Whichever direction finishes first, the other must not linger.
    tokio::select! {
        _ = &mut client_to_upstream => upstream_to_client.abort(),
        _ = &mut upstream_to_client => client_to_upstream.abort(),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::build_ws_request;
    use crate::config::ProxyConfig;
    use axum::http::{HeaderMap, HeaderValue};

    fn config(backend: &str) -> ProxyConfig {
        ProxyConfig::new(0, backend, "build").expect("valid config")
    }

    #[test]
    fn websocket_request_targets_swapped_scheme() {
        let request = build_ws_request(
            &config("http://127.0.0.1:3000"),
            "/ws/updates",
            None,
            &HeaderMap::new(),
        )
        .expect("build ws request");
        assert_eq!(request.uri().scheme_str(), Some("ws"));
        assert_eq!(request.uri().path(), "/ws/updates");
    }

    #[test]
    fn websocket_request_forwards_subprotocol() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "sec-websocket-protocol",
            HeaderValue::from_static("graphql-ws"),
        );
        let request = build_ws_request(&config("http://127.0.0.1:3000"), "/ws", None, &headers)
            .expect("build ws request");
        assert_eq!(
            request
                .headers()
                .get("sec-websocket-protocol")
                .and_then(|value| value.to_str().ok()),
            Some("graphql-ws")
        );
    }

    #[test]
    fn websocket_request_omits_extensions_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "sec-websocket-extensions",
            HeaderValue::from_static("permessage-deflate; client_max_window_bits"),
        );
        let request = build_ws_request(&config("http://127.0.0.1:3000"), "/ws", None, &headers)
            .expect("build ws request");
        assert!(
            request.headers().get("sec-websocket-extensions").is_none(),
            "Sec-WebSocket-Extensions should not be forwarded"
        );
    }

    #[test]
    fn websocket_request_forwards_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("session=abc"));
        let request = build_ws_request(&config("http://127.0.0.1:3000"), "/ws", None, &headers)
            .expect("build ws request");
        assert_eq!(
            request
                .headers()
                .get("cookie")
                .and_then(|value| value.to_str().ok()),
            Some("session=abc")
        );
    }
}
