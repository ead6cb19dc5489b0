//! Push channel upgrade and connection handling
//!
//! Attach flow:
//! 1. Session id from the `session` query parameter (URL tracking) or the session cookie
//! 2. Correlation key via `session_correlation_id`; the connection registers under it plus the
//!    `page` query parameter and supersedes an earlier connection from the same page only
//! 3. Probe context (tenant domain, bearer token, session) captured from the upgrade request
//!    and reused for every check issued on this channel

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::channel::{cookie_value, session_correlation_id, AttachRequest, ChannelHandle};
use crate::routes::{parse_query, unauthorized_response};
use crate::server::http::AppState;
use crate::topology::context::{DEFAULT_DOMAIN, DOMAIN_HEADER};
use crate::topology::ProbeContext;

/// WebSocket type after upgrade
type HyperWebSocket =
    hyper_tungstenite::WebSocketStream<hyper_util::rt::TokioIo<hyper::upgrade::Upgraded>>;

/// Everything decided about a channel at attach time
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub correlation_key: String,
    /// Page instance the channel serves, when the client names one
    pub page: Option<String>,
    pub context: ProbeContext,
}

/// Handle WebSocket upgrade for the topology push channel
pub async fn handle_topology_upgrade(
    state: Arc<AppState>,
    mut req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let attachment = match resolve_attachment(&state, &req) {
        Ok(a) => a,
        Err(err_msg) => {
            warn!("Push channel attach refused: {}", err_msg);
            return unauthorized_response(&err_msg);
        }
    };

    match hyper_tungstenite::upgrade(&mut req, None) {
        Ok((response, websocket)) => {
            tokio::spawn(async move {
                match websocket.await {
                    Ok(ws) => {
                        if let Err(e) = run_channel(ws, state, attachment).await {
                            warn!("Push channel error: {}", e);
                        }
                    }
                    Err(e) => {
                        error!("WebSocket upgrade failed: {:?}", e);
                    }
                }
            });

            let (parts, _) = response.into_parts();
            Response::from_parts(parts, Full::new(Bytes::new()))
        }
        Err(e) => {
            error!("WebSocket upgrade error: {:?}", e);
            Response::builder()
                .status(StatusCode::BAD_REQUEST)
                .body(Full::new(Bytes::from(format!(
                    "WebSocket upgrade failed: {e}"
                ))))
                .unwrap()
        }
    }
}

/// Work out session binding and probe context from a request.
///
/// Also gates the polling endpoints, which answer per session and tenant like the channel.
pub(crate) fn resolve_attachment<B>(
    state: &AppState,
    req: &Request<B>,
) -> Result<Attachment, String> {
    let query = parse_query(req.uri().query());
    let url_session = query.get("session").filter(|s| !s.is_empty()).cloned();

    let cookie = req
        .headers()
        .get_all(hyper::header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|header| cookie_value(header, &state.args.session_cookie_name))
        .map(str::to_string);

    let session_id = match url_session.clone().or_else(|| cookie.clone()) {
        Some(id) => id,
        None if state.args.dev_mode => {
            let id = Uuid::new_v4().to_string();
            debug!("Dev mode: no session given, using fresh session {}", id);
            id
        }
        None => return Err("Session required".to_string()),
    };

    // The cookie is trustworthy only when it names the session being attached
    let requested_session_valid = match (&cookie, &url_session) {
        (Some(c), Some(u)) => c == u,
        (Some(_), None) => true,
        _ => false,
    };

    let correlation = session_correlation_id(
        &state.args.session_tracking,
        &AttachRequest {
            session_id: &session_id,
            cookie: cookie.as_deref(),
            requested_session_valid,
        },
    );
    let correlation_key = correlation
        .or_else(|| cookie.clone())
        .unwrap_or_else(|| session_id.clone());

    let domain = req
        .headers()
        .get(DOMAIN_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_DOMAIN);

    let mut context = ProbeContext::new(domain).with_session(session_id);
    if let Some(token) = req
        .headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        context = context.with_bearer_token(token.trim());
    }

    Ok(Attachment {
        correlation_key,
        page: query.get("page").filter(|p| !p.is_empty()).cloned(),
        context,
    })
}

/// Serve one attached push channel until it closes or is superseded
async fn run_channel(
    ws: HyperWebSocket,
    state: Arc<AppState>,
    attachment: Attachment,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (mut sender, mut receiver) = ws.split();
    let ChannelHandle {
        key,
        id,
        mut superseded,
    } = state
        .channels
        .attach(&attachment.correlation_key, attachment.page.as_deref());

    info!(
        channel = %id,
        key = %key,
        domain = %attachment.context.domain,
        "Push channel attached"
    );

    let result = loop {
        tokio::select! {
            _ = &mut superseded => {
                info!(channel = %id, "Push channel superseded by reconnect");
                let _ = sender.send(WsMessage::Close(None)).await;
                break Ok(());
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        debug!(channel = %id, "Received frame: {}", text);
                        let Some(frame) = state.dispatcher.on_message(&text, &attachment.context) else {
                            continue;
                        };
                        match frame.to_json() {
                            Ok(json) => {
                                if sender.send(WsMessage::Text(json)).await.is_err() {
                                    break Ok(());
                                }
                            }
                            Err(e) => warn!(channel = %id, "Could not encode reply: {}", e),
                        }
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = sender.send(WsMessage::Pong(data)).await;
                    }
                    Some(Ok(WsMessage::Close(_))) => break Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Err(e.into()),
                    None => break Ok(()),
                }
            }
        }
    };

    state.channels.detach(&key, id);
    info!(channel = %id, key = %key, "Push channel closed");
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Args;
    use crate::topology::testing::{Answer, GatedProber, MapDirectory};
    use clap::Parser;

    fn state(extra: &[&str]) -> AppState {
        let mut argv = vec!["topology-status"];
        argv.extend_from_slice(extra);
        AppState::with_collaborators(
            Args::try_parse_from(argv).unwrap(),
            Arc::new(MapDirectory::new(["ldap1"])),
            Arc::new(GatedProber::open(Answer::Reachable)),
        )
    }

    fn request(uri: &str, headers: &[(&str, &str)]) -> Request<()> {
        let mut builder = Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap()
    }

    #[tokio::test]
    async fn test_cookie_session_binds_to_cookie() {
        let state = state(&[]);
        let req = request(
            "/topology/ws",
            &[
                ("cookie", "SESSIONID=abc"),
                (DOMAIN_HEADER, "Two"),
                ("authorization", "Bearer tok"),
            ],
        );

        let attachment = resolve_attachment(&state, &req).unwrap();
        assert_eq!(attachment.correlation_key, "abc");
        assert_eq!(attachment.context.domain, "Two");
        assert_eq!(attachment.context.session_id.as_deref(), Some("abc"));
        assert_eq!(attachment.context.bearer_token.as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn test_mismatched_cookie_falls_back_to_url_session() {
        let state = state(&[]);
        let req = request("/topology/ws?session=url-sess", &[("cookie", "SESSIONID=stale")]);

        let attachment = resolve_attachment(&state, &req).unwrap();
        assert_eq!(attachment.correlation_key, "url-sess");
        assert_eq!(attachment.context.domain, DEFAULT_DOMAIN);
    }

    #[tokio::test]
    async fn test_url_only_tracking() {
        let state = state(&["--session-tracking", "url"]);
        let req = request("/topology/ws?session=s-9", &[("cookie", "SESSIONID=s-9")]);

        assert_eq!(resolve_attachment(&state, &req).unwrap().correlation_key, "s-9");
    }

    #[tokio::test]
    async fn test_session_required_outside_dev_mode() {
        let req = request("/topology/ws", &[]);

        assert!(resolve_attachment(&state(&[]), &req).is_err());
        assert!(resolve_attachment(&state(&["--dev-mode"]), &req).is_ok());
    }

    #[tokio::test]
    async fn test_page_param_kept_separate_from_session() {
        let state = state(&[]);
        let tab_a = request("/topology/ws?page=7", &[("cookie", "SESSIONID=abc")]);
        let tab_b = request("/topology/ws?page=9", &[("cookie", "SESSIONID=abc")]);

        let a = resolve_attachment(&state, &tab_a).unwrap();
        let b = resolve_attachment(&state, &tab_b).unwrap();
        assert_eq!(a.correlation_key, b.correlation_key);
        assert_eq!(a.page.as_deref(), Some("7"));
        assert_eq!(b.page.as_deref(), Some("9"));

        let first = state.channels.attach(&a.correlation_key, a.page.as_deref());
        let second = state.channels.attach(&b.correlation_key, b.page.as_deref());
        assert!(state.channels.is_attached(&first.key));
        assert!(state.channels.is_attached(&second.key));
        assert_eq!(state.channels.session_connections("abc"), 2);
    }
}
