//! Per-connection handler: decode, dispatch, reply.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! There is no handshake: presenter pages and scanner apps are already
//! authenticated upstream, so the first frame is a request.
//!
//! The loop waits on two things at once:
//!   1. the next client frame → decode → dispatch → one reply frame
//!   2. once the client sent `WatchCodes`, display code updates → push

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rollcall_protocol::{
    ClientMessage, Codec, DisplayCode, ProtocolError, ServerMessage,
};
use rollcall_session::{
    AttendanceRecorder, CheckInError, Clock, ExpiringStore, RecordError,
    SessionError, StoreError,
};
use tokio::sync::watch;

use crate::server::ServerState;
use crate::{RollcallError, TransportError, WsConnection};

/// What woke the connection loop.
enum Inbound {
    Frame(String),
    Code(Option<Option<DisplayCode>>),
    Closed,
    TimedOut,
    Failed(TransportError),
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<S, R, K, C>(
    conn: WsConnection,
    state: Arc<ServerState<S, R, K, C>>,
) -> Result<(), RollcallError>
where
    S: ExpiringStore,
    R: AttendanceRecorder,
    K: Clock,
    C: Codec,
{
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    let mut codes: Option<watch::Receiver<Option<DisplayCode>>> = None;

    loop {
        // Watchers may legitimately stay silent; everyone else must ping.
        let idle = codes.is_none().then_some(state.idle_timeout);

        let inbound = tokio::select! {
            inbound = recv_frame(&conn, idle) => inbound,
            update = next_code(&mut codes) => Inbound::Code(update),
        };

        let text = match inbound {
            Inbound::Frame(text) => text,
            Inbound::Code(Some(code)) => {
                send(&conn, &state.codec, &code_message(code)).await?;
                continue;
            }
            Inbound::Code(None) => {
                tracing::debug!(%conn_id, "code feed closed");
                codes = None;
                continue;
            }
            Inbound::Closed => {
                tracing::debug!(%conn_id, "connection closed cleanly");
                break;
            }
            Inbound::TimedOut => {
                tracing::info!(%conn_id, "connection idle, closing");
                let _ = conn.close().await;
                break;
            }
            Inbound::Failed(e) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                break;
            }
        };

        let msg: ClientMessage = match state.codec.decode(&text) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "failed to decode message");
                let reply = error_message(400, format!("invalid message: {e}"), false);
                send(&conn, &state.codec, &reply).await?;
                continue;
            }
        };

        let reply = match msg {
            ClientMessage::WatchCodes => {
                let mut rx = state.codes.subscribe();
                rx.mark_unchanged();
                codes = Some(rx);
                tracing::debug!(%conn_id, "watching display codes");
                current_code_reply(&state).await
            }
            other => dispatch(&state, other).await,
        };
        send(&conn, &state.codec, &reply).await?;
    }

    Ok(())
}

/// Handles one request and builds its reply.
///
/// Session and recorder failures become reply messages; nothing here
/// ends the connection.
async fn dispatch<S, R, K, C>(
    state: &ServerState<S, R, K, C>,
    msg: ClientMessage,
) -> ServerMessage
where
    S: ExpiringStore,
    R: AttendanceRecorder,
    K: Clock,
    C: Codec,
{
    match msg {
        ClientMessage::IssueSession => match state.issuer.issue().await {
            Ok(issued) => {
                state.reissued.notify_one();
                state.publish_current_code().await;
                ServerMessage::SessionIssued {
                    session_id: issued.session_id,
                    event_id: issued.event_id,
                    created_at: issued.created_at,
                    expires_at: issued.expires_at,
                    payload: issued.payload,
                    qr_image: issued.qr_image,
                }
            }
            Err(e) => session_failure(&e),
        },

        ClientMessage::CurrentCode | ClientMessage::WatchCodes => {
            current_code_reply(state).await
        }

        ClientMessage::Verify { session_id } => {
            match state.desk.verifier().verify(&session_id).await {
                Ok(verified) => ServerMessage::Verified {
                    session_id: verified.session_id,
                    event_id: verified.event_id,
                },
                Err(e) => session_failure(&e),
            }
        }

        ClientMessage::Scan {
            payload,
            student_id,
            course_id,
        } => {
            let result = state
                .desk
                .check_in(&payload, student_id.clone(), course_id.clone())
                .await;
            match result {
                Ok(check_in) => ServerMessage::AttendanceMarked {
                    session_id: check_in.session_id,
                    event_id: check_in.event_id,
                    student_id,
                    course_id,
                    date: check_in.date,
                    outcome: check_in.outcome,
                },
                Err(CheckInError::Session(e)) => session_failure(&e),
                Err(CheckInError::Record(e)) => record_failure(&e),
            }
        }

        ClientMessage::Ping { client_time } => ServerMessage::Pong {
            client_time,
            server_time: unix_millis(),
        },
    }
}

async fn current_code_reply<S, R, K, C>(state: &ServerState<S, R, K, C>) -> ServerMessage
where
    S: ExpiringStore,
    R: AttendanceRecorder,
    K: Clock,
    C: Codec,
{
    match state.issuer.current_code().await {
        Ok(code) => code_message(code),
        Err(e) => session_failure(&e),
    }
}

async fn recv_frame(conn: &WsConnection, idle: Option<Duration>) -> Inbound {
    let received = match idle {
        Some(limit) => match tokio::time::timeout(limit, conn.recv_text()).await {
            Ok(received) => received,
            Err(_) => return Inbound::TimedOut,
        },
        None => conn.recv_text().await,
    };
    match received {
        Ok(Some(text)) => Inbound::Frame(text),
        Ok(None) => Inbound::Closed,
        Err(e) => Inbound::Failed(e),
    }
}

/// Waits for the next display code. Pends forever when not watching.
///
/// Resolves to `None` if the sender is gone.
async fn next_code(
    codes: &mut Option<watch::Receiver<Option<DisplayCode>>>,
) -> Option<Option<DisplayCode>> {
    match codes {
        Some(rx) => match rx.changed().await {
            Ok(()) => Some(rx.borrow_and_update().clone()),
            Err(_) => None,
        },
        None => std::future::pending().await,
    }
}

fn code_message(code: Option<DisplayCode>) -> ServerMessage {
    match code {
        Some(code) => ServerMessage::Code(code),
        None => ServerMessage::NoCode,
    }
}

fn session_failure(err: &SessionError) -> ServerMessage {
    if let Some(reason) = err.reject_reason() {
        return ServerMessage::rejected(reason);
    }
    match err {
        SessionError::Payload(ProtocolError::Render(e)) => {
            tracing::error!(error = %e, "could not draw display code");
            error_message(500, "could not render QR image".into(), false)
        }
        SessionError::Payload(e) => error_message(400, e.to_string(), false),
        SessionError::StoreUnavailable(StoreError::Corrupt { .. }) => {
            tracing::error!(error = %err, "session store holds unreadable data");
            error_message(503, "session store returned corrupt data".into(), false)
        }
        _ => {
            tracing::warn!(error = %err, "session store unavailable");
            error_message(503, "session store unavailable".into(), err.is_retryable())
        }
    }
}

fn record_failure(err: &RecordError) -> ServerMessage {
    let retryable = matches!(err, RecordError::Unavailable(_));
    if retryable {
        tracing::warn!(error = %err, "attendance recorder unavailable");
    }
    error_message(502, err.to_string(), retryable)
}

fn error_message(code: u16, message: String, retryable: bool) -> ServerMessage {
    ServerMessage::Error {
        code,
        message,
        retryable,
    }
}

/// Encodes and sends one reply frame.
async fn send(
    conn: &WsConnection,
    codec: &impl Codec,
    msg: &ServerMessage,
) -> Result<(), RollcallError> {
    let frame = codec.encode(msg)?;
    conn.send_text(frame).await?;
    Ok(())
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_protocol::{RejectReason, SessionId};

    #[test]
    fn test_session_failure_rejection_maps_to_rejected() {
        let msg = session_failure(&SessionError::SessionExpired {
            session_id: SessionId::new("a"),
            elapsed_secs: 31,
        });
        assert_eq!(msg, ServerMessage::rejected(RejectReason::SessionExpired));
    }

    #[test]
    fn test_session_failure_store_is_retryable_503() {
        let msg = session_failure(&StoreError::Timeout(Duration::from_secs(2)).into());
        assert!(matches!(
            msg,
            ServerMessage::Error {
                code: 503,
                retryable: true,
                ..
            }
        ));
    }

    #[test]
    fn test_session_failure_corrupt_pointer_is_not_retryable() {
        let err: SessionError = StoreError::Corrupt {
            key: "qr:current".into(),
            reason: "not json".into(),
        }
        .into();
        assert!(matches!(
            session_failure(&err),
            ServerMessage::Error {
                code: 503,
                retryable: false,
                ..
            }
        ));
    }

    #[test]
    fn test_session_failure_payload_is_400() {
        let err: SessionError = ProtocolError::InvalidPayload("empty scan".into()).into();
        let msg = session_failure(&err);
        assert!(matches!(
            msg,
            ServerMessage::Error {
                code: 400,
                retryable: false,
                ..
            }
        ));
    }

    #[test]
    fn test_session_failure_render_is_500() {
        let err: SessionError = ProtocolError::Render("data too long".into()).into();
        assert!(matches!(
            session_failure(&err),
            ServerMessage::Error {
                code: 500,
                retryable: false,
                ..
            }
        ));
    }

    #[test]
    fn test_record_failure_only_unavailable_is_retryable() {
        let down = record_failure(&RecordError::Unavailable("db".into()));
        let unknown = record_failure(&RecordError::UnknownStudent("x".into()));
        assert!(matches!(down, ServerMessage::Error { code: 502, retryable: true, .. }));
        assert!(matches!(unknown, ServerMessage::Error { code: 502, retryable: false, .. }));
    }

    #[test]
    fn test_code_message_none_is_no_code() {
        assert_eq!(code_message(None), ServerMessage::NoCode);
    }
}
