//! The presenter loop: reissue and rotate on a cadence.
//!
//! Runs as one background task per server. Each `Reissue` beat mints a
//! session; every beat then republishes the current display code so
//! `WatchCodes` subscribers see the new frame. A client-initiated
//! issuance restarts the cycle so rotations stay aligned with the newest
//! session's window.

use std::sync::Arc;

use rollcall_cadence::{BeatKind, Cadence, CadenceConfig};
use rollcall_protocol::Codec;
use rollcall_session::{AttendanceRecorder, Clock, ExpiringStore};

use crate::server::ServerState;

pub(crate) async fn run_presenter<S, R, K, C>(
    state: Arc<ServerState<S, R, K, C>>,
    config: CadenceConfig,
) where
    S: ExpiringStore,
    R: AttendanceRecorder,
    K: Clock,
    C: Codec,
{
    let mut cadence = Cadence::new(config);
    tracing::info!(
        reissue_every = ?cadence.config().reissue_every,
        rotate_every = ?cadence.config().rotate_every,
        "presenter loop started"
    );

    loop {
        tokio::select! {
            beat = cadence.wait_for_beat() => {
                if beat.kind == BeatKind::Reissue {
                    if let Err(e) = state.issuer.issue().await {
                        tracing::warn!(beat = beat.beat, error = %e, "scheduled reissue failed");
                    }
                    let stats = cadence.stats();
                    tracing::debug!(
                        reissues = stats.reissues,
                        rotations = stats.rotations,
                        late_beats = stats.late_beats,
                        skipped_beats = stats.skipped_beats,
                        "presenter cadence"
                    );
                }
                state.publish_current_code().await;
            }
            () = state.reissued.notified() => {
                cadence.restart_cycle();
            }
        }
    }
}
