//! The attendance desk: scan in, mark out.
//!
//! Glues a [`SessionVerifier`] to an [`AttendanceRecorder`] so that a
//! handler can turn one scan into one attendance mark with a single
//! call. The recorder is never touched unless verification succeeded.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rollcall_protocol::{CourseId, EventId, RecordOutcome, SessionId, StudentId};

use crate::{
    AttendanceMark, AttendanceRecorder, CheckInError, Clock, ExpiringStore,
    SessionVerifier, SystemClock,
};

/// The result of a successful check-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckIn {
    pub session_id: SessionId,
    pub event_id: EventId,
    pub date: NaiveDate,
    pub outcome: RecordOutcome,
}

/// Turns scans into attendance marks.
///
/// Owns the verifier and shares the recorder, so one desk serves every
/// connection task.
pub struct AttendanceDesk<S, R, C = SystemClock> {
    verifier: SessionVerifier<S, C>,
    recorder: Arc<R>,
}

impl<S, R, C> AttendanceDesk<S, R, C>
where
    S: ExpiringStore,
    R: AttendanceRecorder,
    C: Clock,
{
    /// Creates a desk that records through `recorder` once `verifier`
    /// accepts a scan.
    pub fn new(verifier: SessionVerifier<S, C>, recorder: Arc<R>) -> Self {
        Self { verifier, recorder }
    }

    /// The verifier, for plain verification without recording.
    pub fn verifier(&self) -> &SessionVerifier<S, C> {
        &self.verifier
    }

    /// Verifies `scanned` and, if it is the live session, records the
    /// student as present on the UTC date of the verification.
    ///
    /// # Errors
    /// [`CheckInError::Session`] if the scan doesn't verify (nothing is
    /// recorded), [`CheckInError::Record`] if the recorder fails.
    pub async fn check_in(
        &self,
        scanned: &str,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<CheckIn, CheckInError> {
        let verified = self.verifier.verify_scan(scanned).await?;

        let mark = AttendanceMark {
            student_id,
            course_id,
            date: utc_date(verified.verified_at),
            session_id: verified.session_id,
            event_id: verified.event_id,
        };
        let outcome = self.recorder.record(&mark).await?;

        tracing::info!(
            student_id = %mark.student_id,
            course_id = %mark.course_id,
            session_id = %mark.session_id,
            ?outcome,
            "check-in accepted"
        );

        Ok(CheckIn {
            session_id: mark.session_id,
            event_id: mark.event_id,
            date: mark.date,
            outcome,
        })
    }
}

/// Calendar date of a Unix timestamp in UTC.
fn utc_date(secs: u64) -> NaiveDate {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|at| at.date_naive())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ManualClock, MemoryRecorder, MemoryStore, SessionConfig, SessionError,
        SessionIssuer,
    };
    use rollcall_protocol::RejectReason;

    // 2025-03-14T12:00:00Z
    const NOON: u64 = 1_741_953_600;

    struct Fixture {
        issuer: SessionIssuer<MemoryStore<ManualClock>, ManualClock>,
        desk: AttendanceDesk<MemoryStore<ManualClock>, MemoryRecorder, ManualClock>,
        recorder: Arc<MemoryRecorder>,
        clock: ManualClock,
    }

    fn fixture(recorder: MemoryRecorder) -> Fixture {
        let clock = ManualClock::at(NOON);
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let config = SessionConfig::default();
        let recorder = Arc::new(recorder);
        let verifier =
            SessionVerifier::with_clock(Arc::clone(&store), clock.clone(), config.clone());
        Fixture {
            issuer: SessionIssuer::with_clock(store, clock.clone(), config),
            desk: AttendanceDesk::new(verifier, Arc::clone(&recorder)),
            recorder,
            clock,
        }
    }

    fn march_14() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    #[test]
    fn test_utc_date_of_known_instant() {
        assert_eq!(utc_date(NOON), march_14());
        assert_eq!(utc_date(0), NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());
    }

    #[tokio::test]
    async fn test_check_in_live_session_records_mark() {
        let f = fixture(MemoryRecorder::new());
        let issued = f.issuer.issue().await.unwrap();

        let check_in = f
            .desk
            .check_in(&issued.payload, "alice".into(), "cs101".into())
            .await
            .unwrap();

        assert_eq!(check_in.session_id, issued.session_id);
        assert_eq!(check_in.date, march_14());
        assert_eq!(check_in.outcome, RecordOutcome::Created);
        assert!(
            f.recorder
                .contains(&"alice".into(), &"cs101".into(), march_14())
                .await
        );
    }

    #[tokio::test]
    async fn test_check_in_repeat_scan_is_already_recorded() {
        let f = fixture(MemoryRecorder::new());
        let issued = f.issuer.issue().await.unwrap();
        f.desk
            .check_in(&issued.payload, "alice".into(), "cs101".into())
            .await
            .unwrap();

        f.clock.advance(5);
        let again = f
            .desk
            .check_in(&issued.session_id.rotated(1), "alice".into(), "cs101".into())
            .await
            .unwrap();

        assert_eq!(again.outcome, RecordOutcome::AlreadyRecorded);
        assert_eq!(f.recorder.len().await, 1);
    }

    #[tokio::test]
    async fn test_check_in_expired_session_records_nothing() {
        let f = fixture(MemoryRecorder::new());
        let issued = f.issuer.issue().await.unwrap();

        f.clock.advance(30);
        let result = f
            .desk
            .check_in(&issued.payload, "alice".into(), "cs101".into())
            .await;

        match result {
            Err(CheckInError::Session(e)) => {
                assert_eq!(e.reject_reason(), Some(RejectReason::SessionExpired));
            }
            other => panic!("expected expiry, got {other:?}"),
        }
        assert!(f.recorder.is_empty().await);
    }

    #[tokio::test]
    async fn test_check_in_no_session_returns_no_active_session() {
        let f = fixture(MemoryRecorder::new());

        let result = f
            .desk
            .check_in("0123456789abcdef0123456789abcdef", "a".into(), "c".into())
            .await;

        assert!(matches!(
            result,
            Err(CheckInError::Session(SessionError::NoActiveSession))
        ));
    }

    #[tokio::test]
    async fn test_check_in_recorder_failure_surfaces_as_record_error() {
        let f = fixture(MemoryRecorder::with_roster(
            [StudentId::new("alice")],
            [CourseId::new("cs101")],
        ));
        let issued = f.issuer.issue().await.unwrap();

        let result = f
            .desk
            .check_in(&issued.payload, "eve".into(), "cs101".into())
            .await;

        assert!(matches!(result, Err(CheckInError::Record(_))));
    }
}
