//! Recording attendance after a successful verification.
//!
//! The recorder is the only place that decides what a repeat scan
//! means. The session layer happily verifies the same live session for
//! any number of scanners; the recorder collapses them to one mark per
//! (student, course, date).

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use chrono::NaiveDate;
use rollcall_protocol::{CourseId, EventId, RecordOutcome, SessionId, StudentId};
use tokio::sync::Mutex;

use crate::RecordError;

/// One attendance mark, ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceMark {
    pub student_id: StudentId,
    pub course_id: CourseId,
    /// UTC calendar date of the verification.
    pub date: NaiveDate,
    /// The session that was verified, kept for audit.
    pub session_id: SessionId,
    pub event_id: EventId,
}

/// Durable attendance storage.
///
/// Implementations must be idempotent per `(student_id, course_id, date)`:
/// recording the same triple twice returns
/// [`RecordOutcome::AlreadyRecorded`] the second time, never an error.
pub trait AttendanceRecorder: Send + Sync + 'static {
    fn record(
        &self,
        mark: &AttendanceMark,
    ) -> impl Future<Output = Result<RecordOutcome, RecordError>> + Send;
}

type MarkKey = (StudentId, CourseId, NaiveDate);

#[derive(Debug, Default)]
struct Roster {
    students: HashSet<StudentId>,
    courses: HashSet<CourseId>,
}

/// An in-process recorder.
///
/// Without a roster it accepts any student and course. With one, marks
/// for unknown ids are refused.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecorder {
    marks: Arc<Mutex<HashSet<MarkKey>>>,
    roster: Option<Arc<Roster>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts marks to the given students and courses.
    pub fn with_roster(
        students: impl IntoIterator<Item = StudentId>,
        courses: impl IntoIterator<Item = CourseId>,
    ) -> Self {
        Self {
            marks: Arc::default(),
            roster: Some(Arc::new(Roster {
                students: students.into_iter().collect(),
                courses: courses.into_iter().collect(),
            })),
        }
    }

    /// Number of distinct marks recorded.
    pub async fn len(&self) -> usize {
        self.marks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.marks.lock().await.is_empty()
    }

    /// Whether a mark exists for this triple.
    pub async fn contains(
        &self,
        student_id: &StudentId,
        course_id: &CourseId,
        date: NaiveDate,
    ) -> bool {
        let key = (student_id.clone(), course_id.clone(), date);
        self.marks.lock().await.contains(&key)
    }
}

impl AttendanceRecorder for MemoryRecorder {
    async fn record(&self, mark: &AttendanceMark) -> Result<RecordOutcome, RecordError> {
        if let Some(roster) = &self.roster {
            if !roster.students.contains(&mark.student_id) {
                return Err(RecordError::UnknownStudent(mark.student_id.clone()));
            }
            if !roster.courses.contains(&mark.course_id) {
                return Err(RecordError::UnknownCourse(mark.course_id.clone()));
            }
        }

        let key = (mark.student_id.clone(), mark.course_id.clone(), mark.date);
        let inserted = self.marks.lock().await.insert(key);

        let outcome = if inserted {
            RecordOutcome::Created
        } else {
            RecordOutcome::AlreadyRecorded
        };
        tracing::debug!(
            student_id = %mark.student_id,
            course_id = %mark.course_id,
            date = %mark.date,
            ?outcome,
            "attendance recorded"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mark(student: &str, course: &str, day: u32) -> AttendanceMark {
        AttendanceMark {
            student_id: StudentId::new(student),
            course_id: CourseId::new(course),
            date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
            session_id: SessionId::new("s"),
            event_id: EventId::new("attend2025"),
        }
    }

    #[tokio::test]
    async fn test_record_first_mark_is_created() {
        let recorder = MemoryRecorder::new();
        let outcome = recorder.record(&mark("alice", "cs101", 3)).await.unwrap();
        assert_eq!(outcome, RecordOutcome::Created);
        assert_eq!(recorder.len().await, 1);
    }

    #[tokio::test]
    async fn test_record_same_day_twice_is_already_recorded() {
        let recorder = MemoryRecorder::new();
        recorder.record(&mark("alice", "cs101", 3)).await.unwrap();

        let mut again = mark("alice", "cs101", 3);
        again.session_id = SessionId::new("later-session");
        let outcome = recorder.record(&again).await.unwrap();

        assert_eq!(outcome, RecordOutcome::AlreadyRecorded);
        assert_eq!(recorder.len().await, 1);
    }

    #[tokio::test]
    async fn test_record_next_day_is_created() {
        let recorder = MemoryRecorder::new();
        recorder.record(&mark("alice", "cs101", 3)).await.unwrap();

        let outcome = recorder.record(&mark("alice", "cs101", 4)).await.unwrap();

        assert_eq!(outcome, RecordOutcome::Created);
    }

    #[tokio::test]
    async fn test_record_unknown_student_with_roster_is_refused() {
        let recorder = MemoryRecorder::with_roster(
            [StudentId::new("alice")],
            [CourseId::new("cs101")],
        );

        let result = recorder.record(&mark("mallory", "cs101", 3)).await;

        assert!(matches!(result, Err(RecordError::UnknownStudent(_))));
        assert!(recorder.is_empty().await);
    }

    #[tokio::test]
    async fn test_record_unknown_course_with_roster_is_refused() {
        let recorder = MemoryRecorder::with_roster(
            [StudentId::new("alice")],
            [CourseId::new("cs101")],
        );

        let result = recorder.record(&mark("alice", "art9", 3)).await;

        assert!(matches!(result, Err(RecordError::UnknownCourse(_))));
    }

    #[tokio::test]
    async fn test_contains_reports_recorded_triple() {
        let recorder = MemoryRecorder::new();
        let m = mark("bob", "cs101", 3);
        recorder.record(&m).await.unwrap();

        assert!(recorder.contains(&m.student_id, &m.course_id, m.date).await);
        assert!(
            !recorder
                .contains(&m.student_id, &CourseId::new("other"), m.date)
                .await
        );
    }
}
