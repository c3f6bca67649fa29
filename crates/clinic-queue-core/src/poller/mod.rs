//! Polling controller for one queue view.
//!
//! The controller does no I/O. The host issues a [`FetchToken`], performs the
//! request on its own event loop, and hands the result back with the token:
//!
//! ```text
//! mount() / begin_fetch() ──► token ──► host fetch ──► complete(token, result)
//!                                                          │
//!                                   ┌──────────────────────┼─────────────────────┐
//!                                   ▼                      ▼                     ▼
//!                          newest token, Ok        newest token, Err      older token / unmounted
//!                          replace board           keep last board        discard silently
//!                                                  surface error, backoff
//! ```
//!
//! Only the most recently issued request may update the view, so a slow
//! response can never overwrite a newer one.

mod retry;

pub use retry::*;

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::lifecycle::QueueStage;
use crate::models::{PriorityClass, QueueSnapshot, SnapshotError};
use crate::reconciler::QueueBoard;

/// Why a snapshot fetch failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Queue service unavailable: {0}")]
    Unavailable(String),

    #[error("Not authorized to read the queue: {0}")]
    Unauthorized(String),

    #[error("Malformed queue snapshot: {0}")]
    Malformed(String),
}

impl From<SnapshotError> for FetchError {
    fn from(e: SnapshotError) -> Self {
        FetchError::Malformed(e.to_string())
    }
}

/// Identifies one issued fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FetchToken {
    view_id: Uuid,
    seq: u64,
}

impl FetchToken {
    /// Rebuild a token from a sequence number handed across the FFI.
    pub(crate) fn for_view(view_id: Uuid, seq: u64) -> Self {
        Self { view_id, seq }
    }

    /// Sequence number; strictly increasing per controller.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Controller that issued the token.
    pub fn view_id(&self) -> Uuid {
        self.view_id
    }
}

/// What happened to a completed fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// Snapshot replaced the board
    Applied,
    /// Fetch failed; board kept. `retry_in` is `None` once automatic retries
    /// are exhausted.
    Failed { retry_in: Option<Duration> },
    /// Superseded by a newer request, or not ours
    Stale,
    /// Arrived after the view was unmounted
    Discarded,
}

/// Display state exposed to the view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollView {
    /// Last successfully fetched board
    pub board: QueueBoard,
    /// Latest request is still in flight
    pub loading: bool,
    /// Error from the latest completed request, cleared on success
    pub error: Option<FetchError>,
    /// When the board was last replaced
    pub last_updated: Option<DateTime<Utc>>,
    /// Failures since the last success
    pub consecutive_failures: u32,
}

impl PollView {
    pub fn labels(&self, class: PriorityClass) -> [String; 3] {
        self.board.labels(class)
    }
}

/// Fetch/reconcile state machine owned by a single view.
#[derive(Debug, Clone)]
pub struct PollingController {
    view_id: Uuid,
    queue: QueueStage,
    poll_interval: Duration,
    retry: RetryPolicy,
    issued: u64,
    mounted: bool,
    view: PollView,
}

impl PollingController {
    /// Create an unmounted controller.
    pub fn new(queue: QueueStage, poll_interval: Duration, retry: RetryPolicy) -> Self {
        Self {
            view_id: Uuid::new_v4(),
            queue,
            poll_interval,
            retry,
            issued: 0,
            mounted: false,
            view: PollView::default(),
        }
    }

    /// Mount the view and issue the initial fetch.
    ///
    /// A remount starts with a fresh retry budget and no error; the last
    /// board is kept until the new fetch lands.
    pub fn mount(&mut self) -> FetchToken {
        self.mounted = true;
        self.view.consecutive_failures = 0;
        self.view.error = None;
        self.issue()
    }

    /// Issue a new fetch. Supersedes any request still in flight.
    pub fn begin_fetch(&mut self) -> Option<FetchToken> {
        self.mounted.then(|| self.issue())
    }

    fn issue(&mut self) -> FetchToken {
        self.issued += 1;
        self.view.loading = true;
        debug!(view_id = %self.view_id, seq = self.issued, queue = %self.queue, "issuing queue fetch");
        FetchToken {
            view_id: self.view_id,
            seq: self.issued,
        }
    }

    /// Feed back the result of a fetch.
    pub fn complete(
        &mut self,
        token: FetchToken,
        result: Result<QueueSnapshot, FetchError>,
    ) -> Completion {
        if !self.mounted {
            debug!(view_id = %self.view_id, seq = token.seq, "view unmounted, discarding queue response");
            return Completion::Discarded;
        }
        if token.view_id != self.view_id || token.seq != self.issued {
            debug!(
                view_id = %self.view_id,
                seq = token.seq,
                latest = self.issued,
                "discarding stale queue response"
            );
            return Completion::Stale;
        }

        self.view.loading = false;
        match result {
            Ok(snapshot) => {
                self.view.board = QueueBoard::from_snapshot(&snapshot);
                self.view.error = None;
                self.view.consecutive_failures = 0;
                self.view.last_updated = Some(Utc::now());
                debug!(view_id = %self.view_id, seq = token.seq, "applied queue snapshot");
                Completion::Applied
            }
            Err(error) => {
                self.view.consecutive_failures = self.view.consecutive_failures.saturating_add(1);
                let retry_in = self.retry.delay_for(self.view.consecutive_failures);
                warn!(
                    view_id = %self.view_id,
                    seq = token.seq,
                    failures = self.view.consecutive_failures,
                    error = %error,
                    "queue fetch failed, keeping last board"
                );
                self.view.error = Some(error);
                Completion::Failed { retry_in }
            }
        }
    }

    /// Tear down the view. Every later completion is discarded.
    pub fn unmount(&mut self) {
        self.mounted = false;
        self.view.loading = false;
    }

    /// When the host should fetch next: the poll interval while healthy, the
    /// backoff delay while failing, `None` when retries are exhausted or the
    /// view is gone.
    pub fn next_poll_delay(&self) -> Option<Duration> {
        if !self.mounted {
            return None;
        }
        match self.view.consecutive_failures {
            0 => Some(self.poll_interval),
            failures => self.retry.delay_for(failures),
        }
    }

    pub fn retries_exhausted(&self) -> bool {
        self.retry.exhausted(self.view.consecutive_failures)
    }

    pub fn view(&self) -> &PollView {
        &self.view
    }

    pub fn board(&self) -> &QueueBoard {
        &self.view.board
    }

    pub fn queue(&self) -> QueueStage {
        self.queue
    }

    pub fn view_id(&self) -> Uuid {
        self.view_id
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Sequence number of the most recently issued fetch.
    pub fn last_issued(&self) -> u64 {
        self.issued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{QueueTicket, SlotPosition, Stage};
    use std::num::NonZeroU32;

    fn controller() -> PollingController {
        PollingController::new(QueueStage::Registration, Duration::from_secs(5), RetryPolicy::default())
    }

    fn snapshot(number: u32) -> QueueSnapshot {
        QueueSnapshot::default().with_slot(
            PriorityClass::Priority,
            SlotPosition::Current,
            QueueTicket::new(
                format!("P{}", number),
                NonZeroU32::new(number).unwrap(),
                PriorityClass::Priority,
                Stage::Registered,
            ),
        )
    }

    fn unavailable() -> FetchError {
        FetchError::Unavailable("503".into())
    }

    #[test]
    fn test_mount_issues_fetch() {
        let mut poller = controller();
        assert!(poller.begin_fetch().is_none());

        let token = poller.mount();
        assert_eq!(token.seq(), 1);
        assert!(poller.view().loading);

        assert_eq!(poller.complete(token, Ok(snapshot(3))), Completion::Applied);
        assert!(!poller.view().loading);
        assert!(poller.view().last_updated.is_some());
        assert_eq!(poller.view().labels(PriorityClass::Priority), ["#3", "N/A", "N/A"]);
    }

    #[test]
    fn test_out_of_order_response_discarded() {
        let mut poller = controller();
        let a = poller.mount();
        let b = poller.begin_fetch().unwrap();

        assert_eq!(poller.complete(b, Ok(snapshot(2))), Completion::Applied);
        assert_eq!(poller.complete(a, Ok(snapshot(1))), Completion::Stale);
        assert_eq!(poller.board().labels(PriorityClass::Priority)[0], "#2");
    }

    #[test]
    fn test_older_failure_is_stale_not_error() {
        let mut poller = controller();
        let a = poller.mount();
        let b = poller.begin_fetch().unwrap();

        assert_eq!(poller.complete(a, Err(unavailable())), Completion::Stale);
        assert!(poller.view().error.is_none());
        assert!(poller.view().loading);
        assert_eq!(poller.complete(b, Ok(snapshot(4))), Completion::Applied);
    }

    #[test]
    fn test_failure_keeps_last_good_board() {
        let mut poller = controller();
        let token = poller.mount();
        poller.complete(token, Ok(snapshot(7)));

        let token = poller.begin_fetch().unwrap();
        let completion = poller.complete(token, Err(unavailable()));

        assert_eq!(completion, Completion::Failed { retry_in: Some(Duration::from_millis(500)) });
        assert_eq!(poller.board().labels(PriorityClass::Priority)[0], "#7");
        assert_eq!(poller.view().error, Some(unavailable()));
        assert_eq!(poller.next_poll_delay(), Some(Duration::from_millis(500)));

        let token = poller.begin_fetch().unwrap();
        poller.complete(token, Ok(snapshot(8)));
        assert!(poller.view().error.is_none());
        assert_eq!(poller.view().consecutive_failures, 0);
        assert_eq!(poller.next_poll_delay(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_retries_are_bounded() {
        let mut poller = controller();
        let mut token = poller.mount();
        for _ in 0..3 {
            assert!(matches!(
                poller.complete(token, Err(unavailable())),
                Completion::Failed { retry_in: Some(_) }
            ));
            token = poller.begin_fetch().unwrap();
        }

        assert_eq!(poller.complete(token, Err(unavailable())), Completion::Failed { retry_in: None });
        assert!(poller.retries_exhausted());
        assert_eq!(poller.next_poll_delay(), None);
    }

    #[test]
    fn test_unmount_discards_in_flight() {
        let mut poller = controller();
        let token = poller.mount();
        poller.unmount();

        assert_eq!(poller.complete(token, Ok(snapshot(1))), Completion::Discarded);
        assert!(poller.board().is_empty());
        assert!(poller.begin_fetch().is_none());
        assert_eq!(poller.next_poll_delay(), None);
    }

    #[test]
    fn test_remount_resets_retry_budget() {
        let mut poller = controller();
        let mut token = poller.mount();
        for _ in 0..4 {
            poller.complete(token, Err(unavailable()));
            token = poller.begin_fetch().unwrap();
        }
        assert!(poller.retries_exhausted());
        poller.unmount();

        let token = poller.mount();
        assert!(poller.view().error.is_none());
        assert_eq!(poller.view().consecutive_failures, 0);

        let completion = poller.complete(token, Err(unavailable()));
        assert_eq!(completion, Completion::Failed { retry_in: Some(Duration::from_millis(500)) });
        assert_eq!(poller.next_poll_delay(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_foreign_token_is_stale() {
        let mut ours = controller();
        let mut theirs = controller();
        ours.mount();
        let foreign = theirs.mount();

        assert_eq!(ours.complete(foreign, Ok(snapshot(9))), Completion::Stale);
        assert!(ours.board().is_empty());
    }

    #[test]
    fn test_snapshot_replaced_not_merged() {
        let mut poller = controller();
        let token = poller.mount();
        poller.complete(token, Ok(snapshot(3)));

        let token = poller.begin_fetch().unwrap();
        poller.complete(token, Ok(QueueSnapshot::default()));
        assert!(poller.board().is_empty());
    }
}
