use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::ids::SessionId;

use super::{StoreError, StoreResult};

/// Lifecycle of a session's transaction
///
/// ```text
/// Idle ──start──▶ Active ──commit──▶ Committed
///                   │                   │
///                   └──abort──▶ Aborted │
///                                  │    │
///        Committed / Aborted ──start──▶ Active
///        any ──end──▶ Ended
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// Session open, no transaction running
    Idle,
    /// Transaction running; bound operations are staged
    Active,
    /// Last transaction published
    Committed,
    /// Last transaction discarded
    Aborted,
    /// Session released
    Ended,
}

impl TransactionState {
    fn can_become(self, next: Self) -> bool {
        use TransactionState::*;
        matches!(
            (self, next),
            (Idle | Committed | Aborted, Active)
                | (Active, Committed | Aborted)
                | (Idle | Active | Committed | Aborted, Ended)
        )
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Active => write!(f, "active"),
            Self::Committed => write!(f, "committed"),
            Self::Aborted => write!(f, "aborted"),
            Self::Ended => write!(f, "ended"),
        }
    }
}

type ReleaseFn = Box<dyn Fn(&SessionId) + Send + Sync>;

/// Handle to a store session
///
/// Cheap to clone; all clones share one state. When the last clone is dropped
/// without the session having been ended, the owning store is told to release
/// whatever the session still has staged.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: SessionId,
    state: Mutex<TransactionState>,
    on_release: Option<ReleaseFn>,
}

impl Session {
    /// New idle session; `on_release` runs if it is dropped before being ended
    pub fn new(on_release: impl Fn(&SessionId) + Send + Sync + 'static) -> Self {
        Self::build(Some(Box::new(on_release)))
    }

    /// New idle session with no release hook
    pub fn detached() -> Self {
        Self::build(None)
    }

    fn build(on_release: Option<ReleaseFn>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id: SessionId::new(),
                state: Mutex::new(TransactionState::Idle),
                on_release,
            }),
        }
    }

    /// Session identifier
    pub fn id(&self) -> &SessionId {
        &self.inner.id
    }

    /// Current state
    pub fn state(&self) -> TransactionState {
        *self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a transaction is running
    pub fn in_transaction(&self) -> bool {
        self.state() == TransactionState::Active
    }

    /// Move to `next`, returning the previous state
    ///
    /// Ending an already ended session is a no-op.
    pub fn transition(&self, next: TransactionState) -> StoreResult<TransactionState> {
        let mut state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let previous = *state;
        if previous == TransactionState::Ended && next == TransactionState::Ended {
            return Ok(previous);
        }
        if !previous.can_become(next) {
            return Err(StoreError::Transaction(format!(
                "session {} cannot move from {previous} to {next}",
                self.inner.id
            )));
        }
        *state = next;
        Ok(previous)
    }

    /// Whether both handles refer to the same session
    pub fn same_as(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let state = *self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if state != TransactionState::Ended {
            if let Some(release) = &self.on_release {
                release(&self.id);
            }
        }
    }
}
