//! Transactions
//!
//! [`run_in_transaction`] drives the session lifecycle around a unit of work:
//!
//! 1. open a session and start a transaction
//! 2. run the work with the session
//! 3. commit on `Ok`, abort on `Err`
//! 4. end the session, whatever happened
//!
//! Every repository call inside the work must be bound to the session
//! (`SessionOptions::with_session` / `QueryOptions::session`); unbound calls
//! run outside the transaction. Failures are never retried here;
//! [`RepositoryError::is_retriable`] tells the caller whether to try again.

use std::future::Future;

use tracing::{debug, warn};

use crate::store::{DocumentStore, Session};

use super::adapter::{Full, RepositoryHandle};
use super::error::{RepositoryError, RepositoryOperation};
use super::traits::{Entity, FullRepository};

/// Run `work` in a transaction on `store`
///
/// The work's own error is returned unchanged after the abort. Failures of the
/// transaction machinery itself (opening, starting or committing) are
/// converted from a [`RepositoryError`] with
/// [`RepositoryOperation::Transaction`].
///
/// ```rust
/// use docrepo::doc;
/// use docrepo::repository::{run_in_transaction, RepositoryError, RepositoryFactory, SessionOptions, WriteRepository};
/// use docrepo::model::Model;
/// use docrepo::store::MemoryStore;
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let store = MemoryStore::new("shop");
/// let repo = RepositoryFactory::create_full::<serde_json::Value, _>(&Model::builder("Note", store.clone()).build());
///
/// let created = run_in_transaction(&store, |session| {
///     let repo = repo.clone();
///     async move {
///         repo.create(doc! { "text": "hello" }, SessionOptions::with_session(&session)).await?;
///         repo.create(doc! { "text": "world" }, SessionOptions::with_session(&session)).await?;
///         Ok::<_, RepositoryError>(2)
///     }
/// })
/// .await
/// .unwrap();
/// assert_eq!(created, 2);
/// # });
/// ```
pub async fn run_in_transaction<S, F, Fut, R, E>(store: &S, work: F) -> Result<R, E>
where
    S: DocumentStore,
    F: FnOnce(Session) -> Fut + Send,
    Fut: Future<Output = Result<R, E>> + Send,
    R: Send,
    E: From<RepositoryError> + Send,
{
    let op = RepositoryOperation::Transaction;
    let session = store
        .start_session()
        .await
        .map_err(|e| E::from(RepositoryError::from_store(op, e)))?;

    let outcome = match store.start_transaction(&session).await {
        Ok(()) => {
            debug!(session = %session.id(), "Transaction started");
            run_and_settle(store, &session, work).await
        }
        Err(e) => Err(E::from(RepositoryError::from_store(op, e))),
    };

    if let Err(e) = store.end_session(&session).await {
        warn!(session = %session.id(), error = %e, "Failed to end session");
    }
    outcome
}

async fn run_and_settle<S, F, Fut, R, E>(store: &S, session: &Session, work: F) -> Result<R, E>
where
    S: DocumentStore,
    F: FnOnce(Session) -> Fut + Send,
    Fut: Future<Output = Result<R, E>> + Send,
    R: Send,
    E: From<RepositoryError> + Send,
{
    match work(session.clone()).await {
        Ok(value) => match store.commit_transaction(session).await {
            Ok(()) => {
                debug!(session = %session.id(), "Transaction committed");
                Ok(value)
            }
            Err(commit_error) => {
                warn!(session = %session.id(), error = %commit_error, "Commit failed");
                abort_if_open(store, session).await;
                Err(E::from(RepositoryError::from_store(
                    RepositoryOperation::Transaction,
                    commit_error,
                )))
            }
        },
        Err(error) => {
            abort_if_open(store, session).await;
            debug!(session = %session.id(), "Transaction aborted by its work");
            Err(error)
        }
    }
}

async fn abort_if_open<S: DocumentStore>(store: &S, session: &Session) {
    if !session.in_transaction() {
        return;
    }
    if let Err(e) = store.abort_transaction(session).await {
        warn!(session = %session.id(), error = %e, "Failed to abort transaction");
    }
}

impl<T, S> FullRepository<T> for RepositoryHandle<T, S, Full>
where
    T: Entity,
    S: DocumentStore,
{
    async fn with_transaction<F, Fut, R, E>(&self, work: F) -> Result<R, E>
    where
        F: FnOnce(Session) -> Fut + Send,
        Fut: Future<Output = Result<R, E>> + Send,
        R: Send,
        E: From<RepositoryError> + Send,
    {
        run_in_transaction(self.store(), work).await
    }
}
