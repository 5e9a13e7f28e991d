use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::document::{document_id, get_path, set_path, Document, Filter, ID_FIELD};
use crate::ids::{new_document_id, SessionId};
use crate::schema::Schema;

use super::aggregate::run_pipeline;
use super::query::{matches, project, sort_documents};
use super::update::apply_update;
use super::{
    BulkOperation, BulkWriteResult, DocumentStore, FindQuery, Populate, Session, StoreError,
    StoreResult, TransactionState, UpdateCommand, UpdateOutcome,
};

/// Documents of one collection plus the write stamp of every `_id` ever
/// written (removed ids keep theirs)
#[derive(Debug, Clone, Default)]
struct CollectionData {
    documents: Vec<Document>,
    stamps: HashMap<String, u64>,
    clock: u64,
}

impl CollectionData {
    fn stamp(&mut self, touched: &HashSet<String>) {
        if touched.is_empty() {
            return;
        }
        self.clock += 1;
        for id in touched {
            self.stamps.insert(id.clone(), self.clock);
        }
    }

    /// Apply the staged state of `touched` documents, leaving the rest alone
    fn publish(&mut self, staged: &[Document], touched: &HashSet<String>) {
        let replacements: HashMap<&str, &Document> = staged
            .iter()
            .filter_map(|d| document_id(d).map(|id| (id, d)))
            .filter(|(id, _)| touched.contains(*id))
            .collect();

        let mut placed = HashSet::new();
        self.documents.retain_mut(|d| {
            let Some(id) = document_id(d).map(str::to_string) else {
                return true;
            };
            if !touched.contains(&id) {
                return true;
            }
            match replacements.get(id.as_str()) {
                Some(replacement) => {
                    *d = (*replacement).clone();
                    placed.insert(id);
                    true
                }
                None => false,
            }
        });
        for d in staged {
            if let Some(id) = document_id(d) {
                if replacements.contains_key(id) && !placed.contains(id) {
                    self.documents.push(d.clone());
                }
            }
        }
        self.stamp(touched);
    }
}

/// Copy of a collection taken when a transaction first touches it
#[derive(Debug)]
struct StagedCollection {
    stamps: HashMap<String, u64>,
    documents: Vec<Document>,
    touched: HashSet<String>,
}

/// Ids of documents added, changed or removed between `before` and `after`
fn touched_ids(before: &[Document], after: &[Document]) -> HashSet<String> {
    let previous: HashMap<&str, &Document> = before
        .iter()
        .filter_map(|d| document_id(d).map(|id| (id, d)))
        .collect();
    let mut seen = HashSet::new();
    let mut touched = HashSet::new();
    for d in after {
        let Some(id) = document_id(d) else { continue };
        seen.insert(id);
        if previous.get(id).map_or(true, |old| *old != d) {
            touched.insert(id.to_string());
        }
    }
    for id in previous.keys() {
        if !seen.contains(id) {
            touched.insert((*id).to_string());
        }
    }
    touched
}

#[derive(Debug, Default)]
struct StagedTransaction {
    collections: HashMap<String, StagedCollection>,
}

struct MemoryInner {
    name: String,
    collections: RwLock<HashMap<String, CollectionData>>,
    transactions: Arc<DashMap<SessionId, StagedTransaction>>,
    available: AtomicBool,
}

/// In-process document store
///
/// Collections are created on first write. Transactions work on a private copy
/// of every collection they touch and remember which documents they changed.
/// Commit publishes those documents at once and fails with
/// [`StoreError::WriteConflict`] if any of them was written by someone else in
/// the meantime. Transactions changing different documents of one collection
/// both commit.
///
/// ```rust
/// use docrepo::store::{DocumentStore, FindQuery, MemoryStore};
/// use docrepo::schema::Schema;
/// use docrepo::doc;
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let store = MemoryStore::new("shop");
/// store
///     .insert_many("products", vec![doc! { "name": "Widget" }], &Schema::new(), None)
///     .await
///     .unwrap();
/// let found = store
///     .find("products", &FindQuery::new(doc! { "name": "Widget" }), None)
///     .await
///     .unwrap();
/// assert_eq!(found.len(), 1);
/// # });
/// ```
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("name", &self.inner.name)
            .field("available", &self.is_available())
            .field("open_transactions", &self.open_transactions())
            .finish_non_exhaustive()
    }
}

enum Binding {
    Direct,
    Staged(SessionId),
}

impl MemoryStore {
    /// Create an empty store
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                name: name.into(),
                collections: RwLock::new(HashMap::new()),
                transactions: Arc::new(DashMap::new()),
                available: AtomicBool::new(true),
            }),
        }
    }

    /// Database name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether the store accepts operations
    pub fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::SeqCst)
    }

    /// Take the store offline (or bring it back); offline stores fail every
    /// operation with [`StoreError::Unavailable`]
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
        if available {
            debug!(database = %self.inner.name, "Store available");
        } else {
            warn!(database = %self.inner.name, "Store marked unavailable");
        }
    }

    /// Close the store and discard every staged transaction
    pub fn close(&self) {
        self.set_available(false);
        self.inner.transactions.clear();
    }

    /// Number of transactions currently staged
    pub fn open_transactions(&self) -> usize {
        self.inner.transactions.len()
    }

    /// Names of all collections that have been written to
    pub async fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.collections.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    fn ensure_available(&self) -> StoreResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(StoreError::Unavailable(format!(
                "database '{}' is not reachable",
                self.inner.name
            )))
        }
    }

    fn binding(&self, session: Option<&Session>) -> StoreResult<Binding> {
        let Some(session) = session else {
            return Ok(Binding::Direct);
        };
        match session.state() {
            TransactionState::Idle => Ok(Binding::Direct),
            TransactionState::Active => Ok(Binding::Staged(session.id().clone())),
            state => Err(StoreError::Transaction(format!(
                "session {} is {state}; start a transaction or open a new session",
                session.id()
            ))),
        }
    }

    fn no_transaction(id: &SessionId) -> StoreError {
        StoreError::Transaction(format!("no transaction staged for session {id}"))
    }

    /// Make sure the transaction of `id` holds a copy of `collection`
    async fn stage(&self, id: &SessionId, collection: &str) -> StoreResult<()> {
        let staged = self
            .inner
            .transactions
            .get(id)
            .map(|txn| txn.collections.contains_key(collection))
            .ok_or_else(|| Self::no_transaction(id))?;
        if staged {
            return Ok(());
        }

        let snapshot = self
            .inner
            .collections
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default();

        let mut txn = self
            .inner
            .transactions
            .get_mut(id)
            .ok_or_else(|| Self::no_transaction(id))?;
        txn.collections
            .entry(collection.to_string())
            .or_insert(StagedCollection {
                stamps: snapshot.stamps,
                documents: snapshot.documents,
                touched: HashSet::new(),
            });
        Ok(())
    }

    async fn read<R>(
        &self,
        collection: &str,
        session: Option<&Session>,
        f: impl FnOnce(&[Document]) -> StoreResult<R>,
    ) -> StoreResult<R> {
        self.ensure_available()?;
        match self.binding(session)? {
            Binding::Direct => {
                let guard = self.inner.collections.read().await;
                let documents = guard
                    .get(collection)
                    .map(|c| c.documents.as_slice())
                    .unwrap_or(&[]);
                f(documents)
            }
            Binding::Staged(id) => {
                self.stage(&id, collection).await?;
                let txn = self
                    .inner
                    .transactions
                    .get(&id)
                    .ok_or_else(|| Self::no_transaction(&id))?;
                let documents = txn
                    .collections
                    .get(collection)
                    .map(|c| c.documents.as_slice())
                    .unwrap_or(&[]);
                f(documents)
            }
        }
    }

    async fn write<R>(
        &self,
        collection: &str,
        session: Option<&Session>,
        f: impl FnOnce(&mut Vec<Document>) -> StoreResult<R>,
    ) -> StoreResult<R> {
        self.ensure_available()?;
        match self.binding(session)? {
            Binding::Direct => {
                let mut guard = self.inner.collections.write().await;
                let data = guard.entry(collection.to_string()).or_default();
                let before = data.documents.clone();
                let result = f(&mut data.documents);
                let touched = touched_ids(&before, &data.documents);
                data.stamp(&touched);
                result
            }
            Binding::Staged(id) => {
                self.stage(&id, collection).await?;
                let mut txn = self
                    .inner
                    .transactions
                    .get_mut(&id)
                    .ok_or_else(|| Self::no_transaction(&id))?;
                let staged = txn
                    .collections
                    .get_mut(collection)
                    .ok_or_else(|| Self::no_transaction(&id))?;
                let before = staged.documents.clone();
                let result = f(&mut staged.documents);
                let touched = touched_ids(&before, &staged.documents);
                staged.touched.extend(touched);
                result
            }
        }
    }

    async fn populate(
        &self,
        documents: &mut [Document],
        spec: &Populate,
        session: Option<&Session>,
    ) -> StoreResult<()> {
        let mut ids: Vec<String> = Vec::new();
        for d in documents.iter() {
            match get_path(d, &spec.path) {
                Some(Value::String(id)) => ids.push(id.clone()),
                Some(Value::Array(items)) => {
                    ids.extend(items.iter().filter_map(Value::as_str).map(str::to_string))
                }
                _ => {}
            }
        }
        if ids.is_empty() {
            return Ok(());
        }

        let referenced: HashMap<String, Document> = self
            .read(&spec.from, session, |docs| {
                let mut found = HashMap::new();
                for d in docs {
                    if let Some(id) = document_id(d).filter(|id| ids.iter().any(|wanted| wanted.as_str() == *id)) {
                        let expanded = match &spec.select {
                            Some(projection) => project(d, projection)?,
                            None => d.clone(),
                        };
                        found.insert(id.to_string(), expanded);
                    }
                }
                Ok(found)
            })
            .await?;

        let lookup = |id: &str| {
            referenced
                .get(id)
                .cloned()
                .map_or(Value::Null, Value::Object)
        };
        for d in documents.iter_mut() {
            let expanded = match get_path(d, &spec.path) {
                Some(Value::String(id)) => lookup(id.as_str()),
                Some(Value::Array(items)) => Value::Array(
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .filter(|id| referenced.contains_key(*id))
                        .map(lookup)
                        .collect(),
                ),
                _ => continue,
            };
            set_path(d, &spec.path, expanded);
        }
        Ok(())
    }
}

/// Assign missing ids and validate, without touching the collection.
fn prepare_insert(mut document: Document, schema: &Schema) -> StoreResult<Document> {
    match document.get(ID_FIELD) {
        None | Some(Value::Null) => {
            document.insert(ID_FIELD.to_string(), Value::String(new_document_id()));
        }
        Some(Value::String(id)) if !id.trim().is_empty() => {}
        Some(other) => return Err(StoreError::InvalidId(other.to_string())),
    }
    schema.validate(&document).map_err(StoreError::Validation)?;
    Ok(document)
}

fn insert_into(collection: &str, documents: &mut Vec<Document>, batch: Vec<Document>) -> StoreResult<Vec<Document>> {
    for (i, d) in batch.iter().enumerate() {
        let id = document_id(d).unwrap_or_default();
        let clash = documents.iter().any(|e| document_id(e) == Some(id))
            || batch[..i].iter().any(|e| document_id(e) == Some(id));
        if clash {
            return Err(StoreError::DuplicateKey(format!(
                "collection '{collection}' already has a document with _id \"{id}\""
            )));
        }
    }
    documents.extend(batch.iter().cloned());
    Ok(batch)
}

fn update_in(documents: &mut [Document], command: &UpdateCommand, schema: &Schema) -> StoreResult<UpdateOutcome> {
    let mut outcome = UpdateOutcome::default();
    let mut changes = Vec::new();
    for (index, d) in documents.iter().enumerate() {
        if !matches(d, &command.filter)? {
            continue;
        }
        outcome.matched += 1;
        let mut updated = d.clone();
        if apply_update(&mut updated, &command.update)? {
            outcome.modified += 1;
        }
        schema.validate(&updated).map_err(StoreError::Validation)?;
        changes.push((index, updated));
        if !command.multi {
            break;
        }
    }
    for (index, updated) in changes {
        documents[index] = updated.clone();
        outcome.documents.push(updated);
    }
    Ok(outcome)
}

fn delete_from(documents: &mut Vec<Document>, filter: &Filter, multi: bool) -> StoreResult<Vec<Document>> {
    let mut doomed = Vec::new();
    for (index, d) in documents.iter().enumerate() {
        if matches(d, filter)? {
            doomed.push(index);
            if !multi {
                break;
            }
        }
    }
    let mut removed: Vec<Document> = doomed.into_iter().rev().map(|i| documents.remove(i)).collect();
    removed.reverse();
    Ok(removed)
}

fn bulk_step(
    collection: &str,
    documents: &mut Vec<Document>,
    operation: BulkOperation,
    schema: &Schema,
    result: &mut BulkWriteResult,
) -> StoreResult<()> {
    match operation {
        BulkOperation::InsertOne { document } => {
            let prepared = prepare_insert(document, schema)?;
            let inserted = insert_into(collection, documents, vec![prepared])?;
            result.inserted_count += 1;
            result
                .inserted_ids
                .extend(inserted.iter().filter_map(document_id).map(str::to_string));
        }
        BulkOperation::UpdateOne { filter, update } => {
            let outcome = update_in(documents, &UpdateCommand { filter, update, multi: false }, schema)?;
            result.matched_count += outcome.matched;
            result.modified_count += outcome.modified;
        }
        BulkOperation::UpdateMany { filter, update } => {
            let outcome = update_in(documents, &UpdateCommand { filter, update, multi: true }, schema)?;
            result.matched_count += outcome.matched;
            result.modified_count += outcome.modified;
        }
        BulkOperation::DeleteOne { filter } => {
            result.deleted_count += delete_from(documents, &filter, false)?.len() as u64;
        }
        BulkOperation::DeleteMany { filter } => {
            result.deleted_count += delete_from(documents, &filter, true)?.len() as u64;
        }
    }
    Ok(())
}

impl DocumentStore for MemoryStore {
    async fn find(
        &self,
        collection: &str,
        query: &FindQuery,
        session: Option<&Session>,
    ) -> StoreResult<Vec<Document>> {
        let mut documents = self
            .read(collection, session, |docs| {
                let mut found = Vec::new();
                for d in docs {
                    if matches(d, &query.filter)? {
                        found.push(d.clone());
                    }
                }
                Ok(found)
            })
            .await?;

        sort_documents(&mut documents, &query.sort);
        let skip = query.skip.unwrap_or(0) as usize;
        let limit = match query.limit {
            None | Some(0) => usize::MAX,
            Some(n) => n as usize,
        };
        let mut documents: Vec<Document> = documents.into_iter().skip(skip).take(limit).collect();

        if let Some(projection) = &query.projection {
            documents = documents
                .iter()
                .map(|d| project(d, projection))
                .collect::<StoreResult<_>>()?;
        }
        for spec in &query.populate {
            self.populate(&mut documents, spec, session).await?;
        }
        Ok(documents)
    }

    async fn count(
        &self,
        collection: &str,
        filter: &Filter,
        session: Option<&Session>,
    ) -> StoreResult<u64> {
        self.read(collection, session, |docs| {
            let mut n = 0;
            for d in docs {
                if matches(d, filter)? {
                    n += 1;
                }
            }
            Ok(n)
        })
        .await
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
        schema: &Schema,
        session: Option<&Session>,
    ) -> StoreResult<Vec<Document>> {
        let batch = documents
            .into_iter()
            .map(|d| prepare_insert(d, schema))
            .collect::<StoreResult<Vec<_>>>()?;
        let inserted = self
            .write(collection, session, |docs| insert_into(collection, docs, batch))
            .await?;
        debug!(collection, count = inserted.len(), "Inserted documents");
        Ok(inserted)
    }

    async fn update(
        &self,
        collection: &str,
        command: &UpdateCommand,
        schema: &Schema,
        session: Option<&Session>,
    ) -> StoreResult<UpdateOutcome> {
        self.write(collection, session, |docs| update_in(docs, command, schema))
            .await
    }

    async fn delete(
        &self,
        collection: &str,
        filter: &Filter,
        multi: bool,
        session: Option<&Session>,
    ) -> StoreResult<Vec<Document>> {
        self.write(collection, session, |docs| delete_from(docs, filter, multi))
            .await
    }

    async fn bulk_write(
        &self,
        collection: &str,
        operations: Vec<BulkOperation>,
        schema: &Schema,
        session: Option<&Session>,
    ) -> StoreResult<BulkWriteResult> {
        self.write(collection, session, |docs| {
            let mut result = BulkWriteResult::default();
            for (index, operation) in operations.into_iter().enumerate() {
                bulk_step(collection, docs, operation, schema, &mut result).map_err(|source| {
                    StoreError::BulkOperationFailed {
                        index,
                        source: Box::new(source),
                    }
                })?;
            }
            Ok(result)
        })
        .await
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: &[Document],
        session: Option<&Session>,
    ) -> StoreResult<Vec<Document>> {
        let documents = self
            .read(collection, session, |docs| Ok(docs.to_vec()))
            .await?;
        run_pipeline(documents, pipeline)
    }

    async fn start_session(&self) -> StoreResult<Session> {
        self.ensure_available()?;
        let transactions = Arc::clone(&self.inner.transactions);
        let session = Session::new(move |id| {
            if transactions.remove(id).is_some() {
                debug!(session = %id, "Released transaction of dropped session");
            }
        });
        debug!(session = %session.id(), "Session started");
        Ok(session)
    }

    async fn start_transaction(&self, session: &Session) -> StoreResult<()> {
        self.ensure_available()?;
        session.transition(TransactionState::Active)?;
        self.inner
            .transactions
            .insert(session.id().clone(), StagedTransaction::default());
        debug!(session = %session.id(), "Transaction started");
        Ok(())
    }

    async fn commit_transaction(&self, session: &Session) -> StoreResult<()> {
        self.ensure_available()?;
        if session.state() != TransactionState::Active {
            return Err(StoreError::Transaction(format!(
                "session {} has no active transaction to commit",
                session.id()
            )));
        }
        let (_, staged) = self
            .inner
            .transactions
            .remove(session.id())
            .ok_or_else(|| Self::no_transaction(session.id()))?;

        let mut guard = self.inner.collections.write().await;
        let conflict = staged.collections.iter().find_map(|(name, copy)| {
            let live = guard.get(name.as_str());
            copy.touched
                .iter()
                .find(|id| {
                    live.and_then(|c| c.stamps.get(id.as_str())) != copy.stamps.get(id.as_str())
                })
                .map(|id| (name.clone(), id.clone()))
        });
        if let Some((name, id)) = conflict {
            drop(guard);
            session.transition(TransactionState::Aborted)?;
            warn!(session = %session.id(), collection = %name, id = %id, "Transaction aborted on write conflict");
            return Err(StoreError::WriteConflict(format!(
                "document \"{id}\" in collection '{name}' changed after transaction {} read it",
                session.id()
            )));
        }

        let mut published = 0usize;
        for (name, copy) in staged.collections {
            if !copy.touched.is_empty() {
                guard
                    .entry(name)
                    .or_default()
                    .publish(&copy.documents, &copy.touched);
                published += 1;
            }
        }
        drop(guard);

        session.transition(TransactionState::Committed)?;
        debug!(session = %session.id(), collections = published, "Transaction committed");
        Ok(())
    }

    async fn abort_transaction(&self, session: &Session) -> StoreResult<()> {
        self.ensure_available()?;
        if session.state() != TransactionState::Active {
            return Err(StoreError::Transaction(format!(
                "session {} has no active transaction to abort",
                session.id()
            )));
        }
        self.inner.transactions.remove(session.id());
        session.transition(TransactionState::Aborted)?;
        debug!(session = %session.id(), "Transaction aborted");
        Ok(())
    }

    async fn end_session(&self, session: &Session) -> StoreResult<()> {
        if self.inner.transactions.remove(session.id()).is_some() {
            debug!(session = %session.id(), "Discarded open transaction on session end");
        }
        session.transition(TransactionState::Ended)?;
        debug!(session = %session.id(), "Session ended");
        Ok(())
    }
}
