//! Async handle over the [`Database`], serialized through a
//! [`PersistenceQueue`].
//!
//! All access goes through [`Store::call`] or [`Store::transaction`]. A
//! transaction opened while another one is already running on the queue
//! joins it: no second `BEGIN`, and the outer transaction decides whether
//! everything commits.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use tracing::{debug, warn};

use localshare_shared::constants::{SYS_CHUNK_SIZE, SYS_CLIENT_ID, SYS_DOWNLOAD_CONCURRENCY};
use localshare_shared::types::DeviceDescriptor;

use crate::database::Database;
use crate::error::Result;
use crate::models::{Device, DeviceMessage, FilePart, TransferSettings};
use crate::queue::PersistenceQueue;

#[derive(Clone)]
pub struct Store {
    db: Arc<Mutex<Database>>,
    queue: PersistenceQueue,
}

impl Store {
    /// Wrap an opened database. Must be called inside a tokio runtime.
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            queue: PersistenceQueue::new(),
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(Database::open_at(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    pub fn queue(&self) -> &PersistenceQueue {
        &self.queue
    }

    /// Stop the queue. Pending calls fail with `QueueError::Closed`.
    pub fn close(&self) {
        self.queue.cancel();
    }

    fn with_db<T>(&self, f: impl FnOnce(&Database) -> T) -> T {
        let guard = self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&guard)
    }

    /// Run `f` against the database on the queue.
    pub async fn call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        self.queue.enqueue(move || async move { store.with_db(f) }).await?
    }

    /// Run `body` atomically: commit if it returns `Ok`, roll back if it
    /// returns `Err` or panics. Nested calls join the enclosing transaction.
    pub async fn transaction<F, Fut, T>(&self, body: F) -> Result<T>
    where
        F: FnOnce(Store) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        self.queue
            .enqueue(move || async move {
                if store.with_db(Database::in_transaction) {
                    return body(store).await;
                }

                store.with_db(|db| db.conn().execute_batch("BEGIN IMMEDIATE"))?;

                match AssertUnwindSafe(body(store.clone())).catch_unwind().await {
                    Ok(Ok(value)) => {
                        if let Err(e) = store.with_db(|db| db.conn().execute_batch("COMMIT")) {
                            store.rollback();
                            return Err(e.into());
                        }
                        Ok(value)
                    }
                    Ok(Err(e)) => {
                        debug!(error = %e, "Rolling back transaction");
                        store.rollback();
                        Err(e)
                    }
                    Err(panic) => {
                        store.rollback();
                        std::panic::resume_unwind(panic)
                    }
                }
            })
            .await?
    }

    fn rollback(&self) {
        self.with_db(|db| {
            if db.in_transaction() {
                if let Err(e) = db.conn().execute_batch("ROLLBACK") {
                    warn!(error = %e, "Rollback failed");
                }
            }
        });
    }

    // -- devices ------------------------------------------------------------

    /// Insert or refresh the device keyed by `desc.client_code`, atomically.
    pub async fn upsert_device(&self, desc: DeviceDescriptor) -> Result<Device> {
        self.transaction(move |store| async move {
            store.call(move |db| db.upsert_device(&desc)).await
        })
        .await
    }

    pub async fn devices(&self) -> Result<Vec<Device>> {
        self.call(|db| db.list_devices()).await
    }

    pub async fn device(&self, id: i64) -> Result<Device> {
        self.call(move |db| db.get_device(id)).await
    }

    pub async fn find_device_by_client_code(&self, client_code: &str) -> Result<Option<Device>> {
        let code = client_code.to_string();
        self.call(move |db| db.find_device_by_client_code(&code)).await
    }

    // -- messages -----------------------------------------------------------

    pub async fn save_message(&self, message: DeviceMessage) -> Result<DeviceMessage> {
        self.call(move |db| db.save_message(&message)).await
    }

    pub async fn message(&self, id: i64) -> Result<DeviceMessage> {
        self.call(move |db| db.get_message(id)).await
    }

    pub async fn messages_for_device(&self, device_id: i64) -> Result<Vec<DeviceMessage>> {
        self.call(move |db| db.list_messages_for_device(device_id)).await
    }

    /// Remove the message and every file part recorded for it.
    pub async fn delete_message(&self, id: i64) -> Result<bool> {
        self.transaction(move |store| async move {
            store
                .call(move |db| {
                    db.delete_file_parts(id)?;
                    db.delete_message(id)
                })
                .await
        })
        .await
    }

    // -- file parts ---------------------------------------------------------

    pub async fn file_parts(&self, message_id: i64, file_hash: &str) -> Result<Vec<FilePart>> {
        let hash = file_hash.to_string();
        self.call(move |db| db.list_file_parts(message_id, &hash)).await
    }

    /// Forget every recorded part of `message_id`, whatever its hash.
    pub async fn clear_file_parts(&self, message_id: i64) -> Result<usize> {
        self.call(move |db| db.delete_file_parts(message_id)).await
    }

    /// Record a finished chunk and the message's new downloaded byte count in
    /// one transaction.
    pub async fn record_file_part(&self, part: FilePart, download_size: u64) -> Result<FilePart> {
        self.transaction(move |store| async move {
            store
                .call(move |db| {
                    let saved = db.insert_file_part(&part)?;
                    db.raise_download_size(part.device_message_id, download_size)?;
                    Ok(saved)
                })
                .await
        })
        .await
    }

    // -- sys_info -----------------------------------------------------------

    pub async fn sys_value(&self, name: &str) -> Result<Option<String>> {
        let name = name.to_string();
        self.call(move |db| db.get_sys_value(&name)).await
    }

    pub async fn set_sys_value(&self, name: &str, value: &str) -> Result<()> {
        let (name, value) = (name.to_string(), value.to_string());
        self.call(move |db| db.set_sys_value(&name, &value)).await
    }

    /// This install's client code, generated on first use.
    pub async fn client_code(&self) -> Result<String> {
        self.transaction(|store| async move {
            store
                .call(|db| {
                    db.get_or_init_sys_value(SYS_CLIENT_ID, || uuid::Uuid::new_v4().to_string())
                })
                .await
        })
        .await
    }

    /// Current transfer tunables; missing, unparsable or zero values fall
    /// back to the defaults.
    pub async fn transfer_settings(&self) -> Result<TransferSettings> {
        self.call(|db| {
            let defaults = TransferSettings::default();
            let chunk_size = db
                .sys_value_as::<u64>(SYS_CHUNK_SIZE)?
                .filter(|v| *v > 0)
                .unwrap_or(defaults.chunk_size);
            let concurrency = db
                .sys_value_as::<usize>(SYS_DOWNLOAD_CONCURRENCY)?
                .filter(|v| *v > 0)
                .unwrap_or(defaults.concurrency);
            Ok(TransferSettings {
                chunk_size,
                concurrency,
            })
        })
        .await
    }
}
