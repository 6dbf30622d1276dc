//! Single-writer actor.
//!
//! All mutations run serially on one thread, each inside its own immediate
//! transaction. Serializing writes this way gives atomic per-record
//! mutations and stands in for a per-record mutex under the multi-threaded
//! runtime.

use std::sync::mpsc;
use std::thread;

use diesel::sqlite::SqliteConnection;
use diesel::Connection;
use log::error;
use tokio::sync::oneshot;

use super::DbPool;
use crate::errors::StorageError;

type Job = Box<dyn FnOnce(&DbPool) + Send + 'static>;

enum TxError {
    App(StorageError),
    Db(diesel::result::Error),
}

impl From<diesel::result::Error> for TxError {
    fn from(err: diesel::result::Error) -> Self {
        TxError::Db(err)
    }
}

/// Handle for submitting write jobs to the writer thread.
#[derive(Clone)]
pub struct WriteHandle {
    tx: mpsc::Sender<Job>,
}

pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (tx, rx) = mpsc::channel::<Job>();
    let spawned = thread::Builder::new()
        .name("pocketledger-writer".to_string())
        .spawn(move || {
            while let Ok(job) = rx.recv() {
                job(&pool);
            }
        });
    if let Err(err) = spawned {
        error!("Failed to spawn writer thread: {}", err);
    }
    WriteHandle { tx }
}

impl WriteHandle {
    /// Run `f` inside an immediate transaction on the writer thread. The
    /// transaction rolls back when `f` returns an error.
    pub async fn exec<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |pool: &DbPool| {
            let result = pool
                .get()
                .map_err(StorageError::from)
                .and_then(|mut conn| {
                    conn.immediate_transaction::<T, TxError, _>(|conn| {
                        f(conn).map_err(TxError::App)
                    })
                    .map_err(|err| match err {
                        TxError::App(inner) => inner,
                        TxError::Db(inner) => StorageError::Query(inner),
                    })
                });
            let _ = reply_tx.send(result);
        });

        self.tx
            .send(job)
            .map_err(|_| StorageError::Writer("writer thread is gone".to_string()))?;
        reply_rx
            .await
            .map_err(|_| StorageError::Writer("writer dropped the job".to_string()))?
    }
}
