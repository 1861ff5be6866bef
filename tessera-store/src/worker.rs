//! Single-worker async access to a store.
//!
//! All operations against a store instance are serialized onto one worker
//! task bound to one storage session: at most one storage operation is in
//! flight per store at a time. Completions are delivered asynchronously
//! but from that worker — callers must not assume delivery on their
//! originating thread. There is no cancellation and no timeout; an
//! operation blocked on backend I/O blocks the worker indefinitely.

use crate::backend::{StorageError, StorageResult};
use crate::reference::EntityReference;
use crate::resolve::Resolution;
use crate::store::Store;
use crate::value::PropertyDictionary;
use crate::StoreResult;
use tessera_types::{ChangeNotification, EntityId, EntityType};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

enum Command {
    Create {
        entity_type: EntityType,
        reply: oneshot::Sender<EntityId>,
    },
    Resolve {
        reference: EntityReference,
        reply: oneshot::Sender<Option<Resolution>>,
    },
    Add {
        target: EntityReference,
        properties: PropertyDictionary,
        reply: oneshot::Sender<Option<Resolution>>,
    },
    Read {
        id: EntityId,
        names: Vec<String>,
        reply: oneshot::Sender<PropertyDictionary>,
    },
    ReadAll {
        id: EntityId,
        reply: oneshot::Sender<PropertyDictionary>,
    },
    Remove {
        id: EntityId,
        names: Vec<String>,
        reply: oneshot::Sender<usize>,
    },
    Delete {
        id: EntityId,
        reply: oneshot::Sender<bool>,
    },
    Save {
        reply: oneshot::Sender<StorageResult<()>>,
    },
    Count {
        reply: oneshot::Sender<usize>,
    },
    Subscribe {
        subscriber: Box<dyn Fn(&ChangeNotification) + Send>,
        reply: oneshot::Sender<()>,
    },
}

/// Clonable handle to a store owned by a dedicated worker task.
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<Command>,
}

impl StoreHandle {
    /// Moves the store onto a new worker task and returns a handle to it.
    #[must_use]
    pub fn spawn(mut store: Store) -> Self {
        let (tx, mut rx) = mpsc::channel::<Command>(64);
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                Self::execute(&mut store, command);
            }
            debug!("store worker stopped");
        });
        Self { tx }
    }

    fn execute(store: &mut Store, command: Command) {
        // Replies may be dropped by callers that gave up waiting; that is
        // not an error on the worker side.
        match command {
            Command::Create { entity_type, reply } => {
                let _ = reply.send(store.create(entity_type));
            }
            Command::Resolve { reference, reply } => {
                let _ = reply.send(store.resolve(&reference));
            }
            Command::Add {
                target,
                properties,
                reply,
            } => {
                let _ = reply.send(store.add(&target, &properties));
            }
            Command::Read { id, names, reply } => {
                let names: Vec<&str> = names.iter().map(String::as_str).collect();
                let _ = reply.send(store.read(id, &names));
            }
            Command::ReadAll { id, reply } => {
                let _ = reply.send(store.read_all(id));
            }
            Command::Remove { id, names, reply } => {
                let names: Vec<&str> = names.iter().map(String::as_str).collect();
                let _ = reply.send(store.remove(id, &names));
            }
            Command::Delete { id, reply } => {
                let _ = reply.send(store.delete(id));
            }
            Command::Save { reply } => {
                let _ = reply.send(store.save());
            }
            Command::Count { reply } => {
                let _ = reply.send(store.count());
            }
            Command::Subscribe { subscriber, reply } => {
                store.subscribe(subscriber);
                let _ = reply.send(());
            }
        }
    }

    async fn send<T>(
        &self,
        command: Command,
        reply: oneshot::Receiver<T>,
    ) -> StoreResult<T> {
        self.tx
            .send(command)
            .await
            .map_err(|_| StorageError::Unavailable("store worker stopped".into()))?;
        reply
            .await
            .map_err(|_| StorageError::Unavailable("store worker stopped".into()).into())
    }

    /// Creates a record of the given type.
    pub async fn create(&self, entity_type: impl Into<EntityType>) -> StoreResult<EntityId> {
        let (reply, rx) = oneshot::channel();
        self.send(
            Command::Create {
                entity_type: entity_type.into(),
                reply,
            },
            rx,
        )
        .await
    }

    /// Resolves a reference on the worker.
    pub async fn resolve(&self, reference: EntityReference) -> StoreResult<Option<Resolution>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Resolve { reference, reply }, rx).await
    }

    /// Applies a dictionary to the record a reference resolves to.
    pub async fn add(
        &self,
        target: EntityReference,
        properties: PropertyDictionary,
    ) -> StoreResult<Option<Resolution>> {
        let (reply, rx) = oneshot::channel();
        self.send(
            Command::Add {
                target,
                properties,
                reply,
            },
            rx,
        )
        .await
    }

    /// Reads the newest value for each requested name.
    pub async fn read(
        &self,
        id: EntityId,
        names: Vec<String>,
    ) -> StoreResult<PropertyDictionary> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Read { id, names, reply }, rx).await
    }

    /// Reads the newest value for every name used on the record.
    pub async fn read_all(&self, id: EntityId) -> StoreResult<PropertyDictionary> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ReadAll { id, reply }, rx).await
    }

    /// Deletes every historical version of each given name.
    pub async fn remove(&self, id: EntityId, names: Vec<String>) -> StoreResult<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Remove { id, names, reply }, rx).await
    }

    /// Deletes a record, cascading to owned property records.
    pub async fn delete(&self, id: EntityId) -> StoreResult<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Delete { id, reply }, rx).await
    }

    /// Flushes to durable storage.
    pub async fn save(&self) -> StoreResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Save { reply }, rx).await??;
        Ok(())
    }

    /// Number of records in the store.
    pub async fn count(&self) -> StoreResult<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Count { reply }, rx).await
    }

    /// Registers a change-notification subscriber on the worker.
    pub async fn subscribe(
        &self,
        subscriber: impl Fn(&ChangeNotification) + Send + 'static,
    ) -> StoreResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(
            Command::Subscribe {
                subscriber: Box::new(subscriber),
                reply,
            },
            rx,
        )
        .await
    }
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;

    #[test]
    fn commands_flow_through_the_worker() {
        tokio_test::block_on(async {
            let handle = StoreHandle::spawn(Store::new(StoreConfig::default()));
            let id = handle.create("person").await.unwrap();
            assert_eq!(handle.count().await.unwrap(), 1);
            assert!(handle.delete(id).await.unwrap());
            assert_eq!(handle.count().await.unwrap(), 0);
        });
    }

    #[test]
    fn cloned_handles_reach_the_same_store() {
        tokio_test::block_on(async {
            let handle = StoreHandle::spawn(Store::new(StoreConfig::default()));
            let clone = handle.clone();
            handle.create("person").await.unwrap();
            assert_eq!(clone.count().await.unwrap(), 1);
        });
    }
}
