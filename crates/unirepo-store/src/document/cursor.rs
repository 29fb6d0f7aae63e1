use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;

use unirepo_core::backend::{RawCursor, RawRecord};
use unirepo_core::errors::{RepoError, Result};
use unirepo_core::model::NativeId;

use crate::document::backend::Session;
use crate::document::server::{DocumentServer, ID_KEY};
use crate::errors::closed;

/// Client side of a server cursor; pulls `batch_size` documents per call
pub struct DocumentCursor {
    id: u64,
    backend: String,
    server: Arc<DocumentServer>,
    session: Arc<Session>,
    batch_size: usize,
    released: bool,
}

impl DocumentCursor {
    pub(crate) fn new(
        id: u64,
        backend: String,
        server: Arc<DocumentServer>,
        session: Arc<Session>,
        batch_size: usize,
    ) -> Self {
        Self {
            id,
            backend,
            server,
            session,
            batch_size,
            released: false,
        }
    }
}

#[async_trait]
impl RawCursor for DocumentCursor {
    fn id(&self) -> u64 {
        self.id
    }

    async fn next_batch(&mut self) -> Result<Option<Vec<RawRecord>>> {
        if self.released {
            return Ok(None);
        }
        if !self.session.live.load(Ordering::SeqCst) {
            return Err(closed(&self.backend));
        }

        let batch = self
            .server
            .get_more(self.id, self.batch_size)
            .map_err(|e| RepoError::query(&self.backend, e.to_string()))?;
        let Some(docs) = batch else {
            // server already dropped its side
            self.released = true;
            self.session.forget(self.id);
            return Ok(None);
        };

        docs.into_iter()
            .map(|mut doc| {
                let id = doc
                    .remove(ID_KEY)
                    .as_ref()
                    .and_then(NativeId::from_storage_value)
                    .ok_or_else(|| RepoError::query(&self.backend, "document has no _id"))?;
                Ok(RawRecord::new(id, doc))
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }

    fn close(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.server.kill_cursor(self.id);
        self.session.forget(self.id);
    }
}
