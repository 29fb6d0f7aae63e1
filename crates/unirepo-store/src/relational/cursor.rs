use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use unirepo_core::backend::{RawCursor, RawRecord};
use unirepo_core::errors::Result;
use unirepo_core::model::NativeId;

use crate::errors::closed;
use crate::relational::backend::{run_select, with_conn, Shared};
use crate::relational::sql::SqlQuery;

static NEXT_CURSOR_ID: AtomicU64 = AtomicU64::new(1);

/// Cursor over the identifiers matched when it was opened
///
/// Opening runs the query once for the ordered identifiers of the page.
/// Each pull loads the rows for the next `batch_size` of them. Rows deleted
/// in between are skipped and rows inserted in between are not seen, so
/// deletes never shift unread rows out of the stream.
pub struct SqliteCursor {
    id: u64,
    shared: Arc<Shared>,
    query: SqlQuery,
    pending: VecDeque<i64>,
    batch_size: usize,
    released: bool,
}

impl SqliteCursor {
    pub(crate) fn new(shared: Arc<Shared>, query: SqlQuery, ids: Vec<i64>, batch_size: usize) -> Self {
        Self {
            id: NEXT_CURSOR_ID.fetch_add(1, Ordering::Relaxed),
            shared,
            query,
            pending: ids.into(),
            batch_size: batch_size.max(1),
            released: false,
        }
    }

    pub(crate) fn cursor_id(&self) -> u64 {
        self.id
    }

    /// Identifiers not yet pulled
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl RawCursor for SqliteCursor {
    fn id(&self) -> u64 {
        self.id
    }

    async fn next_batch(&mut self) -> Result<Option<Vec<RawRecord>>> {
        if self.released {
            return Ok(None);
        }
        if !self.shared.is_live() || !self.shared.is_registered(self.id) {
            return Err(closed(&self.shared.name));
        }

        while !self.pending.is_empty() {
            let take = self.batch_size.min(self.pending.len());
            let ids: Vec<i64> = self.pending.drain(..take).collect();
            let (sql, params) = self.query.render_rows(&ids);
            let projection = self.query.projection.clone();
            let name = self.shared.name.clone();
            let rows = with_conn(&self.shared, move |conn| {
                run_select(&name, conn, &sql, &params, &projection)
            })
            .await?;

            let mut by_id: HashMap<NativeId, RawRecord> =
                rows.into_iter().map(|r| (r.id.clone(), r)).collect();
            let batch: Vec<RawRecord> = ids
                .into_iter()
                .filter_map(|id| by_id.remove(&NativeId::Integer(id)))
                .collect();
            if !batch.is_empty() {
                return Ok(Some(batch));
            }
        }

        self.close();
        Ok(None)
    }

    fn close(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.pending.clear();
        self.shared.forget(self.id);
    }
}
