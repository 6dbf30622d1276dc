//! Diesel-backed `EntityStore` implementation for transactions.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;

use pocketledger_core::errors::{Error, Result};
use pocketledger_core::store::{
    DeleteOutcome, EntityFilter, EntityStore, PageRequest, ScanPage, ScanPosition, SortDirection,
    SortField, SortOrder,
};
use pocketledger_core::sync::Syncable;
use pocketledger_core::transactions::{Transaction, TransactionSummary};

use super::model::TransactionRow;
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::row::{
    date_to_db, timestamp_to_db, SYNC_STATE_CLEAN, SYNC_STATE_PENDING_CREATE,
    SYNC_STATE_PENDING_DELETE, SYNC_STATE_PENDING_UPDATE,
};
use crate::schema::transactions;
use crate::schema::transactions::dsl;

type BoxedTransactions<'a> = transactions::BoxedQuery<'a, diesel::sqlite::Sqlite>;

pub struct TransactionStore {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl TransactionStore {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    fn apply_filters<ST>(
        mut scope: transactions::BoxedQuery<'static, diesel::sqlite::Sqlite, ST>,
        owner_id: &str,
        filter: &EntityFilter,
    ) -> transactions::BoxedQuery<'static, diesel::sqlite::Sqlite, ST> {
        scope = scope
            .filter(dsl::owner_id.eq(owner_id.to_string()))
            .filter(dsl::sync_state.ne(SYNC_STATE_PENDING_DELETE));
        if let Some(from) = filter.date_from {
            scope = scope.filter(dsl::posted_on.ge(date_to_db(from)));
        }
        if let Some(to) = filter.date_to {
            scope = scope.filter(dsl::posted_on.le(date_to_db(to)));
        }
        if let Some(card_id) = &filter.card_id {
            scope = scope.filter(dsl::card_id.eq(card_id.clone()));
        }
        if let Some(category_id) = &filter.category_id {
            scope = scope.filter(dsl::category_id.eq(category_id.clone()));
        }
        if let Some(search) = &filter.search {
            scope = scope.filter(dsl::name.like(format!("%{}%", search)));
        }
        scope
    }

    fn effective_scope(owner_id: &str, filter: &EntityFilter) -> BoxedTransactions<'static> {
        Self::apply_filters(dsl::transactions.into_boxed(), owner_id, filter)
    }

    fn count_effective(
        conn: &mut diesel::sqlite::SqliteConnection,
        owner_id: &str,
        filter: &EntityFilter,
    ) -> std::result::Result<i64, StorageError> {
        Self::apply_filters(dsl::transactions.count().into_boxed(), owner_id, filter)
            .get_result(conn)
            .map_err(StorageError::from)
    }

    fn keyset_scope(
        mut scope: BoxedTransactions<'static>,
        order: SortOrder,
        position: &ScanPosition,
    ) -> BoxedTransactions<'static> {
        if let ScanPosition::After { sort_key, id } = position {
            let key = sort_key.clone();
            let id = id.clone();
            scope = match (order.field, order.direction) {
                (SortField::Date, SortDirection::Asc) => scope.filter(
                    dsl::posted_on
                        .gt(key.clone())
                        .or(dsl::posted_on.eq(key).and(dsl::id.gt(id))),
                ),
                (SortField::Date, SortDirection::Desc) => scope.filter(
                    dsl::posted_on
                        .lt(key.clone())
                        .or(dsl::posted_on.eq(key).and(dsl::id.lt(id))),
                ),
                (SortField::Name, SortDirection::Asc) => scope.filter(
                    dsl::name
                        .gt(key.clone())
                        .or(dsl::name.eq(key).and(dsl::id.gt(id))),
                ),
                (SortField::Name, SortDirection::Desc) => scope.filter(
                    dsl::name
                        .lt(key.clone())
                        .or(dsl::name.eq(key).and(dsl::id.lt(id))),
                ),
            };
        }
        scope
    }

    fn ordered_scope(
        scope: BoxedTransactions<'static>,
        order: SortOrder,
    ) -> BoxedTransactions<'static> {
        match (order.field, order.direction) {
            (SortField::Date, SortDirection::Asc) => {
                scope.order((dsl::posted_on.asc(), dsl::id.asc()))
            }
            (SortField::Date, SortDirection::Desc) => {
                scope.order((dsl::posted_on.desc(), dsl::id.desc()))
            }
            (SortField::Name, SortDirection::Asc) => scope.order((dsl::name.asc(), dsl::id.asc())),
            (SortField::Name, SortDirection::Desc) => {
                scope.order((dsl::name.desc(), dsl::id.desc()))
            }
        }
    }

    fn rows_to_domain(rows: Vec<TransactionRow>) -> Result<Vec<Transaction>> {
        rows.into_iter()
            .map(|row| row.into_domain().map_err(Error::from))
            .collect()
    }
}

#[async_trait]
impl EntityStore<Transaction> for TransactionStore {
    async fn get(&self, id: &str) -> Result<Option<Transaction>> {
        let mut conn = get_connection(&self.pool).map_err(Error::from)?;
        let row = dsl::transactions
            .find(id.to_string())
            .first::<TransactionRow>(&mut conn)
            .optional()
            .map_err(StorageError::from)
            .map_err(Error::from)?;
        row.map(|row| row.into_domain().map_err(Error::from))
            .transpose()
    }

    async fn get_by_remote_id(&self, remote_id: &str) -> Result<Option<Transaction>> {
        let mut conn = get_connection(&self.pool).map_err(Error::from)?;
        let row = dsl::transactions
            .filter(dsl::remote_id.eq(remote_id.to_string()))
            .first::<TransactionRow>(&mut conn)
            .optional()
            .map_err(StorageError::from)
            .map_err(Error::from)?;
        row.map(|row| row.into_domain().map_err(Error::from))
            .transpose()
    }

    async fn list_effective(
        &self,
        owner_id: &str,
        filter: &EntityFilter,
        order: SortOrder,
    ) -> Result<Vec<Transaction>> {
        let mut conn = get_connection(&self.pool).map_err(Error::from)?;
        let rows = Self::ordered_scope(Self::effective_scope(owner_id, filter), order)
            .load::<TransactionRow>(&mut conn)
            .map_err(StorageError::from)
            .map_err(Error::from)?;
        Self::rows_to_domain(rows)
    }

    async fn query(
        &self,
        owner_id: &str,
        filter: &EntityFilter,
        order: SortOrder,
        page: &PageRequest,
    ) -> Result<ScanPage<Transaction>> {
        let mut conn = get_connection(&self.pool).map_err(Error::from)?;
        let limit = i64::from(page.limit.max(1));

        if let ScanPosition::Offset { offset } = page.position {
            let total: i64 =
                Self::count_effective(&mut conn, owner_id, filter).map_err(Error::from)?;
            let rows = Self::ordered_scope(Self::effective_scope(owner_id, filter), order)
                .limit(limit)
                .offset(offset.max(0))
                .load::<TransactionRow>(&mut conn)
                .map_err(StorageError::from)
                .map_err(Error::from)?;
            let items = Self::rows_to_domain(rows)?;
            let consumed = offset.max(0) + items.len() as i64;
            let has_more = consumed < total;
            return Ok(ScanPage {
                items,
                next: has_more.then_some(ScanPosition::Offset { offset: consumed }),
                has_more,
                total: Some(total),
            });
        }

        let scope = Self::keyset_scope(
            Self::effective_scope(owner_id, filter),
            order,
            &page.position,
        );
        let mut rows = Self::ordered_scope(scope, order)
            .limit(limit + 1)
            .load::<TransactionRow>(&mut conn)
            .map_err(StorageError::from)
            .map_err(Error::from)?;
        let has_more = rows.len() as i64 > limit;
        rows.truncate(limit as usize);
        let items = Self::rows_to_domain(rows)?;
        let next = if has_more {
            items.last().map(|last| ScanPosition::After {
                sort_key: last.sort_key(order.field),
                id: last.id.clone(),
            })
        } else {
            None
        };
        Ok(ScanPage {
            items,
            next,
            has_more,
            total: None,
        })
    }

    async fn put(&self, entity: Transaction) -> Result<Transaction> {
        let row = TransactionRow::from_domain(&entity).map_err(Error::from)?;
        let stored = self
            .writer
            .exec(move |conn| {
                diesel::insert_into(transactions::table)
                    .values(&row)
                    .on_conflict(dsl::id)
                    .do_update()
                    .set(&row)
                    .returning(TransactionRow::as_returning())
                    .get_result::<TransactionRow>(conn)
                    .map_err(StorageError::from)
            })
            .await
            .map_err(Error::from)?;
        stored.into_domain().map_err(Error::from)
    }

    async fn delete(&self, id: &str, now: DateTime<Utc>) -> Result<DeleteOutcome> {
        let record_id = id.to_string();
        let stamp = timestamp_to_db(now);
        self.writer
            .exec(move |conn| {
                let existing = dsl::transactions
                    .find(&record_id)
                    .first::<TransactionRow>(conn)
                    .optional()
                    .map_err(StorageError::from)?;
                let Some(row) = existing else {
                    return Ok(DeleteOutcome::NotFound);
                };
                if row.remote_id.is_some() {
                    diesel::update(dsl::transactions.find(&record_id))
                        .set((
                            dsl::sync_state.eq(SYNC_STATE_PENDING_DELETE),
                            dsl::updated_at_local.eq(stamp),
                            dsl::push_attempts.eq(0),
                            dsl::next_push_at.eq::<Option<String>>(None),
                        ))
                        .execute(conn)
                        .map_err(StorageError::from)?;
                    Ok(DeleteOutcome::Soft)
                } else {
                    diesel::delete(dsl::transactions.find(&record_id))
                        .execute(conn)
                        .map_err(StorageError::from)?;
                    Ok(DeleteOutcome::Hard)
                }
            })
            .await
            .map_err(Error::from)
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let record_id = id.to_string();
        let affected = self
            .writer
            .exec(move |conn| {
                diesel::delete(dsl::transactions.find(record_id))
                    .execute(conn)
                    .map_err(StorageError::from)
            })
            .await
            .map_err(Error::from)?;
        Ok(affected > 0)
    }

    async fn list_pending_push(
        &self,
        due_before: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Transaction>> {
        let mut conn = get_connection(&self.pool).map_err(Error::from)?;
        let due = timestamp_to_db(due_before);
        let rows = dsl::transactions
            .filter(dsl::sync_state.eq_any([
                SYNC_STATE_PENDING_CREATE,
                SYNC_STATE_PENDING_UPDATE,
                SYNC_STATE_PENDING_DELETE,
            ]))
            .filter(dsl::next_push_at.is_null().or(dsl::next_push_at.le(due)))
            .order(dsl::updated_at_local.asc())
            .limit(i64::from(limit))
            .load::<TransactionRow>(&mut conn)
            .map_err(StorageError::from)
            .map_err(Error::from)?;
        Self::rows_to_domain(rows)
    }

    async fn summary(&self, owner_id: &str) -> Result<TransactionSummary> {
        let items = self
            .list_effective(owner_id, &EntityFilter::none(), Transaction::default_order())
            .await?;
        Ok(Transaction::summarize(items.iter()))
    }

    async fn prune_clean_before(&self, owner_id: &str, cutoff: DateTime<Utc>) -> Result<usize> {
        let owner = owner_id.to_string();
        let cutoff = timestamp_to_db(cutoff);
        self.writer
            .exec(move |conn| {
                diesel::delete(
                    dsl::transactions
                        .filter(dsl::owner_id.eq(owner))
                        .filter(dsl::sync_state.eq(SYNC_STATE_CLEAN))
                        .filter(dsl::updated_at_local.lt(cutoff)),
                )
                .execute(conn)
                .map_err(StorageError::from)
            })
            .await
            .map_err(Error::from)
    }
}
