//! Read side of the ledger: single lookups, per-account listings and the
//! paginated activity feed.

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sea_orm::{Condition, QueryFilter, QueryOrder, QuerySelect, prelude::*};

use crate::{EngineError, ResultEngine, Transaction, transactions};

use super::Engine;

/// One page of an account's activity feed, newest first.
#[derive(Clone, Debug)]
pub struct FeedPage {
    pub items: Vec<Transaction>,
    /// Opaque cursor for the next page; `None` when this page is the last.
    pub next_cursor: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct FeedCursor {
    created_at: DateTime<Utc>,
    transaction_id: i32,
}

impl FeedCursor {
    fn encode(&self) -> ResultEngine<String> {
        let bytes = serde_json::to_vec(self)
            .map_err(|_| EngineError::InvalidCursor("invalid feed cursor".to_string()))?;
        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
    }

    fn decode(input: &str) -> ResultEngine<Self> {
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(input.as_bytes())
            .map_err(|_| EngineError::InvalidCursor("invalid feed cursor".to_string()))?;
        serde_json::from_slice::<Self>(&bytes)
            .map_err(|_| EngineError::InvalidCursor("invalid feed cursor".to_string()))
    }
}

impl Engine {
    /// Returns a single ledger entry by id.
    pub async fn transaction(&self, transaction_id: i32) -> ResultEngine<Transaction> {
        let model = transactions::Entity::find_by_id(transaction_id)
            .one(&self.database)
            .await?
            .ok_or(EngineError::TransactionNotFound(transaction_id))?;
        Transaction::try_from(model)
    }

    /// All transactions the account initiated, newest first.
    pub async fn sent_by(&self, account_id: i32) -> ResultEngine<Vec<Transaction>> {
        self.require_account(&self.database, account_id).await?;
        let rows = transactions::Entity::find()
            .filter(transactions::Column::SenderId.eq(account_id))
            .order_by_desc(transactions::Column::CreatedAt)
            .order_by_desc(transactions::Column::Id)
            .all(&self.database)
            .await?;
        rows.into_iter().map(Transaction::try_from).collect()
    }

    /// All transactions the account received, newest first.
    pub async fn received_by(&self, account_id: i32) -> ResultEngine<Vec<Transaction>> {
        self.require_account(&self.database, account_id).await?;
        let rows = transactions::Entity::find()
            .filter(transactions::Column::ReceiverId.eq(account_id))
            .order_by_desc(transactions::Column::CreatedAt)
            .order_by_desc(transactions::Column::Id)
            .all(&self.database)
            .await?;
        rows.into_iter().map(Transaction::try_from).collect()
    }

    /// The account's combined activity (sent and received), with cursor-based
    /// pagination.
    ///
    /// Pagination is newest to older by `(created_at DESC, id DESC)`, so
    /// entries sharing a timestamp still page deterministically.
    pub async fn feed_for(
        &self,
        account_id: i32,
        limit: u64,
        cursor: Option<&str>,
    ) -> ResultEngine<FeedPage> {
        self.require_account(&self.database, account_id).await?;

        let limit_plus_one = limit.saturating_add(1);
        let mut query = transactions::Entity::find()
            .filter(
                Condition::any()
                    .add(transactions::Column::SenderId.eq(account_id))
                    .add(transactions::Column::ReceiverId.eq(account_id)),
            )
            .order_by_desc(transactions::Column::CreatedAt)
            .order_by_desc(transactions::Column::Id)
            .limit(limit_plus_one);

        if let Some(cursor) = cursor {
            let cursor = FeedCursor::decode(cursor)?;
            query = query.filter(
                Condition::any()
                    .add(transactions::Column::CreatedAt.lt(cursor.created_at))
                    .add(
                        Condition::all()
                            .add(transactions::Column::CreatedAt.eq(cursor.created_at))
                            .add(transactions::Column::Id.lt(cursor.transaction_id)),
                    ),
            );
        }

        let rows = query.all(&self.database).await?;
        let has_more = rows.len() > limit as usize;

        let mut items: Vec<Transaction> = Vec::with_capacity(rows.len().min(limit as usize));
        for model in rows.into_iter().take(limit as usize) {
            items.push(Transaction::try_from(model)?);
        }

        let next_cursor = items.last().map(|tx| FeedCursor {
            created_at: tx.created_at,
            transaction_id: tx.id,
        });
        let next_cursor = if has_more {
            next_cursor.map(|c| c.encode()).transpose()?
        } else {
            None
        };

        Ok(FeedPage { items, next_cursor })
    }
}
