//! Sink Adapter: persists one height's `HeightRecord` (block + txs + denoms)
//! in a single database transaction, grounded on `ScraperDb::store_blocks`'s
//! `Insert::many(...).exec(...)` idiom. Blocks, transactions and denoms are
//! upserted on their primary key so a height can be safely recommitted if
//! the process crashed after fetch but before the commit cursor advanced;
//! messages and events are deleted and reinserted by tx hash instead, since
//! a replay can legitimately decode fewer of them than a prior attempt.

pub mod entities;

use async_trait::async_trait;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, EntityTrait,
    QueryFilter, Statement, TransactionTrait,
};
use time::OffsetDateTime;
use tracing::{debug, instrument};

use crate::error::SinkError;
use crate::types::HeightRecord;
use entities::{blocks_raw, denom_metadata, events_main, messages_main, progress, transactions_main, transactions_raw};

/// The seam the scheduler is driven through, so a fake can stand in for a
/// connected `Sink` in tests without a live database.
#[async_trait]
pub trait SinkPort: Send + Sync {
    async fn commit_height(&self, record: &HeightRecord) -> Result<(), SinkError>;
    async fn advance_cursor(&self, height: u64) -> Result<(), SinkError>;
    async fn load_progress(&self) -> Result<u64, SinkError>;
    async fn load_skipped_heights(&self) -> Result<Vec<u64>, SinkError>;
    async fn record_skip(&self, height: u64) -> Result<(), SinkError>;
}

#[derive(Clone)]
pub struct Sink {
    db: DatabaseConnection,
}

impl Sink {
    pub async fn connect(dsn: &str) -> Result<Self, SinkError> {
        let options = ConnectOptions::new(dsn.to_owned());
        let db = Database::connect(options).await?;
        Ok(Self { db })
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Writes a height's block, transactions, messages, events and any newly
    /// resolved denoms, then advances the progress cursor, all inside one
    /// transaction. Every table is upserted on its primary key so retrying
    /// the same height after a crash is safe.
    #[instrument(skip(self, record), fields(height = record.block.height))]
    pub async fn commit_height(&self, record: &HeightRecord) -> Result<(), SinkError> {
        let height = record.block.height;
        let txn = self.db.begin().await?;

        let block_model = blocks_raw::ActiveModel {
            id: Set(height as i64),
            block_hash: Set(record.block.block_hash.clone()),
            chain_id: Set(record.block.chain_id.clone()),
            proposer_address: Set(record.block.proposer.clone()),
            timestamp: Set(record.block.time),
            data: Set(record.block.raw_json.clone()),
        };
        blocks_raw::Entity::insert(block_model)
            .on_conflict(OnConflict::column(blocks_raw::Column::Id).update_columns([
                blocks_raw::Column::BlockHash,
                blocks_raw::Column::ChainId,
                blocks_raw::Column::ProposerAddress,
                blocks_raw::Column::Timestamp,
                blocks_raw::Column::Data,
            ]).to_owned())
            .exec(&txn)
            .await
            .map_err(|source| SinkError::TransactionFailed { height, source })?;

        for tx in &record.transactions {
            let (error_code, error_log) = match &tx.error {
                Some(e) => (Some(e.code as i32), Some(e.log.clone())),
                None => (None, None),
            };
            let fee_json = serde_json::to_value(
                tx.fee
                    .iter()
                    .map(|c| serde_json::json!({"denom": c.denom, "amount": c.amount}))
                    .collect::<Vec<_>>(),
            )
            .unwrap_or(serde_json::Value::Null);

            let tx_model = transactions_main::ActiveModel {
                id: Set(tx.tx_hash.clone()),
                height: Set(height as i64),
                index_in_block: Set(tx.index_in_block as i32),
                fee: Set(fee_json),
                gas_limit: Set(tx.gas_limit as i64),
                memo: Set(tx.memo.clone()),
                error_code: Set(error_code),
                error_log: Set(error_log),
                timestamp: Set(tx.time),
                proposal_ids: Set((!tx.proposal_ids.is_empty()).then(|| tx.proposal_ids.clone())),
            };
            transactions_main::Entity::insert(tx_model)
                .on_conflict(OnConflict::column(transactions_main::Column::Id).update_columns([
                    transactions_main::Column::IndexInBlock,
                    transactions_main::Column::Fee,
                    transactions_main::Column::GasLimit,
                    transactions_main::Column::Memo,
                    transactions_main::Column::ErrorCode,
                    transactions_main::Column::ErrorLog,
                    transactions_main::Column::Timestamp,
                    transactions_main::Column::ProposalIds,
                ]).to_owned())
                .exec(&txn)
                .await
                .map_err(|source| SinkError::TransactionFailed { height, source })?;

            let raw_model = transactions_raw::ActiveModel {
                id: Set(tx.tx_hash.clone()),
                data: Set(tx.raw_json.clone()),
            };
            transactions_raw::Entity::insert(raw_model)
                .on_conflict(OnConflict::column(transactions_raw::Column::Id).update_column(transactions_raw::Column::Data).to_owned())
                .exec(&txn)
                .await
                .map_err(|source| SinkError::TransactionFailed { height, source })?;

            // Messages/events are deleted then reinserted by tx_hash rather
            // than upserted, so a clean replay never leaves stale rows
            // behind when a tx decodes to fewer messages/events than before.
            messages_main::Entity::delete_many()
                .filter(messages_main::Column::TxId.eq(tx.tx_hash.clone()))
                .exec(&txn)
                .await
                .map_err(|source| SinkError::TransactionFailed { height, source })?;
            if !tx.messages.is_empty() {
                let message_models = tx.messages.iter().map(|m| messages_main::ActiveModel {
                    tx_id: Set(tx.tx_hash.clone()),
                    message_index: Set(m.message_index as i32),
                    r#type: Set(m.type_url.clone()),
                    sender: Set(m.sender.clone()),
                    mentions: Set(m.mentions.clone()),
                    metadata: Set(m.metadata.clone()),
                });
                messages_main::Entity::insert_many(message_models)
                    .exec(&txn)
                    .await
                    .map_err(|source| SinkError::TransactionFailed { height, source })?;
            }

            events_main::Entity::delete_many()
                .filter(events_main::Column::TxId.eq(tx.tx_hash.clone()))
                .exec(&txn)
                .await
                .map_err(|source| SinkError::TransactionFailed { height, source })?;
            if !tx.events.is_empty() {
                let event_models = tx.events.iter().map(|e| events_main::ActiveModel {
                    tx_id: Set(tx.tx_hash.clone()),
                    event_index: Set(e.event_index as i32),
                    attr_index: Set(e.attr_index as i32),
                    event_type: Set(e.event_type.clone()),
                    attr_key: Set(e.attr_key.clone()),
                    attr_value: Set(e.attr_value.clone()),
                    msg_index: Set(e.msg_index.map(|i| i as i32)),
                });
                events_main::Entity::insert_many(event_models)
                    .exec(&txn)
                    .await
                    .map_err(|source| SinkError::TransactionFailed { height, source })?;
            }
        }

        if !record.denoms.is_empty() {
            let denom_models = record.denoms.iter().map(|d| denom_metadata::ActiveModel {
                denom: Set(d.denom.clone()),
                base_denom: Set(d.base_denom.clone()),
                display_name: Set(d.display_name.clone()),
                symbol: Set(d.symbol.clone()),
                decimals: Set(d.decimals as i32),
                is_ibc: Set(d.is_ibc),
                ibc_hash: Set(d.ibc_hash.clone()),
                ibc_path: Set(d.ibc_path.clone()),
                hash_mismatch: Set(d.hash_mismatch),
                chain_id: Set(d.chain_id.clone()),
                last_updated: Set(OffsetDateTime::now_utc()),
            });
            denom_metadata::Entity::insert_many(denom_models)
                .on_conflict(
                    OnConflict::column(denom_metadata::Column::Denom)
                        .update_columns([
                            denom_metadata::Column::BaseDenom,
                            denom_metadata::Column::DisplayName,
                            denom_metadata::Column::Symbol,
                            denom_metadata::Column::Decimals,
                            denom_metadata::Column::IsIbc,
                            denom_metadata::Column::IbcHash,
                            denom_metadata::Column::IbcPath,
                            denom_metadata::Column::HashMismatch,
                            denom_metadata::Column::ChainId,
                            denom_metadata::Column::LastUpdated,
                        ])
                        .to_owned(),
                )
                .exec(&txn)
                .await
                .map_err(|source| SinkError::TransactionFailed { height, source })?;
        }

        let progress_model = progress::ActiveModel {
            id: Set(0),
            last_committed_height: Set(height as i64),
            updated_at: Set(OffsetDateTime::now_utc()),
            skipped_heights: Set(Vec::new()),
        };
        progress::Entity::insert(progress_model)
            .on_conflict(
                OnConflict::column(progress::Column::Id)
                    .update_columns([progress::Column::LastCommittedHeight, progress::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec(&txn)
            .await
            .map_err(|source| SinkError::TransactionFailed { height, source })?;

        txn.commit().await.map_err(|source| SinkError::TransactionFailed { height, source })?;
        debug!(height, txs = record.transactions.len(), "committed height");
        Ok(())
    }

    /// Advances the commit cursor past a height with no row of its own —
    /// used only when the skip failure policy drops a height entirely.
    pub async fn advance_cursor(&self, height: u64) -> Result<(), SinkError> {
        let model = progress::ActiveModel {
            id: Set(0),
            last_committed_height: Set(height as i64),
            updated_at: Set(OffsetDateTime::now_utc()),
            skipped_heights: Set(Vec::new()),
        };
        progress::Entity::insert(model)
            .on_conflict(
                OnConflict::column(progress::Column::Id)
                    .update_columns([progress::Column::LastCommittedHeight, progress::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn load_progress(&self) -> Result<u64, SinkError> {
        let row = progress::Entity::find_by_id(0).one(&self.db).await?;
        Ok(row.map(|m| m.last_committed_height as u64).unwrap_or(0))
    }

    pub async fn load_skipped_heights(&self) -> Result<Vec<u64>, SinkError> {
        let row = progress::Entity::find_by_id(0).one(&self.db).await?;
        Ok(row
            .map(|m| m.skipped_heights.into_iter().map(|h| h as u64).collect())
            .unwrap_or_default())
    }

    /// Appends `height` to the persisted skip-list under the skip failure
    /// policy (\S4.7). A plain array append, issued as raw SQL since
    /// sea-orm has no typed helper for it.
    pub async fn record_skip(&self, height: u64) -> Result<(), SinkError> {
        self.db
            .execute(Statement::from_sql_and_values(
                self.db.get_database_backend(),
                r#"UPDATE "progress" SET skipped_heights = array_append(skipped_heights, $1) WHERE id = 0"#,
                [(height as i64).into()],
            ))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SinkPort for Sink {
    async fn commit_height(&self, record: &HeightRecord) -> Result<(), SinkError> {
        self.commit_height(record).await
    }

    async fn advance_cursor(&self, height: u64) -> Result<(), SinkError> {
        self.advance_cursor(height).await
    }

    async fn load_progress(&self) -> Result<u64, SinkError> {
        self.load_progress().await
    }

    async fn load_skipped_heights(&self) -> Result<Vec<u64>, SinkError> {
        self.load_skipped_heights().await
    }

    async fn record_skip(&self, height: u64) -> Result<(), SinkError> {
        self.record_skip(height).await
    }
}
