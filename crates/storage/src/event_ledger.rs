use std::str::FromStr;

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set};
use tracing::debug;
use wallet_ledger_domain::model::{
    AppendOutcome, AssetMetadata, CursorSeed, EventKey, EventRecord, EventType, NewEvent,
    WalletId,
};
use wallet_ledger_domain::storage::{EventLedger, StorageError, StorageResult};

use crate::entity::wallet_events;
use crate::SeaOrmStorage;

impl SeaOrmStorage {
    async fn newest_event(&self, wallet_id: &str) -> StorageResult<Option<wallet_events::Model>> {
        wallet_events::Entity::find()
            .filter(wallet_events::Column::WalletId.eq(wallet_id))
            .order_by_desc(wallet_events::Column::Slot)
            .order_by_desc(wallet_events::Column::RecordedAt)
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)
    }
}

#[async_trait::async_trait]
impl EventLedger for SeaOrmStorage {
    async fn exists(&self, wallet_id: &WalletId, signature: &str) -> StorageResult<bool> {
        let found = wallet_events::Entity::find()
            .filter(wallet_events::Column::WalletId.eq(wallet_id.as_str()))
            .filter(wallet_events::Column::Signature.eq(signature))
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(found.is_some())
    }

    async fn event_exists(&self, key: &EventKey) -> StorageResult<bool> {
        let found = wallet_events::Entity::find_by_id((
            key.signature.clone(),
            key.wallet_id.as_str().to_string(),
            key.asset_id.clone(),
        ))
        .one(self.connection())
        .await
        .map_err(StorageError::from_source)?;
        Ok(found.is_some())
    }

    async fn append(&self, event: NewEvent) -> StorageResult<AppendOutcome> {
        let model = event_to_model(event)?;
        let inserted = wallet_events::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    wallet_events::Column::Signature,
                    wallet_events::Column::WalletId,
                    wallet_events::Column::AssetId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(self.connection())
            .await
            .map_err(StorageError::from_source)?;

        if inserted == 0 {
            debug!("event key already recorded");
            Ok(AppendOutcome::SkippedDuplicate)
        } else {
            Ok(AppendOutcome::Written)
        }
    }

    async fn most_recent_signature(&self, wallet_id: &WalletId) -> StorageResult<Option<String>> {
        Ok(self
            .newest_event(wallet_id.as_str())
            .await?
            .map(|model| model.signature))
    }

    async fn latest_cursors(&self) -> StorageResult<Vec<CursorSeed>> {
        let wallet_ids: Vec<String> = wallet_events::Entity::find()
            .select_only()
            .column(wallet_events::Column::WalletId)
            .distinct()
            .into_tuple()
            .all(self.connection())
            .await
            .map_err(StorageError::from_source)?;

        let mut seeds = Vec::with_capacity(wallet_ids.len());
        for wallet_id in wallet_ids {
            if let Some(model) = self.newest_event(&wallet_id).await? {
                seeds.push(CursorSeed {
                    wallet_id: WalletId::new(wallet_id),
                    signature: model.signature,
                    slot: slot_from_column(model.slot)?,
                });
            }
        }
        Ok(seeds)
    }

    async fn list_events(&self, wallet_id: &WalletId) -> StorageResult<Vec<EventRecord>> {
        wallet_events::Entity::find()
            .filter(wallet_events::Column::WalletId.eq(wallet_id.as_str()))
            .order_by_asc(wallet_events::Column::Slot)
            .order_by_asc(wallet_events::Column::RecordedAt)
            .all(self.connection())
            .await
            .map_err(StorageError::from_source)?
            .into_iter()
            .map(event_to_record)
            .collect()
    }
}

fn slot_to_column(slot: u64) -> StorageResult<i64> {
    i64::try_from(slot).map_err(|_| StorageError::Corrupt(format!("slot {slot} out of range")))
}

fn slot_from_column(slot: i64) -> StorageResult<u64> {
    u64::try_from(slot).map_err(|_| StorageError::Corrupt(format!("negative slot {slot}")))
}

fn event_to_model(event: NewEvent) -> StorageResult<wallet_events::ActiveModel> {
    Ok(wallet_events::ActiveModel {
        signature: Set(event.signature),
        wallet_id: Set(event.wallet_id.into_inner()),
        asset_id: Set(event.asset_id),
        slot: Set(slot_to_column(event.slot)?),
        event_type: Set(event.event_type.to_string()),
        venue: Set(event.venue),
        asset_symbol: Set(event.asset.symbol),
        asset_name: Set(event.asset.name),
        asset_logo: Set(event.asset.logo),
        amount: Set(event.amount),
        usd_value: Set(event.usd_value),
        counterparty_from: Set(event.counterparty_from),
        counterparty_to: Set(event.counterparty_to),
        timestamp: Set(event.timestamp),
        recorded_at: Set(Utc::now()),
    })
}

fn event_to_record(model: wallet_events::Model) -> StorageResult<EventRecord> {
    let event_type = EventType::from_str(&model.event_type)
        .map_err(|_| StorageError::Corrupt(format!("event type `{}`", model.event_type)))?;

    Ok(EventRecord {
        event: NewEvent {
            signature: model.signature,
            wallet_id: WalletId::new(model.wallet_id),
            slot: slot_from_column(model.slot)?,
            event_type,
            venue: model.venue,
            asset_id: model.asset_id,
            asset: AssetMetadata {
                name: model.asset_name,
                symbol: model.asset_symbol,
                logo: model.asset_logo,
            },
            amount: model.amount,
            usd_value: model.usd_value,
            counterparty_from: model.counterparty_from,
            counterparty_to: model.counterparty_to,
            timestamp: model.timestamp,
        },
        recorded_at: model.recorded_at,
    })
}
