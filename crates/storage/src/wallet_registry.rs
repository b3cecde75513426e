use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{EntityTrait, QueryOrder, Set};
use wallet_ledger_domain::model::{Wallet, WalletId};
use wallet_ledger_domain::storage::{StorageError, StorageResult, WalletRegistry};

use crate::entity::wallets;
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl WalletRegistry for SeaOrmStorage {
    async fn list_active(&self) -> StorageResult<Vec<Wallet>> {
        let rows = wallets::Entity::find()
            .order_by_asc(wallets::Column::AddedAt)
            .order_by_asc(wallets::Column::WalletId)
            .all(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(rows
            .into_iter()
            .map(|row| Wallet::new(WalletId::new(row.wallet_id), row.address))
            .collect())
    }

    async fn add(&self, wallet_id: &WalletId, address: &str) -> StorageResult<()> {
        let model = wallets::ActiveModel {
            wallet_id: Set(wallet_id.as_str().to_string()),
            address: Set(address.to_string()),
            added_at: Set(Utc::now()),
        };
        wallets::Entity::insert(model)
            .on_conflict(
                OnConflict::column(wallets::Column::WalletId)
                    .update_column(wallets::Column::Address)
                    .to_owned(),
            )
            .exec_without_returning(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(())
    }

    async fn remove(&self, wallet_id: &WalletId) -> StorageResult<bool> {
        let result = wallets::Entity::delete_by_id(wallet_id.as_str().to_string())
            .exec(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(result.rows_affected > 0)
    }
}
