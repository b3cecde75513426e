use sea_orm::sea_query::{ColumnDef, Expr, Index, IndexCreateStatement, Table, TableCreateStatement};
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection};

use crate::entity::{wallet_events, wallets};
use wallet_ledger_domain::storage::{StorageError, StorageResult};

pub async fn run_migrations(db: &DatabaseConnection) -> StorageResult<()> {
    let backend = db.get_database_backend();

    let events_table = Table::create()
        .if_not_exists()
        .table(wallet_events::Entity)
        .col(
            ColumnDef::new(wallet_events::Column::Signature)
                .string_len(128)
                .not_null(),
        )
        .col(
            ColumnDef::new(wallet_events::Column::WalletId)
                .string_len(64)
                .not_null(),
        )
        .col(
            ColumnDef::new(wallet_events::Column::AssetId)
                .string_len(64)
                .not_null(),
        )
        .col(
            ColumnDef::new(wallet_events::Column::Slot)
                .big_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(wallet_events::Column::EventType)
                .string_len(16)
                .not_null(),
        )
        .col(
            ColumnDef::new(wallet_events::Column::Venue)
                .string_len(32)
                .not_null(),
        )
        .col(
            ColumnDef::new(wallet_events::Column::AssetSymbol)
                .string()
                .not_null(),
        )
        .col(
            ColumnDef::new(wallet_events::Column::AssetName)
                .string()
                .not_null(),
        )
        .col(ColumnDef::new(wallet_events::Column::AssetLogo).string().null())
        .col(ColumnDef::new(wallet_events::Column::Amount).double().not_null())
        .col(
            ColumnDef::new(wallet_events::Column::UsdValue)
                .double()
                .not_null(),
        )
        .col(
            ColumnDef::new(wallet_events::Column::CounterpartyFrom)
                .string_len(64)
                .null(),
        )
        .col(
            ColumnDef::new(wallet_events::Column::CounterpartyTo)
                .string_len(64)
                .null(),
        )
        .col(
            ColumnDef::new(wallet_events::Column::Timestamp)
                .timestamp_with_time_zone()
                .not_null(),
        )
        .col(
            ColumnDef::new(wallet_events::Column::RecordedAt)
                .timestamp_with_time_zone()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .primary_key(
            Index::create()
                .col(wallet_events::Column::Signature)
                .col(wallet_events::Column::WalletId)
                .col(wallet_events::Column::AssetId),
        )
        .to_owned();
    create_table(db, backend, events_table).await?;

    let wallet_slot_index = Index::create()
        .if_not_exists()
        .name("idx_wallet_events_wallet_slot")
        .table(wallet_events::Entity)
        .col(wallet_events::Column::WalletId)
        .col(wallet_events::Column::Slot)
        .to_owned();
    create_index(db, backend, wallet_slot_index).await?;

    let wallets_table = Table::create()
        .if_not_exists()
        .table(wallets::Entity)
        .col(
            ColumnDef::new(wallets::Column::WalletId)
                .string_len(64)
                .not_null()
                .primary_key(),
        )
        .col(
            ColumnDef::new(wallets::Column::Address)
                .string_len(64)
                .not_null(),
        )
        .col(
            ColumnDef::new(wallets::Column::AddedAt)
                .timestamp_with_time_zone()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .to_owned();
    create_table(db, backend, wallets_table).await?;

    Ok(())
}

async fn create_table(
    db: &DatabaseConnection,
    backend: DatabaseBackend,
    mut statement: TableCreateStatement,
) -> StorageResult<()> {
    statement.if_not_exists();
    db.execute(backend.build(&statement))
        .await
        .map_err(StorageError::from_source)?;
    Ok(())
}

async fn create_index(
    db: &DatabaseConnection,
    backend: DatabaseBackend,
    statement: IndexCreateStatement,
) -> StorageResult<()> {
    db.execute(backend.build(&statement))
        .await
        .map_err(StorageError::from_source)?;
    Ok(())
}
