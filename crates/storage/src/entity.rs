pub mod wallet_events {
    use sea_orm::entity::prelude::*;
    use sea_orm::sea_query::Expr;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "wallet_events")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub signature: String,
        #[sea_orm(primary_key, auto_increment = false)]
        pub wallet_id: String,
        #[sea_orm(primary_key, auto_increment = false)]
        pub asset_id: String,
        pub slot: i64,
        pub event_type: String,
        pub venue: String,
        pub asset_symbol: String,
        pub asset_name: String,
        pub asset_logo: Option<String>,
        pub amount: f64,
        pub usd_value: f64,
        pub counterparty_from: Option<String>,
        pub counterparty_to: Option<String>,
        pub timestamp: DateTimeUtc,
        #[sea_orm(default_expr = "Expr::current_timestamp()")]
        pub recorded_at: DateTimeUtc,
    }

    #[derive(Debug, Clone, Copy, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod wallets {
    use sea_orm::entity::prelude::*;
    use sea_orm::sea_query::Expr;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "wallets")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub wallet_id: String,
        pub address: String,
        #[sea_orm(default_expr = "Expr::current_timestamp()")]
        pub added_at: DateTimeUtc,
    }

    #[derive(Debug, Clone, Copy, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}
