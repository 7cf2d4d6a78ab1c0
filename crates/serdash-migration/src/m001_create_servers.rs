//! Миграция: создание таблицы servers.

use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m001_create_servers"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Servers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Servers::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Servers::Hostname).string())
                    .col(ColumnDef::new(Servers::Ip).string())
                    .col(ColumnDef::new(Servers::AgentPublicKey).text())
                    .col(
                        ColumnDef::new(Servers::Status)
                            .string_len(32)
                            .not_null()
                            .default("pending_registration"),
                    )
                    .col(ColumnDef::new(Servers::LastSeenAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Servers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Servers::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Servers::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub(crate) enum Servers {
    Table,
    Id,
    Hostname,
    Ip,
    AgentPublicKey,
    Status,
    LastSeenAt,
    CreatedAt,
    UpdatedAt,
}
