//! Миграция: создание таблицы registration_codes.

use crate::m001_create_servers::Servers;
use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m002_create_registration_codes"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RegistrationCodes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RegistrationCodes::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RegistrationCodes::ServerId).integer())
                    .col(
                        ColumnDef::new(RegistrationCodes::Code)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(RegistrationCodes::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RegistrationCodes::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_registration_codes_server_id")
                            .from(RegistrationCodes::Table, RegistrationCodes::ServerId)
                            .to(Servers::Table, Servers::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(RegistrationCodes::Table)
                    .col(RegistrationCodes::ServerId)
                    .name("idx_registration_codes_server_id")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RegistrationCodes::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum RegistrationCodes {
    Table,
    Id,
    ServerId,
    Code,
    ExpiresAt,
    CreatedAt,
}
