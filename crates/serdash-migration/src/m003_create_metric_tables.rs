//! Миграция: таблицы временных рядов метрик (по одной на категорию).

use crate::m001_create_servers::Servers;
use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m003_create_metric_tables"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let tables = [
            sample_table(
                Alias::new("disk_samples"),
                vec![
                    ColumnDef::new(Alias::new("mount_point"))
                        .string()
                        .not_null()
                        .to_owned(),
                    ColumnDef::new(Alias::new("total_bytes")).big_integer().to_owned(),
                    ColumnDef::new(Alias::new("free_bytes")).big_integer().to_owned(),
                ],
            ),
            sample_table(
                Alias::new("memory_samples"),
                vec![
                    ColumnDef::new(Alias::new("total_bytes")).big_integer().to_owned(),
                    ColumnDef::new(Alias::new("used_bytes")).big_integer().to_owned(),
                    ColumnDef::new(Alias::new("free_bytes")).big_integer().to_owned(),
                ],
            ),
            sample_table(
                Alias::new("cpu_samples"),
                vec![
                    ColumnDef::new(Alias::new("usage_percent")).double().to_owned(),
                    ColumnDef::new(Alias::new("temperature_celsius"))
                        .double()
                        .to_owned(),
                ],
            ),
            sample_table(
                Alias::new("network_interface_samples"),
                vec![
                    ColumnDef::new(Alias::new("interface"))
                        .string()
                        .not_null()
                        .to_owned(),
                    ColumnDef::new(Alias::new("status")).string().to_owned(),
                    ColumnDef::new(Alias::new("ip_addresses"))
                        .json()
                        .not_null()
                        .to_owned(),
                ],
            ),
            sample_table(
                Alias::new("listening_port_samples"),
                vec![
                    ColumnDef::new(Alias::new("protocol"))
                        .string()
                        .not_null()
                        .to_owned(),
                    ColumnDef::new(Alias::new("port"))
                        .integer()
                        .not_null()
                        .to_owned(),
                    ColumnDef::new(Alias::new("process")).string().to_owned(),
                ],
            ),
            sample_table(
                Alias::new("connection_samples"),
                vec![
                    ColumnDef::new(Alias::new("local_addr")).string().to_owned(),
                    ColumnDef::new(Alias::new("remote_addr")).string().to_owned(),
                    ColumnDef::new(Alias::new("state")).string().to_owned(),
                ],
            ),
        ];

        for (name, table) in tables {
            manager.create_table(table).await?;

            // Выборки графиков идут по (server_id, sampled_at)
            manager
                .create_index(
                    Index::create()
                        .name(format!("idx_{}_server_id_sampled_at", name.to_string()))
                        .table(name)
                        .col(Alias::new("server_id"))
                        .col(Alias::new("sampled_at"))
                        .to_owned(),
                )
                .await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for name in [
            "connection_samples",
            "listening_port_samples",
            "network_interface_samples",
            "cpu_samples",
            "memory_samples",
            "disk_samples",
        ] {
            manager
                .drop_table(Table::drop().table(Alias::new(name)).to_owned())
                .await?;
        }
        Ok(())
    }
}

/// Общий каркас таблицы сэмплов: id, server_id (FK с каскадным удалением),
/// sampled_at, поля категории, created_at.
fn sample_table(name: Alias, columns: Vec<ColumnDef>) -> (Alias, TableCreateStatement) {
    let mut table = Table::create();
    table
        .table(name.clone())
        .if_not_exists()
        .col(
            ColumnDef::new(Alias::new("id"))
                .integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(ColumnDef::new(Alias::new("server_id")).integer().not_null())
        .col(
            ColumnDef::new(Alias::new("sampled_at"))
                .timestamp_with_time_zone()
                .not_null(),
        );

    for mut column in columns {
        table.col(&mut column);
    }

    table
        .col(
            ColumnDef::new(Alias::new("created_at"))
                .timestamp_with_time_zone()
                .not_null(),
        )
        .foreign_key(
            ForeignKey::create()
                .name(format!("fk_{}_server_id", name.to_string()))
                .from(name.clone(), Alias::new("server_id"))
                .to(Servers::Table, Servers::Id)
                .on_delete(ForeignKeyAction::Cascade),
        );

    (name, table.to_owned())
}
