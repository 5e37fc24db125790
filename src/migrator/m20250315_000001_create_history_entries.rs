use sea_orm_migration::prelude::*;

use super::m20250301_000001_create_users::Users;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(HistoryEntries::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(HistoryEntries::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(HistoryEntries::Kind).text().not_null())
                    .col(ColumnDef::new(HistoryEntries::Data).json_binary().not_null())
                    .col(ColumnDef::new(HistoryEntries::UserId).integer().not_null())
                    .col(ColumnDef::new(HistoryEntries::Action).text().not_null())
                    .col(ColumnDef::new(HistoryEntries::Description).text().not_null())
                    .col(ColumnDef::new(HistoryEntries::Metadata).json_binary())
                    .col(ColumnDef::new(HistoryEntries::CreatedAt).date_time().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-history_entry-user_id")
                            .from(HistoryEntries::Table, HistoryEntries::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // The two hot listing paths: by type and by actor, newest first.
        manager
            .create_index(
                Index::create()
                    .name("idx_history_entries_kind_created_at")
                    .table(HistoryEntries::Table)
                    .col(HistoryEntries::Kind)
                    .col(HistoryEntries::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_history_entries_user_id_created_at")
                    .table(HistoryEntries::Table)
                    .col(HistoryEntries::UserId)
                    .col(HistoryEntries::CreatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(HistoryEntries::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum HistoryEntries {
    Table,
    Id,
    Kind,
    Data,
    UserId,
    Action,
    Description,
    Metadata,
    CreatedAt,
}
