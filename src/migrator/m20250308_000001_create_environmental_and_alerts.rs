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
                    .table(EnvironmentalReadings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EnvironmentalReadings::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(EnvironmentalReadings::UserId).integer().not_null())
                    .col(ColumnDef::new(EnvironmentalReadings::Temperature).double().not_null())
                    .col(ColumnDef::new(EnvironmentalReadings::Humidity).double().not_null())
                    .col(ColumnDef::new(EnvironmentalReadings::LightLevel).double().not_null())
                    .col(ColumnDef::new(EnvironmentalReadings::CreatedAt).date_time().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-environmental_reading-user_id")
                            .from(EnvironmentalReadings::Table, EnvironmentalReadings::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Alerts::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Alerts::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Alerts::ReadingId).integer())
                    .col(ColumnDef::new(Alerts::Category).text().not_null())
                    .col(ColumnDef::new(Alerts::Value).double().not_null())
                    .col(
                        ColumnDef::new(Alerts::Status)
                            .text()
                            .not_null()
                            .default("active"),
                    )
                    .col(ColumnDef::new(Alerts::TriggeredAt).date_time().not_null())
                    .col(ColumnDef::new(Alerts::AcknowledgedBy).integer())
                    .col(ColumnDef::new(Alerts::AcknowledgedAt).date_time())
                    .col(ColumnDef::new(Alerts::ResolvedBy).integer())
                    .col(ColumnDef::new(Alerts::ResolvedAt).date_time())
                    .col(ColumnDef::new(Alerts::CreatedAt).date_time().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-alert-reading_id")
                            .from(Alerts::Table, Alerts::ReadingId)
                            .to(EnvironmentalReadings::Table, EnvironmentalReadings::Id)
                            .on_delete(ForeignKeyAction::SetNull)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_alerts_status_created_at")
                    .table(Alerts::Table)
                    .col(Alerts::Status)
                    .col(Alerts::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AlertActions::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(AlertActions::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(AlertActions::AlertId).uuid().not_null())
                    .col(ColumnDef::new(AlertActions::UserId).integer().not_null())
                    .col(ColumnDef::new(AlertActions::Content).text().not_null())
                    .col(ColumnDef::new(AlertActions::CreatedAt).date_time().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-alert_action-alert_id")
                            .from(AlertActions::Table, AlertActions::AlertId)
                            .to(Alerts::Table, Alerts::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-alert_action-user_id")
                            .from(AlertActions::Table, AlertActions::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AlertActions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Alerts::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EnvironmentalReadings::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum EnvironmentalReadings {
    Table,
    Id,
    UserId,
    Temperature,
    Humidity,
    LightLevel,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Alerts {
    Table,
    Id,
    ReadingId,
    Category,
    Value,
    Status,
    TriggeredAt,
    AcknowledgedBy,
    AcknowledgedAt,
    ResolvedBy,
    ResolvedAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum AlertActions {
    Table,
    Id,
    AlertId,
    UserId,
    Content,
    CreatedAt,
}
