use sea_orm_migration::prelude::*;

use super::m20250301_000001_create_users::Users;

#[derive(DeriveMigrationName)]
pub struct Migration;

fn owner_fk(
    name: &str,
    table: impl Iden + 'static,
    column: impl Iden + 'static,
) -> ForeignKeyCreateStatement {
    ForeignKey::create()
        .name(name)
        .from(table, column)
        .to(Users::Table, Users::Id)
        .on_delete(ForeignKeyAction::Cascade)
        .on_update(ForeignKeyAction::Cascade)
        .to_owned()
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Productions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Productions::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Productions::UserId).integer().not_null())
                    .col(ColumnDef::new(Productions::ChickenCount).integer().not_null())
                    .col(ColumnDef::new(Productions::Mortality).integer().not_null().default(0))
                    .col(ColumnDef::new(Productions::FeedConsumption).double().not_null())
                    .col(ColumnDef::new(Productions::FeedCost).double().not_null().default(0.0))
                    .col(ColumnDef::new(Productions::VaccineCost).double().not_null().default(0.0))
                    .col(ColumnDef::new(Productions::UtilityCost).double().not_null().default(0.0))
                    .col(ColumnDef::new(Productions::OtherCost).double().not_null().default(0.0))
                    .col(ColumnDef::new(Productions::Revenue).double().not_null().default(0.0))
                    .col(ColumnDef::new(Productions::CreatedAt).date_time().not_null())
                    .col(ColumnDef::new(Productions::UpdatedAt).date_time().not_null())
                    .foreign_key(&mut owner_fk(
                        "fk-production-user_id",
                        Productions::Table,
                        Productions::UserId,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Vaccines::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Vaccines::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Vaccines::UserId).integer().not_null())
                    .col(ColumnDef::new(Vaccines::Name).string().not_null())
                    .col(ColumnDef::new(Vaccines::DateAdministered).date().not_null())
                    .col(ColumnDef::new(Vaccines::NextDueDate).date().not_null())
                    .col(ColumnDef::new(Vaccines::BatchNumber).string())
                    .col(ColumnDef::new(Vaccines::NumberOfChickens).integer())
                    .col(ColumnDef::new(Vaccines::Notes).text())
                    .col(ColumnDef::new(Vaccines::CreatedAt).date_time().not_null())
                    .col(ColumnDef::new(Vaccines::UpdatedAt).date_time().not_null())
                    .foreign_key(&mut owner_fk(
                        "fk-vaccine-user_id",
                        Vaccines::Table,
                        Vaccines::UserId,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Feedings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Feedings::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Feedings::UserId).integer().not_null())
                    .col(ColumnDef::new(Feedings::Quantity).double().not_null())
                    .col(ColumnDef::new(Feedings::FeedType).string().not_null())
                    .col(
                        ColumnDef::new(Feedings::AutomaticFeeding)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Feedings::RemainingStock).double().not_null())
                    .col(ColumnDef::new(Feedings::WaterStartTime).string_len(5))
                    .col(ColumnDef::new(Feedings::WaterEndTime).string_len(5))
                    .col(
                        ColumnDef::new(Feedings::WaterEnabled)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Feedings::CreatedAt).date_time().not_null())
                    .col(ColumnDef::new(Feedings::UpdatedAt).date_time().not_null())
                    .foreign_key(&mut owner_fk(
                        "fk-feeding-user_id",
                        Feedings::Table,
                        Feedings::UserId,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Costs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Costs::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Costs::UserId).integer().not_null())
                    .col(ColumnDef::new(Costs::Category).text().not_null())
                    .col(ColumnDef::new(Costs::Description).text().not_null())
                    .col(ColumnDef::new(Costs::Amount).double().not_null())
                    .col(ColumnDef::new(Costs::Date).date_time().not_null())
                    .col(ColumnDef::new(Costs::CreatedAt).date_time().not_null())
                    .col(ColumnDef::new(Costs::UpdatedAt).date_time().not_null())
                    .foreign_key(&mut owner_fk("fk-cost-user_id", Costs::Table, Costs::UserId))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_feedings_feed_type_created_at")
                    .table(Feedings::Table)
                    .col(Feedings::FeedType)
                    .col(Feedings::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_vaccines_next_due_date")
                    .table(Vaccines::Table)
                    .col(Vaccines::NextDueDate)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Costs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Feedings::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Vaccines::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Productions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Productions {
    Table,
    Id,
    UserId,
    ChickenCount,
    Mortality,
    FeedConsumption,
    FeedCost,
    VaccineCost,
    UtilityCost,
    OtherCost,
    Revenue,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Vaccines {
    Table,
    Id,
    UserId,
    Name,
    DateAdministered,
    NextDueDate,
    BatchNumber,
    NumberOfChickens,
    Notes,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Feedings {
    Table,
    Id,
    UserId,
    Quantity,
    FeedType,
    AutomaticFeeding,
    RemainingStock,
    WaterStartTime,
    WaterEndTime,
    WaterEnabled,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Costs {
    Table,
    Id,
    UserId,
    Category,
    Description,
    Amount,
    Date,
    CreatedAt,
    UpdatedAt,
}
