use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Campaigns::Table)
                    .if_not_exists()
                    .col(pk_uuid(Campaigns::Id))
                    .col(uuid(Campaigns::OwnerId))
                    .col(string_len(Campaigns::SenderEmail, 255))
                    .col(text(Campaigns::Subject))
                    .col(text(Campaigns::Body))
                    .col(json_binary(Campaigns::Recipients))
                    .col(string_len(Campaigns::Status, 32).default("draft"))
                    .col(integer(Campaigns::Total).default(0))
                    .col(integer(Campaigns::Sent).default(0))
                    .col(integer(Campaigns::Failed).default(0))
                    .col(
                        timestamp_with_time_zone(Campaigns::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Campaigns::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_campaigns_owner_status")
                    .table(Campaigns::Table)
                    .col(Campaigns::OwnerId)
                    .col(Campaigns::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_campaigns_owner_created_at")
                    .table(Campaigns::Table)
                    .col(Campaigns::OwnerId)
                    .col(Campaigns::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Campaigns::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Campaigns {
    Table,
    Id,
    OwnerId,
    SenderEmail,
    Subject,
    Body,
    Recipients,
    Status,
    Total,
    Sent,
    Failed,
    CreatedAt,
    UpdatedAt,
}
