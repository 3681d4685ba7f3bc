use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EmailConfigs::Table)
                    .if_not_exists()
                    .col(pk_uuid(EmailConfigs::Id))
                    .col(uuid(EmailConfigs::UserId))
                    .col(string_len(EmailConfigs::SenderEmail, 255))
                    // AES-GCM output, lowercase hex
                    .col(text(EmailConfigs::Ciphertext))
                    .col(string_len(EmailConfigs::Iv, 32))
                    .col(string_len(EmailConfigs::AuthTag, 32))
                    .col(
                        timestamp_with_time_zone(EmailConfigs::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(EmailConfigs::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // One credential per sender address per user
        manager
            .create_index(
                Index::create()
                    .name("uq_email_configs_user_sender")
                    .table(EmailConfigs::Table)
                    .col(EmailConfigs::UserId)
                    .col(EmailConfigs::SenderEmail)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EmailConfigs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum EmailConfigs {
    Table,
    Id,
    UserId,
    SenderEmail,
    Ciphertext,
    Iv,
    AuthTag,
    CreatedAt,
    UpdatedAt,
}
