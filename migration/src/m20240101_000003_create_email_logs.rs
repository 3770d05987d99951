use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum EmailLogs {
    Table,
    Id,
    MemberId,
    RecipientEmail,
    Subject,
    Status,
    ErrorMessage,
    SentAt,
}

#[derive(DeriveIden)]
enum Members {
    Table,
    Id,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EmailLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EmailLogs::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(EmailLogs::MemberId).big_integer().null())
                    .col(
                        ColumnDef::new(EmailLogs::RecipientEmail)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(ColumnDef::new(EmailLogs::Subject).string_len(255).not_null())
                    // sent | failed
                    .col(ColumnDef::new(EmailLogs::Status).string_len(20).not_null())
                    .col(ColumnDef::new(EmailLogs::ErrorMessage).text().null())
                    .col(
                        ColumnDef::new(EmailLogs::SentAt)
                            .timestamp_with_time_zone()
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_email_logs_member_id")
                            .from(EmailLogs::Table, EmailLogs::MemberId)
                            .to(Members::Table, Members::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_email_logs_member_id")
                    .table(EmailLogs::Table)
                    .col(EmailLogs::MemberId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EmailLogs::Table).to_owned())
            .await?;
        Ok(())
    }
}
