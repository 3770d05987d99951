use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum WalletPasses {
    Table,
    Id,
    MemberId,
    AppleSerialNumber,
    ApplePassPath,
    GoogleObjectId,
    GoogleClassId,
    GooglePassUrl,
    BarcodeData,
    Status,
    CreatedAt,
    UpdatedAt,
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
                    .table(WalletPasses::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WalletPasses::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    // one pass record per member
                    .col(
                        ColumnDef::new(WalletPasses::MemberId)
                            .big_integer()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(WalletPasses::AppleSerialNumber)
                            .string_len(100)
                            .null(),
                    )
                    .col(ColumnDef::new(WalletPasses::ApplePassPath).string_len(255).null())
                    .col(ColumnDef::new(WalletPasses::GoogleObjectId).string_len(100).null())
                    .col(ColumnDef::new(WalletPasses::GoogleClassId).string_len(100).null())
                    .col(ColumnDef::new(WalletPasses::GooglePassUrl).text().null())
                    .col(ColumnDef::new(WalletPasses::BarcodeData).string_len(255).null())
                    // active | pending | expired | revoked
                    .col(
                        ColumnDef::new(WalletPasses::Status)
                            .string_len(20)
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(WalletPasses::CreatedAt)
                            .timestamp_with_time_zone()
                            .default(Expr::current_timestamp())
                            .null(),
                    )
                    .col(
                        ColumnDef::new(WalletPasses::UpdatedAt)
                            .timestamp_with_time_zone()
                            .default(Expr::current_timestamp())
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_wallet_passes_member_id")
                            .from(WalletPasses::Table, WalletPasses::MemberId)
                            .to(Members::Table, Members::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_wallet_passes_status")
                    .table(WalletPasses::Table)
                    .col(WalletPasses::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(WalletPasses::Table).to_owned())
            .await?;
        Ok(())
    }
}
