use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum WalletPasses {
    Table,
    IsAppleAdded,
    IsGoogleAdded,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Tracks whether the end user actually added the pass to their
        // wallet, which is distinct from the server having generated it.
        manager
            .alter_table(
                Table::alter()
                    .table(WalletPasses::Table)
                    .add_column(
                        ColumnDef::new(WalletPasses::IsAppleAdded)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .alter_table(
                Table::alter()
                    .table(WalletPasses::Table)
                    .add_column(
                        ColumnDef::new(WalletPasses::IsGoogleAdded)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .alter_table(
                Table::alter()
                    .table(WalletPasses::Table)
                    .drop_column(WalletPasses::IsAppleAdded)
                    .to_owned(),
            )
            .await?;

        manager
            .alter_table(
                Table::alter()
                    .table(WalletPasses::Table)
                    .drop_column(WalletPasses::IsGoogleAdded)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}
