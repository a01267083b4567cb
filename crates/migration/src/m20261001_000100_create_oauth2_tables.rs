//! Creates the OAuth2 client and grant tables.
//!
//! - oauth2_client: registered clients, provisioned out of band
//! - oauth2_authorization: single-use authorization codes
//! - oauth2_access_token: stateful access tokens
//! - oauth2_refresh_token: stateful refresh tokens, each linked to one access token

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 1. Clients
        manager
            .create_table(
                Table::create()
                    .table(OAuth2Client::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuth2Client::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OAuth2Client::Secret).string().not_null())
                    .col(ColumnDef::new(OAuth2Client::Name).string().not_null())
                    .col(ColumnDef::new(OAuth2Client::RedirectUris).text().not_null())
                    .col(
                        ColumnDef::new(OAuth2Client::GrantTypes)
                            .text()
                            .not_null()
                            .default("authorization_code refresh_token"),
                    )
                    .col(
                        ColumnDef::new(OAuth2Client::Scopes)
                            .text()
                            .not_null()
                            .default("profile email"),
                    )
                    .col(
                        ColumnDef::new(OAuth2Client::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Client::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 2. Authorization codes
        manager
            .create_table(
                Table::create()
                    .table(OAuth2Authorization::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuth2Authorization::Code)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Authorization::ClientId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Authorization::UserId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Authorization::RedirectUri)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OAuth2Authorization::Scope).text().not_null())
                    .col(
                        ColumnDef::new(OAuth2Authorization::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Authorization::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 3. Access tokens
        manager
            .create_table(
                Table::create()
                    .table(OAuth2AccessToken::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuth2AccessToken::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OAuth2AccessToken::Token)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(OAuth2AccessToken::ClientId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OAuth2AccessToken::UserId).string().not_null())
                    .col(ColumnDef::new(OAuth2AccessToken::Scope).text().not_null())
                    .col(
                        ColumnDef::new(OAuth2AccessToken::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2AccessToken::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 4. Refresh tokens
        manager
            .create_table(
                Table::create()
                    .table(OAuth2RefreshToken::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuth2RefreshToken::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OAuth2RefreshToken::Token)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(OAuth2RefreshToken::ClientId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2RefreshToken::UserId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2RefreshToken::AccessTokenId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OAuth2RefreshToken::Scope).text().not_null())
                    .col(
                        ColumnDef::new(OAuth2RefreshToken::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2RefreshToken::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Indexes used by the expiry sweep and the revocation cascade
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth2_authorization_expires_at")
                    .table(OAuth2Authorization::Table)
                    .col(OAuth2Authorization::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth2_access_token_expires_at")
                    .table(OAuth2AccessToken::Table)
                    .col(OAuth2AccessToken::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth2_refresh_token_expires_at")
                    .table(OAuth2RefreshToken::Table)
                    .col(OAuth2RefreshToken::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth2_refresh_token_access_token_id")
                    .table(OAuth2RefreshToken::Table)
                    .col(OAuth2RefreshToken::AccessTokenId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for index in [
            "idx_oauth2_refresh_token_access_token_id",
            "idx_oauth2_refresh_token_expires_at",
            "idx_oauth2_access_token_expires_at",
            "idx_oauth2_authorization_expires_at",
        ] {
            manager
                .drop_index(Index::drop().name(index).to_owned())
                .await?;
        }

        manager
            .drop_table(Table::drop().table(OAuth2RefreshToken::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OAuth2AccessToken::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OAuth2Authorization::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OAuth2Client::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum OAuth2Client {
    #[sea_orm(iden = "oauth2_client")]
    Table,
    Id,
    Secret,
    Name,
    RedirectUris,
    GrantTypes,
    Scopes,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum OAuth2Authorization {
    #[sea_orm(iden = "oauth2_authorization")]
    Table,
    Code,
    ClientId,
    UserId,
    RedirectUri,
    Scope,
    ExpiresAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum OAuth2AccessToken {
    #[sea_orm(iden = "oauth2_access_token")]
    Table,
    Id,
    Token,
    ClientId,
    UserId,
    Scope,
    ExpiresAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum OAuth2RefreshToken {
    #[sea_orm(iden = "oauth2_refresh_token")]
    Table,
    Id,
    Token,
    ClientId,
    UserId,
    AccessTokenId,
    Scope,
    ExpiresAt,
    CreatedAt,
}
