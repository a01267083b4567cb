use crate::entity::{oauth2_access_token, oauth2_authorization, oauth2_refresh_token};
use crate::error::StoreError;
use crate::store::{ExpiredCounts, GrantStore, IssuedGrant};
use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, TransactionTrait,
};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::debug;

/// sea-orm backed [`GrantStore`].
///
/// Multi-statement writes run in one transaction; returning early drops the
/// transaction, which rolls it back.
#[derive(Clone)]
pub struct DbGrantStore {
    db: Arc<DatabaseConnection>,
}

impl DbGrantStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

async fn insert_pair<C: ConnectionTrait>(conn: &C, grant: IssuedGrant) -> Result<(), StoreError> {
    grant
        .access
        .into_active_model()
        .reset_all()
        .insert(conn)
        .await?;
    grant
        .refresh
        .into_active_model()
        .reset_all()
        .insert(conn)
        .await?;
    Ok(())
}

#[async_trait]
impl GrantStore for DbGrantStore {
    #[tracing::instrument(skip(self, code), fields(client_id = %code.client_id, user_id = %code.user_id))]
    async fn create_authorization_code(
        &self,
        code: oauth2_authorization::Model,
    ) -> Result<(), StoreError> {
        code.into_active_model()
            .reset_all()
            .insert(self.db.as_ref())
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, code))]
    async fn find_authorization_code(
        &self,
        code: &str,
        now: OffsetDateTime,
    ) -> Result<Option<oauth2_authorization::Model>, StoreError> {
        Ok(oauth2_authorization::Entity::find_by_id(code)
            .filter(oauth2_authorization::Column::ExpiresAt.gt(now))
            .one(self.db.as_ref())
            .await?)
    }

    #[tracing::instrument(skip(self, code, grant), fields(client_id = %grant.access.client_id))]
    async fn redeem_authorization_code(
        &self,
        code: &str,
        grant: IssuedGrant,
    ) -> Result<bool, StoreError> {
        let txn = self.db.begin().await?;

        let deleted = oauth2_authorization::Entity::delete_by_id(code)
            .exec(&txn)
            .await?;
        if deleted.rows_affected != 1 {
            debug!("authorization code already consumed");
            return Ok(false);
        }

        insert_pair(&txn, grant).await?;
        txn.commit().await?;
        Ok(true)
    }

    #[tracing::instrument(skip(self, token))]
    async fn find_access_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<oauth2_access_token::Model>, StoreError> {
        Ok(oauth2_access_token::Entity::find()
            .filter(oauth2_access_token::Column::Token.eq(token))
            .filter(oauth2_access_token::Column::ExpiresAt.gt(now))
            .one(self.db.as_ref())
            .await?)
    }

    #[tracing::instrument(skip(self, token))]
    async fn find_refresh_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<oauth2_refresh_token::Model>, StoreError> {
        Ok(oauth2_refresh_token::Entity::find()
            .filter(oauth2_refresh_token::Column::Token.eq(token))
            .filter(oauth2_refresh_token::Column::ExpiresAt.gt(now))
            .one(self.db.as_ref())
            .await?)
    }

    #[tracing::instrument(skip(self, grant), fields(client_id = %grant.access.client_id))]
    async fn rotate_refresh_token(
        &self,
        refresh_id: &str,
        grant: IssuedGrant,
    ) -> Result<bool, StoreError> {
        let txn = self.db.begin().await?;

        let Some(old) = oauth2_refresh_token::Entity::find_by_id(refresh_id)
            .one(&txn)
            .await?
        else {
            return Ok(false);
        };

        let deleted = oauth2_refresh_token::Entity::delete_by_id(old.id.as_str())
            .exec(&txn)
            .await?;
        if deleted.rows_affected != 1 {
            return Ok(false);
        }
        oauth2_access_token::Entity::delete_by_id(old.access_token_id.as_str())
            .exec(&txn)
            .await?;

        insert_pair(&txn, grant).await?;
        txn.commit().await?;
        Ok(true)
    }

    #[tracing::instrument(skip(self, token))]
    async fn revoke_access_token(&self, token: &str) -> Result<bool, StoreError> {
        let txn = self.db.begin().await?;

        let Some(access) = oauth2_access_token::Entity::find()
            .filter(oauth2_access_token::Column::Token.eq(token))
            .one(&txn)
            .await?
        else {
            return Ok(false);
        };

        oauth2_refresh_token::Entity::delete_many()
            .filter(oauth2_refresh_token::Column::AccessTokenId.eq(access.id.as_str()))
            .exec(&txn)
            .await?;
        oauth2_access_token::Entity::delete_by_id(access.id.as_str())
            .exec(&txn)
            .await?;

        txn.commit().await?;
        Ok(true)
    }

    #[tracing::instrument(skip(self, token))]
    async fn revoke_refresh_token(&self, token: &str) -> Result<bool, StoreError> {
        let txn = self.db.begin().await?;

        let Some(refresh) = oauth2_refresh_token::Entity::find()
            .filter(oauth2_refresh_token::Column::Token.eq(token))
            .one(&txn)
            .await?
        else {
            return Ok(false);
        };

        oauth2_refresh_token::Entity::delete_by_id(refresh.id.as_str())
            .exec(&txn)
            .await?;
        oauth2_access_token::Entity::delete_by_id(refresh.access_token_id.as_str())
            .exec(&txn)
            .await?;

        txn.commit().await?;
        Ok(true)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_expired(&self, cutoff: OffsetDateTime) -> Result<ExpiredCounts, StoreError> {
        let txn = self.db.begin().await?;

        let authorization_codes = oauth2_authorization::Entity::delete_many()
            .filter(oauth2_authorization::Column::ExpiresAt.lt(cutoff))
            .exec(&txn)
            .await?
            .rows_affected;
        let access_tokens = oauth2_access_token::Entity::delete_many()
            .filter(oauth2_access_token::Column::ExpiresAt.lt(cutoff))
            .exec(&txn)
            .await?
            .rows_affected;
        let refresh_tokens = oauth2_refresh_token::Entity::delete_many()
            .filter(oauth2_refresh_token::Column::ExpiresAt.lt(cutoff))
            .exec(&txn)
            .await?
            .rows_affected;

        txn.commit().await?;
        Ok(ExpiredCounts {
            authorization_codes,
            access_tokens,
            refresh_tokens,
        })
    }
}
