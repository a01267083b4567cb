use crate::entity::user;
use crate::error::StoreError;
use crate::store::UserStore;
use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
};
use std::sync::Arc;

/// sea-orm backed [`UserStore`].
#[derive(Clone)]
pub struct DbUserStore {
    db: Arc<DatabaseConnection>,
}

impl DbUserStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for DbUserStore {
    #[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
    async fn create(&self, user: user::Model) -> Result<user::Model, StoreError> {
        user.into_active_model()
            .reset_all()
            .insert(self.db.as_ref())
            .await
            .map_err(StoreError::from_user_write)
    }

    #[tracing::instrument(skip(self))]
    async fn get_by_id(&self, id: &str) -> Result<Option<user::Model>, StoreError> {
        Ok(user::Entity::find_by_id(id).one(self.db.as_ref()).await?)
    }

    #[tracing::instrument(skip(self, email))]
    async fn get_by_email(&self, email: &str) -> Result<Option<user::Model>, StoreError> {
        Ok(user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(self.db.as_ref())
            .await?)
    }

    #[tracing::instrument(skip(self))]
    async fn get_by_username(&self, username: &str) -> Result<Option<user::Model>, StoreError> {
        Ok(user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(self.db.as_ref())
            .await?)
    }

    #[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
    async fn update(&self, user: user::Model) -> Result<user::Model, StoreError> {
        user.into_active_model()
            .reset_all()
            .update(self.db.as_ref())
            .await
            .map_err(StoreError::from_user_write)
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let result = user::Entity::delete_by_id(id).exec(self.db.as_ref()).await?;
        Ok(result.rows_affected > 0)
    }
}
