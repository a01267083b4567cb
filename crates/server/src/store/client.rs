use crate::entity::oauth2_client;
use crate::error::StoreError;
use crate::store::ClientStore;
use async_trait::async_trait;
use sea_orm::{DatabaseConnection, EntityTrait};
use std::sync::Arc;

/// Database-backed OAuth2 client lookup.
#[derive(Clone)]
pub struct DbClientStore {
    db: Arc<DatabaseConnection>,
}

impl DbClientStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ClientStore for DbClientStore {
    #[tracing::instrument(skip(self))]
    async fn get_client(
        &self,
        client_id: &str,
    ) -> Result<Option<oauth2_client::Model>, StoreError> {
        Ok(oauth2_client::Entity::find_by_id(client_id)
            .one(self.db.as_ref())
            .await?)
    }
}
