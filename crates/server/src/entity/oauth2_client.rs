//! OAuth2 Client entity. Provisioned out of band, read-only to the grant manager.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth2_client")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[serde(skip_serializing)]
    pub secret: String,
    /// Human-readable client name
    pub name: String,
    /// JSON array of allowed redirect URIs
    pub redirect_uris: String,
    /// Space-separated list of allowed grant types
    pub grant_types: String,
    /// Space-separated list of allowed scopes
    pub scopes: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parse redirect URIs from JSON string
    pub fn redirect_uris_list(&self) -> Vec<String> {
        serde_json::from_str(&self.redirect_uris).unwrap_or_default()
    }

    pub fn scopes_list(&self) -> Vec<&str> {
        self.scopes.split_whitespace().collect()
    }

    /// Exact membership only, no prefix or wildcard matching.
    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.redirect_uris_list()
            .iter()
            .any(|allowed| allowed == uri)
    }

    pub fn is_grant_type_allowed(&self, grant_type: &str) -> bool {
        self.grant_types.split_whitespace().any(|g| g == grant_type)
    }

    /// Intersects the requested scopes with the allowed set, keeping request order.
    /// An absent or fully rejected request falls back to the full allowed set.
    pub fn negotiate_scope(&self, requested: Option<&str>) -> String {
        let allowed = self.scopes_list();
        let granted: Vec<&str> = requested
            .unwrap_or_default()
            .split_whitespace()
            .filter(|s| allowed.contains(s))
            .collect();
        if granted.is_empty() {
            allowed.join(" ")
        } else {
            granted.join(" ")
        }
    }

    /// Exact comparison of the presented secret, in constant time for
    /// inputs of equal length.
    pub fn secret_matches(&self, presented: &str) -> bool {
        self.secret.as_bytes().ct_eq(presented.as_bytes()).into()
    }
}
