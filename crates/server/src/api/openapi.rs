//! OpenAPI/Utoipa configuration.

use crate::api::{accounts::AUTH_TAG, health::MISC_TAG};
use crate::oauth2::OAUTH2_TAG;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, OAuth2, Scopes, SecurityScheme},
};

/// Security addon for OpenAPI documentation.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);

        let bearer = HttpBuilder::new()
            .scheme(HttpAuthScheme::Bearer)
            .bearer_format("JWT")
            .description(Some(
                "Access token obtained from `/api/auth/register`, `/api/auth/login` or `/api/auth/refresh`.",
            ))
            .build();
        components.add_security_scheme("Authorization", SecurityScheme::Http(bearer));

        let oauth2 = OAuth2::new([utoipa::openapi::security::Flow::AuthorizationCode(
            utoipa::openapi::security::AuthorizationCode::new(
                "/oauth2/authorize",
                "/oauth2/token",
                Scopes::from_iter([
                    ("profile", "Access to the user profile"),
                    ("email", "Access to the user email"),
                ]),
            ),
        )]);
        components.add_security_scheme("OAuth2", SecurityScheme::OAuth2(oauth2));
    }
}

/// OpenAPI documentation configuration.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Commerce Auth API",
        version = "1.0.0",
        description = "Registration, login, token lifecycle and OAuth2 authorization-code grant."
    ),
    tags(
        (name = MISC_TAG, description = "Miscellaneous endpoints"),
        (name = AUTH_TAG, description = "Account and token endpoints"),
        (name = OAUTH2_TAG, description = "OAuth2 authorization server endpoints")
    )
)]
pub struct ApiDoc;
