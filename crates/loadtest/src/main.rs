use goose::prelude::*;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_USER: AtomicUsize = AtomicUsize::new(0);

const PASSWORD: &str = "loadtest-password";

struct Session {
    email: String,
    access_token: String,
}

/// Each goose user registers its own account once, then reuses it.
async fn register(user: &mut GooseUser) -> TransactionResult {
    let n = NEXT_USER.fetch_add(1, Ordering::Relaxed);
    let run = std::process::id();
    let email = format!("load-{run}-{n}@example.com");
    let body = json!({
        "email": email,
        "username": format!("load_{run}_{n}"),
        "password": PASSWORD,
    });

    let mut goose = user.post_json("/api/auth/register", &body).await?;
    let Some(access_token) = access_token_from(goose.response).await else {
        return user.set_failure("registration failed", &mut goose.request, None, None);
    };
    user.set_session_data(Session {
        email,
        access_token,
    });
    Ok(())
}

async fn login(user: &mut GooseUser) -> TransactionResult {
    let Some(email) = user.get_session_data::<Session>().map(|s| s.email.clone()) else {
        return Ok(());
    };
    let body = json!({ "email": email, "password": PASSWORD });

    let mut goose = user.post_json("/api/auth/login", &body).await?;
    let Some(access_token) = access_token_from(goose.response).await else {
        return user.set_failure("login failed", &mut goose.request, None, None);
    };
    user.set_session_data(Session {
        email,
        access_token,
    });
    Ok(())
}

async fn validate(user: &mut GooseUser) -> TransactionResult {
    let Some(token) = user
        .get_session_data::<Session>()
        .map(|s| s.access_token.clone())
    else {
        return Ok(());
    };
    let _goose_metrics = user
        .post_json("/api/auth/validate", &json!({ "token": token }))
        .await?;
    Ok(())
}

async fn get_profile(user: &mut GooseUser) -> TransactionResult {
    let Some(token) = user
        .get_session_data::<Session>()
        .map(|s| s.access_token.clone())
    else {
        return Ok(());
    };
    let request_builder = user
        .get_request_builder(&GooseMethod::Get, "/api/auth/me")?
        .bearer_auth(token);
    let request = GooseRequest::builder()
        .set_request_builder(request_builder)
        .build();
    let _goose_metrics = user.request(request).await?;
    Ok(())
}

async fn health_check(user: &mut GooseUser) -> TransactionResult {
    let _goose_metrics = user.get("/healthz").await?;
    Ok(())
}

async fn access_token_from(
    response: Result<reqwest::Response, reqwest::Error>,
) -> Option<String> {
    let body: Value = response.ok()?.error_for_status().ok()?.json().await.ok()?;
    body["access_token"].as_str().map(str::to_string)
}

#[tokio::main]
async fn main() -> Result<(), GooseError> {
    GooseAttack::initialize()?
        .register_scenario(
            scenario!("HealthCheck").register_transaction(transaction!(health_check)),
        )
        .register_scenario(
            scenario!("Accounts")
                .register_transaction(transaction!(register).set_on_start())
                .register_transaction(transaction!(login).set_weight(1)?)
                .register_transaction(transaction!(validate).set_weight(5)?)
                .register_transaction(transaction!(get_profile).set_weight(3)?),
        )
        .execute()
        .await?;

    Ok(())
}
