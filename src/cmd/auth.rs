//! `shopfloor login`, `logout`, and `whoami`.

use std::sync::Arc;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Input, Password};

use shopfloor::SyncClient;
use shopfloor::config::ShopfloorConfig;
use shopfloor::storage::{CredentialStore, Scope};

pub async fn cmd_login(
    config: &ShopfloorConfig,
    email: Option<String>,
    remember: bool,
) -> Result<()> {
    let email = match email {
        Some(email) => email,
        None => Input::new()
            .with_prompt("Email")
            .interact_text()
            .context("Failed to read email")?,
    };
    let password = Password::new()
        .with_prompt("Password")
        .interact()
        .context("Failed to read password")?;

    let store = Arc::new(CredentialStore::open_default()?);
    let client = SyncClient::new(config, store)?;
    let response = client.api().login(&email, &password, remember).await?;

    let name = response
        .user
        .map(|u| format!("{} {}", u.first_name, u.last_name))
        .unwrap_or_else(|| email.clone());
    let scope = if remember { "durable" } else { "session" };
    println!(
        "{} Logged in as {} ({} storage)",
        style("✓").green(),
        style(name).bold(),
        scope
    );
    if !remember {
        println!(
            "{}",
            style("Session-scope credentials are gone when this process exits.").dim()
        );
    }
    Ok(())
}

pub fn cmd_logout(_config: &ShopfloorConfig) -> Result<()> {
    let store = CredentialStore::open_default()?;
    store.clear_all()?;
    println!("{} Logged out, credentials cleared", style("✓").green());
    Ok(())
}

pub fn cmd_whoami() -> Result<()> {
    let store = CredentialStore::open_default()?;
    match (store.identity(), store.active_scope()) {
        (Some(identity), Some(scope)) => {
            let scope = match scope {
                Scope::Durable => "durable",
                Scope::Session => "session",
            };
            println!("user id {} ({} storage scope)", identity.id, scope);
        }
        _ => println!("{}", style("Not logged in").dim()),
    }
    Ok(())
}
