//! User management command handlers

use anyhow::Context;

use crate::config::Config;
use crate::models::{User, UserRole};
use crate::services::UserUpdate;
use crate::state::SharedState;

/// Accepts either a user id or an email address.
async fn resolve_user(state: &SharedState, user: &str) -> anyhow::Result<User> {
    let found = if user.contains('@') {
        state.users.get_by_email(user).await
    } else {
        state.users.get(user).await
    };
    found.with_context(|| format!("User '{user}' not found"))
}

fn print_user(user: &User) {
    println!("{} <{}>", user.name, user.email);
    println!(
        "  ID: {} | Role: {} | Status: {}",
        user.id,
        user.role.as_str(),
        user.status.as_str()
    );
}

pub async fn cmd_user_create(
    config: &Config,
    name: &str,
    email: &str,
    admin: bool,
    approve: bool,
) -> anyhow::Result<()> {
    let state = SharedState::new(config.clone()).await?;
    let role = if admin { UserRole::Admin } else { UserRole::User };

    let registration = state
        .users
        .create_user(name, email, role, approve)
        .await
        .context("Failed to create user")?;

    println!("✓ User created");
    print_user(&registration.user);
    println!();
    println!("API key ({}):", registration.api_key.key.state);
    println!("  {}", registration.api_key.plaintext.as_str());
    println!();
    println!("Store it now. It cannot be shown again.");

    Ok(())
}

pub async fn cmd_user_approve(config: &Config, user: &str) -> anyhow::Result<()> {
    let state = SharedState::new(config.clone()).await?;
    let user = resolve_user(&state, user).await?;

    let approval = state.users.approve_user(&user.id).await?;
    println!("✓ Approved {}", approval.user.email);
    match approval.api_key {
        Some(key) => println!("  Key {} is now {}", key.id, key.state),
        None => println!("  No pending key to activate"),
    }
    Ok(())
}

pub async fn cmd_user_reject(config: &Config, user: &str) -> anyhow::Result<()> {
    let state = SharedState::new(config.clone()).await?;
    let user = resolve_user(&state, user).await?;

    let user = state.users.reject_user(&user.id).await?;
    println!("✓ Rejected {}", user.email);
    Ok(())
}

pub async fn cmd_user_update(
    config: &Config,
    user: &str,
    name: Option<String>,
    email: Option<String>,
    role: Option<UserRole>,
) -> anyhow::Result<()> {
    if name.is_none() && email.is_none() && role.is_none() {
        println!("Nothing to update. Pass --name, --email or --role.");
        return Ok(());
    }

    let state = SharedState::new(config.clone()).await?;
    let user = resolve_user(&state, user).await?;

    let updated = state
        .users
        .update(&user.id, UserUpdate { name, email, role })
        .await?;
    println!("✓ User updated");
    print_user(&updated);
    Ok(())
}

pub async fn cmd_user_delete(config: &Config, user: &str) -> anyhow::Result<()> {
    let state = SharedState::new(config.clone()).await?;
    let user = resolve_user(&state, user).await?;

    let report = state.users.delete_user(&user.id).await?;
    println!("✓ Deleted {}", user.email);
    println!(
        "  Revoked {} key(s), removed {} email bot(s)",
        report.revoked_keys, report.deleted_bots
    );
    Ok(())
}

pub async fn cmd_user_list(config: &Config) -> anyhow::Result<()> {
    let state = SharedState::new(config.clone()).await?;
    let users = state.users.list().await?;

    if users.is_empty() {
        println!("No users yet.");
        println!();
        println!("Create the first admin with: hermes user create <name> <email> --admin --approve");
        return Ok(());
    }

    println!("Users ({} total)", users.len());
    println!("{:-<70}", "");
    for user in &users {
        print_user(user);
    }

    Ok(())
}
