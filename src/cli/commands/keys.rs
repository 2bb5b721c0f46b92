//! Master key command handlers

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::Config;
use crate::crypto::MasterKey;
use crate::services::RotationSummary;
use crate::state::SharedState;

pub fn cmd_keys_generate(version: Option<u32>) {
    let key = MasterKey::generate();
    let encoded = key.to_base64();
    match version {
        Some(version) => println!("{version}:{}", encoded.as_str()),
        None => println!("{}", encoded.as_str()),
    }
}

/// Cancels `token` on Ctrl+C so a rotation stops between batches.
fn cancel_on_ctrl_c(token: &CancellationToken) {
    let token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current batch");
            token.cancel();
        }
    });
}

fn rotatable_state(state: &SharedState) -> anyhow::Result<()> {
    if state.key_source.writable_path().is_none() {
        anyhow::bail!(
            "Master keys come from ${}; rotation needs a keyring file. \
             Unset the variable and use [keyring].path instead.",
            state.config.keyring.env_var
        );
    }
    Ok(())
}

fn print_summary(summary: &RotationSummary) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(summary)?);

    if summary.cancelled {
        println!("Rotation interrupted. Run `hermes keys resume` to finish.");
    } else if !summary.skipped.is_empty() {
        println!(
            "{} record(s) could not be migrated; old key generations were kept.",
            summary.skipped.len()
        );
    } else {
        println!("✓ All secrets are on key version {}", summary.to_version);
    }
    Ok(())
}

pub async fn cmd_keys_rotate(config: &Config, key: Option<&str>) -> anyhow::Result<()> {
    let state = SharedState::new(config.clone()).await?;
    rotatable_state(&state)?;

    let new_key = match key {
        Some(encoded) => MasterKey::from_base64(encoded).context("Invalid master key")?,
        None => MasterKey::generate(),
    };

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(&cancel);

    let summary = state
        .key_rotator()
        .rotate(new_key, &cancel)
        .await
        .context("Key rotation failed")?;
    print_summary(&summary)
}

pub async fn cmd_keys_resume(config: &Config) -> anyhow::Result<()> {
    let state = SharedState::new(config.clone()).await?;
    rotatable_state(&state)?;

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(&cancel);

    let summary = state
        .key_rotator()
        .resume(&cancel)
        .await
        .context("Resuming key rotation failed")?;
    print_summary(&summary)
}

pub async fn cmd_keys_retire(config: &Config, version: u32) -> anyhow::Result<()> {
    let state = SharedState::new(config.clone()).await?;
    rotatable_state(&state)?;

    state.key_rotator().retire(version).await?;
    println!("✓ Key version {version} retired");
    Ok(())
}

pub async fn cmd_keys_status(config: &Config) -> anyhow::Result<()> {
    let state = SharedState::new(config.clone()).await?;
    let status = state.key_rotator().status().await?;

    let source = state.key_source.writable_path().map_or_else(
        || format!("${}", state.config.keyring.env_var),
        |path| path.display().to_string(),
    );

    println!("Keyring: {source}");
    println!("Current version: {}", status.current_version);
    println!("{:-<40}", "");
    for version in &status.loaded_versions {
        let records = status
            .records_by_version
            .iter()
            .find(|(v, _)| v == version)
            .map_or(0, |(_, count)| *count);
        let marker = if *version == status.current_version { "*" } else { " " };
        println!("{marker} v{version}: {records} secret(s)");
    }

    for (version, records) in &status.records_by_version {
        if !status.loaded_versions.contains(version) {
            println!("! v{version}: {records} secret(s) under a key that is not loaded");
        }
    }

    Ok(())
}
