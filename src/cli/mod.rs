//! CLI module - Command-line interface for Hermes
//!
//! This module provides a structured CLI using clap for argument parsing.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::models::UserRole;

/// Hermes - Email sending API gateway
#[derive(Parser)]
#[command(name = "hermes")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config.toml (default: searched in the usual locations)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API
    #[command(alias = "daemon")]
    Serve,

    /// Create the default config and keyring files
    Init,

    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Manage master key generations
    Keys {
        #[command(subcommand)]
        command: KeyCommands,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Create a user and print their one-time API key
    Create {
        name: String,
        email: String,
        /// Give the user the admin role
        #[arg(long)]
        admin: bool,
        /// Approve the user and activate the key immediately
        #[arg(long)]
        approve: bool,
    },
    /// Approve a pending user (id or email)
    Approve { user: String },
    /// Reject a pending user (id or email)
    Reject { user: String },
    /// Change a user's name, email or role
    Update {
        user: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        role: Option<UserRole>,
    },
    /// Delete a user with their keys and email bots
    #[command(alias = "rm")]
    Delete { user: String },
    /// List all users
    #[command(alias = "ls")]
    List,
}

#[derive(Subcommand)]
pub enum KeyCommands {
    /// Print a fresh base64 master key
    Generate {
        /// Print as `<version>:<key>` for the environment variable form
        #[arg(long)]
        key_version: Option<u32>,
    },
    /// Add a new master key generation and re-encrypt every secret with it
    Rotate {
        /// Base64 key to install; a random one is generated when omitted
        #[arg(long)]
        key: Option<String>,
    },
    /// Finish an interrupted rotation
    Resume,
    /// Remove a drained, non-current key generation
    Retire { version: u32 },
    /// Show key generations and how many secrets each protects
    Status,
}

pub use commands::*;
