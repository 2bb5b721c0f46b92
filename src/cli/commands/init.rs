use std::path::Path;

use crate::config::Config;
use crate::crypto::{KeySource, load_key_set};

pub fn cmd_init(path: &Path) -> anyhow::Result<()> {
    if Config::create_default_if_missing(path)? {
        println!("✓ Config file created at {}", path.display());
    } else {
        println!("Config file already exists at {}", path.display());
    }

    let config = Config::load_from_path(path)?;
    let (keys, source) = load_key_set(&config.keyring)?;
    match source {
        KeySource::File(keyring) => println!(
            "✓ Keyring ready at {} (versions {:?})",
            keyring.display(),
            keys.versions()
        ),
        KeySource::Environment(var) => {
            println!("✓ Using master keys from ${var} (versions {:?})", keys.versions());
        }
    }

    println!();
    println!("Next: hermes user create <name> <email> --admin --approve");
    Ok(())
}
