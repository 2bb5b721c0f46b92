//! Master key generations and their on-disk / environment representations.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::CryptoError;

pub const MASTER_KEY_LEN: usize = 32;

/// A 256-bit AES key. Wiped from memory when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; MASTER_KEY_LEN]);

impl MasterKey {
    #[must_use]
    pub fn generate() -> Self {
        use rand::Rng;

        let mut rng = rand::rng();
        Self(rng.random())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; MASTER_KEY_LEN] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKeyMaterial(format!(
                "master key must be {MASTER_KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(key))
    }

    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = Zeroizing::new(
            BASE64
                .decode(encoded.trim())
                .map_err(|e| CryptoError::InvalidKeyMaterial(format!("bad base64: {e}")))?,
        );
        Self::from_bytes(&bytes)
    }

    pub(crate) fn to_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(BASE64.encode(self.0))
    }

    pub(crate) const fn as_bytes(&self) -> &[u8; MASTER_KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(<redacted>)")
    }
}

/// Ordered set of key generations. The highest version is the current one.
#[derive(Debug, Clone, Default)]
pub struct MasterKeySet {
    keys: BTreeMap<u32, MasterKey>,
}

impl MasterKeySet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A set holding a single freshly generated version 1.
    #[must_use]
    pub fn generate() -> Self {
        let mut set = Self::new();
        set.register(MasterKey::generate());
        set
    }

    pub fn insert(&mut self, version: u32, key: MasterKey) -> Result<(), CryptoError> {
        if version == 0 {
            return Err(CryptoError::InvalidKeyMaterial(
                "key versions start at 1".to_string(),
            ));
        }
        if self.keys.contains_key(&version) {
            return Err(CryptoError::InvalidKeyMaterial(format!(
                "duplicate key version {version}"
            )));
        }
        self.keys.insert(version, key);
        Ok(())
    }

    /// Adds `key` as the next generation and returns its version.
    pub fn register(&mut self, key: MasterKey) -> u32 {
        let version = self.current_version().map_or(1, |v| v + 1);
        self.keys.insert(version, key);
        version
    }

    pub fn retire(&mut self, version: u32) -> Result<(), CryptoError> {
        if self.current_version() == Some(version) {
            return Err(CryptoError::RetireCurrent { version });
        }
        self.keys
            .remove(&version)
            .map(drop)
            .ok_or(CryptoError::KeyNotAvailable { version })
    }

    #[must_use]
    pub fn current_version(&self) -> Option<u32> {
        self.keys.keys().next_back().copied()
    }

    #[must_use]
    pub fn get(&self, version: u32) -> Option<&MasterKey> {
        self.keys.get(&version)
    }

    #[must_use]
    pub fn versions(&self) -> Vec<u32> {
        self.keys.keys().copied().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Parses the `1:<base64>,2:<base64>` environment form.
    pub fn from_env_value(value: &str) -> Result<Self, CryptoError> {
        let mut set = Self::new();
        for entry in value.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (version, key) = entry.split_once(':').ok_or_else(|| {
                CryptoError::InvalidKeyMaterial("expected <version>:<base64 key>".to_string())
            })?;
            let version: u32 = version.trim().parse().map_err(|_| {
                CryptoError::InvalidKeyMaterial(format!("invalid key version '{version}'"))
            })?;
            set.insert(version, MasterKey::from_base64(key)?)?;
        }

        if set.is_empty() {
            return Err(CryptoError::InvalidKeyMaterial(
                "no key generations found".to_string(),
            ));
        }
        Ok(set)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, CryptoError> {
        let content = Zeroizing::new(std::fs::read_to_string(path).map_err(|e| {
            CryptoError::Keyring(format!("failed to read {}: {e}", path.display()))
        })?);
        let file: KeyringFile = toml::from_str(&content).map_err(|e| {
            CryptoError::Keyring(format!("failed to parse {}: {e}", path.display()))
        })?;

        let mut set = Self::new();
        for generation in &file.generations {
            set.insert(generation.version, MasterKey::from_base64(&generation.key)?)?;
        }

        if set.is_empty() {
            return Err(CryptoError::Keyring(format!(
                "{} holds no key generations",
                path.display()
            )));
        }
        Ok(set)
    }

    /// Writes the keyring next to `path` and renames it into place, so a crash
    /// never leaves a half-written file behind.
    pub fn save_to_file(&self, path: &Path) -> Result<(), CryptoError> {
        let file = KeyringFile {
            generations: self
                .keys
                .iter()
                .map(|(version, key)| KeyringEntry {
                    version: *version,
                    key: key.to_base64().to_string(),
                })
                .collect(),
        };
        let content = Zeroizing::new(
            toml::to_string_pretty(&file)
                .map_err(|e| CryptoError::Keyring(format!("failed to encode keyring: {e}")))?,
        );

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                CryptoError::Keyring(format!("failed to create {}: {e}", parent.display()))
            })?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        write_private(&tmp_path, content.as_bytes())?;
        std::fs::rename(&tmp_path, path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp_path);
            CryptoError::Keyring(format!("failed to replace {}: {e}", path.display()))
        })?;

        info!(path = %path.display(), versions = ?self.versions(), "Keyring saved");
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct KeyringFile {
    #[serde(default)]
    generations: Vec<KeyringEntry>,
}

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct KeyringEntry {
    version: u32,
    key: String,
}

#[cfg(unix)]
fn write_private(path: &Path, bytes: &[u8]) -> Result<(), CryptoError> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .map_err(|e| CryptoError::Keyring(format!("failed to open {}: {e}", path.display())))?;
    file.write_all(bytes)
        .and_then(|()| file.sync_all())
        .map_err(|e| CryptoError::Keyring(format!("failed to write {}: {e}", path.display())))
}

#[cfg(not(unix))]
fn write_private(path: &Path, bytes: &[u8]) -> Result<(), CryptoError> {
    std::fs::write(path, bytes)
        .map_err(|e| CryptoError::Keyring(format!("failed to write {}: {e}", path.display())))
}

/// Where a loaded key set came from. Only file-backed sets can be rotated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    Environment(String),
    File(std::path::PathBuf),
}

impl KeySource {
    #[must_use]
    pub fn writable_path(&self) -> Option<&Path> {
        match self {
            Self::Environment(_) => None,
            Self::File(path) => Some(path),
        }
    }
}

/// Resolves the key set from the environment, then the keyring file, creating
/// the file with a fresh generation when allowed.
pub fn load_key_set(
    config: &crate::config::KeyringConfig,
) -> Result<(MasterKeySet, KeySource), CryptoError> {
    if let Ok(value) = std::env::var(&config.env_var) {
        let value = Zeroizing::new(value);
        if !value.trim().is_empty() {
            let set = MasterKeySet::from_env_value(&value)?;
            info!(
                env_var = %config.env_var,
                versions = ?set.versions(),
                "Loaded master keys from environment"
            );
            return Ok((set, KeySource::Environment(config.env_var.clone())));
        }
    }

    let path = std::path::PathBuf::from(&config.path);
    if path.exists() {
        let set = MasterKeySet::load_from_file(&path)?;
        info!(path = %path.display(), versions = ?set.versions(), "Loaded keyring");
        return Ok((set, KeySource::File(path)));
    }

    if !config.create_if_missing {
        return Err(CryptoError::Keyring(format!(
            "no master keys: set {} or create {}",
            config.env_var,
            path.display()
        )));
    }

    warn!(path = %path.display(), "No keyring found, generating a new master key");
    let set = MasterKeySet::generate();
    set.save_to_file(&path)?;
    Ok((set, KeySource::File(path)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_appends_next_version() {
        let mut set = MasterKeySet::new();
        assert_eq!(set.current_version(), None);
        assert_eq!(set.register(MasterKey::generate()), 1);
        assert_eq!(set.register(MasterKey::generate()), 2);
        assert_eq!(set.current_version(), Some(2));
        assert_eq!(set.versions(), vec![1, 2]);
    }

    #[test]
    fn test_retire_refuses_current() {
        let mut set = MasterKeySet::generate();
        set.register(MasterKey::generate());

        assert!(matches!(
            set.retire(2),
            Err(CryptoError::RetireCurrent { version: 2 })
        ));
        set.retire(1).unwrap();
        assert_eq!(set.versions(), vec![2]);
        assert!(matches!(
            set.retire(1),
            Err(CryptoError::KeyNotAvailable { version: 1 })
        ));
    }

    #[test]
    fn test_env_value_parsing() {
        let k1 = MasterKey::generate();
        let k3 = MasterKey::generate();
        let value = format!("1:{}, 3:{}", *k1.to_base64(), *k3.to_base64());

        let set = MasterKeySet::from_env_value(&value).unwrap();
        assert_eq!(set.versions(), vec![1, 3]);
        assert_eq!(set.current_version(), Some(3));
        assert_eq!(set.get(1).unwrap().as_bytes(), k1.as_bytes());
    }

    #[test]
    fn test_env_value_rejects_garbage() {
        assert!(MasterKeySet::from_env_value("").is_err());
        assert!(MasterKeySet::from_env_value("nocolon").is_err());
        assert!(MasterKeySet::from_env_value("x:AAAA").is_err());
        assert!(MasterKeySet::from_env_value("1:c2hvcnQ=").is_err());

        let key = MasterKey::generate();
        let dup = format!("1:{},1:{}", *key.to_base64(), *key.to_base64());
        assert!(MasterKeySet::from_env_value(&dup).is_err());
    }

    #[test]
    fn test_keyring_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("keyring.toml");

        let mut set = MasterKeySet::generate();
        set.register(MasterKey::generate());
        set.save_to_file(&path).unwrap();

        let loaded = MasterKeySet::load_from_file(&path).unwrap();
        assert_eq!(loaded.versions(), vec![1, 2]);
        assert_eq!(
            loaded.get(2).unwrap().as_bytes(),
            set.get(2).unwrap().as_bytes()
        );
        assert!(!path.with_extension("toml.tmp").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_load_key_set_creates_then_reuses_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = crate::config::KeyringConfig {
            path: dir.path().join("keyring.toml").display().to_string(),
            env_var: "HERMES_KEYRING_UNIT_TEST_UNSET".to_string(),
            create_if_missing: false,
        };

        assert!(matches!(
            load_key_set(&config),
            Err(CryptoError::Keyring(_))
        ));

        let config = crate::config::KeyringConfig {
            create_if_missing: true,
            ..config
        };
        let (created, source) = load_key_set(&config).unwrap();
        assert_eq!(created.versions(), vec![1]);
        assert_eq!(source.writable_path(), Some(Path::new(&config.path)));

        let (loaded, _) = load_key_set(&config).unwrap();
        assert_eq!(
            loaded.get(1).unwrap().as_bytes(),
            created.get(1).unwrap().as_bytes()
        );

        let env = KeySource::Environment("HERMES_MASTER_KEYS".to_string());
        assert_eq!(env.writable_path(), None);
    }

    #[test]
    fn test_debug_never_prints_material() {
        let key = MasterKey::generate();
        let encoded = key.to_base64();
        let printed = format!("{:?}", MasterKeySet::generate());
        assert!(!printed.contains(encoded.as_str()));
        assert_eq!(format!("{key:?}"), "MasterKey(<redacted>)");
    }
}
