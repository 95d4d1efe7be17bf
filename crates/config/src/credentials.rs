// HR directory API keys
//
// A key is taken from the system keychain (only in builds with the `keychain`
// feature) and then from `<PROVIDER>_API_KEY`. Nothing is ever written to
// config.toml.

use std::env;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Keychain,
    Environment,
    None,
}

impl KeySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeySource::Keychain => "keychain",
            KeySource::Environment => "environment",
            KeySource::None => "none",
        }
    }
}

impl fmt::Display for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct KeyLookup {
    pub key: Option<String>,
    pub source: KeySource,
}

impl KeyLookup {
    fn found(key: String, source: KeySource) -> Self {
        Self { key: Some(key), source }
    }
}

/// `bamboohr` -> `BAMBOOHR_API_KEY`
pub fn env_var_name(provider: &str) -> String {
    format!("{}_API_KEY", provider.to_uppercase())
}

#[cfg(feature = "keychain")]
mod keychain {
    const SERVICE: &str = "rostergrid";

    pub(super) fn entry(provider: &str) -> Result<keyring::Entry, String> {
        keyring::Entry::new(SERVICE, &super::keychain_account(provider))
            .map_err(|e| format!("cannot open keychain entry: {}", e))
    }
}

#[cfg_attr(not(feature = "keychain"), allow(dead_code))]
fn keychain_account(provider: &str) -> String {
    format!("hr/{}", provider.to_lowercase())
}

/// Look up the API key for `provider`. Blank environment values count as unset.
pub fn get_api_key(provider: &str) -> KeyLookup {
    #[cfg(feature = "keychain")]
    {
        match keychain::entry(provider).and_then(|entry| entry.get_password().map_err(|e| e.to_string())) {
            Ok(key) => return KeyLookup::found(key, KeySource::Keychain),
            Err(e) => log::debug!("no keychain entry for {}: {}", provider, e),
        }
    }

    match env::var(env_var_name(provider)) {
        Ok(key) if !key.trim().is_empty() => KeyLookup::found(key.trim().to_string(), KeySource::Environment),
        _ => KeyLookup { key: None, source: KeySource::None },
    }
}

#[cfg(feature = "keychain")]
pub fn set_api_key(provider: &str, key: &str) -> Result<(), String> {
    keychain::entry(provider)?
        .set_password(key)
        .map_err(|e| format!("cannot store key in keychain: {}", e))
}

#[cfg(feature = "keychain")]
pub fn delete_api_key(provider: &str) -> Result<(), String> {
    keychain::entry(provider)?
        .delete_credential()
        .map_err(|e| format!("cannot remove key from keychain: {}", e))
}

#[cfg(not(feature = "keychain"))]
pub fn set_api_key(provider: &str, _key: &str) -> Result<(), String> {
    Err(format!(
        "built without keychain support; set {} instead",
        env_var_name(provider)
    ))
}

#[cfg(not(feature = "keychain"))]
pub fn delete_api_key(_provider: &str) -> Result<(), String> {
    Err("built without keychain support".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_name() {
        assert_eq!(env_var_name("bamboohr"), "BAMBOOHR_API_KEY");
        assert_eq!(env_var_name("BambooHR"), "BAMBOOHR_API_KEY");
    }

    #[test]
    fn test_keychain_account() {
        assert_eq!(keychain_account("BambooHR"), "hr/bamboohr");
    }

    #[test]
    fn test_key_lookup_from_env() {
        env::set_var("RGRIDTEST_API_KEY", " test-key-123 ");

        let lookup = get_api_key("rgridtest");
        assert_eq!(lookup.source, KeySource::Environment);
        assert_eq!(lookup.key.as_deref(), Some("test-key-123"));

        env::remove_var("RGRIDTEST_API_KEY");
    }

    #[test]
    fn test_blank_env_key_is_missing() {
        env::set_var("RGRIDBLANK_API_KEY", "   ");
        let lookup = get_api_key("rgridblank");
        env::remove_var("RGRIDBLANK_API_KEY");

        assert_eq!(lookup.source, KeySource::None);
        assert!(lookup.key.is_none());
    }

    #[test]
    fn test_key_lookup_missing() {
        let lookup = get_api_key("nonexistent_provider_xyz");
        assert_eq!(lookup.source, KeySource::None);
        assert!(lookup.key.is_none());
    }

    #[cfg(not(feature = "keychain"))]
    #[test]
    fn test_set_without_keychain_points_at_env() {
        let err = set_api_key("bamboohr", "k").unwrap_err();
        assert!(err.contains("BAMBOOHR_API_KEY"), "{}", err);
    }
}
