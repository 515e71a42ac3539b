use crate::types::{Endpoint, EndpointSettings};
use anyhow::{Context, Result};
use ini::{Ini, Properties};
use log::{info, warn};
use std::{
    fs,
    path::{Path, PathBuf},
};

const SECTION: &str = "endpoint";

// legacy key names, Int4 holds the first octet
const KEY_OCTET1: &str = "Int4";
const KEY_OCTET2: &str = "Int3";
const KEY_OCTET3: &str = "Int2";
const KEY_OCTET4: &str = "Int1";
const KEY_PORT: &str = "Port";

/// Persists the last used endpoint across restarts
#[derive(Clone, Debug)]
pub struct PreferenceStore {
    path: PathBuf,
}

impl PreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored endpoint
    ///
    /// A missing file yields [`Endpoint::default`]. A file that exists but
    /// holds invalid values is an error.
    pub fn load(&self) -> Result<Endpoint> {
        if !self.path.exists() {
            info!("no preferences at {:?}, using default endpoint", self.path);
            return Ok(Endpoint::default());
        }

        let ini = Ini::load_from_file(&self.path)
            .with_context(|| format!("failed to read preferences: {:?}", self.path))?;
        let section = ini
            .section(Some(SECTION))
            .with_context(|| format!("failed to read preferences: [{SECTION}] missing"))?;

        let settings = EndpointSettings {
            octet1: read_number(section, KEY_OCTET1)?,
            octet2: read_number(section, KEY_OCTET2)?,
            octet3: read_number(section, KEY_OCTET3)?,
            octet4: read_number(section, KEY_OCTET4)?,
            port: read_number(section, KEY_PORT)?,
        };

        Endpoint::try_from(settings).context("failed to read preferences")
    }

    /// Like [`Self::load`] but falls back to the default endpoint on errors
    pub fn load_or_default(&self) -> Endpoint {
        self.load().unwrap_or_else(|e| {
            warn!("{e:#}, using default endpoint");
            Endpoint::default()
        })
    }

    pub fn save(&self, endpoint: &Endpoint) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {parent:?}"))?;
        }

        let settings = EndpointSettings::from(*endpoint);
        let mut ini = Ini::new();
        ini.with_section(Some(SECTION))
            .set(KEY_OCTET1, settings.octet1.to_string())
            .set(KEY_OCTET2, settings.octet2.to_string())
            .set(KEY_OCTET3, settings.octet3.to_string())
            .set(KEY_OCTET4, settings.octet4.to_string())
            .set(KEY_PORT, settings.port.to_string());

        info!("write preferences to {:?}: {endpoint}", self.path);

        ini.write_to_file(&self.path)
            .with_context(|| format!("failed to write preferences: {:?}", self.path))
    }
}

fn read_number(section: &Properties, key: &str) -> Result<u32> {
    section
        .get(key)
        .with_context(|| format!("failed to read preferences: {key} missing"))?
        .trim()
        .parse()
        .with_context(|| format!("failed to read preferences: {key} invalid"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_default() {
        let dir = tempdir().unwrap();
        let store = PreferenceStore::new(dir.path().join("preferences.ini"));

        assert_eq!(store.load().unwrap(), Endpoint::default());
    }

    #[test]
    fn save_then_load_restores_endpoint() {
        let dir = tempdir().unwrap();
        let store = PreferenceStore::new(dir.path().join("nested").join("preferences.ini"));
        let endpoint = Endpoint::new(Ipv4Addr::new(10, 0, 0, 42), 8080).unwrap();

        store.save(&endpoint).unwrap();

        assert_eq!(store.load().unwrap(), endpoint);
    }

    #[test]
    fn first_octet_is_stored_under_int4() {
        let dir = tempdir().unwrap();
        let store = PreferenceStore::new(dir.path().join("preferences.ini"));
        let endpoint = Endpoint::new(Ipv4Addr::new(1, 2, 3, 4), 5).unwrap();

        store.save(&endpoint).unwrap();

        let ini = Ini::load_from_file(store.path()).unwrap();
        let section = ini.section(Some(SECTION)).unwrap();
        assert_eq!(section.get("Int4"), Some("1"));
        assert_eq!(section.get("Int1"), Some("4"));
        assert_eq!(section.get("Port"), Some("5"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("preferences.ini");
        fs::write(
            &path,
            "[endpoint]\nInt4=300\nInt3=168\nInt2=1\nInt1=100\nPort=80\n",
        )
        .unwrap();
        let store = PreferenceStore::new(&path);

        assert!(store.load().is_err());
        assert_eq!(store.load_or_default(), Endpoint::default());
    }

    #[test]
    fn missing_key_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("preferences.ini");
        fs::write(&path, "[endpoint]\nInt4=192\nInt3=168\n").unwrap();
        let store = PreferenceStore::new(&path);

        let error = store.load().unwrap_err();
        assert!(format!("{error:#}").contains("Int2"));
    }
}
