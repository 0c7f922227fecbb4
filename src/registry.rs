//! Minor number → slot mapping.
//!
//! Slots are created lazily the first time a minor number is looked up and
//! live until [`Registry::teardown`] (or the registry is dropped), regardless
//! of how many sessions are open.

use std::collections::HashMap;
#[cfg(feature = "config")]
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use log::info;
#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

use crate::core::{Error, Mailslot, MailslotConfig, Result, MAX_MINOR_NUMBER};
use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct RegistryConfig {
    /// Minor numbers `0..max_minor` are addressable.
    /// Default: 256
    pub max_minor: u32,

    /// Applied to every slot the registry creates.
    pub slot: MailslotConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_minor: MAX_MINOR_NUMBER,
            slot: MailslotConfig::default(),
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_minor == 0 {
            return Err(Error::Config("max_minor must be positive".to_string()));
        }
        self.slot.validate()
    }

    #[cfg(feature = "config")]
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|err| Error::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    #[cfg(feature = "config")]
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    #[cfg(feature = "config")]
    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json =
            serde_json::to_string_pretty(self).map_err(|err| Error::Config(err.to_string()))?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }
}

/// What [`Registry::teardown`] discarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub slots: usize,
    pub messages: usize,
    pub bytes: usize,
}

#[derive(Debug)]
pub struct Registry {
    config: RegistryConfig,
    slots: Mutex<HashMap<u32, Arc<Mailslot>>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_validated(RegistryConfig::default())
    }
}

impl Registry {
    pub fn new(config: RegistryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_validated(config))
    }

    fn with_validated(config: RegistryConfig) -> Self {
        Self {
            config,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Process-wide registry with the default configuration.
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(Registry::default)
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Returns the slot for `minor`, creating it on first use.
    pub fn lookup_or_create(&self, minor: u32) -> Result<Arc<Mailslot>> {
        self.check_minor(minor)?;
        let mut slots = self.slots();
        if let Some(slot) = slots.get(&minor) {
            return Ok(Arc::clone(slot));
        }
        let slot = Arc::new(Mailslot::new(minor, self.config.slot.clone())?);
        slots.insert(minor, Arc::clone(&slot));
        info!(
            "mailslot {}: created, max storage {} bytes, max data unit size {}",
            minor,
            slot.max_storage(),
            slot.max_data_unit_size()
        );
        Ok(slot)
    }

    /// Returns the slot for `minor` without creating it.
    pub fn get(&self, minor: u32) -> Option<Arc<Mailslot>> {
        self.slots().get(&minor).cloned()
    }

    /// Opens a session on `minor`, creating the slot on first use.
    pub fn open(&self, minor: u32) -> Result<Session> {
        let slot = self.lookup_or_create(minor)?;
        Ok(Session::open(slot))
    }

    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots().is_empty()
    }

    /// Minor numbers with a live slot, ascending.
    pub fn minors(&self) -> Vec<u32> {
        let mut minors: Vec<u32> = self.slots().keys().copied().collect();
        minors.sort_unstable();
        minors
    }

    /// Drains and forgets every slot.
    ///
    /// Sessions still open keep their slot alive, but it is no longer
    /// reachable through this registry; the next lookup creates a fresh one.
    pub fn teardown(&self) -> TeardownReport {
        let slots: Vec<Arc<Mailslot>> = self.slots().drain().map(|(_, slot)| slot).collect();
        let mut report = TeardownReport::default();
        for slot in slots {
            let (messages, bytes) = slot.drain();
            info!(
                "mailslot {}: torn down, discarded {} messages ({} bytes), {} sessions open",
                slot.minor(),
                messages,
                bytes,
                slot.session_count()
            );
            report.slots += 1;
            report.messages += messages;
            report.bytes += bytes;
        }
        report
    }

    fn check_minor(&self, minor: u32) -> Result<()> {
        if minor >= self.config.max_minor {
            return Err(Error::NoSuchMailslot {
                minor,
                max_minor: self.config.max_minor,
            });
        }
        Ok(())
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<u32, Arc<Mailslot>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{Registry, RegistryConfig};
    use crate::core::{Error, MailslotConfig};

    #[test]
    fn lookup_creates_once() {
        let registry = Registry::default();
        assert!(registry.get(4).is_none());
        let first = registry.lookup_or_create(4).expect("create");
        let second = registry.lookup_or_create(4).expect("lookup");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn minor_out_of_range_is_rejected() {
        let registry = Registry::default();
        let err = registry.lookup_or_create(256).expect_err("out of range");
        assert!(matches!(err, Error::NoSuchMailslot { minor: 256, max_minor: 256 }));
        assert!(registry.lookup_or_create(255).is_ok());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = RegistryConfig {
            max_minor: 0,
            ..RegistryConfig::default()
        };
        assert!(matches!(Registry::new(config), Err(Error::Config(_))));
    }

    #[test]
    fn teardown_reports_discarded_messages() {
        let registry = Registry::new(RegistryConfig {
            max_minor: 8,
            slot: MailslotConfig::with_capacity(64, 16),
        })
        .expect("registry");
        registry.lookup_or_create(1).expect("slot").write(b"abc").expect("write");
        registry.lookup_or_create(2).expect("slot").write(b"de").expect("write");
        registry.lookup_or_create(2).expect("slot").write(b"f").expect("write");

        let report = registry.teardown();
        assert_eq!(report.slots, 2);
        assert_eq!(report.messages, 3);
        assert_eq!(report.bytes, 6);
        assert!(registry.is_empty());
    }

    #[test]
    fn minors_are_sorted() {
        let registry = Registry::default();
        for minor in [9, 2, 5] {
            registry.lookup_or_create(minor).expect("slot");
        }
        assert_eq!(registry.minors(), vec![2, 5, 9]);
    }

    #[cfg(feature = "config")]
    #[test]
    fn json_config_round_trip_through_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mailslot.json");
        let config = RegistryConfig {
            max_minor: 16,
            slot: MailslotConfig::with_capacity(4096, 64),
        };
        config.to_json_file(&path).expect("write config");
        assert_eq!(RegistryConfig::from_json_file(&path).expect("load"), config);
    }

    #[cfg(feature = "config")]
    #[test]
    fn json_config_is_validated() {
        let err = RegistryConfig::from_json_str(r#"{"slot": {"max_data_unit_size": 0}}"#)
            .expect_err("zero unit size");
        assert!(matches!(err, Error::Config(_)));
    }
}
