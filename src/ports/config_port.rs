//! Configuration access port trait.

use crate::domain::error::SettlerError;

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;

    /// Like [`get_string`](Self::get_string) but a missing key is an error.
    fn require_string(&self, section: &str, key: &str) -> Result<String, SettlerError> {
        self.get_string(section, key)
            .ok_or_else(|| SettlerError::ConfigMissing {
                section: section.into(),
                key: key.into(),
            })
    }

    /// Integer setting. A missing key yields `default`; a value that is
    /// present but not an integer is [`SettlerError::ConfigInvalid`].
    fn get_int(&self, section: &str, key: &str, default: i64) -> Result<i64, SettlerError> {
        let Some(raw) = self.get_string(section, key) else {
            return Ok(default);
        };
        raw.parse().map_err(|_| SettlerError::ConfigInvalid {
            section: section.into(),
            key: key.into(),
            reason: format!("'{raw}' is not an integer"),
        })
    }
}
