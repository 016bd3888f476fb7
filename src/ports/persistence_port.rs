//! Output persistence port.

use crate::domain::error::CausalError;
use crate::domain::panel::Panel;
use std::path::PathBuf;

pub trait PersistencePort {
    /// Store `panel` under `name` and `version`, returning where it was written.
    fn store(&self, name: &str, version: &str, panel: &Panel) -> Result<PathBuf, CausalError>;
}
