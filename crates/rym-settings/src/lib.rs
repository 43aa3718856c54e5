//! # rym-settings
//!
//! Configuration for the Rate-Your-Mate server.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`Settings::default()`]
//! 2. **Settings file**: `rym.json` or the path in `RYM_CONFIG` (deep-merged over defaults)
//! 3. **Environment variables**: `PORT`, `JWT_SECRET`, `CREDIT_MAX`, ... (highest priority)
//!
//! Call [`Settings::validate`] before using loaded settings.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
