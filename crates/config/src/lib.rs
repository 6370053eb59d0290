//! Configuration loading, validation, and destination derivation.
//!
//! Layers a main config file, a drop-in directory, environment variables,
//! and CLI arguments into one [`effective::EffectiveConfig`], validating
//! each source section into a [`section::ConfigSection`] and deriving the
//! destination→source mapping consumed by the destination workers.

pub mod destination_info;
pub mod effective;
pub mod error;
pub mod ini;
pub mod password;
pub mod section;

pub use destination_info::{map_destinations_to_sources, DestinationInfo};
pub use effective::{resolve, EffectiveConfig, EffectiveConfigInputs, GlobalOptions};
pub use error::ConfigError;
pub use ini::{parse_file, parse_str, IniDocument, IniSection};
pub use password::{decrypt, decrypt_hex_to_string, encrypt, KeyMaterial};
pub use section::{ConfigSection, HypervisorType, ValidationState};
