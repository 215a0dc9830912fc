use crate::{DeveloperSignatures, MdCmpError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// On-disk shape of the developer-signature table:
///
/// ```toml
/// [signatures]
/// "//AB" = "A. Borisov"
/// "//NK" = "N. Kuznetsova"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignatureConfig {
    #[serde(default)]
    pub signatures: DeveloperSignatures,
}

pub fn load_signatures(path: &Path) -> Result<DeveloperSignatures, MdCmpError> {
    let data = fs::read_to_string(path)?;
    let config: SignatureConfig =
        toml::from_str(&data).map_err(|e| MdCmpError::Config(e.to_string()))?;
    Ok(config.signatures)
}
