use jsonschema::JSONSchema;
use log::{info, warn};
use serde_json::Value;

use crate::error::{MilexError, Result};

/// Compiled JSON schema for bundle documents
pub struct BundleSchema {
    compiled: JSONSchema,
}

impl BundleSchema {
    /// Compile the bundle schema included at build time
    pub fn load() -> Result<Self> {
        static SCHEMA: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/schema/bundle.json"));
        let schema: Value = serde_json::from_str(SCHEMA)?;
        let compiled = JSONSchema::options()
            .compile(&schema)
            .map_err(|err| MilexError::Schema(err.to_string()))?;
        Ok(BundleSchema { compiled })
    }

    /// Check an untyped document, collecting every violation into one message
    pub fn validate(&self, document: &Value) -> std::result::Result<(), String> {
        info!("Validating bundle document against JSON schema");
        match self.compiled.validate(document) {
            Ok(_) => Ok(()),
            Err(errors) => {
                let reasons: Vec<String> = errors
                    .map(|err| format!("{} (at '{}')", err, err.instance_path))
                    .collect();
                warn!("Bundle document fails validation");
                Err(reasons.join("; "))
            }
        }
    }
}

impl std::fmt::Debug for BundleSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleSchema").finish_non_exhaustive()
    }
}
