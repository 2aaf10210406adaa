//! Payload shapes exchanged with the update transport.

use serde::{Deserialize, Serialize};

/// Source of one module as shipped to the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSource {
    pub id: String,
    pub source: String,
    /// Static dependencies of the module.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// A changed module inside an [`HmrPayload`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleUpdate {
    pub id: String,
    pub source: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Content hash of the new source.
    #[serde(default)]
    pub hash: String,
}

/// Identity and hash of a changed module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: String,
    pub hash: String,
}

/// What changed since a generation, without the sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateManifest {
    pub generation: u64,
    #[serde(default)]
    pub modules: Vec<ManifestEntry>,
    #[serde(default)]
    pub removed: Vec<String>,
}

impl UpdateManifest {
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty() && self.removed.is_empty()
    }
}

/// One generation of hot updates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HmrPayload {
    pub generation: u64,
    #[serde(default)]
    pub modules: Vec<ModuleUpdate>,
    #[serde(default)]
    pub removed: Vec<String>,
}

impl HmrPayload {
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty() && self.removed.is_empty()
    }

    pub fn manifest(&self) -> UpdateManifest {
        UpdateManifest {
            generation: self.generation,
            modules: self
                .modules
                .iter()
                .map(|update| ManifestEntry {
                    id: update.id.clone(),
                    hash: update.hash.clone(),
                })
                .collect(),
            removed: self.removed.clone(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Planned replacement of one changed module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HmrUpdate {
    pub module: String,
    pub source: String,
    /// Modules whose accept handlers absorb the change. Empty when the
    /// module is not instantiated yet and only its definition is swapped.
    pub boundaries: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_wire_shape() {
        let json = r#"{
            "generation": 3,
            "modules": [{ "id": "src/a.js", "source": "x", "dependencies": ["src/b.js"] }],
            "removed": ["src/old.js"]
        }"#;
        let payload = HmrPayload::from_json(json).unwrap();
        assert_eq!(payload.generation, 3);
        assert_eq!(payload.modules[0].dependencies, vec!["src/b.js"]);
        assert_eq!(payload.modules[0].hash, "");
        assert_eq!(payload.manifest().removed, vec!["src/old.js"]);

        let empty = HmrPayload::from_json(r#"{ "generation": 4 }"#).unwrap();
        assert!(empty.is_empty());
    }
}
