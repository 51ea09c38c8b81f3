//! Face Contract
//!
//! The face and the brain share a versioned vocabulary of expression presets.
//! The brain only needs two things from it: the version string (announced to
//! every face on connect) and a way to map a loose label such as `"Feliz"`
//! onto a canonical preset key.
//!
//! # File Format
//!
//! ```json
//! {
//!   "version": "2025.02",
//!   "aliases": { "feliz": "happy", "happy": "happy" },
//!   "presets": {
//!     "happy": { "kind": "fixed", "eyes": "happy", "mouth": "smile" },
//!     "talk":  { "kind": "keep_previous", "fallback": { "eyes": "neutral", "mouth": "speaking" } }
//!   }
//! }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Version reported when the contract file does not exist
pub const MISSING_VERSION: &str = "missing";

/// Version of the contract compiled into the brain
pub const BUILTIN_VERSION: &str = "builtin";

/// Errors loading a contract file
#[derive(Debug, Error)]
pub enum ContractError {
    /// File exists but could not be read
    #[error("failed to read face contract {path}: {source}")]
    Read {
        /// Path that failed
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// File is not a valid contract document
    #[error("failed to parse face contract {path}: {source}")]
    Parse {
        /// Path that failed
        path: PathBuf,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },
}

/// Eyes and mouth pair a preset resolves to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacePose {
    /// Eye expression name
    pub eyes: String,
    /// Mouth mode name
    pub mouth: String,
}

/// How a preset is applied on the face
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FacePreset {
    /// Always shows this pose
    Fixed {
        /// Eye expression
        eyes: String,
        /// Mouth mode
        mouth: String,
    },
    /// Keeps whatever is showing, or the fallback if nothing is
    KeepPrevious {
        /// Pose used when there is nothing to keep
        fallback: FacePose,
    },
}

/// Anything that can resolve expression labels for the turn driver
pub trait LabelResolver: Send + Sync {
    /// Version string announced to faces
    fn version(&self) -> &str;

    /// Canonical preset key for `label`, if known
    fn normalize(&self, label: &str) -> Option<String>;

    /// Whether `label` resolves to anything
    fn is_supported(&self, label: &str) -> bool {
        self.normalize(label).is_some()
    }
}

/// The shared face contract document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceContract {
    /// Contract version
    #[serde(default = "unknown_version")]
    pub version: String,
    /// Normalised label -> preset key
    #[serde(default)]
    pub aliases: HashMap<String, String>,
    /// Preset key -> definition
    #[serde(default)]
    pub presets: HashMap<String, FacePreset>,
}

fn unknown_version() -> String {
    "unknown".to_string()
}

/// Lookup key for a raw label
#[must_use]
pub fn normalize_key(label: &str) -> String {
    label.trim().to_lowercase().replace(['/', ' '], "_")
}

impl FaceContract {
    /// Load a contract file
    ///
    /// A file that does not exist yields [`FaceContract::missing`].
    ///
    /// # Errors
    ///
    /// Returns [`ContractError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ContractError> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Face contract not found, using empty contract");
            return Ok(Self::missing());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ContractError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let contract: Self =
            serde_json::from_str(&content).map_err(|source| ContractError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        tracing::info!(
            path = %path.display(),
            version = %contract.version,
            aliases = contract.aliases.len(),
            presets = contract.presets.len(),
            "Loaded face contract"
        );
        for alias in contract.dangling_aliases() {
            tracing::warn!(alias, "Contract alias points at no preset");
        }
        Ok(contract)
    }

    /// Empty contract used when the file is absent
    #[must_use]
    pub fn missing() -> Self {
        Self {
            version: MISSING_VERSION.to_string(),
            aliases: HashMap::new(),
            presets: HashMap::new(),
        }
    }

    /// Contract covering the face's eye expressions and common synonyms
    #[must_use]
    pub fn builtin() -> Self {
        let poses = [
            ("neutral", "neutral", "idle"),
            ("happy", "happy", "smile"),
            ("sad", "sad", "idle"),
            ("surprised", "surprised", "surprised"),
            ("thinking", "thinking", "thinking"),
            ("angry", "angry", "idle"),
            ("closed", "closed", "idle"),
            ("sleeping", "sleeping", "sleeping"),
        ];

        let mut presets: HashMap<String, FacePreset> = poses
            .iter()
            .map(|(key, eyes, mouth)| {
                (
                    (*key).to_string(),
                    FacePreset::Fixed {
                        eyes: (*eyes).to_string(),
                        mouth: (*mouth).to_string(),
                    },
                )
            })
            .collect();
        presets.insert(
            "speaking".to_string(),
            FacePreset::KeepPrevious {
                fallback: FacePose {
                    eyes: "neutral".to_string(),
                    mouth: "speaking".to_string(),
                },
            },
        );

        let synonyms = [
            ("feliz", "happy"),
            ("alegre", "happy"),
            ("joy", "happy"),
            ("triste", "sad"),
            ("sorprendido", "surprised"),
            ("pensando", "thinking"),
            ("enojado", "angry"),
            ("alarmed", "angry"),
            ("dormido", "sleeping"),
            ("talking", "speaking"),
        ];

        let aliases = presets
            .keys()
            .map(|k| (k.clone(), k.clone()))
            .chain(synonyms.iter().map(|(a, k)| ((*a).to_string(), (*k).to_string())))
            .collect();

        Self {
            version: BUILTIN_VERSION.to_string(),
            aliases,
            presets,
        }
    }

    /// Look up the preset a label resolves to
    #[must_use]
    pub fn preset(&self, label: &str) -> Option<&FacePreset> {
        self.normalize(label).and_then(|key| self.presets.get(&key))
    }

    /// Aliases whose target preset is not defined, sorted
    #[must_use]
    pub fn dangling_aliases(&self) -> Vec<&str> {
        let mut dangling: Vec<&str> = self
            .aliases
            .keys()
            .filter(|alias| self.preset(alias).is_none())
            .map(String::as_str)
            .collect();
        dangling.sort_unstable();
        dangling
    }
}

impl LabelResolver for FaceContract {
    fn version(&self) -> &str {
        &self.version
    }

    fn normalize(&self, label: &str) -> Option<String> {
        self.aliases.get(&normalize_key(label)).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("  Happy "), "happy");
        assert_eq!(normalize_key("Very Happy"), "very_happy");
        assert_eq!(normalize_key("happy/sad"), "happy_sad");
    }

    #[test]
    fn test_builtin_resolves_expressions_and_synonyms() {
        let contract = FaceContract::builtin();
        assert_eq!(contract.version(), BUILTIN_VERSION);
        assert_eq!(contract.normalize("Happy"), Some("happy".to_string()));
        assert_eq!(contract.normalize("FELIZ"), Some("happy".to_string()));
        assert_eq!(contract.normalize("neutral"), Some("neutral".to_string()));
        assert_eq!(contract.normalize("alarmed"), Some("angry".to_string()));
        assert!(contract.is_supported("thinking"));
        assert!(!contract.is_supported("ecstatic"));
    }

    #[test]
    fn test_builtin_presets() {
        let contract = FaceContract::builtin();
        assert_eq!(
            contract.preset("feliz"),
            Some(&FacePreset::Fixed {
                eyes: "happy".to_string(),
                mouth: "smile".to_string()
            })
        );
        assert!(matches!(
            contract.preset("talking"),
            Some(FacePreset::KeepPrevious { .. })
        ));
        assert!(contract.dangling_aliases().is_empty());
    }

    #[test]
    fn test_dangling_aliases() {
        let contract: FaceContract = serde_json::from_str(
            r#"{
                "aliases": {"joy": "happy", "gloom": "sad", "meh": "bored"},
                "presets": {"happy": {"kind": "fixed", "eyes": "happy", "mouth": "smile"}}
            }"#,
        )
        .unwrap();
        assert_eq!(contract.dangling_aliases(), vec!["gloom", "meh"]);
        assert!(contract.preset("joy").is_some());
    }

    #[test]
    fn test_load_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "version": "2025.02",
                "aliases": {{"very_happy": "happy"}},
                "presets": {{
                    "happy": {{"kind": "fixed", "eyes": "happy", "mouth": "smile"}},
                    "talk": {{"kind": "keep_previous", "fallback": {{"eyes": "neutral", "mouth": "speaking"}}}}
                }}
            }}"#
        )
        .unwrap();

        let contract = FaceContract::load(file.path()).unwrap();
        assert_eq!(contract.version, "2025.02");
        assert_eq!(contract.normalize("Very Happy"), Some("happy".to_string()));
        assert_eq!(contract.normalize("happy"), None);
        assert_eq!(contract.presets.len(), 2);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let contract = FaceContract::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(contract, FaceContract::missing());
        assert_eq!(contract.version(), MISSING_VERSION);
        assert_eq!(contract.normalize("happy"), None);
    }

    #[test]
    fn test_load_malformed_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let result = FaceContract::load(file.path());
        assert!(matches!(result, Err(ContractError::Parse { .. })));
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let contract: FaceContract = serde_json::from_str(r#"{"aliases": {"x": "y"}}"#).unwrap();
        assert_eq!(contract.version, "unknown");
        assert!(contract.presets.is_empty());
    }
}
