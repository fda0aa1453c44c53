use serde::{Deserialize, Serialize};

use crate::revision::Field;

/// Descriptive metadata component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

/// Body layout component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    /// Body format, e.g. "csv" or "json"
    pub format: String,
    #[serde(default)]
    pub schema: serde_json::Value,
}

/// Commit component: who saved this version and why
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// Author actor ID (hex)
    pub author: String,
    /// Unix timestamp in milliseconds
    pub ts_unix_ms: u64,
}

/// Script that produced the body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub syntax: String,
    pub script: String,
}

/// Rendering template
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Viz {
    pub format: String,
    pub script: String,
}

/// Human-readable documentation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Readme {
    pub format: String,
    pub text: String,
}

/// Immutable, content-addressed dataset version.
///
/// `path` is the content hash assigned by a store on `put`; it is never part
/// of the hashed content. `previous_path` links to the ancestor snapshot and
/// is empty for the first version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub previous_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure: Option<Structure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<Commit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viz: Option<Viz>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readme: Option<Readme>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body_path: String,
}

impl Snapshot {
    /// Whether this snapshot carries a non-empty value for `field`.
    /// Every snapshot counts as carrying the whole dataset.
    pub fn has(&self, field: Field) -> bool {
        match field {
            Field::Dataset => true,
            Field::Body => !self.body_path.is_empty(),
            Field::Meta => self.meta.is_some(),
            Field::Transform => self.transform.is_some(),
            Field::Commit => self.commit.is_some(),
            Field::Viz => self.viz.is_some(),
            Field::Readme => self.readme.is_some(),
            Field::Structure => self.structure.is_some(),
        }
    }

    /// Whether this is the first version in its chain
    pub fn is_root(&self) -> bool {
        self.previous_path.is_empty()
    }

    /// Copy holding everything but the store-assigned path
    pub fn without_path(&self) -> Snapshot {
        Snapshot {
            path: String::new(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_reports_presence() {
        let snapshot = Snapshot {
            body_path: "/blake2b/body".to_string(),
            meta: Some(Meta {
                title: "population".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(snapshot.has(Field::Dataset));
        assert!(snapshot.has(Field::Body));
        assert!(snapshot.has(Field::Meta));
        assert!(!snapshot.has(Field::Readme));
        assert!(!snapshot.has(Field::Structure));
    }

    #[test]
    fn test_empty_fields_not_serialized() {
        let json = serde_json::to_string(&Snapshot::default()).unwrap();
        assert_eq!(json, "{}");
    }
}
