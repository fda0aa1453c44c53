//! Revision selector language
//!
//! ```text
//! selectors := selector (',' selector)*
//! selector  := field ('.' generation)?
//! field     := ds | bd | md | tf | cm | vz | rm | st
//! ```
//!
//! `generation` is a positive decimal integer and defaults to 1, meaning
//! "the current value" of that component.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VellumError;

/// Dataset component addressed by a selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Field {
    /// The whole snapshot
    Dataset,
    Body,
    Meta,
    Transform,
    Commit,
    Viz,
    Readme,
    Structure,
}

impl Field {
    pub const ALL: [Field; 8] = [
        Field::Dataset,
        Field::Body,
        Field::Meta,
        Field::Transform,
        Field::Commit,
        Field::Viz,
        Field::Readme,
        Field::Structure,
    ];

    /// Two-letter selector code
    pub fn code(&self) -> &'static str {
        match self {
            Field::Dataset => "ds",
            Field::Body => "bd",
            Field::Meta => "md",
            Field::Transform => "tf",
            Field::Commit => "cm",
            Field::Viz => "vz",
            Field::Readme => "rm",
            Field::Structure => "st",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Field::ALL.into_iter().find(|f| f.code() == code)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One parsed selector: which component, and which occurrence of it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RevisionSelector {
    pub field: Field,
    pub generation: u32,
}

impl RevisionSelector {
    pub fn new(field: Field, generation: u32) -> Self {
        Self { field, generation }
    }

    /// Selector for the current value of `field`
    pub fn current(field: Field) -> Self {
        Self::new(field, 1)
    }
}

impl fmt::Display for RevisionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.field, self.generation)
    }
}

impl FromStr for RevisionSelector {
    type Err = VellumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (code, generation) = match s.split_once('.') {
            Some((code, gen)) => (code, Some(gen)),
            None => (s, None),
        };

        let field = Field::from_code(code).ok_or_else(|| {
            VellumError::MalformedSelector(format!("unknown field {:?} in {:?}", code, s))
        })?;

        let generation = match generation {
            None => 1,
            Some(gen) => {
                if gen.is_empty() || !gen.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(VellumError::MalformedSelector(format!(
                        "generation must be a positive integer in {:?}",
                        s
                    )));
                }
                let gen: u32 = gen.parse().map_err(|_| {
                    VellumError::MalformedSelector(format!("generation out of range in {:?}", s))
                })?;
                if gen == 0 {
                    return Err(VellumError::MalformedSelector(format!(
                        "generation must be positive in {:?}",
                        s
                    )));
                }
                gen
            }
        };

        Ok(RevisionSelector { field, generation })
    }
}

/// Parse a comma-separated selector spec. An empty spec yields no selectors.
pub fn parse_selectors(spec: &str) -> Result<Vec<RevisionSelector>, VellumError> {
    if spec.trim().is_empty() {
        return Ok(Vec::new());
    }
    spec.split(',').map(str::parse).collect()
}

/// Render selectors back to their canonical spec form
pub fn format_selectors(selectors: &[RevisionSelector]) -> String {
    selectors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
