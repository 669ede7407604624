use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown mark color: {0}")]
pub struct MarkColorError(pub String);

/// Color-coded bookmark a user can pin on a question.
///
/// Stored under the palette's class tag (`bg-rose-500`, ...), which is what
/// existing documents contain. The bare color name is accepted when reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MarkColor {
    #[serde(rename = "bg-rose-500", alias = "rose")]
    Rose,
    #[serde(rename = "bg-amber-500", alias = "amber")]
    Amber,
    #[serde(rename = "bg-emerald-500", alias = "emerald")]
    Emerald,
    #[serde(rename = "bg-sky-500", alias = "sky")]
    Sky,
    #[serde(rename = "bg-indigo-500", alias = "indigo")]
    Indigo,
}

impl MarkColor {
    /// The full palette, in display order.
    pub const PALETTE: [MarkColor; 5] = [
        MarkColor::Rose,
        MarkColor::Amber,
        MarkColor::Emerald,
        MarkColor::Sky,
        MarkColor::Indigo,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            MarkColor::Rose => "rose",
            MarkColor::Amber => "amber",
            MarkColor::Emerald => "emerald",
            MarkColor::Sky => "sky",
            MarkColor::Indigo => "indigo",
        }
    }

    #[must_use]
    pub fn class_tag(self) -> &'static str {
        match self {
            MarkColor::Rose => "bg-rose-500",
            MarkColor::Amber => "bg-amber-500",
            MarkColor::Emerald => "bg-emerald-500",
            MarkColor::Sky => "bg-sky-500",
            MarkColor::Indigo => "bg-indigo-500",
        }
    }
}

impl fmt::Display for MarkColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MarkColor {
    type Err = MarkColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::PALETTE
            .into_iter()
            .find(|c| c.name() == needle || c.class_tag() == needle)
            .ok_or_else(|| MarkColorError(s.to_string()))
    }
}
