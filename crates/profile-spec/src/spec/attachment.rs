use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Which widget an attachment slot backs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SlotKind {
    Avatar,
    Document,
}

impl SlotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotKind::Avatar => "avatar",
            SlotKind::Document => "document",
        }
    }
}

/// Pre-flight rules for files offered to a slot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct SlotPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_bytes: Option<u64>,
    /// MIME globs (`image/*`) or file-name globs (`*.pdf`). Empty accepts anything.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accept: Vec<String>,
    /// Built-in avatar ids that can be chosen without uploading.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub presets: Vec<String>,
}

impl SlotPolicy {
    /// Compiles the accept list; matching is case-insensitive.
    pub fn accept_set(&self) -> Result<GlobSet, globset::Error> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.accept {
            builder.add(GlobBuilder::new(pattern).case_insensitive(true).build()?);
        }
        builder.build()
    }
}

/// Declares one upload widget of the form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SlotSpec {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub kind: SlotKind,
    #[serde(default)]
    pub policy: SlotPolicy,
}
