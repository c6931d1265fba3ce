//! Story catalog and capture units.
//!
//! The catalog is the ordered list of stories to export and how many
//! content frames each has. It expands into [`CaptureUnit`]s: the cover of
//! each story followed by its frames, in catalog order.

use crate::result::{ExportError, ExportResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use url::Url;

/// Opaque, path-safe story identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StoryId(String);

impl StoryId {
    /// Validate and wrap an identifier.
    ///
    /// Only ASCII letters, digits, `-` and `_` are accepted since the id is
    /// used verbatim as a directory and file name.
    pub fn new(id: impl Into<String>) -> ExportResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(ExportError::config("story id must not be empty"));
        }
        if let Some(bad) = id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(ExportError::config(format!(
                "story id '{id}' contains invalid character '{bad}'"
            )));
        }
        Ok(Self(id))
    }

    /// Borrow the identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for StoryId {
    type Error = ExportError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StoryId> for String {
    fn from(id: StoryId) -> Self {
        id.0
    }
}

impl std::fmt::Display for StoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which visual of a story a unit captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameSelector {
    /// Background only, no content overlay
    Cover,
    /// Zero-based content frame
    Frame(u32),
}

impl FrameSelector {
    /// Map a raw index: negative values select the cover.
    #[must_use]
    pub fn from_index(index: i64) -> Self {
        u32::try_from(index).map_or(Self::Cover, Self::Frame)
    }

    /// One-based frame number used in file names (`None` for the cover)
    #[must_use]
    pub const fn ordinal(self) -> Option<u32> {
        match self {
            Self::Cover => None,
            Self::Frame(n) => Some(n + 1),
        }
    }

    /// Whether this selects the cover
    #[must_use]
    pub const fn is_cover(self) -> bool {
        matches!(self, Self::Cover)
    }
}

impl std::fmt::Display for FrameSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cover => f.write_str("cover"),
            Self::Frame(n) => write!(f, "frame-{}", n + 1),
        }
    }
}

/// One story in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryEntry {
    /// Story identifier
    pub id: StoryId,
    /// Number of content frames (0 = cover only)
    pub frames: u32,
}

impl StoryEntry {
    /// Create an entry
    pub fn new(id: &str, frames: u32) -> ExportResult<Self> {
        Ok(Self {
            id: StoryId::new(id)?,
            frames,
        })
    }

    /// Selectors for this story: cover first, then frames in order
    pub fn selectors(&self) -> impl Iterator<Item = FrameSelector> {
        std::iter::once(FrameSelector::Cover).chain((0..self.frames).map(FrameSelector::Frame))
    }
}

/// Ordered story catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    stories: Vec<StoryEntry>,
}

impl Catalog {
    /// Build a catalog, rejecting duplicate ids
    pub fn new(stories: Vec<StoryEntry>) -> ExportResult<Self> {
        let mut seen = HashSet::new();
        for story in &stories {
            if !seen.insert(story.id.as_str()) {
                return Err(ExportError::config(format!(
                    "story '{}' appears more than once in the catalog",
                    story.id
                )));
            }
        }
        Ok(Self { stories })
    }

    /// The stories published on the site
    #[must_use]
    pub fn builtin() -> Self {
        let stories = [
            ("welcome", 1),
            ("about-lena", 3),
            ("classes", 4),
            ("private-lessons", 3),
            ("bachata-sensual", 4),
            ("workshops", 3),
            ("socials", 2),
            ("contact", 1),
        ]
        .into_iter()
        .map(|(id, frames)| StoryEntry {
            id: StoryId(id.to_string()),
            frames,
        })
        .collect();
        Self { stories }
    }

    /// Parse a YAML catalog (`stories: [{id, frames}, ...]`)
    pub fn from_yaml(text: &str) -> ExportResult<Self> {
        let parsed: Self = serde_yaml_ng::from_str(text)?;
        Self::new(parsed.stories)
    }

    /// Load a YAML catalog from disk
    pub fn from_file(path: &Path) -> ExportResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ExportError::config(format!("cannot read catalog {}: {e}", path.display()))
        })?;
        Self::from_yaml(&text)
    }

    /// Stories in order
    #[must_use]
    pub fn stories(&self) -> &[StoryEntry] {
        &self.stories
    }

    /// Number of stories
    #[must_use]
    pub fn len(&self) -> usize {
        self.stories.len()
    }

    /// Whether the catalog is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stories.is_empty()
    }

    /// Look up a story
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&StoryEntry> {
        self.stories.iter().find(|s| s.id.as_str() == id)
    }

    /// Keep only the named stories, preserving catalog order.
    ///
    /// An empty filter keeps everything.
    pub fn filtered(&self, ids: &[String]) -> ExportResult<Self> {
        if ids.is_empty() {
            return Ok(self.clone());
        }
        if let Some(missing) = ids.iter().find(|id| self.get(id).is_none()) {
            return Err(ExportError::config(format!(
                "story '{missing}' is not in the catalog"
            )));
        }
        let stories = self
            .stories
            .iter()
            .filter(|s| ids.iter().any(|id| id == s.id.as_str()))
            .cloned()
            .collect();
        Ok(Self { stories })
    }

    /// Total number of capture units (covers plus frames)
    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.stories.iter().map(|s| 1 + s.frames as usize).sum()
    }
}

/// Build the render URL for one story visual.
///
/// Existing query parameters on `base` are kept.
pub fn render_url(base: &str, story: &StoryId, selector: FrameSelector) -> ExportResult<String> {
    let mut url = Url::parse(base)
        .map_err(|e| ExportError::config(format!("invalid base url '{base}': {e}")))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("story", story.as_str());
        match selector {
            FrameSelector::Cover => {
                query.append_pair("cover", "true");
            }
            FrameSelector::Frame(n) => {
                query.append_pair("frame", &n.to_string());
            }
        }
    }
    Ok(url.into())
}

/// The smallest thing the pipeline produces one output file for
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureUnit {
    /// Story identifier
    pub story: StoryId,
    /// Cover or frame
    pub selector: FrameSelector,
    /// Page to load
    pub url: String,
    /// Final output path
    pub output: PathBuf,
}

impl CaptureUnit {
    /// Short label for logs, e.g. `welcome/frame-1`
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}/{}", self.story, self.selector)
    }
}
