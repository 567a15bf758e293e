//! Archetype template types.
//!
//! An archetype is a named bundle of setup-script hooks that rigs (and other
//! archetypes) inherit from. Templates are loaded from `archetype.json` files;
//! resolution into an ordered [`HookPlan`] lives in `rigsmith-core`.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::serde_util::string_or_list;

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// The point in the build at which a hook runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookKind {
    /// After the `Guide` stage.
    Pre,
    /// At the end of the `Connect` stage.
    Post,
    /// At the end of the `Finalize` stage.
    Pub,
}

impl HookKind {
    pub const ALL: [HookKind; 3] = [HookKind::Pre, HookKind::Post, HookKind::Pub];
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HookKind::Pre => "pre",
            HookKind::Post => "post",
            HookKind::Pub => "pub",
        };
        f.write_str(s)
    }
}

/// Reference to an executable hook script.
///
/// Identity is the path: two references to the same path are the same hook.
/// On disk a hook is either a bare path string or an object carrying
/// `componentTags`, in which case it runs once per component whose
/// `componentTag` matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "HookRefRepr", into = "HookRefRepr")]
pub struct HookRef {
    pub path: PathBuf,
    pub component_tags: Vec<String>,
}

impl HookRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            component_tags: Vec::new(),
        }
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.component_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Whether the hook is scoped to tagged components.
    pub fn is_tagged(&self) -> bool {
        !self.component_tags.is_empty()
    }

    pub fn matches_tag(&self, tag: Option<&str>) -> bool {
        tag.is_some_and(|t| self.component_tags.iter().any(|c| c == t))
    }
}

impl fmt::Display for HookRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum HookRefRepr {
    Path(PathBuf),
    Scoped {
        path: PathBuf,
        #[serde(rename = "componentTags", default, deserialize_with = "string_or_list")]
        component_tags: Vec<String>,
    },
}

impl From<HookRefRepr> for HookRef {
    fn from(repr: HookRefRepr) -> Self {
        match repr {
            HookRefRepr::Path(path) => HookRef::new(path),
            HookRefRepr::Scoped {
                path,
                component_tags,
            } => HookRef {
                path,
                component_tags,
            },
        }
    }
}

impl From<HookRef> for HookRefRepr {
    fn from(hook: HookRef) -> Self {
        if hook.component_tags.is_empty() {
            HookRefRepr::Path(hook.path)
        } else {
            HookRefRepr::Scoped {
                path: hook.path,
                component_tags: hook.component_tags,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

/// A named archetype as stored in `archetype.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchetypeTemplate {
    /// Template name. Defaults to the archetype directory name when omitted.
    #[serde(default)]
    pub name: String,
    /// Ordered parents (multiple inheritance).
    #[serde(
        rename = "parentArchetypes",
        default,
        deserialize_with = "string_or_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub parents: Vec<String>,
    #[serde(rename = "preScript", default, skip_serializing_if = "Vec::is_empty")]
    pub pre_script: Vec<HookRef>,
    #[serde(rename = "postScript", default, skip_serializing_if = "Vec::is_empty")]
    pub post_script: Vec<HookRef>,
    #[serde(rename = "pubScript", default, skip_serializing_if = "Vec::is_empty")]
    pub pub_script: Vec<HookRef>,
    /// Directory the template was loaded from, used to resolve relative hooks.
    #[serde(skip)]
    pub source_dir: Option<PathBuf>,
}

impl ArchetypeTemplate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parents: Vec::new(),
            pre_script: Vec::new(),
            post_script: Vec::new(),
            pub_script: Vec::new(),
            source_dir: None,
        }
    }

    pub fn hooks(&self, kind: HookKind) -> &[HookRef] {
        match kind {
            HookKind::Pre => &self.pre_script,
            HookKind::Post => &self.post_script,
            HookKind::Pub => &self.pub_script,
        }
    }
}

// ---------------------------------------------------------------------------
// Resolved plan
// ---------------------------------------------------------------------------

/// Ordered, de-duplicated hooks per kind, produced by archetype layering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HookPlan {
    /// Archetypes in the order their hooks were emitted (ancestors first).
    pub lineage: Vec<String>,
    pub pre: Vec<HookRef>,
    pub post: Vec<HookRef>,
    #[serde(rename = "pub")]
    pub publish: Vec<HookRef>,
}

impl HookPlan {
    pub fn hooks(&self, kind: HookKind) -> &[HookRef] {
        match kind {
            HookKind::Pre => &self.pre,
            HookKind::Post => &self.post,
            HookKind::Pub => &self.publish,
        }
    }

    pub fn hooks_mut(&mut self, kind: HookKind) -> &mut Vec<HookRef> {
        match kind {
            HookKind::Pre => &mut self.pre,
            HookKind::Post => &mut self.post,
            HookKind::Pub => &mut self.publish,
        }
    }

    /// Append a hook unless one with the same path is already planned.
    ///
    /// Returns `true` if the hook was added.
    pub fn push_unique(&mut self, kind: HookKind, hook: &HookRef) -> bool {
        let hooks = self.hooks_mut(kind);
        if hooks.iter().any(|h| h.path == hook.path) {
            return false;
        }
        hooks.push(hook.clone());
        true
    }

    pub fn is_empty(&self) -> bool {
        self.pre.is_empty() && self.post.is_empty() && self.publish.is_empty()
    }
}
