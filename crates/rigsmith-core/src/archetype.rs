//! Archetype layering.
//!
//! Linearizes the archetype inheritance DAG into one ordered hook list per
//! [`HookKind`]:
//! - ancestors before descendants (depth-first over `parentArchetypes`)
//! - multiple requested archetypes processed left to right
//! - each archetype expanded at most once
//! - hooks de-duplicated by resolved script path, first occurrence wins
//!
//! Every name is validated before any hook is emitted, so an unknown parent or
//! a cyclic chain fails the whole resolution up front.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

use rigsmith_types::archetype::{ArchetypeTemplate, HookKind, HookPlan, HookRef};
use rigsmith_types::error::ArchetypeError;
use rigsmith_types::rig::RigDescription;

/// Archetype implicitly layered beneath every rig that requests any archetype.
pub const BASE_ARCHETYPE: &str = "base";

// ---------------------------------------------------------------------------
// Library
// ---------------------------------------------------------------------------

/// Every known archetype template, keyed by name.
#[derive(Debug, Clone)]
pub struct ArchetypeLibrary {
    templates: BTreeMap<String, ArchetypeTemplate>,
    base: Option<String>,
}

impl Default for ArchetypeLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchetypeLibrary {
    pub fn new() -> Self {
        Self {
            templates: BTreeMap::new(),
            base: Some(BASE_ARCHETYPE.to_string()),
        }
    }

    /// Change (or disable) the implicit base archetype.
    pub fn with_base(mut self, base: Option<String>) -> Self {
        self.base = base;
        self
    }

    /// Add a template. A later template with the same name shadows the earlier one.
    pub fn insert(&mut self, template: ArchetypeTemplate) {
        if let Some(previous) = self.templates.get(&template.name) {
            tracing::debug!(
                archetype = %template.name,
                shadowed = ?previous.source_dir,
                "archetype shadowed by later search path"
            );
        }
        self.templates.insert(template.name.clone(), template);
    }

    pub fn get(&self, name: &str) -> Option<&ArchetypeTemplate> {
        self.templates.get(name)
    }

    pub fn templates(&self) -> impl Iterator<Item = &ArchetypeTemplate> {
        self.templates.values()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// The implicit base archetype, if it exists in the library.
    pub fn base(&self) -> Option<&str> {
        self.base
            .as_deref()
            .filter(|name| self.templates.contains_key(*name))
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Resolve `requested` archetypes into an ordered, de-duplicated hook plan.
///
/// When anything is requested and the library has a base archetype, the base
/// is layered first.
pub fn resolve_archetypes(
    requested: &[String],
    library: &ArchetypeLibrary,
) -> Result<HookPlan, ArchetypeError> {
    if requested.is_empty() {
        return Ok(HookPlan::default());
    }

    let roots: Vec<&str> = library
        .base()
        .into_iter()
        .chain(requested.iter().map(String::as_str))
        .collect();

    validate(&roots, library)?;

    let mut lineage = Vec::new();
    let mut seen = HashSet::new();
    for root in &roots {
        expand(root, library, &mut seen, &mut lineage);
    }

    let mut plan = HookPlan::default();
    for name in &lineage {
        // Validated above.
        let Some(template) = library.get(name) else {
            continue;
        };
        for kind in HookKind::ALL {
            for hook in template.hooks(kind) {
                let resolved = resolve_hook(hook, template);
                if !plan.push_unique(kind, &resolved) {
                    tracing::debug!(
                        archetype = %name,
                        hook = %resolved,
                        kind = %kind,
                        "hook already planned, skipping duplicate"
                    );
                }
            }
        }
    }
    plan.lineage = lineage;

    tracing::debug!(
        lineage = ?plan.lineage,
        pre = plan.pre.len(),
        post = plan.post.len(),
        publish = plan.publish.len(),
        "resolved archetype hooks"
    );
    Ok(plan)
}

/// Append the rig's own hooks after everything inherited.
pub fn layer_rig_hooks(plan: &mut HookPlan, rig: &RigDescription) {
    for kind in HookKind::ALL {
        for hook in rig.local_hooks(kind) {
            plan.push_unique(kind, hook);
        }
    }
}

/// Check every name reachable from `roots` exists and that no parent chain loops.
fn validate(roots: &[&str], library: &ArchetypeLibrary) -> Result<(), ArchetypeError> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<'a>(
        name: &'a str,
        referenced_by: Option<&str>,
        library: &'a ArchetypeLibrary,
        marks: &mut HashMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
    ) -> Result<(), ArchetypeError> {
        match marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|n| *n == name).unwrap_or(0);
                return Err(ArchetypeError::ArchetypeCycle {
                    cycle: stack[start..].iter().map(|n| n.to_string()).collect(),
                });
            }
            None => {}
        }
        let template = library
            .get(name)
            .ok_or_else(|| ArchetypeError::UnknownArchetype {
                name: name.to_string(),
                referenced_by: referenced_by.map(str::to_string),
            })?;

        marks.insert(name, Mark::Visiting);
        stack.push(name);
        for parent in &template.parents {
            visit(parent, Some(name), library, marks, stack)?;
        }
        stack.pop();
        marks.insert(name, Mark::Done);
        Ok(())
    }

    let mut marks = HashMap::new();
    let mut stack = Vec::new();
    for root in roots {
        visit(root, None, library, &mut marks, &mut stack)?;
    }
    Ok(())
}

fn expand(
    name: &str,
    library: &ArchetypeLibrary,
    seen: &mut HashSet<String>,
    lineage: &mut Vec<String>,
) {
    if !seen.insert(name.to_string()) {
        return;
    }
    if let Some(template) = library.get(name) {
        for parent in &template.parents {
            expand(parent, library, seen, lineage);
        }
    }
    lineage.push(name.to_string());
}

/// Resolve a relative hook path against the directory its template came from.
fn resolve_hook(hook: &HookRef, template: &ArchetypeTemplate) -> HookRef {
    let path: PathBuf = match &template.source_dir {
        Some(dir) if hook.path.is_relative() => dir.join(&hook.path),
        _ => hook.path.clone(),
    };
    HookRef {
        path,
        component_tags: hook.component_tags.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn template(name: &str, parents: &[&str], pre: &[&str]) -> ArchetypeTemplate {
        let mut t = ArchetypeTemplate::new(name);
        t.parents = parents.iter().map(|p| p.to_string()).collect();
        t.pre_script = pre.iter().map(|p| HookRef::new(*p)).collect();
        t
    }

    fn library(templates: Vec<ArchetypeTemplate>) -> ArchetypeLibrary {
        let mut lib = ArchetypeLibrary::new();
        for t in templates {
            lib.insert(t);
        }
        lib
    }

    fn requested(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn paths(hooks: &[HookRef]) -> Vec<&Path> {
        hooks.iter().map(|h| h.path.as_path()).collect()
    }

    #[test]
    fn test_base_is_layered_once_and_first() {
        let lib = library(vec![
            template("base", &[], &["/hooks/base.sh"]),
            template("biped", &["base"], &["/hooks/biped.sh"]),
            template("face", &["base"], &["/hooks/face.sh"]),
        ]);
        let plan = resolve_archetypes(&requested(&["face", "biped"]), &lib).unwrap();
        assert_eq!(plan.lineage, vec!["base", "face", "biped"]);
        assert_eq!(
            paths(&plan.pre),
            vec![
                Path::new("/hooks/base.sh"),
                Path::new("/hooks/face.sh"),
                Path::new("/hooks/biped.sh"),
            ]
        );
    }

    #[test]
    fn test_shared_hooks_are_deduplicated_by_path() {
        let lib = library(vec![
            template("biped", &[], &["/hooks/ik.sh", "/hooks/biped.sh"]),
            template("quad", &[], &["/hooks/ik.sh"]),
        ]);
        let plan = resolve_archetypes(&requested(&["biped", "quad"]), &lib).unwrap();
        assert_eq!(
            paths(&plan.pre),
            vec![Path::new("/hooks/ik.sh"), Path::new("/hooks/biped.sh")]
        );
    }

    #[test]
    fn test_unknown_parent_fails_before_any_hook() {
        let lib = library(vec![template("dog", &["quadruped"], &["/hooks/dog.sh"])]);
        let err = resolve_archetypes(&requested(&["dog"]), &lib).unwrap_err();
        assert_eq!(
            err,
            ArchetypeError::UnknownArchetype {
                name: "quadruped".into(),
                referenced_by: Some("dog".into()),
            }
        );
    }

    #[test]
    fn test_unknown_requested_archetype() {
        let lib = library(vec![]);
        let err = resolve_archetypes(&requested(&["alien"]), &lib).unwrap_err();
        assert!(matches!(err, ArchetypeError::UnknownArchetype { ref name, referenced_by: None } if name == "alien"));
    }

    #[test]
    fn test_parent_cycle_is_reported() {
        let lib = library(vec![template("a", &["b"], &[]), template("b", &["a"], &[])]);
        let err = resolve_archetypes(&requested(&["a"]), &lib).unwrap_err();
        assert_eq!(
            err,
            ArchetypeError::ArchetypeCycle {
                cycle: vec!["a".into(), "b".into()],
            }
        );
    }

    #[test]
    fn test_relative_hooks_resolve_against_template_dir() {
        let mut t = template("biped", &[], &["scripts/pre.sh"]);
        t.source_dir = Some(PathBuf::from("/archetypes/biped"));
        let plan = resolve_archetypes(&requested(&["biped"]), &library(vec![t])).unwrap();
        assert_eq!(plan.pre[0].path, PathBuf::from("/archetypes/biped/scripts/pre.sh"));
    }

    #[test]
    fn test_rig_hooks_come_last() {
        let lib = library(vec![template("biped", &[], &["/hooks/biped.sh"])]);
        let mut plan = resolve_archetypes(&requested(&["biped"]), &lib).unwrap();
        let mut rig = RigDescription::new("hero");
        rig.pre_script = vec![HookRef::new("/hooks/hero.sh"), HookRef::new("/hooks/biped.sh")];
        layer_rig_hooks(&mut plan, &rig);
        assert_eq!(
            paths(&plan.pre),
            vec![Path::new("/hooks/biped.sh"), Path::new("/hooks/hero.sh")]
        );
    }

    #[test]
    fn test_nothing_requested_means_no_hooks() {
        let lib = library(vec![template("base", &[], &["/hooks/base.sh"])]);
        let plan = resolve_archetypes(&[], &lib).unwrap();
        assert!(plan.is_empty());
        assert!(plan.lineage.is_empty());
    }
}
