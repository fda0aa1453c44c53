//! Version chain walker
//!
//! Reconstructs dataset components by following `previous_path` links
//! backwards from a snapshot. A selector's generation counts the snapshots in
//! which its field is actually present, so `md.2` means "the second most
//! recent Meta", however many commits left Meta untouched in between.

use crate::error::VellumError;
use crate::resolve::AliasResolver;
use crate::revision::{parse_selectors, Field, RevisionSelector};
use crate::store::SnapshotStore;
use crate::types::snapshot::{Commit, Meta, Readme, Snapshot, Structure, Transform, Viz};

/// Components gathered by a walk, at most one value per field
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedDataset {
    /// Whole snapshot selected by `ds`
    pub dataset: Option<Snapshot>,
    pub body_path: Option<String>,
    pub meta: Option<Meta>,
    pub transform: Option<Transform>,
    pub commit: Option<Commit>,
    pub viz: Option<Viz>,
    pub readme: Option<Readme>,
    pub structure: Option<Structure>,
}

impl ResolvedDataset {
    pub fn is_empty(&self) -> bool {
        *self == ResolvedDataset::default()
    }

    /// Whether a value for `field` has been resolved
    pub fn has(&self, field: Field) -> bool {
        match field {
            Field::Dataset => self.dataset.is_some(),
            Field::Body => self.body_path.is_some(),
            Field::Meta => self.meta.is_some(),
            Field::Transform => self.transform.is_some(),
            Field::Commit => self.commit.is_some(),
            Field::Viz => self.viz.is_some(),
            Field::Readme => self.readme.is_some(),
            Field::Structure => self.structure.is_some(),
        }
    }

    /// Copy `field` out of `snapshot` unless a value was already captured
    fn capture(&mut self, field: Field, snapshot: &Snapshot) {
        if self.has(field) {
            return;
        }
        match field {
            Field::Dataset => self.dataset = Some(snapshot.clone()),
            Field::Body => self.body_path = Some(snapshot.body_path.clone()),
            Field::Meta => self.meta = snapshot.meta.clone(),
            Field::Transform => self.transform = snapshot.transform.clone(),
            Field::Commit => self.commit = snapshot.commit.clone(),
            Field::Viz => self.viz = snapshot.viz.clone(),
            Field::Readme => self.readme = snapshot.readme.clone(),
            Field::Structure => self.structure = snapshot.structure.clone(),
        }
    }
}

/// Load revisions of a dataset from history.
///
/// A spec with no selectors (empty or blank) returns an empty result without
/// touching the store or the resolver. Otherwise `reference` is resolved to a
/// concrete path, and the chain is walked from there.
pub fn recall<S, R>(
    store: &S,
    resolver: &R,
    spec: &str,
    reference: &str,
) -> Result<ResolvedDataset, VellumError>
where
    S: SnapshotStore + ?Sized,
    R: AliasResolver + ?Sized,
{
    let selectors = parse_selectors(spec)?;
    if selectors.is_empty() {
        return Ok(ResolvedDataset::default());
    }
    let path = resolver.canonicalize(reference)?;
    walk(store, &path, &selectors)
}

/// Walk the chain starting at `reference` until every selector is satisfied
/// or the chain ends. Selectors still unsatisfied at the chain start simply
/// leave their field absent.
pub fn walk<S>(
    store: &S,
    reference: &str,
    selectors: &[RevisionSelector],
) -> Result<ResolvedDataset, VellumError>
where
    S: SnapshotStore + ?Sized,
{
    let mut remaining: Vec<u32> = selectors.iter().map(|s| s.generation).collect();
    let mut result = ResolvedDataset::default();
    let mut path = reference.to_string();

    while remaining.iter().any(|gen| *gen > 0) && !path.is_empty() {
        let snapshot = store.get(&path)?;

        for (selector, gen) in selectors.iter().zip(remaining.iter_mut()) {
            if *gen == 0 || !snapshot.has(selector.field) {
                continue;
            }
            *gen -= 1;
            if *gen == 0 {
                result.capture(selector.field, &snapshot);
            }
        }

        path = snapshot.previous_path;
    }

    Ok(result)
}

/// Components that may be removed from a snapshot before it is committed
pub fn is_droppable(field: Field) -> bool {
    matches!(
        field,
        Field::Meta | Field::Viz | Field::Transform | Field::Structure | Field::Body | Field::Readme
    )
}

/// Clear the named components on an in-memory snapshot.
///
/// Every selector must address the current value (generation 1) of a
/// droppable component; the snapshot is only modified once the whole list
/// has been validated.
pub fn drop_components(snapshot: &mut Snapshot, spec: &str) -> Result<(), VellumError> {
    if spec.is_empty() {
        return Ok(());
    }

    let selectors = parse_selectors(spec)?;
    for selector in &selectors {
        if selector.generation != 1 {
            return Err(VellumError::UnsupportedGeneration {
                field: selector.field.code().to_string(),
                generation: selector.generation,
            });
        }
        if !is_droppable(selector.field) {
            return Err(VellumError::UnknownComponent(selector.field.code().to_string()));
        }
    }

    for selector in &selectors {
        match selector.field {
            Field::Meta => snapshot.meta = None,
            Field::Viz => snapshot.viz = None,
            Field::Transform => snapshot.transform = None,
            Field::Structure => snapshot.structure = None,
            Field::Body => snapshot.body_path.clear(),
            Field::Readme => snapshot.readme = None,
            Field::Dataset | Field::Commit => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::resolve::ConcretePaths;
    use crate::store::MemoryStore;

    fn meta(title: &str) -> Option<Meta> {
        Some(Meta {
            title: title.to_string(),
            ..Default::default()
        })
    }

    fn commit(title: &str) -> Option<Commit> {
        Some(Commit {
            title: title.to_string(),
            ..Default::default()
        })
    }

    /// Build a chain oldest-first and return the paths, oldest first
    fn build_chain(store: &MemoryStore, versions: Vec<Snapshot>) -> Vec<String> {
        let mut paths: Vec<String> = Vec::new();
        for mut snapshot in versions {
            snapshot.previous_path = paths.last().cloned().unwrap_or_default();
            paths.push(store.put(&snapshot).unwrap());
        }
        paths
    }

    /// commit 1 sets Meta and Body, commits 2 and 3 change only Body
    fn meta_then_bodies(store: &MemoryStore) -> Vec<String> {
        build_chain(
            store,
            vec![
                Snapshot {
                    meta: meta("v1"),
                    body_path: "/blake2b/body1".to_string(),
                    commit: commit("one"),
                    ..Default::default()
                },
                Snapshot {
                    body_path: "/blake2b/body2".to_string(),
                    commit: commit("two"),
                    ..Default::default()
                },
                Snapshot {
                    body_path: "/blake2b/body3".to_string(),
                    commit: commit("three"),
                    ..Default::default()
                },
            ],
        )
    }

    #[test]
    fn test_sparse_meta_skips_commits_without_it() {
        let store = MemoryStore::new();
        let paths = meta_then_bodies(&store);

        let res = walk(&store, &paths[2], &parse_selectors("md.1").unwrap()).unwrap();
        assert_eq!(res.meta, meta("v1"));
        assert!(res.body_path.is_none());
    }

    #[test]
    fn test_generations_count_presence() {
        let store = MemoryStore::new();
        let paths = meta_then_bodies(&store);

        let res = walk(&store, &paths[2], &parse_selectors("bd.2,cm.3,md").unwrap()).unwrap();
        assert_eq!(res.body_path.as_deref(), Some("/blake2b/body2"));
        assert_eq!(res.commit, commit("one"));
        assert_eq!(res.meta, meta("v1"));
    }

    #[test]
    fn test_exhausted_chain_leaves_fields_absent() {
        let store = MemoryStore::new();
        let paths = meta_then_bodies(&store);

        let res = walk(&store, &paths[2], &parse_selectors("md.2,rm,bd").unwrap()).unwrap();
        assert!(res.meta.is_none());
        assert!(res.readme.is_none());
        assert_eq!(res.body_path.as_deref(), Some("/blake2b/body3"));
    }

    #[test]
    fn test_independent_fields_resolve_to_nearest_nth_ancestor() {
        let store = MemoryStore::new();
        // Field placements, oldest first:
        //   0: md=a  st=x
        //   1:       st=y  rm=r1
        //   2: md=b
        //   3:             rm=r2
        //   4: md=c  st=z
        let structure = |format: &str| {
            Some(Structure {
                format: format.to_string(),
                ..Default::default()
            })
        };
        let readme = |text: &str| {
            Some(Readme {
                format: "md".to_string(),
                text: text.to_string(),
            })
        };
        let paths = build_chain(
            &store,
            vec![
                Snapshot { meta: meta("a"), structure: structure("x"), ..Default::default() },
                Snapshot { structure: structure("y"), readme: readme("r1"), ..Default::default() },
                Snapshot { meta: meta("b"), ..Default::default() },
                Snapshot { readme: readme("r2"), ..Default::default() },
                Snapshot { meta: meta("c"), structure: structure("z"), ..Default::default() },
            ],
        );

        let head = &paths[4];
        let cases = [
            ("md.1", meta("c")),
            ("md.2", meta("b")),
            ("md.3", meta("a")),
        ];
        for (spec, expected) in cases {
            let res = walk(&store, head, &parse_selectors(spec).unwrap()).unwrap();
            assert_eq!(res.meta, expected, "selector {}", spec);
        }

        let res = walk(&store, head, &parse_selectors("st.2,rm.2,ds.3").unwrap()).unwrap();
        assert_eq!(res.structure, structure("y"));
        assert_eq!(res.readme, readme("r1"));
        assert_eq!(res.dataset.as_ref().map(|d| d.path.as_str()), Some(paths[2].as_str()));
    }

    #[test]
    fn test_first_satisfaction_wins() {
        let store = MemoryStore::new();
        let paths = build_chain(
            &store,
            vec![
                Snapshot { meta: meta("old"), ..Default::default() },
                Snapshot { meta: meta("new"), ..Default::default() },
            ],
        );

        let res = walk(&store, &paths[1], &parse_selectors("md.1,md.2").unwrap()).unwrap();
        assert_eq!(res.meta, meta("new"));
    }

    #[test]
    fn test_walk_stops_once_satisfied() {
        let store = MemoryStore::new();
        let paths = meta_then_bodies(&store);
        // Removing the root proves the walk never reached it
        store.delete(&paths[0]).unwrap();

        let res = walk(&store, &paths[2], &parse_selectors("bd.2").unwrap()).unwrap();
        assert_eq!(res.body_path.as_deref(), Some("/blake2b/body2"));
    }

    #[test]
    fn test_missing_ancestor_is_store_error() {
        let store = MemoryStore::new();
        let paths = meta_then_bodies(&store);
        store.delete(&paths[1]).unwrap();

        let err = walk(&store, &paths[2], &parse_selectors("md").unwrap()).unwrap_err();
        assert!(matches!(err, VellumError::Store(StoreError::NotFound(_))));
    }

    #[test]
    fn test_recall_empty_spec_touches_nothing() {
        let store = MemoryStore::new();
        let res = recall(&store, &ConcretePaths, "", "not/even/a/ref").unwrap();
        assert!(res.is_empty());
        let res = recall(&store, &ConcretePaths, "  ", "not/even/a/ref").unwrap();
        assert!(res.is_empty());
    }

    #[test]
    fn test_recall_rejects_malformed_before_resolving() {
        let store = MemoryStore::new();
        let err = recall(&store, &ConcretePaths, "xx.1", "not/a/path").unwrap_err();
        assert!(matches!(err, VellumError::MalformedSelector(_)));
    }

    #[test]
    fn test_recall_resolves_and_walks() {
        let store = MemoryStore::new();
        let paths = meta_then_bodies(&store);
        let res = recall(&store, &ConcretePaths, "md", &paths[2]).unwrap();
        assert_eq!(res.meta, meta("v1"));
    }

    #[test]
    fn test_drop_clears_components() {
        let mut snapshot = Snapshot {
            meta: meta("m"),
            readme: Some(Readme::default()),
            body_path: "/blake2b/body".to_string(),
            commit: commit("c"),
            ..Default::default()
        };
        drop_components(&mut snapshot, "md,rm,bd").unwrap();
        assert!(snapshot.meta.is_none());
        assert!(snapshot.readme.is_none());
        assert!(snapshot.body_path.is_empty());
        assert_eq!(snapshot.commit, commit("c"));
    }

    #[test]
    fn test_drop_rejects_older_generations_without_mutation() {
        let original = Snapshot {
            meta: meta("m"),
            viz: Some(Viz::default()),
            ..Default::default()
        };
        let mut snapshot = original.clone();
        let err = drop_components(&mut snapshot, "vz,md.2").unwrap_err();
        assert!(matches!(
            err,
            VellumError::UnsupportedGeneration { generation: 2, .. }
        ));
        assert_eq!(
            serde_json::to_vec(&snapshot).unwrap(),
            serde_json::to_vec(&original).unwrap()
        );
    }

    #[test]
    fn test_drop_rejects_unknown_component() {
        let original = Snapshot {
            meta: meta("m"),
            commit: commit("c"),
            ..Default::default()
        };
        let mut snapshot = original.clone();
        let err = drop_components(&mut snapshot, "md,cm").unwrap_err();
        assert!(matches!(err, VellumError::UnknownComponent(ref f) if f == "cm"));
        assert_eq!(snapshot, original);

        assert!(drop_components(&mut snapshot, "").is_ok());
        assert_eq!(snapshot, original);
    }
}
