use faultline_entity_store::CodeEntity;
use std::collections::{HashMap, HashSet};

/// Lookup tables for turning `calls` references into entity ids
pub(crate) struct Resolver<'a> {
    ids: HashSet<&'a str>,
    by_full_name: HashMap<&'a str, Vec<&'a CodeEntity>>,
    by_name: HashMap<&'a str, Vec<&'a CodeEntity>>,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(entities: &'a [CodeEntity]) -> Self {
        let mut ids = HashSet::with_capacity(entities.len());
        let mut by_full_name: HashMap<&str, Vec<&CodeEntity>> = HashMap::new();
        let mut by_name: HashMap<&str, Vec<&CodeEntity>> = HashMap::new();

        for entity in entities {
            ids.insert(entity.id.as_str());
            by_full_name
                .entry(entity.full_name.as_str())
                .or_default()
                .push(entity);
            by_name.entry(entity.name.as_str()).or_default().push(entity);
        }

        Self {
            ids,
            by_full_name,
            by_name,
        }
    }

    /// Resolve one reference made by `caller` to at most one entity id.
    ///
    /// A reference naming an id resolves to it directly. Otherwise names are
    /// looked up in the caller's file first, then across the codebase, with
    /// `full_name` preferred over `name` at each scope and the lowest id
    /// winning among equals. A dotted reference such as `self.validate` that
    /// matches nothing falls back to its final segment.
    pub(crate) fn resolve(&self, caller: &CodeEntity, reference: &str) -> Option<&'a str> {
        if let Some(id) = self.ids.get(reference) {
            return Some(*id);
        }

        self.resolve_name(caller, reference).or_else(|| {
            let (_, last) = reference.rsplit_once('.')?;
            self.resolve_name(caller, last)
        })
    }

    fn resolve_name(&self, caller: &CodeEntity, name: &str) -> Option<&'a str> {
        let tables = [self.by_full_name.get(name), self.by_name.get(name)];

        let same_file = tables.iter().flatten().find_map(|candidates| {
            lowest_id(
                candidates
                    .iter()
                    .copied()
                    .filter(|entity| entity.file_path == caller.file_path),
            )
        });
        if same_file.is_some() {
            return same_file;
        }

        tables
            .iter()
            .flatten()
            .find_map(|candidates| lowest_id(candidates.iter().copied()))
    }
}

fn lowest_id<'a>(candidates: impl Iterator<Item = &'a CodeEntity>) -> Option<&'a str> {
    candidates.map(|entity| entity.id.as_str()).min()
}
