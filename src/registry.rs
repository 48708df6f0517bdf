//! Cube registry (§4.1): the catalog of registered cubes.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::error::CubeDefinitionError;
use crate::model::{Cube, MeasureDef};

/// Flat per-member metadata surfaced by [`Registry::metadata`], memoized
/// for 5 minutes and invalidated on any mutating operation (§4.1).
#[derive(Debug, Clone, PartialEq)]
pub struct CubeMetadata {
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub measures: Vec<String>,
    pub dimensions: Vec<String>,
    pub joins: Vec<String>,
}

const METADATA_TTL: Duration = Duration::from_secs(5 * 60);

struct MetadataCacheEntry {
    value: Vec<CubeMetadata>,
    built_at: Instant,
}

/// Holds every registered cube. Thread-safe: readers (the planner,
/// executor) and writers (host-side registration at startup) share one
/// registry behind an `RwLock`.
pub struct Registry {
    cubes: RwLock<HashMap<String, Arc<Cube>>>,
    metadata_cache: RwLock<Option<MetadataCacheEntry>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            cubes: RwLock::new(HashMap::new()),
            metadata_cache: RwLock::new(None),
        }
    }

    /// Registers a cube after validating every calculated measure's
    /// template: each `{ref}` must resolve to a measure on the same cube,
    /// must not be a self-reference, and the overall dependency graph
    /// must not contain a cycle.
    pub fn register(&self, cube: Cube) -> Result<(), CubeDefinitionError> {
        validate_calculated_measures(&cube)?;
        let mut guard = self.cubes.write().unwrap();
        if guard.contains_key(&cube.name) {
            return Err(CubeDefinitionError::DuplicateCube(cube.name));
        }
        guard.insert(cube.name.clone(), Arc::new(cube));
        drop(guard);
        self.invalidate_metadata();
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<Cube>> {
        self.cubes.read().unwrap().get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> Option<Arc<Cube>> {
        let removed = self.cubes.write().unwrap().remove(name);
        if removed.is_some() {
            self.invalidate_metadata();
        }
        removed
    }

    pub fn clear(&self) {
        self.cubes.write().unwrap().clear();
        self.invalidate_metadata();
    }

    pub fn names(&self) -> Vec<String> {
        self.cubes.read().unwrap().keys().cloned().collect()
    }

    fn invalidate_metadata(&self) {
        *self.metadata_cache.write().unwrap() = None;
    }

    /// Flat metadata for every registered cube, memoized for 5 minutes.
    pub fn metadata(&self) -> Vec<CubeMetadata> {
        if let Some(entry) = self.metadata_cache.read().unwrap().as_ref() {
            if entry.built_at.elapsed() < METADATA_TTL {
                return entry.value.clone();
            }
        }
        let built: Vec<CubeMetadata> = {
            let guard = self.cubes.read().unwrap();
            let mut names: Vec<&String> = guard.keys().collect();
            names.sort();
            names
                .into_iter()
                .map(|name| {
                    let cube = &guard[name];
                    let mut measures: Vec<String> = cube.measures.keys().cloned().collect();
                    measures.sort();
                    let mut dimensions: Vec<String> = cube.dimensions.keys().cloned().collect();
                    dimensions.sort();
                    let mut joins: Vec<String> = cube.joins.keys().cloned().collect();
                    joins.sort();
                    CubeMetadata {
                        name: cube.name.clone(),
                        title: cube.title.clone(),
                        description: cube.description.clone(),
                        measures,
                        dimensions,
                        joins,
                    }
                })
                .collect()
        };
        *self.metadata_cache.write().unwrap() = Some(MetadataCacheEntry {
            value: built.clone(),
            built_at: Instant::now(),
        });
        built
    }
}

fn validate_calculated_measures(cube: &Cube) -> Result<(), CubeDefinitionError> {
    let mut deps: HashMap<&str, Vec<String>> = HashMap::new();
    for (name, measure) in &cube.measures {
        if let MeasureDef::Calculated { template, .. } = measure {
            let refs = MeasureDef::parse_template_refs(template);
            for reference in &refs {
                // A qualified ref (Cube.field) points at another cube and
                // is resolved at plan time instead; only bare refs are
                // checked for existence here.
                if reference.contains('.') {
                    continue;
                }
                if reference == name {
                    return Err(CubeDefinitionError::SelfReference {
                        cube: cube.name.clone(),
                        measure: name.clone(),
                    });
                }
                if !cube.measures.contains_key(reference) {
                    return Err(CubeDefinitionError::UnknownReference {
                        cube: cube.name.clone(),
                        measure: name.clone(),
                        reference: reference.clone(),
                    });
                }
            }
            deps.insert(name, refs.into_iter().filter(|r| !r.contains('.')).collect());
        }
    }

    for start in deps.keys() {
        if let Some(cycle) = find_cycle(start, &deps) {
            return Err(CubeDefinitionError::CyclicDependency {
                cube: cube.name.clone(),
                cycle,
            });
        }
    }
    Ok(())
}

fn find_cycle(start: &str, deps: &HashMap<&str, Vec<String>>) -> Option<Vec<String>> {
    let mut path: Vec<String> = vec![start.to_string()];
    let mut visiting: Vec<&str> = vec![start];
    fn visit<'a>(
        node: &'a str,
        deps: &'a HashMap<&str, Vec<String>>,
        path: &mut Vec<String>,
        visiting: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        let Some(children) = deps.get(node) else {
            return None;
        };
        for child in children {
            if visiting.contains(&child.as_str()) {
                path.push(child.clone());
                return Some(path.clone());
            }
            visiting.push(child.as_str());
            path.push(child.clone());
            if let Some(cycle) = visit(child.as_str(), deps, path, visiting) {
                return Some(cycle);
            }
            path.pop();
            visiting.pop();
        }
        None
    }
    visit(start, deps, &mut path, &mut visiting)
}
