//! The typed product dependency graph.
//!
//! Products and wrapper targets declare ordered dependencies that are
//! either binary artefacts or other wrapper targets. The graph is
//! validated once on construction: names are unique, every target
//! reference resolves to a wrapper, and wrappers do not depend on
//! themselves through any chain.

use super::ManifestError;
use crate::artefact::name::ArtefactName;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

/// One dependency of a product or wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dependency {
    /// A binary artefact, published as `<Name>.zip`.
    Binary(String),
    /// A wrapper target declared in `[[wrappers]]`.
    Target(String),
}

impl Dependency {
    /// The referenced name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Binary(name) | Self::Target(name) => name,
        }
    }
}

/// A named product or wrapper with its ordered dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetSpec {
    /// Product or wrapper name.
    pub name: String,
    /// Dependencies in declaration order.
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

/// A validated dependency graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGraph {
    products: Vec<TargetSpec>,
    wrappers: Vec<TargetSpec>,
}

impl DependencyGraph {
    /// Validate and build the graph.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::DuplicateName`] when a product, wrapper,
    /// or binary name is reused across kinds,
    /// [`ManifestError::DuplicateDependency`] when one list repeats an
    /// entry, [`ManifestError::UnknownTarget`]
    /// when a target reference names no wrapper,
    /// [`ManifestError::InvalidBinary`] for unusable binary names, and
    /// [`ManifestError::DependencyCycle`] when wrappers form a cycle.
    pub fn new(
        products: Vec<TargetSpec>,
        wrappers: Vec<TargetSpec>,
    ) -> Result<Self, ManifestError> {
        let graph = Self { products, wrappers };
        graph.check_names()?;
        graph.check_references()?;
        graph.check_cycles()?;
        Ok(graph)
    }

    /// Products in declaration order.
    #[must_use]
    pub fn products(&self) -> &[TargetSpec] {
        &self.products
    }

    /// Wrappers in declaration order.
    #[must_use]
    pub fn wrappers(&self) -> &[TargetSpec] {
        &self.wrappers
    }

    /// Every binary artefact referenced by any product or wrapper,
    /// deduplicated and sorted by name.
    #[must_use]
    pub fn binary_artefacts(&self) -> Vec<ArtefactName> {
        self.products
            .iter()
            .chain(&self.wrappers)
            .flat_map(|spec| &spec.dependencies)
            .filter_map(|dep| match dep {
                Dependency::Binary(name) => ArtefactName::try_from(name.as_str()).ok(),
                Dependency::Target(_) => None,
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn check_names(&self) -> Result<(), ManifestError> {
        let mut seen = BTreeSet::new();
        for spec in &self.products {
            if !seen.insert(spec.name.as_str()) {
                return Err(ManifestError::DuplicateName {
                    name: spec.name.clone(),
                });
            }
        }
        let mut targets: BTreeSet<String> = self
            .products
            .iter()
            .map(|p| product_target_name(&p.name))
            .collect();
        for spec in &self.wrappers {
            if !targets.insert(spec.name.clone()) {
                return Err(ManifestError::DuplicateName {
                    name: spec.name.clone(),
                });
            }
        }
        for spec in self.products.iter().chain(&self.wrappers) {
            let mut listed = BTreeSet::new();
            for dep in &spec.dependencies {
                if !listed.insert(dep.name()) {
                    return Err(ManifestError::DuplicateDependency {
                        owner: spec.name.clone(),
                        name: dep.name().to_owned(),
                    });
                }
                let Dependency::Binary(name) = dep else {
                    continue;
                };
                if ArtefactName::try_from(name.as_str()).is_err() {
                    return Err(ManifestError::InvalidBinary {
                        owner: spec.name.clone(),
                        name: name.clone(),
                    });
                }
                if targets.contains(name) {
                    return Err(ManifestError::DuplicateName { name: name.clone() });
                }
            }
        }
        Ok(())
    }

    fn check_references(&self) -> Result<(), ManifestError> {
        let wrappers: BTreeSet<&str> = self.wrappers.iter().map(|w| w.name.as_str()).collect();
        for spec in self.products.iter().chain(&self.wrappers) {
            for dep in &spec.dependencies {
                if let Dependency::Target(target) = dep {
                    if !wrappers.contains(target.as_str()) {
                        return Err(ManifestError::UnknownTarget {
                            owner: spec.name.clone(),
                            target: target.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn check_cycles(&self) -> Result<(), ManifestError> {
        let edges: BTreeMap<&str, Vec<&str>> = self
            .wrappers
            .iter()
            .map(|w| {
                let targets = w
                    .dependencies
                    .iter()
                    .filter_map(|d| match d {
                        Dependency::Target(t) => Some(t.as_str()),
                        Dependency::Binary(_) => None,
                    })
                    .collect();
                (w.name.as_str(), targets)
            })
            .collect();

        let mut done = BTreeSet::new();
        for start in edges.keys() {
            let mut path = Vec::new();
            visit(*start, &edges, &mut path, &mut done)?;
        }
        Ok(())
    }
}

/// Depth-first search that reports the first wrapper found on a cycle.
fn visit<'a>(
    node: &'a str,
    edges: &BTreeMap<&'a str, Vec<&'a str>>,
    path: &mut Vec<&'a str>,
    done: &mut BTreeSet<&'a str>,
) -> Result<(), ManifestError> {
    if done.contains(node) {
        return Ok(());
    }
    if path.contains(&node) {
        return Err(ManifestError::DependencyCycle {
            name: node.to_owned(),
        });
    }
    path.push(node);
    for next in edges.get(node).into_iter().flatten() {
        visit(*next, edges, path, done)?;
    }
    path.pop();
    done.insert(node);
    Ok(())
}

/// Name of the target backing product `product` in `Package.swift`.
#[must_use]
pub fn product_target_name(product: &str) -> String {
    format!("{product}Target")
}
