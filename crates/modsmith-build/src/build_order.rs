//! Dependency resolution and build order using topological sort
use crate::error::{BuildError, BuildResult};
use modsmith_package::{ModDescriptor, ModReference};
use semver::{Version, VersionReq};
use std::collections::{HashMap, HashSet, VecDeque};

/// A mod in the dependency graph
#[derive(Debug, Clone, PartialEq)]
pub struct ModNode {
    pub name: String,
    pub version: Version,
    /// Must be present and built first
    pub strong: Vec<ModReference>,
    /// Built first only when present
    pub weak: Vec<ModReference>,
    pub host_version: Option<VersionReq>,
    /// Part of the requested build set, as opposed to pulled in from the
    /// installed mods
    pub building: bool,
}

impl ModNode {
    pub fn from_descriptor(descriptor: &ModDescriptor, building: bool) -> Self {
        Self {
            name: descriptor.name.clone(),
            version: descriptor.version.clone(),
            strong: descriptor.mod_references.clone(),
            weak: descriptor.weak_references.clone(),
            host_version: descriptor.host_version.clone(),
            building,
        }
    }

    /// References that are edges in a graph holding `present`
    fn edges<'a>(&'a self, present: &'a BuildGraph) -> impl Iterator<Item = &'a ModReference> + 'a {
        self.strong
            .iter()
            .chain(self.weak.iter().filter(|r| present.contains(&r.name)))
    }
}

/// Combined set of building and required installed mods
#[derive(Debug, Clone, Default)]
pub struct BuildGraph {
    nodes: Vec<ModNode>,
    index: HashMap<String, usize>,
}

impl BuildGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mod; a mod of the same name is replaced
    pub fn add_mod(&mut self, node: ModNode) {
        match self.index.get(&node.name) {
            Some(&i) => self.nodes[i] = node,
            None => {
                self.index.insert(node.name.clone(), self.nodes.len());
                self.nodes.push(node);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModNode> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn nodes(&self) -> &[ModNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every strong dependency is present
    pub fn ensure_dependencies_exist(&self) -> BuildResult<()> {
        for node in &self.nodes {
            for dep in &node.strong {
                if !self.contains(&dep.name) {
                    return Err(BuildError::missing_dependency(&dep.name, &node.name));
                }
            }
        }
        Ok(())
    }

    /// Dependency pins and host version ranges are satisfied
    pub fn ensure_versions_met(&self, host_version: Option<&Version>) -> BuildResult<()> {
        for node in &self.nodes {
            for dep in node.edges(self) {
                let Some(found) = self.get(&dep.name) else {
                    continue;
                };
                if !dep.accepts(&found.version) {
                    return Err(BuildError::VersionMismatch {
                        mod_name: node.name.clone(),
                        dependency: dep.name.clone(),
                        required: dep
                            .min_version
                            .as_ref()
                            .map(|v| format!(">={}", v))
                            .unwrap_or_default(),
                        found: found.version.to_string(),
                    });
                }
            }

            if let (Some(range), Some(host)) = (&node.host_version, host_version) {
                if !range.matches(host) {
                    return Err(BuildError::VersionMismatch {
                        mod_name: node.name.clone(),
                        dependency: "host".to_string(),
                        required: range.to_string(),
                        found: host.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Compute build order using Kahn's algorithm.
    ///
    /// Ties are broken by insertion order, so equal inputs give equal orders.
    pub fn compute_build_order(&self) -> BuildResult<Vec<String>> {
        if self.nodes.is_empty() {
            return Ok(Vec::new());
        }

        let mut in_degree = vec![0usize; self.nodes.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for (i, node) in self.nodes.iter().enumerate() {
            let mut seen = HashSet::new();
            for dep in node.edges(self) {
                if let Some(&d) = self.index.get(&dep.name) {
                    if seen.insert(d) {
                        in_degree[i] += 1;
                        dependents[d].push(i);
                    }
                }
            }
        }

        let mut queue: VecDeque<usize> = (0..self.nodes.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut result = Vec::with_capacity(self.nodes.len());

        while let Some(i) = queue.pop_front() {
            result.push(self.nodes[i].name.clone());
            for &dependent in &dependents[i] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        if result.len() != self.nodes.len() {
            return Err(BuildError::DependencyCycle(self.find_cycle()));
        }

        Ok(result)
    }

    /// Find a cycle in the graph (for error reporting)
    fn find_cycle(&self) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for node in &self.nodes {
            if let Some(cycle) = self.dfs_find_cycle(&node.name, &mut visited, &mut rec_stack, &mut path) {
                return cycle;
            }
        }

        Vec::new()
    }

    fn dfs_find_cycle(
        &self,
        name: &str,
        visited: &mut HashSet<String>,
        rec_stack: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        if rec_stack.contains(name) {
            path.push(name.to_string());
            let start = path.iter().position(|m| m == name).unwrap_or(0);
            return Some(path[start..].to_vec());
        }

        if visited.contains(name) {
            return None;
        }

        visited.insert(name.to_string());
        rec_stack.insert(name.to_string());
        path.push(name.to_string());

        if let Some(node) = self.get(name) {
            for dep in node.edges(self) {
                if self.contains(&dep.name) {
                    if let Some(cycle) = self.dfs_find_cycle(&dep.name, visited, rec_stack, path) {
                        return Some(cycle);
                    }
                }
            }
        }

        rec_stack.remove(name);
        path.pop();
        None
    }
}

/// Result of resolving a batch
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedBuild {
    /// Every mod in the combined set, dependencies first
    pub order: Vec<String>,
    /// Installed mods pulled in to satisfy the build set
    pub required_from_install: Vec<String>,
    /// Building mods in build order
    pub to_build: Vec<String>,
}

/// Completes a build set with required installed mods and orders it
#[derive(Debug, Clone, Default)]
pub struct DependencyResolver {
    host_version: Option<Version>,
}

impl DependencyResolver {
    pub fn new(host_version: Option<Version>) -> Self {
        Self { host_version }
    }

    /// Resolve `building` against `installed`.
    ///
    /// Installed mods sharing a name with a building mod are ignored. Strong
    /// references are followed transitively; weak references only from the
    /// building mods themselves.
    pub fn resolve(
        &self,
        building: &[ModDescriptor],
        installed: &[ModDescriptor],
    ) -> BuildResult<ResolvedBuild> {
        let building_names: HashSet<&str> = building.iter().map(|d| d.name.as_str()).collect();
        let installed: HashMap<&str, &ModDescriptor> = installed
            .iter()
            .filter(|d| !building_names.contains(d.name.as_str()))
            .map(|d| (d.name.as_str(), d))
            .collect();

        let mut required = Vec::new();
        let mut seen = HashSet::new();
        for descriptor in building {
            require(descriptor, true, &installed, &mut seen, &mut required);
        }

        let mut graph = BuildGraph::new();
        for descriptor in building {
            graph.add_mod(ModNode::from_descriptor(descriptor, true));
        }
        for descriptor in &required {
            graph.add_mod(ModNode::from_descriptor(descriptor, false));
        }

        graph.ensure_dependencies_exist()?;
        graph.ensure_versions_met(self.host_version.as_ref())?;
        let order = graph.compute_build_order()?;

        let to_build = order
            .iter()
            .filter(|name| graph.get(name).is_some_and(|n| n.building))
            .cloned()
            .collect();

        Ok(ResolvedBuild {
            order,
            required_from_install: required.iter().map(|d| d.name.clone()).collect(),
            to_build,
        })
    }
}

fn require<'a>(
    descriptor: &ModDescriptor,
    include_weak: bool,
    installed: &HashMap<&str, &'a ModDescriptor>,
    seen: &mut HashSet<String>,
    required: &mut Vec<&'a ModDescriptor>,
) {
    for dep in descriptor.ref_names(include_weak) {
        if let Some(&found) = installed.get(dep) {
            if seen.insert(found.name.clone()) {
                required.push(found);
                require(found, false, installed, seen, required);
            }
        }
    }
}
