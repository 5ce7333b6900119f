//! Topology snapshots keyed by simulation cycle.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use color_eyre::eyre::{eyre, Context, Result};
use rayon::prelude::*;

use super::graph::Topology;
use crate::error::AnalysisError;
use crate::gml_parser::{parse_gml_file, validate_topology};

/// All snapshots of one run, ordered by cycle
#[derive(Debug, Clone, Default)]
pub struct TopologySet {
    snapshots: BTreeMap<u64, Topology>,
}

impl TopologySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a snapshot, replacing any earlier one for the same cycle
    pub fn insert(&mut self, topology: Topology) {
        let cycle = topology.cycle();
        if self.snapshots.insert(cycle, topology).is_some() {
            log::warn!("Replacing duplicate topology snapshot for cycle {}", cycle);
        }
    }

    /// Load a single GML file, or every `*.gml` file in a directory
    pub fn load(path: &Path) -> Result<Self> {
        let files = if path.is_dir() {
            gml_files_in(path)?
        } else {
            vec![path.to_path_buf()]
        };
        if files.is_empty() {
            return Err(eyre!("No .gml files found in {}", path.display()));
        }

        let topologies = files
            .par_iter()
            .map(|file| load_snapshot(file))
            .collect::<Result<Vec<_>>>()?;

        let mut set = TopologySet::new();
        for topology in topologies {
            set.insert(topology);
        }
        log::info!(
            "Loaded {} topology snapshot(s) from {}",
            set.len(),
            path.display()
        );
        Ok(set)
    }

    /// Snapshot in effect at `cycle`: the latest one taken at or before it,
    /// falling back to the earliest snapshot for messages that predate all of them.
    pub fn closest(&self, cycle: u64) -> Result<&Topology, AnalysisError> {
        self.snapshots
            .range(..=cycle)
            .next_back()
            .or_else(|| self.snapshots.iter().next())
            .map(|(_, topology)| topology)
            .ok_or(AnalysisError::MissingTopology { cycle })
    }

    pub fn get(&self, cycle: u64) -> Option<&Topology> {
        self.snapshots.get(&cycle)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Topology> {
        self.snapshots.values()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

fn gml_files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read topology directory {}", dir.display()))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "gml") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn load_snapshot(path: &Path) -> Result<Topology> {
    let graph = parse_gml_file(path)?;
    validate_topology(&graph)
        .map_err(|e| eyre!("Invalid topology {}: {}", path.display(), e))?;
    let topology = Topology::from_gml(&graph)
        .with_context(|| format!("Failed to build topology from {}", path.display()))?;
    log::debug!(
        "Snapshot {}: cycle {}, {} nodes, {} edges",
        path.display(),
        topology.cycle(),
        topology.node_count(),
        topology.edge_count()
    );
    Ok(topology)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn snapshot(cycle: u64) -> Topology {
        let mut topology = Topology::new(cycle);
        topology.add_node(0, 0.0, false);
        topology
    }

    #[test]
    fn test_closest_picks_latest_preceding_cycle() {
        let mut set = TopologySet::new();
        set.insert(snapshot(10));
        set.insert(snapshot(20));
        set.insert(snapshot(30));

        assert_eq!(set.closest(25).unwrap().cycle(), 20);
        assert_eq!(set.closest(30).unwrap().cycle(), 30);
        assert_eq!(set.closest(99).unwrap().cycle(), 30);
        assert_eq!(set.closest(3).unwrap().cycle(), 10);
    }

    #[test]
    fn test_closest_on_empty_set() {
        let set = TopologySet::new();
        assert_eq!(
            set.closest(4).unwrap_err(),
            AnalysisError::MissingTopology { cycle: 4 }
        );
    }

    #[test]
    fn test_load_directory() {
        let dir = tempfile::tempdir().unwrap();
        for cycle in [0, 5] {
            let mut file = fs::File::create(dir.path().join(format!("topology_{}.gml", cycle))).unwrap();
            write!(
                file,
                "graph [ cycle {} node [ id 0 location 0.1 adversary 0 ] node [ id 1 location 0.2 adversary 1 ] edge [ source 0 target 1 ] ]",
                cycle
            )
            .unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let set = TopologySet::load(dir.path()).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.closest(7).unwrap().cycle(), 5);
        assert_eq!(set.get(0).unwrap().adversary_count(), 1);
    }

    #[test]
    fn test_load_rejects_dangling_edge() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "graph [ node [ id 0 location 0.1 ] edge [ source 0 target 9 ] ]"
        )
        .unwrap();
        assert!(TopologySet::load(file.path()).is_err());
    }
}
