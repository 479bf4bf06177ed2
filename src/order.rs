use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    #[error("duplicate module id: {id}")]
    DuplicateId { id: String },
    #[error("dependency cycle: {}", members.join(" -> "))]
    CyclicDependency { members: Vec<String> },
    #[error("index {index} out of range for {len} mods")]
    IndexOutOfRange { index: usize, len: usize },
}

#[derive(Debug, Clone)]
pub struct ModEntry {
    pub id: String,
    pub name: String,
    pub version: String,
    pub dependencies: Vec<String>,
    pub incompatible: Vec<String>,
    pub official: bool,
    pub enabled: bool,
    pub has_conflicts: bool,
}

impl ModEntry {
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub id: String,
    pub enabled: bool,
}

/// Persisted form of the load order. Only ids and enabled flags survive a
/// session; everything else is rediscovered from the module manifests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub entries: Vec<SnapshotEntry>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SortReport {
    pub moved: usize,
    pub total: usize,
}

/// The load order. Owns the entry list; every mutation goes through one of
/// the methods below and leaves the conflict flags recomputed.
#[derive(Debug, Clone, Default)]
pub struct ModOrder {
    entries: Vec<ModEntry>,
}

impl ModOrder {
    pub fn load(entries: Vec<ModEntry>) -> Result<Self, OrderError> {
        let mut seen: HashSet<&str> = HashSet::new();
        for entry in &entries {
            if !seen.insert(entry.id.as_str()) {
                return Err(OrderError::DuplicateId {
                    id: entry.id.clone(),
                });
            }
        }
        let mut order = ModOrder { entries };
        order.validate();
        Ok(order)
    }

    pub fn entries(&self) -> &[ModEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ModEntry> {
        self.entries.get(index)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id == id)
    }

    pub fn move_up(&mut self, index: usize) -> Result<(), OrderError> {
        self.check_index(index)?;
        if index == 0 {
            return Ok(());
        }
        self.entries.swap(index, index - 1);
        self.validate();
        Ok(())
    }

    pub fn move_down(&mut self, index: usize) -> Result<(), OrderError> {
        self.check_index(index)?;
        if index + 1 == self.entries.len() {
            return Ok(());
        }
        self.entries.swap(index, index + 1);
        self.validate();
        Ok(())
    }

    pub fn move_to_top(&mut self, index: usize) -> Result<(), OrderError> {
        self.check_index(index)?;
        let entry = self.entries.remove(index);
        self.entries.insert(0, entry);
        self.validate();
        Ok(())
    }

    pub fn move_to_bottom(&mut self, index: usize) -> Result<(), OrderError> {
        self.check_index(index)?;
        let entry = self.entries.remove(index);
        self.entries.push(entry);
        self.validate();
        Ok(())
    }

    pub fn insert(&mut self, index: usize, entry: ModEntry) -> Result<(), OrderError> {
        if index > self.entries.len() {
            return Err(OrderError::IndexOutOfRange {
                index,
                len: self.entries.len(),
            });
        }
        if self.position(&entry.id).is_some() {
            return Err(OrderError::DuplicateId { id: entry.id });
        }
        self.entries.insert(index, entry);
        self.validate();
        Ok(())
    }

    pub fn remove_by_id(&mut self, id: &str) -> Option<ModEntry> {
        let index = self.position(id)?;
        let entry = self.entries.remove(index);
        self.validate();
        Some(entry)
    }

    pub fn alpha_sort(&mut self) {
        self.entries.sort_by(|a, b| {
            a.display_name()
                .to_ascii_lowercase()
                .cmp(&b.display_name().to_ascii_lowercase())
        });
        self.validate();
    }

    pub fn reverse_order(&mut self) {
        self.entries.reverse();
        self.validate();
    }

    pub fn check_all(&mut self) {
        for entry in &mut self.entries {
            entry.enabled = true;
        }
        self.validate();
    }

    pub fn uncheck_all(&mut self) {
        for entry in &mut self.entries {
            entry.enabled = false;
        }
        self.validate();
    }

    pub fn invert_check(&mut self) {
        for entry in &mut self.entries {
            entry.enabled = !entry.enabled;
        }
        self.validate();
    }

    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        self.entries[index].enabled = enabled;
        self.validate();
        true
    }

    /// Reorders so that every enabled mod loads after its enabled
    /// dependencies. Ties among ready mods break by current position, so an
    /// already-valid order comes back unchanged. On a cycle the list is left
    /// untouched and the cycle members are reported in the error.
    pub fn topological_sort(&mut self) -> Result<SortReport, OrderError> {
        let total = self.entries.len();
        let index_by_id: HashMap<&str, usize> = self
            .entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (entry.id.as_str(), index))
            .collect();

        let mut blockers: Vec<Vec<usize>> = vec![Vec::new(); total];
        for (index, entry) in self.entries.iter().enumerate() {
            if !entry.enabled {
                continue;
            }
            for dep in &entry.dependencies {
                if let Some(&dep_index) = index_by_id.get(dep.as_str()) {
                    if self.entries[dep_index].enabled {
                        blockers[index].push(dep_index);
                    }
                }
            }
        }

        let mut emitted = vec![false; total];
        let mut order = Vec::with_capacity(total);
        while order.len() < total {
            let ready = (0..total).find(|&index| {
                !emitted[index] && blockers[index].iter().all(|&dep| emitted[dep])
            });
            match ready {
                Some(index) => {
                    emitted[index] = true;
                    order.push(index);
                }
                None => {
                    return Err(OrderError::CyclicDependency {
                        members: cycle_members(&self.entries, &blockers, &emitted),
                    });
                }
            }
        }

        let moved = order
            .iter()
            .enumerate()
            .filter(|&(position, &index)| position != index)
            .count();

        let mut slots: Vec<Option<ModEntry>> = self.entries.drain(..).map(Some).collect();
        for index in order {
            if let Some(entry) = slots[index].take() {
                self.entries.push(entry);
            }
        }
        self.validate();
        Ok(SortReport { moved, total })
    }

    /// Recomputes every conflict flag from the current order and enabled
    /// set. An enabled mod is flagged when a dependency is missing, disabled,
    /// or loads after it, or when an incompatible mod is also enabled.
    pub fn validate(&mut self) {
        let index_by_id: HashMap<&str, usize> = self
            .entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (entry.id.as_str(), index))
            .collect();

        let mut flags = vec![false; self.entries.len()];
        for (index, entry) in self.entries.iter().enumerate() {
            if !entry.enabled {
                continue;
            }
            let mut conflict = false;
            for dep in &entry.dependencies {
                match index_by_id.get(dep.as_str()) {
                    Some(&dep_index) => {
                        if !self.entries[dep_index].enabled || dep_index >= index {
                            conflict = true;
                        }
                    }
                    None => conflict = true,
                }
            }
            for rival in &entry.incompatible {
                if let Some(&rival_index) = index_by_id.get(rival.as_str()) {
                    if rival_index != index && self.entries[rival_index].enabled {
                        conflict = true;
                    }
                }
            }
            flags[index] = conflict;
        }

        for (entry, flag) in self.entries.iter_mut().zip(flags) {
            entry.has_conflicts = flag;
        }
    }

    pub fn has_conflicts(&self) -> bool {
        self.entries.iter().any(|entry| entry.has_conflicts)
    }

    pub fn snapshot(&self) -> OrderSnapshot {
        OrderSnapshot {
            entries: self
                .entries
                .iter()
                .map(|entry| SnapshotEntry {
                    id: entry.id.clone(),
                    enabled: entry.enabled,
                })
                .collect(),
        }
    }

    /// Restores a saved order: saved ids missing from the current scan are
    /// dropped, newly discovered mods keep their place at the end with their
    /// scan defaults, and enabled flags follow the snapshot for known ids.
    pub fn apply_snapshot(&mut self, snapshot: &OrderSnapshot) {
        let mut remaining: Vec<ModEntry> = self.entries.drain(..).collect();
        let mut merged = Vec::with_capacity(remaining.len());
        for saved in &snapshot.entries {
            if let Some(position) = remaining.iter().position(|entry| entry.id == saved.id) {
                let mut entry = remaining.remove(position);
                entry.enabled = saved.enabled;
                merged.push(entry);
            }
        }
        merged.append(&mut remaining);
        self.entries = merged;
        self.validate();
    }

    fn check_index(&self, index: usize) -> Result<(), OrderError> {
        if index >= self.entries.len() {
            return Err(OrderError::IndexOutOfRange {
                index,
                len: self.entries.len(),
            });
        }
        Ok(())
    }
}

fn cycle_members(entries: &[ModEntry], blockers: &[Vec<usize>], emitted: &[bool]) -> Vec<String> {
    let Some(start) = (0..entries.len()).find(|&index| !emitted[index]) else {
        return Vec::new();
    };

    // Every stuck entry has at least one stuck blocker, so walking blocker
    // edges must revisit a node; the slice from the first visit is the cycle.
    let mut path = Vec::new();
    let mut visited_at: HashMap<usize, usize> = HashMap::new();
    let mut current = start;
    loop {
        if let Some(&position) = visited_at.get(&current) {
            return path[position..]
                .iter()
                .map(|&index: &usize| entries[index].id.clone())
                .collect();
        }
        visited_at.insert(current, path.len());
        path.push(current);
        match blockers[current]
            .iter()
            .copied()
            .find(|&dep| !emitted[dep])
        {
            Some(dep) => current = dep,
            None => {
                return path
                    .iter()
                    .map(|&index| entries[index].id.clone())
                    .collect();
            }
        }
    }
}
