//! Container-identity lookups for process ids.

use std::collections::{BTreeSet, HashMap};

use crate::Pid;

/// Resolves the container a process runs in.
///
/// Implementations may cache lookups; the merger calls [`reset_cache`]
/// exactly once per pass, after every lookup and after the header has read
/// [`container_names`].
///
/// [`reset_cache`]: ContainerNames::reset_cache
/// [`container_names`]: ContainerNames::container_names
pub trait ContainerNames {
    /// Container name for `pid`, empty when it is not containerized.
    fn get_container_name(&mut self, pid: Pid) -> String;

    /// Non-empty names resolved since the last reset.
    fn container_names(&self) -> Vec<String>;

    fn reset_cache(&mut self);
}

/// Fixed pid-to-name table.
#[derive(Debug, Clone, Default)]
pub struct StaticContainerNames {
    by_pid: HashMap<Pid, String>,
    resolved: BTreeSet<String>,
}

impl StaticContainerNames {
    pub fn new(by_pid: HashMap<Pid, String>) -> Self {
        Self { by_pid, resolved: BTreeSet::new() }
    }
}

impl ContainerNames for StaticContainerNames {
    fn get_container_name(&mut self, pid: Pid) -> String {
        let name = self.by_pid.get(&pid).cloned().unwrap_or_default();
        if !name.is_empty() {
            self.resolved.insert(name.clone());
        }
        name
    }

    fn container_names(&self) -> Vec<String> {
        self.resolved.iter().cloned().collect()
    }

    fn reset_cache(&mut self) {
        self.resolved.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_names_track_resolved_until_reset() {
        let mut names = StaticContainerNames::new(HashMap::from([(1, "web".to_string()), (2, "db".to_string())]));
        assert_eq!(names.get_container_name(1), "web");
        assert_eq!(names.get_container_name(3), "");
        assert_eq!(names.container_names(), vec!["web".to_string()]);
        names.reset_cache();
        assert!(names.container_names().is_empty());
    }
}
