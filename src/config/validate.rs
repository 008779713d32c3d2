// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::capability::styles::parse_browser_targets;
use crate::config::model::{default_pipeline, ConfigFile, RawConfigFile};
use crate::errors::{Result, SitepipeError};
use crate::watch::patterns::build_globset;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::SitepipeError;

    fn try_from(mut raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        if raw.task.is_empty() {
            raw.task = default_pipeline(&raw.paths);
        }
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(
            raw.paths, raw.server, raw.build, raw.task,
        ))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_build_section(cfg)?;
    validate_task_patterns(cfg)?;
    validate_task_dependencies(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(SitepipeError::ConfigError(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_build_section(cfg: &RawConfigFile) -> Result<()> {
    if cfg.build.private_prefix.is_empty() {
        return Err(SitepipeError::ConfigError(
            "[build].private_prefix must not be empty".to_string(),
        ));
    }

    parse_browser_targets(&cfg.build.browser_targets)
        .map_err(|msg| SitepipeError::ConfigError(format!("[build].browser_targets: {msg}")))?;

    Ok(())
}

fn validate_task_patterns(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        if task.input.is_empty() {
            return Err(SitepipeError::ConfigError(format!(
                "task '{name}' must declare at least one `input` pattern"
            )));
        }

        for (field, patterns) in [
            ("input", task.input.as_slice()),
            ("watch", task.watch.as_deref().unwrap_or_default()),
            ("exclude", task.exclude.as_slice()),
        ] {
            build_globset(patterns).map_err(|e| {
                SitepipeError::ConfigError(format!("task '{name}' has invalid `{field}`: {e:#}"))
            })?;
        }

        for (from, to) in task.rename.iter() {
            if to.is_empty() || to.contains(['/', '\\']) {
                return Err(SitepipeError::ConfigError(format!(
                    "task '{name}' renames '{from}' to invalid file stem '{to}'"
                )));
            }
        }
    }
    Ok(())
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if dep == name {
                return Err(SitepipeError::ConfigError(format!(
                    "task '{}' cannot depend on itself in `after`",
                    name
                )));
            }
            if !cfg.task.contains_key(dep) {
                return Err(SitepipeError::TaskNotFound(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: dep -> task
    // For:
    //   [task.html]
    //   after = ["images"]
    // we add edge images -> html.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.task.keys() {
        graph.add_node(name.as_str());
    }

    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(SitepipeError::DagCycle(format!(
                "cycle detected in task DAG involving task '{}'",
                node
            )))
        }
    }
}
