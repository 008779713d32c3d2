#![allow(dead_code)]

use sitepipe::config::{ConfigFile, RawConfigFile, TaskConfig, TaskKind};
use sitepipe::errors::Result;
use sitepipe::types::HashStorageMode;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.config.paths.source = source.to_string();
        self
    }

    pub fn with_output(mut self, output: &str) -> Self {
        self.config.paths.output = output.to_string();
        self
    }

    pub fn with_private_prefix(mut self, prefix: &str) -> Self {
        self.config.build.private_prefix = prefix.to_string();
        self
    }

    pub fn with_browser_target(mut self, browser: &str, version: &str) -> Self {
        self.config
            .build
            .browser_targets
            .insert(browser.to_string(), version.to_string());
        self
    }

    pub fn with_default_use_hash(mut self, val: bool) -> Self {
        self.config.build.use_hash = Some(val);
        self
    }

    pub fn with_hash_storage(mut self, mode: HashStorageMode) -> Self {
        self.config.build.hash_storage_mode = mode;
        self
    }

    pub fn without_source_maps(mut self) -> Self {
        self.config.build.source_maps = false;
        self
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(kind: TaskKind, input: &str) -> Self {
        Self {
            task: TaskConfig::new(kind, &[input]),
        }
    }

    pub fn input(mut self, pattern: &str) -> Self {
        self.task.input.push(pattern.to_string());
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn watch(mut self, pattern: &str) -> Self {
        let watches = self.task.watch.get_or_insert(vec![]);
        watches.push(pattern.to_string());
        self
    }

    pub fn exclude(mut self, pattern: &str) -> Self {
        self.task.exclude.push(pattern.to_string());
        self
    }

    pub fn base(mut self, base: &str) -> Self {
        self.task.base = Some(base.to_string());
        self
    }

    pub fn output(mut self, output: &str) -> Self {
        self.task.output = output.to_string();
        self
    }

    pub fn rename(mut self, from: &str, to: &str) -> Self {
        self.task.rename.insert(from.to_string(), to.to_string());
        self
    }

    pub fn incremental(mut self, val: bool) -> Self {
        self.task.incremental = Some(val);
        self
    }

    pub fn use_hash(mut self, val: bool) -> Self {
        self.task.use_hash = Some(val);
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
