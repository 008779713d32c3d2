// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::types::{ArtifactKind, HashStorageMode};

/// Top-level configuration as read from `Sitepipe.toml`.
///
/// ```toml
/// [paths]
/// source = "src"
/// output = "build"
///
/// [build]
/// watch_debounce_ms = 200
/// browser_targets = { chrome = "100", safari = "15" }
///
/// [task.html]
/// kind = "markup"
/// input = ["views/*.html"]
/// after = ["images"]
/// ```
///
/// All sections are optional. Without any `[task.<name>]` section the
/// built-in pipeline from [`default_pipeline`] is used.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub paths: PathsSection,

    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub build: BuildSection,

    /// All tasks from `[task.<name>]`, keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// Validated configuration. Only constructed through
/// `TryFrom<RawConfigFile>` (see `validate.rs`).
#[derive(Debug, Clone)]
pub struct ConfigFile {
    paths: PathsSection,
    server: ServerSection,
    build: BuildSection,
    task: BTreeMap<String, TaskConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        paths: PathsSection,
        server: ServerSection,
        build: BuildSection,
        task: BTreeMap<String, TaskConfig>,
    ) -> Self {
        Self {
            paths,
            server,
            build,
            task,
        }
    }

    pub fn paths(&self) -> &PathsSection {
        &self.paths
    }

    pub fn server(&self) -> &ServerSection {
        &self.server
    }

    pub fn build(&self) -> &BuildSection {
        &self.build
    }

    pub fn tasks(&self) -> &BTreeMap<String, TaskConfig> {
        &self.task
    }
}

/// `[paths]` section: logical roots of the project.
///
/// `source` and `output` are relative to the directory holding the config
/// file; `views`, `data` and `assets` are relative to `source`.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_views")]
    pub views: String,
    #[serde(default = "default_data")]
    pub data: String,
    #[serde(default = "default_assets")]
    pub assets: String,
    #[serde(default = "default_output")]
    pub output: String,
}

fn default_source() -> String {
    "src".to_string()
}

fn default_views() -> String {
    "views".to_string()
}

fn default_data() -> String {
    "data".to_string()
}

fn default_assets() -> String {
    "assets".to_string()
}

fn default_output() -> String {
    "build".to_string()
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            source: default_source(),
            views: default_views(),
            data: default_data(),
            assets: default_assets(),
            output: default_output(),
        }
    }
}

/// `[server]` section for `sitepipe serve`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Port of the live-reload WebSocket endpoint.
    #[serde(default = "default_reload_port")]
    pub reload_port: u16,
    /// Page logged as the entry URL once the server is up.
    #[serde(default = "default_start_path")]
    pub start_path: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_reload_port() -> u16 {
    35729
}

fn default_start_path() -> String {
    "/index.html".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            reload_port: default_reload_port(),
            start_path: default_start_path(),
        }
    }
}

/// `[build]` section: knobs shared by all tasks.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildSection {
    /// Minimum browser versions for the style transform, e.g.
    /// `{ chrome = "100", safari = "15.4" }`.
    #[serde(default = "default_browser_targets")]
    pub browser_targets: BTreeMap<String, String>,

    /// Quiet window before a batch of change events is dispatched.
    #[serde(default = "default_watch_debounce_ms")]
    pub watch_debounce_ms: u64,

    /// Remove the output root before the initial build.
    #[serde(default = "default_true")]
    pub clean: bool,

    /// Emit `maps/<file>.map` siblings for styles and scripts.
    #[serde(default = "default_true")]
    pub source_maps: bool,

    /// File-name prefix marking private partials. Such files are never
    /// entries of a task.
    #[serde(default = "default_private_prefix")]
    pub private_prefix: String,

    #[serde(default)]
    pub hash_storage_mode: HashStorageMode,

    /// Default for `[task.<name>].use_hash`.
    #[serde(default)]
    pub use_hash: Option<bool>,
}

fn default_browser_targets() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("chrome".to_string(), "100".to_string()),
        ("edge".to_string(), "100".to_string()),
        ("firefox".to_string(), "100".to_string()),
        ("safari".to_string(), "15".to_string()),
    ])
}

fn default_watch_debounce_ms() -> u64 {
    200
}

fn default_true() -> bool {
    true
}

fn default_private_prefix() -> String {
    "_".to_string()
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            browser_targets: default_browser_targets(),
            watch_debounce_ms: default_watch_debounce_ms(),
            clean: true,
            source_maps: true,
            private_prefix: default_private_prefix(),
            hash_storage_mode: HashStorageMode::default(),
            use_hash: None,
        }
    }
}

/// Which capability a task drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Markup,
    Styles,
    Scripts,
    Images,
    Copy,
}

impl TaskKind {
    pub fn artifact_kind(self) -> ArtifactKind {
        match self {
            TaskKind::Markup => ArtifactKind::Markup,
            TaskKind::Styles => ArtifactKind::Style,
            TaskKind::Scripts => ArtifactKind::Script,
            TaskKind::Images => ArtifactKind::Image,
            TaskKind::Copy => ArtifactKind::Static,
        }
    }

    /// Image optimization and verbatim copies skip entries whose output is
    /// already up to date.
    pub fn default_incremental(self) -> bool {
        matches!(self, TaskKind::Images | TaskKind::Copy)
    }
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    pub kind: TaskKind,

    /// Entry patterns, relative to the source root.
    pub input: Vec<String>,

    /// Extra patterns that trigger this task on change. Without them only
    /// changes to entries trigger the task.
    ///
    /// Paths matched here but not entries (partials, data files) are
    /// dependency triggers: they rebuild the entries that read them.
    #[serde(default)]
    pub watch: Option<Vec<String>>,

    /// Patterns removed from both `input` and `watch`.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Directory (relative to the source root) that entry paths are made
    /// relative to when computing output paths. Defaults to the source root.
    #[serde(default)]
    pub base: Option<String>,

    /// Output subdirectory, relative to the output root.
    #[serde(default)]
    pub output: String,

    /// Dependency list: this task waits for all tasks listed here.
    #[serde(default)]
    pub after: Vec<String>,

    /// Output file stem renames, e.g. `{ home = "index" }`.
    #[serde(default)]
    pub rename: BTreeMap<String, String>,

    /// Skip entries whose output is newer than the source.
    #[serde(default)]
    pub incremental: Option<bool>,

    /// Drop change events whose file content did not actually change.
    #[serde(default)]
    pub use_hash: Option<bool>,
}

impl TaskConfig {
    pub fn new(kind: TaskKind, input: &[&str]) -> Self {
        Self {
            kind,
            input: input.iter().map(|s| s.to_string()).collect(),
            watch: None,
            exclude: Vec::new(),
            base: None,
            output: String::new(),
            after: Vec::new(),
            rename: BTreeMap::new(),
            incremental: None,
            use_hash: None,
        }
    }

    pub fn effective_incremental(&self) -> bool {
        self.incremental
            .unwrap_or_else(|| self.kind.default_incremental())
    }

    pub fn effective_use_hash(&self, default_use_hash: bool) -> bool {
        self.use_hash.unwrap_or(default_use_hash)
    }
}

/// The pipeline used when a config declares no tasks: images, markup (after
/// images), styles, scripts, fonts and favicon.
pub fn default_pipeline(paths: &PathsSection) -> BTreeMap<String, TaskConfig> {
    let views = paths.views.trim_end_matches('/');
    let data = paths.data.trim_end_matches('/');
    let assets = paths.assets.trim_end_matches('/');

    let mut tasks = BTreeMap::new();

    let mut images = TaskConfig::new(
        TaskKind::Images,
        &[&format!("{assets}/images/**/*.{{gif,jpg,jpeg,png,svg}}")],
    );
    images.base = Some(format!("{assets}/images"));
    images.output = "images".to_string();
    tasks.insert("images".to_string(), images);

    let mut html = TaskConfig::new(TaskKind::Markup, &[&format!("{views}/*.{{html,twig}}")]);
    html.watch = Some(vec![
        format!("{views}/**/*.{{html,twig}}"),
        format!("{data}/**/*.json"),
        format!("{assets}/images/**/*.svg"),
    ]);
    html.base = Some(views.to_string());
    html.after = vec!["images".to_string()];
    html.rename = BTreeMap::from([("home".to_string(), "index".to_string())]);
    tasks.insert("html".to_string(), html);

    let mut styles = TaskConfig::new(TaskKind::Styles, &[&format!("{assets}/sass/*.scss")]);
    styles.watch = Some(vec![format!("{assets}/sass/**/*.scss")]);
    styles.base = Some(format!("{assets}/sass"));
    styles.output = "css".to_string();
    tasks.insert("styles".to_string(), styles);

    let mut scripts = TaskConfig::new(TaskKind::Scripts, &[&format!("{assets}/js/*.js")]);
    scripts.watch = Some(vec![format!("{assets}/js/**/*.js")]);
    scripts.base = Some(format!("{assets}/js"));
    scripts.output = "js".to_string();
    tasks.insert("scripts".to_string(), scripts);

    let mut fonts = TaskConfig::new(TaskKind::Copy, &[&format!("{assets}/fonts/**/*")]);
    fonts.base = Some(format!("{assets}/fonts"));
    fonts.output = "fonts".to_string();
    tasks.insert("fonts".to_string(), fonts);

    let mut favicon = TaskConfig::new(TaskKind::Copy, &[&format!("{assets}/favicon.{{ico,png}}")]);
    favicon.base = Some(assets.to_string());
    tasks.insert("favicon".to_string(), favicon);

    tasks
}
