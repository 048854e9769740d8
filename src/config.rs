use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use directories::BaseDirs;
use serde::de::Deserializer;
use serde::Deserialize;

const CONFIG_FILE_NAME: &str = "config.toml";
const APP_NAME: &str = "rolo";
const DEFAULT_SOURCE_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone)]
pub struct Config {
    pub config_path: PathBuf,
    pub vdir: PathBuf,
    pub phone_region: Option<String>,
    pub source_timeout: Duration,
    pub keys: Keys,
    pub ui: UiConfig,
}

/// Expand ~ to home directory in paths
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = home::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}

#[derive(Debug, Clone)]
pub struct UiConfig {
    pub colors: UiColors,
    pub pane: UiPane,
}

#[derive(Debug, Clone)]
pub struct UiColors {
    pub border: RgbColor,
    pub selection_bg: RgbColor,
    pub selection_fg: RgbColor,
    pub separator: RgbColor,
    pub status_fg: RgbColor,
    pub status_bg: RgbColor,
}

#[derive(Debug, Clone)]
pub struct UiPane {
    pub image: UiPaneImage,
}

#[derive(Debug, Clone)]
pub struct UiPaneImage {
    pub width: u16,
    pub height: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

// =============================================================================
// Key Bindings
// =============================================================================

/// Key bindings; each action accepts several keys.
#[derive(Debug, Clone)]
pub struct Keys {
    pub quit: Vec<String>,
    pub clear_search: Vec<String>,
    pub select: Vec<String>,
    pub close: Vec<String>,
    pub next: Vec<String>,
    pub prev: Vec<String>,
    pub page_down: Vec<String>,
    pub page_up: Vec<String>,
    pub dismiss: Vec<String>,
}

impl Default for Keys {
    fn default() -> Self {
        Self {
            quit: vec!["F10".into()],
            clear_search: vec!["Escape".into()],
            select: vec!["Enter".into()],
            close: vec!["Escape".into()],
            next: vec!["Down".into()],
            prev: vec!["Up".into()],
            page_down: vec!["PageDown".into()],
            page_up: vec!["PageUp".into()],
            dismiss: vec!["Enter".into(), "Escape".into()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum KeyBinding {
    Single(String),
    Multiple(Vec<String>),
}

impl KeyBinding {
    fn into_vec(self) -> Vec<String> {
        match self {
            KeyBinding::Single(s) => vec![s],
            KeyBinding::Multiple(v) => v,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct KeysFile {
    quit: KeyBinding,
    clear_search: KeyBinding,
    select: KeyBinding,
    close: KeyBinding,
    next: KeyBinding,
    prev: KeyBinding,
    page_down: KeyBinding,
    page_up: KeyBinding,
    dismiss: KeyBinding,
}

impl Default for KeysFile {
    fn default() -> Self {
        let defaults = Keys::default();
        Self {
            quit: KeyBinding::Multiple(defaults.quit),
            clear_search: KeyBinding::Multiple(defaults.clear_search),
            select: KeyBinding::Multiple(defaults.select),
            close: KeyBinding::Multiple(defaults.close),
            next: KeyBinding::Multiple(defaults.next),
            prev: KeyBinding::Multiple(defaults.prev),
            page_down: KeyBinding::Multiple(defaults.page_down),
            page_up: KeyBinding::Multiple(defaults.page_up),
            dismiss: KeyBinding::Multiple(defaults.dismiss),
        }
    }
}

impl From<KeysFile> for Keys {
    fn from(file: KeysFile) -> Self {
        Self {
            quit: file.quit.into_vec(),
            clear_search: file.clear_search.into_vec(),
            select: file.select.into_vec(),
            close: file.close.into_vec(),
            next: file.next.into_vec(),
            prev: file.prev.into_vec(),
            page_down: file.page_down.into_vec(),
            page_up: file.page_up.into_vec(),
            dismiss: file.dismiss.into_vec(),
        }
    }
}

/// Single characters keep their case ('M' is Shift+m); key names do not.
fn normalize_binding(binding: &str) -> String {
    let trimmed = binding.trim();
    if trimmed.chars().count() == 1 {
        trimmed.to_string()
    } else {
        trimmed.to_ascii_lowercase()
    }
}

fn check_context_collisions(bindings: &[(&str, &[String])], context_name: &str) -> Result<()> {
    let mut seen: HashMap<String, &str> = HashMap::new();

    for (action_name, keys) in bindings {
        for key in *keys {
            let normalized = normalize_binding(key);
            if normalized.is_empty() {
                continue;
            }
            if let Some(existing_action) = seen.get(&normalized) {
                bail!(
                    "key binding collision in {} context: '{}' is bound to both '{}' and '{}'",
                    context_name,
                    key,
                    existing_action,
                    action_name
                );
            }
            seen.insert(normalized, action_name);
        }
    }

    Ok(())
}

/// Actions active at the same time must not share a key.
fn validate_key_bindings(keys: &Keys) -> Result<()> {
    check_context_collisions(
        &[
            ("quit", &keys.quit),
            ("clear_search", &keys.clear_search),
            ("select", &keys.select),
            ("next", &keys.next),
            ("prev", &keys.prev),
            ("page_down", &keys.page_down),
            ("page_up", &keys.page_up),
        ],
        "list",
    )?;

    check_context_collisions(&[("close", &keys.close), ("quit", &keys.quit)], "panel")?;

    check_context_collisions(&[("dismiss", &keys.dismiss), ("quit", &keys.quit)], "notice")?;

    Ok(())
}

// =============================================================================
// Config file structure
// =============================================================================

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    vdir: Option<PathBuf>,
    phone_region: Option<String>,
    source_timeout_ms: Option<u64>,
    keys: KeysFile,
    ui: UiFile,
}

fn config_root() -> Result<PathBuf> {
    let base = BaseDirs::new().context("unable to determine base directories")?;
    Ok(base.config_dir().join(APP_NAME))
}

pub fn config_path() -> Result<PathBuf> {
    Ok(config_root()?.join(CONFIG_FILE_NAME))
}

/// Load from `path`, or from the default location when `None`.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => config_path()?,
    };
    if !path.exists() {
        bail!(
            "configuration file not found at {}. Create it with at least `vdir = \"...\"`.",
            path.display()
        );
    }

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read configuration file at {}", path.display()))?;
    parse(&raw, path)
}

fn parse(raw: &str, path: PathBuf) -> Result<Config> {
    let value: toml::Value = toml::from_str(raw)
        .with_context(|| format!("failed to parse {} as TOML", path.display()))?;

    for warning in unknown_keys(&value) {
        eprintln!("warning: {}", warning);
    }

    let cfg_file: ConfigFile = value
        .try_into()
        .with_context(|| format!("failed to deserialize config from {}", path.display()))?;

    let vdir = cfg_file
        .vdir
        .map(|vdir| expand_tilde(&vdir))
        .ok_or_else(|| anyhow!("`vdir` must be specified in configuration"))?;

    let phone_region = cfg_file
        .phone_region
        .as_ref()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(|value| value.to_ascii_uppercase());

    let source_timeout = match cfg_file.source_timeout_ms {
        Some(0) => bail!("`source_timeout_ms` must be greater than zero"),
        Some(ms) => Duration::from_millis(ms),
        None => Duration::from_millis(DEFAULT_SOURCE_TIMEOUT_MS),
    };

    let keys: Keys = cfg_file.keys.into();
    validate_key_bindings(&keys)?;

    Ok(Config {
        config_path: path,
        vdir,
        phone_region,
        source_timeout,
        keys,
        ui: cfg_file.ui.into(),
    })
}

// =============================================================================
// Unknown key warnings
// =============================================================================

fn unknown_keys(value: &toml::Value) -> Vec<String> {
    let mut warnings = Vec::new();
    let Some(table) = value.as_table() else {
        return warnings;
    };

    unknown_in_table(
        table,
        &["vdir", "phone_region", "source_timeout_ms", "keys", "ui"],
        "configuration key",
        &mut warnings,
    );

    if let Some(keys) = table.get("keys").and_then(|v| v.as_table()) {
        unknown_in_table(
            keys,
            &[
                "quit",
                "clear_search",
                "select",
                "close",
                "next",
                "prev",
                "page_down",
                "page_up",
                "dismiss",
            ],
            "keys entry",
            &mut warnings,
        );
    }

    if let Some(ui) = table.get("ui").and_then(|v| v.as_table()) {
        unknown_in_table(ui, &["colors", "pane"], "ui.* entry", &mut warnings);

        if let Some(colors) = ui.get("colors").and_then(|v| v.as_table()) {
            unknown_in_table(
                colors,
                &[
                    "border",
                    "selection_bg",
                    "selection_fg",
                    "separator",
                    "status_fg",
                    "status_bg",
                ],
                "ui.colors entry",
                &mut warnings,
            );
        }

        if let Some(pane) = ui.get("pane").and_then(|v| v.as_table()) {
            unknown_in_table(pane, &["image"], "ui.pane entry", &mut warnings);
            if let Some(image) = pane.get("image").and_then(|v| v.as_table()) {
                unknown_in_table(
                    image,
                    &["width", "height"],
                    "ui.pane.image entry",
                    &mut warnings,
                );
            }
        }
    }

    warnings
}

fn unknown_in_table(
    table: &toml::map::Map<String, toml::Value>,
    known: &[&str],
    what: &str,
    warnings: &mut Vec<String>,
) {
    let known: HashSet<&str> = known.iter().copied().collect();
    for key in table.keys() {
        if !known.contains(key.as_str()) {
            warnings.push(format!("unknown {} `{}`", what, key));
        }
    }
}

// =============================================================================
// UI config types
// =============================================================================

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct UiFile {
    colors: UiColorsFile,
    pane: UiPaneFile,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct UiColorsFile {
    border: RgbColor,
    selection_bg: RgbColor,
    selection_fg: RgbColor,
    separator: RgbColor,
    status_fg: RgbColor,
    status_bg: RgbColor,
}

impl Default for UiColorsFile {
    fn default() -> Self {
        Self {
            border: RgbColor::new(255, 165, 0),
            selection_bg: RgbColor::new(255, 165, 0),
            selection_fg: RgbColor::new(0, 0, 0),
            separator: RgbColor::new(255, 165, 0),
            status_fg: RgbColor::new(255, 165, 0),
            status_bg: RgbColor::new(0, 0, 0),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct UiPaneFile {
    image: UiPaneImageFile,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct UiPaneImageFile {
    width: u16,
    height: u16,
}

const DEFAULT_IMAGE_WIDTH: u16 = 24;
const DEFAULT_IMAGE_HEIGHT: u16 = 10;

impl Default for UiPaneImageFile {
    fn default() -> Self {
        Self {
            width: DEFAULT_IMAGE_WIDTH,
            height: DEFAULT_IMAGE_HEIGHT,
        }
    }
}

impl From<UiFile> for UiConfig {
    fn from(file: UiFile) -> Self {
        let width = match file.pane.image.width {
            0 => DEFAULT_IMAGE_WIDTH,
            w => w,
        };
        let height = match file.pane.image.height {
            0 => DEFAULT_IMAGE_HEIGHT,
            h => h,
        };
        Self {
            colors: UiColors {
                border: file.colors.border,
                selection_bg: file.colors.selection_bg,
                selection_fg: file.colors.selection_fg,
                separator: file.colors.separator,
                status_fg: file.colors.status_fg,
                status_bg: file.colors.status_bg,
            },
            pane: UiPane {
                image: UiPaneImage { width, height },
            },
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        UiFile::default().into()
    }
}

impl RgbColor {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl<'de> serde::Deserialize<'de> for RgbColor {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Helper {
            Array([u8; 3]),
            Map { r: u8, g: u8, b: u8 },
        }

        let helper = Helper::deserialize(deserializer)?;
        let (r, g, b) = match helper {
            Helper::Array(values) => (values[0], values[1], values[2]),
            Helper::Map { r, g, b } => (r, g, b),
        };
        Ok(RgbColor { r, g, b })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(raw: &str) -> Result<Config> {
        parse(raw, PathBuf::from("config.toml"))
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_str("vdir = \"/tmp/contacts\"").unwrap();
        assert_eq!(config.vdir, PathBuf::from("/tmp/contacts"));
        assert_eq!(config.phone_region, None);
        assert_eq!(config.source_timeout, Duration::from_millis(5_000));
        assert_eq!(config.keys.quit, vec!["F10"]);
        assert_eq!(config.keys.dismiss, vec!["Enter", "Escape"]);
        assert_eq!(config.ui.pane.image.width, 24);
        assert_eq!(config.ui.colors.selection_fg, RgbColor::new(0, 0, 0));
    }

    #[test]
    fn test_vdir_is_required() {
        let err = parse_str("phone_region = \"BR\"").unwrap_err();
        assert!(err.to_string().contains("vdir"));
    }

    #[test]
    fn test_vdir_tilde_is_expanded() {
        let config = parse_str("vdir = \"~/contacts\"").unwrap();
        if let Some(home) = home::home_dir() {
            assert_eq!(config.vdir, home.join("contacts"));
        }
    }

    #[test]
    fn test_phone_region_is_normalized() {
        let config = parse_str("vdir = \"/c\"\nphone_region = \" br \"").unwrap();
        assert_eq!(config.phone_region.as_deref(), Some("BR"));

        let config = parse_str("vdir = \"/c\"\nphone_region = \"  \"").unwrap();
        assert_eq!(config.phone_region, None);
    }

    #[test]
    fn test_source_timeout() {
        let config = parse_str("vdir = \"/c\"\nsource_timeout_ms = 250").unwrap();
        assert_eq!(config.source_timeout, Duration::from_millis(250));
        assert!(parse_str("vdir = \"/c\"\nsource_timeout_ms = 0").is_err());
    }

    #[test]
    fn test_key_binding_single_or_list() {
        let config = parse_str(
            r#"
vdir = "/c"
[keys]
quit = "F12"
next = ["Down", "Tab"]
"#,
        )
        .unwrap();
        assert_eq!(config.keys.quit, vec!["F12"]);
        assert_eq!(config.keys.next, vec!["Down", "Tab"]);
        assert_eq!(config.keys.select, vec!["Enter"]);
    }

    #[test]
    fn test_collision_in_list_context_is_rejected() {
        let err = parse_str(
            r#"
vdir = "/c"
[keys]
select = ["Enter"]
next = ["enter"]
"#,
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("list"), "{message}");
        assert!(message.contains("select") && message.contains("next"));
    }

    #[test]
    fn test_same_key_in_different_contexts_is_allowed() {
        // Escape clears the search in the list and closes the panel.
        let config = parse_str("vdir = \"/c\"").unwrap();
        assert_eq!(config.keys.clear_search, config.keys.close);
    }

    #[test]
    fn test_single_char_bindings_are_case_sensitive() {
        assert!(check_context_collisions(
            &[("a", &["m".to_string()]), ("b", &["M".to_string()])],
            "test"
        )
        .is_ok());
        assert!(check_context_collisions(
            &[("a", &["PageUp".to_string()]), ("b", &["pageup".to_string()])],
            "test"
        )
        .is_err());
    }

    #[test]
    fn test_unknown_keys_are_reported() {
        let value: toml::Value = toml::from_str(
            r#"
vdir = "/c"
colour = "red"
[keys]
jump = "J"
[ui.colors]
accent = [1, 2, 3]
[ui.pane.image]
depth = 3
"#,
        )
        .unwrap();
        let warnings = unknown_keys(&value);
        assert_eq!(warnings.len(), 4, "{warnings:?}");
        assert!(warnings.contains(&"unknown configuration key `colour`".to_string()));
        assert!(warnings.contains(&"unknown keys entry `jump`".to_string()));
        assert!(warnings.contains(&"unknown ui.colors entry `accent`".to_string()));
        assert!(warnings.contains(&"unknown ui.pane.image entry `depth`".to_string()));
    }

    #[test]
    fn test_colors_accept_array_or_map() {
        let config = parse_str(
            r#"
vdir = "/c"
[ui.colors]
border = [1, 2, 3]
separator = { r = 4, g = 5, b = 6 }
"#,
        )
        .unwrap();
        assert_eq!(config.ui.colors.border, RgbColor::new(1, 2, 3));
        assert_eq!(config.ui.colors.separator, RgbColor::new(4, 5, 6));
    }

    #[test]
    fn test_load_reads_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rolo.toml");
        fs::write(&path, "vdir = \"/c\"\n").unwrap();
        let config = load(Some(&path)).unwrap();
        assert_eq!(config.config_path, path);

        let missing = dir.path().join("missing.toml");
        assert!(load(Some(&missing)).is_err());
    }
}
