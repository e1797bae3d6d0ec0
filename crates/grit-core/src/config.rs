use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use chrono::NaiveDate;
use tracing::{debug, info, trace, warn};

use crate::autosave::DEFAULT_DELAY;
use crate::tracker::{TOTAL_DAYS, TrackerOptions};

pub const DEFAULT_NAMESPACE: &str = "tracker";

/// Effective settings: built-in defaults, then the rc file, then overrides.
#[derive(Debug, Clone)]
pub struct Config {
    map: BTreeMap<String, String>,
    pub loaded_files: Vec<PathBuf>,
    including: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let mut map = BTreeMap::new();
        for (key, value) in [
            ("data.location", "~/.grit".to_string()),
            ("store.namespace", DEFAULT_NAMESPACE.to_string()),
            ("challenge.days", TOTAL_DAYS.to_string()),
            ("autosave.delay", DEFAULT_DELAY.as_millis().to_string()),
            ("history.prune", "off".to_string()),
            ("color", "on".to_string()),
            ("default.command", "status".to_string()),
        ] {
            map.insert(key.to_string(), value);
        }
        Self {
            map,
            loaded_files: vec![],
            including: vec![],
        }
    }
}

impl Config {
    #[tracing::instrument(skip(gritrc_override))]
    pub fn load(gritrc_override: Option<&Path>) -> anyhow::Result<Self> {
        let mut cfg = Config::default();

        if let Some(path) = resolve_gritrc_path(gritrc_override)? {
            info!(gritrc = %path.display(), "loading gritrc");
            cfg.load_file(&path)?;
        } else {
            debug!("no gritrc found; using defaults");
        }

        Ok(cfg)
    }

    /// Parses rc text directly; `include` lines resolve against `base_dir`.
    pub fn from_str_with_base(text: &str, base_dir: &Path) -> anyhow::Result<Self> {
        let mut cfg = Config::default();
        cfg.load_text(text, Path::new("<inline>"), base_dir)?;
        Ok(cfg)
    }

    #[tracing::instrument(skip(self, overrides))]
    pub fn apply_overrides<I>(&mut self, overrides: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (k, v) in overrides {
            let key = k.strip_prefix("rc.").unwrap_or(&k).to_string();
            debug!(key = %key, value = %v, "applying override");
            self.map.insert(key, v);
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn get_bool(&self, key: &str) -> anyhow::Result<Option<bool>> {
        self.map
            .get(key)
            .map(|v| parse_bool(v).ok_or_else(|| anyhow!("{key}: expected on/off, got {v}")))
            .transpose()
    }

    pub fn get_u32(&self, key: &str) -> anyhow::Result<Option<u32>> {
        self.map
            .get(key)
            .map(|v| {
                v.trim()
                    .parse::<u32>()
                    .with_context(|| format!("{key}: expected a whole number, got {v}"))
            })
            .transpose()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.map.iter()
    }

    pub fn tracker_options(&self) -> anyhow::Result<TrackerOptions> {
        let total_days = self.get_u32("challenge.days")?.unwrap_or(TOTAL_DAYS);
        if total_days == 0 {
            return Err(anyhow!("challenge.days must be at least 1"));
        }
        Ok(TrackerOptions {
            total_days,
            prune_history_on_delete: self.get_bool("history.prune")?.unwrap_or(false),
        })
    }

    pub fn autosave_delay(&self) -> anyhow::Result<Duration> {
        Ok(self
            .get_u32("autosave.delay")?
            .map(|ms| Duration::from_millis(u64::from(ms)))
            .unwrap_or(DEFAULT_DELAY))
    }

    pub fn namespace(&self) -> String {
        self.get("store.namespace")
            .map(|ns| ns.trim().to_string())
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string())
    }

    pub fn color(&self) -> anyhow::Result<bool> {
        Ok(self.get_bool("color")?.unwrap_or(true))
    }

    pub fn challenge_start(&self) -> anyhow::Result<Option<NaiveDate>> {
        self.get("challenge.start")
            .filter(|v| !v.trim().is_empty())
            .map(|v| {
                NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d")
                    .with_context(|| format!("challenge.start: expected YYYY-MM-DD, got {v}"))
            })
            .transpose()
    }

    #[tracing::instrument(skip(self))]
    fn load_file(&mut self, path: &Path) -> anyhow::Result<()> {
        let path = expand_tilde(path);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        let canonical = fs::canonicalize(&path)
            .with_context(|| format!("failed to resolve {}", path.display()))?;
        if self.including.contains(&canonical) {
            bail!("include cycle at {}", path.display());
        }

        self.loaded_files.push(path.clone());

        let base_dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        self.including.push(canonical);
        let result = self.load_text(&text, &path, &base_dir);
        self.including.pop();
        result
    }

    fn load_text(&mut self, text: &str, path: &Path, base_dir: &Path) -> anyhow::Result<()> {
        for (line_num, raw_line) in text.lines().enumerate() {
            let mut line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((before, _)) = line.split_once('#') {
                line = before.trim();
            }

            if line.is_empty() {
                continue;
            }

            if let Some(include_rest) = line.strip_prefix("include ") {
                let include_path = resolve_include_path(base_dir, include_rest.trim())?;
                debug!(
                    file = %path.display(),
                    include = %include_path.display(),
                    line = line_num + 1,
                    "processing include"
                );

                if include_path.exists() {
                    self.load_file(&include_path)?;
                } else {
                    warn!(include = %include_path.display(), "include file does not exist; skipping");
                }
                continue;
            }

            let (k, v) = line.split_once('=').ok_or_else(|| {
                anyhow!(
                    "invalid config line {}:{}: {}",
                    path.display(),
                    line_num + 1,
                    raw_line
                )
            })?;

            let key = k.trim().to_string();
            let value = v.trim().to_string();
            trace!(key = %key, value = %value, "loaded config key");
            self.map.insert(key, value);
        }

        Ok(())
    }
}

#[tracing::instrument(skip(cfg, override_dir))]
pub fn resolve_data_dir(cfg: &Config, override_dir: Option<&Path>) -> anyhow::Result<PathBuf> {
    let dir = if let Some(path) = override_dir {
        path.to_path_buf()
    } else if let Some(cfg_value) = cfg.get("data.location") {
        expand_tilde(Path::new(&cfg_value))
    } else {
        default_data_dir()?
    };

    if !dir.exists() {
        info!(dir = %dir.display(), "creating data directory");
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }

    Ok(dir)
}

#[tracing::instrument(skip(override_path))]
fn resolve_gritrc_path(override_path: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
    if let Some(path) = override_path {
        return Ok(Some(path.to_path_buf()));
    }

    if let Ok(gritrc_env) = std::env::var("GRITRC") {
        if gritrc_env == "/dev/null" {
            return Ok(None);
        }
        return Ok(Some(PathBuf::from(gritrc_env)));
    }

    let Some(home) = dirs::home_dir() else {
        warn!("cannot determine home directory; skipping ~/.gritrc");
        return Ok(None);
    };
    let candidate = home.join(".gritrc");
    if candidate.exists() {
        return Ok(Some(candidate));
    }

    Ok(None)
}

fn default_data_dir() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(home.join(".grit"))
}

fn resolve_include_path(base_dir: &Path, include: &str) -> anyhow::Result<PathBuf> {
    if include.trim().is_empty() {
        return Err(anyhow!("include path cannot be empty"));
    }

    let raw = PathBuf::from(include);
    let expanded = expand_tilde(&raw);
    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        Ok(base_dir.join(expanded))
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    if let Some(rest) = text.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    path.to_path_buf()
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "y" | "yes" | "on" | "true" => Some(true),
        "0" | "n" | "no" | "off" | "false" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_setting() {
        let cfg = Config::default();
        let options = cfg.tracker_options().expect("options");
        assert_eq!(options.total_days, 75);
        assert!(!options.prune_history_on_delete);
        assert_eq!(cfg.autosave_delay().expect("delay"), Duration::from_millis(1500));
        assert_eq!(cfg.namespace(), "tracker");
        assert!(cfg.color().expect("color"));
        assert_eq!(cfg.challenge_start().expect("start"), None);
    }

    #[test]
    fn rc_text_and_overrides() {
        let text = "\
# challenge settings
challenge.days = 30
history.prune = yes   # keep history tidy
challenge.start=2026-01-05
";
        let mut cfg = Config::from_str_with_base(text, Path::new(".")).expect("parse");
        cfg.apply_overrides([("rc.autosave.delay".to_string(), "200".to_string())]);

        let options = cfg.tracker_options().expect("options");
        assert_eq!(options.total_days, 30);
        assert!(options.prune_history_on_delete);
        assert_eq!(cfg.autosave_delay().expect("delay"), Duration::from_millis(200));
        assert_eq!(
            cfg.challenge_start().expect("start"),
            NaiveDate::from_ymd_opt(2026, 1, 5)
        );
    }

    #[test]
    fn include_directive_loads_relative_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("extra.rc"), "store.namespace = habits\n").expect("write");
        let cfg = Config::from_str_with_base("include extra.rc\n", dir.path()).expect("parse");
        assert_eq!(cfg.namespace(), "habits");
        assert_eq!(cfg.loaded_files.len(), 1);
    }

    #[test]
    fn include_cycles_are_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("loop.rc"), "include loop.rc\n").expect("write");
        let err = Config::from_str_with_base("include loop.rc\n", dir.path())
            .expect_err("self include");
        assert!(format!("{err:#}").contains("include cycle"));

        fs::write(dir.path().join("a.rc"), "color = off\ninclude b.rc\n").expect("write");
        fs::write(dir.path().join("b.rc"), "include a.rc\n").expect("write");
        assert!(Config::from_str_with_base("include a.rc\n", dir.path()).is_err());
    }

    #[test]
    fn sibling_includes_of_the_same_file_are_allowed() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("shared.rc"), "color = off\n").expect("write");
        let cfg = Config::from_str_with_base("include shared.rc\ninclude shared.rc\n", dir.path())
            .expect("parse");
        assert_eq!(cfg.loaded_files.len(), 2);
        assert!(!cfg.color().expect("color"));
    }

    #[test]
    fn malformed_values_are_errors() {
        assert!(Config::from_str_with_base("not a setting\n", Path::new(".")).is_err());

        let mut cfg = Config::default();
        cfg.apply_overrides([
            ("challenge.days".to_string(), "0".to_string()),
            ("color".to_string(), "sometimes".to_string()),
            ("challenge.start".to_string(), "05/01/2026".to_string()),
        ]);
        assert!(cfg.tracker_options().is_err());
        assert!(cfg.color().is_err());
        assert!(cfg.challenge_start().is_err());
    }
}
