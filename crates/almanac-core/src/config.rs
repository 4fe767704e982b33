use std::collections::BTreeMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::countdown::CountdownPolicy;
use crate::locale::Locale;

pub const DEFAULT_YEAR: i32 = 2025;

const DEFAULTS: [(&str, &str); 9] = [
  ("data.location", "~/.almanac"),
  ("default.command", "year"),
  ("color", "on"),
  ("calendar.year", "2025"),
  ("countdown.policy", "days"),
  ("locale", "en"),
  ("holidays", "on"),
  ("watch.clock_secs", "1"),
  ("watch.progress_secs", "60")
];

#[derive(Debug, Clone)]
pub struct Config {
  map: BTreeMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    Self {
      map:          DEFAULTS
        .iter()
        .map(|(k, v)| {
          (k.to_string(), v.to_string())
        })
        .collect(),
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let rc = resolve_rc_path(
      rc_override
    )?;
    if let Some(path) = rc {
      info!(almanacrc = %path.display(), "loading almanacrc");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no almanacrc found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.map.iter()
  }

  /// The year the calendar displays.
  pub fn target_year(
    &self
  ) -> anyhow::Result<i32> {
    match self.get("calendar.year") {
      | Some(raw) => {
        raw.trim().parse().with_context(
          || {
            format!(
              "invalid calendar.year: \
               {raw}"
            )
          }
        )
      }
      | None => Ok(DEFAULT_YEAR)
    }
  }

  pub fn countdown_policy(
    &self
  ) -> anyhow::Result<CountdownPolicy> {
    self
      .get("countdown.policy")
      .map(|raw| raw.parse())
      .unwrap_or(Ok(
        CountdownPolicy::WholeDays
      ))
  }

  pub fn locale(
    &self
  ) -> anyhow::Result<Locale> {
    self
      .get("locale")
      .map(|raw| raw.parse())
      .unwrap_or(Ok(Locale::En))
  }

  pub fn holidays(&self) -> bool {
    self
      .get_bool("holidays")
      .unwrap_or(true)
  }

  pub fn clock_interval(
    &self
  ) -> anyhow::Result<Duration> {
    self.interval("watch.clock_secs", 1)
  }

  pub fn progress_interval(
    &self
  ) -> anyhow::Result<Duration> {
    self.interval(
      "watch.progress_secs",
      60
    )
  }

  fn interval(
    &self,
    key: &str,
    default_secs: u64
  ) -> anyhow::Result<Duration> {
    let secs = match self.get(key) {
      | Some(raw) => {
        raw
          .trim()
          .parse::<u64>()
          .with_context(|| {
            format!(
              "invalid {key}: {raw}"
            )
          })?
      }
      | None => default_secs
    };
    if secs == 0 {
      return Err(anyhow!(
        "{key} must be at least 1 \
         second"
      ));
    }
    Ok(Duration::from_secs(secs))
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let mut line = raw_line.trim();
      if line.is_empty()
        || line.starts_with('#')
      {
        continue;
      }

      if let Some((before, _)) =
        line.split_once('#')
      {
        line = before.trim();
      }

      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
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

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var("ALMANACRC")
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping \
       ~/.almanacrc"
    );
    return Ok(None);
  };
  let candidate =
    home.join(".almanacrc");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(".almanac"))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}

#[cfg(test)]
mod tests {
  use std::fs;

  use tempfile::tempdir;

  use super::*;

  #[test]
  fn defaults_describe_the_2025_calendar()
  {
    let cfg = Config::default();
    assert_eq!(
      cfg
        .target_year()
        .expect("year"),
      2025
    );
    assert_eq!(
      cfg
        .countdown_policy()
        .expect("policy"),
      CountdownPolicy::WholeDays
    );
    assert_eq!(
      cfg.locale().expect("locale"),
      Locale::En
    );
    assert!(cfg.holidays());
    assert_eq!(
      cfg
        .progress_interval()
        .expect("interval"),
      Duration::from_secs(60)
    );
  }

  #[test]
  fn rc_file_includes_and_overrides() {
    let temp =
      tempdir().expect("tempdir");
    let extra = temp.path().join("extra.rc");
    fs::write(
      &extra,
      "locale = zh\n"
    )
    .expect("write include");
    let rc = temp.path().join("almanacrc");
    fs::write(
      &rc,
      "# comment\ncountdown.policy = cascade  # trailing\ninclude extra.rc\n"
    )
    .expect("write rc");

    let mut cfg = Config::load(Some(&rc))
      .expect("load rc");
    assert_eq!(cfg.loaded_files.len(), 2);
    assert_eq!(
      cfg
        .countdown_policy()
        .expect("policy"),
      CountdownPolicy::Cascade
    );
    assert_eq!(
      cfg.locale().expect("locale"),
      Locale::Zh
    );

    cfg.apply_overrides(vec![(
      "rc.calendar.year".to_string(),
      "2026".to_string()
    )]);
    assert_eq!(
      cfg
        .target_year()
        .expect("year"),
      2026
    );
  }

  #[test]
  fn rejects_bad_values() {
    let mut cfg = Config::default();
    cfg.apply_overrides(vec![
      (
        "countdown.policy".to_string(),
        "weekly".to_string()
      ),
      (
        "watch.clock_secs".to_string(),
        "0".to_string()
      )
    ]);
    assert!(
      cfg.countdown_policy().is_err()
    );
    assert!(
      cfg.clock_interval().is_err()
    );
  }

  #[test]
  fn malformed_rc_line_is_an_error() {
    let temp =
      tempdir().expect("tempdir");
    let rc = temp.path().join("almanacrc");
    fs::write(&rc, "locale zh\n")
      .expect("write rc");
    assert!(
      Config::load(Some(&rc)).is_err()
    );
  }
}
