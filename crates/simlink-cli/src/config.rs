//! Configuration Vault – reads/writes `~/.simlink/config.toml`.
//!
//! Every section is optional in the file; missing fields take the component
//! defaults.  A handful of run-level knobs can be overridden from the
//! environment, see [`apply_env_overrides`].

use serde::{Deserialize, Serialize};
use simlink_hal::WriterConfig;
use simlink_kernel::SafetyConfig;
use simlink_perception::FrameConfig;
use simlink_runtime::{BridgeConfig, ObjectConfig, SeederConfig, TaskKind};
use simlink_types::{BridgeError, PoseSource};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Persisted bridge configuration stored in `~/.simlink/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Task the seed trajectory is built for.
    #[serde(default)]
    pub task: TaskKind,

    /// Tracked object the task manipulates.
    #[serde(default = "default_seed_object")]
    pub seed_object: String,

    /// Controller to switch the arm to before replaying a seed.
    #[serde(default = "default_target_controller")]
    pub target_controller: String,

    /// Simulator integration step in seconds.
    #[serde(default = "default_timestep")]
    pub timestep: f64,

    #[serde(default = "default_bridge")]
    pub bridge: BridgeConfig,

    #[serde(default)]
    pub safety: SafetyConfig,

    #[serde(default)]
    pub seeder: SeederConfig,

    #[serde(default)]
    pub writer: WriterConfig,

    #[serde(default)]
    pub frame: FrameConfig,
}

fn default_seed_object() -> String {
    "cheezit".to_string()
}
fn default_target_controller() -> String {
    "effort_group_effort_controller".to_string()
}
fn default_timestep() -> f64 {
    0.004
}
fn default_bridge() -> BridgeConfig {
    BridgeConfig {
        objects: vec![ObjectConfig {
            name: default_seed_object(),
            parent_frame: "/panda_link0".to_string(),
            target_frame: "/ar_marker_3".to_string(),
        }],
        ..BridgeConfig::default()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            task: TaskKind::default(),
            seed_object: default_seed_object(),
            target_controller: default_target_controller(),
            timestep: default_timestep(),
            bridge: default_bridge(),
            safety: SafetyConfig::default(),
            seeder: SeederConfig::default(),
            writer: WriterConfig::default(),
            frame: FrameConfig::default(),
        }
    }
}

/// Return the path to `~/.simlink/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".simlink").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, BridgeError> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, BridgeError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| BridgeError::Config(format!("failed to read {}: {e}", path.display())))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| BridgeError::Config(format!("failed to parse {}: {e}", path.display())))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// The built-in defaults with the environment overrides applied.  Used when
/// the file is missing or unreadable.
pub fn defaults_with_env() -> Config {
    let mut cfg = Config::default();
    apply_env_overrides(&mut cfg);
    cfg
}

/// Apply `SIMLINK_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `SIMLINK_HORIZON` | `seeder.horizon` |
/// | `SIMLINK_POSE_SOURCE` | `bridge.pose_source` (`ground_truth` / `transform_tree`) |
/// | `SIMLINK_SWITCH_TIMEOUT_SECS` | `bridge.switch_timeout_secs` |
/// | `SIMLINK_TASK` | `task` (`reach` / `push` / `clutter_reach`) |
///
/// Unparseable values are logged and ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("SIMLINK_HORIZON") {
        match v.parse::<usize>() {
            Ok(h) => cfg.seeder.horizon = h,
            Err(_) => warn!(value = %v, "SIMLINK_HORIZON is not a step count; ignored"),
        }
    }
    if let Ok(v) = std::env::var("SIMLINK_POSE_SOURCE") {
        match v.as_str() {
            "ground_truth" => cfg.bridge.pose_source = PoseSource::GroundTruth,
            "transform_tree" => cfg.bridge.pose_source = PoseSource::TransformTree,
            _ => warn!(value = %v, "SIMLINK_POSE_SOURCE is not a pose source; ignored"),
        }
    }
    if let Ok(v) = std::env::var("SIMLINK_SWITCH_TIMEOUT_SECS") {
        match v.parse::<u64>() {
            Ok(secs) => cfg.bridge.switch_timeout_secs = secs,
            Err(_) => warn!(value = %v, "SIMLINK_SWITCH_TIMEOUT_SECS is not a number; ignored"),
        }
    }
    if let Ok(v) = std::env::var("SIMLINK_TASK") {
        match v.parse::<TaskKind>() {
            Ok(task) => cfg.task = task,
            Err(e) => warn!(error = %e, "SIMLINK_TASK ignored"),
        }
    }
}

/// Save the config to disk, creating `~/.simlink/` if necessary.
pub fn save(cfg: &Config) -> Result<(), BridgeError> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), BridgeError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| BridgeError::Config(format!("failed to create config directory: {e}")))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| BridgeError::Config(format!("failed to set config directory permissions: {e}")))?;
        }
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| BridgeError::Config(format!("failed to serialize config: {e}")))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| BridgeError::Config(format!("failed to write {}: {e}", path.display())))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| BridgeError::Config(format!("failed to write {}: {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use simlink_kernel::HaltPolicy;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.seed_object, "cheezit");
        assert_eq!(loaded.safety, SafetyConfig::default());
        assert_eq!(loaded.writer, WriterConfig::default());
        assert_eq!(loaded.frame, FrameConfig::default());
        assert_eq!(loaded.bridge.objects, cfg.bridge.objects);
        assert_eq!(loaded.seeder.gains, cfg.seeder.gains);
        assert_eq!(loaded.seeder.mapping, cfg.seeder.mapping);
    }

    #[test]
    fn partial_file_takes_component_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
seed_object = "mug"

[safety.position]
velocity_limits = [0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 0.1]
halt_policy = "zero_command"
zero_violating = false
"#,
        )
        .expect("write");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.seed_object, "mug");
        assert_eq!(loaded.safety.position.halt_policy, HaltPolicy::ZeroCommand);
        assert_eq!(loaded.safety.torque, SafetyConfig::default().torque);
        assert_eq!(loaded.writer, WriterConfig::default());
        assert_eq!(loaded.target_controller, "effort_group_effort_controller");
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "timestep = \"fast\"").expect("write");
        assert!(matches!(load_from(&path), Err(BridgeError::Config(_))));
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = std::fs::metadata(path.parent().unwrap()).expect("dir metadata").permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn config_path_points_to_simlink_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".simlink"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn apply_env_overrides_changes_horizon() {
        // SAFETY: each env test uses its own variable.
        unsafe { std::env::set_var("SIMLINK_HORIZON", "1200") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.seeder.horizon, 1200);
        unsafe { std::env::remove_var("SIMLINK_HORIZON") };
    }

    #[test]
    fn apply_env_overrides_changes_pose_source() {
        // SAFETY: each env test uses its own variable.
        unsafe { std::env::set_var("SIMLINK_POSE_SOURCE", "transform_tree") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.bridge.pose_source, PoseSource::TransformTree);
        unsafe { std::env::remove_var("SIMLINK_POSE_SOURCE") };
    }

    #[test]
    fn switch_timeout_override_ignores_garbage_and_reaches_defaults() {
        // SAFETY: each env test uses its own variable.
        unsafe { std::env::set_var("SIMLINK_SWITCH_TIMEOUT_SECS", "soon") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.bridge.switch_timeout_secs, 5);

        // The fallback defaults take the same overrides.
        unsafe { std::env::set_var("SIMLINK_SWITCH_TIMEOUT_SECS", "9") };
        let fallback = defaults_with_env();
        assert_eq!(fallback.bridge.switch_timeout_secs, 9);
        assert_eq!(fallback.seed_object, "cheezit");
        unsafe { std::env::remove_var("SIMLINK_SWITCH_TIMEOUT_SECS") };
    }

    #[test]
    fn apply_env_overrides_changes_task() {
        // SAFETY: each env test uses its own variable.
        unsafe { std::env::set_var("SIMLINK_TASK", "push") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.task, TaskKind::Push);
        unsafe { std::env::remove_var("SIMLINK_TASK") };
    }
}
