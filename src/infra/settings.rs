//! Usage: Persisted platform settings (schema + read/write helpers + test profile).

use crate::infra::app_paths;
use crate::shared::error::AppResult;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{OnceLock, RwLock};
use std::time::{Duration, Instant};

pub const SCHEMA_VERSION: u32 = 3;
const SCHEMA_VERSION_ADD_BLOCK_STRUCTURES: u32 = 2;
const SCHEMA_VERSION_ADD_LOG_DIRECTIVES: u32 = 3;
pub const DEFAULT_GATEWAY_PORT: u16 = 8000;
pub const MAX_GATEWAY_PORT: u16 = 8079;
const DEFAULT_LOG_RETENTION_DAYS: u32 = 30;
const DEFAULT_LMS_ROOT_URL: &str = "http://localhost:8000";
const DEFAULT_DASHBOARD_PATH: &str = "/dashboard";
const DEFAULT_SECRET_KEY: &str = "campus-hub-insecure-dev-key";
const BROWSER_TEST_SECRET_KEY: &str = "very_secret_browser_test_key";
const BROWSER_TEST_CATALOG_STUB_URL: &str = "http://localhost:8043/api/v1";
pub const DEFAULT_TASK_MAX_RETRIES: u32 = 5;
pub const DEFAULT_COURSE_PUBLISH_TASK_DELAY_SECONDS: u32 = 30;
pub const DEFAULT_TASK_RETRY_DELAY_SECONDS: u32 = 30;
const MAX_TASK_MAX_RETRIES: u32 = 10;
const MAX_TASK_DELAY_SECONDS: u32 = 60 * 60;
const CACHE_TTL: Duration = Duration::from_secs(5);

static LOG_RETENTION_DAYS_FAIL_OPEN_WARNED: AtomicBool = AtomicBool::new(false);

#[derive(Clone)]
struct CachedSettings {
    path: PathBuf,
    data: AppSettings,
    last_updated: Instant,
}

static SETTINGS_CACHE: OnceLock<RwLock<Option<CachedSettings>>> = OnceLock::new();

/// Named platform feature toggles, mirrored into the browser-test profile.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureToggles {
    pub milestones_app: bool,
    pub enable_course_discovery: bool,
    pub enable_student_notes: bool,
    pub enable_teams: bool,
    pub enable_special_exams: bool,
    pub automatic_auth_for_testing: bool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            milestones_app: false,
            enable_course_discovery: false,
            enable_student_notes: false,
            enable_teams: false,
            enable_special_exams: false,
            automatic_auth_for_testing: false,
        }
    }
}

/// Queue-tuning knobs for the block structure subsystem's background tasks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockStructuresSettings {
    pub task_max_retries: u32,
    pub course_publish_task_delay_seconds: u32,
    pub task_default_retry_delay_seconds: u32,
}

impl Default for BlockStructuresSettings {
    fn default() -> Self {
        Self {
            task_max_retries: DEFAULT_TASK_MAX_RETRIES,
            course_publish_task_delay_seconds: DEFAULT_COURSE_PUBLISH_TASK_DELAY_SECONDS,
            task_default_retry_delay_seconds: DEFAULT_TASK_RETRY_DELAY_SECONDS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub schema_version: u32,
    pub preferred_port: u16,
    // Public origin of this platform instance; redirects and SAML URLs derive from it.
    pub lms_root_url: String,
    // Path (under lms_root_url) users land on after login when no `next` is given.
    pub dashboard_path: String,
    pub secret_key: String,
    pub debug: bool,
    pub log_retention_days: u32,
    // Extra tracing env-filter directives appended to the base filter.
    pub log_directives: Vec<String>,
    pub features: FeatureToggles,
    pub block_structures: BlockStructuresSettings,
    // Test isolation: when set, the cache-programs command fetches from this URL
    // instead of the configured catalog integration row.
    pub catalog_api_url_override: Option<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            preferred_port: DEFAULT_GATEWAY_PORT,
            lms_root_url: DEFAULT_LMS_ROOT_URL.to_string(),
            dashboard_path: DEFAULT_DASHBOARD_PATH.to_string(),
            secret_key: DEFAULT_SECRET_KEY.to_string(),
            debug: false,
            log_retention_days: DEFAULT_LOG_RETENTION_DAYS,
            log_directives: Vec::new(),
            features: FeatureToggles::default(),
            block_structures: BlockStructuresSettings::default(),
            catalog_api_url_override: None,
        }
    }
}

impl AppSettings {
    pub fn dashboard_url(&self) -> String {
        let root = self.lms_root_url.trim_end_matches('/');
        let path = if self.dashboard_path.starts_with('/') {
            self.dashboard_path.clone()
        } else {
            format!("/{}", self.dashboard_path)
        };
        format!("{root}{path}")
    }
}

/// Apply the browser-test profile on top of the given settings.
///
/// The profile used when driving the platform from browser tests: debug on,
/// a fixed well-known secret key, eager task mode for the block structure
/// subsystem (retries and delays zeroed; tasks run synchronously so retrying
/// makes no sense), every test-relevant feature switched on, the catalog API
/// pointed at the localhost stub, and quieter log output for noisy modules.
pub fn browser_test_overrides(settings: &mut AppSettings) {
    settings.debug = true;
    settings.secret_key = BROWSER_TEST_SECRET_KEY.to_string();

    settings.block_structures.task_max_retries = 0;
    settings.block_structures.course_publish_task_delay_seconds = 0;
    settings.block_structures.task_default_retry_delay_seconds = 0;

    settings.features.milestones_app = true;
    settings.features.enable_course_discovery = true;
    settings.features.enable_student_notes = true;
    settings.features.enable_teams = true;
    settings.features.enable_special_exams = true;
    settings.features.automatic_auth_for_testing = true;

    settings.catalog_api_url_override = Some(BROWSER_TEST_CATALOG_STUB_URL.to_string());

    for directive in ["hyper=warn", "reqwest=warn"] {
        if !settings.log_directives.iter().any(|d| d == directive) {
            settings.log_directives.push(directive.to_string());
        }
    }
}

fn sanitize_block_structures(settings: &mut AppSettings) -> bool {
    let mut changed = false;

    if settings.block_structures.task_max_retries > MAX_TASK_MAX_RETRIES {
        settings.block_structures.task_max_retries = MAX_TASK_MAX_RETRIES;
        changed = true;
    }
    if settings.block_structures.course_publish_task_delay_seconds > MAX_TASK_DELAY_SECONDS {
        settings.block_structures.course_publish_task_delay_seconds = MAX_TASK_DELAY_SECONDS;
        changed = true;
    }
    if settings.block_structures.task_default_retry_delay_seconds > MAX_TASK_DELAY_SECONDS {
        settings.block_structures.task_default_retry_delay_seconds = MAX_TASK_DELAY_SECONDS;
        changed = true;
    }

    changed
}

fn sanitize_lms_root_url(settings: &mut AppSettings) -> bool {
    let trimmed = settings
        .lms_root_url
        .trim()
        .trim_end_matches('/')
        .to_string();
    if trimmed != settings.lms_root_url {
        settings.lms_root_url = trimmed;
        return true;
    }
    false
}

/// Generic schema migration helper for versions that only bump `schema_version`.
///
/// Returns `true` if the settings were modified (i.e. migration was applied).
fn migrate_bump_schema_version(
    settings: &mut AppSettings,
    schema_version_present: bool,
    target_version: u32,
) -> bool {
    if schema_version_present && settings.schema_version >= target_version {
        return false;
    }

    let mut changed = false;

    // If schema_version is missing, force a write to persist schema_version so we don't keep
    // "migrating" on every startup.
    if !schema_version_present {
        changed = true;
    }

    if settings.schema_version != target_version {
        settings.schema_version = target_version;
        changed = true;
    }

    changed
}

fn migrate_add_block_structures(settings: &mut AppSettings, schema_version_present: bool) -> bool {
    // v2: Add block structure task tuning knobs (serde fills defaults).
    migrate_bump_schema_version(
        settings,
        schema_version_present,
        SCHEMA_VERSION_ADD_BLOCK_STRUCTURES,
    )
}

fn migrate_add_log_directives(settings: &mut AppSettings, schema_version_present: bool) -> bool {
    // v3: Add extra tracing directives (default empty).
    migrate_bump_schema_version(
        settings,
        schema_version_present,
        SCHEMA_VERSION_ADD_LOG_DIRECTIVES,
    )
}

pub fn settings_path() -> AppResult<PathBuf> {
    Ok(app_paths::app_data_dir()?.join("settings.json"))
}

fn parse_settings_json(content: &str) -> AppResult<(AppSettings, bool)> {
    let raw: serde_json::Value =
        serde_json::from_str(content).map_err(|e| format!("failed to parse settings.json: {e}"))?;
    let schema_version_present = raw.get("schema_version").is_some();
    let settings: AppSettings =
        serde_json::from_value(raw).map_err(|e| format!("failed to parse settings.json: {e}"))?;
    Ok((settings, schema_version_present))
}

fn validate(settings: &AppSettings) -> AppResult<()> {
    if settings.preferred_port < 1024 {
        return Err("SEC_INVALID_INPUT: preferred_port must be between 1024 and 65535".into());
    }
    if settings.log_retention_days == 0 {
        return Err("SEC_INVALID_INPUT: log_retention_days must be >= 1".into());
    }
    if settings.secret_key.trim().is_empty() {
        return Err("SEC_INVALID_INPUT: secret_key must not be empty".into());
    }
    if settings.lms_root_url.trim().is_empty() {
        return Err("SEC_INVALID_INPUT: lms_root_url must not be empty".into());
    }
    if settings.block_structures.task_max_retries > MAX_TASK_MAX_RETRIES {
        return Err(format!(
            "SEC_INVALID_INPUT: block_structures.task_max_retries must be <= {MAX_TASK_MAX_RETRIES}"
        )
        .into());
    }
    if settings.block_structures.course_publish_task_delay_seconds > MAX_TASK_DELAY_SECONDS {
        return Err(format!(
            "SEC_INVALID_INPUT: block_structures.course_publish_task_delay_seconds must be <= {MAX_TASK_DELAY_SECONDS}"
        )
        .into());
    }
    if settings.block_structures.task_default_retry_delay_seconds > MAX_TASK_DELAY_SECONDS {
        return Err(format!(
            "SEC_INVALID_INPUT: block_structures.task_default_retry_delay_seconds must be <= {MAX_TASK_DELAY_SECONDS}"
        )
        .into());
    }
    Ok(())
}

fn cache_get_fresh(path: &PathBuf) -> Option<AppSettings> {
    let cache = SETTINGS_CACHE.get_or_init(|| RwLock::new(None));
    let guard = cache.read().ok()?;
    let cached = guard.as_ref()?;
    if cached.path == *path && cached.last_updated.elapsed() < CACHE_TTL {
        return Some(cached.data.clone());
    }
    None
}

fn cache_store(path: &PathBuf, settings: &AppSettings) {
    let cache = SETTINGS_CACHE.get_or_init(|| RwLock::new(None));
    if let Ok(mut guard) = cache.write() {
        *guard = Some(CachedSettings {
            path: path.clone(),
            data: settings.clone(),
            last_updated: Instant::now(),
        });
    }
}

pub fn read() -> AppResult<AppSettings> {
    let path = settings_path()?;

    if let Some(cached) = cache_get_fresh(&path) {
        return Ok(cached);
    }

    if !path.exists() {
        let settings = AppSettings::default();
        // Best-effort: create default settings.json on first read to make the config
        // discoverable/editable.
        let _ = write(&settings);
        cache_store(&path, &settings);
        return Ok(settings);
    }

    let content =
        std::fs::read_to_string(&path).map_err(|e| format!("failed to read settings: {e}"))?;
    let (mut settings, schema_version_present) = parse_settings_json(&content)?;

    validate(&settings)?;

    let mut repaired = false;
    repaired |= migrate_add_block_structures(&mut settings, schema_version_present);
    repaired |= migrate_add_log_directives(&mut settings, schema_version_present);
    repaired |= sanitize_block_structures(&mut settings);
    repaired |= sanitize_lms_root_url(&mut settings);
    if repaired {
        // Best-effort: persist repaired values while keeping read semantics.
        let _ = write(&settings);
    }

    cache_store(&path, &settings);

    Ok(settings)
}

pub fn log_retention_days_fail_open() -> u32 {
    match read() {
        Ok(cfg) => cfg.log_retention_days,
        Err(err) => {
            if !LOG_RETENTION_DAYS_FAIL_OPEN_WARNED.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    default = DEFAULT_LOG_RETENTION_DAYS,
                    "settings read failed, using default log retention: {}",
                    err
                );
            }
            DEFAULT_LOG_RETENTION_DAYS
        }
    }
}

pub fn write(settings: &AppSettings) -> AppResult<AppSettings> {
    validate(settings)?;

    let path = settings_path()?;
    let tmp_path = path.with_file_name("settings.json.tmp");
    let backup_path = path.with_file_name("settings.json.bak");

    let content = serde_json::to_vec_pretty(settings)
        .map_err(|e| format!("failed to serialize settings: {e}"))?;

    std::fs::write(&tmp_path, content)
        .map_err(|e| format!("failed to write temp settings file: {e}"))?;

    if backup_path.exists() {
        let _ = std::fs::remove_file(&backup_path);
    }

    if path.exists() {
        std::fs::rename(&path, &backup_path)
            .map_err(|e| format!("failed to create settings backup: {e}"))?;
    }

    if let Err(e) = std::fs::rename(&tmp_path, &path) {
        let _ = std::fs::rename(&backup_path, &path);
        return Err(format!("failed to finalize settings: {e}").into());
    }

    if backup_path.exists() {
        let _ = std::fs::remove_file(&backup_path);
    }

    cache_store(&path, settings);

    Ok(settings.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- defaults --

    #[test]
    fn app_settings_default_has_current_schema_version() {
        let s = AppSettings::default();
        assert_eq!(s.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn app_settings_default_has_expected_port_and_urls() {
        let s = AppSettings::default();
        assert_eq!(s.preferred_port, DEFAULT_GATEWAY_PORT);
        assert_eq!(s.lms_root_url, DEFAULT_LMS_ROOT_URL);
        assert_eq!(s.dashboard_url(), "http://localhost:8000/dashboard");
    }

    #[test]
    fn feature_toggles_default_off() {
        let f = FeatureToggles::default();
        assert!(!f.milestones_app);
        assert!(!f.enable_course_discovery);
        assert!(!f.enable_student_notes);
        assert!(!f.enable_teams);
        assert!(!f.enable_special_exams);
        assert!(!f.automatic_auth_for_testing);
    }

    // -- browser_test_overrides --

    #[test]
    fn browser_test_overrides_enable_eager_task_mode() {
        let mut s = AppSettings::default();
        browser_test_overrides(&mut s);
        assert_eq!(s.block_structures.task_max_retries, 0);
        assert_eq!(s.block_structures.course_publish_task_delay_seconds, 0);
        assert_eq!(s.block_structures.task_default_retry_delay_seconds, 0);
    }

    #[test]
    fn browser_test_overrides_flip_features_and_secret() {
        let mut s = AppSettings::default();
        browser_test_overrides(&mut s);
        assert!(s.debug);
        assert_eq!(s.secret_key, BROWSER_TEST_SECRET_KEY);
        assert!(s.features.enable_course_discovery);
        assert!(s.features.automatic_auth_for_testing);
        assert_eq!(
            s.catalog_api_url_override.as_deref(),
            Some(BROWSER_TEST_CATALOG_STUB_URL)
        );
    }

    #[test]
    fn browser_test_overrides_do_not_duplicate_log_directives() {
        let mut s = AppSettings::default();
        browser_test_overrides(&mut s);
        browser_test_overrides(&mut s);
        let hyper_count = s.log_directives.iter().filter(|d| *d == "hyper=warn").count();
        assert_eq!(hyper_count, 1);
    }

    // -- sanitize --

    #[test]
    fn sanitize_block_structures_clamps_excessive_values() {
        let mut s = AppSettings::default();
        s.block_structures.task_max_retries = 999;
        s.block_structures.course_publish_task_delay_seconds = 999_999;
        assert!(sanitize_block_structures(&mut s));
        assert_eq!(s.block_structures.task_max_retries, MAX_TASK_MAX_RETRIES);
        assert_eq!(
            s.block_structures.course_publish_task_delay_seconds,
            MAX_TASK_DELAY_SECONDS
        );
    }

    #[test]
    fn sanitize_block_structures_allows_zero_eager_mode() {
        let mut s = AppSettings::default();
        s.block_structures.task_max_retries = 0;
        s.block_structures.course_publish_task_delay_seconds = 0;
        s.block_structures.task_default_retry_delay_seconds = 0;
        assert!(!sanitize_block_structures(&mut s));
    }

    #[test]
    fn sanitize_lms_root_url_strips_trailing_slash() {
        let mut s = AppSettings {
            lms_root_url: "http://localhost:8000/".to_string(),
            ..Default::default()
        };
        assert!(sanitize_lms_root_url(&mut s));
        assert_eq!(s.lms_root_url, "http://localhost:8000");
    }

    // -- parse_settings_json --

    #[test]
    fn parse_settings_json_detects_schema_version_present() {
        let json = r#"{"schema_version": 3, "preferred_port": 8000}"#;
        let (settings, schema_version_present) = parse_settings_json(json).unwrap();
        assert!(schema_version_present);
        assert_eq!(settings.schema_version, 3);
        assert_eq!(settings.preferred_port, 8000);
    }

    #[test]
    fn parse_settings_json_uses_defaults_for_missing_fields() {
        let json = r#"{}"#;
        let (settings, schema_version_present) = parse_settings_json(json).unwrap();
        assert!(!schema_version_present);
        assert_eq!(settings.preferred_port, DEFAULT_GATEWAY_PORT);
        assert_eq!(settings.log_retention_days, DEFAULT_LOG_RETENTION_DAYS);
        assert_eq!(
            settings.block_structures.task_max_retries,
            DEFAULT_TASK_MAX_RETRIES
        );
    }

    #[test]
    fn parse_settings_json_rejects_invalid_json() {
        assert!(parse_settings_json("not json").is_err());
    }

    // -- migrate_bump_schema_version --

    #[test]
    fn migrate_bump_skips_when_already_at_target() {
        let mut s = AppSettings {
            schema_version: 3,
            ..Default::default()
        };
        assert!(!migrate_bump_schema_version(&mut s, true, 3));
        assert_eq!(s.schema_version, 3);
    }

    #[test]
    fn migrate_bump_applies_when_below_target() {
        let mut s = AppSettings {
            schema_version: 1,
            ..Default::default()
        };
        assert!(migrate_bump_schema_version(&mut s, true, 3));
        assert_eq!(s.schema_version, 3);
    }

    #[test]
    fn migrate_bump_forces_write_when_schema_version_absent() {
        let mut s = AppSettings {
            schema_version: 3,
            ..Default::default()
        };
        assert!(migrate_bump_schema_version(&mut s, false, 3));
    }

    // -- validate --

    #[test]
    fn validate_rejects_privileged_port() {
        let s = AppSettings {
            preferred_port: 80,
            ..Default::default()
        };
        assert!(validate(&s).is_err());
    }

    #[test]
    fn validate_rejects_empty_secret_key() {
        let s = AppSettings {
            secret_key: "  ".to_string(),
            ..Default::default()
        };
        assert!(validate(&s).is_err());
    }
}
