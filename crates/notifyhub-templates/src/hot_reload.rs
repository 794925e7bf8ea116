//! File-watch hot reload: watches directories, debounces events, reloads
//! changed templates into a `TemplateManager`, invalidates their cache
//! entry, and invokes reload/error callbacks.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify_debouncer_mini::{new_debouncer, DebounceEventResult};

use crate::engine::EngineKind;
use crate::manager::TemplateManager;

pub type ReloadCallback = Arc<dyn Fn(&str, EngineKind, Option<&str>) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&Path, &str) + Send + Sync>;

pub struct HotReloadConfig {
    pub directories: Vec<PathBuf>,
    pub debounce: Duration,
    pub ignore_patterns: Vec<String>,
    pub max_file_size: u64,
    pub default_engine: EngineKind,
}

impl Default for HotReloadConfig {
    fn default() -> Self {
        Self {
            directories: Vec::new(),
            debounce: Duration::from_millis(100),
            ignore_patterns: Vec::new(),
            max_file_size: 1024 * 1024,
            default_engine: EngineKind::Text,
        }
    }
}

/// Derives a template name from a path relative to a watch root: dots
/// replace path separators, extension stripped.
pub fn template_name_from_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let without_ext = relative.with_extension("");
    let parts: Vec<String> = without_ext
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("."))
}

fn is_ignored(path: &Path, patterns: &[String]) -> bool {
    let path_str = path.to_string_lossy();
    patterns.iter().any(|pattern| path_str.contains(pattern.as_str()))
}

/// Owns the debounced watcher. Dropping this stops watching.
pub struct HotReloader {
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
}

impl HotReloader {
    pub fn start(
        config: HotReloadConfig,
        manager: Arc<TemplateManager>,
        on_reload: Option<ReloadCallback>,
        on_error: Option<ErrorCallback>,
    ) -> notify::Result<Self> {
        let roots = config.directories.clone();
        let ignore_patterns = config.ignore_patterns.clone();
        let max_file_size = config.max_file_size;
        let default_engine = config.default_engine;

        let mut debouncer = new_debouncer(config.debounce, move |result: DebounceEventResult| {
            let events = match result {
                Ok(events) => events,
                Err(errors) => {
                    for error in errors {
                        tracing::warn!(?error, "template watcher error");
                    }
                    return;
                }
            };

            for event in events {
                let path = event.path;
                if is_ignored(&path, &ignore_patterns) {
                    continue;
                }
                let Some(root) = roots.iter().find(|r| path.starts_with(r)) else {
                    continue;
                };
                let Some(name) = template_name_from_path(root, &path) else {
                    continue;
                };

                match std::fs::metadata(&path).and_then(|_| std::fs::read_to_string(&path)) {
                    Ok(content) => {
                        if content.len() as u64 > max_file_size {
                            if let Some(cb) = &on_error {
                                cb(&path, "file exceeds max_file_size");
                            }
                            continue;
                        }
                        match manager.reload_content(&name, content, default_engine) {
                            Ok(changed) => {
                                if changed {
                                    if let Some(cb) = &on_reload {
                                        cb(&name, default_engine, None);
                                    }
                                }
                            }
                            Err(e) => {
                                if let Some(cb) = &on_reload {
                                    cb(&name, default_engine, Some(&e.to_string()));
                                }
                            }
                        }
                    }
                    Err(e) => {
                        if let Some(cb) = &on_error {
                            cb(&path, &e.to_string());
                        }
                    }
                }
            }
        })?;

        for dir in &config.directories {
            debouncer
                .watcher()
                .watch(dir, notify::RecursiveMode::Recursive)?;
        }

        Ok(Self { _debouncer: debouncer })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_name_replaces_separators_and_strips_extension() {
        let root = Path::new("/templates");
        let path = Path::new("/templates/emails/welcome.txt");
        assert_eq!(template_name_from_path(root, path), Some("emails.welcome".to_string()));
    }

    #[test]
    fn ignored_patterns_match_substrings() {
        assert!(is_ignored(Path::new("/templates/.git/HEAD"), &[".git".to_string()]));
        assert!(!is_ignored(Path::new("/templates/welcome.txt"), &[".git".to_string()]));
    }
}
