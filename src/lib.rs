use once_cell::sync::Lazy;
use std::sync::{Arc, Mutex};

pub mod archive;
pub mod candidate;
pub mod config;
pub mod error;
pub mod form;
pub mod init;
pub mod pipeline;
pub mod subtitle;

pub type LogHook = Arc<Mutex<dyn Fn(&str) + Send + Sync + 'static>>;

static LOG_HOOK: Lazy<Mutex<Option<LogHook>>> = Lazy::new(|| Mutex::new(None));

/// Installs (or clears) a callback receiving every progress line the pipeline prints.
pub fn set_log_hook(hook: Option<LogHook>) {
    if let Ok(mut guard) = LOG_HOOK.lock() {
        *guard = hook;
    }
}

pub(crate) fn logv(tag: &str, message: &str) {
    eprintln!("[{}] {}", tag, message);

    if let Ok(guard) = LOG_HOOK.lock() {
        if let Some(hook) = guard.as_ref() {
            if let Ok(callback) = hook.lock() {
                let line = format!("[{}] {}", tag, message);
                callback(&line);
            }
        }
    }
}

pub(crate) fn logi(message: impl AsRef<str>) {
    logv("INFO", message.as_ref());
}

pub(crate) fn logok(message: impl AsRef<str>) {
    logv("OK", message.as_ref());
}

pub(crate) fn logw(message: impl AsRef<str>) {
    logv("WARN", message.as_ref());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_hook_receives_tagged_lines() {
        let captured = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = Arc::clone(&captured);
        let hook: LogHook = Arc::new(Mutex::new(move |line: &str| {
            sink.lock().unwrap().push(line.to_string());
        }));

        set_log_hook(Some(hook));
        logw("hook-check turkish page missing");
        set_log_hook(None);
        logi("hook-check after clear");

        let lines = captured.lock().unwrap();
        assert!(lines.contains(&"[WARN] hook-check turkish page missing".to_string()));
        assert!(!lines.iter().any(|l| l.contains("hook-check after clear")));
    }
}
