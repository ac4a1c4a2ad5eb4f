//! Call-site logging combinator
//!
//! [`logged`] wraps an operation with before/after log lines described by a
//! [`LogSpec`]. Messages are templates: `$className` expands to the full
//! component path, `$classSimpleName` to its last `::` segment,
//! `$timestamp` to the local time, and each `{}` takes the next argument.

use std::time::{Duration, Instant};
use tracing::Level;

#[derive(Debug, Clone)]
pub struct LogSpec {
    pub level: Level,
    pub before: bool,
    pub after: bool,
    pub measure_time: bool,
    /// Minimum elapsed time for the after-message; `None` always logs
    pub threshold: Option<Duration>,
    pub message: Option<String>,
    pub arguments: Vec<String>,
}

impl Default for LogSpec {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            before: true,
            after: false,
            measure_time: false,
            threshold: None,
            message: None,
            arguments: Vec::new(),
        }
    }
}

impl LogSpec {
    pub fn new(level: Level) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    /// Log only after the call, with its duration, once it is slow enough
    pub fn timed(level: Level, threshold: Duration) -> Self {
        Self {
            level,
            before: false,
            after: true,
            measure_time: true,
            threshold: Some(threshold),
            ..Self::default()
        }
    }

    pub fn message(mut self, template: impl Into<String>) -> Self {
        self.message = Some(template.into());
        self
    }

    pub fn arg(mut self, argument: impl ToString) -> Self {
        self.arguments.push(argument.to_string());
        self
    }

    pub fn after(mut self, after: bool) -> Self {
        self.after = after;
        self
    }
}

/// Run `f`, logging around it as `spec` describes
pub fn logged<T>(spec: &LogSpec, component: &str, operation: &str, f: impl FnOnce() -> T) -> T {
    if spec.before {
        let text = match &spec.message {
            Some(template) => render(template, component, &spec.arguments),
            None => format!("Before {}.{}", simple_name(component), operation),
        };
        emit(spec.level, &text);
    }

    let start = Instant::now();
    let result = f();
    let elapsed = start.elapsed();

    if spec.after && spec.threshold.map_or(true, |min| elapsed >= min) {
        let mut text = match &spec.message {
            Some(template) if !spec.before => render(template, component, &spec.arguments),
            _ => format!("After {}.{}", simple_name(component), operation),
        };
        if spec.measure_time {
            text.push_str(&format!(" ({} ms)", elapsed.as_millis()));
        }
        emit(spec.level, &text);
    }
    result
}

pub(crate) fn render(template: &str, component: &str, arguments: &[String]) -> String {
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let expanded = template
        .replace("$classSimpleName", simple_name(component))
        .replace("$className", component)
        .replace("$timestamp", &timestamp);

    let mut out = String::with_capacity(expanded.len());
    let mut args = arguments.iter();
    let mut rest = expanded.as_str();
    while let Some(at) = rest.find("{}") {
        out.push_str(&rest[..at]);
        match args.next() {
            Some(arg) => out.push_str(arg),
            None => out.push_str("{}"),
        }
        rest = &rest[at + 2..];
    }
    out.push_str(rest);
    out
}

fn simple_name(component: &str) -> &str {
    component.rsplit("::").next().unwrap_or(component)
}

fn emit(level: Level, text: &str) {
    match level {
        Level::ERROR => tracing::error!("{}", text),
        Level::WARN => tracing::warn!("{}", text),
        Level::INFO => tracing::info!("{}", text),
        Level::DEBUG => tracing::debug!("{}", text),
        _ => tracing::trace!("{}", text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_placeholders() {
        let text = render(
            "$classSimpleName saved {} items into {}",
            "itemstore_engine::service::PersistenceService",
            &["3".to_string(), "sqlite".to_string()],
        );
        assert_eq!(text, "PersistenceService saved 3 items into sqlite");

        let text = render("$className", "a::b", &[]);
        assert_eq!(text, "a::b");
    }

    #[test]
    fn test_missing_arguments_leave_placeholder() {
        assert_eq!(render("{} and {}", "x", &["one".to_string()]), "one and {}");
    }

    #[test]
    fn test_timestamp_is_expanded() {
        let text = render("at $timestamp", "x", &[]);
        assert!(!text.contains("$timestamp"));
        assert_eq!(text.len(), "at ".len() + "2024-01-01 00:00:00".len());
    }

    #[test]
    fn test_logged_returns_inner_result() {
        let spec = LogSpec::timed(Level::DEBUG, Duration::from_millis(0)).message("$classSimpleName");
        let value = logged(&spec, "engine::Store", "save", || 42);
        assert_eq!(value, 42);
    }
}
