use crate::core::config::data::{path_display, Config};
use std::fmt::Write;

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

fn mask_key(key: &str) -> String {
    let count = key.chars().count();
    if count <= 4 {
        return "****".to_string();
    }
    let visible: String = key.chars().skip(count - 4).collect();
    format!("****{visible}")
}

impl Config {
    /// Human-readable summary of the effective configuration. The API key is
    /// masked.
    pub fn describe(&self) -> String {
        let settings = self.api_settings();
        let mut out = String::from("Current configuration:\n");
        let unset = "(unset)".to_string();

        let _ = writeln!(out, "  endpoint: {}", settings.endpoint.as_ref().unwrap_or(&unset));
        let _ = writeln!(
            out,
            "  deployment: {}",
            settings.deployment.as_ref().unwrap_or(&unset)
        );
        let _ = writeln!(
            out,
            "  api-key: {}",
            settings
                .api_key
                .as_deref()
                .map(mask_key)
                .unwrap_or_else(|| unset.clone())
        );
        let _ = writeln!(out, "  api-version: {}", settings.api_version);
        let _ = writeln!(out, "  model: {}", settings.model);
        match self.resolve_data_dir() {
            Ok(dir) => {
                let _ = writeln!(out, "  data-dir: {}", path_display(dir));
            }
            Err(_) => {
                let _ = writeln!(out, "  data-dir: {unset}");
            }
        }
        let _ = writeln!(out, "  markdown: {}", on_off(self.markdown_enabled()));
        let _ = writeln!(out, "  syntax: {}", on_off(self.syntax_enabled()));
        match self.stream_timeout() {
            Some(timeout) => {
                let _ = writeln!(out, "  stream-timeout: {}s", timeout.as_secs());
            }
            None => {
                let _ = writeln!(out, "  stream-timeout: none");
            }
        }
        let retries = self
            .rate_limit
            .max_attempts
            .map_or_else(|| "unbounded".to_string(), |max| max.to_string());
        let _ = writeln!(out, "  rate-limit-retries: {retries}");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_masked() {
        assert_eq!(mask_key("abc"), "****");
        assert_eq!(mask_key("sk-123456789"), "****6789");
    }

    #[test]
    fn describe_lists_unset_values() {
        let config = Config {
            data_dir: Some("/tmp/threads".into()),
            ..Config::default()
        };
        let text = config.describe();
        assert!(text.contains("  endpoint: (unset)"));
        assert!(text.contains("  api-key: (unset)"));
        assert!(text.contains("  model: gpt-4"));
        assert!(text.contains("  rate-limit-retries: 5"));
    }
}
