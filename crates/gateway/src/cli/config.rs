use sp_domain::config::{Config, ConfigSeverity};

/// Validate the config, printing any issues.
///
/// Returns `true` when no errors were found (warnings are allowed).
pub fn validate(config: &Config, config_path: &str) -> bool {
    let issues = config.validate();

    if issues.is_empty() {
        println!("Config OK ({config_path})");
        return true;
    }

    let error_count = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .count();
    let warning_count = issues.len() - error_count;

    for issue in &issues {
        println!("{issue}");
    }
    println!("\n{error_count} error(s), {warning_count} warning(s) in {config_path}");

    error_count == 0
}

/// Render the resolved config (with all defaults filled in) as TOML.
pub fn show(config: &Config) -> anyhow::Result<String> {
    toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("serializing config: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        // Memory backend only produces a warning.
        assert!(validate(&Config::default(), "config.toml"));
    }

    #[test]
    fn zero_sample_interval_fails_validation() {
        let mut config = Config::default();
        config.streaming.metrics_sample_interval = 0;
        assert!(!validate(&config, "config.toml"));
    }

    #[test]
    fn show_renders_every_section() {
        let rendered = show(&Config::default()).unwrap();
        assert!(rendered.contains("[server]"));
        assert!(rendered.contains("[streaming]"));
        assert!(rendered.contains("[store]"));
        assert!(rendered.contains("metrics_sample_interval = 10"));
    }
}
