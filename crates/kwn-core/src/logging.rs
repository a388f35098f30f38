use tracing_subscriber::{fmt, EnvFilter};

use crate::Result;

/// Initialize tracing for the notifier.
///
/// `RUST_LOG` wins when set. Otherwise `level` (the configured `LOG_LEVEL`)
/// applies to our crates and everything else stays at `warn`.
pub fn init(service_name: &str, level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(default_directives(service_name, &level.trim().to_lowercase()))
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .try_init()
        .map_err(|e| crate::Error::External(format!("logging init failed: {e}")))?;

    Ok(())
}

fn default_directives(service_name: &str, level: &str) -> String {
    format!(
        "warn,{service_name}={level},kwn_core={level},kwn_kwork={level},kwn_redis={level},kwn_telegram={level}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_cover_every_workspace_crate() {
        let d = default_directives("kwn", "debug");
        assert!(d.starts_with("warn,"));
        for krate in ["kwn=debug", "kwn_core=debug", "kwn_kwork=debug", "kwn_telegram=debug"] {
            assert!(d.contains(krate), "{d} missing {krate}");
        }
        assert!(EnvFilter::try_new(d).is_ok());
    }
}
