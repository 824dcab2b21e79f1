//! Command-line interface definitions for TasiPulse.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Platform toggles can also be provided via environment variables, which is
//! how the scheduled runner configures draft-only smoke runs.

use clap::Parser;

/// Command-line arguments for the TasiPulse pipeline.
///
/// # Examples
///
/// ```sh
/// # Normal scheduled run
/// tasi_pulse --config /etc/tasi_pulse/config.yaml
///
/// # Draft-only dry run, nothing touches the platforms
/// tasi_pulse -c config.yaml --drafts --no-x --no-instagram
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the YAML config file
    #[arg(short, long, env = "TASI_PULSE_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Skip posting to X even when credentials are configured
    #[arg(long, env = "TASI_PULSE_NO_X")]
    pub no_x: bool,

    /// Skip posting to Instagram even when credentials are configured
    #[arg(long, env = "TASI_PULSE_NO_INSTAGRAM")]
    pub no_instagram: bool,

    /// Also write draft files for every article (always on when no live
    /// platform is available)
    #[arg(long)]
    pub drafts: bool,

    /// Override the configured per-run article limit
    #[arg(short, long)]
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["tasi_pulse"]);
        assert_eq!(cli.config, "config.yaml");
        assert!(!cli.no_x);
        assert!(!cli.drafts);
        assert_eq!(cli.limit, None);
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::parse_from([
            "tasi_pulse",
            "-c",
            "/etc/tasi_pulse/config.yaml",
            "--drafts",
            "--no-instagram",
            "--limit",
            "5",
        ]);
        assert_eq!(cli.config, "/etc/tasi_pulse/config.yaml");
        assert!(cli.drafts);
        assert!(cli.no_instagram);
        assert!(!cli.no_x);
        assert_eq!(cli.limit, Some(5));
    }
}
