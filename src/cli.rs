use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::models::{Preset, ProviderKind};

#[derive(Parser)]
#[command(name = "chatrelay")]
#[command(about = "Chat-completion gateway with Groq to Gemini fallback")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP gateway
    Serve {
        /// Override the configured listen host
        #[arg(long)]
        host: Option<String>,

        /// Override the configured listen port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show live catalogs and the model each preset resolves to
    Models {
        /// Only this provider
        #[arg(short, long, value_enum)]
        provider: Option<ProviderArg>,

        /// Only this preset
        #[arg(long, value_enum)]
        preset: Option<PresetArg>,
    },

    /// Print the effective configuration with secrets redacted
    Config,
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Serve {
            host: None,
            port: None,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ProviderArg {
    Groq,
    Gemini,
}

impl From<ProviderArg> for ProviderKind {
    fn from(arg: ProviderArg) -> Self {
        match arg {
            ProviderArg::Groq => ProviderKind::Groq,
            ProviderArg::Gemini => ProviderKind::Gemini,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PresetArg {
    Speed,
    Quality,
}

impl From<PresetArg> for Preset {
    fn from(arg: PresetArg) -> Self {
        match arg {
            PresetArg::Speed => Preset::Speed,
            PresetArg::Quality => Preset::Quality,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_serve() {
        let cli = Cli::try_parse_from(["chatrelay"]).unwrap();
        assert!(cli.command.is_none());
        assert!(matches!(cli.command.unwrap_or_default(), Commands::Serve { port: None, .. }));
    }

    #[test]
    fn test_models_filters() {
        let cli = Cli::try_parse_from([
            "chatrelay", "--debug", "models", "--provider", "gemini", "--preset", "quality",
        ])
        .unwrap();
        assert!(cli.debug);
        match cli.command {
            Some(Commands::Models { provider, preset }) => {
                assert_eq!(provider.map(ProviderKind::from), Some(ProviderKind::Gemini));
                assert_eq!(preset.map(Preset::from), Some(Preset::Quality));
            }
            _ => panic!("expected models command"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "chatrelay", "models", "--debug", "--config", "relay.toml",
        ])
        .unwrap();
        assert!(cli.debug);
        assert_eq!(cli.config, Some(PathBuf::from("relay.toml")));
        assert!(matches!(cli.command, Some(Commands::Models { .. })));
    }

    #[test]
    fn test_serve_overrides() {
        let cli = Cli::try_parse_from(["chatrelay", "serve", "--port", "9100"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Serve { port: Some(9100), host: None })));
    }
}
