//! Command-line overrides for the environment configuration.

use clap::Parser;

use deepthink_core::Config;

/// Two-stage streaming chat server.
#[derive(Parser, Debug)]
#[command(name = "deepthink-server", version, about)]
pub struct Cli {
    /// Configuration profile; keys are looked up as `{PROFILE}_{KEY}` first.
    #[arg(long, env = "DEEPTHINK_PROFILE")]
    pub profile: Option<String>,

    /// Bind address (overrides HOST).
    #[arg(long)]
    pub host: Option<String>,

    /// Listen port (overrides PORT).
    #[arg(long)]
    pub port: Option<u16>,
}

impl Cli {
    /// Resolve the configuration, then apply the flags given on the command line.
    pub fn config(&self) -> Config {
        let mut config = match self.profile.as_deref() {
            Some(profile) => Config::for_profile(profile),
            None => Config::from_env(),
        };
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        config
    }
}
