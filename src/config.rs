use std::{fs::read_to_string, net::SocketAddr};

use clap::Parser;
use ice::port_reserver::PortRange;
use serde::Deserialize;

/// Credentials this agent presents to a TURN server it relays through.
///
/// Unlike the teacher's `auth` table (identities a server verifies against
/// callers), this is the one identity the agent authenticates itself with.
#[derive(Deserialize, Debug, Default)]
pub struct Auth {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize, Debug)]
pub struct Ice {
    /// Emit host candidates.
    #[serde(default = "Ice::use_local")]
    pub use_local: bool,

    /// Issue a STUN Binding to learn the server-reflexive candidate.
    #[serde(default)]
    pub use_stun_bind: bool,

    /// Allocate a UDP TURN relay.
    #[serde(default)]
    pub use_stun_relay_udp: bool,

    /// Allocate a TCP TURN relay.
    #[serde(default)]
    pub use_stun_relay_tcp: bool,

    /// Set USE-CANDIDATE on every controlling check instead of only the
    /// nominating one.
    #[serde(default)]
    pub aggressive_nomination: bool,

    /// Emit candidates as they arrive rather than in one batch.
    #[serde(default)]
    pub trickle: bool,

    /// Number of components: 1 for RTP-only, 2 for RTP+RTCP.
    #[serde(default = "Ice::component_count")]
    pub component_count: u8,

    /// Starting UDP port handed to the Port Reserver.
    #[serde(default = "Ice::base_port")]
    pub base_port: u16,

    /// Hard cap on check-list pairs per component.
    #[serde(default = "Ice::max_pairs_per_component")]
    pub max_pairs_per_component: usize,

    /// Local interface addresses to gather host candidates from.
    #[serde(default = "Ice::local_addrs")]
    pub local_addrs: Vec<SocketAddr>,

    /// STUN/TURN server this agent binds against, if any.
    #[serde(default)]
    pub server: Option<SocketAddr>,

    /// Port range the Port Reserver draws local ports from.
    #[serde(default)]
    pub port_range: PortRange,
}

impl Ice {
    fn use_local() -> bool {
        true
    }

    fn component_count() -> u8 {
        1
    }

    fn base_port() -> u16 {
        49152
    }

    fn max_pairs_per_component() -> usize {
        100
    }

    fn local_addrs() -> Vec<SocketAddr> {
        vec!["0.0.0.0:0".parse().unwrap()]
    }
}

impl Default for Ice {
    fn default() -> Self {
        Self {
            use_local: Self::use_local(),
            use_stun_bind: false,
            use_stun_relay_udp: false,
            use_stun_relay_tcp: false,
            aggressive_nomination: false,
            trickle: false,
            component_count: Self::component_count(),
            base_port: Self::base_port(),
            max_pairs_per_component: Self::max_pairs_per_component(),
            local_addrs: Self::local_addrs(),
            server: None,
            port_range: PortRange::default(),
        }
    }
}

#[derive(Deserialize, Debug)]
pub enum LogLevel {
    None,
    Info,
    Packet,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl LogLevel {
    /// §6.5: a pure verbosity knob, mapped onto `log::Level`.
    pub fn as_level(&self) -> log::Level {
        match *self {
            Self::None => log::Level::Warn,
            Self::Info => log::Level::Info,
            Self::Packet => log::Level::Trace,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct Log {
    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Deserialize, Debug, Default)]
pub struct Config {
    #[serde(default)]
    pub ice: Ice,
    #[serde(default)]
    pub auth: Auth,
    #[serde(default)]
    pub log: Log,
}

#[derive(Parser)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS")
)]
struct Cli {
    /// specify the configuration file path.
    #[arg(long)]
    config: Option<String>,
}

impl Config {
    /// Load command line parameters, if the configuration file path is
    /// specified, the configuration is read from the configuration file,
    /// otherwise the default configuration is used.
    pub fn load() -> anyhow::Result<Self> {
        let cfg_str = Cli::parse().config.map(read_to_string).transpose()?;

        Ok(match cfg_str {
            Some(body) => serde_json5::from_str(&body)?,
            None => Config::default(),
        })
    }
}
