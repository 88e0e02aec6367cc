//! Command-line configuration for the init checker.

use std::{
    fmt,
    path::PathBuf,
    str::FromStr,
};

use clap::Parser;

/// Runtime configuration flags for the init checker.
///
/// Every parameter is also read from an env var so the check can run from CI
/// manifests without shell args.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// JSON-RPC endpoint of the chain the contracts are deployed on.
    #[arg(long, env = "INIT_CHECKER_RPC_URL")]
    pub rpc_url: String,

    /// Artifact bundle with deployment addresses and compiler artifacts.
    #[arg(long, env = "INIT_CHECKER_BUNDLE")]
    pub bundle: PathBuf,

    /// Deployment names to check. Defaults to every deployment whose
    /// layout declares an `_initialized` counter.
    #[arg(long = "contract", env = "INIT_CHECKER_CONTRACTS", value_delimiter = ',')]
    pub contracts: Vec<String>,

    /// Also compare on-chain runtime code with the bundled deployed bytecode.
    #[arg(long, env = "INIT_CHECKER_CHECK_CODE", default_value_t = false)]
    pub check_code: bool,

    /// Ad-hoc read calls as `NAME:METHOD[:ARG]...`, e.g.
    /// `SystemConfigProxy:owner`. Arguments are parsed by the method's
    /// declared input types.
    #[arg(long = "call", env = "INIT_CHECKER_CALLS", value_delimiter = ';')]
    pub calls: Vec<CallTarget>,

    /// Print the report as JSON on stdout.
    #[arg(long, env = "INIT_CHECKER_JSON", default_value_t = false)]
    pub json: bool,
}

/// A read-only call against a deployment name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallTarget {
    pub name: String,
    pub method: String,
    pub args: Vec<String>,
}

impl FromStr for CallTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let name = parts.next().unwrap_or_default();
        let method = parts.next().unwrap_or_default();
        if name.is_empty() || method.is_empty() {
            return Err(format!("expected NAME:METHOD[:ARG]..., got `{s}`"));
        }
        Ok(Self {
            name: name.to_string(),
            method: method.to_string(),
            args: parts.map(str::to_string).collect(),
        })
    }
}

impl fmt::Display for CallTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}({})", self.name, self.method, self.args.join(", "))
    }
}
