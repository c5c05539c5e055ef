//! Parses command-line arguments for the liquidity-provider node.

use std::path::PathBuf;

use clap::{crate_version, Parser};

#[derive(Debug, Parser)]
#[clap(
    name = "bridge-lp",
    about = "Liquidity-provider bridge agent",
    version = crate_version!()
)]
pub(crate) struct Cli {
    #[clap(
        long,
        short = 'c',
        help = "The file containing the configuration for the node",
        default_value = "config.toml"
    )]
    pub config: PathBuf,
}
