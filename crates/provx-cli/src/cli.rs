use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use provx_core::{DistributionType, Platform};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Index and query Apple provisioning profiles",
    disable_help_subcommand = true
)]
pub struct ProvxCli {
    #[arg(
        short,
        long,
        action = ArgAction::Count,
        help = "Increase logging (-vv reaches trace)",
        global = true
    )]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v", global = true)]
    pub trace: bool,
    #[arg(long, help = "Emit {status,message,details} JSON envelopes", global = true)]
    pub json: bool,
    #[arg(
        long = "profile-dir",
        value_name = "DIR",
        help = "Watch DIR for profiles instead of the defaults (repeatable)",
        global = true
    )]
    pub profile_dirs: Vec<PathBuf>,
    #[arg(
        long,
        value_name = "PATH",
        help = "Keep the profile index at PATH",
        global = true
    )]
    pub index_path: Option<PathBuf>,
    #[command(subcommand)]
    pub command: CommandCli,
}

#[derive(Subcommand, Debug)]
pub enum CommandCli {
    #[command(about = "List profiles matching the given filters, newest first.")]
    List(ListArgs),
    #[command(about = "Show one profile by name or UUID.")]
    Show(ShowArgs),
    #[command(about = "Bring the profile index up to date and report on it.")]
    Index(IndexArgs),
}

#[derive(Args, Debug)]
#[allow(clippy::struct_excessive_bools)]
pub struct ListArgs {
    #[arg(long, help = "Target platform: ios, tvos or macos")]
    pub platform: Platform,
    #[arg(
        long = "type",
        value_name = "TYPE",
        default_value = "any",
        help = "Distribution type: development, adhoc, inhouse, appstore or any"
    )]
    pub distribution: DistributionType,
    #[arg(long, value_name = "ID", help = "Only profiles whose app id covers ID")]
    pub bundle_id: Option<String>,
    #[arg(
        long = "thumbprint",
        value_name = "SHA1",
        help = "Only profiles issued for this certificate (repeatable)"
    )]
    pub thumbprints: Vec<String>,
    #[arg(long, help = "Include expired profiles")]
    pub include_expired: bool,
    #[arg(long, help = "Keep only the newest profile of each name")]
    pub unique: bool,
    #[arg(long, help = "Explain why each other profile was left out")]
    pub explain: bool,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    #[arg(value_name = "NAME_OR_UUID")]
    pub name_or_uuid: String,
    #[arg(long, help = "Target platform: ios, tvos or macos")]
    pub platform: Platform,
    #[arg(long, help = "Explain why other profiles did not match")]
    pub explain: bool,
}

#[derive(Args, Debug)]
pub struct IndexArgs {
    #[arg(long, help = "Discard the cached index and parse every profile")]
    pub rebuild: bool,
}
