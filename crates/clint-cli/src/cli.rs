use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use clint_domain::EntityKind;

pub const CLINT_HELP_TEMPLATE: &str =
    "{before-help}\nUsage:\n    {usage}\n\nGlobal options:\n{options}\n";

pub const CLINT_BEFORE_HELP: &str = concat!(
    "clint ",
    env!("CARGO_PKG_VERSION"),
    " – Custody lifecycle for preservation bags\n\n",
    "\x1b[1;36mLifecycle\x1b[0m\n",
    "  bag              Package a directory as a bag and register it in the catalog.\n",
    "  rebag            Rebuild a registered bag after its payload changed.\n",
    "  validate         Check a bag's payload against its manifest.\n",
    "  copy             Validate, then copy a registered bag to another volume or host.\n\n",
    "\x1b[1;36mCatalog records\x1b[0m\n",
    "  show             Print a record (machine, collection, project, item, bag, bagaction).\n",
    "  add              Create a record from --set field=value pairs.\n",
    "  edit             Change fields on an existing record.\n",
);

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    propagate_version = false,
    disable_help_subcommand = true,
    before_help = CLINT_BEFORE_HELP,
    help_template = CLINT_HELP_TEMPLATE
)]
#[allow(clippy::struct_excessive_bools)]
pub struct ClintCli {
    #[arg(
        short,
        long,
        help = "Suppress human output (errors still print to stderr)",
        global = true
    )]
    pub quiet: bool,
    #[arg(
        short,
        long,
        action = ArgAction::Count,
        help = "Increase logging (-vv reaches trace)",
        global = true
    )]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v/-q", global = true)]
    pub trace: bool,
    #[arg(
        long,
        help = "Emit {status,message,details} JSON envelopes",
        global = true
    )]
    pub json: bool,
    #[arg(long, help = "Disable colored human output", global = true)]
    pub no_color: bool,
    #[arg(
        long,
        value_name = "PATH",
        help = "Config file (defaults to CLINT_CONFIG, then the user config dir)",
        global = true
    )]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: CommandGroupCli,
}

#[derive(Subcommand, Debug)]
pub enum CommandGroupCli {
    #[command(
        about = "Print a catalog record; enumerated fields show their labels.",
        override_usage = "clint show <KIND> <ID> [--expand]"
    )]
    Show(ShowArgs),
    #[command(
        about = "Create a catalog record.",
        override_usage = "clint add <KIND> --set FIELD=VALUE [--set FIELD=VALUE ...]"
    )]
    Add(AddArgs),
    #[command(
        about = "Load a catalog record, change fields and save it back.",
        override_usage = "clint edit <KIND> <ID> --set FIELD=VALUE [--set FIELD=VALUE ...]"
    )]
    Edit(EditArgs),
    #[command(
        about = "Package a directory as a bag and register its item and bag records.",
        override_usage = "clint bag <DIR> [--force] [--item ID] [--bag-type TYPE]"
    )]
    Bag(BagArgs),
    #[command(
        about = "Rebuild a registered bag in place and update its catalog record.",
        override_usage = "clint rebag <DIR>"
    )]
    Rebag(PathArgs),
    #[command(
        about = "Check a bag's payload against its manifest (records an action when registered).",
        override_usage = "clint validate <DIR>"
    )]
    Validate(PathArgs),
    #[command(
        about = "Validate a registered bag, then copy it if the destination has room.",
        override_usage = "clint copy <DIR> --dest PATH --volume MOUNT [--host HOST]"
    )]
    Copy(CopyArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum KindArg {
    Machine,
    Collection,
    Project,
    Item,
    Bag,
    #[value(name = "bagaction", alias = "bag-action")]
    BagAction,
}

impl From<KindArg> for EntityKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Machine => EntityKind::Machine,
            KindArg::Collection => EntityKind::Collection,
            KindArg::Project => EntityKind::Project,
            KindArg::Item => EntityKind::Item,
            KindArg::Bag => EntityKind::Bag,
            KindArg::BagAction => EntityKind::BagAction,
        }
    }
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    #[arg(value_enum)]
    pub kind: KindArg,
    #[arg(value_name = "ID", help = "Identity, or the alternate key for items and bags")]
    pub id: String,
    #[arg(long, help = "Also fetch and print every related record")]
    pub expand: bool,
}

#[derive(Args, Debug)]
pub struct AddArgs {
    #[arg(value_enum)]
    pub kind: KindArg,
    #[command(flatten)]
    pub fields: FieldArgs,
}

#[derive(Args, Debug)]
pub struct EditArgs {
    #[arg(value_enum)]
    pub kind: KindArg,
    #[arg(value_name = "ID")]
    pub id: String,
    #[command(flatten)]
    pub fields: FieldArgs,
}

#[derive(Args, Debug, Clone)]
pub struct FieldArgs {
    #[arg(
        long = "set",
        value_name = "FIELD=VALUE",
        value_parser = parse_assignment,
        help = "Field to set; an empty value clears it"
    )]
    pub set: Vec<(String, String)>,
}

#[derive(Args, Debug)]
pub struct PathArgs {
    #[arg(value_name = "DIR")]
    pub path: PathBuf,
}

#[derive(Args, Debug)]
pub struct BagArgs {
    #[arg(value_name = "DIR")]
    pub path: PathBuf,
    #[arg(long, help = "Re-package an existing bag without asking")]
    pub force: bool,
    #[arg(short = 'y', long, help = "Answer yes to the re-packaging prompt")]
    pub yes: bool,
    #[arg(long, help = "Bag name (defaults to the directory name)")]
    pub bagname: Option<String>,
    #[arg(long, value_name = "TYPE", help = "access, preservation (default) or export")]
    pub bag_type: Option<String>,
    #[arg(long, value_name = "ID", help = "Attach to an existing item instead of creating one")]
    pub item: Option<String>,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub local_id: Option<String>,
    #[arg(long, value_name = "ID")]
    pub collection: Option<String>,
    #[arg(long, value_name = "ID")]
    pub project: Option<String>,
    #[arg(long, value_name = "TYPE")]
    pub item_type: Option<String>,
    #[arg(long, value_name = "ID", help = "Machine holding the bag (defaults to [bagging].default_machine)")]
    pub machine: Option<String>,
    #[arg(long, value_name = "PATH", help = "Path to record in the catalog instead of DIR")]
    pub access_path: Option<String>,
}

#[derive(Args, Debug)]
pub struct CopyArgs {
    #[arg(value_name = "DIR")]
    pub path: PathBuf,
    #[arg(long = "dest", value_name = "PATH", help = "Full path of the replica")]
    pub destination: String,
    #[arg(long, value_name = "MOUNT", help = "Mount point whose free space gates the copy")]
    pub volume: String,
    #[arg(long, help = "Destination host (defaults to [remote].host, else local)")]
    pub host: Option<String>,
    #[arg(long)]
    pub user: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(long, value_name = "ID", help = "Machine record for the replica")]
    pub machine: Option<String>,
}

fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((field, value)) if !field.trim().is_empty() => {
            Ok((field.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected FIELD=VALUE, got '{raw}'")),
    }
}
