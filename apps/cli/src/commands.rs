//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use hutchns_core::{
    IterableNamespace, ObjectDb, Registry, ScopeSpec, TypeRegistry, class_namespace,
    metadata_namespace,
};
use hutchns_shared::{
    AppConfig, LogOptions, init_config, load_config, load_config_from, parse_level, setup_logging,
};
use serde_json::{Map, Value};
use tracing::level_filters::LevelFilter;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// hutchns: group session objects into browsable namespaces.
#[derive(Parser)]
#[command(
    name = "hutchns",
    version,
    about = "Build type-filtered and metadata-keyed namespaces from an object database.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text or json. Defaults to the configured format.
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    /// Verbosity level (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Directory for per-session debug log files.
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Start with the console in debug mode.
    #[arg(long, global = true)]
    pub debug: bool,

    /// Config file to use instead of ~/.hutchns/hutchns.toml.
    #[arg(long, global = true, env = "HUTCHNS_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

impl From<LogFormat> for hutchns_shared::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Text => hutchns_shared::LogFormat::Text,
            LogFormat::Json => hutchns_shared::LogFormat::Json,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Print every object of a type, including nested components.
    Class {
        /// Short type name (object, str, int, float, bool), dotted class
        /// path, or `function`.
        type_name: String,

        #[command(flatten)]
        source: SourceArgs,
    },

    /// Print objects grouped by metadata fields, root to leaf.
    Tree {
        /// Metadata fields, one per level.
        #[arg(required = true)]
        fields: Vec<String>,

        #[command(flatten)]
        source: SourceArgs,
    },

    /// Build every namespace listed in the config file.
    Load {
        /// Object database (JSON).
        #[arg(long)]
        db: PathBuf,

        /// Print the namespaces as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Where objects come from and how to print the result.
#[derive(clap::Args)]
pub(crate) struct SourceArgs {
    /// Object database (JSON).
    #[arg(long)]
    pub db: PathBuf,

    /// Module or `module.attr` to search instead of the session
    /// (repeatable; later modules shadow earlier ones).
    #[arg(short, long)]
    pub module: Vec<String>,

    /// Print the namespace as JSON.
    #[arg(long)]
    pub json: bool,
}

impl SourceArgs {
    fn scope_spec(&self) -> ScopeSpec {
        if self.module.is_empty() {
            ScopeSpec::default()
        } else {
            ScopeSpec::sources(self.module.iter().map(String::as_str))
        }
    }
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Config and tracing setup
// ---------------------------------------------------------------------------

/// Load the config named by `--config`, or the default one.
pub(crate) fn load_app_config(cli: &Cli) -> Result<AppConfig> {
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

/// Initialize tracing from CLI flags layered over the config file.
pub(crate) fn init_tracing(cli: &Cli, config: &AppConfig) -> Result<()> {
    let console_level = match cli.verbose {
        0 => parse_level(&config.logging.console_level)?,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let format: hutchns_shared::LogFormat = match cli.log_format {
        Some(format) => format.into(),
        None => config.logging.format.parse()?,
    };

    let dir_logs = cli
        .log_dir
        .clone()
        .or_else(|| config.logging.dir_logs.as_ref().map(PathBuf::from));

    let log_file = setup_logging(&LogOptions {
        dir_logs,
        console_level,
        format,
    })?;

    if cli.debug && cli.verbose < 2 {
        hutchns_shared::debug_mode(Some(true))?;
    }
    if let Some(path) = log_file {
        debug!(path = %path.display(), "session log file");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) fn run(cli: Cli, config: &AppConfig) -> Result<()> {
    match cli.command {
        Command::Class { type_name, source } => cmd_class(&type_name, &source),
        Command::Tree { fields, source } => cmd_tree(&fields, &source),
        Command::Load { db, json } => cmd_load(&db, json, config),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config),
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

/// Load the database into a registry, registering its class paths.
fn open_db(path: &Path) -> Result<(Registry, TypeRegistry)> {
    let mut types = TypeRegistry::new();
    let registry = ObjectDb::from_path(path)?.into_registry(&mut types)?;
    info!(
        db = %path.display(),
        modules = registry.module_names().count(),
        published = registry.published().len(),
        "object database opened"
    );
    Ok((registry, types))
}

fn cmd_class(type_name: &str, source: &SourceArgs) -> Result<()> {
    let (registry, types) = open_db(&source.db)?;
    let ns = class_namespace(&registry, &types, type_name, &source.scope_spec());
    if let Some(message) = unknown_type_message(&types, type_name) {
        return Err(eyre!(message));
    }
    print_namespace(type_name, &ns, source.json)
}

/// Error text for a type name the registry cannot resolve.
fn unknown_type_message(types: &TypeRegistry, type_name: &str) -> Option<String> {
    if types.resolve(type_name).is_ok() {
        return None;
    }
    let known: Vec<&str> = types.registered_paths().collect();
    let known = if known.is_empty() {
        "none".to_string()
    } else {
        known.join(", ")
    };
    Some(format!(
        "unknown type '{type_name}': use object, str, int, float, bool, function, \
         or a class path from the database (known: {known})"
    ))
}

fn cmd_tree(fields: &[String], source: &SourceArgs) -> Result<()> {
    let (registry, _) = open_db(&source.db)?;
    let ns = metadata_namespace(&registry, fields, &source.scope_spec());
    print_namespace(&fields.join("/"), &ns, source.json)
}

fn cmd_load(db: &Path, json: bool, config: &AppConfig) -> Result<()> {
    let (registry, types) = open_db(db)?;
    let spec = ScopeSpec::default();

    let configured = &config.namespaces;
    if configured.class.is_empty() && configured.metadata.is_empty() {
        return Err(eyre!(
            "no namespaces configured: add [[namespaces.class]] or [[namespaces.metadata]] entries"
        ));
    }

    let mut built: Vec<(String, IterableNamespace)> = Vec::new();
    for entry in &configured.class {
        let ns = class_namespace(&registry, &types, entry.type_name.as_str(), &spec);
        debug!(name = %entry.name, count = ns.len(), "built class namespace");
        built.push((entry.name.clone(), ns));
    }
    for entry in &configured.metadata {
        let ns = metadata_namespace(&registry, &entry.fields, &spec);
        debug!(name = %entry.name, count = ns.leaf_count(), "built metadata namespace");
        built.push((entry.name.clone(), ns));
    }

    for (name, ns) in &built {
        if ns.is_empty() {
            warn!(%name, "namespace is empty");
        }
    }

    if json {
        let map: Map<String, Value> = built
            .iter()
            .map(|(name, ns)| (name.clone(), ns.to_json()))
            .collect();
        println!("{}", serde_json::to_string_pretty(&Value::Object(map))?);
        return Ok(());
    }

    println!();
    println!("  Namespaces loaded!");
    for (name, ns) in &built {
        println!("  {name:<16} {} objects", ns.leaf_count());
    }
    println!();
    Ok(())
}

fn print_namespace(title: &str, ns: &IterableNamespace, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&ns.to_json())?);
        return Ok(());
    }
    println!("# {title} ({} objects)", ns.leaf_count());
    print!("{ns}");
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_class_command_with_modules() {
        let cli = Cli::try_parse_from([
            "hutchns", "-v", "class", "function", "--db", "db.json", "-m", "mfx.macros", "-m",
            "mfx.db",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Command::Class { type_name, source } => {
                assert_eq!(type_name, "function");
                assert_eq!(source.module, vec!["mfx.macros", "mfx.db"]);
                assert!(matches!(source.scope_spec(), ScopeSpec::Sources(s) if s.len() == 2));
            }
            _ => panic!("expected class command"),
        }
    }

    #[test]
    fn tree_requires_fields() {
        assert!(Cli::try_parse_from(["hutchns", "tree", "--db", "db.json"]).is_err());
        let cli =
            Cli::try_parse_from(["hutchns", "tree", "beamline", "stand", "--db", "x.json"])
                .unwrap();
        match cli.command {
            Command::Tree { fields, source } => {
                assert_eq!(fields, vec!["beamline", "stand"]);
                assert!(matches!(source.scope_spec(), ScopeSpec::Default { stack_offset: 0 }));
            }
            _ => panic!("expected tree command"),
        }
    }

    #[test]
    fn unknown_type_lists_registered_paths() {
        let mut types = TypeRegistry::new();
        assert!(unknown_type_message(&types, "function").is_none());
        assert!(unknown_type_message(&types, "int").is_none());
        assert!(unknown_type_message(&types, "x.Y").unwrap().contains("known: none"));

        types.register_class("ophyd.signal.Signal");
        types.register_class("ophyd.device.Device");
        assert!(unknown_type_message(&types, "ophyd.signal.Signal").is_none());
        let message = unknown_type_message(&types, "pcdsdevices.pim.PIM").unwrap();
        assert!(message.contains("known: ophyd.device.Device, ophyd.signal.Signal"));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "hutchns", "load", "--db", "db.json", "--debug", "--log-format", "json",
        ])
        .unwrap();
        assert!(cli.debug);
        assert!(matches!(cli.log_format, Some(LogFormat::Json)));
    }
}
