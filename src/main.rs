use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use sysplug_core::config::{AppConfig, LogFormat, LoggingConfig};
use sysplug_filter::PluginFieldCheck;
use sysplug_plugin_api::{
    Capabilities, FieldInfo, OpenParam, Plugin, PluginManager, PluginMetadata, SchemaType,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// sysplug - load and inspect capability plugins
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "SYSPLUG_CONFIG", default_value = "sysplug.yaml")]
    config: PathBuf,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load every configured plugin and list it
    List,

    /// Show the metadata, schema and fields of a plugin
    Info {
        /// Plugin name
        name: String,
    },

    /// Initialize plugins with their configured init config, then destroy them
    Init {
        /// Only initialize this plugin
        name: Option<String>,
    },

    /// Parse a field reference against an extraction plugin
    Field {
        /// Plugin name
        plugin: String,
        /// Field reference, e.g. `dummy.value[2]`
        reference: String,
    },
}

#[derive(Serialize)]
struct PluginSummary<'a> {
    #[serde(flatten)]
    metadata: &'a PluginMetadata,
    capabilities: String,
    id: u32,
    event_source: &'a str,
}

#[derive(Serialize)]
struct PluginDetails<'a> {
    #[serde(flatten)]
    summary: PluginSummary<'a>,
    init_schema_type: SchemaType,
    init_schema: String,
    fields: &'a [FieldInfo],
    extract_event_sources: Vec<&'a str>,
    parse_event_sources: Vec<&'a str>,
}

fn summary(plugin: &Plugin) -> PluginSummary<'_> {
    PluginSummary {
        metadata: plugin.metadata(),
        capabilities: plugin.capabilities().to_string(),
        id: plugin.id(),
        event_source: plugin.event_source(),
    }
}

fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.filter_directives())
            .context("Invalid logging configuration")?,
    };
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match (config.format, config.timestamps) {
        (LogFormat::Json, _) => builder.json().init(),
        (LogFormat::Text, true) => builder.init(),
        (LogFormat::Text, false) => builder.without_time().init(),
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn list(manager: &PluginManager, json: bool) -> Result<()> {
    let plugins = manager.list();
    if json {
        let summaries: Vec<_> = plugins.iter().map(|p| summary(p)).collect();
        return print_json(&summaries);
    }
    for plugin in &plugins {
        println!(
            "{} {} [{}] {}",
            plugin.name(),
            plugin.version(),
            plugin.capabilities(),
            plugin.description()
        );
    }
    Ok(())
}

fn show_info(manager: &PluginManager, name: &str, json: bool) -> Result<()> {
    let plugin = manager
        .get(name)
        .with_context(|| format!("Plugin not loaded: {}", name))?;
    let (schema_type, schema) = plugin.get_init_schema();

    if json {
        return print_json(&PluginDetails {
            summary: summary(&plugin),
            init_schema_type: schema_type,
            init_schema: schema,
            fields: plugin.fields(),
            extract_event_sources: plugin.extract_event_sources().iter().collect(),
            parse_event_sources: plugin.parse_event_sources().iter().collect(),
        });
    }

    println!("Name:         {}", plugin.name());
    println!("Description:  {}", plugin.description());
    println!("Contact:      {}", plugin.contact());
    println!("Version:      {}", plugin.version());
    println!("API version:  {}", plugin.required_api_version());
    println!("Capabilities: {}", plugin.capabilities());
    if plugin.capabilities().contains(Capabilities::SOURCING) {
        println!("Source:       {} (id {})", plugin.event_source(), plugin.id());
    }
    println!("Init schema:  {}", schema_type);
    if !plugin.fields().is_empty() {
        println!("Fields:");
        for field in plugin.fields() {
            println!("  {:<32} {:<9} {}", field.name, field.field_type, field.description);
        }
    }
    Ok(())
}

fn init_plugins(
    manager: &PluginManager,
    config: &AppConfig,
    only: Option<&str>,
    json: bool,
) -> Result<()> {
    let plugins = match only {
        Some(name) => vec![manager
            .get(name)
            .with_context(|| format!("Plugin not loaded: {}", name))?],
        None => manager.list(),
    };

    let mut failed = 0;
    for plugin in &plugins {
        let init_config = config
            .get_plugin(plugin.name())
            .map(|c| c.init_config.to_config_string())
            .unwrap_or_default();
        if let Err(e) = plugin.init(&init_config) {
            error!("Failed to initialize {}: {}", plugin.name(), e);
            failed += 1;
            continue;
        }

        let params: Vec<OpenParam> = if plugin.capabilities().contains(Capabilities::SOURCING) {
            plugin.list_open_params()?
        } else {
            Vec::new()
        };
        if json {
            print_json(&serde_json::json!({
                "name": plugin.name(),
                "initialized": true,
                "open_params": params,
            }))?;
        } else {
            println!("{}: initialized", plugin.name());
            for param in &params {
                println!("  open param: {} {}", param.value, param.desc);
            }
        }
    }

    manager.destroy_all();
    if failed > 0 {
        bail!("{} plugin(s) failed to initialize", failed);
    }
    Ok(())
}

fn check_field(manager: &PluginManager, plugin: &str, reference: &str) -> Result<()> {
    let plugin = manager
        .get(plugin)
        .with_context(|| format!("Plugin not loaded: {}", plugin))?;
    let mut check = PluginFieldCheck::new(plugin, manager.sources().clone())?;

    let Some(consumed) = check.parse_field_name(reference)? else {
        bail!("{} does not start with a field of {}", reference, check.info_name());
    };
    let field = check.field().context("No field selected")?;
    println!("Field:     {} ({})", field.name, field.field_type);
    match check.argument() {
        Some(arg) => match arg.key() {
            Some(key) => println!("Argument:  key {:?}", key),
            None => println!("Argument:  index {}", arg.index()),
        },
        None => println!("Argument:  none"),
    }
    println!("Consumed:  {} of {} bytes", consumed, reference.len());
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::from_config_builder(&args.config)
        .with_context(|| format!("Failed to load config file: {:?}", args.config))?;
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    config.validate().context("Invalid configuration")?;
    init_logging(&config.logging)?;

    info!("Configuration loaded from {:?}", args.config);

    let manager = PluginManager::new();
    let loaded = manager.load_all(&config)?;
    info!("Loaded {} plugin(s)", loaded);

    let result = match &args.command {
        Command::List => list(&manager, args.json),
        Command::Info { name } => show_info(&manager, name, args.json),
        Command::Init { name } => init_plugins(&manager, &config, name.as_deref(), args.json),
        Command::Field { plugin, reference } => check_field(&manager, plugin, reference),
    };

    manager.destroy_all();
    result
}
