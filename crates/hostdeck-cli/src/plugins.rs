use anyhow::{Result, bail};
use clap::Subcommand;
use hostdeck_core::CoreContext;

#[derive(Subcommand)]
pub enum PluginsCommand {
    /// List loaded and failed plugin units
    List,
    /// Read or change a unit's settings
    Setting {
        #[command(subcommand)]
        command: SettingCommand,
    },
}

#[derive(Subcommand)]
pub enum SettingCommand {
    /// Print one setting, or all settings of the unit when no key is given
    Get { unit: String, key: Option<String> },
    /// Set a setting
    Set { unit: String, key: String, value: String },
    /// Delete a setting
    Delete { unit: String, key: String },
}

pub fn run(command: PluginsCommand, ctx: CoreContext) -> Result<()> {
    match command {
        PluginsCommand::List => list(&ctx),
        PluginsCommand::Setting { command } => setting(command, &ctx),
    }
}

fn list(ctx: &CoreContext) -> Result<()> {
    let plugins = &ctx.plugins;
    if plugins.units().is_empty() && plugins.failures().is_empty() {
        println!("no plugin units under {}", plugins.root().display());
    }
    for unit in plugins.units() {
        println!(
            "{:<24} {:<10} {:<10} {} by {} ({} subscriptions, {} routes)",
            unit.identifier,
            unit.manifest.version,
            format!("{:?}", unit.state),
            unit.manifest.name,
            if unit.manifest.author.is_empty() { "-" } else { unit.manifest.author.as_str() },
            unit.subscriptions,
            unit.routes,
        );
    }
    for failure in plugins.failures() {
        let reached = failure
            .reached
            .map_or_else(|| "-".to_string(), |s| format!("{s:?}"));
        println!("{:<24} failed (reached {reached}): {}", failure.identifier, failure.error);
    }
    for id in &ctx.load_report.disabled {
        println!("{id:<24} disabled");
    }
    let entries: Vec<&str> = plugins.registry().entries().collect();
    println!("entry points: {}", entries.join(", "));
    Ok(())
}

fn setting(command: SettingCommand, ctx: &CoreContext) -> Result<()> {
    let plugins = &ctx.plugins;
    match command {
        SettingCommand::Get { unit, key: Some(key) } => match plugins.unit_setting(&unit, &key)? {
            Some(value) => println!("{value}"),
            None => bail!("{unit} has no setting {key:?}"),
        },
        SettingCommand::Get { unit, key: None } => {
            for entry in plugins.unit_settings(&unit)? {
                println!("{}={}", entry.key, entry.value);
            }
        }
        SettingCommand::Set { unit, key, value } => {
            plugins.set_unit_setting(&unit, &key, &value)?;
        }
        SettingCommand::Delete { unit, key } => {
            if !plugins.delete_unit_setting(&unit, &key)? {
                bail!("{unit} has no setting {key:?}");
            }
        }
    }
    Ok(())
}
