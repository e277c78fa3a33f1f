//! `env show|set`: read-modify-write of the settings file.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use toml::{Table, Value};

use crate::config::Config;
use crate::context::AppContext;

/// Arguments for the env command
#[derive(Debug, Args)]
pub struct EnvArgs {
    #[command(subcommand)]
    pub command: EnvCommand,
}

#[derive(Debug, Subcommand)]
pub enum EnvCommand {
    /// Print the settings file
    Show,
    /// Set `<section>.<key>`; numbers, booleans and arrays keep their type
    Set {
        section: String,
        key: String,
        value: String,
        /// Write the result here instead of over the settings file
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

pub fn run(ctx: &AppContext, args: EnvArgs) -> Result<()> {
    match args.command {
        EnvCommand::Show => {
            let table = read_table(&ctx.config_path)?;
            print!("{}", toml::to_string_pretty(&table)?);
        }
        EnvCommand::Set {
            section,
            key,
            value,
            output,
        } => {
            let mut table = read_table(&ctx.config_path)?;
            set_value(&mut table, &section, &key, &value)?;
            let target = output.as_deref().unwrap_or(&ctx.config_path);
            write_table(target, &table)?;
            println!("{section}.{key} = {value:?} written to {}", target.display());
        }
    }
    Ok(())
}

/// Reads the settings file as a raw table. A missing file is empty.
pub fn read_table(path: &Path) -> Result<Table> {
    if !path.exists() {
        return Ok(Table::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
    content
        .parse::<Table>()
        .with_context(|| format!("Failed to parse settings file: {}", path.display()))
}

pub fn write_table(path: &Path, table: &Table) -> Result<()> {
    let content = toml::to_string_pretty(table)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write settings file: {}", path.display()))
}

/// Sets `section.key`, creating the section if needed. `value` is taken as
/// a TOML literal (`3`, `true`, `["-p", "8080"]`) when that leaves loadable
/// settings, and as a string otherwise. Edits that would make the settings
/// unloadable are refused and leave `table` unchanged.
pub fn set_value(table: &mut Table, section: &str, key: &str, value: &str) -> Result<()> {
    let candidates = parse_literal(value)
        .into_iter()
        .chain(std::iter::once(Value::String(value.to_string())));

    let mut rejection = None;
    for candidate in candidates {
        let mut edited = table.clone();
        insert(&mut edited, section, key, candidate)?;
        match Value::Table(edited.clone()).try_into::<Config>() {
            Ok(_) => {
                *table = edited;
                return Ok(());
            }
            Err(e) => rejection = Some(e),
        }
    }
    match rejection {
        Some(e) => Err(e).with_context(|| format!("Refusing to set {section}.{key} = {value:?}")),
        None => bail!("Refusing to set {section}.{key} = {value:?}"),
    }
}

fn insert(table: &mut Table, section: &str, key: &str, value: Value) -> Result<()> {
    let entry = table
        .entry(section.to_string())
        .or_insert_with(|| Value::Table(Table::new()));
    let Value::Table(section_table) = entry else {
        bail!("`{section}` is not a section in the settings file");
    };
    section_table.insert(key.to_string(), value);
    Ok(())
}

/// Reads `value` as a single TOML value, if it is one.
fn parse_literal(value: &str) -> Option<Value> {
    let mut doc: Table = format!("value = {value}").parse().ok()?;
    if doc.len() != 1 {
        return None;
    }
    doc.remove("value")
}
