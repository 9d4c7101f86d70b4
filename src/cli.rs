use std::path::PathBuf;

use anyhow::{bail, Result};

/// What the binary was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List the field names available on the project's bugs.
    Fields { project: Option<String> },
    /// Run an export.
    Export {
        project: Option<String>,
        out: PathBuf,
        fields: Vec<String>,
        attachments: bool,
    },
    Help,
}

/// Parse CLI args (without the binary name).
///
/// Supported forms:
///   bug-export fields [--project <name>]
///   bug-export export --out <folder> --fields <a,b,c> [--attachments] [--project <name>]
pub fn parse_args(args: &[String]) -> Result<Command> {
    let Some(subcommand) = args.first() else {
        return Ok(Command::Help);
    };

    match subcommand.as_str() {
        "help" | "--help" | "-h" => Ok(Command::Help),
        "fields" => {
            let mut project = None;
            parse_flags(&args[1..], |flag, value| match flag {
                "--project" => {
                    project = Some(value?.to_string());
                    Ok(())
                }
                other => bail!("Unknown flag for fields: {other}"),
            })?;
            Ok(Command::Fields { project })
        }
        "export" => {
            let mut project = None;
            let mut out = None;
            let mut fields = None;
            let mut attachments = false;
            parse_flags(&args[1..], |flag, value| match flag {
                "--project" => {
                    project = Some(value?.to_string());
                    Ok(())
                }
                "--out" => {
                    out = Some(PathBuf::from(value?));
                    Ok(())
                }
                "--fields" => {
                    fields = Some(split_field_list(value?));
                    Ok(())
                }
                "--attachments" => {
                    attachments = true;
                    Ok(())
                }
                other => bail!("Unknown flag for export: {other}"),
            })?;

            let Some(out) = out else {
                bail!("Missing --out <folder>\n\nUsage: bug-export export --out <folder> --fields <a,b,c> [--attachments]");
            };
            let Some(fields) = fields else {
                bail!("Missing --fields <a,b,c>\n\nRun `bug-export fields` to see what is available.");
            };
            Ok(Command::Export {
                project,
                out,
                fields,
                attachments,
            })
        }
        other => bail!("Unknown command: {other}\n\nRun `bug-export help` for usage."),
    }
}

/// Walk flag/value pairs. Value-less flags get `Err` passed as their value;
/// the callback decides whether that is acceptable.
fn parse_flags<'a>(
    args: &'a [String],
    mut on_flag: impl FnMut(&'a str, Result<&'a str>) -> Result<()>,
) -> Result<()> {
    let mut i = 0;
    while i < args.len() {
        let flag = args[i].as_str();
        if !flag.starts_with("--") {
            bail!("Unexpected argument: {flag}");
        }
        if flag == "--attachments" {
            on_flag(flag, Err(anyhow::anyhow!("flag takes no value")))?;
            i += 1;
            continue;
        }
        let Some(value) = args.get(i + 1) else {
            bail!("Missing value for {flag}");
        };
        on_flag(flag, Ok(value.as_str()))?;
        i += 2;
    }
    Ok(())
}

/// Field selections arrive comma-separated; order is preserved because it
/// becomes the column order. Blank entries are dropped, so an entirely
/// blank list reaches the pipeline empty and is rejected there, before any
/// file is touched.
fn split_field_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

pub fn print_help() {
    println!("bug-export — export a project's bugs to a spreadsheet\n");
    println!("USAGE:");
    println!("  bug-export fields [--project <name>]");
    println!("      List the fields available for selection");
    println!("  bug-export export --out <folder> --fields <a,b,c> [--attachments] [--project <name>]");
    println!("      Export all bugs to \"<folder>/<project> - Bugs.xlsx\"");
    println!();
    println!("EXPORT OPTIONS:");
    println!("  --out <folder>      Destination folder for the workbook and attachments");
    println!("  --fields <a,b,c>    Comma-separated field names; order becomes column order");
    println!("  --attachments       Also download every reachable attachment");
    println!("  --project <name>    Override the project from ~/.bug-export/config.toml");
    println!();
    println!("EXAMPLES:");
    println!("  bug-export fields");
    println!("  bug-export export --out ./exports --fields \"Title,State,History\" --attachments");
}
