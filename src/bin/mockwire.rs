use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use mockwire::api::mock_api;
use mockwire::RuntimeConfig;

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Check(String),
    Rules,
    Records,
    Toggle(bool),
}

#[derive(Debug, PartialEq, Eq)]
struct CliConfig {
    storage_path: Option<PathBuf>,
    command: Command,
}

fn parse_args() -> Result<CliConfig> {
    parse_args_from(std::env::args().skip(1))
}

fn print_usage() {
    eprintln!("mockwire {}", mockwire::VERSION);
    eprintln!();
    eprintln!("Usage: mockwire [--storage-path <DIR>] <COMMAND>");
    eprintln!("  check <URL>      Show how a request to URL would be handled");
    eprintln!("  rules            Print the stored rule set");
    eprintln!("  records          Print the stored mock records");
    eprintln!("  toggle <on|off>  Turn interception on or off globally");
}

fn parse_args_from<I>(mut args: I) -> Result<CliConfig>
where
    I: Iterator<Item = String>,
{
    let mut storage_path: Option<PathBuf> = None;
    let mut command: Option<Command> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--storage-path" => {
                let path = args.next().context("--storage-path needs a directory")?;
                storage_path = Some(PathBuf::from(path));
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "check" => {
                let url = args.next().context("check needs a URL")?;
                command = Some(Command::Check(url));
            }
            "rules" => command = Some(Command::Rules),
            "records" => command = Some(Command::Records),
            "toggle" => {
                let value = args.next().context("toggle needs on or off")?;
                let enabled = match value.to_lowercase().as_str() {
                    "on" | "true" | "1" => true,
                    "off" | "false" | "0" => false,
                    other => bail!("toggle expects on or off, got {other}"),
                };
                command = Some(Command::Toggle(enabled));
            }
            _ => {
                eprintln!("Unknown argument: {arg}");
            }
        }
    }

    match command {
        Some(command) => Ok(CliConfig {
            storage_path,
            command,
        }),
        None => {
            print_usage();
            bail!("no command given")
        }
    }
}

async fn run(command: Command) -> Result<()> {
    match command {
        Command::Check(url) => {
            let result = mock_api::check_api_match(&url).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Rules => {
            let rule_set = mock_api::get_config().await?;
            println!("{}", serde_json::to_string_pretty(&rule_set)?);
        }
        Command::Records => {
            let records = mockwire::storage::list_mock_records().await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Command::Toggle(enabled) => {
            mock_api::toggle_global(enabled).await?;
            println!(
                "interception {}",
                if enabled { "enabled" } else { "disabled" }
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = parse_args()?;

    let mut config = RuntimeConfig::from_env();
    if let Some(path) = cli.storage_path {
        config.storage_path = path;
    }
    mock_api::start_runtime(config).await?;
    let outcome = run(cli.command).await;
    mock_api::stop_runtime().await?;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> std::vec::IntoIter<String> {
        list.iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn check_command_takes_url() {
        let cfg = parse_args_from(args(&["check", "https://api.example.com/users"])).unwrap();
        assert_eq!(
            cfg.command,
            Command::Check("https://api.example.com/users".into())
        );
        assert_eq!(cfg.storage_path, None);
    }

    #[test]
    fn storage_path_precedes_command() {
        let cfg = parse_args_from(args(&["--storage-path", "/tmp/mw", "rules"])).unwrap();
        assert_eq!(cfg.storage_path, Some(PathBuf::from("/tmp/mw")));
        assert_eq!(cfg.command, Command::Rules);
    }

    #[test]
    fn toggle_accepts_on_off() {
        let on = parse_args_from(args(&["toggle", "ON"])).unwrap();
        assert_eq!(on.command, Command::Toggle(true));
        let off = parse_args_from(args(&["toggle", "off"])).unwrap();
        assert_eq!(off.command, Command::Toggle(false));
        assert!(parse_args_from(args(&["toggle", "maybe"])).is_err());
    }

    #[test]
    fn missing_values_are_errors() {
        assert!(parse_args_from(args(&["check"])).is_err());
        assert!(parse_args_from(args(&[])).is_err());
    }
}
