use std::io::BufRead;

use clap::{Parser, Subcommand};

use krbgate::CredentialChecker;
use krbgate::config;

#[derive(Parser)]
#[command(
    name = "krbgate",
    version,
    about = "Password checker backed by a kinit-style external tool"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one authentication attempt and report the verdict
    Check {
        /// Principal to check, e.g. alice@EXAMPLE.COM
        username: String,

        /// Read the password from stdin (first line) instead of prompting
        #[arg(long)]
        password_stdin: bool,

        /// Override the configured minimum attempt duration
        #[arg(long, value_name = "MS")]
        min_duration_ms: Option<u64>,

        /// Print the verdict as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the resolved configuration
    Config,
}

fn read_password(username: &str, from_stdin: bool) -> anyhow::Result<String> {
    if from_stdin {
        // Exactly one line; the writer may keep the pipe open.
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    } else {
        let password = dialoguer::Password::new()
            .with_prompt(format!("Password for {username}"))
            .interact()?;
        Ok(password)
    }
}

fn cmd_check(
    username: &str,
    password_stdin: bool,
    min_duration_ms: Option<u64>,
    json: bool,
) -> anyhow::Result<i32> {
    let mut config = config::load()?;
    if let Some(ms) = min_duration_ms {
        config.min_duration_ms = ms;
    }
    config.validate()?;

    let password = read_password(username, password_stdin)?;
    let checker = CredentialChecker::new(config);
    let valid = checker.authenticate(username, &password);

    if json {
        println!(
            "{}",
            serde_json::json!({ "username": username, "valid": valid })
        );
    } else if valid {
        println!("valid");
    } else {
        println!("invalid");
    }

    Ok(if valid { 0 } else { 1 })
}

fn cmd_config() -> anyhow::Result<i32> {
    match config::config_path() {
        Some(path) if path.exists() => println!("# {}", path.display()),
        Some(path) => println!("# {} (not present, using defaults)", path.display()),
        None => println!("# no config directory resolved, using defaults"),
    }
    let config = config::load()?;
    print!("{}", toml::to_string(&config)?);
    Ok(0)
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let exit_code = match &cli.command {
        Commands::Check {
            username,
            password_stdin,
            min_duration_ms,
            json,
        } => cmd_check(username, *password_stdin, *min_duration_ms, *json).unwrap_or_else(|e| {
            eprintln!("[krbgate] error: {e:#}");
            2
        }),
        Commands::Config => cmd_config().unwrap_or_else(|e| {
            eprintln!("[krbgate] error: {e:#}");
            2
        }),
    };
    std::process::exit(exit_code);
}
