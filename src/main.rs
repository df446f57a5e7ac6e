//! zcio-cli entry point.
//!
//! ## CLI Subcommands
//!
//! - `zcio-cli load <PATH>...` - Load files through a file cache, print stats
//! - `zcio-cli config show|defaults|validate` - Inspect configuration
//! - `zcio-cli version` / `zcio-cli help`

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use zcio::cli::{config_cmd, load_exit_code, run_load, EXIT_FAILURE, EXIT_OK};
use zcio::config;
use zcio::telemetry;

fn main() -> ExitCode {
    // Paths may not be UTF-8; only the command words are decoded.
    let raw: Vec<OsString> = std::env::args_os().collect();
    let args: Vec<String> = raw.iter().map(|a| a.to_string_lossy().into_owned()).collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    let code = match command {
        "load" => run_load_command(raw.get(2..).unwrap_or_default()),
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => config_cmd::run_show(),
                "defaults" => config_cmd::run_defaults(),
                "validate" => config_cmd::run_validate(),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    EXIT_FAILURE
                }
            }
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            EXIT_OK
        }
        "version" | "--version" | "-V" => {
            println!("zcio {}", env!("CARGO_PKG_VERSION"));
            EXIT_OK
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            EXIT_FAILURE
        }
    };
    ExitCode::from(code as u8)
}

fn run_load_command(args: &[OsString]) -> i32 {
    if args.is_empty() {
        eprintln!("Usage: zcio-cli load <PATH>...");
        return EXIT_FAILURE;
    }
    let env = config::load();
    if let Err(e) = telemetry::init_logging(&env.log) {
        eprintln!("Logging disabled: {}", e);
    }
    telemetry::init_metrics();

    let paths: Vec<PathBuf> = args.iter().map(PathBuf::from).collect();
    let report = match run_load(&env, &paths) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {}", e);
            return load_exit_code(&e);
        }
    };
    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Failed to serialize report: {}", e);
            return EXIT_FAILURE;
        }
    }
    if report.failed == 0 {
        EXIT_OK
    } else {
        EXIT_FAILURE
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "zcio - zero-copy file content cache v{}

USAGE:
    zcio-cli <COMMAND> [OPTIONS]

COMMANDS:
    load         Load files through a file cache and print cache statistics
    config       Inspect configuration (show, defaults, validate)
    version      Show version information
    help         Show this help message

EXAMPLES:
    zcio-cli load assets/*.bin
    ZCIO_CACHE_MANAGER=lazy zcio-cli load big.dat small.dat
    zcio-cli config show

ENVIRONMENT:
    ZCIO_CACHE_CAPACITY           Bytes reserved for file buffers (default: 268435456)
    ZCIO_CACHE_MANAGER            naive, cached, lazy or lru (default: cached)
    ZCIO_EVICTION_WARN_THRESHOLD  Evictions per reserve before a warning (default: 100)
    ZCIO_LOG_LEVEL                Log filter directives (default: info)
    ZCIO_LOG_FORMAT               json or pretty (default: json)

EXIT CODES:
    0  Success
    1  Failure (a file could not be loaded)
    2  Configuration error
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "load" => {
            eprintln!(
                "zcio-cli load - Load files through a file cache

USAGE:
    zcio-cli load <PATH>...

DESCRIPTION:
    Loads every file into a file cache configured from ZCIO_* variables,
    releases it, then loads all files a second time. Prints a JSON report
    with the number of files loaded and the cache statistics. With enough
    capacity the second pass is served entirely from the cache.

EXIT CODES:
    0  All files loaded
    1  At least one file could not be read
    2  The cache address space could not be reserved
"
            );
        }
        "config" => {
            eprintln!(
                "zcio-cli config - Inspect configuration

USAGE:
    zcio-cli config <SUBCOMMAND>

SUBCOMMANDS:
    show           Show effective configuration as JSON
    defaults       Show default configuration as JSON
    validate       Check ZCIO_* variables, exit 2 on an invalid value
"
            );
        }
        _ => {
            eprintln!(
                "No detailed help available for '{}'. Use 'zcio-cli help' for general usage.",
                command
            );
        }
    }
}
