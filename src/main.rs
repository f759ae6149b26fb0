use clap::{Arg, ArgAction, ArgMatches, Command};
use log::LevelFilter;
use rspamd_move::config::{CliOverrides, Config, COMMON_ACTIONS, DEFAULT_THREADS};
use rspamd_move::enumerate::collect_paths;
use rspamd_move::{BatchExecutor, Event, LogReporter, Reporter, Rspamc, RunConfig};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

fn build_cli() -> Command {
    let common_actions = COMMON_ACTIONS
        .iter()
        .map(|a| format!("'{a}'"))
        .collect::<Vec<_>>()
        .join(", ");

    Command::new("rspamd-move")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Runs rspamc over files/directories and places detected spam/ham in specified output directories")
        .arg(
            Arg::new("emails")
                .long("emails")
                .value_name("PATH")
                .num_args(1..)
                .action(ArgAction::Append)
                .required_unless_present("generate-config")
                .help("Files or directories containing emails to check. Can be given repeatedly"),
        )
        .arg(
            Arg::new("action-to-dir")
                .long("action-to-dir")
                .value_names(["ACTION", "DIR"])
                .num_args(2)
                .action(ArgAction::Append)
                .help(format!(
                    "Move emails with rspamd 'Action: ...' output ACTION into directory DIR. \
                     Can be given once for each action. Common actions: {common_actions}. \
                     Example: --action-to-dir \"no action\" /var/vmail/example.com/mail/.Unclassified/cur"
                )),
        )
        .arg(
            Arg::new("others-dir")
                .long("others-dir")
                .value_name("DIR")
                .help("Move emails not matching any --action-to-dir into this directory. If not given, they are not moved"),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .action(ArgAction::SetTrue)
                .help("Do not move any files, only perform read-only actions"),
        )
        .arg(
            Arg::new("threads")
                .long("threads")
                .value_name("N")
                .value_parser(clap::value_parser!(u64).range(1..))
                .help(format!("Number of emails processed in parallel [default: {DEFAULT_THREADS}]")),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .value_parser(parse_log_level)
                .help("Log level: off, error, warn, info, debug or trace [default: info]"),
        )
        .arg(
            Arg::new("classifier")
                .long("classifier")
                .value_name("PROGRAM")
                .help("rspamc-compatible program to run for each email [default: rspamc]"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("YAML configuration file; command-line flags take precedence"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Write an example configuration file and exit")
                .action(ArgAction::Set),
        )
}

fn parse_log_level(level: &str) -> Result<LevelFilter, String> {
    level
        .parse::<LevelFilter>()
        .map_err(|_| format!("Invalid log level: {level}"))
}

/// `--log-level` replaces `RUST_LOG`; without it `RUST_LOG` applies,
/// falling back to info.
fn logger_builder(matches: &ArgMatches) -> env_logger::Builder {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(&level) = matches.get_one::<LevelFilter>("log-level") {
        builder.filter_level(level);
    }
    builder
}

fn init_logging(matches: &ArgMatches) {
    logger_builder(matches).init();
}

fn cli_overrides(matches: &ArgMatches) -> CliOverrides {
    let action_to_dir = matches
        .get_many::<String>("action-to-dir")
        .map(|values| {
            let values: Vec<&String> = values.collect();
            values
                .chunks_exact(2)
                .map(|pair| (pair[0].clone(), PathBuf::from(pair[1])))
                .collect()
        })
        .unwrap_or_default();

    CliOverrides {
        action_to_dir,
        others_dir: matches.get_one::<String>("others-dir").map(PathBuf::from),
        dry_run: matches.get_flag("dry-run"),
        threads: matches.get_one::<u64>("threads").map(|&n| n as usize),
    }
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<Config> {
    match matches.get_one::<String>("config") {
        Some(path) => Config::from_file(path),
        None => Ok(Config::default()),
    }
}

fn generate_default_config(path: &str) {
    match Config::example().to_file(path) {
        Ok(()) => {
            println!("Example configuration written to: {path}");
            println!("Please edit the action directories to suit your mail store.");
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e}");
            process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let matches = build_cli().get_matches();

    init_logging(&matches);

    if let Some(path) = matches.get_one::<String>("generate-config") {
        generate_default_config(path);
        return;
    }

    let file_config = match load_config(&matches) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e:#}");
            process::exit(1);
        }
    };
    let run_config = match RunConfig::from_sources(&file_config, &cli_overrides(&matches)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e:#}");
            process::exit(1);
        }
    };

    let mut classifier_config = file_config.classifier.clone();
    if let Some(program) = matches.get_one::<String>("classifier") {
        classifier_config.program = program.clone();
    }

    let emails: Vec<PathBuf> = matches
        .get_many::<String>("emails")
        .map(|values| values.map(PathBuf::from).collect())
        .unwrap_or_default();

    let reporter: Arc<dyn Reporter> = Arc::new(LogReporter);
    reporter.report(Event::Scanning {
        inputs: emails.clone(),
    });
    let paths = match collect_paths(&emails, reporter.as_ref()) {
        Ok(paths) => paths,
        Err(e) => {
            eprintln!("Error scanning emails: {e:#}");
            process::exit(1);
        }
    };

    let executor = BatchExecutor::new(
        run_config,
        Arc::new(Rspamc::new(&classifier_config)),
        reporter,
    );
    match executor.run(paths).await {
        Ok(summary) => log::info!("{summary}"),
        Err(e) => {
            log::error!("Aborting: {e:#}");
            process::exit(1);
        }
    }
}
