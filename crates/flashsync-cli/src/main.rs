use anyhow::{anyhow, Context};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use flashsync_cli::{execute, load_config, Action, Overrides};
use flashsync_core::{FilterLevel, JsonFileStateStore, RowId, SyncCoordinator};
use flashsync_store::HttpDocumentStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn dataset_arg() -> Arg {
    Arg::new("dataset")
        .required(true)
        .help("Dataset file name, e.g. vocab1.csv")
}

fn cli() -> Command {
    Command::new("flashsync")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Sync flashcard ratings with the remote document store")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .env("FLASHSYNC_CONFIG")
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("proxy-url")
                .long("proxy-url")
                .global(true)
                .env("FLASHSYNC_PROXY_URL")
                .help("Base URL of the flashsync proxy"),
        )
        .arg(
            Arg::new("state-dir")
                .long("state-dir")
                .global(true)
                .env("FLASHSYNC_STATE_DIR")
                .value_parser(value_parser!(PathBuf))
                .help("Directory for local dataset state"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("pull")
                .about("Load a dataset and restore remote ratings locally")
                .arg(dataset_arg())
                .arg(
                    Arg::new("row")
                        .long("row")
                        .action(ArgAction::Append)
                        .help("Only restore this row; repeat for several"),
                ),
        )
        .subcommand(
            Command::new("rate")
                .about("Rate a row")
                .arg(dataset_arg())
                .arg(Arg::new("row").required(true).help("Row id"))
                .arg(
                    Arg::new("stars")
                        .required(true)
                        .value_parser(value_parser!(u8).range(0..=5))
                        .help("Rating, 0 to 5"),
                ),
        )
        .subcommand(
            Command::new("position")
                .about("Save the last viewed row")
                .arg(dataset_arg())
                .arg(
                    Arg::new("row")
                        .required(true)
                        .value_parser(value_parser!(u32).range(1..))
                        .help("1-based row number"),
                ),
        )
        .subcommand(
            Command::new("settings")
                .about("Change view settings")
                .arg(dataset_arg())
                .arg(
                    Arg::new("filter")
                        .long("filter")
                        .value_parser(value_parser!(FilterLevel))
                        .help("Star filter: all or 0 to 5"),
                )
                .arg(
                    Arg::new("sort-by-stars")
                        .long("sort-by-stars")
                        .value_parser(value_parser!(bool))
                        .help("Sort rows by rating"),
                ),
        )
        .subcommand(
            Command::new("dump")
                .about("Print stored ratings and settings")
                .arg(dataset_arg()),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn action(name: &str, args: &ArgMatches) -> anyhow::Result<Action> {
    let dataset = args
        .get_one::<String>("dataset")
        .cloned()
        .ok_or_else(|| anyhow!("dataset is required"))?;
    let action = match name {
        "pull" => Action::Pull {
            dataset,
            rows: args
                .get_many::<String>("row")
                .map(|rows| rows.map(|row| RowId::from(row.as_str())).collect()),
        },
        "rate" => Action::Rate {
            dataset,
            row: args
                .get_one::<String>("row")
                .map(|row| RowId::from(row.as_str()))
                .ok_or_else(|| anyhow!("row is required"))?,
            stars: *args.get_one::<u8>("stars").ok_or_else(|| anyhow!("stars is required"))?,
        },
        "position" => Action::Position {
            dataset,
            row: *args.get_one::<u32>("row").ok_or_else(|| anyhow!("row is required"))?,
        },
        "settings" => Action::Settings {
            dataset,
            filter_level: args.get_one::<FilterLevel>("filter").copied(),
            sort_by_stars: args.get_one::<bool>("sort-by-stars").copied(),
        },
        "dump" => Action::Dump { dataset },
        other => return Err(anyhow!("unknown command {other}")),
    };
    Ok(action)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("json-logs"));

    let overrides = Overrides {
        proxy_url: matches.get_one::<String>("proxy-url").cloned(),
        state_dir: matches.get_one::<PathBuf>("state-dir").cloned(),
    };
    let config = load_config(matches.get_one::<PathBuf>("config").map(PathBuf::as_path), overrides)?;

    let (name, args) = matches.subcommand().ok_or_else(|| anyhow!("no command given"))?;
    let action = action(name, args)?;

    let endpoints = config
        .http_store()
        .context("no remote configured; pass --proxy-url or set [store] in the config file")?;
    let store = Arc::new(HttpDocumentStore::new(endpoints).context("building HTTP store")?);
    let coordinator = SyncCoordinator::from_config(store, &config)?;
    let local = Arc::new(JsonFileStateStore::new(&config.state_dir));

    let summary = execute(action, coordinator, local).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
