use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use provx_core::{Config, IndexHandle, ProfileQuery, ResultMode};

mod cli;
mod output;

use cli::{CommandCli, IndexArgs, ListArgs, ProvxCli, ShowArgs};
use output::{CommandStatus, Outcome};

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = ProvxCli::parse();
    init_tracing(cli.trace, cli.verbose);

    let config = build_config(&cli).map_err(|err| eyre!("{err:#}"))?;
    let handle = IndexHandle::open(&config);
    let outcome = match &cli.command {
        CommandCli::List(args) => run_list(&handle, args),
        CommandCli::Show(args) => run_show(&handle, args),
        CommandCli::Index(args) => run_index(&handle, &config, args),
    };
    let code = output::emit(cli.json, &outcome)?;

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(trace: bool, verbose: u8) {
    let level = if trace {
        "trace"
    } else {
        match verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = format!("provx={level},provx_cli={level},provx_core={level},provx_domain={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn build_config(cli: &ProvxCli) -> anyhow::Result<Config> {
    let mut config = Config::from_env()?;
    if !cli.profile_dirs.is_empty() {
        config = config.with_profile_directories(cli.profile_dirs.clone(), "--profile-dir")?;
    }
    if let Some(path) = &cli.index_path {
        config = config.with_index_path(path.clone(), "--index-path")?;
    }
    Ok(config)
}

fn run_list(handle: &IndexHandle, args: &ListArgs) -> Outcome {
    let mut query = ProfileQuery::new(args.platform)
        .with_distribution(args.distribution)
        .with_include_expired(args.include_expired)
        .with_mode(if args.unique {
            ResultMode::UniqueByName
        } else {
            ResultMode::All
        });
    if let Some(bundle_id) = &args.bundle_id {
        query = query.with_bundle_identifier(bundle_id.as_str());
    }
    if !args.thumbprints.is_empty() {
        query = query.with_thumbprints(&args.thumbprints);
    }

    let mut rejections = Vec::new();
    let sink = args.explain.then_some(&mut rejections);
    match handle.query(&query, sink) {
        Ok(profiles) => output::profile_list(args.platform, &profiles, &rejections),
        Err(err) => Outcome::user_error(err.to_string()),
    }
}

fn run_show(handle: &IndexHandle, args: &ShowArgs) -> Outcome {
    let mut rejections = Vec::new();
    let sink = args.explain.then_some(&mut rejections);
    match handle.find_one(args.platform, &args.name_or_uuid, sink) {
        Some(profile) => output::profile_detail(&profile),
        None => output::not_found(args.platform, &args.name_or_uuid, &rejections),
    }
}

fn run_index(handle: &IndexHandle, config: &Config, args: &IndexArgs) -> Outcome {
    let reconciled = if args.rebuild {
        handle.rebuild()
    } else {
        handle.refresh()
    };
    let status = match reconciled.report.save {
        Some(outcome) if !outcome.is_saved() => CommandStatus::Failure,
        _ => CommandStatus::Ok,
    };
    output::index_report(status, config, &reconciled)
}
