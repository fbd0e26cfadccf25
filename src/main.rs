use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use stackmerge::{
    Config, ContainerNames, Metadata, Metrics, Pid, ProcessProfile, ProcessToProfile,
    ProfileApiVersion, StaticContainerNames, concatenate_from_external_file, merge_profiles,
    parse_many_collapsed, parse_one_collapsed_file, scale_rng,
};

#[derive(Debug, Parser)]
#[command(name = "stackmerge", version, about = "Merge collapsed stack profiles")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Merge a perf collapsed listing with per-process runtime profiles.
    Merge {
        /// Collapsed perf output with `<comm>-<pid>/<tid>` root frames.
        #[arg(long)]
        perf: PathBuf,
        /// Runtime profiler output for one process.
        #[arg(long = "runtime", value_name = "PID=FILE", value_parser = parse_pid_pair)]
        runtime: Vec<(Pid, String)>,
        #[arg(long = "appid", value_name = "PID=ID", value_parser = parse_pid_pair)]
        appids: Vec<(Pid, String)>,
        #[arg(long = "container", value_name = "PID=NAME", value_parser = parse_pid_pair)]
        containers: Vec<(Pid, String)>,
        /// JSON object with run metadata.
        #[arg(long)]
        metadata: Option<PathBuf>,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, default_value = "stackmerge.toml")]
        config: PathBuf,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long = "api-version")]
        api_version: Option<ProfileApiVersion>,
    },
    /// Re-emit a previously merged artifact with updated metadata.
    Concat {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        metadata: Option<PathBuf>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Merge {
            perf,
            runtime,
            appids,
            containers,
            metadata,
            out,
            config,
            seed,
            api_version,
        } => {
            let mut config = Config::load_optional(&config);
            if let Some(version) = api_version {
                config.enrichment.profile_api_version = version;
            }
            let seed = seed.or(config.scale_seed);

            let perf_text = std::fs::read_to_string(&perf)
                .with_context(|| format!("failed to read perf output {}", perf.display()))?;
            let perf_profiles: ProcessToProfile = parse_many_collapsed(&perf_text)
                .into_iter()
                .map(|(pid, stacks)| (pid, ProcessProfile::new(stacks)))
                .collect();

            let appids: HashMap<Pid, String> = appids.into_iter().collect();
            let mut runtime_profiles = ProcessToProfile::new();
            for (pid, path) in runtime {
                let stacks = parse_one_collapsed_file(Path::new(&path), None)
                    .with_context(|| format!("failed to read runtime profile {path}"))?;
                let mut profile = ProcessProfile::new(stacks);
                profile.appid = appids.get(&pid).cloned();
                runtime_profiles.insert(pid, profile);
            }
            tracing::info!(
                perf_processes = perf_profiles.len(),
                runtime_processes = runtime_profiles.len(),
                "merging profiles"
            );

            let mut container_names = StaticContainerNames::new(containers.into_iter().collect());
            let collapsed = merge_profiles(
                perf_profiles,
                runtime_profiles,
                &mut scale_rng(seed),
                Some(&mut container_names as &mut dyn ContainerNames),
                &config.enrichment,
                &load_metadata(metadata.as_deref())?,
                &Metrics::default(),
            )?;
            write_output(out.as_deref(), &collapsed)
        }
        Command::Concat { input, metadata, out } => {
            let concatenated = concatenate_from_external_file(&input, &load_metadata(metadata.as_deref())?)
                .with_context(|| format!("failed to concatenate {}", input.display()))?;
            if let (Some(start), Some(end)) = (concatenated.start_time, concatenated.end_time) {
                tracing::info!(%start, %end, "profile window");
            }
            write_output(out.as_deref(), &concatenated.collapsed)
        }
    }
}

fn parse_pid_pair(s: &str) -> Result<(Pid, String), String> {
    let (pid, value) = s.split_once('=').ok_or_else(|| format!("expected PID=VALUE, got {s:?}"))?;
    let pid = pid.parse::<Pid>().map_err(|e| format!("invalid pid {pid:?}: {e}"))?;
    Ok((pid, value.to_string()))
}

fn load_metadata(path: Option<&Path>) -> Result<Metadata> {
    let Some(path) = path else {
        return Ok(Metadata::new());
    };
    let bytes = std::fs::read(path).with_context(|| format!("failed to read metadata {}", path.display()))?;
    let metadata: Metadata = serde_json::from_slice(&bytes)?;
    Ok(metadata)
}

fn write_output(out: Option<&Path>, collapsed: &str) -> Result<()> {
    match out {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, collapsed)?;
            tracing::info!(path = %path.display(), "wrote collapsed profile");
        }
        None => println!("{collapsed}"),
    }
    Ok(())
}
