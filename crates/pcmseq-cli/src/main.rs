use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use pcmseq::{Mode, PcmConfig, PcmError, PcmFile, Timestamp};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Info,
    Dump,
}

#[derive(Debug)]
struct CliConfig {
    command: Command,
    path: PathBuf,
    entry: u32,
    start: Option<usize>,
    stop: Option<usize>,
    json_output: bool,
    verbose: bool,
    config_path: Option<PathBuf>,
}

#[derive(Debug)]
enum CliError {
    /// Help was printed; not a failure.
    Help,
    Usage(String),
    Pcm(PcmError),
}

impl From<PcmError> for CliError {
    fn from(err: PcmError) -> Self {
        Self::Pcm(err)
    }
}

#[derive(Debug, Serialize)]
struct EntryRow {
    entry: u32,
    samples: u32,
    sample_rate: u32,
    timestamp: Timestamp,
}

#[derive(Debug, Serialize)]
struct DumpOutput<'a> {
    entry: u32,
    start: usize,
    samples: &'a [i16],
}

fn print_help() {
    let help = "\
pcmseq - inspect PCM_SEQ2 sample files

USAGE:
    pcmseq info <FILE> [OPTIONS]
    pcmseq dump <FILE> [--entry N] [--start S] [--stop E] [OPTIONS]

OPTIONS:
    --entry <N>         Entry to dump (default: 1)
    --start <S>         First sample to print (default: 0)
    --stop <E>          Last sample to print, inclusive (default: end of entry)
    --config <PATH>     TOML file with handle settings
    --json              Emit machine-readable JSON output
    -v, --verbose       Log at debug level (RUST_LOG overrides)
    -h, --help          Show this help
";
    println!("{help}");
}

fn take_value<'a>(args: &'a [String], index: &mut usize, flag: &str) -> Result<&'a str, CliError> {
    *index += 1;
    args.get(*index)
        .map(String::as_str)
        .ok_or_else(|| CliError::Usage(format!("{flag} requires a value")))
}

fn parse_number<T: std::str::FromStr>(raw: &str, flag: &str) -> Result<T, CliError> {
    raw.parse::<T>()
        .map_err(|_| CliError::Usage(format!("invalid {flag} value: {raw}")))
}

fn parse_args(args: &[String]) -> Result<CliConfig, CliError> {
    let mut command = None;
    let mut path = None;
    let mut config = CliConfig {
        command: Command::Info,
        path: PathBuf::new(),
        entry: 1,
        start: None,
        stop: None,
        json_output: false,
        verbose: false,
        config_path: None,
    };

    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--entry" => {
                config.entry = parse_number(take_value(args, &mut index, "--entry")?, "--entry")?;
            }
            "--start" => {
                let raw = take_value(args, &mut index, "--start")?;
                config.start = Some(parse_number(raw, "--start")?);
            }
            "--stop" => {
                let raw = take_value(args, &mut index, "--stop")?;
                config.stop = Some(parse_number(raw, "--stop")?);
            }
            "--config" => {
                let raw = take_value(args, &mut index, "--config")?;
                config.config_path = Some(PathBuf::from(raw));
            }
            "--json" => config.json_output = true,
            "-v" | "--verbose" => config.verbose = true,
            "-h" | "--help" => {
                print_help();
                return Err(CliError::Help);
            }
            flag if flag.starts_with('-') => {
                return Err(CliError::Usage(format!("unknown option: {flag}")));
            }
            word if command.is_none() => {
                command = Some(match word {
                    "info" => Command::Info,
                    "dump" => Command::Dump,
                    other => return Err(CliError::Usage(format!("unknown command: {other}"))),
                });
            }
            word if path.is_none() => path = Some(PathBuf::from(word)),
            extra => return Err(CliError::Usage(format!("unexpected argument: {extra}"))),
        }
        index += 1;
    }

    config.command = command.ok_or_else(|| CliError::Usage("missing command".to_owned()))?;
    config.path = path.ok_or_else(|| CliError::Usage("missing file argument".to_owned()))?;
    Ok(config)
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .try_init();
}

fn load_config(path: Option<&PathBuf>) -> Result<PcmConfig, CliError> {
    let Some(path) = path else {
        return Ok(PcmConfig::default());
    };
    let text = std::fs::read_to_string(path).map_err(PcmError::from)?;
    let config = toml::from_str(&text)
        .map_err(|err| CliError::Usage(format!("invalid config {}: {err}", path.display())))?;
    debug!(path = %path.display(), ?config, "loaded config");
    Ok(config)
}

fn to_json<T: Serialize>(value: &T) -> Result<String, CliError> {
    serde_json::to_string_pretty(value)
        .map_err(|err| CliError::Pcm(PcmError::internal(format!("json serialize failed: {err}"))))
}

fn info(file: &mut PcmFile, json_output: bool) -> Result<(), CliError> {
    let count = file.stat()?.entry_count;
    let mut rows = Vec::with_capacity(count as usize);
    for entry in 1..=count {
        file.seek(entry)?;
        let stat = file.stat()?;
        rows.push(EntryRow {
            entry,
            samples: stat.nsamples,
            sample_rate: stat.sample_rate,
            timestamp: stat.timestamp,
        });
    }

    if json_output {
        println!("{}", to_json(&rows)?);
    } else {
        println!("{}: {count} entries", file.path().display());
        for row in &rows {
            println!(
                "{:>5}  {:>10} samples  {:>6} Hz  {}",
                row.entry, row.samples, row.sample_rate, row.timestamp
            );
        }
    }
    Ok(())
}

fn sample_index(value: Option<usize>, default: u32, flag: &str) -> Result<u32, CliError> {
    value.map_or(Ok(default), |raw| {
        u32::try_from(raw).map_err(|_| CliError::Usage(format!("{flag} out of range: {raw}")))
    })
}

fn dump(file: &mut PcmFile, config: &CliConfig) -> Result<(), CliError> {
    let start = sample_index(config.start, 0, "--start")?;
    let stop = sample_index(config.stop, u32::MAX, "--stop")?;
    file.seek(config.entry)?;
    let window = file.read_range(start, stop)?;
    let start = start as usize;

    if config.json_output {
        let output = DumpOutput {
            entry: config.entry,
            start,
            samples: window,
        };
        println!("{}", to_json(&output)?);
    } else {
        for (offset, sample) in window.iter().enumerate() {
            println!("{}\t{sample}", start + offset);
        }
    }
    Ok(())
}

fn run(args: &[String]) -> Result<(), CliError> {
    let config = parse_args(args)?;
    init_logging(config.verbose);
    let handle_config = load_config(config.config_path.as_ref())?;

    let mut file = PcmFile::open_with(&config.path, Mode::Read, &handle_config)?;
    match config.command {
        Command::Info => info(&mut file, config.json_output)?,
        Command::Dump => dump(&mut file, &config)?,
    }
    file.close()?;
    Ok(())
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    match run(&args) {
        Ok(()) | Err(CliError::Help) => ExitCode::SUCCESS,
        Err(CliError::Usage(message)) => {
            eprintln!("error: {message}");
            eprintln!("run `pcmseq --help` for usage");
            ExitCode::from(64)
        }
        Err(CliError::Pcm(err)) => {
            eprintln!("error: {err}");
            if let Some(hint) = err.suggestion() {
                eprintln!("hint: {hint}");
            }
            ExitCode::from(u8::try_from(err.exit_code()).unwrap_or(1))
        }
    }
}
