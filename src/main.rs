use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use als_resolver::{
    init_tracing, read_addresses, write_records, AddressResolver, AppConfig, BatchSlice,
    DiagnosticsSink, LookupService, OutputRecord, RateLimiter,
};

const USAGE: &str = "\
Resolve free-text Hong Kong addresses against the government lookup service.

Usage: als-resolver --input <file> [options]

Options:
      --input <file>    CSV with an 'address' column (required)
      --output <file>   output CSV path (default: scanned_addresses.csv)
      --log-dir <dir>   directory for the failure log (default: .)
      --start <n>       first data row to process, zero based
      --stop <n>        stop before this data row
  -h, --help            print this help
  -V, --version         print the version";

#[derive(Debug)]
struct Opts {
    input: PathBuf,
    output: PathBuf,
    log_dir: PathBuf,
    slice: BatchSlice,
}

fn print_usage() {
    eprintln!("{USAGE}");
}

fn parse_args<I: Iterator<Item = String>>(mut args: I) -> Result<Opts, String> {
    let mut input: Option<PathBuf> = None;
    let mut output = PathBuf::from("scanned_addresses.csv");
    let mut log_dir = PathBuf::from(".");
    let mut slice = BatchSlice::default();

    while let Some(arg) = args.next() {
        let (flag, inline) = split_flag(&arg);
        match flag {
            "--input" => input = Some(PathBuf::from(take_value(flag, inline, &mut args)?)),
            "--output" => output = PathBuf::from(take_value(flag, inline, &mut args)?),
            "--log-dir" => log_dir = PathBuf::from(take_value(flag, inline, &mut args)?),
            "--start" => {
                slice.start = Some(parse_index(flag, &take_value(flag, inline, &mut args)?)?)
            }
            "--stop" => {
                slice.stop = Some(parse_index(flag, &take_value(flag, inline, &mut args)?)?)
            }
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            other => return Err(format!("unexpected argument: {other}")),
        }
    }

    let input = input.ok_or_else(|| "missing --input".to_string())?;
    Ok(Opts {
        input,
        output,
        log_dir,
        slice,
    })
}

fn split_flag(arg: &str) -> (&str, Option<&str>) {
    match arg.split_once('=') {
        Some((flag, value)) if arg.starts_with("--") => (flag, Some(value)),
        _ => (arg, None),
    }
}

fn take_value(
    flag: &str,
    inline: Option<&str>,
    args: &mut impl Iterator<Item = String>,
) -> Result<String, String> {
    match inline {
        Some(value) => Ok(value.to_string()),
        None => args
            .next()
            .ok_or_else(|| format!("{flag} requires a value")),
    }
}

fn parse_index(flag: &str, value: &str) -> Result<usize, String> {
    value
        .parse::<usize>()
        .map_err(|_| format!("invalid {flag} value: {value}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let opts = match parse_args(std::env::args().skip(1)) {
        Ok(opts) => opts,
        Err(message) => {
            eprintln!("{message}");
            print_usage();
            std::process::exit(2);
        }
    };

    let config = AppConfig::from_env();
    let diag = DiagnosticsSink::new(&opts.log_dir, &config)?;
    let throttle = Arc::new(RateLimiter::new(config.rate_limit)?);
    let lookup = LookupService::new(&config);
    let resolver = AddressResolver::new(lookup, Arc::clone(&throttle), diag.clone(), &config);

    let addresses = read_addresses(&opts.input, opts.slice)?;
    info!(
        count = addresses.len(),
        input = %opts.input.display(),
        rate_limit = config.rate_limit,
        max_in_flight = config.max_in_flight,
        "starting address resolution"
    );

    let started = Instant::now();
    let results = resolver.resolve_batch(&addresses).await;
    let elapsed = started.elapsed();

    let records: Vec<OutputRecord> = results.into_iter().flatten().collect();
    write_records(&opts.output, &records)?;

    info!(
        resolved = records.len(),
        failed = addresses.len() - records.len(),
        elapsed_secs = elapsed.as_secs_f64(),
        output = %opts.output.display(),
        "finished address resolution"
    );
    for (stage, count) in diag.totals() {
        warn!(stage = stage.as_str(), count, "addresses dropped");
    }

    diag.flush()?;
    throttle.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Opts, String> {
        parse_args(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn parses_flags_with_separate_and_inline_values() {
        let opts = parse(&[
            "--input",
            "in.csv",
            "--output=out.csv",
            "--start=5",
            "--stop",
            "10",
        ])
        .unwrap();
        assert_eq!(opts.input, PathBuf::from("in.csv"));
        assert_eq!(opts.output, PathBuf::from("out.csv"));
        assert_eq!(opts.slice.start, Some(5));
        assert_eq!(opts.slice.stop, Some(10));
        assert_eq!(opts.log_dir, PathBuf::from("."));
    }

    #[test]
    fn requires_input() {
        let err = parse(&["--output", "out.csv"]).unwrap_err();
        assert!(err.contains("--input"), "{err}");
    }

    #[test]
    fn rejects_bad_indexes_and_unknown_flags() {
        assert!(parse(&["--input", "in.csv", "--start", "abc"]).is_err());
        assert!(parse(&["--input", "in.csv", "--frobnicate"]).is_err());
    }
}
