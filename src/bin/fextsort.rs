use std::path::PathBuf;
use std::process;

use anyhow::{Context, bail};
use clap::{ArgGroup, Parser};
use log::info;
use regex::Regex;

use extsort_rs::common::Encoding;
use extsort_rs::extsort::{GroupCount, SortConfig, SortEngine, SortError, SortOrder};

#[derive(Parser)]
#[command(
    name = "fextsort",
    version,
    about = "Sort a line-oriented record file too large for memory",
    after_help = "Records are split into sorted batches of at most --max-records lines, \
                  spilled to temporary files and merged pairwise until one file remains. \
                  Grouping options (--first, --no-dups, ...) compare records by the sort key.",
    group(ArgGroup::new("post").args(["first", "last", "all_dups", "no_dups", "first_dup", "last_dup", "count"]))
)]
struct Cli {
    /// Records sorted in memory before spilling to disk
    #[arg(short = 'S', long = "max-records", value_name = "N", default_value_t = 0)]
    max_records: usize,

    /// Character encoding of input and output (UTF-8, ISO-8859-1, US-ASCII)
    #[arg(long = "encoding", value_name = "NAME", default_value = "UTF-8")]
    encoding: Encoding,

    /// Number of merge workers
    #[arg(long = "parallel", value_name = "N", default_value_t = 0)]
    parallel: usize,

    /// Use DIR for temporaries, not $TMPDIR or /tmp
    #[arg(short = 'T', long = "temporary-directory", value_name = "DIR")]
    temp_dir: Option<PathBuf>,

    /// Skip the first N input records
    #[arg(long = "skip", value_name = "N", default_value_t = 0)]
    skip: u64,

    /// Keep only records matching REGEX
    #[arg(long = "include", value_name = "REGEX")]
    include: Option<String>,

    /// Stop after N records have been accepted
    #[arg(long = "stop-after", value_name = "N")]
    stop_after: Option<u64>,

    /// Sort key: LEN characters from column START (1-based); repeat to break ties
    #[arg(short = 'k', long = "key", value_name = "START,LEN")]
    keys: Vec<String>,

    /// Reverse the result of comparisons
    #[arg(short = 'r', long = "reverse")]
    reverse: bool,

    /// Keep the first record of each key group
    #[arg(long = "first")]
    first: bool,

    /// Keep the last record of each key group
    #[arg(long = "last")]
    last: bool,

    /// Keep only records whose key occurs more than once
    #[arg(long = "all-dups")]
    all_dups: bool,

    /// Keep only records whose key occurs once
    #[arg(long = "no-dups")]
    no_dups: bool,

    /// Keep the first record of each duplicated key group
    #[arg(long = "first-dup")]
    first_dup: bool,

    /// Keep the last record of each duplicated key group
    #[arg(long = "last-dup")]
    last_dup: bool,

    /// Replace each key group by its key and a WIDTH-digit occurrence count
    #[arg(long = "count", value_name = "WIDTH", num_args = 0..=1, default_missing_value = "3")]
    count: Option<usize>,

    /// Write result to FILE
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: PathBuf,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// File to sort
    input: PathBuf,
}

/// Parse a `START,LEN` positional key (1-based start).
fn parse_key(text: &str) -> anyhow::Result<(usize, usize)> {
    let Some((start, len)) = text.split_once(',') else {
        bail!("invalid key '{}': expected START,LEN", text);
    };
    let start: usize = start
        .trim()
        .parse()
        .with_context(|| format!("invalid key start in '{}'", text))?;
    let len: usize = len
        .trim()
        .parse()
        .with_context(|| format!("invalid key length in '{}'", text))?;
    if start == 0 || len == 0 {
        bail!("invalid key '{}': START and LEN must be positive", text);
    }
    Ok((start - 1, len))
}

fn build_order(cli: &Cli) -> anyhow::Result<(SortOrder, Vec<(usize, usize)>)> {
    let mut order: Option<SortOrder> = None;
    let mut keys = Vec::with_capacity(cli.keys.len());
    for text in &cli.keys {
        let (start, len) = parse_key(text)?;
        keys.push((start, len));
        let key = SortOrder::columns(start, len);
        order = Some(match order {
            Some(prev) => prev.then(&key),
            None => key,
        });
    }
    let order = order.unwrap_or_else(SortOrder::natural);
    let order = if cli.reverse { order.reversed() } else { order };
    Ok((order, keys))
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut builder = SortConfig::builder()
        .with_max_records(cli.max_records)
        .with_encoding(cli.encoding)
        .with_workers(cli.parallel);
    if let Some(ref dir) = cli.temp_dir {
        builder = builder.with_temp_dir(dir);
    }
    let engine = SortEngine::new(builder.build());
    let (order, keys) = build_order(&cli)?;

    let mut request = engine
        .sort_in(&cli.input)
        .skip_record(cli.skip)
        .sort(order);
    if let Some(ref pattern) = cli.include {
        let re = Regex::new(pattern).with_context(|| format!("invalid regex '{}'", pattern))?;
        request = request.include(move |record| re.is_match(record));
    }
    if let Some(n) = cli.stop_after {
        request = request.stop_after(n);
    }
    request = if cli.first {
        request.first()
    } else if cli.last {
        request.last()
    } else if cli.all_dups {
        request.all_dups()
    } else if cli.no_dups {
        request.no_dups()
    } else if cli.first_dup {
        request.first_dup()
    } else if cli.last_dup {
        request.last_dup()
    } else if let Some(width) = cli.count {
        let rule = if keys.is_empty() {
            GroupCount::whole_record(width)
        } else {
            GroupCount::with_keys(keys, width)
        };
        request.sum(rule)
    } else {
        request
    };

    let summary = request.sort_out(&cli.output)?;
    info!(
        "{} read, {} accepted, {} written ({} spill files, {} merge rounds)",
        summary.read, summary.accepted, summary.written, summary.spill_files, summary.merge_rounds
    );
    Ok(())
}

/// Render an error chain. I/O causes drop the " (os error N)" suffix that
/// `io::Error`'s Display appends.
fn describe(err: &anyhow::Error) -> String {
    let Some(io_err) = err.downcast_ref::<SortError>().and_then(SortError::io_error) else {
        return format!("{:#}", err);
    };
    let cause = io_err.to_string();
    let cause = match io_err.raw_os_error() {
        Some(code) => cause.replace(&format!(" (os error {})", code), ""),
        None => cause,
    };
    format!("{}: {}", err, cause)
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("fextsort: {}", describe(&e));
        process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use std::process::Command;

    fn cmd() -> Command {
        let mut path = std::env::current_exe().unwrap();
        path.pop();
        path.pop();
        path.push("fextsort");
        Command::new(path)
    }

    #[test]
    fn test_fextsort_help() {
        let output = cmd().arg("--help").output().unwrap();
        assert!(output.status.success());
        assert!(String::from_utf8_lossy(&output.stdout).contains("Usage"));
    }

    #[test]
    fn test_fextsort_basic() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.txt");
        std::fs::write(&input, "pear\napple\nfig\n").unwrap();
        let status = cmd()
            .arg("-S")
            .arg("2")
            .arg("-T")
            .arg(dir.path())
            .arg("-o")
            .arg(&output)
            .arg(&input)
            .status()
            .unwrap();
        assert!(status.success());
        assert_eq!(
            std::fs::read_to_string(&output).unwrap(),
            "apple\nfig\npear\n"
        );
    }

    #[test]
    fn test_fextsort_key_and_count() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.txt");
        std::fs::write(
            &input,
            "004005\n001001\n002003\n004006\n001002\n003004\n004007\n",
        )
        .unwrap();
        let status = cmd()
            .args(["-k", "1,3", "--count"])
            .arg("-o")
            .arg(&output)
            .arg(&input)
            .status()
            .unwrap();
        assert!(status.success());
        assert_eq!(
            std::fs::read_to_string(&output).unwrap(),
            "001002\n002001\n003001\n004003\n"
        );
    }

    #[test]
    fn test_fextsort_count_several_keys() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.txt");
        std::fs::write(&input, "a1x\na2y\na3x\nb1x\n").unwrap();
        let status = cmd()
            .args(["-k", "1,1", "-k", "3,1", "--count", "2"])
            .arg("-o")
            .arg(&output)
            .arg(&input)
            .status()
            .unwrap();
        assert!(status.success());
        assert_eq!(
            std::fs::read_to_string(&output).unwrap(),
            "ax02\nay01\nbx01\n"
        );
    }

    #[test]
    fn test_fextsort_reverse_no_dups() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.txt");
        std::fs::write(&input, "b\na\nc\na\n").unwrap();
        let status = cmd()
            .args(["-r", "--no-dups"])
            .arg("-o")
            .arg(&output)
            .arg(&input)
            .status()
            .unwrap();
        assert!(status.success());
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "c\nb\n");
    }

    #[test]
    fn test_fextsort_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let output = cmd()
            .arg("-o")
            .arg(dir.path().join("out.txt"))
            .arg(dir.path().join("missing.txt"))
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(2));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("error reading the file"), "got: {}", stderr);
        assert!(stderr.contains("No such file or directory"), "got: {}", stderr);
    }

    #[test]
    fn test_fextsort_conflicting_groups() {
        let output = cmd()
            .args(["--first", "--last", "-o", "out.txt", "in.txt"])
            .output()
            .unwrap();
        assert!(!output.status.success());
    }
}
