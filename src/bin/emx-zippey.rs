//! emx-zippey CLI
//!
//! Git clean/smudge filter for ZIP-based files.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use emx_zippey::install::{self, FilterSetup, DEFAULT_FILTER_NAME};
use emx_zippey::{is_archive, read_entries, ClassifierConfig, Decoder, Encoder, Mode, RecordReader};
use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "emx-zippey")]
#[command(author = "nzinfo <li.monan@gmail.com>")]
#[command(version)]
#[command(about = "Store ZIP-based files in git as diffable text")]
struct Cli {
    /// Verbose output on stderr (repeat for more)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert a ZIP archive into the text stream (git clean filter)
    #[command(visible_alias = "e")]
    Encode {
        /// Archive to read (default: stdin)
        #[arg(short = 'i', long)]
        input: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Extra extension stored as text without inspecting content
        #[arg(long = "text-ext", value_name = "EXT")]
        text_ext: Vec<String>,
    },

    /// Convert the text stream back into a ZIP archive (git smudge filter)
    #[command(visible_alias = "d")]
    Decode {
        /// Stream to read (default: stdin)
        #[arg(short = 'i', long)]
        input: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// List entries of an archive or an encoded stream
    #[command(visible_alias = "t")]
    List {
        /// Archive or stream to list (default: stdin)
        #[arg(short = 'i', long)]
        input: Option<PathBuf>,

        /// Extra extension stored as text without inspecting content
        #[arg(long = "text-ext", value_name = "EXT")]
        text_ext: Vec<String>,
    },

    /// Register the filter in a git repository
    Install {
        /// Repository root
        #[arg(short = 'C', long, default_value = ".")]
        repo: PathBuf,

        /// Filter driver name
        #[arg(long, default_value = DEFAULT_FILTER_NAME)]
        name: String,

        /// Attribute pattern to route through the filter (default: scan the tree)
        #[arg(short, long = "pattern", value_name = "GLOB")]
        patterns: Vec<String>,

        /// Command git should run (default: this executable)
        #[arg(long)]
        command: Option<String>,

        /// Print the settings instead of applying them
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Encode { input, output, text_ext } => {
            let config = ClassifierConfig::default().with_text_extensions(&text_ext);
            let encoder = Encoder::with_config(config).with_verbose(cli.verbose);
            let mut encoded = Vec::new();
            encoder
                .encode_to_writer(open_input(input.as_deref())?, &mut encoded)
                .context("Failed to encode archive")?;
            write_output(output.as_deref(), &encoded)?;
        }
        Commands::Decode { input, output } => {
            let decoder = Decoder::new().with_verbose(cli.verbose);
            let mut decoded = Vec::new();
            decoder
                .decode_to_writer(open_input(input.as_deref())?, &mut decoded)
                .context("Failed to decode stream")?;
            write_output(output.as_deref(), &decoded)?;
        }
        Commands::List { input, text_ext } => {
            let config = ClassifierConfig::default().with_text_extensions(&text_ext);
            list(input.as_deref(), &config)?;
        }
        Commands::Install { repo, name, patterns, command, dry_run } => {
            install_filter(&repo, name, patterns, command, dry_run)?;
        }
    }

    Ok(())
}

/// Logs go to stderr; stdout carries the payload
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn open_input(path: Option<&Path>) -> Result<Box<dyn Read>> {
    match path {
        Some(path) => {
            let file = fs::File::open(path).with_context(|| format!("Failed to read: {}", path.display()))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(io::stdin().lock())),
    }
}

/// Output is only touched once the whole conversion succeeded
fn write_output(path: Option<&Path>, data: &[u8]) -> Result<()> {
    match path {
        Some(path) => {
            fs::write(path, data).with_context(|| format!("Failed to write: {}", path.display()))?;
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(data)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn list(input: Option<&Path>, config: &ClassifierConfig) -> Result<()> {
    let mut data = Vec::new();
    open_input(input)?.read_to_end(&mut data)?;

    let mut rows = Vec::new();
    if is_archive(&data) {
        for entry in read_entries(&data).context("Failed to read archive")? {
            let mode = entry.classify(config).mode();
            let encoded = match mode {
                Mode::Text => entry.data.len(),
                Mode::Binary => base64::encoded_len(entry.data.len(), true).unwrap_or(usize::MAX),
            };
            rows.push((mode, entry.data.len(), encoded, entry.name));
        }
    } else {
        for record in RecordReader::new(data.as_slice()) {
            let header = record.context("Failed to parse stream")?.header;
            rows.push((header.mode, header.raw_length, header.encoded_length, header.name));
        }
    }

    let mut out = BufWriter::new(io::stdout().lock());
    writeln!(out, "{:<6}  {:>12}  {:>12}  Name", "Mode", "Size", "Encoded")?;
    writeln!(out, "{}", "-".repeat(60))?;

    let (mut total_raw, mut total_encoded) = (0usize, 0usize);
    for (mode, raw, encoded, name) in &rows {
        writeln!(out, "{:<6}  {:>12}  {:>12}  {}", mode.to_string(), raw, encoded, name)?;
        total_raw += raw;
        total_encoded = total_encoded.saturating_add(*encoded);
    }

    writeln!(out, "{}", "-".repeat(60))?;
    writeln!(out, "{:<6}  {:>12}  {:>12}  {} entries", "", total_raw, total_encoded, rows.len())?;
    out.flush()?;

    Ok(())
}

fn install_filter(
    repo: &Path,
    name: String,
    patterns: Vec<String>,
    command: Option<String>,
    dry_run: bool,
) -> Result<()> {
    let command = match command {
        Some(command) => command,
        None => {
            let exe = std::env::current_exe().context("Failed to locate current executable")?;
            install::shell_quote(&exe.to_string_lossy())
        }
    };
    let setup = FilterSetup::new(name, command);

    let patterns = if patterns.is_empty() {
        let found = install::scan_zip_extensions(repo)
            .with_context(|| format!("Failed to scan: {}", repo.display()))?;
        if found.is_empty() {
            tracing::warn!("no ZIP-based files found; pass --pattern to choose file types");
        }
        found
    } else {
        patterns
    };

    if dry_run {
        for (key, value) in setup.settings() {
            println!("git config --local {} {:?}", key, value);
        }
        for line in install::gitattributes_lines(&patterns, &setup.name) {
            println!("{}", line);
        }
        return Ok(());
    }

    install::apply(repo, &setup, &patterns)?;
    println!("Installed filter '{}' for {} pattern(s)", setup.name, patterns.len());

    Ok(())
}
