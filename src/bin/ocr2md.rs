//! CLI binary for edgequake-ocr2md.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig`, prints results and turns the error kind into the
//! process exit code.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_ocr2md::{
    convert, convert_batch, ConversionConfig, ConversionProgressCallback, ConversionStats,
    ImageFormat, Ocr2MdError, PageSeparator, ProgressCallback, SavedImage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner while the provider works, and one
/// log line per finished file above it.
struct CliProgressCallback {
    bar: ProgressBar,
    figures_failed: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            figures_failed: AtomicUsize::new(0),
        })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, source: &Path) {
        self.figures_failed.store(0, Ordering::SeqCst);
        self.bar.reset_elapsed();
        self.bar.set_prefix("OCR");
        self.bar.set_message(format!("uploading {}…", file_label(source)));
    }

    fn on_ocr_complete(&self, source: &Path, pages: usize, elapsed_ms: u64) {
        self.bar.set_prefix("Writing");
        self.bar.println(format!(
            "  {} {}  {}  {}",
            cyan("◆"),
            file_label(source),
            dim(&format!("{pages} pages")),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
    }

    fn on_image_saved(&self, _source: &Path, image: &SavedImage) {
        if !image.is_success() {
            self.figures_failed.fetch_add(1, Ordering::SeqCst);
        }
        self.bar.set_message(format!(
            "figure {} on page {}",
            image.image_index,
            image.page_index + 1
        ));
    }

    fn on_conversion_complete(&self, source: &Path, output: &Path, stats: &ConversionStats) {
        let figures = if stats.images_saved + stats.images_failed > 0 {
            format!("  {} figures", stats.images_saved)
        } else {
            String::new()
        };
        self.bar.println(format!(
            "  {} {}  →  {}{}  {}",
            green("✓"),
            file_label(source),
            bold(&output.display().to_string()),
            dim(&figures),
            dim(&format!("{:.1}s", stats.total_duration_ms as f64 / 1000.0)),
        ));
        if self.figures_failed.load(Ordering::SeqCst) > 0 {
            self.bar.println(format!(
                "    {} {} figures kept as raw fallbacks",
                cyan("⚠"),
                stats.images_failed
            ));
        }
    }

    fn on_conversion_error(&self, source: &Path, error: &str) {
        self.bar.println(format!(
            "  {} {}  {}",
            red("✗"),
            file_label(source),
            red(error)
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert one file (writes report.md beside report.pdf)
  ocr2md report.pdf

  # Choose the output file
  ocr2md report.pdf -o notes/report.md

  # Convert several files into a directory, with a summary
  ocr2md *.pdf -o converted/ --summary --delay 2

  # Extract figures as PNG next to the Markdown
  ocr2md --images png paper.pdf

  # Open the drop target and drag PDFs onto the terminal
  ocr2md --drop

EXIT CODES:
  0  success
  2  invalid command line
  3  input is not a readable PDF
  4  no API key configured
  5  OCR service error (network, HTTP status, bad response)
  6  Markdown file could not be written
  1  anything else

ENVIRONMENT VARIABLES:
  MISTRAL_API_KEY    Mistral API key (required)
  OCR2MD_MODEL       Override model ID
  OCR2MD_BASE_URL    Override API base URL
  RUST_LOG           Log filter (e.g. edgequake_ocr2md=debug)

A .env file in the working directory is loaded before the environment is read.
"#;

/// Convert PDF files to Markdown using a hosted OCR service.
#[derive(Parser, Debug)]
#[command(
    name = "ocr2md",
    version,
    about = "Convert PDF files to Markdown using Mistral OCR",
    long_about = "Upload PDF documents to the Mistral OCR API and write the returned Markdown \
to a .md file beside each PDF. Files can be given as arguments or dropped onto the terminal \
with --drop.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF files to convert.
    #[arg(required_unless_present = "drop")]
    inputs: Vec<PathBuf>,

    /// Open a terminal drop target instead of converting arguments.
    #[arg(long, conflicts_with = "inputs")]
    drop: bool,

    /// Output path: a file for one input, a directory for several (or --drop).
    #[arg(short, long, env = "OCR2MD_OUTPUT")]
    output: Option<PathBuf>,

    /// Mistral API key.
    #[arg(long, env = "MISTRAL_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// OCR model ID.
    #[arg(long, env = "OCR2MD_MODEL", default_value = edgequake_ocr2md::config::DEFAULT_MODEL)]
    model: String,

    /// API base URL.
    #[arg(long, env = "OCR2MD_BASE_URL", default_value = edgequake_ocr2md::config::DEFAULT_BASE_URL)]
    base_url: String,

    /// HTTP timeout in seconds for one OCR request.
    #[arg(long, env = "OCR2MD_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Extract embedded figures: original, jpg, png.
    #[arg(long, env = "OCR2MD_IMAGES", value_enum)]
    images: Option<ImagesArg>,

    /// JPEG quality for --images jpg (1–100).
    #[arg(long, env = "OCR2MD_JPEG_QUALITY", default_value_t = 95,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// Page separator: none, hr, comment, or custom string.
    #[arg(long, env = "OCR2MD_SEPARATOR", default_value = "none")]
    separator: String,

    /// Prefix each page with a "## Page N" heading.
    #[arg(long, env = "OCR2MD_PAGE_HEADINGS")]
    page_headings: bool,

    /// Prepend a header with file name, timestamp and counts.
    #[arg(long, env = "OCR2MD_HEADER")]
    header: bool,

    /// Seconds to wait between files of a batch.
    #[arg(long, env = "OCR2MD_DELAY", default_value_t = 0.0)]
    delay: f64,

    /// Write BATCH_SUMMARY.md after a batch.
    #[arg(long, env = "OCR2MD_SUMMARY")]
    summary: bool,

    /// Print structured JSON (ConversionOutput or BatchReport) to stdout.
    #[arg(long, env = "OCR2MD_JSON", conflicts_with = "stdout")]
    json: bool,

    /// Also print the Markdown to stdout.
    #[arg(long, env = "OCR2MD_STDOUT")]
    stdout: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "OCR2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "OCR2MD_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ImagesArg {
    Original,
    #[value(alias = "jpeg")]
    Jpg,
    Png,
}

impl From<ImagesArg> for ImageFormat {
    fn from(v: ImagesArg) -> Self {
        match v {
            ImagesArg::Original => ImageFormat::Original,
            ImagesArg::Jpg => ImageFormat::Jpeg,
            ImagesArg::Png => ImageFormat::Png,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Missing .env is the normal case.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{} {e:#}", red("error:"));
            ExitCode::from(exit_code_for(&e))
        }
    }
}

/// Map an error chain to the process exit code of its library error.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<Ocr2MdError>()
        .map(|e| e.exit_code() as u8)
        .unwrap_or(1)
}

async fn run(cli: Cli) -> Result<u8> {
    // ── Logging setup ────────────────────────────────────────────────────
    // The drop target owns the terminal, so it gets no subscriber at all.
    // With the spinner active only errors are logged; the bar covers the rest.
    let show_progress = !cli.quiet && !cli.json && !cli.stdout && !cli.drop;
    if !cli.drop {
        let filter = if cli.verbose {
            "debug"
        } else if cli.quiet || show_progress {
            "error"
        } else {
            "info"
        };
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
            )
            .with_writer(io::stderr)
            .init();
    }

    let progress = show_progress.then(CliProgressCallback::new);
    let config = build_config(&cli, progress.clone().map(|p| p as ProgressCallback))?;

    // ── Drop mode ────────────────────────────────────────────────────────
    if cli.drop {
        #[cfg(feature = "drop")]
        {
            edgequake_ocr2md::dropzone::run(config, cli.output.clone())
                .await
                .context("Drop target failed")?;
            return Ok(0);
        }
        #[cfg(not(feature = "drop"))]
        anyhow::bail!("this build of ocr2md does not include the drop target (feature `drop`)");
    }

    let code = if cli.inputs.len() == 1 {
        run_single(&cli, &cli.inputs[0], &config).await
    } else {
        run_batch(&cli, &config).await
    };
    if let Some(p) = progress {
        p.finish();
    }
    code
}

async fn run_single(cli: &Cli, input: &Path, config: &ConversionConfig) -> Result<u8> {
    let output = convert(input, cli.output.as_deref(), config)
        .await
        .with_context(|| format!("Failed to convert {}", input.display()))?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if cli.stdout {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(output.markdown.as_bytes())
            .context("Failed to write to stdout")?;
        if !output.markdown.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet && !cli.json && !cli.stdout && config.progress_callback.is_none() {
        eprintln!(
            "Converted {} pages in {}ms → {}",
            output.stats.page_count,
            output.stats.total_duration_ms,
            output.request.output_path().display()
        );
    }
    Ok(0)
}

async fn run_batch(cli: &Cli, config: &ConversionConfig) -> Result<u8> {
    let delay = Duration::try_from_secs_f64(cli.delay.max(0.0)).unwrap_or_default();
    let report = convert_batch(&cli.inputs, cli.output.as_deref(), delay, config)
        .await
        .context("Batch conversion failed")?;

    if cli.summary {
        let dir = summary_dir(cli);
        let path = report
            .write_summary(&dir)
            .await
            .context("Failed to write batch summary")?;
        if !cli.quiet {
            eprintln!("Summary written to {}", path.display());
        }
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet {
        let ok = report.successful().count();
        let total = report.entries.len();
        eprintln!(
            "{} {}/{} files  {} pages  {} figures  {:.1}s",
            if ok == total { green("✔") } else { red("✘") },
            bold(&ok.to_string()),
            total,
            report.total_pages(),
            report.total_images(),
            report.total_duration_ms as f64 / 1000.0,
        );
        for failed in report.failed() {
            eprintln!(
                "  {} {}: {}",
                red("✗"),
                failed.source.display(),
                failed.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    Ok(report.exit_code() as u8)
}

/// Directory for BATCH_SUMMARY.md: the output directory, else the first
/// input's directory.
fn summary_dir(cli: &Cli) -> PathBuf {
    if let Some(ref dir) = cli.output {
        return dir.clone();
    }
    cli.inputs
        .first()
        .and_then(|p| p.parent())
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .model(&cli.model)
        .base_url(&cli.base_url)
        .timeout_secs(cli.timeout)
        .jpeg_quality(cli.jpeg_quality)
        .page_separator(PageSeparator::parse(&cli.separator))
        .page_headings(cli.page_headings)
        .include_header(cli.header);

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(images) = cli.images {
        builder = builder.image_format(images.into());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    Ok(builder.build().context("Invalid configuration")?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("ocr2md").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn single_input_defaults() {
        let cli = parse(&["report.pdf"]);
        assert_eq!(cli.inputs, vec![PathBuf::from("report.pdf")]);
        assert!(!cli.drop);
        let config = build_config(&cli, None).unwrap();
        assert_eq!(config.timeout_secs, 120);
        assert!(config.image_format.is_none());
        assert_eq!(config.page_separator, PageSeparator::None);
    }

    #[test]
    fn drop_needs_no_inputs() {
        let cli = parse(&["--drop"]);
        assert!(cli.drop);
        assert!(cli.inputs.is_empty());
    }

    #[test]
    fn drop_conflicts_with_inputs() {
        assert!(Cli::try_parse_from(["ocr2md", "--drop", "a.pdf"]).is_err());
    }

    #[test]
    fn images_flag_maps_to_format() {
        let cli = parse(&["--images", "jpeg", "--jpeg-quality", "80", "a.pdf"]);
        let config = build_config(&cli, None).unwrap();
        assert_eq!(config.image_format, Some(ImageFormat::Jpeg));
        assert_eq!(config.jpeg_quality, 80);
    }

    #[test]
    fn jpeg_quality_out_of_range_is_usage_error() {
        let err = Cli::try_parse_from(["ocr2md", "--jpeg-quality", "0", "a.pdf"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn summary_dir_prefers_output() {
        let cli = parse(&["-o", "out", "a/x.pdf", "a/y.pdf"]);
        assert_eq!(summary_dir(&cli), PathBuf::from("out"));
        let cli = parse(&["a/x.pdf", "a/y.pdf"]);
        assert_eq!(summary_dir(&cli), PathBuf::from("a"));
        let cli = parse(&["x.pdf", "y.pdf"]);
        assert_eq!(summary_dir(&cli), PathBuf::from("."));
    }

    #[test]
    fn stdout_flag_reads_environment() {
        std::env::set_var("OCR2MD_STDOUT", "true");
        let cli = parse(&["a.pdf"]);
        std::env::remove_var("OCR2MD_STDOUT");
        assert!(cli.stdout);
        assert!(!parse(&["a.pdf"]).stdout);
    }

    #[test]
    fn exit_code_survives_context() {
        let err = anyhow::Error::new(Ocr2MdError::MissingCredential {
            provider: "mistral".into(),
            env_var: "MISTRAL_API_KEY".into(),
        })
        .context("Failed to convert a.pdf");
        assert_eq!(exit_code_for(&err), 4);
        assert_eq!(exit_code_for(&anyhow::anyhow!("other")), 1);
    }
}
