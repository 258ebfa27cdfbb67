//! CLI binary for certificate-overlay.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `CertificateConfig` and a `CertificateRequest`, then writes the PDF (or
//! the draw plan as JSON).

use anyhow::{Context, Result};
use certificate_overlay::{
    write_atomic, CallerIdentity, CertificateAssets, CertificateConfig, CertificateRecord,
    CertificateRequest, CertificateService, HttpRecordSource, PlacementTable, RecordSource,
    StaticRecordSource, TemplateVersion, TimeZonePolicy,
};
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Unsigned certificate from a local record
  certgen --record batch.json -o cert.pdf

  # Signed, exception ticked, fetched from the record service
  certgen --record-endpoint https://cart.example.com/api/ --batch-number B114AF \
          --username jdoe --name "Jane Doe [CONTRACTOR]" --email jdoe@example.com \
          --sign --exception true -o cert.pdf

  # Request body from a file, exactly as the HTTP endpoint receives it
  certgen --request body.json --record batch.json -o cert.pdf

  # Inspect the draw plan without pdfium
  certgen --record batch.json --sign --username jdoe --plan-only

  # Older template revision with a custom placement table
  certgen --template-version rev1 --placements table.json --record batch.json -o cert.pdf

RECORD FILE:
  A JSON object of field name → value, optionally wrapped in {"data": {...}}.
  Numbers and true are printed as-is; null, 0, false and "" are skipped.

ENVIRONMENT VARIABLES:
  CART_SERVICE_ENDPOINT   Record service base URL
  SERVICE_API_USERNAME    Record service basic-auth user
  SERVICE_API_PASSWORD    Record service basic-auth password
  CERTGEN_DEFAULT_BATCH   Batch number used when the request has none
  CERTGEN_TEMPLATE        Template PDF path
  CERTGEN_INDICATOR       Tick image path
  CERTGEN_TIME_ZONE       utc | local | Area/City | +HH:MM[=ABBR]
  PDFIUM_LIB_PATH         Path to an existing libpdfium
"#;

/// Fill a PDF certificate template with batch data and a signature block.
#[derive(Parser, Debug)]
#[command(
    name = "certgen",
    version,
    about = "Fill a PDF certificate template with batch data and a signature block",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Write the PDF to this file instead of stdout.
    #[arg(short, long, env = "CERTGEN_OUTPUT")]
    output: Option<PathBuf>,

    /// Request body JSON file ({"exception": …, "sign": …, "batchNumber": …}).
    #[arg(long)]
    request: Option<PathBuf>,

    /// Local record JSON file; replaces the record service.
    #[arg(long)]
    record: Option<PathBuf>,

    /// Identity-provider claims JSON file (preferred_username, name).
    #[arg(long)]
    claims: Option<PathBuf>,

    /// Batch number to fetch.
    #[arg(long)]
    batch_number: Option<String>,

    /// Print the signature block.
    #[arg(long)]
    sign: bool,

    /// Exception tick: true draws it on the "yes" line, false on the "no" line.
    #[arg(long)]
    exception: Option<bool>,

    /// Caller username.
    #[arg(long)]
    username: Option<String>,

    /// Caller display name.
    #[arg(long)]
    name: Option<String>,

    /// Caller email.
    #[arg(long)]
    email: Option<String>,

    /// Template PDF.
    #[arg(long, env = "CERTGEN_TEMPLATE")]
    template: Option<PathBuf>,

    /// Indicator (tick) image.
    #[arg(long, env = "CERTGEN_INDICATOR")]
    indicator: Option<PathBuf>,

    /// Template revision: rev1 or rev2.
    #[arg(long, env = "CERTGEN_TEMPLATE_VERSION", default_value = "rev2")]
    template_version: String,

    /// Placement table JSON file replacing the revision's built-in table.
    #[arg(long)]
    placements: Option<PathBuf>,

    /// Text in parentheses after the signer's name.
    #[arg(long, env = "CERTGEN_SIGNATURE_SUFFIX")]
    signature_suffix: Option<String>,

    /// Time zone for signedAt and date-time fields.
    #[arg(long, env = "CERTGEN_TIME_ZONE", default_value = "utc")]
    time_zone: String,

    /// Record service base URL.
    #[arg(long, env = "CART_SERVICE_ENDPOINT")]
    record_endpoint: Option<String>,

    /// Record service basic-auth user.
    #[arg(long, env = "SERVICE_API_USERNAME")]
    service_username: Option<String>,

    /// Record service basic-auth password.
    #[arg(long, env = "SERVICE_API_PASSWORD", hide_env_values = true)]
    service_password: Option<String>,

    /// Batch number used when the request has none.
    #[arg(long, env = "CERTGEN_DEFAULT_BATCH")]
    default_batch: Option<String>,

    /// Field that always wins over the fetched record (repeatable).
    #[arg(long = "override", value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    /// Record service timeout in seconds.
    #[arg(long, env = "CERTGEN_REQUEST_TIMEOUT", default_value_t = 30)]
    request_timeout: u64,

    /// Path to libpdfium.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Print the draw plan as JSON instead of rendering.
    #[arg(long)]
    plan_only: bool,

    /// Page height in points for --plan-only (US Letter is 792).
    #[arg(long, default_value_t = 792.0)]
    page_height: f32,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "CERTGEN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "CERTGEN_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
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

    let config = build_config(&cli).await?;
    let caller = build_caller(&cli).await?;
    let request = build_request(&cli).await?;

    // ── Pick the record source ───────────────────────────────────────────
    if let Some(ref path) = cli.record {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read record from {:?}", path))?;
        let value: serde_json::Value =
            serde_json::from_slice(&bytes).context("Record file is not valid JSON")?;
        let record = CertificateRecord::from_json_value(&value)
            .map_err(anyhow::Error::msg)
            .context("Record file has an unexpected shape")?;

        let assets = CertificateAssets::load(&config).await?;
        let service = CertificateService::new(config, assets, Some(StaticRecordSource(record)));
        run(&cli, &service, &caller, &request).await
    } else {
        let service: CertificateService<HttpRecordSource> =
            CertificateService::from_config(config).await?;
        run(&cli, &service, &caller, &request).await
    }
}

async fn run<S: RecordSource>(
    cli: &Cli,
    service: &CertificateService<S>,
    caller: &CallerIdentity,
    request: &CertificateRequest,
) -> Result<()> {
    // ── Plan-only mode ───────────────────────────────────────────────────
    if cli.plan_only {
        let (draws, stats) = service
            .plan(caller, request, cli.page_height)
            .await
            .context("Planning failed")?;
        let json = serde_json::to_string_pretty(&serde_json::json!({
            "draws": draws,
            "stats": stats,
        }))
        .context("Failed to serialise plan")?;
        println!("{json}");
        return Ok(());
    }

    // ── Render ───────────────────────────────────────────────────────────
    let output = service
        .generate(caller, request)
        .await
        .context("Certificate generation failed")?;

    match cli.output {
        Some(ref path) => {
            write_atomic(path, &output.pdf).await?;
            if !cli.quiet {
                eprintln!(
                    "{}  {} draws  {}ms  →  {}",
                    if output.stats.record_fetch_failed {
                        cyan("⚠")
                    } else {
                        green("✔")
                    },
                    output.stats.draw_count,
                    output.stats.total_duration_ms,
                    bold(&path.display().to_string()),
                );
            }
        }
        None => {
            io::stdout()
                .lock()
                .write_all(&output.pdf)
                .context("Failed to write to stdout")?;
        }
    }

    Ok(())
}

/// Map CLI args to `CertificateConfig`.
async fn build_config(cli: &Cli) -> Result<CertificateConfig> {
    let version: TemplateVersion = cli.template_version.parse()?;
    let time_zone: TimeZonePolicy = cli.time_zone.parse()?;

    let mut builder = CertificateConfig::builder()
        .template_version(version)
        .time_zone(time_zone)
        .request_timeout_secs(cli.request_timeout);

    if let Some(ref path) = cli.template {
        builder = builder.template_path(path);
    }
    if let Some(ref path) = cli.indicator {
        builder = builder.indicator_path(path);
    }
    if let Some(ref path) = cli.placements {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read placements from {:?}", path))?;
        builder = builder.placements(PlacementTable::from_json(&json)?);
    }
    if let Some(ref suffix) = cli.signature_suffix {
        builder = builder.signature_suffix(suffix);
    }
    if let Some(ref url) = cli.record_endpoint {
        builder = builder.record_endpoint(url);
    }
    if let (Some(user), Some(pass)) = (&cli.service_username, &cli.service_password) {
        builder = builder.service_credentials(user, pass);
    }
    if let Some(ref batch) = cli.default_batch {
        builder = builder.default_batch_number(batch);
    }
    for pair in &cli.overrides {
        let (key, value) = parse_override(pair)?;
        builder = builder.override_field(key, value);
    }
    if let Some(ref path) = cli.pdfium_lib {
        builder = builder.pdfium_library_path(path);
    }

    Ok(builder.build().context("Invalid configuration")?)
}

/// Caller from a claims file, with individual flags taking precedence.
async fn build_caller(cli: &Cli) -> Result<CallerIdentity> {
    let mut caller = match cli.claims {
        Some(ref path) => {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read claims from {:?}", path))?;
            let claims: serde_json::Value =
                serde_json::from_slice(&bytes).context("Claims file is not valid JSON")?;
            CallerIdentity::from_claims(&claims)
        }
        None if cli.username.is_none() && cli.name.is_none() && cli.email.is_none() => {
            CallerIdentity::system()
        }
        None => CallerIdentity {
            username: String::new(),
            name: String::new(),
            email: String::new(),
        },
    };

    if let Some(ref v) = cli.username {
        caller.username = v.clone();
    }
    if let Some(ref v) = cli.name {
        caller.name = v.clone();
    }
    if let Some(ref v) = cli.email {
        caller.email = v.clone();
    }
    Ok(caller)
}

/// Request from a body file, with individual flags taking precedence.
async fn build_request(cli: &Cli) -> Result<CertificateRequest> {
    let mut request = match cli.request {
        Some(ref path) => {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read request from {:?}", path))?;
            CertificateRequest::from_json(&bytes)?
        }
        None => CertificateRequest::default(),
    };

    if cli.sign {
        request.sign = true;
    }
    if cli.exception.is_some() {
        request.exception = cli.exception;
    }
    if cli.batch_number.is_some() {
        request.batch_number = cli.batch_number.clone();
    }
    Ok(request)
}

/// Parse `--override KEY=VALUE`.
fn parse_override(s: &str) -> Result<(&str, &str)> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value)),
        _ => anyhow::bail!("Invalid override '{}': expected KEY=VALUE", s),
    }
}
