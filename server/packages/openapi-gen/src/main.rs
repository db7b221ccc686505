use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Writes the proxy's OpenAPI document.
#[derive(Parser, Debug)]
#[command(name = "bill-burner-openapi-gen", version)]
struct Args {
    /// Destination file.
    #[arg(long, short, default_value = "openapi.json")]
    out: PathBuf,

    /// Print to stdout instead of writing a file.
    #[arg(long, conflicts_with = "out")]
    stdout: bool,
}

fn main() {
    init_logging();
    let args = Args::parse();
    let schema = bill_burner_openapi_gen::OPENAPI_JSON;

    let result = if args.stdout {
        let mut out = std::io::stdout().lock();
        out.write_all(schema.as_bytes())
            .and_then(|()| out.write_all(b"\n"))
            .and_then(|()| out.flush())
    } else {
        std::fs::write(&args.out, schema)
    };

    match result {
        Ok(()) if !args.stdout => {
            tracing::info!(path = %args.out.display(), bytes = schema.len(), "wrote openapi document");
        }
        Ok(()) => {}
        Err(err) => {
            tracing::error!(path = %args.out.display(), error = %err, "failed to write openapi document");
            std::process::exit(1);
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_logfmt::builder()
                .layer()
                .with_writer(std::io::stderr),
        )
        .init();
}
