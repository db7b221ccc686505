use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use bill_burner_agent_runtime::{AgentRuntime, AgentRuntimeError, HttpAgentRuntime};
use clap::{Args, Parser, Subcommand};
use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::CorsLayer;

use crate::achievement::achievement;
use crate::api_client::{ApiClient, ApiError};
use crate::auth::{AuthError, Authenticator, CallbackOutcome};
use crate::burn_plan::{
    chart_data, create_burn_plan, fetch_recent_plans, format_time_ago, scale_burn_plan,
    Architecture, BurnConfig, BurnPlanAnalysis, BurningStyle,
};
use crate::config::{ClientConfig, ServerConfig};
use crate::router::{build_router, default_cors_layer, AppState, HelloResponse};
use crate::session::{Session, SessionError};
use crate::storage::FileStore;
use crate::telemetry::init_logging;

const COST_TOLERANCE: f64 = 0.10;

#[derive(Parser, Debug)]
#[command(name = "bill-burner")]
#[command(about = "Configure an absurd AWS overspend and have an agent roast it", version)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Base URL of the Bill Burner API.
    #[arg(long = "api-url", env = "BILL_BURNER_API_BASE_URL", global = true)]
    api_url: Option<String>,

    /// Where tokens are kept between invocations.
    #[arg(long, env = "BILL_BURNER_SESSION_FILE", global = true)]
    session_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the proxy server in front of the agent runtime.
    Serve(ServeArgs),
    /// Print the hosted login URL.
    Login,
    /// Finish a login with the URL the identity provider redirected to.
    Callback(CallbackArgs),
    /// Forget stored tokens and print the identity provider logout URL.
    Logout,
    /// Show the signed-in user.
    Whoami,
    /// Ask the agent for a burn plan.
    Burn(BurnArgs),
    /// List recently generated burn plans.
    Recent(RecentArgs),
    /// Call the authenticated hello endpoint.
    Hello,
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 8787)]
    port: u16,

    #[arg(long = "cors-allow-origin")]
    cors_allow_origin: Vec<String>,

    #[arg(long = "cors-allow-method")]
    cors_allow_method: Vec<String>,

    #[arg(long = "cors-allow-header")]
    cors_allow_header: Vec<String>,

    #[arg(long = "cors-allow-credentials")]
    cors_allow_credentials: bool,
}

#[derive(Args, Debug)]
struct CallbackArgs {
    url: String,
}

#[derive(Args, Debug)]
struct BurnArgs {
    /// Dollars to burn.
    #[arg(long)]
    amount: f64,

    /// Days over which the money disappears.
    #[arg(long, default_value_t = 30)]
    timeline: u32,

    #[arg(long, value_enum, default_value_t = Architecture::Mixed)]
    architecture: Architecture,

    #[arg(long = "burning-style", value_enum, default_value_t = BurningStyle::Horizontal)]
    burning_style: BurningStyle,

    /// 1 (mildly dumb) to 10 (brain damage).
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u8).range(1..=10))]
    stupidity: u8,

    /// Also show the plan rescaled to this amount.
    #[arg(long)]
    rescale: Option<f64>,

    /// Print the raw analysis as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct RecentArgs {
    #[arg(long, default_value_t = 5)]
    limit: usize,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("invalid cors origin: {0}")]
    InvalidCorsOrigin(String),
    #[error("invalid cors method: {0}")]
    InvalidCorsMethod(String),
    #[error("invalid cors header: {0}")]
    InvalidCorsHeader(String),
    #[error("--cors-allow-credentials needs at least one --cors-allow-origin")]
    CredentialsWithoutOrigin,
    #[error("missing configuration: {0}")]
    MissingConfig(String),
    #[error("invalid agent endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    AgentRuntime(#[from] AgentRuntimeError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("server error: {0}")]
    Server(String),
}

pub fn run_bill_burner() -> Result<(), CliError> {
    init_logging();
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::Server(err.to_string()))?;
    runtime.block_on(run_command(cli))
}

async fn run_command(cli: Cli) -> Result<(), CliError> {
    match &cli.command {
        Command::Serve(args) => run_server(args).await,
        Command::Login => {
            let ctx = ClientContext::new(&cli)?;
            println!("{}", ctx.authenticator().login()?);
            Ok(())
        }
        Command::Callback(args) => {
            let ctx = ClientContext::new(&cli)?;
            let outcome = ctx.authenticator().handle_callback(&args.url).await?;
            let who = ctx
                .session
                .user()
                .and_then(|user| user.email.or(user.username))
                .unwrap_or_else(|| "unknown user".to_string());
            match outcome {
                CallbackOutcome::CodeExchanged => println!("Logged in as {who} (authorization code)"),
                CallbackOutcome::Implicit => println!("Logged in as {who}"),
            }
            Ok(())
        }
        Command::Logout => {
            let ctx = ClientContext::new(&cli)?;
            println!("{}", ctx.authenticator().logout()?);
            Ok(())
        }
        Command::Whoami => {
            let ctx = ClientContext::new(&cli)?;
            match ctx.session.user() {
                Some(user) => print_json(&user),
                None if ctx.session.is_authenticated() => {
                    println!("Logged in (no identity token)");
                    Ok(())
                }
                None => {
                    println!("Not logged in");
                    Ok(())
                }
            }
        }
        Command::Burn(args) => {
            let ctx = ClientContext::new(&cli)?;
            let config = BurnConfig {
                total_amount: args.amount,
                timeline: args.timeline,
                architecture: args.architecture,
                burning_style: args.burning_style,
                efficiency_level: args.stupidity,
            };
            let plan = create_burn_plan(&ctx.api()?, &config).await?;
            if args.json {
                return print_json(&plan);
            }
            print!("{}", render_plan(&plan, &mut rand::thread_rng()));
            if let Some(amount) = args.rescale {
                match scale_burn_plan(&plan, amount) {
                    Some(scaled) => {
                        println!("\n--- rescaled ---");
                        print!("{}", render_plan(&scaled, &mut rand::thread_rng()));
                    }
                    None => tracing::warn!(
                        total_amount = %plan.total_amount,
                        "plan amount is not numeric; cannot rescale"
                    ),
                }
            }
            Ok(())
        }
        Command::Recent(args) => {
            let ctx = ClientContext::new(&cli)?;
            let plans = fetch_recent_plans(&ctx.api()?, args.limit).await?;
            if plans.is_empty() {
                println!("No burn plans yet");
            }
            let now = chrono::Utc::now().timestamp_millis();
            for plan in plans {
                println!(
                    "{:>10}  {:<10} {:>4}d  {:<18} {}",
                    format_time_ago(plan.timestamp, now),
                    plan.burn_plan.total_amount,
                    plan.burn_plan.timeline_days,
                    plan.burn_plan.efficiency_level,
                    plan.burn_plan.deployment_scenario
                );
            }
            Ok(())
        }
        Command::Hello => {
            let ctx = ClientContext::new(&cli)?;
            let response: Option<HelloResponse> = ctx.api()?.get("/hello").await?;
            match response {
                Some(response) => print_json(&response),
                None => Err(CliError::Server("empty hello response".to_string())),
            }
        }
    }
}

async fn run_server(args: &ServeArgs) -> Result<(), CliError> {
    let config = ServerConfig::from_env();
    let agent: Option<Arc<dyn AgentRuntime>> = match config.agent_runtime()? {
        Some(runtime_config) => {
            let runtime: Arc<dyn AgentRuntime> = Arc::new(HttpAgentRuntime::new(runtime_config)?);
            Some(runtime)
        }
        None => {
            tracing::warn!("AGENTCORE_AGENT_RUNTIME_ARN not set; burn plans will fail");
            None
        }
    };

    let router = build_router(AppState::new(agent)).layer(build_cors_layer(args)?);
    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| CliError::Server(err.to_string()))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

/// `--cors-*` flags replace the matching part of the default browser policy;
/// parts without a flag keep their default.
fn build_cors_layer(args: &ServeArgs) -> Result<CorsLayer, CliError> {
    let mut cors = default_cors_layer();
    if !args.cors_allow_origin.is_empty() {
        let origins: Vec<HeaderValue> =
            parse_cors_values(&args.cors_allow_origin, CliError::InvalidCorsOrigin)?;
        cors = cors.allow_origin(origins);
    }
    if !args.cors_allow_method.is_empty() {
        let methods: Vec<Method> =
            parse_cors_values(&args.cors_allow_method, CliError::InvalidCorsMethod)?;
        cors = cors.allow_methods(methods);
    }
    if !args.cors_allow_header.is_empty() {
        let headers: Vec<HeaderName> =
            parse_cors_values(&args.cors_allow_header, CliError::InvalidCorsHeader)?;
        cors = cors.allow_headers(headers);
    }
    if args.cors_allow_credentials {
        // Browsers reject credentialed responses for a wildcard origin.
        if args.cors_allow_origin.is_empty() {
            return Err(CliError::CredentialsWithoutOrigin);
        }
        cors = cors.allow_credentials(true);
    }
    Ok(cors)
}

fn parse_cors_values<T: std::str::FromStr>(
    raw: &[String],
    invalid: fn(String) -> CliError,
) -> Result<Vec<T>, CliError> {
    raw.iter()
        .map(|value| value.trim().parse().map_err(|_| invalid(value.clone())))
        .collect()
}

struct ClientContext {
    config: ClientConfig,
    session: Arc<Session>,
}

impl ClientContext {
    fn new(cli: &Cli) -> Result<Self, CliError> {
        let mut config = ClientConfig::from_env();
        if let Some(api_url) = &cli.api_url {
            config.api_base_url = api_url.clone();
        }
        if let Some(path) = &cli.session_file {
            config.session_file = Some(path.clone());
        }

        let path = config
            .session_file
            .clone()
            .or_else(FileStore::default_path)
            .ok_or_else(|| CliError::MissingConfig("BILL_BURNER_SESSION_FILE".to_string()))?;
        let session = Arc::new(Session::new(Arc::new(FileStore::new(path))));
        session.restore()?;

        let validation = config.validate();
        if !validation.valid {
            tracing::debug!(missing = ?validation.missing, "client configuration incomplete");
        }

        Ok(Self { config, session })
    }

    fn api(&self) -> Result<ApiClient, CliError> {
        if self.config.api_base_url.is_empty() {
            return Err(CliError::MissingConfig(
                "BILL_BURNER_API_BASE_URL".to_string(),
            ));
        }
        Ok(ApiClient::new(
            self.config.api_base_url.clone(),
            self.session.clone(),
        ))
    }

    fn authenticator(&self) -> Authenticator {
        Authenticator::new(self.config.clone(), self.session.clone())
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let pretty = serde_json::to_string_pretty(value)?;
    println!("{pretty}");
    Ok(())
}

fn render_plan<R: Rng + ?Sized>(plan: &BurnPlanAnalysis, rng: &mut R) -> String {
    let charts = chart_data(plan);
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{} over {} days ({})",
        plan.total_amount, plan.timeline_days, plan.efficiency_level
    );
    if !plan.deployment_scenario.is_empty() {
        let _ = writeln!(out, "\n{}", plan.deployment_scenario);
    }

    let _ = writeln!(out, "\nServices:");
    for point in &charts.racing_bar {
        let _ = writeln!(out, "  {:<40} ${:>12.2}", point.name, point.value);
    }
    let _ = writeln!(out, "\nBy category:");
    for point in &charts.pie {
        let _ = writeln!(out, "  {:<40} ${:>12.2}", point.name, point.value);
    }
    let _ = writeln!(out, "\nTotal: ${:.2}", charts.total_cost);
    if plan.cost_within(COST_TOLERANCE) == Some(false) {
        let _ = writeln!(out, "(more than 10% off the requested amount)");
    }

    for (heading, items) in [
        ("Key mistakes", &plan.key_mistakes),
        ("Recommendations", &plan.recommendations),
    ] {
        if items.is_empty() {
            continue;
        }
        let _ = writeln!(out, "\n{heading}:");
        for item in items {
            let _ = writeln!(out, "  - {item}");
        }
    }
    if !plan.roast.is_empty() {
        let _ = writeln!(out, "\n{}", plan.roast);
    }
    if let Some(invoice) = &plan.pdf_invoice {
        let _ = writeln!(out, "\nInvoice: {}", invoice.url);
    }

    let total = crate::burn_plan::parse_amount(&plan.total_amount).unwrap_or(charts.total_cost);
    let earned = achievement(total, rng);
    let _ = writeln!(out, "\n[{}] {}", earned.title, earned.text);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn serve_args() -> ServeArgs {
        ServeArgs {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_allow_origin: Vec::new(),
            cors_allow_method: Vec::new(),
            cors_allow_header: Vec::new(),
            cors_allow_credentials: false,
        }
    }

    #[test]
    fn cli_parses_burn_arguments() {
        let cli = Cli::try_parse_from([
            "bill-burner",
            "burn",
            "--amount",
            "2500",
            "--architecture",
            "serverless",
            "--stupidity",
            "9",
        ])
        .unwrap();
        match cli.command {
            Command::Burn(args) => {
                assert_eq!(args.amount, 2500.0);
                assert_eq!(args.timeline, 30);
                assert_eq!(args.architecture, Architecture::Serverless);
                assert_eq!(args.burning_style, BurningStyle::Horizontal);
                assert_eq!(args.stupidity, 9);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn stupidity_is_bounded() {
        let result = Cli::try_parse_from(["bill-burner", "burn", "--amount", "1", "--stupidity", "11"]);
        assert!(result.is_err());
    }

    #[test]
    fn invalid_cors_origin_is_rejected() {
        let mut args = serve_args();
        args.cors_allow_origin.push("not a header\nvalue".to_string());
        assert!(matches!(
            build_cors_layer(&args),
            Err(CliError::InvalidCorsOrigin(_))
        ));
        assert!(build_cors_layer(&serve_args()).is_ok());
    }

    #[test]
    fn cors_overrides_are_validated_per_flag() {
        let mut args = serve_args();
        args.cors_allow_method.push("GET".to_string());
        args.cors_allow_header.push("x-burner-trace".to_string());
        assert!(build_cors_layer(&args).is_ok());

        args.cors_allow_header.push("bad header".to_string());
        assert!(matches!(
            build_cors_layer(&args),
            Err(CliError::InvalidCorsHeader(header)) if header == "bad header"
        ));

        let mut args = serve_args();
        args.cors_allow_credentials = true;
        assert!(matches!(
            build_cors_layer(&args),
            Err(CliError::CredentialsWithoutOrigin)
        ));
        args.cors_allow_origin.push("https://burner.example.com".to_string());
        assert!(build_cors_layer(&args).is_ok());
    }

    #[test]
    fn rendered_plan_lists_services_and_achievement() {
        let plan: BurnPlanAnalysis = serde_json::from_value(json!({
            "total_amount": "$2000",
            "timeline_days": 10,
            "efficiency_level": "Very stupid",
            "services_deployed": [
                { "service_name": "EC2", "instance_type": "x1e.32xlarge", "total_cost": 1500.0 },
                { "service_name": "S3", "total_cost": 500.0 }
            ],
            "total_calculated_cost": 2000.0,
            "deployment_scenario": "static site",
            "key_mistakes": ["GPU for HTML"],
            "roast": "impressive"
        }))
        .unwrap();
        let text = render_plan(&plan, &mut StdRng::seed_from_u64(3));
        assert!(text.contains("EC2 x1e.32xlarge"));
        assert!(text.contains("Compute"));
        assert!(text.contains("Key mistakes:"));
        assert!(!text.contains("Recommendations:"));
        assert!(text.contains("[Down The Drain]"));
        assert!(text.contains("$2,000"));
    }
}
