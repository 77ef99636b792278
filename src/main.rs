use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use nordbay::auth::{AuthError, AuthLevel, AuthService, GuardOutcome, SessionStore, UserPatch, can_access, resolve};
use nordbay::config::{Config, ConfigError, normalize_base_url};
use nordbay::net::types::{NewPublication, RegisterRequest};
use nordbay::net::{ApiClient, ApiError};
use nordbay::routes::{self, ROUTES, Route, View};
use nordbay::storage::{FileStorage, SessionStorage, persist_on_change};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

const DENIED_EXIT_CODE: u8 = 2;
const LISTING_WIZARD_PATH: &str = "/products/new";

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("failed to render output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no storefront page at {0}")]
    RouteNotFound(String),
    #[error("nothing to update; pass at least one field")]
    EmptyProfileUpdate,
}

#[derive(Parser, Debug)]
#[command(name = "nordbay", about = "NordBay marketplace client")]
struct Cli {
    /// Backend base URL.
    #[arg(long, env = "NORDBAY_API_URL")]
    api_url: Option<String>,

    /// Where the session is persisted between runs.
    #[arg(long, env = "NORDBAY_SESSION_FILE")]
    session_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "NORDBAY_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Register(RegisterArgs),
    Logout,
    Whoami,
    Refresh,
    /// Update profile fields.
    Profile(ProfileArgs),
    /// MitID identity verification.
    Mitid {
        #[command(subcommand)]
        command: MitidCommand,
    },
    /// Check access for a level and optional permission.
    Can {
        level: AuthLevel,
        #[arg(long)]
        permission: Option<String>,
    },
    /// Open a storefront page, e.g. `/dashboard/sales` or `/products?search=bike`.
    Open { location: String },
    /// Submit a new listing through the listing wizard.
    Publish(PublishArgs),
    /// List storefront pages and their requirements.
    Routes,
}

#[derive(Args, Debug)]
struct RegisterArgs {
    #[arg(long)]
    email: String,
    #[arg(long, env = "NORDBAY_PASSWORD", hide_env_values = true)]
    password: String,
    #[arg(long)]
    first_name: Option<String>,
    #[arg(long)]
    last_name: Option<String>,
    #[arg(long)]
    phone: Option<String>,
}

#[derive(Args, Debug)]
struct ProfileArgs {
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    first_name: Option<String>,
    #[arg(long)]
    last_name: Option<String>,
    #[arg(long)]
    phone: Option<String>,
}

#[derive(Subcommand, Debug)]
enum MitidCommand {
    /// Print the URL that starts MitID verification.
    Start {
        #[arg(long, default_value = "/dashboard")]
        return_to: String,
    },
    /// Pick up the result after finishing MitID in the browser.
    Complete,
}

#[derive(Args, Debug)]
struct PublishArgs {
    #[arg(long)]
    title: String,
    #[arg(long)]
    price: f64,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    category: Option<String>,
}

struct CliContext {
    config: Config,
    auth: AuthService,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nordbay=info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, CliError> {
    let mut config = Config::from_env()?;
    if let Some(api_url) = cli.api_url.as_deref() {
        config.api_url = normalize_base_url(api_url);
    }
    if let Some(session_file) = cli.session_file {
        config.session_file = session_file;
    }

    let store = SessionStore::new();
    let storage: Arc<dyn SessionStorage> = Arc::new(FileStorage::new(&config.session_file));
    let _persistence = persist_on_change(&store, Arc::clone(&storage));

    let api = ApiClient::new(&config.api_url, config.timeouts)?;
    let auth = AuthService::new(api, store);
    auth.bootstrap(storage.as_ref()).await;

    let ctx = CliContext { config, auth };
    match cli.command {
        Command::Login { email, password } => {
            let user = ctx.auth.login(&email, &password).await?;
            println!("Logged in as {} ({})", user.display_name(), ctx.level());
        }
        Command::Register(args) => {
            let request = RegisterRequest {
                email: args.email,
                password: args.password,
                first_name: args.first_name,
                last_name: args.last_name,
                phone: args.phone,
            };
            let user = ctx.auth.register(&request).await?;
            println!("Registered {}. Check your inbox to verify your email.", user.email);
        }
        Command::Logout => {
            ctx.auth.logout().await;
            println!("Logged out.");
        }
        Command::Whoami => whoami(&ctx),
        Command::Refresh => {
            ctx.auth.refresh().await?;
            println!("Session refreshed ({}).", ctx.level());
        }
        Command::Profile(args) => {
            let patch = UserPatch {
                email: args.email,
                first_name: args.first_name,
                last_name: args.last_name,
                phone: args.phone,
                ..UserPatch::default()
            };
            if patch.is_empty() {
                return Err(CliError::EmptyProfileUpdate);
            }
            let user = ctx.auth.update_profile(&patch).await?;
            print_json(&user)?;
        }
        Command::Mitid { command: MitidCommand::Start { return_to } } => {
            let url = ctx.auth.start_mitid(&return_to).await?;
            println!("Continue MitID verification in your browser:\n{url}");
        }
        Command::Mitid { command: MitidCommand::Complete } => {
            let level = ctx.auth.complete_mitid().await?;
            println!("Account level: {level}");
        }
        Command::Can { level, permission } => {
            let session = ctx.auth.store().snapshot();
            let decision = can_access(&session, level, permission.as_deref(), &ctx.config.permissions);
            print_json(&decision)?;
            if !decision.allowed {
                return Ok(ExitCode::from(DENIED_EXIT_CODE));
            }
        }
        Command::Open { location } => return open(&ctx, &location).await,
        Command::Publish(args) => return publish(&ctx, args).await,
        Command::Routes => list_routes(),
    }
    Ok(ExitCode::SUCCESS)
}

impl CliContext {
    fn level(&self) -> AuthLevel {
        resolve(&self.auth.store().snapshot())
    }

    /// Run the route's guard against the current session.
    fn check(&self, route: &Route, location: &str) -> GuardOutcome {
        let guard = route.guard(&self.config.login_path);
        guard.evaluate(&self.auth.store().snapshot(), location, &self.config.permissions)
    }
}

fn whoami(ctx: &CliContext) {
    let session = ctx.auth.store().snapshot();
    match session.user.as_ref() {
        Some(user) => {
            println!("{} <{}>", user.display_name(), user.email);
            println!("level:          {}", resolve(&session));
            println!("email verified: {}", user.verified);
            println!("MitID verified: {}", user.mitid_verified);
        }
        None => println!("Not logged in ({}).", AuthLevel::Public),
    }
}

async fn open(ctx: &CliContext, location: &str) -> Result<ExitCode, CliError> {
    let route = routes::match_route(location).ok_or_else(|| CliError::RouteNotFound(location.to_owned()))?;
    let outcome = ctx.check(route, location);
    if !outcome.is_allowed() {
        println!("{outcome}");
        return Ok(ExitCode::from(DENIED_EXIT_CODE));
    }

    let token = ctx.auth.store().snapshot().access_token().map(str::to_owned);
    let api = ctx.auth.api();
    match route.view {
        View::ProductSearch => {
            let search = routes::query_param(location, "search");
            print_json(&api.publications(search.as_deref(), token.as_deref()).await?)?;
        }
        View::ListingWizard => {
            println!("Listing wizard ready. Submit with `nordbay publish --title <title> --price <price>`.");
        }
        View::Checkout => println!("Checkout available."),
        View::Dashboard | View::Profile => {
            let user = ctx.auth.sync_user().await?;
            print_json(&DashboardSummary { level: ctx.level(), user: &user })?;
        }
        View::Sales => print_json(&api.sales(&ctx.auth.access_token()?).await?)?,
        View::Payments => print_json(&api.payments(&ctx.auth.access_token()?).await?)?,
        View::Wallet => print_json(&api.wallet(&ctx.auth.access_token()?).await?)?,
    }
    Ok(ExitCode::SUCCESS)
}

async fn publish(ctx: &CliContext, args: PublishArgs) -> Result<ExitCode, CliError> {
    let route = routes::match_route(LISTING_WIZARD_PATH)
        .ok_or_else(|| CliError::RouteNotFound(LISTING_WIZARD_PATH.to_owned()))?;
    let outcome = ctx.check(route, LISTING_WIZARD_PATH);
    if !outcome.is_allowed() {
        println!("{outcome}");
        return Ok(ExitCode::from(DENIED_EXIT_CODE));
    }

    let publication = NewPublication {
        title: args.title,
        description: args.description,
        price: args.price,
        category: args.category,
    };
    let created = ctx
        .auth
        .api()
        .create_publication(&ctx.auth.access_token()?, &publication)
        .await?;
    print_json(&created)?;
    Ok(ExitCode::SUCCESS)
}

fn list_routes() {
    for route in ROUTES {
        let permission = route.permission.unwrap_or("-");
        println!("{:<22} {:<16} {}", route.path, route.level, permission);
    }
}

#[derive(Serialize)]
struct DashboardSummary<'a> {
    level: AuthLevel,
    user: &'a nordbay::auth::User,
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
