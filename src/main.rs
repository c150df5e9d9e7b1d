use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ecoci::config::{CookieConfig, OAuthConfig, RateLimitConfig, ServerConfig};
use ecoci::server::{AppState, create_router};
use ecoci::store::{SqliteStore, Store};
use ecoci::types::Role;

#[derive(Parser)]
#[command(name = "ecoci")]
#[command(about = "Carbon accounting API for CI pipelines", long_about = None)]
#[command(version)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Start the server
    Serve(ServeArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Host to bind to
    #[arg(long, env = "ECOCI_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to bind to
    #[arg(long, short, env = "ECOCI_PORT", default_value = "8080")]
    port: u16,

    /// Data directory for the database
    #[arg(long, env = "ECOCI_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// HS256 key for session tokens
    #[arg(long, env = "ECOCI_JWT_SECRET", hide_env_values = true)]
    jwt_secret: String,

    /// Session token lifetime in seconds
    #[arg(long, env = "ECOCI_TOKEN_LIFETIME_SECS", default_value = "86400")]
    token_lifetime_secs: u64,

    /// GitHub OAuth app client id
    #[arg(long, env = "GITHUB_CLIENT_ID")]
    github_client_id: String,

    /// GitHub OAuth app client secret
    #[arg(long, env = "GITHUB_CLIENT_SECRET", hide_env_values = true)]
    github_client_secret: String,

    /// Callback URL registered with the GitHub app
    #[arg(
        long,
        env = "GITHUB_REDIRECT_URL",
        default_value = "http://localhost:8080/auth/github/callback"
    )]
    github_redirect_url: String,

    /// Timeout for each request to GitHub, in seconds
    #[arg(long, env = "ECOCI_OAUTH_TIMEOUT_SECS", default_value = "10")]
    oauth_timeout_secs: u64,

    /// Domain attribute for cookies
    #[arg(long, env = "ECOCI_COOKIE_DOMAIN")]
    cookie_domain: Option<String>,

    /// Mark cookies Secure and send HSTS
    #[arg(long, env = "ECOCI_COOKIE_SECURE")]
    cookie_secure: bool,

    /// Origins allowed for credentialed CORS requests
    #[arg(
        long,
        env = "ECOCI_ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:3000,http://localhost:8080"
    )]
    allowed_origins: Vec<String>,

    /// Sustained requests per second per client
    #[arg(long, env = "ECOCI_RATE_LIMIT_RPS", default_value = "100")]
    rate_limit_rps: u32,

    /// Burst size per client
    #[arg(long, env = "ECOCI_RATE_LIMIT_BURST", default_value = "200")]
    rate_limit_burst: u32,

    /// Most clients tracked by the rate limiter
    #[arg(long, env = "ECOCI_RATE_LIMIT_MAX_CLIENTS", default_value = "10000")]
    rate_limit_max_clients: usize,

    /// Seconds after which an idle client's bucket may be dropped
    #[arg(long, env = "ECOCI_RATE_LIMIT_IDLE_SECS", default_value = "600")]
    rate_limit_idle_secs: u64,

    /// Turn the rate limiter off
    #[arg(long)]
    no_rate_limit: bool,

    /// Proxies whose X-Forwarded-For header is trusted
    #[arg(long, env = "ECOCI_TRUSTED_PROXIES", value_delimiter = ',')]
    trusted_proxies: Vec<IpAddr>,

    /// Largest page size accepted by list endpoints
    #[arg(long, env = "ECOCI_MAX_PAGE_SIZE", default_value = "100")]
    max_page_size: u32,
}

impl ServeArgs {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            host: self.host,
            port: self.port,
            data_dir: self.data_dir,
            jwt_secret: self.jwt_secret,
            token_lifetime: Duration::from_secs(self.token_lifetime_secs),
            oauth: OAuthConfig {
                client_id: self.github_client_id,
                client_secret: self.github_client_secret,
                redirect_url: self.github_redirect_url,
                request_timeout: Duration::from_secs(self.oauth_timeout_secs),
                ..Default::default()
            },
            cookie: CookieConfig {
                domain: self.cookie_domain,
                secure: self.cookie_secure,
            },
            rate_limit: RateLimitConfig {
                enabled: !self.no_rate_limit,
                requests_per_second: self.rate_limit_rps,
                burst: self.rate_limit_burst,
                max_clients: self.rate_limit_max_clients,
                idle_ttl: Duration::from_secs(self.rate_limit_idle_secs),
                trusted_proxies: self.trusted_proxies,
            },
            allowed_origins: self.allowed_origins,
            max_page_size: self.max_page_size,
        }
    }
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Initialize the data directory and database
    Init {
        /// Data directory for the database
        #[arg(long, env = "ECOCI_DATA_DIR", default_value = "./data")]
        data_dir: PathBuf,
    },

    /// Change a user's role
    SetRole {
        #[arg(long, env = "ECOCI_DATA_DIR", default_value = "./data")]
        data_dir: PathBuf,

        /// GitHub handle of the user
        #[arg(long)]
        handle: String,

        /// New role: user or admin
        #[arg(long)]
        role: Role,
    },

    /// Delete a user with all their repositories and runs
    DeleteUser {
        #[arg(long, env = "ECOCI_DATA_DIR", default_value = "./data")]
        data_dir: PathBuf,

        /// GitHub handle of the user
        #[arg(long)]
        handle: String,
    },
}

fn open_store(data_dir: &std::path::Path) -> anyhow::Result<SqliteStore> {
    let db_path = data_dir.join("ecoci.db");
    if !db_path.exists() {
        bail!("Database not found at {}. Run 'ecoci admin init' first.", db_path.display());
    }
    let store = SqliteStore::new(&db_path)?;
    store.initialize()?;
    Ok(store)
}

fn run_admin(command: AdminCommands) -> anyhow::Result<()> {
    match command {
        AdminCommands::Init { data_dir } => {
            fs::create_dir_all(&data_dir)
                .with_context(|| format!("creating {}", data_dir.display()))?;

            let db_path = data_dir.join("ecoci.db");
            let store = SqliteStore::new(&db_path)?;
            store.initialize()?;

            println!("Database initialized at {}", db_path.display());
        }
        AdminCommands::SetRole {
            data_dir,
            handle,
            role,
        } => {
            let store = open_store(&data_dir)?;
            let Some(identity) = store.get_identity_by_handle(&handle)? else {
                bail!("No user with handle '{handle}'");
            };
            store.set_identity_role(&identity.id, role)?;
            println!("{} is now {role}", identity.handle);
        }
        AdminCommands::DeleteUser { data_dir, handle } => {
            let store = open_store(&data_dir)?;
            let Some(identity) = store.get_identity_by_handle(&handle)? else {
                bail!("No user with handle '{handle}'");
            };
            store.delete_identity(&identity.id)?;
            println!("Deleted {} and all their data", identity.handle);
        }
    }
    Ok(())
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = args.into_config();
    config.validate()?;

    fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating {}", config.data_dir.display()))?;

    let store = SqliteStore::new(config.db_path())?;
    store.initialize()?;

    let addr = config.socket_addr()?;
    let state = Arc::new(AppState::new(Arc::new(store), config)?);
    let app = create_router(state);

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::from_default_env().add_directive("ecoci=info".parse()?);
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    match cli.command {
        Commands::Admin { command } => run_admin(command)?,
        Commands::Serve(args) => serve(args).await?,
    }

    Ok(())
}
