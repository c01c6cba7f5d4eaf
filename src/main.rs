use clap::{Parser, Subcommand};
use email_agent::auth::{self, AuthOutcome};
use email_agent::composio::ComposioClient;
use email_agent::config::{default_app_dir, ConfigStore, Field};
use email_agent::{router, setup_logging, AppState};
use log::{error, info, LevelFilter};
use std::net::SocketAddr;

#[derive(Parser)]
#[clap(name = "Email Agent")]
#[clap(version = env!("CARGO_PKG_VERSION"))]
#[clap(about = "Gmail actions powered by Composio", long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Option<Commands>,

    /// Force use of stderr-only logging (no file logging)
    #[clap(long, short, action)]
    memory_only: bool,

    /// Address to bind the HTTP server on
    #[clap(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind the HTTP server on
    #[clap(long, default_value_t = 5001)]
    port: u16,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default if no command specified)
    #[clap(name = "serve")]
    Serve,

    /// Run the Gmail authentication flow from the terminal
    #[clap(name = "auth")]
    Auth,

    /// Print configuration and authentication status
    #[clap(name = "status")]
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let log_target = if cli.memory_only {
        env_logger::builder()
            .filter_level(LevelFilter::Debug)
            .init();
        String::from("stderr-only")
    } else {
        setup_logging(LevelFilter::Debug, None)?
    };

    let app_dir = default_app_dir();
    let store = ConfigStore::open(&app_dir)?;

    match cli.command {
        Some(Commands::Auth) => run_auth_flow(store).await,
        Some(Commands::Status) => {
            print_status(&store);
            Ok(())
        }
        Some(Commands::Serve) | None => {
            info!("Email Agent starting; logs: {}", log_target);
            startup_check(&store);

            let addr: SocketAddr = format!("{}:{}", cli.host, cli.port).parse()?;
            let state = AppState::new(store);
            let app = router(state);

            println!("Starting server at http://{}", addr);
            info!("Listening on {}", addr);

            let listener = tokio::net::TcpListener::bind(addr).await?;
            let result = axum::serve(listener, app).await;
            if let Err(ref e) = result {
                error!("Server error: {}", e);
            }
            result.map_err(|e| e.into())
        }
    }
}

/// Report missing credentials at startup; the server still starts, Gmail
/// actions just fail until configuration is completed.
fn startup_check(store: &ConfigStore) {
    let resolved = store.resolve();
    let missing = resolved.missing();

    if missing.is_empty() {
        println!("All credentials configured (user: {})", resolved.user_id());
        if store.is_authenticated() {
            println!("Gmail authenticated");
        } else {
            println!("Gmail not authenticated; run POST /authenticate");
        }
        return;
    }

    println!("Missing credentials:");
    for name in &missing {
        println!("  - {}", name);
    }
    println!("\nSet credentials via POST /config or environment variables:");
    for field in Field::ALL {
        if let Some(var) = field.env_var() {
            println!("  - {}", var);
        }
    }
    println!("\nServer will start but Gmail actions won't work until configured.");
}

fn print_status(store: &ConfigStore) {
    let resolved = store.resolve();
    let missing = resolved.missing();
    println!("configured:    {}", missing.is_empty());
    println!("authenticated: {}", store.is_authenticated());
    println!("user_id:       {}", resolved.user_id());
    if !missing.is_empty() {
        println!("missing:       {}", missing.join(", "));
    }
}

/// Terminal version of the authenticate endpoint: prints the redirect URL
/// and tries to open it in a browser. The OAuth callback is handled by
/// the platform; rerun this command after completing the browser flow.
async fn run_auth_flow(mut store: ConfigStore) -> Result<(), Box<dyn std::error::Error>> {
    let resolved = store.resolve();
    let missing = resolved.missing();
    if !missing.is_empty() {
        eprintln!("Missing credentials: {}", missing.join(", "));
        std::process::exit(1);
    }

    let client = ComposioClient::new(
        resolved.get(Field::ComposioApiKey).unwrap_or_default(),
        reqwest::Client::new(),
    );
    let user_id = resolved.user_id().to_string();

    if let Some(connection_id) = auth::check_active_connection(&client, &user_id).await? {
        store.set_connection_id(&connection_id)?;
        println!("Already authenticated (connection {})", connection_id);
        return Ok(());
    }

    let auth_config_id = auth::ensure_auth_config(
        &client,
        store.auth().auth_config_id.as_deref(),
        resolved.get(Field::GmailClientId).unwrap_or_default(),
        resolved.get(Field::GmailClientSecret).unwrap_or_default(),
    )
    .await?;
    store.set_auth_config_id(&auth_config_id)?;

    match auth::begin_authentication(&client, &user_id, &auth_config_id).await? {
        AuthOutcome::Authenticated { connection_id } => {
            store.set_connection_id(&connection_id)?;
            println!("Gmail authentication successful!");
        }
        AuthOutcome::Pending { auth_url, .. } => {
            println!("Please visit this URL to authenticate:\n\n{}\n", auth_url);
            if webbrowser::open(&auth_url).is_err() {
                println!("(could not open a browser automatically)");
            }
            println!("After completing the flow, run 'email-agent auth' again to confirm.");
        }
    }

    Ok(())
}
