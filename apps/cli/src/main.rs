//! iotctl: command line client for the IoT console
//!
//! Talks to the console server's `/api` routes. The session lives in HttpOnly
//! cookies, so the client keeps a cookie jar that is loaded from and written
//! back to a session file around every command. Expired sessions are refreshed
//! transparently through `/api/refresh-token`.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use cookie::Cookie;
use iot_console_client::{
    CancellationToken, ClientError, HttpRefresher, HttpSignOut, RefreshCoordinator,
    RequestConfig, RequestEngine,
};
use iot_console_common::constants::REQUEST_TIMEOUT_MS;
use iot_console_common::models::{
    Credentials, Device, DeviceCredentials, LorawanDevice, Paginated, TableDevice,
};
use iot_console_common::validation::{
    FieldError, map_device_field_errors, validate_device_credentials,
};
use reqwest::Method;
use reqwest::cookie::{CookieStore, Jar};
use serde_json::{Value, json};
use tracing::{Level, debug, info, warn};
use url::Url;

const REFRESH_ENDPOINT: &str = "/api/refresh-token";
const SIGN_OUT_ENDPOINT: &str = "/api/auth/sign-out";

/// CLI arguments for the console client
#[derive(Parser, Debug)]
#[command(name = "iotctl")]
#[command(about = "Command line client for the IoT console", long_about = None)]
#[command(version)]
struct Args {
    /// Console server URL
    #[arg(
        short,
        long,
        env = "IOTCTL_ENDPOINT",
        default_value = "http://localhost:3000"
    )]
    endpoint: String,

    /// File keeping the session cookies between runs
    #[arg(long, env = "IOTCTL_SESSION_FILE", default_value = ".iotctl-session")]
    session_file: PathBuf,

    /// Request timeout in milliseconds
    #[arg(long, default_value_t = REQUEST_TIMEOUT_MS)]
    timeout_ms: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in with email and password
    SignIn {
        #[arg(long)]
        email: String,

        #[arg(long, env = "IOTCTL_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// End the session
    SignOut,

    /// Show the signed-in user
    Me,

    /// List organizations visible to the user
    Organizations,

    /// Make another organization the default tenant
    SwitchOrganization { organization: String },

    /// Manage devices
    #[command(subcommand)]
    Devices(DeviceCommand),
}

#[derive(Subcommand, Debug)]
enum DeviceCommand {
    /// List one page of devices
    List {
        /// Zero based page
        #[arg(long, default_value_t = 0)]
        page: u64,

        #[arg(long)]
        search: Option<String>,

        #[arg(long)]
        status: Option<String>,
    },

    /// Show one device
    Get { id: String },

    /// Delete a device
    Delete { id: String },

    /// Register a LoRaWAN device
    Add {
        /// Device model id
        #[arg(long)]
        model: String,

        /// Network server id
        #[arg(long)]
        network_server: String,

        /// Dev EUI, hex with optional spaces between bytes
        #[arg(long)]
        dev_eui: String,

        #[arg(long)]
        join_eui: String,

        #[arg(long)]
        app_key: String,

        #[arg(long)]
        claim_code: Option<String>,
    },
}

/// Configuration for the client
#[derive(Debug, Clone)]
pub struct Config {
    /// Console server base URL
    pub endpoint: Url,

    pub session_file: PathBuf,

    pub timeout: Duration,
}

impl Config {
    fn from_args(args: &Args) -> Result<Self> {
        let endpoint = Url::parse(&args.endpoint)
            .with_context(|| format!("invalid endpoint: {}", args.endpoint))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            bail!("endpoint must be an http(s) URL: {}", args.endpoint);
        }

        Ok(Self {
            endpoint,
            session_file: args.session_file.clone(),
            timeout: Duration::from_millis(args.timeout_ms),
        })
    }
}

/// Console API client holding the session cookie jar
struct Console {
    engine: RequestEngine,
    jar: Arc<Jar>,
    config: Config,
    cancel: CancellationToken,
}

impl Console {
    fn new(config: Config, cancel: CancellationToken) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        load_session(&jar, &config)?;

        let http = reqwest::Client::builder()
            .cookie_provider(jar.clone())
            .user_agent(format!("iotctl/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        // Refresh and sign-out go through an engine without the coordinator
        let plain = RequestEngine::builder()
            .base_url(config.endpoint.as_str())
            .timeout(config.timeout)
            .client(http.clone())
            .build()?;
        let coordinator = RefreshCoordinator::new(
            Arc::new(HttpRefresher::new(plain.clone(), REFRESH_ENDPOINT)),
            Arc::new(HttpSignOut::new(plain, SIGN_OUT_ENDPOINT)),
        );

        let engine = RequestEngine::builder()
            .base_url(config.endpoint.as_str())
            .timeout(config.timeout)
            .client(http)
            .interceptor(Arc::new(coordinator))
            .build()?;

        Ok(Self {
            engine,
            jar,
            config,
            cancel,
        })
    }

    fn request(&self, method: Method) -> RequestConfig {
        RequestConfig::new(method).cancel(self.cancel.clone())
    }

    /// Write the jar back, removing the file once the session is gone
    fn save_session(&self) -> Result<()> {
        let path = &self.config.session_file;
        let cookies = self
            .jar
            .cookies(&self.config.endpoint)
            .and_then(|value| value.to_str().ok().map(str::to_string))
            .filter(|value| !value.is_empty());

        match cookies {
            Some(cookies) => {
                fs::write(path, cookies)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                restrict_permissions(path);
                debug!("Session saved to {}", path.display());
            }
            None if path.exists() => {
                fs::remove_file(path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
                debug!("Session file removed");
            }
            None => {}
        }
        Ok(())
    }
}

/// Seed the jar with the cookies saved by a previous run
fn load_session(jar: &Jar, config: &Config) -> Result<()> {
    let path = &config.session_file;
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let lines = cookie_lines(&raw, config.endpoint.scheme() == "https");
    for line in &lines {
        jar.add_cookie_str(line, &config.endpoint);
    }

    debug!("Loaded {} cookie(s) from {}", lines.len(), path.display());
    Ok(())
}

/// `Set-Cookie` style lines for every pair of a saved `Cookie` header
fn cookie_lines(raw: &str, secure: bool) -> Vec<String> {
    Cookie::split_parse(raw.trim())
        .flatten()
        .map(|cookie| {
            Cookie::build((cookie.name().to_string(), cookie.value_trimmed().to_string()))
                .path("/")
                .secure(secure)
                .build()
                .to_string()
        })
        .collect()
}

#[cfg(unix)]
fn restrict_permissions(path: &std::path::Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        warn!("Could not restrict {}: {}", path.display(), e);
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &std::path::Path) {}

async fn run(console: &Console, command: Command) -> Result<()> {
    match command {
        Command::SignIn { email, password } => {
            // A rejected sign-in is a plain 401, not an expired session
            let config = console
                .request(Method::POST)
                .json(&Credentials { email, password })?;
            let data = console.engine.dispatch("/api/auth/sign-in", config).await?;
            match data.get("default_organization").and_then(Value::as_str) {
                Some(organization) => println!("Signed in (organization: {})", organization),
                None => println!("Signed in"),
            }
        }
        Command::SignOut => {
            console
                .engine
                .dispatch(SIGN_OUT_ENDPOINT, console.request(Method::POST))
                .await?;
            println!("Signed out");
        }
        Command::Me => {
            let data = console
                .engine
                .get("/api/auth/me", console.request(Method::GET))
                .await?;
            print_json(&data)?;
        }
        Command::Organizations => {
            let data = console
                .engine
                .get("/api/console/organization", console.request(Method::GET))
                .await?;
            print_json(&data)?;
        }
        Command::SwitchOrganization { organization } => {
            let data = console
                .engine
                .post(
                    "/api/auth/switch-organization",
                    &json!({ "organization": organization }),
                    console.request(Method::POST),
                )
                .await?;
            let current = data
                .get("default_organization")
                .and_then(Value::as_str)
                .unwrap_or(&organization);
            println!("Default organization: {}", current);
        }
        Command::Devices(command) => run_devices(console, command).await?,
    }
    Ok(())
}

async fn run_devices(console: &Console, command: DeviceCommand) -> Result<()> {
    match command {
        DeviceCommand::List {
            page,
            search,
            status,
        } => {
            let mut config = console.request(Method::GET).query("pageIndex", page);
            if let Some(search) = search {
                config = config.query("search", search);
            }
            if let Some(status) = status {
                config = config.query("status", status);
            }

            let devices: Paginated<Device> = console
                .engine
                .request_as("/api/devices", config)
                .await?;
            let rows: Vec<TableDevice> = devices
                .results
                .into_iter()
                .map(TableDevice::from)
                .collect();
            print!("{}", device_table(&rows));
            println!("{} device(s) in total", devices.count);
        }
        DeviceCommand::Get { id } => {
            let data = console
                .engine
                .get(&format!("/api/devices/{}", id), console.request(Method::GET))
                .await?;
            print_json(&data)?;
        }
        DeviceCommand::Delete { id } => {
            console
                .engine
                .delete(&format!("/api/devices/{}", id), console.request(Method::DELETE))
                .await?;
            println!("Deleted device {}", id);
        }
        DeviceCommand::Add {
            model,
            network_server,
            dev_eui,
            join_eui,
            app_key,
            claim_code,
        } => {
            let devices = vec![DeviceCredentials {
                device_model: model,
                network_server,
                lorawan_device: LorawanDevice {
                    dev_eui,
                    join_eui,
                    claim_code,
                    app_key,
                },
                is_published: None,
            }];

            if let Some(errors) = validate_device_credentials(&devices) {
                report_field_errors(&map_device_field_errors(&errors));
                bail!("Device credentials are invalid");
            }

            let result = console
                .engine
                .post("/api/devices", &devices, console.request(Method::POST))
                .await;
            match result {
                Ok(data) => print_json(&data)?,
                Err(e) => {
                    let fields = e
                        .http()
                        .map(|http| map_device_field_errors(&http.data))
                        .unwrap_or_default();
                    if fields.is_empty() {
                        return Err(e.into());
                    }
                    report_field_errors(&fields);
                    bail!("Device was rejected");
                }
            }
        }
    }
    Ok(())
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn report_field_errors(errors: &[FieldError]) {
    for error in errors {
        eprintln!("  {}: {}", error.field, error.message);
    }
}

/// Fixed-width table of device rows
fn device_table(rows: &[TableDevice]) -> String {
    let mut table = format!(
        "{:<38} {:<14} {:<25} {:<25}\n",
        "ID", "STATUS", "DEV EUI", "JOIN EUI"
    );
    for row in rows {
        table.push_str(&format!(
            "{:<38} {:<14} {:<25} {:<25}\n",
            row.id.as_deref().unwrap_or("-"),
            row.status.as_deref().unwrap_or("-"),
            row.dev_eui.as_deref().unwrap_or("-"),
            row.join_eui.as_deref().unwrap_or("-"),
        ));
    }
    table
}

/// User-facing explanation for errors that need one
fn explain(error: &anyhow::Error) -> Option<&'static str> {
    match error.downcast_ref::<ClientError>()? {
        ClientError::RefreshExhausted | ClientError::RefreshFailed(_) => {
            Some("Your session has expired. Run `iotctl sign-in` to sign in again.")
        }
        ClientError::Aborted => Some("Cancelled."),
        ClientError::Timeout => Some("The console did not answer in time."),
        ClientError::Http(http) if http.status == reqwest::StatusCode::UNAUTHORIZED => {
            Some("Not signed in. Run `iotctl sign-in` first.")
        }
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_args(&args)?;
    info!("Console endpoint: {}", config.endpoint);

    let cancel = CancellationToken::new();
    let console = Console::new(config, cancel.clone())?;

    let outcome = tokio::select! {
        result = run(&console, args.command) => result,
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            Err(ClientError::Aborted.into())
        }
    };

    // Refreshes and sign-outs change the jar even when the command failed
    console.save_session()?;

    if let Err(e) = &outcome
        && let Some(hint) = explain(e)
    {
        eprintln!("{}", hint);
    }
    outcome
}
