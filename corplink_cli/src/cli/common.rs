use std::{
    env,
    io::{self, Read, Write},
    net::{TcpListener, TcpStream},
    path::PathBuf,
};

use anyhow::Context;
use async_trait::async_trait;
use corplink_app::{LinkService, LinkStatusEntry, RefreshCycleConfig, RefreshSweeper};
use corplink_core::{CredentialRecord, LinkEvent, NotificationSink, Timestamp};
use corplink_sso::{EsiAffiliationClient, HttpSsoClient, SsoConfig, StateCodec};
use corplink_store::SqliteCredentialStore;
use url::Url;

const DEFAULT_SCOPES: &str = "publicData";
const DEFAULT_DATABASE_PATH: &str = "corplink.sqlite";

pub(crate) type CliLinkService =
    LinkService<HttpSsoClient, EsiAffiliationClient, SqliteCredentialStore, LogNotificationSink>;
pub(crate) type CliRefreshSweeper =
    RefreshSweeper<HttpSsoClient, EsiAffiliationClient, SqliteCredentialStore, LogNotificationSink>;

/// Stand-in for the Discord-side collaborator: events land in the log and a
/// bot or operator decides how to reach the user.
pub(crate) struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    type Error = std::convert::Infallible;

    async fn notify(&self, event: LinkEvent) -> Result<(), Self::Error> {
        log::info!("link event for {}: {:?}", event.discord_id, event.kind);
        Ok(())
    }
}

pub(crate) fn load_sso_config() -> anyhow::Result<SsoConfig> {
    let mut config = SsoConfig::new(
        required_env("EVE_CLIENT_ID")?,
        required_env("EVE_CLIENT_SECRET")?,
        required_env("EVE_CALLBACK_URL")?,
        scopes_from_env(),
        env::var("CORPLINK_USER_AGENT")
            .unwrap_or_else(|_| format!("corplink/{}", clap::crate_version!())),
    );

    if let Ok(base) = env::var("EVE_LOGIN_BASE_URL") {
        config.login_base_url = base;
    }
    if let Ok(base) = env::var("EVE_ESI_BASE_URL") {
        config.esi_base_url = base;
    }

    Ok(config)
}

pub(crate) fn state_codec() -> anyhow::Result<StateCodec> {
    Ok(StateCodec::new(&required_env("CORPLINK_STATE_SECRET")?))
}

pub(crate) fn database_path() -> PathBuf {
    env::var("CORPLINK_DB")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATABASE_PATH))
}

pub(crate) async fn connect_store() -> anyhow::Result<SqliteCredentialStore> {
    SqliteCredentialStore::connect(database_path())
        .await
        .context("failed to open the credential database")
}

pub(crate) async fn build_link_service(config: &SsoConfig) -> anyhow::Result<CliLinkService> {
    let sso = HttpSsoClient::new(config).context("failed to create the SSO client")?;
    let affiliation =
        EsiAffiliationClient::new(config).context("failed to create the ESI client")?;
    let store = connect_store().await?;

    Ok(LinkService::new(
        sso,
        affiliation,
        store,
        LogNotificationSink,
        state_codec()?,
    ))
}

pub(crate) async fn build_refresh_sweeper(
    config: &SsoConfig,
    cycle: RefreshCycleConfig,
) -> anyhow::Result<CliRefreshSweeper> {
    let sso = HttpSsoClient::new(config).context("failed to create the SSO client")?;
    let affiliation =
        EsiAffiliationClient::new(config).context("failed to create the ESI client")?;
    let store = connect_store().await?;

    Ok(RefreshSweeper::new(
        sso,
        affiliation,
        store,
        LogNotificationSink,
        cycle,
    ))
}

pub(crate) fn print_record(record: &CredentialRecord) {
    println!("Discord: {} ({})", record.discord_id, record.discord_name);
    println!(
        "Character: {} ({})",
        record.character_name, record.character_id
    );
    match (&record.affiliation.corporation, &record.affiliation.alliance) {
        (Some(corporation), Some(alliance)) => println!(
            "Affiliation: [{}] {} / [{}] {}",
            alliance.ticker, alliance.name, corporation.ticker, corporation.name
        ),
        (Some(corporation), None) => {
            println!("Affiliation: [{}] {}", corporation.ticker, corporation.name);
        }
        _ => println!("Affiliation: <unresolved>"),
    }
    println!(
        "Token valid until: {} ({})",
        record.token_expires_at.to_rfc3339(),
        describe_validity(record.token_expires_at)
    );
    println!("Linked since: {}", record.created_at.to_rfc3339());
}

pub(crate) fn print_status_line(entry: &LinkStatusEntry) {
    let record = &entry.record;
    let corporation = record
        .affiliation
        .corporation
        .as_ref()
        .map(|c| c.ticker.as_str())
        .unwrap_or("----");
    println!(
        "{:<12} {:<20} {:<24} {:<6} {}",
        entry.status, record.discord_id, record.character_name, corporation,
        describe_validity(record.token_expires_at)
    );
}

fn describe_validity(expires_at: Timestamp) -> String {
    let remaining = expires_at.signed_duration_since(Timestamp::now()).num_seconds();
    if remaining >= 0 {
        format!("expires in {remaining}s")
    } else {
        format!("expired {}s ago", -remaining)
    }
}

pub(crate) fn required_env(name: &str) -> anyhow::Result<String> {
    env::var(name).map_err(|_| anyhow::anyhow!("missing required env var `{name}`"))
}

fn scopes_from_env() -> Vec<String> {
    let raw = env::var("EVE_SCOPES").unwrap_or_else(|_| DEFAULT_SCOPES.to_owned());
    raw.split(',')
        .map(str::trim)
        .filter(|scope| !scope.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

/// Accept exactly one redirect on the configured callback URL and hand back
/// its `code` and `state` query values. Good enough for an operator-driven
/// login from a terminal; a bot deployment terminates the redirect elsewhere.
pub(crate) fn wait_for_callback(callback_url: &str) -> anyhow::Result<(String, String)> {
    let parsed = Url::parse(callback_url).context("invalid callback URL")?;
    if parsed.scheme() != "http" {
        anyhow::bail!("the local callback listener only serves http callback URLs");
    }

    let host = parsed.host_str().context("callback URL must include a host")?;
    let port = parsed
        .port_or_known_default()
        .context("callback URL must include a valid port")?;
    let expected_path = parsed.path().to_owned();

    let bind_addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&bind_addr)
        .with_context(|| format!("failed to bind the callback listener on {bind_addr}"))?;

    let (mut stream, _) = listener.accept().context("failed to accept the callback")?;
    let request = read_request_head(&mut stream).context("failed to read the callback request")?;

    let target = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .context("malformed callback request line")?;
    let target_url = Url::parse(&format!("http://{bind_addr}{target}"))
        .context("invalid callback request target")?;

    if target_url.path() != expected_path {
        respond(&mut stream, 404, "Not Found", "Unexpected callback path.")?;
        anyhow::bail!("callback path does not match the configured callback URL");
    }

    let mut code = None;
    let mut state = None;
    for (key, value) in target_url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            _ => {}
        }
    }

    let (Some(code), Some(state)) = (code, state) else {
        respond(
            &mut stream,
            400,
            "Bad Request",
            "Missing code/state query parameters.",
        )?;
        anyhow::bail!("callback query is missing code and/or state");
    };

    respond(
        &mut stream,
        200,
        "OK",
        "Authorization captured. You can close this tab.",
    )?;
    Ok((code, state))
}

fn read_request_head(stream: &mut TcpStream) -> io::Result<String> {
    let mut buffer = [0_u8; 8192];
    let size = stream.read(&mut buffer)?;
    String::from_utf8(buffer[..size].to_vec())
        .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error.to_string()))
}

fn respond(stream: &mut TcpStream, code: u16, reason: &str, body: &str) -> io::Result<()> {
    let response = format!(
        "HTTP/1.1 {code} {reason}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes())?;
    stream.flush()
}
