//! Environment helpers: centralized dotenv loading and ergonomic getters.
//! Call `init_env()` once early in the binary (or rely on lazy Once).
use std::str::FromStr;
use std::sync::Once;
use tracing::info;

static INIT: Once = Once::new();

/// Load .env exactly once. Safe to call many times.
pub fn init_env() {
    INIT.call_once(|| {
        if dotenv::dotenv().is_ok() {
            return;
        }
        // Fallback to the crate root so `cargo run` from a subdirectory still works.
        let candidate = format!("{}/.env", env!("CARGO_MANIFEST_DIR"));
        let _ = dotenv::from_filename(candidate);
    });
}

/// Get required env var; error if missing.
pub fn env_req(key: &str) -> anyhow::Result<String> {
    init_env();
    std::env::var(key).map_err(|_| anyhow::anyhow!("missing env var {key}"))
}

/// Get optional env var (None if unset or empty).
pub fn env_opt(key: &str) -> Option<String> {
    init_env();
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Parsed value; `None` if unset or empty. A value that does not parse is
/// an error naming the variable, never a silent default.
pub fn env_parse<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = env_opt(key) else {
        return Ok(None);
    };
    match raw.trim().parse::<T>() {
        Ok(v) => Ok(Some(v)),
        Err(e) => anyhow::bail!("env var {key}={raw:?} is not valid: {e}"),
    }
}

/// Boolean flag; accepts 1/true/on/yes (case-insensitive) as true.
pub fn env_flag(key: &str, default: bool) -> bool {
    init_env();
    match std::env::var(key) {
        Ok(raw) => {
            let v = raw.trim().to_ascii_lowercase();
            matches!(v.as_str(), "1" | "true" | "on" | "yes")
        }
        Err(_) => default,
    }
}

/// Source database URL: `DATABASE_URL` first, then a DSN composed from the
/// `DB_HOST` / `DB_USER` / `DB_PASSWORD` / `DB_NAME` / `DB_PORT` variables.
pub fn db_url() -> anyhow::Result<String> {
    init_env();
    if let Some(v) = env_opt("DATABASE_URL") {
        return Ok(v);
    }
    let host = env_opt("DB_HOST");
    let user = env_opt("DB_USER");
    let database = env_opt("DB_NAME");
    match (host, user, database) {
        (Some(host), Some(user), Some(database)) => {
            let port: u16 = env_parse("DB_PORT")?.unwrap_or(3306);
            let password = env_opt("DB_PASSWORD");
            let dsn = compose_mysql_dsn(&host, port, &user, password.as_deref(), &database)
                .ok_or_else(|| anyhow::anyhow!("could not compose DSN from DB_* variables"))?;
            info!(target = "env", "using DSN composed from DB_* variables");
            Ok(dsn)
        }
        _ => Err(anyhow::anyhow!(
            "no database URL configured; set DATABASE_URL or DB_HOST/DB_USER/DB_NAME"
        )),
    }
}

/// Build a `mysql://` DSN via `url::Url` so reserved characters in the
/// credentials ('@', '?', '!') are percent-encoded.
pub fn compose_mysql_dsn(
    host: &str,
    port: u16,
    user: &str,
    password: Option<&str>,
    database: &str,
) -> Option<String> {
    let mut out = url::Url::parse("mysql://localhost").ok()?;
    out.set_username(user).ok()?;
    if let Some(pass) = password {
        out.set_password(Some(pass)).ok()?;
    }
    out.set_host(Some(host.trim())).ok()?;
    out.set_port(Some(port)).ok()?;
    out.set_path(&format!("/{database}"));
    Some(out.to_string())
}

/// Best-effort redaction for DSNs so credentials never reach the logs.
/// Host, port and database name are kept since they help debugging.
pub fn redact_db_url(raw: &str) -> String {
    match url::Url::parse(raw.trim()) {
        Ok(mut u) => {
            if !u.username().is_empty() {
                let _ = u.set_username("***");
            }
            if u.password().is_some() {
                let _ = u.set_password(Some("***"));
            }
            u.to_string()
        }
        Err(_) => match raw.find("//").zip(raw.find('@')) {
            Some((proto, at)) if at > proto => {
                format!("{}***@{}", &raw[..proto + 2], &raw[at + 1..])
            }
            _ => "***".to_string(),
        },
    }
}

fn redact_value(key: &str, val: &str) -> String {
    let k = key.to_ascii_uppercase();
    if k.contains("PASSWORD") || k.contains("SECRET") || k.contains("KEY") || k.contains("TOKEN")
    {
        return "***".to_string();
    }
    if k.contains("URL") || k.contains("DSN") {
        return redact_db_url(val);
    }
    val.trim().to_string()
}

/// Validate required keys and log a consolidated, redacted snapshot of configuration.
/// Returns error if any required key is missing.
pub fn preflight_check(title: &str, required: &[&str], also_log: &[&str]) -> anyhow::Result<()> {
    init_env();
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|k| env_opt(k).is_none())
        .collect();
    let snapshot: Vec<(String, String)> = also_log
        .iter()
        .map(|&k| {
            let v = env_opt(k).unwrap_or_default();
            (k.to_string(), redact_value(k, &v))
        })
        .collect();
    info!(target = "preflight", title, snapshot = ?snapshot, "configuration snapshot");
    if !missing.is_empty() {
        return Err(anyhow::anyhow!("missing required env: {:?}", missing));
    }
    Ok(())
}
