use chrono::Utc;
use clap::Subcommand;
use routeslot_core::proxy::{NewProxy, Proxy, ProxyStatus, ProxyStore};
use std::path::Path;

use super::utils::{mask_secret, print_info, print_success, print_warning, CliError, CliResult};

#[derive(Subcommand)]
pub enum ProxiesCommands {
    /// Import proxies from a list file, one per line
    Import {
        /// Path to the proxy list
        file: String,

        /// Initial status for imported proxies (live or testing)
        #[arg(long, default_value = "testing")]
        status: String,

        /// Parse and report without writing to the store
        #[arg(long)]
        dry_run: bool,
    },

    /// List proxies in the pool
    List {
        /// Only show proxies with this status
        #[arg(long)]
        status: Option<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Show passwords in full
        #[arg(long)]
        show_sensitive: bool,
    },

    /// Return a quarantined proxy to rotation
    Reset {
        /// Proxy id
        id: i64,
    },

    /// Show pool counts by status
    Summary,
}

pub async fn handle_proxies_command(command: ProxiesCommands, store: &dyn ProxyStore) -> CliResult<()> {
    match command {
        ProxiesCommands::Import { file, status, dry_run } => {
            let status = parse_import_status(&status)?;
            import_file(store, &file, status, dry_run).await
        }
        ProxiesCommands::List { status, json, show_sensitive } => {
            let status = status.map(|s| s.parse::<ProxyStatus>().map_err(CliError::General)).transpose()?;
            list_proxies(store, status, json, show_sensitive).await
        }
        ProxiesCommands::Reset { id } => {
            store.reset_quarantine(id).await?;
            print_success(&format!("Proxy {id} reset to testing"));
            Ok(())
        }
        ProxiesCommands::Summary => {
            let summary = store.summary(Utc::now()).await?;
            println!("Proxy pool:");
            println!("  Total:        {}", summary.total);
            println!("  Live:         {}", summary.live);
            println!("  Testing:      {}", summary.testing);
            println!("  Quarantine:   {}", summary.quarantine);
            println!("  Blacklisted:  {}", summary.blacklisted);
            println!("  In use:       {}", summary.in_use);
            println!("  Cooling down: {}", summary.cooling_down);
            Ok(())
        }
    }
}

fn parse_import_status(status: &str) -> CliResult<ProxyStatus> {
    let status = status.parse::<ProxyStatus>().map_err(CliError::General)?;
    if !status.is_selectable() {
        return Err(CliError::General(format!("cannot import proxies as '{status}'")));
    }
    Ok(status)
}

/// Result of parsing a proxy list.
#[derive(Debug, Default)]
pub struct ParsedList {
    pub proxies: Vec<NewProxy>,
    /// `(line number, reason)` for every rejected line.
    pub rejected: Vec<(usize, String)>,
}

/// Parses a proxy list. Blank lines and `#` comments are skipped.
#[must_use]
pub fn parse_proxy_list(contents: &str, status: ProxyStatus) -> ParsedList {
    let mut parsed = ParsedList::default();
    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match NewProxy::parse_line(line) {
            Ok(proxy) => parsed.proxies.push(proxy.with_status(status)),
            Err(reason) => parsed.rejected.push((index + 1, reason)),
        }
    }
    parsed
}

async fn import_file(store: &dyn ProxyStore, file: &str, status: ProxyStatus, dry_run: bool) -> CliResult<()> {
    if !Path::new(file).exists() {
        return Err(CliError::General(format!("Proxy list not found: {file}")));
    }

    print_info(&format!("Reading proxies from {file}..."));
    let contents = tokio::fs::read_to_string(file).await?;
    let parsed = parse_proxy_list(&contents, status);

    for (line, reason) in &parsed.rejected {
        print_warning(&format!("line {line}: {reason}"));
    }

    if dry_run {
        print_info(&format!(
            "Dry run: {} proxies parsed, {} lines rejected",
            parsed.proxies.len(),
            parsed.rejected.len()
        ));
        return Ok(());
    }

    let imported = import_proxies(store, &parsed.proxies).await?;
    print_success(&format!("Imported {imported} proxies ({} lines rejected)", parsed.rejected.len()));
    Ok(())
}

/// Inserts every proxy and returns how many were written.
///
/// # Errors
/// Stops at the first store failure.
pub async fn import_proxies(store: &dyn ProxyStore, proxies: &[NewProxy]) -> CliResult<usize> {
    for proxy in proxies {
        store.insert(proxy).await?;
    }
    Ok(proxies.len())
}

async fn list_proxies(
    store: &dyn ProxyStore,
    status: Option<ProxyStatus>,
    json: bool,
    show_sensitive: bool,
) -> CliResult<()> {
    let mut proxies: Vec<Proxy> = store
        .list_all()
        .await?
        .into_iter()
        .filter(|p| status.map_or(true, |s| p.status == s))
        .collect();
    proxies.sort_by_key(|p| p.id);

    if !show_sensitive {
        for proxy in &mut proxies {
            proxy.password = proxy.password.as_deref().map(mask_secret);
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&proxies)?);
        return Ok(());
    }

    if proxies.is_empty() {
        print_info("No proxies found");
        return Ok(());
    }

    println!(
        "{:<6} {:<28} {:<8} {:<12} {:>8} {:>7} {:>6} {:>6}  AUTH",
        "ID", "ENDPOINT", "PROTO", "STATUS", "LATENCY", "HEALTH", "OK", "FAIL"
    );
    for proxy in &proxies {
        let latency = proxy.latency_ms.map_or_else(|| "-".to_string(), |ms| format!("{ms}ms"));
        let health = proxy.health_quality.map_or_else(|| "-".to_string(), |h| format!("{h:.0}"));
        let auth = match (&proxy.username, &proxy.password) {
            (Some(user), Some(pass)) => format!("{user}:{pass}"),
            (Some(user), None) => user.clone(),
            _ => "-".to_string(),
        };
        let status = if proxy.in_use { format!("{}*", proxy.status) } else { proxy.status.to_string() };
        println!(
            "{:<6} {:<28} {:<8} {:<12} {:>8} {:>7} {:>6} {:>6}  {}",
            proxy.id,
            proxy.endpoint(),
            proxy.protocol.as_str(),
            status,
            latency,
            health,
            proxy.success_count,
            proxy.fail_count,
            auth
        );
    }
    println!("\n{} proxies (* = currently assigned)", proxies.len());
    Ok(())
}
