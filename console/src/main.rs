// vrc-console -- command-line tool for inspecting and driving a VRC server.
//
// Usage:
//   vrc-console --host 10.0.0.5:4990 info
//   vrc-console --host 10.0.0.5:4990 roles
//   vrc-console --host 10.0.0.5:4990 radios
//   vrc-console --host 10.0.0.5:4990 set-role <ROLE-ID>
//   vrc-console --host 10.0.0.5:4990 tune 0 --net 1
//   vrc-console --host 10.0.0.5:4990 ptt 0 on
//   vrc-console --host 10.0.0.5:4990 radctrl R2 freq i:30000000
//   vrc-console --host 10.0.0.5:4990 -v monitor --duration 30

use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use vrclib::{EntityKind, Id, SettingValue, VrcClient, VrcClientBuilder};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// VRC console -- inspects and drives a VRC server from the command line.
#[derive(Parser)]
#[command(name = "vrc-console", version, about)]
struct Cli {
    /// Server address (host:port).
    #[arg(long, default_value = "127.0.0.1:4990")]
    host: String,

    /// Client program name registered with the server.
    #[arg(long, default_value = "vrc-console")]
    name: String,

    /// Blocking command timeout in milliseconds.
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,

    /// Enable debug logging (RUST_LOG overrides).
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print session, headset and phone state plus collection sizes.
    Info,

    /// List roles and their capabilities.
    Roles,

    /// List radios with their nets and derived frequencies.
    Radios,

    /// List jammers.
    Jammers,

    /// List calls, endpoints and pending invitations.
    Calls,

    /// Request a role by id.
    SetRole {
        /// Role id.
        role: String,
    },

    /// Tune a radio to an entry of its net list (omit --net to power off).
    Tune {
        /// Radio index.
        radio: usize,
        /// Index in the radio's net list.
        #[arg(long)]
        net: Option<usize>,
    },

    /// Press or release a software PTT.
    Ptt {
        /// PTT index.
        index: u32,
        #[arg(value_enum)]
        state: PttState,
    },

    /// Create a call and invite an endpoint to it.
    Call {
        /// Endpoint id to invite.
        endpoint: String,
        /// Number for the endpoint to dial.
        #[arg(long)]
        dial: Option<String>,
    },

    /// Request a license and wait for the server's decision.
    License {
        /// License type (e.g. jammer).
        license_type: String,
    },

    /// Live radio control: read a setting, or set it with a tagged value
    /// (s:TEXT, i:INT, f:FLOAT).
    Radctrl {
        /// Live radio name.
        name: String,
        /// Setting name.
        setting: String,
        /// New value.
        value: Option<String>,
    },

    /// Print change events as they arrive.
    Monitor {
        /// Duration in seconds (0 = run until Ctrl-C).
        #[arg(long, default_value_t = 0)]
        duration: u64,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PttState {
    On,
    Off,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Format a frequency in Hz as a human-readable MHz string.
fn format_freq(hz: u64) -> String {
    let mhz = hz as f64 / 1_000_000.0;
    format!("{mhz:.6} MHz")
}

fn format_id(id: Option<&Id>) -> String {
    id.map_or_else(|| "-".to_string(), |id| id.to_string())
}

/// Parse a tagged setting value, accepting a bare integer as `i:`.
fn parse_setting_value(value: &str) -> Result<SettingValue> {
    if let Ok(i) = value.parse::<i64>() {
        return Ok(SettingValue::Int(i));
    }
    SettingValue::parse_tagged(value)
        .with_context(|| format!("invalid setting value '{value}' (expected s:, i: or f:)"))
}

/// Run update cycles for `duration` so confirmations can arrive.
async fn settle(client: &mut VrcClient, duration: Duration) {
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        client.update().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    client.update().await;
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_info(client: &VrcClient) -> Result<()> {
    let session = client.session();
    let headset = client.headset();
    let phone = client.phone();

    println!("Session");
    if let Some(handle) = client.handle() {
        println!("  Handle:         {handle:08X}");
    }
    if let Some(version) = client.protocol_version() {
        println!("  Protocol:       {version}");
    }
    println!("  Status:         {}", session.connection_status);
    println!("  Connect state:  {}", session.connect_state);
    println!("  Mode:           {}", session.connection_mode);
    println!("  Target IP:      {}", session.target_ip);
    println!("  Client name:    {}", session.client_name);
    println!("  Server build:   {}", session.server_build_version);
    println!("  Operator:       {}", format_id(session.operator_id.as_ref()));
    println!("  Role:           {}", client.role_name_active().unwrap_or("-"));
    println!(
        "  Entity state:   {}",
        client.active_entity_state().map_or("-", |e| e.name.as_str())
    );
    println!();
    println!("Headset");
    println!("  Mic mode:       {}", headset.mic_mode);
    println!("  Earphone vol:   {}", headset.earphone_volume);
    println!("  Mic vol:        {}", headset.mic_volume);
    println!("  Configured:     {}", headset.device_configured);
    println!();
    println!("Phone");
    println!("  Present:        {}", phone.present);
    println!("  Active call:    {}", format_id(phone.active_call.as_ref()));
    println!();
    println!("Collections");
    for kind in [
        EntityKind::Role,
        EntityKind::EntityState,
        EntityKind::Radio,
        EntityKind::Net,
        EntityKind::Jammer,
        EntityKind::Cloud,
        EntityKind::Operator,
        EntityKind::RadioEffect,
        EntityKind::Playsound,
        EntityKind::Joystick,
    ] {
        let count = match kind {
            EntityKind::Role => client.roles().count(),
            EntityKind::EntityState => client.entity_states().count(),
            EntityKind::Radio => client.radios().count(),
            EntityKind::Net => client.nets().count(),
            EntityKind::Jammer => client.jammers().count(),
            EntityKind::Cloud => client.clouds().count(),
            EntityKind::Operator => client.operators().count(),
            EntityKind::RadioEffect => client.radio_effects().count(),
            EntityKind::Playsound => client.playsounds().count(),
            _ => client.joysticks().count(),
        };
        println!("  {:<14}  {count:>4}  (v{})", kind.to_string(), client.version(kind));
    }
    if client.malformed_count() > 0 {
        println!();
        println!("Dropped {} malformed line(s)", client.malformed_count());
    }
    Ok(())
}

fn cmd_roles(client: &VrcClient) -> Result<()> {
    let active = client.role_active();
    for role in client.roles().iter() {
        let marker = if Some(&role.id) == active { "*" } else { " " };
        let mut caps = Vec::new();
        if role.autotune {
            caps.push("autotune");
        }
        if role.radio_control {
            caps.push("radctrl");
        }
        if role.calling {
            caps.push("calling");
        }
        if role.chat {
            caps.push("chat");
        }
        println!("{marker} {}  {:<20} {}", role.id, role.name, caps.join(","));
    }
    Ok(())
}

fn cmd_radios(client: &VrcClient) -> Result<()> {
    for (index, radio) in client.radios().iter().enumerate() {
        println!(
            "[{index}] {} ({}) rx={} tx={} vol={}",
            radio.name, radio.radio_type, radio.rx_enabled, radio.tx_enabled, radio.volume
        );
        for n in 0..client.radio_net_count(index) {
            let Some(net) = client.radio_net_at(index, n) else {
                continue;
            };
            let marker = if client.radio_net_active(index) == Some(&net.id) {
                "*"
            } else {
                " "
            };
            println!("    {marker} ({n}) {:<16} {}", net.name, format_freq(net.frequency));
        }
        if let (Some(rx), Some(tx)) = (client.radio_rx_frequency(index), client.radio_tx_frequency(index)) {
            println!("    rx {}  tx {}", format_freq(rx), format_freq(tx));
        }
    }
    Ok(())
}

fn cmd_jammers(client: &VrcClient) -> Result<()> {
    for (index, jammer) in client.jammers().iter().enumerate() {
        println!(
            "[{index}] {} enabled={} {} net={}",
            jammer.name,
            jammer.enabled,
            jammer.record_replay,
            client.jammer_active_net(index).map_or("-", |n| n.name.as_str())
        );
    }
    Ok(())
}

fn cmd_calls(client: &VrcClient) -> Result<()> {
    let calls = client.calls();
    for call in calls.iter() {
        println!("call {}{}", call.id, if call.outstanding { " (new)" } else { "" });
        for endpoint in &call.endpoints {
            match endpoint.reason {
                Some(reason) => println!("    {} {} ({reason})", endpoint.id, endpoint.progress),
                None => println!("    {} {}", endpoint.id, endpoint.progress),
            }
        }
    }
    for invitation in calls.invitations() {
        println!(
            "invitation to {} from {} (call {}){}",
            invitation.to,
            invitation.from,
            invitation.call,
            invitation
                .dial_number
                .as_deref()
                .map(|d| format!(" dial {d}"))
                .unwrap_or_default()
        );
    }
    Ok(())
}

async fn cmd_set_role(client: &mut VrcClient, role: &str) -> Result<()> {
    if !client.roles().contains(role) {
        bail!("unknown role '{role}'");
    }
    client.set_role(role).await;
    settle(client, Duration::from_secs(1)).await;
    println!(
        "requested {}, active {}",
        format_id(client.role_set()),
        format_id(client.role_active())
    );
    Ok(())
}

async fn cmd_tune(client: &mut VrcClient, radio: usize, net: Option<usize>) -> Result<()> {
    if client.radio_at(radio).is_none() {
        bail!("no radio at index {radio}");
    }
    if let Some(net) = net {
        if net >= client.radio_net_count(radio) {
            bail!("radio {radio} has no net at index {net}");
        }
    }
    client.set_radio_net(radio, net).await;
    settle(client, Duration::from_secs(1)).await;
    println!(
        "radio {radio}: requested {}, active {}",
        format_id(client.radio_net_set(radio)),
        format_id(client.radio_net_active(radio))
    );
    Ok(())
}

async fn cmd_call(client: &mut VrcClient, endpoint: &str, dial: Option<&str>) -> Result<()> {
    let endpoint = Id::parse(endpoint).context("invalid endpoint id")?;
    let call = client.create_call().await.context("failed to create call")?;
    println!("created call {call}");
    match dial {
        Some(number) => client.call_invite_dial(&call, &endpoint, number).await,
        None => client.call_invite(&call, &endpoint).await,
    }
    settle(client, Duration::from_secs(2)).await;
    let state = client.calls().endpoint_state(call.as_str(), endpoint.as_str());
    println!("endpoint {endpoint}: {}", state.map_or("-".to_string(), |s| s.to_string()));
    Ok(())
}

async fn cmd_license(client: &mut VrcClient, license_type: &str) -> Result<()> {
    let id = client
        .request_license(license_type)
        .await
        .context("license request failed")?;
    settle(client, Duration::from_secs(2)).await;
    let status = client
        .license_status(id)
        .map_or("-".to_string(), |s| s.to_string());
    println!("license {id} ({license_type}): {status}");
    Ok(())
}

async fn cmd_radctrl(
    client: &mut VrcClient,
    name: &str,
    setting: &str,
    value: Option<&str>,
) -> Result<()> {
    if let Some(value) = value {
        let value = parse_setting_value(value)?;
        client
            .radctrl_set(name, setting, value)
            .await
            .with_context(|| format!("failed to set {name}.{setting}"))?;
    } else {
        client.radctrl_poll(name).await;
    }
    settle(client, Duration::from_millis(500)).await;

    match client.radctrl_value(name, setting) {
        Some(value) => println!("{name}.{setting} = {value}"),
        None => println!("{name}.{setting} is not set"),
    }
    let options = client.radctrl_options(name, setting);
    if !options.is_empty() {
        println!("  options: {}", options.join(", "));
    }
    Ok(())
}

async fn cmd_monitor(client: &mut VrcClient, duration_secs: u64) -> Result<()> {
    let mut event_rx = client.subscribe();

    println!("Monitoring server changes (Ctrl-C to stop)...");

    let deadline = (duration_secs > 0).then(|| Instant::now() + Duration::from_secs(duration_secs));

    loop {
        if deadline.is_some_and(|dl| Instant::now() >= dl) {
            println!("Monitor duration elapsed.");
            break;
        }
        client.update().await;
        loop {
            match event_rx.try_recv() {
                Ok(event) => println!("[event] {event:?}"),
                Err(tokio::sync::broadcast::error::TryRecvError::Lagged(n)) => {
                    println!("[warning] missed {n} events (consumer too slow)");
                }
                Err(_) => break,
            }
        }
        if !client.is_connected() {
            println!("Connection lost.");
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut client = VrcClientBuilder::new()
        .client_name(&cli.name)
        .command_timeout(Duration::from_millis(cli.timeout_ms))
        .connect(&cli.host)
        .await
        .with_context(|| format!("failed to connect to {}", cli.host))?;

    // Let the server's initial snapshot arrive.
    settle(&mut client, Duration::from_millis(500)).await;

    let result = match &cli.command {
        Command::Info => cmd_info(&client),
        Command::Roles => cmd_roles(&client),
        Command::Radios => cmd_radios(&client),
        Command::Jammers => cmd_jammers(&client),
        Command::Calls => cmd_calls(&client),
        Command::SetRole { role } => cmd_set_role(&mut client, role).await,
        Command::Tune { radio, net } => cmd_tune(&mut client, *radio, *net).await,
        Command::Ptt { index, state } => {
            client.set_ptt(*index, matches!(state, PttState::On)).await;
            settle(&mut client, Duration::from_millis(200)).await;
            println!("ptt {index}: {}", if client.ptt_pressed(*index) { "on" } else { "off" });
            Ok(())
        }
        Command::Call { endpoint, dial } => cmd_call(&mut client, endpoint, dial.as_deref()).await,
        Command::License { license_type } => cmd_license(&mut client, license_type).await,
        Command::Radctrl {
            name,
            setting,
            value,
        } => cmd_radctrl(&mut client, name, setting, value.as_deref()).await,
        Command::Monitor { duration } => cmd_monitor(&mut client, *duration).await,
    };

    if let Err(e) = client.close().await {
        tracing::debug!(error = %e, "close failed");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setting_values() {
        assert_eq!(parse_setting_value("42").unwrap(), SettingValue::Int(42));
        assert_eq!(
            parse_setting_value("s:AM").unwrap(),
            SettingValue::Str("AM".into())
        );
        assert!(parse_setting_value("AM").is_err());
    }

    #[test]
    fn frequency_formatting() {
        assert_eq!(format_freq(243_000_000), "243.000000 MHz");
    }
}
