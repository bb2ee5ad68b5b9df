//! xmlrpc-call - invoke one XML-RPC method from the command line.
//!
//! # Usage
//!
//! ```text
//! xmlrpc-call [--url <url>] [--json] <method> [param...]
//! ```
//!
//! Parameters are typed by prefix:
//!
//! | Form | Value |
//! |------|-------|
//! | `i:<n>` | `int` |
//! | `d:<x>` | `double` |
//! | `b:<0\|1\|true\|false>` | `boolean` |
//! | `t:<iso8601>` | `dateTime.iso8601` (local time unless an offset is given) |
//! | `nil` | `nil` |
//! | `s:<text>` or anything else | `string` |
//!
//! The result is printed in a compact form, or as JSON with `--json`. A fault
//! is printed to stderr and the process exits with status 1.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `XMLRPC_URL` | `http://localhost:8080/RPC2` | Endpoint (`--url` overrides) |
//! | `XMLRPC_TIMEOUT` | `60` | Request timeout in seconds |
//! | `XMLRPC_USER_AGENT` | `xmlrpc-client/<version>` | `User-Agent` header |
//! | `XMLRPC_KEEP_ALIVE` | `true` | Send `Connection: Keep-Alive` |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |

use anyhow::{Context, Result, bail};
use tracing::info;
use tracing_subscriber::EnvFilter;
use xmlrpc_client::{Client, ClientConfig};
use xmlrpc_model::Value;
use xmlrpc_xml::{Zone, decode_iso8601};

const VERSION: &str = env!("CARGO_PKG_VERSION");

const USAGE: &str = "usage: xmlrpc-call [--url <url>] [--json] <method> [param...]";

/// A parsed command line.
#[derive(Debug, PartialEq)]
struct Invocation {
    url: Option<String>,
    json: bool,
    method: String,
    params: Vec<Value>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Invocation> {
    let mut args = args.into_iter();
    let mut url = None;
    let mut json = false;

    let method = loop {
        match args.next() {
            Some(flag) if flag == "--url" => {
                url = Some(args.next().context("--url requires a value")?);
            }
            Some(flag) if flag == "--json" => json = true,
            Some(flag) if flag.starts_with("--") => bail!("unknown option {flag}\n{USAGE}"),
            Some(method) => break method,
            None => bail!(USAGE),
        }
    };

    let params = args.map(|arg| parse_param(&arg)).collect::<Result<_>>()?;
    Ok(Invocation {
        url,
        json,
        method,
        params,
    })
}

/// Convert one `prefix:literal` argument into a value.
fn parse_param(arg: &str) -> Result<Value> {
    if arg == "nil" {
        return Ok(Value::Nil);
    }
    let Some((prefix, literal)) = arg.split_once(':') else {
        return Ok(Value::from(arg));
    };

    let value = match prefix {
        "i" => Value::Int(
            literal
                .parse()
                .with_context(|| format!("invalid int parameter: {literal}"))?,
        ),
        "d" => {
            let d: f64 = literal
                .parse()
                .with_context(|| format!("invalid double parameter: {literal}"))?;
            if !d.is_finite() {
                bail!("double parameter must be finite: {literal}");
            }
            Value::Double(d)
        }
        "b" => match literal {
            "1" | "true" => Value::Bool(true),
            "0" | "false" => Value::Bool(false),
            _ => bail!("invalid boolean parameter: {literal}"),
        },
        "t" => Value::DateTime(
            decode_iso8601(literal, Zone::System)
                .with_context(|| format!("invalid dateTime parameter: {literal}"))?,
        ),
        "s" => Value::from(literal),
        _ => Value::from(arg),
    };
    Ok(value)
}

/// Initialize the tracing subscriber on stderr, keeping stdout for results.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let invocation = parse_args(std::env::args().skip(1))?;

    let mut config = ClientConfig::from_env();
    if let Some(url) = invocation.url {
        config.url = url;
    }

    init_tracing(&config.log_level)?;

    info!(
        url = %config.url,
        method = %invocation.method,
        params = invocation.params.len(),
        version = VERSION,
        "calling XML-RPC method",
    );

    let client = Client::new(&config).context("failed to create XML-RPC client")?;
    match client.method_call(&invocation.method, &invocation.params).await {
        Ok(value) if invocation.json => {
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Ok(value) => println!("{value}"),
        Err(e) => {
            if let Some(fault) = e.fault() {
                eprintln!("fault {}: {}", fault.code, fault.string);
                std::process::exit(1);
            }
            return Err(e).with_context(|| format!("call to {} failed", invocation.method));
        }
    }

    Ok(())
}
