//! Command line request handling shared by the `portmapper` and
//! `portmapper-client` binaries
//!
//! Arguments have the form `command internalPort externalPort [protocol] [lifetime]`.
//! Parsing failures never reach the orchestrator: the binaries print
//! [`usage`] and exit with [`EXIT_USAGE`].

use crate::config::MappingDefaults;
use crate::gateway::{MappingRequest, MappingResult, Technology, TransportProtocol};
use crate::{Error, Result};
use tracing::debug;

/// Exit code for a successful mapping call
pub const EXIT_OK: i32 = 0;
/// Exit code for a failed mapping call
pub const EXIT_FAILED: i32 = 1;
/// Exit code for malformed arguments
pub const EXIT_USAGE: i32 = 2;

/// Whether to open or close
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Open a mapping
    Open,
    /// Close a mapping
    Close,
}

/// A parsed command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CliRequest {
    /// Open or close
    pub command: Command,
    /// Mapping to act on
    pub request: MappingRequest,
    /// Whether the lifetime was typed on the command line
    pub lifetime_explicit: bool,
}

/// Map a command token to an operation and technology
///
/// `open`/`close` select both protocols, a `pmp` suffix NAT-PMP only and a
/// `upnp` suffix UPnP only. Matching is case-insensitive.
pub fn parse_command(token: &str) -> Result<(Command, Technology)> {
    let token = token.to_ascii_lowercase();

    let (command, suffix) = if let Some(rest) = token.strip_prefix("open") {
        (Command::Open, rest)
    } else if let Some(rest) = token.strip_prefix("close") {
        (Command::Close, rest)
    } else {
        return Err(Error::InvalidArgument(format!("unknown command '{}'", token)));
    };

    let technology = match suffix {
        "" => Technology::Auto,
        "pmp" => Technology::NatPmp,
        "upnp" => Technology::Upnp,
        _ => return Err(Error::InvalidArgument(format!("unknown command '{}'", token))),
    };

    Ok((command, technology))
}

fn parse_port(value: &str, name: &str) -> Result<u16> {
    value.parse::<u16>().map_err(|_| {
        Error::InvalidArgument(format!("{} must be a number in 0-65535, got '{}'", name, value))
    })
}

fn parse_lifetime(value: &str) -> Result<u32> {
    value.parse::<u32>().map_err(|_| {
        Error::InvalidArgument(format!("lifetime must be a non-negative number, got '{}'", value))
    })
}

/// Parse positional arguments (without the program name)
pub fn parse_args<S: AsRef<str>>(args: &[S], defaults: &MappingDefaults) -> Result<CliRequest> {
    let args: Vec<&str> = args.iter().map(|arg| arg.as_ref()).collect();
    debug!("Parsing {} arguments", args.len());
    if !(3..=5).contains(&args.len()) {
        return Err(Error::InvalidArgument(format!(
            "expected 3 to 5 arguments, got {}",
            args.len()
        )));
    }

    let (command, technology) = parse_command(args[0])?;
    let internal_port = parse_port(args[1], "internal port")?;
    let external_port = parse_port(args[2], "external port")?;

    let mut protocol = defaults.protocol;
    let mut lifetime_secs = defaults.lifetime_secs;
    let mut lifetime_explicit = false;

    if let Some(&fourth) = args.get(3) {
        match fourth.parse::<TransportProtocol>() {
            Ok(p) => protocol = p,
            Err(_) if args.len() == 5 => {
                return Err(Error::InvalidArgument(format!(
                    "protocol must be tcp or udp, got '{}'",
                    fourth
                )));
            }
            Err(_) => {
                lifetime_secs = parse_lifetime(fourth)?;
                lifetime_explicit = true;
            }
        }
    }
    if let Some(&fifth) = args.get(4) {
        lifetime_secs = parse_lifetime(fifth)?;
        lifetime_explicit = true;
    }

    let request = MappingRequest::new(internal_port, external_port, protocol, lifetime_secs, technology);
    debug!(
        "Using values: command {:?}, internal port {}, external port {}, protocol {}, lifetime {}s",
        command, internal_port, external_port, protocol, lifetime_secs
    );

    Ok(CliRequest {
        command,
        request,
        lifetime_explicit,
    })
}

/// Seconds the standalone CLI stays alive to close a UPnP mapping itself
///
/// Only a lifetime typed on the command line bounds a UPnP mapping. With the
/// default lifetime the mapping stays until it is closed.
pub fn expiry_wait(parsed: &CliRequest, result: &MappingResult) -> Option<u32> {
    if parsed.lifetime_explicit {
        result.expires_in_secs
    } else {
        None
    }
}

/// Exit code for a mapping result
pub fn exit_code(result: &MappingResult) -> i32 {
    if result.is_ok() { EXIT_OK } else { EXIT_FAILED }
}

/// One-line summary printed to stdout after a call
pub fn render(result: &MappingResult) -> String {
    if !result.is_ok() {
        return format!("Execution failed: {}", result.message);
    }

    let mut line = format!("Success ({}): {}", result.technology, result.message);
    if let Some(mapping) = &result.mapping {
        line.push_str(&format!(
            ", external port {} -> internal port {}",
            mapping.external_port, mapping.internal_port
        ));
        if let Some(ip) = mapping.external_ip {
            line.push_str(&format!(", external IP {}", ip));
        }
    }
    if let Some(secs) = result.expires_in_secs {
        line.push_str(&format!(", closing in {}s", secs));
    }
    line
}

/// Usage text
///
/// `extra` is appended verbatim after the argument description, e.g. flag help.
pub fn usage(program: &str, defaults: &MappingDefaults, extra: &str) -> String {
    format!(
        "Usage:
{program} command internalPort externalPort [protocol] [lifetime]

Commands:
  - open for opening up a port - tries NAT-PMP and UPnP
  - close for closing a port - tries NAT-PMP and UPnP
  - openpmp & closepmp for only using NAT-PMP
  - openupnp & closeupnp for only using UPnP

Arguments:
  - Internal and external port in the range of 0-65535
  - Protocol can be tcp or udp (default {protocol})
  - Lifetime in seconds of the port mapping
    - for NAT-PMP guaranteed by the protocol, must be at least 1 (default {lifetime})
    - for UPnP unlimited by default (i.e. needs to be closed); when given, the
      mapping is closed after the lifetime if the process keeps running
{extra}
Exit Codes:
  0 if mapping successful
  1 if mapping not successful
  2 if arguments wrong
",
        program = program,
        protocol = defaults.protocol,
        lifetime = defaults.lifetime_secs,
        extra = extra,
    )
}
