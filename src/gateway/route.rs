//! Default route lookup, used to locate the NAT-PMP gateway

use super::types::MappingError;
use std::net::Ipv4Addr;

/// Find the IPv4 address of the default gateway
///
/// On Linux this reads the kernel routing table, on macOS it asks `netstat`
/// and on Windows `route print`.
pub fn find_default_gateway() -> Result<Ipv4Addr, MappingError> {
    #[cfg(target_os = "linux")]
    {
        let table = std::fs::read_to_string("/proc/net/route")
            .map_err(|e| MappingError::Internal(format!("Failed to read route table: {}", e)))?;
        parse_proc_net_route(&table).ok_or(MappingError::NoGateway)
    }

    #[cfg(target_os = "macos")]
    {
        let stdout = run_command("netstat", &["-rn", "-f", "inet"])?;
        parse_netstat_routes(&stdout).ok_or(MappingError::NoGateway)
    }

    #[cfg(target_os = "windows")]
    {
        let stdout = run_command("route", &["print", "0.0.0.0"])?;
        parse_route_print(&stdout).ok_or(MappingError::NoGateway)
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        Err(MappingError::NotSupported)
    }
}

#[cfg(any(target_os = "macos", target_os = "windows"))]
fn run_command(program: &str, args: &[&str]) -> Result<String, MappingError> {
    let output = std::process::Command::new(program)
        .args(args)
        .output()
        .map_err(|e| MappingError::Internal(format!("Failed to run {}: {}", program, e)))?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Pick the default route out of `/proc/net/route`
///
/// Destination and gateway columns are hex in host (little-endian) byte order.
pub(crate) fn parse_proc_net_route(table: &str) -> Option<Ipv4Addr> {
    table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 || fields[1] != "00000000" {
            return None;
        }
        let gateway = u32::from_str_radix(fields[2], 16).ok()?;
        if gateway == 0 {
            return None;
        }
        Some(Ipv4Addr::from(gateway.to_le_bytes()))
    })
}

/// Pick the default route out of `netstat -rn -f inet` output
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
pub(crate) fn parse_netstat_routes(output: &str) -> Option<Ipv4Addr> {
    output
        .lines()
        .filter(|line| line.starts_with("default"))
        .find_map(|line| line.split_whitespace().nth(1)?.parse().ok())
}

/// Pick the default route out of `route print 0.0.0.0` output
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
pub(crate) fn parse_route_print(output: &str) -> Option<Ipv4Addr> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("0.0.0.0"))
        .find_map(|line| line.split_whitespace().nth(2)?.parse().ok())
}
