use std::process::Stdio;

use async_trait::async_trait;
use sysinfo::System;
use tokio::process::Command;
use tracing::{debug, warn};

/// JVM system properties TWS and IB Gateway are launched with.
const GATEWAY_PRODUCT_FLAGS: [&str; 2] = ["-DproductName=IB Gateway", "-DproductName=Trader Workstation"];

/// Pre-flight checks run before a connection attempt.
#[async_trait]
pub trait Reachability: Send + Sync {
    /// Whether TWS or IB Gateway is running on this machine.
    async fn local_gateway_running(&self) -> bool;

    /// Whether `host` answers a single ICMP echo.
    async fn host_reachable(&self, host: &str) -> bool;
}

/// Looks for the gateway among local processes and shells out to `ping`
/// for remote hosts.
pub struct SystemReachability;

/// A gateway is a `java` process started with one of the product flags.
fn is_gateway_process(name: &str, cmdline: &[String]) -> bool {
    name.to_lowercase().contains("java")
        && cmdline
            .iter()
            .any(|arg| GATEWAY_PRODUCT_FLAGS.iter().any(|flag| arg.contains(flag)))
}

fn scan_processes() -> bool {
    let system = System::new_all();
    system
        .processes()
        .values()
        .any(|process| is_gateway_process(process.name(), process.cmd()))
}

#[async_trait]
impl Reachability for SystemReachability {
    async fn local_gateway_running(&self) -> bool {
        match tokio::task::spawn_blocking(scan_processes).await {
            Ok(running) => {
                debug!(running, "scanned local processes for TWS / IB Gateway");
                running
            }
            Err(e) => {
                warn!(error = %e, "process scan failed");
                false
            }
        }
    }

    async fn host_reachable(&self, host: &str) -> bool {
        let count_flag = if cfg!(windows) { "-n" } else { "-c" };
        let status = Command::new("ping")
            .args([count_flag, "1", host])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match status {
            Ok(status) => status.success(),
            Err(e) => {
                warn!(host, error = %e, "failed to run ping");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn test_gateway_process_detection() {
        let gateway = args(&["java", "-Xmx768m", "-DproductName=IB Gateway", "ibgateway.GWClient"]);
        let tws = args(&["/opt/tws/jre/bin/java", "-DproductName=Trader Workstation"]);
        assert!(is_gateway_process("java", &gateway));
        assert!(is_gateway_process("Java.exe", &tws));

        assert!(!is_gateway_process("java", &args(&["-jar", "minecraft.jar"])));
        assert!(!is_gateway_process("ibgateway", &gateway));
    }
}
