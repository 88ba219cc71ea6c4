pub mod capture;
pub mod commands;
pub mod config;
pub mod core;
pub mod error;
pub mod services;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use crate::capture::CaptureEngine;
use crate::commands::EngineContext;
use crate::config::{EngineConfig, BYTES_PER_KIB, MAX_BURST_KIB, MAX_LIMIT_KIB_PER_SEC};
use crate::core::adapters::VpnDetector;
use crate::core::vpn::VpnTracking;
use crate::services::{ReportFormat, StatsReporter};

/// Host-local traffic shaper with per-direction bandwidth limits that keeps
/// VPN tunnel traffic out of interception.
#[derive(Parser, Debug, Clone)]
#[command(name = "netshaper", version, about)]
pub struct Args {
    /// Download limit in KiB/s (0 = unlimited)
    #[arg(
        long = "download-limit",
        default_value_t = 0,
        value_parser = clap::value_parser!(u64).range(..=MAX_LIMIT_KIB_PER_SEC)
    )]
    pub download_limit: u64,

    /// Upload limit in KiB/s (0 = unlimited)
    #[arg(
        long = "upload-limit",
        default_value_t = 0,
        value_parser = clap::value_parser!(u64).range(..=MAX_LIMIT_KIB_PER_SEC)
    )]
    pub upload_limit: u64,

    /// Token bucket capacity in KiB, shared by both directions
    #[arg(
        long = "max-burst",
        default_value_t = MAX_BURST_KIB,
        value_parser = clap::value_parser!(u64).range(1..=MAX_LIMIT_KIB_PER_SEC)
    )]
    pub max_burst: u64,

    /// Start with interception disabled (with auto-disable on, it is
    /// re-enabled as soon as no VPN adapter is present)
    #[arg(long)]
    pub disabled: bool,

    /// Keep intercepting while a VPN adapter is up (its addresses stay excluded)
    #[arg(long = "no-auto-disable")]
    pub no_auto_disable: bool,

    /// Re-intercept addresses of VPN adapters that have gone away
    #[arg(long = "forget-vpn")]
    pub forget_vpn: bool,

    /// Print one JSON stats object per second on stdout instead of log lines
    #[arg(long)]
    pub json: bool,
}

impl Args {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_burst_bytes: self.max_burst * BYTES_PER_KIB,
            download_limit_kib: self.download_limit,
            upload_limit_kib: self.upload_limit,
            interception_enabled: !self.disabled,
            auto_disable_on_vpn: !self.no_auto_disable,
            vpn_tracking: if self.forget_vpn {
                VpnTracking::Snapshot
            } else {
                VpnTracking::Accumulate
            },
            ..Default::default()
        }
    }

    pub fn report_format(&self) -> ReportFormat {
        if self.json {
            ReportFormat::Json
        } else {
            ReportFormat::Log
        }
    }
}

pub fn run() -> anyhow::Result<()> {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("PANIC in netshaper: {info}");
        default_hook(info);
    }));

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "netshaper=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("netshaper-rt")
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(serve(args.engine_config(), args.report_format()))
}

async fn serve(config: EngineConfig, format: ReportFormat) -> anyhow::Result<()> {
    let ctx = Arc::new(EngineContext::new(config));
    let engine = CaptureEngine::start(
        Arc::clone(&ctx),
        capture::platform_backend(),
        VpnDetector::platform_default(),
    )?;
    let reporter = StatsReporter::start(Arc::clone(&ctx), format);

    tracing::info!(
        "netshaper running (download={} KiB/s, upload={} KiB/s, auto-disable on VPN={}). Press Ctrl+C to stop.",
        ctx.state.download_limit(),
        ctx.state.upload_limit(),
        ctx.state.auto_disable_on_vpn()
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;

    tracing::info!("Shutting down");
    reporter.abort();
    tokio::task::spawn_blocking(move || engine.shutdown())
        .await
        .context("capture shutdown task failed")?;

    let totals = commands::traffic::traffic_totals(&ctx);
    tracing::info!(
        "Forwarded {} bytes down, {} bytes up",
        totals.download_bytes,
        totals.upload_bytes
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args_match_default_config() {
        let args = Args::try_parse_from(["netshaper"]).unwrap();
        assert_eq!(args.engine_config(), EngineConfig::default());
        assert_eq!(args.report_format(), ReportFormat::Log);
    }

    #[test]
    fn test_args_map_to_engine_config() {
        let args = Args::try_parse_from([
            "netshaper",
            "--download-limit",
            "500",
            "--upload-limit",
            "64",
            "--max-burst",
            "32",
            "--no-auto-disable",
            "--forget-vpn",
            "--disabled",
            "--json",
        ])
        .unwrap();
        let config = args.engine_config();
        assert_eq!(config.download_limit_kib, 500);
        assert_eq!(config.upload_limit_kib, 64);
        assert_eq!(config.max_burst_bytes, 32 * 1024);
        assert!(!config.auto_disable_on_vpn);
        assert!(!config.interception_enabled);
        assert_eq!(config.vpn_tracking, VpnTracking::Snapshot);
        assert_eq!(args.report_format(), ReportFormat::Json);
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        let too_fast = (MAX_LIMIT_KIB_PER_SEC + 1).to_string();
        assert!(Args::try_parse_from(["netshaper", "--upload-limit", too_fast.as_str()]).is_err());
        assert!(Args::try_parse_from(["netshaper", "--max-burst", "0"]).is_err());
        assert!(Args::try_parse_from(["netshaper", "--download-limit", "-5"]).is_err());
    }
}
