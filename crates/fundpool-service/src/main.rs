use clap::{Parser, ValueEnum};
use fundpool_core::{NativeAmount, SubmissionConfig, ValidationPolicy};
use fundpool_service::{build_router, ServiceConfig, ServiceState, StorageBackend};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StorageMode {
    Memory,
    Pinning,
}

#[derive(Debug, Parser)]
#[command(name = "fundpoold", version, about = "Funding pool campaign submission service")]
struct Cli {
    /// REST socket address to bind, e.g. 127.0.0.1:8092
    #[arg(long, default_value = "127.0.0.1:8092", env = "FUNDPOOL_LISTEN")]
    listen: SocketAddr,
    /// Address of the connected wallet session. Without it submissions report a missing wallet.
    #[arg(long, env = "FUNDPOOL_WALLET_ADDRESS")]
    wallet_address: Option<String>,
    /// Asset storage backend.
    #[arg(long, value_enum, default_value_t = StorageMode::Memory, env = "FUNDPOOL_STORAGE")]
    storage: StorageMode,
    /// Pinning service base URL.
    #[arg(long, default_value = "https://api.pinata.cloud", env = "FUNDPOOL_PINNING_URL")]
    pinning_url: String,
    /// Bearer JWT for the pinning service.
    #[arg(long, env = "FUNDPOOL_PINNING_JWT", hide_env_values = true)]
    pinning_jwt: Option<String>,
    /// Treasury balance of the in-memory ledger, in native units.
    #[arg(long, default_value = "100", env = "FUNDPOOL_TREASURY_FUNDS")]
    treasury_funds: String,
    /// KYC-verified addresses of the in-memory ledger (comma separated).
    #[arg(long, value_delimiter = ',', env = "FUNDPOOL_KYC_ADDRESSES")]
    kyc_addresses: Vec<String>,
    /// File used to persist content ids of uploaded assets between attempts.
    #[arg(long, default_value = "fundpool/data/uploads.json", env = "FUNDPOOL_UPLOAD_CACHE")]
    upload_cache: PathBuf,
    /// Directory that path-based draft assets must live under. Unset refuses path assets.
    #[arg(long, env = "FUNDPOOL_ASSET_ROOT")]
    asset_root: Option<PathBuf>,
    /// Cached treasury snapshots older than this count as stale.
    #[arg(
        long,
        default_value_t = 60,
        value_parser = clap::value_parser!(i64).range(0..=i64::from(u32::MAX)),
        env = "FUNDPOOL_SNAPSHOT_MAX_AGE_SECS"
    )]
    snapshot_max_age_secs: i64,
    /// Re-query a stale treasury snapshot before validating a submission.
    #[arg(long, default_value_t = false, env = "FUNDPOOL_REFRESH_STALE_SNAPSHOT")]
    refresh_stale_snapshot: bool,
    /// Upload assets again on every attempt.
    #[arg(long, default_value_t = false)]
    no_upload_reuse: bool,
}

fn resolve_storage(cli: &Cli) -> anyhow::Result<StorageBackend> {
    let storage = match cli.storage {
        StorageMode::Memory => StorageBackend::Memory,
        StorageMode::Pinning => {
            let jwt = cli.pinning_jwt.clone().ok_or_else(|| {
                anyhow::anyhow!("storage=pinning requires --pinning-jwt or FUNDPOOL_PINNING_JWT")
            })?;
            StorageBackend::Pinning {
                base_url: cli.pinning_url.clone(),
                jwt,
            }
        }
    };

    Ok(storage)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| {
            "fundpool_service=info,fundpool_core=info,info".to_string()
        }))
        .init();

    let cli = Cli::parse();
    let config = ServiceConfig {
        upload_cache_path: cli.upload_cache.clone(),
        asset_root: cli.asset_root.clone(),
        storage: resolve_storage(&cli)?,
        wallet_address: cli.wallet_address.clone(),
        treasury_funds: NativeAmount::parse(&cli.treasury_funds)?,
        kyc_verified: cli.kyc_addresses.clone(),
        submission: SubmissionConfig {
            validation: ValidationPolicy::default(),
            snapshot_max_age_secs: cli.snapshot_max_age_secs,
            refresh_stale_snapshot: cli.refresh_stale_snapshot,
            reuse_uploaded_assets: !cli.no_upload_reuse,
        },
    };
    let state = ServiceState::bootstrap(config).await?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!("fundpool-service REST listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
