use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rollcall::TransportError;
use rollcall::prelude::*;
use tracing_subscriber::EnvFilter;

/// QR attendance session server.
#[derive(Parser)]
#[command(name = "rollcall-server", version)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "ROLLCALL_BIND", default_value = "127.0.0.1:8080")]
    bind: String,

    /// Seconds a session stays valid
    #[arg(long, env = "ROLLCALL_TTL_SECS", default_value_t = 30)]
    ttl_secs: u64,

    /// Extra seconds the store keeps an outlived session
    #[arg(long, env = "ROLLCALL_GRACE_SECS", default_value_t = 5)]
    grace_secs: u64,

    /// Seconds between display code rotations
    #[arg(long, env = "ROLLCALL_ROTATE_SECS", default_value_t = 5)]
    rotate_secs: u64,

    /// Event every session belongs to
    #[arg(long, env = "ROLLCALL_EVENT_ID", default_value = "attend2025")]
    event_id: String,

    /// Namespace for store keys
    #[arg(long, env = "ROLLCALL_KEY_PREFIX", default_value = "qr")]
    key_prefix: String,

    /// Upper bound on a single store call, in milliseconds
    #[arg(long, env = "ROLLCALL_STORE_TIMEOUT_MS", default_value_t = 2000)]
    store_timeout_ms: u64,

    /// Run the presenter loop (scheduled reissue and rotation)
    #[arg(long, env = "ROLLCALL_PRESENTER")]
    presenter: bool,

    /// Seconds between scheduled reissues; defaults to the TTL
    #[arg(long, env = "ROLLCALL_REISSUE_SECS")]
    reissue_secs: Option<u64>,

    /// Seconds a connection may stay silent before it is closed
    #[arg(long, env = "ROLLCALL_IDLE_SECS", default_value_t = 60)]
    idle_secs: u64,

    /// Milliseconds a new connection gets to finish its WebSocket upgrade
    #[arg(long, env = "ROLLCALL_HANDSHAKE_MS", default_value_t = 10_000)]
    handshake_ms: u64,

    /// Redis URL; without it sessions live in this process only
    #[cfg(feature = "redis")]
    #[arg(long, env = "ROLLCALL_REDIS_URL")]
    redis_url: Option<String>,
}

impl Args {
    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            ttl_secs: self.ttl_secs,
            retention_grace_secs: self.grace_secs,
            rotation_interval_secs: self.rotate_secs,
            event_id: EventId::new(self.event_id.as_str()),
            key_prefix: self.key_prefix.clone(),
            store_timeout: Duration::from_millis(self.store_timeout_ms),
        }
    }

    fn cadence_config(&self) -> CadenceConfig {
        CadenceConfig {
            reissue_every: Duration::from_secs(self.reissue_secs.unwrap_or(self.ttl_secs)),
            rotate_every: Duration::from_secs(self.rotate_secs),
            ..CadenceConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), RollcallError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    #[cfg(feature = "redis")]
    {
        if let Some(url) = &args.redis_url {
            let store = Arc::new(RedisStore::connect(url).await?);
            return serve(&args, store).await;
        }
    }

    serve(&args, Arc::new(MemoryStore::new())).await
}

async fn serve<S: ExpiringStore>(args: &Args, store: Arc<S>) -> Result<(), RollcallError> {
    let mut builder = RollcallServerBuilder::new()
        .bind(&args.bind)
        .session_config(args.session_config())
        .idle_timeout(Duration::from_secs(args.idle_secs))
        .handshake_timeout(Duration::from_millis(args.handshake_ms));
    if args.presenter {
        builder = builder.presenter(args.cadence_config());
    }

    let server = builder
        .build(store, Arc::new(MemoryRecorder::new()))
        .await?;
    let addr = server.local_addr().map_err(TransportError::AcceptFailed)?;
    tracing::info!(%addr, "rollcall-server ready");
    server.run().await
}
