use mock_service::MockConfig;
use std::net::SocketAddr;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_env_filter("mock_service=info,tower_http=debug")
        .init();

    tokio::task::spawn(async { mock_service::tps_measure_task().await });

    let config = MockConfig {
        token: std::env::var("MOCK_ALERT_TOKEN").ok(),
        alerts_per_second: std::env::var("MOCK_ALERTS_PER_SECOND")
            .ok()
            .and_then(|v| v.parse().ok()),
    };

    let addr: SocketAddr = "0.0.0.0:3002".parse()?;
    mock_service::run(addr, config).await
}
