use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "docpack=info,tower_http=info";

/// RUST_LOG 优先，未设置时使用默认过滤规则
pub fn init_logger() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false).compact();

    if let Err(e) = tracing_subscriber::registry().with(filter).with(fmt_layer).try_init() {
        eprintln!("日志初始化失败: {}", e);
    }
}
