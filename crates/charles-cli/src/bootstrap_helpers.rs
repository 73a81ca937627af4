use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Process-wide subscriber: `RUST_LOG` wins, otherwise `info`.
///
/// Per-Action events carry an `action_id` field, so targets are hidden to
/// keep lines short.
pub(crate) fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy()
        .add_directive("hyper=warn".parse().unwrap_or_else(|_| LevelFilter::WARN.into()))
        .add_directive("reqwest=warn".parse().unwrap_or_else(|_| LevelFilter::WARN.into()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
