mod app;
mod config;
mod localize;
mod screencast;
mod tray;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    localize::localize();
    app::run(config::XcastConfig::load())
}
