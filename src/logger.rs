use env_logger::Env;

pub fn init_logger() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("melody_rust=info,warn"))
        .format_timestamp_millis()
        .try_init()?;
    Ok(())
}
