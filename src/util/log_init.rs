use once_cell::sync::OnceCell;

static LOGGER: OnceCell<()> = OnceCell::new();

/// Installs the crate's `env_logger` format once per process. Safe to call
/// from every test; later calls are no-ops.
pub fn init_log() {
    LOGGER.get_or_init(|| {
        use env_logger::Builder;
        use std::io::Write;

        let mut builder = Builder::from_default_env();
        builder
            .format_timestamp_micros()
            .format(|buf, record| {
                writeln!(
                    buf,
                    "[{} - {}] [{}:{}] {}",
                    record.level(),
                    record.target(),
                    record.file().unwrap_or("?"),
                    record.line().unwrap_or(0),
                    record.args()
                )
            })
            .try_init()
            .ok();
    });
}
