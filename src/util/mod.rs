mod log_init;

pub use log_init::init_log;
