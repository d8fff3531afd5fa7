use std::path::Path;
use tracing_subscriber::filter::{filter_fn, LevelFilter};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{registry, Layer};

/// If a global tracing subscriber is not already configured, log to `file_path` and to stderr,
/// and add a panic hook pointing at the log file.
pub fn install_file_logger(file_path: &Path) {
    let writer = tracing_appender::rolling::never(
        file_path.parent().unwrap_or_else(|| Path::new(".")),
        file_path
            .file_name()
            .unwrap_or_else(|| panic!("The path '{}' must point to a file.", file_path.display())),
    );
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(LevelFilter::INFO)
        .with_filter(filter_fn(|m| {
            if let Some(path) = m.module_path() {
                // The wgpu crate is logging too much, so we skip `info` level.
                if path.starts_with("wgpu") && *m.level() >= LevelFilter::INFO {
                    return false;
                }
            }
            true
        }));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(LevelFilter::INFO)
        .with_filter(filter_fn(|m| m.target().starts_with(env!("CARGO_CRATE_NAME"))));

    if registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok()
    {
        update_panic_hook(file_path);
    }
}

fn update_panic_hook(file_path: &Path) {
    let hook = std::panic::take_hook();
    let file_path = file_path.display().to_string();

    std::panic::set_hook(Box::new(move |info| {
        log::error!("PANIC => {}", info);
        eprintln!(
            "=== PANIC ===\nA fatal error happened, you can check the experiment logs here => \
             '{file_path}'\n============="
        );
        hook(info);
    }));
}
