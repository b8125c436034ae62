//! Version information.

pub const PROJECT_NAME: &str = "realtime-gateway";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn get_version_string() -> String {
    format!("{} {}", PROJECT_NAME, VERSION)
}
