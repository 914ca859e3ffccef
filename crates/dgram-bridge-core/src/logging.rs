//! Logging facilities for dgram-bridge.
//!
//! dgram-bridge uses the `tracing` crate for instrumentation. The library never
//! installs a subscriber; to see logs, install one in your application:
//!
//! ```ignore
//! fn main() {
//!     tracing_subscriber::fmt::init();
//!
//!     // Your application code...
//! }
//! ```
//!
//! Every event is emitted under one of the [`targets`] below, so logs can be
//! filtered per subsystem (e.g. `RUST_LOG=dgram_bridge::socket=debug`).

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Core crate target.
    pub const CORE: &str = "dgram_bridge_core";
    /// Signal/slot system target.
    pub const SIGNAL: &str = "dgram_bridge_core::signal";
    /// Socket lifecycle, receive loop and send gate.
    pub const SOCKET: &str = "dgram_bridge::socket";
    /// Socket service backends.
    pub const SERVICE: &str = "dgram_bridge::service";
}

#[cfg(test)]
mod tests {
    use super::targets;

    #[test]
    fn test_targets_are_nested_under_crate_names() {
        assert!(targets::SIGNAL.starts_with(targets::CORE));
        assert!(targets::SOCKET.starts_with("dgram_bridge::"));
        assert!(targets::SERVICE.starts_with("dgram_bridge::"));
    }
}
