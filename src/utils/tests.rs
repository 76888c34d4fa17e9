use super::error::RelayError;
use super::logging;

#[test]
fn logging_init_accepts_levels() {
    // Should not panic
    logging::init("info");
    logging::init("debug");
    logging::init("warn");
}

#[test]
fn parse_level_falls_back_to_info() {
    assert_eq!(logging::parse_level("WARNING"), tracing::Level::WARN);
    assert_eq!(logging::parse_level("trace"), tracing::Level::TRACE);
    assert_eq!(logging::parse_level("verbose"), tracing::Level::INFO);
}

#[test]
fn only_connection_closed_tears_down() {
    assert!(RelayError::ConnectionClosed.is_fatal_for_connection());
    assert!(!RelayError::protocol("missing chat").is_fatal_for_connection());
    assert!(!RelayError::QueueClosed.is_fatal_for_connection());
}

#[test]
fn protocol_error_message() {
    let err = RelayError::protocol("missing chat");
    assert_eq!(err.to_string(), "protocol error: missing chat");
}
