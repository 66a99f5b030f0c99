use super::defaults::DEFAULT_INTERRUPT_CHAR;
use super::AppConfig;
use crate::vterm::{ReadMode, WriteMode};
use clap::Parser;

#[test]
fn defaults_match_socket_duplication() {
    let mut cfg = AppConfig::parse_from(["test-app"]);
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.read_mode, ReadMode::Poll);
    assert_eq!(cfg.write_mode, WriteMode::Buffered);
    assert_eq!(cfg.listen.port(), 8266);
    assert_eq!(cfg.effective_interrupt_char(), Some(DEFAULT_INTERRUPT_CHAR));
}

#[test]
fn parses_modes() {
    let mut cfg = AppConfig::parse_from([
        "test-app",
        "--read-mode",
        "thread",
        "--write-mode",
        "direct",
    ]);
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.read_mode, ReadMode::Thread);
    assert_eq!(cfg.write_mode, WriteMode::Direct);

    let cfg = AppConfig::parse_from(["test-app", "--read-mode", "disabled"]);
    assert_eq!(cfg.read_mode, ReadMode::Disabled);
}

#[test]
fn rejects_unknown_mode() {
    assert!(AppConfig::try_parse_from(["test-app", "--read-mode", "interrupt"]).is_err());
}

#[test]
fn rejects_non_ascii_interrupt_char() {
    let mut cfg = AppConfig::parse_from(["test-app", "--interrupt-char", "200"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_line_editing_interrupt_chars() {
    for byte in ["10", "13", "127"] {
        let mut cfg = AppConfig::parse_from(["test-app", "--interrupt-char", byte]);
        assert!(cfg.validate().is_err(), "byte {byte} should be rejected");
    }
}

#[test]
fn no_interrupt_skips_interrupt_char_checks() {
    let mut cfg = AppConfig::parse_from(["test-app", "--interrupt-char", "13", "--no-interrupt"]);
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.effective_interrupt_char(), None);
}

#[test]
fn rejects_multicast_listen_address() {
    let mut cfg = AppConfig::parse_from(["test-app", "--listen", "239.0.0.1:8266"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn no_logs_overrides_logs() {
    let mut cfg = AppConfig::parse_from(["test-app", "--logs", "--no-logs", "--log-content"]);
    assert!(cfg.validate().is_ok());
    assert!(!cfg.logging_enabled());
    assert!(!cfg.log_content);
}

#[test]
fn content_logging_kept_when_logging_enabled() {
    let mut cfg = AppConfig::parse_from(["test-app", "--logs", "--log-content"]);
    assert!(cfg.validate().is_ok());
    assert!(cfg.logging_enabled());
    assert!(cfg.log_content);
}

