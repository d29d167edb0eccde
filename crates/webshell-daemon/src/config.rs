//! Daemon configuration loaded from TOML.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use webshell_types::message::ApplicationInfo;
use webshell_types::{MonitorGeometry, MonitorId};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub cursor: CursorConfig,
    #[serde(default)]
    pub monitors: Vec<MonitorConfig>,
    #[serde(default)]
    pub widgets: Vec<WidgetConfig>,
    #[serde(default)]
    pub applications: Vec<ApplicationConfig>,
}

/// Transport and runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_ipc_port")]
    pub ipc_port: u16,
    /// Path of the command-channel socket.
    #[serde(default = "crate::setup::default_command_socket")]
    pub command_socket: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Close a bus connection that sends something other than an envelope.
    #[serde(default = "default_true")]
    pub close_on_malformed: bool,
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            ipc_port: default_ipc_port(),
            command_socket: crate::setup::default_command_socket(),
            log_level: default_log_level(),
            close_on_malformed: true,
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

/// Notification engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// When set, replaces the expiry requested by the client.
    #[serde(default)]
    pub timeout_override_ms: Option<i32>,
    /// Serve `org.freedesktop.Notifications` on the session bus.
    #[serde(default = "default_true")]
    pub dbus: bool,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_override_ms: None,
            dbus: true,
        }
    }
}

/// Cursor position poller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_cursor_command")]
    pub command: Vec<String>,
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            poll_interval_ms: default_poll_interval_ms(),
            command: default_cursor_command(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub id: MonitorId,
    pub width: u32,
    pub height: u32,
}

impl From<MonitorConfig> for MonitorGeometry {
    fn from(m: MonitorConfig) -> Self {
        MonitorGeometry::new(m.id, m.width, m.height)
    }
}

/// A widget known to the shell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WidgetConfig {
    pub name: String,
    /// Monitors the widget is shown on. Empty means every monitor.
    #[serde(default)]
    pub monitors: Vec<MonitorId>,
    #[serde(default)]
    pub hidden: bool,
}

/// A launchable application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub comment: String,
    pub exec: String,
}

impl From<ApplicationConfig> for ApplicationInfo {
    fn from(a: ApplicationConfig) -> Self {
        ApplicationInfo {
            id: a.id,
            name: a.name,
            comment: a.comment,
            exec: a.exec,
            ..ApplicationInfo::default()
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_ipc_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_shutdown_timeout_ms() -> u64 {
    2000
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_cursor_command() -> Vec<String> {
    vec!["hyprctl".to_string(), "cursorpos".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_valid() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.daemon.ipc_port, 8080);
        assert_eq!(config.daemon.bind, "127.0.0.1");
        assert!(config.daemon.close_on_malformed);
        assert!(config.notifications.enabled);
        assert_eq!(config.notifications.timeout_override_ms, None);
        assert!(config.notifications.dbus);
        assert!(!config.cursor.enabled);
        assert_eq!(config.cursor.command, ["hyprctl", "cursorpos"]);
    }

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("ipc_port = 8080"));
        assert!(toml_str.contains("poll_interval_ms = 100"));
    }

    #[test]
    fn parse_example_config() {
        let toml_str = r#"
[daemon]
bind = "0.0.0.0"
ipc_port = 9000
command_socket = "/run/user/1000/wss.sock"
close_on_malformed = false

[notifications]
timeout_override_ms = 5000
dbus = false

[cursor]
enabled = true
poll_interval_ms = 50

[[monitors]]
id = 0
width = 2560
height = 1440

[[widgets]]
name = "bar"
monitors = [0]

[[widgets]]
name = "launcher"
hidden = true

[[applications]]
id = "firefox.desktop"
name = "Firefox"
exec = "firefox"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.daemon.ipc_port, 9000);
        assert_eq!(
            config.daemon.command_socket,
            PathBuf::from("/run/user/1000/wss.sock")
        );
        assert!(!config.daemon.close_on_malformed);
        assert_eq!(config.notifications.timeout_override_ms, Some(5000));
        assert!(!config.notifications.dbus);
        assert_eq!(config.cursor.poll_interval_ms, 50);
        assert_eq!(config.cursor.command.len(), 2);
        assert_eq!(config.monitors[0].width, 2560);
        assert_eq!(config.widgets.len(), 2);
        assert!(config.widgets[1].hidden);
        assert!(config.widgets[1].monitors.is_empty());

        let app: ApplicationInfo = config.applications[0].clone().into();
        assert_eq!(app.id, "firefox.desktop");
        assert!(app.comment.is_empty());
    }
}
