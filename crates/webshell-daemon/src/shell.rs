//! The shell as seen by message handlers.
//!
//! Surface creation, rendering and desktop-file discovery live outside the
//! daemon. Handlers only need to look widgets up by name and poke at them,
//! query monitor geometry, and read the application catalogue; [`Shell`] is
//! that seam. [`HeadlessShell`] is an in-memory implementation driven by the
//! config file.

use std::collections::HashMap;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;
use webshell_types::message::ApplicationInfo;
use webshell_types::{ClickRegion, MonitorGeometry, MonitorId};

use crate::config::Config;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("widget not found: {widget} on monitor {monitor}")]
    WidgetNotFound { widget: String, monitor: MonitorId },

    #[error("application not found: {0}")]
    ApplicationNotFound(String),
}

/// Operations the daemon performs on the shell's widgets.
pub trait Shell: Send + Sync {
    fn set_visible(&self, widget: &str, monitor: MonitorId, visible: bool)
        -> Result<(), ShellError>;

    fn is_visible(&self, widget: &str, monitor: MonitorId) -> Result<bool, ShellError>;

    /// Set or update the named input region of a widget surface.
    fn set_click_region(
        &self,
        widget: &str,
        monitor: MonitorId,
        name: &str,
        region: ClickRegion,
    ) -> Result<(), ShellError>;

    fn set_keyboard_interactivity(
        &self,
        widget: &str,
        monitor: MonitorId,
        interactive: bool,
    ) -> Result<(), ShellError>;

    fn monitor(&self, id: MonitorId) -> Option<MonitorGeometry>;

    fn applications(&self) -> Vec<ApplicationInfo>;

    fn application(&self, id: &str) -> Option<ApplicationInfo> {
        self.applications().into_iter().find(|a| a.id == id)
    }
}

/// State of one widget surface on one monitor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurfaceState {
    pub visible: bool,
    pub keyboard_interactive: bool,
    pub click_regions: HashMap<String, ClickRegion>,
}

struct WidgetEntry {
    monitors: Vec<MonitorId>,
    surfaces: HashMap<MonitorId, SurfaceState>,
    initially_visible: bool,
}

impl WidgetEntry {
    fn shown_on(&self, monitor: MonitorId) -> bool {
        self.monitors.is_empty() || self.monitors.contains(&monitor)
    }
}

/// A shell without surfaces that records what handlers ask of it.
pub struct HeadlessShell {
    widgets: Mutex<HashMap<String, WidgetEntry>>,
    monitors: Vec<MonitorGeometry>,
    applications: Vec<ApplicationInfo>,
}

impl HeadlessShell {
    pub fn from_config(config: &Config) -> Self {
        let widgets = config
            .widgets
            .iter()
            .map(|w| {
                (
                    w.name.clone(),
                    WidgetEntry {
                        monitors: w.monitors.clone(),
                        surfaces: HashMap::new(),
                        initially_visible: !w.hidden,
                    },
                )
            })
            .collect();

        Self {
            widgets: Mutex::new(widgets),
            monitors: config.monitors.iter().map(|&m| m.into()).collect(),
            applications: config.applications.iter().cloned().map(Into::into).collect(),
        }
    }

    /// Current state of a widget surface, if the widget exists there.
    pub fn surface(&self, widget: &str, monitor: MonitorId) -> Option<SurfaceState> {
        let widgets = self.widgets.lock();
        let entry = widgets.get(widget).filter(|e| e.shown_on(monitor))?;
        Some(entry.surfaces.get(&monitor).cloned().unwrap_or(SurfaceState {
            visible: entry.initially_visible,
            ..SurfaceState::default()
        }))
    }

    fn with_surface<T>(
        &self,
        widget: &str,
        monitor: MonitorId,
        f: impl FnOnce(&mut SurfaceState) -> T,
    ) -> Result<T, ShellError> {
        let mut widgets = self.widgets.lock();
        let entry = widgets
            .get_mut(widget)
            .filter(|e| e.shown_on(monitor))
            .ok_or_else(|| ShellError::WidgetNotFound {
                widget: widget.to_string(),
                monitor,
            })?;
        let initially_visible = entry.initially_visible;
        let surface = entry.surfaces.entry(monitor).or_insert_with(|| SurfaceState {
            visible: initially_visible,
            ..SurfaceState::default()
        });
        Ok(f(surface))
    }
}

impl Shell for HeadlessShell {
    fn set_visible(
        &self,
        widget: &str,
        monitor: MonitorId,
        visible: bool,
    ) -> Result<(), ShellError> {
        self.with_surface(widget, monitor, |s| s.visible = visible)?;
        debug!(widget, monitor, visible, "widget visibility set");
        Ok(())
    }

    fn is_visible(&self, widget: &str, monitor: MonitorId) -> Result<bool, ShellError> {
        self.with_surface(widget, monitor, |s| s.visible)
    }

    fn set_click_region(
        &self,
        widget: &str,
        monitor: MonitorId,
        name: &str,
        region: ClickRegion,
    ) -> Result<(), ShellError> {
        self.with_surface(widget, monitor, |s| {
            s.click_regions.insert(name.to_string(), region);
        })
    }

    fn set_keyboard_interactivity(
        &self,
        widget: &str,
        monitor: MonitorId,
        interactive: bool,
    ) -> Result<(), ShellError> {
        self.with_surface(widget, monitor, |s| s.keyboard_interactive = interactive)
    }

    fn monitor(&self, id: MonitorId) -> Option<MonitorGeometry> {
        self.monitors.iter().find(|m| m.id == id).copied()
    }

    fn applications(&self) -> Vec<ApplicationInfo> {
        self.applications.clone()
    }
}
