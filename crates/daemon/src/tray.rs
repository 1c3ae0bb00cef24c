//! System tray icon management for the Unminimize daemon.
//!
//! Provides a system tray icon with a context menu for common operations:
//! - Restore the last minimized window
//! - Toggle the restore scope and suspend the hotkey
//! - Rescan windows, reload or open the configuration
//! - Exit daemon

use std::sync::mpsc;
use thiserror::Error;
use tracing::{debug, info};
use tray_icon::{
    menu::{CheckMenuItem, Menu, MenuEvent, MenuItem, PredefinedMenuItem},
    TrayIcon, TrayIconBuilder,
};

/// Menu item IDs for tray context menu.
mod menu_ids {
    pub const RESTORE: &str = "restore";
    pub const CURRENT_APP_ONLY: &str = "current_app_only";
    pub const SUSPEND: &str = "suspend";
    pub const RESCAN: &str = "rescan";
    pub const RELOAD: &str = "reload";
    pub const OPEN_CONFIG: &str = "open_config";
    pub const EXIT: &str = "exit";
}

/// Events emitted by the tray icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayEvent {
    /// User clicked "Restore Last Window".
    RestoreLast,
    /// User toggled "Only Current Application".
    ToggleScope,
    /// User toggled "Suspend Hotkey".
    ToggleSuspend,
    /// User clicked "Rescan Windows".
    Rescan,
    /// User clicked "Reload Config".
    Reload,
    /// User clicked "Open Config".
    OpenConfig,
    /// User clicked "Exit".
    Exit,
}

/// Menu state mirrored from the daemon after every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrayStatus {
    /// A window is available to restore.
    pub can_restore: bool,
    /// Scope is restricted to the frontmost application.
    pub current_app_only: bool,
    /// The hotkey is suspended.
    pub suspended: bool,
}

/// Manages the system tray icon and context menu.
pub struct TrayManager {
    _tray: TrayIcon,
    restore: MenuItem,
    current_app_only: CheckMenuItem,
    suspend: CheckMenuItem,
    status: Option<TrayStatus>,
}

impl TrayManager {
    /// Create a new tray manager with icon and context menu.
    ///
    /// Menu clicks are delivered on `event_sender` from a background thread.
    pub fn new(event_sender: mpsc::Sender<TrayEvent>) -> Result<Self, TrayError> {
        let menu = Menu::new();
        let append = |item: &dyn tray_icon::menu::IsMenuItem| {
            menu.append(item).map_err(|e| TrayError::Menu(e.to_string()))
        };

        append(&MenuItem::new("Unminimize", false, None))?;
        append(&PredefinedMenuItem::separator())?;

        let restore = MenuItem::with_id(menu_ids::RESTORE, "Restore Last Window", false, None);
        append(&restore)?;

        let current_app_only =
            CheckMenuItem::with_id(menu_ids::CURRENT_APP_ONLY, "Only Current Application", true, false, None);
        append(&current_app_only)?;

        let suspend = CheckMenuItem::with_id(menu_ids::SUSPEND, "Suspend Hotkey", true, false, None);
        append(&suspend)?;

        append(&PredefinedMenuItem::separator())?;
        append(&MenuItem::with_id(menu_ids::RESCAN, "Rescan Windows", true, None))?;
        append(&MenuItem::with_id(menu_ids::RELOAD, "Reload Config", true, None))?;
        append(&MenuItem::with_id(menu_ids::OPEN_CONFIG, "Open Config", true, None))?;
        append(&PredefinedMenuItem::separator())?;
        append(&MenuItem::with_id(menu_ids::EXIT, "Exit", true, None))?;

        let icon = create_default_icon()?;

        let tray = TrayIconBuilder::new()
            .with_menu(Box::new(menu))
            .with_tooltip("Unminimize - restore minimized windows")
            .with_icon(icon)
            .build()
            .map_err(|e| TrayError::Build(e.to_string()))?;

        info!("System tray icon created");

        std::thread::Builder::new()
            .name("tray-menu".to_string())
            .spawn(move || {
                let menu_channel = MenuEvent::receiver();
                while let Ok(event) = menu_channel.recv() {
                    let Some(tray_event) = event_for_id(event.id.0.as_str()) else {
                        debug!("Unknown menu item clicked: {}", event.id.0);
                        continue;
                    };
                    if event_sender.send(tray_event).is_err() {
                        break;
                    }
                }
            })
            .map_err(|e| TrayError::Build(e.to_string()))?;

        Ok(Self {
            _tray: tray,
            restore,
            current_app_only,
            suspend,
            status: None,
        })
    }

    /// Bring menu items in line with daemon state.
    pub fn update(&mut self, status: TrayStatus) {
        if self.status == Some(status) {
            return;
        }
        self.restore.set_enabled(status.can_restore);
        self.current_app_only.set_checked(status.current_app_only);
        self.suspend.set_checked(status.suspended);
        self.status = Some(status);
    }
}

fn event_for_id(id: &str) -> Option<TrayEvent> {
    Some(match id {
        menu_ids::RESTORE => TrayEvent::RestoreLast,
        menu_ids::CURRENT_APP_ONLY => TrayEvent::ToggleScope,
        menu_ids::SUSPEND => TrayEvent::ToggleSuspend,
        menu_ids::RESCAN => TrayEvent::Rescan,
        menu_ids::RELOAD => TrayEvent::Reload,
        menu_ids::OPEN_CONFIG => TrayEvent::OpenConfig,
        menu_ids::EXIT => TrayEvent::Exit,
        _ => return None,
    })
}

/// Create a default icon for the tray.
///
/// A rounded square with an upward arrow.
fn create_default_icon() -> Result<tray_icon::Icon, TrayError> {
    const SIZE: usize = 32;
    const BACKGROUND: [u8; 3] = [45, 55, 72];
    const ARROW: [u8; 3] = [240, 180, 41];
    let mut rgba = vec![0u8; SIZE * SIZE * 4];

    let center = SIZE as f32 / 2.0;
    for y in 0..SIZE {
        for x in 0..SIZE {
            let idx = (y * SIZE + x) * 4;

            // Distance to the rounded-square outline
            let dx = ((x as f32 + 0.5 - center).abs() - 10.0).max(0.0);
            let dy = ((y as f32 + 0.5 - center).abs() - 10.0).max(0.0);
            let edge = (dx * dx + dy * dy).sqrt();
            if edge >= 6.0 {
                continue;
            }

            let offset = (x as i32 - 16).abs();
            let head = (6..16).contains(&y) && offset <= y as i32 - 6;
            let shaft = (16..26).contains(&y) && offset <= 2;
            let color = if head || shaft { ARROW } else { BACKGROUND };

            rgba[idx..idx + 3].copy_from_slice(&color);
            rgba[idx + 3] = if edge > 5.0 {
                ((6.0 - edge) * 255.0) as u8
            } else {
                255
            };
        }
    }

    tray_icon::Icon::from_rgba(rgba, SIZE as u32, SIZE as u32).map_err(|e| TrayError::Icon(e.to_string()))
}

/// Errors that can occur during tray operations.
#[derive(Debug, Error)]
pub enum TrayError {
    #[error("Failed to create menu: {0}")]
    Menu(String),

    #[error("Failed to build tray icon: {0}")]
    Build(String),

    #[error("Failed to create icon: {0}")]
    Icon(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_default_icon() {
        let icon = create_default_icon();
        assert!(icon.is_ok(), "Should create default icon successfully");
    }

    #[test]
    fn test_menu_ids_map_to_events() {
        assert_eq!(event_for_id(menu_ids::RESTORE), Some(TrayEvent::RestoreLast));
        assert_eq!(event_for_id(menu_ids::SUSPEND), Some(TrayEvent::ToggleSuspend));
        assert_eq!(event_for_id(menu_ids::EXIT), Some(TrayEvent::Exit));
        assert_eq!(event_for_id("nope"), None);
    }
}
