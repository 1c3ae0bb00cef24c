//! Global hotkey: key combinations and the registration lifecycle.
//!
//! Key codes are Windows virtual-key codes and the modifier bits match the
//! Win32 `MOD_*` flags, so a [`KeyCombo`] can be handed to `RegisterHotKey`
//! as-is.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from parsing or registering a hotkey.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HotkeyError {
    #[error("Invalid key combination: {0}")]
    InvalidCombo(String),

    #[error("Key combination '{0}' has no modifier keys")]
    MissingModifier(String),

    #[error("Failed to install hotkey handler: {0}")]
    HandlerFailed(String),

    #[error("Failed to register hotkey {combo}: {reason}")]
    RegistrationFailed { combo: KeyCombo, reason: String },
}

/// Modifier key bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Modifiers(u32);

impl Modifiers {
    pub const NONE: Self = Self(0);
    pub const ALT: Self = Self(0x1);
    pub const CONTROL: Self = Self(0x2);
    pub const SHIFT: Self = Self(0x4);
    pub const SUPER: Self = Self(0x8);

    const ALL: u32 = 0xF;

    /// Build from raw bits; unknown bits are dropped.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits & Self::ALL)
    }

    /// Raw bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Check if all modifiers in `other` are set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Check if no modifier is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Modifiers {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Modifiers {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Named keys beyond letters, digits and function keys.
const NAMED_KEYS: &[(&str, u32)] = &[
    ("Backspace", 0x08),
    ("Tab", 0x09),
    ("Enter", 0x0D),
    ("Escape", 0x1B),
    ("Space", 0x20),
    ("PageUp", 0x21),
    ("PageDown", 0x22),
    ("End", 0x23),
    ("Home", 0x24),
    ("Left", 0x25),
    ("Up", 0x26),
    ("Right", 0x27),
    ("Down", 0x28),
    ("Insert", 0x2D),
    ("Delete", 0x2E),
    ("`", 0xC0),
];

/// Aliases accepted when parsing.
const KEY_ALIASES: &[(&str, u32)] = &[
    ("return", 0x0D),
    ("esc", 0x1B),
    ("pgup", 0x21),
    ("pgdn", 0x22),
    ("ins", 0x2D),
    ("del", 0x2E),
    ("backtick", 0xC0),
    ("grave", 0xC0),
];

const VK_F1: u32 = 0x70;

fn key_code_from_name(name: &str) -> Option<u32> {
    let lower = name.to_ascii_lowercase();

    if let [c] = lower.as_bytes() {
        if c.is_ascii_lowercase() {
            return Some(c.to_ascii_uppercase() as u32);
        }
        if c.is_ascii_digit() {
            return Some(*c as u32);
        }
    }

    if let Some(n) = lower.strip_prefix('f').and_then(|n| n.parse::<u32>().ok()) {
        if (1..=24).contains(&n) {
            return Some(VK_F1 + n - 1);
        }
    }

    NAMED_KEYS
        .iter()
        .chain(KEY_ALIASES)
        .find(|(key, _)| key.eq_ignore_ascii_case(&lower))
        .map(|&(_, code)| code)
}

fn key_name(code: u32) -> Option<String> {
    match code {
        0x41..=0x5A | 0x30..=0x39 => char::from_u32(code).map(String::from),
        c if (VK_F1..VK_F1 + 24).contains(&c) => Some(format!("F{}", c - VK_F1 + 1)),
        c => NAMED_KEYS
            .iter()
            .find(|&&(_, code)| code == c)
            .map(|(name, _)| name.to_string()),
    }
}

/// A key plus modifiers, e.g. `Ctrl+Alt+M`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyCombo {
    /// Virtual-key code.
    pub key_code: u32,
    /// Modifier keys.
    pub modifiers: Modifiers,
}

impl KeyCombo {
    /// Create a combination. At least one modifier is required.
    pub fn new(key_code: u32, modifiers: Modifiers) -> Result<Self, HotkeyError> {
        let combo = Self { key_code, modifiers };
        if modifiers.is_empty() {
            return Err(HotkeyError::MissingModifier(combo.to_string()));
        }
        Ok(combo)
    }
}

impl FromStr for KeyCombo {
    type Err = HotkeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('+').map(str::trim).collect();
        let Some((key, modifier_names)) = parts.split_last() else {
            return Err(HotkeyError::InvalidCombo(s.to_string()));
        };

        let mut modifiers = Modifiers::NONE;
        for name in modifier_names {
            modifiers |= match name.to_ascii_lowercase().as_str() {
                "ctrl" | "control" => Modifiers::CONTROL,
                "alt" | "option" => Modifiers::ALT,
                "shift" => Modifiers::SHIFT,
                "win" | "super" | "cmd" | "meta" => Modifiers::SUPER,
                _ => return Err(HotkeyError::InvalidCombo(format!("unknown modifier '{}' in '{}'", name, s))),
            };
        }

        let key_code = key_code_from_name(key)
            .ok_or_else(|| HotkeyError::InvalidCombo(format!("unknown key '{}' in '{}'", key, s)))?;

        KeyCombo::new(key_code, modifiers)
    }
}

impl fmt::Display for KeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Modifiers::CONTROL, "Ctrl"),
            (Modifiers::ALT, "Alt"),
            (Modifiers::SHIFT, "Shift"),
            (Modifiers::SUPER, "Win"),
        ];
        for (modifier, name) in names {
            if self.modifiers.contains(modifier) {
                write!(f, "{}+", name)?;
            }
        }
        match key_name(self.key_code) {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "0x{:02X}", self.key_code),
        }
    }
}

/// OS key-event dispatcher used by [`HotkeyManager`].
pub trait HotkeyBackend {
    /// Install the key-event handler that receives presses.
    fn install_handler(&mut self) -> Result<(), HotkeyError>;

    /// Remove the key-event handler.
    fn remove_handler(&mut self);

    /// Bind a combination so its presses are delivered.
    fn bind(&mut self, combo: KeyCombo) -> Result<(), HotkeyError>;

    /// Release a binding.
    fn unbind(&mut self, combo: KeyCombo);
}

/// Registration state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyState {
    Unregistered,
    Registered(KeyCombo),
}

/// Owns the single system-wide restore shortcut.
///
/// Registering replaces the previous binding. A failed registration leaves
/// nothing bound; the old combination is not brought back.
pub struct HotkeyManager<B: HotkeyBackend> {
    backend: B,
    state: HotkeyState,
    handler_installed: bool,
    last_combo: Option<KeyCombo>,
}

impl<B: HotkeyBackend> HotkeyManager<B> {
    /// Create an unregistered manager.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: HotkeyState::Unregistered,
            handler_installed: false,
            last_combo: None,
        }
    }

    /// Bind `combo`, replacing any existing binding.
    pub fn register(&mut self, combo: KeyCombo) -> Result<(), HotkeyError> {
        self.unregister();
        self.last_combo = Some(combo);

        if !self.handler_installed {
            self.backend.install_handler()?;
            self.handler_installed = true;
        }

        if let Err(e) = self.backend.bind(combo) {
            warn!("Hotkey {} could not be registered: {}", combo, e);
            self.backend.remove_handler();
            self.handler_installed = false;
            return Err(e);
        }

        self.state = HotkeyState::Registered(combo);
        info!("Registered hotkey {}", combo);
        Ok(())
    }

    /// Release the binding and the handler. Safe to call when unregistered.
    pub fn unregister(&mut self) {
        if let HotkeyState::Registered(combo) = self.state {
            self.backend.unbind(combo);
            self.state = HotkeyState::Unregistered;
            debug!("Unregistered hotkey {}", combo);
        }
        if self.handler_installed {
            self.backend.remove_handler();
            self.handler_installed = false;
        }
    }

    /// Unregister while a new shortcut is being captured.
    pub fn suspend(&mut self) {
        self.unregister();
    }

    /// Re-register the last known combination, if any.
    pub fn resume(&mut self) -> Result<(), HotkeyError> {
        match self.last_combo {
            Some(combo) => self.register(combo),
            None => Ok(()),
        }
    }

    /// Unregister and forget the last combination.
    pub fn clear(&mut self) {
        self.unregister();
        self.last_combo = None;
    }

    /// Current registration state.
    pub fn state(&self) -> HotkeyState {
        self.state
    }

    /// Whether a combination is currently bound.
    pub fn is_registered(&self) -> bool {
        matches!(self.state, HotkeyState::Registered(_))
    }

    /// The currently bound combination.
    pub fn current(&self) -> Option<KeyCombo> {
        match self.state {
            HotkeyState::Registered(combo) => Some(combo),
            HotkeyState::Unregistered => None,
        }
    }

    /// The combination `resume` would register.
    pub fn last_combo(&self) -> Option<KeyCombo> {
        self.last_combo
    }

    /// The backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: HotkeyBackend> Drop for HotkeyManager<B> {
    fn drop(&mut self) {
        self.unregister();
    }
}
