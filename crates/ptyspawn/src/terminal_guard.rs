//! RAII guard for the invoking terminal's raw mode

use anyhow::Result;
use crossterm::terminal;
use std::io::{self, IsTerminal};

/// Puts the invoking terminal in raw mode so keystrokes reach the child
/// unprocessed, and restores cooked mode when dropped.
///
/// Line editing, echo and signal keys are then handled by the child's pty
/// instead of ours.
pub struct TerminalGuard {
    raw_mode_enabled: bool,
    // Marker to ensure this type is !Send and !Sync
    _marker: std::marker::PhantomData<*const ()>,
}

impl TerminalGuard {
    /// A guard that has not touched the terminal yet.
    pub fn new() -> Self {
        Self {
            raw_mode_enabled: false,
            _marker: std::marker::PhantomData,
        }
    }

    /// Switch to raw mode if stdin is a terminal and input will be
    /// forwarded; otherwise return an inactive guard.
    pub fn for_stdin(forward_input: bool) -> Result<Self> {
        let mut guard = Self::new();
        if forward_input && io::stdin().is_terminal() {
            guard.enable_raw_mode()?;
        }
        Ok(guard)
    }

    /// Enable raw mode on the terminal. Calling it twice is a no-op.
    pub fn enable_raw_mode(&mut self) -> Result<()> {
        if !self.raw_mode_enabled {
            terminal::enable_raw_mode()?;
            self.raw_mode_enabled = true;
        }
        Ok(())
    }

    /// Restore the terminal to the mode it had before
    /// [`enable_raw_mode`](Self::enable_raw_mode). Does nothing if raw mode
    /// was never enabled through this guard.
    pub fn disable_raw_mode(&mut self) -> Result<()> {
        if self.raw_mode_enabled {
            terminal::disable_raw_mode()?;
            self.raw_mode_enabled = false;
        }
        Ok(())
    }

    /// Check if this guard currently holds the terminal in raw mode
    pub fn is_raw_mode(&self) -> bool {
        self.raw_mode_enabled
    }
}

impl Default for TerminalGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        // Errors are lost here; callers wanting them use disable_raw_mode
        if self.raw_mode_enabled {
            let _ = terminal::disable_raw_mode();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_starts_cooked() {
        let mut guard = TerminalGuard::new();
        assert!(!guard.is_raw_mode());
        // disabling when never enabled touches nothing
        guard.disable_raw_mode().unwrap();
        assert!(!guard.is_raw_mode());
    }

    #[test]
    fn test_no_raw_mode_without_forwarding() {
        let guard = TerminalGuard::for_stdin(false).unwrap();
        assert!(!guard.is_raw_mode());
    }
}
