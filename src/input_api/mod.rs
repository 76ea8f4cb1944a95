//! Contains logic for reading user input state from different environments.
//! [GenericInputMonitor] is the main artifact of this module that abstracts
//! the operations. Power events (screen and system sleep) live in [power].

pub mod power;
#[cfg(feature = "win")]
pub mod win;
#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "win")]
extern crate windows;

#[cfg(feature = "x11")]
extern crate xcb;

use anyhow::Result;

/// Intended to serve as a contract windows and linux systems must implement.
#[cfg_attr(test, mockall::automock)]
pub trait InputMonitor {
    /// Retrieve amount of time user has been inactive in milliseconds
    fn get_idle_time(&mut self) -> Result<u32>;
}

/// Serves as a cross-compatible InputMonitor implementation.
pub struct GenericInputMonitor {
    inner: Box<dyn InputMonitor>,
}

impl GenericInputMonitor {
    pub fn new() -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "win")] {
                use win::WindowsInputMonitor;
                Ok(Self {
                    inner: Box::new(WindowsInputMonitor::new()),
                })
            }
            else if #[cfg(feature = "x11")] {
                use x11::LinuxInputMonitor;
                Ok(Self {
                    inner: Box::new(LinuxInputMonitor::new()?),
                })
            }
            else {
                Err(anyhow::anyhow!(
                    "No input monitor was compiled in, enable the `x11` or `win` feature"
                ))
            }
        }
    }
}

impl InputMonitor for GenericInputMonitor {
    fn get_idle_time(&mut self) -> Result<u32> {
        self.inner.get_idle_time()
    }
}

/// Tells whether the display is blanked. Polled by [power::ScreenPowerEvents].
#[cfg_attr(test, mockall::automock)]
pub trait ScreenStateMonitor: Send {
    fn is_screen_off(&mut self) -> Result<bool>;
}

/// Screen state reader of the current platform, `None` where the platform has none.
pub fn platform_screen_monitor() -> Result<Option<Box<dyn ScreenStateMonitor>>> {
    cfg_if::cfg_if! {
        if #[cfg(feature = "x11")] {
            Ok(Some(Box::new(x11::LinuxScreenMonitor::new()?)))
        }
        else {
            Ok(None)
        }
    }
}
