use anyhow::{anyhow, Result};
use tracing::instrument;
use xcb::{
    screensaver::{QueryInfo, QueryInfoReply},
    x::{Drawable, Window},
    Connection,
};

use super::{InputMonitor, ScreenStateMonitor};

/// Screen saver states that mean the screen is blanked, see the MIT-SCREEN-SAVER protocol.
const SCREEN_SAVER_ON: u8 = 1;
const SCREEN_SAVER_CYCLE: u8 = 2;

/// Opens a connection with the MIT-SCREEN-SAVER extension and returns the root of the preferred
/// screen. Only one x11 screen is supported.
fn connect() -> Result<(Connection, Window)> {
    let (connection, preferred_screen) =
        Connection::connect_with_extensions(None, &[xcb::Extension::ScreenSaver], &[])?;
    let root = connection
        .get_setup()
        .roots()
        .nth(preferred_screen.max(0) as usize)
        .ok_or_else(|| anyhow!("X server has no screen {preferred_screen}"))?
        .root();
    Ok((connection, root))
}

fn query_info(connection: &Connection, root: Window) -> Result<QueryInfoReply> {
    let cookie = connection.send_request(&QueryInfo {
        drawable: Drawable::Window(root),
    });
    Ok(connection.wait_for_reply(cookie)?)
}

/// Reads idle time through the MIT-SCREEN-SAVER extension.
pub struct LinuxInputMonitor {
    connection: Connection,
    root: Window,
}

impl LinuxInputMonitor {
    pub fn new() -> Result<Self> {
        let (connection, root) = connect()?;
        Ok(Self { connection, root })
    }
}

impl InputMonitor for LinuxInputMonitor {
    #[instrument(skip(self))]
    fn get_idle_time(&mut self) -> Result<u32> {
        Ok(query_info(&self.connection, self.root)?.ms_since_user_input())
    }
}

/// Reports the screen as off while the X screen saver is active. Uses its own connection because
/// it is polled from the power event side of the tick loop.
pub struct LinuxScreenMonitor {
    connection: Connection,
    root: Window,
}

impl LinuxScreenMonitor {
    pub fn new() -> Result<Self> {
        let (connection, root) = connect()?;
        Ok(Self { connection, root })
    }
}

impl ScreenStateMonitor for LinuxScreenMonitor {
    #[instrument(skip(self))]
    fn is_screen_off(&mut self) -> Result<bool> {
        let state = query_info(&self.connection, self.root)?.state() as u8;
        Ok(matches!(state, SCREEN_SAVER_ON | SCREEN_SAVER_CYCLE))
    }
}
