//! Systemd implementation of the unit driver.
//!
//! Talks to `org.freedesktop.systemd1` over the D-Bus system bus. The
//! connection is established once and held for the process lifetime.
//!
//! Status reads go through `LoadUnit` rather than `GetUnit`: `GetUnit`
//! only answers for loaded units, and systemd garbage-collects units
//! that were never started or were stopped long ago.

use async_trait::async_trait;
use zbus::zvariant::OwnedObjectPath;
use zbus::Connection;

use super::{ActiveState, UnitDriver};
use crate::error::{DriverError, RuntimeError};

/// Job queueing mode for start/stop/restart: replace pending jobs.
const REPLACE_MODE: &str = "replace";

#[zbus::proxy(
    interface = "org.freedesktop.systemd1.Manager",
    default_service = "org.freedesktop.systemd1",
    default_path = "/org/freedesktop/systemd1",
    gen_blocking = false
)]
trait SystemdManager {
    fn start_unit(&self, name: &str, mode: &str) -> zbus::Result<OwnedObjectPath>;
    fn stop_unit(&self, name: &str, mode: &str) -> zbus::Result<OwnedObjectPath>;
    fn restart_unit(&self, name: &str, mode: &str) -> zbus::Result<OwnedObjectPath>;
    fn load_unit(&self, name: &str) -> zbus::Result<OwnedObjectPath>;
}

#[zbus::proxy(
    interface = "org.freedesktop.systemd1.Unit",
    default_service = "org.freedesktop.systemd1",
    gen_blocking = false
)]
trait SystemdUnit {
    #[zbus(property)]
    fn active_state(&self) -> zbus::Result<String>;
}

/// Unit driver over the systemd D-Bus API.
pub struct SystemdDriver {
    connection: Connection,
    manager: SystemdManagerProxy<'static>,
}

impl SystemdDriver {
    /// Connects to the system bus and binds the systemd manager object.
    pub async fn connect() -> Result<Self, RuntimeError> {
        let connection = Connection::system()
            .await
            .map_err(RuntimeError::DriverConnect)?;
        let manager = SystemdManagerProxy::new(&connection)
            .await
            .map_err(RuntimeError::DriverConnect)?;
        Ok(Self {
            connection,
            manager,
        })
    }
}

#[async_trait]
impl UnitDriver for SystemdDriver {
    async fn start(&self, unit: &str) -> Result<(), DriverError> {
        self.manager.start_unit(unit, REPLACE_MODE).await?;
        Ok(())
    }

    async fn stop(&self, unit: &str) -> Result<(), DriverError> {
        self.manager.stop_unit(unit, REPLACE_MODE).await?;
        Ok(())
    }

    async fn restart(&self, unit: &str) -> Result<(), DriverError> {
        self.manager.restart_unit(unit, REPLACE_MODE).await?;
        Ok(())
    }

    async fn status(&self, unit: &str) -> Result<ActiveState, DriverError> {
        let path = self.manager.load_unit(unit).await?;
        let proxy = SystemdUnitProxy::builder(&self.connection)
            .path(path)?
            .cache_properties(zbus::proxy::CacheProperties::No)
            .build()
            .await?;
        let state = proxy.active_state().await?;
        Ok(ActiveState::parse(&state))
    }
}
