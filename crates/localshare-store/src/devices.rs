use rusqlite::{params, OptionalExtension};

use localshare_shared::types::DeviceDescriptor;

use crate::database::{not_found, Database};
use crate::error::Result;
use crate::models::Device;

const DEVICE_COLUMNS: &str =
    "id, client_code, name, ip, port, channel_type, os_name, network_type, wifi_name";

impl Database {
    /// Insert when `device.id` is `None`, update otherwise.
    pub fn save_device(&self, device: &Device) -> Result<Device> {
        let port = device.port.map(i64::from);
        match device.id {
            None => {
                self.conn().execute(
                    "INSERT INTO device (client_code, name, ip, port, channel_type, os_name, network_type, wifi_name)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        device.client_code,
                        device.name,
                        device.ip,
                        port,
                        device.channel_type,
                        device.os_name,
                        device.network_type,
                        device.wifi_name,
                    ],
                )?;
                let mut saved = device.clone();
                saved.id = Some(self.conn().last_insert_rowid());
                Ok(saved)
            }
            Some(id) => {
                self.conn().execute(
                    "UPDATE device SET client_code = ?1, name = ?2, ip = ?3, port = ?4,
                         channel_type = ?5, os_name = ?6, network_type = ?7, wifi_name = ?8
                     WHERE id = ?9",
                    params![
                        device.client_code,
                        device.name,
                        device.ip,
                        port,
                        device.channel_type,
                        device.os_name,
                        device.network_type,
                        device.wifi_name,
                        id,
                    ],
                )?;
                Ok(device.clone())
            }
        }
    }

    pub fn get_device(&self, id: i64) -> Result<Device> {
        self.conn()
            .query_row(
                &format!("SELECT {DEVICE_COLUMNS} FROM device WHERE id = ?1"),
                params![id],
                row_to_device,
            )
            .map_err(not_found)
    }

    pub fn find_device_by_client_code(&self, client_code: &str) -> Result<Option<Device>> {
        let device = self
            .conn()
            .query_row(
                &format!("SELECT {DEVICE_COLUMNS} FROM device WHERE client_code = ?1"),
                params![client_code],
                row_to_device,
            )
            .optional()?;
        Ok(device)
    }

    pub fn list_devices(&self) -> Result<Vec<Device>> {
        let mut stmt = self
            .conn()
            .prepare(&format!("SELECT {DEVICE_COLUMNS} FROM device ORDER BY id ASC"))?;
        let rows = stmt.query_map([], row_to_device)?;

        let mut devices = Vec::new();
        for row in rows {
            devices.push(row?);
        }
        Ok(devices)
    }

    /// Create or refresh the row for `desc.client_code`. Matching is by
    /// client code only; address changes update the existing row.
    ///
    /// Callers wanting read-modify-write atomicity run this inside a
    /// transaction.
    pub fn upsert_device(&self, desc: &DeviceDescriptor) -> Result<Device> {
        let device = match self.find_device_by_client_code(&desc.client_code)? {
            Some(mut existing) => {
                existing.apply_descriptor(desc);
                existing
            }
            None => Device::from_descriptor(desc),
        };
        self.save_device(&device)
    }

    pub fn delete_device(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM device WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }
}

fn row_to_device(row: &rusqlite::Row<'_>) -> rusqlite::Result<Device> {
    let port: Option<i64> = row.get(4)?;
    let port = port
        .map(|p| {
            u16::try_from(p).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Integer, Box::new(e))
            })
        })
        .transpose()?;

    Ok(Device {
        id: Some(row.get(0)?),
        client_code: row.get(1)?,
        name: row.get(2)?,
        ip: row.get(3)?,
        port,
        channel_type: row.get(5)?,
        os_name: row.get(6)?,
        network_type: row.get(7)?,
        wifi_name: row.get(8)?,
    })
}
