use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::Result;
use crate::models::SysInfo;

impl Database {
    pub fn get_sys_info(&self, name: &str) -> Result<Option<SysInfo>> {
        let info = self
            .conn()
            .query_row(
                "SELECT id, name, value FROM sys_info WHERE name = ?1",
                params![name],
                |row| {
                    Ok(SysInfo {
                        id: Some(row.get(0)?),
                        name: row.get(1)?,
                        value: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(info)
    }

    pub fn get_sys_value(&self, name: &str) -> Result<Option<String>> {
        Ok(self.get_sys_info(name)?.and_then(|info| info.value))
    }

    pub fn set_sys_value(&self, name: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO sys_info (name, value) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value",
            params![name, value],
        )?;
        Ok(())
    }

    /// Return the value stored under `name`, storing `init()` first if absent.
    pub fn get_or_init_sys_value<F>(&self, name: &str, init: F) -> Result<String>
    where
        F: FnOnce() -> String,
    {
        if let Some(value) = self.get_sys_value(name)? {
            return Ok(value);
        }
        let value = init();
        self.set_sys_value(name, &value)?;
        Ok(value)
    }

    /// Parse the value stored under `name`, or `None` when absent or unparsable.
    pub fn sys_value_as<T: std::str::FromStr>(&self, name: &str) -> Result<Option<T>> {
        let parsed = self.get_sys_value(name)?.and_then(|raw| {
            let parsed = raw.trim().parse::<T>().ok();
            if parsed.is_none() {
                tracing::warn!(name, value = %raw, "Ignoring unparsable sys_info value");
            }
            parsed
        });
        Ok(parsed)
    }
}
