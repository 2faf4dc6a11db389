use chrono::{DateTime, Utc};
use rusqlite::params;

use localshare_shared::types::MessageKind;

use crate::database::{not_found, Database};
use crate::error::Result;
use crate::models::DeviceMessage;

const MESSAGE_COLUMNS: &str = "id, created_time, device_id, opposite_id, type, content, filename,
     filepath, size, file_hash, download_success, download_size, save_path";

impl Database {
    /// Insert when `message.id` is `None`, update otherwise.
    pub fn save_message(&self, message: &DeviceMessage) -> Result<DeviceMessage> {
        let size = message.size.map(|s| s as i64);
        let download_size = message.download_size as i64;

        match message.id {
            None => {
                self.conn().execute(
                    "INSERT INTO device_message (created_time, device_id, opposite_id, type, content, filename,
                         filepath, size, file_hash, download_success, download_size, save_path)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    params![
                        message.created_time.to_rfc3339(),
                        message.device_id,
                        message.opposite_id,
                        message.kind.as_str(),
                        message.content,
                        message.filename,
                        message.filepath,
                        size,
                        message.file_hash,
                        message.download_success as i32,
                        download_size,
                        message.save_path,
                    ],
                )?;
                let mut saved = message.clone();
                saved.id = Some(self.conn().last_insert_rowid());
                Ok(saved)
            }
            Some(id) => {
                self.conn().execute(
                    "UPDATE device_message SET created_time = ?1, device_id = ?2, opposite_id = ?3, type = ?4,
                         content = ?5, filename = ?6, filepath = ?7, size = ?8, file_hash = ?9,
                         download_success = ?10, download_size = ?11, save_path = ?12
                     WHERE id = ?13",
                    params![
                        message.created_time.to_rfc3339(),
                        message.device_id,
                        message.opposite_id,
                        message.kind.as_str(),
                        message.content,
                        message.filename,
                        message.filepath,
                        size,
                        message.file_hash,
                        message.download_success as i32,
                        download_size,
                        message.save_path,
                        id,
                    ],
                )?;
                Ok(message.clone())
            }
        }
    }

    pub fn get_message(&self, id: i64) -> Result<DeviceMessage> {
        self.conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM device_message WHERE id = ?1"),
                params![id],
                row_to_message,
            )
            .map_err(not_found)
    }

    pub fn list_messages_for_device(&self, device_id: i64) -> Result<Vec<DeviceMessage>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM device_message
             WHERE device_id = ?1
             ORDER BY created_time ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![device_id], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Raise the recorded download size to at least `download_size`, leaving
    /// other columns alone. Never lowers it; resets go through `save_message`.
    pub fn raise_download_size(&self, id: i64, download_size: u64) -> Result<()> {
        self.conn().execute(
            "UPDATE device_message SET download_size = MAX(download_size, ?1) WHERE id = ?2",
            params![download_size as i64, id],
        )?;
        Ok(())
    }

    // ON DELETE CASCADE: file_part rows go with it; files on disk stay
    pub fn delete_message(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM device_message WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeviceMessage> {
    let created_str: String = row.get(1)?;
    let kind_str: String = row.get(4)?;
    let size: Option<i64> = row.get(8)?;
    let download_success: i32 = row.get(10)?;
    let download_size: i64 = row.get(11)?;

    let created_time: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
        })?;

    let kind = MessageKind::parse(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown message type '{kind_str}'").into(),
        )
    })?;

    Ok(DeviceMessage {
        id: Some(row.get(0)?),
        created_time,
        device_id: row.get(2)?,
        opposite_id: row.get(3)?,
        kind,
        content: row.get(5)?,
        filename: row.get(6)?,
        filepath: row.get(7)?,
        size: size.map(|s| s.max(0) as u64),
        file_hash: row.get(9)?,
        download_success: download_success != 0,
        download_size: download_size.max(0) as u64,
        save_path: row.get(12)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use localshare_shared::types::DeviceDescriptor;

    fn db_with_device() -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        let device = db
            .upsert_device(&DeviceDescriptor {
                client_code: "peer".into(),
                ..Default::default()
            })
            .unwrap();
        (db, device.id.unwrap())
    }

    #[test]
    fn insert_then_update_keeps_id() {
        let (db, device_id) = db_with_device();
        let mut msg = DeviceMessage::new(MessageKind::Receive, Some(device_id));
        msg.filename = Some("movie.mkv".into());
        msg.size = Some(26_214_400);

        let mut saved = db.save_message(&msg).unwrap();
        let id = saved.id.unwrap();

        saved.download_success = true;
        saved.download_size = 26_214_400;
        saved.save_path = Some("/tmp/movie.mkv".into());
        db.save_message(&saved).unwrap();

        let loaded = db.get_message(id).unwrap();
        assert!(loaded.download_success);
        assert_eq!(loaded.download_size, 26_214_400);
        assert_eq!(loaded.kind, MessageKind::Receive);
        assert_eq!(db.list_messages_for_device(device_id).unwrap().len(), 1);
    }

    #[test]
    fn raise_download_size_never_lowers() {
        let (db, device_id) = db_with_device();
        let mut msg = DeviceMessage::new(MessageKind::Receive, Some(device_id));
        msg.content = Some("hello".into());
        let saved = db.save_message(&msg).unwrap();

        db.raise_download_size(saved.id.unwrap(), 1234).unwrap();
        db.raise_download_size(saved.id.unwrap(), 1000).unwrap();

        let loaded = db.get_message(saved.id.unwrap()).unwrap();
        assert_eq!(loaded.download_size, 1234);
        assert_eq!(loaded.content.as_deref(), Some("hello"));
    }

    #[test]
    fn delete_message_cascades_to_parts() {
        let (db, device_id) = db_with_device();
        let saved = db
            .save_message(&DeviceMessage::new(MessageKind::Receive, Some(device_id)))
            .unwrap();
        let id = saved.id.unwrap();
        db.insert_file_part(&crate::FilePart::new(id, "h", 0, 9)).unwrap();

        assert!(db.delete_message(id).unwrap());
        assert!(db.list_file_parts(id, "h").unwrap().is_empty());
        assert!(matches!(db.get_message(id), Err(crate::StoreError::NotFound)));
    }
}
