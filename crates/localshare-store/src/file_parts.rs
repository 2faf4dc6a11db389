use rusqlite::params;

use crate::database::Database;
use crate::error::Result;
use crate::models::FilePart;

impl Database {
    /// Record a completed range. Recording the same range twice is a no-op.
    pub fn insert_file_part(&self, part: &FilePart) -> Result<FilePart> {
        self.conn().execute(
            "INSERT OR IGNORE INTO file_part (device_message_id, file_hash, range_start, range_end)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                part.device_message_id,
                part.file_hash,
                part.start as i64,
                part.end as i64,
            ],
        )?;

        let id: i64 = self.conn().query_row(
            "SELECT id FROM file_part
             WHERE device_message_id = ?1 AND file_hash = ?2 AND range_start = ?3 AND range_end = ?4",
            params![
                part.device_message_id,
                part.file_hash,
                part.start as i64,
                part.end as i64,
            ],
            |row| row.get(0),
        )?;

        let mut saved = part.clone();
        saved.id = Some(id);
        Ok(saved)
    }

    /// Completed ranges of `message_id` recorded under `file_hash`, by offset.
    /// Parts recorded under any other hash are never returned.
    pub fn list_file_parts(&self, message_id: i64, file_hash: &str) -> Result<Vec<FilePart>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, device_message_id, file_hash, range_start, range_end
             FROM file_part
             WHERE device_message_id = ?1 AND file_hash = ?2
             ORDER BY range_start ASC",
        )?;
        let rows = stmt.query_map(params![message_id, file_hash], row_to_file_part)?;

        let mut parts = Vec::new();
        for row in rows {
            parts.push(row?);
        }
        Ok(parts)
    }

    pub fn delete_file_parts(&self, message_id: i64) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM file_part WHERE device_message_id = ?1",
            params![message_id],
        )?;
        Ok(affected)
    }
}

fn row_to_file_part(row: &rusqlite::Row<'_>) -> rusqlite::Result<FilePart> {
    let start: i64 = row.get(3)?;
    let end: i64 = row.get(4)?;
    Ok(FilePart {
        id: Some(row.get(0)?),
        device_message_id: row.get(1)?,
        file_hash: row.get(2)?,
        start: start.max(0) as u64,
        end: end.max(0) as u64,
    })
}
