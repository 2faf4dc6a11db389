//! v002 -- Resumable transfers: status columns on `device_message` and the
//! `file_part` checkpoint table.

use rusqlite::Connection;

const UP_SQL: &str = r#"
ALTER TABLE device_message ADD COLUMN file_hash TEXT;
ALTER TABLE device_message ADD COLUMN download_success INTEGER NOT NULL DEFAULT 0;
ALTER TABLE device_message ADD COLUMN download_size INTEGER NOT NULL DEFAULT 0;
ALTER TABLE device_message ADD COLUMN save_path TEXT;

CREATE TABLE IF NOT EXISTS file_part (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    device_message_id INTEGER NOT NULL,
    file_hash         TEXT NOT NULL,
    range_start       INTEGER NOT NULL,
    range_end         INTEGER NOT NULL,       -- inclusive

    UNIQUE (device_message_id, file_hash, range_start, range_end),
    FOREIGN KEY (device_message_id) REFERENCES device_message(id) ON DELETE CASCADE
);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
