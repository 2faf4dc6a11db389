//! v001 -- Initial schema creation.
//!
//! Creates `device`, `device_message` and `sys_info`.

use rusqlite::Connection;

const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Known peers, one row per client code
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS device (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    client_code  TEXT NOT NULL UNIQUE,
    name         TEXT,
    ip           TEXT,
    port         INTEGER,
    channel_type TEXT,
    os_name      TEXT,
    network_type TEXT,
    wifi_name    TEXT
);

-- ----------------------------------------------------------------
-- Messages sent to / received from a peer
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS device_message (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    created_time TEXT NOT NULL,                -- RFC-3339
    device_id    INTEGER,                      -- FK -> device(id)
    opposite_id  INTEGER,                      -- message id on the peer
    type         TEXT NOT NULL,                -- 'send' | 'receive'
    content      TEXT,
    filename     TEXT,
    filepath     TEXT,                         -- local source file (send)
    size         INTEGER,

    FOREIGN KEY (device_id) REFERENCES device(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_device_message_device
    ON device_message(device_id, created_time);

-- ----------------------------------------------------------------
-- Name/value settings
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS sys_info (
    id    INTEGER PRIMARY KEY AUTOINCREMENT,
    name  TEXT NOT NULL UNIQUE,
    value TEXT
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
