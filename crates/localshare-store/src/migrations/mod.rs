//! Database migration runner.
//!
//! Migrations are an explicit, ordered list. Each entry is applied at most
//! once, guarded by `PRAGMA user_version`, inside its own transaction.

pub mod v001_initial;
pub mod v002_file_transfer;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

type Up = fn(&Connection) -> std::result::Result<(), rusqlite::Error>;

/// `(version, name, up)` in application order. Append only.
const MIGRATIONS: &[(u32, &str, Up)] = &[
    (1, "v001_initial", v001_initial::up),
    (2, "v002_file_transfer", v002_file_transfer::up),
];

/// Schema version after all migrations ran.
pub const CURRENT_VERSION: u32 = 2;

/// Run all pending migrations against the open connection.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    tracing::info!(
        current_version = current,
        target_version = CURRENT_VERSION,
        "checking database migrations"
    );

    for (version, name, up) in MIGRATIONS {
        if current >= *version {
            continue;
        }
        tracing::info!(migration = name, "applying migration");

        conn.execute_batch("BEGIN")?;
        let applied = up(conn).and_then(|_| conn.pragma_update(None, "user_version", version));
        match applied {
            Ok(()) => conn.execute_batch("COMMIT")?,
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                return Err(StoreError::Migration(format!("{name}: {e}")));
            }
        }
    }

    Ok(())
}
