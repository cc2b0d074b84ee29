//! Open-conflict store and resolution audit log

use rusqlite::types::Type;
use rusqlite::{params, Connection};

use crate::error::Result;
use crate::models::{ConflictDetails, ConflictId, ConflictResolution, PhotoId, SyncConflict};

/// Trait for durable conflict storage
pub trait ConflictRepository {
    /// Insert an open conflict, replacing any existing conflict for the
    /// same photo (one open conflict per photo)
    fn upsert(&self, conflict: &SyncConflict) -> Result<()>;

    /// Fetch an open conflict by ID
    fn get(&self, id: &ConflictId) -> Result<Option<SyncConflict>>;

    /// Fetch the open conflict for a photo, if any
    fn for_photo(&self, photo_id: &PhotoId) -> Result<Option<SyncConflict>>;

    /// All open conflicts, oldest detection first
    fn all_open(&self) -> Result<Vec<SyncConflict>>;

    /// Number of open conflicts
    fn count_open(&self) -> Result<u32>;

    /// Delete an open conflict
    fn delete(&self, id: &ConflictId) -> Result<()>;

    /// Append a resolution audit record
    fn append_resolution(&self, resolution: &ConflictResolution) -> Result<()>;

    /// Most recent resolution audit records, newest first
    fn recent_resolutions(&self, limit: usize) -> Result<Vec<ConflictResolution>>;
}

/// `SQLite` implementation of `ConflictRepository`
pub struct SqliteConflictRepository<'a> {
    conn: &'a Connection,
}

const CONFLICT_COLUMNS: &str =
    "id, photo_id, conflict_type, local_photo, remote_photo, details, detected_at";

impl<'a> SqliteConflictRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_conflict(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncConflict> {
        let id: String = row.get(0)?;
        let photo_id: String = row.get(1)?;
        let conflict_type: String = row.get(2)?;
        let local: Option<String> = row.get(3)?;
        let remote: Option<String> = row.get(4)?;
        let details: String = row.get(5)?;

        let json_err =
            |idx, e: serde_json::Error| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e));

        Ok(SyncConflict {
            id: id
                .parse()
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?,
            photo_id: photo_id
                .parse()
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?,
            conflict_type: conflict_type
                .parse()
                .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into()))?,
            local: local
                .map(|json| serde_json::from_str(&json))
                .transpose()
                .map_err(|e| json_err(3, e))?,
            remote: remote
                .map(|json| serde_json::from_str(&json))
                .transpose()
                .map_err(|e| json_err(4, e))?,
            details: serde_json::from_str(&details).map_err(|e| json_err(5, e))?,
        })
    }

    fn parse_resolution(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConflictResolution> {
        let conflict_id: String = row.get(0)?;
        let strategy: String = row.get(1)?;
        let resolved: String = row.get(2)?;
        Ok(ConflictResolution {
            conflict_id: conflict_id
                .parse()
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?,
            strategy: strategy
                .parse()
                .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, e.into()))?,
            resolved: serde_json::from_str(&resolved).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e))
            })?,
            resolved_at: row.get(3)?,
        })
    }
}

impl ConflictRepository for SqliteConflictRepository<'_> {
    fn upsert(&self, conflict: &SyncConflict) -> Result<()> {
        let local = conflict
            .local
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let remote = conflict
            .remote
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let details = serde_json::to_string(&conflict.details)?;

        // Re-detection for the same photo refreshes the open conflict
        self.conn.execute(
            "INSERT INTO sync_conflicts
             (id, photo_id, conflict_type, local_photo, remote_photo, details, detected_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(photo_id) DO UPDATE SET
                 id = excluded.id,
                 conflict_type = excluded.conflict_type,
                 local_photo = excluded.local_photo,
                 remote_photo = excluded.remote_photo,
                 details = excluded.details,
                 detected_at = excluded.detected_at",
            params![
                conflict.id.as_str(),
                conflict.photo_id.as_str(),
                conflict.conflict_type.as_str(),
                local,
                remote,
                details,
                conflict.details.detected_at,
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &ConflictId) -> Result<Option<SyncConflict>> {
        let result = self.conn.query_row(
            &format!("SELECT {CONFLICT_COLUMNS} FROM sync_conflicts WHERE id = ?"),
            params![id.as_str()],
            Self::parse_conflict,
        );

        match result {
            Ok(conflict) => Ok(Some(conflict)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn for_photo(&self, photo_id: &PhotoId) -> Result<Option<SyncConflict>> {
        let result = self.conn.query_row(
            &format!("SELECT {CONFLICT_COLUMNS} FROM sync_conflicts WHERE photo_id = ?"),
            params![photo_id.as_str()],
            Self::parse_conflict,
        );

        match result {
            Ok(conflict) => Ok(Some(conflict)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn all_open(&self) -> Result<Vec<SyncConflict>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CONFLICT_COLUMNS} FROM sync_conflicts ORDER BY detected_at ASC"
        ))?;
        let conflicts = stmt
            .query_map([], Self::parse_conflict)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(conflicts)
    }

    fn count_open(&self) -> Result<u32> {
        let count: u32 =
            self.conn
                .query_row("SELECT COUNT(*) FROM sync_conflicts", [], |row| row.get(0))?;
        Ok(count)
    }

    fn delete(&self, id: &ConflictId) -> Result<()> {
        self.conn.execute(
            "DELETE FROM sync_conflicts WHERE id = ?",
            params![id.as_str()],
        )?;
        Ok(())
    }

    fn append_resolution(&self, resolution: &ConflictResolution) -> Result<()> {
        self.conn.execute(
            "INSERT INTO conflict_resolutions (conflict_id, strategy, resolved_photo, resolved_at)
             VALUES (?, ?, ?, ?)",
            params![
                resolution.conflict_id.as_str(),
                resolution.strategy.as_str(),
                serde_json::to_string(&resolution.resolved)?,
                resolution.resolved_at,
            ],
        )?;
        Ok(())
    }

    fn recent_resolutions(&self, limit: usize) -> Result<Vec<ConflictResolution>> {
        let mut stmt = self.conn.prepare(
            "SELECT conflict_id, strategy, resolved_photo, resolved_at
             FROM conflict_resolutions ORDER BY seq DESC LIMIT ?",
        )?;
        #[allow(clippy::cast_possible_wrap)]
        let resolutions = stmt
            .query_map(params![limit as i64], Self::parse_resolution)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(resolutions)
    }
}
