//! Vote repository: inserts and timeline queries.

use rusqlite::{Connection, OptionalExtension, params};
use rym_core::{UserId, VoteId};

use crate::errors::Result;
use crate::sqlite::repositories::UserRepo;
use crate::sqlite::row_types::{RecipientTally, VoteDetailsRow};

const SELECT_DETAILS: &str = "SELECT v.id, v.achievement_id, v.created_at,
        fu.id, fu.username, fu.avatar_small,
        tu.id, tu.username, tu.avatar_small
     FROM votes v
     JOIN users fu ON v.from_user_id = fu.id
     JOIN users tu ON v.to_user_id = tu.id";

/// Vote repository. Stateless, every method takes `&Connection`.
pub struct VoteRepo;

impl VoteRepo {
    /// Insert a vote. `created_at` is RFC 3339.
    #[allow(clippy::cast_sign_loss)]
    pub fn insert(
        conn: &Connection,
        from: UserId,
        to: UserId,
        achievement_id: &str,
        created_at: &str,
    ) -> Result<VoteId> {
        let _ = conn.execute(
            "INSERT INTO votes (from_user_id, to_user_id, achievement_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![from.as_i64(), to.as_i64(), achievement_id, created_at],
        )?;
        Ok(VoteId::new(conn.last_insert_rowid() as u64))
    }

    /// A vote with both users' display data.
    pub fn get_details(conn: &Connection, id: VoteId) -> Result<Option<VoteDetailsRow>> {
        let row = conn
            .query_row(
                &format!("{SELECT_DETAILS} WHERE v.id = ?1"),
                params![id.as_i64()],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Most recent votes first.
    pub fn recent(conn: &Connection, limit: u32) -> Result<Vec<VoteDetailsRow>> {
        let mut stmt = conn.prepare(&format!(
            "{SELECT_DETAILS} ORDER BY v.created_at DESC, v.id DESC LIMIT ?1"
        ))?;
        let rows = stmt
            .query_map(params![limit], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Votes received by one user, most recent first.
    pub fn received_by(conn: &Connection, user: UserId) -> Result<Vec<VoteDetailsRow>> {
        let mut stmt = conn.prepare(&format!(
            "{SELECT_DETAILS} WHERE v.to_user_id = ?1 ORDER BY v.created_at DESC, v.id DESC"
        ))?;
        let rows = stmt
            .query_map(params![user.as_i64()], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Votes per (achievement, recipient), ordered by achievement then count
    /// descending. Ties go to the earlier-registered user.
    pub fn recipient_tallies(conn: &Connection) -> Result<Vec<RecipientTally>> {
        let mut stmt = conn.prepare(
            "SELECT v.achievement_id, COUNT(*) AS vote_count,
                    u.id, u.steam_id, u.username, u.avatar_url, u.avatar_small, u.credits,
                    u.last_credit_at, u.created_at, u.updated_at
             FROM votes v
             JOIN users u ON v.to_user_id = u.id
             GROUP BY v.achievement_id, v.to_user_id
             ORDER BY v.achievement_id, vote_count DESC, u.id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(RecipientTally {
                    achievement_id: row.get(0)?,
                    vote_count: row.get(1)?,
                    user: UserRepo::map_row_at(row, 2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    #[allow(clippy::cast_sign_loss)]
    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<VoteDetailsRow> {
        Ok(VoteDetailsRow {
            id: VoteId::new(row.get::<_, i64>(0)? as u64),
            achievement_id: row.get(1)?,
            created_at: row.get(2)?,
            from_user_id: UserId::new(row.get::<_, i64>(3)? as u64),
            from_username: row.get(4)?,
            from_avatar: row.get(5)?,
            to_user_id: UserId::new(row.get::<_, i64>(6)? as u64),
            to_username: row.get(7)?,
            to_avatar: row.get(8)?,
        })
    }
}
