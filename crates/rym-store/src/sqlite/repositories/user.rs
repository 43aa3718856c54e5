//! User repository: profile rows and the credit columns.
//!
//! Every credit mutation is a single conditional `UPDATE`; none of them read
//! the balance first. Callers learn the outcome from the affected row count
//! or the returned balance.

use rusqlite::{Connection, OptionalExtension, params};
use rym_core::UserId;

use crate::errors::Result;
use crate::sqlite::row_types::{NewUser, UserRow};

const SELECT_COLUMNS: &str = "SELECT id, steam_id, username, avatar_url, avatar_small, credits,
        last_credit_at, created_at, updated_at FROM users";

/// User repository. Stateless, every method takes `&Connection`.
pub struct UserRepo;

impl UserRepo {
    /// Insert the user if the Steam ID is new, otherwise refresh the profile.
    ///
    /// New users start with zero credits and `last_credit_at = now_ms`.
    /// Returns the row and whether it was created.
    pub fn upsert(conn: &Connection, profile: &NewUser, now_ms: i64) -> Result<(UserRow, bool)> {
        let now = chrono::Utc::now().to_rfc3339();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO users (steam_id, username, avatar_url, avatar_small,
                 credits, last_credit_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?6)",
            params![
                profile.steam_id,
                profile.username,
                profile.avatar_url,
                profile.avatar_small,
                now_ms,
                now
            ],
        )?;
        let created = inserted > 0;

        if !created {
            let _ = conn.execute(
                "UPDATE users SET username = ?1, avatar_url = ?2, avatar_small = ?3, updated_at = ?4
                 WHERE steam_id = ?5
                   AND (username != ?1 OR avatar_url != ?2 OR avatar_small != ?3)",
                params![
                    profile.username,
                    profile.avatar_url,
                    profile.avatar_small,
                    now,
                    profile.steam_id
                ],
            )?;
        }

        let row = conn.query_row(
            &format!("{SELECT_COLUMNS} WHERE steam_id = ?1"),
            params![profile.steam_id],
            Self::map_row,
        )?;
        Ok((row, created))
    }

    /// Get a user by ID.
    pub fn get(conn: &Connection, id: UserId) -> Result<Option<UserRow>> {
        let row = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![id.as_i64()],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Get a user by Steam ID.
    pub fn get_by_steam_id(conn: &Connection, steam_id: &str) -> Result<Option<UserRow>> {
        let row = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE steam_id = ?1"),
                params![steam_id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// All users ordered by name.
    pub fn list(conn: &Connection) -> Result<Vec<UserRow>> {
        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY username"))?;
        let rows = stmt
            .query_map([], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Whether a user with this ID exists.
    pub fn exists(conn: &Connection, id: UserId) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM users WHERE id = ?1",
                params![id.as_i64()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Write a replenished balance only if the row still holds the values it was
    /// computed from. Returns `false` when another writer got there first.
    pub fn compare_and_set_credits(
        conn: &Connection,
        id: UserId,
        expected: (u32, i64),
        new: (u32, i64),
    ) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE users SET credits = ?1, last_credit_at = ?2, updated_at = ?3
             WHERE id = ?4 AND credits = ?5 AND last_credit_at = ?6",
            params![
                new.0,
                new.1,
                chrono::Utc::now().to_rfc3339(),
                id.as_i64(),
                expected.0,
                expected.1
            ],
        )?;
        Ok(changed > 0)
    }

    /// Decrement the balance by `cost` if it is at least `cost`.
    ///
    /// Returns the remaining balance, or `None` when the balance was short or
    /// the user is missing.
    pub fn spend(conn: &Connection, id: UserId, cost: u32) -> Result<Option<u32>> {
        let remaining = conn
            .query_row(
                "UPDATE users SET credits = credits - ?1, updated_at = ?2
                 WHERE id = ?3 AND credits >= ?1
                 RETURNING credits",
                params![cost, chrono::Utc::now().to_rfc3339(), id.as_i64()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(remaining)
    }

    /// Add `amount` credits back, capped at `max`.
    pub fn refund(conn: &Connection, id: UserId, amount: u32, max: u32) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE users SET credits = MIN(credits + ?1, ?2), updated_at = ?3
             WHERE id = ?4 AND credits < ?2",
            params![amount, max, chrono::Utc::now().to_rfc3339(), id.as_i64()],
        )?;
        Ok(changed > 0)
    }

    /// Give every user below `max` one credit. Returns the number changed.
    pub fn give_everyone_credit(conn: &Connection, max: u32) -> Result<usize> {
        let changed = conn.execute(
            "UPDATE users SET credits = MIN(credits + 1, ?1), updated_at = ?2
             WHERE credits < ?1",
            params![max, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(changed)
    }

    /// Zero every balance. Returns the number of users affected.
    pub fn reset_all_credits(conn: &Connection) -> Result<usize> {
        let changed = conn.execute(
            "UPDATE users SET credits = 0, updated_at = ?1",
            params![chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(changed)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
        Self::map_row_at(row, 0)
    }

    /// Map the nine user columns starting at index `at`.
    #[allow(clippy::cast_sign_loss)]
    pub(crate) fn map_row_at(row: &rusqlite::Row<'_>, at: usize) -> rusqlite::Result<UserRow> {
        Ok(UserRow {
            id: UserId::new(row.get::<_, i64>(at)? as u64),
            steam_id: row.get(at + 1)?,
            username: row.get(at + 2)?,
            avatar_url: row.get(at + 3)?,
            avatar_small: row.get(at + 4)?,
            credits: row.get(at + 5)?,
            last_credit_at: row.get(at + 6)?,
            created_at: row.get(at + 7)?,
            updated_at: row.get(at + 8)?,
        })
    }
}
