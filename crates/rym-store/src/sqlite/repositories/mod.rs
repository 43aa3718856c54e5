//! Repository implementations.
//!
//! Each repository is a stateless struct whose methods take a `&Connection`,
//! so every operation is a plain function of (connection, input).

pub mod user;
pub mod vote;

pub use user::UserRepo;
pub use vote::VoteRepo;

#[cfg(test)]
pub(crate) mod test_support {
    use rusqlite::Connection;

    use crate::sqlite::migrations::run_migrations;
    use crate::sqlite::repositories::UserRepo;
    use crate::sqlite::row_types::{NewUser, UserRow};

    pub fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        let _ = run_migrations(&conn).unwrap();
        conn
    }

    pub fn user(conn: &Connection, steam_id: &str, now_ms: i64) -> UserRow {
        let profile = NewUser {
            steam_id: steam_id.to_string(),
            username: format!("player-{steam_id}"),
            avatar_url: format!("https://avatars/{steam_id}.png"),
            avatar_small: format!("https://avatars/{steam_id}_s.png"),
        };
        UserRepo::upsert(conn, &profile, now_ms).unwrap().0
    }
}
