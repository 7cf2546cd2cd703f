//! SQLite system of record. The in-memory stores are a projection of these tables.

use std::collections::BTreeSet;

use sqlx::{Acquire, Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::{
    model::{Estimate, Group, GroupId, Room, RoomId, Task, TaskId, User, UserId, Vote},
    rooms::msg::RoomSnapshot,
    AppResult,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id BLOB PRIMARY KEY,
    name TEXT NOT NULL,
    token TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS poker_groups (
    id BLOB PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    creator_id BLOB NOT NULL REFERENCES users(id),
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS rooms (
    id BLOB PRIMARY KEY,
    group_id BLOB REFERENCES poker_groups(id),
    name TEXT NOT NULL,
    invite_code TEXT NOT NULL UNIQUE,
    creator_id BLOB NOT NULL REFERENCES users(id),
    current_task_id BLOB,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS room_participants (
    room_id BLOB NOT NULL REFERENCES rooms(id),
    user_id BLOB NOT NULL REFERENCES users(id),
    joined_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (room_id, user_id)
);

CREATE TABLE IF NOT EXISTS tasks (
    id BLOB PRIMARY KEY,
    room_id BLOB NOT NULL REFERENCES rooms(id),
    title TEXT NOT NULL,
    description TEXT,
    final_estimate TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS votes (
    task_id BLOB NOT NULL REFERENCES tasks(id),
    user_id BLOB NOT NULL REFERENCES users(id),
    estimate TEXT NOT NULL,
    voted_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (task_id, user_id)
);
"#;

pub async fn init(db_pool: &SqlitePool) -> AppResult<()> {
    sqlx::raw_sql(SCHEMA).execute(db_pool).await?;
    Ok(())
}

type RoomRow = (Uuid, Option<Uuid>, String, String, Option<Uuid>);
type TaskRow = (Uuid, Uuid, String, Option<String>, Option<String>);

fn task_from_row((id, room_id, title, description, final_estimate): TaskRow) -> Task {
    Task {
        id: id.into(),
        room_id: room_id.into(),
        title,
        description,
        final_estimate: final_estimate.map(Estimate),
    }
}

fn random_hex<const N: usize>() -> String {
    rand::random::<[u8; N]>()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

pub async fn create_user(db_pool: &SqlitePool, name: &str) -> AppResult<(User, String)> {
    let user = User {
        id: UserId::new(),
        name: name.to_owned(),
    };
    let token = random_hex::<16>();

    sqlx::query("INSERT INTO users (id,name,token) VALUES (?,?,?)")
        .bind(user.id.0)
        .bind(&user.name)
        .bind(&token)
        .execute(db_pool)
        .await?;

    Ok((user, token))
}

pub async fn user_by_token(db_pool: &SqlitePool, token: &str) -> AppResult<Option<User>> {
    let row: Option<(Uuid, String)> = sqlx::query_as("SELECT id,name FROM users WHERE token=?")
        .bind(token)
        .fetch_optional(db_pool)
        .await?;

    Ok(row.map(|(id, name)| User { id: id.into(), name }))
}

pub async fn create_group(
    db_pool: &SqlitePool,
    name: &str,
    description: Option<&str>,
    creator: UserId,
) -> AppResult<Group> {
    let group = Group {
        id: GroupId::new(),
        name: name.to_owned(),
        description: description.map(str::to_owned),
    };

    sqlx::query("INSERT INTO poker_groups (id,name,description,creator_id) VALUES (?,?,?,?)")
        .bind(group.id.0)
        .bind(&group.name)
        .bind(&group.description)
        .bind(creator.0)
        .execute(db_pool)
        .await?;

    Ok(group)
}

pub fn group<'a, A>(db: A, id: GroupId) -> impl Future<Output = AppResult<Option<Group>>> + Send + 'a
where
    A: Acquire<'a, Database = Sqlite> + Send + 'a,
{
    async move {
        let mut conn = db.acquire().await?;
        let row: Option<(Uuid, String, Option<String>)> =
            sqlx::query_as("SELECT id,name,description FROM poker_groups WHERE id=?")
                .bind(id.0)
                .fetch_optional(&mut *conn)
                .await?;

        Ok(row.map(|(id, name, description)| Group {
            id: id.into(),
            name,
            description,
        }))
    }
}

/// Renames the group or replaces its description. `None` leaves a field unchanged.
pub async fn update_group(
    db_pool: &SqlitePool,
    id: GroupId,
    name: Option<&str>,
    description: Option<&str>,
) -> AppResult<Option<Group>> {
    sqlx::query(
        "UPDATE poker_groups SET name=COALESCE(?,name), description=COALESCE(?,description)
         WHERE id=?",
    )
    .bind(name)
    .bind(description)
    .bind(id.0)
    .execute(db_pool)
    .await?;

    group(db_pool, id).await
}

/// Groups the user created or whose rooms the user takes part in.
pub async fn groups_for_user(db_pool: &SqlitePool, user: UserId) -> AppResult<Vec<Group>> {
    let rows: Vec<(Uuid, String, Option<String>)> = sqlx::query_as(
        "SELECT DISTINCT g.id,g.name,g.description FROM poker_groups g
         LEFT JOIN rooms r ON r.group_id = g.id
         LEFT JOIN room_participants rp ON rp.room_id = r.id
         WHERE g.creator_id = ? OR rp.user_id = ?
         ORDER BY g.id",
    )
    .bind(user.0)
    .bind(user.0)
    .fetch_all(db_pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, name, description)| Group {
            id: id.into(),
            name,
            description,
        })
        .collect())
}

/// Deletes the group. Its rooms are detached, not deleted.
pub async fn delete_group(db_pool: &SqlitePool, id: GroupId) -> AppResult<bool> {
    let mut tx = db_pool.begin().await?;
    sqlx::query("UPDATE rooms SET group_id=NULL WHERE group_id=?")
        .bind(id.0)
        .execute(&mut *tx)
        .await?;
    let deleted = sqlx::query("DELETE FROM poker_groups WHERE id=?")
        .bind(id.0)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    tx.commit().await?;

    Ok(deleted > 0)
}

pub async fn create_room(
    db_pool: &SqlitePool,
    name: &str,
    group_id: Option<GroupId>,
    creator: UserId,
) -> AppResult<Room> {
    let room = Room {
        id: RoomId::new(),
        group_id,
        name: name.to_owned(),
        invite_code: random_hex::<4>().to_uppercase(),
        participants: BTreeSet::from([creator]),
        current_task_id: None,
    };

    let mut tx = db_pool.begin().await?;
    sqlx::query("INSERT INTO rooms (id,group_id,name,invite_code,creator_id) VALUES (?,?,?,?,?)")
        .bind(room.id.0)
        .bind(room.group_id.map(|id| id.0))
        .bind(&room.name)
        .bind(&room.invite_code)
        .bind(creator.0)
        .execute(&mut *tx)
        .await?;
    sqlx::query("INSERT INTO room_participants (room_id,user_id) VALUES (?,?)")
        .bind(room.id.0)
        .bind(creator.0)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(room)
}

async fn room_from_row(conn: &mut SqliteConnection, row: RoomRow) -> AppResult<Room> {
    let (id, group_id, name, invite_code, current_task_id) = row;
    let participants: Vec<(Uuid,)> =
        sqlx::query_as("SELECT user_id FROM room_participants WHERE room_id=?")
            .bind(id)
            .fetch_all(conn)
            .await?;

    Ok(Room {
        id: id.into(),
        group_id: group_id.map(GroupId),
        name,
        invite_code,
        participants: participants.into_iter().map(|(id,)| UserId(id)).collect(),
        current_task_id: current_task_id.map(TaskId),
    })
}

pub fn room<'a, A>(db: A, id: RoomId) -> impl Future<Output = AppResult<Option<Room>>> + Send + 'a
where
    A: Acquire<'a, Database = Sqlite> + Send + 'a,
{
    async move {
        let mut conn = db.acquire().await?;
        let row: Option<RoomRow> = sqlx::query_as(
            "SELECT id,group_id,name,invite_code,current_task_id FROM rooms WHERE id=?",
        )
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => Ok(Some(room_from_row(&mut *conn, row).await?)),
            None => Ok(None),
        }
    }
}

/// Rooms the user takes part in, oldest first.
pub async fn rooms_for_user(db_pool: &SqlitePool, user: UserId) -> AppResult<Vec<Room>> {
    let mut conn = db_pool.acquire().await?;
    let rows: Vec<RoomRow> = sqlx::query_as(
        "SELECT r.id,r.group_id,r.name,r.invite_code,r.current_task_id FROM rooms r
         JOIN room_participants rp ON rp.room_id = r.id
         WHERE rp.user_id=?
         ORDER BY r.id",
    )
    .bind(user.0)
    .fetch_all(&mut *conn)
    .await?;

    let mut rooms = Vec::with_capacity(rows.len());
    for row in rows {
        rooms.push(room_from_row(&mut *conn, row).await?);
    }
    Ok(rooms)
}

/// Renames the room and/or moves it between groups. `Some(None)` detaches it.
pub async fn update_room(
    db_pool: &SqlitePool,
    id: RoomId,
    name: Option<&str>,
    group_id: Option<Option<GroupId>>,
) -> AppResult<Option<Room>> {
    let mut tx = db_pool.begin().await?;
    if let Some(name) = name {
        sqlx::query("UPDATE rooms SET name=? WHERE id=?")
            .bind(name)
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
    }
    if let Some(group_id) = group_id {
        sqlx::query("UPDATE rooms SET group_id=? WHERE id=?")
            .bind(group_id.map(|id| id.0))
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
    }
    let room = room(&mut *tx, id).await?;
    tx.commit().await?;

    Ok(room)
}

pub async fn room_by_invite(db_pool: &SqlitePool, invite_code: &str) -> AppResult<Option<Room>> {
    let mut conn = db_pool.acquire().await?;
    let row: Option<RoomRow> = sqlx::query_as(
        "SELECT id,group_id,name,invite_code,current_task_id FROM rooms WHERE invite_code=?",
    )
    .bind(invite_code.trim().to_uppercase())
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => Ok(Some(room_from_row(&mut *conn, row).await?)),
        None => Ok(None),
    }
}

pub async fn delete_room(db_pool: &SqlitePool, id: RoomId) -> AppResult<bool> {
    let mut tx = db_pool.begin().await?;
    sqlx::query("DELETE FROM votes WHERE task_id IN (SELECT id FROM tasks WHERE room_id=?)")
        .bind(id.0)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM tasks WHERE room_id=?")
        .bind(id.0)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM room_participants WHERE room_id=?")
        .bind(id.0)
        .execute(&mut *tx)
        .await?;
    let deleted = sqlx::query("DELETE FROM rooms WHERE id=?")
        .bind(id.0)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    tx.commit().await?;

    Ok(deleted > 0)
}

pub async fn add_participant(db_pool: &SqlitePool, room: RoomId, user: UserId) -> AppResult<bool> {
    let added = sqlx::query(
        "INSERT INTO room_participants (room_id,user_id) VALUES (?,?)
         ON CONFLICT (room_id,user_id) DO NOTHING",
    )
    .bind(room.0)
    .bind(user.0)
    .execute(db_pool)
    .await?
    .rows_affected();

    Ok(added > 0)
}

pub async fn is_participant(db_pool: &SqlitePool, room: RoomId, user: UserId) -> AppResult<bool> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT 1 FROM room_participants WHERE room_id=? AND user_id=?")
            .bind(room.0)
            .bind(user.0)
            .fetch_optional(db_pool)
            .await?;

    Ok(row.is_some())
}

pub fn participants<'a, A>(db: A, room: RoomId) -> impl Future<Output = AppResult<Vec<User>>> + Send + 'a
where
    A: Acquire<'a, Database = Sqlite> + Send + 'a,
{
    async move {
        let mut conn = db.acquire().await?;
        let rows: Vec<(Uuid, String)> = sqlx::query_as(
            "SELECT u.id,u.name FROM users u
             JOIN room_participants rp ON rp.user_id = u.id
             WHERE rp.room_id=?
             ORDER BY u.name",
        )
        .bind(room.0)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name)| User { id: id.into(), name })
            .collect())
    }
}

pub async fn create_task(
    db_pool: &SqlitePool,
    room: RoomId,
    title: &str,
    description: Option<&str>,
) -> AppResult<Task> {
    let task = Task {
        id: TaskId::new(),
        room_id: room,
        title: title.to_owned(),
        description: description.map(str::to_owned),
        final_estimate: None,
    };

    sqlx::query("INSERT INTO tasks (id,room_id,title,description) VALUES (?,?,?,?)")
        .bind(task.id.0)
        .bind(room.0)
        .bind(&task.title)
        .bind(&task.description)
        .execute(db_pool)
        .await?;

    Ok(task)
}

pub async fn task(db_pool: &SqlitePool, id: TaskId) -> AppResult<Option<Task>> {
    let row: Option<TaskRow> = sqlx::query_as(
        "SELECT id,room_id,title,description,final_estimate FROM tasks WHERE id=?",
    )
    .bind(id.0)
    .fetch_optional(db_pool)
    .await?;

    Ok(row.map(task_from_row))
}

pub fn tasks_in_room<'a, A>(db: A, room: RoomId) -> impl Future<Output = AppResult<Vec<Task>>> + Send + 'a
where
    A: Acquire<'a, Database = Sqlite> + Send + 'a,
{
    async move {
        let mut conn = db.acquire().await?;
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT id,room_id,title,description,final_estimate FROM tasks
             WHERE room_id=? ORDER BY rowid",
        )
        .bind(room.0)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows.into_iter().map(task_from_row).collect())
    }
}

/// Edits a task. `None` leaves a field unchanged.
pub async fn update_task(
    db_pool: &SqlitePool,
    id: TaskId,
    title: Option<&str>,
    description: Option<&str>,
) -> AppResult<bool> {
    let updated = sqlx::query(
        "UPDATE tasks SET title=COALESCE(?,title), description=COALESCE(?,description)
         WHERE id=?",
    )
    .bind(title)
    .bind(description)
    .bind(id.0)
    .execute(db_pool)
    .await?
    .rows_affected();

    Ok(updated > 0)
}

/// Deletes the task and its votes. A room voting on it goes back to no active task.
pub async fn delete_task(db_pool: &SqlitePool, id: TaskId) -> AppResult<bool> {
    let mut tx = db_pool.begin().await?;
    sqlx::query("DELETE FROM votes WHERE task_id=?")
        .bind(id.0)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE rooms SET current_task_id=NULL WHERE current_task_id=?")
        .bind(id.0)
        .execute(&mut *tx)
        .await?;
    let deleted = sqlx::query("DELETE FROM tasks WHERE id=?")
        .bind(id.0)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    tx.commit().await?;

    Ok(deleted > 0)
}

/// Makes `task` the room's only active task.
pub async fn activate_task(db_pool: &SqlitePool, room: RoomId, task: TaskId) -> AppResult<bool> {
    let updated = sqlx::query(
        "UPDATE rooms SET current_task_id=?
         WHERE id=? AND EXISTS (SELECT 1 FROM tasks WHERE id=? AND room_id=?)",
    )
    .bind(task.0)
    .bind(room.0)
    .bind(task.0)
    .bind(room.0)
    .execute(db_pool)
    .await?
    .rows_affected();

    Ok(updated > 0)
}

pub async fn deactivate_task(db_pool: &SqlitePool, room: RoomId) -> AppResult<()> {
    sqlx::query("UPDATE rooms SET current_task_id=NULL WHERE id=?")
        .bind(room.0)
        .execute(db_pool)
        .await?;
    Ok(())
}

pub async fn resolve_task(db_pool: &SqlitePool, task: TaskId, estimate: &Estimate) -> AppResult<()> {
    sqlx::query("UPDATE tasks SET final_estimate=? WHERE id=?")
        .bind(estimate.as_str())
        .bind(task.0)
        .execute(db_pool)
        .await?;
    Ok(())
}

pub async fn upsert_vote(db_pool: &SqlitePool, vote: &Vote) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO votes (task_id,user_id,estimate) VALUES (?,?,?)
         ON CONFLICT (task_id,user_id)
         DO UPDATE SET estimate=excluded.estimate, voted_at=CURRENT_TIMESTAMP",
    )
    .bind(vote.task_id.0)
    .bind(vote.user_id.0)
    .bind(vote.estimate.as_str())
    .execute(db_pool)
    .await?;
    Ok(())
}

pub async fn delete_vote(db_pool: &SqlitePool, task: TaskId, user: UserId) -> AppResult<bool> {
    let deleted = sqlx::query("DELETE FROM votes WHERE task_id=? AND user_id=?")
        .bind(task.0)
        .bind(user.0)
        .execute(db_pool)
        .await?
        .rows_affected();
    Ok(deleted > 0)
}

pub async fn clear_votes(db_pool: &SqlitePool, task: TaskId) -> AppResult<u64> {
    let deleted = sqlx::query("DELETE FROM votes WHERE task_id=?")
        .bind(task.0)
        .execute(db_pool)
        .await?
        .rows_affected();
    Ok(deleted)
}

pub async fn votes_for_task(db_pool: &SqlitePool, task: TaskId) -> AppResult<Vec<Vote>> {
    let rows: Vec<(Uuid, Uuid, String)> =
        sqlx::query_as("SELECT task_id,user_id,estimate FROM votes WHERE task_id=? ORDER BY voted_at")
            .bind(task.0)
            .fetch_all(db_pool)
            .await?;

    Ok(rows
        .into_iter()
        .map(|(task_id, user_id, estimate)| Vote {
            task_id: task_id.into(),
            user_id: user_id.into(),
            estimate: Estimate(estimate),
        })
        .collect())
}

pub fn votes_in_room<'a, A>(db: A, room: RoomId) -> impl Future<Output = AppResult<Vec<Vote>>> + Send + 'a
where
    A: Acquire<'a, Database = Sqlite> + Send + 'a,
{
    async move {
        let mut conn = db.acquire().await?;
        let rows: Vec<(Uuid, Uuid, String)> = sqlx::query_as(
            "SELECT v.task_id,v.user_id,v.estimate FROM votes v
             JOIN tasks t ON t.id = v.task_id
             WHERE t.room_id=?",
        )
        .bind(room.0)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(task_id, user_id, estimate)| Vote {
                task_id: task_id.into(),
                user_id: user_id.into(),
                estimate: Estimate(estimate),
            })
            .collect())
    }
}

/// Loads everything a client needs to rebuild its view of the room, in one read transaction.
pub async fn snapshot(db_pool: &SqlitePool, id: RoomId, seq: u64) -> AppResult<Option<RoomSnapshot>> {
    let mut tx = db_pool.begin().await?;
    let Some(room) = room(&mut *tx, id).await? else {
        return Ok(None);
    };
    let group = match room.group_id {
        Some(group_id) => group(&mut *tx, group_id).await?,
        None => None,
    };
    let snapshot = RoomSnapshot {
        seq,
        group,
        participants: participants(&mut *tx, id).await?,
        tasks: tasks_in_room(&mut *tx, id).await?,
        votes: votes_in_room(&mut *tx, id).await?,
        room,
    };
    tx.commit().await?;

    Ok(Some(snapshot))
}

#[cfg(test)]
pub(crate) mod tests {
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;

    pub(crate) async fn memory_pool() -> SqlitePool {
        let db_pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init(&db_pool).await.unwrap();
        db_pool
    }

    #[tokio::test]
    async fn token_lookup() {
        let db_pool = memory_pool().await;
        let (user, token) = create_user(&db_pool, "Ada").await.unwrap();

        assert_eq!(token.len(), 32);
        assert_eq!(user_by_token(&db_pool, &token).await.unwrap(), Some(user));
        assert_eq!(user_by_token(&db_pool, "nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn vote_upsert_keeps_one_row() {
        let db_pool = memory_pool().await;
        let (user, _) = create_user(&db_pool, "Ada").await.unwrap();
        let room = create_room(&db_pool, "Sprint", None, user.id).await.unwrap();
        let task = create_task(&db_pool, room.id, "Login", None).await.unwrap();

        for card in ["5", "8"] {
            upsert_vote(
                &db_pool,
                &Vote {
                    task_id: task.id,
                    user_id: user.id,
                    estimate: Estimate::from(card),
                },
            )
            .await
            .unwrap();
        }

        let votes = votes_for_task(&db_pool, task.id).await.unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].estimate, Estimate::from("8"));
        assert_eq!(clear_votes(&db_pool, task.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn activation_is_exclusive_and_scoped_to_room() {
        let db_pool = memory_pool().await;
        let (user, _) = create_user(&db_pool, "Ada").await.unwrap();
        let room = create_room(&db_pool, "Sprint", None, user.id).await.unwrap();
        let other = create_room(&db_pool, "Other", None, user.id).await.unwrap();
        let t1 = create_task(&db_pool, room.id, "T1", None).await.unwrap();
        let t2 = create_task(&db_pool, room.id, "T2", Some("details")).await.unwrap();
        let foreign = create_task(&db_pool, other.id, "X", None).await.unwrap();

        assert!(activate_task(&db_pool, room.id, t1.id).await.unwrap());
        assert!(activate_task(&db_pool, room.id, t2.id).await.unwrap());
        assert!(!activate_task(&db_pool, room.id, foreign.id).await.unwrap());

        let loaded = super::room(&db_pool, room.id).await.unwrap().unwrap();
        assert_eq!(loaded.current_task_id, Some(t2.id));
        assert!(loaded.participants.contains(&user.id));

        deactivate_task(&db_pool, room.id).await.unwrap();
        let loaded = super::room(&db_pool, room.id).await.unwrap().unwrap();
        assert_eq!(loaded.current_task_id, None);
    }

    #[tokio::test]
    async fn deleting_group_detaches_rooms() {
        let db_pool = memory_pool().await;
        let (user, _) = create_user(&db_pool, "Ada").await.unwrap();
        let group = create_group(&db_pool, "Platform", None, user.id).await.unwrap();
        let room = create_room(&db_pool, "Sprint", Some(group.id), user.id).await.unwrap();
        assert_eq!(groups_for_user(&db_pool, user.id).await.unwrap(), vec![group.clone()]);

        assert!(delete_group(&db_pool, group.id).await.unwrap());

        let loaded = super::room(&db_pool, room.id).await.unwrap().unwrap();
        assert_eq!(loaded.group_id, None);
        assert!(!delete_group(&db_pool, group.id).await.unwrap());
    }

    #[tokio::test]
    async fn invite_code_lookup_ignores_case() {
        let db_pool = memory_pool().await;
        let (user, _) = create_user(&db_pool, "Ada").await.unwrap();
        let room = create_room(&db_pool, "Sprint", None, user.id).await.unwrap();

        assert_eq!(room.invite_code.len(), 8);
        let found = room_by_invite(&db_pool, &room.invite_code.to_lowercase())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, room.id);
    }

    #[tokio::test]
    async fn snapshot_collects_room_state() {
        let db_pool = memory_pool().await;
        let (user, _) = create_user(&db_pool, "Ada").await.unwrap();
        let room = create_room(&db_pool, "Sprint", None, user.id).await.unwrap();
        let task = create_task(&db_pool, room.id, "T1", None).await.unwrap();
        activate_task(&db_pool, room.id, task.id).await.unwrap();
        upsert_vote(
            &db_pool,
            &Vote { task_id: task.id, user_id: user.id, estimate: Estimate::from("3") },
        )
        .await
        .unwrap();

        let snap = snapshot(&db_pool, room.id, 4).await.unwrap().unwrap();

        assert_eq!(snap.seq, 4);
        assert_eq!(snap.room.current_task_id, Some(task.id));
        assert_eq!(snap.participants, vec![user]);
        assert_eq!(snap.tasks, vec![task]);
        assert_eq!(snap.votes.len(), 1);

        assert!(delete_room(&db_pool, room.id).await.unwrap());
        assert!(snapshot(&db_pool, room.id, 5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleting_active_task_drops_votes_and_pointer() {
        let db_pool = memory_pool().await;
        let (user, _) = create_user(&db_pool, "Ada").await.unwrap();
        let room = create_room(&db_pool, "Sprint", None, user.id).await.unwrap();
        let task = create_task(&db_pool, room.id, "T1", Some("old")).await.unwrap();
        activate_task(&db_pool, room.id, task.id).await.unwrap();
        upsert_vote(
            &db_pool,
            &Vote { task_id: task.id, user_id: user.id, estimate: Estimate::from("5") },
        )
        .await
        .unwrap();

        assert!(update_task(&db_pool, task.id, Some("T1 split"), None).await.unwrap());
        let edited = super::task(&db_pool, task.id).await.unwrap().unwrap();
        assert_eq!(edited.title, "T1 split");
        assert_eq!(edited.description.as_deref(), Some("old"));

        assert!(delete_task(&db_pool, task.id).await.unwrap());
        assert!(votes_for_task(&db_pool, task.id).await.unwrap().is_empty());
        let loaded = super::room(&db_pool, room.id).await.unwrap().unwrap();
        assert_eq!(loaded.current_task_id, None);
        assert!(!delete_task(&db_pool, task.id).await.unwrap());
    }

    #[tokio::test]
    async fn room_and_group_edits() {
        let db_pool = memory_pool().await;
        let (ada, _) = create_user(&db_pool, "Ada").await.unwrap();
        let (bo, _) = create_user(&db_pool, "Bo").await.unwrap();
        let group = create_group(&db_pool, "Platform", None, ada.id).await.unwrap();
        let room = create_room(&db_pool, "Sprint", None, ada.id).await.unwrap();
        create_room(&db_pool, "Other", None, bo.id).await.unwrap();

        let moved = update_room(&db_pool, room.id, Some("Sprint 2"), Some(Some(group.id)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(moved.name, "Sprint 2");
        assert_eq!(moved.group_id, Some(group.id));

        let detached = update_room(&db_pool, room.id, None, Some(None)).await.unwrap().unwrap();
        assert_eq!(detached.name, "Sprint 2");
        assert_eq!(detached.group_id, None);

        assert_eq!(rooms_for_user(&db_pool, ada.id).await.unwrap(), vec![detached]);

        let renamed = update_group(&db_pool, group.id, Some("Core"), Some("backend"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(renamed.name, "Core");
        assert_eq!(renamed.description.as_deref(), Some("backend"));
        assert!(update_group(&db_pool, GroupId::new(), Some("x"), None).await.unwrap().is_none());
    }
}
