//! The embedded relational store (§4.7): a single `rusqlite::Connection`
//! behind a single-writer discipline, with dedup-merge persistence, history
//! pagination, substring search, unread accounting, and seq bookkeeping.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::model::{
    accumulate, Conversation, ConversationType, Direction, Draft, Friend, Group, GroupMember,
    GroupRole, LatestMessage, Message, MessageStatus, MessageType, Quote, SaveOutcome, SaveStats,
    SearchFilter, User,
};

/// The durable local store for a single logged-in user.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the store at `config.file_name`. Applies the
    /// configured journal mode, runs `PRAGMA integrity_check`, and creates
    /// tables/indices if absent. Returns `Err` if integrity_check fails.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let conn = if config.file_name == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(Path::new(&config.file_name))?
        };
        Self::from_connection(conn, config)
    }

    fn from_connection(conn: Connection, config: &StoreConfig) -> Result<Self, StoreError> {
        if config.encryption_key.is_some() {
            tracing::warn!("encryption_key set but this build has no SQLCipher support; ignoring");
        }
        apply_pragmas(&conn, config.enable_wal)?;
        run_integrity_check(&conn)?;
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(Store { conn })
    }

    /// An in-memory store, for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::open(&StoreConfig::in_memory())
    }

    // -----------------------------------------------------------------------
    // §4.7.1 / §4.7.2 Dedup-merge write
    // -----------------------------------------------------------------------

    /// Insert-or-selectively-update a single message (§4.7.1).
    pub fn save_message(&mut self, message: &Message) -> Result<SaveOutcome, StoreError> {
        let tx = self.conn.transaction()?;
        let outcome = save_message_tx(&tx, message)?;
        tx.commit()?;
        Ok(outcome)
    }

    /// Batch dedup-merge (§4.7.2). The hot path; the only write path the
    /// Sync Engine and batch-push handler may use.
    pub fn save_messages(&mut self, messages: &[Message]) -> Result<SaveStats, StoreError> {
        let tx = self.conn.transaction()?;
        let mut stats = SaveStats::default();
        for message in messages {
            let outcome = save_message_tx(&tx, message)?;
            accumulate(&mut stats, outcome);
        }
        tx.commit()?;
        Ok(stats)
    }

    // -----------------------------------------------------------------------
    // §4.7.3 Pagination
    // -----------------------------------------------------------------------

    /// History page ordered by `create_time DESC`. `before_time` defaults to
    /// `i64::MAX` (the caller passes it explicitly for the first page).
    pub fn get_history(
        &self,
        conversation_id: &str,
        before_time: i64,
        limit: u32,
    ) -> Result<Vec<Message>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM messages
             WHERE conversation_id = ?1 AND create_time < ?2 AND is_deleted = 0
             ORDER BY create_time DESC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![conversation_id, before_time, limit], row_to_message)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// `seq`-based history variant, same ordering and semantics.
    pub fn get_history_by_seq(
        &self,
        conversation_id: &str,
        before_seq: u64,
        limit: u32,
    ) -> Result<Vec<Message>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM messages
             WHERE conversation_id = ?1 AND seq < ?2 AND is_deleted = 0
             ORDER BY create_time DESC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(
            params![conversation_id, before_seq as i64, limit],
            row_to_message,
        )?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn get_message_by_id(&self, message_id: &str) -> Result<Option<Message>, StoreError> {
        self.conn
            .query_row("SELECT * FROM messages WHERE message_id = ?1", params![message_id], row_to_message)
            .optional()
            .map_err(StoreError::from)
    }

    /// Outbound messages still at `Sending`, oldest first. The Send Queue
    /// calls this once at startup to rebuild its in-memory queue — a
    /// message row only reaches `Sending` by way of an enqueue, so this
    /// table doubles as the queue's durable sidecar and nothing extra needs
    /// to be journaled.
    pub fn pending_outbound(&self) -> Result<Vec<Message>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM messages
             WHERE status = ?1 AND direction = 'send' AND is_deleted = 0
             ORDER BY create_time ASC",
        )?;
        let rows = stmt.query_map(params![MessageStatus::Sending.as_str()], row_to_message)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // §4.7.4 Search
    // -----------------------------------------------------------------------

    /// Case-insensitive substring search over `content` plus conjunctive
    /// filters. An empty/whitespace keyword yields an empty result
    /// deterministically (no query is run).
    pub fn search(&self, keyword: &str, filter: &SearchFilter) -> Result<Vec<Message>, StoreError> {
        if keyword.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = String::from(
            "SELECT * FROM messages WHERE content LIKE ?1 ESCAPE '\\' AND is_deleted = 0",
        );
        let like_pattern = format!("%{}%", escape_like(keyword));
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(like_pattern)];

        if let Some(conversation_id) = &filter.conversation_id {
            args.push(Box::new(conversation_id.clone()));
            sql.push_str(&format!(" AND conversation_id = ?{}", args.len()));
        }
        if let Some(sender_id) = &filter.sender_id {
            args.push(Box::new(sender_id.clone()));
            sql.push_str(&format!(" AND sender_id = ?{}", args.len()));
        }
        if let Some(start_time) = filter.start_time {
            args.push(Box::new(start_time));
            sql.push_str(&format!(" AND create_time >= ?{}", args.len()));
        }
        if let Some(end_time) = filter.end_time {
            args.push(Box::new(end_time));
            sql.push_str(&format!(" AND create_time <= ?{}", args.len()));
        }
        if let Some(message_types) = &filter.message_types {
            if message_types.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders: Vec<String> = message_types
                .iter()
                .map(|t| {
                    args.push(Box::new(t.as_str().to_owned()));
                    format!("?{}", args.len())
                })
                .collect();
            sql.push_str(&format!(" AND message_type IN ({})", placeholders.join(",")));
        }

        sql.push_str(" ORDER BY create_time DESC LIMIT ?");
        let limit = if filter.limit == 0 { 50 } else { filter.limit };
        args.push(Box::new(limit));
        sql.push_str(&(args.len()).to_string());

        let mut stmt = self.conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = args.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(params_refs.as_slice(), row_to_message)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // §4.7.5 Unread accounting
    // -----------------------------------------------------------------------

    pub fn increment_unread(&mut self, conversation_id: &str, by: i64) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE conversations SET unread_count = unread_count + ?2 WHERE conversation_id = ?1",
            params![conversation_id, by],
        )?;
        Ok(())
    }

    pub fn clear_unread(&mut self, conversation_id: &str, now: i64) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE conversations SET unread_count = 0, last_read_time = ?2 WHERE conversation_id = ?1",
            params![conversation_id, now],
        )?;
        Ok(())
    }

    pub fn total_unread(&self) -> Result<i64, StoreError> {
        let total: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(unread_count), 0) FROM conversations WHERE is_muted = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    // -----------------------------------------------------------------------
    // §4.7.6 Seq bookkeeping
    // -----------------------------------------------------------------------

    pub fn max_seq(&self) -> Result<u64, StoreError> {
        let max: Option<i64> = self
            .conn
            .query_row("SELECT MAX(seq) FROM messages", [], |row| row.get(0))?;
        Ok(max.unwrap_or(0).max(0) as u64)
    }

    pub fn set_last_sync_seq(&mut self, user_id: &str, seq: u64, now: i64) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO sync_config (user_id, last_sync_seq, last_sync_time, is_syncing)
             VALUES (?1, ?2, ?3, 0)
             ON CONFLICT(user_id) DO UPDATE SET last_sync_seq = ?2, last_sync_time = ?3",
            params![user_id, seq as i64, now],
        )?;
        Ok(())
    }

    pub fn get_last_sync_seq(&self, user_id: &str) -> Result<u64, StoreError> {
        let seq: Option<i64> = self
            .conn
            .query_row(
                "SELECT last_sync_seq FROM sync_config WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(seq.unwrap_or(0).max(0) as u64)
    }

    pub fn set_is_syncing(&mut self, user_id: &str, syncing: bool) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO sync_config (user_id, last_sync_seq, last_sync_time, is_syncing)
             VALUES (?1, 0, 0, ?2)
             ON CONFLICT(user_id) DO UPDATE SET is_syncing = ?2",
            params![user_id, syncing],
        )?;
        Ok(())
    }

    pub fn is_syncing(&self, user_id: &str) -> Result<bool, StoreError> {
        let syncing: Option<bool> = self
            .conn
            .query_row(
                "SELECT is_syncing FROM sync_config WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(syncing.unwrap_or(false))
    }

    // -----------------------------------------------------------------------
    // Conversations
    // -----------------------------------------------------------------------

    /// Create a conversation row if absent; no-op otherwise.
    pub fn ensure_conversation(
        &mut self,
        conversation_id: &str,
        conversation_type: ConversationType,
        target_id: &str,
        now: i64,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO conversations
                (conversation_id, conversation_type, target_id, show_name, unread_count,
                 last_read_time, last_message_time, is_pinned, is_muted, at_me, create_time, update_time)
             VALUES (?1, ?2, ?3, '', 0, 0, 0, 0, 0, 0, ?4, ?4)",
            params![conversation_id, conversation_type.as_str(), target_id, now],
        )?;
        Ok(())
    }

    pub fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>, StoreError> {
        self.conn
            .query_row(
                "SELECT * FROM conversations WHERE conversation_id = ?1",
                params![conversation_id],
                row_to_conversation,
            )
            .optional()
            .map_err(StoreError::from)
    }

    pub fn list_conversations(&self) -> Result<Vec<Conversation>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM conversations ORDER BY is_pinned DESC, last_message_time DESC")?;
        let rows = stmt.query_map([], row_to_conversation)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Atomically update `latest_message`/`last_message_time` when `message`
    /// is newer than the conversation's current `last_message_time` (§3
    /// invariant).
    pub fn update_latest_message_if_newer(
        &mut self,
        conversation_id: &str,
        latest: &LatestMessage,
        now: i64,
    ) -> Result<(), StoreError> {
        let latest_json = serde_json::to_string(latest)?;
        self.conn.execute(
            "UPDATE conversations
             SET latest_message = ?2, last_message_time = ?3, update_time = ?4
             WHERE conversation_id = ?1 AND ?3 > last_message_time",
            params![conversation_id, latest_json, latest.create_time, now],
        )?;
        Ok(())
    }

    pub fn set_muted(&mut self, conversation_id: &str, muted: bool, now: i64) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE conversations SET is_muted = ?2, update_time = ?3 WHERE conversation_id = ?1",
            params![conversation_id, muted, now],
        )?;
        Ok(())
    }

    pub fn set_pinned(&mut self, conversation_id: &str, pinned: bool, now: i64) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE conversations SET is_pinned = ?2, update_time = ?3 WHERE conversation_id = ?1",
            params![conversation_id, pinned, now],
        )?;
        Ok(())
    }

    pub fn save_draft(&mut self, conversation_id: &str, draft: &Draft, now: i64) -> Result<(), StoreError> {
        let draft_json = serde_json::to_string(draft)?;
        self.conn.execute(
            "UPDATE conversations SET draft = ?2, update_time = ?3 WHERE conversation_id = ?1",
            params![conversation_id, draft_json, now],
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Message mutation helpers used by revoke/read-receipt handlers (§4.11)
    // -----------------------------------------------------------------------

    pub fn mark_revoked(
        &mut self,
        message_id: &str,
        revoker_id: &str,
        revoked_time: i64,
        tombstone: &str,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE messages SET is_revoked = 1, revoked_by = ?2, revoked_time = ?3, content = ?4
             WHERE message_id = ?1",
            params![message_id, revoker_id, revoked_time, tombstone],
        )?;
        Ok(())
    }

    /// Single-chat read receipt: sets `is_read = true`.
    pub fn mark_read_single(&mut self, message_id: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE messages SET is_read = 1 WHERE message_id = ?1",
            params![message_id],
        )?;
        Ok(())
    }

    /// Group-chat read receipt: appends `reader_id` to `read_by` without
    /// duplicates. Idempotent.
    pub fn append_read_by(&mut self, message_id: &str, reader_id: &str) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        let read_by_json: Option<String> = tx
            .query_row(
                "SELECT read_by FROM messages WHERE message_id = ?1",
                params![message_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(read_by_json) = read_by_json else {
            return Ok(());
        };
        let mut read_by: Vec<String> = serde_json::from_str(&read_by_json)?;
        if !read_by.iter().any(|r| r == reader_id) {
            read_by.push(reader_id.to_owned());
            let updated = serde_json::to_string(&read_by)?;
            tx.execute(
                "UPDATE messages SET read_by = ?2 WHERE message_id = ?1",
                params![message_id, updated],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Directory tables (users/groups/members/friends)
    // -----------------------------------------------------------------------

    pub fn upsert_user(&mut self, user: &User) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO users (user_id, nickname, face_url, extra) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET nickname = ?2, face_url = ?3, extra = ?4",
            params![
                user.user_id,
                user.nickname,
                user.face_url,
                serde_json::to_string(&user.extra)?
            ],
        )?;
        Ok(())
    }

    pub fn upsert_group(&mut self, group: &Group) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO groups (group_id, name, face_url, owner_id, extra) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(group_id) DO UPDATE SET name = ?2, face_url = ?3, owner_id = ?4, extra = ?5",
            params![
                group.group_id,
                group.name,
                group.face_url,
                group.owner_id,
                serde_json::to_string(&group.extra)?
            ],
        )?;
        Ok(())
    }

    pub fn upsert_group_member(&mut self, member: &GroupMember) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO group_members (group_id, user_id, role) VALUES (?1, ?2, ?3)
             ON CONFLICT(group_id, user_id) DO UPDATE SET role = ?3",
            params![member.group_id, member.user_id, member.role.as_str()],
        )?;
        Ok(())
    }

    pub fn group_members(&self, group_id: &str) -> Result<Vec<GroupMember>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT group_id, user_id, role FROM group_members WHERE group_id = ?1")?;
        let rows = stmt.query_map(params![group_id], |row| {
            Ok(GroupMember {
                group_id: row.get(0)?,
                user_id: row.get(1)?,
                role: GroupRole::from_str(&row.get::<_, String>(2)?).unwrap_or(GroupRole::Member),
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn add_friend(&mut self, friend: &Friend) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO friends (user_id, friend_id, remark) VALUES (?1, ?2, ?3)",
            params![friend.user_id, friend.friend_id, friend.remark],
        )?;
        Ok(())
    }

    pub fn friends_of(&self, user_id: &str) -> Result<Vec<Friend>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT user_id, friend_id, remark FROM friends WHERE user_id = ?1")?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(Friend {
                user_id: row.get(0)?,
                friend_id: row.get(1)?,
                remark: row.get(2)?,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn apply_pragmas(conn: &Connection, enable_wal: bool) -> Result<(), StoreError> {
    if enable_wal {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
    } else {
        conn.execute_batch("PRAGMA journal_mode=DELETE; PRAGMA synchronous=FULL;")?;
    }
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    Ok(())
}

fn run_integrity_check(conn: &Connection) -> Result<(), StoreError> {
    let result: String = conn.pragma_query_value(None, "integrity_check", |row| row.get(0))?;
    if result != "ok" {
        return Err(StoreError::IntegrityCheckFailed(result));
    }
    Ok(())
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Looks up the existing row (if any) and applies the §4.7.1 dedup-merge
/// rule, returning the outcome. Must run inside a transaction.
fn save_message_tx(tx: &Transaction<'_>, incoming: &Message) -> Result<SaveOutcome, StoreError> {
    let existing = tx
        .query_row(
            "SELECT * FROM messages WHERE message_id = ?1",
            params![incoming.message_id],
            row_to_message,
        )
        .optional()?;

    let Some(existing) = existing else {
        insert_message(tx, incoming)?;
        return Ok(SaveOutcome::Inserted);
    };

    let status_advanced = incoming.status.is_later_than(existing.status);
    let server_time_advanced = incoming.server_time > 0 && incoming.server_time != existing.server_time;
    let seq_advanced = incoming.seq > 0 && incoming.seq != existing.seq;
    // §3 invariant: `is_revoked = true` freezes content semantics. Once a
    // row is revoked locally, re-ingestion (e.g. a stale sync page) must not
    // resurrect the original content.
    let content_changed = !existing.is_revoked && incoming.content != existing.content;
    let is_read_changed = incoming.is_read != existing.is_read;
    let is_deleted_changed = incoming.is_deleted != existing.is_deleted;
    let is_revoked_changed = incoming.is_revoked != existing.is_revoked;

    let advanced = status_advanced
        || server_time_advanced
        || seq_advanced
        || content_changed
        || is_read_changed
        || is_deleted_changed
        || is_revoked_changed;

    if !advanced {
        return Ok(SaveOutcome::Skipped);
    }

    let next_status = if status_advanced { incoming.status } else { existing.status };
    let next_server_time = if server_time_advanced { incoming.server_time } else { existing.server_time };
    let next_seq = if seq_advanced { incoming.seq } else { existing.seq };
    let next_content = if content_changed { &incoming.content } else { &existing.content };
    let next_is_read = if is_read_changed { incoming.is_read } else { existing.is_read };
    let next_is_deleted = if is_deleted_changed { incoming.is_deleted } else { existing.is_deleted };
    let next_is_revoked = if is_revoked_changed { incoming.is_revoked } else { existing.is_revoked };
    let next_revoked_by = if is_revoked_changed { &incoming.revoked_by } else { &existing.revoked_by };
    let next_revoked_time = if is_revoked_changed { incoming.revoked_time } else { existing.revoked_time };
    let next_server_msg_id = incoming.server_msg_id.as_ref().or(existing.server_msg_id.as_ref());
    let next_at_user_ids = if incoming.at_user_ids != existing.at_user_ids {
        &incoming.at_user_ids
    } else {
        &existing.at_user_ids
    };
    let next_at_all = incoming.at_all || existing.at_all;
    let next_read_by = if incoming.read_by != existing.read_by {
        &incoming.read_by
    } else {
        &existing.read_by
    };
    let next_quote = incoming.quote.as_ref().or(existing.quote.as_ref());
    let next_extra = if incoming.extra != existing.extra { &incoming.extra } else { &existing.extra };

    tx.execute(
        "UPDATE messages SET
            server_msg_id = ?2, seq = ?3, status = ?4, server_time = ?5, content = ?6,
            is_read = ?7, is_deleted = ?8, is_revoked = ?9, revoked_by = ?10, revoked_time = ?11,
            at_user_ids = ?12, at_all = ?13, read_by = ?14, quote = ?15, extra = ?16
         WHERE message_id = ?1",
        params![
            incoming.message_id,
            next_server_msg_id,
            next_seq as i64,
            next_status.as_str(),
            next_server_time,
            next_content,
            next_is_read,
            next_is_deleted,
            next_is_revoked,
            next_revoked_by,
            next_revoked_time,
            serde_json::to_string(next_at_user_ids)?,
            next_at_all,
            serde_json::to_string(next_read_by)?,
            next_quote.map(serde_json::to_string).transpose()?,
            serde_json::to_string(next_extra)?,
        ],
    )?;

    Ok(SaveOutcome::Updated)
}

fn insert_message(tx: &Transaction<'_>, m: &Message) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO messages (
            message_id, server_msg_id, seq, conversation_id, sender_id, receiver_id,
            conversation_type, message_type, content, create_time, server_time, status,
            direction, is_read, is_deleted, is_revoked, revoked_by, revoked_time,
            at_user_ids, at_all, read_by, quote, extra
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23)",
        params![
            m.message_id,
            m.server_msg_id,
            m.seq as i64,
            m.conversation_id,
            m.sender_id,
            m.receiver_id,
            m.conversation_type.as_str(),
            m.message_type.as_str(),
            m.content,
            m.create_time,
            m.server_time,
            m.status.as_str(),
            m.direction.as_str(),
            m.is_read,
            m.is_deleted,
            m.is_revoked,
            m.revoked_by,
            m.revoked_time,
            serde_json::to_string(&m.at_user_ids)?,
            m.at_all,
            serde_json::to_string(&m.read_by)?,
            m.quote.as_ref().map(serde_json::to_string).transpose()?,
            serde_json::to_string(&m.extra)?,
        ],
    )?;
    Ok(())
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    let conversation_type = ConversationType::from_str(&row.get::<_, String>("conversation_type")?)
        .unwrap_or(ConversationType::Single);
    let message_type =
        MessageType::from_str(&row.get::<_, String>("message_type")?).unwrap_or(MessageType::Text);
    let status = MessageStatus::from_str(&row.get::<_, String>("status")?).unwrap_or(MessageStatus::Sending);
    let direction = Direction::from_str(&row.get::<_, String>("direction")?).unwrap_or(Direction::Receive);
    let at_user_ids: Vec<String> =
        serde_json::from_str(&row.get::<_, String>("at_user_ids")?).unwrap_or_default();
    let read_by: Vec<String> = serde_json::from_str(&row.get::<_, String>("read_by")?).unwrap_or_default();
    let quote: Option<Quote> = row
        .get::<_, Option<String>>("quote")?
        .and_then(|s| serde_json::from_str(&s).ok());
    let extra: serde_json::Value =
        serde_json::from_str(&row.get::<_, String>("extra")?).unwrap_or(serde_json::Value::Null);

    Ok(Message {
        message_id: row.get("message_id")?,
        server_msg_id: row.get("server_msg_id")?,
        seq: row.get::<_, i64>("seq")?.max(0) as u64,
        conversation_id: row.get("conversation_id")?,
        sender_id: row.get("sender_id")?,
        receiver_id: row.get("receiver_id")?,
        conversation_type,
        message_type,
        content: row.get("content")?,
        create_time: row.get("create_time")?,
        server_time: row.get("server_time")?,
        status,
        direction,
        is_read: row.get("is_read")?,
        is_deleted: row.get("is_deleted")?,
        is_revoked: row.get("is_revoked")?,
        revoked_by: row.get("revoked_by")?,
        revoked_time: row.get("revoked_time")?,
        at_user_ids,
        at_all: row.get("at_all")?,
        read_by,
        quote,
        extra,
    })
}

fn row_to_conversation(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    let conversation_type = ConversationType::from_str(&row.get::<_, String>("conversation_type")?)
        .unwrap_or(ConversationType::Single);
    let latest_message: Option<LatestMessage> = row
        .get::<_, Option<String>>("latest_message")?
        .and_then(|s| serde_json::from_str(&s).ok());
    let draft: Option<Draft> = row
        .get::<_, Option<String>>("draft")?
        .and_then(|s| serde_json::from_str(&s).ok());

    Ok(Conversation {
        conversation_id: row.get("conversation_id")?,
        conversation_type,
        target_id: row.get("target_id")?,
        show_name: row.get("show_name")?,
        face_url: row.get("face_url")?,
        unread_count: row.get("unread_count")?,
        last_read_time: row.get("last_read_time")?,
        latest_message,
        last_message_time: row.get("last_message_time")?,
        is_pinned: row.get("is_pinned")?,
        is_muted: row.get("is_muted")?,
        draft,
        at_me: row.get("at_me")?,
        at_me_message_id: row.get("at_me_message_id")?,
        create_time: row.get("create_time")?,
        update_time: row.get("update_time")?,
    })
}
