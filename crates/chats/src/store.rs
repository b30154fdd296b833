//! Durable conversation store backed by SQLite.
//!
//! The store owns every invariant on the persisted shape: exactly two
//! distinct participants per conversation, one conversation per
//! (pair, idea), an append-only message log ordered by insertion, and
//! `last_activity_at` tracking the newest message. The schema enforces
//! the participant invariants independently of any caller validation.

use chrono::Utc;
use cuid2::create_id;
use ideabridge_auth::{User, UserRole};
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::entities::{Conversation, ConversationWithMessages, IdeaSummary, Message, Participant};
use crate::errors::{ChatError, ChatResult};

#[derive(Clone)]
pub struct ConversationStore {
    pool: SqlitePool,
}

struct ConversationRow {
    id: i64,
    public_id: String,
    participant_low: i64,
    participant_high: i64,
    idea_id: i64,
    created_at: String,
    last_activity_at: String,
}

impl ConversationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a conversation between the initiator and a counterpart about an
    /// idea, or return the existing one for that exact pair and subject.
    ///
    /// The returned flag is `true` when a new conversation was persisted.
    pub async fn create(
        &self,
        initiator: &User,
        counterpart_public_id: &str,
        idea_public_id: &str,
    ) -> ChatResult<(Conversation, bool)> {
        if initiator.role != UserRole::Investor {
            return Err(ChatError::forbidden(
                "only investors may open conversations",
            ));
        }

        let counterpart = sqlx::query("SELECT id, role FROM users WHERE public_id = ?")
            .bind(counterpart_public_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ChatError::user_not_found(counterpart_public_id))?;

        let counterpart_id: i64 = counterpart.try_get("id")?;
        let counterpart_role: String = counterpart.try_get("role")?;

        if counterpart_id == initiator.id {
            return Err(ChatError::invalid_argument(
                "cannot open a conversation with yourself",
            ));
        }

        if counterpart_role != "innovator" {
            return Err(ChatError::user_not_found(counterpart_public_id));
        }

        let idea_id: i64 = sqlx::query_scalar("SELECT id FROM ideas WHERE public_id = ?")
            .bind(idea_public_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ChatError::idea_not_found(idea_public_id))?;

        let (low, high) = if initiator.id < counterpart_id {
            (initiator.id, counterpart_id)
        } else {
            (counterpart_id, initiator.id)
        };

        if let Some(existing) = self.find_by_pair_and_idea(low, high, idea_id).await? {
            let conversation = self.hydrate(existing).await?;
            return Ok((conversation, false));
        }

        let public_id = create_id();
        let now = Utc::now().to_rfc3339();

        let inserted = sqlx::query(
            r#"
            INSERT INTO conversations (public_id, participant_low, participant_high, idea_id, created_at, last_activity_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&public_id)
        .bind(low)
        .bind(high)
        .bind(idea_id)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => {}
            // Lost a creation race for the same pair and idea: the unique
            // index holds, so return the winner's row.
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                let existing = self
                    .find_by_pair_and_idea(low, high, idea_id)
                    .await?
                    .ok_or_else(|| ChatError::conversation_not_found(&public_id))?;
                let conversation = self.hydrate(existing).await?;
                return Ok((conversation, false));
            }
            Err(err) => return Err(err.into()),
        }

        info!(
            conversation = %public_id,
            initiator = %initiator.public_id,
            counterpart = %counterpart_public_id,
            "created conversation"
        );

        let row = self
            .resolve(&public_id)
            .await?
            .ok_or_else(|| ChatError::conversation_not_found(&public_id))?;
        let conversation = self.hydrate(row).await?;
        Ok((conversation, true))
    }

    /// Append a message to the conversation's ordered log. The insert and the
    /// `last_activity_at` update commit as one transaction.
    pub async fn append_message(
        &self,
        conversation_public_id: &str,
        sender_id: i64,
        content: &str,
    ) -> ChatResult<Message> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::invalid_argument("message content is required"));
        }

        let row = self
            .resolve(conversation_public_id)
            .await?
            .ok_or_else(|| ChatError::conversation_not_found(conversation_public_id))?;

        if sender_id != row.participant_low && sender_id != row.participant_high {
            return Err(ChatError::forbidden(
                "only participants may send messages in this conversation",
            ));
        }

        let sender_public_id: String =
            sqlx::query_scalar("SELECT public_id FROM users WHERE id = ?")
                .bind(sender_id)
                .fetch_one(&self.pool)
                .await?;

        let public_id = create_id();
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;

        let message_id = sqlx::query(
            r#"
            INSERT INTO messages (public_id, conversation_id, sender_id, content, read, created_at)
            VALUES (?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(&public_id)
        .bind(row.id)
        .bind(sender_id)
        .bind(content)
        .bind(&now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        sqlx::query("UPDATE conversations SET last_activity_at = ? WHERE id = ?")
            .bind(&now)
            .bind(row.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Message {
            id: message_id,
            public_id,
            conversation_id: row.public_id,
            sender_id: sender_public_id,
            content: content.to_owned(),
            read: false,
            created_at: now,
        })
    }

    /// Flip `read` on every message the reader did not send. Idempotent; the
    /// flag never resets to unread.
    pub async fn mark_read(
        &self,
        conversation_public_id: &str,
        reader_id: i64,
    ) -> ChatResult<u64> {
        let row = self
            .resolve(conversation_public_id)
            .await?
            .ok_or_else(|| ChatError::conversation_not_found(conversation_public_id))?;

        if reader_id != row.participant_low && reader_id != row.participant_high {
            return Err(ChatError::forbidden(
                "only participants may mark this conversation read",
            ));
        }

        let updated = sqlx::query(
            "UPDATE messages SET read = 1 WHERE conversation_id = ? AND sender_id != ? AND read = 0",
        )
        .bind(row.id)
        .bind(reader_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated)
    }

    /// All conversations the user participates in, most recent activity first.
    pub async fn list_for_participant(&self, user_id: i64) -> ChatResult<Vec<Conversation>> {
        let rows = sqlx::query(
            r#"
            SELECT id, public_id, participant_low, participant_high, idea_id, created_at, last_activity_at
            FROM conversations
            WHERE participant_low = ? OR participant_high = ?
            ORDER BY last_activity_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut conversations = Vec::with_capacity(rows.len());
        for row in rows {
            let row = Self::row_from(row)?;
            conversations.push(self.hydrate(row).await?);
        }

        Ok(conversations)
    }

    /// Fetch one conversation with its full message log. Participants only.
    pub async fn fetch(
        &self,
        conversation_public_id: &str,
        requester_id: i64,
    ) -> ChatResult<ConversationWithMessages> {
        let row = self
            .resolve(conversation_public_id)
            .await?
            .ok_or_else(|| ChatError::conversation_not_found(conversation_public_id))?;

        if requester_id != row.participant_low && requester_id != row.participant_high {
            return Err(ChatError::forbidden(
                "only participants may view this conversation",
            ));
        }

        let conversation_id = row.id;
        let conversation = self.hydrate(row).await?;
        let messages = self.fetch_messages(conversation_id, &conversation).await?;

        Ok(ConversationWithMessages {
            conversation,
            messages,
        })
    }

    /// Participant gate used by the live channel before a room join.
    pub async fn participant_check(
        &self,
        conversation_public_id: &str,
        user_id: i64,
    ) -> ChatResult<()> {
        let row = self
            .resolve(conversation_public_id)
            .await?
            .ok_or_else(|| ChatError::conversation_not_found(conversation_public_id))?;

        if user_id != row.participant_low && user_id != row.participant_high {
            return Err(ChatError::forbidden(
                "only participants may join this conversation's room",
            ));
        }

        Ok(())
    }

    async fn resolve(&self, public_id: &str) -> ChatResult<Option<ConversationRow>> {
        let row = sqlx::query(
            r#"
            SELECT id, public_id, participant_low, participant_high, idea_id, created_at, last_activity_at
            FROM conversations
            WHERE public_id = ?
            "#,
        )
        .bind(public_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_from).transpose()
    }

    async fn find_by_pair_and_idea(
        &self,
        low: i64,
        high: i64,
        idea_id: i64,
    ) -> ChatResult<Option<ConversationRow>> {
        let row = sqlx::query(
            r#"
            SELECT id, public_id, participant_low, participant_high, idea_id, created_at, last_activity_at
            FROM conversations
            WHERE participant_low = ? AND participant_high = ? AND idea_id = ?
            "#,
        )
        .bind(low)
        .bind(high)
        .bind(idea_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_from).transpose()
    }

    fn row_from(row: sqlx::sqlite::SqliteRow) -> ChatResult<ConversationRow> {
        Ok(ConversationRow {
            id: row.try_get("id")?,
            public_id: row.try_get("public_id")?,
            participant_low: row.try_get("participant_low")?,
            participant_high: row.try_get("participant_high")?,
            idea_id: row.try_get("idea_id")?,
            created_at: row.try_get("created_at")?,
            last_activity_at: row.try_get("last_activity_at")?,
        })
    }

    async fn hydrate(&self, row: ConversationRow) -> ChatResult<Conversation> {
        let participants = vec![
            self.load_participant(row.participant_low).await?,
            self.load_participant(row.participant_high).await?,
        ];
        let idea = self.load_idea(row.idea_id).await?;

        Ok(Conversation {
            id: row.id,
            public_id: row.public_id,
            participants,
            idea,
            created_at: row.created_at,
            last_activity_at: row.last_activity_at,
        })
    }

    async fn load_participant(&self, user_id: i64) -> ChatResult<Participant> {
        let row = sqlx::query("SELECT public_id, display_name, role FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(Participant {
            id: user_id,
            public_id: row.try_get("public_id")?,
            display_name: row.try_get("display_name")?,
            role: row.try_get("role")?,
        })
    }

    async fn load_idea(&self, idea_id: i64) -> ChatResult<IdeaSummary> {
        let row = sqlx::query("SELECT public_id, title, category FROM ideas WHERE id = ?")
            .bind(idea_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(IdeaSummary {
            id: idea_id,
            public_id: row.try_get("public_id")?,
            title: row.try_get("title")?,
            category: row.try_get("category")?,
        })
    }

    async fn fetch_messages(
        &self,
        conversation_id: i64,
        conversation: &Conversation,
    ) -> ChatResult<Vec<Message>> {
        let rows = sqlx::query(
            r#"
            SELECT m.id, m.public_id, m.content, m.read, m.created_at, u.public_id AS sender_public_id
            FROM messages m
            JOIN users u ON u.id = m.sender_id
            WHERE m.conversation_id = ?
            ORDER BY m.id ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            messages.push(Message {
                id: row.try_get("id")?,
                public_id: row.try_get("public_id")?,
                conversation_id: conversation.public_id.clone(),
                sender_id: row.try_get("sender_public_id")?,
                content: row.try_get("content")?,
                read: row.try_get("read")?,
                created_at: row.try_get("created_at")?,
            });
        }

        Ok(messages)
    }
}
