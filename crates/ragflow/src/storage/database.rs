//! SQLite store for query state, answers, escalations, audit events, and the
//! durable job queue
//!
//! Connections are drawn from a bounded pool sized to the dispatcher's
//! concurrency ceiling, so each in-flight pipeline run holds at most one
//! connection at a time. Database calls never suspend; the only suspension
//! points in the system are the external network calls.

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{
    Answer, AnswerValidation, AssignmentStatus, AuditEvent, Chunk, EscalationReason,
    EscalationRequest, PipelineStage, Query, QueryStatus, RetrievalResult,
};

/// Status of a job in the durable queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    InFlight,
    Done,
    Dead,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InFlight => "in_flight",
            Self::Done => "done",
            Self::Dead => "dead",
        }
    }
}

/// A job claimed from the queue
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub id: i64,
    /// Raw envelope JSON; deserialization happens at the consumer
    pub payload: String,
    /// Delivery attempts including this one
    pub attempts: u32,
}

/// Bounded pool of SQLite connections
struct ConnectionPool {
    connections: Mutex<Vec<Connection>>,
    available: Condvar,
}

impl ConnectionPool {
    fn new(connections: Vec<Connection>) -> Self {
        Self { connections: Mutex::new(connections), available: Condvar::new() }
    }

    /// Check out a connection, blocking until one is free
    fn with<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = {
            let mut pool = self.connections.lock();
            while pool.is_empty() {
                self.available.wait(&mut pool);
            }
            pool.pop().expect("pool not empty after wait")
        };

        let result = f(&conn);

        let mut pool = self.connections.lock();
        pool.push(conn);
        drop(pool);
        self.available.notify_one();

        result
    }
}

/// SQLite-backed store
pub struct Database {
    pool: ConnectionPool,
}

impl Database {
    /// Open (or create) the database at the given path with a pool of
    /// `pool_size` connections
    pub fn open<P: AsRef<Path>>(path: P, pool_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let mut connections = Vec::with_capacity(pool_size.max(1));
        for _ in 0..pool_size.max(1) {
            let conn = Connection::open(path)
                .map_err(|e| Error::database(format!("failed to open database: {e}")))?;
            conn.execute_batch(
                r#"
                PRAGMA journal_mode=WAL;
                PRAGMA synchronous=NORMAL;
                PRAGMA busy_timeout=5000;
                PRAGMA foreign_keys=ON;
                "#,
            )
            .map_err(|e| Error::database(format!("failed to set pragmas: {e}")))?;
            connections.push(conn);
        }

        let db = Self { pool: ConnectionPool::new(connections) };
        db.migrate()?;
        Ok(db)
    }

    /// Single-connection in-memory database for tests
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::database(format!("failed to open in-memory database: {e}")))?;
        let db = Self { pool: ConnectionPool::new(vec![conn]) };
        db.migrate()?;
        Ok(db)
    }

    /// Run embedded migrations
    fn migrate(&self) -> Result<()> {
        self.pool.with(|conn| {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS queries (
                    id TEXT PRIMARY KEY,
                    raw_text TEXT NOT NULL,
                    sanitized_text TEXT,
                    language TEXT NOT NULL,
                    collection TEXT NOT NULL,
                    submitted_at TEXT NOT NULL,
                    status TEXT NOT NULL,
                    stage TEXT NOT NULL,
                    correlation_id TEXT,
                    failure_reason TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_queries_status ON queries(status);

                CREATE TABLE IF NOT EXISTS chunks (
                    id TEXT PRIMARY KEY,
                    document_id TEXT NOT NULL,
                    content TEXT NOT NULL,
                    seq INTEGER NOT NULL,
                    token_count INTEGER NOT NULL,
                    char_start INTEGER NOT NULL,
                    char_end INTEGER NOT NULL,
                    created_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id);

                CREATE TABLE IF NOT EXISTS retrieval_results (
                    query_id TEXT NOT NULL,
                    chunk_id TEXT NOT NULL,
                    similarity REAL NOT NULL,
                    rank INTEGER NOT NULL,
                    rerank_score REAL,
                    retrieved_at TEXT NOT NULL,
                    UNIQUE(query_id, rank)
                );
                CREATE INDEX IF NOT EXISTS idx_retrieval_query ON retrieval_results(query_id);

                CREATE TABLE IF NOT EXISTS answers (
                    id TEXT PRIMARY KEY,
                    query_id TEXT NOT NULL UNIQUE,
                    answer_text TEXT NOT NULL,
                    confidence REAL NOT NULL,
                    model_id TEXT NOT NULL,
                    prompt_tokens INTEGER NOT NULL,
                    completion_tokens INTEGER NOT NULL,
                    retrieval_ms INTEGER NOT NULL,
                    generation_ms INTEGER NOT NULL,
                    total_ms INTEGER NOT NULL,
                    cache_hit INTEGER NOT NULL,
                    escalated INTEGER NOT NULL,
                    validation_status TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS escalations (
                    id TEXT PRIMARY KEY,
                    query_id TEXT NOT NULL UNIQUE,
                    answer_id TEXT,
                    reason TEXT NOT NULL,
                    confidence REAL,
                    priority REAL NOT NULL,
                    assignment_status TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS audit_events (
                    id TEXT PRIMARY KEY,
                    event_type TEXT NOT NULL,
                    actor TEXT NOT NULL,
                    entity_type TEXT NOT NULL,
                    entity_id TEXT NOT NULL,
                    severity TEXT NOT NULL,
                    success INTEGER NOT NULL,
                    error_message TEXT,
                    detail TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_events(entity_id);

                CREATE TABLE IF NOT EXISTS jobs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    payload TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'queued',
                    attempts INTEGER NOT NULL DEFAULT 0,
                    last_error TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
                "#,
            )
            .map_err(|e| Error::database(format!("migration failed: {e}")))
        })
    }

    // ----- queries -----

    /// Insert the query row if it does not exist yet (the ingress
    /// collaborator normally creates it before publishing the job)
    pub fn upsert_query(&self, query: &Query) -> Result<()> {
        self.pool.with(|conn| {
            conn.execute(
                r#"INSERT INTO queries
                   (id, raw_text, sanitized_text, language, collection, submitted_at,
                    status, stage, correlation_id, failure_reason)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                   ON CONFLICT(id) DO NOTHING"#,
                params![
                    query.id.to_string(),
                    query.raw_text,
                    query.sanitized_text,
                    query.language,
                    query.collection,
                    query.submitted_at.to_rfc3339(),
                    query.status.as_str(),
                    query.stage.as_str(),
                    query.correlation_id,
                    query.failure_reason,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_query(&self, id: Uuid) -> Result<Option<Query>> {
        self.pool.with(|conn| {
            conn.query_row(
                r#"SELECT id, raw_text, sanitized_text, language, collection, submitted_at,
                          status, stage, correlation_id, failure_reason
                   FROM queries WHERE id = ?1"#,
                params![id.to_string()],
                row_to_query,
            )
            .optional()
            .map_err(Error::from)
        })
    }

    /// Persist a pipeline stage transition; refuses to touch terminal rows
    pub fn update_query_stage(&self, id: Uuid, status: QueryStatus, stage: PipelineStage) -> Result<()> {
        self.pool.with(|conn| {
            conn.execute(
                r#"UPDATE queries SET status = ?2, stage = ?3
                   WHERE id = ?1 AND status NOT IN ('completed', 'failed')"#,
                params![id.to_string(), status.as_str(), stage.as_str()],
            )?;
            Ok(())
        })
    }

    /// Record the sanitized text produced by the guardrails
    pub fn set_sanitized_text(&self, id: Uuid, sanitized: &str) -> Result<()> {
        self.pool.with(|conn| {
            conn.execute(
                "UPDATE queries SET sanitized_text = ?2 WHERE id = ?1",
                params![id.to_string(), sanitized],
            )?;
            Ok(())
        })
    }

    /// Move a query to a terminal status with an optional structured reason
    pub fn mark_query_terminal(
        &self,
        id: Uuid,
        status: QueryStatus,
        failure_reason: Option<&str>,
    ) -> Result<()> {
        debug_assert!(status.is_terminal());
        self.pool.with(|conn| {
            conn.execute(
                r#"UPDATE queries SET status = ?2, stage = 'done', failure_reason = ?3
                   WHERE id = ?1 AND status NOT IN ('completed', 'failed')"#,
                params![id.to_string(), status.as_str(), failure_reason],
            )?;
            Ok(())
        })
    }

    // ----- chunks -----

    pub fn insert_chunk(&self, chunk: &Chunk) -> Result<()> {
        self.pool.with(|conn| {
            conn.execute(
                r#"INSERT INTO chunks
                   (id, document_id, content, seq, token_count, char_start, char_end, created_at)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
                params![
                    chunk.id.to_string(),
                    chunk.document_id.to_string(),
                    chunk.content,
                    chunk.seq,
                    chunk.token_count,
                    chunk.char_start as i64,
                    chunk.char_end as i64,
                    chunk.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_chunk(&self, id: Uuid) -> Result<Option<Chunk>> {
        self.pool.with(|conn| {
            conn.query_row(
                r#"SELECT id, document_id, content, seq, token_count, char_start, char_end, created_at
                   FROM chunks WHERE id = ?1"#,
                params![id.to_string()],
                |row| {
                    Ok(Chunk {
                        id: parse_uuid(row.get::<_, String>(0)?),
                        document_id: parse_uuid(row.get::<_, String>(1)?),
                        content: row.get(2)?,
                        seq: row.get(3)?,
                        token_count: row.get(4)?,
                        char_start: row.get::<_, i64>(5)? as usize,
                        char_end: row.get::<_, i64>(6)? as usize,
                        created_at: parse_timestamp(row.get::<_, String>(7)?),
                    })
                },
            )
            .optional()
            .map_err(Error::from)
        })
    }

    // ----- retrieval results -----

    /// Persist the ranked retrieval results for a query, all or nothing
    pub fn insert_retrieval_results(&self, results: &[RetrievalResult]) -> Result<()> {
        self.pool.with(|conn| {
            let now = Utc::now().to_rfc3339();
            for result in results {
                conn.execute(
                    r#"INSERT INTO retrieval_results
                       (query_id, chunk_id, similarity, rank, rerank_score, retrieved_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
                    params![
                        result.query_id.to_string(),
                        result.chunk_id.to_string(),
                        result.similarity,
                        result.rank,
                        result.rerank_score,
                        now,
                    ],
                )?;
            }
            Ok(())
        })
    }

    /// Retrieval results for a query, best rank first
    pub fn get_retrieval_results(&self, query_id: Uuid) -> Result<Vec<(Uuid, f32, u32)>> {
        self.pool.with(|conn| {
            let mut stmt = conn.prepare(
                r#"SELECT chunk_id, similarity, rank FROM retrieval_results
                   WHERE query_id = ?1 ORDER BY rank ASC"#,
            )?;
            let rows = stmt.query_map(params![query_id.to_string()], |row| {
                Ok((
                    parse_uuid(row.get::<_, String>(0)?),
                    row.get::<_, f32>(1)?,
                    row.get::<_, u32>(2)?,
                ))
            })?;
            rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Error::from)
        })
    }

    // ----- answers -----

    pub fn insert_answer(&self, answer: &Answer) -> Result<()> {
        self.pool.with(|conn| {
            conn.execute(
                r#"INSERT INTO answers
                   (id, query_id, answer_text, confidence, model_id, prompt_tokens,
                    completion_tokens, retrieval_ms, generation_ms, total_ms, cache_hit,
                    escalated, validation_status, created_at)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"#,
                params![
                    answer.id.to_string(),
                    answer.query_id.to_string(),
                    answer.answer_text,
                    answer.confidence,
                    answer.model_id,
                    answer.prompt_tokens,
                    answer.completion_tokens,
                    answer.retrieval_ms as i64,
                    answer.generation_ms as i64,
                    answer.total_ms as i64,
                    answer.cache_hit as i64,
                    answer.escalated as i64,
                    answer.validation_status.as_str(),
                    answer.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_answer_for_query(&self, query_id: Uuid) -> Result<Option<Answer>> {
        self.pool.with(|conn| {
            conn.query_row(
                r#"SELECT id, query_id, answer_text, confidence, model_id, prompt_tokens,
                          completion_tokens, retrieval_ms, generation_ms, total_ms, cache_hit,
                          escalated, validation_status, created_at
                   FROM answers WHERE query_id = ?1"#,
                params![query_id.to_string()],
                |row| {
                    Ok(Answer {
                        id: parse_uuid(row.get::<_, String>(0)?),
                        query_id: parse_uuid(row.get::<_, String>(1)?),
                        answer_text: row.get(2)?,
                        confidence: row.get(3)?,
                        model_id: row.get(4)?,
                        prompt_tokens: row.get(5)?,
                        completion_tokens: row.get(6)?,
                        retrieval_ms: row.get::<_, i64>(7)? as u64,
                        generation_ms: row.get::<_, i64>(8)? as u64,
                        total_ms: row.get::<_, i64>(9)? as u64,
                        cache_hit: row.get::<_, i64>(10)? != 0,
                        escalated: row.get::<_, i64>(11)? != 0,
                        validation_status: AnswerValidation::parse(&row.get::<_, String>(12)?)
                            .unwrap_or(AnswerValidation::Passed),
                        created_at: parse_timestamp(row.get::<_, String>(13)?),
                    })
                },
            )
            .optional()
            .map_err(Error::from)
        })
    }

    // ----- escalations -----

    pub fn insert_escalation(&self, escalation: &EscalationRequest) -> Result<()> {
        self.pool.with(|conn| {
            conn.execute(
                r#"INSERT INTO escalations
                   (id, query_id, answer_id, reason, confidence, priority, assignment_status, created_at)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
                params![
                    escalation.id.to_string(),
                    escalation.query_id.to_string(),
                    escalation.answer_id.map(|id| id.to_string()),
                    escalation.reason.as_str(),
                    escalation.confidence,
                    escalation.priority,
                    escalation.assignment_status.as_str(),
                    escalation.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_escalation_for_query(&self, query_id: Uuid) -> Result<Option<EscalationRequest>> {
        self.pool.with(|conn| {
            conn.query_row(
                r#"SELECT id, query_id, answer_id, reason, confidence, priority,
                          assignment_status, created_at
                   FROM escalations WHERE query_id = ?1"#,
                params![query_id.to_string()],
                |row| {
                    Ok(EscalationRequest {
                        id: parse_uuid(row.get::<_, String>(0)?),
                        query_id: parse_uuid(row.get::<_, String>(1)?),
                        answer_id: row.get::<_, Option<String>>(2)?.map(parse_uuid),
                        reason: EscalationReason::parse(&row.get::<_, String>(3)?)
                            .unwrap_or(EscalationReason::LowConfidence),
                        confidence: row.get(4)?,
                        priority: row.get(5)?,
                        assignment_status: AssignmentStatus::parse(&row.get::<_, String>(6)?)
                            .unwrap_or(AssignmentStatus::Queued),
                        created_at: parse_timestamp(row.get::<_, String>(7)?),
                    })
                },
            )
            .optional()
            .map_err(Error::from)
        })
    }

    // ----- audit -----

    pub fn insert_audit_event(&self, event: &AuditEvent) -> Result<()> {
        self.pool.with(|conn| {
            conn.execute(
                r#"INSERT INTO audit_events
                   (id, event_type, actor, entity_type, entity_id, severity, success,
                    error_message, detail, created_at)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
                params![
                    event.id.to_string(),
                    event.event_type.as_str(),
                    event.actor,
                    event.entity_type,
                    event.entity_id,
                    event.severity.as_str(),
                    event.success as i64,
                    event.error_message,
                    event.detail.to_string(),
                    event.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Audit event types recorded for an entity, oldest first
    pub fn audit_event_types_for_entity(&self, entity_id: &str) -> Result<Vec<String>> {
        self.pool.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT event_type FROM audit_events WHERE entity_id = ?1 ORDER BY created_at ASC",
            )?;
            let rows = stmt.query_map(params![entity_id], |row| row.get::<_, String>(0))?;
            rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Error::from)
        })
    }

    // ----- job queue -----

    /// Publish a job envelope to the durable queue
    pub fn enqueue_job(&self, payload: &str) -> Result<i64> {
        self.pool.with(|conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO jobs (payload, status, attempts, created_at, updated_at)
                 VALUES (?1, 'queued', 0, ?2, ?2)",
                params![payload, now],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Atomically claim the oldest queued job, counting the delivery attempt
    pub fn claim_next_job(&self) -> Result<Option<ClaimedJob>> {
        self.pool.with(|conn| {
            let now = Utc::now().to_rfc3339();
            conn.query_row(
                r#"UPDATE jobs
                   SET status = 'in_flight', attempts = attempts + 1, updated_at = ?1
                   WHERE id = (SELECT id FROM jobs WHERE status = 'queued' ORDER BY id LIMIT 1)
                   RETURNING id, payload, attempts"#,
                params![now],
                |row| {
                    Ok(ClaimedJob {
                        id: row.get(0)?,
                        payload: row.get(1)?,
                        attempts: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(Error::from)
        })
    }

    /// Acknowledge a job: a terminal pipeline outcome was recorded
    pub fn ack_job(&self, id: i64) -> Result<()> {
        self.set_job_status(id, JobStatus::Done, None)
    }

    /// Negatively acknowledge a job; returns true when the job was
    /// dead-lettered because its delivery budget is spent
    pub fn nack_job(&self, id: i64, error: &str, max_attempts: u32) -> Result<bool> {
        self.pool.with(|conn| {
            let attempts: u32 = conn
                .query_row("SELECT attempts FROM jobs WHERE id = ?1", params![id], |row| row.get(0))
                .map_err(|e| Error::queue(format!("job {id} not found: {e}")))?;

            let status = if attempts >= max_attempts { JobStatus::Dead } else { JobStatus::Queued };
            conn.execute(
                "UPDATE jobs SET status = ?2, last_error = ?3, updated_at = ?4 WHERE id = ?1",
                params![id, status.as_str(), error, Utc::now().to_rfc3339()],
            )?;
            Ok(status == JobStatus::Dead)
        })
    }

    fn set_job_status(&self, id: i64, status: JobStatus, error: Option<&str>) -> Result<()> {
        self.pool.with(|conn| {
            conn.execute(
                "UPDATE jobs SET status = ?2, last_error = ?3, updated_at = ?4 WHERE id = ?1",
                params![id, status.as_str(), error, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }

    /// Count of jobs left in_flight by a previous process. Stalled jobs are
    /// observable but not redelivered; recovery is a documented limitation.
    pub fn count_stalled_jobs(&self) -> Result<u64> {
        self.pool.with(|conn| {
            conn.query_row("SELECT COUNT(*) FROM jobs WHERE status = 'in_flight'", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as u64)
            .map_err(Error::from)
        })
    }

    /// Job status by id, for inspection
    pub fn job_status(&self, id: i64) -> Result<Option<String>> {
        self.pool.with(|conn| {
            conn.query_row("SELECT status FROM jobs WHERE id = ?1", params![id], |row| row.get(0))
                .optional()
                .map_err(Error::from)
        })
    }
}

fn row_to_query(row: &rusqlite::Row<'_>) -> rusqlite::Result<Query> {
    Ok(Query {
        id: parse_uuid(row.get::<_, String>(0)?),
        raw_text: row.get(1)?,
        sanitized_text: row.get(2)?,
        language: row.get(3)?,
        collection: row.get(4)?,
        submitted_at: parse_timestamp(row.get::<_, String>(5)?),
        status: QueryStatus::parse(&row.get::<_, String>(6)?).unwrap_or(QueryStatus::Pending),
        stage: PipelineStage::parse(&row.get::<_, String>(7)?).unwrap_or(PipelineStage::Received),
        correlation_id: row.get(8)?,
        failure_reason: row.get(9)?,
    })
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_timestamp(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_query() -> Query {
        Query::new(
            Uuid::new_v4(),
            "Quais são as reclamações mais comuns?".to_string(),
            "reviews".to_string(),
            "pt-BR".to_string(),
        )
    }

    #[test]
    fn test_query_round_trip() {
        let db = Database::in_memory().unwrap();
        let query = sample_query();
        db.upsert_query(&query).unwrap();

        let loaded = db.get_query(query.id).unwrap().unwrap();
        assert_eq!(loaded.raw_text, query.raw_text);
        assert_eq!(loaded.status, QueryStatus::Pending);
        assert_eq!(loaded.stage, PipelineStage::Received);
    }

    #[test]
    fn test_stage_transitions_persisted() {
        let db = Database::in_memory().unwrap();
        let query = sample_query();
        db.upsert_query(&query).unwrap();

        db.update_query_stage(query.id, QueryStatus::Processing, PipelineStage::Embedding).unwrap();
        let loaded = db.get_query(query.id).unwrap().unwrap();
        assert_eq!(loaded.status, QueryStatus::Processing);
        assert_eq!(loaded.stage, PipelineStage::Embedding);
    }

    #[test]
    fn test_terminal_query_immutable() {
        let db = Database::in_memory().unwrap();
        let query = sample_query();
        db.upsert_query(&query).unwrap();

        db.mark_query_terminal(query.id, QueryStatus::Completed, None).unwrap();
        db.update_query_stage(query.id, QueryStatus::Processing, PipelineStage::Validating).unwrap();

        let loaded = db.get_query(query.id).unwrap().unwrap();
        assert_eq!(loaded.status, QueryStatus::Completed);
    }

    #[test]
    fn test_retrieval_rank_uniqueness_enforced() {
        let db = Database::in_memory().unwrap();
        let query_id = Uuid::new_v4();
        let mk = |rank| RetrievalResult {
            query_id,
            chunk_id: Uuid::new_v4(),
            similarity: 0.9,
            rank,
            rerank_score: None,
            content: String::new(),
        };

        db.insert_retrieval_results(&[mk(1), mk(2)]).unwrap();
        assert!(db.insert_retrieval_results(&[mk(2)]).is_err());
    }

    #[test]
    fn test_job_claim_ack_cycle() {
        let db = Database::in_memory().unwrap();
        let id = db.enqueue_job(r#"{"hello":"world"}"#).unwrap();

        let claimed = db.claim_next_job().unwrap().unwrap();
        assert_eq!(claimed.id, id);
        assert_eq!(claimed.attempts, 1);

        // Nothing else to claim while the job is in flight
        assert!(db.claim_next_job().unwrap().is_none());

        db.ack_job(id).unwrap();
        assert_eq!(db.job_status(id).unwrap().as_deref(), Some("done"));
    }

    #[test]
    fn test_job_dead_letter_after_attempt_budget() {
        let db = Database::in_memory().unwrap();
        let id = db.enqueue_job("not even json").unwrap();

        for attempt in 1..=3u32 {
            let claimed = db.claim_next_job().unwrap().unwrap();
            assert_eq!(claimed.attempts, attempt);
            let dead = db.nack_job(id, "parse failure", 3).unwrap();
            assert_eq!(dead, attempt == 3);
        }

        assert_eq!(db.job_status(id).unwrap().as_deref(), Some("dead"));
        assert!(db.claim_next_job().unwrap().is_none());
    }

    #[test]
    fn test_stalled_job_count() {
        let db = Database::in_memory().unwrap();
        db.enqueue_job("{}").unwrap();
        db.claim_next_job().unwrap().unwrap();
        assert_eq!(db.count_stalled_jobs().unwrap(), 1);
    }
}
