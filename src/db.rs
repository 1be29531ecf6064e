use std::path::Path;

use anyhow::{Context, Result};
use changelog_harvest::{ExtractedRecord, RecordKind};
use rusqlite::{Connection, OptionalExtension};

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let conn = Connection::open(path).with_context(|| format!("opening {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS changelog_entries (
            identifier    TEXT PRIMARY KEY,
            title         TEXT NOT NULL,
            body          TEXT NOT NULL,
            summary       TEXT NOT NULL,
            url           TEXT,
            source        TEXT NOT NULL,
            release_date  TEXT NOT NULL,
            is_major      BOOLEAN NOT NULL DEFAULT 0,
            tags          TEXT NOT NULL,
            metadata      TEXT NOT NULL,
            collected_at  TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at    TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_changelog_release ON changelog_entries(release_date);

        CREATE TABLE IF NOT EXISTS news (
            id            INTEGER PRIMARY KEY,
            title         TEXT NOT NULL,
            body          TEXT NOT NULL,
            summary       TEXT NOT NULL,
            source        TEXT NOT NULL,
            published_at  TEXT NOT NULL,
            published_day TEXT NOT NULL,
            tags          TEXT NOT NULL,
            metadata      TEXT NOT NULL,
            created_at    TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(title, published_day)
        );
        CREATE INDEX IF NOT EXISTS idx_news_day ON news(published_day);

        CREATE TABLE IF NOT EXISTS fetch_log (
            id          INTEGER PRIMARY KEY,
            source      TEXT NOT NULL,
            url         TEXT NOT NULL,
            status      INTEGER,
            error       TEXT,
            latency_ms  INTEGER,
            fetched_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;
    Ok(())
}

// ── Records ──

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SaveStats {
    pub new: usize,
    pub existing: usize,
    pub skipped: usize,
}

impl SaveStats {
    pub fn print(&self) {
        println!(
            "Saved {} new, {} already stored, {} not persisted.",
            self.new, self.existing, self.skipped
        );
    }
}

fn tags_json(record: &ExtractedRecord) -> Result<String> {
    Ok(serde_json::to_string(&record.tags)?)
}

/// Changelog entries are upserted by identifier; snapshot entries never
/// overwrite what a real page produced. News is insert-or-ignore per title
/// and day. Advisories are not stored.
pub fn save_records(conn: &Connection, records: &[ExtractedRecord]) -> Result<SaveStats> {
    let mut stats = SaveStats::default();
    let tx = conn.unchecked_transaction()?;
    {
        let mut exists_stmt = tx.prepare("SELECT 1 FROM changelog_entries WHERE identifier = ?1")?;
        let mut upsert_stmt = tx.prepare(
            "INSERT INTO changelog_entries
             (identifier, title, body, summary, url, source, release_date, is_major, tags, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(identifier) DO UPDATE SET
                title = excluded.title,
                body = excluded.body,
                summary = excluded.summary,
                url = excluded.url,
                source = excluded.source,
                release_date = excluded.release_date,
                is_major = excluded.is_major,
                tags = excluded.tags,
                metadata = excluded.metadata,
                updated_at = datetime('now')",
        )?;
        let mut snapshot_stmt = tx.prepare(
            "INSERT OR IGNORE INTO changelog_entries
             (identifier, title, body, summary, url, source, release_date, is_major, tags, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;
        let mut news_stmt = tx.prepare(
            "INSERT OR IGNORE INTO news
             (title, body, summary, source, published_at, published_day, tags, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;

        for r in records {
            match (r.kind, r.identifier.as_deref()) {
                (RecordKind::Changelog, Some(id)) => {
                    let known = exists_stmt.query_row([id], |_| Ok(())).optional()?.is_some();
                    let release_date = r
                        .metadata
                        .get("release_date")
                        .and_then(|v| v.as_str())
                        .map(str::to_string)
                        .unwrap_or_else(|| r.published_at.format("%Y-%m-%d").to_string());
                    let is_major = r.metadata.get("is_major").and_then(|v| v.as_bool()).unwrap_or(false);
                    let stmt = if r.tags.contains("snapshot") {
                        &mut snapshot_stmt
                    } else {
                        &mut upsert_stmt
                    };
                    stmt.execute(rusqlite::params![
                        id,
                        r.title,
                        r.body,
                        r.summary,
                        r.url,
                        r.source,
                        release_date,
                        is_major,
                        tags_json(r)?,
                        serde_json::to_string(&r.metadata)?,
                    ])?;
                    if known {
                        stats.existing += 1;
                    } else {
                        stats.new += 1;
                    }
                }
                (RecordKind::News, _) => {
                    let inserted = news_stmt.execute(rusqlite::params![
                        r.title,
                        r.body,
                        r.summary,
                        r.source,
                        r.published_at.to_rfc3339(),
                        r.published_at.format("%Y-%m-%d").to_string(),
                        tags_json(r)?,
                        serde_json::to_string(&r.metadata)?,
                    ])?;
                    if inserted > 0 {
                        stats.new += 1;
                    } else {
                        stats.existing += 1;
                    }
                }
                _ => stats.skipped += 1,
            }
        }
    }
    tx.commit()?;
    Ok(stats)
}

pub struct StoredRecord {
    pub kind: String,
    pub identifier: Option<String>,
    pub title: String,
    pub date: String,
    pub summary: String,
}

/// Most recent records first, optionally filtered by kind.
pub fn fetch_records(conn: &Connection, kind: Option<&str>, limit: usize) -> Result<Vec<StoredRecord>> {
    let mut conditions = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(k) = kind {
        conditions.push(format!("kind = ?{}", params.len() + 1));
        params.push(Box::new(k.to_string()));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    let sql = format!(
        "SELECT kind, identifier, title, date, summary FROM (
             SELECT 'changelog' AS kind, identifier, title, release_date AS date, summary
             FROM changelog_entries
             UNION ALL
             SELECT 'news' AS kind, NULL, title, published_day AS date, summary
             FROM news
         ){}
         ORDER BY date DESC, kind, identifier DESC
         LIMIT {}",
        where_clause, limit
    );

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), |row| {
            Ok(StoredRecord {
                kind: row.get(0)?,
                identifier: row.get(1)?,
                title: row.get(2)?,
                date: row.get(3)?,
                summary: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Fetch log ──

pub struct FetchRow {
    pub source: String,
    pub url: String,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub latency_ms: i64,
}

pub fn log_fetch(conn: &Connection, row: &FetchRow) -> Result<()> {
    conn.execute(
        "INSERT INTO fetch_log (source, url, status, error, latency_ms) VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![row.source, row.url, row.status, row.error, row.latency_ms],
    )?;
    Ok(())
}

// ── Stats ──

pub struct Stats {
    pub changelog: usize,
    pub news: usize,
    pub latest_version: Option<String>,
    pub fetches: usize,
    pub fetch_errors: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let changelog: usize = conn.query_row("SELECT COUNT(*) FROM changelog_entries", [], |r| r.get(0))?;
    let news: usize = conn.query_row("SELECT COUNT(*) FROM news", [], |r| r.get(0))?;
    let latest_version: Option<String> = conn
        .query_row(
            "SELECT identifier FROM changelog_entries ORDER BY release_date DESC, identifier DESC LIMIT 1",
            [],
            |r| r.get(0),
        )
        .optional()?;
    let fetches: usize = conn.query_row("SELECT COUNT(*) FROM fetch_log", [], |r| r.get(0))?;
    let fetch_errors: usize = conn.query_row(
        "SELECT COUNT(*) FROM fetch_log WHERE error IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    Ok(Stats {
        changelog,
        news,
        latest_version,
        fetches,
        fetch_errors,
    })
}
