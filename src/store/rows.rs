// src/store/rows.rs
//
// Row mappings for Performance, Record and RelatedLink
//
// A Performance row holds scalar metadata plus its detail as JSON.
// Related links and owned Record ids live in their own tables and are
// attached by `hydrate_performance`.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::domain::{Performance, PerformanceDetail, Record, RelatedLink};
use crate::error::AppResult;
use crate::store::object_store::{query_in, Query, StoredObject};

const DATE_FORMAT: &str = "%Y-%m-%d";

fn conversion_error<E>(e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::ToSqlConversionFailure(Box::new(e))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(conversion_error)
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_date(raw: &str) -> Result<NaiveDate, rusqlite::Error> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(conversion_error)
}

// ============================================================================
// PERFORMANCE
// ============================================================================

/// JSON shape of the `detail` column (links are stored as rows)
#[derive(Serialize, Deserialize)]
struct StoredDetail {
    cast: String,
    crew: String,
    runtime: String,
    age_limit: String,
    synopsis: String,
    price_info: String,
    detail_image_urls: Vec<String>,
    detail_image_ids: Vec<String>,
}

impl StoredDetail {
    fn from_detail(detail: &PerformanceDetail) -> Self {
        Self {
            cast: detail.cast.clone(),
            crew: detail.crew.clone(),
            runtime: detail.runtime.clone(),
            age_limit: detail.age_limit.clone(),
            synopsis: detail.synopsis.clone(),
            price_info: detail.price_info.clone(),
            detail_image_urls: detail.detail_image_urls.clone(),
            detail_image_ids: detail.detail_image_ids.clone(),
        }
    }

    fn into_detail(self) -> PerformanceDetail {
        PerformanceDetail {
            cast: self.cast,
            crew: self.crew,
            runtime: self.runtime,
            age_limit: self.age_limit,
            synopsis: self.synopsis,
            price_info: self.price_info,
            related_links: Vec::new(),
            detail_image_urls: self.detail_image_urls,
            detail_image_ids: self.detail_image_ids,
        }
    }
}

impl StoredObject for Performance {
    const TABLE: &'static str = "performances";
    const COLUMNS: &'static str = "id, name, start_date, end_date, venue_name, genre, area, \
                                   state, poster_url, poster_id, detail, updated_at";
    const ORDER_BY: &'static str = "name, id";

    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        let start_date: String = row.get("start_date")?;
        let end_date: String = row.get("end_date")?;

        let genre: String = row.get("genre")?;
        let area: String = row.get("area")?;
        let state: String = row.get("state")?;

        let detail_json: Option<String> = row.get("detail")?;
        let detail = detail_json
            .map(|json| {
                serde_json::from_str::<StoredDetail>(&json)
                    .map(StoredDetail::into_detail)
                    .map_err(conversion_error)
            })
            .transpose()?;

        let updated_at: String = row.get("updated_at")?;

        Ok(Performance {
            id: row.get("id")?,
            name: row.get("name")?,
            start_date: parse_date(&start_date)?,
            end_date: parse_date(&end_date)?,
            venue_name: row.get("venue_name")?,
            genre: genre.parse().map_err(conversion_error)?,
            area: area.parse().map_err(conversion_error)?,
            state: state.parse().map_err(conversion_error)?,
            poster_url: row.get("poster_url")?,
            poster_id: row.get("poster_id")?,
            detail,
            record_ids: Vec::new(),
            updated_at: parse_timestamp(&updated_at)?,
        })
    }

    /// Whole-row replace of the metadata columns
    ///
    /// `ON CONFLICT DO UPDATE` keeps the row identity, so records and links
    /// pointing at it through foreign keys are untouched.
    fn upsert(&self, conn: &Connection) -> Result<(), rusqlite::Error> {
        let detail_json = self
            .detail
            .as_ref()
            .map(|d| serde_json::to_string(&StoredDetail::from_detail(d)))
            .transpose()
            .map_err(conversion_error)?;

        conn.execute(
            "INSERT INTO performances (
                id, name, start_date, end_date, venue_name, genre, area, state,
                poster_url, poster_id, detail, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                start_date = excluded.start_date,
                end_date = excluded.end_date,
                venue_name = excluded.venue_name,
                genre = excluded.genre,
                area = excluded.area,
                state = excluded.state,
                poster_url = excluded.poster_url,
                poster_id = excluded.poster_id,
                detail = excluded.detail,
                updated_at = excluded.updated_at",
            params![
                self.id,
                self.name,
                self.start_date.format(DATE_FORMAT).to_string(),
                self.end_date.format(DATE_FORMAT).to_string(),
                self.venue_name,
                self.genre.to_string(),
                self.area.to_string(),
                self.state.to_string(),
                self.poster_url,
                self.poster_id,
                detail_json,
                format_timestamp(&self.updated_at),
            ],
        )?;

        Ok(())
    }
}

// ============================================================================
// RELATED LINK
// ============================================================================

/// A related link as stored: owner + display position
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedLinkRow {
    pub id: String,
    pub performance_id: String,
    pub position: i64,
    pub name: String,
    pub url: String,
}

impl RelatedLinkRow {
    pub fn from_link(performance_id: &str, position: usize, link: &RelatedLink) -> Self {
        Self {
            id: link.id.clone(),
            performance_id: performance_id.to_string(),
            position: position as i64,
            name: link.name.clone(),
            url: link.url.clone(),
        }
    }

    pub fn into_link(self) -> RelatedLink {
        RelatedLink {
            id: self.id,
            name: self.name,
            url: self.url,
        }
    }
}

impl StoredObject for RelatedLinkRow {
    const TABLE: &'static str = "related_links";
    const COLUMNS: &'static str = "id, performance_id, position, name, url";
    const ORDER_BY: &'static str = "position";

    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(RelatedLinkRow {
            id: row.get("id")?,
            performance_id: row.get("performance_id")?,
            position: row.get("position")?,
            name: row.get("name")?,
            url: row.get("url")?,
        })
    }

    fn upsert(&self, conn: &Connection) -> Result<(), rusqlite::Error> {
        conn.execute(
            "INSERT OR REPLACE INTO related_links (id, performance_id, position, name, url)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![self.id, self.performance_id, self.position, self.name, self.url],
        )?;
        Ok(())
    }
}

// ============================================================================
// RECORD
// ============================================================================

impl StoredObject for Record {
    const TABLE: &'static str = "records";
    const COLUMNS: &'static str =
        "id, performance_id, viewed_at, rating, note, image_ids, created_at, updated_at";
    const ORDER_BY: &'static str = "created_at, rowid";

    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        let viewed_at: String = row.get("viewed_at")?;
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;

        let image_ids_json: String = row.get("image_ids")?;
        let image_ids: Vec<String> =
            serde_json::from_str(&image_ids_json).map_err(conversion_error)?;

        Ok(Record {
            id: row.get("id")?,
            performance_id: row.get("performance_id")?,
            viewed_at: parse_timestamp(&viewed_at)?,
            rating: row.get("rating")?,
            note: row.get("note")?,
            image_ids,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        })
    }

    fn upsert(&self, conn: &Connection) -> Result<(), rusqlite::Error> {
        let image_ids_json = serde_json::to_string(&self.image_ids).map_err(conversion_error)?;

        // performance_id is immutable and never part of the update list
        conn.execute(
            "INSERT INTO records (
                id, performance_id, viewed_at, rating, note, image_ids, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                viewed_at = excluded.viewed_at,
                rating = excluded.rating,
                note = excluded.note,
                image_ids = excluded.image_ids,
                updated_at = excluded.updated_at",
            params![
                self.id,
                self.performance_id,
                format_timestamp(&self.viewed_at),
                self.rating,
                self.note,
                image_ids_json,
                format_timestamp(&self.created_at),
                format_timestamp(&self.updated_at),
            ],
        )?;

        Ok(())
    }
}

// ============================================================================
// HYDRATION
// ============================================================================

/// Ids of the Records owned by a Performance, in creation order
pub fn record_ids_for(conn: &Connection, performance_id: &str) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM records WHERE performance_id = ?1 ORDER BY created_at, rowid",
    )?;
    let ids = stmt
        .query_map([performance_id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

pub fn related_links_for(conn: &Connection, performance_id: &str) -> AppResult<Vec<RelatedLinkRow>> {
    query_in(conn, &Query::eq("performance_id", performance_id))
}

/// Attach related links and owned Record ids to a freshly mapped row
pub fn hydrate_performance(conn: &Connection, mut performance: Performance) -> AppResult<Performance> {
    let links = related_links_for(conn, &performance.id)?;
    if let Some(detail) = performance.detail.as_mut() {
        detail.related_links = links.into_iter().map(RelatedLinkRow::into_link).collect();
    }
    performance.record_ids = record_ids_for(conn, &performance.id)?;
    Ok(performance)
}
