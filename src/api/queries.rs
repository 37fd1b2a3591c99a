//! Read queries over the modeled tables (`fct_messages`, `dim_channels`,
//! `dim_dates`). These tables are produced by the transform stage; nothing
//! here writes to the database.

use rusqlite::{params, Connection};
use serde::Serialize;

pub const PRODUCT_KEYWORDS: [&str; 18] = [
    "paracetamol",
    "ibuprofen",
    "amoxicillin",
    "vaccine",
    "tablet",
    "syrup",
    "cream",
    "mask",
    "sanitizer",
    "antibiotic",
    "antiviral",
    "diagnostic",
    "test kit",
    "ventilator",
    "medicine",
    "drug",
    "injection",
    "pill",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductMention {
    pub product_name: String,
    pub mention_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyActivity {
    pub date: String,
    pub message_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageHit {
    pub message_id: i64,
    pub channel_name: String,
    pub message_date: String,
    pub message_text: Option<String>,
    pub has_media: bool,
    pub media_type: Option<String>,
}

/// Messages mentioning each product keyword, most mentioned first. Keywords
/// nobody mentions are left out.
pub fn top_products(conn: &Connection, limit: usize) -> rusqlite::Result<Vec<ProductMention>> {
    let mut stmt = conn.prepare(
        "SELECT COUNT(*) FROM fct_messages WHERE message_text LIKE ?1 ESCAPE '\\'",
    )?;

    let mut mentions = Vec::new();
    for keyword in PRODUCT_KEYWORDS {
        let count: i64 = stmt.query_row(params![contains_pattern(keyword)], |row| row.get(0))?;
        if count > 0 {
            mentions.push(ProductMention {
                product_name: keyword.to_string(),
                mention_count: count,
            });
        }
    }

    // Stable: ties keep keyword-list order.
    mentions.sort_by(|a, b| b.mention_count.cmp(&a.mention_count));
    mentions.truncate(limit);
    Ok(mentions)
}

/// Messages per day for channels whose name contains `channel_name`
/// (case-insensitive), oldest day first.
pub fn channel_activity(conn: &Connection, channel_name: &str) -> rusqlite::Result<Vec<DailyActivity>> {
    let mut stmt = conn.prepare(
        "SELECT CAST(dd.full_date AS TEXT) AS date, COUNT(fm.message_id) AS message_count
         FROM fct_messages fm
         JOIN dim_channels dc ON fm.channel_id = dc.channel_id
         JOIN dim_dates dd ON fm.date_key = dd.date_key
         WHERE dc.channel_name LIKE ?1 ESCAPE '\\'
         GROUP BY dd.full_date
         ORDER BY dd.full_date",
    )?;

    let rows = stmt.query_map(params![contains_pattern(channel_name)], |row| {
        Ok(DailyActivity {
            date: row.get(0)?,
            message_count: row.get(1)?,
        })
    })?;
    rows.collect()
}

/// Messages whose text contains `query`, newest first. `%` and `_` in the
/// query match literally.
pub fn search_messages(conn: &Connection, query: &str, limit: usize) -> rusqlite::Result<Vec<MessageHit>> {
    let mut stmt = conn.prepare(
        "SELECT fm.message_id, dc.channel_name, CAST(fm.message_date AS TEXT),
                fm.message_text, fm.has_media, fm.media_type
         FROM fct_messages fm
         JOIN dim_channels dc ON fm.channel_id = dc.channel_id
         WHERE fm.message_text LIKE ?1 ESCAPE '\\'
         ORDER BY fm.message_date DESC
         LIMIT ?2",
    )?;

    let rows = stmt.query_map(params![contains_pattern(query), limit as i64], |row| {
        Ok(MessageHit {
            message_id: row.get(0)?,
            channel_name: row.get(1)?,
            message_date: row.get(2)?,
            message_text: row.get(3)?,
            has_media: row.get(4)?,
            media_type: row.get(5)?,
        })
    })?;
    rows.collect()
}

/// `%<text>%` with LIKE wildcards in `text` escaped by `\`.
fn contains_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
pub(crate) mod fixtures {
    use rusqlite::{params, Connection};

    pub const MARTS: &str = "
        CREATE TABLE dim_channels (channel_id INTEGER PRIMARY KEY, channel_name TEXT NOT NULL);
        CREATE TABLE dim_dates (date_key INTEGER PRIMARY KEY, full_date TEXT NOT NULL);
        CREATE TABLE fct_messages (
            message_id INTEGER NOT NULL,
            channel_id INTEGER NOT NULL,
            date_key INTEGER NOT NULL,
            message_date TEXT NOT NULL,
            message_text TEXT,
            has_media BOOLEAN NOT NULL,
            media_type TEXT
        );
    ";

    /// Two channels over two days with a handful of product mentions.
    pub fn seed(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(MARTS)?;
        conn.execute_batch(
            "INSERT INTO dim_channels VALUES (1, 'CheMed123'), (2, 'lobelia4cosmetics');
             INSERT INTO dim_dates VALUES (20240501, '2024-05-01'), (20240502, '2024-05-02');",
        )?;

        let messages: [(i64, i64, i64, &str, &str, bool); 6] = [
            (1, 1, 20240501, "2024-05-01T08:00:00", "Paracetamol 500mg tablet in stock", false),
            (2, 1, 20240501, "2024-05-01T09:00:00", "Amoxicillin syrup for kids", true),
            (3, 1, 20240502, "2024-05-02T10:00:00", "New TABLET packs, 100% original", true),
            (4, 2, 20240502, "2024-05-02T11:00:00", "Face cream and sanitizer", true),
            (5, 2, 20240502, "2024-05-02T12:00:00", "Closed for the holiday", false),
            (6, 2, 20240502, "2024-05-02T13:00:00", "paracetamol syrup", false),
        ];
        for (id, channel, date_key, date, text, has_media) in messages {
            conn.execute(
                "INSERT INTO fct_messages VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id,
                    channel,
                    date_key,
                    date,
                    text,
                    has_media,
                    has_media.then_some("MessageMediaPhoto")
                ],
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        fixtures::seed(&conn).unwrap();
        conn
    }

    #[test]
    fn test_top_products_counts_and_order() -> rusqlite::Result<()> {
        let mentions = top_products(&conn(), 10)?;

        let pairs: Vec<(&str, i64)> = mentions
            .iter()
            .map(|m| (m.product_name.as_str(), m.mention_count))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("paracetamol", 2),
                ("tablet", 2),
                ("syrup", 2),
                ("amoxicillin", 1),
                ("cream", 1),
                ("sanitizer", 1),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_top_products_respects_limit() -> rusqlite::Result<()> {
        let mentions = top_products(&conn(), 2)?;
        assert_eq!(mentions.len(), 2);
        assert_eq!(mentions[0].product_name, "paracetamol");
        Ok(())
    }

    #[test]
    fn test_channel_activity_partial_name() -> rusqlite::Result<()> {
        let activity = channel_activity(&conn(), "chemed")?;
        assert_eq!(
            activity,
            vec![
                DailyActivity { date: "2024-05-01".into(), message_count: 2 },
                DailyActivity { date: "2024-05-02".into(), message_count: 1 },
            ]
        );
        assert!(channel_activity(&conn(), "unknown")?.is_empty());
        Ok(())
    }

    #[test]
    fn test_search_newest_first() -> rusqlite::Result<()> {
        let hits = search_messages(&conn(), "SYRUP", 100)?;
        let ids: Vec<i64> = hits.iter().map(|h| h.message_id).collect();
        assert_eq!(ids, vec![6, 2]);
        assert_eq!(hits[1].channel_name, "CheMed123");
        assert!(hits[1].has_media);
        assert_eq!(hits[1].media_type.as_deref(), Some("MessageMediaPhoto"));
        Ok(())
    }

    #[test]
    fn test_search_wildcards_are_literal() -> rusqlite::Result<()> {
        let hits = search_messages(&conn(), "100%", 100)?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].message_id, 3);
        assert!(search_messages(&conn(), "_", 100)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_contains_pattern_escapes() {
        assert_eq!(contains_pattern("a%b_c\\"), "%a\\%b\\_c\\\\%");
    }
}
