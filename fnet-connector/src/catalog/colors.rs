//! Tube color catalog
//!
//! Resolves (conduit subtype, tube number) to a color pair and a color code
//! to a display name. Color specs are either a single code (`#FF0000`) or two
//! codes separated by `/` for bicolor tubes, rendered as two triangular
//! halves. A secondary code meaning "no color" is dropped.

use crate::types::SubtypeId;
use serde::Serialize;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

/// Color used for tubes without a catalog entry
pub const FALLBACK_COLOR: &str = "#808080";

/// Display name for codes without a catalog entry
pub const UNKNOWN_COLOR_NAME: &str = "unknown";

const BICOLOR_DELIMITER: char = '/';

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TubeColor {
    pub primary: String,
    pub secondary: Option<String>,
}

impl TubeColor {
    pub fn fallback() -> Self {
        Self {
            primary: FALLBACK_COLOR.to_string(),
            secondary: None,
        }
    }

    pub fn is_bicolor(&self) -> bool {
        self.secondary.is_some()
    }

    /// Parse a stored color spec
    ///
    /// Codes are normalized to upper case. An empty primary yields the
    /// fallback color.
    pub fn parse(spec: &str) -> Self {
        let mut parts = spec.splitn(2, BICOLOR_DELIMITER);
        let primary = parts.next().map(normalize_code).unwrap_or_default();
        if primary.is_empty() {
            return Self::fallback();
        }

        let secondary = parts
            .next()
            .map(normalize_code)
            .filter(|code| !is_no_color(code));

        Self { primary, secondary }
    }
}

fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Empty, or a code made only of zeros (`0`, `#000000`, `000`)
fn is_no_color(code: &str) -> bool {
    code.trim_start_matches('#').chars().all(|c| c == '0')
}

/// Cached color lookups for the subtypes of one working set
#[derive(Debug, Default)]
pub struct ColorCatalog {
    by_subtype: HashMap<SubtypeId, BTreeMap<u32, TubeColor>>,
    names: HashMap<String, String>,
    names_loaded: bool,
}

impl ColorCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Batch-load colors for all given subtypes plus the name table
    ///
    /// Subtypes already cached are skipped. On a database error the affected
    /// subtypes stay uncached and resolve to the fallback color.
    pub async fn warm(&mut self, db: &SqlitePool, subtypes: &[SubtypeId]) {
        let missing: Vec<SubtypeId> = subtypes
            .iter()
            .copied()
            .filter(|s| !self.by_subtype.contains_key(s))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        if !missing.is_empty() {
            match load_colors(db, &missing).await {
                Ok(loaded) => {
                    for subtype in &missing {
                        self.by_subtype.entry(*subtype).or_default();
                    }
                    for (subtype, number, color) in loaded {
                        self.by_subtype.entry(subtype).or_default().insert(number, color);
                    }
                    debug!(subtypes = missing.len(), "Tube colors cached");
                }
                Err(e) => warn!("Tube color catalog unavailable, using fallback colors: {}", e),
            }
        }

        if !self.names_loaded {
            match load_names(db).await {
                Ok(names) => {
                    self.names = names;
                    self.names_loaded = true;
                }
                Err(e) => warn!("Color name catalog unavailable: {}", e),
            }
        }
    }

    /// All known tube colors of a subtype, keyed by tube number
    pub fn colors_for(&self, subtype: SubtypeId) -> BTreeMap<u32, TubeColor> {
        self.by_subtype.get(&subtype).cloned().unwrap_or_default()
    }

    /// Color of one tube, falling back to neutral gray
    pub fn color_for(&self, subtype: SubtypeId, tube_number: u32) -> TubeColor {
        self.by_subtype
            .get(&subtype)
            .and_then(|colors| colors.get(&tube_number))
            .cloned()
            .unwrap_or_else(TubeColor::fallback)
    }

    /// Display name of a color code
    pub fn name_for(&self, code: &str) -> String {
        self.names
            .get(&normalize_code(code))
            .cloned()
            .unwrap_or_else(|| UNKNOWN_COLOR_NAME.to_string())
    }

    /// Name of a tube color, `primary/secondary` for bicolor tubes
    pub fn display_name(&self, color: &TubeColor) -> String {
        match &color.secondary {
            Some(secondary) => format!("{}/{}", self.name_for(&color.primary), self.name_for(secondary)),
            None => self.name_for(&color.primary),
        }
    }
}

async fn load_colors(
    db: &SqlitePool,
    subtypes: &[SubtypeId],
) -> Result<Vec<(SubtypeId, u32, TubeColor)>, sqlx::Error> {
    let mut query: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT subtype_id, tube_number, color_code FROM tube_colors WHERE subtype_id IN (");
    let mut separated = query.separated(", ");
    for subtype in subtypes {
        separated.push_bind(subtype.0);
    }
    separated.push_unseparated(")");

    let rows = query.build().fetch_all(db).await?;

    let mut colors = Vec::with_capacity(rows.len());
    for row in rows {
        let number: i64 = row.try_get("tube_number")?;
        let Ok(number) = u32::try_from(number) else {
            continue;
        };
        let spec: String = row.try_get("color_code")?;
        colors.push((SubtypeId(row.try_get("subtype_id")?), number, TubeColor::parse(&spec)));
    }
    Ok(colors)
}

async fn load_names(db: &SqlitePool) -> Result<HashMap<String, String>, sqlx::Error> {
    let rows: Vec<(String, String)> = sqlx::query_as("SELECT code, name FROM color_names")
        .fetch_all(db)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(code, name)| (normalize_code(&code), name))
        .collect())
}
