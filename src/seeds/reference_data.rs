use anyhow::Result;
use sea_orm::DatabaseConnection;
use uuid::Uuid;

use crate::transfer::schema::{ColumnKind, ID_COLUMN, TENANT_COLUMN};
use crate::transfer::store::{Cell, TableStore};

const COUNTRIES: &[(&str, &str)] = &[
    ("BG", "Bulgaria"),
    ("DE", "Germany"),
    ("FR", "France"),
    ("GB", "United Kingdom"),
    ("IN", "India"),
    ("IL", "Israel"),
    ("US", "United States"),
];

const CURRENCIES: &[(&str, &str)] = &[
    ("BGN", "Bulgarian Lev"),
    ("EUR", "Euro"),
    ("GBP", "British Pound"),
    ("ILS", "Israeli New Shekel"),
    ("INR", "Indian Rupee"),
    ("USD", "US Dollar"),
];

/// Global tags, shared by every tenant through a NULL `tenant_id`.
const DEFAULT_TAGS: &[(&str, &str)] = &[
    ("Urgent", "#e74c3c"),
    ("Important", "#f39c12"),
    ("Internal", "#3498db"),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub countries: usize,
    pub currencies: usize,
    pub tags: usize,
}

/// Inserts the built-in reference rows that are missing.
///
/// # Arguments
///
/// * `db` - Database connection with migrations applied
pub async fn seed_reference_data(db: &DatabaseConnection) -> Result<SeedReport> {
    let store = TableStore::new(db.clone());
    let mut report = SeedReport::default();

    for (code, name) in COUNTRIES {
        let key = [("code".to_string(), Cell::Text(code.to_string()))];
        if store.exists("country", &key).await? {
            continue;
        }
        store
            .insert_row(
                "country",
                vec![
                    (ID_COLUMN.to_string(), Cell::Text(Uuid::new_v4().to_string())),
                    ("code".to_string(), Cell::Text(code.to_string())),
                    ("name".to_string(), Cell::Text(name.to_string())),
                    ("is_active".to_string(), Cell::Boolean(true)),
                ],
            )
            .await?;
        report.countries += 1;
    }

    for (code, name) in CURRENCIES {
        let key = [("code".to_string(), Cell::Text(code.to_string()))];
        if store.exists("currency", &key).await? {
            continue;
        }
        store
            .insert_row(
                "currency",
                vec![
                    (ID_COLUMN.to_string(), Cell::Text(Uuid::new_v4().to_string())),
                    ("code".to_string(), Cell::Text(code.to_string())),
                    ("name".to_string(), Cell::Text(name.to_string())),
                ],
            )
            .await?;
        report.currencies += 1;
    }

    for (name, color) in DEFAULT_TAGS {
        let key = [
            (TENANT_COLUMN.to_string(), Cell::Null(ColumnKind::Text)),
            ("name".to_string(), Cell::Text(name.to_string())),
        ];
        if store.exists("tag", &key).await? {
            continue;
        }
        store
            .insert_row(
                "tag",
                vec![
                    (ID_COLUMN.to_string(), Cell::Text(Uuid::new_v4().to_string())),
                    (TENANT_COLUMN.to_string(), Cell::Null(ColumnKind::Text)),
                    ("organization_id".to_string(), Cell::Null(ColumnKind::Text)),
                    ("name".to_string(), Cell::Text(name.to_string())),
                    ("color".to_string(), Cell::Text(color.to_string())),
                    ("is_system".to_string(), Cell::Boolean(true)),
                ],
            )
            .await?;
        report.tags += 1;
    }

    if report != SeedReport::default() {
        log::info!(
            "Seeded reference data: {} countries, {} currencies, {} tags",
            report.countries,
            report.currencies,
            report.tags
        );
    }
    Ok(report)
}
