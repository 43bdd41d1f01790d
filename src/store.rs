use crate::models::Product;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use std::{
    path::Path,
    sync::{Mutex, MutexGuard},
};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("product code already exists: {0}")]
    DuplicateCode(String),
    #[error("could not create database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("database connection lock poisoned")]
    LockPoisoned,
}

/// Catalog used by the demo seed (`SEED_SAMPLE_PRODUCTS`).
pub const SAMPLE_PRODUCTS: [(&str, &str); 10] = [
    ("Wireless Bluetooth Headphones", "WH-001"),
    ("Smartphone Case - Black", "SC-001"),
    ("USB-C Charging Cable", "UC-001"),
    ("Laptop Stand - Adjustable", "LS-001"),
    ("Wireless Mouse - Ergonomic", "WM-001"),
    ("Mechanical Keyboard - RGB", "MK-001"),
    ("Monitor Stand - Dual", "MS-001"),
    ("Webcam - HD 1080p", "WC-001"),
    ("Microphone - USB Condenser", "MC-001"),
    ("Gaming Mouse Pad - Large", "MP-001"),
];

const COLUMNS: &str = "id, name, code, image_path, created_at, updated_at";

/// Product catalog on a single SQLite connection.
pub struct ProductStore {
    conn: Mutex<Connection>,
}

impl ProductStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS products (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                code TEXT NOT NULL UNIQUE,
                image_path TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    pub fn create(&self, name: &str, code: &str) -> Result<Product, StoreError> {
        let conn = self.conn()?;
        let now = Utc::now();
        let inserted = conn.execute(
            "INSERT INTO products (name, code, image_path, created_at, updated_at)
             VALUES (?1, ?2, NULL, ?3, ?3)",
            params![name, code, now],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                return Err(StoreError::DuplicateCode(code.to_string()));
            }
            Err(err) => return Err(err.into()),
        }
        let id = conn.last_insert_rowid();
        Ok(Product {
            id,
            name: name.to_string(),
            code: code.to_string(),
            image_path: None,
            has_image: false,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get(&self, id: i64) -> Result<Option<Product>, StoreError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM products WHERE id = ?1"),
                params![id],
                product_from_row,
            )
            .optional()?)
    }

    pub fn get_by_code(&self, code: &str) -> Result<Option<Product>, StoreError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM products WHERE code = ?1"),
                params![code],
                product_from_row,
            )
            .optional()?)
    }

    pub fn list(&self) -> Result<Vec<Product>, StoreError> {
        self.query(&format!("SELECT {COLUMNS} FROM products ORDER BY id"), [])
    }

    pub fn list_without_image(&self) -> Result<Vec<Product>, StoreError> {
        self.query(
            &format!("SELECT {COLUMNS} FROM products WHERE image_path IS NULL ORDER BY id"),
            [],
        )
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<Product>, StoreError> {
        self.query(
            &format!(
                "SELECT {COLUMNS} FROM products ORDER BY created_at DESC, id DESC LIMIT ?1"
            ),
            params![limit as i64],
        )
    }

    /// Products whose name or code contains `term` (ASCII case-insensitive).
    pub fn search(&self, term: &str) -> Result<Vec<Product>, StoreError> {
        let pattern = format!("%{}%", escape_like(term));
        self.query(
            &format!(
                "SELECT {COLUMNS} FROM products
                 WHERE name LIKE ?1 ESCAPE '\\' OR code LIKE ?1 ESCAPE '\\'
                 ORDER BY id"
            ),
            params![pattern],
        )
    }

    pub fn count(&self) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM products", [], |r| r.get(0))?)
    }

    pub fn count_with_image(&self) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM products WHERE image_path IS NOT NULL",
            [],
            |r| r.get(0),
        )?)
    }

    /// Records `path` as the product's image. `None` when the product is gone.
    pub fn update_image(&self, id: i64, path: &str) -> Result<Option<Product>, StoreError> {
        {
            let conn = self.conn()?;
            let changed = conn.execute(
                "UPDATE products SET image_path = ?1, updated_at = ?2 WHERE id = ?3",
                params![path, Utc::now(), id],
            )?;
            if changed == 0 {
                return Ok(None);
            }
        }
        self.get(id)
    }

    /// Removes the row only; a stored image file stays on disk.
    pub fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM products WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// Inserts [`SAMPLE_PRODUCTS`] into an empty catalog. Returns how many were added.
    pub fn seed_samples(&self) -> Result<usize, StoreError> {
        if self.count()? > 0 {
            return Ok(0);
        }
        let mut added = 0;
        for (name, code) in SAMPLE_PRODUCTS {
            match self.create(name, code) {
                Ok(_) => added += 1,
                Err(StoreError::DuplicateCode(_)) => {}
                Err(err) => return Err(err),
            }
        }
        info!(target = "shelfshot.store", added, "sample_products_seeded");
        Ok(added)
    }

    fn query<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<Product>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, product_from_row)?;
        let mut products = Vec::new();
        for product in rows {
            products.push(product?);
        }
        Ok(products)
    }
}

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    let image_path: Option<String> = row.get(3)?;
    let created_at: DateTime<Utc> = row.get(4)?;
    let updated_at: DateTime<Utc> = row.get(5)?;
    Ok(Product {
        id: row.get(0)?,
        name: row.get(1)?,
        code: row.get(2)?,
        has_image: image_path.as_deref().is_some_and(|p| !p.is_empty()),
        image_path,
        created_at,
        updated_at,
    })
}

fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ProductStore {
        ProductStore::open_in_memory().expect("in-memory store")
    }

    #[test]
    fn create_then_fetch_by_id_and_code() {
        let store = store();
        let created = store.create("Wireless Mouse - Ergonomic", "WM-001").unwrap();
        assert!(!created.has_image);

        let by_id = store.get(created.id).unwrap().expect("by id");
        assert_eq!(by_id.code, "WM-001");
        let by_code = store.get_by_code("WM-001").unwrap().expect("by code");
        assert_eq!(by_code.id, created.id);
        assert!(store.get(created.id + 100).unwrap().is_none());
    }

    #[test]
    fn duplicate_code_is_rejected() {
        let store = store();
        store.create("A", "X-1").unwrap();
        let err = store.create("B", "X-1").unwrap_err();
        assert!(matches!(err, StoreError::DuplicateCode(ref c) if c == "X-1"));
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn update_image_moves_product_out_of_missing_list() {
        let store = store();
        let a = store.create("A", "A-1").unwrap();
        let b = store.create("B", "B-1").unwrap();

        let updated = store
            .update_image(a.id, "products/A-1_deadbeef.jpg")
            .unwrap()
            .expect("product exists");
        assert!(updated.has_image);
        assert_eq!(updated.image_path.as_deref(), Some("products/A-1_deadbeef.jpg"));

        let missing: Vec<i64> = store.list_without_image().unwrap().iter().map(|p| p.id).collect();
        assert_eq!(missing, vec![b.id]);
        assert_eq!(store.count_with_image().unwrap(), 1);
        assert!(store.update_image(999, "x.jpg").unwrap().is_none());
    }

    #[test]
    fn search_matches_name_or_code_substrings() {
        let store = store();
        store.create("Wireless Mouse - Ergonomic", "WM-001").unwrap();
        store.create("Gaming Mouse Pad - Large", "MP-001").unwrap();
        store.create("USB-C Charging Cable", "UC-001").unwrap();

        assert_eq!(store.search("mouse").unwrap().len(), 2);
        assert_eq!(store.search("UC-0").unwrap().len(), 1);
        assert!(store.search("100%").unwrap().is_empty());
    }

    #[test]
    fn recent_returns_newest_first() {
        let store = store();
        for i in 0..7 {
            store.create(&format!("P{i}"), &format!("C-{i}")).unwrap();
        }
        let recent: Vec<String> = store.recent(5).unwrap().into_iter().map(|p| p.code).collect();
        assert_eq!(recent, vec!["C-6", "C-5", "C-4", "C-3", "C-2"]);
    }

    #[test]
    fn delete_reports_whether_a_row_went_away() {
        let store = store();
        let p = store.create("A", "A-1").unwrap();
        assert!(store.delete(p.id).unwrap());
        assert!(!store.delete(p.id).unwrap());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn seeding_only_fills_an_empty_catalog() {
        let store = store();
        assert_eq!(store.seed_samples().unwrap(), 10);
        assert_eq!(store.seed_samples().unwrap(), 0);
        assert_eq!(store.count().unwrap(), 10);
        assert!(store.get_by_code("WH-001").unwrap().is_some());
    }

    #[test]
    fn open_creates_parent_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("database").join("products.db");
        let store = ProductStore::open(&path).unwrap();
        store.create("A", "A-1").unwrap();
        drop(store);

        let reopened = ProductStore::open(&path).unwrap();
        assert_eq!(reopened.count().unwrap(), 1);
    }
}
